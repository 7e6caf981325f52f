#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use dewey::recommendation::{
    FetchError, ProductAttribute, RecommendationCard, RecommendationProduct,
    RecommendationRequest, RecommendationResponse, RecommendationSource,
};

/// Serves queued responses in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedSource {
    responses: Mutex<VecDeque<Result<RecommendationResponse, FetchError>>>,
    requests: Mutex<Vec<RecommendationRequest>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(self, ids: &[String]) -> Self {
        self.responses.lock().unwrap().push_back(Ok(response(ids)));
        self
    }

    pub fn failure(self, status: u16) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(FetchError::Status(status)));
        self
    }

    pub fn requests(&self) -> Vec<RecommendationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecommendationSource for ScriptedSource {
    async fn fetch(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationResponse, FetchError> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(RecommendationResponse::default()))
    }
}

pub fn ids(prefix: &str, range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("{prefix}-{i}")).collect()
}

pub fn response(ids: &[String]) -> RecommendationResponse {
    RecommendationResponse {
        cards: ids
            .iter()
            .map(|id| RecommendationCard {
                card_type: "product".into(),
                id: id.clone(),
                product: RecommendationProduct {
                    sku: format!("sku-{id}"),
                    body: format!("About {id}"),
                    title: format!("Book {id}"),
                    image_url: Some(format!("https://img.example/{id}.jpg")),
                    product_url: None,
                    attributes: vec![ProductAttribute {
                        name: "Author".into(),
                        value: "Anon".into(),
                    }],
                },
            })
            .collect(),
    }
}
