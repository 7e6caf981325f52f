//! Client side of the recommendation feed API.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::engagement::{LingerBatch, TelemetryIdentity};
use crate::types::{Book, ReadingStatus};

pub const LINGER_EVENT: &str = "feed linger metrics";
pub const LINGER_CARD_TYPE: &str = "product_detail_card";

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("server returned HTTP {0}")]
    Status(u16),
    #[error("could not decode feed response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Everything needed for one page request.
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationRequest {
    pub session_id: String,
    pub page: u32,
    pub batch_count: u32,
    pub events: Vec<RecommendationEvent>,
    pub search_prompt: String,
}

/// JSON body of the feed POST.
#[derive(Debug, Serialize)]
pub struct RequestBody<'a> {
    pub page: u32,
    pub batch_count: u32,
    pub events: &'a [RecommendationEvent],
    pub search_prompt: &'a str,
}

impl RecommendationRequest {
    pub fn body(&self) -> RequestBody<'_> {
        RequestBody {
            page: self.page,
            batch_count: self.batch_count,
            events: &self.events,
            search_prompt: self.search_prompt.trim(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecommendationResponse {
    #[serde(default)]
    pub cards: Vec<RecommendationCard>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecommendationCard {
    #[serde(rename = "type", default)]
    pub card_type: String,
    pub id: String,
    pub product: RecommendationProduct,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecommendationProduct {
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub body: String,
    pub title: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub product_url: Option<String>,
    #[serde(default)]
    pub attributes: Vec<ProductAttribute>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProductAttribute {
    pub name: String,
    pub value: String,
}

impl RecommendationProduct {
    /// Attribute value by case-insensitive name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.value.as_str())
    }
}

/// Map a feed card to a displayable book.
pub fn card_to_book(card: RecommendationCard) -> Book {
    let product = &card.product;
    let author = product.attribute("Author").map(str::to_string);
    let genre = product.attribute("genre").map(str::to_string);
    let published_year = product
        .attribute("Year Published")
        .and_then(|y| y.trim().parse::<i32>().ok());
    let description = Some(product.body.clone()).filter(|b| !b.is_empty());

    Book {
        id: card.id,
        title: card.product.title,
        author,
        description,
        genre,
        published_year,
        image_url: card.product.image_url,
        product_url: card.product.product_url,
        status: ReadingStatus::WantToRead,
    }
}

/// Decode a raw feed response body.
pub fn parse_response(body: &str) -> Result<RecommendationResponse, FetchError> {
    Ok(serde_json::from_str(body)?)
}

// -- Outbound telemetry events --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationEvent {
    pub event: String,
    pub properties: EventProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventProperties {
    Linger(LingerProperties),
    AbstractInterest(AbstractInterestProperties),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LingerProperties {
    pub organization_id: String,
    pub visitor_id: String,
    pub session_id: String,
    pub payload: HashMap<String, LingerPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LingerPayload {
    pub id: String,
    pub time: f64,
    pub enter_count: u32,
    #[serde(rename = "type")]
    pub card_type: String,
}

/// Explicit interest in a book, weighted by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractInterestProperties {
    pub organization_id: String,
    pub visitor_id: String,
    pub session_id: String,
    pub id: String,
    pub weight: f64,
}

impl RecommendationEvent {
    pub fn abstract_interest(
        event: impl Into<String>,
        identity: &TelemetryIdentity,
        book_id: impl Into<String>,
        weight: f64,
    ) -> Self {
        Self {
            event: event.into(),
            properties: EventProperties::AbstractInterest(AbstractInterestProperties {
                organization_id: identity.organization_id.clone(),
                visitor_id: identity.visitor_id.clone(),
                session_id: identity.session_id.clone(),
                id: book_id.into(),
                weight,
            }),
        }
    }
}

impl LingerBatch {
    /// Wrap this batch as the `feed linger metrics` event.
    pub fn into_event(self, identity: &TelemetryIdentity) -> RecommendationEvent {
        let payload = self
            .entries
            .into_iter()
            .map(|(key, entry)| {
                (
                    key,
                    LingerPayload {
                        id: entry.book_id,
                        time: entry.dwell_seconds,
                        enter_count: entry.enter_count,
                        card_type: LINGER_CARD_TYPE.to_string(),
                    },
                )
            })
            .collect();

        RecommendationEvent {
            event: LINGER_EVENT.to_string(),
            properties: EventProperties::Linger(LingerProperties {
                organization_id: identity.organization_id.clone(),
                visitor_id: identity.visitor_id.clone(),
                session_id: identity.session_id.clone(),
                payload,
            }),
        }
    }
}

/// Anything that can serve a page of recommendations.
#[async_trait]
pub trait RecommendationSource: Send + Sync {
    async fn fetch(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationResponse, FetchError>;
}

/// The hosted feed API over HTTP.
pub struct HttpRecommendationSource {
    api_url: String,
    project_name: String,
    api_token: Option<String>,
    http: reqwest::Client,
}

impl HttpRecommendationSource {
    pub fn new(api_url: String, project_name: String, api_token: Option<String>) -> Self {
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            project_name,
            api_token: api_token.filter(|t| !t.is_empty()),
            http: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self, session_id: &str) -> String {
        format!(
            "{}/hackathon/{}/feed/{}",
            self.api_url, self.project_name, session_id
        )
    }
}

#[async_trait]
impl RecommendationSource for HttpRecommendationSource {
    async fn fetch(
        &self,
        request: &RecommendationRequest,
    ) -> Result<RecommendationResponse, FetchError> {
        let url = self.endpoint(&request.session_id);
        tracing::debug!(%url, page = request.page, events = request.events.len(), "Requesting feed page");

        let mut builder = self.http.post(&url).json(&request.body());
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        parse_response(&body)
    }
}
