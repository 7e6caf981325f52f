use std::path::PathBuf;

use crate::feed::{FeedSettings, DEFAULT_BATCH_COUNT, DEFAULT_ORGANIZATION_ID, DEFAULT_VISITOR_ID};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_PROJECT_NAME: &str = "dewey";

/// Runtime configuration. Environment first, then command-line overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_url: String,
    pub project_name: String,
    /// Bearer token for the feed API; empty means unauthenticated.
    pub api_token: Option<String>,
    pub batch_count: u32,
    pub organization_id: String,
    pub visitor_id: String,
    pub library_path: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            project_name: DEFAULT_PROJECT_NAME.to_string(),
            api_token: None,
            batch_count: DEFAULT_BATCH_COUNT,
            organization_id: DEFAULT_ORGANIZATION_ID.to_string(),
            visitor_id: DEFAULT_VISITOR_ID.to_string(),
            library_path: crate::db::default_library_path(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Unset or empty variables keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = var("DEWEY_API_URL") {
            config.api_url = url;
        }
        if let Some(project) = var("DEWEY_PROJECT_NAME") {
            config.project_name = project;
        }
        config.api_token = var("DEWEY_API_TOKEN");
        if let Some(raw) = var("DEWEY_BATCH_COUNT") {
            match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => config.batch_count = n,
                _ => tracing::warn!("Ignoring invalid DEWEY_BATCH_COUNT={raw}"),
            }
        }
        if let Some(org) = var("DEWEY_ORGANIZATION_ID") {
            config.organization_id = org;
        }
        if let Some(visitor) = var("DEWEY_VISITOR_ID") {
            config.visitor_id = visitor;
        }
        if let Some(path) = var("DEWEY_LIBRARY_PATH") {
            config.library_path = PathBuf::from(path);
        }
        config
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            batch_count: self.batch_count,
            organization_id: self.organization_id.clone(),
            visitor_id: self.visitor_id.clone(),
        }
    }
}
