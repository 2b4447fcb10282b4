pub mod classification;
pub mod clients;
pub mod config;
pub mod deserializers;
pub mod error;
pub mod http;
pub mod image;
pub mod prompts;
pub mod service;
pub mod store;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::clients::HttpChatGateway;
use crate::config::Config;
use crate::http::AppState;
use crate::service::Classifier;
use crate::store::SqliteStore;

pub use crate::classification::{Category, ClassificationResult, credits_for_confidence};
pub use crate::error::EcoSnapError;

/// Classifier wired to the configured HTTP gateway
pub fn build_classifier(config: &Config) -> Result<Classifier> {
    let gateway = HttpChatGateway::from_config(config)?;
    Ok(Classifier::new(Arc::new(gateway), config))
}

/// Full server state: classifier plus the SQLite ledger
pub fn build_state(config: &Config) -> Result<AppState> {
    let classifier = build_classifier(config)?;
    let store = SqliteStore::open(&config.store.database_path)
        .with_context(|| format!("Failed to open store at {}", config.store.database_path))?;
    Ok(AppState::new(classifier, Arc::new(store), config))
}
