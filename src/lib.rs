//! School library server
//!
//! Catalog, loan lifecycle and waitlist for a school library, served as a REST
//! JSON API. Stock, loans and waitlist queues are kept consistent by running
//! every lifecycle transition as a single unit of work against the store.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn repository::Store>) -> Self {
        let services = services::Services::new(store, config.loans.clone());
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
        }
    }
}
