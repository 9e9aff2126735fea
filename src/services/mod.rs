//! Business logic services

pub mod catalog;
pub mod comments;
pub mod loans;
pub mod notifications;
pub mod stats;
pub mod stock;
pub mod waitlist;

use std::sync::Arc;

use crate::{config::LoansConfig, repository::Store};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub waitlist: waitlist::WaitlistService,
    pub notifications: notifications::NotificationsService,
    pub comments: comments::CommentsService,
    pub stats: stats::StatsService,
}

impl Services {
    /// Create all services on top of one store
    pub fn new(store: Arc<dyn Store>, policy: LoansConfig) -> Self {
        Self {
            catalog: catalog::CatalogService::new(store.clone()),
            notifications: notifications::NotificationsService::new(store.clone(), &policy),
            loans: loans::LoansService::new(store.clone(), policy),
            waitlist: waitlist::WaitlistService::new(store.clone()),
            comments: comments::CommentsService::new(store.clone()),
            stats: stats::StatsService::new(store),
        }
    }
}
