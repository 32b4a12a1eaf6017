pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod utils;

use std::sync::Arc;

use crate::config::Config;
use crate::database::store::PaymentStore;
use crate::services::{
    gateway_service::PaymentGateway, notification_service::NotificationService,
    payment_service::PaymentService, reconciliation_service::ReconciliationEngine,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn PaymentStore>,
    pub engine: ReconciliationEngine,
    pub payment_service: PaymentService,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: NotificationService,
    ) -> Self {
        let engine = ReconciliationEngine::new(store.clone(), notifier);
        let payment_service =
            PaymentService::new(store.clone(), gateway, engine.clone(), config.clone());

        Self {
            config,
            store,
            engine,
            payment_service,
        }
    }
}
