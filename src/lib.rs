pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod utils;
pub mod validation;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

use crate::ports::{LedgerStore, NotificationRepository};
use crate::services::{
    AggregateReader, CauseService, DonationQueries, IdempotencyGuard, LedgerWriter,
    NotificationDispatcher, RetryPolicy,
};

/// Collaborators the application is assembled from.
pub struct AppParts {
    pub store: Arc<dyn LedgerStore>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub cause_guard: Arc<dyn IdempotencyGuard>,
    /// When set, donation submissions carrying a submission token are deduplicated too.
    pub donation_guard: Option<Arc<dyn IdempotencyGuard>>,
    pub retry: RetryPolicy,
    pub admin_api_key: String,
    pub log_request_body: bool,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub ledger: LedgerWriter,
    pub aggregates: AggregateReader,
    pub donations: DonationQueries,
    pub causes: CauseService,
    pub admin_api_key: Arc<str>,
    pub log_request_body: bool,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(parts: AppParts) -> Self {
        let dispatcher = NotificationDispatcher::new(parts.notifications.clone());

        let mut ledger = LedgerWriter::new(parts.store.clone(), dispatcher.clone(), parts.retry);
        if let Some(guard) = parts.donation_guard {
            ledger = ledger.with_submission_guard(guard);
        }

        Self {
            ledger,
            aggregates: AggregateReader::new(parts.store.clone()),
            donations: DonationQueries::new(parts.store.clone()),
            causes: CauseService::new(parts.store.clone(), parts.cause_guard, dispatcher),
            store: parts.store,
            notifications: parts.notifications,
            admin_api_key: Arc::from(parts.admin_api_key),
            log_request_body: parts.log_request_body,
            start_time: Instant::now(),
        }
    }
}

pub fn create_app(state: AppState) -> Router {
    let admin = Router::new()
        .route("/donations", get(handlers::admin::list_donations))
        .route("/causes/:id/status", post(handlers::admin::moderate_cause))
        .route(
            "/causes/:id/reconcile",
            get(handlers::admin::reconcile_cause).post(handlers::admin::heal_cause),
        )
        .route("/notifications", get(handlers::admin::list_notifications))
        .route(
            "/notifications/:id/read",
            post(handlers::admin::mark_notification_read),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .route("/causes", post(handlers::causes::create_cause))
        .route("/causes/:id", get(handlers::causes::get_cause))
        .route("/causes/:id/progress", get(handlers::causes::get_progress))
        .route(
            "/causes/:id/donations",
            post(handlers::donations::record_donation).get(handlers::donations::list_donations),
        )
        .nest("/admin", admin)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::request_logger::request_logger_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
