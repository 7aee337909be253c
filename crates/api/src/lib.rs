//! HTTP API server with observability for the commerce core.
//!
//! Provides REST endpoints for orders, payments and coupons on top of the
//! workflow services, with structured logging (tracing) and Prometheus
//! metrics.

pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use workflow::{
    CouponService, InMemoryInventory, LoggingNotifier, MockPaymentGateway, OrderWorkflowService,
    PaymentWorkflowService,
};

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub orders: OrderWorkflowService<S, InMemoryInventory, LoggingNotifier>,
    pub payments: PaymentWorkflowService<S, MockPaymentGateway, LoggingNotifier>,
    pub coupons: CouponService<S>,
    pub inventory: InMemoryInventory,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    use routes::{coupons, orders, payments};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // Orders
        .route("/orders", post(orders::create::<S>).get(orders::list_mine::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route("/orders/number/{order_number}", get(orders::get_by_number::<S>))
        .route("/orders/{id}/events", get(orders::events::<S>))
        .route("/orders/{id}/cancel", post(orders::cancel::<S>))
        .route(
            "/orders/{id}/items/{item_id}/cancel",
            post(orders::cancel_item::<S>),
        )
        .route("/orders/{id}/pay", post(orders::pay::<S>))
        .route("/orders/{id}/prepare", post(orders::prepare::<S>))
        .route("/orders/{id}/ship", post(orders::ship::<S>))
        .route("/orders/{id}/deliver", post(orders::deliver::<S>))
        .route("/orders/{id}/payments", get(payments::list_for_order::<S>))
        .route("/admin/orders", get(orders::search::<S>))
        .route("/admin/stock", put(routes::inventory::set_stock::<S>))
        // Payments
        .route("/payments", post(payments::request::<S>))
        .route("/payments/confirm", post(payments::confirm::<S>))
        .route("/payments/{id}", get(payments::get::<S>))
        .route("/payments/{id}/cancel", post(payments::cancel::<S>))
        // Coupons
        .route("/coupons", post(coupons::create::<S>).get(coupons::search::<S>))
        .route("/coupons/apply", post(coupons::apply::<S>))
        .route("/coupons/validate", get(coupons::validate::<S>))
        .route(
            "/coupons/{id}",
            get(coupons::get::<S>)
                .patch(coupons::update::<S>)
                .delete(coupons::delete::<S>),
        )
        .route("/coupons/code/{code}", get(coupons::get_by_code::<S>))
        .route("/coupons/code/{code}/issue", post(coupons::issue_by_code::<S>))
        .route("/coupons/{id}/activate", post(coupons::activate::<S>))
        .route("/coupons/{id}/deactivate", post(coupons::deactivate::<S>))
        .route("/coupons/{id}/issue", post(coupons::issue::<S>))
        .route("/coupons/{id}/calculate", get(coupons::calculate::<S>))
        .route("/members/me/coupons", get(coupons::my_coupons::<S>))
        .route(
            "/members/me/coupons/for-order",
            get(coupons::my_coupons_for_order::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(axum::middleware::from_fn(routes::metrics::track))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state over `store` with in-memory collaborators.
pub fn create_default_state<S: Store>(store: S) -> Arc<AppState<S>> {
    let inventory = InMemoryInventory::new();
    let gateway = MockPaymentGateway::new();

    Arc::new(AppState {
        orders: OrderWorkflowService::new(store.clone(), inventory.clone(), LoggingNotifier),
        payments: PaymentWorkflowService::new(store.clone(), gateway, LoggingNotifier),
        coupons: CouponService::new(store),
        inventory,
    })
}
