//! HTTP API server and topology wiring for the order saga system.
//!
//! Provides the submit-order entry point plus status, history and saga-state
//! queries, with structured logging (tracing) and Prometheus metrics. The
//! default topology runs every service in-process over the in-memory bus and
//! stores; each service still owns its own store and talks to the others only
//! through messages.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use inventory::{InventoryService, InventoryState};
use messaging::{InMemoryBus, MessageBus, topics};
use metrics_exporter_prometheus::PrometheusHandle;
use orders::{OrderService, OrdersState, SagaOrchestrator};
use payments::{PaymentService, PaymentsState};
use storage::{InMemoryStore, OutboxRelay, TransactionalStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// The store type the default topology runs on.
pub type DefaultStore<S> = InMemoryStore<S>;

/// Background moving parts of the default topology: the bus, one outbox relay
/// per service store, and handles to the collaborating services.
pub struct SagaRuntime {
    pub bus: InMemoryBus,
    pub inventory: InventoryService<DefaultStore<InventoryState>>,
    pub payments: PaymentService<DefaultStore<PaymentsState>>,
    orders_relay: OutboxRelay<DefaultStore<OrdersState>, InMemoryBus>,
    inventory_relay: OutboxRelay<DefaultStore<InventoryState>, InMemoryBus>,
    payments_relay: OutboxRelay<DefaultStore<PaymentsState>, InMemoryBus>,
}

impl SagaRuntime {
    /// Pumps relays and bus until the system is quiescent. Returns the number
    /// of messages moved. Used by tests and by anything that wants
    /// deterministic settlement instead of background tasks.
    pub async fn settle(&self) -> usize {
        let mut total = 0;
        loop {
            let mut progress = 0;
            progress += self.orders_relay.run_once().await.unwrap_or(0);
            progress += self.inventory_relay.run_once().await.unwrap_or(0);
            progress += self.payments_relay.run_once().await.unwrap_or(0);
            progress += self.bus.deliver_pending().await;
            if progress == 0 {
                break;
            }
            total += progress;
        }
        total
    }

    /// Spawns the relay loops and the bus dispatcher as background tasks.
    pub fn spawn(
        self,
        relay_interval: Duration,
        bus_poll_interval: Duration,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            tokio::spawn(self.orders_relay.run(relay_interval)),
            tokio::spawn(self.inventory_relay.run(relay_interval)),
            tokio::spawn(self.payments_relay.run(relay_interval)),
            tokio::spawn(self.bus.run(bus_poll_interval)),
        ]
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<St>(state: Arc<AppState<St>>, metrics_handle: PrometheusHandle) -> Router
where
    St: TransactionalStore<OrdersState> + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::place::<St>))
        .route("/orders/{id}", get(routes::orders::get::<St>))
        .route("/orders/{id}/history", get(routes::orders::history::<St>))
        .route("/orders/{id}/saga", get(routes::orders::saga_status::<St>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the default in-process topology: three stores, their services, the
/// orchestrator's subscriptions and one relay per store.
pub async fn create_default_state() -> (Arc<AppState<DefaultStore<OrdersState>>>, SagaRuntime) {
    let bus = InMemoryBus::new();

    let orders_store: DefaultStore<OrdersState> = InMemoryStore::new();
    let inventory_store: DefaultStore<InventoryState> = InMemoryStore::new();
    let payments_store: DefaultStore<PaymentsState> = InMemoryStore::new();

    let order_service = OrderService::new(orders_store.clone());
    let inventory = InventoryService::new(inventory_store.clone());
    let payments = PaymentService::new(payments_store.clone());
    let orchestrator = Arc::new(SagaOrchestrator::new(orders_store.clone()));

    // Subscriptions on the in-memory bus are infallible.
    let _ = bus
        .subscribe(topics::ORDERS_EVENTS, orchestrator.clone())
        .await;
    let _ = bus
        .subscribe(topics::PRODUCTS_EVENTS, orchestrator.clone())
        .await;
    let _ = bus.subscribe(topics::PAYMENTS_EVENTS, orchestrator).await;
    let _ = bus
        .subscribe(topics::PRODUCTS_COMMANDS, Arc::new(inventory.clone()))
        .await;
    let _ = bus
        .subscribe(topics::PAYMENTS_COMMANDS, Arc::new(payments.clone()))
        .await;

    let runtime = SagaRuntime {
        orders_relay: OutboxRelay::new(orders_store, bus.clone()),
        inventory_relay: OutboxRelay::new(inventory_store, bus.clone()),
        payments_relay: OutboxRelay::new(payments_store, bus.clone()),
        bus,
        inventory,
        payments,
    };

    let state = Arc::new(AppState { order_service });

    (state, runtime)
}
