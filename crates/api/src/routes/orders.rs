//! Order submission and read-side endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, ProductId};
use orders::{OrderService, OrdersState, PlaceOrder};
use serde::{Deserialize, Serialize};
use storage::TransactionalStore;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<St> {
    pub order_service: OrderService<St>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub customer_id: Option<String>,
    pub product_id: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderAcceptedResponse {
    pub order_id: String,
    pub status: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub customer_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub total_cents: i64,
    pub status: String,
}

#[derive(Serialize)]
pub struct HistoryEntryResponse {
    pub entry_id: u64,
    pub status: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct SagaStatusResponse {
    pub order_id: String,
    pub state: String,
}

fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    let uuid = uuid::Uuid::parse_str(raw)
        .map_err(|e| ApiError::BadRequest(format!("invalid order id: {e}")))?;
    Ok(OrderId::from_uuid(uuid))
}

// -- Handlers --

/// POST /orders — submit an order. The saga runs asynchronously; the response
/// only acknowledges acceptance.
#[tracing::instrument(skip(state, req))]
pub async fn place<St>(
    State(state): State<Arc<AppState<St>>>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderAcceptedResponse>), ApiError>
where
    St: TransactionalStore<OrdersState> + 'static,
{
    let customer_id = match &req.customer_id {
        Some(raw) => {
            let uuid = uuid::Uuid::parse_str(raw)
                .map_err(|e| ApiError::BadRequest(format!("invalid customer_id: {e}")))?;
            CustomerId::from_uuid(uuid)
        }
        None => CustomerId::new(),
    };

    let order = state
        .order_service
        .place_order(PlaceOrder {
            customer_id,
            product_id: ProductId::new(req.product_id),
            quantity: req.quantity,
            unit_price: Money::from_cents(req.unit_price_cents),
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(OrderAcceptedResponse {
            order_id: order.order_id.to_string(),
            status: order.status.to_string(),
        }),
    ))
}

/// GET /orders/{id} — current order status.
pub async fn get<St>(
    State(state): State<Arc<AppState<St>>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError>
where
    St: TransactionalStore<OrdersState> + 'static,
{
    let order_id = parse_order_id(&id)?;
    let order = state
        .order_service
        .order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {order_id} not found")))?;

    Ok(Json(OrderResponse {
        order_id: order.order_id.to_string(),
        customer_id: order.customer_id.to_string(),
        product_id: order.product_id.to_string(),
        quantity: order.quantity,
        total_cents: order.total.cents(),
        status: order.status.to_string(),
    }))
}

/// GET /orders/{id}/history — the order's full lifecycle, in write order.
pub async fn history<St>(
    State(state): State<Arc<AppState<St>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<HistoryEntryResponse>>, ApiError>
where
    St: TransactionalStore<OrdersState> + 'static,
{
    let order_id = parse_order_id(&id)?;
    let entries = state.order_service.history(order_id).await?;

    Ok(Json(
        entries
            .into_iter()
            .map(|e| HistoryEntryResponse {
                entry_id: e.entry_id,
                status: e.status.to_string(),
                recorded_at: e.recorded_at,
            })
            .collect(),
    ))
}

/// GET /orders/{id}/saga — current saga state for the order.
pub async fn saga_status<St>(
    State(state): State<Arc<AppState<St>>>,
    Path(id): Path<String>,
) -> Result<Json<SagaStatusResponse>, ApiError>
where
    St: TransactionalStore<OrdersState> + 'static,
{
    let order_id = parse_order_id(&id)?;
    let saga_state = state
        .order_service
        .saga_state(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no saga for order {order_id}")))?;

    Ok(Json(SagaStatusResponse {
        order_id: order_id.to_string(),
        state: saga_state.to_string(),
    }))
}
