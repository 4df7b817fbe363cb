//! Order placement and read-side queries.

use common::{CustomerId, Money, OrderId, ProductId};
use contracts::{OrderCreated, OrderEvent};
use storage::{HistoryEntry, TransactionalStore};

use crate::error::OrderError;
use crate::record::Order;
use crate::saga::SagaState;
use crate::state::OrdersState;
use crate::status::OrderStatus;

/// Request to place a new order.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// The order state holder.
///
/// `place_order` is the system's single entry point: it persists the CREATED
/// record and stages the `OrderCreated` event in one transaction. Everything
/// after that is driven by the orchestrator reacting to domain events.
pub struct OrderService<St> {
    store: St,
}

impl<St> Clone for OrderService<St>
where
    St: Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<St> OrderService<St>
where
    St: TransactionalStore<OrdersState>,
{
    /// Creates a service over the orders store.
    pub fn new(store: St) -> Self {
        Self { store }
    }

    /// Persists a new order and transactionally publishes `OrderCreated`.
    #[tracing::instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn place_order(&self, request: PlaceOrder) -> Result<Order, OrderError> {
        if request.quantity == 0 {
            return Err(OrderError::InvalidQuantity(request.quantity));
        }
        if request.unit_price.is_negative() {
            return Err(OrderError::InvalidPrice(request.unit_price));
        }

        let order = Order {
            order_id: OrderId::new(),
            customer_id: request.customer_id,
            product_id: request.product_id.clone(),
            quantity: request.quantity,
            total: request.unit_price.multiply(request.quantity),
            status: OrderStatus::Created,
        };

        let stored = order.clone();
        self.store
            .with_transaction(move |tx| {
                let event = OrderEvent::Created(OrderCreated {
                    order_id: stored.order_id,
                    customer_id: stored.customer_id,
                    product_id: stored.product_id.clone(),
                    quantity: stored.quantity,
                    unit_price: request.unit_price,
                })
                .into_envelope()?;
                tx.state_mut().save_order(stored);
                tx.publish(event);
                Ok(())
            })
            .await?;

        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(order_id = %order.order_id, total = %order.total, "order placed");
        Ok(order)
    }

    /// Returns an order by id.
    pub async fn order(&self, order_id: OrderId) -> Result<Option<Order>, OrderError> {
        Ok(self
            .store
            .query(move |state| state.order(order_id).cloned())
            .await?)
    }

    /// Returns the order's history, in write order.
    pub async fn history(
        &self,
        order_id: OrderId,
    ) -> Result<Vec<HistoryEntry<OrderStatus>>, OrderError> {
        Ok(self
            .store
            .query(move |state| state.history_for(order_id))
            .await?)
    }

    /// Returns the saga state for an order, if a saga has started.
    pub async fn saga_state(&self, order_id: OrderId) -> Result<Option<SagaState>, OrderError> {
        Ok(self
            .store
            .query(move |state| state.saga(order_id).map(|saga| saga.state()))
            .await?)
    }
}
