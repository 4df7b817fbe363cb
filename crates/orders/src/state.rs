//! Durable state of the orders service.

use std::collections::HashMap;

use common::OrderId;
use serde::{Deserialize, Serialize};
use storage::{HistoryEntry, HistoryLog};

use crate::record::Order;
use crate::saga::SagaInstance;
use crate::status::OrderStatus;

/// Everything the orders service persists: the order records, the append-only
/// history log, and the saga instances the orchestrator drives.
///
/// All three live in one transactional store so an orchestrator transition
/// mutates the order, appends history and advances the saga in a single local
/// transaction, together with any commands it emits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrdersState {
    orders: HashMap<OrderId, Order>,
    history: HistoryLog<OrderStatus>,
    sagas: HashMap<OrderId, SagaInstance>,
}

impl OrdersState {
    /// Saves (or replaces) an order record.
    pub fn save_order(&mut self, order: Order) {
        self.orders.insert(order.order_id, order);
    }

    /// Returns an order by id.
    pub fn order(&self, order_id: OrderId) -> Option<&Order> {
        self.orders.get(&order_id)
    }

    /// Updates an order's status. Returns false if the order is unknown.
    pub fn set_status(&mut self, order_id: OrderId, status: OrderStatus) -> bool {
        match self.orders.get_mut(&order_id) {
            Some(order) => {
                order.status = status;
                true
            }
            None => false,
        }
    }

    /// Appends a status snapshot to the order's history. Returns the entry id.
    pub fn append_history(&mut self, order_id: OrderId, status: OrderStatus) -> u64 {
        self.history.append(order_id, status)
    }

    /// Returns the history entries for an order, in write order.
    pub fn history_for(&self, order_id: OrderId) -> Vec<HistoryEntry<OrderStatus>> {
        self.history.list_by_order(order_id)
    }

    /// Saves (or replaces) a saga instance.
    pub fn save_saga(&mut self, saga: SagaInstance) {
        self.sagas.insert(saga.order_id(), saga);
    }

    /// Returns the saga instance for an order.
    pub fn saga(&self, order_id: OrderId) -> Option<&SagaInstance> {
        self.sagas.get(&order_id)
    }
}
