// =============================================================================
// Execution — order routing interface with a full simulation implementation
// =============================================================================
//
// The engine trades unit quantity and never holds more than one position, so
// the execution surface stays small: place, cancel, inspect open orders,
// drain fills. `MockExecution` fills every order immediately at its limit or
// stop price with zero commission; a live implementation wires the same
// trait to a broker.
// =============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::EngineError;
use crate::types::Direction;

// ---------------------------------------------------------------------------
// Order model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Accepted,
    Filled,
    Rejected,
    Cancelled,
}

/// A unit-quantity order request. Prices are cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub direction: Direction,
    pub quantity: u32,
    pub order_type: OrderType,
    pub limit_price: Option<i64>,
    pub stop_price: Option<i64>,
}

/// Broker response to a placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderReceipt {
    pub order_id: String,
    pub status: OrderStatus,
    pub reason: Option<String>,
}

/// An execution report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: String,
    /// Cents.
    pub fill_price: i64,
    pub filled_quantity: u32,
    pub timestamp: i64,
    /// Cents; zero in simulation.
    pub commission: i64,
}

/// Order execution surface consumed by the session runner.
#[async_trait]
pub trait OrderExecutionProvider: Send + Sync {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderReceipt, EngineError>;
    async fn cancel_order(&self, order_id: &str) -> Result<(), EngineError>;
    fn open_orders(&self) -> Vec<OrderRequest>;
    /// Drain fills accumulated since the last call.
    fn take_fills(&self) -> Vec<Fill>;
}

// ---------------------------------------------------------------------------
// MockExecution
// ---------------------------------------------------------------------------

/// Simulated broker: every order fills instantly at its limit/stop price.
pub struct MockExecution {
    clock: Arc<dyn Clock>,
    fills: Mutex<Vec<Fill>>,
    placed: Mutex<Vec<(String, OrderRequest)>>,
}

impl MockExecution {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            fills: Mutex::new(Vec::new()),
            placed: Mutex::new(Vec::new()),
        }
    }

    /// Every order placed since construction, in order.
    pub fn order_log(&self) -> Vec<(String, OrderRequest)> {
        self.placed.lock().clone()
    }
}

#[async_trait]
impl OrderExecutionProvider for MockExecution {
    async fn place_order(&self, request: OrderRequest) -> Result<OrderReceipt, EngineError> {
        let Some(price) = request.limit_price.or(request.stop_price) else {
            return Ok(OrderReceipt {
                order_id: String::new(),
                status: OrderStatus::Rejected,
                reason: Some("simulated fill needs a limit or stop price".to_string()),
            });
        };

        let order_id = Uuid::new_v4().to_string();
        let fill = Fill {
            order_id: order_id.clone(),
            fill_price: price,
            filled_quantity: request.quantity,
            timestamp: self.clock.now_ms(),
            commission: 0,
        };

        info!(
            order_id = %order_id,
            symbol = %request.symbol,
            direction = %request.direction,
            price,
            quantity = request.quantity,
            "simulated fill"
        );

        self.placed.lock().push((order_id.clone(), request));
        self.fills.lock().push(fill);

        Ok(OrderReceipt {
            order_id,
            status: OrderStatus::Filled,
            reason: None,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), EngineError> {
        // Nothing rests on the simulated book; cancels are no-ops.
        debug!(order_id, "cancel ignored: simulated orders fill instantly");
        Ok(())
    }

    fn open_orders(&self) -> Vec<OrderRequest> {
        Vec::new()
    }

    fn take_fills(&self) -> Vec<Fill> {
        std::mem::take(&mut *self.fills.lock())
    }
}

// =============================================================================
// Tests
// =============================================================================
