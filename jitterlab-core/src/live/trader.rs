//! Per-symbol live routing.
//!
//! Each symbol owns its window and its [`TradeStatus`] behind its own mutex.
//! The symbol map is only write-locked to add a symbol, so feeds for
//! different symbols never wait on each other's updates.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::builder::FeatureBuilder;
use super::candle::{CandleError, CandleWindow};
use crate::domain::{Position, Symbol};
use crate::features::FeatureView;
use crate::strategy::{Policy, Tick, TradeStatus, Transition};

/// Order instruction handed to the execution collaborator on a position change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    /// Profit sign of the policy; `-1` inverts the economic direction.
    pub sizing_sign: f64,
    /// Sign of the position change: `+1` buys, `-1` sells.
    pub direction: i8,
    /// Position after the change.
    pub target: Position,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExecutionError {
    #[error("execution rejected for {symbol}: {reason}")]
    Rejected { symbol: Symbol, reason: String },
}

/// External order placement. The core never tracks fills.
pub trait TradeExecutor: Send + Sync {
    fn execute(&self, request: &ExecutionRequest) -> Result<(), ExecutionError>;
}

/// Executor that records every request; used for replay and tests.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        self.requests.lock().clone()
    }
}

impl TradeExecutor for RecordingExecutor {
    fn execute(&self, request: &ExecutionRequest) -> Result<(), ExecutionError> {
        self.requests.lock().push(request.clone());
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("{symbol}: {source}")]
    Candle {
        symbol: Symbol,
        #[source]
        source: CandleError,
    },
}

/// A position change the executor refused. The state machine has already
/// moved to `request.target`.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedExecution {
    pub request: ExecutionRequest,
    pub error: ExecutionError,
}

/// Execution requests produced by one observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceUpdate {
    pub issued: Vec<ExecutionRequest>,
    pub failed: Vec<FailedExecution>,
}

impl PriceUpdate {
    pub fn is_empty(&self) -> bool {
        self.issued.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug)]
struct SymbolSlot {
    candles: CandleWindow,
    status: TradeStatus,
}

pub struct LiveTrader<P, B, E> {
    policy: P,
    builder: B,
    executor: E,
    period: Duration,
    slots: RwLock<HashMap<Symbol, Arc<Mutex<SymbolSlot>>>>,
}

impl<P, B, E> LiveTrader<P, B, E>
where
    P: Policy,
    B: FeatureBuilder<Feature = P::Feature>,
    E: TradeExecutor,
{
    pub fn new(policy: P, builder: B, executor: E, period: Duration) -> Self {
        Self {
            policy,
            builder,
            executor,
            period,
            slots: RwLock::new(HashMap::new()),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    fn slot(&self, symbol: &str) -> Arc<Mutex<SymbolSlot>> {
        if let Some(slot) = self.slots.read().get(symbol) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write();
        let slot = slots.entry(symbol.to_string()).or_insert_with(|| {
            Arc::new(Mutex::new(SymbolSlot {
                candles: CandleWindow::new(self.period, self.builder.window()),
                status: TradeStatus::new(),
            }))
        });
        Arc::clone(slot)
    }

    /// Feed one observation of `symbol`. Runs one state-machine update per
    /// period it closes and returns the execution requests issued.
    ///
    /// A refused execution does not stop the remaining closed periods; it is
    /// reported in [`PriceUpdate::failed`].
    pub fn on_price(
        &self,
        symbol: &str,
        timestamp: DateTime<Utc>,
        price: f64,
    ) -> Result<PriceUpdate, LiveError> {
        let slot = self.slot(symbol);
        let mut slot = slot.lock();
        let closed = slot
            .candles
            .push(timestamp, price)
            .map_err(|source| LiveError::Candle {
                symbol: symbol.to_string(),
                source,
            })?;

        let mut update = PriceUpdate::default();
        for candle in closed {
            let Some(feature) = self.builder.build(symbol, candle.timestamp, &candle.window) else {
                continue;
            };
            if let Err(err) = feature.validate() {
                warn!(symbol, timestamp = %candle.timestamp, error = %err, "rejected malformed feature record");
                continue;
            }

            let before = slot.status.position;
            let transition = slot
                .status
                .update(Tick::new(candle.timestamp, &feature), &self.policy);
            if !transition.is_change() {
                continue;
            }
            let after = slot.status.position;
            let reason = match transition {
                Transition::Exited { reason, .. } => Some(reason),
                _ => None,
            };
            info!(
                symbol,
                policy = self.policy.name(),
                timestamp = %candle.timestamp,
                price = candle.value,
                from = before.as_i8(),
                to = after.as_i8(),
                ?reason,
                "position changed"
            );

            let request = ExecutionRequest {
                symbol: symbol.to_string(),
                timestamp: candle.timestamp,
                price: candle.value,
                sizing_sign: self.policy.profit_sign(),
                direction: transition.position_delta().signum(),
                target: after,
            };
            match self.executor.execute(&request) {
                Ok(()) => update.issued.push(request),
                Err(error) => {
                    warn!(symbol, timestamp = %candle.timestamp, %error, "execution failed");
                    update.failed.push(FailedExecution { request, error });
                }
            }
        }
        Ok(update)
    }

    pub fn status(&self, symbol: &str) -> Option<TradeStatus> {
        let slot = self.slots.read().get(symbol).cloned()?;
        let status = slot.lock().status.clone();
        Some(status)
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        let mut names: Vec<Symbol> = self.slots.read().keys().cloned().collect();
        names.sort();
        names
    }
}
