use crate::domain::ports::{Instrument, Operator};
use crate::utils::error::{DeckError, Result};
use serde::Serialize;

pub const REFILL_MESSAGE: &str = "Please refill tipracks before resuming.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Ready,
    Exhausted,
}

/// Tips drawn since the racks were last (re)filled, out of `capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConsumableState {
    pub count: usize,
    pub capacity: usize,
}

/// Tip usage tracker for one run.
///
/// `acquire` pauses for a refill once every tip has been drawn, then resets
/// the count; `release` only drops the tip and never gives capacity back.
#[derive(Debug, Clone)]
pub struct ConsumableLifecycle {
    state: ConsumableState,
    phase: LifecycleState,
    held: bool,
    acquisitions: usize,
    pauses: usize,
}

impl ConsumableLifecycle {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: ConsumableState { count: 0, capacity },
            phase: LifecycleState::Ready,
            held: false,
            acquisitions: 0,
            pauses: 0,
        }
    }

    pub fn state(&self) -> ConsumableState {
        self.state
    }

    pub fn phase(&self) -> LifecycleState {
        self.phase
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions
    }

    pub fn pauses(&self) -> usize {
        self.pauses
    }

    pub async fn acquire<I, O>(&mut self, instrument: &I, operator: &O) -> Result<()>
    where
        I: Instrument + ?Sized,
        O: Operator + ?Sized,
    {
        if self.state.capacity == 0 {
            return Err(DeckError::CapacityError {
                message: "no tips are available for this run".to_string(),
            });
        }
        if self.held {
            return Err(DeckError::InstrumentError {
                message: "cannot pick up a tip while one is already attached".to_string(),
            });
        }

        if self.state.count >= self.state.capacity {
            self.phase = LifecycleState::Exhausted;
            self.pauses += 1;
            tracing::warn!(
                "All {} tips used, waiting for the operator to refill",
                self.state.capacity
            );
            operator.pause(REFILL_MESSAGE).await?;
            instrument.reset_tipracks().await?;
            self.state.count = 0;
            self.phase = LifecycleState::Ready;
            tracing::info!("Tip racks refilled, resuming");
        }

        instrument.pick_up_tip().await?;
        self.state.count += 1;
        self.acquisitions += 1;
        self.held = true;
        tracing::debug!("Tip {}/{} picked up", self.state.count, self.state.capacity);
        Ok(())
    }

    pub async fn release<I>(&mut self, instrument: &I) -> Result<()>
    where
        I: Instrument + ?Sized,
    {
        instrument.drop_tip().await?;
        self.held = false;
        Ok(())
    }
}
