use crate::domain::model::{LiquidDestination, ResourceSlot, WellId};
use crate::utils::error::{DeckError, Result};
use std::collections::BTreeSet;

/// Liquid destinations accepted so far, guaranteed not to claim the same
/// well twice within one labware/slot.
#[derive(Debug, Clone, Default)]
pub struct DestinationRegistry {
    destinations: Vec<LiquidDestination>,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject `destination` if any of its wells is already claimed in the
    /// same labware and slot; otherwise append it.
    pub fn register(&mut self, destination: LiquidDestination) -> Result<()> {
        let overlap: BTreeSet<WellId> = self
            .reserved_wells(&destination.key())
            .intersection(&destination.wells)
            .cloned()
            .collect();

        if !overlap.is_empty() {
            return Err(DeckError::ConflictError {
                wells: overlap,
                labware: destination.labware,
                slot: destination.slot,
            });
        }

        tracing::debug!(
            "Registered '{}' in {} wells of {} at slot {}",
            destination.name,
            destination.wells.len(),
            destination.labware,
            destination.slot
        );
        self.destinations.push(destination);
        Ok(())
    }

    pub fn destinations(&self) -> &[LiquidDestination] {
        &self.destinations
    }

    pub fn into_destinations(self) -> Vec<LiquidDestination> {
        self.destinations
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }

    /// Wells claimed so far in one labware/slot.
    pub fn reserved_wells(&self, key: &ResourceSlot) -> BTreeSet<WellId> {
        self.destinations
            .iter()
            .filter(|d| &d.key() == key)
            .flat_map(|d| d.wells.iter().cloned())
            .collect()
    }
}
