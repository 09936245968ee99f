use crate::domain::model::{LiquidDestination, LoadedConsumable, Platform, ResourceSlot, Transfer};
use crate::utils::error::{DeckError, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Records that reference labware on the deck.
pub trait RequiresSlots {
    fn resource_slots(&self) -> Vec<ResourceSlot>;
}

impl RequiresSlots for Transfer {
    fn resource_slots(&self) -> Vec<ResourceSlot> {
        vec![
            ResourceSlot::new(self.source.labware.clone(), self.source.slot.clone()),
            ResourceSlot::new(
                self.destination.labware.clone(),
                self.destination.slot.clone(),
            ),
        ]
    }
}

impl RequiresSlots for LiquidDestination {
    fn resource_slots(&self) -> Vec<ResourceSlot> {
        vec![self.key()]
    }
}

/// Every distinct `(labware, slot)` the batch references.
pub fn required_slots<R: RequiresSlots>(records: &[R]) -> BTreeSet<ResourceSlot> {
    records.iter().flat_map(|r| r.resource_slots()).collect()
}

/// The platform's slots in canonical order plus the slots held back from
/// consumable assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckSlotSequence {
    platform: Platform,
    reserved: BTreeSet<String>,
}

impl DeckSlotSequence {
    pub fn new(platform: Platform, reserved: Option<&str>) -> Result<Self> {
        let mut set = BTreeSet::new();
        if let Some(slot) = reserved {
            if !platform.deck_slots().contains(&slot) {
                return Err(DeckError::InvalidSlotError {
                    slot: slot.to_string(),
                    platform: platform.to_string(),
                    reason: "the reserved slot is not part of this deck".to_string(),
                });
            }
            set.insert(slot.to_string());
        }
        Ok(Self {
            platform,
            reserved: set,
        })
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn slots(&self) -> &'static [&'static str] {
        self.platform.deck_slots()
    }

    pub fn reserved(&self) -> &BTreeSet<String> {
        &self.reserved
    }

    pub fn index_of(&self, slot: &str) -> Option<usize> {
        self.slots().iter().position(|s| *s == slot)
    }

    /// Check every requested load against the deck and return the loads in
    /// canonical slot order.
    pub fn order_loads(&self, loads: &BTreeSet<ResourceSlot>) -> Result<Vec<ResourceSlot>> {
        let mut by_slot: BTreeMap<usize, &ResourceSlot> = BTreeMap::new();
        for load in loads {
            let idx = self
                .index_of(&load.slot)
                .ok_or_else(|| DeckError::InvalidSlotError {
                    slot: load.slot.clone(),
                    platform: self.platform.to_string(),
                    reason: format!("valid slots are {}", self.slots().join(", ")),
                })?;
            if self.reserved.contains(&load.slot) {
                return Err(DeckError::InvalidSlotError {
                    slot: load.slot.clone(),
                    platform: self.platform.to_string(),
                    reason: "the slot is reserved for the trash".to_string(),
                });
            }
            if let Some(existing) = by_slot.insert(idx, load) {
                return Err(DeckError::SlotConflictError {
                    slot: load.slot.clone(),
                    existing: existing.labware.clone(),
                    requested: load.labware.clone(),
                });
            }
        }
        Ok(by_slot.into_values().cloned().collect())
    }
}

/// One consumable rack in every slot that is neither occupied nor
/// reserved, in canonical slot order.
pub fn assign_consumables(
    sequence: &DeckSlotSequence,
    occupied: &BTreeSet<String>,
    consumable_type: &str,
    reserved: &BTreeSet<String>,
) -> Vec<LoadedConsumable> {
    sequence
        .slots()
        .iter()
        .filter(|slot| !occupied.contains(**slot) && !reserved.contains(**slot))
        .map(|slot| LoadedConsumable {
            slot: slot.to_string(),
            load_name: consumable_type.to_string(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsumablePlan {
    pub racks: Vec<LoadedConsumable>,
    pub capacity: usize,
}

/// Assign racks around the occupied slots and reject a run that would have
/// no tips at all.
pub fn plan_consumables(
    sequence: &DeckSlotSequence,
    occupied: &BTreeSet<String>,
    consumable_type: &str,
    positions_per_rack: usize,
) -> Result<ConsumablePlan> {
    let racks = assign_consumables(sequence, occupied, consumable_type, sequence.reserved());
    let capacity = racks.len() * positions_per_rack;
    if capacity == 0 {
        return Err(DeckError::CapacityError {
            message: format!(
                "no free slot is left for {} on the {} deck ({} occupied, {} reserved)",
                consumable_type,
                sequence.platform(),
                occupied.len(),
                sequence.reserved().len()
            ),
        });
    }
    tracing::debug!(
        "Assigned {} {} racks, capacity {}",
        racks.len(),
        consumable_type,
        capacity
    );
    Ok(ConsumablePlan { racks, capacity })
}
