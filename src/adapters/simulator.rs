//! In-memory robot used for simulation and tests.
//!
//! `SimulatedRobot` plays the deck, the pipette and the liquid registry at
//! once. Every accepted call is appended to a command log that can be
//! serialized next to the run report.

use crate::domain::model::{Labware, LiquidId, Mount, NewTip, Platform, Position, WellId};
use crate::domain::ports::{Deck, Instrument, LiquidRegistry};
use crate::utils::error::{DeckError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

const ROW_LETTERS: &str = "ABCDEFGHIJKLMNOP";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    LoadLabware {
        load_name: String,
        slot: String,
    },
    LoadTrashBin {
        slot: String,
    },
    LoadInstrument {
        pipette: String,
        mount: Mount,
        tip_racks: Vec<String>,
    },
    PickUpTip {
        rack_slot: String,
        well: WellId,
    },
    DropTip,
    ResetTipracks,
    Transfer {
        volume_ul: f64,
        source: Position,
        destination: Position,
    },
    DefineLiquid {
        id: LiquidId,
        name: String,
        description: String,
        display_color: String,
    },
    LoadLiquid {
        liquid: LiquidId,
        position: Position,
        volume_ul: f64,
    },
}

/// Rows and columns of a labware, guessed from the well count embedded in
/// its load name (`nest_96_wellplate_100ul_pcr_full_skirt` -> 8 x 12).
pub fn well_grid(load_name: &str) -> (usize, usize) {
    let count = load_name
        .split('_')
        .filter_map(|token| token.parse::<usize>().ok())
        .find(|n| matches!(n, 1 | 6 | 12 | 24 | 48 | 96 | 384));

    match count {
        Some(1) => (1, 1),
        Some(6) => (2, 3),
        Some(12) if load_name.contains("reservoir") => (1, 12),
        Some(12) => (3, 4),
        Some(24) => (4, 6),
        Some(48) => (6, 8),
        Some(384) => (16, 24),
        _ => (8, 12),
    }
}

/// Wells of a labware in column-major order (A1, B1, ..., A2, ...).
pub fn labware_wells(load_name: &str) -> Vec<WellId> {
    let (rows, columns) = well_grid(load_name);
    (1..=columns as u32)
        .flat_map(|column| {
            ROW_LETTERS
                .chars()
                .take(rows)
                .map(move |row| WellId::new(row, column))
        })
        .collect()
}

#[derive(Debug, Default)]
struct RobotState {
    labware: BTreeMap<String, Labware>,
    trash: Option<String>,
    pipette: Option<String>,
    tip_racks: Vec<Labware>,
    next_tip: usize,
    tip_attached: bool,
    liquids: BTreeMap<String, String>,
    commands: Vec<Command>,
}

impl RobotState {
    fn occupant(&self, slot: &str) -> Option<String> {
        if self.trash.as_deref() == Some(slot) {
            return Some("trash bin".to_string());
        }
        self.labware.get(slot).map(|l| l.load_name.clone())
    }

    fn require_pipette(&self) -> Result<()> {
        if self.pipette.is_none() {
            return Err(DeckError::InstrumentError {
                message: "no pipette has been loaded".to_string(),
            });
        }
        Ok(())
    }

    fn require_position(&self, position: &Position) -> Result<()> {
        let labware =
            self.labware
                .get(&position.slot)
                .ok_or_else(|| DeckError::LabwareNotLoaded {
                    slot: position.slot.clone(),
                })?;
        if !labware.has_well(&position.well) {
            return Err(DeckError::WellNotFound {
                well: position.well.to_string(),
                labware: labware.load_name.clone(),
                slot: position.slot.clone(),
            });
        }
        Ok(())
    }

    fn pick_up_tip(&mut self) -> Result<()> {
        self.require_pipette()?;
        if self.tip_attached {
            return Err(DeckError::InstrumentError {
                message: "a tip is already attached".to_string(),
            });
        }

        let mut index = self.next_tip;
        let mut picked = None;
        for rack in &self.tip_racks {
            if index < rack.wells.len() {
                picked = Some((rack.slot.clone(), rack.wells[index].clone()));
                break;
            }
            index -= rack.wells.len();
        }
        let (rack_slot, well) = picked.ok_or_else(|| DeckError::InstrumentError {
            message: format!("out of tips after {} pick-ups", self.next_tip),
        })?;

        self.next_tip += 1;
        self.tip_attached = true;
        self.commands.push(Command::PickUpTip { rack_slot, well });
        Ok(())
    }

    fn drop_tip(&mut self) -> Result<()> {
        if !self.tip_attached {
            return Err(DeckError::InstrumentError {
                message: "no tip is attached".to_string(),
            });
        }
        self.tip_attached = false;
        self.commands.push(Command::DropTip);
        Ok(())
    }
}

pub struct SimulatedRobot {
    platform: Platform,
    state: Mutex<RobotState>,
}

impl SimulatedRobot {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            state: Mutex::new(RobotState::default()),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub async fn commands(&self) -> Vec<Command> {
        self.state.lock().await.commands.clone()
    }

    fn check_slot(&self, slot: &str) -> Result<()> {
        if !self.platform.deck_slots().contains(&slot) {
            return Err(DeckError::InvalidSlotError {
                slot: slot.to_string(),
                platform: self.platform.to_string(),
                reason: "no such deck slot".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Deck for SimulatedRobot {
    async fn is_occupied(&self, slot: &str) -> bool {
        self.state.lock().await.occupant(slot).is_some()
    }

    async fn load_labware(&self, load_name: &str, slot: &str) -> Result<Labware> {
        self.check_slot(slot)?;
        let mut state = self.state.lock().await;
        if let Some(existing) = state.occupant(slot) {
            return Err(DeckError::SlotConflictError {
                slot: slot.to_string(),
                existing,
                requested: load_name.to_string(),
            });
        }

        let labware = Labware {
            load_name: load_name.to_string(),
            slot: slot.to_string(),
            wells: labware_wells(load_name),
        };
        tracing::debug!(
            "Loaded {} ({} wells) in slot {}",
            load_name,
            labware.wells.len(),
            slot
        );
        state.labware.insert(slot.to_string(), labware.clone());
        state.commands.push(Command::LoadLabware {
            load_name: load_name.to_string(),
            slot: slot.to_string(),
        });
        Ok(labware)
    }

    async fn load_trash_bin(&self, slot: &str) -> Result<()> {
        self.check_slot(slot)?;
        let mut state = self.state.lock().await;
        if let Some(existing) = state.occupant(slot) {
            return Err(DeckError::SlotConflictError {
                slot: slot.to_string(),
                existing,
                requested: "trash bin".to_string(),
            });
        }
        state.trash = Some(slot.to_string());
        state.commands.push(Command::LoadTrashBin {
            slot: slot.to_string(),
        });
        Ok(())
    }

    async fn labware_at(&self, slot: &str) -> Option<Labware> {
        self.state.lock().await.labware.get(slot).cloned()
    }
}

#[async_trait]
impl Instrument for SimulatedRobot {
    async fn load(&self, pipette: &str, mount: Mount, tip_racks: &[Labware]) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(loaded) = &state.pipette {
            return Err(DeckError::InstrumentError {
                message: format!("pipette {} is already loaded", loaded),
            });
        }
        for rack in tip_racks {
            if !state.labware.contains_key(&rack.slot) {
                return Err(DeckError::LabwareNotLoaded {
                    slot: rack.slot.clone(),
                });
            }
        }

        state.pipette = Some(pipette.to_string());
        state.tip_racks = tip_racks.to_vec();
        state.next_tip = 0;
        state.commands.push(Command::LoadInstrument {
            pipette: pipette.to_string(),
            mount,
            tip_racks: tip_racks.iter().map(|r| r.slot.clone()).collect(),
        });
        Ok(())
    }

    async fn pick_up_tip(&self) -> Result<()> {
        self.state.lock().await.pick_up_tip()
    }

    async fn drop_tip(&self) -> Result<()> {
        self.state.lock().await.drop_tip()
    }

    async fn reset_tipracks(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.next_tip = 0;
        state.commands.push(Command::ResetTipracks);
        Ok(())
    }

    async fn has_tip(&self) -> bool {
        self.state.lock().await.tip_attached
    }

    async fn transfer(
        &self,
        volume_ul: f64,
        source: &Position,
        destination: &Position,
        new_tip: NewTip,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.require_pipette()?;
        state.require_position(source)?;
        state.require_position(destination)?;
        if !(volume_ul.is_finite() && volume_ul > 0.0) {
            return Err(DeckError::InstrumentError {
                message: format!("cannot transfer {} µl", volume_ul),
            });
        }

        match new_tip {
            NewTip::Never if !state.tip_attached => {
                return Err(DeckError::InstrumentError {
                    message: "transfer without a tip attached".to_string(),
                });
            }
            NewTip::Never => {}
            NewTip::Always => {
                if !state.tip_attached {
                    state.pick_up_tip()?;
                }
            }
        }

        state.commands.push(Command::Transfer {
            volume_ul,
            source: source.clone(),
            destination: destination.clone(),
        });

        if new_tip != NewTip::Never {
            state.drop_tip()?;
        }
        Ok(())
    }
}

#[async_trait]
impl LiquidRegistry for SimulatedRobot {
    async fn define_liquid(
        &self,
        name: &str,
        description: &str,
        display_color: &str,
    ) -> Result<LiquidId> {
        let mut state = self.state.lock().await;
        let id = LiquidId(format!("liquid-{}", state.liquids.len() + 1));
        state.liquids.insert(id.0.clone(), name.to_string());
        state.commands.push(Command::DefineLiquid {
            id: id.clone(),
            name: name.to_string(),
            description: description.to_string(),
            display_color: display_color.to_string(),
        });
        Ok(id)
    }

    async fn load_liquid(
        &self,
        position: &Position,
        liquid: &LiquidId,
        volume_ul: f64,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.liquids.contains_key(&liquid.0) {
            return Err(DeckError::InstrumentError {
                message: format!("liquid {} has not been defined", liquid.0),
            });
        }
        state.require_position(position)?;
        state.commands.push(Command::LoadLiquid {
            liquid: liquid.clone(),
            position: position.clone(),
            volume_ul,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_grid_from_load_name() {
        assert_eq!(well_grid("nest_96_wellplate_100ul_pcr_full_skirt"), (8, 12));
        assert_eq!(well_grid("nest_12_reservoir_15ml"), (1, 12));
        assert_eq!(well_grid("agilent_1_reservoir_290ml"), (1, 1));
        assert_eq!(well_grid("corning_384_wellplate_112ul_flat"), (16, 24));
        assert_eq!(well_grid("opentrons_24_tuberack_nest_1.5ml_snapcap"), (4, 6));
        assert_eq!(well_grid("custom_labware"), (8, 12));
    }

    #[test]
    fn test_wells_are_column_major() {
        let wells = labware_wells("nest_12_reservoir_15ml");
        assert_eq!(wells.len(), 12);
        assert_eq!(wells[1].to_string(), "A2");

        let wells = labware_wells("opentrons_96_tiprack_300ul");
        assert_eq!(wells[0].to_string(), "A1");
        assert_eq!(wells[1].to_string(), "B1");
        assert_eq!(wells[8].to_string(), "A2");
    }

    #[tokio::test]
    async fn test_slot_rules() {
        let robot = SimulatedRobot::new(Platform::Flex);
        robot.load_trash_bin("A3").await.unwrap();
        assert!(robot.is_occupied("A3").await);

        let err = robot.load_labware("nest_12_reservoir_15ml", "A3").await.unwrap_err();
        assert!(matches!(err, DeckError::SlotConflictError { .. }));

        let err = robot.load_labware("nest_12_reservoir_15ml", "4").await.unwrap_err();
        assert!(matches!(err, DeckError::InvalidSlotError { .. }));

        robot.load_labware("nest_12_reservoir_15ml", "D1").await.unwrap();
        assert_eq!(
            robot.labware_at("D1").await.unwrap().load_name,
            "nest_12_reservoir_15ml"
        );
    }

    #[tokio::test]
    async fn test_tips_run_out_and_reset() {
        let robot = SimulatedRobot::new(Platform::Ot2);
        let rack = robot
            .load_labware("opentrons_1_tiprack_test", "1")
            .await
            .unwrap();
        robot.load("p300_single_gen2", Mount::Left, &[rack]).await.unwrap();

        robot.pick_up_tip().await.unwrap();
        assert!(robot.has_tip().await);
        robot.drop_tip().await.unwrap();
        assert!(robot.pick_up_tip().await.is_err());

        robot.reset_tipracks().await.unwrap();
        robot.pick_up_tip().await.unwrap();

        let picks = robot
            .commands()
            .await
            .into_iter()
            .filter(|c| matches!(c, Command::PickUpTip { .. }))
            .count();
        assert_eq!(picks, 2);
    }

    #[tokio::test]
    async fn test_transfer_without_tip_is_rejected() {
        let robot = SimulatedRobot::new(Platform::Ot2);
        let plate = robot
            .load_labware("nest_96_wellplate_100ul_pcr_full_skirt", "2")
            .await
            .unwrap();
        let rack = robot
            .load_labware("opentrons_96_tiprack_300ul", "3")
            .await
            .unwrap();
        robot.load("p300_single_gen2", Mount::Right, &[rack]).await.unwrap();

        let a1 = plate.position(&"A1".parse().unwrap()).unwrap();
        let b1 = plate.position(&"B1".parse().unwrap()).unwrap();
        assert!(robot.transfer(10.0, &a1, &b1, NewTip::Never).await.is_err());

        robot.transfer(10.0, &a1, &b1, NewTip::Always).await.unwrap();
        assert!(!robot.has_tip().await);
    }

    #[tokio::test]
    async fn test_liquid_must_be_defined_before_loading() {
        let robot = SimulatedRobot::new(Platform::Ot2);
        let plate = robot
            .load_labware("nest_96_wellplate_100ul_pcr_full_skirt", "1")
            .await
            .unwrap();
        let a1 = plate.position(&"A1".parse().unwrap()).unwrap();

        let unknown = LiquidId("liquid-9".to_string());
        assert!(robot.load_liquid(&a1, &unknown, 10.0).await.is_err());

        let water = robot.define_liquid("Water", "clean", "#0000FF").await.unwrap();
        robot.load_liquid(&a1, &water, 10.0).await.unwrap();
        assert_eq!(robot.commands().await.len(), 3);
    }
}
