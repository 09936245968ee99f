use crate::app::protocols::write_report;
use crate::config::run_config::RunConfig;
use crate::core::allocator::required_slots;
use crate::core::mapper::parse_table;
use crate::core::registry::DestinationRegistry;
use crate::domain::model::{LiquidDestination, ResourceSlot, RunReport};
use crate::domain::ports::{Deck, LiquidRegistry, Operator, Protocol, Storage};
use crate::utils::error::{DeckError, Result};
use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LiquidPlan {
    pub destinations: Vec<LiquidDestination>,
    pub labware: Vec<ResourceSlot>,
}

impl LiquidPlan {
    pub fn wells(&self) -> usize {
        self.destinations.iter().map(|d| d.wells.len()).sum()
    }

    pub fn total_volume_ul(&self) -> f64 {
        self.destinations
            .iter()
            .map(|d| d.volume_ul * d.wells.len() as f64)
            .sum()
    }
}

/// Declares named liquids and their starting volumes in labware wells.
pub struct LiquidSetupProtocol<S, D, L, O> {
    storage: S,
    config: RunConfig,
    input_path: String,
    deck: Arc<D>,
    liquids: Arc<L>,
    operator: Arc<O>,
}

impl<S, D, L, O> LiquidSetupProtocol<S, D, L, O>
where
    S: Storage,
    D: Deck,
    L: LiquidRegistry,
    O: Operator,
{
    pub fn new(
        storage: S,
        config: RunConfig,
        input_path: impl Into<String>,
        deck: Arc<D>,
        liquids: Arc<L>,
        operator: Arc<O>,
    ) -> Self {
        Self {
            storage,
            config,
            input_path: input_path.into(),
            deck,
            liquids,
            operator,
        }
    }

    fn base_report(&self, plan: &LiquidPlan) -> RunReport {
        let mut report = RunReport::new(&self.config.protocol.name, self.config.platform());
        report.labware = plan.labware.clone();
        report.liquids = plan.destinations.len();
        report.wells_filled = plan.wells();
        report.total_volume_ul = plan.total_volume_ul();
        report
    }
}

#[async_trait]
impl<S, D, L, O> Protocol for LiquidSetupProtocol<S, D, L, O>
where
    S: Storage,
    D: Deck,
    L: LiquidRegistry,
    O: Operator,
{
    type Record = LiquidDestination;
    type Plan = LiquidPlan;

    fn name(&self) -> &str {
        &self.config.protocol.name
    }

    async fn extract(&self) -> Result<Vec<LiquidDestination>> {
        tracing::debug!("Reading liquid destinations from {}", self.input_path);
        let bytes = self.storage.read_file(&self.input_path).await?;
        parse_table(
            &bytes,
            self.config.transfer.header_mode,
            self.config.mapping_options(),
        )
    }

    fn plan(&self, destinations: Vec<LiquidDestination>) -> Result<LiquidPlan> {
        let mut registry = DestinationRegistry::new();
        for destination in destinations {
            registry.register(destination)?;
        }
        let destinations = registry.into_destinations();

        let sequence = self.config.slot_sequence()?;
        let labware = sequence.order_loads(&required_slots(&destinations))?;
        tracing::info!(
            "Planned {} liquids over {} labware",
            destinations.len(),
            labware.len()
        );
        Ok(LiquidPlan {
            destinations,
            labware,
        })
    }

    fn preview(&self, plan: &LiquidPlan) -> RunReport {
        self.base_report(plan)
    }

    async fn execute(&self, plan: LiquidPlan) -> Result<RunReport> {
        for item in &plan.labware {
            self.deck.load_labware(&item.labware, &item.slot).await?;
        }

        for destination in &plan.destinations {
            let labware = self.deck.labware_at(&destination.slot).await.ok_or_else(|| {
                DeckError::LabwareNotLoaded {
                    slot: destination.slot.clone(),
                }
            })?;
            let liquid = self
                .liquids
                .define_liquid(
                    &destination.name,
                    &destination.description,
                    &destination.display_color,
                )
                .await?;

            for well in &destination.wells {
                let position =
                    labware
                        .position(well)
                        .ok_or_else(|| DeckError::WellNotFound {
                            well: well.to_string(),
                            labware: labware.load_name.clone(),
                            slot: destination.slot.clone(),
                        })?;
                self.liquids
                    .load_liquid(&position, &liquid, destination.volume_ul)
                    .await?;
            }

            self.operator.comment(&format!(
                "Loaded {} µl of {} into {} wells of {} at slot {}",
                destination.volume_ul,
                destination.name,
                destination.wells.len(),
                destination.labware,
                destination.slot
            ));
        }

        Ok(self.base_report(&plan))
    }

    async fn publish(&self, report: &RunReport) -> Result<Option<String>> {
        write_report(&self.storage, &self.config, report).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AutoResumeOperator, Command, SimulatedRobot};
    use std::collections::HashMap;

    struct StaticStorage {
        files: HashMap<String, Vec<u8>>,
    }

    impl StaticStorage {
        fn with(path: &str, content: &str) -> Self {
            Self {
                files: [(path.to_string(), content.as_bytes().to_vec())]
                    .into_iter()
                    .collect(),
            }
        }
    }

    impl Storage for StaticStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            self.files.get(path).cloned().ok_or_else(|| {
                DeckError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, _path: &str, _data: &[u8]) -> Result<()> {
            Ok(())
        }
    }

    const HEADER: &str = "labware_load_name,slot,wells,name,description,display_color,volume";

    fn protocol(
        csv: &str,
    ) -> (
        LiquidSetupProtocol<StaticStorage, SimulatedRobot, SimulatedRobot, AutoResumeOperator>,
        Arc<SimulatedRobot>,
    ) {
        let config = RunConfig::default();
        let robot = Arc::new(SimulatedRobot::new(config.platform()));
        let protocol = LiquidSetupProtocol::new(
            StaticStorage::with("liquids.csv", csv),
            config,
            "liquids.csv",
            robot.clone(),
            robot.clone(),
            Arc::new(AutoResumeOperator::new()),
        );
        (protocol, robot)
    }

    #[tokio::test]
    async fn test_liquids_are_defined_and_loaded_per_well() {
        let csv = format!(
            "{HEADER}\n\
             nest_96_wellplate_100ul_pcr_full_skirt,1,A1;B1,Water,clean water,#0000A6,40\n\
             nest_96_wellplate_100ul_pcr_full_skirt,1,C1,Dye,blue dye,#1CE6FF,20\n\
             nest_12_reservoir_15ml,3,A1,Buffer,wash buffer,#FF34FF,100\n"
        );
        let (protocol, robot) = protocol(&csv);

        let plan = protocol.plan(protocol.extract().await.unwrap()).unwrap();
        assert_eq!(plan.labware.len(), 2);
        let report = protocol.execute(plan).await.unwrap();
        assert_eq!(report.liquids, 3);
        assert_eq!(report.wells_filled, 4);
        assert_eq!(report.total_volume_ul, 200.0);

        let commands = robot.commands().await;
        let defined = commands
            .iter()
            .filter(|c| matches!(c, Command::DefineLiquid { .. }))
            .count();
        let loaded = commands
            .iter()
            .filter(|c| matches!(c, Command::LoadLiquid { .. }))
            .count();
        assert_eq!(defined, 3);
        assert_eq!(loaded, 4);
    }

    #[tokio::test]
    async fn test_overlap_fails_before_any_labware_is_loaded() {
        let csv = format!(
            "{HEADER}\n\
             plate_96,1,A1;B1,Water,clean water,#0000A6,40\n\
             plate_96,1,B1;C1,Dye,blue dye,#1CE6FF,20\n"
        );
        let (protocol, robot) = protocol(&csv);

        let err = protocol
            .plan(protocol.extract().await.unwrap())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Wells {B1} in labware plate_96 at slot 1 have already been defined"
        );
        assert!(robot.commands().await.is_empty());
    }
}
