use crate::app::protocols::write_report;
use crate::config::run_config::{RunConfig, TIP_RACK_POSITIONS};
use crate::core::allocator::{plan_consumables, required_slots, ConsumablePlan};
use crate::core::executor::TransferExecutor;
use crate::core::mapper::parse_table;
use crate::domain::model::{ReusePolicy, ResourceSlot, RunReport, Transfer};
use crate::domain::ports::{Deck, Instrument, Operator, Protocol, Storage};
use crate::utils::error::{DeckError, Result};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Everything a cherrypicking run needs, worked out before the robot is
/// touched.
#[derive(Debug, Clone)]
pub struct CherrypickPlan {
    pub transfers: Vec<Transfer>,
    pub labware: Vec<ResourceSlot>,
    pub tips: ConsumablePlan,
    pub trash_slot: Option<String>,
}

impl CherrypickPlan {
    /// Tips the run will draw under `policy`.
    pub fn tips_needed(&self, policy: ReusePolicy) -> usize {
        match policy {
            ReusePolicy::Always => self.transfers.len(),
            ReusePolicy::Never => usize::from(!self.transfers.is_empty()),
        }
    }
}

pub struct CherrypickProtocol<S, D, I, O> {
    storage: S,
    config: RunConfig,
    input_path: String,
    deck: Arc<D>,
    instrument: Arc<I>,
    operator: Arc<O>,
}

impl<S, D, I, O> CherrypickProtocol<S, D, I, O>
where
    S: Storage,
    D: Deck,
    I: Instrument,
    O: Operator,
{
    pub fn new(
        storage: S,
        config: RunConfig,
        input_path: impl Into<String>,
        deck: Arc<D>,
        instrument: Arc<I>,
        operator: Arc<O>,
    ) -> Self {
        Self {
            storage,
            config,
            input_path: input_path.into(),
            deck,
            instrument,
            operator,
        }
    }

    fn base_report(&self, plan: &CherrypickPlan) -> RunReport {
        let mut report = RunReport::new(&self.config.protocol.name, self.config.platform());
        report.labware = plan.labware.clone();
        report.tip_racks = plan.tips.racks.clone();
        report.tip_capacity = plan.tips.capacity;
        report.transfers = plan.transfers.len();
        report.total_volume_ul = plan.transfers.iter().map(|t| t.volume_ul).sum();
        report
    }
}

#[async_trait]
impl<S, D, I, O> Protocol for CherrypickProtocol<S, D, I, O>
where
    S: Storage,
    D: Deck,
    I: Instrument,
    O: Operator,
{
    type Record = Transfer;
    type Plan = CherrypickPlan;

    fn name(&self) -> &str {
        &self.config.protocol.name
    }

    async fn extract(&self) -> Result<Vec<Transfer>> {
        tracing::debug!("Reading transfers from {}", self.input_path);
        let bytes = self.storage.read_file(&self.input_path).await?;
        parse_table(
            &bytes,
            self.config.transfer.header_mode,
            self.config.mapping_options(),
        )
    }

    fn plan(&self, transfers: Vec<Transfer>) -> Result<CherrypickPlan> {
        let sequence = self.config.slot_sequence()?;
        let labware = sequence.order_loads(&required_slots(&transfers))?;
        let occupied: BTreeSet<String> = labware.iter().map(|l| l.slot.clone()).collect();
        let tips = plan_consumables(
            &sequence,
            &occupied,
            self.config.tip_rack(),
            self.config.instrument.tips_per_rack.min(TIP_RACK_POSITIONS),
        )?;

        tracing::info!(
            "Planned {} transfers over {} labware with {} tip racks",
            transfers.len(),
            labware.len(),
            tips.racks.len()
        );
        Ok(CherrypickPlan {
            transfers,
            labware,
            tips,
            trash_slot: self.config.trash_slot().map(str::to_string),
        })
    }

    fn preview(&self, plan: &CherrypickPlan) -> RunReport {
        let mut report = self.base_report(plan);
        let needed = plan.tips_needed(self.config.transfer.tip_reuse);
        report.tips_used = needed;
        report.pauses = needed.saturating_sub(1) / plan.tips.capacity.max(1);
        report
    }

    async fn execute(&self, plan: CherrypickPlan) -> Result<RunReport> {
        if let Some(slot) = &plan.trash_slot {
            self.deck.load_trash_bin(slot).await?;
        }
        for item in &plan.labware {
            self.deck.load_labware(&item.labware, &item.slot).await?;
        }

        let mut racks = Vec::with_capacity(plan.tips.racks.len());
        for rack in &plan.tips.racks {
            if self.deck.is_occupied(&rack.slot).await {
                tracing::warn!("Slot {} is already occupied, skipping tip rack", rack.slot);
                continue;
            }
            racks.push(self.deck.load_labware(&rack.load_name, &rack.slot).await?);
        }
        let tips_per_rack = self.config.instrument.tips_per_rack;
        let capacity: usize = racks
            .iter()
            .map(|rack| rack.wells.len().min(tips_per_rack))
            .sum();
        if capacity == 0 {
            return Err(DeckError::CapacityError {
                message: "no tip rack could be loaded".to_string(),
            });
        }

        self.instrument
            .load(self.config.pipette(), self.config.mount(), &racks)
            .await?;
        self.operator.comment(&format!(
            "Loaded {} with {} tip racks ({} tips)",
            self.config.pipette(),
            racks.len(),
            capacity
        ));

        let mut executor = TransferExecutor::new(
            self.deck.as_ref(),
            self.instrument.as_ref(),
            self.operator.as_ref(),
            self.config.transfer.tip_reuse,
            capacity,
        );
        let summary = executor.run(&plan.transfers).await?;

        let mut report = self.base_report(&plan);
        report.tip_capacity = capacity;
        report.total_volume_ul = summary.total_volume_ul;
        report.tips_used = summary.tips_used;
        report.pauses = summary.pauses;
        Ok(report)
    }

    async fn publish(&self, report: &RunReport) -> Result<Option<String>> {
        write_report(&self.storage, &self.config, report).await
    }
}
