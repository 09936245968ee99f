use crate::core::consumable::ConsumableLifecycle;
use crate::domain::model::{NewTip, Position, ReusePolicy, Transfer, WellId};
use crate::domain::ports::{Deck, Instrument, Operator};
use crate::utils::error::{DeckError, Result};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub transfers: usize,
    pub total_volume_ul: f64,
    pub tips_used: usize,
    pub pauses: usize,
}

/// Runs transfers in table order, picking up and dropping tips according to
/// the reuse policy. The instrument is always told not to manage tips itself.
pub struct TransferExecutor<'a, D: ?Sized, I: ?Sized, O: ?Sized> {
    deck: &'a D,
    instrument: &'a I,
    operator: &'a O,
    policy: ReusePolicy,
    lifecycle: ConsumableLifecycle,
}

impl<'a, D, I, O> TransferExecutor<'a, D, I, O>
where
    D: Deck + ?Sized,
    I: Instrument + ?Sized,
    O: Operator + ?Sized,
{
    pub fn new(
        deck: &'a D,
        instrument: &'a I,
        operator: &'a O,
        policy: ReusePolicy,
        capacity: usize,
    ) -> Self {
        Self {
            deck,
            instrument,
            operator,
            policy,
            lifecycle: ConsumableLifecycle::new(capacity),
        }
    }

    pub fn lifecycle(&self) -> &ConsumableLifecycle {
        &self.lifecycle
    }

    pub async fn run(&mut self, transfers: &[Transfer]) -> Result<ExecutionSummary> {
        tracing::info!(
            "Executing {} transfers with tip reuse '{:?}'",
            transfers.len(),
            self.policy
        );

        if self.policy == ReusePolicy::Never {
            self.lifecycle.acquire(self.instrument, self.operator).await?;
        }

        let mut total_volume_ul = 0.0;
        for (idx, transfer) in transfers.iter().enumerate() {
            let source = self
                .resolve(&transfer.source.slot, &transfer.source.well)
                .await?
                .bottom(transfer.source.height_above_bottom_mm);
            let destination = self
                .resolve(&transfer.destination.slot, &transfer.destination.well)
                .await?;

            if self.policy == ReusePolicy::Always {
                self.lifecycle.acquire(self.instrument, self.operator).await?;
            }

            tracing::debug!(
                "Transfer {}: {} µl from {} to {}",
                idx + 1,
                transfer.volume_ul,
                source,
                destination
            );
            self.instrument
                .transfer(transfer.volume_ul, &source, &destination, NewTip::Never)
                .await?;
            total_volume_ul += transfer.volume_ul;

            if self.policy == ReusePolicy::Always {
                self.lifecycle.release(self.instrument).await?;
            }
        }

        if self.instrument.has_tip().await {
            self.lifecycle.release(self.instrument).await?;
        }

        let summary = ExecutionSummary {
            transfers: transfers.len(),
            total_volume_ul,
            tips_used: self.lifecycle.acquisitions(),
            pauses: self.lifecycle.pauses(),
        };
        self.operator.comment(&format!(
            "Completed {} transfers ({} µl) using {} tips",
            summary.transfers, summary.total_volume_ul, summary.tips_used
        ));
        Ok(summary)
    }

    async fn resolve(&self, slot: &str, well: &WellId) -> Result<Position> {
        let labware = self
            .deck
            .labware_at(slot)
            .await
            .ok_or_else(|| DeckError::LabwareNotLoaded {
                slot: slot.to_string(),
            })?;
        labware
            .position(well)
            .ok_or_else(|| DeckError::WellNotFound {
                well: well.to_string(),
                labware: labware.load_name.clone(),
                slot: slot.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::consumable::tests::{CountingInstrument, RecordingOperator};
    use crate::domain::model::{Labware, SourceLocation, WellLocation};
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct FixedDeck {
        labware: HashMap<String, Labware>,
    }

    impl FixedDeck {
        fn new(slots: &[(&str, &str)]) -> Self {
            let wells: Vec<WellId> = ["A1", "A2", "B1", "H12"]
                .iter()
                .map(|w| w.parse().unwrap())
                .collect();
            let labware = slots
                .iter()
                .map(|(name, slot)| {
                    (
                        slot.to_string(),
                        Labware {
                            load_name: name.to_string(),
                            slot: slot.to_string(),
                            wells: wells.clone(),
                        },
                    )
                })
                .collect();
            Self { labware }
        }
    }

    #[async_trait]
    impl Deck for FixedDeck {
        async fn is_occupied(&self, slot: &str) -> bool {
            self.labware.contains_key(slot)
        }

        async fn load_labware(&self, _load_name: &str, slot: &str) -> Result<Labware> {
            self.labware
                .get(slot)
                .cloned()
                .ok_or_else(|| DeckError::LabwareNotLoaded {
                    slot: slot.to_string(),
                })
        }

        async fn load_trash_bin(&self, _slot: &str) -> Result<()> {
            Ok(())
        }

        async fn labware_at(&self, slot: &str) -> Option<Labware> {
            self.labware.get(slot).cloned()
        }
    }

    fn transfer(src_well: &str, dst_well: &str, volume: f64) -> Transfer {
        Transfer {
            source: SourceLocation {
                labware: "reservoir".to_string(),
                slot: "1".to_string(),
                well: src_well.parse().unwrap(),
                height_above_bottom_mm: 2.0,
            },
            destination: WellLocation {
                labware: "plate".to_string(),
                slot: "2".to_string(),
                well: dst_well.parse().unwrap(),
            },
            volume_ul: volume,
        }
    }

    #[tokio::test]
    async fn test_always_policy_uses_one_tip_per_transfer() {
        let deck = FixedDeck::new(&[("reservoir", "1"), ("plate", "2")]);
        let instrument = CountingInstrument::default();
        let operator = RecordingOperator::default();
        let mut executor =
            TransferExecutor::new(&deck, &instrument, &operator, ReusePolicy::Always, 2);

        let transfers = vec![
            transfer("A1", "B1", 10.0),
            transfer("A2", "H12", 5.0),
            transfer("A1", "A1", 2.5),
        ];
        let summary = executor.run(&transfers).await.unwrap();

        assert_eq!(summary.transfers, 3);
        assert_eq!(summary.tips_used, 3);
        assert_eq!(summary.pauses, 1);
        assert_eq!(summary.total_volume_ul, 17.5);
        assert_eq!(executor.lifecycle().state().count, 1);
        assert_eq!(*instrument.picks.lock().unwrap(), 3);
        assert_eq!(*instrument.drops.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_never_policy_uses_single_tip() {
        let deck = FixedDeck::new(&[("reservoir", "1"), ("plate", "2")]);
        let instrument = CountingInstrument::default();
        let operator = RecordingOperator::default();
        let mut executor =
            TransferExecutor::new(&deck, &instrument, &operator, ReusePolicy::Never, 96);

        let transfers = vec![transfer("A1", "B1", 10.0), transfer("A2", "H12", 5.0)];
        let summary = executor.run(&transfers).await.unwrap();

        assert_eq!(summary.tips_used, 1);
        assert_eq!(*instrument.picks.lock().unwrap(), 1);
        assert_eq!(*instrument.drops.lock().unwrap(), 1);
        assert!(!instrument.has_tip().await);
    }

    #[tokio::test]
    async fn test_tip_left_on_the_pipette_is_dropped_at_the_end() {
        let deck = FixedDeck::new(&[("reservoir", "1"), ("plate", "2")]);
        let instrument = CountingInstrument::default();
        *instrument.picks.lock().unwrap() = 1;
        let operator = RecordingOperator::default();
        let mut executor =
            TransferExecutor::new(&deck, &instrument, &operator, ReusePolicy::Always, 96);

        executor.run(&[transfer("A1", "B1", 4.0)]).await.unwrap();

        assert_eq!(*instrument.picks.lock().unwrap(), 2);
        assert_eq!(*instrument.drops.lock().unwrap(), 2);
        assert!(!instrument.has_tip().await);
    }

    #[tokio::test]
    async fn test_transfers_keep_table_order_and_positions() {
        let deck = FixedDeck::new(&[("reservoir", "1"), ("plate", "2")]);
        let instrument = CountingInstrument::default();
        let operator = RecordingOperator::default();
        let mut executor =
            TransferExecutor::new(&deck, &instrument, &operator, ReusePolicy::Always, 96);

        executor
            .run(&[transfer("A2", "H12", 7.0), transfer("A1", "B1", 3.0)])
            .await
            .unwrap();

        let log = instrument.transfers.lock().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].0, 7.0);
        assert_eq!(log[0].1.well.to_string(), "A2");
        assert_eq!(log[0].1.height_above_bottom_mm, Some(2.0));
        assert_eq!(log[0].2.well.to_string(), "H12");
        assert_eq!(log[0].2.height_above_bottom_mm, None);
        assert_eq!(log[0].3, NewTip::Never);
        assert_eq!(log[1].0, 3.0);
    }

    #[tokio::test]
    async fn test_missing_well_aborts_before_pickup() {
        let deck = FixedDeck::new(&[("reservoir", "1"), ("plate", "2")]);
        let instrument = CountingInstrument::default();
        let operator = RecordingOperator::default();
        let mut executor =
            TransferExecutor::new(&deck, &instrument, &operator, ReusePolicy::Always, 96);

        let err = executor.run(&[transfer("C5", "B1", 3.0)]).await.unwrap_err();
        assert!(matches!(err, DeckError::WellNotFound { .. }));
        assert_eq!(*instrument.picks.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_missing_labware_is_reported() {
        let deck = FixedDeck::new(&[("reservoir", "1")]);
        let instrument = CountingInstrument::default();
        let operator = RecordingOperator::default();
        let mut executor =
            TransferExecutor::new(&deck, &instrument, &operator, ReusePolicy::Never, 96);

        let err = executor.run(&[transfer("A1", "B1", 3.0)]).await.unwrap_err();
        match err {
            DeckError::LabwareNotLoaded { slot } => assert_eq!(slot, "2"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
