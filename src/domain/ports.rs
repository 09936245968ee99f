use crate::domain::model::{Labware, LiquidId, Mount, NewTip, Position, RunReport};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Slot occupancy and labware loading.
#[async_trait]
pub trait Deck: Send + Sync {
    async fn is_occupied(&self, slot: &str) -> bool;
    async fn load_labware(&self, load_name: &str, slot: &str) -> Result<Labware>;
    async fn load_trash_bin(&self, slot: &str) -> Result<()>;
    async fn labware_at(&self, slot: &str) -> Option<Labware>;
}

/// A single-channel pipette. Tip handling is driven from outside; the
/// instrument never picks up or drops tips on its own during `transfer`
/// when asked for [`NewTip::Never`].
#[async_trait]
pub trait Instrument: Send + Sync {
    async fn load(&self, pipette: &str, mount: Mount, tip_racks: &[Labware]) -> Result<()>;
    async fn pick_up_tip(&self) -> Result<()>;
    async fn drop_tip(&self) -> Result<()>;
    async fn reset_tipracks(&self) -> Result<()>;
    async fn has_tip(&self) -> bool;
    async fn transfer(
        &self,
        volume_ul: f64,
        source: &Position,
        destination: &Position,
        new_tip: NewTip,
    ) -> Result<()>;
}

#[async_trait]
pub trait LiquidRegistry: Send + Sync {
    async fn define_liquid(
        &self,
        name: &str,
        description: &str,
        display_color: &str,
    ) -> Result<LiquidId>;
    async fn load_liquid(&self, position: &Position, liquid: &LiquidId, volume_ul: f64)
        -> Result<()>;
}

/// The person running the protocol: receives progress comments and
/// acknowledges pauses.
#[async_trait]
pub trait Operator: Send + Sync {
    fn comment(&self, message: &str);
    async fn pause(&self, message: &str) -> Result<()>;
}

/// One kind of run: read its table, check everything up front, then drive
/// the robot.
///
/// `plan` must not touch any collaborator; a failed plan leaves the deck
/// untouched.
#[async_trait]
pub trait Protocol: Send + Sync {
    type Record: Send + Sync;
    type Plan: Send + Sync;

    fn name(&self) -> &str;
    async fn extract(&self) -> Result<Vec<Self::Record>>;
    fn plan(&self, records: Vec<Self::Record>) -> Result<Self::Plan>;
    /// Report describing what `execute` would do, without doing it.
    fn preview(&self, plan: &Self::Plan) -> RunReport;
    async fn execute(&self, plan: Self::Plan) -> Result<RunReport>;
    /// Persist the report; `None` when reporting is switched off.
    async fn publish(&self, report: &RunReport) -> Result<Option<String>>;
}
