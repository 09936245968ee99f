pub mod cherrypick;
pub mod liquids;

pub use cherrypick::{CherrypickPlan, CherrypickProtocol};
pub use liquids::{LiquidPlan, LiquidSetupProtocol};

use crate::config::run_config::RunConfig;
use crate::domain::model::RunReport;
use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::path::Path;

/// Write `report` as pretty JSON under the configured output directory.
pub(crate) async fn write_report<S: Storage>(
    storage: &S,
    config: &RunConfig,
    report: &RunReport,
) -> Result<Option<String>> {
    if !config.output.write_report {
        tracing::debug!("Run report disabled, not writing");
        return Ok(None);
    }

    let json = serde_json::to_vec_pretty(report)?;
    storage
        .write_file(&config.output.report_filename, &json)
        .await?;
    let path = Path::new(config.output_path()).join(&config.output.report_filename);
    Ok(Some(path.display().to_string()))
}
