pub mod cli;
pub mod run_config;

pub use run_config::RunConfig;

#[cfg(feature = "cli")]
use crate::core::table::HeaderMode;
#[cfg(feature = "cli")]
use crate::domain::model::{Platform, ReusePolicy};
#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::{validate_file_extensions, validate_path, Validate};
#[cfg(feature = "cli")]
use clap::{Args, Parser, Subcommand};

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "deck-transfer")]
#[command(about = "Plan and simulate CSV-driven liquid handling runs")]
pub struct CliConfig {
    #[command(subcommand)]
    pub command: RunCommand,

    /// TOML run configuration; defaults apply when omitted
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Directory for run_report.json and the command log
    #[arg(long, global = true)]
    pub output_path: Option<String>,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[arg(long, global = true, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Subcommand)]
pub enum RunCommand {
    /// Run a cherrypicking table of well-to-well transfers
    Transfer(RunArgs),
    /// Define liquids and their starting volumes from a table
    Liquids(RunArgs),
    /// Print a headerless 8x12 plate volume map
    PlateMap {
        #[arg(long)]
        csv: String,
        /// Only print the summary for this plate row
        #[arg(long)]
        row: Option<char>,
    },
}

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    #[arg(long)]
    pub csv: String,

    #[arg(long, value_enum)]
    pub platform: Option<Platform>,

    #[arg(long, value_enum)]
    pub tip_reuse: Option<ReusePolicy>,

    #[arg(long, value_enum)]
    pub header_mode: Option<HeaderMode>,

    /// Validate and plan only; nothing is sent to the robot
    #[arg(long)]
    pub dry_run: bool,

    /// Resume pauses automatically instead of waiting for Enter
    #[arg(long)]
    pub auto_resume: bool,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn csv_path(&self) -> &str {
        match &self.command {
            RunCommand::Transfer(args) | RunCommand::Liquids(args) => &args.csv,
            RunCommand::PlateMap { csv, .. } => csv,
        }
    }

    pub fn run_args(&self) -> Option<&RunArgs> {
        match &self.command {
            RunCommand::Transfer(args) | RunCommand::Liquids(args) => Some(args),
            RunCommand::PlateMap { .. } => None,
        }
    }

    /// Load the TOML file (if any), apply command line overrides, then
    /// validate the result.
    pub fn resolve_run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => {
                tracing::debug!("Loading run configuration from {}", path);
                RunConfig::from_file(path)?
            }
            None => RunConfig::default(),
        };

        if let Some(path) = &self.output_path {
            config.output.path = path.clone();
        }
        if let Some(args) = self.run_args() {
            if let Some(platform) = args.platform {
                config.deck.platform = platform;
            }
            if let Some(policy) = args.tip_reuse {
                config.transfer.tip_reuse = policy;
            }
            if let Some(mode) = args.header_mode {
                config.transfer.header_mode = mode;
            }
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_path("csv", self.csv_path())?;
        validate_file_extensions("csv", &[self.csv_path().to_string()], &["csv", "CSV", "txt"])?;
        if let Some(path) = &self.output_path {
            validate_path("output_path", path)?;
        }
        Ok(())
    }
}
