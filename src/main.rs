use anyhow::Context;
use clap::Parser;
use deck_transfer::config::RunCommand;
use deck_transfer::core::plate_map::PlateMap;
use deck_transfer::core::table::read_table;
use deck_transfer::domain::ports::{Operator, Storage};
use deck_transfer::utils::{logger, validation::Validate};
use deck_transfer::{
    AutoResumeOperator, CherrypickProtocol, CliConfig, ConsoleOperator, DeckError,
    LiquidSetupProtocol, LocalStorage, RunConfig, RunEngine, SimulatedRobot,
};
use std::sync::Arc;

const COMMAND_LOG: &str = "commands.json";

#[derive(Debug, Clone, Copy)]
enum RunKind {
    Transfer,
    Liquids,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    if cli.json_logs {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting deck-transfer");
    tracing::debug!("CLI config: {:?}", cli);

    if let Err(err) = run(&cli).await {
        let code = match err.downcast_ref::<DeckError>() {
            Some(e) => {
                tracing::error!("Run failed: {:#} (Category: {:?})", err, e.category());
                tracing::error!("Suggestion: {}", e.recovery_suggestion());
                eprintln!("{}", e.user_friendly_message());
                eprintln!("Suggestion: {}", e.recovery_suggestion());
                e.exit_code()
            }
            None => {
                tracing::error!("Run failed: {:#}", err);
                eprintln!("{:#}", err);
                1
            }
        };
        std::process::exit(code);
    }

    Ok(())
}

async fn run(cli: &CliConfig) -> anyhow::Result<()> {
    cli.validate()?;

    let csv = std::fs::canonicalize(cli.csv_path())
        .map_err(DeckError::from)
        .with_context(|| format!("Cannot open input table {}", cli.csv_path()))?
        .display()
        .to_string();

    let (kind, args) = match &cli.command {
        RunCommand::PlateMap { row, .. } => return show_plate_map(&csv, *row).await,
        RunCommand::Transfer(args) => (RunKind::Transfer, args),
        RunCommand::Liquids(args) => (RunKind::Liquids, args),
    };

    let config = cli.resolve_run_config()?;
    tracing::info!(
        "Platform {}, pipette {} on {} mount, tip reuse {:?}",
        config.platform(),
        config.pipette(),
        config.mount(),
        config.transfer.tip_reuse
    );

    if args.auto_resume {
        run_protocol(cli, kind, args.dry_run, config, csv, AutoResumeOperator::new()).await
    } else {
        run_protocol(cli, kind, args.dry_run, config, csv, ConsoleOperator::new()).await
    }
}

async fn run_protocol<O: Operator + 'static>(
    cli: &CliConfig,
    kind: RunKind,
    dry_run: bool,
    config: RunConfig,
    csv: String,
    operator: O,
) -> anyhow::Result<()> {
    let storage = LocalStorage::new(config.output_path());
    let robot = Arc::new(SimulatedRobot::new(config.platform()));
    let operator = Arc::new(operator);
    let write_log = config.output.write_report;

    let outcome = match kind {
        RunKind::Transfer => {
            let protocol = CherrypickProtocol::new(
                storage.clone(),
                config,
                csv,
                robot.clone(),
                robot.clone(),
                operator,
            );
            RunEngine::new_with_monitoring(protocol, cli.monitor)
                .dry_run(dry_run)
                .run()
                .await?
        }
        RunKind::Liquids => {
            let protocol = LiquidSetupProtocol::new(
                storage.clone(),
                config,
                csv,
                robot.clone(),
                robot.clone(),
                operator,
            );
            RunEngine::new_with_monitoring(protocol, cli.monitor)
                .dry_run(dry_run)
                .run()
                .await?
        }
    };

    if write_log && !dry_run {
        let commands = robot.commands().await;
        let json = serde_json::to_vec_pretty(&commands).map_err(DeckError::from)?;
        storage
            .write_file(COMMAND_LOG, &json)
            .await
            .with_context(|| format!("Cannot write {}", COMMAND_LOG))?;
        tracing::info!("Recorded {} robot commands", commands.len());
    }

    let report = &outcome.report;
    if report.dry_run {
        println!("Dry run passed: nothing was sent to the robot.");
    } else {
        println!("Run completed successfully!");
    }
    println!("Labware: {}", report.labware.len());
    match kind {
        RunKind::Transfer => {
            println!(
                "Transfers: {} ({} µl), tips: {} of {}, refill pauses: {}",
                report.transfers,
                report.total_volume_ul,
                report.tips_used,
                report.tip_capacity,
                report.pauses
            );
        }
        RunKind::Liquids => {
            println!(
                "Liquids: {} in {} wells ({} µl)",
                report.liquids, report.wells_filled, report.total_volume_ul
            );
        }
    }
    if let Some(path) = &outcome.report_path {
        println!("Report saved to: {}", path);
    }
    Ok(())
}

async fn show_plate_map(csv: &str, row: Option<char>) -> anyhow::Result<()> {
    let storage = LocalStorage::new(".");
    let bytes = storage.read_file(csv).await?;
    let map = PlateMap::from_table(&read_table(&bytes)?)?;

    match row {
        Some(row) => {
            let summary = map
                .row_summary(row)
                .ok_or_else(|| DeckError::InvalidConfigValueError {
                    field: "row".to_string(),
                    value: row.to_string(),
                    reason: "plate rows are A to H".to_string(),
                })?;
            println!("{}", summary);
        }
        None => print!("{}", map),
    }
    println!("Total volume: {} µl", map.total_volume());
    Ok(())
}
