use crate::domain::model::RunReport;
use crate::domain::ports::Protocol;
use crate::utils::error::Result;
use crate::utils::monitor::SystemMonitor;

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: RunReport,
    pub report_path: Option<String>,
}

pub struct RunEngine<P: Protocol> {
    protocol: P,
    monitor: SystemMonitor,
    dry_run: bool,
}

impl<P: Protocol> RunEngine<P> {
    pub fn new(protocol: P) -> Self {
        Self {
            protocol,
            monitor: SystemMonitor::new(false),
            dry_run: false,
        }
    }

    pub fn new_with_monitoring(protocol: P, monitor_enabled: bool) -> Self {
        Self {
            protocol,
            monitor: SystemMonitor::new(monitor_enabled),
            dry_run: false,
        }
    }

    /// Stop after planning; nothing is sent to the robot.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub async fn run(&self) -> Result<RunOutcome> {
        tracing::info!("Starting run '{}'", self.protocol.name());
        if self.monitor.is_enabled() {
            tracing::info!("System monitoring enabled");
        }
        self.monitor.log_stats("Start");

        tracing::info!("Reading input table...");
        let records = self.protocol.extract().await?;
        tracing::info!("Read {} records", records.len());
        self.monitor.log_stats("Extract");

        tracing::info!("Planning run...");
        let plan = self.protocol.plan(records)?;
        self.monitor.log_stats("Plan");

        let report = if self.dry_run {
            tracing::info!("Dry run, skipping execution");
            let mut report = self.protocol.preview(&plan);
            report.dry_run = true;
            report
        } else {
            tracing::info!("Executing run...");
            let report = self.protocol.execute(plan).await?;
            self.monitor.log_stats("Execute");
            report
        };
        let report = report.finish();

        let report_path = self.protocol.publish(&report).await?;
        if let Some(path) = &report_path {
            tracing::info!("Run report saved to: {}", path);
        }
        self.monitor.log_final_stats();

        Ok(RunOutcome {
            report,
            report_path,
        })
    }
}
