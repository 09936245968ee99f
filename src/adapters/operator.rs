use crate::domain::ports::Operator;
use crate::utils::error::{DeckError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Operator at the terminal: comments go to the log, pauses wait for Enter.
#[derive(Debug, Default)]
pub struct ConsoleOperator;

impl ConsoleOperator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Operator for ConsoleOperator {
    fn comment(&self, message: &str) {
        tracing::info!("{}", message);
    }

    async fn pause(&self, message: &str) -> Result<()> {
        tracing::warn!("Paused: {}", message);
        println!("{} Press Enter to resume.", message);

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;
        if read == 0 {
            return Err(DeckError::OperatorAborted {
                message: format!("input closed while paused ({})", message),
            });
        }
        tracing::info!("Resumed by operator");
        Ok(())
    }
}

/// Unattended operator: logs pauses and resumes straight away.
#[derive(Debug, Default)]
pub struct AutoResumeOperator {
    pauses: AtomicUsize,
}

impl AutoResumeOperator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pauses(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Operator for AutoResumeOperator {
    fn comment(&self, message: &str) {
        tracing::info!("{}", message);
    }

    async fn pause(&self, message: &str) -> Result<()> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        tracing::warn!("Paused: {} (resuming automatically)", message);
        Ok(())
    }
}
