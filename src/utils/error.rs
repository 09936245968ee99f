use std::collections::BTreeSet;
use thiserror::Error;

use crate::domain::model::WellId;

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Schema error on line {line}: {message} (row data: {content:?})")]
    SchemaError {
        line: usize,
        message: String,
        content: Vec<String>,
    },

    #[error("Header mismatch on line {line}: {} (row data: {content:?})", format_header_mismatch(.missing, .unexpected))]
    HeaderSetError {
        line: usize,
        content: Vec<String>,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("Field error on line {line}, field '{field}': {message}")]
    FieldError {
        line: usize,
        field: String,
        message: String,
    },

    #[error("Wells {} in labware {labware} at slot {slot} have already been defined", format_wells(.wells))]
    ConflictError {
        wells: BTreeSet<WellId>,
        labware: String,
        slot: String,
    },

    #[error("Slot {slot} is requested for both {existing} and {requested}")]
    SlotConflictError {
        slot: String,
        existing: String,
        requested: String,
    },

    #[error("Slot {slot} is not usable on the {platform} deck: {reason}")]
    InvalidSlotError {
        slot: String,
        platform: String,
        reason: String,
    },

    #[error("Capacity error: {message}")]
    CapacityError { message: String },

    #[error("Nothing is loaded in slot {slot}")]
    LabwareNotLoaded { slot: String },

    #[error("Well {well} does not exist in {labware} at slot {slot}")]
    WellNotFound {
        well: String,
        labware: String,
        slot: String,
    },

    #[error("Instrument error: {message}")]
    InstrumentError { message: String },

    #[error("Run aborted by operator: {message}")]
    OperatorAborted { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

/// Coarse grouping of failures, used for logging and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Plan,
    Execution,
    Config,
    System,
}

impl DeckError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            DeckError::SchemaError { .. }
            | DeckError::HeaderSetError { .. }
            | DeckError::FieldError { .. }
            | DeckError::CsvError(_) => ErrorCategory::Input,
            DeckError::ConflictError { .. }
            | DeckError::SlotConflictError { .. }
            | DeckError::InvalidSlotError { .. }
            | DeckError::CapacityError { .. } => ErrorCategory::Plan,
            DeckError::LabwareNotLoaded { .. }
            | DeckError::WellNotFound { .. }
            | DeckError::InstrumentError { .. }
            | DeckError::OperatorAborted { .. } => ErrorCategory::Execution,
            DeckError::TomlError(_)
            | DeckError::ConfigValidationError { .. }
            | DeckError::InvalidConfigValueError { .. } => ErrorCategory::Config,
            DeckError::IoError(_) | DeckError::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Input | ErrorCategory::Plan => 1,
            ErrorCategory::Execution => 2,
            ErrorCategory::Config => 3,
            ErrorCategory::System => 4,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            DeckError::SchemaError { .. } | DeckError::HeaderSetError { .. } => {
                "Check the CSV header row and make sure every row has the same number of columns"
            }
            DeckError::FieldError { .. } => "Fill in or correct the reported cell and re-run",
            DeckError::ConflictError { .. } => {
                "Each well may only receive one liquid definition; remove the overlapping wells"
            }
            DeckError::SlotConflictError { .. } => {
                "Use a single labware type per slot across the whole table"
            }
            DeckError::InvalidSlotError { .. } => {
                "Use slot names from the selected platform and keep the trash slot free"
            }
            DeckError::CapacityError { .. } => {
                "Free at least one deck slot so a tip rack can be loaded"
            }
            DeckError::LabwareNotLoaded { .. } | DeckError::WellNotFound { .. } => {
                "Check the labware load names and well names in the CSV"
            }
            DeckError::InstrumentError { .. } => "Check the pipette and tip rack configuration",
            DeckError::OperatorAborted { .. } => "Restart the run once the deck is ready",
            DeckError::TomlError(_)
            | DeckError::ConfigValidationError { .. }
            | DeckError::InvalidConfigValueError { .. } => "Review the run configuration file",
            DeckError::CsvError(_) => "Make sure the input is comma separated UTF-8 text",
            DeckError::IoError(_) => "Check that the file exists and is readable",
            DeckError::SerializationError(_) => "Check that the output directory is writable",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Input => format!("The input table is invalid: {}", self),
            ErrorCategory::Plan => format!("The run cannot be planned: {}", self),
            ErrorCategory::Execution => format!("The run stopped: {}", self),
            ErrorCategory::Config => format!("The configuration is invalid: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

fn format_wells(wells: &BTreeSet<WellId>) -> String {
    let names: Vec<String> = wells.iter().map(|w| w.to_string()).collect();
    format!("{{{}}}", names.join(", "))
}

fn format_header_mismatch(missing: &[String], unexpected: &[String]) -> String {
    let mut parts = Vec::new();
    if !unexpected.is_empty() {
        parts.push(format!("Unexpected headers: {}.", unexpected.join(", ")));
    }
    if !missing.is_empty() {
        parts.push(format!("Missing headers: {}.", missing.join(", ")));
    }
    parts.join(" ")
}

pub type Result<T> = std::result::Result<T, DeckError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message_names_wells() {
        let wells: BTreeSet<WellId> = ["B1", "A1"].iter().map(|w| w.parse().unwrap()).collect();
        let err = DeckError::ConflictError {
            wells,
            labware: "nest_96_wellplate_100ul_pcr_full_skirt".to_string(),
            slot: "1".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Wells {A1, B1} in labware nest_96_wellplate_100ul_pcr_full_skirt at slot 1 have already been defined"
        );
        assert_eq!(err.category(), ErrorCategory::Plan);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_header_mismatch_lists_both_sides() {
        let err = DeckError::HeaderSetError {
            line: 1,
            content: vec!["slot".to_string(), "vol".to_string()],
            missing: vec!["volume".to_string()],
            unexpected: vec!["vol".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "Header mismatch on line 1: Unexpected headers: vol. Missing headers: volume. (row data: [\"slot\", \"vol\"])"
        );
    }

    #[test]
    fn test_exit_codes_follow_category() {
        let exec = DeckError::LabwareNotLoaded {
            slot: "4".to_string(),
        };
        assert_eq!(exec.exit_code(), 2);
        let config = DeckError::InvalidConfigValueError {
            field: "deck.platform".to_string(),
            value: "ot3".to_string(),
            reason: "unknown platform".to_string(),
        };
        assert_eq!(config.exit_code(), 3);
        assert!(config.user_friendly_message().starts_with("The configuration is invalid"));
    }
}
