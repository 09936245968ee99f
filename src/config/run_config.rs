use crate::core::allocator::DeckSlotSequence;
use crate::core::mapper::MappingOptions;
use crate::core::table::HeaderMode;
use crate::domain::model::{Mount, Platform, ReusePolicy};
use crate::utils::error::{DeckError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_range, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Pipettes and the tip racks each one accepts.
const PIPETTE_TIP_RACKS: &[(&str, Platform, &[&str])] = &[
    (
        "flex_1channel_50",
        Platform::Flex,
        &[
            "opentrons_flex_96_tiprack_50ul",
            "opentrons_flex_96_filtertiprack_50ul",
        ],
    ),
    (
        "flex_1channel_1000",
        Platform::Flex,
        &[
            "opentrons_flex_96_tiprack_50ul",
            "opentrons_flex_96_filtertiprack_50ul",
            "opentrons_flex_96_tiprack_200ul",
            "opentrons_flex_96_filtertiprack_200ul",
            "opentrons_flex_96_tiprack_1000ul",
            "opentrons_flex_96_filtertiprack_1000ul",
        ],
    ),
    (
        "p20_single_gen2",
        Platform::Ot2,
        &["opentrons_96_tiprack_20ul", "opentrons_96_filtertiprack_20ul"],
    ),
    (
        "p300_single_gen2",
        Platform::Ot2,
        &["opentrons_96_tiprack_300ul", "opentrons_96_filtertiprack_200ul"],
    ),
    (
        "p1000_single_gen2",
        Platform::Ot2,
        &["opentrons_96_tiprack_1000ul", "opentrons_96_filtertiprack_1000ul"],
    ),
];

pub const MAX_LIQUID_VOLUME_UL: f64 = 1000.0;

/// Tip positions in every supported rack.
pub const TIP_RACK_POSITIONS: usize = 96;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub deck: DeckConfig,
    #[serde(default)]
    pub instrument: InstrumentConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub liquids: LiquidsConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            name: "deck-transfer".to_string(),
            description: String::new(),
            version: default_version(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckConfig {
    #[serde(default = "default_platform")]
    pub platform: Platform,
    /// Overrides the platform's trash location.
    pub trash_slot: Option<String>,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            platform: default_platform(),
            trash_slot: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub pipette: Option<String>,
    pub mount: Option<Mount>,
    pub tip_rack: Option<String>,
    #[serde(default = "default_tips_per_rack")]
    pub tips_per_rack: usize,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            pipette: None,
            mount: None,
            tip_rack: None,
            tips_per_rack: default_tips_per_rack(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_tip_reuse")]
    pub tip_reuse: ReusePolicy,
    #[serde(default)]
    pub header_mode: HeaderMode,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            tip_reuse: default_tip_reuse(),
            header_mode: HeaderMode::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidsConfig {
    #[serde(default = "default_well_delimiter")]
    pub well_delimiter: char,
    #[serde(default = "default_max_volume")]
    pub max_volume_ul: f64,
}

impl Default for LiquidsConfig {
    fn default() -> Self {
        Self {
            well_delimiter: default_well_delimiter(),
            max_volume_ul: default_max_volume(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_path")]
    pub path: String,
    #[serde(default = "default_true")]
    pub write_report: bool,
    #[serde(default = "default_report_filename")]
    pub report_filename: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: default_output_path(),
            write_report: true,
            report_filename: default_report_filename(),
        }
    }
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_platform() -> Platform {
    Platform::Ot2
}

fn default_tips_per_rack() -> usize {
    96
}

fn default_tip_reuse() -> ReusePolicy {
    ReusePolicy::Always
}

fn default_well_delimiter() -> char {
    ';'
}

fn default_max_volume() -> f64 {
    100.0
}

fn default_output_path() -> String {
    "./output".to_string()
}

fn default_true() -> bool {
    true
}

fn default_report_filename() -> String {
    "run_report.json".to_string()
}

impl RunConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);
        Ok(toml::from_str(&processed)?)
    }

    /// Replace `${VAR}` with the environment value; unknown variables are
    /// left as written.
    fn substitute_env_vars(content: &str) -> String {
        ENV_VAR_PATTERN
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }

    pub fn platform(&self) -> Platform {
        self.deck.platform
    }

    pub fn pipette(&self) -> &str {
        self.instrument
            .pipette
            .as_deref()
            .unwrap_or_else(|| self.platform().default_pipette())
    }

    pub fn tip_rack(&self) -> &str {
        self.instrument
            .tip_rack
            .as_deref()
            .unwrap_or_else(|| self.platform().default_tip_rack())
    }

    pub fn mount(&self) -> Mount {
        self.instrument.mount.unwrap_or(match self.platform() {
            Platform::Ot2 => Mount::Right,
            Platform::Flex => Mount::Left,
        })
    }

    pub fn trash_slot(&self) -> Option<&str> {
        self.deck
            .trash_slot
            .as_deref()
            .or_else(|| self.platform().default_trash_slot())
    }

    pub fn slot_sequence(&self) -> Result<DeckSlotSequence> {
        DeckSlotSequence::new(self.platform(), self.trash_slot())
    }

    pub fn mapping_options(&self) -> MappingOptions {
        MappingOptions {
            well_delimiter: self.liquids.well_delimiter,
            max_liquid_volume_ul: Some(self.liquids.max_volume_ul),
        }
    }

    pub fn output_path(&self) -> &str {
        &self.output.path
    }

    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("protocol.name", &self.protocol.name)?;
        validate_range(
            "instrument.tips_per_rack",
            self.instrument.tips_per_rack,
            1,
            TIP_RACK_POSITIONS,
        )?;
        if !self.liquids.max_volume_ul.is_finite() {
            return Err(DeckError::InvalidConfigValueError {
                field: "liquids.max_volume_ul".to_string(),
                value: self.liquids.max_volume_ul.to_string(),
                reason: "must be a finite number".to_string(),
            });
        }
        validate_range(
            "liquids.max_volume_ul",
            self.liquids.max_volume_ul,
            f64::MIN_POSITIVE,
            MAX_LIQUID_VOLUME_UL,
        )?;
        let delimiter = self.liquids.well_delimiter;
        if delimiter == ',' || delimiter.is_alphanumeric() || delimiter.is_whitespace() {
            return Err(DeckError::InvalidConfigValueError {
                field: "liquids.well_delimiter".to_string(),
                value: delimiter.to_string(),
                reason: "must not be a comma, whitespace, or a character used in well names"
                    .to_string(),
            });
        }
        validate_path("output.path", &self.output.path)?;
        validate_non_empty_string("output.report_filename", &self.output.report_filename)?;

        if let Some(slot) = &self.deck.trash_slot {
            if !self.platform().deck_slots().contains(&slot.as_str()) {
                return Err(DeckError::InvalidConfigValueError {
                    field: "deck.trash_slot".to_string(),
                    value: slot.clone(),
                    reason: format!("not a slot of the {} deck", self.platform()),
                });
            }
        }

        self.validate_pipette()
    }

    fn validate_pipette(&self) -> Result<()> {
        let pipette = self.pipette();
        let (_, platform, racks) = PIPETTE_TIP_RACKS
            .iter()
            .find(|(name, _, _)| *name == pipette)
            .ok_or_else(|| DeckError::InvalidConfigValueError {
                field: "instrument.pipette".to_string(),
                value: pipette.to_string(),
                reason: format!(
                    "unknown pipette. Known pipettes: {}",
                    PIPETTE_TIP_RACKS
                        .iter()
                        .map(|(name, _, _)| *name)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })?;

        if *platform != self.platform() {
            return Err(DeckError::ConfigValidationError {
                field: "instrument.pipette".to_string(),
                message: format!("{} cannot be used on the {} deck", pipette, self.platform()),
            });
        }

        let tip_rack = self.tip_rack();
        if !racks.contains(&tip_rack) {
            return Err(DeckError::ConfigValidationError {
                field: "instrument.tip_rack".to_string(),
                message: format!(
                    "{} does not fit {}. Compatible racks: {}",
                    tip_rack,
                    pipette,
                    racks.join(", ")
                ),
            });
        }
        Ok(())
    }
}

impl Validate for RunConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_config() {
        let toml_content = r#"
[protocol]
name = "cherrypick-flex"
description = "Plate to plate cherrypicking"
version = "2.1"

[deck]
platform = "flex"

[instrument]
pipette = "flex_1channel_1000"
mount = "right"
tip_rack = "opentrons_flex_96_filtertiprack_200ul"
tips_per_rack = 96

[transfer]
tip_reuse = "never"
header_mode = "set"

[liquids]
well_delimiter = "|"
max_volume_ul = 200.0

[output]
path = "./runs"
write_report = false
"#;

        let config = RunConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.protocol.name, "cherrypick-flex");
        assert_eq!(config.platform(), Platform::Flex);
        assert_eq!(config.pipette(), "flex_1channel_1000");
        assert_eq!(config.mount(), Mount::Right);
        assert_eq!(config.trash_slot(), Some("A3"));
        assert_eq!(config.transfer.tip_reuse, ReusePolicy::Never);
        assert_eq!(config.transfer.header_mode, HeaderMode::Set);
        assert_eq!(config.mapping_options().well_delimiter, '|');
        assert_eq!(config.mapping_options().max_liquid_volume_ul, Some(200.0));
        assert!(!config.output.write_report);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config.platform(), Platform::Ot2);
        assert_eq!(config.pipette(), "p300_single_gen2");
        assert_eq!(config.tip_rack(), "opentrons_96_tiprack_300ul");
        assert_eq!(config.mount(), Mount::Right);
        assert_eq!(config.trash_slot(), None);
        assert_eq!(config.instrument.tips_per_rack, 96);
        assert_eq!(config.transfer.tip_reuse, ReusePolicy::Always);
        assert_eq!(config.output.report_filename, "run_report.json");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("DECK_TRANSFER_TEST_OUTPUT", "/tmp/deck-runs");

        let toml_content = r#"
[output]
path = "${DECK_TRANSFER_TEST_OUTPUT}"
"#;
        let config = RunConfig::from_toml_str(toml_content).unwrap();
        assert_eq!(config.output_path(), "/tmp/deck-runs");

        std::env::remove_var("DECK_TRANSFER_TEST_OUTPUT");
    }

    #[test]
    fn test_incompatible_tip_rack_is_rejected() {
        let toml_content = r#"
[deck]
platform = "flex"

[instrument]
pipette = "flex_1channel_50"
tip_rack = "opentrons_flex_96_tiprack_1000ul"
"#;
        let config = RunConfig::from_toml_str(toml_content).unwrap();
        match config.validate().unwrap_err() {
            DeckError::ConfigValidationError { field, .. } => {
                assert_eq!(field, "instrument.tip_rack")
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_pipette_must_match_platform() {
        let toml_content = r#"
[instrument]
pipette = "flex_1channel_50"
tip_rack = "opentrons_flex_96_tiprack_50ul"
"#;
        let config = RunConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_range_checks() {
        let mut config = RunConfig::default();
        config.instrument.tips_per_rack = 0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.instrument.tips_per_rack = TIP_RACK_POSITIONS + 1;
        assert!(config.validate().is_err());
        config.instrument.tips_per_rack = TIP_RACK_POSITIONS;
        assert!(config.validate().is_ok());

        let mut config = RunConfig::default();
        config.deck.trash_slot = Some("A3".to_string());
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.liquids.well_delimiter = ',';
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.liquids.max_volume_ul = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_a_config_error() {
        let err = RunConfig::from_toml_str("[deck\nplatform = ").unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(b"[protocol]\nname = \"file-test\"\n")
            .unwrap();

        let config = RunConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.protocol.name, "file-test");
    }
}
