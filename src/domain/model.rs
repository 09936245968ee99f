use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

static WELL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]{1,2})(\d{1,3})$").expect("well pattern is valid"));

/// A normalized well address such as `B2`.
///
/// Parsing upper-cases the row letters and drops zero padding from the
/// column, so `"b02"`, `"B2"` and `" B02 "` all parse to the same value.
/// Ordering is row first, then numeric column (`A2 < A10 < B1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WellId {
    row: String,
    column: u32,
}

impl WellId {
    pub fn new(row: char, column: u32) -> Self {
        Self {
            row: row.to_ascii_uppercase().to_string(),
            column,
        }
    }

    pub fn row(&self) -> &str {
        &self.row
    }

    pub fn column(&self) -> u32 {
        self.column
    }
}

impl FromStr for WellId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = WELL_PATTERN
            .captures(trimmed)
            .ok_or_else(|| format!("'{}' is not a well name like A1 or H12", s))?;
        let column: u32 = caps[2]
            .parse()
            .map_err(|_| format!("'{}' has an invalid column number", s))?;
        if column == 0 {
            return Err(format!("'{}' has column 0; columns start at 1", s));
        }
        Ok(Self {
            row: caps[1].to_ascii_uppercase(),
            column,
        })
    }
}

impl TryFrom<String> for WellId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<WellId> for String {
    fn from(value: WellId) -> Self {
        value.to_string()
    }
}

impl fmt::Display for WellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.column)
    }
}

/// Normalize a raw well string, e.g. `"b02"` to `"B2"`.
pub fn normalize_well(raw: &str) -> Result<String, String> {
    raw.parse::<WellId>().map(|w| w.to_string())
}

/// A labware type sitting in a deck slot. Two values with the same fields
/// refer to the same physical load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceSlot {
    pub labware: String,
    pub slot: String,
}

impl ResourceSlot {
    pub fn new(labware: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            labware: labware.into(),
            slot: slot.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub labware: String,
    pub slot: String,
    pub well: WellId,
    pub height_above_bottom_mm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellLocation {
    pub labware: String,
    pub slot: String,
    pub well: WellId,
}

/// One row of a cherrypicking table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub source: SourceLocation,
    pub destination: WellLocation,
    pub volume_ul: f64,
}

/// One row of a liquid setup table: a named liquid placed into a set of
/// wells of one labware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidDestination {
    pub labware: String,
    pub slot: String,
    pub wells: BTreeSet<WellId>,
    pub name: String,
    pub description: String,
    pub display_color: String,
    pub volume_ul: f64,
}

impl LiquidDestination {
    pub fn key(&self) -> ResourceSlot {
        ResourceSlot::new(self.labware.clone(), self.slot.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ot2,
    Flex,
}

const OT2_SLOTS: [&str; 11] = ["1", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11"];
const FLEX_SLOTS: [&str; 12] = [
    "A1", "A2", "A3", "B1", "B2", "B3", "C1", "C2", "C3", "D1", "D2", "D3",
];

impl Platform {
    /// Deck slots in canonical order.
    pub fn deck_slots(&self) -> &'static [&'static str] {
        match self {
            Platform::Ot2 => &OT2_SLOTS,
            Platform::Flex => &FLEX_SLOTS,
        }
    }

    /// The OT-2 trash is fixed in slot 12, outside the usable sequence.
    pub fn default_trash_slot(&self) -> Option<&'static str> {
        match self {
            Platform::Ot2 => None,
            Platform::Flex => Some("A3"),
        }
    }

    pub fn default_pipette(&self) -> &'static str {
        match self {
            Platform::Ot2 => "p300_single_gen2",
            Platform::Flex => "flex_1channel_50",
        }
    }

    pub fn default_tip_rack(&self) -> &'static str {
        match self {
            Platform::Ot2 => "opentrons_96_tiprack_300ul",
            Platform::Flex => "opentrons_flex_96_tiprack_50ul",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Ot2 => write!(f, "OT-2"),
            Platform::Flex => write!(f, "Flex"),
        }
    }
}

/// Whether one tip serves the whole run or each transfer gets a fresh tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ReusePolicy {
    Never,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Mount {
    Left,
    Right,
}

impl fmt::Display for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mount::Left => write!(f, "left"),
            Mount::Right => write!(f, "right"),
        }
    }
}

/// Tip handling requested from the instrument for a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NewTip {
    Never,
    Always,
}

/// Labware as reported by the deck after loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Labware {
    pub load_name: String,
    pub slot: String,
    pub wells: Vec<WellId>,
}

impl Labware {
    pub fn has_well(&self, well: &WellId) -> bool {
        self.wells.contains(well)
    }

    /// Top of `well`, or `None` if the labware has no such well.
    pub fn position(&self, well: &WellId) -> Option<Position> {
        self.has_well(well).then(|| Position {
            slot: self.slot.clone(),
            load_name: self.load_name.clone(),
            well: well.clone(),
            height_above_bottom_mm: None,
        })
    }
}

/// A resolved point inside a loaded well.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub slot: String,
    pub load_name: String,
    pub well: WellId,
    pub height_above_bottom_mm: Option<f64>,
}

impl Position {
    pub fn bottom(mut self, z: f64) -> Self {
        self.height_above_bottom_mm = Some(z);
        self
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} on {}", self.well, self.load_name, self.slot)?;
        if let Some(z) = self.height_above_bottom_mm {
            write!(f, " ({} mm above bottom)", z)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LiquidId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedConsumable {
    pub slot: String,
    pub load_name: String,
}

/// Summary of one run, written as JSON next to the run output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub protocol: String,
    pub platform: Platform,
    pub dry_run: bool,
    pub labware: Vec<ResourceSlot>,
    pub tip_racks: Vec<LoadedConsumable>,
    pub tip_capacity: usize,
    pub transfers: usize,
    pub total_volume_ul: f64,
    pub tips_used: usize,
    pub pauses: usize,
    pub liquids: usize,
    pub wells_filled: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub fn new(protocol: impl Into<String>, platform: Platform) -> Self {
        Self {
            protocol: protocol.into(),
            platform,
            dry_run: false,
            labware: Vec::new(),
            tip_racks: Vec::new(),
            tip_capacity: 0,
            transfers: 0,
            total_volume_ul: 0.0,
            tips_used: 0,
            pauses: 0,
            liquids: 0,
            wells_filled: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_well() {
        assert_eq!(normalize_well("a1").unwrap(), "A1");
        assert_eq!(normalize_well("H12").unwrap(), "H12");
        assert_eq!(normalize_well("b02").unwrap(), "B2");
        assert_eq!(normalize_well(" c007 ").unwrap(), "C7");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["a1", "H12", "b02", "p24", "AF48"] {
            let once = normalize_well(raw).unwrap();
            assert_eq!(normalize_well(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_invalid_wells_are_rejected() {
        assert!(normalize_well("").is_err());
        assert!(normalize_well("A").is_err());
        assert!(normalize_well("12").is_err());
        assert!(normalize_well("A0").is_err());
        assert!(normalize_well("A1B").is_err());
    }

    #[test]
    fn test_well_ordering_is_numeric_by_column() {
        let mut wells: Vec<WellId> = ["A10", "B1", "A2"].iter().map(|w| w.parse().unwrap()).collect();
        wells.sort();
        let names: Vec<String> = wells.iter().map(|w| w.to_string()).collect();
        assert_eq!(names, vec!["A2", "A10", "B1"]);
    }

    #[test]
    fn test_resource_slot_structural_equality() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ResourceSlot::new("nest_12_reservoir_15ml", "2"));
        set.insert(ResourceSlot::new("nest_12_reservoir_15ml", "2"));
        set.insert(ResourceSlot::new("nest_12_reservoir_15ml", "3"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_labware_position() {
        let labware = Labware {
            load_name: "plate".to_string(),
            slot: "1".to_string(),
            wells: vec![WellId::new('a', 1)],
        };
        let pos = labware.position(&"A1".parse().unwrap()).unwrap().bottom(1.5);
        assert_eq!(pos.height_above_bottom_mm, Some(1.5));
        assert_eq!(pos.to_string(), "A1 of plate on 1 (1.5 mm above bottom)");
        assert!(labware.position(&"B1".parse().unwrap()).is_none());
    }

    #[test]
    fn test_platform_slots() {
        assert_eq!(Platform::Ot2.deck_slots().len(), 11);
        assert_eq!(Platform::Flex.deck_slots()[2], "A3");
        assert_eq!(Platform::Flex.default_trash_slot(), Some("A3"));
        assert_eq!(Platform::Ot2.default_trash_slot(), None);
    }

    #[test]
    fn test_well_id_serializes_as_string() {
        let well: WellId = "h09".parse().unwrap();
        assert_eq!(serde_json::to_string(&well).unwrap(), "\"H9\"");
        let back: WellId = serde_json::from_str("\"h09\"").unwrap();
        assert_eq!(back, well);
    }
}
