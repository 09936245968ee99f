//! Typed row mapping.
//!
//! Every record type declares its header schema up front. A row is turned
//! into a header -> value view, then parsed field by field; the first field
//! that cannot be coerced aborts with a [`DeckError::FieldError`] naming the
//! line and the header.

use crate::core::table::{
    canonical_header, read_table, validate, HeaderContract, HeaderMode, RawRow, ValidatedTable,
};
use crate::domain::model::{LiquidDestination, SourceLocation, Transfer, WellId, WellLocation};
use crate::utils::error::{DeckError, Result};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::marker::PhantomData;
use std::sync::LazyLock;

static COLOR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#(?:[0-9A-Fa-f]{6}|[0-9A-Fa-f]{8})$").expect("color pattern is valid")
});

/// How a row's values are associated with header names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingMode {
    /// Values are taken by index; the file's header order must equal the
    /// record's declared order.
    Positional,
    /// Values are looked up by header name; any header order works.
    Associative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MappingOptions {
    pub well_delimiter: char,
    pub max_liquid_volume_ul: Option<f64>,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            well_delimiter: ';',
            max_liquid_volume_ul: Some(100.0),
        }
    }
}

pub trait TableRecord: Sized {
    const HEADERS: &'static [&'static str];

    fn from_row(row: &RowView<'_>, options: &MappingOptions) -> Result<Self>;
}

/// Header -> value view of one data row.
#[derive(Debug)]
pub struct RowView<'a> {
    line: usize,
    values: HashMap<String, &'a str>,
}

impl<'a> RowView<'a> {
    pub fn line(&self) -> usize {
        self.line
    }

    fn field_error(&self, field: &str, message: impl Into<String>) -> DeckError {
        DeckError::FieldError {
            line: self.line,
            field: field.to_string(),
            message: message.into(),
        }
    }

    fn raw(&self, field: &str) -> Result<&'a str> {
        let value = self
            .values
            .get(&canonical_header(field))
            .copied()
            .ok_or_else(|| self.field_error(field, "required field is missing"))?;
        let value = value.trim();
        if value.is_empty() {
            return Err(self.field_error(field, "field is empty"));
        }
        Ok(value)
    }

    pub fn text(&self, field: &str) -> Result<String> {
        self.raw(field).map(str::to_string)
    }

    pub fn float(&self, field: &str) -> Result<f64> {
        let raw = self.raw(field)?;
        let value: f64 = raw
            .parse()
            .map_err(|_| self.field_error(field, format!("'{}' is not a number", raw)))?;
        if !value.is_finite() {
            return Err(self.field_error(field, format!("'{}' is not a finite number", raw)));
        }
        Ok(value)
    }

    pub fn integer(&self, field: &str) -> Result<i64> {
        let raw = self.raw(field)?;
        raw.parse()
            .map_err(|_| self.field_error(field, format!("'{}' is not an integer", raw)))
    }

    pub fn well(&self, field: &str) -> Result<WellId> {
        let raw = self.raw(field)?;
        raw.parse().map_err(|e: String| self.field_error(field, e))
    }

    pub fn wells(&self, field: &str, delimiter: char) -> Result<BTreeSet<WellId>> {
        let raw = self.raw(field)?;
        let mut wells = BTreeSet::new();
        for token in raw.split(delimiter) {
            let token = token.trim();
            if token.is_empty() {
                return Err(self.field_error(field, format!("'{}' contains an empty well", raw)));
            }
            let well: WellId = token.parse().map_err(|e: String| self.field_error(field, e))?;
            wells.insert(well);
        }
        Ok(wells)
    }
}

/// Maps validated rows into `T`, either by position or by header name.
#[derive(Debug, Clone)]
pub struct RecordMapper<T: TableRecord> {
    mode: MappingMode,
    keys: Vec<String>,
    options: MappingOptions,
    _record: PhantomData<T>,
}

impl<T: TableRecord> RecordMapper<T> {
    pub fn new(mode: MappingMode, headers: &[String], options: MappingOptions) -> Result<Self> {
        let declared: Vec<String> = T::HEADERS.iter().map(|h| canonical_header(h)).collect();
        let keys = match mode {
            MappingMode::Positional => {
                let found: Vec<String> = headers.iter().map(|h| canonical_header(h)).collect();
                if found != declared {
                    return Err(DeckError::SchemaError {
                        line: 1,
                        message: format!(
                            "positional mapping needs headers {:?} in this order, but got {:?}",
                            declared, found
                        ),
                        content: headers.to_vec(),
                    });
                }
                declared
            }
            MappingMode::Associative => headers.iter().map(|h| canonical_header(h)).collect(),
        };
        Ok(Self {
            mode,
            keys,
            options,
            _record: PhantomData,
        })
    }

    pub fn mode(&self) -> MappingMode {
        self.mode
    }

    pub fn map(&self, row: &RawRow) -> Result<T> {
        let values = self
            .keys
            .iter()
            .cloned()
            .zip(row.fields.iter().map(String::as_str))
            .collect();
        let view = RowView {
            line: row.line,
            values,
        };
        T::from_row(&view, &self.options)
    }

    pub fn map_all(&self, table: &ValidatedTable) -> Result<Vec<T>> {
        let records = table
            .rows
            .iter()
            .map(|row| self.map(row))
            .collect::<Result<Vec<T>>>()?;
        tracing::debug!("Mapped {} records ({:?})", records.len(), self.mode);
        Ok(records)
    }
}

/// Read, validate and map a whole CSV file in one go.
///
/// Strict header matching maps rows by position; set-based matching maps
/// them by header name.
pub fn parse_table<T: TableRecord>(
    bytes: &[u8],
    mode: HeaderMode,
    options: MappingOptions,
) -> Result<Vec<T>> {
    let raw = read_table(bytes)?;
    let contract = match mode {
        HeaderMode::Strict => HeaderContract::strict(T::HEADERS),
        HeaderMode::Set => HeaderContract::set(T::HEADERS),
    };
    let table = validate(&raw, &contract)?;
    let mapping = match mode {
        HeaderMode::Strict => MappingMode::Positional,
        HeaderMode::Set => MappingMode::Associative,
    };
    RecordMapper::<T>::new(mapping, &table.headers, options)?.map_all(&table)
}

impl TableRecord for Transfer {
    const HEADERS: &'static [&'static str] = &[
        "source_labware",
        "source_slot",
        "source_well",
        "source_height_above_bottom_mm",
        "destination_labware",
        "destination_slot",
        "destination_well",
        "volume_μl",
    ];

    fn from_row(row: &RowView<'_>, _options: &MappingOptions) -> Result<Self> {
        let height = row.float("source_height_above_bottom_mm")?;
        if height < 0.0 {
            return Err(row.field_error(
                "source_height_above_bottom_mm",
                "height above bottom cannot be negative",
            ));
        }
        let volume = row.float("volume_μl")?;
        if volume <= 0.0 {
            return Err(row.field_error("volume_μl", "volume must be greater than 0"));
        }

        Ok(Transfer {
            source: SourceLocation {
                labware: row.text("source_labware")?,
                slot: row.text("source_slot")?,
                well: row.well("source_well")?,
                height_above_bottom_mm: height,
            },
            destination: WellLocation {
                labware: row.text("destination_labware")?,
                slot: row.text("destination_slot")?,
                well: row.well("destination_well")?,
            },
            volume_ul: volume,
        })
    }
}

impl TableRecord for LiquidDestination {
    const HEADERS: &'static [&'static str] = &[
        "labware_load_name",
        "slot",
        "wells",
        "name",
        "description",
        "display_color",
        "volume",
    ];

    fn from_row(row: &RowView<'_>, options: &MappingOptions) -> Result<Self> {
        let volume = row.float("volume")?;
        let in_range = match options.max_liquid_volume_ul {
            Some(max) => volume > 0.0 && volume <= max,
            None => volume > 0.0,
        };
        if !in_range {
            let message = match options.max_liquid_volume_ul {
                Some(max) => format!(
                    "volume must be greater than 0 and less than or equal to {}",
                    max
                ),
                None => "volume must be greater than 0".to_string(),
            };
            return Err(row.field_error("volume", message));
        }

        let display_color = row.text("display_color")?;
        if !COLOR_PATTERN.is_match(&display_color) {
            return Err(row.field_error(
                "display_color",
                format!("'{}' is not a hex color like #1CE6FF", display_color),
            ));
        }

        Ok(LiquidDestination {
            labware: row.text("labware_load_name")?,
            slot: row.text("slot")?,
            wells: row.wells("wells", options.well_delimiter)?,
            name: row.text("name")?,
            description: row.text("description")?,
            display_color,
            volume_ul: volume,
        })
    }
}
