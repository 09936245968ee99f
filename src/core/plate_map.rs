//! Headerless 96-well volume maps: the spreadsheet cell position is the
//! well address (row 1 is plate row A, column 1 is plate column 1) and the
//! cell value is the volume.

use crate::core::table::RawTable;
use crate::domain::model::WellId;
use crate::utils::error::{DeckError, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

pub const PLATE_ROWS: [char; 8] = ['A', 'B', 'C', 'D', 'E', 'F', 'G', 'H'];
pub const PLATE_COLUMNS: u32 = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlateMap {
    volumes: BTreeMap<WellId, f64>,
}

impl PlateMap {
    pub fn from_table(table: &RawTable) -> Result<Self> {
        if table.rows.len() != PLATE_ROWS.len() {
            return Err(DeckError::SchemaError {
                line: table.rows.last().map(|r| r.line).unwrap_or(1),
                message: format!(
                    "invalid number of rows: expected {}, but got {}",
                    PLATE_ROWS.len(),
                    table.rows.len()
                ),
                content: Vec::new(),
            });
        }

        let mut volumes = BTreeMap::new();
        for (row, letter) in table.rows.iter().zip(PLATE_ROWS) {
            if row.fields.len() != PLATE_COLUMNS as usize {
                return Err(DeckError::SchemaError {
                    line: row.line,
                    message: format!(
                        "invalid number of columns in row {}: expected {}, but got {}",
                        letter,
                        PLATE_COLUMNS,
                        row.fields.len()
                    ),
                    content: row.fields.clone(),
                });
            }
            for (idx, cell) in row.fields.iter().enumerate() {
                let well = WellId::new(letter, idx as u32 + 1);
                let volume: f64 = cell.trim().parse().map_err(|_| DeckError::FieldError {
                    line: row.line,
                    field: well.to_string(),
                    message: format!("'{}' is not a volume", cell),
                })?;
                if !volume.is_finite() || volume < 0.0 {
                    return Err(DeckError::FieldError {
                        line: row.line,
                        field: well.to_string(),
                        message: format!("'{}' is not a valid volume", cell),
                    });
                }
                volumes.insert(well, volume);
            }
        }
        Ok(Self { volumes })
    }

    pub fn volume(&self, well: &WellId) -> Option<f64> {
        self.volumes.get(well).copied()
    }

    pub fn total_volume(&self) -> f64 {
        self.volumes.values().sum()
    }

    /// `"A1=99, A2=97, ..., A12=94"` for one plate row.
    pub fn row_summary(&self, row: char) -> Option<String> {
        let row = row.to_ascii_uppercase();
        if !PLATE_ROWS.contains(&row) {
            return None;
        }
        let cells: Vec<String> = (1..=PLATE_COLUMNS)
            .map(|col| {
                let well = WellId::new(row, col);
                format!("{}={}", well, self.volumes.get(&well).copied().unwrap_or(0.0))
            })
            .collect();
        Some(cells.join(", "))
    }
}

impl fmt::Display for PlateMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Plate Layout:")?;
        let header: Vec<String> = (1..=PLATE_COLUMNS).map(|c| format!("{:>4}", c)).collect();
        writeln!(f, "    {}", header.join("  "))?;
        writeln!(f, "  {}", "-".repeat(74))?;
        for row in PLATE_ROWS {
            let cells: Vec<String> = (1..=PLATE_COLUMNS)
                .map(|col| {
                    let volume = self.volumes.get(&WellId::new(row, col)).copied().unwrap_or(0.0);
                    format!("{:>4}", volume)
                })
                .collect();
            writeln!(f, "{} | {}", row, cells.join("  "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: usize, cols: usize) -> RawTable {
        RawTable::from_rows((0..rows).map(|r| {
            (0..cols)
                .map(|c| format!("{}", 90 + (r * cols + c) % 10))
                .collect::<Vec<String>>()
        }))
    }

    #[test]
    fn test_full_plate_loads() {
        let map = PlateMap::from_table(&grid(8, 12)).unwrap();
        assert_eq!(map.volume(&"A1".parse().unwrap()), Some(90.0));
        assert_eq!(map.volume(&"A2".parse().unwrap()), Some(91.0));
        assert_eq!(map.volume(&"B1".parse().unwrap()), Some(92.0));
        assert_eq!(map.volume(&"I1".parse().unwrap()), None);
    }

    #[test]
    fn test_row_summary() {
        let map = PlateMap::from_table(&grid(8, 12)).unwrap();
        let summary = map.row_summary('a').unwrap();
        assert!(summary.starts_with("A1=90, A2=91, A3=92"));
        assert!(summary.ends_with("A12=91"));
        assert!(map.row_summary('Z').is_none());
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        assert!(PlateMap::from_table(&grid(7, 12)).is_err());
        match PlateMap::from_table(&grid(8, 11)).unwrap_err() {
            DeckError::SchemaError { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_cell_names_well() {
        let mut table = grid(8, 12);
        table.rows[2].fields[6] = "n/a".to_string();
        match PlateMap::from_table(&table).unwrap_err() {
            DeckError::FieldError { line, field, .. } => {
                assert_eq!(line, 3);
                assert_eq!(field, "C7");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_display_layout() {
        let map = PlateMap::from_table(&grid(8, 12)).unwrap();
        let text = map.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Plate Layout:");
        assert_eq!(lines.len(), 11);
        assert!(lines[3].starts_with("A |   90    91"));
    }
}
