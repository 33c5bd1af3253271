use std::collections::BTreeMap;

use super::record::{FieldValue, Record};

/// A bounded window of daily samples, oldest first. `None` marks a day with
/// no data at all, which renders as a gap rather than a zero.
pub type Series = Vec<Option<f64>>;

/// One value in a shaped table. Scalars come from the query or from derived
/// columns; a `Series` cell is a sparkline awaiting rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    Absent,
    Series(Series),
}

impl From<&FieldValue> for Cell {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Int(value) => Self::Int(*value),
            FieldValue::Float(value) => Self::Float(*value),
            FieldValue::Text(value) => Self::Text(value.clone()),
            FieldValue::Absent => Self::Absent,
        }
    }
}

/// One table row before shaping: named cells, including derived columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: BTreeMap<String, Cell>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a row from a query record; derived columns are set on top.
    #[must_use]
    pub fn from_record(record: &Record) -> Self {
        let cells = record
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), Cell::from(value)))
            .collect();
        Self { cells }
    }

    pub fn set(&mut self, name: impl Into<String>, cell: Cell) {
        self.cells.insert(name.into(), cell);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.cells.get(name)
    }
}

/// Header plus data rows, positionally aligned, ready for HTML rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapedTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}
