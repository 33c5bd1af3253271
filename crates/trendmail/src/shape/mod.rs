use crate::models::{Row, ShapedTable};

/// A row was missing a column named in the requested column order.
#[derive(Debug)]
pub struct SchemaError {
    pub column: String,
    pub row_index: usize,
}

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "row {} is missing column `{}` named in the column order",
            self.row_index, self.column
        )
    }
}

impl std::error::Error for SchemaError {}

/// Converts named rows into a positional grid: header equals
/// `column_order`, each data row carries the cells in that exact order.
/// Row order is preserved; no re-sorting happens here. Columns present on
/// a row but not named in the order are dropped; a named column missing
/// from any row is a `SchemaError`, with no defaulting.
pub fn to_grid(rows: &[Row], column_order: &[&str]) -> Result<ShapedTable, SchemaError> {
    let header = column_order
        .iter()
        .map(|column| (*column).to_string())
        .collect();
    let mut data_rows = Vec::with_capacity(rows.len());
    for (row_index, row) in rows.iter().enumerate() {
        let mut cells = Vec::with_capacity(column_order.len());
        for column in column_order {
            match row.get(column) {
                Some(cell) => cells.push(cell.clone()),
                None => {
                    return Err(SchemaError {
                        column: (*column).to_string(),
                        row_index,
                    });
                }
            }
        }
        data_rows.push(cells);
    }
    Ok(ShapedTable {
        header,
        rows: data_rows,
    })
}
