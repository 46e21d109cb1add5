use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

/// Canonical name every pipeline joins and matches on.
pub const MODEL_SKU_COLUMN: &str = "model_sku";

/// Column-name aliases tried in priority order before falling back to the
/// content-shape heuristic (first column whose leading value carries both a
/// letter and a digit).
pub const SKU_ALIASES: &[&str] = &["SKU", "商品SKU", "型号", "Product Code", "Model"];

/// A headered, rectangular view over a sheet. Cells are trimmed strings;
/// short rows are padded with empty strings, long rows truncated to the
/// header width.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table from a raw grid, taking `header_row` as the header and
    /// everything below it as data.
    pub fn from_grid(grid: &[Vec<String>], header_row: usize) -> Table {
        let Some(headers) = grid.get(header_row) else {
            return Table::default();
        };
        let headers: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();
        let width = headers.len();
        let rows = grid[header_row + 1..]
            .iter()
            .map(|row| {
                let mut cells: Vec<String> =
                    row.iter().take(width).map(|c| c.trim().to_string()).collect();
                cells.resize(width, String::new());
                cells
            })
            .collect();
        Table { headers, rows }
    }

    /// Parse pasted tab-separated text with a header row.
    pub fn parse_tsv(text: &str) -> Table {
        if text.trim().is_empty() {
            return Table::default();
        }
        let grid = parse_grid(text);
        let table = Table::from_grid(&grid, 0);
        info!(
            "parsed pasted data: {} rows, columns {:?}",
            table.rows.len(),
            table.headers
        );
        table
    }

    pub fn from_tsv_file(path: &Path, header_row: usize) -> Result<Table> {
        let grid = read_grid(path)?;
        Ok(Table::from_grid(&grid, header_row))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.column(from) {
            Some(i) => {
                self.headers[i] = to.to_string();
                true
            }
            None => false,
        }
    }

    pub fn push_column(&mut self, name: &str, values: Vec<String>) {
        self.headers.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        // keep the table rectangular if values came up short
        let width = self.headers.len();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
    }

    /// Header row first, then data rows. Ready for a sheet write or TSV dump.
    pub fn to_grid(&self) -> Vec<Vec<String>> {
        let mut grid = Vec::with_capacity(self.rows.len() + 1);
        grid.push(self.headers.clone());
        grid.extend(self.rows.iter().cloned());
        grid
    }
}

/// Locate the SKU column and rename it to `model_sku`. Returns the original
/// column name, or None when nothing plausible exists; callers decide
/// whether that is fatal (sync) or merely degrades matching (paste).
pub fn normalize_sku_column(table: &mut Table) -> Option<String> {
    if table.column(MODEL_SKU_COLUMN).is_some() {
        return Some(MODEL_SKU_COLUMN.to_string());
    }
    for alias in SKU_ALIASES {
        if table.rename_column(alias, MODEL_SKU_COLUMN) {
            info!("recognized SKU column '{alias}'");
            return Some((*alias).to_string());
        }
    }
    // Content-shape fallback: a SKU carries both a letter and a digit.
    for col in 0..table.headers.len() {
        let sample = table.cell(0, col);
        if sample.chars().any(|c| c.is_ascii_alphabetic())
            && sample.chars().any(|c| c.is_ascii_digit())
        {
            let original = table.headers[col].clone();
            info!("recognized SKU column '{original}' by content shape");
            table.headers[col] = MODEL_SKU_COLUMN.to_string();
            return Some(original);
        }
    }
    warn!("could not identify a SKU column; image matching will be skipped");
    None
}

fn parse_grid(text: &str) -> Vec<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut grid = Vec::new();
    for record in reader.records().flatten() {
        grid.push(record.iter().map(|c| c.trim().to_string()).collect());
    }
    grid
}

/// Read a TSV file as a raw grid of trimmed cells, no header interpretation.
pub fn read_grid(path: &Path) -> Result<Vec<Vec<String>>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_grid(&text))
}

/// Write a grid as TSV, one row per record.
pub fn write_grid(path: &Path, grid: &[Vec<String>]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in grid {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tsv_trims_and_pads() {
        let table = Table::parse_tsv("SKU\tName\tPrice\nH112218 \t Classic\nT0634101605700\tSeastar\t7300");
        assert_eq!(table.headers, vec!["SKU", "Name", "Price"]);
        assert_eq!(table.rows[0], vec!["H112218", "Classic", ""]);
        assert_eq!(table.rows[1], vec!["T0634101605700", "Seastar", "7300"]);
    }

    #[test]
    fn empty_text_yields_empty_table() {
        assert!(Table::parse_tsv("  \n ").is_empty());
    }

    #[test]
    fn from_grid_skips_leading_rows() {
        let grid = vec![
            vec!["junk".to_string()],
            vec!["also junk".to_string()],
            vec!["商品SKU".to_string(), "表款描述".to_string()],
            vec!["H112218".to_string(), "desc".to_string()],
        ];
        let table = Table::from_grid(&grid, 2);
        assert_eq!(table.headers, vec!["商品SKU", "表款描述"]);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn sku_alias_priority_order() {
        let mut table = Table::parse_tsv("型号\tSKU\nX1\tY2");
        // "SKU" outranks "型号" in the alias list.
        let original = normalize_sku_column(&mut table).unwrap();
        assert_eq!(original, "SKU");
        assert_eq!(table.headers, vec!["型号", "model_sku"]);
    }

    #[test]
    fn sku_heuristic_fallback() {
        let mut table = Table::parse_tsv("货号\t名称\nH112218\t腕表");
        let original = normalize_sku_column(&mut table).unwrap();
        assert_eq!(original, "货号");
        assert_eq!(table.column(MODEL_SKU_COLUMN), Some(0));
    }

    #[test]
    fn no_sku_column_found() {
        let mut table = Table::parse_tsv("名称\t价格\n腕表\t7300");
        assert_eq!(normalize_sku_column(&mut table), None);
    }

    #[test]
    fn push_column_keeps_rectangle() {
        let mut table = Table::parse_tsv("a\tb\n1\t2\n3\t4");
        table.push_column("c", vec!["x".to_string(), "y".to_string()]);
        assert_eq!(table.rows[1], vec!["3", "4", "y"]);
        let grid = table.to_grid();
        assert_eq!(grid[0], vec!["a", "b", "c"]);
    }
}
