use std::collections::HashMap;

use crate::catalog::{CatalogBatch, CatalogRow, PriceColumn};
use crate::error::PipelineError;
use crate::normalize::normalize_product_name;
use crate::table::Table;

pub const SKU_COLUMN: &str = "商品SKU";
pub const DESCRIPTION_COLUMN: &str = "表款描述";

/// Left-join extracted SKUs against the selection sheet, normalize every
/// description, and project to the output schema. Both join sides must
/// already be upper-cased; the compare here is plain string equality.
///
/// A missing SKU column is a hard failure for this merge. A missing
/// description falls back to the SKU itself. Price columns absent from the
/// selection sheet are omitted from the batch, never invented.
pub fn merge_with_selection(
    skus: &[String],
    selection: &Table,
) -> Result<CatalogBatch, PipelineError> {
    let sku_col = selection.column(SKU_COLUMN).ok_or_else(|| PipelineError::SchemaMissing {
        column: SKU_COLUMN.to_string(),
    })?;
    let desc_col = selection.column(DESCRIPTION_COLUMN);
    let price_columns: Vec<PriceColumn> = PriceColumn::ALL
        .into_iter()
        .filter(|p| selection.column(p.source()).is_some())
        .collect();

    // First occurrence wins when the selection sheet repeats a SKU.
    let mut by_sku: HashMap<&str, usize> = HashMap::new();
    for (i, row) in selection.rows.iter().enumerate() {
        if let Some(key) = row.get(sku_col) {
            by_sku.entry(key.as_str()).or_insert(i);
        }
    }

    let rows = skus
        .iter()
        .enumerate()
        .map(|(i, sku)| {
            let hit = by_sku.get(sku.as_str()).copied();
            let description = hit
                .and_then(|r| desc_col.map(|c| selection.cell(r, c)))
                .filter(|d| !d.is_empty())
                .unwrap_or(sku);
            let (brand, product_name) = normalize_product_name(description);

            let price = |column: PriceColumn| -> Option<String> {
                if !price_columns.contains(&column) {
                    return None;
                }
                let col = selection.column(column.source())?;
                Some(hit.map(|r| selection.cell(r, col).to_string()).unwrap_or_default())
            };

            CatalogRow {
                sort_order: i + 1,
                brand_name: brand.map(str::to_string),
                model_sku: sku.clone(),
                product_name,
                msrp: price(PriceColumn::Msrp),
                sales_price: price(PriceColumn::SalesPrice),
                final_price: price(PriceColumn::FinalPrice),
                product_image: None,
                scene_image: None,
            }
        })
        .collect();

    Ok(CatalogBatch { price_columns, rows })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(tsv: &str) -> Table {
        Table::parse_tsv(tsv)
    }

    fn skus(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn missing_sku_column_is_a_hard_error() {
        let sheet = selection("表款描述\t公价\n天梭男表\t7300");
        let err = merge_with_selection(&skus(&["H112218"]), &sheet).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMissing { column } if column == "商品SKU"));
    }

    #[test]
    fn joins_and_normalizes_descriptions() {
        let sheet = selection(
            "商品SKU\t表款描述\t公价\t销售价\nT0634101605700\t天梭阿波罗系列男表\t7300\t5100",
        );
        let batch = merge_with_selection(&skus(&["T0634101605700"]), &sheet).unwrap();
        let row = &batch.rows[0];
        assert_eq!(row.brand_name.as_deref(), Some("天梭"));
        assert_eq!(row.product_name, "阿波罗系列男表");
        assert_eq!(row.msrp.as_deref(), Some("7300"));
        assert_eq!(row.sales_price.as_deref(), Some("5100"));
        assert_eq!(row.final_price, None);
    }

    #[test]
    fn unmatched_sku_falls_back_to_itself() {
        let sheet = selection("商品SKU\t表款描述\nH112218\t汉米尔顿卡其野战腕表");
        let batch = merge_with_selection(&skus(&["H112218", "T0634101605700"]), &sheet).unwrap();
        assert_eq!(batch.rows[1].model_sku, "T0634101605700");
        // The SKU itself stands in for the missing description, and the
        // normalizer appends the generic suffix to it.
        assert_eq!(batch.rows[1].product_name, "T0634101605700腕表");
        assert_eq!(batch.rows[1].brand_name, None);
    }

    #[test]
    fn sort_order_is_contiguous_after_dedup() {
        let sheet = selection("商品SKU\t表款描述\nA\tb");
        let batch =
            merge_with_selection(&skus(&["H112218", "T0634101605700", "M86004268"]), &sheet)
                .unwrap();
        let orders: Vec<usize> = batch.rows.iter().map(|r| r.sort_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn absent_price_columns_are_omitted_from_grid() {
        let sheet = selection("商品SKU\t表款描述\t券后价\nH112218\t男表\t4300");
        let batch = merge_with_selection(&skus(&["H112218"]), &sheet).unwrap();
        assert_eq!(batch.price_columns, vec![PriceColumn::FinalPrice]);
        let grid = batch.to_grid();
        assert_eq!(
            grid[0],
            vec!["sort_order", "brand_name", "model_sku", "product_name", "final_price"]
        );
        assert_eq!(grid[1][4], "4300");
    }
}
