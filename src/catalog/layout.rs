use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::catalog::{InstallmentBatch, InstallmentRow};
use crate::error::PipelineError;
use crate::normalize::has_cjk;
use crate::table::Table;

pub const PRICING_SKU_COLUMN: &str = "SKU";
const MSRP_COLUMN: &str = "建议零售价";
const INSTALLMENT_TIER_COLUMN: &str = "分期价";
const SERIES_COLUMN: &str = "二级系列";
const GENDER_COLUMN: &str = "性别";
const MOVEMENT_COLUMN: &str = "机芯类型";

static SKU_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^L\d").unwrap());
// Brand-prefixed product models embedded anywhere in a cell, e.g. L129194783.
static PRODUCT_SKU_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"L\d[A-Z0-9_.]+").unwrap());
static INSTALLMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)期").unwrap());

const TITLE_MAX_CHARS: usize = 20;
/// Boilerplate phrases that look like headings but are not.
const TITLE_DENYLIST: &[&str] = &["温馨提示", "品牌故事", "主KV", "部分商品参与满减"];

/// Approximation of the "bold section title" rule: short, purely descriptive
/// Chinese text with no model prefix, digits, or markup characters.
pub fn is_title_like(text: &str) -> bool {
    let text = text.trim();
    !text.is_empty()
        && !SKU_PREFIX_RE.is_match(text)
        && has_cjk(text)
        && !text
            .chars()
            .any(|c| c.is_ascii_digit() || matches!(c, '*' | '×' | '%' | '/' | '(' | ')'))
        && text.chars().count() <= TITLE_MAX_CHARS
        && !TITLE_DENYLIST.contains(&text)
}

/// Section headings and product occurrences found in one layout sheet pass.
/// Row indexes are relative to the scanned region and only used to compute
/// the nearest-preceding association.
#[derive(Debug, Default)]
pub struct LayoutScan {
    pub headings: Vec<(usize, String)>,
    pub products: Vec<(usize, String)>,
}

/// Classify every row: a heading iff it has exactly one non-empty cell that
/// passes `is_title_like`; otherwise every non-empty cell is scanned for
/// embedded product models.
pub fn scan_layout(grid: &[Vec<String>], skip_rows: usize) -> LayoutScan {
    let mut scan = LayoutScan::default();
    for (row_idx, row) in grid.iter().skip(skip_rows).enumerate() {
        let non_empty: Vec<&str> =
            row.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
        if non_empty.is_empty() {
            continue;
        }
        if non_empty.len() == 1 && is_title_like(non_empty[0]) {
            scan.headings.push((row_idx, non_empty[0].to_string()));
            continue;
        }
        for cell in non_empty {
            for m in PRODUCT_SKU_RE.find_iter(cell) {
                scan.products.push((row_idx, m.as_str().to_string()));
            }
        }
    }
    scan
}

/// Associate each product with its nearest preceding heading (the heading
/// with the largest row index not exceeding the product's row), then drop
/// duplicate SKUs keeping the first occurrence. A product above the first
/// heading gets an empty title.
///
/// Both vectors come out of `scan_layout` in row order, so a single
/// monotonic pass over the headings suffices.
pub fn associate_headings(scan: &LayoutScan) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut next_heading = 0;
    let mut current = "";
    for (row, sku) in &scan.products {
        while next_heading < scan.headings.len() && scan.headings[next_heading].0 <= *row {
            current = &scan.headings[next_heading].1;
            next_heading += 1;
        }
        if seen.insert(sku.clone()) {
            out.push((sku.clone(), current.to_string()));
        }
    }
    out
}

/// First run of digits directly before 期, e.g. "24期免息" -> 24.
fn parse_installments(text: &str) -> Option<u32> {
    INSTALLMENT_RE.captures(text).and_then(|c| c[1].parse().ok())
}

/// Round up to two decimals: multiply by 100, take the ceiling, divide back.
/// Zero and negative inputs stay 0.
pub fn ceil_to_two_decimals(price: f64) -> f64 {
    if price <= 0.0 {
        return 0.0;
    }
    (price * 100.0).ceil() / 100.0
}

/// Left-join associated products to the pricing sheet and compute installment
/// pricing. Division by a missing or zero installment count yields 0 rather
/// than failing; a zero price formats as an empty string.
pub fn build_installment_rows(
    associations: &[(String, String)],
    pricing: &Table,
) -> Result<InstallmentBatch, PipelineError> {
    let sku_col =
        pricing.column(PRICING_SKU_COLUMN).ok_or_else(|| PipelineError::SchemaMissing {
            column: PRICING_SKU_COLUMN.to_string(),
        })?;
    let series_col = pricing.column(SERIES_COLUMN);
    let gender_col = pricing.column(GENDER_COLUMN);
    let movement_col = pricing.column(MOVEMENT_COLUMN);
    let msrp_col = pricing.column(MSRP_COLUMN);
    let tier_col = pricing.column(INSTALLMENT_TIER_COLUMN);

    let mut by_sku: HashMap<&str, usize> = HashMap::new();
    for (i, row) in pricing.rows.iter().enumerate() {
        if let Some(key) = row.get(sku_col) {
            by_sku.entry(key.as_str()).or_insert(i);
        }
    }

    let rows = associations
        .iter()
        .enumerate()
        .map(|(i, (sku, title_b))| {
            let hit = by_sku.get(sku.as_str()).copied();
            let lookup = |col: Option<usize>| -> &str {
                match (hit, col) {
                    (Some(r), Some(c)) => pricing.cell(r, c),
                    _ => "",
                }
            };

            let installments = parse_installments(lookup(tier_col));
            let msrp: f64 = lookup(msrp_col).parse().unwrap_or(0.0);
            let raw = match installments {
                Some(n) if n > 0 => msrp / f64::from(n),
                _ => 0.0,
            };
            let price = ceil_to_two_decimals(raw);
            let installment_price =
                if price > 0.0 { format!("{price:.2}") } else { String::new() };

            // Series name, or the SKU when the sheet has no series column.
            let base = match series_col {
                Some(c) => hit.map(|r| pricing.cell(r, c)).unwrap_or(""),
                None => sku.as_str(),
            };
            let movement = match lookup(movement_col) {
                "自动上链机械机芯" => "机械",
                "石英机芯" => "石英",
                _ => "",
            };
            let gender = match lookup(gender_col) {
                "Men" => "男款",
                "Women" => "女款",
                _ => "",
            };
            let product_name =
                format!("{base}{movement}{gender}").replace("腕表", "").replace("码表", "");

            InstallmentRow {
                sort_order: i + 1,
                model_sku: sku.clone(),
                product_name,
                msrp,
                installment_price,
                installments,
                title_b: title_b.clone(),
                product_image: None,
                scene_image: None,
            }
        })
        .collect();

    let batch = InstallmentBatch { rows };
    info!("built {} installment rows", batch.rows.len());
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(cells: &[&[&str]]) -> Vec<Vec<String>> {
        cells
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn title_like_accepts_short_chinese_phrases() {
        assert!(is_title_like("活动"));
        assert!(is_title_like(" 开云系列精选 "));
    }

    #[test]
    fn title_like_rejections() {
        assert!(!is_title_like(""));
        assert!(!is_title_like("L129194783")); // model prefix
        assert!(!is_title_like("Summer Sale")); // no CJK
        assert!(!is_title_like("满300减50")); // digits
        assert!(!is_title_like("活动(全场)")); // markup characters
        assert!(!is_title_like("温馨提示")); // denylist
        assert!(!is_title_like(&"长".repeat(21))); // too long
    }

    #[test]
    fn heading_requires_single_non_empty_cell() {
        let g = grid(&[
            &["", "活动", ""],
            &["活动", "另一格", ""],
        ]);
        let scan = scan_layout(&g, 0);
        assert_eq!(scan.headings, vec![(0, "活动".to_string())]);
        assert!(scan.products.is_empty());
    }

    #[test]
    fn nearest_preceding_heading_wins() {
        let mut g = vec![vec![String::new()]; 9];
        g[5] = vec!["活动".to_string()];
        g[8] = vec!["主推 L129194783 款".to_string()];
        let scan = scan_layout(&g, 0);
        let assoc = associate_headings(&scan);
        assert_eq!(assoc, vec![("L129194783".to_string(), "活动".to_string())]);
    }

    #[test]
    fn product_above_first_heading_gets_empty_title() {
        let g = grid(&[
            &["L129194783"],
            &["新品上市"],
            &["L229214876"],
        ]);
        let assoc = associate_headings(&scan_layout(&g, 0));
        assert_eq!(assoc[0], ("L129194783".to_string(), String::new()));
        assert_eq!(assoc[1], ("L229214876".to_string(), "新品上市".to_string()));
    }

    #[test]
    fn duplicate_skus_keep_first_heading() {
        let g = grid(&[
            &["甲区"],
            &["L129194783"],
            &["乙区"],
            &["L129194783"],
        ]);
        let assoc = associate_headings(&scan_layout(&g, 0));
        assert_eq!(assoc, vec![("L129194783".to_string(), "甲区".to_string())]);
    }

    #[test]
    fn installment_count_extraction() {
        assert_eq!(parse_installments("24期免息"), Some(24));
        assert_eq!(parse_installments("支持12期分期"), Some(12));
        assert_eq!(parse_installments("免息"), None);
        assert_eq!(parse_installments(""), None);
    }

    #[test]
    fn ceil_rounds_up_at_two_decimals() {
        assert_eq!(ceil_to_two_decimals(608.333), 608.34);
        assert_eq!(ceil_to_two_decimals(0.0), 0.0);
        assert_eq!(ceil_to_two_decimals(-5.0), 0.0);
    }

    #[test]
    fn ceil_property_holds_for_samples() {
        for x in [0.001, 1.0, 2.5, 99.999, 608.333, 12345.678] {
            let y = ceil_to_two_decimals(x);
            let cents = y * 100.0;
            assert!((cents - cents.round()).abs() < 1e-6, "{y} not on a cent");
            assert!(cents + 1e-6 >= x * 100.0);
            assert!(cents - x * 100.0 < 1.0 + 1e-6);
        }
    }

    fn pricing(tsv: &str) -> Table {
        Table::parse_tsv(tsv)
    }

    #[test]
    fn installment_price_is_msrp_over_count_rounded_up() {
        let sheet = pricing(
            "SKU\t建议零售价\t分期价\t二级系列\t性别\t机芯类型\n\
             L129194783\t7300\t12期免息\t开创者\tMen\t自动上链机械机芯",
        );
        let assoc = vec![("L129194783".to_string(), "活动".to_string())];
        let batch = build_installment_rows(&assoc, &sheet).unwrap();
        let row = &batch.rows[0];
        // 7300 / 12 = 608.333... -> rounded up to 608.34
        assert_eq!(row.installment_price, "608.34");
        assert_eq!(row.installments, Some(12));
        assert_eq!(row.product_name, "开创者机械男款");
        assert_eq!(row.title_b, "活动");
    }

    #[test]
    fn zero_or_missing_count_yields_empty_price() {
        let sheet = pricing("SKU\t建议零售价\t分期价\nL129194783\t7300\t免息");
        let assoc = vec![("L129194783".to_string(), String::new())];
        let batch = build_installment_rows(&assoc, &sheet).unwrap();
        assert_eq!(batch.rows[0].installment_price, "");
        assert_eq!(batch.rows[0].installments, None);
    }

    #[test]
    fn missing_pricing_row_still_produces_output() {
        let sheet = pricing("SKU\t建议零售价\nL999\t100");
        let assoc = vec![("L129194783".to_string(), "活动".to_string())];
        let batch = build_installment_rows(&assoc, &sheet).unwrap();
        let row = &batch.rows[0];
        assert_eq!(row.msrp, 0.0);
        assert_eq!(row.installment_price, "");
        // No series column in the sheet: the SKU stands in as the base name.
        assert_eq!(row.product_name, "L129194783");
    }

    #[test]
    fn missing_sku_column_is_schema_error() {
        let sheet = pricing("型号\t建议零售价\nL129194783\t7300");
        let err = build_installment_rows(&[("L1".into(), String::new())], &sheet).unwrap_err();
        assert!(matches!(err, PipelineError::SchemaMissing { column } if column == "SKU"));
    }

    #[test]
    fn watch_suffixes_are_stripped_from_composed_name() {
        let sheet = pricing("SKU\t二级系列\t性别\nL129194783\t先行者腕表\tWomen");
        let assoc = vec![("L129194783".to_string(), String::new())];
        let batch = build_installment_rows(&assoc, &sheet).unwrap();
        assert_eq!(batch.rows[0].product_name, "先行者女款");
    }
}
