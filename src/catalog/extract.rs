use std::collections::HashSet;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::normalize::has_cjk;

static SKU_CHARSET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9.\-]+$").unwrap());

const SKU_MIN_CHARS: usize = 6;
const SKU_MAX_CHARS: usize = 30;

/// A cell value is a SKU candidate iff all four hold: length 6 to 30, no CJK,
/// at least one digit, and only letters/digits/`.`/`-`.
pub fn is_sku_candidate(token: &str) -> bool {
    let len = token.chars().count();
    (SKU_MIN_CHARS..=SKU_MAX_CHARS).contains(&len)
        && !has_cjk(token)
        && token.chars().any(|c| c.is_ascii_digit())
        && SKU_CHARSET_RE.is_match(token)
}

/// Scan a board region for product models: every cell in the column band,
/// rows below `skip_rows`, in row-major encounter order. Accepted tokens are
/// upper-cased; exact duplicates keep their first occurrence.
///
/// Zero survivors is a recoverable "no data" outcome, not a failure.
pub fn extract_skus(grid: &[Vec<String>], skip_rows: usize, columns: Range<usize>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut skus = Vec::new();
    for row in grid.iter().skip(skip_rows) {
        for col in columns.clone() {
            let Some(cell) = row.get(col) else { continue };
            let token = cell.trim();
            if token.is_empty() || !is_sku_candidate(token) {
                continue;
            }
            let sku = token.to_uppercase();
            if seen.insert(sku.clone()) {
                skus.push(sku);
            }
        }
    }
    if skus.is_empty() {
        warn!("no valid product models found in the scanned board region");
    } else {
        info!("extracted {} distinct product models", skus.len());
    }
    skus
}
