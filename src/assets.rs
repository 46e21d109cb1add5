use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::table::{Table, MODEL_SKU_COLUMN};

pub const PRODUCT_IMAGE_COLUMN: &str = "product_image";
pub const SCENE_IMAGE_COLUMN: &str = "scene_image";

/// Case-folded filename index over one remote folder: upper-cased filename
/// stem (extension dropped) -> opaque asset reference.
///
/// Entries keep their listing position; inserting a duplicate stem overwrites
/// the stored reference in place (last listing wins) without moving the key.
/// The substring fallback in `resolve` walks entries in that listing order;
/// a deliberately weak tie-break carried over from the source system, not a
/// bug to fix.
#[derive(Debug, Clone, Default)]
pub struct AssetIndex {
    positions: HashMap<String, usize>,
    entries: Vec<(String, String)>,
}

impl AssetIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file_name: &str, reference: String) {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name)
            .to_uppercase();
        match self.positions.get(&stem) {
            Some(&i) => self.entries[i].1 = reference,
            None => {
                self.positions.insert(stem.clone(), self.entries.len());
                self.entries.push((stem, reference));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact-then-substring lookup. An exact stem hit always wins; otherwise
    /// the first stem in listing order containing the SKU (covers suffixed
    /// names like `H112218_DETAIL`). Empty SKU and no hit both yield "".
    pub fn resolve(&self, sku: &str) -> &str {
        if sku.is_empty() {
            return "";
        }
        if let Some(&i) = self.positions.get(sku) {
            return &self.entries[i].1;
        }
        for (stem, reference) in &self.entries {
            if stem.contains(sku) {
                return reference;
            }
        }
        ""
    }
}

/// Append both image columns to a free-form table keyed by `model_sku`,
/// force-uppercasing the SKUs first. Returns false (table untouched) when
/// the column is absent; a SKU with no match gets empty strings.
pub fn attach_images_to_table(table: &mut Table, product: &AssetIndex, scene: &AssetIndex) -> bool {
    let Some(sku_col) = table.column(MODEL_SKU_COLUMN) else {
        return false;
    };
    for row in &mut table.rows {
        if let Some(cell) = row.get_mut(sku_col) {
            *cell = cell.trim().to_uppercase();
        }
    }
    let product_links: Vec<String> =
        table.rows.iter().map(|r| product.resolve(&r[sku_col]).to_string()).collect();
    let scene_links: Vec<String> =
        table.rows.iter().map(|r| scene.resolve(&r[sku_col]).to_string()).collect();
    table.push_column(PRODUCT_IMAGE_COLUMN, product_links);
    table.push_column(SCENE_IMAGE_COLUMN, scene_links);
    info!("matched image links for {} rows", table.rows.len());
    true
}
