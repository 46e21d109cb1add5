pub mod extract;
pub mod layout;
pub mod merge;

use std::ops::Range;

use crate::assets::AssetIndex;

/// Board region of the B2C workbook: product models live in columns C..F
/// starting at the seventh row.
pub const BOARD_SKIP_ROWS: usize = 6;
pub const BOARD_COLUMNS: Range<usize> = 2..6;
/// The selection sheet carries two banner rows above its header.
pub const SELECTION_HEADER_ROW: usize = 2;
/// The layout sheet carries two header rows before content.
pub const LAYOUT_SKIP_ROWS: usize = 2;

/// Price columns of the B2C output. A column is emitted only when its source
/// column exists in the selection sheet; absent sources are never invented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceColumn {
    Msrp,
    SalesPrice,
    FinalPrice,
}

impl PriceColumn {
    pub const ALL: [PriceColumn; 3] =
        [PriceColumn::Msrp, PriceColumn::SalesPrice, PriceColumn::FinalPrice];

    pub fn source(self) -> &'static str {
        match self {
            PriceColumn::Msrp => "公价",
            PriceColumn::SalesPrice => "销售价",
            PriceColumn::FinalPrice => "券后价",
        }
    }

    pub fn output(self) -> &'static str {
        match self {
            PriceColumn::Msrp => "msrp",
            PriceColumn::SalesPrice => "sales_price",
            PriceColumn::FinalPrice => "final_price",
        }
    }
}

/// One enriched B2C product row. Prices are pass-through strings from the
/// selection sheet; the image fields stay `None` until matching runs (a
/// matching miss is `Some("")`, never an error).
#[derive(Debug, Clone)]
pub struct CatalogRow {
    pub sort_order: usize,
    pub brand_name: Option<String>,
    pub model_sku: String,
    pub product_name: String,
    pub msrp: Option<String>,
    pub sales_price: Option<String>,
    pub final_price: Option<String>,
    pub product_image: Option<String>,
    pub scene_image: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogBatch {
    pub price_columns: Vec<PriceColumn>,
    pub rows: Vec<CatalogRow>,
}

impl CatalogBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Resolve both asset lookups for every row. SKUs are force-uppercased
    /// first even though extraction already canonicalizes them.
    pub fn attach_images(&mut self, product: &AssetIndex, scene: &AssetIndex) {
        for row in &mut self.rows {
            row.model_sku = row.model_sku.trim().to_uppercase();
            row.product_image = Some(product.resolve(&row.model_sku).to_string());
            row.scene_image = Some(scene.resolve(&row.model_sku).to_string());
        }
    }

    pub fn to_grid(&self) -> Vec<Vec<String>> {
        let with_images = self.rows.iter().any(|r| r.product_image.is_some());
        let mut headers = vec![
            "sort_order".to_string(),
            "brand_name".to_string(),
            "model_sku".to_string(),
            "product_name".to_string(),
        ];
        headers.extend(self.price_columns.iter().map(|p| p.output().to_string()));
        if with_images {
            headers.push("product_image".to_string());
            headers.push("scene_image".to_string());
        }

        let mut grid = vec![headers];
        for row in &self.rows {
            let mut cells = vec![
                row.sort_order.to_string(),
                row.brand_name.clone().unwrap_or_default(),
                row.model_sku.clone(),
                row.product_name.clone(),
            ];
            for price in &self.price_columns {
                let value = match price {
                    PriceColumn::Msrp => &row.msrp,
                    PriceColumn::SalesPrice => &row.sales_price,
                    PriceColumn::FinalPrice => &row.final_price,
                };
                cells.push(value.clone().unwrap_or_default());
            }
            if with_images {
                cells.push(row.product_image.clone().unwrap_or_default());
                cells.push(row.scene_image.clone().unwrap_or_default());
            }
            grid.push(cells);
        }
        grid
    }
}

/// One layout-variant row with computed installment pricing.
#[derive(Debug, Clone)]
pub struct InstallmentRow {
    pub sort_order: usize,
    pub model_sku: String,
    pub product_name: String,
    pub msrp: f64,
    /// Formatted to two decimals, empty when the computed price is zero.
    pub installment_price: String,
    pub installments: Option<u32>,
    pub title_b: String,
    pub product_image: Option<String>,
    pub scene_image: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InstallmentBatch {
    pub rows: Vec<InstallmentRow>,
}

impl InstallmentBatch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn attach_images(&mut self, product: &AssetIndex, scene: &AssetIndex) {
        for row in &mut self.rows {
            row.model_sku = row.model_sku.trim().to_uppercase();
            row.product_image = Some(product.resolve(&row.model_sku).to_string());
            row.scene_image = Some(scene.resolve(&row.model_sku).to_string());
        }
    }

    pub fn to_grid(&self) -> Vec<Vec<String>> {
        let with_images = self.rows.iter().any(|r| r.product_image.is_some());
        let mut headers = vec![
            "sort_order".to_string(),
            "model_sku".to_string(),
            "product_name".to_string(),
            "msrp".to_string(),
            "installment_price".to_string(),
            "installments".to_string(),
            "title_b".to_string(),
        ];
        if with_images {
            headers.push("product_image".to_string());
            headers.push("scene_image".to_string());
        }

        let mut grid = vec![headers];
        for row in &self.rows {
            let msrp = if row.msrp.fract() == 0.0 {
                format!("{:.0}", row.msrp)
            } else {
                format!("{}", row.msrp)
            };
            let mut cells = vec![
                row.sort_order.to_string(),
                row.model_sku.clone(),
                row.product_name.clone(),
                msrp,
                row.installment_price.clone(),
                row.installments.map(|n| n.to_string()).unwrap_or_default(),
                row.title_b.clone(),
            ];
            if with_images {
                cells.push(row.product_image.clone().unwrap_or_default());
                cells.push(row.scene_image.clone().unwrap_or_default());
            }
            grid.push(cells);
        }
        grid
    }
}
