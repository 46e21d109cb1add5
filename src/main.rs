mod assets;
mod catalog;
mod config;
mod drive;
mod error;
mod jobs;
mod normalize;
mod slices;
mod table;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::assets::AssetIndex;
use crate::catalog::{extract, layout, merge};
use crate::drive::{DriveClient, SheetBackend, SheetsClient};
use crate::jobs::{JobStore, MemoryJobStore};
use crate::table::Table;

#[derive(Parser)]
#[command(name = "catalog_sync", about = "Catalog normalization and image matching pipelines")]
struct Cli {
    /// Project registry (json map of project key -> drive folder)
    #[arg(long, default_value = "config.json", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract SKUs from a planning-board export and merge with the selection sheet
    Enrich {
        /// Planning-board export (TSV)
        board: PathBuf,
        /// Selection sheet with 商品SKU / 表款描述 / price columns (TSV)
        selection: PathBuf,
        /// Output file (TSV)
        #[arg(short, long, default_value = "enriched.tsv")]
        out: PathBuf,
        /// Project key for image matching (skipped when omitted)
        #[arg(short, long)]
        project: Option<String>,
        /// Spreadsheet URL or id to push the result to
        #[arg(long)]
        sheet: Option<String>,
    },
    /// Scan a layout sheet for headings and products, price installments
    Layout {
        /// Layout sheet export (TSV)
        layout: PathBuf,
        /// Pricing sheet with SKU / 建议零售价 / 分期价 columns (TSV)
        pricing: PathBuf,
        /// Output file (TSV)
        #[arg(short, long, default_value = "installments.tsv")]
        out: PathBuf,
        /// Project key for image matching (skipped when omitted)
        #[arg(short, long)]
        project: Option<String>,
        /// Spreadsheet URL or id to push the result to
        #[arg(long)]
        sheet: Option<String>,
    },
    /// Match image links onto pasted tabular data
    Paste {
        /// File holding the pasted rows (TSV with a header row)
        input: PathBuf,
        /// Output file (TSV)
        #[arg(short, long, default_value = "matched.tsv")]
        out: PathBuf,
        /// Project key for image matching
        #[arg(short, long)]
        project: String,
    },
    /// Rewrite a spreadsheet in place with image links added
    Sync {
        /// Spreadsheet URL or id
        sheet: String,
        /// Project key for image matching
        #[arg(short, long)]
        project: String,
    },
    /// Rename and recompress every image in a folder
    Slices {
        /// Folder of jpg/jpeg/png files
        folder: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let store = MemoryJobStore::new();

    let result = match cli.command {
        Commands::Enrich { board, selection, out, project, sheet } => {
            let job = job_id("enrich");
            store.create(&job);
            // Settled exactly once at the job boundary, so a failure on any
            // step still leaves the job terminal instead of stuck mid-run.
            let run = async {
                store.update(&job, "extracting SKUs from planning board", 10);
                let grid = table::read_grid(&board)?;
                let skus =
                    extract::extract_skus(&grid, catalog::BOARD_SKIP_ROWS, catalog::BOARD_COLUMNS);
                if skus.is_empty() {
                    anyhow::bail!("no SKUs found in {}", board.display());
                }
                info!("extracted {} SKUs", skus.len());

                store.update(&job, "merging with selection sheet", 30);
                let selection = Table::from_tsv_file(&selection, catalog::SELECTION_HEADER_ROW)?;
                let mut batch = merge::merge_with_selection(&skus, &selection)?;

                store.update(&job, "matching images", 60);
                if let Some((product, scene)) =
                    load_indexes(&cli.config, project.as_deref()).await?
                {
                    batch.attach_images(&product, &scene);
                }

                store.update(&job, "writing output", 85);
                let grid = batch.to_grid();
                table::write_grid(&out, &grid)?;
                push_to_sheet(sheet.as_deref(), &grid).await?;
                println!("Wrote {} rows to {}", grid.len() - 1, out.display());
                anyhow::Ok(())
            };
            jobs::finalize(&store, &job, run.await, "enrichment complete")
        }
        Commands::Layout { layout: layout_path, pricing, out, project, sheet } => {
            let job = job_id("layout");
            store.create(&job);
            let run = async {
                store.update(&job, "scanning layout sheet", 10);
                let grid = table::read_grid(&layout_path)?;
                let scan = layout::scan_layout(&grid, catalog::LAYOUT_SKIP_ROWS);
                let associations = layout::associate_headings(&scan);
                if associations.is_empty() {
                    anyhow::bail!("no products found in {}", layout_path.display());
                }
                info!(
                    "found {} headings and {} products",
                    scan.headings.len(),
                    associations.len()
                );

                store.update(&job, "pricing installments", 40);
                let pricing = Table::from_tsv_file(&pricing, 0)?;
                let mut batch = layout::build_installment_rows(&associations, &pricing)?;

                store.update(&job, "matching images", 70);
                if let Some((product, scene)) =
                    load_indexes(&cli.config, project.as_deref()).await?
                {
                    batch.attach_images(&product, &scene);
                }

                store.update(&job, "writing output", 90);
                let grid = batch.to_grid();
                table::write_grid(&out, &grid)?;
                push_to_sheet(sheet.as_deref(), &grid).await?;
                println!("Wrote {} rows to {}", grid.len() - 1, out.display());
                anyhow::Ok(())
            };
            jobs::finalize(&store, &job, run.await, "layout processing complete")
        }
        Commands::Paste { input, out, project } => {
            let job = job_id("paste");
            store.create(&job);
            let run = async {
                store.update(&job, "parsing pasted data", 10);
                let text = std::fs::read_to_string(&input)
                    .with_context(|| format!("failed to read {}", input.display()))?;
                let mut table = Table::parse_tsv(&text);
                if table.is_empty() {
                    anyhow::bail!("no rows found in {}", input.display());
                }

                store.update(&job, "matching images", 40);
                if table::normalize_sku_column(&mut table).is_some() {
                    if let Some((product, scene)) =
                        load_indexes(&cli.config, Some(&project)).await?
                    {
                        assets::attach_images_to_table(&mut table, &product, &scene);
                    }
                }

                store.update(&job, "writing output", 85);
                table::write_grid(&out, &table.to_grid())?;
                println!("Wrote {} rows to {}", table.rows.len(), out.display());
                anyhow::Ok(())
            };
            jobs::finalize(&store, &job, run.await, "paste matching complete")
        }
        Commands::Sync { sheet, project } => {
            let job = job_id("sync");
            store.create(&job);
            let run = async {
                let spreadsheet_id = drive::extract_spreadsheet_id(&sheet)
                    .context("not a spreadsheet URL or id")?;
                let sheets = SheetsClient::new(access_token()?);

                store.update(&job, "reading spreadsheet", 10);
                let grid = sheets.read_grid(&spreadsheet_id).await?;
                let mut table = Table::from_grid(&grid, 0);
                if table.is_empty() {
                    anyhow::bail!("spreadsheet {spreadsheet_id} has no data rows");
                }
                table::normalize_sku_column(&mut table).ok_or(
                    error::PipelineError::SchemaMissing {
                        column: table::MODEL_SKU_COLUMN.to_string(),
                    },
                )?;

                store.update(&job, "matching images", 40);
                // Unlike the file-output pipelines, sync rewrites its source
                // sheet in place; abort rather than clear-and-rewrite an
                // unmodified table.
                let (product, scene) = load_indexes(&cli.config, Some(&project))
                    .await?
                    .context("image folders unavailable; nothing to sync")?;
                assets::attach_images_to_table(&mut table, &product, &scene);

                store.update(&job, "writing spreadsheet", 80);
                sheets.replace_grid(&spreadsheet_id, &table.to_grid()).await?;
                println!("Synced {} rows back to the sheet", table.rows.len());
                anyhow::Ok(())
            };
            jobs::finalize(&store, &job, run.await, "sheet sync complete")
        }
        Commands::Slices { folder } => {
            let summary = slices::process_folder(&folder)?;
            println!(
                "Processed {} images: {} compressed, {} over the size limit",
                summary.total,
                summary.compressed,
                summary.failed.len()
            );
            for path in &summary.failed {
                println!("  still oversized: {}", path.display());
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn job_id(kind: &str) -> String {
    format!("{kind}-{}", Utc::now().format("%Y%m%d%H%M%S"))
}

fn access_token() -> anyhow::Result<String> {
    std::env::var("GOOGLE_ACCESS_TOKEN")
        .context("GOOGLE_ACCESS_TOKEN is not set; cannot reach Google APIs")
}

/// Resolve a project key to its drive folder and build both image indexes.
/// Remote trouble degrades to `None` so the pipelines fall back to
/// pass-through instead of failing the whole run.
async fn load_indexes(
    config: &std::path::Path,
    project: Option<&str>,
) -> anyhow::Result<Option<(AssetIndex, AssetIndex)>> {
    let Some(key) = project else {
        return Ok(None);
    };
    let projects = config::load_projects(config)?;
    let Some(entry) = projects.get(key) else {
        anyhow::bail!("unknown project '{key}' (known: {:?})", projects.keys().collect::<Vec<_>>());
    };
    let token = match access_token() {
        Ok(token) => token,
        Err(e) => {
            warn!("{e:#}; skipping image matching");
            return Ok(None);
        }
    };
    info!("loading image indexes for {} ({})", entry.display_name, entry.drive_folder);
    let client = DriveClient::new(token);
    match drive::load_project_indexes(&client, &entry.drive_folder).await {
        Ok(indexes) => Ok(indexes),
        Err(e) => {
            warn!("image folders unavailable ({e}); skipping image matching");
            Ok(None)
        }
    }
}

async fn push_to_sheet(sheet: Option<&str>, grid: &[Vec<String>]) -> anyhow::Result<()> {
    let Some(sheet) = sheet else {
        return Ok(());
    };
    let spreadsheet_id =
        drive::extract_spreadsheet_id(sheet).context("not a spreadsheet URL or id")?;
    let sheets = SheetsClient::new(access_token()?);
    sheets.replace_grid(&spreadsheet_id, grid).await?;
    println!("Pushed {} rows to the sheet", grid.len());
    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
