use thiserror::Error;

/// Hard failures a pipeline step can surface. Everything else degrades to an
/// empty result (extraction with no candidates, a SKU with no image) or to
/// pass-through (remote asset folders unreachable).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("required column '{column}' is missing from the lookup sheet")]
    SchemaMissing { column: String },

    #[error("remote call failed: {0}")]
    Remote(String),
}
