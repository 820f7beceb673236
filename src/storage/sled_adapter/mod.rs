// Submodule declaration
// -----------------------------------------------------------------------------
mod config_source;
mod watermark_store;

// Re-export
// -----------------------------------------------------------------------------
pub use config_source::*;
pub use watermark_store::*;
