//! CLI command implementations.

pub mod correct;
pub mod export;
pub mod find;
pub mod history;
pub mod ingest;
pub mod remove;
pub mod renumber;
pub mod report;
pub mod rollback;
pub mod settings;
pub mod status;

use std::path::Path;

use rollcall::config::CONFIG_FILE_NAME;
use rollcall::{EngineConfig, ReconciliationEngine};

/// Open the engine over `data_dir`, reading `rollcall.json` from it if present.
pub fn open_engine(data_dir: &Path) -> Result<ReconciliationEngine, Box<dyn std::error::Error>> {
    let config = EngineConfig::load_or_default(data_dir.join(CONFIG_FILE_NAME))?;
    Ok(ReconciliationEngine::open_dir(data_dir, config)?)
}
