//! Writing the final document where the proxy core reads it.

use std::path::Path;

use tracing::info;

use crate::config::SingBoxConfig;
use crate::error::{Result, SynthesisError};
use crate::fs_atomic;

/// Replaces config files without ever exposing a partial document.
///
/// The document is serialized in full before the target is touched, written
/// to a uniquely named sibling file, synced and renamed over the target.
/// Writes to the same path wait for each other across every emitter in the
/// process; the last one to finish wins.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConfigEmitter;

impl ConfigEmitter {
    pub fn new() -> Self {
        Self
    }

    pub async fn emit(&self, config: &SingBoxConfig, path: &Path) -> Result<()> {
        let buffer = config.to_json_pretty()?;

        let _guard = fs_atomic::lock_path(path).await;
        fs_atomic::replace_file(path, buffer.as_bytes())
            .await
            .map_err(|e| SynthesisError::io(format!("replacing {}", path.display()), e))?;

        info!("Config written to {}", path.display());
        Ok(())
    }
}
