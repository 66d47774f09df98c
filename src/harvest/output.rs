//! Persisted harvest output: a UTF-8 JSON array of the five-field review
//! records, written whole-file-replace (temp file + rename) so consumers
//! never observe a partial write. Prior content is always overwritten,
//! never appended to.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::core::types::ReviewRecord;

pub async fn write_reviews(path: &Path, reviews: &[ReviewRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating output directory {}", parent.display()))?;
        }
    }

    let json = serde_json::to_vec_pretty(reviews).context("serializing reviews")?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    tokio::fs::write(&tmp, &json)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;

    info!("Saved {} reviews to {}", reviews.len(), path.display());
    Ok(())
}
