use anyhow::{Context, Result};
use std::path::Path;
use tracing::{error, info};

use crate::amplitude::{ExportClient, ExportError, ExportWindow};

/// Fixed name for the downloaded export. A second run before the processor
/// drains the drop directory overwrites the previous download.
pub const ARCHIVE_NAME: &str = "amplitude_data.zip";

/// One export attempt: fetch the window, write the body verbatim into the
/// drop directory. A non-200 response is logged with its status and body and
/// nothing is written.
pub async fn run(client: &ExportClient, window: &ExportWindow, drop_dir: &Path) -> Result<()> {
    info!("Requesting export for window {} to {}", window.start, window.end);

    let body = match client.fetch(window).await {
        Ok(body) => body,
        Err(err) => {
            match &err {
                ExportError::Status { status, body } => error!("Error {status}: {body}"),
                other => error!("Export request failed: {other}"),
            }
            return Err(err.into());
        }
    };

    let target = drop_dir.join(ARCHIVE_NAME);
    tokio::fs::write(&target, &body)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;

    info!(
        "Data retrieved successfully: {} bytes written to {}",
        body.len(),
        target.display()
    );
    Ok(())
}
