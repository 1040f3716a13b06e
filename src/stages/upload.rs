use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{error, info};

use crate::store::ObjectSink;

/// Drain the output directory: every regular file is uploaded under the key
/// prefix, then moved to the local archive directory. Files are handled
/// independently; a failed upload or move leaves the file in place for the
/// next run. No dedup against the bucket — puts are overwrite-safe by key.
pub async fn run(
    sink: &dyn ObjectSink,
    key_prefix: &str,
    output_dir: &Path,
    archive_dir: &Path,
) -> Result<()> {
    let files = find_uploads(output_dir);

    if files.is_empty() {
        info!("No new files to upload");
        return Ok(());
    }
    if files.len() == 1 {
        info!("There is 1 file to upload");
    } else {
        info!("There are {} files to upload", files.len());
    }

    for name in &files {
        let local = output_dir.join(name);
        let archived = archive_dir.join(name);
        let key = format!("{key_prefix}{name}");

        if let Err(err) = upload_one(sink, &key, &local, &archived).await {
            error!("Failed during upload/archive for {}: {err:#}", local.display());
        }
    }

    info!("Upload finished");
    Ok(())
}

async fn upload_one(sink: &dyn ObjectSink, key: &str, local: &Path, archived: &Path) -> Result<()> {
    sink.put(key, local).await?;
    info!("Uploaded {} as {key}", local.display());

    fs::rename(local, archived)
        .with_context(|| format!("Failed to archive {}", local.display()))?;
    info!("Archived {} to {}", local.display(), archived.display());
    Ok(())
}

/// Regular files in the output directory, in name order. An unreadable
/// directory is logged and treated as empty.
fn find_uploads(output_dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(output_dir) {
        Ok(entries) => entries,
        Err(err) => {
            error!("Could not read output directory {}: {err}", output_dir.display());
            return Vec::new();
        }
    };

    let mut names = Vec::new();
    for entry in entries.flatten() {
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    names
}
