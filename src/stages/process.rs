use anyhow::{Context, Result, anyhow};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::config::Layout;

const ARCHIVE_PREFIX: &str = "amplitude_data_";
const ARCHIVE_SUFFIX: &str = ".zip";
const PAYLOAD_SUFFIX: &str = ".gz";

/// Drain the drop directory: every `*.zip` is extracted, flattened into the
/// output directory, and moved to the zip archive directory. Archives are
/// processed independently; one failing is logged and left in the drop
/// directory for the next run.
pub fn run(layout: &Layout) -> Result<()> {
    let archives = find_archives(&layout.drop_dir);

    if archives.is_empty() {
        info!("No new .zip files found to process");
        return Ok(());
    }
    if archives.len() == 1 {
        info!("There is 1 archive to process");
    } else {
        info!("There are {} archives to process", archives.len());
    }

    for name in &archives {
        if let Err(err) = process_archive(layout, name) {
            error!("Error processing {name}: {err:#}. Leaving {name} in place");
        }
    }

    info!("Processing finished");
    Ok(())
}

/// Regular `*.zip` files in the drop directory, in name order. An unreadable
/// directory is logged and treated as empty so the stage no-ops instead of
/// aborting.
fn find_archives(drop_dir: &Path) -> Vec<String> {
    let entries = match fs::read_dir(drop_dir) {
        Ok(entries) => entries,
        Err(err) => {
            error!("Could not read drop directory {}: {err}", drop_dir.display());
            return Vec::new();
        }
    };

    let mut names = Vec::new();
    for entry in entries.flatten() {
        if !entry.path().is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(ARCHIVE_SUFFIX) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    names
}

fn process_archive(layout: &Layout, name: &str) -> Result<()> {
    let zip_path = layout.drop_dir.join(name);
    info!("Processing {name}");

    let workspace = tempfile::Builder::new()
        .prefix("workspace-")
        .tempdir_in(&layout.work_dir)
        .context("Failed to create temp workspace")?;
    info!("Created temp workspace {}", workspace.path().display());

    let result = extract_and_flatten(&zip_path, name, workspace.path(), &layout.output_dir)
        .and_then(|count| {
            // Relocation is the at-most-once marker: once the zip sits in
            // the archive directory, later runs will not see it.
            let archived = layout.zip_archive_dir.join(name);
            fs::rename(&zip_path, &archived)
                .with_context(|| format!("Failed to move {name} to the archive directory"))?;
            info!("Successfully processed and archived {name} ({count} event files)");
            Ok(())
        });

    // Workspace removal is best effort and never escalates.
    if let Err(err) = workspace.close() {
        warn!("Failed to delete temp workspace: {err}");
    }

    result
}

fn extract_and_flatten(
    zip_path: &Path,
    name: &str,
    workspace: &Path,
    output_dir: &Path,
) -> Result<usize> {
    let file =
        File::open(zip_path).with_context(|| format!("Failed to open {}", zip_path.display()))?;
    let mut archive =
        ZipArchive::new(file).with_context(|| format!("{name} is not a valid zip archive"))?;
    archive
        .extract(workspace)
        .with_context(|| format!("Failed to extract {name}"))?;
    info!("{name} extracted to {}", workspace.display());

    let partition_dir = locate_partition_dir(workspace)?;
    info!(
        "Found partition folder {}",
        partition_dir.file_name().and_then(|n| n.to_str()).unwrap_or("?")
    );

    let base = archive_base(name);
    let mut count = 0;

    for entry in WalkDir::new(&partition_dir) {
        let entry = entry.context("Failed to walk partition folder")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        let Some(payload_base) = file_name.strip_suffix(PAYLOAD_SUFFIX) else {
            continue;
        };

        let target = output_dir.join(format!("{base}_{payload_base}"));
        info!("Decompressing {file_name} to {}", target.display());
        decompress_to(entry.path(), &target)?;
        count += 1;
    }

    Ok(count)
}

/// The export layout puts all event payloads under exactly one top-level
/// folder named by an opaque numeric id. Zero or more than one means the
/// archive is malformed and must stay in the drop directory for inspection.
fn locate_partition_dir(workspace: &Path) -> Result<PathBuf> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(workspace).context("Failed to read temp workspace")? {
        let entry = entry.context("Failed to read temp workspace entry")?;
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }

    match dirs.len() {
        1 => Ok(dirs.remove(0)),
        0 => Err(anyhow!("no partition folder found inside the archive")),
        n => Err(anyhow!("expected exactly one partition folder, found {n}")),
    }
}

/// `amplitude_data_20240101.zip` -> `20240101`. The result prefixes every
/// flattened filename so output from different archives never collides.
fn archive_base(name: &str) -> String {
    let base = name.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(name);
    let base = base.strip_prefix(ARCHIVE_PREFIX).unwrap_or(base);
    base.to_string()
}

/// Stream copy so multi-gigabyte payloads never sit fully in memory.
fn decompress_to(gz_path: &Path, target: &Path) -> Result<()> {
    let gz_file =
        File::open(gz_path).with_context(|| format!("Failed to open {}", gz_path.display()))?;
    let mut decoder = GzDecoder::new(io::BufReader::new(gz_file));
    let mut out =
        File::create(target).with_context(|| format!("Failed to create {}", target.display()))?;
    io::copy(&mut decoder, &mut out)
        .with_context(|| format!("Failed to decompress {}", gz_path.display()))?;
    Ok(())
}
