use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Default object key prefix for uploaded event files.
pub const DEFAULT_KEY_PREFIX: &str = "amplitude/";

/// HTTP Basic auth pair for the Amplitude export API.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub secret_key: String,
}

impl ApiCredentials {
    pub fn from_env() -> Result<Self> {
        Ok(ApiCredentials {
            api_key: require_env("AMP_API_KEY")?,
            secret_key: require_env("AMP_SECRET_KEY")?,
        })
    }
}

/// Object store destination and credentials. The access/secret pair is
/// optional; when absent the SDK's default provider chain is used.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub bucket: String,
    pub key_prefix: String,
}

impl StoreConfig {
    pub fn from_env() -> Result<Self> {
        Ok(StoreConfig {
            access_key: std::env::var("AWS_ACCESS_KEY").ok(),
            secret_key: std::env::var("AWS_SECRET_KEY").ok(),
            bucket: require_env("AWS_BUCKET")?,
            key_prefix: std::env::var("AWS_KEY_PREFIX")
                .unwrap_or_else(|_| DEFAULT_KEY_PREFIX.to_string()),
        })
    }
}

/// Directory layout shared by the three stages. Files move between these
/// directories as they advance through the pipeline; a file's location is
/// the only record of how far it got.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Incoming export zips awaiting processing.
    pub drop_dir: PathBuf,
    /// Consumed export zips.
    pub zip_archive_dir: PathBuf,
    /// Decompressed event files awaiting upload.
    pub output_dir: PathBuf,
    /// Uploaded event files.
    pub json_archive_dir: PathBuf,
    /// Per-archive temp workspaces live here for the duration of one run.
    pub work_dir: PathBuf,
    /// Extract/process run logs.
    pub load_logs_dir: PathBuf,
    /// Upload run logs.
    pub upload_logs_dir: PathBuf,
}

impl Layout {
    pub fn rooted_at(root: &Path) -> Self {
        Layout {
            drop_dir: root.join("data_zip_files"),
            zip_archive_dir: root.join("archive"),
            output_dir: root.join("unzipped_data"),
            json_archive_dir: root.join("archived_json_data"),
            work_dir: root.join("tmp"),
            load_logs_dir: root.join("load_logs"),
            upload_logs_dir: root.join("s3_upload_logs"),
        }
    }

    /// Create every directory in the layout. Safe to call on every run.
    pub fn ensure(&self) -> Result<()> {
        for dir in [
            &self.drop_dir,
            &self.zip_archive_dir,
            &self.output_dir,
            &self.json_archive_dir,
            &self.work_dir,
            &self.load_logs_dir,
            &self.upload_logs_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("Missing required environment variable {name}"))
}
