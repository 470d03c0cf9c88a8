//! Scan artifact persistence.
//!
//! After a scan the controller holds the gathered encoder trace in a file on
//! its own file system. Saving copies that file into the local output
//! directory and writes the scan's timestamps next to it, one value per line:
//!
//! ```text
//! data/gathering_20240611_142501_3f2a9c1d.dat
//! data/timestamps_20240611_142501_3f2a9c1d.txt
//! ```

use crate::config::StorageConfig;
use crate::error::{FtsError, FtsResult};
use crate::hardware::capabilities::ConfigTransport;
use crate::motion::ScanResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Files written by one save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedArtifacts {
    /// Run the files belong to
    pub run_id: Uuid,
    /// Local copy of the controller's gathering file
    pub gathering_file: PathBuf,
    /// Timestamp file, when enabled
    pub timestamp_file: Option<PathBuf>,
}

/// Writes scan artifacts to the configured output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
    write_timestamps: bool,
}

impl ArtifactWriter {
    /// Create a writer from storage settings.
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            output_dir: config.output_dir.clone(),
            write_timestamps: config.write_timestamps,
        }
    }

    /// `<UTC yyyymmdd_HHMMSS>_<first 8 hex digits of the run id>`
    pub fn file_stem(result: &ScanResult) -> String {
        let run = result.run_id.simple().to_string();
        format!(
            "{}_{}",
            result.started_at.format("%Y%m%d_%H%M%S"),
            &run[..8]
        )
    }

    /// Retrieve the gathering file and write the timestamp file.
    pub async fn save(
        &self,
        transport: &dyn ConfigTransport,
        remote_file: &str,
        result: &ScanResult,
    ) -> FtsResult<SavedArtifacts> {
        tokio::fs::create_dir_all(&self.output_dir).await.map_err(|e| {
            FtsError::Storage(format!(
                "Failed to create output directory '{}': {e}",
                self.output_dir.display()
            ))
        })?;

        let stem = Self::file_stem(result);
        let gathering_file = self.output_dir.join(format!("gathering_{stem}.dat"));
        transport.save_file(remote_file, &gathering_file).await?;

        let timestamp_file = if self.write_timestamps {
            let path = self.output_dir.join(format!("timestamps_{stem}.txt"));
            write_timestamps(&path, &result.timestamps)?;
            Some(path)
        } else {
            None
        };

        info!(
            run_id = %result.run_id,
            gathering = %gathering_file.display(),
            timestamps = timestamp_file.is_some(),
            "scan artifacts saved"
        );
        Ok(SavedArtifacts {
            run_id: result.run_id,
            gathering_file,
            timestamp_file,
        })
    }
}

/// Write timestamps, one per line, no header.
pub fn write_timestamps(path: &Path, timestamps: &[f64]) -> FtsResult<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    for t in timestamps {
        writer.write_record([t.to_string()])?;
    }
    writer
        .flush()
        .map_err(|e| FtsError::Storage(format!("Failed to flush '{}': {e}", path.display())))?;
    Ok(())
}
