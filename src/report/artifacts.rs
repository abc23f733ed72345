//! On-disk promotion artifacts.
//!
//! Every attempt gets its own directory under the artifact root, named after
//! the report timestamp (`:` replaced by `-`). Directories are never reused:
//! a second attempt within the same second gets a `-2`, `-3`, ... suffix.
//!
//! ```text
//! <root>/
//!   latest.json                  pointer to the most recent attempt
//!   2026-10-19T08-30-15Z/
//!     promotion.log
//!     promotion.json
//!     summary.txt
//! ```
//!
//! Files are written to a temporary sibling, fsynced, then renamed into place.

use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use super::PromotionReport;

pub const LOG_FILE: &str = "promotion.log";
pub const JSON_FILE: &str = "promotion.json";
pub const SUMMARY_FILE: &str = "summary.txt";
pub const LATEST_FILE: &str = "latest.json";

/// Errors writing artifacts.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize promotion record: {0}")]
    Serialize(#[from] serde_json::Error),
}

fn io_error<'a>(
    action: &'static str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> ReportError + 'a {
    move |source| ReportError::Io {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// Where one attempt's artifacts were written.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub dir: PathBuf,
    pub log: PathBuf,
    pub json: PathBuf,
    pub summary: PathBuf,
}

#[derive(Serialize)]
struct LatestPointer<'a> {
    attempt: String,
    timestamp: &'a str,
    success: bool,
    promotion_branch: &'a str,
}

/// Write the log, JSON record, and summary for `report` under `root`, then
/// point `latest.json` at them.
///
/// # Errors
/// Returns [`ReportError`] if a directory or file cannot be created.
pub fn write_artifacts(report: &PromotionReport, root: &Path) -> Result<ArtifactPaths, ReportError> {
    fs::create_dir_all(root).map_err(io_error("create directory", root))?;
    let dir = allocate_attempt_dir(root, report.timestamp())?;

    let paths = ArtifactPaths {
        log: dir.join(LOG_FILE),
        json: dir.join(JSON_FILE),
        summary: dir.join(SUMMARY_FILE),
        dir,
    };

    let json = serde_json::to_string_pretty(&report.to_record())?;
    write_atomic(&paths.log, report.render_log().as_bytes())?;
    write_atomic(&paths.json, json.as_bytes())?;
    write_atomic(&paths.summary, report.render_summary().as_bytes())?;

    let latest = LatestPointer {
        attempt: paths
            .dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        timestamp: report.timestamp(),
        success: report.success(),
        promotion_branch: report.promotion_branch().as_str(),
    };
    let latest = serde_json::to_string_pretty(&latest)?;
    write_atomic(&root.join(LATEST_FILE), latest.as_bytes())?;

    tracing::info!(dir = %paths.dir.display(), "wrote promotion artifacts");
    Ok(paths)
}

/// Create a fresh directory for this attempt. `create_dir` (not `_all`)
/// fails on an existing name, so two attempts can never share one.
fn allocate_attempt_dir(root: &Path, timestamp: &str) -> Result<PathBuf, ReportError> {
    let base = timestamp.replace(':', "-");
    let mut suffix = 1u32;
    loop {
        let name = if suffix == 1 {
            base.clone()
        } else {
            format!("{base}-{suffix}")
        };
        let candidate = root.join(name);
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
            Err(e) => return Err(io_error("create directory", &candidate)(e)),
        }
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ReportError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let filename = path
        .file_name()
        .map_or_else(|| "artifact".to_owned(), |n| n.to_string_lossy().into_owned());
    let tmp_path = dir.join(format!(".{filename}.tmp"));

    let mut file = File::create(&tmp_path).map_err(io_error("create", &tmp_path))?;
    file.write_all(bytes).map_err(io_error("write", &tmp_path))?;
    file.sync_all().map_err(io_error("fsync", &tmp_path))?;
    drop(file);

    fs::rename(&tmp_path, path).map_err(io_error("rename into", path))?;
    Ok(())
}
