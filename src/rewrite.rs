use crate::rule::{RuleReport, RuleSet};
use serde::Serialize;
use filetime::FileTime;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::string::FromUtf8Error;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// Whole-file rewrite: read, run a [`RuleSet`], write back in place.
///
/// The file is treated as opaque UTF-8 text. Nothing is parsed.
#[derive(Debug, Clone)]
#[must_use = "Rewriter does nothing until run() is called"]
pub struct Rewriter<'r> {
    /// Path of the file to rewrite
    pub file: PathBuf,
    rules: &'r RuleSet,
    dry_run: bool,
}

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Cannot access {path}: {source}")]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid UTF-8: {source}")]
    Encoding {
        path: PathBuf,
        #[source]
        source: FromUtf8Error,
    },

    #[error("{path} changed on disk while it was being rewritten")]
    ConcurrentModification { path: PathBuf },
}

/// What happened to the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RewriteOutcome {
    /// At least one rule matched and the new text was written
    Rewritten { bytes_written: usize },
    /// No rule matched; the original text was written back as-is
    Unchanged,
    /// Dry run: the text would change, nothing was written
    WouldRewrite { bytes: usize },
}

/// Full account of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[must_use = "RewriteReport should be checked for the outcome"]
pub struct RewriteReport {
    pub file: PathBuf,
    /// xxh3 of the bytes read
    pub before_hash: u64,
    /// xxh3 of the resulting text
    pub after_hash: u64,
    pub rules: Vec<RuleReport>,
    pub outcome: RewriteOutcome,
    /// Text as read, kept for diff display
    #[serde(skip)]
    pub before: String,
    /// Text after all rules ran
    #[serde(skip)]
    pub after: String,
}

impl RewriteReport {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }

    pub fn total_replacements(&self) -> usize {
        self.rules.iter().map(|r| r.replacements).sum()
    }
}

impl<'r> Rewriter<'r> {
    pub fn new(file: impl Into<PathBuf>, rules: &'r RuleSet) -> Self {
        Self {
            file: file.into(),
            rules,
            dry_run: false,
        }
    }

    /// Compute the result without writing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Read the file and count remaining matches per rule. Never writes.
    pub fn scan(&self) -> Result<Vec<RuleReport>, RewriteError> {
        let (_, text) = read_text(&self.file)?;
        Ok(self.rules.scan(&text))
    }

    /// Run every rule over the file and write the result back.
    ///
    /// The file is written even when no rule matched, so the on-disk bytes
    /// always equal the returned `after` text.
    pub fn run(&self) -> Result<RewriteReport, RewriteError> {
        let (before_hash, before) = read_text(&self.file)?;
        tracing::debug!(file = %self.file.display(), bytes = before.len(), "read target");

        let transform = self.rules.apply(&before);
        let after_hash = xxh3_64(transform.text.as_bytes());
        let changed = before != transform.text;

        let outcome = if self.dry_run {
            if changed {
                RewriteOutcome::WouldRewrite {
                    bytes: transform.text.len(),
                }
            } else {
                RewriteOutcome::Unchanged
            }
        } else {
            verify_unchanged(&self.file, before_hash)?;
            let access = |source: std::io::Error| RewriteError::FileAccess {
                path: self.file.clone(),
                source,
            };
            let original_mtime = fs::metadata(&self.file)
                .map(|metadata| FileTime::from_last_modification_time(&metadata))
                .map_err(access)?;

            atomic_write(&self.file, transform.text.as_bytes()).map_err(access)?;

            if changed {
                // Bump mtime so watchers and incremental builds pick it up
                filetime::set_file_mtime(&self.file, FileTime::now()).map_err(access)?;
                RewriteOutcome::Rewritten {
                    bytes_written: transform.text.len(),
                }
            } else {
                // Same bytes: the replacement file keeps the old timestamp
                filetime::set_file_mtime(&self.file, original_mtime).map_err(access)?;
                RewriteOutcome::Unchanged
            }
        };

        tracing::info!(
            file = %self.file.display(),
            replacements = transform.total_replacements(),
            dry_run = self.dry_run,
            "rewrite finished"
        );

        Ok(RewriteReport {
            file: self.file.clone(),
            before_hash,
            after_hash,
            rules: transform.reports,
            outcome,
            before,
            after: transform.text,
        })
    }
}

/// Rewrite `path` in place with `rules`.
pub fn rewrite_file(
    path: impl AsRef<Path>,
    rules: &RuleSet,
) -> Result<RewriteReport, RewriteError> {
    Rewriter::new(path.as_ref(), rules).run()
}

fn read_bytes(path: &Path) -> Result<(u64, Vec<u8>), RewriteError> {
    let bytes = fs::read(path).map_err(|source| RewriteError::FileAccess {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((xxh3_64(&bytes), bytes))
}

/// Fail with [`RewriteError::ConcurrentModification`] unless the file still
/// hashes to `before_hash`.
fn verify_unchanged(path: &Path, before_hash: u64) -> Result<(), RewriteError> {
    let (current_hash, _) = read_bytes(path)?;
    if current_hash != before_hash {
        return Err(RewriteError::ConcurrentModification {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

fn read_text(path: &Path) -> Result<(u64, String), RewriteError> {
    let (hash, bytes) = read_bytes(path)?;
    let text = String::from_utf8(bytes).map_err(|source| RewriteError::Encoding {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((hash, text))
}

/// Overwrite the file `path` resolves to.
///
/// Symlinks are followed, so the link stays a link and its target receives
/// the new text. A file with several hard links is truncated and written in
/// place so every link sees the result. Anything else goes through
/// tempfile + fsync + rename, and a failed write leaves the old contents.
fn atomic_write(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let target = fs::canonicalize(path)?;
    let metadata = fs::metadata(&target)?;

    if is_hard_linked(&metadata) {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&target)?;
        file.write_all(content)?;
        return file.sync_all();
    }

    // Same directory keeps the rename on one filesystem
    let parent = target.parent().unwrap_or_else(|| Path::new("/"));
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(content)?;
    temp.as_file().sync_all()?;

    // Tempfiles are created 0600
    temp.as_file().set_permissions(metadata.permissions())?;

    temp.persist(&target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn is_hard_linked(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    metadata.nlink() > 1
}

#[cfg(not(unix))]
fn is_hard_linked(_metadata: &fs::Metadata) -> bool {
    false
}
