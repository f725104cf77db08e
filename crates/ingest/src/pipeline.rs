// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-file two-phase ingestion pipeline.
//!
//! Phase 1 marks the file `ingesting` with the captured size (the pass's
//! high-water mark). Phase 2 reads `[last_processed_offset, size)`, parses
//! complete lines, and commits entries plus the rebuilt conversations in one
//! transaction. Phase 3 marks the file `idle` with the advanced offset.
//! Crash recovery rolls back any pass that never reached phase 3.

use crate::parser::LogParser;
use crate::segment::{segment_entries, SegmentOptions};
use claudia_core::{Clock, SessionId};
use claudia_store::{NewEntry, Store, StoreError};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from the ingestion pipeline.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("file outside base directory: {0}")]
    OutsideBase(String),
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Source label recorded on ingest rows (e.g. "claude").
    pub source: String,
    /// File extensions treated as session logs.
    pub extensions: Vec<String>,
    pub segment: SegmentOptions,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            source: "claude".to_string(),
            extensions: vec!["jsonl".to_string()],
            segment: SegmentOptions::default(),
        }
    }
}

/// Result of one directory or file pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub files_processed: usize,
    pub files_failed: usize,
    pub entries_inserted: usize,
}

/// Drives log files through the store.
pub struct IngestPipeline<C: Clock> {
    store: Arc<Store>,
    parser: Arc<dyn LogParser>,
    base_dir: PathBuf,
    options: IngestOptions,
    clock: C,
}

impl<C: Clock> IngestPipeline<C> {
    pub fn new(
        store: Arc<Store>,
        parser: Arc<dyn LogParser>,
        base_dir: PathBuf,
        options: IngestOptions,
        clock: C,
    ) -> Self {
        Self {
            store,
            parser,
            base_dir,
            options,
            clock,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The stable file key: path relative to the base directory, so the
    /// same file reached through alternate mounts keys identically.
    pub fn file_key(&self, path: &Path) -> Result<String, IngestError> {
        let canonical_base = std::fs::canonicalize(&self.base_dir).unwrap_or_else(|_| self.base_dir.clone());
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        canonical
            .strip_prefix(&canonical_base)
            .map(|rel| rel.to_string_lossy().replace('\\', "/"))
            .map_err(|_| IngestError::OutsideBase(path.display().to_string()))
    }

    /// Startup recovery: roll back interrupted file passes and reset any
    /// conversation stuck in `processing`.
    pub fn recover(&self) -> Result<(), IngestError> {
        let now = self.clock.now_ms();
        let segment_opts = self.options.segment.clone();
        let recovered = self
            .store
            .recover_interrupted_files(|entries| segment_entries(entries, &segment_opts), now)?;
        if !recovered.is_empty() {
            info!(files = recovered.len(), "rolled back interrupted ingestion");
        }
        let requeued = self.store.conversations_recover_processing(now)?;
        if requeued > 0 {
            info!(requeued, "reset stuck processing conversations");
        }
        Ok(())
    }

    /// Ingest every log file under the base directory. Per-file failures
    /// are isolated: one bad file does not stop the pass.
    pub fn ingest_directory(&self) -> Result<IngestStats, IngestError> {
        let mut stats = IngestStats::default();
        let mut paths = Vec::new();
        collect_log_files(&self.base_dir, &self.options.extensions, &mut paths);
        paths.sort();
        for path in paths {
            match self.ingest_file(&path) {
                Ok(file_stats) => {
                    stats.files_processed += 1;
                    stats.entries_inserted += file_stats.entries_inserted;
                }
                Err(e) => {
                    stats.files_failed += 1;
                    warn!(path = %path.display(), error = %e, "failed to ingest file");
                }
            }
        }
        Ok(stats)
    }

    /// Run one two-phase pass over a single file.
    pub fn ingest_file(&self, path: &Path) -> Result<IngestStats, IngestError> {
        let file_key = self.file_key(path)?;
        let io_err = |source| IngestError::Io {
            path: path.display().to_string(),
            source,
        };

        let metadata = std::fs::metadata(path).map_err(io_err)?;
        let file_size = metadata.len() as i64;
        let last_modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let state = self.store.file_state(&file_key)?;
        let prior_offset = state.as_ref().map(|s| s.last_processed_offset).unwrap_or(0);
        let truncated = file_size < prior_offset;
        let reimport = self.store.file_needs_reimport(&file_key)? || truncated;
        let start_offset = if reimport { 0 } else { prior_offset };

        if start_offset >= file_size && !reimport {
            // Nothing new; processed but zero inserts.
            debug!(file_key, "no new bytes");
            return Ok(IngestStats {
                files_processed: 1,
                ..IngestStats::default()
            });
        }

        // Phase 1: claim the pass with its high-water mark.
        self.store.file_mark_ingesting(
            &file_key,
            &self.options.source,
            file_size,
            last_modified,
            self.clock.now_ms(),
        )?;

        // Phase 2: read the new bytes, keeping only complete lines. The
        // offset only advances past the final newline so a line the writer
        // is mid-way through is re-read next pass.
        let (chunk, consumed) = read_complete_lines(path, start_offset, file_size).map_err(io_err)?;
        let source_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| file_key.clone());
        let parsed = self.parser.parse_chunk(&chunk, &source_name);
        let new_entries: Vec<NewEntry> = parsed
            .into_iter()
            .map(|p| NewEntry {
                session_id: SessionId::new(p.session_id),
                source_file: file_key.clone(),
                role: p.role,
                content: p.content,
                tool_names: p.tool_names,
                timestamp: p.timestamp,
                cwd: p.cwd,
            })
            .collect();

        let segment_opts = self.options.segment.clone();
        let now = self.clock.now_ms();
        let pass = self.store.commit_file_pass(
            &file_key,
            reimport,
            &new_entries,
            |entries| segment_entries(entries, &segment_opts),
            now,
        )?;

        // Phase 3: release the claim with the advanced offset.
        self.store.file_mark_idle(
            &file_key,
            start_offset + consumed,
            pass.max_entry_ts,
            self.clock.now_ms(),
        )?;

        debug!(
            file_key,
            inserted = pass.entries_inserted,
            upserted = pass.conversations_upserted,
            "file pass committed"
        );
        Ok(IngestStats {
            files_processed: 1,
            files_failed: 0,
            entries_inserted: pass.entries_inserted,
        })
    }

    /// Promote idle conversations: `active → ready` once the gap elapsed.
    pub fn promote_ready(&self) -> Result<usize, IngestError> {
        let promoted = self
            .store
            .conversations_promote_ready(self.options.segment.gap_ms(), self.clock.now_ms())?;
        if promoted > 0 {
            debug!(promoted, "conversations ready");
        }
        Ok(promoted)
    }

    /// Flag a file for a full re-import on its next pass.
    pub fn request_reimport(&self, file_key: &str) -> Result<bool, IngestError> {
        Ok(self
            .store
            .file_request_reimport(file_key, self.clock.now_ms())?)
    }
}

/// Read `[offset, limit)` and split off the trailing incomplete line.
/// Returns the parseable chunk and the number of bytes it covers.
fn read_complete_lines(
    path: &Path,
    offset: i64,
    limit: i64,
) -> Result<(String, i64), std::io::Error> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(offset.max(0) as u64))?;
    let span = (limit - offset).max(0) as usize;
    let mut buf = vec![0u8; span];
    file.read_exact(&mut buf)?;

    let end = match buf.iter().rposition(|b| *b == b'\n') {
        Some(pos) => pos + 1,
        None => 0,
    };
    buf.truncate(end);
    let chunk = String::from_utf8_lossy(&buf).into_owned();
    Ok((chunk, end as i64))
}

fn collect_log_files(dir: &Path, extensions: &[String], out: &mut Vec<PathBuf>) {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in read_dir.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_log_files(&path, extensions, out);
        } else if path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| want == ext))
        {
            out.push(path);
        }
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
