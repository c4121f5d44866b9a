//! Heightmap files and per-cycle snapshot output.
//!
//! Heightmaps are stored as plain text: one grid row per line, values
//! separated by tabs. Values are written with Rust's shortest round-trip
//! formatting so a write followed by a read reproduces every bit.

use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::erosion::{CycleReport, ErosionStats};
use crate::tilemap::Heightmap;

/// Errors that can occur while reading or writing output files.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Line {line}, column {column}: cannot parse `{value}` as a number")]
    Parse { line: usize, column: usize, value: String },
    #[error("Line {line} has {found} values, expected {expected}")]
    Ragged { line: usize, expected: usize, found: usize },
    #[error("Heightmap file contains no values")]
    Empty,
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// TEXT HEIGHTMAPS
// =============================================================================

/// Serialize a heightmap to the tab-separated text format.
pub fn heightmap_to_string(heightmap: &Heightmap) -> String {
    let mut out = String::with_capacity(heightmap.len() * 20);
    for row in heightmap.row_slices() {
        for (i, value) in row.iter().enumerate() {
            if i > 0 {
                out.push('\t');
            }
            let _ = write!(out, "{}", value);
        }
        out.push('\n');
    }
    out
}

/// Write a heightmap to `path`, replacing any existing file.
pub fn write_heightmap(heightmap: &Heightmap, path: &Path) -> Result<(), ExportError> {
    fs::write(path, heightmap_to_string(heightmap))?;
    Ok(())
}

/// Parse the text format. Any whitespace separates values; blank lines are
/// skipped; every row must have the same length.
pub fn parse_heightmap<R: BufRead>(reader: R) -> Result<Heightmap, ExportError> {
    let mut data = Vec::new();
    let mut cols = None;
    let mut rows = 0;

    for (line_idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let start = data.len();
        for (col_idx, token) in line.split_whitespace().enumerate() {
            let value: f64 = token.parse().map_err(|_| ExportError::Parse {
                line: line_idx + 1,
                column: col_idx + 1,
                value: token.to_string(),
            })?;
            data.push(value);
        }
        let found = data.len() - start;
        match cols {
            None => cols = Some(found),
            Some(expected) if expected != found => {
                return Err(ExportError::Ragged {
                    line: line_idx + 1,
                    expected,
                    found,
                });
            }
            Some(_) => {}
        }
        rows += 1;
    }

    let cols = cols.ok_or(ExportError::Empty)?;
    Heightmap::from_vec(rows, cols, data).ok_or(ExportError::Empty)
}

/// Read a heightmap written by [`write_heightmap`] (or any compatible
/// whitespace-separated matrix).
pub fn read_heightmap(path: &Path) -> Result<Heightmap, ExportError> {
    parse_heightmap(BufReader::new(File::open(path)?))
}

/// File name used for the snapshot after `cycle` (0 = initial terrain).
pub fn snapshot_file_name(cycle: usize) -> String {
    format!("terrain_{}.txt", cycle)
}

/// Write the run statistics as pretty-printed JSON.
pub fn write_summary(stats: &ErosionStats, path: &Path) -> Result<(), ExportError> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, stats)?;
    Ok(())
}

// =============================================================================
// SNAPSHOT SINKS
// =============================================================================

/// Receives the heightmap at the end of every cycle.
pub trait SnapshotSink {
    fn on_cycle(&mut self, report: &CycleReport, heightmap: &Heightmap) -> Result<(), ExportError>;
}

/// Discards snapshots.
#[derive(Debug, Default)]
pub struct NullSink;

impl SnapshotSink for NullSink {
    fn on_cycle(&mut self, _report: &CycleReport, _heightmap: &Heightmap) -> Result<(), ExportError> {
        Ok(())
    }
}

/// Keeps every snapshot in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub snapshots: Vec<(usize, Heightmap)>,
}

impl SnapshotSink for MemorySink {
    fn on_cycle(&mut self, report: &CycleReport, heightmap: &Heightmap) -> Result<(), ExportError> {
        self.snapshots.push((report.cycle, heightmap.clone()));
        Ok(())
    }
}

/// Writes `terrain_{cycle}.txt` into an existing directory.
#[derive(Debug)]
pub struct DirectorySink {
    dir: PathBuf,
    written: Vec<PathBuf>,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            written: Vec::new(),
        }
    }

    /// Paths written so far, in cycle order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    /// Write the initial terrain as cycle 0.
    pub fn write_initial(&mut self, heightmap: &Heightmap) -> Result<PathBuf, ExportError> {
        self.write_cycle(0, heightmap)
    }

    fn write_cycle(&mut self, cycle: usize, heightmap: &Heightmap) -> Result<PathBuf, ExportError> {
        let path = self.dir.join(snapshot_file_name(cycle));
        write_heightmap(heightmap, &path)?;
        log::info!("wrote {}", path.display());
        self.written.push(path.clone());
        Ok(path)
    }
}

impl SnapshotSink for DirectorySink {
    fn on_cycle(&mut self, report: &CycleReport, heightmap: &Heightmap) -> Result<(), ExportError> {
        self.write_cycle(report.cycle, heightmap).map(|_| ())
    }
}
