//! Persistence layer for project graphs.
//!
//! Each project is stored as one JSON snapshot, `<encoded-id>.graph.json`,
//! inside the data directory. Writes go to a temporary file in the same
//! directory which is then renamed over the old snapshot, so a reader never
//! sees a half-written file.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::graph::{GraphSnapshot, ProjectGraph, ProjectId};

/// Snapshot file suffix.
pub const SNAPSHOT_SUFFIX: &str = ".graph.json";

/// Directory-backed snapshot storage.
#[derive(Debug, Clone)]
pub struct GraphStorage {
    /// Directory holding one snapshot per project.
    storage_dir: PathBuf,
}

impl GraphStorage {
    /// Open storage in the given directory, creating it if needed.
    pub fn init<P: AsRef<Path>>(storage_dir: P) -> Result<Self> {
        let storage_dir = storage_dir.as_ref();
        fs::create_dir_all(storage_dir)
            .with_context(|| format!("Failed to create storage directory: {:?}", storage_dir))?;
        Ok(Self {
            storage_dir: storage_dir.to_path_buf(),
        })
    }

    /// Directory holding the snapshots.
    pub fn dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Snapshot path for a project.
    pub fn snapshot_path(&self, project: &str) -> PathBuf {
        self.storage_dir
            .join(format!("{}{}", encode_project_id(project), SNAPSHOT_SUFFIX))
    }

    /// Write the graph's snapshot, replacing any previous one.
    pub fn save(&self, graph: &ProjectGraph) -> Result<PathBuf> {
        let path = self.snapshot_path(graph.project());
        let mut tmp = NamedTempFile::new_in(&self.storage_dir)
            .with_context(|| format!("Failed to create temp file in {:?}", self.storage_dir))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer(&mut writer, &graph.to_snapshot())
                .context("Failed to serialize graph snapshot")?;
            writer.flush().context("Failed to flush graph snapshot")?;
        }
        tmp.as_file()
            .sync_all()
            .context("Failed to sync graph snapshot")?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to write graph file: {:?}", path))?;

        debug!(
            project = graph.project(),
            generation = %graph.generation(),
            "Saved graph snapshot to {:?}",
            path
        );
        Ok(path)
    }

    /// Load one project's snapshot, `None` when it has never been saved.
    pub fn load(&self, project: &str) -> Result<Option<ProjectGraph>> {
        let path = self.snapshot_path(project);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_path(&path).map(Some)
    }

    fn load_path(path: &Path) -> Result<ProjectGraph> {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to read graph file: {:?}", path))?;
        let snapshot: GraphSnapshot = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse graph JSON: {:?}", path))?;
        ProjectGraph::from_snapshot(snapshot)
            .with_context(|| format!("Failed to load graph snapshot: {:?}", path))
    }

    /// Load every snapshot in the directory.
    ///
    /// Unreadable snapshots are skipped with a warning so one corrupt file
    /// does not keep the other projects offline.
    pub fn load_all(&self) -> Result<Vec<ProjectGraph>> {
        let mut graphs = Vec::new();
        for path in self.snapshot_files()? {
            match Self::load_path(&path) {
                Ok(graph) => graphs.push(graph),
                Err(e) => warn!("Skipping unreadable snapshot {:?}: {:#}", path, e),
            }
        }
        info!(
            "Loaded {} graph snapshots from {:?}",
            graphs.len(),
            self.storage_dir
        );
        Ok(graphs)
    }

    /// Delete a project's snapshot. Returns whether one existed.
    pub fn remove(&self, project: &str) -> Result<bool> {
        let path = self.snapshot_path(project);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)
            .with_context(|| format!("Failed to delete graph file: {:?}", path))?;
        debug!("Deleted graph snapshot: {:?}", path);
        Ok(true)
    }

    /// Project ids with a stored snapshot, sorted.
    pub fn list(&self) -> Result<Vec<ProjectId>> {
        let mut projects: Vec<ProjectId> = self
            .snapshot_files()?
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .filter_map(|name| name.strip_suffix(SNAPSHOT_SUFFIX))
            .filter_map(decode_project_id)
            .collect();
        projects.sort();
        Ok(projects)
    }

    /// Snapshot files in the directory, sorted by path. Temp files and
    /// anything without the snapshot suffix are ignored.
    fn snapshot_files(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.storage_dir)
            .with_context(|| format!("Failed to read storage directory: {:?}", self.storage_dir))?;
        let mut files = Vec::new();
        for entry in entries {
            let path = entry.context("Failed to read storage directory entry")?.path();
            let is_snapshot = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(SNAPSHOT_SUFFIX));
            if is_snapshot && path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Percent-encode a project id into a safe file name stem.
pub fn encode_project_id(project: &str) -> String {
    let mut out = String::with_capacity(project.len());
    for byte in project.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Inverse of [`encode_project_id`]; `None` for stems it could not produce.
pub fn decode_project_id(stem: &str) -> Option<ProjectId> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
