//! Checkpoint persistence layer
//!
//! A run directory holds two files:
//! - `outcomes.jsonl`: append-only JSON-lines log of classification outcomes
//! - `checkpoint.json`: completed indices and running totals, replaced
//!   atomically (write temp file, fsync, rename) on every commit
//!
//! A commit appends the outcome first and only then rewrites the checkpoint,
//! so a crash can leave an orphan outcome line but never a completed index
//! without its outcome. Orphans are discarded on the next open. A partial
//! append is cut back to the last complete line before the next one is
//! written.

use chrono::{DateTime, Utc};
use newslabel_core::{ClassificationOutcome, Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Checkpoint file name
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Outcome log file name
pub const OUTCOMES_FILE: &str = "outcomes.jsonl";

const CHECKPOINT_TMP_FILE: &str = "checkpoint.json.tmp";
const CHECKPOINT_VERSION: u32 = 1;

/// Configuration for checkpoint persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory holding the checkpoint and outcome log
    pub dir: PathBuf,

    /// fsync after every commit
    #[serde(default = "default_fsync")]
    pub fsync: bool,
}

impl CheckpointConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fsync: default_fsync(),
        }
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_FILE)
    }

    pub fn outcomes_path(&self) -> PathBuf {
        self.dir.join(OUTCOMES_FILE)
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self::new("./output")
    }
}

fn default_fsync() -> bool {
    true
}

/// Aggregate counters across committed outcomes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunTotals {
    pub total_cost: f64,
    pub success_count: u64,
    pub failure_count: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl RunTotals {
    /// Fold one outcome into the totals
    pub fn add(&mut self, outcome: &ClassificationOutcome) {
        self.total_cost += outcome.cost;
        if outcome.success {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.input_tokens += outcome.usage.input_tokens as u64;
        self.output_tokens += outcome.usage.output_tokens as u64;
    }

    pub fn processed(&self) -> u64 {
        self.success_count + self.failure_count
    }
}

/// Durable resume marker for one dataset run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCheckpoint {
    pub version: u32,
    pub run_id: String,
    /// SHA-256 of the dataset bytes
    pub dataset_fingerprint: String,
    pub completed: BTreeSet<usize>,
    pub totals: RunTotals,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunCheckpoint {
    /// Empty checkpoint for a fresh run
    pub fn new(dataset_fingerprint: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: CHECKPOINT_VERSION,
            run_id: uuid::Uuid::new_v4().to_string(),
            dataset_fingerprint: dataset_fingerprint.into(),
            completed: BTreeSet::new(),
            totals: RunTotals::default(),
            started_at: now,
            updated_at: now,
        }
    }
}

/// Durable record of which records are done
///
/// Implementations serialize commits internally; totals are derived from
/// the committed outcomes and never supplied by the caller.
pub trait CheckpointStore: Send + Sync {
    /// Current checkpoint state
    fn load(&self) -> RunCheckpoint;

    /// Whether `index` has a committed outcome
    fn is_complete(&self, index: usize) -> bool;

    /// Durably record `outcome` and mark its index complete.
    ///
    /// Returns the updated totals. Committing an index twice is an error.
    /// File-backed stores block the calling thread until the write is synced.
    fn commit(&self, outcome: &ClassificationOutcome) -> Result<RunTotals>;

    /// Every committed outcome, in index order
    fn outcomes(&self) -> Vec<ClassificationOutcome>;
}

struct StoreState {
    checkpoint: RunCheckpoint,
    outcomes: BTreeMap<usize, ClassificationOutcome>,
    log: File,
    /// Length of the log up to its last complete outcome line
    log_len: u64,
    /// Set when a failed append could not be rolled back
    poisoned: Option<String>,
}

/// File-backed checkpoint store
pub struct FileCheckpointStore {
    config: CheckpointConfig,
    state: Mutex<StoreState>,
}

impl FileCheckpointStore {
    /// Open or create the store in `config.dir` for the dataset identified by `fingerprint`.
    ///
    /// Resuming against a different dataset is a persistence error.
    pub fn open(config: CheckpointConfig, fingerprint: &str) -> Result<Self> {
        std::fs::create_dir_all(&config.dir).map_err(|e| {
            Error::persistence(format!("failed to create {}: {}", config.dir.display(), e))
        })?;

        let (checkpoint, outcomes) = match read_checkpoint(&config.dir)? {
            Some(checkpoint) => {
                if checkpoint.dataset_fingerprint != fingerprint {
                    return Err(Error::persistence(format!(
                        "checkpoint in {} belongs to a different dataset (run {}); \
                         reset it or choose another output directory",
                        config.dir.display(),
                        checkpoint.run_id
                    )));
                }
                let outcomes = load_outcomes(&config.outcomes_path(), &checkpoint.completed)?;
                info!(
                    run_id = %checkpoint.run_id,
                    completed = checkpoint.completed.len(),
                    cost = checkpoint.totals.total_cost,
                    "Resuming from checkpoint"
                );
                (checkpoint, outcomes)
            }
            None => {
                let checkpoint = RunCheckpoint::new(fingerprint);
                discard_orphan_log(&config.outcomes_path())?;
                write_checkpoint_atomic(&config.dir, &checkpoint, config.fsync)?;
                info!(run_id = %checkpoint.run_id, "Starting new checkpoint");
                (checkpoint, BTreeMap::new())
            }
        };

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(config.outcomes_path())
            .map_err(|e| Error::persistence(format!("failed to open outcome log: {}", e)))?;
        let log_len = log
            .metadata()
            .map_err(|e| Error::persistence(format!("failed to stat outcome log: {}", e)))?
            .len();

        Ok(Self {
            config,
            state: Mutex::new(StoreState {
                checkpoint,
                outcomes,
                log,
                log_len,
                poisoned: None,
            }),
        })
    }

    /// Remove the checkpoint and outcome log from `dir`.
    ///
    /// Returns whether anything was removed.
    pub fn reset(dir: &Path) -> Result<bool> {
        let mut removed = false;
        for name in [CHECKPOINT_FILE, CHECKPOINT_TMP_FILE, OUTCOMES_FILE] {
            let path = dir.join(name);
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    info!("Removed {:?}", path);
                    removed = true;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(Error::persistence(format!(
                        "failed to remove {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
        Ok(removed)
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> RunCheckpoint {
        self.state.lock().checkpoint.clone()
    }

    fn is_complete(&self, index: usize) -> bool {
        self.state.lock().checkpoint.completed.contains(&index)
    }

    fn commit(&self, outcome: &ClassificationOutcome) -> Result<RunTotals> {
        // Blocking file IO, held under the lock for one append and one rename
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(reason) = &state.poisoned {
            return Err(Error::persistence(format!(
                "checkpoint store unusable after failed write: {}",
                reason
            )));
        }
        if state.checkpoint.completed.contains(&outcome.index) {
            return Err(Error::persistence(format!(
                "record {} is already committed",
                outcome.index
            )));
        }

        // Outcome first, then the completion marker
        let mut line = serde_json::to_string(outcome)?;
        line.push('\n');
        if let Err(e) = append_line(&mut state.log, state.log_len, line.as_bytes(), self.config.fsync)
        {
            if let Err(repair) = state.log.set_len(state.log_len) {
                warn!(error = %repair, "Could not roll back partial outcome line");
                state.poisoned = Some(e.to_string());
            }
            return Err(Error::persistence(format!("failed to append outcome: {}", e)));
        }
        state.log_len += line.len() as u64;

        let mut next = state.checkpoint.clone();
        next.completed.insert(outcome.index);
        next.totals.add(outcome);
        next.updated_at = Utc::now();
        write_checkpoint_atomic(&self.config.dir, &next, self.config.fsync)?;

        let totals = next.totals.clone();
        state.checkpoint = next;
        state.outcomes.insert(outcome.index, outcome.clone());
        debug!(index = outcome.index, "Committed outcome");

        Ok(totals)
    }

    fn outcomes(&self) -> Vec<ClassificationOutcome> {
        self.state.lock().outcomes.values().cloned().collect()
    }
}

/// Read the checkpoint in `dir`, if there is one
pub fn read_checkpoint(dir: &Path) -> Result<Option<RunCheckpoint>> {
    let path = dir.join(CHECKPOINT_FILE);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::persistence(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    let checkpoint: RunCheckpoint = serde_json::from_str(&content).map_err(|e| {
        Error::persistence(format!("corrupt checkpoint {}: {}", path.display(), e))
    })?;
    if checkpoint.version != CHECKPOINT_VERSION {
        return Err(Error::persistence(format!(
            "unsupported checkpoint version {}",
            checkpoint.version
        )));
    }
    Ok(Some(checkpoint))
}

fn write_checkpoint_atomic(dir: &Path, checkpoint: &RunCheckpoint, fsync: bool) -> Result<()> {
    let tmp_path = dir.join(CHECKPOINT_TMP_FILE);
    let final_path = dir.join(CHECKPOINT_FILE);
    let json = serde_json::to_vec_pretty(checkpoint)?;

    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&json)?;
        if fsync {
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, &final_path)?;
        #[cfg(unix)]
        if fsync {
            File::open(dir)?.sync_all()?;
        }
        Ok(())
    };

    write().map_err(|e| {
        Error::persistence(format!(
            "failed to write {}: {}",
            final_path.display(),
            e
        ))
    })
}

/// Append `line` after the first `good_len` bytes of the log, dropping
/// anything an interrupted earlier write left past that point
fn append_line(log: &mut File, good_len: u64, line: &[u8], fsync: bool) -> std::io::Result<()> {
    if log.metadata()?.len() != good_len {
        warn!(good_len, "Truncating partial write from outcome log");
        log.set_len(good_len)?;
    }
    log.write_all(line)?;
    log.flush()?;
    if fsync {
        log.sync_data()?;
    }
    Ok(())
}

/// Load the outcome log, keeping the latest outcome for each completed index
fn load_outcomes(
    path: &Path,
    completed: &BTreeSet<usize>,
) -> Result<BTreeMap<usize, ClassificationOutcome>> {
    let mut outcomes = BTreeMap::new();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => File::create(path).map_err(|e| {
            Error::persistence(format!("failed to create {}: {}", path.display(), e))
        })?,
        Err(e) => {
            return Err(Error::persistence(format!(
                "failed to open {}: {}",
                path.display(),
                e
            )))
        }
    };

    let mut reader = BufReader::new(file);
    let mut line = String::new();
    let mut valid_len: u64 = 0;
    let mut torn_tail = false;
    let mut line_no = 0usize;

    loop {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .map_err(|e| Error::persistence(format!("failed to read outcome log: {}", e)))?;
        if read == 0 {
            break;
        }
        line_no += 1;

        let complete_line = line.ends_with('\n');
        match serde_json::from_str::<ClassificationOutcome>(line.trim_end()) {
            Ok(outcome) if complete_line => {
                valid_len += read as u64;
                outcomes.insert(outcome.index, outcome);
            }
            result => {
                // Only the final line may be torn by a crash mid-append
                let at_end = reader
                    .fill_buf()
                    .map(|rest| rest.is_empty())
                    .unwrap_or(false);
                if !at_end {
                    let reason = result.err().map(|e| e.to_string()).unwrap_or_default();
                    return Err(Error::persistence(format!(
                        "corrupt outcome log at line {}: {}",
                        line_no, reason
                    )));
                }
                warn!(line = line_no, "Discarding torn trailing line in outcome log");
                torn_tail = true;
                break;
            }
        }
    }

    if torn_tail {
        OpenOptions::new()
            .write(true)
            .open(path)
            .and_then(|file| file.set_len(valid_len))
            .map_err(|e| Error::persistence(format!("failed to repair outcome log: {}", e)))?;
    }

    let orphans: Vec<usize> = outcomes
        .keys()
        .filter(|index| !completed.contains(index))
        .copied()
        .collect();
    for index in orphans {
        debug!(index, "Ignoring outcome without completion marker");
        outcomes.remove(&index);
    }

    if let Some(missing) = completed.iter().find(|index| !outcomes.contains_key(index)) {
        return Err(Error::persistence(format!(
            "checkpoint marks record {} complete but the outcome log has no entry for it",
            missing
        )));
    }

    Ok(outcomes)
}

fn discard_orphan_log(path: &Path) -> Result<()> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => {
            warn!("Outcome log without checkpoint found, starting it fresh");
            File::create(path).map(|_| ()).map_err(|e| {
                Error::persistence(format!("failed to truncate {}: {}", path.display(), e))
            })
        }
        _ => Ok(()),
    }
}
