//! Run records and the run journal
//!
//! An accepted auto-start hands a fresh active run to a [`RunSink`]. The
//! default sink is an append-only JSON-lines journal: each line is the
//! latest snapshot of one run, and later lines supersede earlier ones with
//! the same id.

use crate::{Result, SensorError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// Journal file name inside the data directory
pub const JOURNAL_FILE: &str = "runs.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Active,
    Paused,
    Completed,
}

/// One GPS position fix on a route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub user_id: String,
    /// Milliseconds since the Unix epoch
    pub start_time: i64,
    /// Absent while the run is in progress
    pub end_time: Option<i64>,
    /// Kilometres
    pub distance: f64,
    /// Seconds
    pub duration: u64,
    /// Minutes per kilometre
    pub average_pace: f64,
    /// km/h
    pub max_speed: f64,
    pub calories: u32,
    pub route: Vec<RoutePoint>,
    pub status: RunStatus,
}

impl RunRecord {
    /// Fresh run in the active state with an empty route
    pub fn new_active(user_id: &str) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: format!("run_{}", now),
            user_id: user_id.to_string(),
            start_time: now,
            end_time: None,
            distance: 0.0,
            duration: 0,
            average_pace: 0.0,
            max_speed: 0.0,
            calories: 0,
            route: Vec::new(),
            status: RunStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RunStatus::Active && self.end_time.is_none()
    }

    /// Close the run at `end_time`
    pub fn complete(&mut self, end_time: i64) {
        self.end_time = Some(end_time);
        self.duration = ((end_time - self.start_time).max(0) / 1000) as u64;
        self.status = RunStatus::Completed;
    }
}

/// Receiver of "start run" commands
pub trait RunSink: Send {
    fn start_run(&mut self, run: RunRecord) -> Result<()>;
}

/// Append-only run journal
pub struct RunJournal {
    path: PathBuf,
}

impl RunJournal {
    /// Open the journal in `base_path`, creating the directory if needed
    pub fn new(base_path: &Path) -> Result<Self> {
        create_dir_all(base_path)
            .map_err(|e| SensorError::Recording(format!("Failed to create directory: {}", e)))?;

        Ok(Self {
            path: base_path.join(JOURNAL_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, run: &RunRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SensorError::Recording(format!("Failed to open journal: {}", e)))?;

        let json = serde_json::to_string(run)
            .map_err(|e| SensorError::Recording(format!("Serialization error: {}", e)))?;

        writeln!(file, "{}", json).map_err(|e| SensorError::Recording(format!("Write error: {}", e)))?;
        file.flush().map_err(|e| SensorError::Recording(format!("Flush error: {}", e)))?;
        Ok(())
    }

    /// Latest snapshot of every run, newest first
    pub fn list_runs(&self) -> Result<Vec<RunRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path).map_err(|e| SensorError::Recording(format!("Open error: {}", e)))?;

        let mut latest: HashMap<String, RunRecord> = HashMap::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| SensorError::Recording(format!("Read error: {}", e)))?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<RunRecord>(&line) {
                Ok(run) => {
                    latest.insert(run.id.clone(), run);
                }
                Err(e) => tracing::warn!("Skipping malformed journal line {}: {}", n + 1, e),
            }
        }

        let mut runs: Vec<RunRecord> = latest.into_values().collect();
        runs.sort_by(|a, b| b.start_time.cmp(&a.start_time).then_with(|| b.id.cmp(&a.id)));
        Ok(runs)
    }

    /// Most recently started run that is still active
    pub fn active_run(&self) -> Result<Option<RunRecord>> {
        Ok(self.list_runs()?.into_iter().find(RunRecord::is_active))
    }

    /// Mark a run completed now
    pub fn complete_run(&mut self, id: &str) -> Result<RunRecord> {
        let mut run = self
            .list_runs()?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| SensorError::Recording(format!("Run not found: {}", id)))?;

        if !run.is_active() {
            return Err(SensorError::Recording(format!("Run {} is not active", id)));
        }

        run.complete(Utc::now().timestamp_millis());
        self.append(&run)?;
        tracing::info!("Run {} completed after {} s", run.id, run.duration);
        Ok(run)
    }
}

impl RunSink for RunJournal {
    fn start_run(&mut self, run: RunRecord) -> Result<()> {
        self.append(&run)?;
        tracing::info!("Run {} started for {}", run.id, run.user_id);
        Ok(())
    }
}
