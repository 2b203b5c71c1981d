use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use directories::ProjectDirs;
use pomosync_ipc::Category;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::settings::PhaseDurations;

/// The part of a session that survives a restart. Phase progress is not
/// kept; a restored sequencer is always idle at full duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub step: u8,
    pub completed_work_sessions: u32,
    pub sequence_id: Option<i64>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Category,
    #[serde(default)]
    pub durations: PhaseDurations,
    pub saved_at: DateTime<Local>,
}

pub struct Persistence {
    path: PathBuf,
}

impl Persistence {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self> {
        Ok(Self::at(data_dir()?.join("state.json")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, record: &SessionRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(record)?;
        fs::write(&self.path, json)
            .with_context(|| format!("Failed to write session state to {:?}", self.path))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<SessionRecord>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session state at {:?}", self.path))?;
        let record = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse session state at {:?}", self.path))?;
        Ok(Some(record))
    }
}

pub fn data_dir() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("com", "pomosync", "pomosync")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;

    let data_dir = proj_dirs.data_dir();
    fs::create_dir_all(data_dir)?;

    Ok(data_dir.to_path_buf())
}
