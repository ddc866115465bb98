

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info, warn};

use super::state::SessionState;
use crate::core::error::{MiseError, Result};

pub const SCHEMA_VERSION: u32 = 1;


/// One persisted session: the state fields flattened next to a few envelope fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default = "legacy_schema_version")]
    pub schema_version: u32,
    pub session_id: String,
    #[serde(default)]
    pub archived: bool,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub state: SessionState,
    /// Fields this build does not know, kept so a rewrite does not lose them.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn legacy_schema_version() -> u32 {
    1
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>, state: SessionState) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            session_id: session_id.into(),
            archived: false,
            updated_at: Utc::now(),
            state,
            extra: serde_json::Map::new(),
        }
    }
}


#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub dish_name: Option<String>,
    pub turn_count: u64,
    pub archived: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<&SessionRecord> for SessionSummary {
    fn from(record: &SessionRecord) -> Self {
        Self {
            session_id: record.session_id.clone(),
            dish_name: record.state.dish_name.clone(),
            turn_count: record.state.turn_count,
            archived: record.archived,
            updated_at: record.updated_at,
        }
    }
}


#[async_trait]
pub trait StateStore: Send + Sync {

    async fn load(&self, session_id: &str) -> Result<Option<SessionState>>;


    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()>;

    /// Marks a finished session. The record is kept and still loadable.
    async fn archive(&self, session_id: &str) -> Result<()>;


    async fn list(&self) -> Result<Vec<SessionSummary>>;
}

/// Session ids become file names, so keep them to a safe alphabet.
pub fn validate_session_id(session_id: &str) -> Result<()> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(MiseError::Validation(format!(
            "invalid session id '{}': use 1-128 of [A-Za-z0-9_-]",
            crate::safe_truncate(session_id, 40)
        )))
    }
}


#[derive(Default)]
pub struct InMemoryStateStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn is_archived(&self, session_id: &str) -> bool {
        self.records
            .read()
            .get(session_id)
            .is_some_and(|record| record.archived)
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        validate_session_id(session_id)?;
        Ok(self
            .records
            .read()
            .get(session_id)
            .map(|record| record.state.clone()))
    }

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()> {
        validate_session_id(session_id)?;
        let mut records = self.records.write();
        match records.get_mut(session_id) {
            Some(record) => {
                record.state = state.clone();
                record.updated_at = Utc::now();
            }
            None => {
                records.insert(
                    session_id.to_string(),
                    SessionRecord::new(session_id, state.clone()),
                );
            }
        }
        Ok(())
    }

    async fn archive(&self, session_id: &str) -> Result<()> {
        validate_session_id(session_id)?;
        let mut records = self.records.write();
        let record = records
            .get_mut(session_id)
            .ok_or_else(|| MiseError::Store(format!("no session '{session_id}' to archive")))?;
        record.archived = true;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut summaries: Vec<SessionSummary> =
            self.records.read().values().map(SessionSummary::from).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}


/// One pretty-printed JSON file per session under `dir`.
#[derive(Debug, Clone)]
pub struct JsonFileStateStore {
    dir: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    async fn read_record(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        validate_session_id(session_id)?;
        let path = self.record_path(session_id);

        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: SessionRecord = serde_json::from_str(&raw).map_err(|e| {
            MiseError::Store(format!("corrupt session record {}: {e}", path.display()))
        })?;

        if record.schema_version > SCHEMA_VERSION {
            warn!(
                "Session {} was written by schema v{} (this build reads v{}); unknown fields kept as-is",
                session_id, record.schema_version, SCHEMA_VERSION
            );
        }
        Ok(Some(record))
    }

    /// Write-then-rename so a crash never leaves a half-written record.
    async fn write_record(&self, record: &SessionRecord) -> Result<()> {
        fs::create_dir_all(&self.dir).await?;

        let path = self.record_path(&record.session_id);
        let tmp = self.dir.join(format!(".{}.json.tmp", record.session_id));
        let json = serde_json::to_string_pretty(record)?;

        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;

        debug!(
            "Persisted session {} (turn_count={}) to {}",
            record.session_id,
            record.state.turn_count,
            path.display()
        );
        Ok(())
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        Ok(self.read_record(session_id).await?.map(|record| record.state))
    }

    async fn save(&self, session_id: &str, state: &SessionState) -> Result<()> {
        let record = match self.read_record(session_id).await? {
            Some(mut existing) => {
                existing.schema_version = existing.schema_version.max(SCHEMA_VERSION);
                existing.state = state.clone();
                existing.updated_at = Utc::now();
                existing
            }
            None => SessionRecord::new(session_id, state.clone()),
        };
        self.write_record(&record).await
    }

    async fn archive(&self, session_id: &str) -> Result<()> {
        let mut record = self
            .read_record(session_id)
            .await?
            .ok_or_else(|| MiseError::Store(format!("no session '{session_id}' to archive")))?;
        record.archived = true;
        record.updated_at = Utc::now();
        self.write_record(&record).await?;
        info!("Session {} archived", session_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let Some(session_id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if validate_session_id(session_id).is_err() {
                continue;
            }
            match self.read_record(session_id).await {
                Ok(Some(record)) => summaries.push(SessionSummary::from(&record)),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable session {}: {}", path.display(), e),
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }
}
