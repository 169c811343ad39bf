//! File backed environment state
//!
//! Manages `.stackflow/environments.json`. Every mutation takes the lock file,
//! reloads the state, changes one member and writes it back with a backup of
//! the previous version.

use crate::error::{ControllerError, Result};
use crate::store::{EnvironmentStore, member_key};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stackflow_core::ControllerAction;
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

const STATE_VERSION: u32 = 1;
const STATE_DIR: &str = ".stackflow";
const STATE_FILE: &str = "environments.json";
const STATE_BACKUP: &str = "environments.json.backup";
const LOCK_FILE: &str = "environments.lock";
const STALE_LOCK_HOURS: i64 = 1;

/// Contents of the state file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateFile {
    /// State file version
    pub version: u32,

    /// Last modified timestamp
    pub updated_at: DateTime<Utc>,

    /// Environments indexed by stack name
    pub environments: BTreeMap<String, EnvironmentRecord>,
}

impl Default for StateFile {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            updated_at: Utc::now(),
            environments: BTreeMap::new(),
        }
    }
}

/// Persisted state of one environment stack
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub outputs: BTreeMap<String, String>,

    /// When each `<Parameter>:<workload>` member was added
    pub members: BTreeMap<String, DateTime<Utc>>,
}

impl EnvironmentRecord {
    fn workloads(&self, action: ControllerAction) -> BTreeSet<String> {
        let prefix = format!("{}:", action.env_parameter());
        self.members
            .keys()
            .filter_map(|key| key.strip_prefix(&prefix))
            .map(str::to_string)
            .collect()
    }
}

/// Store persisted under a project root
pub struct FileStore {
    project_root: PathBuf,
}

impl FileStore {
    pub fn new(project_root: impl AsRef<Path>) -> Self {
        Self {
            project_root: project_root.as_ref().to_path_buf(),
        }
    }

    fn state_dir(&self) -> PathBuf {
        self.project_root.join(STATE_DIR)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join(STATE_FILE)
    }

    fn backup_path(&self) -> PathBuf {
        self.state_dir().join(STATE_BACKUP)
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir().join(LOCK_FILE)
    }

    async fn ensure_state_dir(&self) -> Result<()> {
        let dir = self.state_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!(dir = %dir.display(), "Created state directory");
        }
        Ok(())
    }

    /// Load the current state
    pub async fn load(&self) -> Result<StateFile> {
        let path = self.state_path();
        if !path.exists() {
            tracing::debug!("State file not found, returning empty state");
            return Ok(StateFile::default());
        }

        let content = fs::read_to_string(&path).await?;
        let state: StateFile = serde_json::from_str(&content)?;

        if state.version > STATE_VERSION {
            return Err(ControllerError::State(format!(
                "State file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }

        tracing::debug!(
            environments = state.environments.len(),
            "Loaded environment state"
        );
        Ok(state)
    }

    /// Save the state, keeping the previous file as a backup
    ///
    /// The new state is written to a temporary file and renamed over the old
    /// one, so readers never observe a missing or partial state file.
    pub async fn save(&self, state: &StateFile) -> Result<()> {
        self.ensure_state_dir().await?;

        let path = self.state_path();
        if path.exists() {
            fs::copy(&path, self.backup_path()).await?;
        }

        let content = serde_json::to_string_pretty(state)?;
        let staging = self
            .state_dir()
            .join(format!("{STATE_FILE}.{}.tmp", Uuid::new_v4()));
        fs::write(&staging, content).await?;
        if let Err(e) = fs::rename(&staging, &path).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }

        tracing::debug!(
            environments = state.environments.len(),
            "Saved environment state"
        );
        Ok(())
    }

    /// Acquire the lock for exclusive access
    ///
    /// The lock file is created atomically. A lock held by someone else is
    /// reported as [`ControllerError::Lock`]. Locks older than an hour are
    /// considered stale and taken over.
    pub async fn acquire_lock(&self) -> Result<StateLock> {
        self.ensure_state_dir().await?;

        let lock_path = self.lock_path();
        let info = LockInfo {
            id: Uuid::new_v4(),
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            acquired_at: Utc::now(),
        };
        let content = serde_json::to_string_pretty(&info)?;

        match create_lock_file(&lock_path, &content).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                reclaim_stale_lock(&lock_path).await?;
                create_lock_file(&lock_path, &content)
                    .await
                    .map_err(|e| match e.kind() {
                        ErrorKind::AlreadyExists => {
                            ControllerError::Lock("State was locked by another writer".into())
                        }
                        _ => e.into(),
                    })?;
            }
            Err(e) => return Err(e.into()),
        }

        tracing::trace!(lock_id = %info.id, "Acquired state lock");
        Ok(StateLock {
            lock_path,
            info,
            released: false,
        })
    }

    /// Register an environment stack and its outputs
    ///
    /// Existing members are kept when the environment is already known.
    pub async fn register_environment(
        &self,
        env_stack: &str,
        outputs: BTreeMap<String, String>,
    ) -> Result<()> {
        self.update(|state| {
            state
                .environments
                .entry(env_stack.to_string())
                .or_default()
                .outputs = outputs;
            Ok(true)
        })
        .await
        .map(|_| ())
    }

    /// Apply a change under the lock. The file is only written when `change`
    /// reports a modification.
    async fn update<F>(&self, change: F) -> Result<bool>
    where
        F: FnOnce(&mut StateFile) -> Result<bool> + Send,
    {
        let lock = self.acquire_lock().await?;
        let result = async {
            let mut state = self.load().await?;
            let changed = change(&mut state)?;
            if changed {
                state.updated_at = Utc::now();
                self.save(&state).await?;
            }
            Ok(changed)
        }
        .await;
        lock.release().await?;
        result
    }
}

fn record_mut<'a>(state: &'a mut StateFile, env_stack: &str) -> Result<&'a mut EnvironmentRecord> {
    state
        .environments
        .get_mut(env_stack)
        .ok_or_else(|| ControllerError::EnvironmentNotFound(env_stack.to_string()))
}

#[async_trait]
impl EnvironmentStore for FileStore {
    async fn add(&self, env_stack: &str, action: ControllerAction, workload: &str) -> Result<bool> {
        let key = member_key(action, workload);
        self.update(|state| {
            let record = record_mut(state, env_stack)?;
            if record.members.contains_key(&key) {
                return Ok(false);
            }
            record.members.insert(key, Utc::now());
            Ok(true)
        })
        .await
    }

    async fn remove(
        &self,
        env_stack: &str,
        action: ControllerAction,
        workload: &str,
    ) -> Result<bool> {
        let key = member_key(action, workload);
        self.update(|state| {
            let record = record_mut(state, env_stack)?;
            Ok(record.members.remove(&key).is_some())
        })
        .await
    }

    async fn workloads(
        &self,
        env_stack: &str,
        action: ControllerAction,
    ) -> Result<BTreeSet<String>> {
        let state = self.load().await?;
        state
            .environments
            .get(env_stack)
            .map(|record| record.workloads(action))
            .ok_or_else(|| ControllerError::EnvironmentNotFound(env_stack.to_string()))
    }

    async fn outputs(&self, env_stack: &str) -> Result<BTreeMap<String, String>> {
        let state = self.load().await?;
        state
            .environments
            .get(env_stack)
            .map(|record| record.outputs.clone())
            .ok_or_else(|| ControllerError::EnvironmentNotFound(env_stack.to_string()))
    }
}

/// Lock information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LockInfo {
    id: Uuid,
    holder: String,
    acquired_at: DateTime<Utc>,
}

/// Lock file as observed on disk
///
/// `info` is `None` while the writer has not finished writing the file, in
/// which case `since` is the file modification time.
#[derive(Debug, PartialEq, Eq)]
struct LockSnapshot {
    info: Option<LockInfo>,
    since: DateTime<Utc>,
}

async fn create_lock_file(path: &Path, content: &str) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await
}

/// Read the lock file, `None` when there is none
async fn read_lock(path: &Path) -> Result<Option<LockSnapshot>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if let Ok(info) = serde_json::from_str::<LockInfo>(&content) {
        return Ok(Some(LockSnapshot {
            since: info.acquired_at,
            info: Some(info),
        }));
    }
    let modified = match fs::metadata(path).await {
        Ok(metadata) => metadata.modified()?,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(LockSnapshot {
        info: None,
        since: DateTime::<Utc>::from(modified),
    }))
}

/// Remove the lock at `path` if it is stale
///
/// The stale file is first renamed aside so that only one writer can take it
/// over. If what was renamed is not the stale lock that was inspected, it is
/// linked back in place.
async fn reclaim_stale_lock(path: &Path) -> Result<()> {
    let Some(snapshot) = read_lock(path).await? else {
        return Ok(());
    };

    let age = Utc::now().signed_duration_since(snapshot.since);
    if age.num_hours() < STALE_LOCK_HOURS {
        let holder = snapshot
            .info
            .as_ref()
            .map_or("unknown", |info| info.holder.as_str());
        return Err(ControllerError::Lock(format!(
            "State is locked by {} since {}",
            holder, snapshot.since
        )));
    }

    let stale_path = path.with_extension(format!("lock.stale-{}", Uuid::new_v4()));
    match fs::rename(path, &stale_path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    }

    let taken = read_lock(&stale_path).await?;
    if taken.as_ref() != Some(&snapshot) {
        let restored = fs::hard_link(&stale_path, path).await;
        fs::remove_file(&stale_path).await?;
        if let Err(e) = restored
            && e.kind() != ErrorKind::AlreadyExists
        {
            return Err(e.into());
        }
        return Err(ControllerError::Lock(
            "State lock changed while taking over a stale lock".into(),
        ));
    }

    tracing::warn!(
        holder = snapshot.info.as_ref().map_or("unknown", |info| info.holder.as_str()),
        since = %snapshot.since,
        "Removed stale lock"
    );
    fs::remove_file(&stale_path).await?;
    Ok(())
}

/// RAII guard for the state lock
///
/// Only removes the lock file while it still holds this guard's lock.
pub struct StateLock {
    lock_path: PathBuf,
    info: LockInfo,
    released: bool,
}

impl StateLock {
    fn owns(&self, content: &str) -> bool {
        serde_json::from_str::<LockInfo>(content).is_ok_and(|info| info.id == self.info.id)
    }

    /// Release the lock
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::read_to_string(&self.lock_path).await {
            Ok(content) if self.owns(&content) => {
                fs::remove_file(&self.lock_path).await?;
            }
            Ok(_) => {
                tracing::warn!(lock_id = %self.info.id, "State lock was taken over, leaving it in place");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Ok(content) = std::fs::read_to_string(&self.lock_path)
            && self.owns(&content)
        {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}
