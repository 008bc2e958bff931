//! The shared active list and its scoped exclusive acquisition.
//!
//! The external program reads one file to learn which project(s) to process.
//! A run takes the list over for exactly one case and puts the previous
//! content back afterwards. [`ActiveListGuard`] owns that window: dropping it
//! restores the snapshot even when the run errored or panicked.
//!
//! A `<list>.lock` file created with `create_new` keeps two drivers from
//! interleaving on the same list. The lock records the holder's pid and the
//! snapshot, so a driver that was killed before it could restore leaves
//! enough behind for the next one to put the list back.

use crate::case::write_atomic;
use crate::error::{Result, RunnerError};
use chrono::{DateTime, Utc};
use cropsim_core::obs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Handle to the active list file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveList {
    path: PathBuf,
}

impl ActiveList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Whether another run currently holds the list.
    pub fn is_locked(&self) -> bool {
        self.lock_path().exists()
    }

    /// Current content, `None` when the file does not exist.
    pub fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Non-blank lines of the list.
    pub fn entries(&self) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Holder recorded in the lock file, `None` when unlocked or while the
    /// record is still being written.
    pub fn lock_record(&self) -> Option<LockRecord> {
        let text = fs::read_to_string(self.lock_path()).ok()?;
        serde_json::from_str(&text).ok()
    }

    /// Put the list back from a lock whose holder is no longer running.
    ///
    /// Returns the recovered record, or `None` when there was nothing to
    /// recover (no lock, a live holder, or another driver got there first).
    pub fn recover_stale_lock(&self) -> Result<Option<LockRecord>> {
        let Some(record) = self.lock_record() else {
            return Ok(None);
        };
        if process_alive(record.pid) {
            return Ok(None);
        }

        // Claim the lock by moving it aside so only one driver restores.
        let lock_path = self.lock_path();
        let mut claimed = lock_path.as_os_str().to_owned();
        claimed.push(format!(".stale-{}", uuid::Uuid::new_v4()));
        let claimed = PathBuf::from(claimed);
        match fs::rename(&lock_path, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let claimed_record = fs::read_to_string(&claimed)
            .ok()
            .and_then(|text| serde_json::from_str::<LockRecord>(&text).ok());
        if claimed_record.as_ref() != Some(&record) {
            // A fresh lock replaced the stale one in between; hand it back.
            let _ = fs::hard_link(&claimed, &lock_path);
            let _ = fs::remove_file(&claimed);
            return Ok(None);
        }

        match &record.snapshot {
            ListSnapshot::Content(text) => restore_content(&self.path, Some(text.as_str()))?,
            ListSnapshot::Missing => restore_content(&self.path, None)?,
            ListSnapshot::Unknown => {
                debug!(path = %self.path.display(), "stale lock has no snapshot; list left as is")
            }
        }
        fs::remove_file(&claimed)?;
        obs::emit_active_list_stale_lock_recovered(&self.path, record.pid);
        Ok(Some(record))
    }

    /// Fail with `ActiveListBusy` unless no live run holds the list.
    fn ensure_unlocked(&self) -> Result<()> {
        if self.is_locked() {
            self.recover_stale_lock()?;
        }
        if self.is_locked() {
            return Err(RunnerError::ActiveListBusy(self.path.clone()));
        }
        Ok(())
    }

    /// Append one entry. Refused while a run holds the list, since the
    /// run's restore would discard it.
    pub fn append(&self, entry: &str) -> Result<()> {
        self.ensure_unlocked()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{entry}")?;
        Ok(())
    }

    /// Drop every line equal to `entry`. Returns whether anything was removed.
    pub fn remove(&self, entry: &str) -> Result<bool> {
        self.ensure_unlocked()?;
        let Some(text) = self.read()? else {
            return Ok(false);
        };
        let kept: Vec<&str> = text.lines().filter(|line| line.trim() != entry).collect();
        if kept.len() == text.lines().count() {
            return Ok(false);
        }
        let mut content = kept.join("\n");
        if !kept.is_empty() {
            content.push('\n');
        }
        write_atomic(&self.path, &content)?;
        Ok(true)
    }

    /// Snapshot the list and replace it with exactly `entry`.
    pub fn acquire_exclusive(&self, entry: &str) -> Result<ActiveListGuard> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        if self.is_locked() {
            self.recover_stale_lock()?;
        }
        let (lock, file) = ListLock::create(self.lock_path())?;
        let snapshot = self.read()?;
        ListLock::record(
            file,
            &LockRecord {
                pid: std::process::id(),
                acquired_at: Utc::now(),
                snapshot: snapshot.clone().into(),
            },
        )?;

        let guard = ActiveListGuard {
            path: self.path.clone(),
            snapshot,
            released: false,
            _lock: lock,
        };
        write_atomic(&self.path, &format!("{entry}\n"))?;
        obs::emit_active_list_acquired(&self.path, entry);
        Ok(guard)
    }
}

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    pub pid: u32,
    pub acquired_at: DateTime<Utc>,
    #[serde(default)]
    pub snapshot: ListSnapshot,
}

/// What the list held when the lock was taken.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListSnapshot {
    /// The lock does not say; recovery leaves the list as it is.
    #[default]
    Unknown,
    Missing,
    Content(String),
}

impl From<Option<String>> for ListSnapshot {
    fn from(snapshot: Option<String>) -> Self {
        match snapshot {
            Some(text) => ListSnapshot::Content(text),
            None => ListSnapshot::Missing,
        }
    }
}

#[derive(Debug)]
struct ListLock {
    path: PathBuf,
}

impl ListLock {
    fn create(path: PathBuf) -> Result<(Self, fs::File)> {
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => Ok((Self { path }, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(RunnerError::ActiveListBusy(path))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn record(mut file: fs::File, record: &LockRecord) -> Result<()> {
        serde_json::to_writer(&mut file, record)?;
        file.write_all(b"\n")?;
        file.sync_all()?;
        Ok(())
    }
}

impl Drop for ListLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Whether `pid` names a running process on this host.
#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(true)
}

#[cfg(not(unix))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Write `snapshot` back, or delete the list when there was none.
fn restore_content(path: &Path, snapshot: Option<&str>) -> Result<()> {
    match snapshot {
        Some(text) => write_atomic(path, text)?,
        None => match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        },
    }
    Ok(())
}

/// Exclusive hold on the active list. Restores the snapshot on release or drop.
#[derive(Debug)]
pub struct ActiveListGuard {
    path: PathBuf,
    snapshot: Option<String>,
    released: bool,
    // Dropped after `Drop::drop` has restored the list.
    _lock: ListLock,
}

impl ActiveListGuard {
    /// Content the list had before acquisition.
    pub fn snapshot(&self) -> Option<&str> {
        self.snapshot.as_deref()
    }

    /// Restore the snapshot and report whether that worked.
    pub fn release(mut self) -> Result<()> {
        let restored = self.restore();
        self.released = true;
        restored
    }

    fn restore(&self) -> Result<()> {
        restore_content(&self.path, self.snapshot.as_deref())?;
        obs::emit_active_list_restored(&self.path, self.snapshot.is_some());
        Ok(())
    }
}

impl Drop for ActiveListGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        debug!(path = %self.path.display(), "restoring active list on drop");
        if let Err(e) = self.restore() {
            obs::emit_active_list_restore_error(&self.path, &e);
        }
    }
}
