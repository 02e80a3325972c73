// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Rotation Signal (dropfile): atomic publish of a new session-key string
//! under the controller's cache directory, observed by worker processes at
//! 1-second mtime resolution.
//!
//! A same-second double-write is a known race under concurrent publishers;
//! this implementation waits out the collision as a compatibility fallback
//! but bounds the number of retries and surfaces
//! [`DropfileError::RaceWindow`] instead of spinning silently forever.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto::envelope::generate_key_string;

/// Final, atomically-published dropfile name.
const DFN_NAME: &str = ".dfn";
/// Temp dropfile name, renamed over `DFN_NAME` on publish.
const DFNT_NAME: &str = ".dfnt";
/// Bound on same-second collision retries before giving up with
/// [`DropfileError::RaceWindow`].
const MAX_WAIT_ATTEMPTS: u32 = 10;

/// Rotation Signal errors.
#[derive(Debug, Error)]
pub enum DropfileError {
    /// Filesystem I/O failure.
    #[error("io error")]
    Io,
    /// Cache directory or dropfile has unsafe permissions.
    #[error("permission denied")]
    PermissionDenied,
    /// Same-second double-write window exceeded the bounded retry budget.
    /// Concurrent publishers must be serialized externally.
    #[error("dropfile race window exceeded")]
    RaceWindow,
}

impl From<std::io::Error> for DropfileError {
    fn from(_: std::io::Error) -> Self {
        DropfileError::Io
    }
}

/// Path to the final dropfile: `<cachedir>/.dfn`.
pub fn dfn_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(DFN_NAME)
}

/// Path to the temp dropfile: `<cachedir>/.dfnt`.
pub fn dfnt_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(DFNT_NAME)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn mtime_secs(path: &Path) -> Option<u64> {
    let meta = fs::metadata(path).ok()?;
    let modified = meta.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs())
}

/// Generate a fresh session-key string and atomically publish it as the new
/// dropfile: wait out any same-second collision, write `.dfnt` with
/// world-denied permissions, then rename over `.dfn`.
///
/// `key_size` is the AES key size in bits passed through to
/// [`generate_key_string`].
pub fn publish(
    cache_dir: &Path,
    key_size: usize,
    user: Option<&str>,
) -> Result<String, DropfileError> {
    fs::create_dir_all(cache_dir)?;

    let dfn = dfn_path(cache_dir);
    let dfnt = dfnt_path(cache_dir);

    let mut attempts = 0u32;
    loop {
        let now = now_secs();
        match mtime_secs(&dfn) {
            Some(mtime) if mtime == now => {
                attempts += 1;
                if attempts > MAX_WAIT_ATTEMPTS {
                    warn!("dropfile publish: same-second collision exceeded retry budget");
                    return Err(DropfileError::RaceWindow);
                }
                debug!(attempts, "dropfile publish: same-second collision, waiting");
                thread::sleep(Duration::from_secs(1));
                continue;
            }
            _ => break,
        }
    }

    let key_string = generate_key_string(key_size);

    atomic_write(&dfnt, key_string.as_bytes())?;
    best_effort_chown(&dfnt, user);
    fs::rename(&dfnt, &dfn)?;
    best_effort_chown(&dfn, user);

    Ok(key_string)
}

/// Read the dropfile's current key string and mtime, for workers polling
/// for rotation. Returns `None` if the dropfile does not exist yet.
pub fn read(cache_dir: &Path) -> Result<Option<(String, SystemTime)>, DropfileError> {
    let dfn = dfn_path(cache_dir);
    let meta = match fs::metadata(&dfn) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(_) => return Err(DropfileError::Io),
    };
    let mtime = meta.modified()?;
    let key_string = fs::read_to_string(&dfn)?;
    Ok(Some((key_string.trim().to_string(), mtime)))
}

/// Whether the dropfile's mtime has advanced past `last_seen`, signalling a
/// new key is available.
pub fn has_rotated(cache_dir: &Path, last_seen: Option<SystemTime>) -> bool {
    let Ok(meta) = fs::metadata(dfn_path(cache_dir)) else {
        return false;
    };
    let Ok(mtime) = meta.modified() else {
        return false;
    };
    match last_seen {
        Some(prev) => mtime > prev,
        None => true,
    }
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), DropfileError> {
    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    set_mode(path, 0o400);
    Ok(())
}

fn set_mode(path: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
}

fn best_effort_chown(path: &Path, user: Option<&str>) {
    #[cfg(unix)]
    {
        let Some(user) = user else { return };
        if let Ok(Some(u)) = nix::unistd::User::from_name(user) {
            let _ = nix::unistd::chown(path, Some(u.uid), None);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = (path, user);
    }
}
