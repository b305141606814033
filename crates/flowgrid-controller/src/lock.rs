//! Mutual exclusion of passes per routing resource.
//!
//! Two patch applications against the same resource can interleave and
//! leave a mix of old and new weights, so a pass holds:
//!
//! - a [`RouteLocks`] guard for controllers sharing one process, and
//! - a [`PassLock`] file for separately scheduled processes (cron).

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, warn};

use flow_core::RouteResource;

use crate::error::{ControllerError, ControllerResult};

/// One async mutex per resource id. Cheap to clone; clones share locks.
#[derive(Debug, Clone, Default)]
pub struct RouteLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl RouteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other pass holds `resource`.
    pub async fn lock(&self, resource: &RouteResource) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self
                .inner
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            map.entry(resource.id()).or_default().clone()
        };
        mutex.lock_owned().await
    }
}

/// Exclusive lock file, removed on drop.
///
/// The file holds an owner token (`<pid>:<nanos>:<seq>`). Only the owner
/// removes it on drop; a reclaimed lock is left to its new holder.
#[derive(Debug)]
pub struct PassLock {
    path: PathBuf,
    token: String,
}

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(0);

fn owner_token() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!(
        "{}:{nanos}:{}",
        std::process::id(),
        NEXT_TOKEN.fetch_add(1, AtomicOrdering::Relaxed)
    )
}

impl PassLock {
    /// Create `<dir>/flowgrid-<namespace>-<kind>-<name>.lock`.
    ///
    /// Fails with `Busy` when the file exists and is younger than
    /// `stale_after`; older files are treated as abandoned and replaced.
    pub fn acquire(
        dir: &Path,
        resource: &RouteResource,
        stale_after: Duration,
    ) -> ControllerResult<Self> {
        let path = dir.join(lock_file_name(resource));
        let token = owner_token();

        for attempt in 0..3 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    writeln!(file, "{token}")?;
                    debug!(path = %path.display(), "pass lock acquired");
                    return Ok(Self { path, token });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let seen = match std::fs::read_to_string(&path) {
                        Ok(seen) => seen,
                        Err(e) if e.kind() == ErrorKind::NotFound => continue,
                        Err(e) => return Err(e.into()),
                    };
                    let age = std::fs::metadata(&path)
                        .and_then(|m| m.modified())
                        .ok()
                        .and_then(|t| SystemTime::now().duration_since(t).ok())
                        .unwrap_or_default();

                    if attempt < 2 && age >= stale_after {
                        warn!(
                            path = %path.display(),
                            age_secs = age.as_secs(),
                            holder = seen.trim(),
                            "reclaiming stale pass lock"
                        );
                        if reclaim(&path, &seen, &token)? {
                            continue;
                        }
                    }

                    return Err(ControllerError::Busy {
                        resource: resource.id(),
                        detail: format!("{} held for {}s", path.display(), age.as_secs()),
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ControllerError::Busy {
            resource: resource.id(),
            detail: format!("{} re-created while reclaiming it", path.display()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Move a stale lock aside and delete it, but only if it still holds
/// `seen`. A lock re-created since it was inspected is put back.
///
/// Returns true when the path is free to be created again.
fn reclaim(path: &Path, seen: &str, token: &str) -> ControllerResult<bool> {
    let mut aside = path.as_os_str().to_owned();
    aside.push(format!(".{}.stale", token.replace(':', "-")));
    let aside = PathBuf::from(aside);

    match std::fs::rename(path, &aside) {
        Ok(()) => {}
        // Someone else reclaimed it first.
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    }

    let moved = std::fs::read_to_string(&aside)?;
    if moved == seen {
        std::fs::remove_file(&aside)?;
        return Ok(true);
    }

    // A live lock was swapped in after the check. Restore it unless the
    // path has been taken again meanwhile.
    match std::fs::hard_link(&aside, path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
        Err(e) => return Err(e.into()),
    }
    std::fs::remove_file(&aside)?;
    Ok(false)
}

impl Drop for PassLock {
    fn drop(&mut self) {
        match std::fs::read_to_string(&self.path) {
            Ok(held) if held.trim() == self.token => {
                if let Err(e) = std::fs::remove_file(&self.path) {
                    warn!(path = %self.path.display(), error = %e, "failed to remove pass lock");
                }
            }
            Ok(held) => warn!(
                path = %self.path.display(),
                holder = held.trim(),
                "pass lock was reclaimed by another holder, leaving it"
            ),
            Err(e) => warn!(path = %self.path.display(), error = %e, "pass lock vanished before release"),
        }
    }
}

fn lock_file_name(resource: &RouteResource) -> String {
    let clean = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect()
    };
    format!(
        "flowgrid-{}-{}-{}.lock",
        clean(&resource.namespace),
        clean(&resource.kind),
        clean(&resource.name)
    )
}
