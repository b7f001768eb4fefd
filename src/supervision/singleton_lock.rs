//! PID-keyed singleton lock (§5): a second instance started against the same
//! account must refuse to run rather than double-trade. The lock file holds
//! the holder's PID; a lock whose PID is no longer a live process is
//! considered stale and may be reclaimed.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing::warn;

pub struct SingletonLock {
    path: PathBuf,
}

fn process_is_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // Signal 0 performs existence/permission checks without sending a signal.
        unsafe { libc_kill_check(pid) }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        true
    }
}

#[cfg(unix)]
unsafe fn libc_kill_check(pid: u32) -> bool {
    extern "C" {
        fn kill(pid: i32, sig: i32) -> i32;
    }
    kill(pid as i32, 0) == 0
}

impl SingletonLock {
    /// Acquires the lock at `path`, reclaiming it if the recorded holder PID
    /// is no longer running.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Ok(contents) = fs::read_to_string(&path) {
            if let Ok(held_pid) = contents.trim().parse::<u32>() {
                if process_is_alive(held_pid) {
                    bail!("singleton lock held by live process {held_pid} at {}", path.display());
                }
                warn!(held_pid, path = %path.display(), "reclaiming stale singleton lock");
            }
        }

        fs::write(&path, std::process::id().to_string())
            .with_context(|| format!("write singleton lock at {}", path.display()))?;

        Ok(Self { path })
    }
}

impl Drop for SingletonLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_allows_reacquire() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("engine.lock");

        let lock = SingletonLock::acquire(&lock_path).unwrap();
        assert!(lock_path.exists());
        drop(lock);
        assert!(!lock_path.exists());

        let _second = SingletonLock::acquire(&lock_path).unwrap();
    }

    #[test]
    fn stale_lock_from_dead_pid_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("engine.lock");
        std::fs::write(&lock_path, "999999999").unwrap();

        let _lock = SingletonLock::acquire(&lock_path).unwrap();
    }
}
