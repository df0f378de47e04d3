//! Cross-process lock files with liveness heartbeats.
//!
//! A lock is a file whose only content is the holder's last heartbeat as a
//! UTC epoch timestamp. Waiters poll the content; a timestamp that stops
//! changing for ~10 seconds means the holder died and the lock is broken
//! open. Holders rewrite the timestamp every second from a background task.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use tracing::{info, warn};

/// Heartbeat rewrite period.
const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);
/// Unchanged reads after which the holder is presumed dead (~10 s of
/// polling at 0.5-0.75 s per read).
const STALE_STRIKES: u32 = 20;
/// Base poll sleep; up to 0.25 s of jitter is added to avoid thundering
/// herds of waiters.
const POLL_SLEEP: Duration = Duration::from_millis(500);

fn timestamp() -> String {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    format!("{:.2}", now.as_secs_f64())
}

/// A named lock file; [`LockFile::acquire`] yields a guard that heartbeats
/// until dropped.
pub struct LockFile {
    path: PathBuf,
    description: String,
    poll_sleep: Duration,
    stale_strikes: u32,
}

impl LockFile {
    pub fn new(path: PathBuf, description: &str) -> LockFile {
        LockFile {
            path,
            description: description.to_string(),
            poll_sleep: POLL_SLEEP,
            stale_strikes: STALE_STRIKES,
        }
    }

    /// Test constructor with accelerated polling.
    #[cfg(test)]
    fn with_timing(path: PathBuf, poll_sleep: Duration, stale_strikes: u32) -> LockFile {
        LockFile { path, description: "test".to_string(), poll_sleep, stale_strikes }
    }

    /// Takes the lock, waiting out (or breaking) any current holder.
    pub async fn acquire(&self) -> std::io::Result<LockGuard> {
        let mut waited = Duration::ZERO;
        loop {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
            {
                Ok(_) => {
                    std::fs::write(&self.path, timestamp())?;
                    return Ok(LockGuard::start(self.path.clone()));
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    self.wait_for_release(&mut waited).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Polls the holder's heartbeat until the file disappears or goes stale
    /// enough to break.
    async fn wait_for_release(&self, waited: &mut Duration) -> std::io::Result<()> {
        let mut strikes = 0u32;
        let mut last_heartbeat = String::new();
        loop {
            let heartbeat = match std::fs::read_to_string(&self.path) {
                Ok(contents) if contents.is_empty() => "0".to_string(),
                Ok(contents) => contents,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(err) => return Err(err),
            };

            if heartbeat != last_heartbeat {
                last_heartbeat = heartbeat;
                strikes = 0;
            } else {
                strikes += 1;
                if strikes > self.stale_strikes {
                    warn!(
                        description = %self.description,
                        "holder of the lock seems to be dead, force unlocking"
                    );
                    match std::fs::remove_file(&self.path) {
                        Ok(()) => {}
                        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                        Err(err) => return Err(err),
                    }
                    return Ok(());
                }
            }

            info!(
                waited_secs = waited.as_secs_f64(),
                description = %self.description,
                "waiting for lockfile"
            );
            let jitter = Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..0.25));
            let sleep_for = self.poll_sleep + jitter;
            tokio::time::sleep(sleep_for).await;
            *waited += sleep_for;
        }
    }
}

/// Held lock. Dropping it stops the heartbeat and unlinks the file.
pub struct LockGuard {
    path: PathBuf,
    stop: Arc<AtomicBool>,
    heartbeat: tokio::task::JoinHandle<()>,
}

impl LockGuard {
    fn start(path: PathBuf) -> LockGuard {
        let stop = Arc::new(AtomicBool::new(false));
        let heartbeat = tokio::spawn({
            let path = path.clone();
            let stop = Arc::clone(&stop);
            async move {
                let mut ticker = tokio::time::interval(HEARTBEAT_PERIOD);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    if stop.load(Ordering::Acquire) {
                        break;
                    }
                    if let Err(err) = std::fs::write(&path, timestamp()) {
                        warn!(path = %path.display(), error = %err, "lock heartbeat failed");
                    }
                }
            }
        });
        LockGuard { path, stop, heartbeat }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.heartbeat.abort();
        if let Err(err) = std::fs::remove_file(&self.path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %err, "failed to remove lock file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::LockFile;

    #[tokio::test]
    async fn acquire_creates_and_release_removes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locks/download.lock");
        let lock = LockFile::new(path.clone(), "test artifact");

        let guard = lock.acquire().await.unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.parse::<f64>().unwrap() > 0.0);

        drop(guard);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn heartbeat_advances_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beat.lock");
        let lock = LockFile::new(path.clone(), "beat");

        let guard = lock.acquire().await.unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        let second = std::fs::read_to_string(&path).unwrap();
        assert_ne!(first, second);
        drop(guard);
    }

    #[tokio::test]
    async fn stale_lock_is_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stale.lock");
        std::fs::write(&path, "1234.00").unwrap();

        let lock = LockFile::with_timing(path.clone(), Duration::from_millis(10), 3);
        let guard = lock.acquire().await.unwrap();
        assert!(path.exists());
        drop(guard);
    }

    #[tokio::test]
    async fn waiter_takes_over_after_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contended.lock");

        let lock = LockFile::with_timing(path.clone(), Duration::from_millis(10), 1000);
        let guard = lock.acquire().await.unwrap();

        let waiter_path = path.clone();
        let waiter = tokio::spawn(async move {
            let lock = LockFile::with_timing(waiter_path, Duration::from_millis(10), 1000);
            lock.acquire().await.unwrap()
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(guard);

        let second = waiter.await.unwrap();
        assert!(path.exists());
        drop(second);
        assert!(!path.exists());
    }
}
