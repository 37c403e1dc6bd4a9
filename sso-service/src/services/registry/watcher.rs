use crate::services::registry::file::collect_json_files;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;

/// Change observed in the watched registry directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
}

/// Polls the registry directory and reports file-level changes over a
/// channel, decoupling filesystem I/O from cache-mutation timing.
pub struct RegistryWatcher {
    root: PathBuf,
    poll_interval: Duration,
}

impl RegistryWatcher {
    pub fn new(root: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            root: root.into(),
            poll_interval,
        }
    }

    /// Take the baseline snapshot, then spawn the polling loop. Files present
    /// before this returns are baseline, anything later is reported as a
    /// change. The loop ends when the receiver is dropped.
    pub async fn spawn(self) -> mpsc::Receiver<RegistryEvent> {
        let snapshot = match self.scan().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "Initial registry scan failed");
                HashMap::new()
            }
        };
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            self.run(snapshot, tx).await;
        });
        rx
    }

    async fn run(
        self,
        mut snapshot: HashMap<PathBuf, SystemTime>,
        tx: mpsc::Sender<RegistryEvent>,
    ) {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let current = match self.scan().await {
                Ok(current) => current,
                Err(e) => {
                    // Keep the previous snapshot; a transient I/O failure must
                    // not be reported as a mass deletion.
                    tracing::warn!(root = %self.root.display(), error = %e, "Registry scan failed");
                    continue;
                }
            };

            for (path, mtime) in &current {
                let event = match snapshot.get(path) {
                    None => Some(RegistryEvent::Created(path.clone())),
                    Some(previous) if previous != mtime => {
                        Some(RegistryEvent::Modified(path.clone()))
                    }
                    Some(_) => None,
                };
                if let Some(event) = event {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }

            for path in snapshot.keys() {
                if !current.contains_key(path) {
                    if tx.send(RegistryEvent::Deleted(path.clone())).await.is_err() {
                        return;
                    }
                }
            }

            snapshot = current;
        }
    }

    async fn scan(&self) -> std::io::Result<HashMap<PathBuf, SystemTime>> {
        let files = collect_json_files(&self.root).await?;
        let mut snapshot = HashMap::with_capacity(files.len());
        for path in files {
            let modified = tokio::fs::metadata(&path).await?.modified()?;
            snapshot.insert(path, modified);
        }
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    async fn next_event(rx: &mut mpsc::Receiver<RegistryEvent>) -> RegistryEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher should emit an event")
            .expect("watcher channel should stay open")
    }

    #[tokio::test]
    async fn test_create_modify_delete_events() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = RegistryWatcher::new(dir.path(), Duration::from_millis(20));
        // The baseline scan completes before spawn returns, so the write
        // below is always observed as a creation
        let mut rx = watcher.spawn().await;

        let file = dir.path().join("App-1.json");
        tokio::fs::write(&file, b"{}").await.unwrap();
        assert_eq!(next_event(&mut rx).await, RegistryEvent::Created(file.clone()));

        // Backdate nothing: rewrite with different content and an mtime that
        // has to move forward past the poll granularity
        tokio::time::sleep(Duration::from_millis(50)).await;
        tokio::fs::write(&file, b"{\"id\":1}").await.unwrap();
        assert_eq!(
            next_event(&mut rx).await,
            RegistryEvent::Modified(file.clone())
        );

        tokio::fs::remove_file(&file).await.unwrap();
        assert_eq!(next_event(&mut rx).await, RegistryEvent::Deleted(file));
    }

    #[tokio::test]
    async fn test_non_json_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = RegistryWatcher::new(dir.path(), Duration::from_millis(20));
        let mut rx = watcher.spawn().await;

        tokio::fs::write(dir.path().join("notes.txt"), b"ignored")
            .await
            .unwrap();
        let result = timeout(Duration::from_millis(200), rx.recv()).await;
        assert!(result.is_err(), "no event expected for non-json files");
    }
}
