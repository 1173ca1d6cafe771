//! In-memory IPFS node for tests.
//!
//! Models just enough of the node for the pipeline and the publish queue:
//! immutable objects by hash, an MFS tree of directories and files linking
//! to objects, and name publishing. Every call is logged, and any operation
//! can be made to fail or slowed down. A delay runs after the call is logged
//! and before it takes effect, so overlapping callers interleave the way they
//! do against a real node.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use storage::{ContentStore, PublishOptions, PublishedName, StoreError, StoreResult};

/// Store operations, for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Stat,
    Cat,
    Mkdir,
    Cp,
    Rm,
    Read,
    Publish,
}

impl StoreOp {
    pub const ALL: [StoreOp; 7] = [
        StoreOp::Stat,
        StoreOp::Cat,
        StoreOp::Mkdir,
        StoreOp::Cp,
        StoreOp::Rm,
        StoreOp::Read,
        StoreOp::Publish,
    ];

    fn name(self) -> &'static str {
        match self {
            StoreOp::Stat => "files/stat",
            StoreOp::Cat => "cat",
            StoreOp::Mkdir => "files/mkdir",
            StoreOp::Cp => "files/cp",
            StoreOp::Rm => "files/rm",
            StoreOp::Read => "files/read",
            StoreOp::Publish => "name/publish",
        }
    }
}

/// One recorded store call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreCall {
    pub op: StoreOp,
    /// Path or hash the call addressed (destination path for `cp`).
    pub target: String,
}

#[derive(Debug)]
struct State {
    objects: HashMap<String, Bytes>,
    dirs: BTreeSet<String>,
    /// MFS file path -> object hash
    files: BTreeMap<String, String>,
    generation: u64,
    calls: Vec<StoreCall>,
    failures: Vec<(StoreOp, Option<String>)>,
    published: Vec<PublishedName>,
    delays: HashMap<StoreOp, Duration>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            objects: HashMap::new(),
            dirs: BTreeSet::from(["/".to_string()]),
            files: BTreeMap::new(),
            generation: 0,
            calls: Vec::new(),
            failures: Vec::new(),
            published: Vec::new(),
            delays: HashMap::new(),
        }
    }
}

impl State {
    fn record(&mut self, op: StoreOp, target: &str) -> StoreResult<()> {
        self.calls.push(StoreCall {
            op,
            target: target.to_string(),
        });

        let injected = self.failures.iter().any(|(failing, needle)| {
            *failing == op && needle.as_deref().map_or(true, |n| target.contains(n))
        });
        if injected {
            return Err(StoreError::Api {
                op: op.name(),
                target: target.to_string(),
                status: 500,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

/// In-memory [`ContentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Log the call, apply injected failures, then wait out any delay.
    async fn enter(&self, op: StoreOp, target: &str) -> StoreResult<()> {
        let delay = {
            let mut state = self.state();
            state.record(op, target)?;
            state.delays.get(&op).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Builder form of [`MemoryStore::add_object`].
    pub fn with_object(self, hash: &str, bytes: impl Into<Bytes>) -> Self {
        self.add_object(hash, bytes);
        self
    }

    /// Make an immutable object resolvable by `hash`.
    pub fn add_object(&self, hash: &str, bytes: impl Into<Bytes>) {
        self.state().objects.insert(hash.to_string(), bytes.into());
    }

    /// Fail every call of `op`.
    pub fn fail(&self, op: StoreOp) {
        self.state().failures.push((op, None));
    }

    /// Fail calls of `op` whose target contains `needle`.
    pub fn fail_matching(&self, op: StoreOp, needle: &str) {
        self.state().failures.push((op, Some(needle.to_string())));
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    /// Slow down every call of `op`.
    pub fn set_delay(&self, op: StoreOp, delay: Duration) {
        self.state().delays.insert(op, delay);
    }

    /// Slow down every operation.
    pub fn set_delay_all(&self, delay: Duration) {
        for op in StoreOp::ALL {
            self.set_delay(op, delay);
        }
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.state().calls.clone()
    }

    /// Number of calls of `op` so far.
    pub fn call_count(&self, op: StoreOp) -> usize {
        self.state().calls.iter().filter(|c| c.op == op).count()
    }

    /// Hash linked at an MFS file path.
    pub fn file(&self, path: &str) -> Option<String> {
        self.state().files.get(path).cloned()
    }

    /// Bytes of the object linked at an MFS file path.
    pub fn file_contents(&self, path: &str) -> Option<Bytes> {
        let state = self.state();
        let hash = state.files.get(path)?;
        state.objects.get(hash).cloned()
    }

    /// Paths of files directly inside `dir`.
    pub fn files_in(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        self.state()
            .files
            .keys()
            .filter(|p| p.strip_prefix(&prefix).is_some_and(|rest| !rest.contains('/')))
            .cloned()
            .collect()
    }

    pub fn has_dir(&self, path: &str) -> bool {
        self.state().dirs.contains(path)
    }

    /// Every name publish so far, in order.
    pub fn published(&self) -> Vec<PublishedName> {
        self.state().published.clone()
    }

    /// Synthetic hash of a directory; changes whenever the tree changes.
    fn dir_hash(generation: u64) -> String {
        format!("QmDir{:0>41}", generation)
    }
}

fn parent(path: &str) -> String {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn stat(&self, path: &str) -> StoreResult<String> {
        self.enter(StoreOp::Stat, path).await?;
        let state = self.state();

        if let Some(hash) = state.files.get(path) {
            Ok(hash.clone())
        } else if state.dirs.contains(path) {
            Ok(Self::dir_hash(state.generation))
        } else {
            Err(StoreError::NotFound(path.to_string()))
        }
    }

    async fn cat(&self, hash: &str) -> StoreResult<Bytes> {
        self.enter(StoreOp::Cat, hash).await?;

        self.state()
            .objects
            .get(hash)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(hash.to_string()))
    }

    async fn mkdir(&self, path: &str) -> StoreResult<()> {
        self.enter(StoreOp::Mkdir, path).await?;
        let mut state = self.state();

        let mut current = path.trim_end_matches('/').to_string();
        let mut created = false;
        while current != "/" && !current.is_empty() {
            if state.files.contains_key(&current) {
                return Err(StoreError::Api {
                    op: StoreOp::Mkdir.name(),
                    target: path.to_string(),
                    status: 500,
                    message: format!("{} is a file", current),
                });
            }
            created |= state.dirs.insert(current.clone());
            current = parent(&current);
        }

        if created {
            state.generation += 1;
        }
        Ok(())
    }

    async fn cp(&self, hash: &str, dest: &str) -> StoreResult<()> {
        self.enter(StoreOp::Cp, dest).await?;
        let mut state = self.state();

        if !state.objects.contains_key(hash) {
            return Err(StoreError::NotFound(format!("/ipfs/{}", hash)));
        }
        let dir = parent(dest);
        if !state.dirs.contains(&dir) {
            return Err(StoreError::NotFound(dir));
        }
        if state.files.contains_key(dest) || state.dirs.contains(dest) {
            return Err(StoreError::AlreadyExists(dest.to_string()));
        }

        state.files.insert(dest.to_string(), hash.to_string());
        state.generation += 1;
        Ok(())
    }

    async fn rm(&self, path: &str) -> StoreResult<()> {
        self.enter(StoreOp::Rm, path).await?;
        let mut state = self.state();

        if state.files.remove(path).is_some() {
            state.generation += 1;
            Ok(())
        } else {
            Err(StoreError::NotFound(path.to_string()))
        }
    }

    async fn read(&self, path: &str) -> StoreResult<Bytes> {
        self.enter(StoreOp::Read, path).await?;
        let state = self.state();

        let hash = state
            .files
            .get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        state
            .objects
            .get(hash)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(hash.clone()))
    }

    async fn publish(&self, hash: &str, options: &PublishOptions) -> StoreResult<PublishedName> {
        self.enter(StoreOp::Publish, hash).await?;

        let published = PublishedName {
            name: options.key.clone().unwrap_or_else(|| "self".to_string()),
            value: format!("/ipfs/{}", hash),
        };
        self.state().published.push(published.clone());
        Ok(published)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[tokio::test]
    async fn test_cp_requires_object_and_parent() {
        let store = MemoryStore::new().with_object(&fixtures::hash(1), "{}");

        let err = store.cp(&fixtures::hash(2), "/weather/a.json").await.unwrap_err();
        assert!(err.is_not_found());

        let err = store.cp(&fixtures::hash(1), "/weather/a.json").await.unwrap_err();
        assert!(err.is_not_found());

        store.mkdir("/weather/u4pr").await.unwrap();
        assert!(store.has_dir("/weather"));
        store.cp(&fixtures::hash(1), "/weather/u4pr/a.json").await.unwrap();

        let err = store.cp(&fixtures::hash(1), "/weather/u4pr/a.json").await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_root_hash_changes_with_tree() {
        let store = MemoryStore::new().with_object(&fixtures::hash(1), "{}");
        store.mkdir("/weather").await.unwrap();
        let before = store.stat("/weather").await.unwrap();
        assert_eq!(before.len(), 46);

        store.mkdir("/weather/u4pr").await.unwrap();
        store.cp(&fixtures::hash(1), "/weather/u4pr/latest.json").await.unwrap();
        let after = store.stat("/weather").await.unwrap();
        assert_ne!(before, after);

        assert_eq!(
            store.stat("/weather/u4pr/latest.json").await.unwrap(),
            fixtures::hash(1)
        );
    }

    #[tokio::test]
    async fn test_mkdir_is_idempotent() {
        let store = MemoryStore::new();
        store.mkdir("/weather/u4pr").await.unwrap();
        let hash = store.stat("/weather").await.unwrap();
        store.mkdir("/weather/u4pr").await.unwrap();
        assert_eq!(store.stat("/weather").await.unwrap(), hash);
    }

    #[tokio::test]
    async fn test_failure_injection_is_recorded() {
        let store = MemoryStore::new();
        store.fail_matching(StoreOp::Mkdir, "u4pr");

        assert!(store.mkdir("/weather/other").await.is_ok());
        assert!(store.mkdir("/weather/u4pr").await.is_err());
        assert_eq!(store.call_count(StoreOp::Mkdir), 2);

        store.clear_failures();
        assert!(store.mkdir("/weather/u4pr").await.is_ok());
    }

    #[test]
    fn test_publish_names() {
        let store = MemoryStore::new();
        let options = PublishOptions::default();

        let published = tokio_test::block_on(store.publish(&fixtures::hash(1), &options)).unwrap();
        assert_eq!(published.name, "self");
        assert_eq!(published.value, format!("/ipfs/{}", fixtures::hash(1)));

        let keyed = PublishOptions {
            key: Some("weather".to_string()),
            ..options
        };
        let published = tokio_test::block_on(store.publish(&fixtures::hash(1), &keyed)).unwrap();
        assert_eq!(published.name, "weather");
        assert_eq!(store.published().len(), 2);
    }

    #[tokio::test]
    async fn test_delay_applies_before_effect() {
        let store = std::sync::Arc::new(MemoryStore::new());
        store.set_delay(StoreOp::Mkdir, Duration::from_millis(50));

        let slow = store.clone();
        let task = tokio::spawn(async move { slow.mkdir("/weather").await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(store.call_count(StoreOp::Mkdir), 1);
        assert!(!store.has_dir("/weather"));

        task.await.unwrap().unwrap();
        assert!(store.has_dir("/weather"));
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent("/weather/u4pr/latest.json"), "/weather/u4pr");
        assert_eq!(parent("/weather"), "/");
    }
}
