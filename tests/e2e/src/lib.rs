//! Test harness for end-to-end mnemo scenarios.
//!
//! Provides isolated engine instances for tests:
//! - temporary, disk-backed engines that clean up on drop
//! - in-memory engines for scenarios that don't need persistence
//! - seeding helpers for common fixture shapes

use std::path::PathBuf;

use mnemo_core::manager::StoreOptions;
use mnemo_core::{Config, Engine};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// An [`Engine`] rooted in a temporary directory, with the directory kept alive
/// alongside it so it isn't deleted out from under an open SQLite connection.
pub struct TestEngine {
    pub engine: Engine,
    _temp_dir: Option<TempDir>,
    data_dir: PathBuf,
}

impl TestEngine {
    /// A disk-backed engine in a fresh temporary directory, deleted on drop.
    pub async fn new_temp() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let data_dir = temp_dir.path().join("mnemo-data");
        let config = Config {
            data_dir: data_dir.clone(),
            ..Config::default()
        };
        let engine = Engine::open(config).await.expect("failed to open test engine");

        TestEngine {
            engine,
            _temp_dir: Some(temp_dir),
            data_dir,
        }
    }

    /// An in-memory engine with no on-disk footprint at all.
    pub fn new_in_memory() -> Self {
        let config = Config::default();
        let data_dir = config.data_dir.clone();
        let engine = Engine::in_memory(config).expect("failed to create in-memory engine");

        TestEngine {
            engine,
            _temp_dir: None,
            data_dir,
        }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Store `count` plain-fact memories under `scope`, tagged `test-N mod 5`.
    pub async fn seed_facts(&self, scope: &str, count: usize) -> Vec<String> {
        let cancel = CancellationToken::new();
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let options = StoreOptions {
                allow_duplicates: true,
                auto_associate: false,
                ..StoreOptions::default()
            };
            let outcome = self
                .engine
                .store(
                    &format!("test memory content number {i}"),
                    scope,
                    vec![format!("test-{}", i % 5)],
                    None,
                    Default::default(),
                    &options,
                    &cancel,
                )
                .await
                .expect("seed store failed");
            ids.push(outcome.memory.id);
        }
        ids
    }

    /// Store one memory per `(content, scope)` pair, auto-association on.
    pub async fn seed_with_scopes(&self, entries: &[(&str, &str)]) -> Vec<String> {
        let cancel = CancellationToken::new();
        let mut ids = Vec::with_capacity(entries.len());
        for (content, scope) in entries {
            let outcome = self
                .engine
                .store(content, scope, vec![], None, Default::default(), &StoreOptions::default(), &cancel)
                .await
                .expect("seed store failed");
            ids.push(outcome.memory.id);
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_engine_starts_empty() {
        let harness = TestEngine::new_in_memory();
        let cancel = CancellationToken::new();
        let result = harness
            .engine
            .list(&mnemo_core::ScopeFilter::Any, &mnemo_core::store::Page::first(10), &cancel)
            .expect("list failed");
        assert!(result.items.is_empty());
    }

    #[tokio::test]
    async fn temp_engine_creates_its_data_dir() {
        let harness = TestEngine::new_temp().await;
        assert!(harness.data_dir().exists());
    }
}
