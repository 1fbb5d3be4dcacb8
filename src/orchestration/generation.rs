//! Generation manager.
//!
//! Holds the single current generation. Readers load it without locking;
//! writers serialize through one mutex whose critical section only compares
//! versions and swaps a pointer. Releasing the outgoing generation happens
//! after the critical section, on a spawned task.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::observability::metrics;
use crate::orchestration::RuntimeConfig;
use crate::proxy::{Proxy, ReleaseHandle};

/// Version of the generation installed at construction. Lower than any
/// remote version, so the first remote update (possibly version 0) applies.
pub const INITIAL_VERSION: i32 = -1;

/// One complete `(config, engine, release handle)` triple.
#[derive(Debug)]
pub struct Generation {
    pub version: i32,
    pub config: Arc<RuntimeConfig>,
    pub proxy: Arc<Proxy>,
    release: ReleaseHandle,
}

impl Generation {
    pub fn new(version: i32, config: Arc<RuntimeConfig>, proxy: Arc<Proxy>, release: ReleaseHandle) -> Self {
        Self {
            version,
            config,
            proxy,
            release,
        }
    }

    /// Whether this generation's owned resources have been released.
    pub fn is_released(&self) -> bool {
        self.release.is_released()
    }
}

/// Result of a versioned commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The candidate is now current.
    Applied { version: i32 },
    /// The candidate was not newer; nothing changed.
    Stale { current_version: i32 },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("orchestrator is closed")]
    Closed,
}

#[derive(Debug, Default)]
struct CommitState {
    closed: bool,
}

/// Owner of the current generation.
#[derive(Debug)]
pub struct GenerationManager {
    current: ArcSwap<Generation>,
    state: Mutex<CommitState>,
}

impl GenerationManager {
    pub fn new(initial: Generation) -> Self {
        metrics::record_config_version(initial.version);
        Self {
            current: ArcSwap::from_pointee(initial),
            state: Mutex::new(CommitState::default()),
        }
    }

    /// Install the candidate if `version` is strictly newer than the current
    /// generation. A candidate that is not installed is released.
    pub fn commit(
        &self,
        version: i32,
        config: Arc<RuntimeConfig>,
        proxy: Arc<Proxy>,
        release: ReleaseHandle,
    ) -> Result<CommitOutcome, GenerationError> {
        let state = self.lock();
        if state.closed {
            drop(state);
            schedule_release(release, version);
            return Err(GenerationError::Closed);
        }

        let current_version = self.current.load().version;
        if version <= current_version {
            drop(state);
            schedule_release(release, version);
            return Ok(CommitOutcome::Stale { current_version });
        }

        let previous = self
            .current
            .swap(Arc::new(Generation::new(version, config, proxy, release)));
        drop(state);

        metrics::record_config_version(version);
        schedule_release(previous.release.clone(), previous.version);
        Ok(CommitOutcome::Applied { version })
    }

    /// Install the candidate unconditionally, keeping the current version.
    pub fn force_commit(
        &self,
        config: Arc<RuntimeConfig>,
        proxy: Arc<Proxy>,
        release: ReleaseHandle,
    ) -> Result<i32, GenerationError> {
        let state = self.lock();
        if state.closed {
            drop(state);
            schedule_release(release, self.current_version());
            return Err(GenerationError::Closed);
        }

        let version = self.current.load().version;
        let previous = self
            .current
            .swap(Arc::new(Generation::new(version, config, proxy, release)));
        drop(state);

        schedule_release(previous.release.clone(), previous.version);
        Ok(version)
    }

    /// Snapshot of the current generation. Later commits never change it.
    pub fn current(&self) -> Arc<Generation> {
        self.current.load_full()
    }

    pub fn current_version(&self) -> i32 {
        self.current.load().version
    }

    /// Release the current generation and refuse further commits.
    ///
    /// Returns `false` if already shut down.
    pub fn shutdown(&self) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        let current = self.current.load_full();
        drop(state);

        tracing::info!(version = current.version, "Generation manager shut down");
        schedule_release(current.release.clone(), current.version);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, CommitState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fire `release` off the caller's path. Outside a runtime it runs inline.
fn schedule_release(release: ReleaseHandle, version: i32) {
    let run = move || {
        if release.release() {
            metrics::record_generation_released();
            tracing::debug!(version, "Generation released");
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move { run() });
        }
        Err(_) => run(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingress::{Ingress, OriginRequestConfig, Rule, Service, WarpRoutingConfig};
    use crate::proxy::ProxyBuilder;
    use axum::http::StatusCode;
    use std::time::Duration;

    fn candidate(code: StatusCode) -> (Arc<RuntimeConfig>, Arc<Proxy>, ReleaseHandle) {
        let config = Arc::new(RuntimeConfig {
            ingress: Ingress::new(
                vec![Rule::catch_all(Service::HttpStatus(code), OriginRequestConfig::default())],
                OriginRequestConfig::default(),
            ),
            warp_routing: WarpRoutingConfig::default(),
        });
        let (proxy, release) = ProxyBuilder::new(&[]).unwrap().build(Arc::clone(&config)).unwrap();
        (config, Arc::new(proxy), release)
    }

    fn manager() -> GenerationManager {
        let (config, proxy, release) = candidate(StatusCode::SERVICE_UNAVAILABLE);
        GenerationManager::new(Generation::new(INITIAL_VERSION, config, proxy, release))
    }

    async fn eventually(check: impl Fn() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn first_update_may_be_version_zero() {
        let gm = manager();
        assert_eq!(gm.current_version(), INITIAL_VERSION);

        let (c, p, r) = candidate(StatusCode::OK);
        assert_eq!(gm.commit(0, c, p, r).unwrap(), CommitOutcome::Applied { version: 0 });
        assert_eq!(gm.current_version(), 0);
    }

    #[tokio::test]
    async fn stale_commit_changes_nothing_and_releases_candidate() {
        let gm = manager();
        let (c, p, r) = candidate(StatusCode::OK);
        gm.commit(5, c, p, r).unwrap();
        let before = gm.current();

        let (c, p, r) = candidate(StatusCode::IM_A_TEAPOT);
        let rejected = r.clone();
        assert_eq!(
            gm.commit(5, c, p, r).unwrap(),
            CommitOutcome::Stale { current_version: 5 }
        );
        assert!(Arc::ptr_eq(&before, &gm.current()));
        assert!(eventually(|| rejected.is_released()).await);
        assert!(!before.is_released());
    }

    #[tokio::test]
    async fn previous_generation_is_released_after_swap() {
        let gm = manager();
        let first = gm.current();

        let (c, p, r) = candidate(StatusCode::OK);
        gm.commit(1, c, p, r).unwrap();

        assert!(eventually(|| first.is_released()).await);
        assert!(!gm.current().is_released());
    }

    #[tokio::test]
    async fn snapshot_is_stable_across_commits() {
        let gm = manager();
        let snapshot = gm.current();

        for v in 0..3 {
            let (c, p, r) = candidate(StatusCode::OK);
            gm.commit(v, c, p, r).unwrap();
        }

        assert_eq!(snapshot.version, INITIAL_VERSION);
        assert_eq!(
            snapshot.config.ingress.rules()[0].service,
            Service::HttpStatus(StatusCode::SERVICE_UNAVAILABLE)
        );
        assert_eq!(gm.current_version(), 2);
    }

    #[tokio::test]
    async fn force_commit_keeps_version() {
        let gm = manager();
        let (c, p, r) = candidate(StatusCode::OK);
        gm.commit(3, c, p, r).unwrap();

        let (c, p, r) = candidate(StatusCode::IM_A_TEAPOT);
        assert_eq!(gm.force_commit(c, p, r).unwrap(), 3);
        assert_eq!(gm.current_version(), 3);
        assert_eq!(
            gm.current().config.ingress.rules()[0].service,
            Service::HttpStatus(StatusCode::IM_A_TEAPOT)
        );
    }

    #[tokio::test]
    async fn shutdown_releases_current_and_rejects_commits() {
        let gm = manager();
        let current = gm.current();

        assert!(gm.shutdown());
        assert!(!gm.shutdown());
        assert!(gm.is_closed());
        assert!(eventually(|| current.is_released()).await);

        let (c, p, r) = candidate(StatusCode::OK);
        let rejected = r.clone();
        assert_eq!(gm.commit(10, c, p, r), Err(GenerationError::Closed));
        assert_eq!(gm.current_version(), INITIAL_VERSION);
        assert!(eventually(|| rejected.is_released()).await);

        let (c, p, r) = candidate(StatusCode::OK);
        assert_eq!(gm.force_commit(c, p, r), Err(GenerationError::Closed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_commits_are_totally_ordered() {
        let gm = Arc::new(manager());

        let mut tasks = Vec::new();
        for v in 0..32 {
            let gm = Arc::clone(&gm);
            let (c, p, r) = candidate(StatusCode::OK);
            tasks.push(tokio::spawn(async move {
                let outcome = gm.commit(v, c, p, r).unwrap();
                // A stale answer always reports a version at least as new.
                if let CommitOutcome::Stale { current_version } = outcome {
                    assert!(current_version >= v);
                }
                outcome
            }));
        }

        for t in tasks {
            t.await.unwrap();
        }
        assert_eq!(gm.current_version(), 31);
    }
}
