//! # 刷新协调器
//!
//! 单飞（single-flight）刷新：任意时刻最多一个刷新调用在进行中。
//!
//! - 空闲时第一个到达的调用者开启一个刷新周期（episode）；
//! - 刷新进行中到达的调用者排队等待，不发起任何网络操作；
//! - 周期结束时，所有排队者拿到同一个结果，各自恰好一次。
//!
//! 状态检查与状态迁移在同一把锁内完成，因此不会有两个调用者同时看到 `Idle`。
//! 刷新调用运行在独立任务中，触发者被取消也不会让排队者悬空。

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

use super::credential::{Credential, CredentialStore};
use super::refresh::RefreshExecutor;
use super::session::SessionTeardown;
use crate::error::{RefreshError, RefreshResult};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror, linfo};

/// 一个刷新周期的结果
pub type RefreshOutcome = RefreshResult<Credential>;

/// 协调器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RefreshState {
    /// 没有进行中的刷新
    Idle,
    /// 刷新周期进行中
    Refreshing,
}

/// 协调器统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    /// 已开启的刷新周期
    pub episodes_started: u64,
    /// 成功的刷新周期
    pub episodes_succeeded: u64,
    /// 失败的刷新周期
    pub episodes_failed: u64,
    /// 已结算的等待者（含触发者）
    pub waiters_served: u64,
}

#[derive(Debug)]
struct CoordinatorState {
    phase: RefreshState,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
    episode: u64,
}

#[derive(Debug, Default)]
struct Counters {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    served: AtomicU64,
}

struct Inner {
    executor: Arc<dyn RefreshExecutor>,
    store: Arc<dyn CredentialStore>,
    teardown: Arc<dyn SessionTeardown>,
    refresh_timeout: Duration,
    state: Mutex<CoordinatorState>,
    counters: Counters,
}

/// 刷新协调器
///
/// 克隆开销很小，所有克隆共享同一个状态机。
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("state", &self.state())
            .field("pending_waiters", &self.pending_waiters())
            .field("refresh_timeout", &self.inner.refresh_timeout)
            .finish_non_exhaustive()
    }
}

impl RefreshCoordinator {
    /// 创建协调器
    #[must_use]
    pub fn new(
        executor: Arc<dyn RefreshExecutor>,
        store: Arc<dyn CredentialStore>,
        teardown: Arc<dyn SessionTeardown>,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                executor,
                store,
                teardown,
                refresh_timeout,
                state: Mutex::new(CoordinatorState {
                    phase: RefreshState::Idle,
                    waiters: Vec::new(),
                    episode: 0,
                }),
                counters: Counters::default(),
            }),
        }
    }

    /// 确保拿到新凭证
    ///
    /// 空闲时开启新的刷新周期；刷新进行中则加入当前周期的等待队列。
    /// 返回当前周期的结果。
    pub async fn ensure_fresh_credential(&self, request_id: &str) -> RefreshOutcome {
        let (tx, rx) = oneshot::channel();

        let leading = {
            let mut state = self.inner.lock_state();
            state.waiters.push(tx);
            match state.phase {
                RefreshState::Idle => {
                    state.phase = RefreshState::Refreshing;
                    state.episode += 1;
                    Some(state.episode)
                }
                RefreshState::Refreshing => {
                    ldebug!(
                        request_id,
                        LogStage::TokenRefresh,
                        LogComponent::RefreshCoordinator,
                        "join_episode",
                        &format!(
                            "加入刷新周期 #{}, 当前等待者 {}",
                            state.episode,
                            state.waiters.len()
                        )
                    );
                    None
                }
            }
        };

        if let Some(episode) = leading {
            self.inner.counters.started.fetch_add(1, Ordering::Relaxed);
            linfo!(
                request_id,
                LogStage::TokenRefresh,
                LogComponent::RefreshCoordinator,
                "start_episode",
                &format!("开启刷新周期 #{episode}")
            );
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run_episode(episode).await });
        }

        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    /// 当前状态
    #[must_use]
    pub fn state(&self) -> RefreshState {
        self.inner.lock_state().phase
    }

    /// 当前排队的等待者数量（含触发者）
    #[must_use]
    pub fn pending_waiters(&self) -> usize {
        self.inner.lock_state().waiters.len()
    }

    /// 统计快照
    #[must_use]
    pub fn stats(&self) -> CoordinatorStats {
        let counters = &self.inner.counters;
        CoordinatorStats {
            episodes_started: counters.started.load(Ordering::Relaxed),
            episodes_succeeded: counters.succeeded.load(Ordering::Relaxed),
            episodes_failed: counters.failed.load(Ordering::Relaxed),
            waiters_served: counters.served.load(Ordering::Relaxed),
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, CoordinatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_episode(self: Arc<Self>, episode: u64) {
        let mut guard = EpisodeGuard {
            inner: &self,
            episode,
            settled: false,
        };

        let outcome = match tokio::time::timeout(self.refresh_timeout, self.executor.refresh()).await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(RefreshError::Timeout {
                timeout_seconds: self.refresh_timeout.as_secs(),
            }),
        };

        // 成功时先写存储再释放等待者；失败时先通知登出再释放等待者
        match &outcome {
            Ok(credential) => {
                self.store.set(credential.clone());
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                linfo!(
                    "system",
                    LogStage::TokenRefresh,
                    LogComponent::RefreshCoordinator,
                    "episode_succeeded",
                    &format!("刷新周期 #{episode} 成功: {}", credential.masked())
                );
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                lerror!(
                    "system",
                    LogStage::TokenRefresh,
                    LogComponent::RefreshCoordinator,
                    "episode_failed",
                    &format!("刷新周期 #{episode} 失败: {e}")
                );
                self.teardown.on_refresh_failed(e);
            }
        }

        guard.settle(&outcome);
    }

    /// 回到空闲并结算本周期的全部等待者
    fn release(&self, episode: u64, outcome: &RefreshOutcome) {
        let waiters = {
            let mut state = self.lock_state();
            state.phase = RefreshState::Idle;
            std::mem::take(&mut state.waiters)
        };

        let count = waiters.len() as u64;
        for waiter in waiters {
            // 接收端已被取消时发送失败，忽略即可
            let _ = waiter.send(outcome.clone());
        }
        self.counters.served.fetch_add(count, Ordering::Relaxed);

        ldebug!(
            "system",
            LogStage::TokenRefresh,
            LogComponent::RefreshCoordinator,
            "release_waiters",
            &format!("刷新周期 #{episode} 结算 {count} 个等待者")
        );
    }
}

/// 保证周期任务异常退出时等待者也会被结算
struct EpisodeGuard<'a> {
    inner: &'a Inner,
    episode: u64,
    settled: bool,
}

impl EpisodeGuard<'_> {
    fn settle(&mut self, outcome: &RefreshOutcome) {
        self.settled = true;
        self.inner.release(self.episode, outcome);
    }
}

impl Drop for EpisodeGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.inner.counters.failed.fetch_add(1, Ordering::Relaxed);
            self.inner.release(self.episode, &Err(RefreshError::Abandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::InMemoryCredentialStore;
    use crate::testing::{CountingRefreshExecutor, RecordingTeardown};
    use async_trait::async_trait;
    use futures::future::join_all;

    fn coordinator_with(
        executor: Arc<CountingRefreshExecutor>,
        store: Arc<InMemoryCredentialStore>,
        teardown: Arc<RecordingTeardown>,
    ) -> RefreshCoordinator {
        RefreshCoordinator::new(executor, store, teardown, Duration::from_secs(5))
    }

    async fn wait_for_waiters(coordinator: &RefreshCoordinator, expected: usize) {
        for _ in 0..200 {
            if coordinator.pending_waiters() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "expected {expected} waiters, found {}",
            coordinator.pending_waiters()
        );
    }

    #[tokio::test]
    async fn test_single_flight_for_concurrent_callers() {
        let executor = Arc::new(CountingRefreshExecutor::succeeding("tok2").gated());
        let store = Arc::new(InMemoryCredentialStore::new());
        let teardown = Arc::new(RecordingTeardown::default());
        let coordinator = coordinator_with(executor.clone(), store.clone(), teardown.clone());

        let callers: Vec<_> = (0..5)
            .map(|i| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    coordinator
                        .ensure_fresh_credential(&format!("req-{i}"))
                        .await
                })
            })
            .collect();

        wait_for_waiters(&coordinator, 5).await;
        assert_eq!(coordinator.state(), RefreshState::Refreshing);
        executor.release();

        for result in join_all(callers).await {
            assert_eq!(result.unwrap().unwrap().token(), "tok2");
        }
        assert_eq!(executor.calls(), 1);
        assert_eq!(store.get().unwrap().token(), "tok2");
        assert_eq!(coordinator.state(), RefreshState::Idle);
        assert_eq!(coordinator.pending_waiters(), 0);
        assert_eq!(teardown.calls(), 0);
        assert_eq!(
            coordinator.stats(),
            CoordinatorStats {
                episodes_started: 1,
                episodes_succeeded: 1,
                episodes_failed: 0,
                waiters_served: 5,
            }
        );
    }

    #[tokio::test]
    async fn test_failure_releases_all_and_tears_down_once() {
        let error = RefreshError::rejected(401, "Refresh token expired");
        let executor = Arc::new(CountingRefreshExecutor::failing(error.clone()).gated());
        let store = Arc::new(InMemoryCredentialStore::new());
        store.set(Credential::new("tok1"));
        let teardown = Arc::new(RecordingTeardown::default());
        let coordinator = coordinator_with(executor.clone(), store.clone(), teardown.clone());

        let callers: Vec<_> = (0..3)
            .map(|i| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    coordinator
                        .ensure_fresh_credential(&format!("req-{i}"))
                        .await
                })
            })
            .collect();

        wait_for_waiters(&coordinator, 3).await;
        executor.release();

        for result in join_all(callers).await {
            assert_eq!(result.unwrap().unwrap_err(), error);
        }
        assert_eq!(executor.calls(), 1);
        assert_eq!(teardown.calls(), 1);
        assert_eq!(teardown.last_error(), Some(error));
        // 协调器本身不改动存储
        assert_eq!(store.get().unwrap().token(), "tok1");
        assert_eq!(coordinator.stats().episodes_failed, 1);
    }

    /// 在登出回调中记录此刻仍在排队的等待者数量
    #[derive(Default)]
    struct QueueSnapshotTeardown {
        coordinator: std::sync::OnceLock<RefreshCoordinator>,
        queued_at_teardown: Mutex<Vec<usize>>,
    }

    impl SessionTeardown for QueueSnapshotTeardown {
        fn on_refresh_failed(&self, _error: &RefreshError) {
            let queued = self
                .coordinator
                .get()
                .map_or(0, RefreshCoordinator::pending_waiters);
            self.queued_at_teardown
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(queued);
        }
    }

    #[tokio::test]
    async fn test_teardown_runs_before_waiters_are_released() {
        let executor = Arc::new(
            CountingRefreshExecutor::failing(RefreshError::rejected(401, "expired")).gated(),
        );
        let store = Arc::new(InMemoryCredentialStore::new());
        let teardown = Arc::new(QueueSnapshotTeardown::default());
        let coordinator = RefreshCoordinator::new(
            executor.clone(),
            store,
            teardown.clone(),
            Duration::from_secs(5),
        );
        assert!(teardown.coordinator.set(coordinator.clone()).is_ok());

        let callers: Vec<_> = (0..3)
            .map(|i| {
                let coordinator = coordinator.clone();
                tokio::spawn(async move {
                    coordinator
                        .ensure_fresh_credential(&format!("req-{i}"))
                        .await
                })
            })
            .collect();

        wait_for_waiters(&coordinator, 3).await;
        executor.release();

        for result in join_all(callers).await {
            assert!(result.unwrap().is_err());
        }
        // 登出通知发出时三个等待者都还没有被结算
        assert_eq!(
            *teardown
                .queued_at_teardown
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            vec![3]
        );
        assert_eq!(coordinator.pending_waiters(), 0);
    }

    #[tokio::test]
    async fn test_store_written_before_release() {
        let executor = Arc::new(CountingRefreshExecutor::succeeding("tok2").gated());
        let store = Arc::new(InMemoryCredentialStore::new());
        store.set(Credential::new("tok1"));
        let coordinator = coordinator_with(
            executor.clone(),
            store.clone(),
            Arc::new(RecordingTeardown::default()),
        );

        let waiter = {
            let coordinator = coordinator.clone();
            let store = store.clone();
            tokio::spawn(async move {
                coordinator.ensure_fresh_credential("req").await.unwrap();
                store.get().unwrap().token().to_string()
            })
        };

        wait_for_waiters(&coordinator, 1).await;
        executor.release();
        assert_eq!(waiter.await.unwrap(), "tok2");
    }

    #[tokio::test]
    async fn test_sequential_episodes_are_independent() {
        let executor = Arc::new(
            CountingRefreshExecutor::succeeding("tok3")
                .then(Err(RefreshError::rejected(500, "boom"))),
        );
        let teardown = Arc::new(RecordingTeardown::default());
        let coordinator = coordinator_with(
            executor.clone(),
            Arc::new(InMemoryCredentialStore::new()),
            teardown.clone(),
        );

        assert!(coordinator.ensure_fresh_credential("a").await.is_err());
        assert_eq!(
            coordinator.ensure_fresh_credential("b").await.unwrap().token(),
            "tok3"
        );
        assert_eq!(executor.calls(), 2);
        assert_eq!(teardown.calls(), 1);
        assert_eq!(coordinator.stats().episodes_started, 2);
    }

    #[tokio::test]
    async fn test_refresh_timeout_is_a_refresh_failure() {
        let executor = Arc::new(
            CountingRefreshExecutor::succeeding("late").with_delay(Duration::from_secs(2)),
        );
        let teardown = Arc::new(RecordingTeardown::default());
        let coordinator = RefreshCoordinator::new(
            executor,
            Arc::new(InMemoryCredentialStore::new()),
            teardown.clone(),
            Duration::from_millis(50),
        );

        let err = coordinator.ensure_fresh_credential("req").await.unwrap_err();
        assert!(matches!(err, RefreshError::Timeout { .. }));
        assert_eq!(teardown.calls(), 1);
        assert_eq!(coordinator.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_cancelled_trigger_does_not_strand_waiters() {
        let executor = Arc::new(CountingRefreshExecutor::succeeding("tok2").gated());
        let coordinator = coordinator_with(
            executor.clone(),
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(RecordingTeardown::default()),
        );

        let trigger = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.ensure_fresh_credential("trigger").await })
        };
        wait_for_waiters(&coordinator, 1).await;
        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.ensure_fresh_credential("waiter").await })
        };
        wait_for_waiters(&coordinator, 2).await;

        trigger.abort();
        executor.release();

        assert_eq!(waiter.await.unwrap().unwrap().token(), "tok2");
        assert_eq!(executor.calls(), 1);
    }

    struct PanickingExecutor;

    #[async_trait]
    impl RefreshExecutor for PanickingExecutor {
        async fn refresh(&self) -> RefreshResult<Credential> {
            panic!("executor exploded");
        }
    }

    #[tokio::test]
    async fn test_panicking_episode_settles_waiters_as_abandoned() {
        let coordinator = RefreshCoordinator::new(
            Arc::new(PanickingExecutor),
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(RecordingTeardown::default()),
            Duration::from_secs(1),
        );

        let err = coordinator.ensure_fresh_credential("req").await.unwrap_err();
        assert_eq!(err, RefreshError::Abandoned);
        assert_eq!(coordinator.state(), RefreshState::Idle);
    }
}
