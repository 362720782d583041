//! Navigator behaviour against the in-memory store

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use branch_navigator::{
    BranchNavigator, BranchVersionStore, NavigationAxis, NavigationErrorKind, NavigationOutcome,
};
use chat_client::{
    BackendError, BranchBackend, BranchTarget, EditResponse, InMemoryChatStore, RetryResponse,
    SwitchResponse,
};
use chat_core::{BranchSnapshot, MessageId, VersionId, VersionSnapshot};
use stream_resume::{ResumableStreamClient, StreamClientConfig};
use tokio::sync::Notify;

use NavigationAxis::{Branches, Versions};

fn navigator_over(backend: Arc<dyn BranchBackend>, streams: Arc<InMemoryChatStore>) -> BranchNavigator {
    let store = Arc::new(BranchVersionStore::new(backend));
    let config = StreamClientConfig {
        poll_interval: Duration::from_millis(50),
        ..StreamClientConfig::default()
    };
    BranchNavigator::new(store, ResumableStreamClient::new(streams, config))
}

fn navigator(store: &Arc<InMemoryChatStore>) -> BranchNavigator {
    navigator_over(store.clone(), store.clone())
}

/// User message with `count` branches; the newest is active.
async fn forked_message(store: &InMemoryChatStore, count: usize) -> MessageId {
    let message_id = store.insert_user_message("draft 0").await;
    for i in 1..count {
        store
            .edit_message(&message_id, &format!("draft {i}"))
            .await
            .unwrap();
    }
    message_id
}

/// Assistant message with versions "draft one" (model-a) and "draft two"
/// (model-b); the second is active.
async fn retried_message(store: &InMemoryChatStore) -> MessageId {
    let message_id = store.insert_assistant_message("draft one", "model-a").await;
    store.retry_message(&message_id, "model-b").await.unwrap();
    store.append_stream_chunk(&message_id, "draft two").await.unwrap();
    store.finish_stream(&message_id).await.unwrap();
    message_id
}

fn label(navigator: &BranchNavigator, message_id: &MessageId, axis: NavigationAxis) -> String {
    navigator
        .view(message_id, axis)
        .map(|view| view.label)
        .unwrap_or_default()
}

#[tokio::test]
async fn test_next_cycles_back_to_start() {
    let store = Arc::new(InMemoryChatStore::new());
    let message_id = forked_message(&store, 3).await;
    let navigator = navigator(&store);
    navigator.refresh(&message_id, Branches).await.unwrap();
    assert_eq!(label(&navigator, &message_id, Branches), "3/3");

    let mut labels = Vec::new();
    for _ in 0..3 {
        let outcome = navigator.next(&message_id, Branches).await.unwrap();
        assert_eq!(outcome, NavigationOutcome::Switched);
        labels.push(label(&navigator, &message_id, Branches));
    }
    assert_eq!(labels, vec!["1/3", "2/3", "3/3"]);

    navigator.switch_to(&message_id, Branches, 0).await.unwrap();
    navigator.prev(&message_id, Branches).await.unwrap();
    assert_eq!(label(&navigator, &message_id, Branches), "3/3");
    assert_eq!(
        store.active_branch_content(&message_id).await.as_deref(),
        Some("draft 2")
    );
}

#[tokio::test]
async fn test_version_wrap_with_two_versions() {
    let store = Arc::new(InMemoryChatStore::new());
    let message_id = retried_message(&store).await;
    let navigator = navigator(&store);
    navigator.refresh(&message_id, Versions).await.unwrap();
    assert_eq!(label(&navigator, &message_id, Versions), "2/2");

    navigator.prev(&message_id, Versions).await.unwrap();
    assert_eq!(label(&navigator, &message_id, Versions), "1/2");
    let projection = navigator.store().versions_for(&message_id).unwrap();
    let active = projection.active().unwrap();
    assert_eq!(active.content, "draft one");
    assert_eq!(active.model, "model-a");

    // prev from index 0 with length 2 lands on index 1.
    navigator.prev(&message_id, Versions).await.unwrap();
    assert_eq!(label(&navigator, &message_id, Versions), "2/2");
    let projection = navigator.store().versions_for(&message_id).unwrap();
    assert_eq!(projection.active().unwrap().content, "draft two");

    navigator.next(&message_id, Versions).await.unwrap();
    assert_eq!(label(&navigator, &message_id, Versions), "1/2");
}

#[tokio::test]
async fn test_edit_appends_exactly_one_active_branch() {
    let store = Arc::new(InMemoryChatStore::new());
    let message_id = forked_message(&store, 2).await;
    let navigator = navigator(&store);
    let before = navigator.store().refresh_branches(&message_id).await.unwrap();
    assert_eq!(before.len(), 2);

    let new_branch = navigator.edit(&message_id, "draft 2").await.unwrap();
    let after = navigator.store().branches_for(&message_id).unwrap();

    assert_eq!(after.len(), 3);
    assert_eq!(after.active().map(|b| &b.id), Some(&new_branch));
    assert_eq!(after.active_index, Some(2));
    for (old, new) in before.branches.iter().zip(&after.branches) {
        assert_eq!(old.id, new.id);
        assert_eq!(old.ordinal, new.ordinal);
        assert!(!new.is_active);
    }
}

#[tokio::test]
async fn test_single_alternative_has_no_view() {
    let store = Arc::new(InMemoryChatStore::new());
    let message_id = store.insert_user_message("only").await;
    let navigator = navigator(&store);

    let outcome = navigator.next(&message_id, Branches).await.unwrap();
    assert_eq!(outcome, NavigationOutcome::Unchanged);
    assert!(navigator.branch_view(&message_id).is_none());
}

#[tokio::test]
async fn test_switch_to_active_is_unchanged() {
    let store = Arc::new(InMemoryChatStore::new());
    let message_id = forked_message(&store, 2).await;
    let navigator = navigator(&store);
    navigator.refresh(&message_id, Branches).await.unwrap();

    let outcome = navigator.switch_to(&message_id, Branches, 1).await.unwrap();
    assert_eq!(outcome, NavigationOutcome::Unchanged);
}

/// Holds the first branch switch until released.
struct SlowSwitch {
    inner: InMemoryChatStore,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl BranchBackend for SlowSwitch {
    async fn get_message_branches(&self, message_id: &MessageId) -> chat_client::Result<BranchSnapshot> {
        self.inner.get_message_branches(message_id).await
    }

    async fn get_message_versions(&self, message_id: &MessageId) -> chat_client::Result<VersionSnapshot> {
        self.inner.get_message_versions(message_id).await
    }

    async fn switch_branch(
        &self,
        message_id: &MessageId,
        target: &BranchTarget,
    ) -> chat_client::Result<SwitchResponse> {
        self.entered.notify_one();
        self.release.notified().await;
        self.inner.switch_branch(message_id, target).await
    }

    async fn switch_version(
        &self,
        message_id: &MessageId,
        version_id: &VersionId,
    ) -> chat_client::Result<SwitchResponse> {
        self.inner.switch_version(message_id, version_id).await
    }

    async fn edit_message(
        &self,
        message_id: &MessageId,
        new_content: &str,
    ) -> chat_client::Result<EditResponse> {
        self.inner.edit_message(message_id, new_content).await
    }

    async fn retry_message(&self, message_id: &MessageId, model: &str) -> chat_client::Result<RetryResponse> {
        self.inner.retry_message(message_id, model).await
    }
}

#[tokio::test]
async fn test_concurrent_navigation_is_dropped() {
    let inner = InMemoryChatStore::new();
    let message_id = forked_message(&inner, 3).await;
    let backend = Arc::new(SlowSwitch {
        inner: inner.clone(),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let navigator = navigator_over(backend.clone(), Arc::new(inner.clone()));
    navigator.refresh(&message_id, Branches).await.unwrap();

    let (first, (second, direct)) = tokio::join!(navigator.next(&message_id, Branches), async {
        backend.entered.notified().await;
        assert!(navigator.store().is_navigating(&message_id));
        assert!(navigator.branch_view(&message_id).unwrap().is_loading);

        let second = navigator.next(&message_id, Branches).await;
        let direct = navigator.store().switch_branch(&message_id, 1).await;
        backend.release.notify_one();
        (second, direct)
    });

    assert_eq!(first.unwrap(), NavigationOutcome::Switched);
    assert_eq!(second.unwrap(), NavigationOutcome::Ignored);
    assert_eq!(direct.unwrap_err().kind(), NavigationErrorKind::Busy);

    // Only the first step landed: 3/3 -> 1/3.
    assert!(!navigator.store().is_navigating(&message_id));
    assert_eq!(label(&navigator, &message_id, Branches), "1/3");
}

/// Once armed, holds the next branch query until released. Counts switches.
struct SlowRefresh {
    inner: InMemoryChatStore,
    armed: AtomicBool,
    switches: AtomicUsize,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl BranchBackend for SlowRefresh {
    async fn get_message_branches(&self, message_id: &MessageId) -> chat_client::Result<BranchSnapshot> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.get_message_branches(message_id).await
    }

    async fn get_message_versions(&self, message_id: &MessageId) -> chat_client::Result<VersionSnapshot> {
        self.inner.get_message_versions(message_id).await
    }

    async fn switch_branch(
        &self,
        message_id: &MessageId,
        target: &BranchTarget,
    ) -> chat_client::Result<SwitchResponse> {
        self.switches.fetch_add(1, Ordering::SeqCst);
        self.inner.switch_branch(message_id, target).await
    }

    async fn switch_version(
        &self,
        message_id: &MessageId,
        version_id: &VersionId,
    ) -> chat_client::Result<SwitchResponse> {
        self.inner.switch_version(message_id, version_id).await
    }

    async fn edit_message(
        &self,
        message_id: &MessageId,
        new_content: &str,
    ) -> chat_client::Result<EditResponse> {
        self.inner.edit_message(message_id, new_content).await
    }

    async fn retry_message(&self, message_id: &MessageId, model: &str) -> chat_client::Result<RetryResponse> {
        self.inner.retry_message(message_id, model).await
    }
}

#[tokio::test]
async fn test_navigation_stays_busy_until_refetch_lands() {
    let inner = InMemoryChatStore::new();
    let message_id = forked_message(&inner, 3).await;
    let backend = Arc::new(SlowRefresh {
        inner: inner.clone(),
        armed: AtomicBool::new(false),
        switches: AtomicUsize::new(0),
        entered: Notify::new(),
        release: Notify::new(),
    });
    let navigator = navigator_over(backend.clone(), Arc::new(inner.clone()));
    navigator.refresh(&message_id, Branches).await.unwrap();
    backend.armed.store(true, Ordering::SeqCst);

    let (first, second) = tokio::join!(navigator.next(&message_id, Branches), async {
        // The switch went through; the re-fetch is still pending.
        backend.entered.notified().await;
        assert_eq!(backend.switches.load(Ordering::SeqCst), 1);
        assert!(navigator.branch_view(&message_id).unwrap().is_loading);

        let second = navigator.next(&message_id, Branches).await;
        let direct = navigator.switch_to(&message_id, Branches, 1).await;
        backend.release.notify_one();
        (second, direct)
    });

    assert_eq!(first.unwrap(), NavigationOutcome::Switched);
    let (second, direct) = second;
    assert_eq!(second.unwrap(), NavigationOutcome::Ignored);
    assert_eq!(direct.unwrap(), NavigationOutcome::Ignored);
    assert_eq!(backend.switches.load(Ordering::SeqCst), 1);

    assert!(!navigator.branch_view(&message_id).unwrap().is_loading);
    assert_eq!(label(&navigator, &message_id, Branches), "1/3");

    // Once settled, the next step starts from the fresh projection.
    let outcome = navigator.next(&message_id, Branches).await.unwrap();
    assert_eq!(outcome, NavigationOutcome::Switched);
    assert_eq!(label(&navigator, &message_id, Branches), "2/3");
}

#[tokio::test]
async fn test_deleted_branch_is_target_not_found() {
    let store = Arc::new(InMemoryChatStore::new());
    let message_id = forked_message(&store, 3).await;
    let navigator = navigator(&store);
    navigator.refresh(&message_id, Branches).await.unwrap();

    let stale = navigator.store().branches_for(&message_id).unwrap().branches[0]
        .id
        .clone();
    assert!(store.remove_branch(&message_id, &stale).await);

    let err = navigator
        .switch_to(&message_id, Branches, 0)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), NavigationErrorKind::TargetNotFound);

    // The projection was re-fetched, not patched locally.
    let projection = navigator.store().branches_for(&message_id).unwrap();
    assert_eq!(projection.len(), 2);
    assert!(projection.index_of(&stale).is_none());
    assert_eq!(label(&navigator, &message_id, Branches), "2/2");
}

#[tokio::test]
async fn test_deleted_version_is_target_not_found() {
    let store = Arc::new(InMemoryChatStore::new());
    let message_id = retried_message(&store).await;
    let navigator = navigator(&store);
    navigator.refresh(&message_id, Versions).await.unwrap();

    let first = navigator.store().versions_for(&message_id).unwrap().versions[0]
        .version_id
        .clone();
    assert!(store.remove_version(&message_id, &first).await);

    let err = navigator.prev(&message_id, Versions).await.unwrap_err();
    assert_eq!(err.kind(), NavigationErrorKind::TargetNotFound);
    assert!(navigator.version_view(&message_id).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_branch_switch_cancels_stream() {
    let store = Arc::new(InMemoryChatStore::new());
    let message_id = forked_message(&store, 2).await;
    store.begin_stream(&message_id).await.unwrap();
    let navigator = navigator(&store);
    navigator.refresh(&message_id, Branches).await.unwrap();

    navigator.streams().activate(&message_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(navigator.streams().has_session(&message_id).await);

    navigator.prev(&message_id, Branches).await.unwrap();
    assert!(!navigator.streams().has_session(&message_id).await);
}

#[tokio::test(start_paused = true)]
async fn test_version_switch_to_identical_content_keeps_stream() {
    let store = Arc::new(InMemoryChatStore::new());
    let message_id = store.insert_assistant_message("same", "model-a").await;
    store.retry_message(&message_id, "model-b").await.unwrap();
    store.append_stream_chunk(&message_id, "same").await.unwrap();

    let navigator = navigator(&store);
    navigator.refresh(&message_id, Versions).await.unwrap();
    navigator.streams().activate(&message_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    let outcome = navigator.prev(&message_id, Versions).await.unwrap();
    assert_eq!(outcome, NavigationOutcome::Switched);
    assert!(navigator.streams().has_session(&message_id).await);
}

#[tokio::test(start_paused = true)]
async fn test_version_switch_to_different_content_cancels_stream() {
    let store = Arc::new(InMemoryChatStore::new());
    let message_id = store.insert_assistant_message("first answer", "model-a").await;
    store.retry_message(&message_id, "model-b").await.unwrap();
    store.append_stream_chunk(&message_id, "second").await.unwrap();

    let navigator = navigator(&store);
    navigator.refresh(&message_id, Versions).await.unwrap();
    navigator.streams().activate(&message_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    let outcome = navigator.prev(&message_id, Versions).await.unwrap();
    assert_eq!(outcome, NavigationOutcome::Switched);
    assert!(!navigator.streams().has_session(&message_id).await);
}

#[tokio::test(start_paused = true)]
async fn test_retry_supersedes_stream_and_appends_version() {
    let store = Arc::new(InMemoryChatStore::new());
    let message_id = retried_message(&store).await;
    let navigator = navigator(&store);
    navigator.refresh(&message_id, Versions).await.unwrap();
    navigator.streams().activate(&message_id).await.unwrap();

    let version_id = navigator.retry(&message_id, "model-c").await.unwrap();
    assert!(!navigator.streams().has_session(&message_id).await);
    assert!(navigator.streams().snapshot(&message_id).await.is_none());

    let projection = navigator.store().versions_for(&message_id).unwrap();
    assert_eq!(projection.len(), 3);
    assert_eq!(projection.active().map(|v| &v.version_id), Some(&version_id));
    assert_eq!(projection.active().map(|v| v.model.as_str()), Some("model-c"));
    assert_eq!(label(&navigator, &message_id, Versions), "3/3");
}

/// Refuses every retry.
struct RejectingRetry {
    inner: InMemoryChatStore,
}

#[async_trait]
impl BranchBackend for RejectingRetry {
    async fn get_message_branches(&self, message_id: &MessageId) -> chat_client::Result<BranchSnapshot> {
        self.inner.get_message_branches(message_id).await
    }

    async fn get_message_versions(&self, message_id: &MessageId) -> chat_client::Result<VersionSnapshot> {
        self.inner.get_message_versions(message_id).await
    }

    async fn switch_branch(
        &self,
        message_id: &MessageId,
        target: &BranchTarget,
    ) -> chat_client::Result<SwitchResponse> {
        self.inner.switch_branch(message_id, target).await
    }

    async fn switch_version(
        &self,
        message_id: &MessageId,
        version_id: &VersionId,
    ) -> chat_client::Result<SwitchResponse> {
        self.inner.switch_version(message_id, version_id).await
    }

    async fn edit_message(
        &self,
        message_id: &MessageId,
        new_content: &str,
    ) -> chat_client::Result<EditResponse> {
        self.inner.edit_message(message_id, new_content).await
    }

    async fn retry_message(&self, message_id: &MessageId, _model: &str) -> chat_client::Result<RetryResponse> {
        Err(BackendError::Rejected(format!("message {message_id} is locked")))
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_retry_keeps_partial_stream() {
    let inner = InMemoryChatStore::new();
    let message_id = inner.insert_assistant_message("", "model-a").await;
    inner.begin_stream(&message_id).await.unwrap();
    inner.append_stream_chunk(&message_id, "partial").await.unwrap();

    let backend = Arc::new(RejectingRetry {
        inner: inner.clone(),
    });
    let navigator = navigator_over(backend, Arc::new(inner.clone()));
    navigator.streams().activate(&message_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;

    let err = navigator.retry(&message_id, "model-b").await.unwrap_err();
    assert_eq!(err.kind(), NavigationErrorKind::Rejected);
    assert!(navigator.store().pending_for(&message_id).is_none());

    assert!(navigator.streams().has_session(&message_id).await);
    let snapshot = navigator.streams().snapshot(&message_id).await.unwrap();
    assert_eq!(snapshot.content, "partial");

    // The session keeps polling where it left off.
    inner.append_stream_chunk(&message_id, " answer").await.unwrap();
    tokio::time::sleep(Duration::from_millis(120)).await;
    let snapshot = navigator.streams().snapshot(&message_id).await.unwrap();
    assert_eq!(snapshot.content, "partial answer");
}

#[tokio::test]
async fn test_store_signals_refresh_projection() {
    let store = Arc::new(InMemoryChatStore::new());
    let message_id = forked_message(&store, 2).await;
    let navigator = navigator(&store);
    navigator.refresh(&message_id, Branches).await.unwrap();
    let mut signals = store.subscribe().await;

    // Another client edits the message.
    store.edit_message(&message_id, "elsewhere").await.unwrap();
    let signal = signals.recv().await.unwrap();
    assert_eq!(signal.message_id(), &message_id);

    assert_eq!(label(&navigator, &message_id, Branches), "2/2");
    navigator.handle_signal(&signal).await.unwrap();
    assert_eq!(label(&navigator, &message_id, Branches), "3/3");
}
