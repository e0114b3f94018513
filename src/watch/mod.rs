// ABOUTME: Generic watch controller - keeps one event-driven refresh loop per resource kind
//
// A controller publishes a baseline list when watching starts, then re-fetches and republishes
// the full list on every engine event of its kind. Event payloads are only a trigger; the list
// is always fetched fresh. A feed error stops the loop after a fixed backoff and it stays
// stopped until the caller starts it again.

pub mod kinds;

pub use kinds::{
    ContainerWatcher, Containers, ImageWatcher, Images, NetworkWatcher, Networks, VolumeWatcher,
    Volumes,
};

use crate::docker::{Engine, EngineError, EngineHandle, EventStream, ResourceType};
use crate::publish::{Publication, Publisher, WatchStatusChange};
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use serde::Serialize;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What a controller is parameterized over: which engine list to call, how to format it,
/// which events trigger a refresh, and where the result is published
pub trait ResourceKind: Send + Sync + 'static {
    type Summary: Send + 'static;
    type Snapshot: Send + 'static;

    const TYPE: ResourceType;

    fn list(engine: &dyn Engine) -> BoxFuture<'_, Result<Vec<Self::Summary>, EngineError>>;
    fn format(summaries: Vec<Self::Summary>) -> Self::Snapshot;
    fn publication(snapshot: Self::Snapshot) -> Publication;
    fn remove<'a>(engine: &'a dyn Engine, id: &'a str) -> BoxFuture<'a, Result<(), EngineError>>;
    fn inspect<'a>(engine: &'a dyn Engine, id: &'a str)
        -> BoxFuture<'a, Result<String, EngineError>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WatchStatus {
    Idle,
    Watching,
    /// The loop stopped itself after an event feed error
    Stopped { reason: String },
}

impl fmt::Display for WatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Watching => f.write_str("watching"),
            Self::Stopped { reason } => write!(f, "stopped ({reason})"),
        }
    }
}

#[derive(Debug)]
struct WatchState {
    /// Present iff a loop is active
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
    /// Bumped on every start so a finished loop can tell whether the state is still its own
    generation: u64,
    status: WatchStatus,
}

impl WatchState {
    const fn new() -> Self {
        Self {
            cancel: None,
            task: None,
            generation: 0,
            status: WatchStatus::Idle,
        }
    }

    fn set_status(&mut self, kind: ResourceType, status: WatchStatus, publisher: &dyn Publisher) {
        if self.status == status {
            return;
        }
        self.status = status.clone();
        publisher.publish(Publication::WatchStatus(WatchStatusChange { kind, status }));
    }

    fn clear(&mut self) -> bool {
        self.task = None;
        self.cancel.take().map(|token| token.cancel()).is_some()
    }
}

pub struct WatchController<K: ResourceKind> {
    engine: EngineHandle,
    publisher: Arc<dyn Publisher>,
    backoff: Duration,
    state: Arc<Mutex<WatchState>>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ResourceKind> WatchController<K> {
    pub fn new(engine: EngineHandle, publisher: Arc<dyn Publisher>, backoff: Duration) -> Self {
        Self {
            engine,
            publisher,
            backoff,
            state: Arc::new(Mutex::new(WatchState::new())),
            _kind: PhantomData,
        }
    }

    pub const fn kind(&self) -> ResourceType {
        K::TYPE
    }

    /// Fetch and format the current list
    pub async fn list(&self) -> Result<K::Snapshot, EngineError> {
        let engine = self.engine.get()?;
        let summaries = K::list(engine.as_ref()).await?;
        Ok(K::format(summaries))
    }

    pub async fn remove(&self, id: &str) -> Result<(), EngineError> {
        let engine = self.engine.get()?;
        info!("Removing {} {}", K::TYPE, id);
        K::remove(engine.as_ref(), id).await
    }

    /// Engine's JSON document for the resource
    pub async fn inspect(&self, id: &str) -> Result<String, EngineError> {
        let engine = self.engine.get()?;
        K::inspect(engine.as_ref(), id).await
    }

    /// Publish the current list, then keep republishing on every event of this kind
    ///
    /// No-op while a loop is already active.
    pub async fn start_watching(&self) -> Result<(), EngineError> {
        let engine = self.engine.get()?;
        let mut state = self.state.lock().await;

        if state.cancel.is_some() {
            debug!("Already watching {} events", K::TYPE);
            return Ok(());
        }

        if let Err(e) = publish_list::<K>(engine.as_ref(), self.publisher.as_ref(), None).await {
            warn!("Baseline {} list failed: {}", K::TYPE, e);
        }

        let token = CancellationToken::new();
        state.generation += 1;
        state.cancel = Some(token.clone());
        state.set_status(K::TYPE, WatchStatus::Watching, self.publisher.as_ref());

        let events = engine.events(K::TYPE);
        let watch_loop = WatchLoop::<K> {
            engine,
            publisher: Arc::clone(&self.publisher),
            state: Arc::clone(&self.state),
            token,
            generation: state.generation,
            backoff: self.backoff,
            _kind: PhantomData,
        };
        state.task = Some(tokio::spawn(watch_loop.run(events)));

        info!("Started watching {} events", K::TYPE);
        Ok(())
    }

    /// Cancel the active loop, if any, and wait for it to exit
    pub async fn stop_watching(&self) {
        let task = {
            let mut state = self.state.lock().await;
            let task = state.task.take();
            if !state.clear() {
                return;
            }
            info!("Stopped watching {} events", K::TYPE);
            state.set_status(K::TYPE, WatchStatus::Idle, self.publisher.as_ref());
            task
        };

        // Awaited after the lock is released since an exiting loop may still take it
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("{} watch loop ended abnormally: {}", K::TYPE, e);
            }
        }
    }

    pub async fn status(&self) -> WatchStatus {
        self.state.lock().await.status.clone()
    }

    pub async fn is_watching(&self) -> bool {
        self.state.lock().await.cancel.is_some()
    }
}

impl<K: ResourceKind> Clone for WatchController<K> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            publisher: Arc::clone(&self.publisher),
            backoff: self.backoff,
            state: Arc::clone(&self.state),
            _kind: PhantomData,
        }
    }
}

impl<K: ResourceKind> fmt::Debug for WatchController<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchController")
            .field("kind", &K::TYPE)
            .field("engine", &self.engine)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

/// Fetch, format and publish; skips publishing when `token` was cancelled during the fetch
async fn publish_list<K: ResourceKind>(
    engine: &dyn Engine,
    publisher: &dyn Publisher,
    token: Option<&CancellationToken>,
) -> Result<(), EngineError> {
    let summaries = K::list(engine).await?;
    if token.is_some_and(CancellationToken::is_cancelled) {
        return Ok(());
    }
    publisher.publish(K::publication(K::format(summaries)));
    Ok(())
}

struct WatchLoop<K: ResourceKind> {
    engine: Arc<dyn Engine>,
    publisher: Arc<dyn Publisher>,
    state: Arc<Mutex<WatchState>>,
    token: CancellationToken,
    generation: u64,
    backoff: Duration,
    _kind: PhantomData<fn() -> K>,
}

impl<K: ResourceKind> WatchLoop<K> {
    async fn run(self, mut events: EventStream) {
        loop {
            tokio::select! {
                biased;
                () = self.token.cancelled() => {
                    debug!("{} watch loop cancelled", K::TYPE);
                    return;
                }
                next = events.next() => match next {
                    Some(Ok(event)) if event.kind == Some(K::TYPE) => {
                        debug!("{} {} event for {}, refreshing", K::TYPE, event.action, event.actor_id);
                        let refreshed = publish_list::<K>(
                            self.engine.as_ref(),
                            self.publisher.as_ref(),
                            Some(&self.token),
                        )
                        .await;
                        if let Err(e) = refreshed {
                            warn!("Refreshing {} list failed: {}", K::TYPE, e);
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.stop_after_backoff(e.to_string()).await;
                        return;
                    }
                    None => {
                        self.stop_after_backoff("event feed closed".to_string()).await;
                        return;
                    }
                }
            }
        }
    }

    async fn stop_after_backoff(&self, reason: String) {
        warn!(
            "{} event feed failed: {}; stopping watch in {:?}",
            K::TYPE, reason, self.backoff
        );

        tokio::select! {
            () = self.token.cancelled() => return,
            () = tokio::time::sleep(self.backoff) => {}
        }

        let mut state = self.state.lock().await;
        if state.generation == self.generation && state.clear() {
            state.set_status(K::TYPE, WatchStatus::Stopped { reason }, self.publisher.as_ref());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::engine::MockEngine;
    use crate::docker::EngineEvent;
    use crate::publish::{BroadcastPublisher, Topic};
    use bollard::models::Volume;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{broadcast, mpsc};
    use tokio::time::timeout;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    type EventSender = mpsc::UnboundedSender<Result<EngineEvent, EngineError>>;

    fn volume(name: &str) -> Volume {
        Volume {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn volume_event(action: &str) -> EngineEvent {
        EngineEvent {
            kind: Some(ResourceType::Volume),
            action: action.to_string(),
            actor_id: "data".to_string(),
        }
    }

    /// Engine whose n-th volume list holds n volumes, with an event feed driven by the returned sender
    fn growing_volume_engine(lists: usize, feeds: usize) -> (MockEngine, Vec<EventSender>) {
        let mut engine = MockEngine::new();
        let calls = Arc::new(AtomicUsize::new(0));
        engine.expect_list_volumes().times(lists).returning(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok((0..n).map(|i| volume(&format!("vol-{i}"))).collect())
        });

        let mut senders = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..feeds {
            let (tx, rx) = mpsc::unbounded_channel();
            senders.push(tx);
            receivers.push(rx);
        }
        let receivers = std::sync::Mutex::new(receivers);
        engine.expect_events().times(feeds).returning(move |kind| {
            assert_eq!(kind, ResourceType::Volume);
            let rx = receivers.lock().unwrap().remove(0);
            Box::pin(UnboundedReceiverStream::new(rx))
        });

        (engine, senders)
    }

    fn controller(engine: MockEngine) -> (VolumeWatcher, broadcast::Receiver<Publication>) {
        let publisher = BroadcastPublisher::new(64);
        let rx = publisher.subscribe();
        let watcher = WatchController::new(
            EngineHandle::with_engine(Arc::new(engine)),
            Arc::new(publisher),
            Duration::from_millis(20),
        );
        (watcher, rx)
    }

    async fn next_on(
        rx: &mut broadcast::Receiver<Publication>,
        topic: Topic,
        wait: Duration,
    ) -> Option<Publication> {
        loop {
            match timeout(wait, rx.recv()).await {
                Ok(Ok(publication)) if publication.topic() == topic => return Some(publication),
                Ok(Ok(_)) => {}
                _ => return None,
            }
        }
    }

    fn volume_count(publication: Option<Publication>) -> usize {
        match publication {
            Some(Publication::Volumes(list)) => list.len(),
            other => panic!("expected a volumes publication, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_without_engine_is_unavailable() {
        let watcher: VolumeWatcher = WatchController::new(
            EngineHandle::new(),
            Arc::new(BroadcastPublisher::new(4)),
            Duration::from_millis(20),
        );
        assert!(matches!(watcher.list().await, Err(EngineError::Unavailable)));
        assert!(matches!(watcher.start_watching().await, Err(EngineError::Unavailable)));
        assert!(matches!(watcher.remove("data").await, Err(EngineError::Unavailable)));
    }

    #[tokio::test]
    async fn test_list_wraps_engine_failure() {
        let mut engine = MockEngine::new();
        engine
            .expect_list_volumes()
            .returning(|| Err(EngineError::call_failed("failed to list volumes", "socket closed")));
        let (watcher, _rx) = controller(engine);

        let err = watcher.list().await.unwrap_err();
        assert!(matches!(err, EngineError::CallFailed { .. }));
        assert_eq!(err.to_string(), "failed to list volumes: socket closed");
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let (watcher, mut rx) = controller(MockEngine::new());
        watcher.stop_watching().await;
        watcher.stop_watching().await;
        assert_eq!(watcher.status().await, WatchStatus::Idle);
        assert!(next_on(&mut rx, Topic::WatchStatus, Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test]
    async fn test_second_start_does_not_spawn_another_loop() {
        let (engine, _senders) = growing_volume_engine(1, 1);
        let (watcher, mut rx) = controller(engine);

        watcher.start_watching().await.unwrap();
        watcher.start_watching().await.unwrap();

        assert_eq!(volume_count(next_on(&mut rx, Topic::Volumes, Duration::from_millis(200)).await), 1);
        assert!(next_on(&mut rx, Topic::Volumes, Duration::from_millis(100)).await.is_none());
        assert!(watcher.is_watching().await);

        watcher.stop_watching().await;
    }

    #[tokio::test]
    async fn test_event_triggers_exactly_one_full_refresh() {
        let (engine, senders) = growing_volume_engine(2, 1);
        let (watcher, mut rx) = controller(engine);

        watcher.start_watching().await.unwrap();
        assert_eq!(volume_count(next_on(&mut rx, Topic::Volumes, Duration::from_millis(200)).await), 1);

        senders[0].send(Ok(volume_event("create"))).unwrap();
        assert_eq!(volume_count(next_on(&mut rx, Topic::Volumes, Duration::from_millis(500)).await), 2);
        assert!(next_on(&mut rx, Topic::Volumes, Duration::from_millis(100)).await.is_none());

        watcher.stop_watching().await;
    }

    #[tokio::test]
    async fn test_events_of_other_kinds_are_ignored() {
        let (engine, senders) = growing_volume_engine(1, 1);
        let (watcher, mut rx) = controller(engine);

        watcher.start_watching().await.unwrap();
        next_on(&mut rx, Topic::Volumes, Duration::from_millis(200)).await;

        senders[0]
            .send(Ok(EngineEvent {
                kind: None,
                action: "reload".to_string(),
                actor_id: String::new(),
            }))
            .unwrap();
        assert!(next_on(&mut rx, Topic::Volumes, Duration::from_millis(100)).await.is_none());

        watcher.stop_watching().await;
    }

    #[tokio::test]
    async fn test_stop_prevents_further_publishing() {
        let (engine, senders) = growing_volume_engine(1, 1);
        let (watcher, mut rx) = controller(engine);

        watcher.start_watching().await.unwrap();
        next_on(&mut rx, Topic::Volumes, Duration::from_millis(200)).await;

        watcher.stop_watching().await;
        assert_eq!(watcher.status().await, WatchStatus::Idle);
        // The loop has exited and dropped its event feed
        assert!(senders[0].is_closed());

        let _ = senders[0].send(Ok(volume_event("create")));
        assert!(next_on(&mut rx, Topic::Volumes, Duration::from_millis(100)).await.is_none());
    }

    #[tokio::test]
    async fn test_feed_error_stops_after_backoff_and_can_restart() {
        let (engine, senders) = growing_volume_engine(2, 2);
        let (watcher, mut rx) = controller(engine);

        watcher.start_watching().await.unwrap();
        next_on(&mut rx, Topic::Volumes, Duration::from_millis(200)).await;

        senders[0]
            .send(Err(EngineError::call_failed("Docker event stream error", "reset by peer")))
            .unwrap();

        let stopped = loop {
            match next_on(&mut rx, Topic::WatchStatus, Duration::from_millis(500)).await {
                Some(Publication::WatchStatus(change)) if change.status != WatchStatus::Watching => {
                    break change
                }
                Some(_) => {}
                None => panic!("watch loop never reported stopping"),
            }
        };
        assert_eq!(stopped.kind, ResourceType::Volume);
        assert!(matches!(stopped.status, WatchStatus::Stopped { ref reason } if reason.contains("reset by peer")));
        assert!(!watcher.is_watching().await);

        // Restarting is the caller's job and works like a first start
        watcher.start_watching().await.unwrap();
        assert_eq!(volume_count(next_on(&mut rx, Topic::Volumes, Duration::from_millis(200)).await), 2);
        assert_eq!(watcher.status().await, WatchStatus::Watching);

        watcher.stop_watching().await;
    }

    #[tokio::test]
    async fn test_stale_loop_does_not_stop_a_newer_one() {
        let (engine, senders) = growing_volume_engine(2, 2);
        let (watcher, _rx) = controller(engine);

        watcher.start_watching().await.unwrap();
        senders[0]
            .send(Err(EngineError::call_failed("Docker event stream error", "eof")))
            .unwrap();

        // Restart while the first loop is still backing off
        watcher.stop_watching().await;
        watcher.start_watching().await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(watcher.is_watching().await);
        assert_eq!(watcher.status().await, WatchStatus::Watching);

        watcher.stop_watching().await;
    }
}
