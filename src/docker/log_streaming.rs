// ABOUTME: Container log follower - one-shot backlog fetch and a cancellable live tail published line by line
//
// Only one follow is active per follower. Lines are published without their trailing
// newline; output left unterminated when the stream ends is published as a final line.

use super::engine::{ByteStream, EngineError, EngineHandle, LogOptions};
use crate::config::LogsConfig;
use crate::publish::{LogLine, Publication, Publisher};
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct FollowState {
    cancel: Option<CancellationToken>,
    container_id: Option<String>,
    generation: u64,
}

impl FollowState {
    fn clear(&mut self) -> Option<String> {
        let token = self.cancel.take()?;
        token.cancel();
        self.container_id.take()
    }
}

#[derive(Clone)]
pub struct LogFollower {
    engine: EngineHandle,
    publisher: Arc<dyn Publisher>,
    config: LogsConfig,
    state: Arc<Mutex<FollowState>>,
}

impl LogFollower {
    pub fn new(engine: EngineHandle, publisher: Arc<dyn Publisher>, config: LogsConfig) -> Self {
        Self {
            engine,
            publisher,
            config,
            state: Arc::new(Mutex::new(FollowState::default())),
        }
    }

    /// Recent output with per-line timestamps, fully buffered
    pub async fn get_logs(&self, container_id: &str) -> Result<String, EngineError> {
        let engine = self.engine.get()?;
        let options = LogOptions {
            follow: false,
            tail: self.config.backlog_lines.to_string(),
            timestamps: true,
        };

        let mut stream = engine.logs(container_id, options).await?;
        let mut output = Vec::new();
        while let Some(chunk) = stream.next().await {
            output.extend_from_slice(&chunk?);
        }

        Ok(String::from_utf8_lossy(&output).into_owned())
    }

    /// Follow a container's output, publishing each line on the logs topic
    ///
    /// No-op while a follow is already active, even for a different container. The follower
    /// stays inactive when the engine rejects the container.
    pub async fn start_watching(&self, container_id: &str) -> Result<(), EngineError> {
        let engine = self.engine.get()?;
        let mut state = self.state.lock().await;

        if let Some(current) = &state.container_id {
            debug!("Already following logs for {}", current);
            return Ok(());
        }

        let options = LogOptions {
            follow: true,
            tail: self.config.follow_tail_lines.to_string(),
            timestamps: false,
        };
        let stream = engine.logs(container_id, options).await?;

        let token = CancellationToken::new();
        state.generation += 1;
        state.cancel = Some(token.clone());
        state.container_id = Some(container_id.to_string());

        let follow = FollowLoop {
            container_id: container_id.to_string(),
            publisher: Arc::clone(&self.publisher),
            state: Arc::clone(&self.state),
            token,
            generation: state.generation,
        };
        tokio::spawn(follow.run(stream));

        info!("Started following logs for container {}", container_id);
        Ok(())
    }

    pub async fn stop_watching(&self) {
        if let Some(container_id) = self.state.lock().await.clear() {
            info!("Stopped following logs for container {}", container_id);
        }
    }

    /// Container currently being followed
    pub async fn following(&self) -> Option<String> {
        self.state.lock().await.container_id.clone()
    }
}

impl std::fmt::Debug for LogFollower {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFollower")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

struct FollowLoop {
    container_id: String,
    publisher: Arc<dyn Publisher>,
    state: Arc<Mutex<FollowState>>,
    token: CancellationToken,
    generation: u64,
}

impl FollowLoop {
    async fn run(self, mut stream: ByteStream) {
        let mut lines = LineBuffer::default();

        loop {
            tokio::select! {
                biased;
                () = self.token.cancelled() => return,
                next = stream.next() => match next {
                    Some(Ok(chunk)) => {
                        for line in lines.push(&chunk) {
                            self.publish(LogLine::Line(line));
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Log stream for container {} failed: {}", self.container_id, e);
                        self.flush(&mut lines);
                        self.publish(LogLine::Error(format!("ERROR: {e}")));
                        break;
                    }
                    None => {
                        debug!("Log stream for container {} ended", self.container_id);
                        self.flush(&mut lines);
                        break;
                    }
                }
            }
        }

        let mut state = self.state.lock().await;
        if state.generation == self.generation {
            state.clear();
        }
    }

    fn flush(&self, lines: &mut LineBuffer) {
        if let Some(line) = lines.finish() {
            self.publish(LogLine::Line(line));
        }
    }

    fn publish(&self, line: LogLine) {
        self.publisher.publish(Publication::Logs(line));
    }
}

/// Splits a byte stream into lines regardless of where chunk boundaries fall
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(end) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            lines.push(decode_line(&raw));
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.pending);
        Some(decode_line(&raw))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let trimmed = raw.strip_suffix(b"\n").unwrap_or(raw);
    let trimmed = trimmed.strip_suffix(b"\r").unwrap_or(trimmed);
    String::from_utf8_lossy(trimmed).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::engine::MockEngine;
    use crate::publish::BroadcastPublisher;
    use futures_util::stream;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::sync::{broadcast, mpsc};
    use tokio::time::timeout;
    use tokio_stream::wrappers::UnboundedReceiverStream;

    fn chunks(parts: &[&str]) -> ByteStream {
        let items: Vec<Result<Vec<u8>, EngineError>> =
            parts.iter().map(|part| Ok(part.as_bytes().to_vec())).collect();
        Box::pin(stream::iter(items))
    }

    fn follower(engine: MockEngine) -> (LogFollower, broadcast::Receiver<Publication>) {
        let publisher = BroadcastPublisher::new(64);
        let rx = publisher.subscribe();
        let follower = LogFollower::new(
            EngineHandle::with_engine(Arc::new(engine)),
            Arc::new(publisher),
            LogsConfig::default(),
        );
        (follower, rx)
    }

    async fn collect_lines(rx: &mut broadcast::Receiver<Publication>) -> Vec<LogLine> {
        let mut lines = Vec::new();
        while let Ok(Ok(Publication::Logs(line))) =
            timeout(Duration::from_millis(200), rx.recv()).await
        {
            lines.push(line);
        }
        lines
    }

    #[test]
    fn test_line_buffer_handles_split_chunks() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"hel").is_empty());
        assert_eq!(buffer.push(b"lo\r\nwor"), vec!["hello"]);
        assert_eq!(buffer.push(b"ld\n\n"), vec!["world", ""]);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_line_buffer_flushes_unterminated_tail() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"no newline").is_empty());
        assert_eq!(buffer.finish().as_deref(), Some("no newline"));
        assert_eq!(buffer.finish(), None);
    }

    #[tokio::test]
    async fn test_get_logs_buffers_backlog_with_timestamps() {
        let mut engine = MockEngine::new();
        engine.expect_logs().times(1).returning(|id, options| {
            assert_eq!(id, "web");
            assert_eq!(
                options,
                LogOptions {
                    follow: false,
                    tail: "100".to_string(),
                    timestamps: true,
                }
            );
            Ok(chunks(&["2024-01-01T00:00:00Z one\n", "2024-01-01T00:00:01Z two\n"]))
        });
        let (follower, _rx) = follower(engine);

        let logs = follower.get_logs("web").await.unwrap();
        assert_eq!(logs, "2024-01-01T00:00:00Z one\n2024-01-01T00:00:01Z two\n");
    }

    #[tokio::test]
    async fn test_get_logs_without_engine_is_unavailable() {
        let follower = LogFollower::new(
            EngineHandle::new(),
            Arc::new(BroadcastPublisher::new(4)),
            LogsConfig::default(),
        );
        assert!(matches!(follower.get_logs("web").await, Err(EngineError::Unavailable)));
        assert!(matches!(follower.start_watching("web").await, Err(EngineError::Unavailable)));
        assert_eq!(follower.following().await, None);
    }

    #[tokio::test]
    async fn test_follow_publishes_each_line_then_goes_idle() {
        let mut engine = MockEngine::new();
        engine.expect_logs().times(1).returning(|_, options| {
            assert!(options.follow);
            assert_eq!(options.tail, "10");
            assert!(!options.timestamps);
            Ok(chunks(&["first\nsec", "ond\r\n", "partial"]))
        });
        let (follower, mut rx) = follower(engine);

        follower.start_watching("web").await.unwrap();
        let lines = collect_lines(&mut rx).await;

        assert_eq!(
            lines,
            vec![
                LogLine::Line("first".to_string()),
                LogLine::Line("second".to_string()),
                LogLine::Line("partial".to_string()),
            ]
        );
        assert_eq!(follower.following().await, None);
    }

    #[tokio::test]
    async fn test_read_error_publishes_tagged_line() {
        let mut engine = MockEngine::new();
        engine.expect_logs().returning(|_, _| {
            let items: Vec<Result<Vec<u8>, EngineError>> = vec![
                Ok(b"booting\n".to_vec()),
                Err(EngineError::call_failed("failed to read container logs", "connection reset")),
            ];
            Ok(Box::pin(stream::iter(items)) as ByteStream)
        });
        let (follower, mut rx) = follower(engine);

        follower.start_watching("web").await.unwrap();
        let lines = collect_lines(&mut rx).await;

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], LogLine::Line("booting".to_string()));
        assert_eq!(
            lines[1],
            LogLine::Error("ERROR: failed to read container logs: connection reset".to_string())
        );
    }

    #[tokio::test]
    async fn test_second_follow_is_noop_until_stopped() {
        let mut engine = MockEngine::new();
        engine
            .expect_logs()
            .times(2)
            .returning(|_, _| Ok(Box::pin(stream::pending::<Result<Vec<u8>, EngineError>>())));
        let (follower, _rx) = follower(engine);

        follower.start_watching("web").await.unwrap();
        follower.start_watching("db").await.unwrap();
        assert_eq!(follower.following().await.as_deref(), Some("web"));

        follower.stop_watching().await;
        follower.stop_watching().await;
        assert_eq!(follower.following().await, None);

        follower.start_watching("db").await.unwrap();
        assert_eq!(follower.following().await.as_deref(), Some("db"));
        follower.stop_watching().await;
    }

    #[tokio::test]
    async fn test_follow_of_unknown_container_fails_and_stays_idle() {
        let mut engine = MockEngine::new();
        engine.expect_logs().times(1).returning(|_, _| {
            Err(EngineError::call_failed(
                "failed to read container logs",
                "No such container: ghost",
            ))
        });
        let (follower, mut rx) = follower(engine);

        let err = follower.start_watching("ghost").await.unwrap_err();
        assert!(matches!(err, EngineError::CallFailed { .. }));
        assert_eq!(
            err.to_string(),
            "failed to read container logs: No such container: ghost"
        );
        assert_eq!(follower.following().await, None);
        assert!(collect_lines(&mut rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_stop_prevents_further_lines() {
        let (tx, chunk_rx) = mpsc::unbounded_channel::<Result<Vec<u8>, EngineError>>();
        let chunk_rx = std::sync::Mutex::new(Some(chunk_rx));
        let mut engine = MockEngine::new();
        engine.expect_logs().times(1).returning(move |_, _| {
            let rx = chunk_rx.lock().unwrap().take().unwrap();
            Ok(Box::pin(UnboundedReceiverStream::new(rx)) as ByteStream)
        });
        let (follower, mut rx) = follower(engine);

        follower.start_watching("web").await.unwrap();
        tx.send(Ok(b"before stop\n".to_vec())).unwrap();
        assert_eq!(
            timeout(Duration::from_millis(200), rx.recv()).await.unwrap().unwrap(),
            Publication::Logs(LogLine::Line("before stop".to_string()))
        );

        follower.stop_watching().await;
        let _ = tx.send(Ok(b"after stop\n".to_vec()));

        assert!(collect_lines(&mut rx).await.is_empty());
        assert_eq!(follower.following().await, None);
    }
}
