// ABOUTME: Registry of interactive container shells keyed by caller-chosen session ids
//
// Each session owns the input half of an attached exec instance and a reader task that
// forwards the output half to the terminal-output topic. The registry map is the single
// owner of the id space; lookups take the read lock, registration and removal the write lock.
// Registering an id that is already in use replaces the old session.

use crate::config::TerminalConfig;
use crate::docker::{ByteStream, Engine, EngineError, EngineHandle, ExecInput, ExecSpec, ExecStream};
use crate::publish::{Publication, Publisher, TerminalEvent, TerminalOutput};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const SHELL_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

struct TerminalSession {
    id: String,
    container_id: String,
    input: Mutex<ExecInput>,
    closed: CancellationToken,
    opened_at: DateTime<Utc>,
}

/// Snapshot of a registered session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: String,
    pub container_id: String,
    pub opened_at: DateTime<Utc>,
}

type SessionMap = HashMap<String, Arc<TerminalSession>>;

#[derive(Clone)]
pub struct SessionRegistry {
    engine: EngineHandle,
    publisher: Arc<dyn Publisher>,
    config: TerminalConfig,
    sessions: Arc<RwLock<SessionMap>>,
}

impl SessionRegistry {
    pub fn new(engine: EngineHandle, publisher: Arc<dyn Publisher>, config: TerminalConfig) -> Self {
        Self {
            engine,
            publisher,
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Open an interactive shell in `container_id` and register it as `session_id`
    pub async fn start_interactive_terminal(
        &self,
        container_id: &str,
        session_id: &str,
    ) -> Result<(), EngineError> {
        let engine = self.engine.get()?;
        let shell = self.select_shell(engine.as_ref(), container_id).await;

        let spec = ExecSpec {
            cmd: vec![shell.clone()],
            tty: true,
            attach_stdin: true,
            attach_stderr: true,
        };
        let exec_id = engine.create_exec(container_id, spec).await?;
        let ExecStream { output, input } = engine.attach_exec(&exec_id, true).await?;

        let session = Arc::new(TerminalSession {
            id: session_id.to_string(),
            container_id: container_id.to_string(),
            input: Mutex::new(input),
            closed: CancellationToken::new(),
            opened_at: Utc::now(),
        });

        let displaced = self
            .sessions
            .write()
            .await
            .insert(session_id.to_string(), Arc::clone(&session));
        if let Some(old) = displaced {
            warn!(
                "Terminal session {} re-registered; replacing shell in container {}",
                session_id, old.container_id
            );
            old.closed.cancel();
        }

        let reader = SessionReader {
            session,
            sessions: Arc::clone(&self.sessions),
            publisher: Arc::clone(&self.publisher),
        };
        tokio::spawn(reader.run(output));

        info!(
            "Opened terminal session {} ({}) in container {}",
            session_id, shell, container_id
        );
        Ok(())
    }

    /// Write raw bytes to the session's shell
    pub async fn send_to_terminal(&self, session_id: &str, input: &[u8]) -> Result<(), EngineError> {
        let session = self
            .sessions
            .read()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))?;

        let mut writer = session.input.lock().await;
        writer
            .write_all(input)
            .await
            .map_err(|e| EngineError::call_failed("failed to write to terminal", e))?;
        writer
            .flush()
            .await
            .map_err(|e| EngineError::call_failed("failed to flush terminal input", e))
    }

    /// Stop the session's reader, close its input and forget it; unknown ids are ignored
    pub async fn close_terminal(&self, session_id: &str) {
        let removed = self.sessions.write().await.remove(session_id);
        let Some(session) = removed else {
            debug!("Terminal session {} not registered, nothing to close", session_id);
            return;
        };

        session.closed.cancel();
        if let Err(e) = session.input.lock().await.shutdown().await {
            debug!("Closing input of terminal session {} failed: {}", session_id, e);
        }
        info!("Closed terminal session {}", session_id);
    }

    pub async fn close_all(&self) {
        for session_id in self.session_ids().await {
            self.close_terminal(&session_id).await;
        }
    }

    /// Registered session ids, sorted
    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn session(&self, session_id: &str) -> Option<SessionInfo> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|session| SessionInfo {
                id: session.id.clone(),
                container_id: session.container_id.clone(),
                opened_at: session.opened_at,
            })
    }

    /// Preferred shell when the container has it, fallback otherwise
    async fn select_shell(&self, engine: &dyn Engine, container_id: &str) -> String {
        let preferred = &self.config.preferred_shell;
        if !self.config.probe_shell {
            return preferred.clone();
        }

        match tokio::time::timeout(SHELL_PROBE_TIMEOUT, probe(engine, container_id, preferred)).await
        {
            Ok(Ok(output)) if resolves_to(&output, preferred) => preferred.clone(),
            Ok(Ok(_)) => self.config.fallback_shell.clone(),
            Ok(Err(e)) => {
                debug!("Shell probe in {} failed: {}", container_id, e);
                self.config.fallback_shell.clone()
            }
            Err(_) => {
                debug!("Shell probe in {} timed out", container_id);
                self.config.fallback_shell.clone()
            }
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("engine", &self.engine)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Whether `which` printed a path to `shell`
fn resolves_to(which_output: &str, shell: &str) -> bool {
    which_output
        .lines()
        .map(str::trim)
        .any(|path| path.rsplit_once('/').is_some_and(|(_, name)| name == shell))
}

/// Stdout of `which <shell>` inside the container
async fn probe(engine: &dyn Engine, container_id: &str, shell: &str) -> Result<String, EngineError> {
    let spec = ExecSpec {
        cmd: vec!["which".to_string(), shell.to_string()],
        tty: false,
        attach_stdin: false,
        attach_stderr: false,
    };
    let exec_id = engine.create_exec(container_id, spec).await?;
    let ExecStream { mut output, .. } = engine.attach_exec(&exec_id, false).await?;

    let mut collected = Vec::new();
    while let Some(chunk) = output.next().await {
        collected.extend_from_slice(&chunk?);
    }
    Ok(String::from_utf8_lossy(&collected).into_owned())
}

struct SessionReader {
    session: Arc<TerminalSession>,
    sessions: Arc<RwLock<SessionMap>>,
    publisher: Arc<dyn Publisher>,
}

impl SessionReader {
    async fn run(self, mut output: ByteStream) {
        loop {
            tokio::select! {
                biased;
                () = self.session.closed.cancelled() => {
                    debug!("Terminal session {} reader stopped", self.session.id);
                    return;
                }
                next = output.next() => match next {
                    Some(Ok(bytes)) => self.publish(TerminalEvent::Output(bytes)),
                    Some(Err(e)) => {
                        warn!("Terminal session {} stream failed: {}", self.session.id, e);
                        self.publish(TerminalEvent::Error(e.to_string()));
                        break;
                    }
                    None => break,
                }
            }
        }

        // The shell exited; deregister unless the id was already handed to a newer session
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(&self.session.id)
            .is_some_and(|current| Arc::ptr_eq(current, &self.session))
        {
            sessions.remove(&self.session.id);
        }
        drop(sessions);

        info!("Terminal session {} ended", self.session.id);
        self.publish(TerminalEvent::Closed);
    }

    fn publish(&self, event: TerminalEvent) {
        self.publisher.publish(Publication::TerminalOutput(TerminalOutput {
            session_id: self.session.id.clone(),
            event,
        }));
    }
}
