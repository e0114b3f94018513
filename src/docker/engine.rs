// ABOUTME: Engine client boundary - the passthrough calls the watch, log and terminal subsystems make
//
// The `Engine` trait is the only way the rest of the crate talks to the container engine.
// `DockerEngine` implements it on top of Bollard; tests substitute a mock. The shared
// `EngineHandle` slot is empty until startup attaches a client, which is what turns every
// caller-facing operation into `EngineError::Unavailable` before then.

use async_trait::async_trait;
use bollard::models::{ContainerSummary, ImageSummary, Network, Volume};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::io::AsyncWrite;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Docker client not initialized")]
    Unavailable,

    #[error("{context}: {source}")]
    CallFailed {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("terminal session not found: {0}")]
    SessionNotFound(String),
}

impl EngineError {
    /// Wrap an engine, transport or I/O failure with a short description of the call
    pub fn call_failed(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::CallFailed {
            context: context.into(),
            source: source.into(),
        }
    }
}

/// The resource kinds the engine reports events for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Container,
    Image,
    Network,
    Volume,
}

impl ResourceType {
    pub const ALL: [Self; 4] = [Self::Container, Self::Image, Self::Network, Self::Volume];

    /// Engine-side event type name, used as the `type` event filter
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Container => "container",
            Self::Image => "image",
            Self::Network => "network",
            Self::Volume => "volume",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "container" | "containers" => Ok(Self::Container),
            "image" | "images" => Ok(Self::Image),
            "network" | "networks" => Ok(Self::Network),
            "volume" | "volumes" => Ok(Self::Volume),
            other => Err(format!(
                "unknown resource kind '{other}' (expected containers, images, networks or volumes)"
            )),
        }
    }
}

/// One notification from the engine's event feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    /// `None` when the engine reports a type this crate does not track
    pub kind: Option<ResourceType>,
    pub action: String,
    pub actor_id: String,
}

/// Options for a container log stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub follow: bool,
    pub tail: String,
    pub timestamps: bool,
}

/// What to run when creating an exec instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    pub tty: bool,
    pub attach_stdin: bool,
    pub attach_stderr: bool,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, EngineError>> + Send>>;
pub type EventStream = Pin<Box<dyn Stream<Item = Result<EngineEvent, EngineError>> + Send>>;
pub type ExecInput = Pin<Box<dyn AsyncWrite + Send>>;

/// Both ends of an attached exec instance
pub struct ExecStream {
    pub output: ByteStream,
    pub input: ExecInput,
}

impl fmt::Debug for ExecStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecStream").finish_non_exhaustive()
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Engine: Send + Sync {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, EngineError>;
    async fn list_images(&self) -> Result<Vec<ImageSummary>, EngineError>;
    async fn list_networks(&self) -> Result<Vec<Network>, EngineError>;
    async fn list_volumes(&self) -> Result<Vec<Volume>, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;
    async fn stop_container(&self, id: &str) -> Result<(), EngineError>;
    async fn restart_container(&self, id: &str) -> Result<(), EngineError>;
    async fn kill_container(&self, id: &str) -> Result<(), EngineError>;
    async fn remove_container(&self, id: &str) -> Result<(), EngineError>;
    async fn inspect_container(&self, id: &str) -> Result<String, EngineError>;

    async fn remove_image(&self, id: &str) -> Result<(), EngineError>;
    async fn inspect_image(&self, id: &str) -> Result<String, EngineError>;
    /// Image tarball as produced by `docker save`
    fn export_image(&self, id: &str) -> ByteStream;
    /// Create a container running `image` with its default command; returns the new container id
    async fn create_container_from_image(&self, image: &str) -> Result<String, EngineError>;

    async fn remove_network(&self, id: &str) -> Result<(), EngineError>;
    async fn inspect_network(&self, id: &str) -> Result<String, EngineError>;

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError>;
    async fn inspect_volume(&self, name: &str) -> Result<String, EngineError>;

    /// Combined stdout/stderr of a container; fails up front when the container is unknown
    async fn logs(&self, id: &str, options: LogOptions) -> Result<ByteStream, EngineError>;

    /// Returns the exec instance id
    async fn create_exec(&self, container_id: &str, spec: ExecSpec) -> Result<String, EngineError>;
    async fn attach_exec(&self, exec_id: &str, tty: bool) -> Result<ExecStream, EngineError>;

    /// Event feed filtered to one resource kind; an `Err` item is a feed failure
    fn events(&self, kind: ResourceType) -> EventStream;
}

/// Shared slot for the engine client
///
/// Cloning the handle shares the slot, so attaching once at startup makes the client
/// visible to every controller built from the same handle.
#[derive(Clone, Default)]
pub struct EngineHandle {
    inner: Arc<RwLock<Option<Arc<dyn Engine>>>>,
}

impl EngineHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_engine(engine: Arc<dyn Engine>) -> Self {
        let handle = Self::new();
        handle.attach(engine);
        handle
    }

    pub fn attach(&self, engine: Arc<dyn Engine>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(engine);
    }

    pub fn detach(&self) -> Option<Arc<dyn Engine>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn is_attached(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The attached client, or `EngineError::Unavailable`
    pub fn get(&self) -> Result<Arc<dyn Engine>, EngineError> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(EngineError::Unavailable)
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type_parsing() {
        assert_eq!("containers".parse::<ResourceType>(), Ok(ResourceType::Container));
        assert_eq!("Volume".parse::<ResourceType>(), Ok(ResourceType::Volume));
        assert!("pods".parse::<ResourceType>().is_err());
        assert_eq!(ResourceType::Network.to_string(), "network");
    }

    #[test]
    fn test_empty_handle_is_unavailable() {
        let handle = EngineHandle::new();
        assert!(!handle.is_attached());
        assert!(matches!(handle.get(), Err(EngineError::Unavailable)));
    }

    #[test]
    fn test_attach_is_shared_across_clones() {
        let handle = EngineHandle::new();
        let clone = handle.clone();

        handle.attach(Arc::new(MockEngine::new()));
        assert!(clone.is_attached());
        assert!(clone.get().is_ok());

        assert!(clone.detach().is_some());
        assert!(!handle.is_attached());
    }

    #[test]
    fn test_call_failed_keeps_message_and_source() {
        let err = EngineError::call_failed("failed to list volumes", "connection refused");
        assert_eq!(err.to_string(), "failed to list volumes: connection refused");
        assert!(std::error::Error::source(&err).is_some());
    }
}
