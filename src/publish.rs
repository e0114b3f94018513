// ABOUTME: Publication sink - fire-and-forget notifications to subscribers, one topic per payload kind
//
// Publishing never blocks and never fails. Subscribers that fall behind skip ahead to
// newer publications; there is no replay for late subscribers.

use crate::docker::ResourceType;
use crate::models::{ImageRecord, NetworkRecord, ResourceGroup, VolumeRecord};
use crate::watch::WatchStatus;
use serde::Serialize;
use std::fmt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    Containers,
    Images,
    Networks,
    Volumes,
    Logs,
    TerminalOutput,
    WatchStatus,
}

impl Topic {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Containers => "containers",
            Self::Images => "images",
            Self::Networks => "networks",
            Self::Volumes => "volumes",
            Self::Logs => "logs",
            Self::TerminalOutput => "terminal-output",
            Self::WatchStatus => "watch-status",
        }
    }

    /// Topic carrying the list of a resource kind
    pub const fn for_resource(kind: ResourceType) -> Self {
        match kind {
            ResourceType::Container => Self::Containers,
            ResourceType::Image => Self::Images,
            ResourceType::Network => Self::Networks,
            ResourceType::Volume => Self::Volumes,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of followed container output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum LogLine {
    Line(String),
    /// The follow loop hit a read error and stopped
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum TerminalEvent {
    /// Raw bytes as the exec stream delivered them
    Output(Vec<u8>),
    Error(String),
    /// The session's stream ended and the session was deregistered
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalOutput {
    pub session_id: String,
    pub event: TerminalEvent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchStatusChange {
    pub kind: ResourceType,
    pub status: WatchStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "topic", content = "payload", rename_all = "kebab-case")]
pub enum Publication {
    Containers(Vec<ResourceGroup>),
    Images(Vec<ImageRecord>),
    Networks(Vec<NetworkRecord>),
    Volumes(Vec<VolumeRecord>),
    Logs(LogLine),
    TerminalOutput(TerminalOutput),
    WatchStatus(WatchStatusChange),
}

impl Publication {
    pub const fn topic(&self) -> Topic {
        match self {
            Self::Containers(_) => Topic::Containers,
            Self::Images(_) => Topic::Images,
            Self::Networks(_) => Topic::Networks,
            Self::Volumes(_) => Topic::Volumes,
            Self::Logs(_) => Topic::Logs,
            Self::TerminalOutput(_) => Topic::TerminalOutput,
            Self::WatchStatus(_) => Topic::WatchStatus,
        }
    }
}

pub trait Publisher: Send + Sync {
    /// Deliver best-effort; must not block the caller
    fn publish(&self, publication: Publication);
}

/// Publisher backed by a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    sender: broadcast::Sender<Publication>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Publication> {
        self.sender.subscribe()
    }

    /// Subscription as a stream that silently skips publications it lagged behind on
    pub fn stream(&self) -> impl Stream<Item = Publication> {
        BroadcastStream::new(self.sender.subscribe()).filter_map(Result::ok)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Publisher for BroadcastPublisher {
    fn publish(&self, publication: Publication) {
        let topic = publication.topic();
        if self.sender.send(publication).is_err() {
            trace!("No subscribers on topic {}", topic);
        }
    }
}
