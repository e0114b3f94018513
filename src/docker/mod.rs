// ABOUTME: Docker integration - engine client boundary, Bollard-backed client and container log following

mod client;
pub(crate) mod engine;
pub mod log_streaming;

pub use client::DockerEngine;
pub use engine::{
    ByteStream, Engine, EngineError, EngineEvent, EngineHandle, EventStream, ExecInput, ExecSpec,
    ExecStream, LogOptions, ResourceType,
};
pub use log_streaming::LogFollower;
