// ABOUTME: Bollard-backed implementation of the engine boundary, including socket discovery

use super::engine::{
    ByteStream, Engine, EngineError, EngineEvent, EventStream, ExecSpec, ExecStream, LogOptions,
    ResourceType,
};
use crate::config::DockerConfig;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    ListContainersOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    RestartContainerOptions, StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::{ListImagesOptions, RemoveImageOptions};
use bollard::models::{
    ContainerSummary, EventMessage, EventMessageTypeEnum, ImageSummary, Network, Volume,
};
use bollard::network::{InspectNetworkOptions, ListNetworksOptions};
use bollard::system::EventsOptions;
use bollard::volume::{ListVolumesOptions, RemoveVolumeOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures_util::stream::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect to the local daemon and verify it answers a ping within the configured timeout
    pub async fn connect(config: &DockerConfig) -> Result<Self, EngineError> {
        let docker = Self::connect_to_docker(config)
            .map_err(|e| EngineError::call_failed("failed to create Docker client", e))?;

        let ping_timeout = Duration::from_secs(config.timeout);
        tokio::time::timeout(ping_timeout, docker.ping())
            .await
            .map_err(|_| {
                EngineError::call_failed(
                    "Docker ping timeout",
                    "daemon may be unresponsive",
                )
            })?
            .map_err(|e| EngineError::call_failed("failed to reach Docker daemon", e))?;

        info!("Successfully connected to Docker daemon");
        Ok(Self { docker })
    }

    fn connect_to_docker(config: &DockerConfig) -> Result<Docker, bollard::errors::Error> {
        if let Some(host) = &config.host {
            info!("Using Docker host from config: {}", host);
            match Self::connect_to_host(host, config.timeout) {
                Ok(docker) => return Ok(docker),
                Err(e) => warn!("Failed to connect to configured Docker host {}: {}", host, e),
            }
        }

        if let Ok(docker_host) = std::env::var("DOCKER_HOST") {
            info!("Using DOCKER_HOST: {}", docker_host);
            return Docker::connect_with_local_defaults();
        }

        for socket_path in Self::get_docker_socket_paths() {
            if !std::path::Path::new(&socket_path).exists() {
                continue;
            }
            info!("Found Docker socket at: {}", socket_path);
            match Docker::connect_with_socket(&socket_path, config.timeout, API_DEFAULT_VERSION) {
                Ok(docker) => return Ok(docker),
                Err(e) => warn!("Failed to connect to Docker socket {}: {}", socket_path, e),
            }
        }

        warn!("No Docker socket found, trying default connection");
        Docker::connect_with_local_defaults()
    }

    fn connect_to_host(host: &str, timeout: u64) -> Result<Docker, bollard::errors::Error> {
        if let Some(path) = host.strip_prefix("unix://") {
            Docker::connect_with_socket(path, timeout, API_DEFAULT_VERSION)
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http(host, timeout, API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_socket(host, timeout, API_DEFAULT_VERSION)
        }
    }

    fn get_docker_socket_paths() -> Vec<String> {
        let mut paths = Vec::new();

        if let Some(context_socket) = Self::get_docker_context_socket() {
            paths.push(context_socket);
        }

        if cfg!(target_os = "macos") {
            if let Some(home) = dirs::home_dir() {
                // Docker Desktop, Colima
                paths.push(home.join(".docker/run/docker.sock").display().to_string());
                paths.push(home.join(".colima/default/docker.sock").display().to_string());
            }
        }

        if cfg!(target_os = "linux") {
            paths.push("/var/run/docker.sock".to_string());

            // Rootless Docker, then Podman
            if let Ok(xdg_runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
                paths.push(format!("{}/docker.sock", xdg_runtime_dir));
                paths.push(format!("{}/podman/podman.sock", xdg_runtime_dir));
            }
        }

        paths
    }

    fn get_docker_context_socket() -> Option<String> {
        let output = std::process::Command::new("docker")
            .args([
                "context",
                "inspect",
                "--format",
                "{{.Endpoints.docker.Host}}",
            ])
            .output()
            .ok()?;

        if !output.status.success() {
            return None;
        }

        let socket_url = String::from_utf8(output.stdout).ok()?;
        let path = socket_url.trim().strip_prefix("unix://")?;
        debug!("Docker context socket: {}", path);
        Some(path.to_string())
    }
}

fn to_json<T: Serialize>(value: &T, what: &str) -> Result<String, EngineError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::call_failed(format!("failed to encode {what} data"), e))
}

fn log_output_bytes(output: LogOutput) -> Vec<u8> {
    match output {
        LogOutput::StdOut { message }
        | LogOutput::StdErr { message }
        | LogOutput::Console { message }
        | LogOutput::StdIn { message } => message.to_vec(),
    }
}

fn event_kind(typ: Option<EventMessageTypeEnum>) -> Option<ResourceType> {
    match typ? {
        EventMessageTypeEnum::CONTAINER => Some(ResourceType::Container),
        EventMessageTypeEnum::IMAGE => Some(ResourceType::Image),
        EventMessageTypeEnum::NETWORK => Some(ResourceType::Network),
        EventMessageTypeEnum::VOLUME => Some(ResourceType::Volume),
        _ => None,
    }
}

impl From<EventMessage> for EngineEvent {
    fn from(message: EventMessage) -> Self {
        Self {
            kind: event_kind(message.typ),
            action: message.action.unwrap_or_default(),
            actor_id: message.actor.and_then(|actor| actor.id).unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, EngineError> {
        self.docker
            .list_containers(Some(ListContainersOptions::<String> {
                all: true,
                ..Default::default()
            }))
            .await
            .map_err(|e| EngineError::call_failed("failed to list containers", e))
    }

    async fn list_images(&self) -> Result<Vec<ImageSummary>, EngineError> {
        self.docker
            .list_images(Some(ListImagesOptions::<String>::default()))
            .await
            .map_err(|e| EngineError::call_failed("failed to list images", e))
    }

    async fn list_networks(&self) -> Result<Vec<Network>, EngineError> {
        self.docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await
            .map_err(|e| EngineError::call_failed("failed to list networks", e))
    }

    async fn list_volumes(&self) -> Result<Vec<Volume>, EngineError> {
        let response = self
            .docker
            .list_volumes(None::<ListVolumesOptions<String>>)
            .await
            .map_err(|e| EngineError::call_failed("failed to list volumes", e))?;
        Ok(response.volumes.unwrap_or_default())
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| EngineError::call_failed(format!("failed to start container {id}"), e))
    }

    async fn stop_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .stop_container(id, None)
            .await
            .map_err(|e| EngineError::call_failed(format!("failed to stop container {id}"), e))
    }

    async fn restart_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .restart_container(id, None::<RestartContainerOptions>)
            .await
            .map_err(|e| EngineError::call_failed(format!("failed to restart container {id}"), e))
    }

    async fn kill_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .kill_container(id, Some(KillContainerOptions { signal: "SIGKILL" }))
            .await
            .map_err(|e| EngineError::call_failed(format!("failed to kill container {id}"), e))
    }

    async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .remove_container(id, None::<RemoveContainerOptions>)
            .await
            .map_err(|e| EngineError::call_failed(format!("failed to remove container {id}"), e))
    }

    async fn inspect_container(&self, id: &str) -> Result<String, EngineError> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| EngineError::call_failed("failed to get container data", e))?;
        to_json(&response, "container")
    }

    async fn remove_image(&self, id: &str) -> Result<(), EngineError> {
        let options = RemoveImageOptions {
            force: true,
            ..Default::default()
        };
        self.docker
            .remove_image(id, Some(options), None)
            .await
            .map(|_| ())
            .map_err(|e| EngineError::call_failed(format!("failed to remove image {id}"), e))
    }

    async fn inspect_image(&self, id: &str) -> Result<String, EngineError> {
        let response = self
            .docker
            .inspect_image(id)
            .await
            .map_err(|e| EngineError::call_failed("failed to get image data", e))?;
        to_json(&response, "image")
    }

    fn export_image(&self, id: &str) -> ByteStream {
        let stream = self.docker.export_image(id).map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| EngineError::call_failed("failed to export image", e))
        });
        Box::pin(stream)
    }

    async fn create_container_from_image(&self, image: &str) -> Result<String, EngineError> {
        let config = Config {
            image: Some(image.to_string()),
            tty: Some(false),
            ..Default::default()
        };
        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, config)
            .await
            .map_err(|e| EngineError::call_failed("failed to create container", e))?;
        Ok(response.id)
    }

    async fn remove_network(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .remove_network(id)
            .await
            .map_err(|e| EngineError::call_failed(format!("failed to remove network {id}"), e))
    }

    async fn inspect_network(&self, id: &str) -> Result<String, EngineError> {
        let response = self
            .docker
            .inspect_network(id, None::<InspectNetworkOptions<String>>)
            .await
            .map_err(|e| EngineError::call_failed("failed to get network data", e))?;
        to_json(&response, "network")
    }

    async fn remove_volume(&self, name: &str) -> Result<(), EngineError> {
        self.docker
            .remove_volume(name, Some(RemoveVolumeOptions { force: true }))
            .await
            .map_err(|e| EngineError::call_failed(format!("failed to remove volume {name}"), e))
    }

    async fn inspect_volume(&self, name: &str) -> Result<String, EngineError> {
        let response = self
            .docker
            .inspect_volume(name)
            .await
            .map_err(|e| EngineError::call_failed("failed to get volume data", e))?;
        to_json(&response, "volume")
    }

    async fn logs(&self, id: &str, options: LogOptions) -> Result<ByteStream, EngineError> {
        // The log stream only talks to the daemon once polled, so resolve the container first
        self.docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| EngineError::call_failed("failed to read container logs", e))?;

        let options = LogsOptions::<String> {
            follow: options.follow,
            stdout: true,
            stderr: true,
            timestamps: options.timestamps,
            tail: options.tail,
            ..Default::default()
        };
        let stream = self.docker.logs(id, Some(options)).map(|chunk| {
            chunk
                .map(log_output_bytes)
                .map_err(|e| EngineError::call_failed("failed to read container logs", e))
        });
        Ok(Box::pin(stream))
    }

    async fn create_exec(&self, container_id: &str, spec: ExecSpec) -> Result<String, EngineError> {
        let options = CreateExecOptions::<String> {
            cmd: Some(spec.cmd),
            attach_stdin: Some(spec.attach_stdin),
            attach_stdout: Some(true),
            attach_stderr: Some(spec.attach_stderr),
            tty: Some(spec.tty),
            ..Default::default()
        };
        let exec = self
            .docker
            .create_exec(container_id, options)
            .await
            .map_err(|e| EngineError::call_failed("failed to create exec instance", e))?;
        Ok(exec.id)
    }

    async fn attach_exec(&self, exec_id: &str, tty: bool) -> Result<ExecStream, EngineError> {
        let options = StartExecOptions {
            detach: false,
            tty,
            ..Default::default()
        };
        match self
            .docker
            .start_exec(exec_id, Some(options))
            .await
            .map_err(|e| EngineError::call_failed("failed to attach to exec instance", e))?
        {
            StartExecResults::Attached { output, input } => {
                let output = output.map(|chunk| {
                    chunk
                        .map(log_output_bytes)
                        .map_err(|e| EngineError::call_failed("failed to read exec output", e))
                });
                Ok(ExecStream {
                    output: Box::pin(output),
                    input,
                })
            }
            StartExecResults::Detached => Err(EngineError::call_failed(
                "failed to attach to exec instance",
                "engine started the exec detached",
            )),
        }
    }

    fn events(&self, kind: ResourceType) -> EventStream {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec![kind.as_str().to_string()]);

        let stream = self
            .docker
            .events(Some(EventsOptions::<String> {
                filters,
                ..Default::default()
            }))
            .map(|event| {
                event
                    .map(EngineEvent::from)
                    .map_err(|e| EngineError::call_failed("Docker event stream error", e))
            });
        Box::pin(stream)
    }
}
