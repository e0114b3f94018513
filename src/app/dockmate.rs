// ABOUTME: Application facade owning one watch controller per kind, the log follower and the terminal registry
//
// Every component shares one engine slot and one publication channel. Startup fills the
// slot; until then every caller-facing operation fails with `EngineError::Unavailable`.

use crate::config::AppConfig;
use crate::docker::{DockerEngine, Engine, EngineError, EngineHandle, LogFollower, ResourceType};
use crate::interactive::SessionRegistry;
use crate::publish::{BroadcastPublisher, Publication, Publisher};
use crate::watch::{
    ContainerWatcher, ImageWatcher, NetworkWatcher, VolumeWatcher, WatchController, WatchStatus,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tracing::{error, info};

#[derive(Debug)]
pub struct Dockmate {
    config: AppConfig,
    engine: EngineHandle,
    publisher: Arc<BroadcastPublisher>,
    pub containers: ContainerWatcher,
    pub images: ImageWatcher,
    pub networks: NetworkWatcher,
    pub volumes: VolumeWatcher,
    pub logs: LogFollower,
    pub terminals: SessionRegistry,
}

impl Dockmate {
    /// Build every component around an empty engine slot
    pub fn new(config: AppConfig) -> Self {
        let engine = EngineHandle::new();
        let publisher = Arc::new(BroadcastPublisher::new(config.publisher.capacity));
        let sink: Arc<dyn Publisher> = publisher.clone();
        let backoff = config.watch.backoff();

        Self {
            containers: WatchController::new(engine.clone(), Arc::clone(&sink), backoff),
            images: WatchController::new(engine.clone(), Arc::clone(&sink), backoff),
            networks: WatchController::new(engine.clone(), Arc::clone(&sink), backoff),
            volumes: WatchController::new(engine.clone(), Arc::clone(&sink), backoff),
            logs: LogFollower::new(engine.clone(), Arc::clone(&sink), config.logs.clone()),
            terminals: SessionRegistry::new(engine.clone(), sink, config.terminal.clone()),
            engine,
            publisher,
            config,
        }
    }

    /// Attach an already-connected engine
    pub fn with_engine(config: AppConfig, engine: Arc<dyn Engine>) -> Self {
        let app = Self::new(config);
        app.engine.attach(engine);
        app
    }

    /// Connect to the Docker daemon and attach the client
    ///
    /// On failure the slot stays empty and the error is logged and returned.
    pub async fn startup(&self) -> Result<(), EngineError> {
        match DockerEngine::connect(&self.config.docker).await {
            Ok(docker) => {
                self.engine.attach(Arc::new(docker));
                info!("Docker client attached");
                Ok(())
            }
            Err(e) => {
                error!("Failed to initialize Docker client: {}", e);
                Err(e)
            }
        }
    }

    /// Stop all background work and detach the engine
    pub async fn shutdown(&self) {
        for kind in ResourceType::ALL {
            self.stop_watching(kind).await;
        }
        self.logs.stop_watching().await;
        self.terminals.close_all().await;
        self.engine.detach();
        info!("Dockmate shut down");
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_attached()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Publication> {
        self.publisher.subscribe()
    }

    /// Publications as a stream that skips whatever a slow reader lagged behind on
    pub fn publications(&self) -> impl Stream<Item = Publication> {
        self.publisher.stream()
    }

    /// Current list of `kind`, wrapped the same way a watch loop would publish it
    pub async fn snapshot(&self, kind: ResourceType) -> Result<Publication, EngineError> {
        Ok(match kind {
            ResourceType::Container => Publication::Containers(self.containers.list().await?),
            ResourceType::Image => Publication::Images(self.images.list().await?),
            ResourceType::Network => Publication::Networks(self.networks.list().await?),
            ResourceType::Volume => Publication::Volumes(self.volumes.list().await?),
        })
    }

    pub async fn start_watching(&self, kind: ResourceType) -> Result<(), EngineError> {
        match kind {
            ResourceType::Container => self.containers.start_watching().await,
            ResourceType::Image => self.images.start_watching().await,
            ResourceType::Network => self.networks.start_watching().await,
            ResourceType::Volume => self.volumes.start_watching().await,
        }
    }

    pub async fn stop_watching(&self, kind: ResourceType) {
        match kind {
            ResourceType::Container => self.containers.stop_watching().await,
            ResourceType::Image => self.images.stop_watching().await,
            ResourceType::Network => self.networks.stop_watching().await,
            ResourceType::Volume => self.volumes.stop_watching().await,
        }
    }

    pub async fn watch_status(&self, kind: ResourceType) -> WatchStatus {
        match kind {
            ResourceType::Container => self.containers.status().await,
            ResourceType::Image => self.images.status().await,
            ResourceType::Network => self.networks.status().await,
            ResourceType::Volume => self.volumes.status().await,
        }
    }

    pub async fn remove(&self, kind: ResourceType, id: &str) -> Result<(), EngineError> {
        match kind {
            ResourceType::Container => self.containers.remove(id).await,
            ResourceType::Image => self.images.remove(id).await,
            ResourceType::Network => self.networks.remove(id).await,
            ResourceType::Volume => self.volumes.remove(id).await,
        }
    }

    pub async fn inspect(&self, kind: ResourceType, id: &str) -> Result<String, EngineError> {
        match kind {
            ResourceType::Container => self.containers.inspect(id).await,
            ResourceType::Image => self.images.inspect(id).await,
            ResourceType::Network => self.networks.inspect(id).await,
            ResourceType::Volume => self.volumes.inspect(id).await,
        }
    }
}
