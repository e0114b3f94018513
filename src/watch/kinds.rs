// ABOUTME: The four watched resource kinds and the verbs only some of them support

use super::{ResourceKind, WatchController};
use crate::docker::{Engine, EngineError, ResourceType};
use crate::models::{
    format_containers, format_images, format_networks, format_volumes, ImageRecord, NetworkRecord,
    ResourceGroup, VolumeRecord,
};
use crate::publish::Publication;
use bollard::models::{ContainerSummary, ImageSummary, Network, Volume};
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug)]
pub struct Containers;

#[derive(Debug)]
pub struct Images;

#[derive(Debug)]
pub struct Networks;

#[derive(Debug)]
pub struct Volumes;

pub type ContainerWatcher = WatchController<Containers>;
pub type ImageWatcher = WatchController<Images>;
pub type NetworkWatcher = WatchController<Networks>;
pub type VolumeWatcher = WatchController<Volumes>;

impl ResourceKind for Containers {
    type Summary = ContainerSummary;
    type Snapshot = Vec<ResourceGroup>;

    const TYPE: ResourceType = ResourceType::Container;

    fn list(engine: &dyn Engine) -> BoxFuture<'_, Result<Vec<ContainerSummary>, EngineError>> {
        engine.list_containers()
    }

    fn format(summaries: Vec<ContainerSummary>) -> Vec<ResourceGroup> {
        format_containers(summaries)
    }

    fn publication(snapshot: Vec<ResourceGroup>) -> Publication {
        Publication::Containers(snapshot)
    }

    fn remove<'a>(engine: &'a dyn Engine, id: &'a str) -> BoxFuture<'a, Result<(), EngineError>> {
        engine.remove_container(id)
    }

    fn inspect<'a>(
        engine: &'a dyn Engine,
        id: &'a str,
    ) -> BoxFuture<'a, Result<String, EngineError>> {
        engine.inspect_container(id)
    }
}

impl ResourceKind for Images {
    type Summary = ImageSummary;
    type Snapshot = Vec<ImageRecord>;

    const TYPE: ResourceType = ResourceType::Image;

    fn list(engine: &dyn Engine) -> BoxFuture<'_, Result<Vec<ImageSummary>, EngineError>> {
        engine.list_images()
    }

    fn format(summaries: Vec<ImageSummary>) -> Vec<ImageRecord> {
        format_images(summaries)
    }

    fn publication(snapshot: Vec<ImageRecord>) -> Publication {
        Publication::Images(snapshot)
    }

    fn remove<'a>(engine: &'a dyn Engine, id: &'a str) -> BoxFuture<'a, Result<(), EngineError>> {
        engine.remove_image(id)
    }

    fn inspect<'a>(
        engine: &'a dyn Engine,
        id: &'a str,
    ) -> BoxFuture<'a, Result<String, EngineError>> {
        engine.inspect_image(id)
    }
}

impl ResourceKind for Networks {
    type Summary = Network;
    type Snapshot = Vec<NetworkRecord>;

    const TYPE: ResourceType = ResourceType::Network;

    fn list(engine: &dyn Engine) -> BoxFuture<'_, Result<Vec<Network>, EngineError>> {
        engine.list_networks()
    }

    fn format(summaries: Vec<Network>) -> Vec<NetworkRecord> {
        format_networks(summaries)
    }

    fn publication(snapshot: Vec<NetworkRecord>) -> Publication {
        Publication::Networks(snapshot)
    }

    fn remove<'a>(engine: &'a dyn Engine, id: &'a str) -> BoxFuture<'a, Result<(), EngineError>> {
        engine.remove_network(id)
    }

    fn inspect<'a>(
        engine: &'a dyn Engine,
        id: &'a str,
    ) -> BoxFuture<'a, Result<String, EngineError>> {
        engine.inspect_network(id)
    }
}

impl ResourceKind for Volumes {
    type Summary = Volume;
    type Snapshot = Vec<VolumeRecord>;

    const TYPE: ResourceType = ResourceType::Volume;

    fn list(engine: &dyn Engine) -> BoxFuture<'_, Result<Vec<Volume>, EngineError>> {
        engine.list_volumes()
    }

    fn format(summaries: Vec<Volume>) -> Vec<VolumeRecord> {
        format_volumes(summaries)
    }

    fn publication(snapshot: Vec<VolumeRecord>) -> Publication {
        Publication::Volumes(snapshot)
    }

    fn remove<'a>(engine: &'a dyn Engine, id: &'a str) -> BoxFuture<'a, Result<(), EngineError>> {
        engine.remove_volume(id)
    }

    fn inspect<'a>(
        engine: &'a dyn Engine,
        id: &'a str,
    ) -> BoxFuture<'a, Result<String, EngineError>> {
        engine.inspect_volume(id)
    }
}

impl WatchController<Containers> {
    pub async fn start(&self, id: &str) -> Result<(), EngineError> {
        info!("Starting container {}", id);
        self.engine.get()?.start_container(id).await
    }

    pub async fn stop(&self, id: &str) -> Result<(), EngineError> {
        info!("Stopping container {}", id);
        self.engine.get()?.stop_container(id).await
    }

    pub async fn restart(&self, id: &str) -> Result<(), EngineError> {
        info!("Restarting container {}", id);
        self.engine.get()?.restart_container(id).await
    }

    /// Sends SIGKILL
    pub async fn kill(&self, id: &str) -> Result<(), EngineError> {
        info!("Killing container {}", id);
        self.engine.get()?.kill_container(id).await
    }
}

impl WatchController<Images> {
    /// Export the image tarball gzip-compressed into `path`
    ///
    /// A partially written file is removed when the export fails.
    pub async fn save(&self, id: &str, path: &Path) -> Result<(), EngineError> {
        let engine = self.engine.get()?;
        info!("Saving image {} to {}", id, path.display());

        let (tx, rx) = mpsc::channel::<Vec<u8>>(16);
        let target = path.to_path_buf();
        let writer = tokio::task::spawn_blocking(move || write_gzip(&target, rx));

        let mut export = engine.export_image(id);
        let mut failure = None;
        while let Some(chunk) = export.next().await {
            match chunk {
                Ok(bytes) => {
                    if tx.send(bytes).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(tx);

        let written = writer
            .await
            .map_err(|e| EngineError::call_failed("image save task failed", e))
            .and_then(|result| {
                result.map_err(|e| {
                    EngineError::call_failed(format!("failed to write {}", path.display()), e)
                })
            });

        match failure.map_or(written, Err) {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(path).await {
                    warn!("Failed to remove partial image file {}: {}", path.display(), remove_err);
                }
                Err(e)
            }
        }
    }

    /// Create a container from the image and start it; returns the new container id
    pub async fn create_and_start(&self, id: &str) -> Result<String, EngineError> {
        let engine = self.engine.get()?;
        let container_id = engine.create_container_from_image(id).await?;
        engine.start_container(&container_id).await?;
        info!("Started container {} from image {}", container_id, id);
        Ok(container_id)
    }
}

fn write_gzip(path: &Path, mut chunks: mpsc::Receiver<Vec<u8>>) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    while let Some(chunk) = chunks.blocking_recv() {
        encoder.write_all(&chunk)?;
    }
    encoder.finish()?.flush()
}
