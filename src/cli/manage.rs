// ABOUTME: CLI inspect, rm, container and image commands - direct engine calls with a one-line result

use super::{ContainerCommand, ImageCommand, OutputFormat, ResourceArgs};
use crate::app::Dockmate;
use anyhow::{Context, Result};
use serde_json::json;

/// Execute the inspect command
pub async fn inspect(app: &Dockmate, args: ResourceArgs) -> Result<()> {
    let document = app
        .inspect(args.kind, &args.id)
        .await
        .with_context(|| format!("Failed to inspect {} {}", args.kind, args.id))?;
    println!("{document}");
    Ok(())
}

/// Execute the rm command
pub async fn remove(app: &Dockmate, args: ResourceArgs, format: OutputFormat) -> Result<()> {
    app.remove(args.kind, &args.id)
        .await
        .with_context(|| format!("Failed to remove {} {}", args.kind, args.id))?;
    report(format, "removed", &args.id);
    Ok(())
}

/// Execute a container lifecycle command
pub async fn container(app: &Dockmate, command: ContainerCommand, format: OutputFormat) -> Result<()> {
    let containers = &app.containers;
    let (action, id) = match command {
        ContainerCommand::Start { id } => {
            containers.start(&id).await.with_context(|| format!("Failed to start {id}"))?;
            ("started", id)
        }
        ContainerCommand::Stop { id } => {
            containers.stop(&id).await.with_context(|| format!("Failed to stop {id}"))?;
            ("stopped", id)
        }
        ContainerCommand::Restart { id } => {
            containers.restart(&id).await.with_context(|| format!("Failed to restart {id}"))?;
            ("restarted", id)
        }
        ContainerCommand::Kill { id } => {
            containers.kill(&id).await.with_context(|| format!("Failed to kill {id}"))?;
            ("killed", id)
        }
    };
    report(format, action, &id);
    Ok(())
}

/// Execute an image command
pub async fn image(app: &Dockmate, command: ImageCommand, format: OutputFormat) -> Result<()> {
    match command {
        ImageCommand::Save { id, path } => {
            app.images
                .save(&id, &path)
                .await
                .with_context(|| format!("Failed to save image {id}"))?;
            report(format, "saved", &path.display().to_string());
        }
        ImageCommand::Run { id } => {
            let container_id = app
                .images
                .create_and_start(&id)
                .await
                .with_context(|| format!("Failed to run image {id}"))?;
            report(format, "started", &container_id);
        }
    }
    Ok(())
}

fn report(format: OutputFormat, action: &str, target: &str) {
    match format {
        OutputFormat::Text => println!("{action} {target}"),
        OutputFormat::Json => println!("{}", json!({ "action": action, "target": target })),
    }
}
