// ABOUTME: CLI watch command - prints every list the watch loops publish until Ctrl-C

use super::{output, OutputFormat, WatchArgs};
use crate::app::Dockmate;
use crate::docker::ResourceType;
use crate::publish::{Publication, Topic};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use tracing::info;

/// Execute the watch command
pub async fn execute(app: &Dockmate, args: WatchArgs, format: OutputFormat) -> Result<()> {
    let kinds = if args.kinds.is_empty() {
        ResourceType::ALL.to_vec()
    } else {
        args.kinds
    };

    // Subscribe before starting so the baseline lists are not missed
    let mut publications = Box::pin(app.publications());

    for kind in &kinds {
        app.start_watching(*kind)
            .await
            .with_context(|| format!("Failed to watch {kind}s"))?;
    }
    info!("Watching {:?}", kinds);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = publications.next() => match next {
                Some(publication) if is_watched(&publication, &kinds) => {
                    output::print(&publication, format)?;
                }
                Some(_) => {}
                None => break,
            }
        }
    }

    for kind in kinds {
        app.stop_watching(kind).await;
    }
    Ok(())
}

fn is_watched(publication: &Publication, kinds: &[ResourceType]) -> bool {
    match publication {
        Publication::WatchStatus(change) => kinds.contains(&change.kind),
        other => kinds
            .iter()
            .any(|kind| Topic::for_resource(*kind) == other.topic()),
    }
}
