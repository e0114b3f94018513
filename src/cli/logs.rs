// ABOUTME: CLI logs command - container log backlog, optionally followed live
//
// Follow mode prints the timestamped backlog first, then every line the follower publishes
// until Ctrl-C or until the container's log stream ends.

use super::{output, LogsArgs, OutputFormat};
use crate::app::Dockmate;
use crate::publish::{LogLine, Publication};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use std::time::Duration;

const FOLLOW_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Execute the logs command
pub async fn execute(app: &Dockmate, args: LogsArgs, format: OutputFormat) -> Result<()> {
    let backlog = app
        .logs
        .get_logs(&args.container)
        .await
        .with_context(|| format!("Failed to get logs for {}", args.container))?;

    match format {
        OutputFormat::Text => print!("{backlog}"),
        OutputFormat::Json => {
            for line in backlog.lines() {
                output::print(&Publication::Logs(LogLine::Line(line.to_string())), format)?;
            }
        }
    }

    if args.follow {
        follow(app, &args.container, format).await?;
    }
    Ok(())
}

async fn follow(app: &Dockmate, container: &str, format: OutputFormat) -> Result<()> {
    let mut publications = Box::pin(app.publications());
    app.logs
        .start_watching(container)
        .await
        .with_context(|| format!("Failed to follow logs for {container}"))?;

    let mut check = tokio::time::interval(FOLLOW_CHECK_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = publications.next() => match next {
                Some(publication @ Publication::Logs(_)) => output::print(&publication, format)?,
                Some(_) => {}
                None => break,
            },
            _ = check.tick() => {
                if app.logs.following().await.is_none() {
                    break;
                }
            }
        }
    }

    app.logs.stop_watching().await;
    Ok(())
}
