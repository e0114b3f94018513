// ABOUTME: CLI list command - one formatted snapshot of a resource kind

use super::{output, ListArgs, OutputFormat};
use crate::app::Dockmate;
use anyhow::{Context, Result};

/// Execute the list command
pub async fn execute(app: &Dockmate, args: ListArgs, format: OutputFormat) -> Result<()> {
    let snapshot = app
        .snapshot(args.kind)
        .await
        .with_context(|| format!("Failed to list {}s", args.kind))?;

    output::print(&snapshot, format)
}
