// ABOUTME: CLI shell command - line-based bridge between local stdin/stdout and a container shell
//
// Each stdin line is forwarded with its newline; shell output is written to stdout as it
// arrives. Ends on stdin EOF, Ctrl-C, or when the shell exits.

use super::{output, OutputFormat, ShellArgs};
use crate::app::Dockmate;
use crate::publish::{Publication, TerminalEvent, TerminalOutput};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Execute the shell command
pub async fn execute(app: &Dockmate, args: ShellArgs, format: OutputFormat) -> Result<()> {
    let mut publications = Box::pin(app.publications());
    app.terminals
        .start_interactive_terminal(&args.container, &args.session)
        .await
        .with_context(|| format!("Failed to open a shell in {}", args.container))?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            line = stdin.next_line() => match line {
                Ok(Some(mut line)) => {
                    line.push('\n');
                    if let Err(e) = app.terminals.send_to_terminal(&args.session, line.as_bytes()).await {
                        break Err(e).context("Failed to send input to the shell");
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e).context("Failed to read stdin"),
            },
            next = publications.next() => match next {
                Some(Publication::TerminalOutput(event)) if event.session_id == args.session => {
                    let closed = event.event == TerminalEvent::Closed;
                    write_event(event, format)?;
                    if closed {
                        break Ok(());
                    }
                }
                Some(_) => {}
                None => break Ok(()),
            }
        }
    };

    app.terminals.close_terminal(&args.session).await;
    result
}

fn write_event(event: TerminalOutput, format: OutputFormat) -> Result<()> {
    match (format, &event.event) {
        (OutputFormat::Text, TerminalEvent::Output(bytes)) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
        _ => output::print(&Publication::TerminalOutput(event), format),
    }
}
