// ABOUTME: CLI argument parsing and command routing for dockmate
//
// Provides command-line interface for:
// - Listing, inspecting and removing containers, images, networks and volumes
// - Watching live list updates (watch)
// - Container lifecycle and image save/run (container, image)
// - Container logs and interactive shells (logs, shell)

pub mod list;
pub mod logs;
pub mod manage;
pub mod output;
pub mod shell;
pub mod watch;

use crate::docker::ResourceType;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Watch and manage local Docker containers, images, networks and volumes
#[derive(Parser)]
#[command(name = "dockmate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for commands
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List resources of one kind
    List(ListArgs),

    /// Print list updates as the engine reports changes (Ctrl-C to stop)
    Watch(WatchArgs),

    /// Show the engine's JSON document for a resource
    Inspect(ResourceArgs),

    /// Remove a resource
    Rm(ResourceArgs),

    /// Container lifecycle
    #[command(subcommand)]
    Container(ContainerCommand),

    /// Image export and run
    #[command(subcommand)]
    Image(ImageCommand),

    /// Show container logs
    Logs(LogsArgs),

    /// Open an interactive shell in a container
    Shell(ShellArgs),
}

/// Arguments for the list command
#[derive(clap::Args)]
pub struct ListArgs {
    /// containers, images, networks or volumes
    pub kind: ResourceType,
}

/// Arguments for the watch command
#[derive(clap::Args)]
pub struct WatchArgs {
    /// Kinds to watch (default: all)
    pub kinds: Vec<ResourceType>,
}

/// Arguments naming one resource
#[derive(clap::Args)]
pub struct ResourceArgs {
    /// containers, images, networks or volumes
    pub kind: ResourceType,

    /// Resource id or name
    pub id: String,
}

#[derive(Subcommand)]
pub enum ContainerCommand {
    /// Start a stopped container
    Start { id: String },
    /// Stop a running container
    Stop { id: String },
    /// Restart a container
    Restart { id: String },
    /// Kill a container with SIGKILL
    Kill { id: String },
}

#[derive(Subcommand)]
pub enum ImageCommand {
    /// Export an image as a gzip-compressed tarball
    Save {
        id: String,
        /// Destination file
        path: PathBuf,
    },
    /// Create a container from an image and start it
    Run { id: String },
}

/// Arguments for the logs command
#[derive(clap::Args)]
pub struct LogsArgs {
    /// Container id or name
    pub container: String,

    /// Follow log output (like tail -f)
    #[arg(long, short)]
    pub follow: bool,
}

/// Arguments for the shell command
#[derive(clap::Args)]
pub struct ShellArgs {
    /// Container id or name
    pub container: String,

    /// Session id to register the shell under
    #[arg(long, default_value = "cli")]
    pub session: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_kind() {
        let cli = Cli::try_parse_from(["dockmate", "list", "volumes", "--format", "json"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::List(ListArgs { kind: ResourceType::Volume })));
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["dockmate", "list", "pods"]).is_err());
    }

    #[test]
    fn test_parse_watch_defaults_to_no_kinds() {
        let cli = Cli::try_parse_from(["dockmate", "watch"]).unwrap();
        assert!(matches!(cli.command, Commands::Watch(ref args) if args.kinds.is_empty()));
    }

    #[test]
    fn test_parse_nested_commands() {
        let cli = Cli::try_parse_from(["dockmate", "image", "save", "alpine:3", "/tmp/a.tar.gz"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Image(ImageCommand::Save { ref id, .. }) if id == "alpine:3"
        ));

        let cli = Cli::try_parse_from(["dockmate", "shell", "web"]).unwrap();
        assert!(matches!(cli.command, Commands::Shell(ref args) if args.session == "cli"));
    }
}
