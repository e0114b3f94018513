// ABOUTME: Text and JSON rendering of publications for the CLI

use super::OutputFormat;
use crate::models::{ImageRecord, NetworkRecord, ResourceGroup, VolumeRecord};
use crate::publish::{LogLine, Publication, TerminalEvent};
use anyhow::Result;

/// Print a publication in the requested format
pub fn print(publication: &Publication, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(publication)?),
        OutputFormat::Text => {
            for line in render_text(publication) {
                println!("{line}");
            }
        }
    }
    Ok(())
}

pub fn render_text(publication: &Publication) -> Vec<String> {
    match publication {
        Publication::Containers(groups) => render_containers(groups),
        Publication::Images(images) => render_images(images),
        Publication::Networks(networks) => render_networks(networks),
        Publication::Volumes(volumes) => render_volumes(volumes),
        Publication::Logs(LogLine::Line(text)) => vec![text.clone()],
        Publication::Logs(LogLine::Error(text)) => vec![text.clone()],
        Publication::TerminalOutput(output) => match &output.event {
            TerminalEvent::Output(bytes) => vec![String::from_utf8_lossy(bytes).into_owned()],
            TerminalEvent::Error(message) => vec![format!("[{}] error: {}", output.session_id, message)],
            TerminalEvent::Closed => vec![format!("[{}] session closed", output.session_id)],
        },
        Publication::WatchStatus(change) => {
            vec![format!("{} watch: {}", change.kind, change.status)]
        }
    }
}

fn render_containers(groups: &[ResourceGroup]) -> Vec<String> {
    if groups.is_empty() {
        return vec!["No containers found.".to_string()];
    }

    let mut lines = Vec::new();
    for group in groups {
        lines.push(format!("{} ({})", group.name, group.containers.len()));
        for container in &group.containers {
            lines.push(format!(
                "  {:<12} {:<24} {:<30} {:<10} {}",
                container.id,
                truncate(container.display_name(), 24),
                truncate(&container.image, 30),
                container.state,
                container.status
            ));
        }
    }
    lines
}

fn render_images(images: &[ImageRecord]) -> Vec<String> {
    if images.is_empty() {
        return vec!["No images found.".to_string()];
    }

    let mut lines = vec![format!("{:<12} {:<40} {:>10} CREATED", "ID", "TAGS", "SIZE")];
    for image in images {
        let tags = if image.tags.is_empty() {
            "<none>".to_string()
        } else {
            image.tags.join(", ")
        };
        lines.push(format!(
            "{:<12} {:<40} {:>10} {}",
            truncate(&image.id, 12),
            truncate(&tags, 40),
            format_size(image.size),
            image.created_at
        ));
    }
    lines
}

fn render_networks(networks: &[NetworkRecord]) -> Vec<String> {
    if networks.is_empty() {
        return vec!["No networks found.".to_string()];
    }

    let mut lines = vec![format!("{:<12} {:<30} CREATED", "ID", "NAME")];
    for network in networks {
        lines.push(format!(
            "{:<12} {:<30} {}",
            truncate(&network.id, 12),
            truncate(&network.name, 30),
            network.created_at
        ));
    }
    lines
}

fn render_volumes(volumes: &[VolumeRecord]) -> Vec<String> {
    if volumes.is_empty() {
        return vec!["No volumes found.".to_string()];
    }

    let mut lines = vec![format!("{:<30} {:>10} {:<25} LABELS", "NAME", "SIZE", "CREATED")];
    for volume in volumes {
        lines.push(format!(
            "{:<30} {:>10} {:<25} {}",
            truncate(&volume.name, 30),
            volume.size.map_or_else(|| "-".to_string(), format_size),
            volume.created_at,
            volume.tags.join(",")
        ));
    }
    lines
}

/// Human-readable byte count
pub fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes}B");
    }

    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1}{}", UNITS[unit])
}

/// Truncate a string to fit in the given width (character-aware for UTF-8)
fn truncate(s: &str, max_len: usize) -> String {
    if max_len <= 3 {
        return ".".repeat(max_len);
    }
    let char_count = s.chars().count();
    if char_count <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContainerRecord;
    use crate::publish::TerminalOutput;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(7_340_032), "7.0MB");
        assert_eq!(format_size(1536), "1.5KB");
    }

    #[test]
    fn test_truncate_long_values() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-image-name", 10), "a-very-...");
    }

    #[test]
    fn test_containers_render_group_headers() {
        let groups = vec![ResourceGroup {
            name: "shop".to_string(),
            containers: vec![ContainerRecord {
                id: "abcdef123456".to_string(),
                names: vec!["/shop-web-1".to_string()],
                image: "nginx:1.25".to_string(),
                status: "Up 3 hours".to_string(),
                state: "running".to_string(),
                compose_project: Some("shop".to_string()),
            }],
        }];

        let lines = render_text(&Publication::Containers(groups));
        assert_eq!(lines[0], "shop (1)");
        assert!(lines[1].contains("shop-web-1"));
        assert!(!lines[1].contains("/shop-web-1"));
    }

    #[test]
    fn test_empty_lists_and_terminal_events() {
        assert_eq!(
            render_text(&Publication::Volumes(Vec::new())),
            vec!["No volumes found."]
        );
        let closed = Publication::TerminalOutput(TerminalOutput {
            session_id: "s1".to_string(),
            event: TerminalEvent::Closed,
        });
        assert_eq!(render_text(&closed), vec!["[s1] session closed"]);
    }
}
