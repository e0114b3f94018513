// ABOUTME: Pure projection from the engine's raw summaries into display records
//
// The formatter trusts the engine's shape: missing optional fields become empty values
// and nothing here can fail.

use super::resource::{
    ContainerRecord, ImageRecord, NetworkRecord, ResourceGroup, VolumeRecord,
    COMPOSE_PROJECT_LABEL, STANDALONE_GROUP,
};
use bollard::models::{ContainerSummary, ImageSummary, Network, Volume};
use chrono::{DateTime, SecondsFormat};
use std::collections::HashMap;

const SHORT_ID_LEN: usize = 12;
const DIGEST_PREFIX: &str = "sha256:";

/// Group containers by compose project
///
/// Projects appear in the order they are first seen. Containers without a project label
/// are collected into a trailing "Standalone" group, which is omitted when empty.
pub fn format_containers(containers: Vec<ContainerSummary>) -> Vec<ResourceGroup> {
    let mut groups: Vec<ResourceGroup> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut standalone = Vec::new();

    for container in containers {
        let project = container
            .labels
            .as_ref()
            .and_then(|labels| labels.get(COMPOSE_PROJECT_LABEL))
            .filter(|name| !name.is_empty())
            .cloned();

        let record = ContainerRecord {
            id: short_id(container.id.as_deref().unwrap_or_default()),
            names: container.names.unwrap_or_default(),
            image: container.image.unwrap_or_default(),
            status: container.status.unwrap_or_default(),
            state: container.state.unwrap_or_default(),
            compose_project: project.clone(),
        };

        match project {
            Some(name) => match positions.get(&name) {
                Some(&index) => groups[index].containers.push(record),
                None => {
                    positions.insert(name.clone(), groups.len());
                    groups.push(ResourceGroup {
                        name,
                        containers: vec![record],
                    });
                }
            },
            None => standalone.push(record),
        }
    }

    if !standalone.is_empty() {
        groups.push(ResourceGroup {
            name: STANDALONE_GROUP.to_string(),
            containers: standalone,
        });
    }

    groups
}

pub fn format_images(images: Vec<ImageSummary>) -> Vec<ImageRecord> {
    images
        .into_iter()
        .map(|image| ImageRecord {
            id: image
                .id
                .strip_prefix(DIGEST_PREFIX)
                .unwrap_or(&image.id)
                .to_string(),
            size: image.size,
            tags: image.repo_tags,
            created_at: format_epoch(image.created),
        })
        .collect()
}

pub fn format_networks(networks: Vec<Network>) -> Vec<NetworkRecord> {
    networks
        .into_iter()
        .map(|network| NetworkRecord {
            id: network.id.unwrap_or_default(),
            name: network.name.unwrap_or_default(),
            created_at: network.created.unwrap_or_default(),
        })
        .collect()
}

pub fn format_volumes(volumes: Vec<Volume>) -> Vec<VolumeRecord> {
    volumes
        .into_iter()
        .map(|volume| {
            let mut tags: Vec<String> = volume
                .labels
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();
            tags.sort();

            VolumeRecord {
                id: volume.name.clone(),
                name: volume.name,
                // The engine reports -1 when usage was not computed
                size: volume
                    .usage_data
                    .map(|usage| usage.size)
                    .filter(|size| *size >= 0),
                tags,
                created_at: volume.created_at.unwrap_or_default(),
            }
        })
        .collect()
}

fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

fn format_epoch(seconds: i64) -> String {
    DateTime::from_timestamp(seconds, 0)
        .map(|time| time.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::VolumeUsageData;
    use pretty_assertions::assert_eq;

    fn container(id: &str, project: Option<&str>) -> ContainerSummary {
        let labels = project.map(|name| {
            HashMap::from([(COMPOSE_PROJECT_LABEL.to_string(), name.to_string())])
        });
        ContainerSummary {
            id: Some(id.to_string()),
            names: Some(vec![format!("/{id}")]),
            image: Some("alpine:3".to_string()),
            status: Some("Up 2 minutes".to_string()),
            state: Some("running".to_string()),
            labels,
            ..Default::default()
        }
    }

    #[test]
    fn test_groups_follow_first_seen_order_with_standalone_last() {
        let groups = format_containers(vec![
            container("aaaaaaaaaaaaaaaa", None),
            container("bbbbbbbbbbbbbbbb", Some("web")),
            container("cccccccccccccccc", Some("db")),
            container("dddddddddddddddd", Some("web")),
        ]);

        let names: Vec<&str> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["web", "db", STANDALONE_GROUP]);
        assert_eq!(groups[0].containers.len(), 2);
        assert_eq!(groups[0].containers[1].id, "dddddddddddd");
        assert_eq!(groups[2].containers[0].compose_project, None);
    }

    #[test]
    fn test_standalone_group_omitted_when_every_container_has_a_project() {
        let groups = format_containers(vec![container("aaaaaaaaaaaaaaaa", Some("web"))]);
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].is_standalone());
    }

    #[test]
    fn test_empty_project_label_counts_as_standalone() {
        let groups = format_containers(vec![container("aaaaaaaaaaaaaaaa", Some(""))]);
        assert_eq!(groups.len(), 1);
        assert!(groups[0].is_standalone());
    }

    #[test]
    fn test_no_containers_yields_no_groups() {
        assert!(format_containers(Vec::new()).is_empty());
    }

    #[test]
    fn test_image_digest_and_timestamp() {
        let images = format_images(vec![ImageSummary {
            id: "sha256:0123456789abcdef".to_string(),
            size: 7_340_032,
            repo_tags: vec!["alpine:3".to_string()],
            created: 1_700_000_000,
            ..Default::default()
        }]);

        assert_eq!(
            images,
            vec![ImageRecord {
                id: "0123456789abcdef".to_string(),
                size: 7_340_032,
                tags: vec!["alpine:3".to_string()],
                created_at: "2023-11-14T22:13:20Z".to_string(),
            }]
        );
    }

    #[test]
    fn test_volume_size_and_tags() {
        let volumes = format_volumes(vec![
            Volume {
                name: "data".to_string(),
                created_at: Some("2024-03-01T10:00:00Z".to_string()),
                labels: HashMap::from([
                    ("tier".to_string(), "db".to_string()),
                    ("app".to_string(), "shop".to_string()),
                ]),
                usage_data: Some(VolumeUsageData {
                    size: 4096,
                    ref_count: 1,
                }),
                ..Default::default()
            },
            Volume {
                name: "scratch".to_string(),
                usage_data: Some(VolumeUsageData {
                    size: -1,
                    ref_count: -1,
                }),
                ..Default::default()
            },
        ]);

        assert_eq!(volumes[0].id, "data");
        assert_eq!(volumes[0].size, Some(4096));
        assert_eq!(volumes[0].tags, vec!["app=shop", "tier=db"]);
        assert_eq!(volumes[1].size, None);
        assert_eq!(volumes[1].created_at, "");
    }

    #[test]
    fn test_network_fields() {
        let networks = format_networks(vec![Network {
            id: Some("f00d".to_string()),
            name: Some("bridge".to_string()),
            created: Some("2024-01-01T00:00:00Z".to_string()),
            ..Default::default()
        }]);
        assert_eq!(networks[0].name, "bridge");
        assert_eq!(networks[0].created_at, "2024-01-01T00:00:00Z");
    }
}
