// ABOUTME: Display records for containers, images, networks and volumes, and the formatter producing them

pub mod format;
pub mod resource;

pub use format::{format_containers, format_images, format_networks, format_volumes};
pub use resource::{
    ContainerRecord, ImageRecord, NetworkRecord, ResourceGroup, VolumeRecord,
    COMPOSE_PROJECT_LABEL, STANDALONE_GROUP,
};
