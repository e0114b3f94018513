// ABOUTME: Application wiring - the facade that owns every controller and the shared engine slot

pub mod dockmate;

pub use dockmate::Dockmate;
