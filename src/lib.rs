// ABOUTME: Library crate for dockmate exposing the watch, log and terminal subsystems for the CLI and tests

#![allow(missing_docs)]

pub mod app;
pub mod cli;
pub mod config;
pub mod docker;
pub mod interactive;
pub mod models;
pub mod publish;
pub mod watch;
