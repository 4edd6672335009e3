pub mod clean;
pub mod cli;
pub mod commands;
pub mod config;
pub mod k8s;
pub mod migrate;
pub mod report;
pub mod selection;
pub mod telemetry;
