pub mod commands;
pub mod diff;
pub mod k8s;
pub mod materialize;
pub mod output;
pub mod source;
pub mod telemetry;
pub mod workspace;
pub mod yaml;
