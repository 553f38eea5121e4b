// tests/integration/main.rs

#[path = "../common/mod.rs"]
mod common;

mod cli_and_logging;
mod config;
mod dag_loader;
mod graph_scenarios;
mod remote_cache;
mod staleness;
