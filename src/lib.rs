pub use cli::{run_cli, Cli, Command};

mod archive;
mod checkpoint;
mod cli;
mod download;
mod env_config;
mod environment;
mod lockfile;
mod project;
mod readiness;
mod registry;
mod resolver;
mod shell;
mod spec;
mod utils;
mod version_range;

pub use env_config::init_logging;
