//! Manifest discovery and parsing: recognizes a project's dependency
//! manifests (explicit pantry/launchpad/pkgx YAMLs, plus inferred signals
//! like `package.json` or `Cargo.toml`) and emits a normalized requirement
//! list for the resolver to consume.

use std::collections::BTreeMap;
use std::io;
use thiserror::Error;

pub mod env_subst;
pub mod front_matter;
pub mod inferred;
pub mod pantry_yaml;
pub mod sniffer;

pub use sniffer::{find_project_root, sniff, EXPLICIT_MANIFEST_NAMES};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Scope {
    Local,
    Global,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Source {
    Explicit,
    Inferred,
}

/// A package requirement as emitted by the sniffer. `constraint` is always a
/// normalized string or the literal `"*"` — never an unresolved YAML object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub domain: String,
    pub constraint: String,
    pub scope: Scope,
    pub source: Source,
}

#[derive(Debug, Clone, Default)]
pub struct ServicesInfo {
    pub enabled: bool,
    pub auto_start: Vec<String>,
    pub infer: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SniffResult {
    pub pkgs: Vec<Requirement>,
    pub env: BTreeMap<String, String>,
    pub services: Option<ServicesInfo>,
}

#[derive(Error, Debug)]
pub enum SniffError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("invalid env value: {0}")]
    InvalidEnv(String),
}
