//! The pipeline's core data model (§3): requirements flow in from the
//! sniffer, resolve into concrete packages, and those packages drive the
//! download/extract/relocate/materialize stages.

use crate::version_range::{Version, VersionRange};
use launchpad_manifest::{Requirement as SniffedRequirement, Scope as SniffedScope, Source as SniffedSource};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum Scope {
    Local,
    Global,
}

impl From<SniffedScope> for Scope {
    fn from(scope: SniffedScope) -> Self {
        match scope {
            SniffedScope::Local => Scope::Local,
            SniffedScope::Global => Scope::Global,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum RequirementSource {
    Explicit,
    Inferred,
}

impl From<SniffedSource> for RequirementSource {
    fn from(source: SniffedSource) -> Self {
        match source {
            SniffedSource::Explicit => RequirementSource::Explicit,
            SniffedSource::Inferred => RequirementSource::Inferred,
        }
    }
}

/// A package requirement with its constraint parsed into a [`VersionRange`].
#[derive(Debug, Clone)]
pub struct PackageRequirement {
    pub domain: String,
    pub constraint: VersionRange,
    pub scope: Scope,
    pub source: RequirementSource,
}

impl PackageRequirement {
    pub fn from_sniffed(req: &SniffedRequirement) -> anyhow::Result<Self> {
        let constraint = VersionRange::parse(&req.constraint)
            .ok_or_else(|| anyhow::anyhow!("invalid version constraint {:?}", req.constraint))?;
        Ok(PackageRequirement {
            domain: req.domain.clone(),
            constraint,
            scope: req.scope.into(),
            source: req.source.into(),
        })
    }
}

/// A resolved, concrete package ready for download (§3).
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub domain: String,
    pub version: Version,
    pub tarball_url: String,
    pub integrity: Option<String>,
    pub programs: Vec<String>,
    pub scope: Scope,
    /// Domains this package declares as implicit extra requirements,
    /// installed before it (§5).
    pub companions: Vec<String>,
}

impl ResolvedPackage {
    pub fn scope_is_global(&self) -> bool {
        matches!(self.scope, Scope::Global)
    }
}
