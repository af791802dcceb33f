//! Version Resolver (C3): picks a concrete version for a domain, consulting
//! the lockfile first, then the registry, then conflict policy across
//! multiple requirements for the same domain (§4.3).

use crate::lockfile::Lockfile;
use crate::registry::RegistryClient;
use crate::spec::{PackageRequirement, RequirementSource, ResolvedPackage};
use crate::version_range::{Version, VersionRange};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("no version of {domain} satisfies {constraint}")]
    NoSatisfyingVersion { domain: String, constraint: String },
    #[error("{domain} has no lockfile entry and `frozen` mode was requested")]
    FrozenLockMiss { domain: String },
    #[error("conflicting requirements for {domain} share no satisfying version")]
    Conflict { domain: String },
}

/// Conflict policy across multiple requirements for the same domain within
/// one install (§4.3). `HighestCompatible` is the default per §13.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ResolutionStrategy {
    HighestCompatible,
    Strict,
    FirstWins,
    LastWins,
}

impl Default for ResolutionStrategy {
    fn default() -> Self {
        ResolutionStrategy::HighestCompatible
    }
}

/// Resolves a single domain against every requirement raised for it.
/// `requirements` must be non-empty and share `domain`.
pub fn resolve_domain(
    domain: &str,
    requirements: &[PackageRequirement],
    registry: &RegistryClient,
    lockfile: &Lockfile,
    frozen: bool,
    strategy: ResolutionStrategy,
) -> Result<ResolvedPackage, ResolutionError> {
    if let Some((version, resolved_url, integrity)) = lockfile.locked(domain) {
        let version = Version::parse(version).ok_or_else(|| ResolutionError::NoSatisfyingVersion {
            domain: domain.to_string(),
            constraint: "<lockfile>".to_string(),
        })?;
        let scope = requirements
            .iter()
            .find(|r| r.domain == domain)
            .map(|r| r.scope)
            .unwrap_or(crate::spec::Scope::Local);
        return Ok(ResolvedPackage {
            domain: domain.to_string(),
            version,
            tarball_url: resolved_url.to_string(),
            integrity: integrity.map(str::to_string),
            programs: Vec::new(),
            scope,
            // A locked package's companions were already ordered at the
            // time the lock was written; nothing further to resolve here.
            companions: Vec::new(),
        });
    }
    if frozen {
        return Err(ResolutionError::FrozenLockMiss {
            domain: domain.to_string(),
        });
    }

    // Explicit wins over inferred when both exist for the same domain.
    let explicit: Vec<&PackageRequirement> = requirements
        .iter()
        .filter(|r| matches!(r.source, RequirementSource::Explicit))
        .collect();
    let effective: Vec<&PackageRequirement> = if explicit.is_empty() {
        requirements.iter().collect()
    } else {
        explicit
    };

    let versions = registry.versions(domain).map_err(|_| ResolutionError::NoSatisfyingVersion {
        domain: domain.to_string(),
        constraint: describe(&effective),
    })?;

    let scope = effective.first().map(|r| r.scope).unwrap_or(crate::spec::Scope::Local);

    if let Some(version) = newest_satisfying_all(&versions, &effective) {
        return Ok(finalize(domain, version, scope, registry));
    }

    match strategy {
        ResolutionStrategy::Strict => Err(ResolutionError::Conflict {
            domain: domain.to_string(),
        }),
        ResolutionStrategy::HighestCompatible | ResolutionStrategy::FirstWins => {
            let req = effective.first().ok_or_else(|| ResolutionError::Conflict {
                domain: domain.to_string(),
            })?;
            newest_satisfying_all(&versions, &[req])
                .map(|v| finalize(domain, v, scope, registry))
                .ok_or_else(|| ResolutionError::NoSatisfyingVersion {
                    domain: domain.to_string(),
                    constraint: describe(&[req]),
                })
        }
        ResolutionStrategy::LastWins => {
            let req = effective.last().ok_or_else(|| ResolutionError::Conflict {
                domain: domain.to_string(),
            })?;
            newest_satisfying_all(&versions, &[req])
                .map(|v| finalize(domain, v, scope, registry))
                .ok_or_else(|| ResolutionError::NoSatisfyingVersion {
                    domain: domain.to_string(),
                    constraint: describe(&[req]),
                })
        }
    }
}

fn newest_satisfying_all(versions: &[Version], requirements: &[&PackageRequirement]) -> Option<Version> {
    versions
        .iter()
        .find(|candidate| {
            requirements
                .iter()
                .all(|req| constraint_satisfies(&req.constraint, candidate))
        })
        .cloned()
}

fn constraint_satisfies(constraint: &VersionRange, candidate: &Version) -> bool {
    constraint.satisfies(candidate)
}

fn finalize(domain: &str, version: Version, scope: crate::spec::Scope, registry: &RegistryClient) -> ResolvedPackage {
    let platform = launchpad_relocator::Platform::current().unwrap_or(launchpad_relocator::Platform::Linux);
    let arch = launchpad_relocator::Arch::current().unwrap_or(launchpad_relocator::Arch::X86_64);
    let tarball_url = registry.tarball_url(
        domain,
        &version.to_string(),
        platform,
        arch,
        crate::registry::ArchiveFormat::TarXz,
    );
    let integrity = registry.fetch_sha256_sidecar(&tarball_url);
    let companions = registry.fetch_companions(domain);
    ResolvedPackage {
        domain: domain.to_string(),
        version,
        tarball_url,
        integrity,
        programs: Vec::new(),
        scope,
        companions,
    }
}

/// Orders resolved packages so that every domain a package names in
/// `companions` materializes before it (§5's one ordering guarantee across
/// packages). Falls back to leaving the remainder in its original relative
/// order if the declared companions form a cycle.
pub fn order_companions_first(packages: Vec<ResolvedPackage>) -> Vec<ResolvedPackage> {
    let present: std::collections::HashSet<String> = packages.iter().map(|p| p.domain.clone()).collect();
    let mut remaining: Vec<ResolvedPackage> = packages;
    let mut ordered: Vec<ResolvedPackage> = Vec::new();
    let mut placed: std::collections::HashSet<String> = std::collections::HashSet::new();

    while !remaining.is_empty() {
        let before = remaining.len();
        let mut next_remaining = Vec::new();
        for package in remaining {
            let ready = package
                .companions
                .iter()
                .all(|c| !present.contains(c.as_str()) || placed.contains(c));
            if ready {
                placed.insert(package.domain.clone());
                ordered.push(package);
            } else {
                next_remaining.push(package);
            }
        }
        remaining = next_remaining;
        if remaining.len() == before {
            // Cycle among declared companions: append the rest as-is.
            ordered.extend(remaining);
            break;
        }
    }
    ordered
}

fn describe(requirements: &[&PackageRequirement]) -> String {
    requirements
        .iter()
        .map(|r| format!("{:?}", r.constraint))
        .collect::<Vec<_>>()
        .join(" & ")
}
