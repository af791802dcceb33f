//! Readiness Oracle (C9, §4.9): decides whether a requirement is already
//! satisfied in this env, the global env, or on system PATH.

use crate::version_range::{Version, VersionRange};
use std::collections::HashMap;
use std::io::Read as _;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::debug;
use wait_timeout::ChildExt;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Satisfaction {
    ThisEnv,
    Global,
    System,
}

#[derive(Debug, Clone)]
pub struct ReadinessResult {
    pub satisfaction: Option<Satisfaction>,
    pub outdated: Option<Version>,
}

impl ReadinessResult {
    pub fn is_ready(&self) -> bool {
        self.satisfaction.is_some()
    }

    fn missing() -> Self {
        ReadinessResult {
            satisfaction: None,
            outdated: None,
        }
    }
}

/// Maps a registry domain to the system commands worth probing (§4.9 step 3).
fn system_commands_for(domain: &str) -> &'static [&'static str] {
    match domain {
        "bun.sh" => &["bun"],
        "nodejs.org" => &["node"],
        "python.org" => &["python3", "python"],
        "git-scm.org" => &["git"],
        "deno.land" => &["deno"],
        "ruby-lang.org" => &["ruby"],
        _ => &[],
    }
}

const SYSTEM_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const CACHE_TTL: Duration = Duration::from_secs(5);

pub struct ReadinessOracle {
    cache: HashMap<(String, usize), (Instant, ReadinessResult)>,
}

impl Default for ReadinessOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessOracle {
    pub fn new() -> Self {
        ReadinessOracle { cache: HashMap::new() }
    }

    /// `key` should already fold in project identity and scope; this caches
    /// keyed by `(key, requirement_count)` with a 5s TTL (§4.9).
    pub fn check(
        &mut self,
        key: &str,
        requirement_count: usize,
        domain: &str,
        constraint: &VersionRange,
        env_root: &Path,
        global_env_root: &Path,
        newest_satisfying: Option<&Version>,
    ) -> ReadinessResult {
        let cache_key = (key.to_string(), requirement_count);
        if let Some((stamped_at, cached)) = self.cache.get(&cache_key) {
            if stamped_at.elapsed() < CACHE_TTL {
                return cached.clone();
            }
        }
        let result = self.evaluate(domain, constraint, env_root, global_env_root, newest_satisfying);
        self.cache.insert(cache_key, (Instant::now(), result.clone()));
        result
    }

    fn evaluate(
        &self,
        domain: &str,
        constraint: &VersionRange,
        env_root: &Path,
        global_env_root: &Path,
        newest_satisfying: Option<&Version>,
    ) -> ReadinessResult {
        if let Some(version) = installed_satisfying(env_root, domain, constraint) {
            return finish(version, Satisfaction::ThisEnv, newest_satisfying);
        }
        if let Some(version) = installed_satisfying(global_env_root, domain, constraint) {
            return finish(version, Satisfaction::Global, newest_satisfying);
        }
        if probe_system(domain, constraint).is_some() {
            // System satisfaction cannot trigger "outdated" (§4.9).
            return ReadinessResult {
                satisfaction: Some(Satisfaction::System),
                outdated: None,
            };
        }
        ReadinessResult::missing()
    }
}

fn finish(version: Version, satisfaction: Satisfaction, newest_satisfying: Option<&Version>) -> ReadinessResult {
    let outdated = newest_satisfying
        .filter(|newest| **newest > version)
        .cloned();
    ReadinessResult {
        satisfaction: Some(satisfaction),
        outdated,
    }
}

/// Scans `ENV/<domain>/v*/` for the newest installed version satisfying
/// `constraint` (§4.9 steps 1–2).
fn installed_satisfying(env_root: &Path, domain: &str, constraint: &VersionRange) -> Option<Version> {
    let domain_dir = env_root.join(domain);
    let entries = std::fs::read_dir(&domain_dir).ok()?;
    let mut best: Option<Version> = None;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(raw) = name.strip_prefix('v') else { continue };
        // Skip the bare-major symlinks (`v22`) in favor of full versions
        // like `v22.4.1`, which always also exist alongside them.
        if !raw.contains('.') {
            continue;
        }
        let Some(version) = Version::parse(raw) else { continue };
        if !constraint.satisfies(&version) {
            continue;
        }
        if best.as_ref().map(|b| version > *b).unwrap_or(true) {
            best = Some(version);
        }
    }
    best
}

fn probe_system(domain: &str, constraint: &VersionRange) -> Option<Version> {
    for command_name in system_commands_for(domain) {
        let Some(version) = run_version_probe(command_name) else { continue };
        if constraint.satisfies(&version) {
            return Some(version);
        }
    }
    None
}

/// Runs `<command_name> --version` under an actual bounded wait (§4.9, §5's
/// "all subprocesses are wrapped in a portable timeout"): a hung binary is
/// killed at the deadline rather than blocking `output()` indefinitely.
fn run_version_probe(command_name: &str) -> Option<Version> {
    let mut child = Command::new(command_name)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;
    match child.wait_timeout(SYSTEM_PROBE_TIMEOUT).ok()? {
        Some(_status) => {}
        None => {
            debug!("{} --version exceeded probe timeout, killing it", command_name);
            let _ = child.kill();
            let _ = child.wait();
            return None;
        }
    }
    let mut stdout = String::new();
    child.stdout.take()?.read_to_string(&mut stdout).ok()?;
    let candidate = stdout.split_whitespace().find(|token| token.chars().any(|c| c.is_ascii_digit()))?;
    Version::parse(candidate.trim_start_matches('v'))
}
