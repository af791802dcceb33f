//! CLI surface (§6): `install`, `dev:dump`, `dev:find-project-root`,
//! `dev:md5`, `cache:clear`.

use crate::download::{self, DownloadPolicy, DownloadRequest};
use crate::environment::{self, MaterializeOptions};
use crate::lockfile::{Lockfile, LockfileEntry};
use crate::project::{self, ProjectIdentity};
use crate::registry::RegistryClient;
use crate::resolver::{self, ResolutionStrategy};
use crate::shell::{self, ActivationPlan};
use crate::spec::PackageRequirement;
use crate::utils;
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "launchpad", about = "Per-project runtime and package environment manager")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Installs every requirement sniffed from the given project paths.
    Install { paths: Vec<PathBuf> },
    /// Emits activation shell code for the project rooted at `dir`.
    #[command(name = "dev:dump")]
    DevDump { dir: PathBuf },
    /// Walks upward from `dir` to find the nearest recognized manifest.
    #[command(name = "dev:find-project-root")]
    DevFindProjectRoot { dir: PathBuf },
    /// Prints the first 8 hex characters of a file's MD5 digest; `-` reads stdin.
    #[command(name = "dev:md5")]
    DevMd5 { file: String },
    /// Clears the shared download/archive cache.
    #[command(name = "cache:clear")]
    CacheClear,
}

/// Runs the parsed CLI. Exit codes per §6: 0 success, 1 unrecoverable
/// install error; `dev:dump` never returns a non-zero exit from install
/// failures in shell-output mode (§7).
pub fn run_cli(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Command::Install { paths } => run_install(&paths),
        Command::DevDump { dir } => run_dev_dump(&dir),
        Command::DevFindProjectRoot { dir } => run_find_project_root(&dir),
        Command::DevMd5 { file } => run_dev_md5(&file),
        Command::CacheClear => run_cache_clear(),
    }
}

fn run_install(paths: &[PathBuf]) -> anyhow::Result<i32> {
    let mut overall_ok = true;
    for path in paths {
        match install_one_project(path) {
            Ok(_) => info!("✅ Environment activated for {}", path.display()),
            Err(err) => {
                overall_ok = false;
                warn!("❌ Environment activation failed for {}: {:#}", path.display(), err);
            }
        }
    }
    Ok(if overall_ok { 0 } else { 1 })
}

fn install_one_project(project_dir: &Path) -> anyhow::Result<launchpad_manifest::SniffResult> {
    let home = crate::env_config::home().context("HOME is not set")?;
    let sniffed = launchpad_manifest::sniff(project_dir, &home)
        .context("Failed to sniff project manifests")?;
    let registry = RegistryClient::new();

    // Short names a user writes by hand in an explicit manifest (`node`,
    // `postgres`) are normalized to their canonical domain up front (§9's
    // closing note), so every later stage — readiness, resolver, lockfile —
    // only ever sees the one true domain key for a package.
    let mut by_domain: HashMap<String, Vec<PackageRequirement>> = HashMap::new();
    for requirement in &sniffed.pkgs {
        let mut requirement = PackageRequirement::from_sniffed(requirement)?;
        requirement.domain = registry.resolve_name(&requirement.domain);
        by_domain.entry(requirement.domain.clone()).or_default().push(requirement);
    }

    let identity = ProjectIdentity::compute(project_dir, None);
    let env_root = project::env_root(&identity)?;
    let global_env_root = project::global_env_root()?;
    std::fs::create_dir_all(&env_root)?;
    let lockfile = Lockfile::load(project_dir)?;

    // LAUNCHPAD_SKIP_NETWORK forces every domain to resolve from the
    // lockfile alone; a lock miss becomes a hard error instead of a
    // registry round trip (§4.3's frozen mode).
    let frozen = crate::env_config::skip_network();

    // Drift between the lockfile and what's actually on disk (§4.4) is
    // informational outside frozen mode — a fresh clone with a lockfile but
    // an empty env is expected, not an error — but frozen mode promises
    // exact reproduction of the lock, so drift there is fatal.
    let installed = environment::installed_versions(&env_root);
    let drift = lockfile.validate(&installed);
    if !drift.is_clean() {
        if frozen {
            anyhow::bail!(
                "lockfile drift detected in frozen mode: missing={:?}, version_mismatch={:?}",
                drift.missing,
                drift.version_mismatch
            );
        }
        warn!(
            "lockfile drift: missing={:?}, version_mismatch={:?}",
            drift.missing, drift.version_mismatch
        );
    }

    // C9 short-circuits the pipeline per domain (§4.9, §4.8 step 3): a
    // requirement already satisfied in this env or the global env needs no
    // resolve/download/materialize work at all. Outdated detection (§4.9)
    // compares against the lockfile's last-resolved version rather than a
    // fresh registry call — a live lookup here would pay the exact network
    // round trip the short-circuit exists to avoid. A domain with no lock
    // entry has no cheap outdated signal and is treated as not outdated;
    // see DESIGN.md's Open Question note. System-PATH satisfaction can
    // never be outdated (§4.9) and always skips.
    let mut oracle = crate::readiness::ReadinessOracle::new();
    by_domain.retain(|domain, requirements| {
        let Some(constraint) = requirements.first().map(|r| r.constraint.clone()) else {
            return true;
        };
        let key = format!("{identity}:{domain}");
        let newest_known = lockfile
            .locked(domain)
            .and_then(|(version, _, _)| crate::version_range::Version::parse(version));
        let result = oracle.check(&key, requirements.len(), domain, &constraint, &env_root, &global_env_root, newest_known.as_ref());
        if result.is_ready() && result.outdated.is_none() {
            info!("{} already satisfies {}, skipping", identity, domain);
            false
        } else {
            true
        }
    });

    let mut resolved = Vec::new();
    for (domain, requirements) in &by_domain {
        let package = resolver::resolve_domain(domain, requirements, &registry, &lockfile, frozen, ResolutionStrategy::default())?;
        resolved.push(package);
    }

    // Companions are resolved one level deep: a package's companions become
    // extra, unconstrained requirements, but a companion's own companions
    // are not chased (§5 only guarantees companions install before the
    // package that names them, not a full transitive closure).
    let already_requested: std::collections::HashSet<String> = by_domain.keys().cloned().collect();
    let mut companion_domains: Vec<String> = Vec::new();
    for package in &resolved {
        for companion in &package.companions {
            if !already_requested.contains(companion) && !companion_domains.contains(companion) {
                companion_domains.push(companion.clone());
            }
        }
    }
    for domain in &companion_domains {
        let requirement = PackageRequirement {
            domain: domain.clone(),
            constraint: crate::version_range::VersionRange::Wildcard,
            scope: crate::spec::Scope::Local,
            source: crate::spec::RequirementSource::Inferred,
        };
        let package = resolver::resolve_domain(domain, &[requirement], &registry, &lockfile, frozen, ResolutionStrategy::default())?;
        resolved.push(package);
    }
    let resolved = resolver::order_companions_first(resolved);

    let cache_dir = utils::download_cache_dir()?;
    let requests: Vec<DownloadRequest> = resolved
        .iter()
        .map(|p| DownloadRequest {
            domain: p.domain.clone(),
            url: p.tarball_url.clone(),
            integrity: p.integrity.clone(),
        })
        .collect();
    // An archive the shared cache already has for this exact (domain, url)
    // is reused rather than re-fetched (§4.5's resume step); packages the
    // checkpoint already marks installed are separately skipped by the
    // materializer below without even reaching this lookup.
    let archives = download::download_all(&requests, &cache_dir, DownloadPolicy::default(), |domain| {
        let url = requests.iter().find(|r| r.domain == domain).map(|r| r.url.as_str())?;
        download::already_cached(&cache_dir, domain, url)
    })?;

    let stub_dir = PathBuf::from("/usr/local/bin");
    let options = MaterializeOptions {
        env_root: &env_root,
        global_env_root: &global_env_root,
        global_stub_dir: &stub_dir,
    };
    environment::materialize(&resolved, &archives, &options)?;

    let mut lockfile = lockfile;
    for package in &resolved {
        lockfile.insert(LockfileEntry {
            name: package.domain.clone(),
            version: package.version.to_string(),
            resolved: package.tarball_url.clone(),
            integrity: package.integrity.clone(),
            dev: false,
            optional: false,
            dependencies: Default::default(),
        });
    }
    lockfile.write(project_dir)?;
    utils::mark_global_refresh_needed().ok();
    Ok(sniffed)
}

fn run_dev_dump(dir: &Path) -> anyhow::Result<i32> {
    // Shell-output mode never surfaces a non-zero exit from install
    // failures (§7): failures are logged to stderr, activation code still
    // prints to stdout so the shell stays functional.
    let sniffed = match install_one_project(dir) {
        Ok(sniffed) => Some(sniffed),
        Err(err) => {
            eprintln!("launchpad: install failed, continuing with current environment: {err:#}");
            None
        }
    };
    let identity = ProjectIdentity::compute(dir, None);
    let env_root = project::env_root(&identity)?;
    let global_env_root = project::global_env_root()?;

    // §4.10 bullet 3: the `*LIBRARY_PATH` vars cover every domain actually
    // on disk, not just what this call happened to install — a package
    // satisfied by an earlier run (or the global env) still needs its
    // `lib`/`lib64` on the path.
    let mut library_paths = environment::discover_library_paths(&env_root);
    library_paths.extend(environment::discover_library_paths(&global_env_root));

    let mut plan = ActivationPlan::new(identity, dir.to_path_buf(), &env_root, &global_env_root)
        .with_library_paths(library_paths);
    if let Some(sniffed) = &sniffed {
        // §4.10 bullet 4: "plus every key from the sniffer's env block".
        let extra_exports: Vec<(String, String)> =
            sniffed.env.iter().map(|(key, value)| (key.clone(), value.clone())).collect();
        plan = plan.with_extra_exports(extra_exports);
    }
    println!("{}", plan.render());
    // The chpwd hook is itself shell code, so it rides along with the
    // activation plan on the one channel §6 defines for emitting it; a user
    // opting out via LAUNCHPAD_DISABLE_SHELL_INTEGRATION gets bare PATH
    // exports with no re-entrant hook installed.
    if !crate::env_config::shell_integration_disabled() {
        println!("{}", shell::render_chpwd_hook(env!("CARGO_PKG_NAME"), 10));
    }
    Ok(0)
}

fn run_find_project_root(dir: &Path) -> anyhow::Result<i32> {
    match launchpad_manifest::find_project_root(dir) {
        Some(root) => {
            println!("{}", root.display());
            Ok(0)
        }
        None => {
            eprintln!("launchpad: no recognized manifest found upward from {}", dir.display());
            Ok(1)
        }
    }
}

fn run_dev_md5(file: &str) -> anyhow::Result<i32> {
    let data = if file == "-" {
        let mut buffer = Vec::new();
        std::io::stdin().read_to_end(&mut buffer)?;
        buffer
    } else {
        fs_err::read(file)?
    };
    println!("{}", project::md5_hex8(&data));
    Ok(0)
}

fn run_cache_clear() -> anyhow::Result<i32> {
    let dir = utils::cache_dir()?;
    if dir.is_dir() {
        fs_err::remove_dir_all(&dir)?;
    }
    Ok(0)
}
