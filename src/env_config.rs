//! Centralizes every `std::env` read named in §6 so tests can override the
//! effective home directory via `LAUNCHPAD_TEST_HOME` without touching
//! global state anywhere else.

use std::env;
use std::path::PathBuf;

pub fn test_home() -> Option<PathBuf> {
    env::var_os("LAUNCHPAD_TEST_HOME").map(PathBuf::from)
}

pub fn home() -> Option<PathBuf> {
    test_home().or_else(|| env::var_os("HOME").map(PathBuf::from).or_else(dirs::home_dir))
}

pub fn xdg_data_home() -> Option<PathBuf> {
    if test_home().is_some() {
        return None;
    }
    env::var_os("XDG_DATA_HOME").map(PathBuf::from)
}

pub fn xdg_cache_home() -> Option<PathBuf> {
    if test_home().is_some() {
        return None;
    }
    env::var_os("XDG_CACHE_HOME").map(PathBuf::from)
}

pub fn original_path() -> Option<String> {
    env::var("LAUNCHPAD_ORIGINAL_PATH").ok()
}

pub fn shell_integration_disabled() -> bool {
    env::var_os("LAUNCHPAD_DISABLE_SHELL_INTEGRATION").is_some()
}

pub fn verbose() -> bool {
    env::var_os("LAUNCHPAD_VERBOSE").is_some()
}

pub fn skip_network() -> bool {
    env::var_os("LAUNCHPAD_SKIP_NETWORK").is_some()
}

pub fn auto_update_globals() -> bool {
    env::var_os("LAUNCHPAD_AUTO_UPDATE_GLOBALS").is_some()
}

pub fn global_update_ttl_hours() -> u64 {
    env::var("LAUNCHPAD_GLOBAL_UPDATE_TTL_HOURS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(24)
}

pub fn http_proxy() -> Option<String> {
    env::var("HTTPS_PROXY")
        .or_else(|_| env::var("HTTP_PROXY"))
        .ok()
}

pub fn no_proxy() -> Option<String> {
    env::var("NO_PROXY").ok()
}

/// Builds the `ureq` agent every registry/download HTTP call goes through,
/// honoring `HTTP(S)_PROXY` unless `NO_PROXY` is set. `NO_PROXY`'s per-host
/// matching rules are out of scope here; its mere presence disables the
/// proxy entirely, which is conservative rather than silently wrong.
pub fn http_agent() -> ureq::Agent {
    let mut builder = ureq::AgentBuilder::new();
    if no_proxy().is_none() {
        if let Some(proxy_url) = http_proxy() {
            if let Ok(proxy) = ureq::Proxy::new(&proxy_url) {
                builder = builder.proxy(proxy);
            }
        }
    }
    builder.build()
}

/// Initializes the `tracing` subscriber per §10.1: compact/quiet by default,
/// full `RUST_LOG`-driven formatting once the user opts in.
pub fn init_logging() {
    if env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt::init();
        return;
    }
    if verbose() {
        // SAFETY-equivalent to the teacher's pattern: set the env var that
        // tracing_subscriber itself reads, before building the subscriber.
        env::set_var("RUST_LOG", "debug");
        tracing_subscriber::fmt::init();
        return;
    }
    let format = tracing_subscriber::fmt::format()
        .with_level(false)
        .with_target(false)
        .without_time()
        .compact();
    tracing_subscriber::fmt().event_format(format).init();
}
