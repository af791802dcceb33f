//! Small filesystem helpers shared across the pipeline.

use crate::env_config;
use anyhow::Context;
use fs_err as fs;
use std::path::PathBuf;

/// `${XDG_CACHE_HOME:-$HOME/.cache}/launchpad`, used for the download cache
/// and the shell refresh marker (§6's
/// `~/.cache/launchpad/shell_cache/global_refresh_needed`). Deliberately
/// does not use `dirs::cache_dir()`: on macOS that resolves to
/// `~/Library/Caches`, which would diverge from the path the rendered
/// `chpwd` hook (`shell::render_chpwd_hook`) reads in plain POSIX shell.
/// Honors `LAUNCHPAD_TEST_HOME` the same way `project::data_home` does, so
/// tests never touch the real system cache directory.
pub fn cache_dir() -> anyhow::Result<PathBuf> {
    if let Some(test_home) = env_config::test_home() {
        return Ok(test_home.join(".cache").join(env!("CARGO_PKG_NAME")));
    }
    if let Some(xdg) = env_config::xdg_cache_home() {
        return Ok(xdg.join(env!("CARGO_PKG_NAME")));
    }
    let home = env_config::home().context("System needs to have a home directory")?;
    Ok(home.join(".cache").join(env!("CARGO_PKG_NAME")))
}

pub fn download_cache_dir() -> anyhow::Result<PathBuf> {
    Ok(cache_dir()?.join("downloads"))
}

pub fn shell_cache_dir() -> anyhow::Result<PathBuf> {
    Ok(cache_dir()?.join("shell_cache"))
}

/// Touches the marker the shell hook checks for "new binaries may exist,
/// consider rehashing" after a global install. The hook itself (rendered by
/// [`crate::shell::render_chpwd_hook`]) clears the marker once it has acted
/// on it.
pub fn mark_global_refresh_needed() -> anyhow::Result<()> {
    let dir = shell_cache_dir()?;
    fs::create_dir_all(&dir)?;
    fs::write(dir.join("global_refresh_needed"), b"")?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn cache_dir_ends_with_package_name() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = cache_dir().unwrap();
        assert!(dir.ends_with(env!("CARGO_PKG_NAME")));
    }

    #[test]
    fn cache_dir_matches_the_chpwd_hooks_xdg_fallback_on_every_platform() {
        // The rendered hook always reads
        // "${XDG_CACHE_HOME:-$HOME/.cache}/launchpad/...", so the Rust side
        // must land in that exact directory regardless of platform-specific
        // conventions like macOS's `~/Library/Caches`.
        let _guard = ENV_LOCK.lock().unwrap();
        env::remove_var("XDG_CACHE_HOME");
        env::set_var("HOME", "/home/example");
        let dir = cache_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/home/example/.cache/launchpad"));
        env::remove_var("HOME");
    }

    #[test]
    fn cache_dir_honors_xdg_cache_home_override() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("XDG_CACHE_HOME", "/custom/cache");
        let dir = cache_dir().unwrap();
        assert_eq!(dir, PathBuf::from("/custom/cache/launchpad"));
        env::remove_var("XDG_CACHE_HOME");
    }
}
