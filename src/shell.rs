//! Shell Integrator (C10, §4.10): builds an activation plan as data, then
//! renders it to POSIX shell — "treat it as a compiler" (§9) keeps this
//! testable without ever spawning a shell.

use crate::project::ProjectIdentity;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ActivationPlan {
    pub project_identity: ProjectIdentity,
    pub project_dir: PathBuf,
    pub path_prepend: Vec<PathBuf>,
    pub library_path_prepend: Vec<PathBuf>,
    pub extra_exports: Vec<(String, String)>,
}

const SYSTEM_PATH_FALLBACK: &str = "/usr/bin:/bin:/usr/sbin:/sbin";

impl ActivationPlan {
    pub fn new(project_identity: ProjectIdentity, project_dir: PathBuf, env_root: &Path, global_env_root: &Path) -> Self {
        let path_prepend = vec![
            env_root.join("bin"),
            env_root.join("sbin"),
            global_env_root.join("bin"),
            global_env_root.join("sbin"),
        ];
        ActivationPlan {
            project_identity,
            project_dir,
            path_prepend,
            library_path_prepend: Vec::new(),
            extra_exports: Vec::new(),
        }
    }

    pub fn with_library_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.library_path_prepend = paths;
        self
    }

    pub fn with_extra_exports(mut self, exports: Vec<(String, String)>) -> Self {
        self.extra_exports = exports;
        self
    }

    /// Renders the activation/deactivation pair as POSIX shell, matching the
    /// contract of §4.10 exactly: original-PATH capture, prepended PATH and
    /// `*LIBRARY_PATH`, a PWD-prefixed deactivation function, recursion
    /// guard, and a single stderr line on deactivation.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let project_dir = self.project_dir.display();
        let path_list = join_paths(&self.path_prepend);
        let lib_path_list = join_paths(&self.library_path_prepend);
        let hash = shell_safe_ident(&self.project_identity.to_string());

        writeln!(out, "if [ \"$_LAUNCHPAD_ACTIVE_{hash}\" != \"1\" ]; then").unwrap();
        writeln!(out, "  _LAUNCHPAD_ACTIVE_{hash}=1").unwrap();
        writeln!(out, "  export _LAUNCHPAD_ACTIVE_{hash}").unwrap();
        writeln!(out, "  if [ -z \"$LAUNCHPAD_ORIGINAL_PATH\" ]; then").unwrap();
        writeln!(out, "    export LAUNCHPAD_ORIGINAL_PATH=\"${{PATH:-{fallback}}}\"", fallback = SYSTEM_PATH_FALLBACK).unwrap();
        writeln!(out, "  fi").unwrap();
        writeln!(out, "  export _LAUNCHPAD_SAVED_DYLD_LIBRARY_PATH=\"$DYLD_LIBRARY_PATH\"").unwrap();
        writeln!(out, "  export _LAUNCHPAD_SAVED_DYLD_FALLBACK_LIBRARY_PATH=\"$DYLD_FALLBACK_LIBRARY_PATH\"").unwrap();
        writeln!(out, "  export _LAUNCHPAD_SAVED_LD_LIBRARY_PATH=\"$LD_LIBRARY_PATH\"").unwrap();
        writeln!(out, "  export PATH=\"{path_list}:$LAUNCHPAD_ORIGINAL_PATH\"").unwrap();
        if !lib_path_list.is_empty() {
            writeln!(out, "  export DYLD_LIBRARY_PATH=\"{lib_path_list}:$DYLD_LIBRARY_PATH\"").unwrap();
            writeln!(out, "  export DYLD_FALLBACK_LIBRARY_PATH=\"{lib_path_list}:$DYLD_FALLBACK_LIBRARY_PATH\"").unwrap();
            writeln!(out, "  export LD_LIBRARY_PATH=\"{lib_path_list}:$LD_LIBRARY_PATH\"").unwrap();
        }
        writeln!(out, "  export LAUNCHPAD_ENV_BIN_PATH=\"{}\"", self.path_prepend.first().map(|p| p.display().to_string()).unwrap_or_default()).unwrap();
        writeln!(out, "  export LAUNCHPAD_PROJECT_DIR=\"{project_dir}\"").unwrap();
        writeln!(out, "  export LAUNCHPAD_PROJECT_HASH=\"{}\"", self.project_identity).unwrap();
        for (key, value) in &self.extra_exports {
            writeln!(out, "  export {key}=\"{value}\"").unwrap();
        }
        writeln!(out, "fi").unwrap();
        out.push('\n');

        writeln!(out, "_launchpad_dev_try_bye() {{").unwrap();
        writeln!(out, "  case \"$PWD/\" in").unwrap();
        writeln!(out, "    \"{project_dir}\"/*) return 0 ;;").unwrap();
        writeln!(out, "  esac").unwrap();
        writeln!(out, "  if [ \"$_LAUNCHPAD_ACTIVE_{hash}\" = \"1\" ]; then").unwrap();
        writeln!(out, "    export PATH=\"$LAUNCHPAD_ORIGINAL_PATH\"").unwrap();
        writeln!(out, "    export DYLD_LIBRARY_PATH=\"$_LAUNCHPAD_SAVED_DYLD_LIBRARY_PATH\"").unwrap();
        writeln!(out, "    export DYLD_FALLBACK_LIBRARY_PATH=\"$_LAUNCHPAD_SAVED_DYLD_FALLBACK_LIBRARY_PATH\"").unwrap();
        writeln!(out, "    export LD_LIBRARY_PATH=\"$_LAUNCHPAD_SAVED_LD_LIBRARY_PATH\"").unwrap();
        writeln!(out, "    unset LAUNCHPAD_ORIGINAL_PATH LAUNCHPAD_ENV_BIN_PATH LAUNCHPAD_PROJECT_DIR LAUNCHPAD_PROJECT_HASH").unwrap();
        writeln!(out, "    unset _LAUNCHPAD_ACTIVE_{hash}").unwrap();
        writeln!(out, "    echo \"dev environment deactivated\" >&2").unwrap();
        writeln!(out, "  fi").unwrap();
        writeln!(out, "}}").unwrap();
        out
    }
}

/// POSIX variable names may only contain `[A-Za-z0-9_]`; project identities
/// can contain `-` from the dep-file-hash suffix (§3).
fn shell_safe_ident(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(":")
}

/// Emits the `chpwd`/`PROMPT_COMMAND` hook installed once per shell session
/// (§4.10's last two bullets): it walks upward from PWD for a recognized
/// manifest, re-invokes the installer with a bounded timeout, and guards
/// against re-entry and duplicate consecutive activations.
pub fn render_chpwd_hook(launchpad_binary: &str, timeout_secs: u64) -> String {
    let manifest_names = launchpad_manifest::EXPLICIT_MANIFEST_NAMES.join(" ");
    format!(
        r#"_launchpad_chpwd_hook() {{
  if [ -n "$_LAUNCHPAD_HOOK_RUNNING" ]; then
    return 0
  fi
  if [ "$_LAUNCHPAD_LAST_PWD" = "$PWD" ]; then
    return 0
  fi
  _LAUNCHPAD_LAST_PWD="$PWD"
  _LAUNCHPAD_HOOK_RUNNING=1
  _launchpad_refresh_marker="${{XDG_CACHE_HOME:-$HOME/.cache}}/launchpad/shell_cache/global_refresh_needed"
  if [ -f "$_launchpad_refresh_marker" ]; then
    rm -f "$_launchpad_refresh_marker"
    hash -r 2>/dev/null || rehash 2>/dev/null || true
  fi
  dir="$PWD"
  found=""
  while [ -n "$dir" ]; do
    for name in {manifest_names}; do
      if [ -f "$dir/$name" ]; then
        found="$dir"
        break 2
      fi
    done
    [ "$dir" = "/" ] && break
    dir=$(dirname "$dir")
  done
  if [ -n "$found" ]; then
    plan=$(timeout {timeout_secs}s {binary} dev:dump "$found" 2>/tmp/launchpad-hook-err.$$)
    status=$?
    if [ $status -eq 0 ] && [ -n "$plan" ]; then
      eval "$plan"
    else
      echo "launchpad: activation timed out or failed, leaving PATH unchanged" >&2
    fi
    rm -f /tmp/launchpad-hook-err.$$
  else
    _launchpad_dev_try_bye
  fi
  unset _LAUNCHPAD_HOOK_RUNNING
}}
"#,
        manifest_names = manifest_names,
        timeout_secs = timeout_secs,
        binary = launchpad_binary,
    )
}
