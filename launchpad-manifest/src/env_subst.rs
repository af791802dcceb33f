//! `{{home}}`/`{{srcroot}}` substitution and dollar-validation for the
//! sniffer's `env` block (§3, §4.1).

use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum SubstError {
    #[error("invalid `$` usage in env value {0:?}: a bare `$` must be followed by an identifier")]
    InvalidDollar(String),
}

fn ident_start() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_]\w*").unwrap())
}

/// Replaces `{{home}}` and `{{srcroot}}`, then rejects any `$` not followed
/// by a well-formed identifier (bare `$VAR` or braced `${VAR}`).
pub fn substitute(value: &str, home: &Path, srcroot: &Path) -> Result<String, SubstError> {
    let substituted = value
        .replace("{{home}}", &home.display().to_string())
        .replace("{{srcroot}}", &srcroot.display().to_string());
    validate_dollar(&substituted)?;
    Ok(substituted)
}

fn validate_dollar(value: &str) -> Result<(), SubstError> {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let rest = &value[i + 1..];
            if let Some(stripped) = rest.strip_prefix('{') {
                let end = stripped
                    .find('}')
                    .ok_or_else(|| SubstError::InvalidDollar(value.to_string()))?;
                let ident = &stripped[..end];
                if ident_start().find(ident).map(|m| m.len()) != Some(ident.len()) {
                    return Err(SubstError::InvalidDollar(value.to_string()));
                }
            } else {
                let matched = ident_start()
                    .find(rest)
                    .filter(|m| m.start() == 0)
                    .ok_or_else(|| SubstError::InvalidDollar(value.to_string()))?;
                i += matched.len();
            }
        }
        i += 1;
    }
    Ok(())
}
