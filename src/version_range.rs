//! Version parsing/comparison and constraint satisfaction (C3's semantics,
//! §3, §4.3, §9).
//!
//! `VersionRange` is modeled as the tagged union the design notes call for
//! rather than reusing a PyPI-flavored version crate: npm-style caret/tilde
//! ranges and non-numeric suffixes like OpenSSL's `1.1.1w` don't fit PEP 440.

use std::cmp::Ordering;
use std::fmt;

/// A dotted version where each component is a numeric prefix plus an
/// optional non-numeric suffix (`1.1.1w` -> `[(1,""), (1,""), (1,"w")]`).
/// Components compare by numeric prefix first, suffix lexicographically
/// only once the numeric prefixes tie.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Version {
    components: Vec<(u64, String)>,
    raw: String,
}

impl Version {
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim().trim_start_matches('v');
        if trimmed.is_empty() {
            return None;
        }
        let mut components: Vec<(u64, String)> = trimmed
            .split('.')
            .map(|part| {
                let digit_len = part.chars().take_while(|c| c.is_ascii_digit()).count();
                let (digits, suffix) = part.split_at(digit_len);
                let numeric = digits.parse().unwrap_or(0);
                (numeric, suffix.to_string())
            })
            .collect();
        if components.is_empty() {
            return None;
        }
        while components.len() < 3 {
            components.push((0, String::new()));
        }
        let raw = components
            .iter()
            .map(|(n, s)| format!("{n}{s}"))
            .collect::<Vec<_>>()
            .join(".");
        Some(Version { components, raw })
    }

    pub fn major(&self) -> u64 {
        self.components[0].0
    }

    pub fn minor(&self) -> u64 {
        self.components.get(1).map(|c| c.0).unwrap_or(0)
    }

    /// The bare major-version number, used to name `ENV/<domain>/v<major>`
    /// symlinks (§4.8 step 4).
    pub fn major_component(&self) -> Option<u64> {
        Some(self.major())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for i in 0..len {
            let a = self.components.get(i).cloned().unwrap_or((0, String::new()));
            let b = other.components.get(i).cloned().unwrap_or((0, String::new()));
            match a.0.cmp(&b.0) {
                Ordering::Equal => match a.1.cmp(&b.1) {
                    Ordering::Equal => continue,
                    ord => return ord,
                },
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ComparisonOp {
    Ge,
    Gt,
    Le,
    Lt,
}

#[derive(Debug, Clone)]
pub enum VersionRange {
    Exact(Version),
    Caret(Version),
    Tilde(Version),
    Comparison(ComparisonOp, Version),
    Range(Version, Version),
    Wildcard,
    Or(Vec<VersionRange>),
}

impl VersionRange {
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if input.is_empty() || input == "*" || input.eq_ignore_ascii_case("latest") {
            return Some(VersionRange::Wildcard);
        }
        if input.contains("||") {
            let ranges = input
                .split("||")
                .map(|part| VersionRange::parse(part.trim()))
                .collect::<Option<Vec<_>>>()?;
            return Some(VersionRange::Or(ranges));
        }
        if let Some(rest) = input.strip_prefix('^') {
            return Some(VersionRange::Caret(Version::parse(rest)?));
        }
        if let Some(rest) = input.strip_prefix('~') {
            return Some(VersionRange::Tilde(Version::parse(rest)?));
        }
        if let Some(rest) = input.strip_prefix(">=") {
            return Some(VersionRange::Comparison(ComparisonOp::Ge, Version::parse(rest.trim())?));
        }
        if let Some(rest) = input.strip_prefix("<=") {
            return Some(VersionRange::Comparison(ComparisonOp::Le, Version::parse(rest.trim())?));
        }
        if let Some(rest) = input.strip_prefix('>') {
            return Some(VersionRange::Comparison(ComparisonOp::Gt, Version::parse(rest.trim())?));
        }
        if let Some(rest) = input.strip_prefix('<') {
            return Some(VersionRange::Comparison(ComparisonOp::Lt, Version::parse(rest.trim())?));
        }
        if let Some(rest) = input.strip_prefix('=') {
            return Some(VersionRange::Exact(Version::parse(rest.trim())?));
        }
        if let Some((lo, hi)) = input.split_once(" - ") {
            return Some(VersionRange::Range(
                Version::parse(lo.trim())?,
                Version::parse(hi.trim())?,
            ));
        }
        if input.contains(['x', 'X']) {
            let prefix: Vec<&str> = input
                .split('.')
                .take_while(|part| !part.eq_ignore_ascii_case("x"))
                .collect();
            if prefix.is_empty() {
                return Some(VersionRange::Wildcard);
            }
            return Some(VersionRange::Caret(Version::parse(&prefix.join("."))?));
        }
        // Bare version, e.g. an `.nvmrc`/`.python-version` file's raw "20" or
        // "22" -> caret-like same-major matching is the right default for a
        // bare constraint, same as the `x.X` branch above.
        Some(VersionRange::Caret(Version::parse(input)?))
    }

    /// npm-style semver satisfaction (§4.3).
    pub fn satisfies(&self, version: &Version) -> bool {
        match self {
            VersionRange::Exact(v) => version == v,
            VersionRange::Caret(v) => version.major() == v.major() && version >= v,
            VersionRange::Tilde(v) => {
                version.major() == v.major() && version.minor() == v.minor() && version >= v
            }
            VersionRange::Comparison(op, v) => match op {
                ComparisonOp::Ge => version >= v,
                ComparisonOp::Gt => version > v,
                ComparisonOp::Le => version <= v,
                ComparisonOp::Lt => version < v,
            },
            VersionRange::Range(lo, hi) => version >= lo && version <= hi,
            VersionRange::Wildcard => true,
            VersionRange::Or(ranges) => ranges.iter().any(|r| r.satisfies(version)),
        }
    }
}

/// Strips the constraint prefixes the registry client needs gone before
/// building a tarball URL, expanding a bare major to `X.0.0` (§4.2).
pub fn normalize_version_for_url(constraint: &str) -> String {
    let stripped = constraint
        .trim()
        .trim_start_matches("^")
        .trim_start_matches('~')
        .trim_start_matches(">=")
        .trim_start_matches("<=")
        .trim_start_matches('>')
        .trim_start_matches('<')
        .trim_start_matches('=')
        .trim_start_matches('v');
    match Version::parse(stripped) {
        Some(version) => version.raw,
        None => stripped.to_string(),
    }
}
