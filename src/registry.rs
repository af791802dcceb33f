//! Registry Client (C2): alias resolution, version listings, and tarball
//! URL construction against `dist.pkgx.dev` (§4.2, §6).

use crate::version_range::{normalize_version_for_url, Version};
use anyhow::Context;
use launchpad_relocator::{Arch, Platform};
use std::collections::HashMap;
use std::io::Read;
use tracing::debug;

/// Hand-maintained, occasionally-wrong mappings belong in data, not code
/// (§9's closing note) — this is the alias table `resolve_name` consults.
static EMBEDDED_ALIASES: &str = include_str!("../assets/aliases.json");

pub struct RegistryClient {
    base_url: String,
    aliases: HashMap<String, String>,
}

impl Default for RegistryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryClient {
    pub fn new() -> Self {
        RegistryClient {
            base_url: "https://dist.pkgx.dev".to_string(),
            aliases: load_aliases(None),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        RegistryClient {
            base_url: base_url.into(),
            aliases: load_aliases(None),
        }
    }

    /// Merges an override table on top of the embedded aliases; overrides
    /// win on conflicting keys.
    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.aliases.extend(overrides);
        self
    }

    /// Maps a user-friendly name to a canonical domain. Anything already
    /// shaped like a domain (contains a `.`) passes through unchanged.
    pub fn resolve_name(&self, alias: &str) -> String {
        if let Some(domain) = self.aliases.get(alias) {
            return domain.clone();
        }
        alias.to_string()
    }

    /// Newest-first version list for `domain`. The registry's actual
    /// contents are an external input (§1); this fetches
    /// `<base>/<domain>/versions.json`, an array of version strings.
    pub fn versions(&self, domain: &str) -> anyhow::Result<Vec<Version>> {
        let url = format!("{}/{}/versions.json", self.base_url, domain);
        debug!("Fetching version list for {}", domain);
        let raw: Vec<String> = crate::env_config::http_agent()
            .get(&url)
            .call()
            .with_context(|| format!("Failed to fetch versions for {domain}"))?
            .into_json()
            .with_context(|| format!("Invalid version list response for {domain}"))?;
        let mut versions: Vec<Version> = raw.iter().filter_map(|v| Version::parse(v)).collect();
        versions.sort_by(|a, b| b.cmp(a));
        Ok(versions)
    }

    pub fn tarball_url(
        &self,
        domain: &str,
        constraint_or_version: &str,
        platform: Platform,
        arch: Arch,
        format: ArchiveFormat,
    ) -> String {
        let version = normalize_version_for_url(constraint_or_version);
        format!(
            "{}/{}/{}/{}/v{}.{}",
            self.base_url,
            domain,
            platform,
            arch,
            version,
            format.extension()
        )
    }

    /// Optional sidecar SHA-256; absence is non-fatal (§4.2).
    pub fn fetch_sha256_sidecar(&self, tarball_url: &str) -> Option<String> {
        let url = format!("{tarball_url}.sha256");
        let response = crate::env_config::http_agent().get(&url).call().ok()?;
        let mut body = String::new();
        response.into_reader().read_to_string(&mut body).ok()?;
        body.split_whitespace().next().map(str::to_string)
    }

    /// Companion domains a package declares as implicit extra requirements,
    /// installed before it (§5). Absence of the sidecar means no companions,
    /// not an error — same shape as the SHA-256 sidecar above.
    pub fn fetch_companions(&self, domain: &str) -> Vec<String> {
        let url = format!("{}/{}/companions.json", self.base_url, domain);
        let response = match crate::env_config::http_agent().get(&url).call() {
            Ok(response) => response,
            Err(_) => return Vec::new(),
        };
        response.into_json().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ArchiveFormat {
    TarXz,
    TarGz,
}

impl ArchiveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::TarXz => "tar.xz",
            ArchiveFormat::TarGz => "tar.gz",
        }
    }
}

fn load_aliases(override_json: Option<&str>) -> HashMap<String, String> {
    let source = override_json.unwrap_or(EMBEDDED_ALIASES);
    serde_json::from_str(source).unwrap_or_default()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolve_name_uses_embedded_table() {
        let client = RegistryClient::new();
        assert_eq!(client.resolve_name("node"), "nodejs.org");
        assert_eq!(client.resolve_name("postgres"), "postgresql.org");
    }

    #[test]
    fn resolve_name_passes_through_canonical_domains() {
        let client = RegistryClient::new();
        assert_eq!(client.resolve_name("nodejs.org"), "nodejs.org");
    }

    #[test]
    fn overrides_win_over_embedded_entries() {
        let mut overrides = HashMap::new();
        overrides.insert("node".to_string(), "custom.example.com".to_string());
        let client = RegistryClient::new().with_overrides(overrides);
        assert_eq!(client.resolve_name("node"), "custom.example.com");
    }

    #[test]
    fn tarball_url_strips_constraint_prefixes() {
        let client = RegistryClient::with_base_url("https://dist.pkgx.dev");
        let url = client.tarball_url(
            "nodejs.org",
            "^22.4.1",
            Platform::Darwin,
            Arch::X86_64,
            ArchiveFormat::TarXz,
        );
        assert_eq!(
            url,
            "https://dist.pkgx.dev/nodejs.org/darwin/x86-64/v22.4.1.tar.xz"
        );
    }

    #[test]
    fn tarball_url_expands_bare_major() {
        let client = RegistryClient::with_base_url("https://dist.pkgx.dev");
        let url = client.tarball_url(
            "nodejs.org",
            "22",
            Platform::Linux,
            Arch::Aarch64,
            ArchiveFormat::TarGz,
        );
        assert_eq!(
            url,
            "https://dist.pkgx.dev/nodejs.org/linux/aarch64/v22.0.0.tar.gz"
        );
    }

    #[test]
    fn versions_fetches_and_sorts_newest_first() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/nodejs.org/versions.json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"["20.11.0", "22.4.1", "22.1.0", "21.7.3"]"#)
            .create();

        let client = RegistryClient::with_base_url(server.url());
        let versions = client.versions("nodejs.org").unwrap();
        let rendered: Vec<String> = versions.iter().map(|v| v.to_string()).collect();
        assert_eq!(rendered, vec!["22.4.1", "22.1.0", "21.7.3", "20.11.0"]);
    }

    #[test]
    fn missing_sha256_sidecar_is_non_fatal() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/nodejs.org/darwin/x86-64/v22.4.1.tar.xz.sha256")
            .with_status(404)
            .create();

        let client = RegistryClient::with_base_url(server.url());
        let tarball_url = format!("{}/nodejs.org/darwin/x86-64/v22.4.1.tar.xz", server.url());
        assert_eq!(client.fetch_sha256_sidecar(&tarball_url), None);
    }

    #[test]
    fn fetch_companions_returns_declared_domains() {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/openssl.org/companions.json")
            .with_status(200)
            .with_body(r#"["ca-certificates.org"]"#)
            .create();
        let client = RegistryClient::with_base_url(server.url());
        assert_eq!(client.fetch_companions("openssl.org"), vec!["ca-certificates.org"]);
    }

    #[test]
    fn fetch_companions_defaults_to_empty_when_missing() {
        let mut server = mockito::Server::new();
        let _mock = server.mock("GET", "/nodejs.org/companions.json").with_status(404).create();
        let client = RegistryClient::with_base_url(server.url());
        assert!(client.fetch_companions("nodejs.org").is_empty());
    }
}
