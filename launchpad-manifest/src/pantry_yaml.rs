//! Explicit pantry/launchpad/pkgx YAML schema (§6).

use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum DependencySpec {
    Compact(String),
    Detailed {
        version: Option<String>,
        global: Option<bool>,
    },
}

impl DependencySpec {
    pub fn version(&self) -> &str {
        match self {
            DependencySpec::Compact(version) => version,
            DependencySpec::Detailed { version, .. } => version.as_deref().unwrap_or("*"),
        }
    }

    pub fn global_override(&self) -> Option<bool> {
        match self {
            DependencySpec::Compact(_) => None,
            DependencySpec::Detailed { global, .. } => *global,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum DependenciesBlock {
    Map(BTreeMap<String, DependencySpec>),
    List(Vec<String>),
    Single(String),
}

impl DependenciesBlock {
    /// Normalizes every shorthand form into `(domain, DependencySpec)` pairs.
    pub fn entries(&self) -> Vec<(String, DependencySpec)> {
        match self {
            DependenciesBlock::Map(map) => {
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            DependenciesBlock::List(list) => list
                .iter()
                .map(|domain| (domain.clone(), DependencySpec::Compact("*".to_string())))
                .collect(),
            DependenciesBlock::Single(domain) => {
                vec![(domain.clone(), DependencySpec::Compact("*".to_string()))]
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ServicesBlock {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default, rename = "autoStart")]
    pub auto_start: Option<Vec<String>>,
    #[serde(default)]
    pub infer: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct PantryYaml {
    #[serde(default)]
    pub dependencies: Option<DependenciesBlock>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub global: bool,
    #[serde(default)]
    pub services: Option<ServicesBlock>,
}

impl PantryYaml {
    pub fn from_str(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use indoc::indoc;

    #[test]
    fn parses_map_form() {
        let yaml = indoc! {r#"
            dependencies:
              nodejs.org: ^22
              redis.io:
                version: ">=7"
                global: true
            env:
              FOO: bar
            global: false
        "#};
        let parsed = PantryYaml::from_str(yaml).unwrap();
        let entries = parsed.dependencies.unwrap().entries();
        assert_eq!(entries.len(), 2);
        assert!(!parsed.global);
        assert_eq!(parsed.env.get("FOO"), Some(&"bar".to_string()));
    }

    #[test]
    fn parses_list_form() {
        let yaml = "dependencies:\n  - nodejs.org\n  - redis.io\n";
        let parsed = PantryYaml::from_str(yaml).unwrap();
        let entries = parsed.dependencies.unwrap().entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1.version(), "*");
    }

    #[test]
    fn parses_single_string_form() {
        let yaml = "dependencies: nodejs.org\n";
        let parsed = PantryYaml::from_str(yaml).unwrap();
        let entries = parsed.dependencies.unwrap().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "nodejs.org");
        assert_eq!(entries[0].1.version(), "*");
    }

    #[test]
    fn services_block_parses() {
        let yaml = indoc! {r#"
            dependencies: []
            services:
              enabled: true
              autoStart: [redis.io]
        "#};
        let parsed = PantryYaml::from_str(yaml).unwrap();
        let services = parsed.services.unwrap();
        assert_eq!(services.enabled, Some(true));
        assert_eq!(services.auto_start, Some(vec!["redis.io".to_string()]));
    }
}
