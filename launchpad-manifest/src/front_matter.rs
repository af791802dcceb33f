//! Front-matter YAML embedded in language source files (§4.1's "read YAML
//! front-matter" mode): a `---`-fenced block inside the file's native
//! comment syntax, using the same schema as an explicit pantry YAML.
//! pkgx-style shebang scripts are the common case this exists for:
//!
//! ```text
//! #!/usr/bin/env -S pkgx +deno run
//! # ---
//! # dependencies:
//! #   deno.land: ^1.34
//! # ---
//! ```

use crate::pantry_yaml::PantryYaml;

/// Comment-line prefixes recognized across the source languages pkgx-style
/// front matter shows up in (shell/Python/Ruby, JS/TS/Go, SQL/Lua).
const COMMENT_PREFIXES: &[&str] = &["#", "//", "--"];

/// Extracts and parses a `---`-fenced YAML block from `contents`, stripping
/// one leading comment-line prefix from each fenced line first. Returns
/// `None` on any mismatch or absence rather than an error: per §4.1, a
/// manifest parse failure never fails the sniff.
pub fn extract(contents: &str) -> Option<PantryYaml> {
    let mut in_block = false;
    let mut comment_prefix: Option<&str> = None;
    let mut block_lines: Vec<String> = Vec::new();

    for line in contents.lines() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() {
            if in_block {
                block_lines.push(String::new());
            }
            continue;
        }

        let found = COMMENT_PREFIXES.iter().find_map(|prefix| {
            trimmed
                .strip_prefix(prefix)
                .map(|rest| (*prefix, rest.strip_prefix(' ').unwrap_or(rest)))
        });
        let (prefix, stripped) = match found {
            Some(found) => found,
            None if in_block => return None,
            None => continue,
        };

        if stripped.trim_end() == "---" {
            if in_block {
                return PantryYaml::from_str(&block_lines.join("\n")).ok();
            }
            in_block = true;
            comment_prefix = Some(prefix);
            continue;
        }

        if in_block {
            if Some(prefix) != comment_prefix {
                return None;
            }
            block_lines.push(stripped.to_string());
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extracts_hash_fenced_front_matter_from_a_shebang_script() {
        let script = "#!/usr/bin/env -S pkgx +deno run\n# ---\n# dependencies:\n#   deno.land: ^1.34\n# ---\nconsole.log(1)\n";
        let yaml = extract(script).unwrap();
        let entries = yaml.dependencies.unwrap().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "deno.land");
        assert_eq!(entries[0].1.version(), "^1.34");
    }

    #[test]
    fn extracts_double_slash_fenced_front_matter() {
        let script = "// ---\n// dependencies:\n//   nodejs.org: \"^22\"\n// ---\nconsole.log(1)\n";
        let yaml = extract(script).unwrap();
        let entries = yaml.dependencies.unwrap().entries();
        assert_eq!(entries[0].0, "nodejs.org");
    }

    #[test]
    fn returns_none_without_a_closing_fence() {
        let script = "# ---\n# dependencies:\n#   nodejs.org: \"^22\"\nconsole.log(1)\n";
        assert!(extract(script).is_none());
    }

    #[test]
    fn returns_none_when_comment_style_changes_mid_block() {
        let script = "# ---\n// dependencies:\n#   nodejs.org: \"^22\"\n# ---\n";
        assert!(extract(script).is_none());
    }

    #[test]
    fn returns_none_for_plain_source_with_no_front_matter() {
        let script = "fn main() {}\n";
        assert!(extract(script).is_none());
    }
}
