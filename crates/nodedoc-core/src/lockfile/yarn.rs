//! yarn.lock, classic (v1) and berry (v2+)
//!
//! Both formats are line oriented: an unindented header listing one or more
//! `name@range` specifiers, followed by indented fields. Only `version` is
//! needed here, so a full YAML parse is not attempted (classic is not YAML).

use super::PackageInstance;

pub(super) fn parse(content: &str) -> Vec<PackageInstance> {
    let mut instances = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in content.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }

        let indented = line.starts_with(' ') || line.starts_with('\t');
        if !indented {
            current = parse_header(line);
            continue;
        }

        let Some((name, specifiers)) = current.as_ref() else {
            continue;
        };
        if let Some(version) = parse_version_field(line.trim()) {
            instances.push(PackageInstance {
                name: name.clone(),
                version,
                path: specifiers.clone(),
                depth: 0,
            });
            current = None;
        }
    }

    instances
}

/// `"@babel/core@^7.0.0", "@babel/core@^7.1.0":` -> (`@babel/core`, specifiers)
fn parse_header(line: &str) -> Option<(String, String)> {
    let header = line.trim_end().strip_suffix(':')?;
    let first = header.split(',').next()?.trim().trim_matches('"');
    if first.starts_with("__metadata") {
        return None;
    }

    let search_from = usize::from(first.starts_with('@'));
    let at = first[search_from..].find('@')? + search_from;
    let name = &first[..at];

    let specifiers = header
        .split(',')
        .map(|s| s.trim().trim_matches('"'))
        .collect::<Vec<_>>()
        .join(", ");

    Some((name.to_string(), specifiers))
}

/// `version "1.2.3"` (classic) or `version: 1.2.3` (berry)
fn parse_version_field(field: &str) -> Option<String> {
    let rest = field.strip_prefix("version")?;
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    if !rest.starts_with(' ') {
        return None;
    }
    let version = rest.trim().trim_matches('"');
    (!version.is_empty()).then(|| version.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_lockfile() {
        let lock = r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


"@babel/core@^7.0.0", "@babel/core@^7.1.0":
  version "7.23.0"
  resolved "https://registry.yarnpkg.com/@babel/core/-/core-7.23.0.tgz"

lodash@^4.17.20:
  version "4.17.20"

lodash@^4.17.21:
  version "4.17.21"
  dependencies:
    versionless "1.0.0"
"#;
        let instances = parse(lock);
        assert_eq!(instances.len(), 3);
        assert_eq!(instances[0].name, "@babel/core");
        assert_eq!(instances[0].version, "7.23.0");
        assert_eq!(instances[0].path, "@babel/core@^7.0.0, @babel/core@^7.1.0");
        assert_eq!(instances[2].name, "lodash");
        assert_eq!(instances[2].version, "4.17.21");
    }

    #[test]
    fn test_berry_lockfile() {
        let lock = r#"__metadata:
  version: 6
  cacheKey: 8

"react@npm:^18.2.0":
  version: 18.2.0
  resolution: "react@npm:18.2.0"
"#;
        let instances = parse(lock);
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].name, "react");
        assert_eq!(instances[0].version, "18.2.0");
    }

    #[test]
    fn test_version_field_needs_separator() {
        assert_eq!(parse_version_field("versions \"1\""), None);
        assert_eq!(parse_version_field("version \"1.0.0\""), Some("1.0.0".into()));
    }
}
