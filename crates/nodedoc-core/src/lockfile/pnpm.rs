//! pnpm-lock.yaml

use serde_yaml::{Mapping, Value};

use super::PackageInstance;

pub(super) fn parse(content: &str) -> Result<Vec<PackageInstance>, String> {
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let root: Value = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    let Some(packages) = root.get("packages").and_then(Value::as_mapping) else {
        return Ok(Vec::new());
    };

    Ok(parse_packages(packages))
}

fn parse_packages(packages: &Mapping) -> Vec<PackageInstance> {
    packages
        .iter()
        .filter_map(|(key, info)| {
            let key = key.as_str()?;
            let (name, key_version) = parse_key(key)?;
            // Tarball and git entries carry the real version in the body
            let version = info
                .get("version")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or(key_version);
            Some(PackageInstance {
                name,
                version,
                path: key.to_string(),
                depth: 0,
            })
        })
        .collect()
}

/// Split a package key into name and version
///
/// - v5: `/name/1.0.0`, `/@scope/name/1.0.0_peer@2.0.0`
/// - v6: `/name@1.0.0`, `/@scope/name@1.0.0(peer@2.0.0)`
/// - v9: `name@1.0.0`
fn parse_key(key: &str) -> Option<(String, String)> {
    let key = key.trim_start_matches('/');
    let key = key.split('(').next().unwrap_or(key);

    // v5: last segment is a bare version, optionally with a `_peer@x` suffix
    if let Some((name, segment)) = key.rsplit_once('/') {
        let version = segment.split('_').next().unwrap_or(segment);
        if version.starts_with(|c: char| c.is_ascii_digit()) && !version.contains('@') {
            return Some((name.to_string(), version.to_string()));
        }
    }

    let search_from = usize::from(key.starts_with('@'));
    let at = key[search_from..].rfind('@')? + search_from;
    let (name, version) = (&key[..at], &key[at + 1..]);
    if name.is_empty() || version.is_empty() {
        return None;
    }
    Some((name.to_string(), version.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoped_name_starting_with_digit() {
        for key in ["/@scope/3d-viewer@1.2.0", "@scope/3d-viewer@1.2.0(react@18.2.0)"] {
            assert_eq!(
                parse_key(key),
                Some(("@scope/3d-viewer".into(), "1.2.0".into())),
                "{}",
                key
            );
        }
        assert_eq!(
            parse_key("/@scope/3d-viewer/1.2.0_react@18.2.0"),
            Some(("@scope/3d-viewer".into(), "1.2.0".into()))
        );
    }

    #[test]
    fn test_key_formats() {
        assert_eq!(
            parse_key("/lodash/4.17.21"),
            Some(("lodash".into(), "4.17.21".into()))
        );
        assert_eq!(
            parse_key("/@babel/core/7.23.0"),
            Some(("@babel/core".into(), "7.23.0".into()))
        );
        assert_eq!(
            parse_key("/react-dom/18.2.0_react@18.2.0"),
            Some(("react-dom".into(), "18.2.0".into()))
        );
        assert_eq!(
            parse_key("/@babel/core@7.23.0"),
            Some(("@babel/core".into(), "7.23.0".into()))
        );
        assert_eq!(
            parse_key("/react-dom@18.2.0(react@18.2.0)"),
            Some(("react-dom".into(), "18.2.0".into()))
        );
        assert_eq!(
            parse_key("lodash@4.17.21"),
            Some(("lodash".into(), "4.17.21".into()))
        );
        assert_eq!(parse_key("@scope"), None);
    }

    #[test]
    fn test_parse_lockfile() {
        let lock = r#"
lockfileVersion: '9.0'
importers:
  .:
    dependencies:
      lodash:
        specifier: ^4.17.21
        version: 4.17.21
packages:
  lodash@4.17.21:
    resolution: {integrity: sha512-abc}
  lodash@4.17.20:
    resolution: {integrity: sha512-def}
  '@types/node@20.11.0':
    resolution: {integrity: sha512-ghi}
"#;
        let instances = parse(lock).unwrap();
        assert_eq!(instances.len(), 3);
        assert!(instances
            .iter()
            .any(|i| i.name == "@types/node" && i.version == "20.11.0"));
    }

    #[test]
    fn test_empty_and_invalid() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("packages: [unclosed").is_err());
    }
}
