//! package-lock.json

use serde_json::{Map, Value};

use super::PackageInstance;

const NODE_MODULES: &str = "node_modules/";

pub(super) fn parse(content: &str) -> Result<Vec<PackageInstance>, String> {
    let root: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    let root = root
        .as_object()
        .ok_or_else(|| "top level is not an object".to_string())?;

    // v2 carries both sections; `packages` is authoritative when present
    if let Some(packages) = root.get("packages").and_then(Value::as_object) {
        return Ok(parse_packages(packages));
    }

    let mut instances = Vec::new();
    if let Some(deps) = root.get("dependencies").and_then(Value::as_object) {
        walk_v1(deps, NODE_MODULES, 0, &mut instances);
    }
    Ok(instances)
}

/// lockfileVersion 2/3: keys are install paths
fn parse_packages(packages: &Map<String, Value>) -> Vec<PackageInstance> {
    let mut instances = Vec::new();

    for (path, info) in packages {
        // Root project, and workspace folders outside node_modules
        let Some(idx) = path.rfind(NODE_MODULES) else {
            continue;
        };
        if info.get("link").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }

        let name = info
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(&path[idx + NODE_MODULES.len()..])
            .to_string();
        let version = info
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let depth = path.matches(NODE_MODULES).count().saturating_sub(1);

        instances.push(PackageInstance {
            name,
            version,
            path: path.clone(),
            depth,
        });
    }

    instances
}

/// lockfileVersion 1: nested `dependencies` objects
fn walk_v1(
    deps: &Map<String, Value>,
    prefix: &str,
    depth: usize,
    instances: &mut Vec<PackageInstance>,
) {
    for (name, info) in deps {
        let path = format!("{}{}", prefix, name);
        let version = info
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        instances.push(PackageInstance {
            name: name.clone(),
            version,
            path: path.clone(),
            depth,
        });

        if let Some(nested) = info.get("dependencies").and_then(Value::as_object) {
            walk_v1(nested, &format!("{}/{}", path, NODE_MODULES), depth + 1, instances);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v3_packages() {
        let lock = r#"{
            "lockfileVersion": 3,
            "packages": {
                "": { "name": "app", "version": "1.0.0" },
                "node_modules/lodash": { "version": "4.17.21" },
                "node_modules/@babel/core": { "version": "7.23.0" },
                "node_modules/a/node_modules/lodash": { "version": "4.17.20" },
                "packages/ui": { "version": "0.1.0" },
                "node_modules/ui": { "resolved": "packages/ui", "link": true }
            }
        }"#;
        let instances = parse(lock).unwrap();
        assert_eq!(instances.len(), 3);

        let nested = instances
            .iter()
            .find(|i| i.path == "node_modules/a/node_modules/lodash")
            .unwrap();
        assert_eq!(nested.name, "lodash");
        assert_eq!(nested.depth, 1);

        let scoped = instances.iter().find(|i| i.name == "@babel/core").unwrap();
        assert_eq!(scoped.depth, 0);
    }

    #[test]
    fn test_v1_dependencies() {
        let lock = r#"{
            "lockfileVersion": 1,
            "dependencies": {
                "a": {
                    "version": "1.0.0",
                    "dependencies": { "lodash": { "version": "4.17.20" } }
                },
                "lodash": { "version": "4.17.21" }
            }
        }"#;
        let instances = parse(lock).unwrap();
        assert_eq!(instances.len(), 3);
        let nested = instances.iter().find(|i| i.depth == 1).unwrap();
        assert_eq!(nested.path, "node_modules/a/node_modules/lodash");
    }

    #[test]
    fn test_v2_does_not_double_count() {
        let lock = r#"{
            "lockfileVersion": 2,
            "packages": { "node_modules/x": { "version": "1.0.0" } },
            "dependencies": { "x": { "version": "1.0.0" } }
        }"#;
        assert_eq!(parse(lock).unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_json() {
        assert!(parse("[").is_err());
        assert!(parse("[]").is_err());
    }
}
