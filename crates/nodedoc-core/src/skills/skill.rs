//! Skill document model

use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Where a skill was loaded from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillSource {
    /// ~/.nodedoc/skills
    Global,
    /// A skills directory inside the project
    Project,
}

impl fmt::Display for SkillSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkillSource::Global => write!(f, "global"),
            SkillSource::Project => write!(f, "project"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FrontMatter {
    name: String,
    description: String,
    #[serde(default)]
    version: Option<serde_yaml::Value>,
}

/// A loaded SKILL.md
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    pub version: Option<String>,
    /// The skill directory
    pub path: PathBuf,
    pub source: SkillSource,
    /// Markdown after the front matter
    pub body: String,
}

impl Skill {
    /// Parse a SKILL.md: YAML front matter between `---` lines, then Markdown
    pub fn parse(content: &str, path: PathBuf, source: SkillSource) -> Result<Self> {
        let (front, body) = split_front_matter(content)
            .ok_or_else(|| anyhow!("SKILL.md in {:?} has no front matter", path))?;
        let meta: FrontMatter = serde_yaml::from_str(front)
            .with_context(|| format!("Invalid front matter in {:?}", path))?;

        if meta.name.trim().is_empty() {
            return Err(anyhow!("Skill in {:?} has an empty name", path));
        }

        // `version: 1.0` parses as a float
        let version = meta.version.and_then(|v| match v {
            serde_yaml::Value::String(s) => Some(s),
            serde_yaml::Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

        Ok(Self {
            name: meta.name.trim().to_string(),
            description: meta.description.trim().to_string(),
            version,
            path,
            source,
            body: body.trim_start_matches(['\r', '\n']).to_string(),
        })
    }

    pub fn info(&self) -> SkillInfo {
        SkillInfo {
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            source: self.source,
            path: self.path.clone(),
        }
    }
}

/// Listing entry for a skill
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillInfo {
    pub name: String,
    pub description: String,
    pub version: Option<String>,
    pub source: SkillSource,
    pub path: PathBuf,
}

fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}
