//! Skill filesystem loading

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::skill::{Skill, SkillSource};
use crate::constants::SKILL_FILE_NAME;

static SKILL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("valid skill name regex"));

/// Every skill directory in `dir` with its load result, sorted by path
pub fn scan_skills_dir(dir: &Path, source: SkillSource) -> Vec<(PathBuf, Result<Skill>)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut found: Vec<(PathBuf, Result<Skill>)> = entries
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .map(|entry| entry.path())
        .filter(|path| path.join(SKILL_FILE_NAME).is_file())
        .map(|path| {
            let skill = load_skill(&path, source);
            (path, skill)
        })
        .collect();
    found.sort_by(|a, b| a.0.cmp(&b.0));
    found
}

/// Load all skills from a directory, skipping ones that fail to parse
pub fn load_skills_from_dir(dir: &Path, source: SkillSource) -> Vec<Skill> {
    let mut skills: Vec<Skill> = scan_skills_dir(dir, source)
        .into_iter()
        .filter_map(|(path, result)| match result {
            Ok(skill) => {
                debug!("Loaded skill: {} from {:?}", skill.name, path);
                Some(skill)
            }
            Err(e) => {
                debug!("Failed to load skill from {:?}: {:#}", path, e);
                None
            }
        })
        .collect();

    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}

/// Load a single skill from its directory
pub fn load_skill(path: &Path, source: SkillSource) -> Result<Skill> {
    let skill_file = path.join(SKILL_FILE_NAME);

    if !skill_file.exists() {
        return Err(anyhow!("{} not found in {:?}", SKILL_FILE_NAME, path));
    }

    let content = fs::read_to_string(&skill_file)
        .with_context(|| format!("Failed to read {:?}", skill_file))?;

    Skill::parse(&content, path.to_path_buf(), source)
}

/// Load a specific file from within a skill directory
pub fn load_skill_file(skill_path: &Path, file_name: &str) -> Result<String> {
    // Prevent path traversal
    if file_name.contains("..") || Path::new(file_name).is_absolute() {
        return Err(anyhow!("Invalid file path: path traversal not allowed"));
    }

    let file_path = skill_path.join(file_name);
    if !file_path.exists() {
        return Err(anyhow!("File not found: {}", file_name));
    }

    // Symlinks must not lead out of the skill directory
    let canonical_skill = skill_path.canonicalize()?;
    let canonical_file = file_path.canonicalize()?;
    if !canonical_file.starts_with(&canonical_skill) {
        return Err(anyhow!("File path escapes skill directory"));
    }

    fs::read_to_string(&file_path).with_context(|| format!("Failed to read {}", file_name))
}

pub fn is_valid_skill_name(name: &str) -> bool {
    SKILL_NAME.is_match(name)
}

/// Scaffold a new skill directory
pub fn scaffold_skill(dir: &Path, name: &str, description: &str) -> Result<PathBuf> {
    if !is_valid_skill_name(name) {
        return Err(anyhow!(
            "Invalid skill name '{}': use lowercase letters, digits and hyphens",
            name
        ));
    }

    let skill_dir = dir.join(name);
    if skill_dir.exists() {
        return Err(anyhow!("Skill '{}' already exists", name));
    }

    fs::create_dir_all(&skill_dir)
        .with_context(|| format!("Failed to create {:?}", skill_dir))?;

    let skill_content = format!(
        r#"---
name: {}
description: {}
version: 0.1.0
---

# {}

## When to Use

[Describe the prompts and files this skill applies to]

## Diagnosis

[Commands to run first, e.g. `nodedoc diagnose`]

## Fixes

[Step-by-step fixes with the commands involved]
"#,
        name,
        yaml_scalar(description),
        humanize_skill_name(name)
    );

    fs::write(skill_dir.join(SKILL_FILE_NAME), skill_content)?;

    Ok(skill_dir)
}

/// Quote a front matter value when plain YAML would misread it
fn yaml_scalar(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.contains(": ")
        || value.contains(" #")
        || value.starts_with(|c: char| "!&*-?[]{}|>'\"%@`#,".contains(c));
    if needs_quotes {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn humanize_skill_name(name: &str) -> String {
    name.split('-')
        .filter(|part| !part.is_empty())
        .map(capitalize_first)
        .collect::<Vec<_>>()
        .join(" ")
}
