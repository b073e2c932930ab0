//! Skills manager: discovery across global and project directories

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use tracing::{debug, info};

use super::loader::{self, load_skills_from_dir, scan_skills_dir};
use super::rules::{RulesFile, SkillMatch, SkillRules};
use super::skill::{Skill, SkillInfo, SkillSource};
use crate::config::SkillSettings;
use crate::constants::SKILL_RULES_FILE_NAME;
use crate::error::DoctorError;
use crate::paths;
use crate::report::{Finding, IntoReport, Report, Section};

/// Finds skills in `~/.nodedoc/skills` and the project's skill directories.
/// A project skill replaces a global one with the same name.
pub struct SkillsManager {
    global_dir: PathBuf,
    project_dirs: Vec<PathBuf>,
    skills: BTreeMap<String, Skill>,
}

impl SkillsManager {
    pub fn new(global_dir: PathBuf, project_dirs: Vec<PathBuf>) -> Self {
        let mut manager = Self {
            global_dir,
            project_dirs,
            skills: BTreeMap::new(),
        };
        manager.refresh();
        manager
    }

    /// Global skills dir plus `settings.project_dirs` under `project_dir`
    pub fn with_defaults(project_dir: &Path, settings: &SkillSettings) -> Self {
        let project_dirs = settings
            .project_dirs
            .iter()
            .map(|dir| project_dir.join(dir))
            .collect();
        Self::new(paths::skills_dir(), project_dirs)
    }

    /// Rescan all directories
    pub fn refresh(&mut self) {
        self.skills.clear();
        for skill in load_skills_from_dir(&self.global_dir, SkillSource::Global) {
            self.skills.insert(skill.name.clone(), skill);
        }
        for dir in &self.project_dirs {
            for skill in load_skills_from_dir(dir, SkillSource::Project) {
                if let Some(shadowed) = self.skills.get(&skill.name) {
                    debug!(
                        "Project skill {} overrides {:?}",
                        skill.name, shadowed.path
                    );
                }
                self.skills.insert(skill.name.clone(), skill);
            }
        }
        debug!("{} skill(s) available", self.skills.len());
    }

    pub fn list_skills(&self) -> Vec<SkillInfo> {
        self.skills.values().map(Skill::info).collect()
    }

    pub fn get_skill(&self, name: &str) -> Option<&Skill> {
        self.skills.get(name)
    }

    fn require(&self, name: &str) -> Result<&Skill, DoctorError> {
        self.get_skill(name)
            .ok_or_else(|| DoctorError::SkillNotFound(name.to_string()))
    }

    /// Markdown body of a skill
    pub fn load_skill_content(&self, name: &str) -> Result<String> {
        Ok(self.require(name)?.body.clone())
    }

    /// A supporting file inside a skill directory
    pub fn load_skill_file(&self, name: &str, file: &str) -> Result<String> {
        let skill = self.require(name)?;
        loader::load_skill_file(&skill.path, file)
    }

    /// Scaffold a skill in the global directory, or the first project one
    pub fn create_skill(&mut self, name: &str, description: &str, global: bool) -> Result<PathBuf> {
        let dir = match (global, self.project_dirs.first()) {
            (false, Some(dir)) => dir.clone(),
            _ => self.global_dir.clone(),
        };
        let path = loader::scaffold_skill(&dir, name, description)?;
        info!("Created skill {} at {:?}", name, path);
        self.refresh();
        Ok(path)
    }

    /// `skill-rules.json` files that exist, global first
    pub fn rules_files(&self) -> Vec<PathBuf> {
        std::iter::once(&self.global_dir)
            .chain(&self.project_dirs)
            .map(|dir| dir.join(SKILL_RULES_FILE_NAME))
            .filter(|path| path.is_file())
            .collect()
    }

    /// All rules files merged, project entries replacing global ones
    pub fn load_rules_file(&self) -> Result<RulesFile> {
        let mut merged = RulesFile::default();
        for path in self.rules_files() {
            debug!("Loading trigger rules from {:?}", path);
            merged.merge(RulesFile::load(&path)?);
        }
        Ok(merged)
    }

    pub fn load_rules(&self) -> Result<SkillRules> {
        Ok(SkillRules::compile(&self.load_rules_file()?)?)
    }

    pub fn match_prompt(&self, prompt: &str) -> Result<Vec<SkillMatch>> {
        Ok(self.load_rules()?.match_prompt(prompt))
    }

    pub fn match_file(&self, path: &str, content: Option<&str>) -> Result<Vec<SkillMatch>> {
        Ok(self.load_rules()?.match_file(path, content))
    }

    /// Check skill documents and trigger rules
    pub fn validate(&self) -> Result<ValidationReport> {
        let mut invalid_skills = Vec::new();
        let dirs = std::iter::once((&self.global_dir, SkillSource::Global))
            .chain(self.project_dirs.iter().map(|d| (d, SkillSource::Project)));
        for (dir, source) in dirs {
            for (path, result) in scan_skills_dir(dir, source) {
                if let Err(e) = result {
                    invalid_skills.push(format!("{}: {:#}", path.display(), e));
                }
            }
        }

        let rules_files: Vec<String> = self
            .rules_files()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let file = self.load_rules_file()?;
        let (rules, rule_error) = match SkillRules::compile(&file) {
            Ok(rules) => (rules.len(), None),
            Err(e) => (0, Some(e.to_string())),
        };
        let unknown_skills = file
            .skills
            .keys()
            .filter(|name| !self.skills.contains_key(*name))
            .cloned()
            .collect();

        Ok(ValidationReport {
            skills: self.skills.len(),
            invalid_skills,
            rules_files,
            rules,
            rule_error,
            unknown_skills,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub skills: usize,
    /// Skill directories whose SKILL.md failed to load
    pub invalid_skills: Vec<String>,
    pub rules_files: Vec<String>,
    pub rules: usize,
    /// First pattern that failed to compile
    pub rule_error: Option<String>,
    /// Rules naming a skill that does not exist
    pub unknown_skills: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.invalid_skills.is_empty() && self.rule_error.is_none() && self.unknown_skills.is_empty()
    }
}

impl IntoReport for ValidationReport {
    fn to_report(&self) -> Report {
        let mut skills = Section::new("Skills");
        skills.push(Finding::info(format!("{} skill(s) loaded", self.skills)));
        for invalid in &self.invalid_skills {
            skills.push(Finding::fail(invalid.clone()));
        }

        let mut rules = Section::new("Trigger rules");
        if self.rules_files.is_empty() {
            rules.push(Finding::skip(format!("No {} found", SKILL_RULES_FILE_NAME)));
        } else {
            rules.push(Finding::info("Rules files").details(self.rules_files.iter().cloned()));
        }
        if let Some(error) = &self.rule_error {
            rules.push(Finding::fail(error.clone()));
        } else if !self.rules_files.is_empty() {
            rules.push(Finding::pass(format!("{} rule(s) compiled", self.rules)));
        }
        for name in &self.unknown_skills {
            rules.push(Finding::fail(format!("Rule for unknown skill '{}'", name)));
        }

        Report::new("Skill Validation").section(skills).section(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SKILL_FILE_NAME;
    use std::fs;
    use tempfile::tempdir;

    fn write_skill(dir: &Path, name: &str, description: &str) {
        fs::create_dir_all(dir.join(name)).unwrap();
        fs::write(
            dir.join(name).join(SKILL_FILE_NAME),
            format!("---\nname: {}\ndescription: {}\n---\n\n# {}\n", name, description, name),
        )
        .unwrap();
    }

    #[test]
    fn test_project_skills_shadow_global() {
        let temp = tempdir().unwrap();
        let global = temp.path().join("global");
        let project = temp.path().join("project/.claude/skills");
        write_skill(&global, "node-deps", "global version");
        write_skill(&global, "ts-style", "only global");
        write_skill(&project, "node-deps", "project version");

        let manager = SkillsManager::new(global, vec![project]);
        let skills = manager.list_skills();
        assert_eq!(skills.len(), 2);

        let node = manager.get_skill("node-deps").unwrap();
        assert_eq!(node.description, "project version");
        assert_eq!(node.source, SkillSource::Project);
        assert_eq!(manager.get_skill("ts-style").unwrap().source, SkillSource::Global);
        assert!(manager.load_skill_content("node-deps").unwrap().starts_with("# node-deps"));

        let err = manager.load_skill_content("missing").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DoctorError>(),
            Some(DoctorError::SkillNotFound(_))
        ));
    }

    #[test]
    fn test_create_skill_in_project_dir() {
        let temp = tempdir().unwrap();
        let mut manager = SkillsManager::new(temp.path().join("global"), vec![temp.path().join("skills")]);
        let path = manager.create_skill("peer-deps", "Peer dependency help", false).unwrap();
        assert_eq!(path, temp.path().join("skills/peer-deps"));
        assert!(manager.get_skill("peer-deps").is_some());
    }

    #[test]
    fn test_rules_merge_and_validate() {
        let temp = tempdir().unwrap();
        let global = temp.path().join("global");
        let project = temp.path().join("skills");
        write_skill(&project, "node-deps", "deps");
        fs::create_dir_all(&global).unwrap();
        fs::write(
            global.join(SKILL_RULES_FILE_NAME),
            r#"{"skills": {"node-deps": {"priority": "low", "promptTriggers": {"keywords": ["npm"]}}}}"#,
        )
        .unwrap();
        fs::write(
            project.join(SKILL_RULES_FILE_NAME),
            r#"{"skills": {"node-deps": {"priority": "high", "promptTriggers": {"keywords": ["yarn"]}}, "ghost": {}}}"#,
        )
        .unwrap();

        let manager = SkillsManager::new(global, vec![project]);
        assert_eq!(manager.rules_files().len(), 2);

        let matches = manager.match_prompt("yarn install fails").unwrap();
        assert_eq!(matches.len(), 1);
        assert!(manager.match_prompt("npm install fails").unwrap().is_empty());

        let report = manager.validate().unwrap();
        assert_eq!(report.unknown_skills, ["ghost"]);
        assert!(!report.is_valid());
        assert!(report.to_report().has_failures());
    }
}
