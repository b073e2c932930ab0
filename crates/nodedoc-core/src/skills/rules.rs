//! Skill trigger rules (`skill-rules.json`)
//!
//! ```json
//! {
//!   "version": "1.0",
//!   "skills": {
//!     "node-dependency-troubleshooter": {
//!       "type": "domain",
//!       "enforcement": "suggest",
//!       "priority": "high",
//!       "promptTriggers": {
//!         "keywords": ["peer dependency", "ERESOLVE"],
//!         "intentPatterns": ["(fix|resolve).*?(dependency|install)"]
//!       },
//!       "fileTriggers": {
//!         "pathPatterns": ["**/package.json"],
//!         "pathExclusions": ["**/node_modules/**"],
//!         "contentPatterns": ["\"dependencies\""]
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Patterns are compiled once by [`SkillRules::compile`]; a bad regex or glob
//! fails the whole file with [`DoctorError::InvalidTrigger`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DoctorError;

/// Matching order: critical first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptTriggers {
    pub keywords: Vec<String>,
    pub intent_patterns: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileTriggers {
    pub path_patterns: Vec<String>,
    pub path_exclusions: Vec<String>,
    pub content_patterns: Vec<String>,
}

/// One entry under `skills` as written in the file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleDefinition {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub enforcement: Option<String>,
    pub priority: Priority,
    pub prompt_triggers: Option<PromptTriggers>,
    pub file_triggers: Option<FileTriggers>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RulesFile {
    pub version: Option<String>,
    pub skills: BTreeMap<String, RuleDefinition>,
}

impl RulesFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }

    /// Overlay `other`: its rules replace same-named ones here
    pub fn merge(&mut self, other: RulesFile) {
        if other.version.is_some() {
            self.version = other.version;
        }
        self.skills.extend(other.skills);
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    skill: String,
    kind: Option<String>,
    enforcement: Option<String>,
    priority: Priority,
    keywords: Vec<String>,
    intents: Vec<Regex>,
    paths: Vec<Pattern>,
    exclusions: Vec<Pattern>,
    contents: Vec<Regex>,
}

/// What made a skill match
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "pattern", rename_all = "snake_case")]
pub enum MatchReason {
    Keyword(String),
    Intent(String),
    Path(String),
    Content(String),
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchReason::Keyword(k) => write!(f, "keyword '{}'", k),
            MatchReason::Intent(p) => write!(f, "intent /{}/", p),
            MatchReason::Path(p) => write!(f, "path {}", p),
            MatchReason::Content(p) => write!(f, "content /{}/", p),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkillMatch {
    pub skill: String,
    pub priority: Priority,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub enforcement: Option<String>,
    pub reason: MatchReason,
}

const PATH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

fn compile_regex(skill: &str, kind: &'static str, pattern: &str) -> Result<Regex, DoctorError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| DoctorError::InvalidTrigger {
            skill: skill.to_string(),
            kind,
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })
}

fn compile_glob(skill: &str, kind: &'static str, pattern: &str) -> Result<Pattern, DoctorError> {
    Pattern::new(pattern).map_err(|e| DoctorError::InvalidTrigger {
        skill: skill.to_string(),
        kind,
        pattern: pattern.to_string(),
        reason: e.msg.to_string(),
    })
}

fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.strip_prefix("./").unwrap_or(&path).to_string()
}

/// Compiled trigger rules, ready for matching
#[derive(Debug, Clone, Default)]
pub struct SkillRules {
    rules: Vec<CompiledRule>,
}

impl SkillRules {
    pub fn compile(file: &RulesFile) -> Result<Self, DoctorError> {
        let mut rules = Vec::with_capacity(file.skills.len());
        for (skill, def) in &file.skills {
            let prompt = def.prompt_triggers.clone().unwrap_or_default();
            let files = def.file_triggers.clone().unwrap_or_default();

            rules.push(CompiledRule {
                skill: skill.clone(),
                kind: def.kind.clone(),
                enforcement: def.enforcement.clone(),
                priority: def.priority,
                keywords: prompt.keywords,
                intents: prompt
                    .intent_patterns
                    .iter()
                    .map(|p| compile_regex(skill, "intent", p))
                    .collect::<Result<_, _>>()?,
                paths: files
                    .path_patterns
                    .iter()
                    .map(|p| compile_glob(skill, "path", p))
                    .collect::<Result<_, _>>()?,
                exclusions: files
                    .path_exclusions
                    .iter()
                    .map(|p| compile_glob(skill, "path exclusion", p))
                    .collect::<Result<_, _>>()?,
                contents: files
                    .content_patterns
                    .iter()
                    .map(|p| compile_regex(skill, "content", p))
                    .collect::<Result<_, _>>()?,
            });
        }
        debug!("Compiled trigger rules for {} skill(s)", rules.len());
        Ok(Self { rules })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = RulesFile::load(path)?;
        Ok(Self::compile(&file)?)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn skill_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.skill.as_str())
    }

    /// Skills whose prompt triggers fire for `prompt`
    pub fn match_prompt(&self, prompt: &str) -> Vec<SkillMatch> {
        let lowered = prompt.to_lowercase();
        let matches = self.rules.iter().filter_map(|rule| {
            let reason = rule
                .keywords
                .iter()
                .find(|k| !k.is_empty() && lowered.contains(&k.to_lowercase()))
                .map(|k| MatchReason::Keyword(k.clone()))
                .or_else(|| {
                    rule.intents
                        .iter()
                        .find(|re| re.is_match(prompt))
                        .map(|re| MatchReason::Intent(re.as_str().to_string()))
                })?;
            Some(rule.to_match(reason))
        });
        sorted(matches.collect())
    }

    /// Skills whose file triggers fire for `path`
    ///
    /// Without `content`, a path match is enough. With it, rules that define
    /// content patterns also need one of them to match.
    pub fn match_file(&self, path: &str, content: Option<&str>) -> Vec<SkillMatch> {
        let path = normalize_path(path);
        let matches = self.rules.iter().filter_map(|rule| {
            let pattern = rule
                .paths
                .iter()
                .find(|p| p.matches_with(&path, PATH_OPTIONS))?;
            if rule
                .exclusions
                .iter()
                .any(|p| p.matches_with(&path, PATH_OPTIONS))
            {
                return None;
            }

            let reason = match content {
                Some(content) if !rule.contents.is_empty() => {
                    let re = rule.contents.iter().find(|re| re.is_match(content))?;
                    MatchReason::Content(re.as_str().to_string())
                }
                _ => MatchReason::Path(pattern.as_str().to_string()),
            };
            Some(rule.to_match(reason))
        });
        sorted(matches.collect())
    }
}

impl CompiledRule {
    fn to_match(&self, reason: MatchReason) -> SkillMatch {
        SkillMatch {
            skill: self.skill.clone(),
            priority: self.priority,
            kind: self.kind.clone(),
            enforcement: self.enforcement.clone(),
            reason,
        }
    }
}

fn sorted(mut matches: Vec<SkillMatch>) -> Vec<SkillMatch> {
    matches.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.skill.cmp(&b.skill)));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    const RULES: &str = r#"{
        "version": "1.0",
        "skills": {
            "node-dependency-troubleshooter": {
                "type": "domain",
                "enforcement": "suggest",
                "priority": "high",
                "promptTriggers": {
                    "keywords": ["peer dependency", "ERESOLVE"],
                    "intentPatterns": ["(fix|resolve).*?(dependency|install)"]
                },
                "fileTriggers": {
                    "pathPatterns": ["package.json", "**/package.json"],
                    "pathExclusions": ["**/node_modules/**"],
                    "contentPatterns": ["\"(dev)?dependencies\""]
                }
            },
            "typescript-style": {
                "priority": "critical",
                "promptTriggers": {"keywords": ["typescript"]},
                "fileTriggers": {"pathPatterns": ["src/**/*.ts", "src/**/*.tsx"]}
            },
            "react-state": {
                "priority": "low",
                "promptTriggers": {"keywords": ["useState", "dependency array"]}
            }
        }
    }"#;

    fn rules() -> SkillRules {
        let file: RulesFile = serde_json::from_str(RULES).unwrap();
        SkillRules::compile(&file).unwrap()
    }

    fn names(matches: &[SkillMatch]) -> Vec<&str> {
        matches.iter().map(|m| m.skill.as_str()).collect()
    }

    #[test]
    fn test_prompt_keywords_and_intents() {
        let rules = rules();
        assert_eq!(rules.len(), 3);

        let matches = rules.match_prompt("npm ERR! code eresolve while installing");
        assert_eq!(names(&matches), ["node-dependency-troubleshooter"]);
        assert_eq!(matches[0].reason, MatchReason::Keyword("ERESOLVE".into()));

        let matches = rules.match_prompt("Please FIX this broken dependency");
        assert!(matches!(matches[0].reason, MatchReason::Intent(_)));

        assert!(rules.match_prompt("write a haiku").is_empty());
    }

    #[test]
    fn test_prompt_matches_sorted_by_priority() {
        let matches = rules().match_prompt("typescript peer dependency and the useState dependency array");
        assert_eq!(
            names(&matches),
            ["typescript-style", "node-dependency-troubleshooter", "react-state"]
        );
        assert_eq!(matches[0].priority, Priority::Critical);
    }

    #[test]
    fn test_file_triggers() {
        let rules = rules();

        assert_eq!(
            names(&rules.match_file("./packages/ui/package.json", None)),
            ["node-dependency-troubleshooter"]
        );
        assert!(rules
            .match_file("node_modules/react/package.json", None)
            .is_empty());
        assert_eq!(names(&rules.match_file("src/app/main.tsx", None)), ["typescript-style"]);
        // `*` does not cross directories
        assert!(rules.match_file("lib/src/a.ts", None).is_empty());

        let with_deps = rules.match_file("package.json", Some(r#"{"dependencies": {}}"#));
        assert!(matches!(with_deps[0].reason, MatchReason::Content(_)));
        assert!(rules
            .match_file("package.json", Some(r#"{"name": "x"}"#))
            .is_empty());
    }

    #[test]
    fn test_invalid_patterns_name_the_skill() {
        let file: RulesFile = serde_json::from_str(
            r#"{"skills": {"broken": {"promptTriggers": {"intentPatterns": ["(unclosed"]}}}}"#,
        )
        .unwrap();
        let err = SkillRules::compile(&file).unwrap_err();
        assert!(matches!(
            &err,
            DoctorError::InvalidTrigger { skill, kind: "intent", .. } if skill == "broken"
        ));

        let file: RulesFile = serde_json::from_str(
            r#"{"skills": {"globby": {"fileTriggers": {"pathPatterns": ["src/[a"]}}}}"#,
        )
        .unwrap();
        assert!(SkillRules::compile(&file).is_err());
    }

    #[test]
    fn test_merge_overrides_by_name() {
        let mut base: RulesFile = serde_json::from_str(RULES).unwrap();
        let project: RulesFile = serde_json::from_str(
            r#"{"skills": {"react-state": {"priority": "critical"}, "extra": {}}}"#,
        )
        .unwrap();
        base.merge(project);
        assert_eq!(base.skills.len(), 4);
        assert_eq!(base.skills["react-state"].priority, Priority::Critical);
        assert_eq!(base.version.as_deref(), Some("1.0"));
    }
}
