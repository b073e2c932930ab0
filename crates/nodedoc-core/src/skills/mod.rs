//! Skill library and trigger rules
//!
//! Skills are Markdown guides an assistant loads for a topic (dependency
//! troubleshooting, TypeScript style, React state).
//!
//! # Directory Structure
//!
//! Skills are stored in two locations:
//! - Global: `~/.nodedoc/skills/`
//! - Project: `.claude/skills/` and `skills/` (configurable via
//!   `[skills] project_dirs`)
//!
//! Each skill is a directory containing a `SKILL.md` file with YAML front
//! matter:
//!
//! ```yaml
//! ---
//! name: node-dependency-troubleshooter
//! description: Diagnose npm/yarn/pnpm install failures
//! version: 1.0.0
//! ---
//!
//! # Node Dependency Troubleshooter
//!
//! [Instructions...]
//! ```
//!
//! Any of those directories may also hold a `skill-rules.json` deciding
//! when a skill should surface (see [`rules`]).
//!
//! # Usage
//!
//! ```rust,ignore
//! use nodedoc_core::skills::SkillsManager;
//!
//! let manager = SkillsManager::with_defaults(&project_dir, &settings.skills);
//!
//! for skill in manager.list_skills() {
//!     println!("{}: {}", skill.name, skill.description);
//! }
//!
//! for hit in manager.match_prompt("npm ERR! ERESOLVE could not resolve")? {
//!     println!("{} ({})", hit.skill, hit.reason);
//! }
//! ```

mod loader;
mod manager;
pub mod rules;
mod skill;

pub use manager::{SkillsManager, ValidationReport};
pub use rules::{MatchReason, Priority, SkillMatch, SkillRules};
pub use skill::{Skill, SkillInfo, SkillSource};

pub use loader::{is_valid_skill_name, load_skill, load_skill_file, load_skills_from_dir, scaffold_skill};
