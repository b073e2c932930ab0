//! Subcommand handlers
//!
//! Each handler loads what it needs, runs one check from `nodedoc_core` and
//! hands the typed result to [`Output`]. The returned flag says whether the
//! result contains failures (for `--strict`).

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context as _, Result};
use nodedoc_core::checks::{
    audit, breaking, bundle, diagnose, engines, eslint, monorepo, peers, react_native, tsconfig,
    Project,
};
use nodedoc_core::lockfile::{Lockfile, LockfileKind};
use nodedoc_core::paths;
use nodedoc_core::process::{CommandRunner, SystemRunner};
use nodedoc_core::registry::{NpmCliRegistry, PackageRegistry};
use nodedoc_core::skills::SkillsManager;
use nodedoc_core::toolchain::{Platform, ToolVersions};
use nodedoc_core::tree::{build_tree, TreeOptions};
use nodedoc_core::Settings;
use tracing::debug;

use crate::output::Output;
use crate::{ConfigCommand, SkillsCommand};

/// Shared state for one invocation
pub struct Context {
    pub dir: PathBuf,
    pub settings: Settings,
    pub output: Output,
    runner: Arc<SystemRunner>,
}

impl Context {
    pub fn new(dir: PathBuf, settings: Settings, output: Output) -> Self {
        let runner = Arc::new(SystemRunner::new(settings.registry.timeout()));
        Self {
            dir,
            settings,
            output,
            runner,
        }
    }

    fn project(&self) -> Result<Project> {
        Project::load(&self.dir)
    }

    fn registry(&self) -> Arc<dyn PackageRegistry> {
        Arc::new(NpmCliRegistry::new(
            self.runner.clone(),
            self.settings.registry.npm_command.clone(),
            self.dir.clone(),
        ))
    }

    async fn tools(&self) -> ToolVersions {
        ToolVersions::detect(self.runner.as_ref(), &self.dir).await
    }

    fn lockfile(&self, file: Option<PathBuf>) -> Result<Lockfile> {
        let path = match file {
            Some(path) => path,
            None => LockfileKind::detect(&self.dir)
                .map(|(_, path)| path)
                .ok_or_else(|| anyhow!("No lock file found in {:?}", self.dir))?,
        };
        Lockfile::load(&path)
    }
}

pub async fn diagnose(ctx: &Context) -> Result<bool> {
    let runner: &dyn CommandRunner = ctx.runner.as_ref();
    let report = diagnose::diagnose(&ctx.dir, runner, &ctx.settings).await;
    ctx.output.emit(&report)
}

pub async fn node_version(ctx: &Context) -> Result<bool> {
    let project = ctx.project()?;
    let tools = ctx.tools().await;
    ctx.output.emit(&engines::check_node_version(&project, &tools))
}

pub async fn engines(ctx: &Context) -> Result<bool> {
    let project = ctx.project()?;
    let tools = ctx.tools().await;
    let report = engines::validate_engines(
        &project,
        &tools,
        &Platform::current(),
        &ctx.settings.display,
    );
    ctx.output.emit(&report)
}

pub fn lock(ctx: &Context, file: Option<PathBuf>) -> Result<bool> {
    let lockfile = ctx.lockfile(file)?;
    ctx.output
        .emit(&lockfile.duplicate_report(&ctx.settings.display))
}

pub fn tree(
    ctx: &Context,
    file: Option<PathBuf>,
    package: Option<String>,
    duplicates_only: bool,
    max_depth: Option<usize>,
) -> Result<bool> {
    let lockfile = ctx.lockfile(file)?;
    let options = TreeOptions {
        focus: package,
        duplicates_only,
        max_depth,
        max_paths: ctx.settings.display.max_paths,
    };
    ctx.output.emit(&build_tree(&lockfile, &options))
}

pub fn monorepo(ctx: &Context) -> Result<bool> {
    ctx.output
        .emit(&monorepo::check_monorepo(&ctx.dir, &ctx.settings.display)?)
}

pub async fn audit(ctx: &Context, input: Option<PathBuf>) -> Result<bool> {
    let (data, source) = match input {
        Some(path) => (
            audit::AuditOutput::load(&path)?,
            format!("Loaded audit data from: {}", path.display()),
        ),
        None => {
            let npm = &ctx.settings.registry.npm_command;
            (
                audit::AuditOutput::run(ctx.runner.as_ref(), npm, &ctx.dir).await?,
                format!("Ran: {} audit --json", npm),
            )
        }
    };
    ctx.output.emit(&audit::analyze_audit(&data, source))
}

pub async fn peers(ctx: &Context) -> Result<bool> {
    let project = ctx.project()?;
    let report =
        peers::resolve_peers(&project, ctx.registry(), ctx.settings.registry.concurrency).await?;
    ctx.output.emit(&report)
}

pub async fn breaking(ctx: &Context) -> Result<bool> {
    let project = ctx.project()?;
    let report = breaking::check_breaking_changes(
        &project,
        ctx.registry(),
        ctx.settings.registry.concurrency,
    )
    .await?;
    ctx.output.emit(&report)
}

pub async fn bundle(ctx: &Context) -> Result<bool> {
    let project = ctx.project()?;
    let report =
        bundle::analyze_bundle(&project, ctx.registry(), ctx.settings.registry.concurrency).await?;
    ctx.output.emit(&report)
}

pub fn eslint(ctx: &Context) -> Result<bool> {
    let project = ctx.project()?;
    ctx.output.emit(&eslint::resolve_eslint(&project)?)
}

pub fn tsconfig(ctx: &Context, path: Option<String>) -> Result<bool> {
    let project = ctx.project()?;
    ctx.output
        .emit(&tsconfig::validate_tsconfig(&project, path.as_deref())?)
}

pub fn rn_doctor(ctx: &Context) -> Result<bool> {
    let project = ctx.project()?;
    ctx.output.emit(&react_native::check_react_native(&project))
}

pub fn skills(ctx: &Context, command: SkillsCommand) -> Result<bool> {
    let mut manager = SkillsManager::with_defaults(&ctx.dir, &ctx.settings.skills);

    match command {
        SkillsCommand::List => {
            let skills = manager.list_skills();
            if ctx.output.json {
                ctx.output.json(&skills)?;
            } else if skills.is_empty() {
                println!("No skills found. Create one with: nodedoc skills new <name>");
            } else {
                for skill in skills {
                    let version = skill
                        .version
                        .map(|v| format!(" v{}", v))
                        .unwrap_or_default();
                    println!(
                        "{}{} [{}] - {}",
                        skill.name, version, skill.source, skill.description
                    );
                }
            }
            Ok(false)
        }
        SkillsCommand::Show { name, file } => {
            let content = match file {
                Some(file) => manager.load_skill_file(&name, &file)?,
                None => manager.load_skill_content(&name)?,
            };
            if ctx.output.json {
                ctx.output.json(&serde_json::json!({ "skill": name, "content": content }))?;
            } else {
                print!("{}", content);
            }
            Ok(false)
        }
        SkillsCommand::New {
            name,
            description,
            global,
        } => {
            let path = manager.create_skill(&name, &description, global)?;
            if ctx.output.json {
                ctx.output.json(&serde_json::json!({ "skill": name, "path": path }))?;
            } else {
                println!("Created skill '{}' at {}", name, path.display());
            }
            Ok(false)
        }
        SkillsCommand::Match {
            prompt,
            file,
            no_content,
        } => {
            let matches = match (prompt, file) {
                (Some(prompt), None) => manager.match_prompt(&prompt)?,
                (None, Some(file)) => {
                    let content = if no_content {
                        None
                    } else {
                        read_optional(&ctx.dir.join(&file))?
                    };
                    let path = file.to_string_lossy().replace('\\', "/");
                    manager.match_file(&path, content.as_deref())?
                }
                _ => return Err(anyhow!("Pass either --prompt or --file")),
            };
            if ctx.output.json {
                ctx.output.json(&matches)?;
            } else if matches.is_empty() {
                println!("No skills matched");
            } else {
                for hit in &matches {
                    println!("{} ({}) - matched {}", hit.skill, hit.priority, hit.reason);
                }
            }
            Ok(false)
        }
        SkillsCommand::Validate => ctx.output.emit(&manager.validate()?),
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    if !path.is_file() {
        debug!("{:?} does not exist; matching on path only", path);
        return Ok(None);
    }
    let bytes = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
    match String::from_utf8(bytes) {
        Ok(content) => Ok(Some(content)),
        Err(_) => {
            debug!("{:?} is not UTF-8 text; matching on path only", path);
            Ok(None)
        }
    }
}

pub fn config(ctx: &Context, command: ConfigCommand) -> Result<bool> {
    match command {
        ConfigCommand::Show => {
            if ctx.output.json {
                ctx.output.json(&ctx.settings)?;
            } else {
                print!("{}", ctx.settings.to_toml()?);
            }
        }
        ConfigCommand::Path => {
            let global = paths::global_config_path();
            let project = paths::project_config_path(&ctx.dir);
            if ctx.output.json {
                ctx.output
                    .json(&serde_json::json!({ "global": global, "project": project }))?;
            } else {
                println!("global:  {}", global.display());
                println!("project: {}", project.display());
            }
        }
    }
    Ok(false)
}
