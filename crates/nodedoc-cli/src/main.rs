//! nodedoc - Node.js dependency doctor
//!
//! Diagnoses install failures, version conflicts and config problems in
//! npm / yarn / pnpm projects, and manages the skill library that tells an
//! assistant when to reach for these checks.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use nodedoc_core::Settings;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::Context;
use output::Output;

/// Environment variable holding a tracing filter (e.g. `nodedoc_core=debug`)
const LOG_ENV: &str = "NODEDOC_LOG";

/// nodedoc - Node.js dependency doctor
#[derive(Parser)]
#[command(name = "nodedoc", version)]
#[command(about = "Diagnose and fix Node.js dependency problems", long_about = None)]
struct Cli {
    /// Project directory
    #[arg(short = 'C', long, global = true, default_value = ".")]
    dir: PathBuf,

    /// Print the typed result as JSON instead of a text report
    #[arg(long, global = true)]
    json: bool,

    /// Exit with status 1 when the report contains failures
    #[arg(long, global = true)]
    strict: bool,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every quick check and suggest next steps
    Diagnose,

    /// Compare installed Node.js and package managers with `engines`
    NodeVersion,

    /// Validate `engines`, `os` and `cpu`, including installed dependencies
    Engines,

    /// Find packages installed at several versions
    Lock {
        /// package-lock.json, yarn.lock or pnpm-lock.yaml (detected if omitted)
        file: Option<PathBuf>,
    },

    /// Show the dependency tree from a lock file
    Tree {
        /// Lock file (detected if omitted)
        file: Option<PathBuf>,

        /// Show only this package
        #[arg(short, long)]
        package: Option<String>,

        /// Show only packages installed at several versions
        #[arg(short, long)]
        duplicates_only: bool,

        /// Hide instances nested deeper than this
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Check workspace configuration, versions and references
    Monorepo,

    /// Summarize `npm audit` results with fix commands
    Audit {
        /// Read saved `npm audit --json` output instead of running npm
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Find conflicting peer dependency requirements
    Peers,

    /// List dependencies whose latest release is a new major version
    Breaking,

    /// Estimate production dependency weight
    Bundle,

    /// Resolve ESLint config, plugins and shared configs
    Eslint,

    /// Validate tsconfig.json and its `extends` chain
    Tsconfig {
        /// Config file relative to the project
        #[arg(short, long)]
        path: Option<String>,
    },

    /// React Native compatibility and native setup checks
    RnDoctor,

    /// Manage skills and test trigger rules
    #[command(subcommand)]
    Skills(SkillsCommand),

    /// Show effective settings
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand)]
pub enum SkillsCommand {
    /// List available skills
    List,

    /// Print a skill, or one of its files
    Show {
        name: String,

        /// File inside the skill directory
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Scaffold a new skill
    New {
        name: String,

        /// One-line summary used for discovery
        #[arg(short, long)]
        description: String,

        /// Create in ~/.nodedoc/skills instead of the project
        #[arg(short, long)]
        global: bool,
    },

    /// Show which skills a prompt or file would trigger
    Match {
        #[arg(short, long, conflicts_with = "file")]
        prompt: Option<String>,

        /// Path relative to the project
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Match on the path only, ignoring file contents
        #[arg(long, requires = "file")]
        no_content: bool,
    },

    /// Check skill documents and trigger rules
    Validate,
}

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Print effective settings as TOML
    Show,

    /// Print settings file locations
    Path,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = Settings::load(&cli.dir)
        .with_context(|| format!("Failed to load settings for {:?}", cli.dir))?;
    let ctx = Context::new(cli.dir, settings, Output { json: cli.json });
    tracing::debug!("Project directory: {:?}", ctx.dir);

    let has_failures = match cli.command {
        Commands::Diagnose => commands::diagnose(&ctx).await?,
        Commands::NodeVersion => commands::node_version(&ctx).await?,
        Commands::Engines => commands::engines(&ctx).await?,
        Commands::Lock { file } => commands::lock(&ctx, file)?,
        Commands::Tree {
            file,
            package,
            duplicates_only,
            max_depth,
        } => commands::tree(&ctx, file, package, duplicates_only, max_depth)?,
        Commands::Monorepo => commands::monorepo(&ctx)?,
        Commands::Audit { input } => commands::audit(&ctx, input).await?,
        Commands::Peers => commands::peers(&ctx).await?,
        Commands::Breaking => commands::breaking(&ctx).await?,
        Commands::Bundle => commands::bundle(&ctx).await?,
        Commands::Eslint => commands::eslint(&ctx)?,
        Commands::Tsconfig { path } => commands::tsconfig(&ctx, path)?,
        Commands::RnDoctor => commands::rn_doctor(&ctx)?,
        Commands::Skills(command) => commands::skills(&ctx, command)?,
        Commands::Config(command) => commands::config(&ctx, command)?,
    };

    if cli.strict && has_failures {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
