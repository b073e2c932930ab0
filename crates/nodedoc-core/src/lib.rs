//! nodedoc core library
//!
//! Analysis engine behind the `nodedoc` CLI: manifest and lockfile parsing,
//! npm version ranges, environment probing, the individual dependency
//! checks, and the skill library with its trigger rules.

pub mod checks;
pub mod config;
pub mod constants;
pub mod error;
pub mod jsonc;
pub mod lockfile;
pub mod manifest;
pub mod paths;
pub mod process;
pub mod registry;
pub mod report;
pub mod skills;
pub mod toolchain;
pub mod tree;
pub mod versions;

pub use config::Settings;
pub use error::DoctorError;
pub use manifest::PackageJson;
pub use report::{Finding, Report, Section, Status};
