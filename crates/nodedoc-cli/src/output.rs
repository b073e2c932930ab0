//! Report printing for text and `--json` modes

use anyhow::{Context, Result};
use nodedoc_core::report::IntoReport;
use serde::Serialize;

/// How results are written to stdout
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// Print a check result; returns whether it contains failures
    pub fn emit<T>(&self, result: &T) -> Result<bool>
    where
        T: Serialize + IntoReport,
    {
        let report = result.to_report();
        if self.json {
            self.json(result)?;
        } else {
            print!("{}", report);
        }
        Ok(report.has_failures())
    }

    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let rendered =
            serde_json::to_string_pretty(value).context("Failed to serialize result as JSON")?;
        println!("{}", rendered);
        Ok(())
    }
}
