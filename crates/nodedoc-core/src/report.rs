//! Report model and text rendering
//!
//! Every check converts its typed result into a [`Report`]. The CLI prints the
//! rendered text, or serializes the typed result for `--json`.

use std::fmt;

use serde::Serialize;

use crate::constants::BANNER_WIDTH;

/// Outcome of a single finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pass,
    Info,
    Warn,
    Fail,
    Skip,
}

impl Status {
    pub fn marker(&self) -> &'static str {
        match self {
            Status::Pass => "✓",
            Status::Info => "ℹ",
            Status::Warn => "⚠",
            Status::Fail => "✗",
            Status::Skip => "-",
        }
    }

    pub fn is_problem(&self) -> bool {
        matches!(self, Status::Warn | Status::Fail)
    }
}

/// One line of a section, with optional indented detail lines
#[derive(Debug, Clone, Serialize)]
pub struct Finding {
    pub status: Status,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl Finding {
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn pass(message: impl Into<String>) -> Self {
        Self::new(Status::Pass, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(Status::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(Status::Warn, message)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(Status::Fail, message)
    }

    pub fn skip(message: impl Into<String>) -> Self {
        Self::new(Status::Skip, message)
    }

    pub fn detail(mut self, line: impl Into<String>) -> Self {
        self.details.push(line.into());
        self
    }

    pub fn details<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.details.extend(lines.into_iter().map(Into::into));
        self
    }
}

/// A titled group of findings
#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub title: String,
    pub findings: Vec<Finding>,
}

impl Section {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            findings: Vec::new(),
        }
    }

    pub fn push(&mut self, finding: Finding) -> &mut Self {
        self.findings.push(finding);
        self
    }

    pub fn with(mut self, finding: Finding) -> Self {
        self.findings.push(finding);
        self
    }

    /// Push findings, truncating after `limit` with an "... and N more" line
    pub fn push_limited<I>(&mut self, findings: I, limit: usize, noun: &str)
    where
        I: IntoIterator<Item = Finding>,
    {
        let findings: Vec<Finding> = findings.into_iter().collect();
        let total = findings.len();
        self.findings.extend(findings.into_iter().take(limit));
        if total > limit {
            self.findings.push(Finding::skip(format!(
                "... and {} more {}",
                total - limit,
                noun
            )));
        }
    }
}

/// A complete rendered check
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub title: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preamble: Vec<String>,
    pub sections: Vec<Section>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recommendations: Vec<String>,
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            preamble: Vec::new(),
            sections: Vec::new(),
            recommendations: Vec::new(),
        }
    }

    /// Free-form line printed under the title
    pub fn line(mut self, line: impl Into<String>) -> Self {
        self.preamble.push(line.into());
        self
    }

    pub fn section(mut self, section: Section) -> Self {
        self.sections.push(section);
        self
    }

    pub fn recommend(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendations.push(recommendation.into());
        self
    }

    pub fn recommend_all<I, S>(mut self, recommendations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.recommendations
            .extend(recommendations.into_iter().map(Into::into));
        self
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.sections.iter().flat_map(|s| s.findings.iter())
    }

    pub fn has_failures(&self) -> bool {
        self.findings().any(|f| f.status == Status::Fail)
    }

    /// Number of warn + fail findings
    pub fn problem_count(&self) -> usize {
        self.findings().filter(|f| f.status.is_problem()).count()
    }
}

/// Typed check results that render as a report
pub trait IntoReport {
    fn to_report(&self) -> Report;
}

fn banner(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    let rule = "=".repeat(BANNER_WIDTH);
    writeln!(f, "{}", rule)?;
    writeln!(f, "{}", title)?;
    writeln!(f, "{}", rule)
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        banner(f, &self.title)?;

        if !self.preamble.is_empty() {
            writeln!(f)?;
            for line in &self.preamble {
                writeln!(f, "{}", line)?;
            }
        }

        for section in &self.sections {
            writeln!(f)?;
            writeln!(f, "{}", section.title)?;
            for finding in &section.findings {
                writeln!(f, "  {} {}", finding.status.marker(), finding.message)?;
                for detail in &finding.details {
                    writeln!(f, "      {}", detail)?;
                }
            }
        }

        if !self.recommendations.is_empty() {
            writeln!(f)?;
            banner(f, "RECOMMENDATIONS")?;
            writeln!(f)?;
            for (i, rec) in self.recommendations.iter().enumerate() {
                writeln!(f, "  {}. {}", i + 1, rec)?;
            }
        }

        Ok(())
    }
}
