//! npm version specifiers and ranges
//!
//! `semver::VersionReq` follows Cargo's rules (a bare `1.2.3` means `^1.2.3`,
//! comparators are comma separated, no `||`). npm differs on all of those, so
//! ranges are parsed here and evaluated against `semver::Version`.

use std::fmt;

use semver::{BuildMetadata, Prerelease, Version};
use serde::Serialize;

use crate::error::DoctorError;

/// Parse a concrete version loosely (`v18.17.0`, `=1.2.3`, `20`, `20.1`)
pub fn parse_version(input: &str) -> Option<Version> {
    let trimmed = input.trim().trim_start_matches('=').trim_start_matches('v').trim();
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let partial = Partial::parse(trimmed).ok()?;
    if partial.is_wildcard() {
        return None;
    }
    Some(partial.floor())
}

/// What a dependency value in package.json refers to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum VersionSpec {
    /// A semver range resolved against the registry
    Range(String),
    /// A dist-tag such as `latest` or `next`
    Tag(String),
    /// `workspace:*`, `workspace:^1.0.0`
    Workspace(String),
    /// `npm:other-package@^1.0.0`
    Alias { package: String, range: String },
    /// `file:`, `link:`, or a relative/absolute path
    Path(String),
    /// `git+https://...`, `github:user/repo`, `user/repo`
    Git(String),
    /// Tarball URL
    Url(String),
}

impl VersionSpec {
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();

        if let Some(rest) = spec.strip_prefix("workspace:") {
            return VersionSpec::Workspace(rest.to_string());
        }
        if let Some(rest) = spec.strip_prefix("npm:") {
            let (package, range) = split_name_and_range(rest);
            return VersionSpec::Alias {
                package: package.to_string(),
                range: range.unwrap_or("*").to_string(),
            };
        }
        if spec.starts_with("file:")
            || spec.starts_with("link:")
            || spec.starts_with("./")
            || spec.starts_with("../")
            || spec.starts_with('/')
            || spec.starts_with("~/")
        {
            return VersionSpec::Path(spec.to_string());
        }
        if spec.starts_with("git")
            || spec.starts_with("github:")
            || spec.starts_with("gitlab:")
            || spec.starts_with("bitbucket:")
        {
            return VersionSpec::Git(spec.to_string());
        }
        if spec.starts_with("http://") || spec.starts_with("https://") {
            return VersionSpec::Url(spec.to_string());
        }
        if Range::parse(spec).is_ok() {
            return VersionSpec::Range(spec.to_string());
        }
        // `user/repo` shorthand points at GitHub
        if spec.contains('/') && !spec.contains(' ') {
            return VersionSpec::Git(spec.to_string());
        }
        VersionSpec::Tag(spec.to_string())
    }

    /// Range to resolve against the registry, if this spec has one
    pub fn registry_range(&self) -> Option<&str> {
        match self {
            VersionSpec::Range(range) => Some(range),
            VersionSpec::Alias { range, .. } => Some(range),
            _ => None,
        }
    }

    /// Whether the spec is resolved from the npm registry at all
    pub fn is_registry(&self) -> bool {
        matches!(
            self,
            VersionSpec::Range(_) | VersionSpec::Tag(_) | VersionSpec::Alias { .. }
        )
    }
}

/// Split `name@range`, respecting a leading scope `@`
pub fn split_name_and_range(input: &str) -> (&str, Option<&str>) {
    let search_from = usize::from(input.starts_with('@'));
    match input[search_from..].find('@') {
        Some(idx) => {
            let at = idx + search_from;
            (&input[..at], Some(&input[at + 1..]))
        }
        None => (input, None),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Comparator {
    op: Op,
    version: Version,
}

impl Comparator {
    fn new(op: Op, version: Version) -> Self {
        Self { op, version }
    }

    fn matches(&self, version: &Version) -> bool {
        match self.op {
            Op::Gt => version > &self.version,
            Op::Gte => version >= &self.version,
            Op::Lt => version < &self.version,
            Op::Lte => version <= &self.version,
            Op::Eq => version == &self.version,
        }
    }
}

/// A version with optional minor/patch, as written in a range
#[derive(Debug, Clone, PartialEq, Eq)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Prerelease,
}

impl Partial {
    fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim_start_matches('v');
        // Build metadata never affects matching
        let input = input.split('+').next().unwrap_or_default();
        let (core, pre) = match input.split_once('-') {
            Some((core, pre)) => (core, pre),
            None => (input, ""),
        };

        let mut parts = core.split('.');
        let major = parse_part(parts.next())?;
        let minor = parse_part(parts.next())?;
        let patch = parse_part(parts.next())?;
        if parts.next().is_some() {
            return Err(format!("too many components in '{}'", input));
        }
        // `1.x.3` is meaningless; a wildcard swallows everything after it
        let minor = major.and(minor);
        let patch = minor.and(patch);

        let pre = if pre.is_empty() || patch.is_none() {
            Prerelease::EMPTY
        } else {
            Prerelease::new(pre).map_err(|e| e.to_string())?
        };

        Ok(Self {
            major,
            minor,
            patch,
            pre,
        })
    }

    fn is_wildcard(&self) -> bool {
        self.major.is_none()
    }

    /// Lowest version this partial covers
    fn floor(&self) -> Version {
        Version {
            major: self.major.unwrap_or(0),
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            pre: self.pre.clone(),
            build: BuildMetadata::EMPTY,
        }
    }
}

/// Largest version component npm accepts (`Number.MAX_SAFE_INTEGER`); keeps
/// the `+ 1` upper bounds of caret, tilde and x-ranges from overflowing
const MAX_COMPONENT: u64 = (1 << 53) - 1;

fn parse_part(part: Option<&str>) -> Result<Option<u64>, String> {
    match part {
        None => Ok(None),
        Some("x" | "X" | "*" | "") => Ok(None),
        Some(text) => {
            let value = text
                .parse::<u64>()
                .map_err(|_| format!("'{}' is not a version number", text))?;
            if value > MAX_COMPONENT {
                return Err(format!("version component too large: {}", text));
            }
            Ok(Some(value))
        }
    }
}

fn version(major: u64, minor: u64, patch: u64) -> Version {
    Version::new(major, minor, patch)
}

/// An npm range: alternatives joined by `||`, each a set of comparators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    raw: String,
    sets: Vec<Vec<Comparator>>,
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Range {
    pub fn parse(input: &str) -> Result<Self, DoctorError> {
        let raw = input.trim();
        let mut sets = Vec::new();

        for alternative in raw.split("||") {
            let set = parse_comparator_set(alternative.trim())
                .map_err(|reason| DoctorError::invalid_range(raw, reason))?;
            sets.push(set);
        }

        Ok(Self {
            raw: raw.to_string(),
            sets,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// npm `satisfies`, including the prerelease opt-in rule
    pub fn satisfies(&self, version: &Version) -> bool {
        self.sets.iter().any(|set| set_matches(set, version))
    }

    /// Lowest version admitted by any alternative
    pub fn min_version(&self) -> Option<Version> {
        self.sets
            .iter()
            .filter_map(|set| set_min_version(set))
            .min()
    }

    /// Highest of `candidates` that satisfies the range
    pub fn max_satisfying<'a>(&self, candidates: &'a [Version]) -> Option<&'a Version> {
        candidates.iter().filter(|v| self.satisfies(v)).max()
    }

    /// Whether the range only admits a single version
    pub fn is_exact(&self) -> bool {
        self.sets.len() == 1 && self.sets[0].len() == 1 && self.sets[0][0].op == Op::Eq
    }
}

fn set_matches(set: &[Comparator], version: &Version) -> bool {
    if !set.iter().all(|c| c.matches(version)) {
        return false;
    }
    if version.pre.is_empty() {
        return true;
    }
    // Prereleases only match when a comparator opts into the same tuple
    set.iter().any(|c| {
        !c.version.pre.is_empty()
            && c.version.major == version.major
            && c.version.minor == version.minor
            && c.version.patch == version.patch
    })
}

fn set_min_version(set: &[Comparator]) -> Option<Version> {
    let mut floor = version(0, 0, 0);
    for comparator in set {
        match comparator.op {
            Op::Gte | Op::Eq if comparator.version > floor => floor = comparator.version.clone(),
            Op::Gt if comparator.version >= floor => {
                floor = comparator.version.clone();
                if floor.pre.is_empty() {
                    floor.patch = floor.patch.saturating_add(1);
                } else {
                    floor.pre = Prerelease::EMPTY;
                }
            }
            _ => {}
        }
    }
    set_matches(set, &floor).then_some(floor)
}

/// Tokenize a comparator set, gluing operators to the version that follows
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;

    for word in input.split_whitespace() {
        let is_bare_op = matches!(word, ">" | ">=" | "<" | "<=" | "=" | "^" | "~" | "~>");
        if is_bare_op {
            pending_op = Some(word.to_string());
            continue;
        }
        match pending_op.take() {
            Some(op) => tokens.push(format!("{}{}", op, word)),
            None => tokens.push(word.to_string()),
        }
    }
    if let Some(op) = pending_op {
        tokens.push(op);
    }
    tokens
}

fn parse_comparator_set(input: &str) -> Result<Vec<Comparator>, String> {
    let tokens = tokenize(input);

    if tokens.is_empty() {
        return Ok(vec![Comparator::new(Op::Gte, version(0, 0, 0))]);
    }

    // Hyphen range: `1.2.3 - 2.3.4`
    if tokens.len() == 3 && tokens[1] == "-" {
        let low = Partial::parse(&tokens[0])?;
        let high = Partial::parse(&tokens[2])?;
        let mut set = vec![Comparator::new(Op::Gte, low.floor())];
        set.extend(upper_inclusive(&high));
        return Ok(set);
    }

    let mut set = Vec::new();
    for token in &tokens {
        set.extend(parse_comparator(token)?);
    }
    Ok(set)
}

/// `<= partial`, where missing components widen the bound
fn upper_inclusive(partial: &Partial) -> Vec<Comparator> {
    match (partial.major, partial.minor, partial.patch) {
        (None, _, _) => Vec::new(),
        (Some(major), None, _) => vec![Comparator::new(Op::Lt, version(major + 1, 0, 0))],
        (Some(major), Some(minor), None) => {
            vec![Comparator::new(Op::Lt, version(major, minor + 1, 0))]
        }
        (Some(_), Some(_), Some(_)) => vec![Comparator::new(Op::Lte, partial.floor())],
    }
}

fn parse_comparator(token: &str) -> Result<Vec<Comparator>, String> {
    let (op, rest) = split_operator(token);
    let partial = Partial::parse(rest)?;

    let comparators = match op {
        "^" => caret(&partial),
        "~" | "~>" => tilde(&partial),
        ">" => match (partial.major, partial.minor, partial.patch) {
            // `>*` admits nothing
            (None, _, _) => vec![Comparator::new(Op::Lt, version(0, 0, 0))],
            (Some(major), None, _) => vec![Comparator::new(Op::Gte, version(major + 1, 0, 0))],
            (Some(major), Some(minor), None) => {
                vec![Comparator::new(Op::Gte, version(major, minor + 1, 0))]
            }
            _ => vec![Comparator::new(Op::Gt, partial.floor())],
        },
        ">=" => vec![Comparator::new(Op::Gte, partial.floor())],
        "<" => match partial.major {
            None => vec![Comparator::new(Op::Lt, version(0, 0, 0))],
            Some(_) => vec![Comparator::new(Op::Lt, partial.floor())],
        },
        "<=" => match partial.major {
            None => vec![Comparator::new(Op::Gte, version(0, 0, 0))],
            Some(_) => upper_inclusive(&partial),
        },
        "" | "=" => x_range(&partial),
        other => return Err(format!("unknown operator '{}'", other)),
    };
    Ok(comparators)
}

fn split_operator(token: &str) -> (&str, &str) {
    for op in [">=", "<=", "~>", ">", "<", "=", "^", "~"] {
        if let Some(rest) = token.strip_prefix(op) {
            return (op, rest.trim());
        }
    }
    ("", token)
}

fn x_range(partial: &Partial) -> Vec<Comparator> {
    match (partial.major, partial.minor, partial.patch) {
        (None, _, _) => vec![Comparator::new(Op::Gte, version(0, 0, 0))],
        (Some(major), None, _) => vec![
            Comparator::new(Op::Gte, version(major, 0, 0)),
            Comparator::new(Op::Lt, version(major + 1, 0, 0)),
        ],
        (Some(major), Some(minor), None) => vec![
            Comparator::new(Op::Gte, version(major, minor, 0)),
            Comparator::new(Op::Lt, version(major, minor + 1, 0)),
        ],
        _ => vec![Comparator::new(Op::Eq, partial.floor())],
    }
}

fn caret(partial: &Partial) -> Vec<Comparator> {
    let floor = partial.floor();
    let upper = match (partial.major, partial.minor, partial.patch) {
        (None, _, _) => return vec![Comparator::new(Op::Gte, version(0, 0, 0))],
        (Some(major), None, _) => version(major + 1, 0, 0),
        (Some(0), Some(minor), None) => version(0, minor + 1, 0),
        (Some(major), Some(_), None) => version(major + 1, 0, 0),
        (Some(0), Some(0), Some(patch)) => version(0, 0, patch + 1),
        (Some(0), Some(minor), Some(_)) => version(0, minor + 1, 0),
        (Some(major), Some(_), Some(_)) => version(major + 1, 0, 0),
    };
    vec![
        Comparator::new(Op::Gte, floor),
        Comparator::new(Op::Lt, upper),
    ]
}

fn tilde(partial: &Partial) -> Vec<Comparator> {
    let floor = partial.floor();
    let upper = match (partial.major, partial.minor) {
        (None, _) => return vec![Comparator::new(Op::Gte, version(0, 0, 0))],
        (Some(major), None) => version(major + 1, 0, 0),
        (Some(major), Some(minor)) => version(major, minor + 1, 0),
    };
    vec![
        Comparator::new(Op::Gte, floor),
        Comparator::new(Op::Lt, upper),
    ]
}
