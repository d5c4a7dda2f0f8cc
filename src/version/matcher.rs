//! Version constraint matching
//!
//! Supports the constraint syntax used by `required_version` and
//! `required_providers` blocks:
//! - `1.2.3`, `= 1.2.3` - exact match
//! - `!= 1.2.3` - exclusion
//! - `>`, `>=`, `<`, `<=` - comparison operators
//! - `~> 1.2` - pessimistic (>= 1.2.0, < 2.0.0); `~> 1.2.3` means >= 1.2.3, < 1.3.0
//! - `>= 1.2, < 2.0` - comma-separated terms, all must satisfy

use std::sync::LazyLock;

use regex::Regex;
use semver::{BuildMetadata, Version};

use crate::version::error::VersionError;
use crate::version::semver::parse_release;

static TERM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(~>|>=|<=|!=|=|>|<)?\s*(v?[0-9A-Za-z.+-]+)\s*$")
        .expect("constraint pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Pessimistic,
}

impl Operator {
    fn parse(token: Option<&str>) -> Self {
        match token {
            Some("!=") => Operator::NotEqual,
            Some(">") => Operator::Greater,
            Some(">=") => Operator::GreaterOrEqual,
            Some("<") => Operator::Less,
            Some("<=") => Operator::LessOrEqual,
            Some("~>") => Operator::Pessimistic,
            _ => Operator::Equal,
        }
    }
}

/// A single `<op> <version>` term
#[derive(Debug, Clone)]
struct Term {
    operator: Operator,
    version: Version,
    /// Number of numeric segments written in the constraint
    segments: usize,
}

impl Term {
    fn parse(raw: &str) -> Result<Self, VersionError> {
        let captures = TERM_PATTERN
            .captures(raw)
            .ok_or_else(|| VersionError::InvalidConstraint(raw.to_string()))?;

        let operator = Operator::parse(captures.get(1).map(|m| m.as_str()));
        let (version, segments) = parse_release(&captures[2])
            .map_err(|_| VersionError::InvalidConstraint(raw.to_string()))?;

        Ok(Self {
            operator,
            version,
            segments,
        })
    }

    fn satisfied_by(&self, candidate: &Version) -> bool {
        if !self.prerelease_allows(candidate) {
            return false;
        }

        let ordering = without_build(candidate).cmp(&without_build(&self.version));

        match self.operator {
            Operator::Equal => ordering.is_eq(),
            Operator::NotEqual => ordering.is_ne(),
            Operator::Greater => ordering.is_gt(),
            Operator::GreaterOrEqual => ordering.is_ge(),
            Operator::Less => ordering.is_lt(),
            Operator::LessOrEqual => ordering.is_le(),
            Operator::Pessimistic => ordering.is_ge() && self.within_pessimistic_bound(candidate),
        }
    }

    /// A prerelease candidate only matches a term that names a prerelease of
    /// the same release; a stable candidate matches a prerelease term except
    /// under `~>`.
    fn prerelease_allows(&self, candidate: &Version) -> bool {
        let term_pre = !self.version.pre.is_empty();
        let candidate_pre = !candidate.pre.is_empty();

        match (term_pre, candidate_pre) {
            (true, true) => same_core(&self.version, candidate),
            (false, true) => false,
            (true, false) => self.operator != Operator::Pessimistic,
            (false, false) => true,
        }
    }

    /// Every written segment but the last must match exactly.
    fn within_pessimistic_bound(&self, candidate: &Version) -> bool {
        let term = [self.version.major, self.version.minor, self.version.patch];
        let other = [candidate.major, candidate.minor, candidate.patch];
        if self.segments <= 1 {
            return true;
        }

        let fixed = (self.segments - 1).min(term.len());
        term[..fixed] == other[..fixed]
    }
}

fn same_core(a: &Version, b: &Version) -> bool {
    a.major == b.major && a.minor == b.minor && a.patch == b.patch
}

fn without_build(version: &Version) -> Version {
    Version {
        build: BuildMetadata::EMPTY,
        ..version.clone()
    }
}

/// Parsed constraint expression; every term must be satisfied.
#[derive(Debug, Clone)]
pub struct Constraint {
    raw: String,
    terms: Vec<Term>,
}

impl Constraint {
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        if raw.trim().is_empty() {
            return Err(VersionError::InvalidConstraint(raw.to_string()));
        }

        let terms = raw
            .split(',')
            .map(Term::parse)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: raw.to_string(),
            terms,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn check(&self, version: &Version) -> bool {
        self.terms.iter().all(|term| term.satisfied_by(version))
    }
}

/// Return the versions satisfying `constraint`, normalized and in input order.
///
/// Fails without partial results if the constraint or any candidate is malformed.
pub fn matching(constraint: &str, versions: &[String]) -> Result<Vec<String>, VersionError> {
    let constraint = Constraint::parse(constraint)?;

    let parsed = versions
        .iter()
        .map(|v| parse_release(v).map(|(version, _)| version))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(parsed
        .into_iter()
        .filter(|v| constraint.check(v))
        .map(|v| v.to_string())
        .collect())
}
