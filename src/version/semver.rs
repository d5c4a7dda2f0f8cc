//! Version parsing and version-set shaping
//!
//! [`Version`] is the coarse `major.minor` view used to collapse a long
//! release history into one entry per minor line. [`parse_release`] is the
//! full-precision parser used when evaluating constraints.

use std::fmt;

use crate::version::error::VersionError;

/// A release line identified by major and minor; the patch is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    /// Parse a `vX.Y.Z`-shaped string.
    ///
    /// At least three dot-separated segments are required and major/minor
    /// must be non-negative integers. The patch segment is not interpreted.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        let stripped = trimmed.strip_prefix('v').unwrap_or(trimmed);
        let parts: Vec<&str> = stripped.split('.').collect();

        if parts.len() < 3 {
            return Err(VersionError::InvalidFormat(raw.to_string()));
        }

        let major = plain_number(parts[0])
            .ok_or_else(|| VersionError::InvalidFormat(raw.to_string()))?;
        let minor = plain_number(parts[1])
            .ok_or_else(|| VersionError::InvalidFormat(raw.to_string()))?;

        Ok(Self {
            major,
            minor,
            patch: 0,
        })
    }
}

/// Non-empty run of ASCII digits, without sign
fn plain_number(segment: &str) -> Option<u64> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Collapse versions to one `major.minor.0` entry per minor line.
///
/// The result is sorted lexicographically on the formatted string, so
/// `1.10.0` sorts before `1.9.0`.
pub fn group_by_minor(versions: &[String]) -> Result<Vec<String>, VersionError> {
    let mut grouped = versions
        .iter()
        .map(|v| Version::parse(v).map(|parsed| parsed.to_string()))
        .collect::<Result<Vec<_>, _>>()?;

    grouped.sort();
    grouped.dedup();

    Ok(grouped)
}

/// Remove blocked versions by exact string match.
///
/// The input is sorted first and each blocklist entry removes at most one
/// element, so a blocked value that appears twice in the input survives once.
pub fn filter_blocked(versions: &[String], blocklist: &[String]) -> Vec<String> {
    let mut remaining = versions.to_vec();
    remaining.sort();

    for blocked in blocklist {
        if let Ok(index) = remaining.binary_search(blocked) {
            remaining.remove(index);
        }
    }

    remaining
}

/// Parse a release version with full precision.
///
/// Accepts an optional `v` prefix, one to three numeric segments (missing
/// segments are zero-padded) and optional prerelease/build suffixes.
/// Returns the parsed version together with the number of numeric segments
/// actually written, which pessimistic constraints depend on.
pub fn parse_release(raw: &str) -> Result<(semver::Version, usize), VersionError> {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_prefix('v').unwrap_or(trimmed);

    let (core, suffix) = match stripped.find(['-', '+']) {
        Some(index) => stripped.split_at(index),
        None => (stripped, ""),
    };

    let segments: Vec<&str> = core.split('.').collect();
    if segments.is_empty()
        || segments.len() > 3
        || segments
            .iter()
            .any(|s| s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(VersionError::InvalidFormat(raw.to_string()));
    }

    let mut numbers = Vec::with_capacity(3);
    for segment in &segments {
        let value: u64 = segment
            .parse()
            .map_err(|_| VersionError::InvalidFormat(raw.to_string()))?;
        numbers.push(value);
    }
    numbers.resize(3, 0);

    let normalized = format!("{}.{}.{}{}", numbers[0], numbers[1], numbers[2], suffix);
    let version = semver::Version::parse(&normalized)
        .map_err(|_| VersionError::InvalidFormat(raw.to_string()))?;

    Ok((version, segments.len()))
}
