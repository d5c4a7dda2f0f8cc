use rstest::rstest;

use tfmatrix::version::error::VersionError;
use tfmatrix::version::matcher::matching;
use tfmatrix::version::semver::{Version, filter_blocked, group_by_minor};

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

#[rstest]
#[case("v1.5.7", 1, 5)]
#[case("0.12.31", 0, 12)]
#[case("1.6.0-beta1", 1, 6)]
#[case("10.20.30.40", 10, 20)]
fn parse_keeps_major_and_minor(#[case] raw: &str, #[case] major: u64, #[case] minor: u64) {
    let version = Version::parse(raw).unwrap();

    assert_eq!((version.major, version.minor), (major, minor));
    assert_eq!(version.to_string(), format!("{major}.{minor}.0"));
}

#[test]
fn group_by_minor_is_idempotent() {
    let versions = strings(&["1.3.9", "1.3.2", "1.5.7", "1.4.0", "1.5.0"]);

    let once = group_by_minor(&versions).unwrap();
    let twice = group_by_minor(&once).unwrap();

    assert_eq!(once, strings(&["1.3.0", "1.4.0", "1.5.0"]));
    assert_eq!(once, twice);
}

#[test]
fn group_by_minor_fails_on_short_versions() {
    let result = group_by_minor(&strings(&["1.5.0", "1.5"]));

    assert!(matches!(result, Err(VersionError::InvalidFormat(v)) if v == "1.5"));
}

#[rstest]
#[case(&["1.0.0", "1.10.0", "2.0.0"])]
#[case(&["2.0.0", "1.10.0", "1.0.0"])]
#[case(&["1.10.0", "2.0.0", "1.0.0"])]
fn filter_blocked_removes_exactly_one_occurrence(#[case] input: &[&str]) {
    let result = filter_blocked(&strings(input), &strings(&["1.10.0"]));

    assert_eq!(result, strings(&["1.0.0", "2.0.0"]));
}

#[test]
fn matching_selects_range() {
    let result = matching(
        ">=1.2.0, <2.0.0",
        &strings(&["1.1.0", "1.2.0", "1.9.9", "2.0.0"]),
    )
    .unwrap();

    assert_eq!(result, strings(&["1.2.0", "1.9.9"]));
}

#[test]
fn matching_is_all_or_nothing() {
    let malformed_candidate = matching(">= 1.0.0", &strings(&["1.0.0", "banana"]));
    let malformed_constraint = matching(">>= 1.0.0", &strings(&["1.0.0"]));

    assert!(matches!(malformed_candidate, Err(VersionError::InvalidFormat(_))));
    assert!(matches!(malformed_constraint, Err(VersionError::InvalidConstraint(_))));
}
