// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

//! Version parsing and comparison module

use crate::error::{Result, UpdaterError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\.(\d+)\.(\d+)").expect("version pattern is a valid regex")
});

/// A `major.minor.patch` release version.
///
/// Ordering is component-wise: major first, then minor, then patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a release tag such as `v0.2.38` or `release-1.0.0`.
    ///
    /// Any leading non-numeric marker is dropped; the remainder must be exactly `X.Y.Z`.
    pub fn from_tag(tag: &str) -> Result<Self> {
        tag_version(tag).parse()
    }

    /// Find the first `X.Y.Z` in free-form text, e.g. the output of `fluxion --version`.
    pub fn find_in(text: &str) -> Result<Self> {
        let caps = VERSION_PATTERN.captures(text).ok_or_else(|| {
            UpdaterError::VersionParse(format!("no X.Y.Z version found in {:?}", text.trim()))
        })?;

        Ok(Self {
            major: parse_component(&caps[1], "major")?,
            minor: parse_component(&caps[2], "minor")?,
            patch: parse_component(&caps[3], "patch")?,
        })
    }
}

impl FromStr for Version {
    type Err = UpdaterError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();

        let [major, minor, patch] = parts.as_slice() else {
            return Err(UpdaterError::VersionParse(format!(
                "Invalid version format: {s}, expected X.Y.Z"
            )));
        };

        Ok(Self {
            major: parse_component(major, "major")?,
            minor: parse_component(minor, "minor")?,
            patch: parse_component(patch, "patch")?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Strip the tag marker from a release tag (`v1.2.3` -> `1.2.3`)
pub fn tag_version(tag: &str) -> &str {
    tag.trim().trim_start_matches(|c: char| !c.is_ascii_digit())
}

fn parse_component(part: &str, name: &str) -> Result<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(UpdaterError::VersionParse(format!(
            "Invalid {name} version: {part:?}"
        )));
    }

    part.parse::<u64>()
        .map_err(|e| UpdaterError::VersionParse(format!("Invalid {name} version {part}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!("0.2.38".parse::<Version>().unwrap(), Version::new(0, 2, 38));
        assert_eq!("1.0.0".parse::<Version>().unwrap(), Version::new(1, 0, 0));
        assert_eq!(
            "10.20.30".parse::<Version>().unwrap(),
            Version::new(10, 20, 30)
        );
    }

    #[test]
    fn test_parse_version_invalid() {
        assert!("invalid".parse::<Version>().is_err());
        assert!("1.2".parse::<Version>().is_err());
        assert!("1.2.3.4".parse::<Version>().is_err());
        assert!("a.b.c".parse::<Version>().is_err());
        assert!("1.+2.3".parse::<Version>().is_err());
        assert!("1..3".parse::<Version>().is_err());
    }

    #[test]
    fn test_from_tag_strips_marker() {
        assert_eq!(Version::from_tag("v0.2.38").unwrap(), Version::new(0, 2, 38));
        assert_eq!(Version::from_tag("V0.2.38").unwrap(), Version::new(0, 2, 38));
        assert_eq!(
            Version::from_tag("release-1.3.0").unwrap(),
            Version::new(1, 3, 0)
        );
        assert_eq!(Version::from_tag("0.2.38").unwrap(), Version::new(0, 2, 38));
    }

    #[test]
    fn test_from_tag_malformed() {
        let err = Version::from_tag("v1.3").unwrap_err();
        assert!(matches!(err, UpdaterError::VersionParse(_)));
        assert!(Version::from_tag("latest").is_err());
        assert!(Version::from_tag("v1.3.0-rc1").is_err());
    }

    #[test]
    fn test_find_in_noisy_output() {
        assert_eq!(
            Version::find_in("fluxion v1.2.3 (x86_64-unknown-linux-gnu)\n").unwrap(),
            Version::new(1, 2, 3)
        );
        assert_eq!(Version::find_in("0.2.15").unwrap(), Version::new(0, 2, 15));
        assert_eq!(
            Version::find_in("build 7, version 2.0.11-nightly").unwrap(),
            Version::new(2, 0, 11)
        );
    }

    #[test]
    fn test_find_in_without_version() {
        assert!(Version::find_in("").is_err());
        assert!(Version::find_in("fluxion nightly build 42").is_err());
        assert!(Version::find_in("version 1.2").is_err());
    }

    #[test]
    fn test_ordering_is_component_wise() {
        // Newer patch
        assert!(Version::new(0, 2, 38) < Version::new(0, 2, 39));
        // Same version
        assert_eq!(Version::new(0, 2, 38), Version::new(0, 2, 38));
        // Newer minor beats larger patch
        assert!(Version::new(0, 2, 99) < Version::new(0, 3, 0));
        // Major dominates
        assert!(Version::new(1, 0, 0) > Version::new(0, 99, 99));
    }

    #[test]
    fn test_ordering_is_transitive() {
        let mut versions = vec![
            Version::new(1, 10, 0),
            Version::new(0, 2, 38),
            Version::new(1, 2, 3),
            Version::new(1, 9, 12),
            Version::new(0, 10, 1),
        ];
        versions.sort();

        for (i, a) in versions.iter().enumerate() {
            for b in &versions[i..] {
                for c in &versions[i..] {
                    if a < b && b < c {
                        assert!(a < c, "{a} < {b} < {c} but not {a} < {c}");
                    }
                }
            }
        }
        assert_eq!(versions.first(), Some(&Version::new(0, 2, 38)));
        assert_eq!(versions.last(), Some(&Version::new(1, 10, 0)));
    }

    #[test]
    fn test_display_round_trip() {
        for text in ["0.0.0", "1.2.3", "10.20.30", "0.2.38"] {
            let version: Version = text.parse().unwrap();
            assert_eq!(version.to_string(), text);
            assert_eq!(version.to_string().parse::<Version>().unwrap(), version);
        }
    }

    #[test]
    fn test_tag_version() {
        assert_eq!(tag_version("v0.2.38"), "0.2.38");
        assert_eq!(tag_version(" V1.0.0 "), "1.0.0");
        assert_eq!(tag_version("0.2.38"), "0.2.38");
    }
}
