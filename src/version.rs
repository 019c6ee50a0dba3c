// ABOUTME: Semantic version parsing and comparison for site migrations.
// ABOUTME: Unparseable or all-zero versions are undefined and never compare as older or newer.

use regex::Regex;
use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^v?(\d+)\.(\d+)\.(\d+)(?:[-+@](\S+))?$").unwrap_or_else(|e| {
        unreachable!("version pattern is a valid regex: {e}");
    })
});

/// A parsed `major.minor.patch[-qualifier]` version.
///
/// Qualifiers are kept for display but ignored by every comparison.
/// `0.0.0` is treated as undefined, the same as input that does not parse,
/// so a site whose version was never recorded is never migrated by accident.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub qualifier: Option<String>,
    pub undefined: bool,
}

impl Version {
    pub fn parse(input: &str) -> Self {
        let Some(caps) = VERSION_PATTERN.captures(input.trim()) else {
            return Self::undefined();
        };
        let part = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());
        let (Some(major), Some(minor), Some(patch)) = (part(1), part(2), part(3)) else {
            return Self::undefined();
        };
        if major == 0 && minor == 0 && patch == 0 {
            return Self::undefined();
        }
        Self {
            major,
            minor,
            patch,
            qualifier: caps.get(4).map(|m| m.as_str().to_string()),
            undefined: false,
        }
    }

    pub fn undefined() -> Self {
        Self {
            undefined: true,
            ..Self::default()
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.undefined
    }

    fn triple(&self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }

    /// Ordering of the numeric parts. Undefined versions order as `0.0.0`.
    pub fn numeric_cmp(&self, other: &Version) -> Ordering {
        self.triple().cmp(&other.triple())
    }

    pub fn less_recent_than(&self, other: &Version) -> bool {
        !self.undefined && !other.undefined && self.numeric_cmp(other) == Ordering::Less
    }

    pub fn more_recent_than(&self, other: &Version) -> bool {
        !self.undefined && !other.undefined && self.numeric_cmp(other) == Ordering::Greater
    }

    pub fn equivalent(&self, other: &Version) -> bool {
        !self.undefined && !other.undefined && self.numeric_cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.undefined {
            return f.write_str("undefined");
        }
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(q) = &self.qualifier {
            write!(f, "-{q}")?;
        }
        Ok(())
    }
}

/// True when `a` parses to a version strictly older than `b`.
pub fn less_recent_than(a: &str, b: &str) -> bool {
    Version::parse(a).less_recent_than(&Version::parse(b))
}

/// True when `a` parses to a version strictly newer than `b`.
pub fn more_recent_than(a: &str, b: &str) -> bool {
    Version::parse(a).more_recent_than(&Version::parse(b))
}

/// Version of this build, recorded in router metadata at create and update.
pub fn current() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_plain_and_prefixed_versions() {
        let v = Version::parse("v1.5.2");
        assert_eq!((v.major, v.minor, v.patch), (1, 5, 2));
        assert!(!v.is_undefined());
        assert_eq!(v.qualifier, None);
    }

    #[test]
    fn keeps_qualifier_but_ignores_it_when_comparing() {
        let rc = Version::parse("2.0.0-rc1");
        assert_eq!(rc.qualifier.as_deref(), Some("rc1"));
        assert!(rc.equivalent(&Version::parse("2.0.0")));
        assert!(!rc.less_recent_than(&Version::parse("2.0.0")));
    }

    #[test]
    fn garbage_is_undefined() {
        for input in ["", "main", "1.2", "1.2.x", "latest"] {
            assert!(Version::parse(input).is_undefined(), "{input}");
        }
    }

    #[test]
    fn all_zero_is_undefined() {
        assert!(Version::parse("0.0.0").is_undefined());
        assert!(!Version::parse("0.0.1").is_undefined());
    }

    #[test]
    fn undefined_never_compares() {
        assert!(!less_recent_than("", "1.0.0"));
        assert!(!less_recent_than("1.0.0", "garbage"));
        assert!(!more_recent_than("2.0.0", "0.0.0"));
        assert!(!Version::undefined().equivalent(&Version::undefined()));
    }

    #[test]
    fn compares_numerically_not_lexically() {
        assert!(less_recent_than("1.9.0", "1.10.0"));
        assert!(more_recent_than("1.10.0", "1.9.9"));
    }

    proptest! {
        #[test]
        fn ordering_is_antisymmetric(a in (0u64..20, 0u64..20, 0u64..20), b in (0u64..20, 0u64..20, 0u64..20)) {
            let va = format!("{}.{}.{}", a.0, a.1, a.2);
            let vb = format!("{}.{}.{}", b.0, b.1, b.2);
            prop_assert!(!(less_recent_than(&va, &vb) && less_recent_than(&vb, &va)));
            if less_recent_than(&va, &vb) {
                prop_assert!(more_recent_than(&vb, &va));
            }
        }

        #[test]
        fn parse_never_panics(input in ".*") {
            let _ = Version::parse(&input);
        }
    }
}
