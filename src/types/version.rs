//! Engine version reported in the welcome banner

use std::fmt;
use std::str::FromStr;

/// A `major.minor.patch` ManimGL version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManimVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ManimVersion {
    /// First release with `reload()` and `--autoreload`
    pub const RELOAD: ManimVersion = ManimVersion::new(1, 7, 2);

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `1.7.2` or `v1.7.2`; anything else is `None`
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let text = text.strip_prefix('v').unwrap_or(text);
        let mut parts = text.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        let patch = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(major, minor, patch))
    }

    pub fn at_least(&self, other: ManimVersion) -> bool {
        *self >= other
    }
}

impl fmt::Display for ManimVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ManimVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid version: {s}"))
    }
}
