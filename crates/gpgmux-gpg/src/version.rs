//! `gpg --version` parsing

use std::fmt;

use gpgmux_core::{Error, Result};
use regex::Regex;
use serde::Serialize;

const VERSION_PATTERN: &str = r"^gpg \(GnuPG[^)]*\) (\d+)\.(\d+)\.(\d+)";

/// Installed GnuPG version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    /// First line of the banner, verbatim
    pub raw: String,
}

impl Version {
    /// Parse the banner printed by `gpg --version`
    pub fn parse(output: &str) -> Result<Self> {
        let first = output.lines().next().unwrap_or("").trim();
        let re = Regex::new(VERSION_PATTERN).map_err(|e| Error::parse(1, e.to_string()))?;
        let caps = re
            .captures(first)
            .ok_or_else(|| Error::parse(1, format!("unrecognized version banner {first:?}")))?;

        let number = |i: usize| -> Result<u32> {
            caps[i]
                .parse()
                .map_err(|_| Error::parse(1, format!("version component {:?} out of range", &caps[i])))
        };

        Ok(Self {
            major: number(1)?,
            minor: number(2)?,
            patch: number(3)?,
            raw: first.to_string(),
        })
    }

    /// Whether this is at least `major.minor`
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
