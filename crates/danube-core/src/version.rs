//! Library version and user-agent string.

use std::fmt;

/// Semantic version triple embedded in the user-agent string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionNum {
    /// Major version
    pub major: u32,
    /// Minor version
    pub minor: u32,
    /// Micro (patch) version
    pub micro: u32,
}

impl fmt::Display for VersionNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)
    }
}

/// Version of this library.
pub const VERSION_NUMBER: VersionNum = VersionNum {
    major: 0,
    minor: 1,
    micro: 0,
};

/// User-agent string sent with every request.
#[must_use]
pub fn user_agent() -> String {
    format!("danube-client ({VERSION_NUMBER})")
}
