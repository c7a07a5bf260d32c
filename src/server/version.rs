//! Server version ordering
//!
//! Version-gated behavior in both tools compares `(major, minor, patch)`
//! triples; prerelease and build metadata are irrelevant here and are
//! dropped at parse time.

use std::fmt;
use std::str::FromStr;

use super::errors::ServerError;

/// A server (or dump-recorded) version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    /// Creates a version triple.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Returns true if this version is at least `(major, minor, patch)`.
    pub fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        *self >= ServerVersion::new(major, minor, patch)
    }

    /// Index namespace stripping and `ignoreUnknownIndexOptions` gate.
    pub fn supports_ignore_unknown_index_options(&self) -> bool {
        self.at_least(4, 1, 9)
    }

    /// Servers below 4.2 limit fully-qualified index names to 127 bytes.
    pub fn enforces_index_name_limit(&self) -> bool {
        !self.at_least(4, 2, 0)
    }

    /// `autoIndexId: false` is rejected from 4.0 on.
    pub fn rejects_auto_index_id_false(&self) -> bool {
        self.at_least(4, 0, 0)
    }

    /// The auth schema document is gone from `system.version` from 8.1 on;
    /// such servers are always at auth version 5.
    pub fn implies_auth_schema_five(&self) -> bool {
        self.at_least(8, 1, 0)
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for ServerVersion {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn component(part: Option<&str>, raw: &str, name: &str) -> Result<u32, ServerError> {
            part.filter(|p| !p.is_empty())
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| {
                    ServerError::connection(format!(
                        "unparseable server version '{}' ({})",
                        raw, name
                    ))
                })
        }

        // "4.4.29-rc1" and "8.0.0+build" carry suffixes we ignore
        let core: String = s
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = core.split('.');
        let major = component(parts.next(), s, "major")?;
        let minor = component(parts.next(), s, "minor")?;
        // A bare "4.4" is accepted; the patch defaults to zero
        let patch = match parts.next().filter(|p| !p.is_empty()) {
            Some(part) => component(Some(part), s, "patch")?,
            None => 0,
        };
        Ok(ServerVersion::new(major, minor, patch))
    }
}
