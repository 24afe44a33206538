//! Dotted version comparison for feature gating
//!
//! Versions are compared numerically component by component, so "6.10" is
//! newer than "6.2". A plain string comparison gets that case wrong; the
//! gating here deliberately does not reproduce it.

use std::cmp::Ordering;
use std::fmt;

/// First server version that accepts `--io-threads` and the ARM64 COW
/// warning override.
pub const IO_THREADS_MIN_VERSION: &str = "6.2.1";

/// A parsed dotted version such as `6.2.1` or `7.0-rc2`
///
/// Each component contributes its leading digits; anything after them
/// (pre-release tags and the like) is ignored. Missing trailing components
/// compare as zero, so `7` == `7.0.0`.
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<u64>,
}

impl Version {
    /// Parse a dotted version string. Non-numeric components count as 0.
    pub fn parse(version: &str) -> Self {
        let components = version
            .trim()
            .trim_start_matches(['v', 'V'])
            .split('.')
            .map(|part| {
                let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
                digits.parse().unwrap_or(0)
            })
            .collect();
        Self { components }
    }

    /// Returns true if `self` >= `other`
    pub fn at_least(&self, other: &Version) -> bool {
        self.cmp(other) != Ordering::Less
    }

    fn component(&self, idx: usize) -> u64 {
        self.components.get(idx).copied().unwrap_or(0)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        (0..len)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|ord| *ord != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.components.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Is `version` at least `minimum`?
pub fn version_at_least(version: &str, minimum: &str) -> bool {
    Version::parse(version).at_least(&Version::parse(minimum))
}

/// Whether a server of this version supports I/O threads
pub fn supports_io_threads(version: &str) -> bool {
    version_at_least(version, IO_THREADS_MIN_VERSION)
}
