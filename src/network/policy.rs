/*!
 * Host Policy
 * Optional allowlist consulted when a socket connects
 */

use serde::{Deserialize, Serialize};

/// Which hosts a sandbox may reach
///
/// No list means everything is allowed. Entries match case-insensitively
/// and may be exact names, `*.domain` (the domain and any subdomain) or a
/// lone `*`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostPolicy {
    allowed: Option<Vec<String>>,
}

impl HostPolicy {
    /// Allow every host
    pub fn allow_all() -> Self {
        Self { allowed: None }
    }

    /// Allow only hosts matching one of `patterns`
    pub fn allowlist<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: Some(
                patterns
                    .into_iter()
                    .map(|p| p.into().trim().to_ascii_lowercase())
                    .filter(|p| !p.is_empty())
                    .collect(),
            ),
        }
    }

    pub fn from_option(allowed: Option<Vec<String>>) -> Self {
        match allowed {
            Some(list) => Self::allowlist(list),
            None => Self::allow_all(),
        }
    }

    pub fn is_restricted(&self) -> bool {
        self.allowed.is_some()
    }

    pub fn is_allowed(&self, host: &str) -> bool {
        let Some(allowed) = &self.allowed else {
            return true;
        };
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        allowed.iter().any(|pattern| matches_pattern(&host, pattern))
    }
}

/// Match a lowercase host against one allowlist entry
pub fn matches_pattern(host: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_prefix("*.") {
        Some(base) => host == base || host.ends_with(&format!(".{base}")),
        None => host == pattern,
    }
}
