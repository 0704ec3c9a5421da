//! Paths that always bypass admission control.

use crate::CrowdgateError;
use regex::Regex;

/// Default exclusion: common static asset extensions.
pub const DEFAULT_EXCLUSIONS: &str =
    r"\.(avi|css|eot|gif|ico|jpe?g|js|json|map|mov|mp4|mpe?g|ogg|ogv|pdf|png|svg|ttf|txt|webp|wmv|woff2?|xml)$";

/// Compiled exclusion pattern.
#[derive(Debug, Clone)]
pub struct ExclusionFilter {
    pattern: Option<Regex>,
}

impl ExclusionFilter {
    /// Compile `pattern`. `None` or an empty pattern excludes nothing.
    ///
    /// # Errors
    /// `ConfigError` if the pattern does not compile.
    pub fn new(pattern: Option<&str>) -> Result<Self, CrowdgateError> {
        let pattern = match pattern.filter(|p| !p.is_empty()) {
            Some(p) => Some(Regex::new(p).map_err(|e| {
                CrowdgateError::ConfigError(format!("Invalid exclusion pattern: {}", e))
            })?),
            None => None,
        };
        Ok(Self { pattern })
    }

    /// Whether `path` is excluded.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.pattern.as_ref().is_some_and(|re| re.is_match(path))
    }
}
