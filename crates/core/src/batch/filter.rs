//! Item selection policy.

use super::config::BatchConfig;
use crate::source::ItemDescriptor;

/// Decides which items are transformed and which are skipped.
#[derive(Debug, Clone, Default)]
pub struct ItemFilter {
    extensions: Vec<String>,
    skip_hidden: bool,
}

impl ItemFilter {
    pub fn new<I, S>(extensions: I, skip_hidden: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self {
            extensions,
            skip_hidden,
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(&config.include_extensions, config.skip_hidden)
    }

    /// Whether the item should be transformed.
    pub fn accepts(&self, descriptor: &ItemDescriptor) -> bool {
        if self.skip_hidden && descriptor.is_hidden() {
            return false;
        }
        if self.extensions.is_empty() {
            return true;
        }
        descriptor
            .extension()
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(identifier: &str) -> ItemDescriptor {
        ItemDescriptor::new(identifier, 1)
    }

    #[test]
    fn test_empty_filter_accepts_everything() {
        let filter = ItemFilter::default();
        assert!(filter.accepts(&item("a.txt")));
        assert!(filter.accepts(&item(".hidden/a")));
        assert!(filter.accepts(&item("no_extension")));
    }

    #[test]
    fn test_extensions_case_insensitive() {
        let filter = ItemFilter::new([".DCM"], false);
        assert!(filter.accepts(&item("s1/img.dcm")));
        assert!(filter.accepts(&item("s1/IMG.Dcm")));
        assert!(!filter.accepts(&item("s1/notes.txt")));
        assert!(!filter.accepts(&item("s1/DICOMDIR")));
    }

    #[test]
    fn test_skip_hidden() {
        let filter = ItemFilter::new(Vec::<String>::new(), true);
        assert!(!filter.accepts(&item(".DS_Store")));
        assert!(!filter.accepts(&item("study/.cache/a.dcm")));
        assert!(filter.accepts(&item("study/a.dcm")));
    }
}
