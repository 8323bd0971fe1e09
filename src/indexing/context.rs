use crate::config::IndexerConfig;

/// Per-pipeline settings handed explicitly to every extraction call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexContext {
    /// Locale assumed for documents that do not declare one
    pub default_locale: String,
}

impl IndexContext {
    pub fn new(default_locale: impl Into<String>) -> Self {
        Self {
            default_locale: default_locale.into(),
        }
    }

    pub fn from_config(config: &IndexerConfig) -> Self {
        Self::new(config.default_locale.clone())
    }

    /// `declared` if set, the default locale otherwise
    pub fn locale_or_default<'a>(&'a self, declared: &'a str) -> &'a str {
        if declared.is_empty() {
            &self.default_locale
        } else {
            declared
        }
    }
}
