//! Classifier lexicons and targets.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Default target year.
pub const DEFAULT_TARGET_YEAR: i32 = 2025;

/// Default language tag prefix.
pub const DEFAULT_LANGUAGE_PREFIX: &str = "pt";

/// Lexicons and targets for the three predicates.
///
/// Every field has a default, so a TOML lexicon file only needs the keys it
/// overrides:
///
/// ```toml
/// target_year = 2024
/// region_names = ["goiás", "mato grosso"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Calendar year a post must have been created in.
    pub target_year: i32,
    /// Topic terms as regex fragments, matched whole-word and case-insensitively.
    pub topic_terms: Vec<String>,
    /// Language tag prefix (`pt` matches `pt`, `pt-BR`).
    pub language_prefix: String,
    /// Substrings of an author handle that indicate the target country.
    pub handle_markers: Vec<String>,
    /// Country-specific lexical patterns (regex, case-insensitive).
    pub locale_patterns: Vec<String>,
    /// Region/state names, matched as case-insensitive substrings.
    pub region_names: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            target_year: DEFAULT_TARGET_YEAR,
            topic_terms: to_strings(&[
                r"agroneg[óo]cio",
                "agricultura",
                "pecu[áa]ria",
                "fazenda",
                "soja|milho|algod[ãa]o|caf[ée]|cana",
                "bovino|su[íi]no|avicultura",
                "plantio|colheita|safra",
            ]),
            language_prefix: DEFAULT_LANGUAGE_PREFIX.to_string(),
            handle_markers: to_strings(&[".br", "brasil"]),
            locale_patterns: to_strings(&[
                r"\br\$\s?\d",
                r"\breais?\b",
                r"\bcpf\b",
                r"\bcnpj\b",
                r"\bbrasil\b",
                r"\bbrasileir[oa]s?\b",
                r"\bs[ãa]o paulo\b",
                r"\brio de janeiro\b",
                r"\bbras[íi]lia\b",
            ]),
            region_names: to_strings(&["minas gerais", "rio grande", "santa catarina"]),
        }
    }
}

impl ClassifierConfig {
    /// Load overrides from a TOML file; unspecified keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse overrides from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Same lexicons, different target year.
    #[must_use]
    pub fn with_target_year(mut self, year: i32) -> Self {
        self.target_year = year;
        self
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ClassifierConfig::from_toml(
            r#"
            target_year = 2024
            region_names = ["goiás"]
            "#,
        )
        .unwrap();
        assert_eq!(config.target_year, 2024);
        assert_eq!(config.region_names, vec!["goiás".to_string()]);
        assert_eq!(config.language_prefix, "pt");
        assert_eq!(config.topic_terms, ClassifierConfig::default().topic_terms);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            ClassifierConfig::from_toml("target_year = \"soon\""),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "language_prefix = \"es\"").unwrap();
        let config = ClassifierConfig::load(file.path()).unwrap();
        assert_eq!(config.language_prefix, "es");
    }

    #[test]
    fn test_load_missing_file() {
        let err = ClassifierConfig::load(Path::new("/nonexistent/lexicon.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
