use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest language tag accepted.
pub const MAX_LANGUAGE_LEN: usize = 35;

/// A language tag such as `en`, `pt-BR` or `sr_Latn`.
///
/// Languages become storage key segments (`<id>/<language>.json`,
/// `meta/<language>.json`), so only ASCII alphanumerics, `-` and `_` are
/// accepted and the tag must start with a letter.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Language(String);

impl Language {
    /// Validate and wrap a language tag.
    pub fn new(tag: impl Into<String>) -> Result<Self, TypeError> {
        let tag = tag.into();
        validate_language(&tag)?;
        Ok(Self(tag))
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_language(tag: &str) -> Result<(), TypeError> {
    let invalid = |reason: String| TypeError::InvalidLanguage {
        language: tag.to_string(),
        reason,
    };

    let Some(first) = tag.chars().next() else {
        return Err(invalid("language must not be empty".into()));
    };
    if tag.len() > MAX_LANGUAGE_LEN {
        return Err(invalid(format!("longer than {MAX_LANGUAGE_LEN} bytes")));
    }
    if !first.is_ascii_alphabetic() {
        return Err(invalid("must start with an ASCII letter".into()));
    }
    if let Some(ch) = tag
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(invalid(format!("contains forbidden character: {ch:?}")));
    }
    Ok(())
}

impl FromStr for Language {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Language {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.0
    }
}

impl AsRef<str> for Language {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Language({})", self.0)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_common_tags() {
        for tag in ["en", "de", "pt-BR", "sr_Latn", "zh-Hant-TW"] {
            assert_eq!(Language::new(tag).unwrap().as_str(), tag);
        }
    }

    #[test]
    fn rejects_path_like_tags() {
        for tag in ["", "../en", "en/US", "en.json", "1en", "-en", "e n"] {
            assert!(Language::new(tag).is_err(), "{tag:?} should be rejected");
        }
    }

    #[test]
    fn rejects_overlong_tags() {
        let tag = "a".repeat(MAX_LANGUAGE_LEN + 1);
        assert!(Language::new(tag).is_err());
    }

    #[test]
    fn parses_from_str_and_serde() {
        let lang: Language = "fr".parse().unwrap();
        assert_eq!(serde_json::to_string(&lang).unwrap(), "\"fr\"");
        let back: Language = serde_json::from_str("\"fr\"").unwrap();
        assert_eq!(back, lang);
        assert!(serde_json::from_str::<Language>("\"f/r\"").is_err());
    }

    proptest! {
        #[test]
        fn valid_tags_round_trip(tag in "[a-zA-Z][a-zA-Z0-9_-]{0,20}") {
            let lang = Language::new(tag.clone()).unwrap();
            prop_assert_eq!(lang.to_string(), tag);
        }

        #[test]
        fn accepted_tags_are_key_safe(tag in "\\PC{1,12}") {
            if let Ok(lang) = Language::new(tag) {
                prop_assert!(!lang.as_str().contains('/'));
                prop_assert!(!lang.as_str().contains('.'));
            }
        }
    }
}
