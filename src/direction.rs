//! Translation directions and the languages they resolve to.
//!
//! Only two directions exist. Both the short codes (`en-lo`, `lo-en`) and the
//! labels shown to users (`English → Lao`, `Lao → English`) parse.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A language the translator works with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    English,
    Lao,
}

impl Language {
    /// The English name of the language, as used in prompts
    pub fn name(&self) -> &'static str {
        match self {
            Language::English => "English",
            Language::Lao => "Lao",
        }
    }

    /// ISO 639-1 code
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Lao => "lo",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Source → target language pair of a translation request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    #[serde(rename = "en-lo", alias = "English → Lao")]
    EnglishToLao,
    #[serde(rename = "lo-en", alias = "Lao → English")]
    LaoToEnglish,
}

impl Direction {
    pub const ALL: [Direction; 2] = [Direction::EnglishToLao, Direction::LaoToEnglish];

    pub fn source_language(&self) -> Language {
        match self {
            Direction::EnglishToLao => Language::English,
            Direction::LaoToEnglish => Language::Lao,
        }
    }

    pub fn target_language(&self) -> Language {
        match self {
            Direction::EnglishToLao => Language::Lao,
            Direction::LaoToEnglish => Language::English,
        }
    }

    /// Short code, e.g. `en-lo`
    pub fn code(&self) -> &'static str {
        match self {
            Direction::EnglishToLao => "en-lo",
            Direction::LaoToEnglish => "lo-en",
        }
    }

    /// Label shown to users, e.g. `English → Lao`
    pub fn label(&self) -> &'static str {
        match self {
            Direction::EnglishToLao => "English → Lao",
            Direction::LaoToEnglish => "Lao → English",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        for direction in Direction::ALL {
            if wanted.eq_ignore_ascii_case(direction.code()) || wanted == direction.label() {
                return Ok(direction);
            }
        }
        bail!("Unknown direction: '{}' (expected en-lo or lo-en)", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_english_to_lao_targets_lao() {
        assert_eq!(Direction::EnglishToLao.target_language(), Language::Lao);
        assert_eq!(Direction::EnglishToLao.target_language().name(), "Lao");
        assert_eq!(Direction::EnglishToLao.source_language(), Language::English);
    }

    #[test]
    fn test_lao_to_english_targets_english() {
        assert_eq!(Direction::LaoToEnglish.target_language(), Language::English);
        assert_eq!(Direction::LaoToEnglish.target_language().name(), "English");
        assert_eq!(Direction::LaoToEnglish.source_language(), Language::Lao);
    }

    #[test]
    fn test_parse_codes() {
        assert_eq!("en-lo".parse::<Direction>().unwrap(), Direction::EnglishToLao);
        assert_eq!("LO-EN".parse::<Direction>().unwrap(), Direction::LaoToEnglish);
        assert_eq!(" en-lo ".parse::<Direction>().unwrap(), Direction::EnglishToLao);
    }

    #[test]
    fn test_parse_labels() {
        assert_eq!(
            "English → Lao".parse::<Direction>().unwrap(),
            Direction::EnglishToLao
        );
        assert_eq!(
            "Lao → English".parse::<Direction>().unwrap(),
            Direction::LaoToEnglish
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!("fr-lo".parse::<Direction>().is_err());
        assert!("".parse::<Direction>().is_err());
    }

    #[test]
    fn test_serde_uses_codes() {
        let json = serde_json::to_string(&Direction::LaoToEnglish).unwrap();
        assert_eq!(json, "\"lo-en\"");

        let parsed: Direction = serde_json::from_str("\"English → Lao\"").unwrap();
        assert_eq!(parsed, Direction::EnglishToLao);
    }

    #[test]
    fn test_language_codes() {
        assert_eq!(Language::English.code(), "en");
        assert_eq!(Language::Lao.code(), "lo");
        assert_eq!(Language::Lao.to_string(), "Lao");
    }
}
