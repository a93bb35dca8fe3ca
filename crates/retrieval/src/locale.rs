//! Supported content locales.

use kb_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two languages the site publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    En,
    Es,
}

impl Locale {
    /// Every locale, in artifact and build order.
    pub const ALL: [Locale; 2] = [Locale::En, Locale::Es];

    /// Locale used when a request names none or an unknown one.
    pub const DEFAULT: Locale = Locale::Es;

    pub fn as_str(&self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Es => "es",
        }
    }

    /// Section marker tag used in source documents (`## EN`).
    pub fn marker(&self) -> &'static str {
        match self {
            Locale::En => "EN",
            Locale::Es => "ES",
        }
    }

    /// Lenient parsing for request payloads: anything that is not a
    /// supported tag maps to [`Locale::DEFAULT`].
    pub fn from_request(tag: Option<&str>) -> Locale {
        tag.and_then(|t| t.parse().ok()).unwrap_or(Locale::DEFAULT)
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Locale {
    type Err = AppError;

    fn from_str(s: &str) -> AppResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "es" => Ok(Locale::Es),
            other => Err(AppError::Other(format!(
                "Unsupported locale '{}'. Supported: en, es",
                other
            ))),
        }
    }
}
