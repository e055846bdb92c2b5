//! Script-aware text handling: language hints, direction and digit normalization.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Writing script selected by the caller's language hint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Script {
    /// Latin script, left-to-right.
    #[default]
    Latin,
    /// Arabic script, right-to-left.
    Arabic,
    /// Persian (Farsi), right-to-left.
    Persian,
    /// Urdu, right-to-left.
    Urdu,
}

/// Text direction of a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Ltr,
    Rtl,
}

impl Script {
    /// Resolve a language hint.
    ///
    /// Unrecognized or empty hints fall back to [`Script::Latin`].
    pub fn from_hint(hint: &str) -> Self {
        match hint.trim().to_lowercase().as_str() {
            "ar" | "ara" | "arabic" | "ar-sa" | "ar-eg" | "ar-ae" => Self::Arabic,
            "fa" | "fas" | "per" | "persian" | "farsi" => Self::Persian,
            "ur" | "urd" | "urdu" => Self::Urdu,
            "" | "en" | "eng" | "latin" => Self::Latin,
            other => {
                debug!("Unrecognized language hint '{}', using latin", other);
                Self::Latin
            }
        }
    }

    /// Reading direction.
    pub fn direction(&self) -> Direction {
        match self {
            Self::Latin => Direction::Ltr,
            Self::Arabic | Self::Persian | Self::Urdu => Direction::Rtl,
        }
    }

    /// Tesseract `-l` argument for this script. Non-Latin scripts are paired
    /// with English since invoices are frequently mixed.
    pub fn tesseract_languages(&self) -> &'static str {
        match self {
            Self::Latin => "eng",
            Self::Arabic => "ara+eng",
            Self::Persian => "fas+eng",
            Self::Urdu => "urd+eng",
        }
    }

    /// Whether ingested text should have its digits folded to ASCII.
    pub fn normalizes_digits(&self) -> bool {
        self.direction() == Direction::Rtl
    }

    /// Stable identifier, also used for model file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Latin => "latin",
            Self::Arabic => "arabic",
            Self::Persian => "persian",
            Self::Urdu => "urdu",
        }
    }
}

impl std::fmt::Display for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fold Arabic-Indic and Extended Arabic-Indic digits to ASCII.
///
/// The Arabic decimal separator becomes `.` and the Arabic thousands
/// separator is removed. All other characters pass through untouched.
pub fn normalize_digits(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\u{0660}'..='\u{0669}' => char::from_digit(c as u32 - 0x0660, 10),
            '\u{06F0}'..='\u{06F9}' => char::from_digit(c as u32 - 0x06F0, 10),
            '\u{066B}' => Some('.'),
            '\u{066C}' => None,
            _ => Some(c),
        })
        .collect()
}
