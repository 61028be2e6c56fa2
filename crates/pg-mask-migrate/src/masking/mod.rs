//! Column masking rules.
//!
//! A [`MaskingRule`] is a named pure function from a cell value to its masked
//! replacement. The [`MaskingEngine`] carries the parameters shared by all
//! rules (salt and email domain) and applies them.
//!
//! NULL and empty input stay NULL and empty for every rule except
//! [`MaskingRule::SyntheticName`], which always fabricates a value.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::MaskingConfig;
use crate::core::value::{SqlNullType, SqlValue};

/// Hex characters of the digest kept in a hashed email.
const EMAIL_HASH_LEN: usize = 12;

/// Marker placed before the visible tail of a redacted value.
const REDACTION_PREFIX: &str = "---";

/// Number of trailing characters left visible by [`MaskingRule::RedactLast4`].
const VISIBLE_TAIL: usize = 4;

const FIRST_NAMES: &[&str] = &[
    "Alicia", "Bruno", "Carmen", "Diego", "Elena", "Felipe", "Gabriela", "Hugo", "Isabel",
    "Javier", "Karla", "Luis", "Mariana", "Nicolas", "Olivia", "Pablo", "Renata", "Sergio",
    "Teresa", "Victor",
];

const LAST_NAMES: &[&str] = &[
    "Aguilar", "Benitez", "Castillo", "Dominguez", "Estrada", "Fuentes", "Guerrero", "Herrera",
    "Ibarra", "Jimenez", "Lozano", "Medina", "Navarro", "Ortega", "Paredes", "Quintero", "Rios",
    "Salazar", "Torres", "Vargas",
];

/// A masking rule, as named in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MaskingRule {
    /// Salted SHA-256 prefix embedded in a fixed-domain address. Deterministic.
    HashEmail,
    /// Keep only the last four characters behind a fixed marker.
    RedactLast4,
    /// Random plausible full name, unrelated to the input.
    SyntheticName,
    /// Random digits in a fixed phone template.
    PreserveFormat,
    /// Unrecognized rule name; values pass through unchanged.
    Unknown(String),
}

impl MaskingRule {
    pub fn is_known(&self) -> bool {
        !matches!(self, MaskingRule::Unknown(_))
    }

    pub fn name(&self) -> &str {
        match self {
            MaskingRule::HashEmail => "hash_email",
            MaskingRule::RedactLast4 => "redact_last4",
            MaskingRule::SyntheticName => "synthetic_name",
            MaskingRule::PreserveFormat => "preserve_format",
            MaskingRule::Unknown(name) => name,
        }
    }
}

impl FromStr for MaskingRule {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Ok(match normalized.as_str() {
            "hash_email" => MaskingRule::HashEmail,
            "redact_last4" => MaskingRule::RedactLast4,
            "synthetic_name" | "faker_name" => MaskingRule::SyntheticName,
            "preserve_format" => MaskingRule::PreserveFormat,
            _ => MaskingRule::Unknown(s.to_string()),
        })
    }
}

impl From<String> for MaskingRule {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(rule) => rule,
            Err(never) => match never {},
        }
    }
}

impl From<MaskingRule> for String {
    fn from(rule: MaskingRule) -> Self {
        rule.name().to_string()
    }
}

impl fmt::Display for MaskingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Applies masking rules with the configured salt and domain.
#[derive(Debug, Clone)]
pub struct MaskingEngine {
    salt: String,
    email_domain: String,
}

impl MaskingEngine {
    pub fn new(salt: impl Into<String>, email_domain: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            email_domain: email_domain.into(),
        }
    }

    pub fn from_config(config: &MaskingConfig) -> Self {
        Self::new(&config.salt, &config.email_domain)
    }

    /// Mask one value.
    ///
    /// Non-text values are masked through their text rendering and come back
    /// as text. Unknown rules return the value unchanged.
    pub fn apply(&self, rule: &MaskingRule, value: &SqlValue) -> SqlValue {
        if let MaskingRule::Unknown(_) = rule {
            return value.clone();
        }
        if let MaskingRule::SyntheticName = rule {
            return SqlValue::Text(synthetic_name());
        }

        let text = match value.to_text() {
            None => return SqlValue::Null(SqlNullType::String),
            Some(t) if t.is_empty() => return SqlValue::Text(t),
            Some(t) => t,
        };

        let masked = match rule {
            MaskingRule::HashEmail => self.hash_email(&text),
            MaskingRule::RedactLast4 => redact_last4(&text),
            MaskingRule::PreserveFormat => preserve_format(),
            MaskingRule::SyntheticName | MaskingRule::Unknown(_) => text,
        };
        SqlValue::Text(masked)
    }

    /// Deterministic pseudonymous address for `value`.
    pub fn hash_email(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        hasher.update(self.salt.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!("{}@{}", &digest[..EMAIL_HASH_LEN], self.email_domain)
    }
}

/// Fixed marker followed by the last four characters; empty below five characters.
pub fn redact_last4(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= VISIBLE_TAIL {
        return String::new();
    }
    let tail: String = chars[chars.len() - VISIBLE_TAIL..].iter().collect();
    format!("{}{}", REDACTION_PREFIX, tail)
}

/// Random full name drawn from fixed first and last name lists.
pub fn synthetic_name() -> String {
    let mut rng = rand::thread_rng();
    let first = FIRST_NAMES[rng.gen_range(0..FIRST_NAMES.len())];
    let last = LAST_NAMES[rng.gen_range(0..LAST_NAMES.len())];
    format!("{} {}", first, last)
}

/// Random ten-digit number in the `+52 (XXX) XXX-XXXX` template.
pub fn preserve_format() -> String {
    let mut rng = rand::thread_rng();
    let digits: Vec<u32> = (0..10).map(|_| rng.gen_range(0..10)).collect();
    let d = |range: std::ops::Range<usize>| -> String {
        digits[range].iter().map(|n| n.to_string()).collect()
    };
    format!("+52 ({}) {}-{}", d(0..3), d(3..6), d(6..10))
}
