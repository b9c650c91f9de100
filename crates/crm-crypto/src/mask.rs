//! Display masking
//!
//! Masking is a lossy display transform. It is not encryption and masked
//! output must never be stored in place of ciphertext.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Masking rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaskKind {
    /// Keep first and last character of the local part and the whole domain
    Email,
    /// Keep the last four digits
    Phone,
    /// Keep two characters at each end
    #[default]
    Other,
}

impl FromStr for MaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            "phone" => Ok(Self::Phone),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown mask kind: {}", other)),
        }
    }
}

impl fmt::Display for MaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Other => "other",
        })
    }
}

/// Mask a value for display. `None` and empty input give `None`.
pub fn mask_sensitive_data(value: Option<&str>, kind: MaskKind) -> Option<String> {
    let value = value.filter(|v| !v.is_empty())?;
    Some(match kind {
        MaskKind::Email => mask_email(value).unwrap_or_else(|| mask_other(value)),
        MaskKind::Phone => mask_phone(value),
        MaskKind::Other => mask_other(value),
    })
}

fn mask_email(value: &str) -> Option<String> {
    let (local, domain) = value.rsplit_once('@')?;
    let chars: Vec<char> = local.chars().collect();
    let (first, last) = (*chars.first()?, *chars.last()?);
    if domain.is_empty() {
        return None;
    }

    let edge = |c: char| if c == '@' { '*' } else { c };
    let mut masked = String::with_capacity(value.len());
    masked.push(edge(first));
    masked.extend(std::iter::repeat('*').take(chars.len().saturating_sub(2).max(1)));
    masked.push(edge(last));
    masked.push('@');
    masked.push_str(domain);
    Some(masked)
}

fn mask_phone(value: &str) -> String {
    let digits: Vec<char> = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 4 {
        return "*".repeat(value.chars().count());
    }
    let split = digits.len() - 4;
    let mut masked = "*".repeat(split);
    masked.extend(&digits[split..]);
    masked
}

fn mask_other(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let mut masked: String = chars[..2].iter().collect();
    masked.push_str(&"*".repeat(chars.len() - 4));
    masked.extend(&chars[chars.len() - 2..]);
    masked
}
