//! Disclosure message recognition and text extraction
//!
//! After a round nobody answers, the question source posts an embed
//! titled "No one got it right!" whose description reveals the answer
//! in bold markdown.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{OracleError, OracleResult};
use crate::types::{Category, ChatEvent};

pub const DISCLOSURE_MARKER: &str = "No one got it right!";

static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());

static CAPITAL_SENTENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"The capital of \*\*(.+?)\*\*.*is \*\*(.+?)\*\*").unwrap()
});

/// The revealed answer of a lost round
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disclosure {
    Country(String),
    Capital { country: String, capital: String },
}

/// True when `event` is a disclosure from the question source
pub fn is_disclosure(event: &ChatEvent, question_source_id: &str) -> bool {
    event.author_id == question_source_id
        && event
            .primary_embed()
            .and_then(|embed| embed.title.as_deref())
            .map(|title| title.contains(DISCLOSURE_MARKER))
            .unwrap_or(false)
}

/// Country in the first bold span
pub fn parse_country(text: &str) -> OracleResult<String> {
    BOLD_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|country| !country.is_empty())
        .ok_or_else(|| OracleError::Parse("no bold country name".to_string()))
}

/// Country and capital from "The capital of **X** ... is **Y**"
pub fn parse_capital(text: &str) -> OracleResult<(String, String)> {
    let caps = CAPITAL_SENTENCE_RE
        .captures(text)
        .ok_or_else(|| OracleError::Parse("no capital sentence".to_string()))?;

    let country = caps[1].trim().to_string();
    let capital = caps[2].trim().to_string();
    if country.is_empty() || capital.is_empty() {
        return Err(OracleError::Parse("empty capital or country".to_string()));
    }
    Ok((country, capital))
}

/// Extract the answer a disclosure reveals for `category`
pub fn parse(category: Category, event: &ChatEvent) -> OracleResult<Disclosure> {
    let text = event
        .primary_embed()
        .and_then(|embed| embed.description.as_deref())
        .ok_or_else(|| OracleError::Parse("disclosure has no description".to_string()))?;

    if category.is_image() {
        parse_country(text).map(Disclosure::Country)
    } else {
        parse_capital(text).map(|(country, capital)| Disclosure::Capital { country, capital })
    }
}
