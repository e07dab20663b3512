//! Question classification
//!
//! Decides whether an embed is a trivia round we can answer, and how.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{Category, Classification, Question};

static QUESTION_INDEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Question \d+ of \d+").unwrap());

static GUESS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Guess this country!").unwrap());

static FLAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"To which country or territory does this flag belong").unwrap()
});

static SHAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"To which country or territory does this shape belong").unwrap()
});

static MAP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"To which country or territory does this map belong").unwrap()
});

static HISTORICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"To which historical country or territory does this flag belong").unwrap()
});

static CAPITAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"What is the capital of this country").unwrap());

/// Country name trailing a markdown heading after the capital prompt
static CAPITAL_COUNTRY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"What is the capital of this country\?\s*#\s*(.+)").unwrap()
});

/// Title marks a recognized round
pub fn is_round_title(title: &str) -> bool {
    QUESTION_INDEX_RE.is_match(title) || GUESS_RE.is_match(title)
}

fn image_pattern(category: Category) -> Option<&'static Regex> {
    match category {
        Category::Flag => Some(&*FLAG_RE),
        Category::Shape => Some(&*SHAPE_RE),
        Category::Map => Some(&*MAP_RE),
        Category::HistoricalCountry => Some(&*HISTORICAL_RE),
        Category::Capital => None,
    }
}

/// First image category whose prompt appears in the description
pub fn image_category(description: &str) -> Option<Category> {
    Category::IMAGE.into_iter().find(|&category| {
        image_pattern(category)
            .map(|re| re.is_match(description))
            .unwrap_or(false)
    })
}

/// Country named in a text-only capital question
pub fn capital_country(description: &str) -> Option<String> {
    CAPITAL_COUNTRY_RE
        .captures(description)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|country| !country.is_empty())
}

/// Classify a question, or `None` when it is not a round we handle
pub fn classify(question: &Question) -> Option<Classification> {
    if !is_round_title(&question.title) {
        return None;
    }

    let has_image = question.image_url.is_some();

    if has_image {
        if let Some(category) = image_category(&question.description) {
            return Some(Classification::ImageIdentify { category });
        }
    }

    if !CAPITAL_RE.is_match(&question.description) {
        return None;
    }

    if has_image {
        return Some(Classification::CapitalByImage);
    }

    match capital_country(&question.description) {
        Some(country) => Some(Classification::CapitalByText { country }),
        None => {
            tracing::debug!("Country name could not be extracted from capital question");
            None
        }
    }
}
