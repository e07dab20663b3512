//! Core types for the trivia oracle
//!
//! These types carry a round from the inbound chat event through
//! classification and lookup to either an answer or a learning window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The trivia sub-type that selects a knowledge table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Flag,
    Shape,
    Map,
    HistoricalCountry,
    /// Capital name -> country name
    Capital,
}

impl Category {
    /// Image categories in classification precedence order
    pub const IMAGE: [Category; 4] = [
        Category::Flag,
        Category::Shape,
        Category::Map,
        Category::HistoricalCountry,
    ];

    /// Stores searched (in order) when a capital question carries an image
    pub const CAPITAL_IMAGE_SEARCH: [Category; 3] = [Category::Flag, Category::Shape, Category::Map];

    pub const ALL: [Category; 5] = [
        Category::Flag,
        Category::Shape,
        Category::Map,
        Category::HistoricalCountry,
        Category::Capital,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Flag => "flag",
            Category::Shape => "shape",
            Category::Map => "map",
            Category::HistoricalCountry => "historical-country",
            Category::Capital => "capital",
        }
    }

    /// File backing this category inside the data directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Category::Flag => "flag.json",
            Category::Shape => "shape.json",
            Category::Map => "map.json",
            Category::HistoricalCountry => "historical-country.json",
            Category::Capital => "country-capital.json",
        }
    }

    pub fn is_image(&self) -> bool {
        !matches!(self, Category::Capital)
    }

    /// Short acknowledgment sent when a lookup misses and learning starts
    pub fn filler(&self) -> &'static str {
        match self {
            Category::Capital => "NuH",
            _ => "huH",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.name() == s || c.file_name() == s)
            .ok_or_else(|| format!("unknown category: {}", s))
    }
}

/// Hex SHA-256 digest of raw image bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Image attached to an embed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
}

/// One embedded-content block of a chat message
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Embed {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<ImageRef>,
}

/// A "message created" event from the chat collaborator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatEvent {
    #[serde(default)]
    pub id: String,
    pub author_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl ChatEvent {
    /// Time elapsed since the event was received
    pub fn age(&self) -> chrono::Duration {
        Utc::now().signed_duration_since(self.received_at)
    }

    /// Only the first embed of a message is ever inspected
    pub fn primary_embed(&self) -> Option<&Embed> {
        self.embeds.first()
    }

    pub fn question(&self) -> Option<Question> {
        self.primary_embed().map(|embed| Question {
            channel_id: self.channel_id.clone(),
            title: embed.title.clone().unwrap_or_default(),
            description: embed.description.clone().unwrap_or_default(),
            image_url: embed.image.as_ref().map(|i| i.url.clone()),
        })
    }
}

/// A structured question lifted out of a chat event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub channel_id: String,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
}

/// What kind of round a question is
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Identify the country behind an image
    ImageIdentify { category: Category },
    /// Name the capital of the country shown in an image
    CapitalByImage,
    /// Name the capital of a country given as text
    CapitalByText { country: String },
}

/// A reply ready to be scheduled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    /// Lowercased reply text
    pub text: String,
    pub category: Category,
}

impl Answer {
    pub fn new(key: &str, category: Category) -> Self {
        Self {
            text: key.to_lowercase(),
            category,
        }
    }
}

/// Lifecycle of a single round
///
/// `Answered`, or `Learning -> {Learned | Expired}`.
/// `Skipped` covers rounds that are not ours or cannot be answered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Answered,
    Learning,
    Learned,
    Expired,
    Skipped,
}
