use serde::{Deserialize, Serialize};

/// Provenance tag stamped on every record this scraper emits.
pub const SOURCE_LUMA: &str = "luma";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Hackathon,
    NonHackathon,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Hackathon => "hackathon",
            Category::NonHackathon => "non-hackathon",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "hackathon" => Some(Category::Hackathon),
            "non-hackathon" => Some(Category::NonHackathon),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event reconstructed from the calendar markdown, not yet persisted.
/// `url` is the identity key; `date` and `time` are carried as display
/// strings exactly as the page showed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCandidate {
    pub name: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub category: Category,
    pub source: String,
}

/// A stored event row. `id` is assigned on first insert and never rewritten;
/// `scraped_at` is epoch milliseconds of the last write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEvent {
    pub id: String,
    pub name: String,
    pub date: Option<String>,
    pub time: Option<String>,
    pub location: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub category: Category,
    pub source: String,
    pub scraped_at: i64,
}
