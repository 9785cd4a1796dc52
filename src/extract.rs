//! Heuristic extraction of event listings from a markdown rendering of a
//! Luma calendar page.
//!
//! The page is scanned line by line. Date headers like `Dec 5` set the date
//! for every event link that follows, until the next header. Each event link
//! gets a bounded window of nearby lines searched for its start time, venue,
//! category label, and cover image. The whole pass is total: any input that
//! matches nothing simply yields no events.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Category, EventCandidate, SOURCE_LUMA};

static DATE_HEADER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec) (\d+)(?:, (\d{4}))?")
        .expect("valid date header regex")
});

static EVENT_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[([^\]]+)\]\(https://luma\.com/([^)]+)\)").expect("valid event link regex")
});

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,2}):(\d{2})\s*(AM|PM)").expect("valid time regex"));

static IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\[.*?\]\((https://images\.lumacdn\.com[^)]+)\)").expect("valid image regex")
});

const MONTHS: [(&str, &str); 12] = [
    ("Jan", "January"),
    ("Feb", "February"),
    ("Mar", "March"),
    ("Apr", "April"),
    ("May", "May"),
    ("Jun", "June"),
    ("Jul", "July"),
    ("Aug", "August"),
    ("Sep", "September"),
    ("Oct", "October"),
    ("Nov", "November"),
    ("Dec", "December"),
];

fn full_month(abbr: &str) -> &'static str {
    MONTHS
        .iter()
        .find(|(short, _)| *short == abbr)
        .map(|(_, full)| *full)
        .expect("month abbreviation constrained by the header regex")
}

/// One rule in the venue vocabulary. Rules are checked in order against the
/// text around an event link and the first match wins.
#[derive(Debug, Clone)]
pub enum LocationRule {
    /// A phrase appearing anywhere in the window maps to a canonical name.
    Phrase { needle: String, canonical: String },
    /// Two tokens both present in the window (the calendar often splits city
    /// and country across lines) map to a canonical name.
    CityCountry {
        city: String,
        country: String,
        canonical: String,
    },
}

impl LocationRule {
    pub fn phrase(needle: &str) -> Self {
        LocationRule::Phrase {
            needle: needle.to_string(),
            canonical: needle.to_string(),
        }
    }

    pub fn phrase_as(needle: &str, canonical: &str) -> Self {
        LocationRule::Phrase {
            needle: needle.to_string(),
            canonical: canonical.to_string(),
        }
    }

    pub fn city_country(city: &str, country: &str) -> Self {
        LocationRule::CityCountry {
            city: city.to_string(),
            country: country.to_string(),
            canonical: format!("{city}, {country}"),
        }
    }

    fn matches(&self, text: &str) -> Option<&str> {
        match self {
            LocationRule::Phrase { needle, canonical } if text.contains(needle.as_str()) => {
                Some(canonical)
            }
            LocationRule::CityCountry {
                city,
                country,
                canonical,
            } if text.contains(city.as_str()) && text.contains(country.as_str()) => Some(canonical),
            _ => None,
        }
    }
}

/// Tunable parts of the extractor: the year assumed for headers that omit
/// one, the venue vocabulary, and the size of the search windows around each
/// event link.
#[derive(Debug, Clone)]
pub struct ExtractorRules {
    pub default_year: String,
    pub locations: Vec<LocationRule>,
    /// How many lines past a link are searched for time, venue and category.
    pub lookahead_lines: usize,
    /// How many lines before a link are searched for the cover image.
    pub image_back_lines: usize,
    /// How many lines past a link are searched for the cover image.
    pub image_ahead_lines: usize,
}

impl Default for ExtractorRules {
    fn default() -> Self {
        Self {
            default_year: "2025".to_string(),
            locations: vec![
                LocationRule::phrase("Encode Hub"),
                LocationRule::phrase("City & Guilds Building"),
                LocationRule::phrase("UCL BaseKX"),
                LocationRule::city_country("London", "England"),
                LocationRule::phrase("Hammersmith International Centre"),
                LocationRule::phrase("Techspace Goswell Road"),
                LocationRule::phrase_as(
                    "The Ministry",
                    "The Ministry, Borough | Workspace & Members' Club | South London",
                ),
                LocationRule::phrase("Manchester, England"),
                LocationRule::phrase_as("London (Register", "London (Register to see actual location)"),
            ],
            lookahead_lines: 15,
            image_back_lines: 2,
            image_ahead_lines: 4,
        }
    }
}

/// What a single trimmed line means to the scanner. Headers and links are
/// boundaries: no search window reaches past them into a neighbouring card.
#[derive(Debug)]
enum LineKind<'a> {
    DateHeader {
        month: &'a str,
        day: &'a str,
        year: Option<&'a str>,
    },
    EventLink {
        name: &'a str,
        slug: &'a str,
    },
    Plain,
}

impl LineKind<'_> {
    fn is_boundary(&self) -> bool {
        !matches!(self, LineKind::Plain)
    }
}

fn classify(line: &str) -> LineKind<'_> {
    if let Some(caps) = DATE_HEADER_RE.captures(line) {
        return LineKind::DateHeader {
            month: caps.get(1).unwrap().as_str(),
            day: caps.get(2).unwrap().as_str(),
            year: caps.get(3).map(|m| m.as_str()),
        };
    }
    if let Some(caps) = EVENT_LINK_RE.captures(line) {
        return LineKind::EventLink {
            name: caps.get(1).unwrap().as_str().trim(),
            slug: caps.get(2).unwrap().as_str().trim(),
        };
    }
    LineKind::Plain
}

/// Scan a markdown document and return every event listing found, in page
/// order. Navigation links (slug contains `map`) and links whose text is too
/// short to be a name are dropped.
pub fn extract_events(markdown: &str, rules: &ExtractorRules) -> Vec<EventCandidate> {
    let lines: Vec<&str> = markdown.lines().map(str::trim).collect();
    let kinds: Vec<LineKind> = lines.iter().map(|line| classify(line)).collect();

    let mut events = Vec::new();
    let mut current_date: Option<String> = None;

    for (i, kind) in kinds.iter().enumerate() {
        match kind {
            LineKind::DateHeader { month, day, year } => {
                let year = year.unwrap_or(rules.default_year.as_str());
                current_date = Some(format!("{} {}, {}", full_month(month), day, year));
            }
            LineKind::EventLink { name, slug } => {
                if slug.to_lowercase().contains("map") || name.chars().count() < 3 {
                    continue;
                }

                let window = detail_window(&kinds, i, rules);
                let mut category = scan_category(&lines[window.clone()]);
                if category == Category::NonHackathon && name.to_lowercase().contains("hackathon")
                {
                    category = Category::Hackathon;
                }

                events.push(EventCandidate {
                    name: (*name).to_string(),
                    date: current_date.clone(),
                    time: find_time(&lines[window.clone()]),
                    location: find_location(&lines[i..window.end], rules),
                    url: format!("https://luma.com/{slug}"),
                    image_url: find_image(&lines, &kinds, i, rules),
                    category,
                    source: SOURCE_LUMA.to_string(),
                });
            }
            LineKind::Plain => {}
        }
    }

    events
}

/// Lines after a link that belong to its card: at most `lookahead_lines`
/// past the link, clipped at the next header or link.
fn detail_window(kinds: &[LineKind], link_idx: usize, rules: &ExtractorRules) -> Range<usize> {
    let start = (link_idx + 1).min(kinds.len());
    let cap = (link_idx + rules.lookahead_lines).min(kinds.len()).max(start);
    let end = kinds[start..cap]
        .iter()
        .position(LineKind::is_boundary)
        .map(|offset| start + offset)
        .unwrap_or(cap);
    start..end
}

/// First time-of-day mention in the window, as written on the page.
fn find_time(window: &[&str]) -> Option<String> {
    window
        .iter()
        .find_map(|line| TIME_RE.find(line).map(|m| m.as_str().to_string()))
}

/// Run the venue vocabulary over the link line and its detail window joined
/// into one haystack. First rule in priority order wins.
fn find_location(context: &[&str], rules: &ExtractorRules) -> Option<String> {
    let joined = context.join(" ");
    rules
        .locations
        .iter()
        .find_map(|rule| rule.matches(&joined).map(str::to_string))
}

/// Cover image for the card at `link_idx`. Luma puts the image just above or
/// just below its link, so the search spans a few lines either side of the
/// link but never crosses into a neighbouring card.
fn find_image(
    lines: &[&str],
    kinds: &[LineKind],
    link_idx: usize,
    rules: &ExtractorRules,
) -> Option<String> {
    let back_floor = link_idx.saturating_sub(rules.image_back_lines);
    let start = (back_floor..link_idx)
        .rev()
        .find(|&j| kinds[j].is_boundary())
        .map(|j| j + 1)
        .unwrap_or(back_floor);

    let cap = (link_idx + 1 + rules.image_ahead_lines).min(lines.len());
    let end = ((link_idx + 1)..cap)
        .find(|&j| kinds[j].is_boundary())
        .unwrap_or(cap);

    lines[start..end]
        .iter()
        .find_map(|line| IMAGE_RE.captures(line).map(|caps| caps[1].to_string()))
}

/// Category labels apply per line, and the last labelled line in the window
/// wins. A line naming hackathons counts unless it is explicitly the
/// non-hackathon label.
fn scan_category(window: &[&str]) -> Category {
    let mut category = Category::NonHackathon;
    for line in window {
        if line.contains("Hackathon") && !line.contains("Non-Hackathon") {
            category = Category::Hackathon;
        } else if line.contains("Non-Hackathon")
            || (line.contains("Non") && line.contains("Hackathon"))
        {
            category = Category::NonHackathon;
        }
    }
    category
}
