//! Splits extracted document text into question candidates.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A question marker at the start of a trimmed line:
/// `Q1.`, `Question 3:`, `q.12)`, `Q:`, `4)`, `7 -` and so on.
static RE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:question|q)\s*\.?\s*(?P<qnum>\d{1,2})(?:\s*[).:\-]|\s+|$)|(?:question|q)\s*[).:\-]|(?P<num>\d{1,2})(?:\s*[).:\-]|\s+))\s*(?P<body>.*)$",
    )
    .unwrap()
});

/// Lines at or under this many characters are noise in the fallback path.
pub const MIN_FALLBACK_LINE_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
    Expert,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "EASY",
            Self::Medium => "MEDIUM",
            Self::Hard => "HARD",
            Self::Expert => "EXPERT",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EASY" => Ok(Self::Easy),
            "MEDIUM" => Ok(Self::Medium),
            "HARD" => Ok(Self::Hard),
            "EXPERT" => Ok(Self::Expert),
            other => Err(format!("unknown difficulty '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentedQuestion {
    pub number: String,
    pub text: String,
    pub marks: f64,
    pub difficulty: Difficulty,
}

impl SegmentedQuestion {
    fn new(number: String, text: String) -> Self {
        Self {
            number,
            text,
            marks: 0.0,
            difficulty: Difficulty::Medium,
        }
    }
}

struct Pending {
    number: Option<String>,
    body: String,
}

/// Segments `text` into questions in document order.
///
/// Each marker starts a question whose body runs until the next marker;
/// continuation lines are joined with single spaces. Without any marker,
/// every line longer than [`MIN_FALLBACK_LINE_CHARS`] becomes a question
/// numbered by its position among non-empty lines.
pub fn segment(text: &str) -> Vec<SegmentedQuestion> {
    let mut pending: Vec<Pending> = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(caps) = RE_MARKER.captures(trimmed) {
            let number = caps
                .name("qnum")
                .or_else(|| caps.name("num"))
                .map(|m| m.as_str().trim_start_matches('0').to_string())
                .map(|n| if n.is_empty() { "0".to_string() } else { n });
            pending.push(Pending {
                number,
                body: caps
                    .name("body")
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default(),
            });
        } else if let Some(current) = pending.last_mut() {
            if !trimmed.is_empty() {
                if !current.body.is_empty() {
                    current.body.push(' ');
                }
                current.body.push_str(trimmed);
            }
        }
    }

    if pending.is_empty() {
        return fallback_lines(text);
    }

    pending
        .into_iter()
        .enumerate()
        .filter(|(_, p)| !p.body.trim().is_empty())
        .map(|(index, p)| {
            let number = p.number.unwrap_or_else(|| (index + 1).to_string());
            SegmentedQuestion::new(number, p.body)
        })
        .collect()
}

fn fallback_lines(text: &str) -> Vec<SegmentedQuestion> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .filter(|(_, line)| line.chars().count() > MIN_FALLBACK_LINE_CHARS)
        .map(|(index, line)| SegmentedQuestion::new((index + 1).to_string(), line.to_string()))
        .collect()
}
