//! Speech-level and month-level sentiment records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Polarity label assigned to a speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Hawkish,
    Dovish,
    Neutral,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Hawkish => "hawkish",
            Polarity::Dovish => "dovish",
            Polarity::Neutral => "neutral",
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Polarity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hawkish" => Ok(Polarity::Hawkish),
            "dovish" => Ok(Polarity::Dovish),
            "neutral" => Ok(Polarity::Neutral),
            other => Err(format!("unknown sentiment label '{other}'")),
        }
    }
}

/// One speech.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentimentRecord {
    pub date: NaiveDate,
    pub polarity: Polarity,
    /// Issuing institution or country code (e.g. "US").
    pub source: String,
}

impl SentimentRecord {
    pub fn new(date: NaiveDate, polarity: Polarity, source: impl Into<String>) -> Self {
        Self {
            date,
            polarity,
            source: source.into(),
        }
    }
}

/// Speech counts for one calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthlySentimentCount {
    /// First day of the month.
    pub month: NaiveDate,
    pub hawkish: u32,
    pub dovish: u32,
    pub neutral: u32,
}

impl MonthlySentimentCount {
    pub fn empty(month: NaiveDate) -> Self {
        Self {
            month,
            hawkish: 0,
            dovish: 0,
            neutral: 0,
        }
    }

    pub fn total(&self) -> u32 {
        self.hawkish + self.dovish + self.neutral
    }

    pub fn record(&mut self, polarity: Polarity) {
        match polarity {
            Polarity::Hawkish => self.hawkish += 1,
            Polarity::Dovish => self.dovish += 1,
            Polarity::Neutral => self.neutral += 1,
        }
    }
}
