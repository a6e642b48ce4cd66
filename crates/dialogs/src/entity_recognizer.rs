//! Lightweight entity extraction used by prompts: numbers, yes/no, fuzzy choice matching, times.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use dbot_core::Entity;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

static NUMBER_EXP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[+-]?(?:\d+\.?\d*|\d*\.?\d+)").expect("number pattern"));
static YES_EXP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(1|y|yes|yep|sure|ok|true)(\W|$)").expect("yes pattern"));
static NO_EXP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(2|n|no|nope|not|false)(\W|$)").expect("no pattern"));

static ISO_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})(?:[T ](\d{1,2}):(\d{2})(?::(\d{2}))?)?").expect("iso pattern")
});
static US_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})(?:\s+(\d{1,2}):(\d{2})(?::(\d{2}))?)?").expect("date pattern")
});
static RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bin\s+(\d+)\s+(minute|hour|day|week)s?\b").expect("relative pattern")
});
static DAY_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(now|today|tonight|tomorrow|yesterday)\b(?:\s+at\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b)?")
        .expect("day pattern")
});
static AT_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bat\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b").expect("time pattern")
});

/// A set of choices: a `"red|green|blue"` list, explicit values, or the keys of a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub enum Choices {
    List(String),
    Values(Vec<String>),
}

impl From<&str> for Choices {
    fn from(list: &str) -> Self {
        Choices::List(list.to_string())
    }
}

impl From<String> for Choices {
    fn from(list: String) -> Self {
        Choices::List(list)
    }
}

impl From<Vec<String>> for Choices {
    fn from(values: Vec<String>) -> Self {
        Choices::Values(values)
    }
}

impl From<&[&str]> for Choices {
    fn from(values: &[&str]) -> Self {
        Choices::Values(values.iter().map(|v| v.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Choices {
    fn from(values: [&str; N]) -> Self {
        Choices::from(&values[..])
    }
}

impl<const N: usize> From<&[&str; N]> for Choices {
    fn from(values: &[&str; N]) -> Self {
        Choices::from(&values[..])
    }
}

impl From<&Map<String, Value>> for Choices {
    fn from(object: &Map<String, Value>) -> Self {
        Choices::Values(object.keys().cloned().collect())
    }
}

const ORDINALS: [&str; 10] = [
    "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth", "tenth",
];
const CARDINALS: [&str; 10] = [
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
];

/// Entity type of times found by [`EntityRecognizer::recognize_time`].
pub const TIME_ENTITY: &str = "chrono.duration";

/// A choice matched against an utterance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoundChoice {
    pub index: usize,
    pub entity: String,
    pub score: f64,
}

pub struct EntityRecognizer;

impl EntityRecognizer {
    /// First number in `text`, or the value of an ordinal/cardinal word ("second", "three").
    pub fn parse_number(text: &str) -> Option<f64> {
        let text = text.trim();
        if let Some(m) = NUMBER_EXP.find(text) {
            if let Ok(n) = m.as_str().parse::<f64>() {
                return Some(n);
            }
        }
        let word = text.to_lowercase();
        ORDINALS
            .iter()
            .position(|w| *w == word)
            .or_else(|| CARDINALS.iter().position(|w| *w == word))
            .map(|i| (i + 1) as f64)
    }

    /// `Some(true)` for yes-like answers, `Some(false)` for no-like answers.
    pub fn parse_boolean(text: &str) -> Option<bool> {
        let text = text.trim();
        if YES_EXP.is_match(text) {
            Some(true)
        } else if NO_EXP.is_match(text) {
            Some(false)
        } else {
            None
        }
    }

    /// Flattens `choices` into trimmed, non-empty values.
    pub fn expand_choices(choices: impl Into<Choices>) -> Vec<String> {
        let values = match choices.into() {
            Choices::List(list) => list.split('|').map(str::to_string).collect(),
            Choices::Values(values) => values,
        };
        values
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Every choice scoring above `threshold` against `utterance`.
    ///
    /// A choice containing the utterance scores by length ratio; an utterance containing the
    /// choice scores `0.5 + ratio` capped at 0.9; otherwise the choice scores by the share of
    /// its characters covered by utterance tokens.
    pub fn find_all_matches(choices: &[String], utterance: &str, threshold: f64) -> Vec<FoundChoice> {
        let utterance = utterance.trim().to_lowercase();
        let utterance_len = utterance.chars().count() as f64;
        let tokens: Vec<&str> = utterance.split(' ').collect();
        let mut matches = Vec::new();
        for (index, choice) in choices.iter().enumerate() {
            let value = choice.trim().to_lowercase();
            let value_len = value.chars().count() as f64;
            if value_len == 0.0 || utterance_len == 0.0 {
                continue;
            }
            let score = if value.contains(&utterance) {
                utterance_len / value_len
            } else if utterance.contains(&value) {
                (0.5 + value_len / utterance_len).min(0.9)
            } else {
                let matched: usize = tokens
                    .iter()
                    .filter(|t| !t.is_empty() && value.contains(**t))
                    .map(|t| t.chars().count())
                    .sum();
                matched as f64 / value_len
            };
            if score > threshold {
                matches.push(FoundChoice {
                    index,
                    entity: choice.clone(),
                    score,
                });
            }
        }
        matches
    }

    /// Highest-scoring match; ties keep the earlier choice.
    pub fn find_best_match(choices: &[String], utterance: &str, threshold: f64) -> Option<FoundChoice> {
        Self::find_all_matches(choices, utterance, threshold)
            .into_iter()
            .fold(None, |best: Option<FoundChoice>, m| match best {
                Some(b) if b.score >= m.score => Some(b),
                _ => Some(m),
            })
    }

    /// Date/time expression in `text`, resolved against `now` and scored by the share of the
    /// text it covers.
    pub fn recognize_time(text: &str, now: DateTime<Utc>) -> Option<Entity> {
        let len = text.chars().count();
        if len == 0 {
            return None;
        }
        let (caps, start) = if let Some(c) = ISO_DATE.captures(text) {
            let s = resolve_date(&c, 1, 2, 3)?;
            (c, s)
        } else if let Some(c) = US_DATE.captures(text) {
            let s = resolve_date(&c, 3, 1, 2)?;
            (c, s)
        } else if let Some(c) = RELATIVE.captures(text) {
            let n: i64 = c.get(1)?.as_str().parse().ok()?;
            let delta = match c.get(2)?.as_str().to_lowercase().as_str() {
                "minute" => Duration::minutes(n),
                "hour" => Duration::hours(n),
                "day" => Duration::days(n),
                _ => Duration::weeks(n),
            };
            (c, now + delta)
        } else if let Some(c) = DAY_WORD.captures(text) {
            let word = c.get(1)?.as_str().to_lowercase();
            let base = match word.as_str() {
                "tomorrow" => now + Duration::days(1),
                "yesterday" => now - Duration::days(1),
                _ => now,
            };
            let start = match clock_time(&c, 2, 3, 4) {
                Some(t) => Utc.from_utc_datetime(&base.date_naive().and_time(t)),
                None if word == "tonight" => {
                    Utc.from_utc_datetime(&base.date_naive().and_time(NaiveTime::from_hms_opt(20, 0, 0)?))
                }
                None => base,
            };
            (c, start)
        } else if let Some(c) = AT_TIME.captures(text) {
            let t = clock_time(&c, 1, 2, 3)?;
            let start = Utc.from_utc_datetime(&now.date_naive().and_time(t));
            (c, start)
        } else {
            return None;
        };

        let whole = caps.get(0)?;
        let matched = whole.as_str().chars().count();
        let start_index = text[..whole.start()].chars().count();
        Some(Entity {
            entity_type: TIME_ENTITY.to_string(),
            entity: whole.as_str().to_string(),
            start_index: Some(start_index),
            end_index: Some(start_index + matched),
            score: matched as f64 / len as f64,
            resolution: Some(json!({ "start": start.to_rfc3339() })),
        })
    }

    /// Start time carried by a time entity.
    pub fn resolve_time(entity: &Entity) -> Option<DateTime<Utc>> {
        let start = entity.resolution.as_ref()?.get("start")?.as_str()?;
        DateTime::parse_from_rfc3339(start)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }
}

fn capture_u32(c: &Captures<'_>, i: usize) -> Option<u32> {
    c.get(i).and_then(|m| m.as_str().parse().ok())
}

/// Date from the year/month/day groups, with an optional `hh:mm[:ss]` in the three groups after `day`.
fn resolve_date(c: &Captures<'_>, year: usize, month: usize, day: usize) -> Option<DateTime<Utc>> {
    let date = NaiveDate::from_ymd_opt(capture_u32(c, year)? as i32, capture_u32(c, month)?, capture_u32(c, day)?)?;
    let time_group = year.max(month).max(day) + 1;
    let time = match capture_u32(c, time_group) {
        Some(h) => NaiveTime::from_hms_opt(
            h,
            capture_u32(c, time_group + 1).unwrap_or(0),
            capture_u32(c, time_group + 2).unwrap_or(0),
        )?,
        None => NaiveTime::from_hms_opt(0, 0, 0)?,
    };
    Some(Utc.from_utc_datetime(&date.and_time(time)))
}

fn clock_time(c: &Captures<'_>, hour: usize, minute: usize, meridiem: usize) -> Option<NaiveTime> {
    let mut h = capture_u32(c, hour)?;
    let m = capture_u32(c, minute).unwrap_or(0);
    let meridiem = c.get(meridiem).map(|m| m.as_str().to_lowercase());
    match meridiem.as_deref() {
        Some("pm") if h < 12 => h += 12,
        Some("am") if h == 12 => h = 0,
        _ => {}
    }
    NaiveTime::from_hms_opt(h, m, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices() -> Vec<String> {
        EntityRecognizer::expand_choices("Red|Green|Blue")
    }

    #[test]
    fn test_expand_choices_accepts_lists_values_and_object_keys() {
        assert_eq!(EntityRecognizer::expand_choices(["Red", " Blue ", ""]), vec!["Red", "Blue"]);
        assert_eq!(EntityRecognizer::expand_choices(vec!["A".to_string()]), vec!["A"]);
        let object = json!({ "Small": 8, "Large": 12 });
        let keys = EntityRecognizer::expand_choices(object.as_object().unwrap());
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"Small".to_string()));
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(EntityRecognizer::parse_number("I want 42 please"), Some(42.0));
        assert_eq!(EntityRecognizer::parse_number("-3.5"), Some(-3.5));
        assert_eq!(EntityRecognizer::parse_number("Second"), Some(2.0));
        assert_eq!(EntityRecognizer::parse_number("none"), None);
    }

    #[test]
    fn test_parse_boolean() {
        assert_eq!(EntityRecognizer::parse_boolean("Yes please"), Some(true));
        assert_eq!(EntityRecognizer::parse_boolean("ok"), Some(true));
        assert_eq!(EntityRecognizer::parse_boolean("nope"), Some(false));
        assert_eq!(EntityRecognizer::parse_boolean("maybe"), None);
        assert_eq!(EntityRecognizer::parse_boolean("yesterday"), None);
    }

    #[test]
    fn test_find_best_match() {
        let best = EntityRecognizer::find_best_match(&choices(), "blue", 0.6).unwrap();
        assert_eq!(best.index, 2);
        assert_eq!(best.entity, "Blue");
        assert_eq!(best.score, 1.0);

        let partial = EntityRecognizer::find_best_match(&choices(), "the green one", 0.6).unwrap();
        assert_eq!(partial.entity, "Green");
        assert!(partial.score <= 0.9);

        assert!(EntityRecognizer::find_best_match(&choices(), "purple", 0.6).is_none());
    }

    #[test]
    fn test_recognize_time_absolute_and_relative() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

        let e = EntityRecognizer::recognize_time("06/15/2024 14:30", now).unwrap();
        assert_eq!(e.score, 1.0);
        assert_eq!(
            EntityRecognizer::resolve_time(&e),
            Some(Utc.with_ymd_and_hms(2024, 6, 15, 14, 30, 0).unwrap())
        );

        let e = EntityRecognizer::recognize_time("tomorrow at 3pm", now).unwrap();
        assert_eq!(
            EntityRecognizer::resolve_time(&e),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 15, 0, 0).unwrap())
        );

        let e = EntityRecognizer::recognize_time("remind me in 2 hours", now).unwrap();
        assert_eq!(e.entity, "in 2 hours");
        assert!((e.score - 10.0 / 20.0).abs() < 1e-9);

        assert!(EntityRecognizer::recognize_time("whenever", now).is_none());
    }
}
