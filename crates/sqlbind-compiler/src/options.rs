//! Typed query options
//!
//! Options are written as `-- -- key: value` comment lines. After all
//! statements are compiled the raw values are parsed into [`QueryOptions`];
//! `invalidate` may only name queries compiled in the same run.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlbind_sql::validate::{
    OPTION_ALLOW_REPLICA, OPTION_CACHE, OPTION_COUNT_INTENT, OPTION_INVALIDATE, OPTION_TIMEOUT,
};

/// Parsed options of one query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    /// Result cache lifetime
    #[serde(default, with = "duration_ms", skip_serializing_if = "Option::is_none")]
    pub cache: Option<Duration>,

    /// Statement timeout
    #[serde(default, with = "duration_ms", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Queries whose cached results this statement invalidates
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalidates: Vec<String>,

    #[serde(default)]
    pub count_intent: bool,

    #[serde(default)]
    pub allow_replica: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptionError {
    #[error("time: invalid duration \"{0}\"")]
    InvalidDuration(String),

    #[error("{key} duration too short: {value}")]
    DurationTooShort { key: String, value: String },

    #[error("Unknown to invalidate query: {0}")]
    UnknownInvalidate(String),

    #[error("Unknown {key} value: {value}")]
    InvalidBool { key: String, value: String },

    #[error("Unknown option: {0}")]
    UnknownOption(String),
}

impl QueryOptions {
    /// Parse raw options; `known_queries` are the names `invalidate` may use
    pub fn parse(
        raw: &BTreeMap<String, String>,
        known_queries: &HashSet<&str>,
    ) -> Result<Self, OptionError> {
        let mut options = Self::default();
        for (key, value) in raw {
            match key.as_str() {
                OPTION_CACHE => options.cache = Some(minimum_duration(key, value)?),
                OPTION_TIMEOUT => options.timeout = Some(minimum_duration(key, value)?),
                OPTION_INVALIDATE => {
                    for name in value.trim_matches(|c| c == ' ' || c == '[' || c == ']').split(',') {
                        let name = name.trim();
                        if !known_queries.contains(name) {
                            return Err(OptionError::UnknownInvalidate(name.to_string()));
                        }
                        options.invalidates.push(name.to_string());
                    }
                }
                OPTION_COUNT_INTENT => options.count_intent = parse_bool(key, value)?,
                OPTION_ALLOW_REPLICA => options.allow_replica = parse_bool(key, value)?,
                other => return Err(OptionError::UnknownOption(other.to_string())),
            }
        }
        Ok(options)
    }
}

fn minimum_duration(key: &str, value: &str) -> Result<Duration, OptionError> {
    let (negative, duration) = parse_duration(value)?;
    if negative || duration < Duration::from_millis(1) {
        return Err(OptionError::DurationTooShort {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(duration)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, OptionError> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(OptionError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Parse a duration such as `300ms`, `1.5s` or `1h30m`
///
/// Returns the sign separately; a bare `0` is accepted without a unit.
pub fn parse_duration(text: &str) -> Result<(bool, Duration), OptionError> {
    let invalid = || OptionError::InvalidDuration(text.to_string());

    let (negative, mut rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    if rest == "0" {
        return Ok((negative, Duration::ZERO));
    }
    if rest.is_empty() {
        return Err(invalid());
    }

    let mut total_nanos: f64 = 0.0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_len];
        if number.is_empty() || number == "." {
            return Err(invalid());
        }
        let value: f64 = number.parse().map_err(|_| invalid())?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return Err(invalid()),
        };
        rest = &rest[unit_len..];
        total_nanos += value * unit;
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(invalid());
    }
    Ok((negative, Duration::from_nanos(total_nanos.round() as u64)))
}

/// Durations serialize as whole milliseconds
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("300ms").unwrap(), (false, Duration::from_millis(300)));
        assert_eq!(parse_duration("1h30m").unwrap().1, Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5s").unwrap().1, Duration::from_millis(1500));
        assert_eq!(parse_duration("0").unwrap().1, Duration::ZERO);
        assert!(parse_duration("-2s").unwrap().0);
        for bad in ["", "10", "5 s", "1d", "ms", "1..2s"] {
            assert!(parse_duration(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn parses_every_known_option() {
        let known = HashSet::from(["GetUser", "ListUsers"]);
        let options = QueryOptions::parse(
            &raw(&[
                ("cache", "10s"),
                ("timeout", "250ms"),
                ("invalidate", "[GetUser, ListUsers]"),
                ("count_intent", "false"),
                ("allow_replica", "true"),
            ]),
            &known,
        )
        .unwrap();

        assert_eq!(options.cache, Some(Duration::from_secs(10)));
        assert_eq!(options.timeout, Some(Duration::from_millis(250)));
        assert_eq!(options.invalidates, vec!["GetUser", "ListUsers"]);
        assert!(!options.count_intent);
        assert!(options.allow_replica);
    }

    #[test]
    fn rejects_bad_values() {
        let known = HashSet::from(["GetUser"]);
        let err = |pairs: &[(&str, &str)]| QueryOptions::parse(&raw(pairs), &known).unwrap_err().to_string();

        assert_eq!(err(&[("cache", "500us")]), "cache duration too short: 500us");
        assert_eq!(err(&[("timeout", "0")]), "timeout duration too short: 0");
        assert_eq!(err(&[("cache", "soon")]), "time: invalid duration \"soon\"");
        assert_eq!(err(&[("invalidate", "[Nope]")]), "Unknown to invalidate query: Nope");
        assert_eq!(err(&[("invalidate", "[]")]), "Unknown to invalidate query: ");
        assert_eq!(err(&[("invalidate", "[GetUser,]")]), "Unknown to invalidate query: ");
        assert_eq!(err(&[("count_intent", "maybe")]), "Unknown count_intent value: maybe");
        assert_eq!(err(&[("allow_replica", "TRUE")]), "Unknown allow_replica value: TRUE");
        assert_eq!(err(&[("retries", "3")]), "Unknown option: retries");
    }

    #[test]
    fn serializes_durations_as_millis() {
        let options = QueryOptions {
            cache: Some(Duration::from_secs(2)),
            ..QueryOptions::default()
        };
        let json = serde_json::to_value(&options).unwrap();
        assert_eq!(json["cache"], 2000);
        assert!(json.get("timeout").is_none());

        let back: QueryOptions = serde_json::from_value(json).unwrap();
        assert_eq!(back, options);
    }
}
