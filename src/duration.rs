//! Go-style duration strings (`"2h0m0s"`, `"1h30m"`, `"500ms"`).
//!
//! Policies carry their limits in this form, so the manifest types use
//! `#[serde(with = "crate::duration")]` on every `TimeDelta` field.

use std::collections::BTreeMap;
use std::fmt::Write;

use chrono::TimeDelta;
use serde::{Deserialize, Deserializer, Serializer};

const NS_PER_US: u64 = 1_000;
const NS_PER_MS: u64 = 1_000_000;
const NS_PER_S: u64 = 1_000_000_000;
const NS_PER_M: u64 = 60 * NS_PER_S;
const NS_PER_H: u64 = 60 * NS_PER_M;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DurationError {
    #[error("invalid duration {0:?}")]
    Invalid(String),
    #[error("missing unit in duration {0:?}")]
    MissingUnit(String),
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
    #[error("duration {0:?} out of range")]
    Overflow(String),
}

pub fn parse(input: &str) -> Result<TimeDelta, DurationError> {
    let (negative, mut rest) = match input.strip_prefix('-') {
        Some(r) => (true, r),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };
    if rest == "0" {
        return Ok(TimeDelta::zero());
    }
    if rest.is_empty() {
        return Err(DurationError::Invalid(input.to_string()));
    }

    let mut total: i128 = 0;
    while !rest.is_empty() {
        let int_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(r) = rest.strip_prefix('.') {
            let frac_len = r.find(|c: char| !c.is_ascii_digit()).unwrap_or(r.len());
            frac_part = &r[..frac_len];
            rest = &r[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DurationError::Invalid(input.to_string()));
        }

        let unit_len = rest
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let scale: i128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => NS_PER_US as i128,
            "ms" => NS_PER_MS as i128,
            "s" => NS_PER_S as i128,
            "m" => NS_PER_M as i128,
            "h" => NS_PER_H as i128,
            "" => return Err(DurationError::MissingUnit(input.to_string())),
            other => {
                return Err(DurationError::UnknownUnit {
                    unit: other.to_string(),
                    input: input.to_string(),
                });
            }
        };

        if int_part.len() > 20 {
            return Err(DurationError::Overflow(input.to_string()));
        }
        if !int_part.is_empty() {
            let whole: i128 = int_part
                .parse()
                .map_err(|_| DurationError::Invalid(input.to_string()))?;
            total += whole * scale;
        }
        if !frac_part.is_empty() {
            let digits = &frac_part[..frac_part.len().min(18)];
            let frac: i128 = digits
                .parse()
                .map_err(|_| DurationError::Invalid(input.to_string()))?;
            total += frac * scale / 10i128.pow(digits.len() as u32);
        }
        if total > i64::MAX as i128 {
            return Err(DurationError::Overflow(input.to_string()));
        }
    }

    let ns = if negative { -total } else { total };
    Ok(TimeDelta::nanoseconds(ns as i64))
}

/// Render like Go's `time.Duration.String`: `"1h30m0s"`, `"1.5s"`, `"250ms"`.
pub fn format(d: TimeDelta) -> String {
    let Some(total) = d.num_nanoseconds() else {
        return format!("{}s", d.num_seconds());
    };
    if total == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    if total < 0 {
        out.push('-');
    }
    let mut u = total.unsigned_abs();

    if u < NS_PER_S {
        let (scale, unit) = if u < NS_PER_US {
            (1, "ns")
        } else if u < NS_PER_MS {
            (NS_PER_US, "µs")
        } else {
            (NS_PER_MS, "ms")
        };
        out.push_str(&fractional(u, scale));
        out.push_str(unit);
        return out;
    }

    let hours = u / NS_PER_H;
    u %= NS_PER_H;
    let minutes = u / NS_PER_M;
    u %= NS_PER_M;
    if hours > 0 {
        let _ = write!(out, "{hours}h");
    }
    if hours > 0 || minutes > 0 {
        let _ = write!(out, "{minutes}m");
    }
    out.push_str(&fractional(u, NS_PER_S));
    out.push('s');
    out
}

fn fractional(value: u64, scale: u64) -> String {
    let whole = value / scale;
    let rem = value % scale;
    if rem == 0 {
        return whole.to_string();
    }
    let width = scale.ilog10() as usize;
    let digits = format!("{rem:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

pub fn serialize<S: Serializer>(d: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(*d))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
    let s = String::deserialize(deserializer)?;
    parse(&s).map_err(serde::de::Error::custom)
}

/// Same encoding for maps of durations, e.g. per-policy usage.
pub mod map {
    use super::*;
    use serde::ser::SerializeMap;

    pub fn serialize<S: Serializer>(
        m: &BTreeMap<String, TimeDelta>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_map(Some(m.len()))?;
        for (k, v) in m {
            out.serialize_entry(k, &format(*v))?;
        }
        out.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, TimeDelta>, D::Error> {
        let raw = BTreeMap::<String, String>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(k, v)| parse(&v).map(|d| (k, d)).map_err(serde::de::Error::custom))
            .collect()
    }
}
