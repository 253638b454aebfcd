//! Grant durations: how long an approval stays valid.
//!
//! Two spellings are accepted:
//!
//! | Form | Examples | Notes |
//! |------|----------|-------|
//! | short | `45s`, `30m`, `1h`, `30d` | one integer and one unit |
//! | ISO 8601 | `PT1H`, `P30D`, `P1Y2M3DT4H5M6S` | a year is 365 days, a month 30 |
//!
//! The original text is kept verbatim; it is what gets persisted and echoed
//! back to callers.

use std::{fmt, str::FromStr};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// The grant duration applied when a request does not specify one.
pub const DEFAULT_GRANT_DURATION: &str = "1h";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GrantDuration {
  text: String,
  span: Duration,
}

impl GrantDuration {
  pub fn parse(text: &str) -> Result<Self> {
    let text = text.trim();
    let secs = if let Some(rest) = text.strip_prefix('P') {
      parse_iso(rest)
    } else {
      parse_short(text)
    }
    .ok_or_else(|| Error::Validation(format!("invalid grant duration {text:?}")))?;

    if secs <= 0 {
      return Err(Error::Validation(format!(
        "grant duration {text:?} must be longer than zero"
      )));
    }
    let span = Duration::try_seconds(secs)
      .ok_or_else(|| Error::Validation(format!("grant duration {text:?} is too long")))?;

    Ok(Self { text: text.to_owned(), span })
  }

  /// Parse `text`, falling back to [`DEFAULT_GRANT_DURATION`] when it is
  /// absent or blank.
  pub fn parse_or_default(text: Option<&str>) -> Result<Self> {
    match text.map(str::trim) {
      Some(t) if !t.is_empty() => Self::parse(t),
      _ => Ok(Self::default()),
    }
  }

  pub fn as_str(&self) -> &str { &self.text }

  pub fn span(&self) -> Duration { self.span }
}

impl Default for GrantDuration {
  fn default() -> Self {
    Self { text: DEFAULT_GRANT_DURATION.to_owned(), span: Duration::hours(1) }
  }
}

impl fmt::Display for GrantDuration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.text) }
}

impl FromStr for GrantDuration {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> { Self::parse(s) }
}

impl TryFrom<String> for GrantDuration {
  type Error = Error;

  fn try_from(s: String) -> Result<Self> { Self::parse(&s) }
}

impl From<GrantDuration> for String {
  fn from(d: GrantDuration) -> Self { d.text }
}

// ─── Parsers ─────────────────────────────────────────────────────────────────

/// `<n><unit>` with unit one of `s`, `m`, `h`, `d`.
fn parse_short(text: &str) -> Option<i64> {
  let unit = text.chars().last()?;
  let digits = &text[..text.len() - unit.len_utf8()];
  let scale = match unit {
    's' => 1,
    'm' => MINUTE,
    'h' => HOUR,
    'd' => DAY,
    _ => return None,
  };
  parse_number(digits)?.checked_mul(scale)
}

/// The part of an ISO 8601 duration after the leading `P`.
fn parse_iso(rest: &str) -> Option<i64> {
  let (date, time) = match rest.split_once('T') {
    Some((date, time)) => {
      if time.is_empty() {
        return None;
      }
      (date, Some(time))
    }
    None => (rest, None),
  };
  if date.is_empty() && time.is_none() {
    return None;
  }

  let mut total =
    sum_components(date, &[('Y', 365 * DAY), ('M', 30 * DAY), ('D', DAY)])?;
  if let Some(time) = time {
    total = total
      .checked_add(sum_components(time, &[('H', HOUR), ('M', MINUTE), ('S', 1)])?)?;
  }
  Some(total)
}

/// Sum `<n><designator>` pairs; designators must appear in `units` order and
/// at most once each.
fn sum_components(mut text: &str, units: &[(char, i64)]) -> Option<i64> {
  let mut total: i64 = 0;
  let mut next_unit = 0;

  while !text.is_empty() {
    let split = text.find(|c: char| !c.is_ascii_digit())?;
    let (digits, tail) = text.split_at(split);
    let designator = tail.chars().next()?;

    let offset = units[next_unit..].iter().position(|(d, _)| *d == designator)?;
    let (_, scale) = units[next_unit + offset];
    next_unit += offset + 1;

    total = total.checked_add(parse_number(digits)?.checked_mul(scale)?)?;
    text = &tail[designator.len_utf8()..];
  }

  Some(total)
}

fn parse_number(digits: &str) -> Option<i64> {
  if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
    return None;
  }
  digits.parse().ok()
}
