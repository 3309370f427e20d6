//! Purpose: Page lengths written the way people write them ("8.5in", "1 1/2\"", "2.54cm").
//! Exports: `Length`, `LengthUnit`, `LENGTH_PATTERN`.
//! Role: Keeps the user's spelling (normalized) next to the value in points.
//! Invariants: The definition string always re-parses to the same number of points.
//! Invariants: JSON form is the definition string.
use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

use crate::core::error::{Error, ErrorKind};

/// Regular expression equivalent to what `Length::from_str` accepts, for client-side validation.
pub const LENGTH_PATTERN: &str = r#"^\s*(\d+(?:\.\d*)?|\.\d+|(?:\d+(?:\s+|-))?\d+/[1-9]\d*)\s*("|in|pt|cm|mm|mil)\s*$"#;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LengthUnit {
    Points,
    Inches,
    Mils,
    Centimeters,
    Millimeters,
}

impl LengthUnit {
    fn parse(unit: &str) -> Option<Self> {
        match unit {
            "\"" | "in" => Some(LengthUnit::Inches),
            "pt" => Some(LengthUnit::Points),
            "mil" => Some(LengthUnit::Mils),
            "cm" => Some(LengthUnit::Centimeters),
            "mm" => Some(LengthUnit::Millimeters),
            _ => None,
        }
    }

    pub fn points_per_unit(self) -> f64 {
        match self {
            LengthUnit::Points => 1.0,
            LengthUnit::Inches => 72.0,
            LengthUnit::Mils => 0.072,
            LengthUnit::Centimeters => 72.0 / 2.54,
            LengthUnit::Millimeters => 72.0 / 25.4,
        }
    }

    fn normalized(self) -> &'static str {
        match self {
            LengthUnit::Points => "pt",
            LengthUnit::Inches => "\"",
            LengthUnit::Mils => "mil",
            LengthUnit::Centimeters => "cm",
            LengthUnit::Millimeters => "mm",
        }
    }
}

/// A page length with its defining string.
#[derive(Clone, Debug, PartialEq)]
pub struct Length {
    definition: String,
    points: f64,
}

impl Length {
    pub fn from_points(points: f64) -> Self {
        Self {
            definition: format!("{points}pt"),
            points,
        }
    }

    pub fn points(&self) -> f64 {
        self.points
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }
}

impl Default for Length {
    fn default() -> Self {
        Self::from_points(0.0)
    }
}

impl fmt::Display for Length {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.definition)
    }
}

impl FromStr for Length {
    type Err = Error;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            Error::new(ErrorKind::Usage)
                .with_message(format!("could not parse length {input:?}"))
                .with_hint("Use a number or fraction followed by a unit: \", in, pt, cm, mm or mil.")
        };

        let trimmed = input.trim();
        let split = trimmed
            .find(|c: char| c.is_ascii_alphabetic() || c == '"')
            .ok_or_else(invalid)?;
        let (number, unit) = trimmed.split_at(split);
        let unit = LengthUnit::parse(unit).ok_or_else(invalid)?;
        let (normalized, value) = parse_number(number.trim_end()).ok_or_else(invalid)?;

        Ok(Self {
            definition: format!("{normalized}{}", unit.normalized()),
            points: value * unit.points_per_unit(),
        })
    }
}

fn parse_number(number: &str) -> Option<(String, f64)> {
    if is_decimal(number) {
        let value = number.parse::<f64>().ok()?;
        return Some((number.to_string(), value));
    }
    parse_fraction(number)
}

fn is_decimal(text: &str) -> bool {
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (text, None),
    };
    let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    match fraction {
        None => !whole.is_empty() && digits(whole),
        Some(fraction) => {
            digits(whole) && digits(fraction) && (!whole.is_empty() || !fraction.is_empty())
        }
    }
}

// `N/D`, `W N/D` or `W-N/D`.
fn parse_fraction(text: &str) -> Option<(String, f64)> {
    let (whole, ratio) = match text.rfind(|c: char| c.is_ascii_whitespace() || c == '-') {
        Some(at) => {
            let whole = text[..at].trim_end_matches(|c: char| c.is_ascii_whitespace());
            if text[at..].starts_with('-') && whole.len() != at {
                return None;
            }
            (Some(whole), &text[at + 1..])
        }
        None => (None, text),
    };
    let (numerator, denominator) = ratio.split_once('/')?;
    let is_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    if !is_digits(numerator) || !is_digits(denominator) || denominator.starts_with('0') {
        return None;
    }

    let mut value = numerator.parse::<f64>().ok()? / denominator.parse::<f64>().ok()?;
    let mut normalized = String::new();
    if let Some(whole) = whole {
        if !is_digits(whole) {
            return None;
        }
        value += whole.parse::<f64>().ok()?;
        normalized.push_str(whole);
        normalized.push(' ');
    }
    normalized.push_str(numerator);
    normalized.push('/');
    normalized.push_str(denominator);
    Some((normalized, value))
}

impl Serialize for Length {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.definition)
    }
}

impl<'de> Deserialize<'de> for Length {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LengthVisitor;

        impl Visitor<'_> for LengthVisitor {
            type Value = Length;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a length string such as \"12pt\" or \"8.5in\"")
            }

            fn visit_str<E: de::Error>(self, value: &str) -> Result<Length, E> {
                value
                    .parse::<Length>()
                    .map_err(|err| E::custom(err.message().unwrap_or("invalid length")))
            }
        }

        deserializer.deserialize_str(LengthVisitor)
    }
}
