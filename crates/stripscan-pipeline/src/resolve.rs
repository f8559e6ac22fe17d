//! Color to pH lookup.

use serde::Serialize;

use crate::types::ColorClass;

/// Message for an unknown pH.
pub const UNKNOWN_MESSAGE: &str = "no specific finding.";

/// The compiled-in color → (pH, message) table, in ascending pH.
pub const PH_TABLE: [(ColorClass, f64, &str); 6] = [
    (
        ColorClass::Red,
        2.0,
        "Low pH (Acidic) — possible respiratory acidosis",
    ),
    (
        ColorClass::Magenta,
        3.0,
        "Acidic — possible respiratory distress",
    ),
    (
        ColorClass::Purple,
        6.0,
        "Slightly acidic — possible metabolic issue",
    ),
    (ColorClass::Blue, 8.0, "Neutral — generally normal"),
    (
        ColorClass::Green,
        9.0,
        "Alkaline — possible metabolic alkalosis",
    ),
    (
        ColorClass::Yellow,
        12.0,
        "Strongly alkaline — possible serious imbalance",
    ),
];

/// A resolved pH reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Resolution {
    /// pH value, or `None` when unknown.
    pub ph: Option<f64>,
    /// Finding for the pH.
    pub message: &'static str,
}

/// Look up the pH and message for a dominant color.
///
/// `None`, and any class missing from [`PH_TABLE`], resolves to an
/// unknown pH with [`UNKNOWN_MESSAGE`].
#[must_use]
pub fn resolve(color: Option<ColorClass>) -> Resolution {
    color
        .and_then(|color| PH_TABLE.iter().find(|(c, _, _)| *c == color))
        .map_or(
            Resolution {
                ph: None,
                message: UNKNOWN_MESSAGE,
            },
            |&(_, ph, message)| Resolution {
                ph: Some(ph),
                message,
            },
        )
}
