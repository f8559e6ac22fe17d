//! Health risk level derived from a pH reading.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Coarse risk band for a pH reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    /// pH in the normal range.
    Healthy,
    /// pH mildly outside the normal range.
    #[serde(rename = "Slight Risk")]
    SlightRisk,
    /// pH far outside the normal range.
    Abnormal,
    /// No pH, or a pH no rule covers.
    Unknown,
}

impl RiskLevel {
    /// Classify a pH reading.
    ///
    /// Rules are checked in order, first match wins:
    ///
    /// | pH | level |
    /// |---|---|
    /// | unknown | `Unknown` |
    /// | ≤ 6.5 or > 8.3 | `Abnormal` |
    /// | 7.0 < pH ≤ 7.6 | `Healthy` |
    /// | 6.5 < pH ≤ 7.7 | `SlightRisk` |
    /// | otherwise | `Unknown` |
    ///
    /// The gap `7.7 < pH ≤ 8.3` is unclassified, so a blue
    /// strip (pH 8.0) reports `Unknown`.
    #[must_use]
    pub fn from_ph(ph: Option<f64>) -> Self {
        let Some(ph) = ph else {
            return Self::Unknown;
        };
        if ph <= 6.5 || ph > 8.3 {
            Self::Abnormal
        } else if ph > 7.0 && ph <= 7.6 {
            Self::Healthy
        } else if ph > 6.5 && ph <= 7.7 {
            Self::SlightRisk
        } else {
            Self::Unknown
        }
    }

    /// Advice shown alongside the level. Empty for [`RiskLevel::Unknown`].
    #[must_use]
    pub const fn advice(self) -> &'static str {
        match self {
            Self::Abnormal => {
                "High Risk (Abnormal pH): Seek medical attention and avoid further exposure."
            }
            Self::Healthy => "Low Risk (Normal pH): No immediate action is needed.",
            Self::SlightRisk => {
                "Medium Risk (Mild): Monitor exposure and consider medical check-ups."
            }
            Self::Unknown => "",
        }
    }

    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::SlightRisk => "Slight Risk",
            Self::Abnormal => "Abnormal",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
