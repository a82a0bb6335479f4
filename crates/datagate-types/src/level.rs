//! Sensitivity levels
//!
//! Levels are ordinal: `Unspecified < Low < Medium < High`. The highest
//! level matched on a change selects the gating approval flow.

use serde::{Deserialize, Serialize};

/// Sensitivity classification attached to rules and flows
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityLevel {
    /// No sensitivity detected (never a valid level for a rule or flow)
    #[default]
    Unspecified,
    Low,
    Medium,
    High,
}

impl SensitivityLevel {
    /// Levels a flow selector may walk down through, strongest first
    pub const ORDERED_DESC: [SensitivityLevel; 3] = [Self::High, Self::Medium, Self::Low];

    /// Check whether this is a concrete level usable on a rule or flow
    pub fn is_specified(&self) -> bool {
        !matches!(self, Self::Unspecified)
    }

    /// Stable lower-case label, used in storage columns and messages
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for SensitivityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_ordering_is_ordinal() {
        assert!(SensitivityLevel::Unspecified < SensitivityLevel::Low);
        assert!(SensitivityLevel::Low < SensitivityLevel::Medium);
        assert!(SensitivityLevel::Medium < SensitivityLevel::High);
    }

    #[test]
    fn walk_down_order_is_strongest_first() {
        assert_eq!(
            SensitivityLevel::ORDERED_DESC,
            [
                SensitivityLevel::High,
                SensitivityLevel::Medium,
                SensitivityLevel::Low
            ]
        );
    }
}
