//! Strategy configuration: which family runs, with which parameters.
//!
//! Configs load from TOML with a `type` tag, for example:
//!
//! ```toml
//! type = "RECOVERY"
//! jump = 0.25
//! [feature]
//! window = 60
//! ```
//!
//! Fields left out take the family defaults. A config's fingerprint is the
//! BLAKE3 hash of its canonical JSON and labels every table it produces.

use serde::{Deserialize, Serialize};

use crate::domain::ConfigHash;
use crate::strategy::{
    CollectiveRecoveryParams, FollowingParams, MomentumParams, RecoveryParams,
    SimpleReversalParams,
};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse strategy config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unknown preset: {0}")]
    UnknownPreset(String),
    #[error("invalid parameter `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyConfig {
    Recovery(RecoveryParams),
    Following(FollowingParams),
    SimpleReversal(SimpleReversalParams),
    CollectiveRecovery(CollectiveRecoveryParams),
    Momentum(MomentumParams),
}

/// Names accepted by [`StrategyConfig::preset`].
pub const PRESETS: &[&str] = &[
    "recovery",
    "recovery_long_term",
    "following",
    "simple_reversal",
    "collective_recovery",
    "collective_recovery_small",
    "momentum",
];

impl StrategyConfig {
    pub fn preset(name: &str) -> Result<Self, ConfigError> {
        let config = match name {
            "recovery" => Self::Recovery(RecoveryParams::default_params()),
            "recovery_long_term" => Self::Recovery(RecoveryParams::long_term()),
            "following" => Self::Following(FollowingParams::default_params()),
            "simple_reversal" => Self::SimpleReversal(SimpleReversalParams::default_params()),
            "collective_recovery" => {
                Self::CollectiveRecovery(CollectiveRecoveryParams::default_params())
            }
            "collective_recovery_small" => {
                Self::CollectiveRecovery(CollectiveRecoveryParams::small_moves())
            }
            "momentum" => Self::Momentum(MomentumParams::default_params()),
            other => return Err(ConfigError::UnknownPreset(other.to_string())),
        };
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn family(&self) -> &'static str {
        match self {
            Self::Recovery(_) => "recovery",
            Self::Following(_) => "following",
            Self::SimpleReversal(_) => "simple_reversal",
            Self::CollectiveRecovery(_) => "collective_recovery",
            Self::Momentum(_) => "momentum",
        }
    }

    /// Check the values the policy constructors would otherwise reject.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let window = match self {
            Self::Recovery(p) => {
                if !p.exit.is_finite() {
                    return Err(invalid("exit", "must be finite"));
                }
                p.feature.window
            }
            Self::Following(p) => {
                positive("max_distance", p.max_distance)?;
                p.feature.window
            }
            Self::SimpleReversal(p) => {
                if p.max_hold_seconds <= 0 {
                    return Err(invalid("max_hold_seconds", "must be positive"));
                }
                p.feature.window
            }
            Self::CollectiveRecovery(p) => {
                positive("collective_window", p.collective_window)?;
                if p.drop.is_none() && p.jump.is_none() {
                    return Err(invalid("drop", "at least one of drop/jump must be set"));
                }
                p.feature.window
            }
            Self::Momentum(p) => {
                positive("ema_window", p.feature.ema_window)?;
                positive("selection_size", p.selection_size)?;
                if p.rebalance_minutes <= 0 {
                    return Err(invalid("rebalance_minutes", "must be positive"));
                }
                p.feature.window
            }
        };
        positive("window", window)
    }

    pub fn fingerprint(&self) -> ConfigHash {
        // Struct fields serialize in declaration order, so the JSON is canonical.
        let json = serde_json::to_string(self).unwrap_or_default();
        ConfigHash::from_bytes(json.as_bytes())
    }

    /// Human-readable storage label: family plus a short fingerprint.
    pub fn label(&self) -> String {
        format!("{}-{}", self.family(), self.fingerprint().short(12))
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

fn positive(field: &'static str, value: usize) -> Result<(), ConfigError> {
    if value == 0 {
        Err(invalid(field, "must be > 0"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_validates() {
        for name in PRESETS {
            let config = StrategyConfig::preset(name).unwrap();
            config.validate().unwrap();
        }
        assert!(matches!(
            StrategyConfig::preset("nope"),
            Err(ConfigError::UnknownPreset(_))
        ));
    }

    #[test]
    fn toml_fills_defaults() {
        let config = StrategyConfig::from_toml(
            r#"
type = "RECOVERY"
jump = 0.25
[feature]
window = 60
"#,
        )
        .unwrap();
        let StrategyConfig::Recovery(p) = config else {
            panic!("expected recovery");
        };
        assert_eq!(p.jump, 0.25);
        assert_eq!(p.feature.window, 60);
        assert_eq!(p.drop_from_jump, -0.04);
        assert!(!p.long_term);
    }

    #[test]
    fn toml_collective_side_overrides() {
        let config = StrategyConfig::from_toml(
            r#"
type = "COLLECTIVE_RECOVERY"
collective_window = 10
[drop]
collective_threshold = -0.05
collective_bound = -0.30
threshold = -0.10
rebound = 0.02
exit = -0.01
"#,
        )
        .unwrap();
        let StrategyConfig::CollectiveRecovery(p) = config else {
            panic!("expected collective recovery");
        };
        assert_eq!(p.collective_window, 10);
        assert_eq!(p.drop.unwrap().threshold, -0.10);
        // unspecified optional side falls back to the default preset
        assert!(p.jump.is_some());
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = StrategyConfig::from_toml(
            r#"
type = "MOMENTUM"
selection_size = 0
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "selection_size",
                ..
            }
        ));
        assert!(matches!(
            StrategyConfig::from_toml("type = \"NOPE\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn non_finite_exit_is_rejected() {
        for exit in ["nan", "inf", "-inf"] {
            let err = StrategyConfig::from_toml(&format!("type = \"RECOVERY\"\nexit = {exit}\n"))
                .unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { field: "exit", .. }),
                "exit = {exit}"
            );
        }
    }

    #[test]
    fn fingerprint_tracks_parameters() {
        let a = StrategyConfig::preset("recovery").unwrap();
        let b = StrategyConfig::preset("recovery").unwrap();
        let c = StrategyConfig::preset("recovery_long_term").unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert!(a.label().starts_with("recovery-"));
        assert_eq!(a.label().len(), "recovery-".len() + 12);
    }
}
