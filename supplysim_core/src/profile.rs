//! Baseline process profile used to seed a session.

use crate::model::{
    ETA_DAYS_MAX, ETA_DAYS_MIN, INVENTORY_MAX_USD, INVENTORY_MIN_USD, LOGISTICS_ETA_MAX,
    LOGISTICS_ETA_MIN, MAX_DEMAND_TOTAL, MAX_OPEN_POS, MAX_SHIPMENTS, MIN_DEMAND_TOTAL,
    MIN_OPEN_POS, ON_TIME_MAX, ON_TIME_TICK_MIN, TURNS_MAX, TURNS_MIN,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use supplysim_env::SimError;

/// Immutable starting point for a session.
///
/// When a profile is supplied its values are used as-is; without one the
/// engine jitters [`ProcessProfile::default`] with the session's generator.
/// The profile is carried on the snapshot but never read after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessProfile {
    /// Units of forecast demand
    pub demand_total: u64,

    /// Fraction of demand already committed
    pub committed_ratio: f64,

    #[serde(rename = "openPOs")]
    pub open_pos: u32,

    #[serde(rename = "latePOs")]
    pub late_pos: u32,

    /// Mean supplier lead time (days)
    pub eta_days_mean: f64,

    /// Reference lead time the status resolver compares against (days)
    pub target_eta_days: f64,

    pub on_time_pct: f64,

    /// Mean carrier transit time (days)
    #[serde(rename = "avgETA_Days")]
    pub avg_eta_days: f64,

    #[serde(rename = "inventoryValueUSD")]
    pub inventory_value_usd: f64,

    pub turns: f64,

    /// Number of shipments on the corridor
    pub shipment_count: usize,
}

impl Default for ProcessProfile {
    fn default() -> Self {
        Self {
            demand_total: 1_200,
            committed_ratio: 0.88,
            open_pos: 22,
            late_pos: 1,
            eta_days_mean: 7.2,
            target_eta_days: 7.0,
            on_time_pct: 0.9,
            avg_eta_days: 8.4,
            inventory_value_usd: 1_250_000.0,
            turns: 5.4,
            shipment_count: 8,
        }
    }
}

impl ProcessProfile {
    /// Checks every field against the bounds the engine maintains.
    pub fn validate(&self) -> Result<(), SimError> {
        if !(MIN_DEMAND_TOTAL..=MAX_DEMAND_TOTAL).contains(&self.demand_total) {
            return Err(SimError::profile(format!(
                "demandTotal {} outside [{}, {}]",
                self.demand_total, MIN_DEMAND_TOTAL, MAX_DEMAND_TOTAL
            )));
        }
        check_range("committedRatio", self.committed_ratio, 0.0, 1.0)?;
        if !(MIN_OPEN_POS..=MAX_OPEN_POS).contains(&self.open_pos) {
            return Err(SimError::profile(format!(
                "openPOs {} outside [{}, {}]",
                self.open_pos, MIN_OPEN_POS, MAX_OPEN_POS
            )));
        }
        if self.late_pos > self.open_pos {
            return Err(SimError::profile(format!(
                "latePOs {} exceeds openPOs {}",
                self.late_pos, self.open_pos
            )));
        }
        check_range("etaDaysMean", self.eta_days_mean, ETA_DAYS_MIN, ETA_DAYS_MAX)?;
        check_range("targetEtaDays", self.target_eta_days, ETA_DAYS_MIN, ETA_DAYS_MAX)?;
        check_range("onTimePct", self.on_time_pct, ON_TIME_TICK_MIN, ON_TIME_MAX)?;
        check_range("avgETA_Days", self.avg_eta_days, LOGISTICS_ETA_MIN, LOGISTICS_ETA_MAX)?;
        check_range(
            "inventoryValueUSD",
            self.inventory_value_usd,
            INVENTORY_MIN_USD,
            INVENTORY_MAX_USD,
        )?;
        check_range("turns", self.turns, TURNS_MIN, TURNS_MAX)?;
        if self.shipment_count > MAX_SHIPMENTS {
            return Err(SimError::profile(format!(
                "shipmentCount {} exceeds {}",
                self.shipment_count, MAX_SHIPMENTS
            )));
        }
        Ok(())
    }

    /// Parses and validates a profile from JSON. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SimError> {
        let profile: Self =
            serde_json::from_str(json).map_err(|e| SimError::profile(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    /// Reads a profile from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| SimError::profile(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&json)
    }
}

fn check_range(field: &str, value: f64, lo: f64, hi: f64) -> Result<(), SimError> {
    if value.is_finite() && (lo..=hi).contains(&value) {
        Ok(())
    } else {
        Err(SimError::profile(format!(
            "{} {} outside [{}, {}]",
            field, value, lo, hi
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_profile_is_valid() {
        assert!(ProcessProfile::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let profile = ProcessProfile::from_json_str(r#"{ "demandTotal": 2000, "openPOs": 30 }"#)
            .unwrap();

        assert_eq!(profile.demand_total, 2000);
        assert_eq!(profile.open_pos, 30);
        assert_eq!(profile.turns, ProcessProfile::default().turns);
    }

    #[test]
    fn test_invalid_profile_rejected() {
        let err = ProcessProfile::from_json_str(r#"{ "openPOs": 4, "latePOs": 9 }"#).unwrap_err();
        assert!(matches!(err, SimError::Profile(_)));

        let profile = ProcessProfile {
            committed_ratio: f64::NAN,
            ..Default::default()
        };
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_malformed_json_rejected() {
        assert!(ProcessProfile::from_json_str("{ not json").is_err());
    }
}
