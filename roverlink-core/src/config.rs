//! Navigation and radio configuration.
//!
//! Both configurations travel to and from the remote store as loosely typed
//! JSON. [`NavConfig::decode`] and [`SdrConfig::decode`] are the single place
//! where that JSON becomes a typed value: every field that is missing or has
//! the wrong type takes its default, so decoding never fails.
//!
//! Edits arrive as partial patches ([`NavPatch`], [`SdrPatch`]) that are merged
//! field by field into a fresh value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Field helpers
// =============================================================================

fn as_object(raw: Option<&Value>) -> Option<&Map<String, Value>> {
    raw.and_then(Value::as_object)
}

fn finite(obj: Option<&Map<String, Value>>, key: &str) -> Option<f64> {
    obj?.get(key)?.as_f64().filter(|v| v.is_finite())
}

fn string(obj: Option<&Map<String, Value>>, key: &str) -> Option<String> {
    obj?.get(key)?.as_str().map(str::to_owned)
}

// =============================================================================
// Navigation
// =============================================================================

/// Navigation tuning sent to the rover's path follower
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavConfig {
    pub base_speed: f64,
    pub turn_speed: f64,
    /// Distance at which a waypoint counts as reached
    pub position_epsilon: f64,
    /// Heading error (degrees) tolerated before turning in place
    pub heading_tolerance: f64,
}

impl Default for NavConfig {
    fn default() -> Self {
        NavConfig {
            base_speed: 0.6,
            turn_speed: 1.0,
            position_epsilon: 2.0,
            heading_tolerance: 20.0,
        }
    }
}

impl NavConfig {
    /// Build a complete configuration from a possibly partial or malformed
    /// stored value.
    pub fn decode(raw: Option<&Value>) -> Self {
        let obj = as_object(raw);
        let default = NavConfig::default();

        NavConfig {
            base_speed: finite(obj, "baseSpeed").unwrap_or(default.base_speed),
            turn_speed: finite(obj, "turnSpeed").unwrap_or(default.turn_speed),
            position_epsilon: finite(obj, "positionEpsilon").unwrap_or(default.position_epsilon),
            heading_tolerance: finite(obj, "headingTolerance")
                .unwrap_or(default.heading_tolerance),
        }
    }

    pub fn apply(&self, patch: &NavPatch) -> Self {
        NavConfig {
            base_speed: patch.base_speed.unwrap_or(self.base_speed),
            turn_speed: patch.turn_speed.unwrap_or(self.turn_speed),
            position_epsilon: patch.position_epsilon.unwrap_or(self.position_epsilon),
            heading_tolerance: patch.heading_tolerance.unwrap_or(self.heading_tolerance),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "baseSpeed": self.base_speed,
            "turnSpeed": self.turn_speed,
            "positionEpsilon": self.position_epsilon,
            "headingTolerance": self.heading_tolerance,
        })
    }
}

/// Partial navigation update; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_epsilon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_tolerance: Option<f64>,
}

// =============================================================================
// Software defined radio
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GainMode {
    #[default]
    Auto,
    Manual,
}

impl GainMode {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(GainMode::Auto),
            "manual" => Some(GainMode::Manual),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Rx,
    Tx,
}

impl Direction {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "rx" => Some(Direction::Rx),
            "tx" => Some(Direction::Tx),
            _ => None,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Rx => write!(f, "rx"),
            Direction::Tx => write!(f, "tx"),
        }
    }
}

/// Radio settings for the rover's SDR front end
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdrConfig {
    /// Centre frequency in MHz
    pub frequency: f64,
    /// Bandwidth in MHz
    pub bandwidth: f64,
    /// Sample rate in MS/s
    pub sample_rate: f64,
    pub gain_mode: GainMode,
    /// Gain in dB, only used in manual mode
    pub gain_value: f64,
    pub direction: Direction,
    pub channel: String,
}

impl Default for SdrConfig {
    fn default() -> Self {
        SdrConfig {
            frequency: 2400.0,
            bandwidth: 5.0,
            sample_rate: 5.0,
            gain_mode: GainMode::Auto,
            gain_value: 40.0,
            direction: Direction::Rx,
            channel: "A".to_string(),
        }
    }
}

impl SdrConfig {
    /// Build a complete configuration from a possibly partial or malformed
    /// stored value.
    pub fn decode(raw: Option<&Value>) -> Self {
        let obj = as_object(raw);
        let default = SdrConfig::default();

        SdrConfig {
            frequency: finite(obj, "frequency").unwrap_or(default.frequency),
            bandwidth: finite(obj, "bandwidth").unwrap_or(default.bandwidth),
            sample_rate: finite(obj, "sampleRate").unwrap_or(default.sample_rate),
            gain_mode: string(obj, "gainMode")
                .and_then(|s| GainMode::parse(&s))
                .unwrap_or(default.gain_mode),
            gain_value: finite(obj, "gainValue").unwrap_or(default.gain_value),
            direction: string(obj, "direction")
                .and_then(|s| Direction::parse(&s))
                .unwrap_or(default.direction),
            channel: string(obj, "channel").unwrap_or(default.channel),
        }
    }

    pub fn apply(&self, patch: &SdrPatch) -> Self {
        SdrConfig {
            frequency: patch.frequency.unwrap_or(self.frequency),
            bandwidth: patch.bandwidth.unwrap_or(self.bandwidth),
            sample_rate: patch.sample_rate.unwrap_or(self.sample_rate),
            gain_mode: patch.gain_mode.unwrap_or(self.gain_mode),
            gain_value: patch.gain_value.unwrap_or(self.gain_value),
            direction: patch.direction.unwrap_or(self.direction),
            channel: patch.channel.clone().unwrap_or_else(|| self.channel.clone()),
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Partial radio update; absent fields keep their current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdrPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain_mode: Option<GainMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

// =============================================================================
// Tests
// =============================================================================
