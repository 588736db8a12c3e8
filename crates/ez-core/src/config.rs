//! Region expansion parameters.
//!
//! Configuration is always passed explicitly into the engine; nothing here is global.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

/// Upper bound for any configured duration (~100 years).
///
/// Keeps calendar arithmetic on buffer bounds far away from chrono's date limits.
pub const MAX_DURATION_DAYS: i64 = 100 * 366;

/// Day counts as they appear in configuration files.
///
/// Defaults follow the admission-exclusion pipeline: 14-day buffers on each side,
/// no padding, and stays must last longer than 2 days to qualify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionSettings {
    pub buffer_before_days: i64,
    pub buffer_after_days: i64,
    pub padding_before_days: i64,
    pub padding_after_days: i64,
    pub minimum_stay_days: i64,
}

impl Default for RegionSettings {
    fn default() -> Self {
        Self {
            buffer_before_days: 14,
            buffer_after_days: 14,
            padding_before_days: 0,
            padding_after_days: 0,
            minimum_stay_days: 2,
        }
    }
}

impl RegionSettings {
    /// Validates the day counts into a [`RegionConfig`].
    pub fn validate(&self) -> Result<RegionConfig, ValidationError> {
        Ok(RegionConfig {
            buffers: BufferSpec {
                buffer_before: days("buffer_before_days", self.buffer_before_days)?,
                buffer_after: days("buffer_after_days", self.buffer_after_days)?,
                padding_before: days("padding_before_days", self.padding_before_days)?,
                padding_after: days("padding_after_days", self.padding_after_days)?,
            },
            minimum_stay: days("minimum_stay_days", self.minimum_stay_days)?,
        })
    }
}

fn days(field: &'static str, value: i64) -> Result<TimeDelta, ValidationError> {
    if value < 0 {
        return Err(ValidationError::NegativeDuration { field, days: value });
    }
    if value > MAX_DURATION_DAYS {
        return Err(ValidationError::DurationTooLarge {
            field,
            days: value,
            max: MAX_DURATION_DAYS,
        });
    }
    Ok(TimeDelta::days(value))
}

/// Buffer and padding widths around a qualifying admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSpec {
    pub buffer_before: TimeDelta,
    pub buffer_after: TimeDelta,
    /// Gap between the end of the buffer-before window and admission.
    pub padding_before: TimeDelta,
    /// Gap between discharge and the start of the buffer-after window.
    pub padding_after: TimeDelta,
}

/// Validated engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionConfig {
    pub buffers: BufferSpec,
    /// Stays must last strictly longer than this to be expanded.
    pub minimum_stay: TimeDelta,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            buffers: BufferSpec {
                buffer_before: TimeDelta::days(14),
                buffer_after: TimeDelta::days(14),
                padding_before: TimeDelta::zero(),
                padding_after: TimeDelta::zero(),
            },
            minimum_stay: TimeDelta::days(2),
        }
    }
}
