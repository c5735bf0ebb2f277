//! Load patterns and pacing
//!
//! A [`LoadPattern`] names a shape; a [`LoadProfile`] is that shape laid out
//! over a concrete run as a sequence of [`Phase`]s. Profiles are pure: the
//! intensity at a given elapsed time depends on nothing else, so workers
//! measure elapsed time against the shared run start and ask the profile how
//! long to wait.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::RunConfig;

/// Pacing delay at intensity 1.0
pub const BASE_UNIT: Duration = Duration::from_millis(100);

/// Longest single pacing sleep; slower intervals are accumulated step by step
pub const MAX_PACING_STEP: Duration = Duration::from_secs(1);

/// Named load shape
///
/// Unknown names resolve to [`LoadPattern::Steady`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LoadPattern {
    /// Ramp up, hold, ramp down
    #[default]
    Steady,
    /// Low, burst, low
    Spike,
    /// Linear climb over the whole run
    RampUp,
    /// Half, full, then over-rate load
    Stress,
}

impl LoadPattern {
    /// Resolve a pattern name
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "spike" => LoadPattern::Spike,
            "ramp-up" | "ramp_up" | "rampup" => LoadPattern::RampUp,
            "stress" => LoadPattern::Stress,
            _ => LoadPattern::Steady,
        }
    }

    /// Canonical name
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadPattern::Steady => "steady",
            LoadPattern::Spike => "spike",
            LoadPattern::RampUp => "ramp-up",
            LoadPattern::Stress => "stress",
        }
    }

    /// Lay the pattern out over a run
    pub fn phases(&self, duration: Duration, ramp_up: Duration, ramp_down: Duration) -> Vec<Phase> {
        match self {
            LoadPattern::Steady => {
                let hold = duration.saturating_sub(ramp_up + ramp_down);
                vec![
                    Phase::ramp(ramp_up, 0.0, 1.0),
                    Phase::fixed(hold, 1.0),
                    Phase::ramp(ramp_down, 1.0, 0.0),
                ]
            }
            LoadPattern::Spike => {
                let quarter = duration / 4;
                vec![
                    Phase::fixed(quarter, 0.2),
                    Phase::fixed(quarter, 1.0),
                    Phase::fixed(duration.saturating_sub(quarter * 2), 0.2),
                ]
            }
            LoadPattern::RampUp => vec![Phase::ramp(duration, 0.0, 1.0)],
            LoadPattern::Stress => {
                let third = duration / 3;
                vec![
                    Phase::fixed(third, 0.5),
                    Phase::fixed(third, 1.0),
                    Phase::fixed(duration.saturating_sub(third * 2), 1.5),
                ]
            }
        }
    }
}

impl fmt::Display for LoadPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadPattern {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(LoadPattern::from_name(s))
    }
}

impl From<String> for LoadPattern {
    fn from(name: String) -> Self {
        LoadPattern::from_name(&name)
    }
}

impl From<LoadPattern> for String {
    fn from(pattern: LoadPattern) -> Self {
        pattern.as_str().to_string()
    }
}

/// A time-bounded segment of a load profile
///
/// Intensity moves linearly from `start_intensity` to `end_intensity`; a
/// fixed phase has both equal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Phase {
    /// Phase length
    pub duration: Duration,
    /// Intensity at the start of the phase
    pub start_intensity: f64,
    /// Intensity at the end of the phase
    pub end_intensity: f64,
}

impl Phase {
    /// Phase with a constant intensity
    pub fn fixed(duration: Duration, intensity: f64) -> Self {
        Self {
            duration,
            start_intensity: intensity,
            end_intensity: intensity,
        }
    }

    /// Phase interpolating between two intensities
    pub fn ramp(duration: Duration, from: f64, to: f64) -> Self {
        Self {
            duration,
            start_intensity: from,
            end_intensity: to,
        }
    }

    /// Intensity `offset` into the phase
    pub fn intensity_at(&self, offset: Duration) -> f64 {
        let progress = if self.duration.is_zero() {
            1.0
        } else {
            (offset.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0)
        };
        self.start_intensity + (self.end_intensity - self.start_intensity) * progress
    }
}

/// What a worker should do before its next request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pacing {
    /// Intensity is zero: send nothing this tick
    Idle,
    /// Wait this long, then send
    Wait(Duration),
    /// Past every phase: send immediately
    Immediate,
}

/// A load pattern laid out over a concrete run
#[derive(Debug, Clone, PartialEq)]
pub struct LoadProfile {
    pattern: LoadPattern,
    phases: Vec<Phase>,
}

impl LoadProfile {
    /// Build the profile for `pattern` over the given run window
    pub fn new(pattern: LoadPattern, duration: Duration, ramp_up: Duration, ramp_down: Duration) -> Self {
        Self {
            pattern,
            phases: pattern.phases(duration, ramp_up, ramp_down),
        }
    }

    /// Build the profile described by a run configuration
    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(config.pattern, config.duration, config.ramp_up, config.ramp_down)
    }

    /// The pattern this profile was built from
    pub fn pattern(&self) -> LoadPattern {
        self.pattern
    }

    /// The phase table
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Sum of all phase lengths
    pub fn total_duration(&self) -> Duration {
        self.phases.iter().map(|p| p.duration).sum()
    }

    /// Intensity at `elapsed` since run start, `None` once past every phase
    ///
    /// Phase windows are half-open except the last, which includes its end.
    pub fn intensity(&self, elapsed: Duration) -> Option<f64> {
        let last = self.phases.len().checked_sub(1)?;
        let mut start = Duration::ZERO;

        for (idx, phase) in self.phases.iter().enumerate() {
            let end = start + phase.duration;
            if elapsed < end || (idx == last && elapsed == end) {
                return Some(phase.intensity_at(elapsed.saturating_sub(start)));
            }
            start = end;
        }
        None
    }

    /// Pacing decision at `elapsed` since run start
    pub fn pacing(&self, elapsed: Duration) -> Pacing {
        match self.intensity(elapsed) {
            None => Pacing::Immediate,
            Some(intensity) if intensity <= 0.0 => Pacing::Idle,
            Some(intensity) => Pacing::Wait(delay_for(intensity)),
        }
    }
}

/// Pacing delay for a positive intensity: `BASE_UNIT / intensity`
pub fn delay_for(intensity: f64) -> Duration {
    Duration::try_from_secs_f64(BASE_UNIT.as_secs_f64() / intensity).unwrap_or(Duration::MAX)
}
