//! Temporal decay: per-type half-life functions plus activity-aware age
//! computation. Grounded on the same weighted-recency math the salience
//! scorer in this codebase's intelligence layer already used, generalized
//! from a single exponential curve to four selectable decay functions.

use chrono::{DateTime, Utc};

use crate::types::MemoryType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayFunction {
    Exponential,
    Linear,
    Sigmoid,
    PowerLaw,
}

#[derive(Debug, Clone, Copy)]
pub struct DecayParams {
    pub half_life_days: f64,
    pub function: DecayFunction,
    pub min_score: f32,
    pub recent_boost: f32,
}

/// Per-type decay parameters from SPEC_FULL.md §4.7. Legacy type names
/// (Solution/Pattern/Decision/Context/Identity) are resolved to one of
/// these six rows by `legacy_alias` before this table is ever consulted.
pub fn params_for(memory_type: MemoryType) -> DecayParams {
    match memory_type {
        MemoryType::Semantic => DecayParams {
            half_life_days: 365.0,
            function: DecayFunction::Linear,
            min_score: 0.80,
            recent_boost: 1.0,
        },
        MemoryType::Preference => DecayParams {
            half_life_days: 180.0,
            function: DecayFunction::Exponential,
            min_score: 0.60,
            recent_boost: 1.2,
        },
        MemoryType::Procedural => DecayParams {
            half_life_days: 90.0,
            function: DecayFunction::Exponential,
            min_score: 0.30,
            recent_boost: 1.3,
        },
        MemoryType::Episodic => DecayParams {
            half_life_days: 7.0,
            function: DecayFunction::PowerLaw,
            min_score: 0.05,
            recent_boost: 1.8,
        },
        MemoryType::Working => DecayParams {
            half_life_days: 1.0,
            function: DecayFunction::Exponential,
            min_score: 0.01,
            recent_boost: 2.0,
        },
        MemoryType::Sensory => DecayParams {
            half_life_days: 0.25,
            function: DecayFunction::Exponential,
            min_score: 0.05,
            recent_boost: 1.5,
        },
    }
}

/// `recent_window_days`: defaults to a tenth of the half-life, floored at a
/// day, so the recency boost only applies to memories that are genuinely
/// fresh relative to their own type's decay rate.
fn recent_window_days(half_life_days: f64) -> f64 {
    (half_life_days / 10.0).max(1.0)
}

fn apply_function(function: DecayFunction, t: f64, h: f64) -> f64 {
    match function {
        DecayFunction::Exponential => (-t / h).exp(),
        DecayFunction::Linear => (1.0 - t / (2.0 * h)).max(0.0),
        DecayFunction::Sigmoid => {
            let steepness = h / 4.0;
            1.0 / (1.0 + ((t - h) / steepness).exp())
        }
        DecayFunction::PowerLaw => (h / (h + t)).powi(2),
    }
}

/// Whether age was measured relative to `project_last_activity` (for
/// memories created before it) or relative to wall-clock `now`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecayMode {
    Relative,
    Absolute,
}

/// Full breakdown for the explain API required by SPEC_FULL.md §4.7.
#[derive(Debug, Clone, Copy)]
pub struct DecayExplanation {
    pub mode: DecayMode,
    pub age_days: f64,
    pub absolute_age_days: f64,
    pub score: f32,
    pub absolute_score: f32,
    pub function: DecayFunction,
}

impl DecayExplanation {
    /// How much the activity-aware mode reduced (or, if negative, boosted)
    /// the decay score relative to naive absolute-age scoring.
    pub fn reduction_vs_absolute(&self) -> f32 {
        self.absolute_score - self.score
    }
}

/// `temporal_score(memory, now, project_last_activity)` from SPEC_FULL.md
/// §4.7, with the full explain breakdown rather than just the final score.
pub fn temporal_score(
    memory_type: MemoryType,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    project_last_activity: Option<DateTime<Utc>>,
) -> DecayExplanation {
    let params = params_for(memory_type);
    let absolute_age_days = days_between(now, created_at);
    let absolute_raw = apply_function(params.function, absolute_age_days.max(0.0), params.half_life_days);
    let absolute_score = boosted(absolute_raw as f32, params, absolute_age_days);

    let (mode, age_days) = match project_last_activity {
        Some(last_activity) if created_at < last_activity => {
            (DecayMode::Relative, days_between(last_activity, created_at))
        }
        _ => (DecayMode::Absolute, absolute_age_days),
    };

    let raw = apply_function(params.function, age_days.max(0.0), params.half_life_days);
    let score = boosted(raw as f32, params, age_days);

    DecayExplanation {
        mode,
        age_days,
        absolute_age_days,
        score,
        absolute_score,
        function: params.function,
    }
}

fn boosted(raw: f32, params: DecayParams, age_days: f64) -> f32 {
    let floored = raw.max(params.min_score);
    if age_days < recent_window_days(params.half_life_days) {
        (floored * params.recent_boost).clamp(0.0, 1.0)
    } else {
        floored
    }
}

fn days_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 86_400_000.0
}
