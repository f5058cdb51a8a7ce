//! Volume mapping
//!
//! The front end works on a 0..100 scale. Internally the level becomes a
//! base-2 gain exponent: `gain = (level - 100) / 20`, so 100 is unity and 0
//! is -5 (1/32 amplitude).

pub const MIN_LEVEL: f64 = 0.0;
pub const MAX_LEVEL: f64 = 100.0;

/// Clamp a requested level into 0..100
pub fn clamp_level(level: f64) -> f64 {
    if level.is_nan() {
        return MAX_LEVEL;
    }
    level.clamp(MIN_LEVEL, MAX_LEVEL)
}

/// Map a 0..100 level to its gain exponent
pub fn level_to_gain(level: f64) -> f64 {
    (level - MAX_LEVEL) / 20.0
}

/// Linear amplitude multiplier for a gain exponent
pub fn gain_to_amplitude(gain: f64) -> f32 {
    2f64.powf(gain) as f32
}
