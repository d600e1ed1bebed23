//! Small per-frame quantities derived from the host's ambient state.

/// Default per-frame smoothing factor for wind speed.
pub const DEFAULT_WIND_SMOOTHING: f32 = 0.001;

/// Eye depth below the water surface at which the player counts as submerged.
pub const SUBMERGED_EYE_DEPTH: f32 = 0.1;

/// Exponential moving average of the host's wind speed.
///
/// Each [`WindSmoother::update`] moves the current value `k` of the way
/// toward the target: `current += (target - current) * k`. Targets are taken
/// as the host reports them, storm winds above 1 included; the value never
/// overshoots a constant target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindSmoother {
    factor: f32,
    current: f32,
}

impl Default for WindSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_WIND_SMOOTHING)
    }
}

impl WindSmoother {
    /// `factor` is clamped to `[0, 1]`; 0 freezes the value, 1 follows the
    /// target immediately.
    pub fn new(factor: f32) -> Self {
        Self {
            factor: factor.clamp(0.0, 1.0),
            current: 0.0,
        }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    /// Advances one frame toward `target` and returns the new value.
    pub fn update(&mut self, target: f32) -> f32 {
        let target = if target.is_finite() { target } else { self.current };
        self.current += (target - self.current) * self.factor;
        self.current
    }
}

/// Daylight factor for reflections: `1.25 * max(day - moon / 2, 0.05)`.
pub fn day_light(day_light_strength: f32, moon_light_strength: f32) -> f32 {
    1.25 * (day_light_strength - moon_light_strength / 2.0).max(0.05)
}

/// Value of the `playerUnderwater` uniform: 0 once the eyes are submerged,
/// 1 otherwise. The geometry shader multiplies surface effects by it.
pub fn player_underwater(eyes_in_water_depth: f32) -> f32 {
    if eyes_in_water_depth >= SUBMERGED_EYE_DEPTH {
        0.0
    } else {
        1.0
    }
}
