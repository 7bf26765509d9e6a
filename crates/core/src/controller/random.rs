use noise::{NoiseFn, Perlin};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::{save_fields, Controller, ControllerInput};
use crate::Host;

fn one() -> f32 {
    1.0
}

/// How a [`RandomController`] produces its values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum NoiseSettings {
    /// Fresh uniform sample in `[min, max]` every tick.
    Uniform { min: f32, max: f32 },
    /// Perlin noise over effect time: `minimum + scale * noise(t * speed)`.
    Perlin {
        #[serde(default = "one")]
        scale: f32,
        #[serde(default = "one")]
        speed: f32,
        #[serde(default)]
        minimum: f32,
    },
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self::Uniform { min: 0.0, max: 1.0 }
    }
}

/// Randomness source for modifier jitter and flicker effects.
///
/// A declared seed makes the sequence reproducible across reloads; without
/// one the seed is drawn once when the controller is bound.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RandomController {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub noise: NoiseSettings,
    #[serde(skip)]
    state: Option<NoiseState>,
}

#[derive(Debug)]
struct NoiseState {
    rng: StdRng,
    perlin: Perlin,
}

impl NoiseState {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            perlin: Perlin::new((seed ^ (seed >> 32)) as u32),
        }
    }

    /// Perlin noise along the time axis, mapped to `[0, 1]`.
    fn smooth(&self, x: f32) -> f32 {
        if !x.is_finite() {
            return 0.5;
        }
        let n = self.perlin.get([f64::from(x), 0.0]) as f32;
        (n * 0.5 + 0.5).clamp(0.0, 1.0)
    }
}

impl RandomController {
    pub fn new(seed: Option<u64>, noise: NoiseSettings) -> Self {
        Self {
            seed,
            noise,
            state: None,
        }
    }

    fn state(&mut self) -> &mut NoiseState {
        let seed = self.seed;
        self.state
            .get_or_insert_with(|| NoiseState::new(seed.unwrap_or_else(rand::random)))
    }
}

impl Controller for RandomController {
    fn bind(&mut self, _host: &dyn Host) {
        if let NoiseSettings::Uniform { min, max } = self.noise {
            if !min.is_finite() || !max.is_finite() {
                warn!(min, max, "non-finite random range, falling back to zero");
                self.noise = NoiseSettings::Uniform { min: 0.0, max: 0.0 };
            }
        }
        self.state();
    }

    fn update(&mut self, input: &ControllerInput<'_>, out: &mut Vec<f32>) {
        let noise = self.noise;
        let state = self.state();
        let value = match noise {
            NoiseSettings::Uniform { min, max } => {
                let (low, high) = if min <= max { (min, max) } else { (max, min) };
                if low.is_finite() && high.is_finite() {
                    state.rng.gen_range(low..=high)
                } else {
                    0.0
                }
            }
            NoiseSettings::Perlin {
                scale,
                speed,
                minimum,
            } => minimum + scale * state.smooth(input.time * speed),
        };
        out.push(value);
    }

    fn save(&self) -> Map<String, Value> {
        save_fields(self)
    }
}
