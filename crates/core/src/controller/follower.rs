//! Rate-limited followers of host signals.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{save_fields, Controller, ControllerInput};

const DEFAULT_RESPONSE_RATE: f32 = 100.0;

fn default_rate() -> f32 {
    DEFAULT_RESPONSE_RATE
}

/// Asymmetric per-second rates used to move toward a target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResponseRates {
    #[serde(default = "default_rate")]
    pub response_rate_up: f32,
    #[serde(default = "default_rate")]
    pub response_rate_down: f32,
}

impl Default for ResponseRates {
    fn default() -> Self {
        Self {
            response_rate_up: DEFAULT_RESPONSE_RATE,
            response_rate_down: DEFAULT_RESPONSE_RATE,
        }
    }
}

impl ResponseRates {
    pub fn new(up: f32, down: f32) -> Self {
        Self {
            response_rate_up: up,
            response_rate_down: down,
        }
    }

    /// Moves `current` toward `target` by at most `rate * dt`, never past it.
    /// A non-positive rate snaps straight to the target.
    pub fn approach(&self, current: f32, target: f32, dt: f32) -> f32 {
        if target > current {
            if self.response_rate_up <= 0.0 {
                target
            } else {
                (current + self.response_rate_up * dt).min(target)
            }
        } else if self.response_rate_down <= 0.0 {
            target
        } else {
            (current - self.response_rate_down * dt).max(target)
        }
    }
}

/// Follows the host throttle.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ThrottleController {
    #[serde(flatten)]
    pub rates: ResponseRates,
    #[serde(skip)]
    current: f32,
}

impl Controller for ThrottleController {
    fn update(&mut self, input: &ControllerInput<'_>, out: &mut Vec<f32>) {
        self.current = self
            .rates
            .approach(self.current, input.host.throttle(), input.dt);
        out.push(self.current);
    }

    fn save(&self) -> Map<String, Value> {
        save_fields(self)
    }
}

/// Ramps between 0 and 1 following the engine's operational flag.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EngineOnController {
    #[serde(flatten)]
    pub rates: ResponseRates,
    #[serde(skip)]
    current: f32,
}

impl Controller for EngineOnController {
    fn update(&mut self, input: &ControllerInput<'_>, out: &mut Vec<f32>) {
        let target = if input.host.engine_on() { 1.0 } else { 0.0 };
        self.current = self.rates.approach(self.current, target, input.dt);
        out.push(self.current);
    }

    fn save(&self) -> Map<String, Value> {
        save_fields(self)
    }
}

/// Follows per-thruster thrust fractions, one output per thruster.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ThrustController {
    #[serde(flatten)]
    pub rates: ResponseRates,
    #[serde(skip)]
    current: Vec<f32>,
}

impl Controller for ThrustController {
    fn update(&mut self, input: &ControllerInput<'_>, out: &mut Vec<f32>) {
        let targets = input.host.thrust_fractions();
        // Thrusters added at runtime start from rest.
        self.current.resize(targets.len(), 0.0);
        for (current, target) in self.current.iter_mut().zip(targets) {
            *current = self.rates.approach(*current, *target, input.dt);
        }
        out.extend_from_slice(&self.current);
    }

    fn save(&self) -> Map<String, Value> {
        save_fields(self)
    }
}
