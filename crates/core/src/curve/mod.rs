//! Keyframed float curves used to map driver values onto attribute deltas.

use serde::{Deserialize, Serialize};

/// Interpolation mode between two neighbouring keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interp {
    #[default]
    Linear,
    /// Cubic Hermite segment using the keys' tangents.
    Smooth,
    /// Hold the left key's value until the next key.
    Step,
}

/// Single keyframe in a [`FloatCurve`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurveKey {
    pub time: f32,
    pub value: f32,
    #[serde(default)]
    pub in_tangent: f32,
    #[serde(default)]
    pub out_tangent: f32,
}

impl CurveKey {
    pub fn new(time: f32, value: f32) -> Self {
        Self {
            time,
            value,
            in_tangent: 0.0,
            out_tangent: 0.0,
        }
    }

    pub fn with_tangents(time: f32, value: f32, in_tangent: f32, out_tangent: f32) -> Self {
        Self {
            time,
            value,
            in_tangent,
            out_tangent,
        }
    }
}

/// A keyframed curve `f(x) -> y`.
///
/// Inputs outside the key range are clamped to the first or last key, and an
/// empty curve evaluates to zero everywhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FloatCurve {
    pub keys: Vec<CurveKey>,
    #[serde(default)]
    pub interp: Interp,
}

impl FloatCurve {
    pub fn new(keys: Vec<CurveKey>, interp: Interp) -> Self {
        Self { keys, interp }
    }

    /// Curve that returns `value` for every input.
    pub fn constant(value: f32) -> Self {
        Self::new(vec![CurveKey::new(0.0, value)], Interp::Linear)
    }

    /// Linear ramp through the given `(time, value)` pairs.
    pub fn linear(points: &[(f32, f32)]) -> Self {
        Self::new(
            points.iter().map(|&(t, v)| CurveKey::new(t, v)).collect(),
            Interp::Linear,
        )
    }

    /// Identity over `[0, 1]`, clamped outside it.
    pub fn unit() -> Self {
        Self::linear(&[(0.0, 0.0), (1.0, 1.0)])
    }

    /// Returns a copy with keys ordered by time, ready for evaluation.
    pub fn sorted(&self) -> Self {
        let mut keys = self.keys.clone();
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self {
            keys,
            interp: self.interp,
        }
    }

    /// Evaluates the curve. Keys must be sorted by time (see [`Self::sorted`]).
    pub fn evaluate(&self, x: f32) -> f32 {
        let (first, last) = match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return 0.0,
        };

        if x.is_nan() || x <= first.time {
            return first.value;
        }
        if x >= last.time {
            return last.value;
        }

        // First key strictly after `x`; guaranteed to be in 1..len here.
        let upper = self.keys.partition_point(|key| key.time <= x);
        let a = &self.keys[upper - 1];
        let b = &self.keys[upper];
        let span = b.time - a.time;
        if span <= f32::EPSILON {
            return a.value;
        }
        let t = (x - a.time) / span;

        match self.interp {
            Interp::Linear => a.value + (b.value - a.value) * t,
            Interp::Step => a.value,
            Interp::Smooth => hermite(a, b, span, t),
        }
    }
}

fn hermite(a: &CurveKey, b: &CurveKey, span: f32, t: f32) -> f32 {
    let t2 = t * t;
    let t3 = t2 * t;
    let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
    let h10 = t3 - 2.0 * t2 + t;
    let h01 = -2.0 * t3 + 3.0 * t2;
    let h11 = t3 - t2;
    h00 * a.value + h10 * span * a.out_tangent + h01 * b.value + h11 * span * b.in_tangent
}
