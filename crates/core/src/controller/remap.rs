use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::{save_fields, Controller, ControllerInput, Siblings};
use crate::FloatCurve;

/// Passes another controller's output element-wise through a curve.
///
/// The source is resolved in the second init phase. Until (and unless) that
/// succeeds the controller outputs a single zero.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RemapController {
    pub source: String,
    #[serde(default)]
    pub curve: FloatCurve,
    #[serde(skip)]
    sorted: FloatCurve,
    #[serde(skip)]
    resolved: bool,
}

impl RemapController {
    pub fn new(source: impl Into<String>, curve: FloatCurve) -> Self {
        Self {
            source: source.into(),
            curve,
            sorted: FloatCurve::default(),
            resolved: false,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }
}

impl Controller for RemapController {
    fn source(&self) -> Option<&str> {
        Some(&self.source)
    }

    fn resolve(&mut self, siblings: &Siblings) {
        self.resolved = siblings.contains(&self.source);
        if self.resolved {
            self.sorted = self.curve.sorted();
        } else {
            warn!(source = %self.source, "remap source unavailable, output stays zero");
        }
    }

    fn update(&mut self, input: &ControllerInput<'_>, out: &mut Vec<f32>) {
        if !self.resolved {
            return;
        }
        if let Some(values) = input.outputs.get(&self.source) {
            out.extend(values.iter().map(|value| self.sorted.evaluate(*value)));
        }
    }

    fn save(&self) -> Map<String, Value> {
        save_fields(self)
    }
}

#[cfg(test)]
mod tests {
    use indexmap::IndexMap;

    use super::*;
    use crate::HostState;

    fn step(controller: &mut RemapController, outputs: &IndexMap<String, Vec<f32>>) -> Vec<f32> {
        let host = HostState::new();
        let input = ControllerInput {
            dt: 0.02,
            time: 0.0,
            host: &host,
            outputs,
        };
        let mut out = Vec::new();
        controller.update(&input, &mut out);
        out
    }

    #[test]
    fn maps_every_source_element() {
        let mut controller =
            RemapController::new("thrust", FloatCurve::linear(&[(0.0, 1.0), (1.0, 0.0)]));
        controller.resolve(&Siblings::new(["thrust"]));
        assert!(controller.is_resolved());

        let mut outputs = IndexMap::new();
        outputs.insert("thrust".to_string(), vec![0.0, 0.25, 1.0]);
        assert_eq!(step(&mut controller, &outputs), vec![1.0, 0.75, 0.0]);
    }

    #[test]
    fn unresolved_source_outputs_nothing() {
        let mut controller = RemapController::new("ghost", FloatCurve::constant(5.0));
        controller.resolve(&Siblings::new(["throttle"]));
        assert!(!controller.is_resolved());

        let mut outputs = IndexMap::new();
        outputs.insert("ghost".to_string(), vec![1.0]);
        assert!(step(&mut controller, &outputs).is_empty());
    }
}
