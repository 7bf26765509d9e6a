use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::{save_fields, Controller, ControllerInput};
use crate::{Host, MemberId};

/// Reads the host's atmospheric density each tick.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AtmosphereDensityController {}

impl Controller for AtmosphereDensityController {
    fn update(&mut self, input: &ControllerInput<'_>, out: &mut Vec<f32>) {
        out.push(input.host.atmosphere_density());
    }

    fn save(&self) -> Map<String, Value> {
        Map::new()
    }
}

/// Reads the host's velocity magnitude each tick.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VelocityController {}

impl Controller for VelocityController {
    fn update(&mut self, input: &ControllerInput<'_>, out: &mut Vec<f32>) {
        out.push(input.host.speed());
    }

    fn save(&self) -> Map<String, Value> {
        Map::new()
    }
}

/// Holds whatever value was last pushed into it.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PushController {
    /// Value reported until something is pushed.
    #[serde(default)]
    pub value: f32,
    #[serde(skip)]
    pushed: Option<f32>,
}

impl Controller for PushController {
    fn update(&mut self, _input: &ControllerInput<'_>, out: &mut Vec<f32>) {
        out.push(self.pushed.unwrap_or(self.value));
    }

    fn set(&mut self, value: f32) -> bool {
        self.pushed = Some(value);
        true
    }

    fn save(&self) -> Map<String, Value> {
        save_fields(self)
    }
}

fn default_multiplier() -> f32 {
    1.0
}

/// Pulls a named numeric member from the host's accessor table.
///
/// The name is resolved once at bind time; unknown names produce zero.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AdapterController {
    pub member: String,
    #[serde(default = "default_multiplier")]
    pub multiplier: f32,
    #[serde(skip)]
    resolved: Option<MemberId>,
}

impl Controller for AdapterController {
    fn bind(&mut self, host: &dyn Host) {
        self.resolved = host.member_id(&self.member);
        if self.resolved.is_none() {
            warn!(member = %self.member, "host exposes no such member, adapter outputs zero");
        }
    }

    fn update(&mut self, input: &ControllerInput<'_>, out: &mut Vec<f32>) {
        let value = self
            .resolved
            .map_or(0.0, |id| input.host.member(id) * self.multiplier);
        out.push(value);
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

    fn step(controller: &mut dyn Controller, host: &HostState) -> f32 {
        let outputs = IndexMap::new();
        let input = ControllerInput {
            dt: 0.02,
            time: 0.0,
            host,
            outputs: &outputs,
        };
        let mut out = Vec::new();
        controller.update(&input, &mut out);
        out[0]
    }

    #[test]
    fn adapter_reads_registered_member() {
        let mut host = HostState::new();
        host.set_member("chamber_pressure", 4.0);
        let mut controller = AdapterController {
            member: "chamber_pressure".into(),
            multiplier: 0.5,
            ..Default::default()
        };
        controller.bind(&host);

        assert_eq!(step(&mut controller, &host), 2.0);
        host.set_member("chamber_pressure", 8.0);
        assert_eq!(step(&mut controller, &host), 4.0);
    }

    #[test]
    fn adapter_with_unknown_member_is_zero() {
        let host = HostState::new();
        let mut controller = AdapterController {
            member: "nope".into(),
            multiplier: 1.0,
            ..Default::default()
        };
        controller.bind(&host);
        assert_eq!(step(&mut controller, &host), 0.0);
    }

    #[test]
    fn push_reports_declared_value_until_set() {
        let host = HostState::new();
        let mut controller = PushController {
            value: 0.3,
            ..Default::default()
        };
        assert_eq!(step(&mut controller, &host), 0.3);
        assert!(controller.set(0.9));
        assert_eq!(step(&mut controller, &host), 0.9);
        assert_eq!(controller.save().get("value"), Some(&Value::from(0.3_f32)));
    }

    #[test]
    fn direct_reads_follow_host() {
        let mut host = HostState::new();
        host.speed = 310.0;
        host.atmosphere_density = 1.2;
        assert_eq!(step(&mut VelocityController::default(), &host), 310.0);
        assert_eq!(step(&mut AtmosphereDensityController::default(), &host), 1.2);
    }
}
