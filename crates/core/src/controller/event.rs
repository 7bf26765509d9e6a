use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{save_fields, Controller, ControllerInput};
use crate::{FloatCurve, Host};

/// Engine transitions an [`EventController`] can fire on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineEvent {
    /// Not ignited → ignited.
    #[default]
    Ignition,
    /// Ignited → not ignited.
    Flameout,
}

impl EngineEvent {
    fn predicate(self, host: &dyn Host) -> bool {
        match self {
            Self::Ignition => host.ignited(),
            Self::Flameout => !host.ignited(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventState {
    #[default]
    Ready,
    Playing,
    Cooldown,
}

fn default_duration() -> f32 {
    1.0
}

/// Plays a curve over a fixed window whenever its predicate rises.
///
/// Only one firing is in flight at a time. After a firing completes the
/// controller re-arms once the predicate is back at baseline, which may
/// already be the case when the window closes.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct EventController {
    #[serde(default)]
    pub event: EngineEvent,
    /// Length of the firing window in seconds.
    #[serde(default = "default_duration")]
    pub duration: f32,
    /// Output over elapsed seconds since the firing started.
    #[serde(default)]
    pub curve: FloatCurve,
    #[serde(skip)]
    sorted: FloatCurve,
    #[serde(skip)]
    state: EventState,
    #[serde(skip)]
    elapsed: f32,
    #[serde(skip)]
    last: Option<bool>,
}

impl EventController {
    pub fn new(event: EngineEvent, duration: f32, curve: FloatCurve) -> Self {
        Self {
            event,
            duration,
            sorted: curve.sorted(),
            curve,
            ..Default::default()
        }
    }

    pub fn state(&self) -> EventState {
        self.state
    }
}

impl Controller for EventController {
    fn bind(&mut self, host: &dyn Host) {
        self.sorted = self.curve.sorted();
        // An engine that is already running at load time does not fire.
        self.last = Some(self.event.predicate(host));
    }

    fn update(&mut self, input: &ControllerInput<'_>, out: &mut Vec<f32>) {
        let predicate = self.event.predicate(input.host);
        match self.state {
            EventState::Ready => {
                if self.last == Some(false) && predicate {
                    self.state = EventState::Playing;
                    self.elapsed = 0.0;
                }
            }
            EventState::Playing => {
                self.elapsed += input.dt.max(0.0);
                if self.elapsed >= self.duration {
                    // Already back at baseline: the next rising edge fires.
                    self.state = if predicate {
                        EventState::Cooldown
                    } else {
                        EventState::Ready
                    };
                }
            }
            EventState::Cooldown => {
                if !predicate {
                    self.state = EventState::Ready;
                }
            }
        }
        self.last = Some(predicate);

        let value = if self.state == EventState::Playing {
            self.sorted.evaluate(self.elapsed)
        } else {
            0.0
        };
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

    fn step(controller: &mut EventController, host: &HostState) -> f32 {
        let outputs = IndexMap::new();
        let input = ControllerInput {
            dt: 0.1,
            time: 0.0,
            host,
            outputs: &outputs,
        };
        let mut out = Vec::new();
        controller.update(&input, &mut out);
        out[0]
    }

    fn ignition() -> EventController {
        EventController::new(EngineEvent::Ignition, 1.0, FloatCurve::constant(1.0))
    }

    #[test]
    fn fires_on_rising_edge_for_duration() {
        let mut host = HostState::new();
        let mut controller = ignition();
        controller.bind(&host);
        assert_eq!(step(&mut controller, &host), 0.0);

        host.ignited = true;
        let mut playing = 0;
        for _ in 0..30 {
            playing += step(&mut controller, &host) as usize;
        }
        // The firing tick plus every tick before the window closes.
        assert_eq!(playing, 10);
        assert_eq!(controller.state(), EventState::Cooldown);
    }

    #[test]
    fn toggles_during_playback_do_not_refire() {
        let mut host = HostState::new();
        let mut controller = ignition();
        controller.bind(&host);
        step(&mut controller, &host);

        host.ignited = true;
        assert_eq!(step(&mut controller, &host), 1.0);
        host.ignited = false;
        step(&mut controller, &host);
        host.ignited = true;
        let mut playing = 2;
        for _ in 0..20 {
            playing += step(&mut controller, &host) as usize;
        }
        assert_eq!(playing, 10);

        // Still ignited: no second firing until the predicate falls back.
        assert_eq!(controller.state(), EventState::Cooldown);
        host.ignited = false;
        step(&mut controller, &host);
        assert_eq!(controller.state(), EventState::Ready);
        host.ignited = true;
        assert_eq!(step(&mut controller, &host), 1.0);
        assert_eq!(controller.state(), EventState::Playing);
    }

    #[test]
    fn window_closing_at_baseline_rearms_for_the_next_edge() {
        let mut host = HostState::new();
        let mut controller =
            EventController::new(EngineEvent::Ignition, 0.2, FloatCurve::constant(1.0));
        controller.bind(&host);
        step(&mut controller, &host);

        host.ignited = true;
        assert_eq!(step(&mut controller, &host), 1.0);
        host.ignited = false;
        assert_eq!(step(&mut controller, &host), 1.0);
        // Window closes while the engine is still out.
        assert_eq!(step(&mut controller, &host), 0.0);
        assert_eq!(controller.state(), EventState::Ready);

        host.ignited = true;
        assert_eq!(step(&mut controller, &host), 1.0);
        assert_eq!(controller.state(), EventState::Playing);
    }

    #[test]
    fn running_engine_at_bind_does_not_fire() {
        let mut host = HostState::new();
        host.ignited = true;
        let mut controller = ignition();
        controller.bind(&host);
        assert_eq!(step(&mut controller, &host), 0.0);
        assert_eq!(controller.state(), EventState::Ready);
    }

    #[test]
    fn flameout_fires_when_ignition_drops() {
        let mut host = HostState::new();
        host.ignited = true;
        let mut controller =
            EventController::new(EngineEvent::Flameout, 0.5, FloatCurve::constant(2.0));
        controller.bind(&host);
        step(&mut controller, &host);

        host.ignited = false;
        assert_eq!(step(&mut controller, &host), 2.0);
    }
}
