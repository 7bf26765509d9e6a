//! Scenario files: a model, its starting attribute values, a scripted host
//! and the effect to drive.

use std::collections::BTreeMap;
use std::path::Path;

use plumefx_core::{
    AttributeData, AttributeTarget, EffectDefinition, FloatCurve, HostState, MemoryRenderer,
    NodeDef, PipelineConfig, Result, SceneGraph,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Starting value of one attribute on every element matching `path`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialAttribute {
    pub path: String,
    pub target: AttributeTarget,
    pub value: AttributeData,
}

/// Host inputs as functions of scenario time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostScript {
    pub thrusters: usize,
    pub throttle: FloatCurve,
    /// Time the engine ignites, if it ever does.
    pub ignition: Option<f32>,
    /// Time the engine shuts down, if it ever does.
    pub shutdown: Option<f32>,
    pub speed: FloatCurve,
    pub atmosphere_density: FloatCurve,
    /// Constant named members readable by adapter controllers.
    pub members: BTreeMap<String, f32>,
}

impl HostScript {
    pub fn host(&self) -> HostState {
        let mut host = HostState::with_thrusters(self.thrusters);
        for (name, value) in &self.members {
            host.set_member(name.clone(), *value);
        }
        host
    }

    /// Moves `host` to the scripted state at `time`.
    pub fn apply(&self, host: &mut HostState, time: f32) {
        let running = self.ignition.is_some_and(|start| time >= start)
            && self.shutdown.map_or(true, |stop| time < stop);
        if running {
            host.run_engine(self.throttle.evaluate(time));
        } else {
            host.shutdown();
        }
        host.speed = self.speed.evaluate(time);
        host.atmosphere_density = self.atmosphere_density.evaluate(time);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: PipelineConfig,
    /// One root per effect instance.
    pub model: Vec<NodeDef>,
    #[serde(default)]
    pub attributes: Vec<InitialAttribute>,
    #[serde(default)]
    pub host: HostScript,
    pub effect: EffectDefinition,
}

impl Scenario {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let scenario: Self = serde_json::from_str(&text)?;
        scenario.effect.validate()?;
        Ok(scenario)
    }

    pub fn scene(&self) -> SceneGraph {
        SceneGraph::from_defs(&self.model)
    }

    /// Renderer pre-populated with the starting attribute values.
    pub fn renderer(&self, scene: &SceneGraph) -> MemoryRenderer {
        let mut renderer = MemoryRenderer::new();
        for attribute in &self.attributes {
            let elements = scene.find(&attribute.path);
            if elements.is_empty() {
                warn!(path = %attribute.path, "scenario attribute matches no element");
            }
            for element in elements {
                renderer.insert(element, attribute.target.clone(), attribute.value);
            }
        }
        renderer
    }
}
