use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use super::{
    AdapterController, AtmosphereDensityController, Controller, ControllerInput,
    EngineOnController, EventController, PushController, RandomController, RemapController,
    ThrottleController, ThrustController, VelocityController,
};
use crate::ControllerDef;

/// Builds a controller from its declared fields.
pub type ControllerFactory = fn(&Map<String, Value>) -> serde_json::Result<Box<dyn Controller>>;

fn typed<C>(fields: &Map<String, Value>) -> serde_json::Result<Box<dyn Controller>>
where
    C: Controller + DeserializeOwned + 'static,
{
    let controller: C = serde_json::from_value(Value::Object(fields.clone()))?;
    Ok(Box::new(controller))
}

const BUILTINS: &[(&str, ControllerFactory)] = &[
    ("throttle", typed::<ThrottleController>),
    ("engine_on", typed::<EngineOnController>),
    ("thrust", typed::<ThrustController>),
    ("atmosphere_density", typed::<AtmosphereDensityController>),
    ("velocity", typed::<VelocityController>),
    ("push", typed::<PushController>),
    ("adapter", typed::<AdapterController>),
    ("random", typed::<RandomController>),
    ("remap", typed::<RemapController>),
    ("engine_event", typed::<EventController>),
];

/// Explicit table of controller type tags and their factories.
#[derive(Clone)]
pub struct ControllerRegistry {
    factories: HashMap<String, ControllerFactory>,
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&str> = self.tags().collect();
        tags.sort_unstable();
        f.debug_struct("ControllerRegistry").field("tags", &tags).finish()
    }
}

impl Default for ControllerRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ControllerRegistry {
    /// Registry without any controller types.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for (tag, factory) in BUILTINS {
            registry.register(*tag, *factory);
        }
        registry
    }

    /// Adds or replaces the factory for `tag`.
    pub fn register(&mut self, tag: impl Into<String>, factory: ControllerFactory) {
        self.factories.insert(tag.into(), factory);
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Builds a controller. Unknown tags and malformed fields produce an
    /// [`InertController`] that keeps the declaration for saving.
    pub fn build(&self, def: &ControllerDef) -> Box<dyn Controller> {
        let Some(factory) = self.factories.get(&def.kind) else {
            warn!(controller = %def.name, kind = %def.kind, "unknown controller type, output stays zero");
            return Box::new(InertController::new(def.fields.clone()));
        };

        match factory(&def.fields) {
            Ok(controller) => controller,
            Err(err) => {
                warn!(controller = %def.name, kind = %def.kind, %err, "malformed controller fields, output stays zero");
                Box::new(InertController::new(def.fields.clone()))
            }
        }
    }
}

/// Stand-in for a controller that could not be built. Always outputs zero.
#[derive(Debug, Default)]
pub struct InertController {
    fields: Map<String, Value>,
}

impl InertController {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

impl Controller for InertController {
    fn update(&mut self, _input: &ControllerInput<'_>, _out: &mut Vec<f32>) {}

    fn save(&self) -> Map<String, Value> {
        self.fields.clone()
    }
}
