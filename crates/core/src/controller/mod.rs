//! Controllers produce the driver values modifiers consume.
//!
//! Every controller lives in a [`ControllerSet`], which refreshes all of them
//! exactly once per tick and caches the outputs. Integrators only ever read
//! the cache, so every consumer sees the same snapshot within a tick.

mod event;
mod follower;
mod random;
mod registry;
mod remap;
mod signal;

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::narrow_floats;
use crate::{ControllerDef, Host, PlumeError, Result};

pub use event::{EngineEvent, EventController, EventState};
pub use follower::{EngineOnController, ResponseRates, ThrottleController, ThrustController};
pub use random::{NoiseSettings, RandomController};
pub use registry::{ControllerFactory, ControllerRegistry, InertController};
pub use remap::RemapController;
pub use signal::{AdapterController, AtmosphereDensityController, PushController, VelocityController};

/// Everything a controller may read while updating.
pub struct ControllerInput<'a> {
    /// Elapsed time since the previous tick, in seconds.
    pub dt: f32,
    /// Accumulated effect time, in seconds.
    pub time: f32,
    pub host: &'a dyn Host,
    /// Outputs of controllers refreshed earlier in this tick.
    pub outputs: &'a IndexMap<String, Vec<f32>>,
}

/// Names of sibling controllers a controller may bind to during resolution.
#[derive(Debug, Default)]
pub struct Siblings {
    names: HashSet<String>,
}

impl Siblings {
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }
}

/// A stateful driver value source.
pub trait Controller: fmt::Debug {
    /// Phase one: bind to the host right after construction.
    fn bind(&mut self, _host: &dyn Host) {}

    /// Name of the controller this one reads from, if any.
    fn source(&self) -> Option<&str> {
        None
    }

    /// Phase two: resolve references to sibling controllers. Runs once, after
    /// every controller of the effect has been constructed.
    fn resolve(&mut self, _siblings: &Siblings) {}

    /// Computes this tick's values into `out` (cleared by the caller). Leaving
    /// `out` empty yields a single zero.
    fn update(&mut self, input: &ControllerInput<'_>, out: &mut Vec<f32>);

    /// Pushes an externally supplied value. Returns `false` for controllers
    /// that do not accept pushed values.
    fn set(&mut self, _value: f32) -> bool {
        false
    }

    /// Declared fields, in the same shape the controller was built from.
    fn save(&self) -> Map<String, Value>;
}

/// Serializes a controller's declared fields back into a field map.
///
/// `f32` fields are written with their shortest decimal form, so a declared
/// `0.4` saves as `0.4` rather than its widened `f64` expansion.
pub(crate) fn save_fields<T: Serialize>(value: &T) -> Map<String, Value> {
    match serde_json::to_value(value) {
        Ok(Value::Object(mut fields)) => {
            fields.values_mut().for_each(narrow_floats);
            fields
        }
        _ => Map::new(),
    }
}


#[derive(Debug)]
struct ControllerSlot {
    kind: String,
    controller: Box<dyn Controller>,
    overridden: bool,
    override_value: f32,
    users: usize,
}

/// Registry of an effect's controllers plus their cached per-tick outputs.
#[derive(Debug, Default)]
pub struct ControllerSet {
    slots: IndexMap<String, ControllerSlot>,
    outputs: IndexMap<String, Vec<f32>>,
    order: Vec<String>,
}

impl ControllerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds every declared controller, then resolves cross references once
    /// all of them exist. Duplicate names are skipped with a warning.
    pub fn build(defs: &[ControllerDef], registry: &ControllerRegistry, host: &dyn Host) -> Self {
        let mut set = Self::new();
        for def in defs {
            if set.slots.contains_key(&def.name) {
                warn!(controller = %def.name, "duplicate controller name, skipping");
                continue;
            }
            set.construct(def, registry, host);
        }

        let cyclic = set.cyclic();
        let siblings = set.siblings(&cyclic);
        for slot in set.slots.values_mut() {
            slot.controller.resolve(&siblings);
        }
        set.order = set.evaluation_order();
        set
    }

    fn construct(&mut self, def: &ControllerDef, registry: &ControllerRegistry, host: &dyn Host) {
        let mut controller = registry.build(def);
        controller.bind(host);
        debug!(controller = %def.name, kind = %def.kind, "controller constructed");
        self.slots.insert(
            def.name.clone(),
            ControllerSlot {
                kind: def.kind.clone(),
                controller,
                overridden: false,
                override_value: 0.0,
                users: 0,
            },
        );
        self.outputs.insert(def.name.clone(), vec![0.0]);
    }

    /// Adds a single controller at runtime. Only the new controller is
    /// resolved; earlier resolution failures stay as they are.
    pub fn insert(
        &mut self,
        def: &ControllerDef,
        registry: &ControllerRegistry,
        host: &dyn Host,
    ) -> Result<()> {
        if self.slots.contains_key(&def.name) {
            return Err(PlumeError::DuplicateName {
                kind: "controller",
                name: def.name.clone(),
            });
        }
        self.construct(def, registry, host);

        let cyclic = self.cyclic();
        let siblings = self.siblings(&cyclic);
        if let Some(slot) = self.slots.get_mut(&def.name) {
            slot.controller.resolve(&siblings);
        }
        self.order = self.evaluation_order();
        Ok(())
    }

    /// Removes a controller and returns its declaration.
    pub fn remove(&mut self, name: &str) -> Result<ControllerDef> {
        let slot = self
            .slots
            .shift_remove(name)
            .ok_or_else(|| PlumeError::UnknownController(name.to_string()))?;
        if slot.users > 0 {
            warn!(controller = name, users = slot.users, "removing controller still bound to modifiers");
        }
        self.outputs.shift_remove(name);
        self.order.retain(|entry| entry != name);
        Ok(ControllerDef {
            name: name.to_string(),
            kind: slot.kind,
            fields: slot.controller.save(),
        })
    }

    fn siblings(&self, cyclic: &HashSet<String>) -> Siblings {
        Siblings::new(self.slots.keys().filter(|name| !cyclic.contains(*name)).cloned())
    }

    /// Steps from `name` to the root of its source chain, or `None` if the
    /// chain never terminates.
    fn depth(&self, name: &str) -> Option<usize> {
        let mut current = name;
        for depth in 0..=self.slots.len() {
            match self.slots.get(current).and_then(|slot| slot.controller.source()) {
                Some(source) if self.slots.contains_key(source) => current = source,
                _ => return Some(depth),
            }
        }
        None
    }

    /// Controllers whose source chain leads back to themselves.
    fn cyclic(&self) -> HashSet<String> {
        self.slots
            .keys()
            .filter(|name| {
                let mut current = name.as_str();
                for _ in 0..self.slots.len() {
                    match self.slots.get(current).and_then(|slot| slot.controller.source()) {
                        Some(source) if source == name.as_str() => return true,
                        Some(source) if self.slots.contains_key(source) => current = source,
                        _ => return false,
                    }
                }
                false
            })
            .cloned()
            .collect()
    }

    /// Declaration order, except that every controller comes after its source.
    fn evaluation_order(&self) -> Vec<String> {
        let mut ranked: Vec<(usize, &String)> = self
            .slots
            .keys()
            .map(|name| (self.depth(name).unwrap_or(usize::MAX), name))
            .collect();
        ranked.sort_by_key(|(depth, _)| *depth);
        ranked.into_iter().map(|(_, name)| name.clone()).collect()
    }

    /// Refreshes every controller once and caches the results.
    pub fn refresh(&mut self, dt: f32, time: f32, host: &dyn Host) {
        for name in &self.order {
            let Some(slot) = self.slots.get_mut(name) else {
                continue;
            };
            let mut buffer = self
                .outputs
                .get_mut(name)
                .map(std::mem::take)
                .unwrap_or_default();
            buffer.clear();

            let input = ControllerInput {
                dt,
                time,
                host,
                outputs: &self.outputs,
            };
            slot.controller.update(&input, &mut buffer);

            if buffer.is_empty() {
                buffer.push(0.0);
            }
            if slot.overridden {
                buffer.fill(slot.override_value);
            }
            self.outputs.insert(name.clone(), buffer);
        }
    }

    /// Cached values for this tick.
    pub fn get(&self, name: &str) -> Option<&[f32]> {
        self.outputs.get(name).map(Vec::as_slice)
    }

    pub fn outputs(&self) -> &IndexMap<String, Vec<f32>> {
        &self.outputs
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot_mut(&mut self, name: &str) -> Result<&mut ControllerSlot> {
        self.slots
            .get_mut(name)
            .ok_or_else(|| PlumeError::UnknownController(name.to_string()))
    }

    /// Forces (or releases) the override. An active override also replaces
    /// the cached values immediately.
    pub fn set_override(&mut self, name: &str, overridden: bool) -> Result<()> {
        let slot = self.slot_mut(name)?;
        slot.overridden = overridden;
        let value = slot.override_value;
        if overridden {
            if let Some(cached) = self.outputs.get_mut(name) {
                cached.fill(value);
            }
        }
        Ok(())
    }

    pub fn set_override_value(&mut self, name: &str, value: f32) -> Result<()> {
        let slot = self.slot_mut(name)?;
        slot.override_value = value;
        let overridden = slot.overridden;
        if overridden {
            if let Some(cached) = self.outputs.get_mut(name) {
                cached.fill(value);
            }
        }
        Ok(())
    }

    pub fn is_overridden(&self, name: &str) -> bool {
        self.slots.get(name).is_some_and(|slot| slot.overridden)
    }

    /// Pushes a value into a push-style controller; it shows up on the next
    /// refresh. Returns whether the controller accepted it.
    pub fn set_value(&mut self, name: &str, value: f32) -> Result<bool> {
        let slot = self.slot_mut(name)?;
        let accepted = slot.controller.set(value);
        if !accepted {
            warn!(controller = name, kind = %slot.kind, "controller does not accept pushed values");
        }
        Ok(accepted)
    }

    pub(crate) fn retain_user(&mut self, name: &str) {
        if let Some(slot) = self.slots.get_mut(name) {
            slot.users += 1;
        }
    }

    pub(crate) fn release_user(&mut self, name: &str) {
        if let Some(slot) = self.slots.get_mut(name) {
            slot.users = slot.users.saturating_sub(1);
        }
    }

    /// Number of attached modifiers bound to the controller.
    pub fn users(&self, name: &str) -> usize {
        self.slots.get(name).map_or(0, |slot| slot.users)
    }

    /// Declarations of every controller, in declaration order.
    pub fn save(&self) -> Vec<ControllerDef> {
        self.slots
            .iter()
            .map(|(name, slot)| ControllerDef {
                name: name.clone(),
                kind: slot.kind.clone(),
                fields: slot.controller.save(),
            })
            .collect()
    }
}
