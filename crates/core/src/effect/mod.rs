//! Effect lifecycle and per-tick orchestration.

use std::fmt;

use glam::{Vec2, Vec3};
use indexmap::IndexMap;
use tracing::{debug, trace, warn};

use crate::integrator::{Attachment, IntegratorSet, IntegratorStats};
use crate::{
    AttributeValue, ControllerDef, ControllerRegistry, ControllerSet, DualColor, DualFloat,
    EffectDefinition, Host, Modifier, ModifierDecl, ModifierDef, PipelineConfig, PlumeError,
    RenderBackend,
    Result, Rgba, SceneGraph, TickClock, ValueKind,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EffectState {
    #[default]
    Unloaded,
    /// Declarations are known but nothing is bound to a model.
    Loaded,
    /// Controllers are built and integrators own their attributes.
    Active,
}

impl fmt::Display for EffectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unloaded => "unloaded",
            Self::Loaded => "loaded",
            Self::Active => "active",
        };
        f.write_str(label)
    }
}

/// Summary of one [`Effect::tick`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickReport {
    /// Accumulated effect time after this tick.
    pub time: f32,
    pub integrators: IntegratorStats,
    /// Effect-wide visibility after this tick.
    pub visible: bool,
}

#[derive(Debug)]
struct ModifierEntry {
    decl: ModifierDecl,
    /// Whether an integrator holds this modifier. Inert entries are kept so
    /// they still save back out.
    attached: bool,
}

/// One engine effect: its controllers, its modifiers and the integrators
/// that own the attributes those modifiers drive.
#[derive(Debug)]
pub struct Effect {
    state: EffectState,
    definition: EffectDefinition,
    config: PipelineConfig,
    registry: ControllerRegistry,
    controllers: ControllerSet,
    integrators: IntegratorSet,
    modifiers: IndexMap<String, ModifierEntry>,
    model: SceneGraph,
    clock: TickClock,
    visible: bool,
}

impl Default for Effect {
    fn default() -> Self {
        Self::new(PipelineConfig::default(), ControllerRegistry::default())
    }
}

impl Effect {
    pub fn new(config: PipelineConfig, registry: ControllerRegistry) -> Self {
        Self {
            state: EffectState::Unloaded,
            definition: EffectDefinition::default(),
            config,
            registry,
            controllers: ControllerSet::new(),
            integrators: IntegratorSet::new(),
            modifiers: IndexMap::new(),
            model: SceneGraph::new(),
            clock: TickClock::default(),
            visible: true,
        }
    }

    pub fn state(&self) -> EffectState {
        self.state
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn controllers(&self) -> &ControllerSet {
        &self.controllers
    }

    pub fn integrators(&self) -> &IntegratorSet {
        &self.integrators
    }

    pub fn model(&self) -> &SceneGraph {
        &self.model
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Names of the modifiers an integrator currently holds.
    pub fn attached_modifiers(&self) -> impl Iterator<Item = &str> {
        self.modifiers
            .iter()
            .filter(|(_, entry)| entry.attached)
            .map(|(name, _)| name.as_str())
    }

    fn expect_state(&self, expected: EffectState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PlumeError::InvalidState {
                expected,
                found: self.state,
            })
        }
    }

    fn transition(&mut self, next: EffectState) {
        debug!(effect = %self.definition.name, from = %self.state, to = %next, "effect state changed");
        self.state = next;
    }

    /// Accepts a definition. Nothing is bound until [`Effect::initialize`].
    pub fn load(&mut self, definition: EffectDefinition) -> Result<()> {
        self.expect_state(EffectState::Unloaded)?;
        definition.validate()?;
        self.definition = definition;
        self.transition(EffectState::Loaded);
        Ok(())
    }

    /// Builds every controller, then groups every modifier into integrators
    /// against `model`. Initial attribute values are captured from `backend`.
    pub fn initialize(
        &mut self,
        host: &dyn Host,
        model: SceneGraph,
        backend: &dyn RenderBackend,
    ) -> Result<()> {
        self.expect_state(EffectState::Loaded)?;
        self.model = model;
        self.controllers = ControllerSet::build(&self.definition.controllers, &self.registry, host);
        self.clock.reset();
        self.visible = true;

        let decls = self.definition.modifiers.clone();
        for (index, decl) in decls.into_iter().enumerate() {
            match decl {
                ModifierDecl::Valid(def) => {
                    if self.modifiers.contains_key(&def.name) {
                        warn!(modifier = %def.name, "duplicate modifier name, skipping");
                        continue;
                    }
                    self.attach(def, backend);
                }
                ModifierDecl::Invalid(_) => {
                    // Unnamed entries still need a slot so they save back out.
                    let key = decl
                        .name()
                        .map_or_else(|| format!("#{index}"), str::to_string);
                    if self.modifiers.contains_key(&key) {
                        warn!(modifier = %key, "duplicate modifier name, skipping");
                        continue;
                    }
                    self.modifiers.insert(
                        key,
                        ModifierEntry {
                            decl,
                            attached: false,
                        },
                    );
                }
            }
        }

        debug!(
            effect = %self.definition.name,
            controllers = self.controllers.len(),
            modifiers = self.modifiers.len(),
            integrators = self.integrators.len(),
            "effect initialized"
        );
        self.transition(EffectState::Active);
        Ok(())
    }

    fn attach(&mut self, def: ModifierDef, backend: &dyn RenderBackend) -> bool {
        let name = def.name.clone();
        let controller = def.controller.clone();
        let candidate = def.clone();
        let attached = match def.kind.value_kind() {
            ValueKind::Float => self.attach_typed::<f32>(candidate, backend),
            ValueKind::Vector2 => self.attach_typed::<Vec2>(candidate, backend),
            ValueKind::Vector3 => self.attach_typed::<Vec3>(candidate, backend),
            ValueKind::Color => self.attach_typed::<Rgba>(candidate, backend),
            ValueKind::DualFloat => self.attach_typed::<DualFloat>(candidate, backend),
            ValueKind::DualColor => self.attach_typed::<DualColor>(candidate, backend),
        };
        if attached {
            self.controllers.retain_user(&controller);
        }
        self.modifiers.insert(
            name,
            ModifierEntry {
                decl: def.into(),
                attached,
            },
        );
        attached
    }

    fn attach_typed<T: AttributeValue>(&mut self, def: ModifierDef, backend: &dyn RenderBackend) -> bool {
        if !self.controllers.contains(&def.controller) {
            warn!(modifier = %def.name, controller = %def.controller, "modifier bound to unknown controller, leaving it inert");
            return false;
        }
        let modifier = Modifier::<T>::init(def, &self.model);
        if modifier.elements().is_empty() {
            return false;
        }
        self.integrators.attach(modifier, backend, &self.config) != Attachment::Rejected
    }

    /// Advances the effect by `dt` seconds: every controller refreshes once,
    /// then every integrator resolves and writes.
    pub fn tick(
        &mut self,
        dt: f32,
        host: &dyn Host,
        backend: &mut dyn RenderBackend,
    ) -> Result<TickReport> {
        self.expect_state(EffectState::Active)?;
        let dt = self.clock.advance(dt);
        self.controllers.refresh(dt, self.clock.time_seconds, host);
        let stats = self.integrators.update(&self.controllers, backend, &self.config);

        if self.config.hide_when_idle && stats.culling > 0 {
            let visible = stats.culling_active > 0;
            if visible != self.visible {
                debug!(effect = %self.definition.name, visible, "effect visibility changed");
                backend.set_effect_visible(visible);
                self.visible = visible;
            }
        }

        trace!(
            effect = %self.definition.name,
            time = self.clock.time_seconds,
            integrators = stats.integrators,
            active = stats.active,
            "tick"
        );
        Ok(TickReport {
            time: self.clock.time_seconds,
            integrators: stats,
            visible: self.visible,
        })
    }

    /// Tears every integrator down, restoring initial attribute values, and
    /// returns to [`EffectState::Loaded`]. Runtime additions and removals are
    /// folded into the definition first so the next initialize keeps them.
    pub fn reload(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        self.expect_state(EffectState::Active)?;
        self.definition = self.save();
        self.integrators.restore_all(backend);
        self.modifiers.clear();
        self.controllers = ControllerSet::new();
        if !self.visible {
            backend.set_effect_visible(true);
            self.visible = true;
        }
        self.transition(EffectState::Loaded);
        Ok(())
    }

    /// Restores the model (if active) and forgets the definition.
    pub fn unload(&mut self, backend: &mut dyn RenderBackend) -> Result<()> {
        match self.state {
            EffectState::Unloaded => return Ok(()),
            EffectState::Active => self.reload(backend)?,
            EffectState::Loaded => {}
        }
        self.definition = EffectDefinition::default();
        self.model = SceneGraph::new();
        self.transition(EffectState::Unloaded);
        Ok(())
    }

    pub fn add_controller(&mut self, def: ControllerDef, host: &dyn Host) -> Result<()> {
        self.expect_state(EffectState::Active)?;
        self.controllers.insert(&def, &self.registry, host)
    }

    /// Removes a controller. Modifiers still bound to it stop contributing
    /// but stay attached.
    pub fn remove_controller(&mut self, name: &str) -> Result<ControllerDef> {
        self.expect_state(EffectState::Active)?;
        self.controllers.remove(name)
    }

    /// Runs the grouping algorithm for one new modifier. Returns whether it
    /// was attached; an inert modifier is still kept and saved.
    pub fn add_modifier(&mut self, def: ModifierDef, backend: &dyn RenderBackend) -> Result<bool> {
        self.expect_state(EffectState::Active)?;
        if self.modifiers.contains_key(&def.name) {
            return Err(PlumeError::DuplicateName {
                kind: "modifier",
                name: def.name,
            });
        }
        Ok(self.attach(def, backend))
    }

    /// Detaches a modifier. An integrator left without modifiers restores
    /// its initial values and is dropped.
    pub fn remove_modifier(
        &mut self,
        name: &str,
        backend: &mut dyn RenderBackend,
    ) -> Result<ModifierDecl> {
        self.expect_state(EffectState::Active)?;
        let entry = self
            .modifiers
            .shift_remove(name)
            .ok_or_else(|| PlumeError::UnknownModifier(name.to_string()))?;
        if let (true, Some(def)) = (entry.attached, entry.decl.as_def()) {
            self.integrators.detach(name, backend);
            self.controllers.release_user(&def.controller);
        }
        Ok(entry.decl)
    }

    pub fn set_override(&mut self, controller: &str, overridden: bool) -> Result<()> {
        self.expect_state(EffectState::Active)?;
        self.controllers.set_override(controller, overridden)
    }

    pub fn set_override_value(&mut self, controller: &str, value: f32) -> Result<()> {
        self.expect_state(EffectState::Active)?;
        self.controllers.set_override_value(controller, value)
    }

    /// Pushes a value into a push-style controller.
    pub fn set_controller_value(&mut self, controller: &str, value: f32) -> Result<bool> {
        self.expect_state(EffectState::Active)?;
        self.controllers.set_value(controller, value)
    }

    /// Current declarations, including runtime additions and inert entries.
    pub fn save(&self) -> EffectDefinition {
        if self.state != EffectState::Active {
            return self.definition.clone();
        }
        EffectDefinition {
            name: self.definition.name.clone(),
            controllers: self.controllers.save(),
            modifiers: self.modifiers.values().map(|entry| entry.decl.clone()).collect(),
        }
    }
}
