//! Integrators own one attribute on a fixed set of elements and resolve
//! every modifier that targets it into a single write per tick.
//!
//! Grouping is what guarantees exclusive ownership: a modifier joins the
//! integrator whose descriptor is identical to its own, and a modifier whose
//! descriptor partially overlaps an existing integrator is refused.

use glam::{Vec2, Vec3};
use tracing::{debug, warn};

use crate::{
    AttributeTarget, AttributeValue, ControllerSet, DualColor, DualFloat, ElementId, Modifier,
    ModifierDef, PipelineConfig, RenderBackend, Rgba, ValueKind,
};

/// Identity of a physical attribute instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributeDescriptor {
    pub target: AttributeTarget,
    pub kind: ValueKind,
    pub elements: Vec<ElementId>,
}

impl AttributeDescriptor {
    /// True when both descriptors would write the same property of at least
    /// one shared element without being the same descriptor.
    pub fn conflicts_with(&self, other: &AttributeDescriptor) -> bool {
        self.target == other.target
            && self != other
            && self
                .elements
                .iter()
                .any(|element| other.elements.contains(element))
    }

    pub fn contains(&self, element: ElementId) -> bool {
        self.elements.contains(&element)
    }
}

#[derive(Debug, Clone, Copy)]
struct BoundElement {
    /// Position in the descriptor's element list, i.e. in modifier output.
    index: usize,
    element: ElementId,
    visible: bool,
}

/// Sole owner of one attribute on a fixed set of elements.
#[derive(Debug)]
pub struct Integrator<T: AttributeValue> {
    descriptor: AttributeDescriptor,
    bound: Vec<BoundElement>,
    initial: Vec<T>,
    working: Vec<T>,
    modifiers: Vec<Modifier<T>>,
    culling: bool,
}

impl<T: AttributeValue> Integrator<T> {
    /// Captures the live value of every element before any modifier runs.
    /// Elements whose attribute cannot be read are left out for good.
    pub fn new(
        descriptor: AttributeDescriptor,
        backend: &dyn RenderBackend,
        config: &PipelineConfig,
    ) -> Self {
        let mut bound = Vec::with_capacity(descriptor.elements.len());
        let mut initial = Vec::with_capacity(descriptor.elements.len());
        for (index, element) in descriptor.elements.iter().copied().enumerate() {
            match backend.read(element, &descriptor.target).and_then(T::from_data) {
                Some(value) => {
                    bound.push(BoundElement {
                        index,
                        element,
                        visible: true,
                    });
                    initial.push(value);
                }
                None => warn!(
                    attribute = %descriptor.target,
                    element = element.0,
                    kind = ?T::KIND,
                    "attribute missing on element, excluding it"
                ),
            }
        }

        let culling =
            descriptor.target.supports_culling(config) && T::splat(1.0).intensity().is_some();
        debug!(attribute = %descriptor.target, elements = bound.len(), culling, "integrator created");

        Self {
            working: initial.clone(),
            descriptor,
            bound,
            initial,
            modifiers: Vec::new(),
            culling,
        }
    }

    pub fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }

    pub fn initial_values(&self) -> &[T] {
        &self.initial
    }

    /// Values resolved on the most recent update.
    pub fn working_values(&self) -> &[T] {
        &self.working
    }

    /// Elements that are actually written, in descriptor order.
    pub fn bound_elements(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.bound.iter().map(|bound| bound.element)
    }

    pub fn modifiers(&self) -> &[Modifier<T>] {
        &self.modifiers
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    pub fn attach(&mut self, modifier: Modifier<T>) {
        debug!(attribute = %self.descriptor.target, modifier = modifier.name(), "modifier attached");
        self.modifiers.push(modifier);
    }

    pub fn detach(&mut self, name: &str) -> Option<Modifier<T>> {
        let position = self.modifiers.iter().position(|m| m.name() == name)?;
        Some(self.modifiers.remove(position))
    }

    /// Resolves every modifier in attachment order and writes the result.
    /// Returns whether any element is currently active.
    pub fn update(
        &mut self,
        controllers: &ControllerSet,
        backend: &mut dyn RenderBackend,
        config: &PipelineConfig,
    ) -> bool {
        self.working.copy_from_slice(&self.initial);

        for modifier in &mut self.modifiers {
            let combine = modifier.combine();
            let Some(output) = modifier.sample(controllers) else {
                continue;
            };
            for (working, bound) in self.working.iter_mut().zip(&self.bound) {
                if let Some(delta) = output.get(bound.index) {
                    *working = combine.apply(*working, *delta);
                }
            }
        }

        let target = &self.descriptor.target;
        let mut any_active = false;
        for (bound, value) in self.bound.iter_mut().zip(&self.working) {
            if self.culling {
                let lit = value
                    .intensity()
                    .map_or(true, |intensity| intensity >= config.min_intensity);
                if !lit {
                    if bound.visible {
                        backend.set_visible(bound.element, target, false);
                        bound.visible = false;
                    }
                    continue;
                }
                if !bound.visible {
                    backend.set_visible(bound.element, target, true);
                    bound.visible = true;
                }
            }
            backend.write(bound.element, target, value.into_data());
            any_active = true;
        }
        any_active
    }

    /// Final resolution pass: writes the captured initial values back and
    /// re-enables anything culling disabled.
    pub fn restore(&mut self, backend: &mut dyn RenderBackend) {
        let target = &self.descriptor.target;
        for (bound, initial) in self.bound.iter_mut().zip(&self.initial) {
            backend.write(bound.element, target, initial.into_data());
            if !bound.visible {
                backend.set_visible(bound.element, target, true);
                bound.visible = true;
            }
        }
        self.working.copy_from_slice(&self.initial);
    }
}

/// Kind-independent view of an integrator.
pub trait AttributeOwner {
    fn descriptor(&self) -> &AttributeDescriptor;

    /// Whether this integrator may hide elements below the intensity threshold.
    fn culls(&self) -> bool;

    fn modifier_names(&self) -> Vec<&str>;

    fn is_empty(&self) -> bool;

    fn update(
        &mut self,
        controllers: &ControllerSet,
        backend: &mut dyn RenderBackend,
        config: &PipelineConfig,
    ) -> bool;

    fn restore(&mut self, backend: &mut dyn RenderBackend);

    /// Removes the named modifier and returns its declaration.
    fn detach_def(&mut self, name: &str) -> Option<ModifierDef>;
}

impl<T: AttributeValue> AttributeOwner for Integrator<T> {
    fn descriptor(&self) -> &AttributeDescriptor {
        &self.descriptor
    }

    fn culls(&self) -> bool {
        self.culling
    }

    fn modifier_names(&self) -> Vec<&str> {
        self.modifiers.iter().map(Modifier::name).collect()
    }

    fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    fn update(
        &mut self,
        controllers: &ControllerSet,
        backend: &mut dyn RenderBackend,
        config: &PipelineConfig,
    ) -> bool {
        Integrator::update(self, controllers, backend, config)
    }

    fn restore(&mut self, backend: &mut dyn RenderBackend) {
        Integrator::restore(self, backend)
    }

    fn detach_def(&mut self, name: &str) -> Option<ModifierDef> {
        self.detach(name).map(Modifier::into_def)
    }
}

/// Outcome of attaching a modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attachment {
    /// Joined an integrator with an identical descriptor.
    Joined,
    /// No matching integrator existed; a new one now owns the attribute.
    Created,
    /// The descriptor overlaps another integrator's ownership; the modifier
    /// stays inert.
    Rejected,
}

/// Per-tick counters returned by [`IntegratorSet::update`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IntegratorStats {
    pub integrators: usize,
    pub active: usize,
    pub culling: usize,
    pub culling_active: usize,
}

/// Every integrator of an effect, grouped by value kind.
#[derive(Debug, Default)]
pub struct IntegratorSet {
    pub(crate) floats: Vec<Integrator<f32>>,
    pub(crate) vector2s: Vec<Integrator<Vec2>>,
    pub(crate) vector3s: Vec<Integrator<Vec3>>,
    pub(crate) colors: Vec<Integrator<Rgba>>,
    pub(crate) dual_floats: Vec<Integrator<DualFloat>>,
    pub(crate) dual_colors: Vec<Integrator<DualColor>>,
}

fn erase<T: AttributeValue>(integrator: &Integrator<T>) -> &dyn AttributeOwner {
    integrator
}

fn erase_mut<T: AttributeValue>(integrator: &mut Integrator<T>) -> &mut dyn AttributeOwner {
    integrator
}

impl IntegratorSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owners(&self) -> impl Iterator<Item = &dyn AttributeOwner> {
        self.floats
            .iter()
            .map(erase)
            .chain(self.vector2s.iter().map(erase))
            .chain(self.vector3s.iter().map(erase))
            .chain(self.colors.iter().map(erase))
            .chain(self.dual_floats.iter().map(erase))
            .chain(self.dual_colors.iter().map(erase))
    }

    pub fn owners_mut(&mut self) -> impl Iterator<Item = &mut dyn AttributeOwner> {
        self.floats
            .iter_mut()
            .map(erase_mut)
            .chain(self.vector2s.iter_mut().map(erase_mut))
            .chain(self.vector3s.iter_mut().map(erase_mut))
            .chain(self.colors.iter_mut().map(erase_mut))
            .chain(self.dual_floats.iter_mut().map(erase_mut))
            .chain(self.dual_colors.iter_mut().map(erase_mut))
    }

    pub fn len(&self) -> usize {
        self.owners().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs the grouping algorithm for one modifier.
    pub fn attach<T: AttributeValue>(
        &mut self,
        modifier: Modifier<T>,
        backend: &dyn RenderBackend,
        config: &PipelineConfig,
    ) -> Attachment {
        let descriptor = modifier.descriptor();
        if let Some(owner) = self
            .owners()
            .find(|owner| owner.descriptor().conflicts_with(&descriptor))
        {
            warn!(
                modifier = modifier.name(),
                attribute = %descriptor.target,
                owner = ?owner.modifier_names(),
                "modifier overlaps an attribute owned by another integrator, leaving it inert"
            );
            return Attachment::Rejected;
        }

        let integrators = T::integrators(self);
        if let Some(existing) = integrators
            .iter_mut()
            .find(|integrator| integrator.descriptor == descriptor)
        {
            existing.attach(modifier);
            return Attachment::Joined;
        }

        let mut integrator = Integrator::new(descriptor, backend, config);
        integrator.attach(modifier);
        integrators.push(integrator);
        Attachment::Created
    }

    /// Removes a modifier by name. If that leaves its integrator empty, the
    /// attribute is restored to its initial values and the integrator dropped.
    pub fn detach(&mut self, name: &str, backend: &mut dyn RenderBackend) -> Option<ModifierDef> {
        let mut removed = None;
        for owner in self.owners_mut() {
            if let Some(def) = owner.detach_def(name) {
                if owner.is_empty() {
                    owner.restore(backend);
                }
                removed = Some(def);
                break;
            }
        }
        if removed.is_some() {
            self.prune();
        }
        removed
    }

    fn prune(&mut self) {
        self.floats.retain(|i| !i.is_empty());
        self.vector2s.retain(|i| !i.is_empty());
        self.vector3s.retain(|i| !i.is_empty());
        self.colors.retain(|i| !i.is_empty());
        self.dual_floats.retain(|i| !i.is_empty());
        self.dual_colors.retain(|i| !i.is_empty());
    }

    pub fn update(
        &mut self,
        controllers: &ControllerSet,
        backend: &mut dyn RenderBackend,
        config: &PipelineConfig,
    ) -> IntegratorStats {
        let mut stats = IntegratorStats::default();
        for owner in self.owners_mut() {
            let active = owner.update(controllers, backend, config);
            stats.integrators += 1;
            stats.active += usize::from(active);
            if owner.culls() {
                stats.culling += 1;
                stats.culling_active += usize::from(active);
            }
        }
        stats
    }

    /// Restores every attribute and drops every integrator.
    pub fn restore_all(&mut self, backend: &mut dyn RenderBackend) -> Vec<ModifierDef> {
        let mut defs = Vec::new();
        for owner in self.owners_mut() {
            owner.restore(backend);
            let names: Vec<String> = owner.modifier_names().into_iter().map(str::to_string).collect();
            for name in names {
                defs.extend(owner.detach_def(&name));
            }
        }
        self.prune();
        defs
    }

    /// Number of integrators writing `target` on `element`.
    pub fn owners_of(&self, element: ElementId, target: &AttributeTarget) -> usize {
        self.owners()
            .filter(|owner| &owner.descriptor().target == target && owner.descriptor().contains(element))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AttributeData, ControllerDef, ControllerRegistry, CombineMode, FloatCurve, HostState,
        LightProperty, MemoryRenderer, ModifierKind,
    };

    const PROPERTY: &str = "_Intensity";

    fn target() -> AttributeTarget {
        AttributeTarget::material(PROPERTY)
    }

    fn renderer(elements: &[ElementId], value: f32) -> MemoryRenderer {
        let mut renderer = MemoryRenderer::new();
        for element in elements {
            renderer.insert(*element, target(), AttributeData::Float(value));
        }
        renderer
    }

    fn modifier(name: &str, combine: CombineMode, value: f32, elements: &[ElementId]) -> Modifier<f32> {
        let def = ModifierDef::new(
            name,
            "push",
            "",
            ModifierKind::MaterialFloat {
                property: PROPERTY.into(),
                curve: FloatCurve::constant(value),
            },
        )
        .combine(combine);
        Modifier::new(def, elements.to_vec())
    }

    fn controllers() -> ControllerSet {
        let host = HostState::new();
        let mut set = ControllerSet::build(
            &[ControllerDef::new("push", "push").with("value", 1.0)],
            &ControllerRegistry::default(),
            &host,
        );
        set.refresh(0.02, 0.02, &host);
        set
    }

    fn read(renderer: &MemoryRenderer, element: ElementId) -> f32 {
        match renderer.get(element, &target()) {
            Some(AttributeData::Float(value)) => value,
            other => panic!("unexpected attribute {other:?}"),
        }
    }

    #[test]
    fn identical_descriptors_share_one_integrator() {
        let elements = [ElementId(0), ElementId(1)];
        let renderer = renderer(&elements, 1.0);
        let config = PipelineConfig::default();
        let mut set = IntegratorSet::new();

        let first = set.attach(modifier("a", CombineMode::Add, 1.0, &elements), &renderer, &config);
        let second = set.attach(modifier("b", CombineMode::Add, 1.0, &elements), &renderer, &config);

        assert_eq!(first, Attachment::Created);
        assert_eq!(second, Attachment::Joined);
        assert_eq!(set.len(), 1);
        for element in elements {
            assert_eq!(set.owners_of(element, &target()), 1);
        }
    }

    #[test]
    fn partial_overlap_is_rejected() {
        let renderer = renderer(&[ElementId(0), ElementId(1)], 1.0);
        let config = PipelineConfig::default();
        let mut set = IntegratorSet::new();

        set.attach(modifier("both", CombineMode::Add, 1.0, &[ElementId(0), ElementId(1)]), &renderer, &config);
        let outcome = set.attach(modifier("one", CombineMode::Add, 1.0, &[ElementId(1)]), &renderer, &config);

        assert_eq!(outcome, Attachment::Rejected);
        assert_eq!(set.owners_of(ElementId(1), &target()), 1);
    }

    #[test]
    fn disjoint_elements_get_separate_integrators() {
        let renderer = renderer(&[ElementId(0), ElementId(1)], 1.0);
        let config = PipelineConfig::default();
        let mut set = IntegratorSet::new();

        set.attach(modifier("left", CombineMode::Add, 1.0, &[ElementId(0)]), &renderer, &config);
        let outcome = set.attach(modifier("right", CombineMode::Add, 1.0, &[ElementId(1)]), &renderer, &config);
        assert_eq!(outcome, Attachment::Created);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn combination_follows_attachment_order() {
        let elements = [ElementId(0)];
        let mut renderer = renderer(&elements, 1.0);
        let config = PipelineConfig::default();
        let mut set = IntegratorSet::new();
        set.attach(modifier("add", CombineMode::Add, 2.0, &elements), &renderer, &config);
        set.attach(modifier("mul", CombineMode::Multiply, 3.0, &elements), &renderer, &config);

        set.update(&controllers(), &mut renderer, &config);
        assert_eq!(read(&renderer, ElementId(0)), 9.0);
    }

    #[test]
    fn replace_then_subtract() {
        let elements = [ElementId(0)];
        let mut renderer = renderer(&elements, 1.0);
        let config = PipelineConfig::default();
        let mut set = IntegratorSet::new();
        set.attach(modifier("set", CombineMode::Replace, 5.0, &elements), &renderer, &config);
        set.attach(modifier("sub", CombineMode::Subtract, 1.5, &elements), &renderer, &config);

        set.update(&controllers(), &mut renderer, &config);
        assert_eq!(read(&renderer, ElementId(0)), 3.5);
    }

    #[test]
    fn removing_every_modifier_restores_initial_values_exactly() {
        let elements = [ElementId(0), ElementId(1)];
        let initial = 0.123_456_79_f32;
        let mut renderer = renderer(&elements, initial);
        let config = PipelineConfig::default();
        let controllers = controllers();
        let mut set = IntegratorSet::new();

        for cycle in 0..25 {
            set.attach(modifier("a", CombineMode::Multiply, 1.7, &elements), &renderer, &config);
            set.attach(modifier("b", CombineMode::Add, 0.3, &elements), &renderer, &config);
            set.update(&controllers, &mut renderer, &config);
            assert_ne!(read(&renderer, ElementId(0)), initial, "cycle {cycle}");

            assert!(set.detach("a", &mut renderer).is_some());
            set.update(&controllers, &mut renderer, &config);
            assert!(set.detach("b", &mut renderer).is_some());
            assert!(set.is_empty());
            for element in elements {
                assert_eq!(read(&renderer, element).to_bits(), initial.to_bits());
            }
        }
    }

    #[test]
    fn unreadable_elements_are_excluded() {
        let renderer = renderer(&[ElementId(1)], 2.0);
        let config = PipelineConfig::default();
        let integrator = Integrator::<f32>::new(
            modifier("m", CombineMode::Add, 1.0, &[ElementId(0), ElementId(1)]).descriptor(),
            &renderer,
            &config,
        );
        assert_eq!(integrator.bound_elements().collect::<Vec<_>>(), vec![ElementId(1)]);
        assert_eq!(integrator.initial_values(), &[2.0]);
    }

    #[test]
    fn elementwise_output_lines_up_after_exclusion() {
        // Element 0 has no attribute, so element 1 must still get output[1].
        let mut renderer = renderer(&[ElementId(1)], 0.0);
        let config = PipelineConfig::default();
        let mut host = HostState::new();
        host.thrust_fractions = vec![0.25, 0.75];
        let mut controllers = ControllerSet::build(
            &[ControllerDef::new("thrust", "thrust")],
            &ControllerRegistry::default(),
            &host,
        );
        controllers.refresh(1.0, 1.0, &host);

        let def = ModifierDef::new(
            "per-nozzle",
            "thrust",
            "",
            ModifierKind::MaterialFloat {
                property: PROPERTY.into(),
                curve: FloatCurve::unit(),
            },
        );
        let mut set = IntegratorSet::new();
        set.attach(Modifier::<f32>::new(def, vec![ElementId(0), ElementId(1)]), &renderer, &config);
        set.update(&controllers, &mut renderer, &config);
        assert_eq!(read(&renderer, ElementId(1)), 0.75);
    }

    #[test]
    fn low_intensity_hides_instead_of_writing() {
        let elements = [ElementId(0)];
        let mut renderer = renderer(&elements, 1.0);
        let config = PipelineConfig::default();
        let mut set = IntegratorSet::new();
        set.attach(modifier("dim", CombineMode::Multiply, 0.001, &elements), &renderer, &config);

        let stats = set.update(&controllers(), &mut renderer, &config);
        assert_eq!(stats.culling, 1);
        assert_eq!(stats.culling_active, 0);
        assert!(!renderer.is_visible(ElementId(0), &target()));
        assert_eq!(read(&renderer, ElementId(0)), 1.0);

        set.detach("dim", &mut renderer);
        assert!(renderer.is_visible(ElementId(0), &target()));
    }

    #[test]
    fn culling_recovers_when_intensity_returns() {
        let elements = [ElementId(0)];
        let mut renderer = renderer(&elements, 1.0);
        let config = PipelineConfig::default();
        let host = HostState::new();
        let mut controllers = ControllerSet::build(
            &[ControllerDef::new("push", "push")],
            &ControllerRegistry::default(),
            &host,
        );
        let def = ModifierDef::new(
            "glow",
            "push",
            "",
            ModifierKind::MaterialFloat {
                property: PROPERTY.into(),
                curve: FloatCurve::unit(),
            },
        );
        let mut set = IntegratorSet::new();
        set.attach(Modifier::<f32>::new(def, elements.to_vec()), &renderer, &config);

        controllers.refresh(0.02, 0.02, &host);
        set.update(&controllers, &mut renderer, &config);
        assert!(!renderer.is_visible(ElementId(0), &target()));

        controllers.set_value("push", 0.6).unwrap();
        controllers.refresh(0.02, 0.04, &host);
        assert!(set.update(&controllers, &mut renderer, &config).culling_active == 1);
        assert!(renderer.is_visible(ElementId(0), &target()));
        assert_eq!(read(&renderer, ElementId(0)), 0.6);
    }

    #[test]
    fn colors_and_other_properties_never_cull() {
        let elements = [ElementId(0)];
        let light = AttributeTarget::Light {
            property: LightProperty::Range,
        };
        let mut renderer = MemoryRenderer::new();
        renderer.insert(ElementId(0), light.clone(), AttributeData::Float(5.0));
        let config = PipelineConfig::default();
        let def = ModifierDef::new(
            "range",
            "push",
            "",
            ModifierKind::LightFloat {
                property: LightProperty::Range,
                curve: FloatCurve::constant(0.0),
            },
        );
        let mut set = IntegratorSet::new();
        set.attach(Modifier::<f32>::new(def, elements.to_vec()), &renderer, &config);

        let stats = set.update(&controllers(), &mut renderer, &config);
        assert_eq!(stats.culling, 0);
        assert_eq!(stats.active, 1);
        assert!(renderer.is_visible(ElementId(0), &light));
    }

    #[test]
    fn missing_controller_leaves_initial_value() {
        let elements = [ElementId(0)];
        let mut renderer = renderer(&elements, 0.5);
        let config = PipelineConfig::default();
        let mut set = IntegratorSet::new();
        let def = ModifierDef {
            controller: "nobody".into(),
            ..modifier("orphan", CombineMode::Replace, 9.0, &elements).into_def()
        };
        set.attach(Modifier::<f32>::new(def, elements.to_vec()), &renderer, &config);
        set.update(&controllers(), &mut renderer, &config);
        assert_eq!(read(&renderer, ElementId(0)), 0.5);
    }
}
