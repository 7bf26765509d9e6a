//! Modifiers turn driver values into per-element attribute deltas.

use tracing::warn;

use crate::integrator::AttributeDescriptor;
use crate::{AttributeValue, CombineMode, ControllerSet, ElementId, FloatCurve, ModifierDef, SceneGraph};

const MAX_COMPONENTS: usize = 8;

/// A compiled [`ModifierDef`] producing values of type `T`.
///
/// The modifier only computes deltas; the owning integrator applies them with
/// the modifier's [`CombineMode`].
#[derive(Debug)]
pub struct Modifier<T: AttributeValue> {
    def: ModifierDef,
    curves: Vec<FloatCurve>,
    elements: Vec<ElementId>,
    output: Vec<T>,
    shape_warned: bool,
}

impl<T: AttributeValue> Modifier<T> {
    /// Builds a modifier for an explicit element list.
    pub fn new(def: ModifierDef, elements: Vec<ElementId>) -> Self {
        let mut curves: Vec<FloatCurve> = def.kind.curves().iter().map(FloatCurve::sorted).collect();
        curves.resize(T::COMPONENTS.min(MAX_COMPONENTS), FloatCurve::default());
        Self {
            def,
            curves,
            elements,
            output: Vec::new(),
            shape_warned: false,
        }
    }

    /// Builds a modifier whose elements are found by path under every root
    /// of the effect's model.
    pub fn init(def: ModifierDef, model: &SceneGraph) -> Self {
        let elements = model.find(&def.transform);
        if elements.is_empty() {
            warn!(modifier = %def.name, transform = %def.transform, "no element matches modifier transform");
        }
        Self::new(def, elements)
    }

    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn controller(&self) -> &str {
        &self.def.controller
    }

    pub fn combine(&self) -> CombineMode {
        self.def.combine
    }

    pub fn def(&self) -> &ModifierDef {
        &self.def
    }

    pub fn into_def(self) -> ModifierDef {
        self.def
    }

    pub fn elements(&self) -> &[ElementId] {
        &self.elements
    }

    pub fn descriptor(&self) -> AttributeDescriptor {
        AttributeDescriptor {
            target: self.def.kind.target(),
            kind: T::KIND,
            elements: self.elements.clone(),
        }
    }

    fn curve_value(&self, driver: f32) -> T {
        let mut components = [0.0_f32; MAX_COMPONENTS];
        for (slot, curve) in components.iter_mut().zip(&self.curves) {
            *slot = curve.evaluate(driver);
        }
        T::from_components(&components[..self.curves.len()])
    }

    /// Computes one delta per element.
    ///
    /// A single driver value is broadcast to every element; a driver per
    /// element is matched element-wise. Any other count is a configuration
    /// error and falls back to broadcasting the first value. `jitter` is
    /// added uniformly to every element.
    pub fn evaluate(&mut self, drivers: &[f32], jitter: Option<f32>) -> &[T] {
        let count = self.elements.len();
        let elementwise = drivers.len() == count && count > 1;
        if !elementwise && drivers.len() > 1 && !self.shape_warned {
            warn!(
                modifier = %self.def.name,
                drivers = drivers.len(),
                elements = count,
                "driver count does not match element count, broadcasting first value"
            );
            self.shape_warned = true;
        }

        let first = drivers.first().copied().unwrap_or(0.0);
        let jitter = jitter.map(T::splat);
        let mut output = std::mem::take(&mut self.output);
        output.clear();
        for index in 0..count {
            let driver = if elementwise { drivers[index] } else { first };
            let value = self.curve_value(driver);
            output.push(match jitter {
                Some(jitter) => value + jitter,
                None => value,
            });
        }
        self.output = output;
        &self.output
    }

    /// Reads this tick's controller values and evaluates. Returns `None` when
    /// the bound controller does not exist, leaving the modifier inert.
    pub fn sample(&mut self, controllers: &ControllerSet) -> Option<&[T]> {
        let drivers = controllers.get(&self.def.controller)?;
        // One randomness sample per modifier per tick, shared by all elements.
        let jitter = self.def.randomness.as_ref().map(|binding| {
            controllers
                .get(&binding.controller)
                .and_then(|values| values.first().copied())
                .unwrap_or(0.0)
                * binding.scale
        });
        Some(self.evaluate(drivers, jitter))
    }
}
