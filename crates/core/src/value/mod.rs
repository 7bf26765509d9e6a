//! Attribute value types and the arithmetic integrators combine them with.

use std::fmt::Debug;
use std::ops::{Add, Mul, Sub};

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::integrator::{Integrator, IntegratorSet};

/// Linear RGBA color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    pub const fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    fn zip(self, other: Self, f: impl Fn(f32, f32) -> f32) -> Self {
        Self::new(
            f(self.r, other.r),
            f(self.g, other.g),
            f(self.b, other.b),
            f(self.a, other.a),
        )
    }
}

/// Min/max pair used by particle-system numeric fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DualFloat {
    pub min: f32,
    pub max: f32,
}

impl DualFloat {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }
}

/// Min/max color pair used by particle-system color fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DualColor {
    pub min: Rgba,
    pub max: Rgba,
}

impl DualColor {
    pub const fn new(min: Rgba, max: Rgba) -> Self {
        Self { min, max }
    }
}

macro_rules! impl_ops {
    ($ty:ty, $op_trait:ident, $op_fn:ident, $op:tt) => {
        impl $op_trait for $ty {
            type Output = Self;

            fn $op_fn(self, rhs: Self) -> Self {
                self.zip(rhs, |a, b| a $op b)
            }
        }
    };
}

impl DualFloat {
    fn zip(self, other: Self, f: impl Fn(f32, f32) -> f32) -> Self {
        Self::new(f(self.min, other.min), f(self.max, other.max))
    }
}

impl DualColor {
    fn zip(self, other: Self, f: impl Fn(f32, f32) -> f32) -> Self {
        Self::new(self.min.zip(other.min, &f), self.max.zip(other.max, &f))
    }
}

impl_ops!(Rgba, Add, add, +);
impl_ops!(Rgba, Sub, sub, -);
impl_ops!(Rgba, Mul, mul, *);
impl_ops!(DualFloat, Add, add, +);
impl_ops!(DualFloat, Sub, sub, -);
impl_ops!(DualFloat, Mul, mul, *);
impl_ops!(DualColor, Add, add, +);
impl_ops!(DualColor, Sub, sub, -);
impl_ops!(DualColor, Mul, mul, *);

/// Discriminant for the attribute value types the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Float,
    Vector2,
    Vector3,
    Color,
    DualFloat,
    DualColor,
}

/// Type-erased attribute value exchanged with render bindings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeData {
    Float(f32),
    Vector2(Vec2),
    Vector3(Vec3),
    Color(Rgba),
    DualFloat(DualFloat),
    DualColor(DualColor),
}

impl AttributeData {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Float(_) => ValueKind::Float,
            Self::Vector2(_) => ValueKind::Vector2,
            Self::Vector3(_) => ValueKind::Vector3,
            Self::Color(_) => ValueKind::Color,
            Self::DualFloat(_) => ValueKind::DualFloat,
            Self::DualColor(_) => ValueKind::DualColor,
        }
    }
}

/// How a modifier's output merges into the integrator's running value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineMode {
    #[default]
    Replace,
    Add,
    Subtract,
    Multiply,
}

impl CombineMode {
    pub fn apply<T: AttributeValue>(self, current: T, delta: T) -> T {
        match self {
            Self::Replace => delta,
            Self::Add => current + delta,
            Self::Subtract => current - delta,
            Self::Multiply => current * delta,
        }
    }
}

/// A value an [`Integrator`] can own and resolve.
///
/// Each implementor is built from a fixed number of curve components and
/// converts to and from [`AttributeData`] for the render bindings.
pub trait AttributeValue:
    Copy + Debug + PartialEq + Add<Output = Self> + Sub<Output = Self> + Mul<Output = Self> + 'static
{
    const KIND: ValueKind;
    /// Number of scalar curves a modifier needs to produce one value.
    const COMPONENTS: usize;

    /// Builds a value from curve outputs; missing components read as zero.
    fn from_components(components: &[f32]) -> Self;

    /// Value with every component set to `v`.
    fn splat(v: f32) -> Self;

    /// Magnitude used by visibility culling. `None` opts the kind out.
    fn intensity(&self) -> Option<f32> {
        None
    }

    fn from_data(data: AttributeData) -> Option<Self>;

    fn into_data(self) -> AttributeData;

    /// The integrators of this kind inside a set.
    fn integrators(set: &mut IntegratorSet) -> &mut Vec<Integrator<Self>>;
}

fn component(components: &[f32], index: usize) -> f32 {
    components.get(index).copied().unwrap_or(0.0)
}

impl AttributeValue for f32 {
    const KIND: ValueKind = ValueKind::Float;
    const COMPONENTS: usize = 1;

    fn from_components(components: &[f32]) -> Self {
        component(components, 0)
    }

    fn splat(v: f32) -> Self {
        v
    }

    fn intensity(&self) -> Option<f32> {
        Some(self.abs())
    }

    fn from_data(data: AttributeData) -> Option<Self> {
        match data {
            AttributeData::Float(v) => Some(v),
            _ => None,
        }
    }

    fn into_data(self) -> AttributeData {
        AttributeData::Float(self)
    }

    fn integrators(set: &mut IntegratorSet) -> &mut Vec<Integrator<Self>> {
        &mut set.floats
    }
}

impl AttributeValue for Vec2 {
    const KIND: ValueKind = ValueKind::Vector2;
    const COMPONENTS: usize = 2;

    fn from_components(components: &[f32]) -> Self {
        Vec2::new(component(components, 0), component(components, 1))
    }

    fn splat(v: f32) -> Self {
        Vec2::splat(v)
    }

    fn from_data(data: AttributeData) -> Option<Self> {
        match data {
            AttributeData::Vector2(v) => Some(v),
            _ => None,
        }
    }

    fn into_data(self) -> AttributeData {
        AttributeData::Vector2(self)
    }

    fn integrators(set: &mut IntegratorSet) -> &mut Vec<Integrator<Self>> {
        &mut set.vector2s
    }
}

impl AttributeValue for Vec3 {
    const KIND: ValueKind = ValueKind::Vector3;
    const COMPONENTS: usize = 3;

    fn from_components(components: &[f32]) -> Self {
        Vec3::new(
            component(components, 0),
            component(components, 1),
            component(components, 2),
        )
    }

    fn splat(v: f32) -> Self {
        Vec3::splat(v)
    }

    fn from_data(data: AttributeData) -> Option<Self> {
        match data {
            AttributeData::Vector3(v) => Some(v),
            _ => None,
        }
    }

    fn into_data(self) -> AttributeData {
        AttributeData::Vector3(self)
    }

    fn integrators(set: &mut IntegratorSet) -> &mut Vec<Integrator<Self>> {
        &mut set.vector3s
    }
}

impl AttributeValue for Rgba {
    const KIND: ValueKind = ValueKind::Color;
    const COMPONENTS: usize = 4;

    fn from_components(components: &[f32]) -> Self {
        Rgba::new(
            component(components, 0),
            component(components, 1),
            component(components, 2),
            component(components, 3),
        )
    }

    fn splat(v: f32) -> Self {
        Rgba::new(v, v, v, v)
    }

    fn from_data(data: AttributeData) -> Option<Self> {
        match data {
            AttributeData::Color(v) => Some(v),
            _ => None,
        }
    }

    fn into_data(self) -> AttributeData {
        AttributeData::Color(self)
    }

    fn integrators(set: &mut IntegratorSet) -> &mut Vec<Integrator<Self>> {
        &mut set.colors
    }
}

impl AttributeValue for DualFloat {
    const KIND: ValueKind = ValueKind::DualFloat;
    const COMPONENTS: usize = 2;

    fn from_components(components: &[f32]) -> Self {
        DualFloat::new(component(components, 0), component(components, 1))
    }

    fn splat(v: f32) -> Self {
        DualFloat::new(v, v)
    }

    fn from_data(data: AttributeData) -> Option<Self> {
        match data {
            AttributeData::DualFloat(v) => Some(v),
            _ => None,
        }
    }

    fn into_data(self) -> AttributeData {
        AttributeData::DualFloat(self)
    }

    fn integrators(set: &mut IntegratorSet) -> &mut Vec<Integrator<Self>> {
        &mut set.dual_floats
    }
}

impl AttributeValue for DualColor {
    const KIND: ValueKind = ValueKind::DualColor;
    const COMPONENTS: usize = 8;

    /// Components are min RGBA followed by max RGBA.
    fn from_components(components: &[f32]) -> Self {
        let max = components.get(4..).unwrap_or(&[]);
        DualColor::new(Rgba::from_components(components), Rgba::from_components(max))
    }

    fn splat(v: f32) -> Self {
        DualColor::new(Rgba::splat(v), Rgba::splat(v))
    }

    fn from_data(data: AttributeData) -> Option<Self> {
        match data {
            AttributeData::DualColor(v) => Some(v),
            _ => None,
        }
    }

    fn into_data(self) -> AttributeData {
        AttributeData::DualColor(self)
    }

    fn integrators(set: &mut IntegratorSet) -> &mut Vec<Integrator<Self>> {
        &mut set.dual_colors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_modes_follow_arithmetic() {
        assert_eq!(CombineMode::Replace.apply(3.0_f32, 5.0), 5.0);
        assert_eq!(CombineMode::Add.apply(3.0_f32, 5.0), 8.0);
        assert_eq!(CombineMode::Subtract.apply(3.0_f32, 5.0), -2.0);
        assert_eq!(CombineMode::Multiply.apply(3.0_f32, 5.0), 15.0);
    }

    #[test]
    fn color_ops_are_componentwise() {
        let a = Rgba::new(1.0, 2.0, 3.0, 4.0);
        let b = Rgba::new(2.0, 2.0, 2.0, 0.5);
        assert_eq!(a * b, Rgba::new(2.0, 4.0, 6.0, 2.0));
        assert_eq!(a - b, Rgba::new(-1.0, 0.0, 1.0, 3.5));
    }

    #[test]
    fn dual_color_splits_components() {
        let value = DualColor::from_components(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        assert_eq!(value.min, Rgba::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(value.max, Rgba::new(5.0, 6.0, 7.0, 8.0));
    }

    #[test]
    fn short_component_lists_pad_with_zero() {
        assert_eq!(Vec3::from_components(&[1.0]), Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(DualColor::from_components(&[1.0]).max, Rgba::default());
    }

    #[test]
    fn only_scalars_report_intensity() {
        assert_eq!((-0.5_f32).intensity(), Some(0.5));
        assert_eq!(Rgba::WHITE.intensity(), None);
        assert_eq!(Vec2::ONE.intensity(), None);
    }

    #[test]
    fn data_conversion_rejects_other_kinds() {
        assert_eq!(f32::from_data(AttributeData::Vector2(Vec2::ONE)), None);
        let data = Rgba::WHITE.into_data();
        assert_eq!(data.kind(), ValueKind::Color);
        assert_eq!(Rgba::from_data(data), Some(Rgba::WHITE));
    }
}
