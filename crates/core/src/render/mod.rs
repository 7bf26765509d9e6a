//! Contract between integrators and whatever actually draws the effect.

use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AttributeData, ElementId, PipelineConfig};

/// Light properties a modifier can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightProperty {
    Intensity,
    Range,
    SpotAngle,
    Color,
}

/// Transform channels a modifier can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformChannel {
    Position,
    /// Euler angles in degrees.
    Rotation,
    Scale,
}

/// The property of an element an integrator writes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "binding", rename_all = "snake_case")]
pub enum AttributeTarget {
    Material { property: String },
    Light { property: LightProperty },
    Transform { channel: TransformChannel },
    Particle { property: String },
}

impl AttributeTarget {
    pub fn material(property: impl Into<String>) -> Self {
        Self::Material {
            property: property.into(),
        }
    }

    pub fn particle(property: impl Into<String>) -> Self {
        Self::Particle {
            property: property.into(),
        }
    }

    /// Whether elements may be hidden instead of written when their resolved
    /// intensity drops below the configured threshold.
    ///
    /// Transforms, colors and particle fields are never culled.
    pub fn supports_culling(&self, config: &PipelineConfig) -> bool {
        match self {
            Self::Material { property } => config
                .intensity_properties
                .iter()
                .any(|candidate| candidate == property),
            Self::Light {
                property: LightProperty::Intensity,
            } => config.cull_lights,
            _ => false,
        }
    }
}

impl fmt::Display for AttributeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Material { property } => write!(f, "material.{property}"),
            Self::Light { property } => write!(f, "light.{property:?}"),
            Self::Transform { channel } => write!(f, "transform.{channel:?}"),
            Self::Particle { property } => write!(f, "particle.{property}"),
        }
    }
}

/// Typed get/set endpoints for renderable elements.
///
/// The pipeline never depends on a specific rendering API; hosts implement
/// this for their material, light and particle adapters.
pub trait RenderBackend {
    /// Current live value, or `None` if the element has no such attribute.
    fn read(&self, element: ElementId, target: &AttributeTarget) -> Option<AttributeData>;

    fn write(&mut self, element: ElementId, target: &AttributeTarget, value: AttributeData);

    /// Enables or disables the renderable output that `target` belongs to.
    fn set_visible(&mut self, element: ElementId, target: &AttributeTarget, visible: bool);

    /// Effect-wide visibility toggle. Backends without one ignore it.
    fn set_effect_visible(&mut self, _visible: bool) {}
}

/// In-memory render backend. Keeps attribute values in a map so effects can
/// run headless in tests and in the command line tool.
#[derive(Debug, Default)]
pub struct MemoryRenderer {
    attributes: HashMap<(ElementId, AttributeTarget), AttributeData>,
    hidden: HashSet<(ElementId, AttributeTarget)>,
    effect_visible: bool,
    writes: usize,
}

impl MemoryRenderer {
    pub fn new() -> Self {
        Self {
            attributes: HashMap::new(),
            hidden: HashSet::new(),
            effect_visible: true,
            writes: 0,
        }
    }

    /// Registers an attribute so integrators can capture its initial value.
    pub fn insert(&mut self, element: ElementId, target: AttributeTarget, value: AttributeData) {
        self.attributes.insert((element, target), value);
    }

    pub fn get(&self, element: ElementId, target: &AttributeTarget) -> Option<AttributeData> {
        self.attributes.get(&(element, target.clone())).copied()
    }

    pub fn is_visible(&self, element: ElementId, target: &AttributeTarget) -> bool {
        !self.hidden.contains(&(element, target.clone()))
    }

    pub fn effect_visible(&self) -> bool {
        self.effect_visible
    }

    /// Number of writes performed since construction.
    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&ElementId, &AttributeTarget, &AttributeData)> {
        self.attributes
            .iter()
            .map(|((element, target), value)| (element, target, value))
    }
}

impl RenderBackend for MemoryRenderer {
    fn read(&self, element: ElementId, target: &AttributeTarget) -> Option<AttributeData> {
        self.get(element, target)
    }

    fn write(&mut self, element: ElementId, target: &AttributeTarget, value: AttributeData) {
        self.writes += 1;
        self.attributes.insert((element, target.clone()), value);
    }

    fn set_visible(&mut self, element: ElementId, target: &AttributeTarget, visible: bool) {
        let key = (element, target.clone());
        if visible {
            self.hidden.remove(&key);
        } else {
            self.hidden.insert(key);
        }
    }

    fn set_effect_visible(&mut self, visible: bool) {
        self.effect_visible = visible;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn culling_is_opt_in_per_target() {
        let config = PipelineConfig::default();
        assert!(AttributeTarget::material("_Intensity").supports_culling(&config));
        assert!(!AttributeTarget::material("_Falloff").supports_culling(&config));
        assert!(AttributeTarget::Light {
            property: LightProperty::Intensity
        }
        .supports_culling(&config));
        assert!(!AttributeTarget::Light {
            property: LightProperty::Color
        }
        .supports_culling(&config));
        assert!(!AttributeTarget::Transform {
            channel: TransformChannel::Scale
        }
        .supports_culling(&config));
    }

    #[test]
    fn memory_renderer_tracks_writes_and_visibility() {
        let mut renderer = MemoryRenderer::new();
        let element = ElementId(3);
        let target = AttributeTarget::material("_Intensity");
        renderer.insert(element, target.clone(), AttributeData::Float(1.0));

        renderer.write(element, &target, AttributeData::Float(0.5));
        renderer.set_visible(element, &target, false);

        assert_eq!(renderer.read(element, &target), Some(AttributeData::Float(0.5)));
        assert!(!renderer.is_visible(element, &target));
        assert_eq!(renderer.writes(), 1);

        renderer.set_visible(element, &target, true);
        assert!(renderer.is_visible(element, &target));
    }
}
