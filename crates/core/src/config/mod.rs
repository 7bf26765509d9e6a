//! Declarations effects are built from, plus pipeline-wide settings.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::{
    AttributeTarget, CombineMode, FloatCurve, LightProperty, PlumeError, Result,
    TransformChannel, ValueKind,
};

/// Pipeline-wide settings shared by every effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Resolved intensities below this hide the element instead of writing.
    pub min_intensity: f32,
    /// Material float properties eligible for visibility culling.
    pub intensity_properties: Vec<String>,
    /// Whether light intensity is eligible for visibility culling.
    pub cull_lights: bool,
    /// Hide the whole effect while every cull-capable integrator is inactive.
    pub hide_when_idle: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_intensity: 0.01,
            intensity_properties: vec!["_Intensity".to_string(), "_Brightness".to_string()],
            cull_lights: true,
            hide_when_idle: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

/// Declaration of a controller: a type tag plus whatever fields that type
/// understands. Fields are interpreted by the factory registered for the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ControllerDef {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field setter. Values that fail to serialize are skipped.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        if let Ok(mut value) = serde_json::to_value(value) {
            narrow_floats(&mut value);
            self.fields.insert(key.to_string(), value);
        }
        self
    }
}

/// Rewrites numbers that hold an exact `f32` with that float's shortest
/// decimal form. `serde_json::to_value` widens `f32` fields to `f64`, which
/// would turn a declared `0.4` into `0.4000000059604645`.
pub(crate) fn narrow_floats(value: &mut Value) {
    match value {
        Value::Number(number) if number.is_f64() => {
            let Some(wide) = number.as_f64() else { return };
            let narrow = wide as f32;
            if f64::from(narrow) != wide {
                return;
            }
            if let Some(shortest) = format!("{narrow}")
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
            {
                *number = shortest;
            }
        }
        Value::Array(items) => items.iter_mut().for_each(narrow_floats),
        Value::Object(fields) => fields.values_mut().for_each(narrow_floats),
        _ => {}
    }
}

/// Four curves producing an RGBA color.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorCurves {
    #[serde(default)]
    pub r: FloatCurve,
    #[serde(default)]
    pub g: FloatCurve,
    #[serde(default)]
    pub b: FloatCurve,
    #[serde(default)]
    pub a: FloatCurve,
}

impl ColorCurves {
    pub fn uniform(curve: FloatCurve) -> Self {
        Self {
            r: curve.clone(),
            g: curve.clone(),
            b: curve.clone(),
            a: curve,
        }
    }

    fn components(&self) -> [FloatCurve; 4] {
        [
            self.r.clone(),
            self.g.clone(),
            self.b.clone(),
            self.a.clone(),
        ]
    }
}

/// Which attribute a modifier drives and the curves it drives it with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ModifierKind {
    MaterialFloat {
        property: String,
        curve: FloatCurve,
    },
    MaterialVector2 {
        property: String,
        x: FloatCurve,
        y: FloatCurve,
    },
    MaterialColor {
        property: String,
        color: ColorCurves,
    },
    LightFloat {
        property: LightProperty,
        curve: FloatCurve,
    },
    LightColor {
        color: ColorCurves,
    },
    Transform {
        channel: TransformChannel,
        x: FloatCurve,
        y: FloatCurve,
        z: FloatCurve,
    },
    ParticleFloat {
        property: String,
        min: FloatCurve,
        max: FloatCurve,
    },
    ParticleColor {
        property: String,
        min: ColorCurves,
        max: ColorCurves,
    },
}

impl ModifierKind {
    pub fn target(&self) -> AttributeTarget {
        match self {
            Self::MaterialFloat { property, .. }
            | Self::MaterialVector2 { property, .. }
            | Self::MaterialColor { property, .. } => AttributeTarget::material(property.clone()),
            Self::LightFloat { property, .. } => AttributeTarget::Light {
                property: *property,
            },
            Self::LightColor { .. } => AttributeTarget::Light {
                property: LightProperty::Color,
            },
            Self::Transform { channel, .. } => AttributeTarget::Transform { channel: *channel },
            Self::ParticleFloat { property, .. } | Self::ParticleColor { property, .. } => {
                AttributeTarget::particle(property.clone())
            }
        }
    }

    pub fn value_kind(&self) -> ValueKind {
        match self {
            Self::MaterialFloat { .. } | Self::LightFloat { .. } => ValueKind::Float,
            Self::MaterialVector2 { .. } => ValueKind::Vector2,
            Self::Transform { .. } => ValueKind::Vector3,
            Self::MaterialColor { .. } | Self::LightColor { .. } => ValueKind::Color,
            Self::ParticleFloat { .. } => ValueKind::DualFloat,
            Self::ParticleColor { .. } => ValueKind::DualColor,
        }
    }

    /// Curves in value component order.
    pub fn curves(&self) -> Vec<FloatCurve> {
        match self {
            Self::MaterialFloat { curve, .. } | Self::LightFloat { curve, .. } => {
                vec![curve.clone()]
            }
            Self::MaterialVector2 { x, y, .. } => vec![x.clone(), y.clone()],
            Self::MaterialColor { color, .. } | Self::LightColor { color } => {
                color.components().to_vec()
            }
            Self::Transform { x, y, z, .. } => vec![x.clone(), y.clone(), z.clone()],
            Self::ParticleFloat { min, max, .. } => vec![min.clone(), max.clone()],
            Self::ParticleColor { min, max, .. } => {
                let mut curves = min.components().to_vec();
                curves.extend(max.components());
                curves
            }
        }
    }
}

/// Optional jitter source for a modifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomnessBinding {
    pub controller: String,
    #[serde(default = "default_scale")]
    pub scale: f32,
}

fn default_scale() -> f32 {
    1.0
}

/// Declaration of a modifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModifierDef {
    pub name: String,
    pub controller: String,
    /// Path of the target element relative to each effect root.
    #[serde(default)]
    pub transform: String,
    #[serde(default)]
    pub combine: CombineMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub randomness: Option<RandomnessBinding>,
    #[serde(flatten)]
    pub kind: ModifierKind,
}

impl ModifierDef {
    pub fn new(
        name: impl Into<String>,
        controller: impl Into<String>,
        transform: impl Into<String>,
        kind: ModifierKind,
    ) -> Self {
        Self {
            name: name.into(),
            controller: controller.into(),
            transform: transform.into(),
            combine: CombineMode::default(),
            randomness: None,
            kind,
        }
    }

    pub fn combine(mut self, combine: CombineMode) -> Self {
        self.combine = combine;
        self
    }

    pub fn with_randomness(mut self, controller: impl Into<String>, scale: f32) -> Self {
        self.randomness = Some(RandomnessBinding {
            controller: controller.into(),
            scale,
        });
        self
    }
}

/// One entry of an effect's modifier list.
///
/// Entries are parsed one at a time. An entry that does not parse (unknown
/// type, combine mode or interpolation, missing fields) is kept verbatim as
/// [`ModifierDecl::Invalid`]: it never attaches and saves back unchanged,
/// while the rest of the effect loads normally.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ModifierDecl {
    Valid(ModifierDef),
    Invalid(Value),
}

impl ModifierDecl {
    pub fn parse(raw: Value) -> Self {
        match serde_json::from_value::<ModifierDef>(raw.clone()) {
            Ok(def) => Self::Valid(def),
            Err(err) => {
                let decl = Self::Invalid(raw);
                warn!(
                    modifier = decl.name().unwrap_or("<unnamed>"),
                    error = %err,
                    "modifier declaration does not parse, leaving it inert"
                );
                decl
            }
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Valid(def) => Some(&def.name),
            Self::Invalid(raw) => raw.get("name").and_then(Value::as_str),
        }
    }

    pub fn as_def(&self) -> Option<&ModifierDef> {
        match self {
            Self::Valid(def) => Some(def),
            Self::Invalid(_) => None,
        }
    }
}

impl From<ModifierDef> for ModifierDecl {
    fn from(def: ModifierDef) -> Self {
        Self::Valid(def)
    }
}

impl<'de> Deserialize<'de> for ModifierDecl {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::parse)
    }
}

/// Full declaration of one effect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectDefinition {
    pub name: String,
    #[serde(default)]
    pub controllers: Vec<ControllerDef>,
    #[serde(default)]
    pub modifiers: Vec<ModifierDecl>,
}

impl EffectDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let definition: Self = serde_json::from_str(json)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Rejects duplicate controller or modifier names.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for controller in &self.controllers {
            if !seen.insert(controller.name.as_str()) {
                return Err(PlumeError::DuplicateName {
                    kind: "controller",
                    name: controller.name.clone(),
                });
            }
        }

        seen.clear();
        for name in self.modifiers.iter().filter_map(ModifierDecl::name) {
            if !seen.insert(name) {
                return Err(PlumeError::DuplicateName {
                    kind: "modifier",
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLUME: &str = r#"{
        "name": "plume",
        "controllers": [
            { "name": "throttle", "type": "throttle", "response_rate_up": 2.0 },
            { "name": "jitter", "type": "random", "noise": { "mode": "uniform", "min": -1.0, "max": 1.0 } }
        ],
        "modifiers": [
            {
                "name": "core-glow",
                "controller": "throttle",
                "transform": "nozzle/plume",
                "combine": "multiply",
                "randomness": { "controller": "jitter", "scale": 0.1 },
                "type": "material_float",
                "property": "_Intensity",
                "curve": { "keys": [ { "time": 0.0, "value": 0.0 }, { "time": 1.0, "value": 2.0 } ] }
            }
        ]
    }"#;

    #[test]
    fn parses_tagged_declarations() {
        let definition = EffectDefinition::from_json_str(PLUME).unwrap();
        assert_eq!(definition.controllers[0].kind, "throttle");
        assert_eq!(
            definition.controllers[0].fields.get("response_rate_up"),
            Some(&Value::from(2.0))
        );

        let modifier = definition.modifiers[0].as_def().unwrap();
        assert_eq!(modifier.combine, CombineMode::Multiply);
        assert_eq!(modifier.kind.target(), AttributeTarget::material("_Intensity"));
        assert_eq!(modifier.kind.value_kind(), ValueKind::Float);
    }

    #[test]
    fn load_save_load_is_value_identical() {
        let first = EffectDefinition::from_json_str(PLUME).unwrap();
        let saved = first.to_json_string().unwrap();
        let second = EffectDefinition::from_json_str(&saved).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn unparseable_modifier_is_kept_verbatim_and_the_rest_loads() {
        let json = r#"{
            "name": "plume",
            "modifiers": [
                { "name": "good", "controller": "throttle", "type": "material_float",
                  "property": "_Intensity", "curve": { "keys": [] } },
                { "name": "divide", "controller": "throttle", "combine": "divide",
                  "type": "material_float", "property": "_Intensity", "curve": { "keys": [] } },
                { "name": "warp", "controller": "throttle", "type": "warp_field", "flux": 0.4 },
                { "name": "stepped", "controller": "throttle", "type": "material_float",
                  "property": "_Glow", "curve": { "keys": [], "interp": "bouncy" } }
            ]
        }"#;
        let definition = EffectDefinition::from_json_str(json).unwrap();
        assert_eq!(definition.modifiers.len(), 4);
        assert!(definition.modifiers[0].as_def().is_some());
        for decl in &definition.modifiers[1..] {
            assert!(matches!(decl, ModifierDecl::Invalid(_)));
        }
        assert_eq!(definition.modifiers[2].name(), Some("warp"));

        let saved: Value = serde_json::from_str(&definition.to_json_string().unwrap()).unwrap();
        let original: Value = serde_json::from_str(json).unwrap();
        assert_eq!(saved["modifiers"][1], original["modifiers"][1]);
        assert_eq!(saved["modifiers"][2], original["modifiers"][2]);
        assert_eq!(saved["modifiers"][3], original["modifiers"][3]);
    }

    #[test]
    fn duplicate_names_count_invalid_entries() {
        let mut definition = EffectDefinition::new("dup");
        definition.modifiers.push(ModifierDecl::parse(serde_json::json!({ "name": "a", "type": "nope" })));
        definition.modifiers.push(ModifierDecl::parse(serde_json::json!({ "name": "a", "type": "nope" })));
        assert!(matches!(
            definition.validate(),
            Err(PlumeError::DuplicateName { kind: "modifier", .. })
        ));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut definition = EffectDefinition::new("dup");
        definition.controllers.push(ControllerDef::new("a", "throttle"));
        definition.controllers.push(ControllerDef::new("a", "engine_on"));

        let err = definition.validate().unwrap_err();
        assert!(format!("{err}").contains("`a`"));
    }

    #[test]
    fn particle_color_curves_are_min_then_max() {
        let kind = ModifierKind::ParticleColor {
            property: "start_color".into(),
            min: ColorCurves::uniform(FloatCurve::constant(1.0)),
            max: ColorCurves::uniform(FloatCurve::constant(2.0)),
        };
        let curves = kind.curves();
        assert_eq!(curves.len(), 8);
        assert_eq!(curves[3].evaluate(0.0), 1.0);
        assert_eq!(curves[4].evaluate(0.0), 2.0);
    }

    #[test]
    fn pipeline_config_fills_defaults() {
        let config = PipelineConfig::from_json_str(r#"{ "min_intensity": 0.2 }"#).unwrap();
        assert_eq!(config.min_intensity, 0.2);
        assert!(config.cull_lights);
        assert_eq!(config.intensity_properties.len(), 2);
    }
}
