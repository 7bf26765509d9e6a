//! Core library for the plumefx engine effect pipeline.
//!
//! Controllers turn host state into driver values, modifiers map those values
//! through curves into per-element deltas, and integrators resolve every
//! modifier aimed at the same attribute into one write per tick. Each module
//! owns one stage of that pipeline; [`Effect`] ties them together.

pub mod config;
pub mod controller;
pub mod curve;
pub mod effect;
pub mod error;
pub mod host;
pub mod integrator;
pub mod modifier;
pub mod render;
pub mod scene;
pub mod timeline;
pub mod value;

pub use config::{
    ColorCurves, ControllerDef, EffectDefinition, ModifierDecl, ModifierDef, ModifierKind,
    PipelineConfig, RandomnessBinding,
};
pub use controller::{
    Controller, ControllerInput, ControllerRegistry, ControllerSet, EngineEvent, NoiseSettings,
    ResponseRates,
};
pub use curve::{CurveKey, FloatCurve, Interp};
pub use effect::{Effect, EffectState, TickReport};
pub use error::{PlumeError, Result};
pub use host::{Host, HostState, MemberId};
pub use integrator::{
    Attachment, AttributeDescriptor, AttributeOwner, Integrator, IntegratorSet, IntegratorStats,
};
pub use modifier::Modifier;
pub use render::{AttributeTarget, LightProperty, MemoryRenderer, RenderBackend, TransformChannel};
pub use scene::{ElementId, NodeDef, SceneGraph};
pub use timeline::TickClock;
pub use value::{AttributeData, AttributeValue, CombineMode, DualColor, DualFloat, Rgba, ValueKind};
