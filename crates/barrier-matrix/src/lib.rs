//! # Barrier matrix
//!
//! Device independent model of the ray tracing barrier tests. A case moves [BUFFER_ELEMENTS](data::BUFFER_ELEMENTS)
//! values from a *writer* [Stage] to a *reader* [Stage] through a [ResourceKind], separated by exactly one barrier of a
//! given [BarrierType].
//!
//! This crate knows
//! - the property tables of every stage (pipeline stage, access masks, layouts, shader stages),
//! - which tuples form valid cases and how they are named ([CaseTree]),
//! - which barriers a case records ([BarrierPlan]),
//! - the shaders each side runs ([CasePrograms]),
//! - the value layout and host side verification ([data]).
//!
//! Executing a case on a device is up to the `barrier-cts` crate.

mod case;
pub use case::{
    BarrierGroup, CaseFilter, CaseTree, EnumeratorConfig, ResourceGroup, TestCase, ROOT_GROUP,
};

///Buffer layouts, expected values and verification.
pub mod data;

mod error;
pub use error::{CaseError, ShaderGenError};

mod plan;
pub use plan::{AccessScope, BarrierPlan, BarrierScope};

///GLSL generation for writer and reader shaders.
pub mod shader;
pub use shader::{CasePrograms, Role, ShaderKind, ShaderSource, StagePrograms};

mod stage;
pub use stage::{BarrierType, PipelineKind, ResourceKind, Stage};
