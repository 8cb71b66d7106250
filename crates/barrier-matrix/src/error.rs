use thiserror::Error;

use crate::{ResourceKind, Stage};

///Reasons a `(resource, writer, reader, barrier)` tuple is not a valid test case.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaseError {
    #[error("Neither {writer} nor {reader} is a ray tracing stage")]
    NoRayTracingStage { writer: Stage, reader: Stage },
    #[error("Storage images can't be accessed by the host ({writer} -> {reader})")]
    HostImageAccess { writer: Stage, reader: Stage },
    #[error("Uniform buffers can't be written by {0}")]
    UniformWriter(Stage),
    #[error("Host to host transfer has no device work to synchronize")]
    HostToHost,
    #[error("Could not parse case path {0:?}")]
    InvalidPath(String),
    #[error("Invalid case filter {pattern:?}: {reason}")]
    InvalidFilter { pattern: String, reason: String },
}

///Errors of the shader generator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShaderGenError {
    #[error("{0} does not execute shader code")]
    NotAShaderStage(Stage),
    #[error("Can't access {resource} from {stage}")]
    UnsupportedAccess { resource: ResourceKind, stage: Stage },
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn assure_send_sync() {
        assert_impl_all!(CaseError: Send, Sync);
        assert_impl_all!(ShaderGenError: Send, Sync);
    }
}
