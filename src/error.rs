//! Comprehensive error handling for Ember Engine
//!
//! This module provides the unified error type for the render-node pipeline.
//! Capacity violations are programming/content errors and carry the violated
//! table, its limit and the requested count so the offending scene content
//! can be identified from the message alone.

use std::error::Error as StdError;
use std::fmt;

/// Main error type for Ember Engine
#[derive(Debug)]
pub enum EngineError {
    // Node table errors
    CapacityExceeded {
        table: &'static str,
        limit: u32,
        requested: u32,
    },
    NodeNotFound {
        node: u32,
    },

    // Pipeline errors
    InvalidPipelineId {
        id: u16,
        max: u32,
    },
    PipelineNotPrepared {
        flags_hash: u64,
    },

    // GPU errors
    DeviceNotFound,
    DescriptorAllocationFailed {
        shape: String,
        error: String,
    },
    GpuOperationFailed {
        operation: String,
        error: String,
    },

    // Scene errors
    ResourceNotFound {
        resource_type: String,
        id: String,
    },
    StateError {
        expected: String,
        actual: String,
    },

    // Generic fallback for unexpected errors
    Internal {
        message: String,
    },
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::CapacityExceeded {
                table,
                limit,
                requested,
            } => write!(
                f,
                "Capacity exceeded for {}: requested {} (limit {})",
                table, requested, limit
            ),
            EngineError::NodeNotFound { node } => write!(f, "Render node not found: {}", node),

            EngineError::InvalidPipelineId { id, max } => {
                write!(f, "Invalid pipeline id {} (max {})", id, max)
            }
            EngineError::PipelineNotPrepared { flags_hash } => {
                write!(f, "No pipeline prepared for flags hash {:#x}", flags_hash)
            }

            EngineError::DeviceNotFound => write!(f, "GPU device not found"),
            EngineError::DescriptorAllocationFailed { shape, error } => {
                write!(f, "Descriptor allocation failed for {}: {}", shape, error)
            }
            EngineError::GpuOperationFailed { operation, error } => {
                write!(f, "GPU operation '{}' failed: {}", operation, error)
            }

            EngineError::ResourceNotFound { resource_type, id } => {
                write!(f, "Resource not found: {} '{}'", resource_type, id)
            }
            EngineError::StateError { expected, actual } => {
                write!(f, "State error: expected {}, actual {}", expected, actual)
            }

            EngineError::Internal { message } => write!(f, "Internal error: {}", message),
        }
    }
}

impl StdError for EngineError {}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// How a fixed-capacity table reacts to a bounds violation.
///
/// Chosen once when a table is constructed. `Panic` is the
/// content-authoring default: the bounds are engineering limits and
/// exceeding one means the scene must be fixed, not handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapacityPolicy {
    #[default]
    Panic,
    Error,
}

impl CapacityPolicy {
    /// Produce the violation error, panicking first if the policy says so.
    pub(crate) fn violation(
        self,
        table: &'static str,
        limit: u32,
        requested: u32,
    ) -> EngineError {
        let error = capacity_error(table, limit, requested);
        match self {
            CapacityPolicy::Panic => panic!("{}", error),
            CapacityPolicy::Error => error,
        }
    }
}

/// Create a capacity violation error for a node table
pub fn capacity_error(table: &'static str, limit: u32, requested: u32) -> EngineError {
    EngineError::CapacityExceeded {
        table,
        limit,
        requested,
    }
}

/// Create a descriptor allocation error
pub fn descriptor_error(shape: impl fmt::Display, error: impl fmt::Display) -> EngineError {
    EngineError::DescriptorAllocationFailed {
        shape: shape.to_string(),
        error: error.to_string(),
    }
}

/// Helper trait for attaching engine context to foreign errors
pub trait EngineErrorContext<T> {
    fn engine_context(self, context: &str) -> EngineResult<T>;
}

impl<T, E> EngineErrorContext<T> for Result<T, E>
where
    E: fmt::Display,
{
    fn engine_context(self, context: &str) -> EngineResult<T> {
        self.map_err(|e| EngineError::Internal {
            message: format!("{}: {}", context, e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_error_message() {
        let err = capacity_error("submesh nodes", 1024, 1025);
        let msg = err.to_string();
        assert!(msg.contains("submesh nodes"));
        assert!(msg.contains("1024"));
        assert!(msg.contains("1025"));
    }

    #[test]
    fn test_engine_context() {
        let result: Result<(), String> = Err("boom".to_string());
        let err = result.engine_context("binding pipeline").unwrap_err();
        assert!(err.to_string().contains("binding pipeline"));
    }
}
