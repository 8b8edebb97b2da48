// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error taxonomy for the binding layer.
//!
//! Every failure is recovered locally: callers log the error and keep the
//! host node alive with stale or default values.

/// Failure raised by a converter function
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConversionError {
    /// The host value shape does not fit the engine type
    #[error("Cannot convert host value {found} into {expected}")]
    HostShape {
        /// Engine type that was requested
        expected: String,
        /// Short description of the host value
        found: String,
    },

    /// The engine value shape does not fit the host attribute
    #[error("Cannot convert engine value {found} into attribute '{attribute}'")]
    EngineShape {
        /// Target attribute
        attribute: String,
        /// Engine type name that was found
        found: String,
    },

    /// A struct field has no counterpart on the host compound
    #[error("Struct field '{field}' has no matching child on '{attribute}'")]
    MissingField {
        /// Compound attribute name
        attribute: String,
        /// Field name
        field: String,
    },

    /// Geometry payload is internally inconsistent
    #[error("Invalid geometry: {0}")]
    Geometry(String),

    /// No converter is registered for a nested type
    #[error("No converter registered for '{0}'")]
    Unsupported(String),
}

/// Failure raised by the host collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// Attribute does not exist
    #[error("Attribute not found: {0}")]
    AttributeNotFound(String),

    /// Attribute already exists
    #[error("Attribute '{attribute}' already exists on node '{node}'")]
    AttributeExists {
        /// Node name
        node: String,
        /// Attribute name
        attribute: String,
    },

    /// Value type does not fit the attribute
    #[error("Value does not match attribute '{0}'")]
    TypeMismatch(String),

    /// The host refuses the operation
    #[error("{0}")]
    Rejected(String),
}

/// Failure raised by the engine collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Port does not exist
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// Port already exists
    #[error("Port already exists: {0}")]
    PortExists(String),

    /// Value has the wrong type for the port
    #[error("Port '{port}' expects {expected}, got {found}")]
    TypeMismatch {
        /// Port name
        port: String,
        /// Resolved port type
        expected: String,
        /// Type name of the rejected value
        found: String,
    },

    /// State blob could not be parsed
    #[error("Malformed state: {0}")]
    Parse(String),

    /// Execution raised
    #[error("{0}")]
    Execution(String),
}

/// Error surfaced by binding operations
#[derive(Debug, thiserror::Error)]
pub enum BindError {
    /// A port has no host attribute or an attribute has no port
    #[error("Structural mismatch on '{name}': {reason}")]
    StructuralMismatch {
        /// Port or attribute name
        name: String,
        /// What did not line up
        reason: String,
    },

    /// No converter is registered for the resolved type
    #[error("No converter for type '{resolved_type}' (port '{port}')")]
    TypeConversionUnsupported {
        /// Port name
        port: String,
        /// Resolved port type
        resolved_type: String,
    },

    /// The engine raised during execution
    #[error("Engine execution failed: {0}")]
    EngineExecutionFailure(String),

    /// A state blob failed to parse
    #[error("Persisted state is corrupt: {0}")]
    PersistenceCorrupt(String),

    /// Execute was called while already evaluating
    #[error("Binding {0} is already evaluating")]
    Reentrant(u32),

    /// No engine graph is bound
    #[error("Binding {0} is not bound to a graph")]
    Unbound(u32),

    /// Host collaborator error
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// Engine collaborator error outside execution
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Converter failure
    #[error("Conversion error on '{port}': {source}")]
    Conversion {
        /// Port being converted
        port: String,
        /// Underlying failure
        #[source]
        source: ConversionError,
    },
}

/// Result type for binding operations
pub type Result<T> = std::result::Result<T, BindError>;
