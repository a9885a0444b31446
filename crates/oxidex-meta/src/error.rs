//! Error types for `OxideX` Meta.
//!
//! Every failure in the engine is a local, recoverable condition: a lookup
//! that found nothing, an erased value whose type does not match a declared
//! signature, or a registration that conflicts with an earlier one. None of
//! them are retried and none of them abort the process.

use std::fmt;

/// Errors that can occur while registering or introspecting types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No type with this name (or Rust type) is registered.
    TypeNotFound {
        /// Registered name or Rust type name that was looked up.
        name: String,
    },

    /// Member not found on the type or any of its bases.
    MemberNotFound {
        /// Type the lookup started from.
        type_name: String,
        /// Requested member name.
        member: String,
    },

    /// Method not found on the type or any of its bases.
    MethodNotFound {
        /// Type the lookup started from.
        type_name: String,
        /// Requested method name.
        method: String,
    },

    /// The object is not of the owning type or a type derived from it.
    OwnerMismatch {
        /// Type that declares the member or method.
        expected: String,
        /// Type carried by the object handle.
        found: String,
    },

    /// A value's type differs from the declared type.
    TypeMismatch {
        /// Declared type.
        expected: String,
        /// Type carried by the value handle.
        found: String,
    },

    /// A call argument's type differs from the declared parameter type.
    ArgumentMismatch {
        /// Zero-based parameter index.
        index: usize,
        /// Declared parameter type.
        expected: String,
        /// Type carried by the argument handle.
        found: String,
    },

    /// Argument count differs from the method's arity.
    ArityMismatch {
        /// Declared arity.
        expected: usize,
        /// Number of arguments supplied.
        got: usize,
    },

    /// Write attempted through a read-only member, or a result requested
    /// from a void method.
    NotMutable {
        /// Member or method name.
        name: String,
    },

    /// Mutation attempted through a const handle.
    ConstViolation,

    /// A type with this name or Rust type is already registered.
    DuplicateType {
        /// Conflicting name.
        name: String,
    },

    /// A type declares two members, or two methods, with the same name.
    DuplicateName {
        /// Type being declared.
        type_name: String,
        /// Repeated member or method name.
        name: String,
    },

    /// A definition was built against a different registry than the one it
    /// is registered with.
    ForeignDefinition {
        /// Name of the rejected definition.
        name: String,
    },

    /// No base path leads from one type to the other.
    BaseUnreachable {
        /// Type the adjustment started from.
        from: String,
        /// Requested base type.
        to: String,
    },

    /// A declared offset does not fit the layout of the declaring type.
    InvalidOffset {
        /// Field or base the offset was declared for.
        name: String,
        /// Declared byte offset.
        offset: usize,
    },

    /// A by-value payload does not fit the inline storage.
    ValueTooLarge {
        /// Size of the value in bytes.
        size: usize,
        /// Alignment of the value in bytes.
        align: usize,
        /// Inline capacity in bytes.
        capacity: usize,
    },

    /// A process-wide registry has already been installed.
    RegistryAlreadyInstalled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TypeNotFound { name } => {
                write!(f, "Type not found in registry: {name}")
            }
            Error::MemberNotFound { type_name, member } => {
                write!(f, "Member '{member}' not found on type '{type_name}'")
            }
            Error::MethodNotFound { type_name, method } => {
                write!(f, "Method '{method}' not found on type '{type_name}'")
            }
            Error::OwnerMismatch { expected, found } => {
                write!(
                    f,
                    "Object of type '{found}' is not derived from owner '{expected}'"
                )
            }
            Error::TypeMismatch { expected, found } => {
                write!(f, "Type mismatch: expected '{expected}', got '{found}'")
            }
            Error::ArgumentMismatch {
                index,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Argument type mismatch at index {index}: expected '{expected}', got '{found}'"
                )
            }
            Error::ArityMismatch { expected, got } => {
                write!(
                    f,
                    "Argument count mismatch: expected {expected}, got {got}"
                )
            }
            Error::NotMutable { name } => {
                write!(f, "'{name}' does not accept or produce a value here")
            }
            Error::ConstViolation => {
                write!(f, "Mutation attempted through a const reference")
            }
            Error::DuplicateType { name } => {
                write!(f, "Type already registered: {name}")
            }
            Error::DuplicateName { type_name, name } => {
                write!(f, "Name '{name}' declared twice on type '{type_name}'")
            }
            Error::ForeignDefinition { name } => {
                write!(
                    f,
                    "Type '{name}' was defined against a different registry"
                )
            }
            Error::BaseUnreachable { from, to } => {
                write!(f, "No base path from '{from}' to '{to}'")
            }
            Error::InvalidOffset { name, offset } => {
                write!(
                    f,
                    "Offset {offset} for '{name}' lies outside the declaring type"
                )
            }
            Error::ValueTooLarge {
                size,
                align,
                capacity,
            } => {
                write!(
                    f,
                    "Value of {size} bytes (align {align}) exceeds inline capacity of {capacity} bytes"
                )
            }
            Error::RegistryAlreadyInstalled => {
                write!(f, "A global type registry is already installed")
            }
        }
    }
}

impl std::error::Error for Error {}

/// Result type for `OxideX` Meta operations.
pub type Result<T> = std::result::Result<T, Error>;
