//! Runtime type introspection.
//!
//! This module provides the reflection engine:
//!
//! - [`any`]: [`AnyValue`], the type-erased value handle
//! - [`type_info`]: [`TypeInfo`], base relations and pointer adjustment
//! - [`member`]: fields and computed members
//! - [`method`]: invocable operations of any arity
//! - [`builder`]: declaration of new types
//! - [`registry`]: [`TypeRegistry`], lookup by name or Rust type
//! - [`dynamic`]: values that report their own most-derived type
//!
//! # Lifecycle
//!
//! Types are declared and registered once, bottom-up, during a
//! single-threaded startup phase. Published descriptors are immutable and
//! live for the rest of the process, so any number of threads may read them
//! afterwards. Objects reached through [`AnyValue`] handles are owned by the
//! caller; the engine never synchronizes access to them.
//!
//! # Global Registry
//!
//! With the `global` feature (on by default) a registry can be published
//! process-wide with [`install`] and retrieved with [`global`]. Installation
//! happens at most once.
//!
//! # Example
//!
//! ```rust
//! use oxidex_meta::reflect::TypeRegistry;
//! use std::mem::offset_of;
//!
//! #[repr(C)]
//! struct Base { a: i32 }
//!
//! #[repr(C)]
//! struct Derived { base: Base, b: i32 }
//!
//! let mut registry = TypeRegistry::with_primitives();
//! // SAFETY: offsets come from `offset_of!`.
//! unsafe {
//!     let base = registry
//!         .new_type::<Base>("Base")
//!         .field::<i32>("a", offset_of!(Base, a))
//!         .build()
//!         .unwrap();
//!     registry.register(base).unwrap();
//!
//!     let derived = registry
//!         .new_type::<Derived>("Derived")
//!         .base::<Base>(offset_of!(Derived, base))
//!         .field::<i32>("b", offset_of!(Derived, b))
//!         .build()
//!         .unwrap();
//!     registry.register(derived).unwrap();
//! }
//!
//! let mut d = Derived { base: Base { a: 1 }, b: 2 };
//! let obj = registry.any_mut(&mut d).unwrap();
//! let a = registry.find("Derived").unwrap().find_member("a").unwrap();
//! assert_eq!(a.owner().name(), "Base");
//! assert_eq!(a.value::<i32>(&obj), Ok(1));
//! ```

pub mod any;
pub mod builder;
pub mod dynamic;
pub mod member;
pub mod method;
pub mod registry;
pub mod type_info;

pub use any::{AnyTag, AnyValue, INLINE_ALIGN, INLINE_CAPACITY};
pub use builder::{TypeDefinition, TypeInfoBuilder};
pub use dynamic::{AsAny, DynamicType, dynamic_type_of};
pub use member::{Member, MemberKind};
pub use method::{
    Args, IntoConstMethod, IntoMethod, MAX_ARITY, Method, Param, Params, Passing, Receiver,
};
pub use registry::TypeRegistry;
pub use type_info::{BaseRelation, TypeInfo};

#[cfg(feature = "global")]
use crate::error::{Error, Result};
#[cfg(feature = "global")]
use std::sync::OnceLock;

#[cfg(feature = "global")]
static GLOBAL_REGISTRY: OnceLock<TypeRegistry> = OnceLock::new();

/// Publishes `registry` as the process-wide registry.
///
/// # Errors
///
/// Returns [`Error::RegistryAlreadyInstalled`] if a registry was installed
/// before; the argument is dropped and the installed registry is kept.
#[cfg(feature = "global")]
pub fn install(registry: TypeRegistry) -> Result<&'static TypeRegistry> {
    let types = registry.len();
    GLOBAL_REGISTRY
        .set(registry)
        .map_err(|_| Error::RegistryAlreadyInstalled)?;
    oxidex_log::info!(
        target: "oxidex_meta::registry",
        "installed global registry with {types} types"
    );
    GLOBAL_REGISTRY.get().ok_or(Error::RegistryAlreadyInstalled)
}

/// Returns the process-wide registry, if one was installed.
#[cfg(feature = "global")]
#[must_use]
pub fn global() -> Option<&'static TypeRegistry> {
    GLOBAL_REGISTRY.get()
}
