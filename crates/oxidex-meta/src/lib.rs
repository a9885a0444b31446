//! `OxideX` Meta: runtime type introspection for Rust
//!
//! `OxideX` Meta lets a program describe its own types at run time and then
//! read fields, call methods and walk inheritance chains by name, without
//! knowing the concrete types at compile time. It is the layer a scripting
//! bridge, an inspector or a serializer sits on. It provides:
//!
//! - **Type descriptors** with single and multiple "inheritance" expressed
//!   as `#[repr(C)]` composition
//! - **Members** backed by fields, getters or getter/setter pairs
//! - **Methods** of any arity with exact, validated signatures
//! - **Type-erased handles** that adjust to any ancestor on access
//! - **A registry** indexed by name and by Rust type
//!
//! # Architecture
//!
//! - **Registration**: types are declared bottom-up through
//!   [`TypeInfoBuilder`] and published into a [`TypeRegistry`]
//! - **Introspection**: published [`TypeInfo`]s are immutable and shared
//!   freely between threads
//! - **Access**: [`AnyValue`] handles carry objects, arguments and results;
//!   every access is validated before memory is touched
//!
//! # Example
//!
//! ```rust
//! use oxidex_meta::TypeRegistry;
//! use std::mem::offset_of;
//!
//! #[repr(C)]
//! struct Base { a: i32 }
//!
//! let mut registry = TypeRegistry::with_primitives();
//! // SAFETY: the offset comes from `offset_of!` on an `i32` field.
//! let base = unsafe {
//!     registry.new_type::<Base>("Base").field::<i32>("a", offset_of!(Base, a))
//! }
//! .method("triple", |b: &mut Base| b.a *= 3)
//! .build()
//! .unwrap();
//! let base = registry.register(base).unwrap();
//!
//! let mut b = Base { a: 7 };
//! let mut obj = registry.any_mut(&mut b).unwrap();
//! base.find_method("triple").unwrap().call(&mut obj, &mut [], None).unwrap();
//! assert_eq!(base.find_member("a").unwrap().value::<i32>(&obj), Ok(21));
//! ```

pub mod error;
pub mod reflect;

// Re-export commonly used types
pub use error::{Error, Result};
pub use reflect::{
    AnyTag, AnyValue, Args, BaseRelation, DynamicType, Member, MemberKind, Method, Params,
    Passing, Receiver, TypeDefinition, TypeInfo, TypeInfoBuilder, TypeRegistry,
};
#[cfg(feature = "global")]
pub use reflect::{global, install};
