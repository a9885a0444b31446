//! Name- and `TypeId`-indexed collection of published types.
//!
//! A registry is filled during a single-threaded registration phase and then
//! shared read-only. Lookups take `&self` and touch no mutable state, so a
//! registry behind a `&'static` or an `Arc` can serve any number of reader
//! threads without locking.
//!
//! Registration publishes each [`TypeDefinition`] as a leaked, immutable
//! [`TypeInfo`]. Descriptors are never freed, even if the registry that
//! published them is dropped.
//!
//! A definition resolves its bases, member types and parameter types against
//! the registry that created its builder, and only that registry accepts it.

use crate::error::{Error, Result};
use crate::reflect::builder::{TypeDefinition, TypeInfoBuilder};
use crate::reflect::{AnyValue, TypeInfo};
use fxhash::FxHashMap;
use oxidex_log::{debug, warn};
use std::any::{TypeId, type_name};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(0);

macro_rules! primitives {
    ($registry:expr; $($ty:ty => $name:literal),* $(,)?) => {
        $( $registry.register_bare::<$ty>($name); )*
    };
}

/// Collection of registered types.
pub struct TypeRegistry {
    id: u64,
    by_name: FxHashMap<String, &'static TypeInfo>,
    by_id: FxHashMap<TypeId, &'static TypeInfo>,
    order: Vec<&'static TypeInfo>,
}

impl TypeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        TypeRegistry {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            by_name: FxHashMap::default(),
            by_id: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Process-unique id stamped into the definitions this registry builds.
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Creates a registry holding the primitive types.
    ///
    /// Registers `bool`, `char`, every integer width, `f32`, `f64` and
    /// `String` under their Rust names.
    #[must_use]
    pub fn with_primitives() -> Self {
        let mut registry = Self::new();
        registry.register_primitives();
        registry
    }

    /// Registers the primitive types that are not present yet.
    pub fn register_primitives(&mut self) {
        primitives!(self;
            bool => "bool",
            char => "char",
            i8 => "i8",
            i16 => "i16",
            i32 => "i32",
            i64 => "i64",
            i128 => "i128",
            isize => "isize",
            u8 => "u8",
            u16 => "u16",
            u32 => "u32",
            u64 => "u64",
            u128 => "u128",
            usize => "usize",
            f32 => "f32",
            f64 => "f64",
            String => "String",
        );
    }

    fn register_bare<T: 'static>(&mut self, name: &str) {
        if self.by_id.contains_key(&TypeId::of::<T>()) {
            return;
        }
        if let Some(existing) = self.by_name.get(name) {
            warn!(
                target: "oxidex_meta::registry",
                "skipped primitive '{name}': the name is held by '{}'",
                existing.rust_name()
            );
            return;
        }
        let definition = TypeDefinition::bare::<T>(self.id, name.to_string());
        self.insert(TypeInfo::publish(definition));
    }

    fn insert(&mut self, info: &'static TypeInfo) {
        self.by_name.insert(info.name().to_string(), info);
        self.by_id.insert(info.type_id(), info);
        self.order.push(info);
    }

    /// Starts the declaration of `T` under `name`.
    pub fn new_type<T: 'static>(&self, name: impl Into<String>) -> TypeInfoBuilder<'_, T> {
        TypeInfoBuilder::new(self, name.into())
    }

    /// Publishes a definition.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ForeignDefinition`] if `definition` was built by
    /// another registry, or [`Error::DuplicateType`] if the name or the Rust
    /// type is already registered; nothing is published in either case.
    pub fn register(&mut self, definition: TypeDefinition) -> Result<&'static TypeInfo> {
        if definition.registry != self.id {
            warn!(
                target: "oxidex_meta::registry",
                "rejected registration of '{}': built by another registry",
                definition.name()
            );
            return Err(Error::ForeignDefinition {
                name: definition.name().to_string(),
            });
        }
        let clash = if self.by_name.contains_key(definition.name()) {
            Some(definition.name().to_string())
        } else {
            self.by_id
                .get(&definition.type_id())
                .map(|existing| existing.name().to_string())
        };
        if let Some(name) = clash {
            warn!(
                target: "oxidex_meta::registry",
                "rejected registration of '{}': '{name}' is already registered",
                definition.name()
            );
            return Err(Error::DuplicateType { name });
        }

        let info = TypeInfo::publish(definition);
        self.insert(info);
        debug!(
            target: "oxidex_meta::registry",
            "registered '{}' ({} bases, {} members, {} methods)",
            info.name(),
            info.bases().len(),
            info.members().len(),
            info.methods().len()
        );
        Ok(info)
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Looks up a type by registered name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if no type has that name.
    pub fn find(&self, name: &str) -> Result<&'static TypeInfo> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::TypeNotFound {
                name: name.to_string(),
            })
    }

    /// Looks up a type by [`TypeId`].
    #[must_use]
    pub fn find_by_id(&self, id: TypeId) -> Option<&'static TypeInfo> {
        self.by_id.get(&id).copied()
    }

    /// Looks up the descriptor of `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if `T` is not registered.
    pub fn info_of<T: 'static>(&self) -> Result<&'static TypeInfo> {
        self.find_by_id(TypeId::of::<T>())
            .ok_or_else(|| Error::TypeNotFound {
                name: type_name::<T>().to_string(),
            })
    }

    /// Returns `true` if a type is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Registered types in registration order.
    pub fn types(&self) -> impl Iterator<Item = &'static TypeInfo> + '_ {
        self.order.iter().copied()
    }

    /// Every registered strict descendant of `base`, in registration order.
    #[must_use]
    pub fn derived_types(&self, base: &TypeInfo) -> Vec<&'static TypeInfo> {
        self.types().filter(|ty| ty.is_derived_from(base)).collect()
    }

    // ========================================================================
    // Value handles
    // ========================================================================

    /// Wraps an exclusive borrow of a registered type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if `T` is not registered.
    pub fn any_mut<'a, T: 'static>(&self, value: &'a mut T) -> Result<AnyValue<'a>> {
        AnyValue::from_mut(self.info_of::<T>()?, value)
    }

    /// Wraps a shared borrow of a registered type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if `T` is not registered.
    pub fn any_ref<'a, T: 'static>(&self, value: &'a T) -> Result<AnyValue<'a>> {
        AnyValue::from_ref(self.info_of::<T>()?, value)
    }

    /// Copies a small value of a registered type into a handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeNotFound`] if `T` is not registered, or
    /// [`Error::ValueTooLarge`] if it does not fit inline.
    pub fn any_value<T: Copy + 'static>(&self, value: T) -> Result<AnyValue<'static>> {
        AnyValue::from_value(self.info_of::<T>()?, value)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.order.iter().map(|ty| ty.name()))
            .finish()
    }
}
