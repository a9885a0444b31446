//! Type definition builder.
//!
//! Types are declared bottom-up: every base, field, parameter and return
//! type must already be registered when it is named, except the type being
//! declared itself, which may appear as a parameter or return type of its own
//! methods and getters.
//!
//! The builder never panics. The first failing step is recorded, later steps
//! are still accepted but ignored, and [`TypeInfoBuilder::build`] reports the
//! recorded error.

use crate::error::{Error, Result};
use crate::reflect::member::{FieldMember, GetterMember, GetterSetterMember, PendingMember};
use crate::reflect::method::{
    self, Args, IntoConstMethod, IntoMethod, Invoker, Params, PendingMethod, Receiver, Signature,
    TypeKey,
};
use crate::reflect::type_info::{BaseRelation, TypeSlot};
use crate::reflect::TypeRegistry;
use oxidex_log::debug;
use std::any::{TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::mem;

/// A complete, validated type declaration waiting to be registered.
///
/// Produced by [`TypeInfoBuilder::build`] and consumed by
/// [`TypeRegistry::register`], which publishes it as a [`TypeInfo`].
///
/// [`TypeInfo`]: crate::reflect::TypeInfo
pub struct TypeDefinition {
    pub(crate) registry: u64,
    pub(crate) name: String,
    pub(crate) rust_name: &'static str,
    pub(crate) type_id: TypeId,
    pub(crate) size: usize,
    pub(crate) align: usize,
    pub(crate) bases: Vec<BaseRelation>,
    pub(crate) members: Vec<PendingMember>,
    pub(crate) methods: Vec<PendingMethod>,
}

impl TypeDefinition {
    /// Definition of `T` with no bases, members or methods, owned by the
    /// registry with id `registry`.
    pub(crate) fn bare<T: 'static>(registry: u64, name: String) -> Self {
        TypeDefinition {
            registry,
            name,
            rust_name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: mem::size_of::<T>(),
            align: mem::align_of::<T>(),
            bases: Vec::new(),
            members: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Name the type will be registered under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// [`TypeId`] of the declared Rust type.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }
}

impl fmt::Debug for TypeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDefinition")
            .field("name", &self.name)
            .field("rust_name", &self.rust_name)
            .field("bases", &self.bases)
            .field(
                "members",
                &self.members.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            )
            .field(
                "methods",
                &self.methods.iter().map(|m| m.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Incremental declaration of the reflected shape of `T`.
///
/// Obtained from [`TypeRegistry::new_type`]. Type references are resolved
/// against that registry as each step is added.
///
/// # Example
///
/// ```rust
/// use oxidex_meta::{Params, TypeRegistry};
/// use std::mem::offset_of;
///
/// #[derive(Clone, Copy)]
/// #[repr(C)]
/// struct Vec2 { x: f32, y: f32 }
///
/// let mut registry = TypeRegistry::with_primitives();
/// // SAFETY: both offsets come from `offset_of!` on `f32` fields.
/// let vec2 = unsafe {
///     registry
///         .new_type::<Vec2>("Vec2")
///         .field::<f32>("x", offset_of!(Vec2, x))
///         .field::<f32>("y", offset_of!(Vec2, y))
/// }
/// .getter("length", |v: &Vec2| v.x.hypot(v.y))
/// .const_method("scaled", |v: &Vec2, k: f32| Vec2 { x: v.x * k, y: v.y * k })
/// .method_with("add", Params::new().by_ref::<Vec2>(), |v: &mut Vec2, args| {
///     if let Some(other) = args.get::<Vec2>(0) {
///         v.x += other.x;
///         v.y += other.y;
///     }
/// })
/// .build()
/// .unwrap();
///
/// let vec2 = registry.register(vec2).unwrap();
/// assert_eq!(vec2.members().len(), 3);
/// assert_eq!(vec2.find_method("scaled").unwrap().return_type(), Some(vec2));
/// ```
pub struct TypeInfoBuilder<'r, T> {
    registry: &'r TypeRegistry,
    definition: TypeDefinition,
    error: Option<Error>,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, T: 'static> TypeInfoBuilder<'r, T> {
    pub(crate) fn new(registry: &'r TypeRegistry, name: String) -> Self {
        TypeInfoBuilder {
            registry,
            definition: TypeDefinition::bare::<T>(registry.id(), name),
            error: None,
            _marker: PhantomData,
        }
    }

    fn fail(&mut self, err: Error) {
        if self.error.is_none() {
            debug!(
                target: "oxidex_meta::builder",
                "definition of '{}' failed: {err}",
                self.definition.name
            );
            self.error = Some(err);
        }
    }

    fn claim_member_name(&mut self, name: &str) -> bool {
        if self.definition.members.iter().any(|m| m.name == name) {
            self.fail(Error::DuplicateName {
                type_name: self.definition.name.clone(),
                name: name.to_string(),
            });
            return false;
        }
        true
    }

    fn claim_method_name(&mut self, name: &str) -> bool {
        if self.definition.methods.iter().any(|m| m.name == name) {
            self.fail(Error::DuplicateName {
                type_name: self.definition.name.clone(),
                name: name.to_string(),
            });
            return false;
        }
        true
    }

    fn resolve(&mut self, key: TypeKey) -> Option<TypeSlot> {
        if key.id == TypeId::of::<T>() {
            return Some(TypeSlot::Owner);
        }
        match self.registry.find_by_id(key.id) {
            Some(info) => Some(TypeSlot::Known(info)),
            None => {
                self.fail(Error::TypeNotFound {
                    name: key.name.to_string(),
                });
                None
            }
        }
    }

    /// Checks that `size` bytes at `offset` lie inside `T` with the given
    /// alignment.
    fn check_offset(&mut self, name: &str, offset: usize, size: usize, align: usize) -> bool {
        let fits = offset
            .checked_add(size)
            .is_some_and(|end| end <= mem::size_of::<T>());
        if fits && offset % align == 0 {
            return true;
        }
        self.fail(Error::InvalidOffset {
            name: name.to_string(),
            offset,
        });
        false
    }

    fn push_method(&mut self, name: String, receiver: Receiver, sig: Signature, invoke: Invoker) {
        if !self.claim_method_name(&name) {
            return;
        }
        let ret = match sig.ret {
            Some(key) => match self.resolve(key) {
                Some(slot) => Some(slot),
                None => return,
            },
            None => None,
        };
        let mut params = Vec::with_capacity(sig.params.len());
        for (key, passing) in sig.params {
            let Some(slot) = self.resolve(key) else {
                return;
            };
            params.push((slot, passing));
        }
        self.definition.methods.push(PendingMethod {
            name,
            receiver,
            ret,
            params,
            invoke,
        });
    }

    // ========================================================================
    // Bases
    // ========================================================================

    /// Declares `B` as a base of `T`, embedded at `offset`.
    ///
    /// Bases are searched in declaration order.
    ///
    /// # Safety
    ///
    /// `offset` must be the byte offset of a field of type `B` inside `T`,
    /// as computed by `offset_of!`. The builder rejects offsets outside `T`
    /// or misaligned for `B`, but cannot tell whether a `B` really lives
    /// there.
    #[must_use]
    pub unsafe fn base<B: 'static>(mut self, offset: usize) -> Self {
        let Some(base) = self.registry.find_by_id(TypeId::of::<B>()) else {
            self.fail(Error::TypeNotFound {
                name: type_name::<B>().to_string(),
            });
            return self;
        };
        if self.definition.bases.iter().any(|rel| rel.base() == base) {
            self.fail(Error::DuplicateType {
                name: base.name().to_string(),
            });
            return self;
        }
        if self.check_offset(base.name(), offset, mem::size_of::<B>(), mem::align_of::<B>()) {
            self.definition.bases.push(BaseRelation::new(base, offset));
        }
        self
    }

    // ========================================================================
    // Members
    // ========================================================================

    /// Declares a field of type `F` at `offset`.
    ///
    /// Reads clone the field; writes assign a clone of the input.
    ///
    /// # Safety
    ///
    /// `offset` must be the byte offset of a field of type `F` inside `T`,
    /// as computed by `offset_of!`.
    #[must_use]
    pub unsafe fn field<F: Clone + 'static>(mut self, name: impl Into<String>, offset: usize) -> Self {
        let name = name.into();
        if !self.claim_member_name(&name) {
            return self;
        }
        let Some(ty) = self.resolve(TypeKey::of::<F>()) else {
            return self;
        };
        if self.check_offset(&name, offset, mem::size_of::<F>(), mem::align_of::<F>()) {
            // SAFETY: forwarded from the caller.
            let access = unsafe { FieldMember::<T, F>::new(offset) };
            self.definition.members.push(PendingMember {
                name,
                ty,
                access: Box::new(access),
            });
        }
        self
    }

    /// Declares a read-only computed member.
    #[must_use]
    pub fn getter<F, G>(mut self, name: impl Into<String>, getter: G) -> Self
    where
        F: 'static,
        G: Fn(&T) -> F + Send + Sync + 'static,
    {
        let name = name.into();
        if !self.claim_member_name(&name) {
            return self;
        }
        if let Some(ty) = self.resolve(TypeKey::of::<F>()) {
            self.definition.members.push(PendingMember {
                name,
                ty,
                access: Box::new(GetterMember::<T, F, G>::new(getter)),
            });
        }
        self
    }

    /// Declares a computed member with a write accessor.
    #[must_use]
    pub fn getter_setter<F, G, S>(mut self, name: impl Into<String>, getter: G, setter: S) -> Self
    where
        F: Clone + 'static,
        G: Fn(&T) -> F + Send + Sync + 'static,
        S: Fn(&mut T, F) + Send + Sync + 'static,
    {
        let name = name.into();
        if !self.claim_member_name(&name) {
            return self;
        }
        if let Some(ty) = self.resolve(TypeKey::of::<F>()) {
            self.definition.members.push(PendingMember {
                name,
                ty,
                access: Box::new(GetterSetterMember::<T, F, G, S>::new(getter, setter)),
            });
        }
        self
    }

    // ========================================================================
    // Methods
    // ========================================================================

    /// Declares a method taking `&mut T` and up to eight by-value arguments.
    ///
    /// A closure returning `()` declares a void method.
    #[must_use]
    pub fn method<M, F: IntoMethod<T, M>>(mut self, name: impl Into<String>, func: F) -> Self {
        self.push_method(name.into(), Receiver::Exclusive, F::signature(), func.into_invoker());
        self
    }

    /// Declares a method taking `&T` and up to eight by-value arguments.
    #[must_use]
    pub fn const_method<M, F: IntoConstMethod<T, M>>(mut self, name: impl Into<String>, func: F) -> Self {
        self.push_method(name.into(), Receiver::Shared, F::signature(), func.into_invoker());
        self
    }

    /// Declares a method taking `&mut T` with an explicit parameter list.
    ///
    /// Arguments are read from the [`Args`] view in declaration order.
    #[must_use]
    pub fn method_with<R, F>(mut self, name: impl Into<String>, params: Params, func: F) -> Self
    where
        R: 'static,
        F: Fn(&mut T, &mut Args<'_, '_>) -> R + Send + Sync + 'static,
    {
        let sig = Signature {
            ret: TypeKey::of_return::<R>(),
            params: params.entries().to_vec(),
        };
        let invoke = method::exclusive_invoker::<T, R, F>(&params, func);
        self.push_method(name.into(), Receiver::Exclusive, sig, invoke);
        self
    }

    /// Declares a method taking `&T` with an explicit parameter list.
    #[must_use]
    pub fn const_method_with<R, F>(mut self, name: impl Into<String>, params: Params, func: F) -> Self
    where
        R: 'static,
        F: Fn(&T, &mut Args<'_, '_>) -> R + Send + Sync + 'static,
    {
        let sig = Signature {
            ret: TypeKey::of_return::<R>(),
            params: params.entries().to_vec(),
        };
        let invoke = method::shared_invoker::<T, R, F>(&params, func);
        self.push_method(name.into(), Receiver::Shared, sig, invoke);
        self
    }

    /// Finishes the declaration.
    ///
    /// # Errors
    ///
    /// The first error recorded by any step:
    ///
    /// - [`Error::TypeNotFound`] for an unregistered base, field, parameter
    ///   or return type
    /// - [`Error::InvalidOffset`] for an offset outside `T` or misaligned
    /// - [`Error::DuplicateType`] for a base declared twice
    /// - [`Error::DuplicateName`] for a member or method name declared twice
    pub fn build(self) -> Result<TypeDefinition> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.definition),
        }
    }
}

impl<T> fmt::Debug for TypeInfoBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfoBuilder")
            .field("definition", &self.definition)
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::reflect::{MemberKind, Params, TypeRegistry};
    use std::mem::offset_of;

    #[derive(Clone, Copy)]
    #[repr(C)]
    struct Pair {
        a: u32,
        b: u32,
    }

    #[repr(C)]
    struct Holder {
        pair: Pair,
        flag: bool,
    }

    struct Unregistered;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::with_primitives();
        let pair = registry.new_type::<Pair>("Pair").build().unwrap();
        registry.register(pair).unwrap();
        registry
    }

    #[test]
    fn test_offsets_are_bounds_checked() {
        let registry = registry();
        // SAFETY: the builder must reject this offset before it is used.
        let err = unsafe {
            registry
                .new_type::<Pair>("Pair2")
                .field::<u32>("past_end", std::mem::size_of::<Pair>())
        }
        .build()
        .unwrap_err();
        assert_eq!(
            err,
            Error::InvalidOffset {
                name: "past_end".into(),
                offset: 8
            }
        );
    }

    #[test]
    fn test_offsets_are_alignment_checked() {
        let registry = registry();
        // SAFETY: the builder must reject this offset before it is used.
        let err = unsafe { registry.new_type::<Holder>("Holder").base::<Pair>(1) }
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOffset { offset: 1, .. }));
    }

    #[test]
    fn test_unknown_types_are_reported() {
        let registry = registry();
        let err = registry
            .new_type::<Holder>("Holder")
            .getter("u", |_: &Holder| Unregistered)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::TypeNotFound { name } if name.ends_with("Unregistered")));

        // SAFETY: never reached; `Unregistered` is not a registered base.
        let err = unsafe { registry.new_type::<Holder>("Holder").base::<Unregistered>(0) }
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::TypeNotFound { .. }));
    }

    #[test]
    fn test_first_error_wins() {
        let registry = registry();
        // SAFETY: offsets are either from `offset_of!` or rejected.
        let err = unsafe {
            registry
                .new_type::<Holder>("Holder")
                .field::<bool>("bad", 1000)
                .base::<Pair>(offset_of!(Holder, pair))
                .base::<Pair>(offset_of!(Holder, pair))
        }
        .build()
        .unwrap_err();
        assert!(matches!(err, Error::InvalidOffset { .. }));
    }

    #[test]
    fn test_duplicate_base_rejected() {
        let registry = registry();
        // SAFETY: offsets come from `offset_of!`.
        let err = unsafe {
            registry
                .new_type::<Holder>("Holder")
                .base::<Pair>(offset_of!(Holder, pair))
                .base::<Pair>(offset_of!(Holder, pair))
        }
        .build()
        .unwrap_err();
        assert_eq!(err, Error::DuplicateType { name: "Pair".into() });
    }

    #[test]
    fn test_repeated_names_rejected() {
        let registry = registry();
        // SAFETY: offsets come from `offset_of!`.
        let err = unsafe {
            registry
                .new_type::<Holder>("Holder")
                .field::<bool>("flag", offset_of!(Holder, flag))
        }
        .getter("flag", |h: &Holder| !h.flag)
        .build()
        .unwrap_err();
        assert_eq!(
            err,
            Error::DuplicateName {
                type_name: "Holder".into(),
                name: "flag".into()
            }
        );

        let err = registry
            .new_type::<Holder>("Holder")
            .const_method("flag", |h: &Holder| h.flag)
            .method("toggle", |h: &mut Holder| h.flag = !h.flag)
            .method("toggle", |h: &mut Holder| h.flag = false)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateName { name, .. } if name == "toggle"));
    }

    #[test]
    fn test_member_and_method_names_are_separate() {
        let registry = registry();
        let definition = registry
            .new_type::<Holder>("Holder")
            .getter("flag", |h: &Holder| h.flag)
            .const_method("flag", |h: &Holder| h.flag)
            .build()
            .unwrap();
        assert_eq!(definition.name(), "Holder");
    }

    #[test]
    fn test_self_references_bind_to_owner() {
        let mut registry = registry();
        // SAFETY: offsets come from `offset_of!`.
        let definition = unsafe {
            registry
                .new_type::<Holder>("Holder")
                .base::<Pair>(offset_of!(Holder, pair))
                .field::<bool>("flag", offset_of!(Holder, flag))
        }
        .const_method("same", |h: &Holder, _other: u8| h.flag)
        .method_with(
            "copy_from",
            Params::new().by_ref::<Holder>(),
            |h: &mut Holder, args| {
                if let Some(other) = args.get::<Holder>(0) {
                    h.flag = other.flag;
                }
            },
        )
        .build()
        .unwrap();
        assert_eq!(definition.name(), "Holder");

        let holder = registry.register(definition).unwrap();
        let copy_from = holder.find_method("copy_from").unwrap();
        assert_eq!(copy_from.param_type(0), Some(holder));
        assert_eq!(
            holder.find_member("flag").unwrap().kind(),
            MemberKind::Field
        );

        let mut target = Holder {
            pair: Pair { a: 1, b: 2 },
            flag: false,
        };
        let source = Holder {
            pair: Pair { a: 0, b: 0 },
            flag: true,
        };
        {
            let mut obj = registry.any_mut(&mut target).unwrap();
            let mut args = [registry.any_ref(&source).unwrap()];
            copy_from.call(&mut obj, &mut args, None).unwrap();
        }
        assert!(target.flag);
    }
}
