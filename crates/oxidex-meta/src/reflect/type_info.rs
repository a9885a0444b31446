//! Type descriptors and the base-pointer adjuster.
//!
//! A [`TypeInfo`] is published once by [`TypeRegistry::register`] and lives
//! for the rest of the process. Identity is address identity: two
//! descriptors are the same type exactly when they are the same allocation.
//!
//! # Inheritance by composition
//!
//! A "base" of a type is a `#[repr(C)]` sub-object embedded at a fixed byte
//! offset. Declaring `Derived` with bases `Base1` at offset 0 and `Base2` at
//! offset 8 records two [`BaseRelation`]s; the adjuster then turns a pointer
//! to a `Derived` into a pointer to either sub-object, recursively through
//! any depth of bases.
//!
//! Searches are depth-first over bases in declaration order. Diamonds are
//! not merged: if the same base is reachable through two paths, the first
//! declared path wins.
//!
//! [`TypeRegistry::register`]: crate::reflect::TypeRegistry::register

use crate::error::{Error, Result};
use crate::reflect::builder::TypeDefinition;
use crate::reflect::{Member, Method};
use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

/// Pointer to a published [`TypeInfo`].
///
/// Members and methods refer to their owning descriptor before it has been
/// written; this handle is the only place that crosses that gap.
#[derive(Clone, Copy)]
pub(crate) struct TypeHandle(NonNull<TypeInfo>);

// SAFETY: a TypeHandle only ever points at a leaked, immutable TypeInfo,
// which is itself Sync.
unsafe impl Send for TypeHandle {}
// SAFETY: see above.
unsafe impl Sync for TypeHandle {}

impl TypeHandle {
    pub(crate) fn from_static(info: &'static TypeInfo) -> Self {
        TypeHandle(NonNull::from(info))
    }

    /// Dereferences the handle.
    ///
    /// Handles are created during [`TypeInfo::publish`] and are not reachable
    /// from outside the crate until the descriptor they point to is written.
    pub(crate) fn get(self) -> &'static TypeInfo {
        // SAFETY: see above; published descriptors are never freed.
        unsafe { self.0.as_ref() }
    }
}

/// Type reference recorded by the builder.
///
/// The type being declared is not yet registered, so references to it are
/// kept symbolic until it is published.
#[derive(Clone, Copy)]
pub(crate) enum TypeSlot {
    Known(&'static TypeInfo),
    Owner,
}

impl TypeSlot {
    pub(crate) fn bind(self, owner: TypeHandle) -> TypeHandle {
        match self {
            TypeSlot::Known(info) => TypeHandle::from_static(info),
            TypeSlot::Owner => owner,
        }
    }
}

/// A direct base of a type.
#[derive(Clone, Copy)]
pub struct BaseRelation {
    base: &'static TypeInfo,
    offset: usize,
}

impl BaseRelation {
    pub(crate) const fn new(base: &'static TypeInfo, offset: usize) -> Self {
        BaseRelation { base, offset }
    }

    /// The base type.
    #[must_use]
    pub fn base(&self) -> &'static TypeInfo {
        self.base
    }

    /// Byte offset of the base sub-object inside the derived type.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

impl fmt::Debug for BaseRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseRelation")
            .field("base", &self.base.name())
            .field("offset", &self.offset)
            .finish()
    }
}

/// Runtime descriptor of a registered type.
pub struct TypeInfo {
    name: String,
    rust_name: &'static str,
    type_id: TypeId,
    size: usize,
    align: usize,
    bases: Vec<BaseRelation>,
    members: Vec<Member>,
    methods: Vec<Method>,
}

impl TypeInfo {
    /// Leaks a finished definition and binds its members and methods to it.
    pub(crate) fn publish(definition: TypeDefinition) -> &'static TypeInfo {
        let slot = NonNull::from(Box::leak(Box::new(MaybeUninit::<TypeInfo>::uninit())))
            .cast::<TypeInfo>();
        let owner = TypeHandle(slot);

        let TypeDefinition {
            registry: _,
            name,
            rust_name,
            type_id,
            size,
            align,
            bases,
            members,
            methods,
        } = definition;

        let info = TypeInfo {
            name,
            rust_name,
            type_id,
            size,
            align,
            bases,
            members: members.into_iter().map(|m| m.bind(owner)).collect(),
            methods: methods.into_iter().map(|m| m.bind(owner)).collect(),
        };

        // SAFETY: `slot` is a fresh, never-freed allocation for one TypeInfo.
        // Nothing reads through `owner` before this write completes.
        unsafe {
            slot.as_ptr().write(info);
            slot.as_ref()
        }
    }

    /// Registered name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rust type name, as reported by [`std::any::type_name`].
    #[must_use]
    pub fn rust_name(&self) -> &'static str {
        self.rust_name
    }

    /// [`TypeId`] of the described Rust type.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Size of the described type in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Alignment of the described type in bytes.
    #[must_use]
    pub fn align(&self) -> usize {
        self.align
    }

    /// Direct bases in declaration order.
    #[must_use]
    pub fn bases(&self) -> &[BaseRelation] {
        &self.bases
    }

    /// Members declared directly on this type.
    #[must_use]
    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Methods declared directly on this type.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Byte offset from this type to `base`.
    ///
    /// Returns `Some(0)` for the type itself and `None` when `base` is not
    /// reachable. Paths are searched depth-first in base declaration order.
    #[must_use]
    pub fn offset_to(&self, base: &TypeInfo) -> Option<usize> {
        if ptr::eq(self, base) {
            return Some(0);
        }
        self.bases
            .iter()
            .find_map(|rel| rel.base.offset_to(base).map(|inner| rel.offset + inner))
    }

    /// Converts a pointer to a value of this type into a pointer to its
    /// `base` sub-object.
    ///
    /// Returns `None` when `base` is not reachable. The returned pointer is
    /// only meaningful if `ptr` really points to a value of this type.
    #[must_use]
    pub fn adjust(&self, base: &TypeInfo, ptr: NonNull<u8>) -> Option<NonNull<u8>> {
        let offset = self.offset_to(base)?;
        NonNull::new(ptr.as_ptr().wrapping_add(offset))
    }

    /// Like [`adjust`](Self::adjust), reporting failure as an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BaseUnreachable`] if `base` is not an ancestor.
    pub fn try_adjust(&self, base: &TypeInfo, ptr: NonNull<u8>) -> Result<NonNull<u8>> {
        self.adjust(base, ptr).ok_or_else(|| Error::BaseUnreachable {
            from: self.name.clone(),
            to: base.name.clone(),
        })
    }

    /// Returns `true` if `base` is a strict ancestor of this type.
    #[must_use]
    pub fn is_derived_from(&self, base: &TypeInfo) -> bool {
        !ptr::eq(self, base) && self.offset_to(base).is_some()
    }

    /// Returns `true` if `base` is this type or one of its ancestors.
    #[must_use]
    pub fn is_same_or_derived_from(&self, base: &TypeInfo) -> bool {
        self.offset_to(base).is_some()
    }

    /// This type followed by every ancestor, depth-first in declaration
    /// order. An ancestor reachable through several paths appears once per
    /// path.
    #[must_use]
    pub fn hierarchy(&self) -> Vec<&TypeInfo> {
        let mut out = vec![self];
        for rel in &self.bases {
            out.extend(rel.base.hierarchy());
        }
        out
    }

    /// First type in [`hierarchy`](Self::hierarchy) whose Rust type is `id`.
    #[must_use]
    pub fn ancestor_by_id(&self, id: TypeId) -> Option<&TypeInfo> {
        if self.type_id == id {
            return Some(self);
        }
        self.bases.iter().find_map(|rel| rel.base.ancestor_by_id(id))
    }

    // ========================================================================
    // Members and methods
    // ========================================================================

    /// Looks up a member by name, here first and then through the bases.
    #[must_use]
    pub fn lookup_member(&self, name: &str) -> Option<&Member> {
        self.members
            .iter()
            .find(|m| m.name() == name)
            .or_else(|| self.bases.iter().find_map(|rel| rel.base.lookup_member(name)))
    }

    /// Looks up a member by name, here first and then through the bases.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MemberNotFound`] if no type in the hierarchy declares
    /// `name`.
    pub fn find_member(&self, name: &str) -> Result<&Member> {
        self.lookup_member(name).ok_or_else(|| Error::MemberNotFound {
            type_name: self.name.clone(),
            member: name.to_string(),
        })
    }

    /// Looks up a method by name, here first and then through the bases.
    #[must_use]
    pub fn lookup_method(&self, name: &str) -> Option<&Method> {
        self.methods
            .iter()
            .find(|m| m.name() == name)
            .or_else(|| self.bases.iter().find_map(|rel| rel.base.lookup_method(name)))
    }

    /// Looks up a method by name, here first and then through the bases.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MethodNotFound`] if no type in the hierarchy declares
    /// `name`.
    pub fn find_method(&self, name: &str) -> Result<&Method> {
        self.lookup_method(name).ok_or_else(|| Error::MethodNotFound {
            type_name: self.name.clone(),
            method: name.to_string(),
        })
    }

    /// Returns `true` if the hierarchy declares a member called `name`.
    #[must_use]
    pub fn has_member(&self, name: &str) -> bool {
        self.lookup_member(name).is_some()
    }

    /// Returns `true` if the hierarchy declares a method called `name`.
    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.lookup_method(name).is_some()
    }

    /// Every member visible from this type, in lookup order, skipping names
    /// shadowed by an earlier declaration.
    #[must_use]
    pub fn all_members(&self) -> Vec<&Member> {
        let mut out: Vec<&Member> = Vec::new();
        for ty in self.hierarchy() {
            for member in &ty.members {
                if out.iter().all(|seen| seen.name() != member.name()) {
                    out.push(member);
                }
            }
        }
        out
    }

    /// Every method visible from this type, in lookup order, skipping names
    /// shadowed by an earlier declaration.
    #[must_use]
    pub fn all_methods(&self) -> Vec<&Method> {
        let mut out: Vec<&Method> = Vec::new();
        for ty in self.hierarchy() {
            for method in &ty.methods {
                if out.iter().all(|seen| seen.name() != method.name()) {
                    out.push(method);
                }
            }
        }
        out
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self, other)
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        ptr::hash(self, state);
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeInfo")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("align", &self.align)
            .field("bases", &self.bases)
            .field(
                "members",
                &self.members.iter().map(Member::name).collect::<Vec<_>>(),
            )
            .field(
                "methods",
                &self.methods.iter().map(Method::name).collect::<Vec<_>>(),
            )
            .finish()
    }
}
