//! Reflected members.
//!
//! A [`Member`] is a named, typed value reachable from an object. Three
//! access strategies share one interface:
//!
//! | Kind | Read | Write |
//! |------|------|-------|
//! | [`MemberKind::Field`] | clone of the field at a fixed offset | assignment at that offset |
//! | [`MemberKind::Getter`] | result of a `Fn(&T) -> F` | rejected with [`Error::NotMutable`] |
//! | [`MemberKind::GetterSetter`] | result of a `Fn(&T) -> F` | call of a `Fn(&mut T, F)` |
//!
//! Every access is validated before anything is read or written. The object
//! must be of the owning type or derived from it, the value handle must carry
//! exactly the member's declared type, and writes need mutable handles.
//! Validation failures are reported as errors and leave all values untouched.

use crate::error::{Error, Result};
use crate::reflect::type_info::{TypeHandle, TypeSlot};
use crate::reflect::{AnyValue, TypeInfo};
use oxidex_log::trace;
use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// How a member reaches its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Direct field at a byte offset.
    Field,
    /// Read-only computed value.
    Getter,
    /// Computed value with a write accessor.
    GetterSetter,
}

/// Type-specific half of a member.
///
/// Implementations trust their caller completely; all checks happen in
/// [`Member`].
pub(crate) trait MemberAccess: Send + Sync {
    fn kind(&self) -> MemberKind;

    /// Writes the member value of `object` into `out`.
    ///
    /// # Safety
    ///
    /// `object` points to a live owner value and `out` is a mutable handle
    /// of the declared value type.
    unsafe fn read(&self, object: NonNull<u8>, out: &mut AnyValue<'_>);

    /// Writes the value held by `input` into the member of `object`.
    ///
    /// # Safety
    ///
    /// `object` points to a live, exclusively accessible owner value and
    /// `input` is a non-void handle of the declared value type.
    unsafe fn write(&self, object: NonNull<u8>, input: &AnyValue<'_>);

    /// Reads the member value of `object` into a box.
    ///
    /// # Safety
    ///
    /// `object` points to a live owner value.
    unsafe fn read_boxed(&self, object: NonNull<u8>) -> Box<dyn Any>;
}

// ============================================================================
// Access strategies
// ============================================================================

pub(crate) struct FieldMember<T, F> {
    offset: usize,
    _marker: PhantomData<fn(&T) -> F>,
}

impl<T, F> FieldMember<T, F> {
    /// # Safety
    ///
    /// `offset` must be the offset of a field of type `F` inside `T`.
    pub(crate) unsafe fn new(offset: usize) -> Self {
        FieldMember {
            offset,
            _marker: PhantomData,
        }
    }

    /// # Safety
    ///
    /// `object` points to a live `T`.
    unsafe fn field(&self, object: NonNull<u8>) -> NonNull<F> {
        // SAFETY: the offset lies inside `T` by construction.
        unsafe { object.add(self.offset).cast::<F>() }
    }
}

impl<T: 'static, F: Clone + 'static> MemberAccess for FieldMember<T, F> {
    fn kind(&self) -> MemberKind {
        MemberKind::Field
    }

    unsafe fn read(&self, object: NonNull<u8>, out: &mut AnyValue<'_>) {
        // SAFETY: upheld by the caller and `new`.
        unsafe {
            let value = self.field(object).as_ref().clone();
            out.store(value);
        }
    }

    unsafe fn write(&self, object: NonNull<u8>, input: &AnyValue<'_>) {
        // SAFETY: upheld by the caller and `new`.
        unsafe {
            let value = input.get_unchecked::<F>().clone();
            *self.field(object).as_mut() = value;
        }
    }

    unsafe fn read_boxed(&self, object: NonNull<u8>) -> Box<dyn Any> {
        // SAFETY: upheld by the caller and `new`.
        Box::new(unsafe { self.field(object).as_ref() }.clone())
    }
}

pub(crate) struct GetterMember<T, F, G> {
    getter: G,
    _marker: PhantomData<fn(&T) -> F>,
}

impl<T, F, G> GetterMember<T, F, G> {
    pub(crate) fn new(getter: G) -> Self {
        GetterMember {
            getter,
            _marker: PhantomData,
        }
    }
}

impl<T, F, G> MemberAccess for GetterMember<T, F, G>
where
    T: 'static,
    F: 'static,
    G: Fn(&T) -> F + Send + Sync,
{
    fn kind(&self) -> MemberKind {
        MemberKind::Getter
    }

    unsafe fn read(&self, object: NonNull<u8>, out: &mut AnyValue<'_>) {
        // SAFETY: upheld by the caller.
        unsafe {
            let value = (self.getter)(object.cast::<T>().as_ref());
            out.store(value);
        }
    }

    unsafe fn write(&self, _object: NonNull<u8>, _input: &AnyValue<'_>) {}

    unsafe fn read_boxed(&self, object: NonNull<u8>) -> Box<dyn Any> {
        // SAFETY: upheld by the caller.
        Box::new((self.getter)(unsafe { object.cast::<T>().as_ref() }))
    }
}

pub(crate) struct GetterSetterMember<T, F, G, S> {
    getter: G,
    setter: S,
    _marker: PhantomData<fn(&T) -> F>,
}

impl<T, F, G, S> GetterSetterMember<T, F, G, S> {
    pub(crate) fn new(getter: G, setter: S) -> Self {
        GetterSetterMember {
            getter,
            setter,
            _marker: PhantomData,
        }
    }
}

impl<T, F, G, S> MemberAccess for GetterSetterMember<T, F, G, S>
where
    T: 'static,
    F: Clone + 'static,
    G: Fn(&T) -> F + Send + Sync,
    S: Fn(&mut T, F) + Send + Sync,
{
    fn kind(&self) -> MemberKind {
        MemberKind::GetterSetter
    }

    unsafe fn read(&self, object: NonNull<u8>, out: &mut AnyValue<'_>) {
        // SAFETY: upheld by the caller.
        unsafe {
            let value = (self.getter)(object.cast::<T>().as_ref());
            out.store(value);
        }
    }

    unsafe fn write(&self, object: NonNull<u8>, input: &AnyValue<'_>) {
        // SAFETY: upheld by the caller.
        unsafe {
            let value = input.get_unchecked::<F>().clone();
            (self.setter)(object.cast::<T>().as_mut(), value);
        }
    }

    unsafe fn read_boxed(&self, object: NonNull<u8>) -> Box<dyn Any> {
        // SAFETY: upheld by the caller.
        Box::new((self.getter)(unsafe { object.cast::<T>().as_ref() }))
    }
}

// ============================================================================
// Member
// ============================================================================

/// Member declared on a type that is still being built.
pub(crate) struct PendingMember {
    pub(crate) name: String,
    pub(crate) ty: TypeSlot,
    pub(crate) access: Box<dyn MemberAccess>,
}

impl PendingMember {
    pub(crate) fn bind(self, owner: TypeHandle) -> Member {
        Member {
            name: self.name,
            ty: self.ty.bind(owner),
            owner,
            access: self.access,
        }
    }
}

/// A named, typed value reachable from objects of its owning type.
///
/// # Example
///
/// ```rust
/// use oxidex_meta::TypeRegistry;
/// use std::mem::offset_of;
///
/// #[repr(C)]
/// struct Point { x: i32, y: i32 }
///
/// let mut registry = TypeRegistry::with_primitives();
/// // SAFETY: offsets come from `offset_of!` on `i32` fields.
/// let point = unsafe {
///     registry
///         .new_type::<Point>("Point")
///         .field::<i32>("x", offset_of!(Point, x))
///         .field::<i32>("y", offset_of!(Point, y))
/// }
/// .getter("sum", |p: &Point| p.x + p.y)
/// .build()
/// .unwrap();
/// let point = registry.register(point).unwrap();
///
/// let mut p = Point { x: 1, y: 2 };
/// let mut obj = registry.any_mut(&mut p).unwrap();
///
/// let y = point.find_member("y").unwrap();
/// y.set(&mut obj, &registry.any_value(40i32).unwrap()).unwrap();
///
/// let sum = point.find_member("sum").unwrap();
/// assert_eq!(sum.value::<i32>(&obj).unwrap(), 41);
/// ```
pub struct Member {
    name: String,
    ty: TypeHandle,
    owner: TypeHandle,
    access: Box<dyn MemberAccess>,
}

impl Member {
    /// Member name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared value type.
    #[must_use]
    pub fn value_type(&self) -> &'static TypeInfo {
        self.ty.get()
    }

    /// Type that declares the member.
    #[must_use]
    pub fn owner(&self) -> &'static TypeInfo {
        self.owner.get()
    }

    /// Access strategy.
    #[must_use]
    pub fn kind(&self) -> MemberKind {
        self.access.kind()
    }

    /// Returns `true` unless the member is a plain getter.
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        self.kind() != MemberKind::Getter
    }

    fn check_object(&self, object: &AnyValue<'_>) -> Result<&'static TypeInfo> {
        let owner = self.owner();
        match object.type_info() {
            Some(found) if found.is_same_or_derived_from(owner) => Ok(owner),
            _ => Err(Error::OwnerMismatch {
                expected: owner.name().to_string(),
                found: object.type_name().to_string(),
            }),
        }
    }

    fn check_value(&self, value: &AnyValue<'_>) -> Result<()> {
        let ty = self.value_type();
        match value.type_info() {
            Some(found) if found == ty => Ok(()),
            _ => Err(Error::TypeMismatch {
                expected: ty.name().to_string(),
                found: value.type_name().to_string(),
            }),
        }
    }

    fn validate_get(&self, object: &AnyValue<'_>, out: &AnyValue<'_>) -> Result<&'static TypeInfo> {
        let owner = self.check_object(object)?;
        self.check_value(out)?;
        if out.is_const() {
            return Err(Error::ConstViolation);
        }
        Ok(owner)
    }

    fn validate_set(&self, object: &AnyValue<'_>, input: &AnyValue<'_>) -> Result<&'static TypeInfo> {
        if !self.is_mutable() {
            return Err(Error::NotMutable {
                name: self.name.clone(),
            });
        }
        let owner = self.check_object(object)?;
        self.check_value(input)?;
        if object.is_const() {
            return Err(Error::ConstViolation);
        }
        Ok(owner)
    }

    fn rejected(&self, op: &str, err: Error) -> Error {
        trace!(
            target: "oxidex_meta::member",
            "{op} of '{}::{}' rejected: {err}",
            self.owner().name(),
            self.name
        );
        err
    }

    fn unreachable(&self, object: &AnyValue<'_>) -> Error {
        Error::BaseUnreachable {
            from: object.type_name().to_string(),
            to: self.owner().name().to_string(),
        }
    }

    /// Returns `true` if the member can be read from `object`.
    #[must_use]
    pub fn can_get(&self, object: &AnyValue<'_>) -> bool {
        self.check_object(object).is_ok()
    }

    /// Checks that [`get`](Self::get) would succeed.
    ///
    /// # Errors
    ///
    /// - [`Error::OwnerMismatch`] if `object` is not of the owning type or
    ///   derived from it
    /// - [`Error::TypeMismatch`] if `out` does not carry the value type
    /// - [`Error::ConstViolation`] if `out` is a const reference
    pub fn check_get(&self, object: &AnyValue<'_>, out: &AnyValue<'_>) -> Result<()> {
        self.validate_get(object, out).map(|_| ())
    }

    /// Reads the member of `object` into `out`.
    ///
    /// # Errors
    ///
    /// Same as [`check_get`](Self::check_get); on error `out` is unchanged.
    pub fn get(&self, object: &AnyValue<'_>, out: &mut AnyValue<'_>) -> Result<()> {
        let owner = self
            .validate_get(object, out)
            .map_err(|e| self.rejected("get", e))?;
        let ptr = object
            .pointer(owner)
            .ok_or_else(|| self.unreachable(object))?;
        // SAFETY: `ptr` addresses the owner sub-object of `object`, and `out`
        // was checked to be a mutable handle of the value type.
        unsafe { self.access.read(ptr, out) };
        Ok(())
    }

    /// Reads the member of `object` as a Rust value.
    ///
    /// # Errors
    ///
    /// [`Error::OwnerMismatch`] as for [`get`](Self::get), or
    /// [`Error::TypeMismatch`] if `F` is not the declared value type.
    pub fn value<F: 'static>(&self, object: &AnyValue<'_>) -> Result<F> {
        let owner = self
            .check_object(object)
            .map_err(|e| self.rejected("get", e))?;
        let ty = self.value_type();
        let mismatch = || Error::TypeMismatch {
            expected: ty.name().to_string(),
            found: std::any::type_name::<F>().to_string(),
        };
        if ty.type_id() != TypeId::of::<F>() {
            return Err(self.rejected("get", mismatch()));
        }
        let ptr = object
            .pointer(owner)
            .ok_or_else(|| self.unreachable(object))?;
        // SAFETY: `ptr` addresses the owner sub-object of `object`.
        let boxed = unsafe { self.access.read_boxed(ptr) };
        boxed.downcast::<F>().map(|b| *b).map_err(|_| mismatch())
    }

    /// Returns `true` if `input` can be written into the member of `object`.
    #[must_use]
    pub fn can_set(&self, object: &AnyValue<'_>, input: &AnyValue<'_>) -> bool {
        self.validate_set(object, input).is_ok()
    }

    /// Checks that [`set`](Self::set) would succeed.
    ///
    /// # Errors
    ///
    /// - [`Error::NotMutable`] if the member is a plain getter
    /// - [`Error::OwnerMismatch`] if `object` is not of the owning type or
    ///   derived from it
    /// - [`Error::TypeMismatch`] if `input` does not carry the value type
    /// - [`Error::ConstViolation`] if `object` is a const reference
    pub fn check_set(&self, object: &AnyValue<'_>, input: &AnyValue<'_>) -> Result<()> {
        self.validate_set(object, input).map(|_| ())
    }

    /// Writes the value held by `input` into the member of `object`.
    ///
    /// # Errors
    ///
    /// Same as [`check_set`](Self::check_set); on error `object` is unchanged.
    pub fn set(&self, object: &mut AnyValue<'_>, input: &AnyValue<'_>) -> Result<()> {
        let owner = self
            .validate_set(object, input)
            .map_err(|e| self.rejected("set", e))?;
        let ptr = object
            .pointer_mut(owner)
            .ok_or_else(|| self.unreachable(object))?;
        // SAFETY: `ptr` is the writable owner sub-object of `object` and
        // `input` carries the value type.
        unsafe { self.access.write(ptr, input) };
        Ok(())
    }

    /// Writes a Rust value into the member of `object`.
    ///
    /// # Errors
    ///
    /// [`Error::TypeMismatch`] if `F` is not the declared value type, then
    /// the same errors as [`set`](Self::set).
    pub fn set_value<F: 'static>(&self, object: &mut AnyValue<'_>, value: F) -> Result<()> {
        let input = AnyValue::from_ref(self.value_type(), &value)
            .map_err(|e| self.rejected("set", e))?;
        self.set(object, &input)
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("type", &self.value_type().name())
            .field("owner", &self.owner().name())
            .field("kind", &self.kind())
            .finish()
    }
}
