//! Type-erased value handles.
//!
//! [`AnyValue`] is the only currency that crosses the generic boundary of the
//! engine: objects, member values, call arguments and call results are all
//! passed as `AnyValue`s. A handle is one of four shapes:
//!
//! - **Void** - no value at all
//! - **`ByValue`** - a small `Copy` value stored inline in the handle
//! - **`MutableReference`** - an exclusive borrow of external storage
//! - **`ConstReference`** - a shared borrow of external storage
//!
//! Every non-void handle carries the [`TypeInfo`] of the value it holds. The
//! pointer handed out for a given target type is computed lazily, at the
//! moment of access, by walking the stored type's base relations. A handle
//! built once for a derived object can therefore be read as any of its
//! ancestors without being rebuilt.
//!
//! # Lifetimes
//!
//! Reference handles borrow their referent for `'a`, exactly like the `&'a T`
//! or `&'a mut T` they were built from. Handles are not `Clone`; use
//! [`AnyValue::reborrow`] to pass the same value to several calls.
//!
//! # Example
//!
//! ```rust
//! use oxidex_meta::{AnyTag, AnyValue, TypeRegistry};
//!
//! let registry = TypeRegistry::with_primitives();
//! let mut n = 7i32;
//!
//! let handle = registry.any_mut(&mut n).unwrap();
//! assert_eq!(handle.tag(), AnyTag::MutableReference);
//! assert_eq!(handle.downcast_ref::<i32>(), Some(&7));
//!
//! let inline = registry.any_value(2.5f32).unwrap();
//! assert_eq!(inline.value::<f32>(), Some(2.5));
//! ```

use crate::error::{Error, Result};
use crate::reflect::TypeInfo;
use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, MaybeUninit};
use std::ptr::NonNull;

/// Largest by-value payload, in bytes, an [`AnyValue`] stores inline.
pub const INLINE_CAPACITY: usize = 32;

/// Strictest alignment, in bytes, an inline payload may require.
pub const INLINE_ALIGN: usize = 16;

/// Inline storage for by-value payloads.
#[derive(Clone, Copy)]
#[repr(C, align(16))]
struct InlineStorage([MaybeUninit<u8>; INLINE_CAPACITY]);

const _: () = assert!(mem::align_of::<InlineStorage>() == INLINE_ALIGN);

/// Shape of an [`AnyValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnyTag {
    /// No value.
    Void,
    /// Inline copy owned by the handle.
    ByValue,
    /// Exclusive borrow of external storage.
    MutableReference,
    /// Shared borrow of external storage.
    ConstReference,
}

enum Repr<'a> {
    Void,
    ByValue {
        ty: &'static TypeInfo,
        storage: InlineStorage,
    },
    MutableReference {
        ty: &'static TypeInfo,
        ptr: NonNull<u8>,
        _borrow: PhantomData<&'a mut u8>,
    },
    ConstReference {
        ty: &'static TypeInfo,
        ptr: NonNull<u8>,
        _borrow: PhantomData<&'a u8>,
    },
}

/// A type-erased handle to a value.
///
/// See the [module documentation](self) for the four handle shapes.
pub struct AnyValue<'a> {
    repr: Repr<'a>,
}

fn check_described<T: 'static>(ty: &TypeInfo) -> Result<()> {
    if ty.type_id() == TypeId::of::<T>() {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            expected: ty.name().to_string(),
            found: std::any::type_name::<T>().to_string(),
        })
    }
}

impl<'a> AnyValue<'a> {
    /// Returns the void handle.
    #[must_use]
    pub const fn void() -> Self {
        AnyValue { repr: Repr::Void }
    }

    /// Wraps an exclusive borrow.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if `ty` does not describe `T`.
    pub fn from_mut<T: 'static>(ty: &'static TypeInfo, value: &'a mut T) -> Result<Self> {
        check_described::<T>(ty)?;
        // SAFETY: the pointer comes from a live `&'a mut T` whose borrow is
        // carried by the handle and `ty` describes `T`.
        Ok(unsafe { Self::mutable_raw(ty, NonNull::from(value).cast()) })
    }

    /// Wraps a shared borrow.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if `ty` does not describe `T`.
    pub fn from_ref<T: 'static>(ty: &'static TypeInfo, value: &'a T) -> Result<Self> {
        check_described::<T>(ty)?;
        // SAFETY: as in `from_mut`, for a shared borrow.
        Ok(unsafe { Self::const_raw(ty, NonNull::from(value).cast()) })
    }

    /// Copies a small value into the handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if `ty` does not describe `T`, or
    /// [`Error::ValueTooLarge`] if `T` exceeds [`INLINE_CAPACITY`] bytes or
    /// requires an alignment above [`INLINE_ALIGN`].
    pub fn from_value<T: Copy + 'static>(ty: &'static TypeInfo, value: T) -> Result<Self> {
        check_described::<T>(ty)?;
        if mem::size_of::<T>() > INLINE_CAPACITY || mem::align_of::<T>() > INLINE_ALIGN {
            return Err(Error::ValueTooLarge {
                size: mem::size_of::<T>(),
                align: mem::align_of::<T>(),
                capacity: INLINE_CAPACITY,
            });
        }

        let mut storage = InlineStorage([MaybeUninit::uninit(); INLINE_CAPACITY]);
        // SAFETY: size and alignment were checked above and the storage is
        // aligned to INLINE_ALIGN.
        unsafe { storage.0.as_mut_ptr().cast::<T>().write(value) };

        Ok(AnyValue {
            repr: Repr::ByValue { ty, storage },
        })
    }

    /// Builds a mutable handle from a raw pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live value described by `ty` and be valid for
    /// reads and writes, without other access, for `'a`.
    pub(crate) unsafe fn mutable_raw(ty: &'static TypeInfo, ptr: NonNull<u8>) -> Self {
        AnyValue {
            repr: Repr::MutableReference {
                ty,
                ptr,
                _borrow: PhantomData,
            },
        }
    }

    /// Builds a const handle from a raw pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a live value described by `ty` and be valid for
    /// reads for `'a`.
    pub(crate) unsafe fn const_raw(ty: &'static TypeInfo, ptr: NonNull<u8>) -> Self {
        AnyValue {
            repr: Repr::ConstReference {
                ty,
                ptr,
                _borrow: PhantomData,
            },
        }
    }

    /// Shape of the handle.
    #[must_use]
    pub fn tag(&self) -> AnyTag {
        match self.repr {
            Repr::Void => AnyTag::Void,
            Repr::ByValue { .. } => AnyTag::ByValue,
            Repr::MutableReference { .. } => AnyTag::MutableReference,
            Repr::ConstReference { .. } => AnyTag::ConstReference,
        }
    }

    /// Type of the held value, `None` for void.
    #[must_use]
    pub fn type_info(&self) -> Option<&'static TypeInfo> {
        match self.repr {
            Repr::Void => None,
            Repr::ByValue { ty, .. }
            | Repr::MutableReference { ty, .. }
            | Repr::ConstReference { ty, .. } => Some(ty),
        }
    }

    /// Name of the held type, `"void"` for void.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_info().map_or("void", TypeInfo::name)
    }

    /// Returns `true` for the void handle.
    #[must_use]
    pub fn is_void(&self) -> bool {
        matches!(self.repr, Repr::Void)
    }

    /// Returns `true` only for const references.
    #[must_use]
    pub fn is_const(&self) -> bool {
        matches!(self.repr, Repr::ConstReference { .. })
    }

    /// Returns `true` for mutable references and inline values.
    #[must_use]
    pub fn is_mutable(&self) -> bool {
        matches!(
            self.repr,
            Repr::ByValue { .. } | Repr::MutableReference { .. }
        )
    }

    /// Unadjusted pointer to the payload, readable only.
    fn raw(&self) -> Option<NonNull<u8>> {
        match &self.repr {
            Repr::Void => None,
            Repr::ByValue { storage, .. } => Some(NonNull::from(&storage.0).cast()),
            Repr::MutableReference { ptr, .. } | Repr::ConstReference { ptr, .. } => Some(*ptr),
        }
    }

    /// Unadjusted pointer to the payload, writable; `None` for const and void.
    fn raw_mut(&mut self) -> Option<NonNull<u8>> {
        match &mut self.repr {
            Repr::Void | Repr::ConstReference { .. } => None,
            Repr::ByValue { storage, .. } => Some(NonNull::from(&mut storage.0).cast()),
            Repr::MutableReference { ptr, .. } => Some(*ptr),
        }
    }

    /// Pointer to the payload viewed as `for_type`.
    ///
    /// The stored type is adjusted to `for_type` through its base relations.
    /// Returns `None` for void or when `for_type` is neither the stored type
    /// nor one of its ancestors. The pointer is only valid for reads, and only
    /// while `self` is neither moved nor mutably borrowed.
    #[must_use]
    pub fn pointer(&self, for_type: &TypeInfo) -> Option<NonNull<u8>> {
        let ty = self.type_info()?;
        ty.adjust(for_type, self.raw()?)
    }

    /// Writable pointer to the payload viewed as `for_type`.
    ///
    /// Returns `None` for void, const references and unrelated types.
    #[must_use]
    pub fn pointer_mut(&mut self, for_type: &TypeInfo) -> Option<NonNull<u8>> {
        let ty = self.type_info()?;
        ty.adjust(for_type, self.raw_mut()?)
    }

    /// Borrows the payload as `U`, which may be the stored type or any
    /// ancestor of it.
    #[must_use]
    pub fn downcast_ref<U: 'static>(&self) -> Option<&U> {
        let target = self.type_info()?.ancestor_by_id(TypeId::of::<U>())?;
        let ptr = self.pointer(target)?;
        // SAFETY: `target` describes `U` and the pointer was adjusted to the
        // `U` sub-object of a live payload borrowed through `self`.
        Some(unsafe { ptr.cast::<U>().as_ref() })
    }

    /// Mutably borrows the payload as `U`; `None` for const handles.
    #[must_use]
    pub fn downcast_mut<U: 'static>(&mut self) -> Option<&mut U> {
        let target = self.type_info()?.ancestor_by_id(TypeId::of::<U>())?;
        let ptr = self.pointer_mut(target)?;
        // SAFETY: as in `downcast_ref`, and the handle grants write access.
        Some(unsafe { ptr.cast::<U>().as_mut() })
    }

    /// Clones the payload out as `U`.
    #[must_use]
    pub fn value<U: Clone + 'static>(&self) -> Option<U> {
        self.downcast_ref::<U>().cloned()
    }

    /// Returns a shorter-lived handle to the same payload.
    ///
    /// Inline values reborrow as mutable references to the inline storage,
    /// so writes through the new handle land in `self`.
    pub fn reborrow(&mut self) -> AnyValue<'_> {
        match &mut self.repr {
            Repr::Void => AnyValue::void(),
            Repr::ByValue { ty, storage } => {
                let ptr = NonNull::from(&mut storage.0).cast();
                // SAFETY: the storage holds a `ty` value and is exclusively
                // borrowed for the returned lifetime.
                unsafe { AnyValue::mutable_raw(*ty, ptr) }
            }
            Repr::MutableReference { ty, ptr, .. } => {
                // SAFETY: the exclusive borrow is re-lent for a shorter lifetime.
                unsafe { AnyValue::mutable_raw(*ty, *ptr) }
            }
            Repr::ConstReference { ty, ptr, .. } => {
                // SAFETY: shared borrows may be duplicated.
                unsafe { AnyValue::const_raw(*ty, *ptr) }
            }
        }
    }

    /// Borrows the payload as exactly `U` without a type check.
    ///
    /// # Safety
    ///
    /// The handle must be non-void and its stored type must describe `U`.
    pub(crate) unsafe fn get_unchecked<U>(&self) -> &U {
        // SAFETY: upheld by the caller.
        unsafe { self.raw().unwrap_unchecked().cast::<U>().as_ref() }
    }

    /// Mutably borrows the payload as exactly `U` without a type check.
    ///
    /// # Safety
    ///
    /// The handle must be mutable and its stored type must describe `U`.
    pub(crate) unsafe fn get_mut_unchecked<U>(&mut self) -> &mut U {
        // SAFETY: upheld by the caller.
        unsafe { self.raw_mut().unwrap_unchecked().cast::<U>().as_mut() }
    }

    /// Replaces the payload with `value`.
    ///
    /// # Safety
    ///
    /// Same contract as [`get_mut_unchecked`](Self::get_mut_unchecked).
    pub(crate) unsafe fn store<U>(&mut self, value: U) {
        // SAFETY: upheld by the caller; the old payload is a live `U` and is
        // dropped by the assignment.
        unsafe { *self.get_mut_unchecked::<U>() = value };
    }
}

impl Default for AnyValue<'_> {
    fn default() -> Self {
        AnyValue::void()
    }
}

impl fmt::Debug for AnyValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyValue")
            .field("tag", &self.tag())
            .field("type", &self.type_name())
            .finish()
    }
}
