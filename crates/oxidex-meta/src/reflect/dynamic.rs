//! Dynamic type lookup.
//!
//! A value behind a trait object has no statically known type. Types that
//! implement [`DynamicType`] report their own most-derived [`TypeInfo`], so a
//! `&mut dyn DynamicType` can be wrapped in an [`AnyValue`] that exposes the
//! full member and method set of the concrete type.
//!
//! The reported descriptor is checked against the concrete value's
//! [`TypeId`] before a handle is built. A wrong report is an error, never a
//! mistyped pointer.
//!
//! [`TypeId`]: std::any::TypeId

use crate::error::{Error, Result};
use crate::reflect::{AnyValue, TypeInfo};
use std::any::{Any, type_name};
use std::ptr::NonNull;

/// Upcast to [`Any`], implemented for every sized `'static` type.
pub trait AsAny: Any {
    /// Borrows `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;

    /// Borrows `self` as `&mut dyn Any`.
    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Rust name of the concrete type.
    fn concrete_type_name(&self) -> &'static str;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn concrete_type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// Values that know their own registered type.
///
/// # Example
///
/// ```rust
/// use oxidex_meta::{AnyValue, DynamicType, TypeInfo, TypeRegistry};
/// use std::sync::OnceLock;
///
/// struct Sprite { frame: u32 }
///
/// static SPRITE: OnceLock<&'static TypeInfo> = OnceLock::new();
///
/// impl DynamicType for Sprite {
///     fn dynamic_type(&self) -> &'static TypeInfo {
///         SPRITE.get().copied().expect("Sprite is registered at startup")
///     }
/// }
///
/// let mut registry = TypeRegistry::with_primitives();
/// let sprite = registry
///     .new_type::<Sprite>("Sprite")
///     .getter("frame", |s: &Sprite| s.frame)
///     .build()
///     .unwrap();
/// SPRITE.set(registry.register(sprite).unwrap()).unwrap();
///
/// let mut boxed: Box<dyn DynamicType> = Box::new(Sprite { frame: 3 });
/// let handle = AnyValue::from_dyn_mut(boxed.as_mut()).unwrap();
/// let ty = handle.type_info().unwrap();
/// assert_eq!(ty.find_member("frame").unwrap().value::<u32>(&handle), Ok(3));
/// ```
pub trait DynamicType: AsAny {
    /// Most-derived registered type of `self`.
    fn dynamic_type(&self) -> &'static TypeInfo;
}

/// Resolves and verifies the reported type of `value`.
///
/// # Errors
///
/// Returns [`Error::TypeMismatch`] if the reported descriptor does not
/// describe the concrete type of `value`.
pub fn dynamic_type_of(value: &(dyn DynamicType + 'static)) -> Result<&'static TypeInfo> {
    let info = value.dynamic_type();
    if value.as_any().type_id() == info.type_id() {
        Ok(info)
    } else {
        Err(Error::TypeMismatch {
            expected: info.name().to_string(),
            found: value.concrete_type_name().to_string(),
        })
    }
}

impl<'a> AnyValue<'a> {
    /// Wraps an exclusive borrow of a trait object, typed by its dynamic
    /// type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the value reports a descriptor that
    /// does not describe it.
    pub fn from_dyn_mut(value: &'a mut (dyn DynamicType + 'static)) -> Result<Self> {
        let info = dynamic_type_of(&*value)?;
        let ptr = NonNull::from(value.as_any_mut()).cast::<u8>();
        // SAFETY: `ptr` is the data pointer of a live, exclusively borrowed
        // value whose concrete type `info` was just verified to describe.
        Ok(unsafe { AnyValue::mutable_raw(info, ptr) })
    }

    /// Wraps a shared borrow of a trait object, typed by its dynamic type.
    ///
    /// # Errors
    ///
    /// Same as [`from_dyn_mut`](Self::from_dyn_mut).
    pub fn from_dyn_ref(value: &'a (dyn DynamicType + 'static)) -> Result<Self> {
        let info = dynamic_type_of(value)?;
        let ptr = NonNull::from(value.as_any()).cast::<u8>();
        // SAFETY: as above, for a shared borrow.
        Ok(unsafe { AnyValue::const_raw(info, ptr) })
    }
}
