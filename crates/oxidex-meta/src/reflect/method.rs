//! Reflected methods.
//!
//! Every method, whatever its arity, has the same shape: a receiver mode, a
//! list of typed parameters, an optional return type and a type-erased
//! invoker. Calls go through [`Method::call`], which validates the object,
//! every argument and the output handle before the invoker runs.
//!
//! # Registering methods
//!
//! Plain closures with by-value parameters register directly. The receiver
//! and parameter types must be annotated:
//!
//! ```rust
//! use oxidex_meta::TypeRegistry;
//!
//! struct Counter { n: i64 }
//!
//! let mut registry = TypeRegistry::with_primitives();
//! let counter = registry
//!     .new_type::<Counter>("Counter")
//!     .method("add", |c: &mut Counter, by: i64| c.n += by)
//!     .const_method("peek", |c: &Counter| c.n)
//!     .build()
//!     .unwrap();
//! let counter = registry.register(counter).unwrap();
//!
//! let mut c = Counter { n: 1 };
//! let mut obj = registry.any_mut(&mut c).unwrap();
//! let mut args = [registry.any_value(41i64).unwrap()];
//! counter.find_method("add").unwrap().call(&mut obj, &mut args, None).unwrap();
//!
//! let mut out = registry.any_value(0i64).unwrap();
//! counter
//!     .find_method("peek")
//!     .unwrap()
//!     .call(&mut obj, &mut [], Some(&mut out))
//!     .unwrap();
//! assert_eq!(out.value::<i64>(), Some(42));
//! ```
//!
//! Parameters taken by reference are declared with [`Params`] and read
//! through [`Args`]; see [`TypeInfoBuilder::method_with`].
//!
//! [`TypeInfoBuilder::method_with`]: crate::reflect::TypeInfoBuilder::method_with

use crate::error::{Error, Result};
use crate::reflect::type_info::{TypeHandle, TypeSlot};
use crate::reflect::{AnyValue, TypeInfo};
use oxidex_log::trace;
use std::any::{TypeId, type_name};
use std::fmt;
use std::ptr::NonNull;

/// Highest arity accepted by typed closure registration.
pub const MAX_ARITY: usize = 8;

/// How an argument is handed to the callable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Passing {
    /// A clone of the argument.
    Value,
    /// A shared borrow of the argument.
    Ref,
    /// An exclusive borrow of the argument; the argument handle must be
    /// mutable.
    Mut,
}

/// How the callable borrows the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Receiver {
    /// `&T`
    Shared,
    /// `&mut T`; const object handles are rejected.
    Exclusive,
}

/// Type-erased callable behind a [`Method`].
///
/// Receives the object pointer already adjusted to the owner type, the
/// validated arguments and, for non-void methods, the output handle.
#[doc(hidden)]
pub type Invoker =
    Box<dyn Fn(NonNull<u8>, &mut [AnyValue<'_>], Option<&mut AnyValue<'_>>) + Send + Sync>;

/// Rust type recorded before it is resolved against a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TypeKey {
    pub(crate) id: TypeId,
    pub(crate) name: &'static str,
}

impl TypeKey {
    pub(crate) fn of<T: 'static>() -> Self {
        TypeKey {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// `None` for `()`, which declares a void method.
    pub(crate) fn of_return<R: 'static>() -> Option<Self> {
        (TypeId::of::<R>() != TypeId::of::<()>()).then(Self::of::<R>)
    }
}

/// Unresolved parameter and return types of a callable.
#[doc(hidden)]
pub struct Signature {
    pub(crate) ret: Option<TypeKey>,
    pub(crate) params: Vec<(TypeKey, Passing)>,
}

/// Closures usable as methods with an exclusive receiver.
///
/// Implemented for `Fn(&mut T, A0, .., An) -> R` with up to [`MAX_ARITY`]
/// by-value parameters. `Marker` only disambiguates the arities.
pub trait IntoMethod<T, Marker>: Send + Sync + 'static {
    #[doc(hidden)]
    fn signature() -> Signature;
    #[doc(hidden)]
    fn into_invoker(self) -> Invoker;
}

/// Closures usable as methods with a shared receiver.
///
/// Implemented for `Fn(&T, A0, .., An) -> R` with up to [`MAX_ARITY`]
/// by-value parameters.
pub trait IntoConstMethod<T, Marker>: Send + Sync + 'static {
    #[doc(hidden)]
    fn signature() -> Signature;
    #[doc(hidden)]
    fn into_invoker(self) -> Invoker;
}

macro_rules! impl_into_method {
    ($arity:literal $(, $arg:ident $idx:tt)*) => {
        impl<T, Func, R, $($arg,)*> IntoMethod<T, fn($($arg,)*) -> R> for Func
        where
            T: 'static,
            Func: Fn(&mut T, $($arg),*) -> R + Send + Sync + 'static,
            R: 'static,
            $($arg: Clone + 'static,)*
        {
            fn signature() -> Signature {
                Signature {
                    ret: TypeKey::of_return::<R>(),
                    params: vec![$((TypeKey::of::<$arg>(), Passing::Value)),*],
                }
            }

            fn into_invoker(self) -> Invoker {
                let func = self;
                Box::new(
                    move |object: NonNull<u8>,
                          args: &mut [AnyValue<'_>],
                          out: Option<&mut AnyValue<'_>>| {
                        debug_assert_eq!(args.len(), $arity);
                        // SAFETY: `Method::call` checked the object, every
                        // argument and the output against `signature()`.
                        unsafe {
                            let result = func(
                                object.cast::<T>().as_mut(),
                                $(args[$idx].get_unchecked::<$arg>().clone()),*
                            );
                            if let Some(out) = out {
                                out.store(result);
                            }
                        }
                    },
                )
            }
        }

        impl<T, Func, R, $($arg,)*> IntoConstMethod<T, fn($($arg,)*) -> R> for Func
        where
            T: 'static,
            Func: Fn(&T, $($arg),*) -> R + Send + Sync + 'static,
            R: 'static,
            $($arg: Clone + 'static,)*
        {
            fn signature() -> Signature {
                Signature {
                    ret: TypeKey::of_return::<R>(),
                    params: vec![$((TypeKey::of::<$arg>(), Passing::Value)),*],
                }
            }

            fn into_invoker(self) -> Invoker {
                let func = self;
                Box::new(
                    move |object: NonNull<u8>,
                          args: &mut [AnyValue<'_>],
                          out: Option<&mut AnyValue<'_>>| {
                        debug_assert_eq!(args.len(), $arity);
                        // SAFETY: as above.
                        unsafe {
                            let result = func(
                                object.cast::<T>().as_ref(),
                                $(args[$idx].get_unchecked::<$arg>().clone()),*
                            );
                            if let Some(out) = out {
                                out.store(result);
                            }
                        }
                    },
                )
            }
        }
    };
}

impl_into_method!(0);
impl_into_method!(1, A0 0);
impl_into_method!(2, A0 0, A1 1);
impl_into_method!(3, A0 0, A1 1, A2 2);
impl_into_method!(4, A0 0, A1 1, A2 2, A3 3);
impl_into_method!(5, A0 0, A1 1, A2 2, A3 3, A4 4);
impl_into_method!(6, A0 0, A1 1, A2 2, A3 3, A4 4, A5 5);
impl_into_method!(7, A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6);
impl_into_method!(8, A0 0, A1 1, A2 2, A3 3, A4 4, A5 5, A6 6, A7 7);

// ============================================================================
// Explicit parameter lists
// ============================================================================

/// Parameter list for methods taking arguments by reference.
///
/// ```rust
/// use oxidex_meta::{Params, Passing};
///
/// let params = Params::new().by_ref::<String>().by_mut::<Vec<u8>>().value::<u8>();
/// assert_eq!(params.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Params {
    entries: Vec<(TypeKey, Passing)>,
}

impl Params {
    /// Empty parameter list.
    #[must_use]
    pub fn new() -> Self {
        Params::default()
    }

    /// Appends a by-value parameter.
    #[must_use]
    pub fn value<A: 'static>(mut self) -> Self {
        self.entries.push((TypeKey::of::<A>(), Passing::Value));
        self
    }

    /// Appends a shared-reference parameter.
    #[must_use]
    pub fn by_ref<A: 'static>(mut self) -> Self {
        self.entries.push((TypeKey::of::<A>(), Passing::Ref));
        self
    }

    /// Appends an exclusive-reference parameter.
    #[must_use]
    pub fn by_mut<A: 'static>(mut self) -> Self {
        self.entries.push((TypeKey::of::<A>(), Passing::Mut));
        self
    }

    /// Number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` for an empty list.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn entries(&self) -> &[(TypeKey, Passing)] {
        &self.entries
    }
}

/// Typed view of the validated arguments of a call.
///
/// Accessors return `None` when the index is out of range or `U` is not the
/// declared type of that parameter.
pub struct Args<'s, 'a> {
    values: &'s mut [AnyValue<'a>],
    params: &'s [(TypeKey, Passing)],
}

impl<'s, 'a> Args<'s, 'a> {
    fn declared<U: 'static>(&self, index: usize) -> Option<Passing> {
        let (key, passing) = self.params.get(index)?;
        (key.id == TypeId::of::<U>() && index < self.values.len()).then_some(*passing)
    }

    /// Number of arguments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` when the call has no arguments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Borrows argument `index`.
    #[must_use]
    pub fn get<U: 'static>(&self, index: usize) -> Option<&U> {
        self.declared::<U>(index)?;
        // SAFETY: the argument was validated against its declared type.
        Some(unsafe { self.values[index].get_unchecked::<U>() })
    }

    /// Mutably borrows argument `index`; only parameters declared with
    /// [`Params::by_mut`] can be borrowed this way.
    #[must_use]
    pub fn get_mut<U: 'static>(&mut self, index: usize) -> Option<&mut U> {
        if self.declared::<U>(index)? != Passing::Mut {
            return None;
        }
        // SAFETY: the argument was validated against its declared type and
        // checked to be mutable.
        Some(unsafe { self.values[index].get_mut_unchecked::<U>() })
    }

    /// Clones argument `index`.
    #[must_use]
    pub fn value<U: Clone + 'static>(&self, index: usize) -> Option<U> {
        self.get::<U>(index).cloned()
    }
}

pub(crate) fn exclusive_invoker<T, R, F>(params: &Params, func: F) -> Invoker
where
    T: 'static,
    R: 'static,
    F: Fn(&mut T, &mut Args<'_, '_>) -> R + Send + Sync + 'static,
{
    let params = params.entries().to_vec();
    Box::new(
        move |object: NonNull<u8>, values: &mut [AnyValue<'_>], out: Option<&mut AnyValue<'_>>| {
            let mut args = Args {
                values,
                params: &params,
            };
            // SAFETY: `Method::call` checked the object and output handles.
            unsafe {
                let result = func(object.cast::<T>().as_mut(), &mut args);
                if let Some(out) = out {
                    out.store(result);
                }
            }
        },
    )
}

pub(crate) fn shared_invoker<T, R, F>(params: &Params, func: F) -> Invoker
where
    T: 'static,
    R: 'static,
    F: Fn(&T, &mut Args<'_, '_>) -> R + Send + Sync + 'static,
{
    let params = params.entries().to_vec();
    Box::new(
        move |object: NonNull<u8>, values: &mut [AnyValue<'_>], out: Option<&mut AnyValue<'_>>| {
            let mut args = Args {
                values,
                params: &params,
            };
            // SAFETY: as above.
            unsafe {
                let result = func(object.cast::<T>().as_ref(), &mut args);
                if let Some(out) = out {
                    out.store(result);
                }
            }
        },
    )
}

// ============================================================================
// Method
// ============================================================================

/// A declared parameter.
#[derive(Clone, Copy)]
pub struct Param {
    ty: TypeHandle,
    passing: Passing,
}

impl Param {
    /// Declared parameter type.
    #[must_use]
    pub fn value_type(&self) -> &'static TypeInfo {
        self.ty.get()
    }

    /// How the argument is handed over.
    #[must_use]
    pub fn passing(&self) -> Passing {
        self.passing
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Param")
            .field("type", &self.value_type().name())
            .field("passing", &self.passing)
            .finish()
    }
}

/// Method declared on a type that is still being built.
pub(crate) struct PendingMethod {
    pub(crate) name: String,
    pub(crate) receiver: Receiver,
    pub(crate) ret: Option<TypeSlot>,
    pub(crate) params: Vec<(TypeSlot, Passing)>,
    pub(crate) invoke: Invoker,
}

impl PendingMethod {
    pub(crate) fn bind(self, owner: TypeHandle) -> Method {
        Method {
            name: self.name,
            receiver: self.receiver,
            ret: self.ret.map(|slot| slot.bind(owner)),
            params: self
                .params
                .into_iter()
                .map(|(slot, passing)| Param {
                    ty: slot.bind(owner),
                    passing,
                })
                .collect(),
            owner,
            invoke: self.invoke,
        }
    }
}

/// A named, typed operation callable on objects of its owning type.
pub struct Method {
    name: String,
    receiver: Receiver,
    ret: Option<TypeHandle>,
    params: Vec<Param>,
    owner: TypeHandle,
    invoke: Invoker,
}

impl Method {
    /// Method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type that declares the method.
    #[must_use]
    pub fn owner(&self) -> &'static TypeInfo {
        self.owner.get()
    }

    /// Receiver mode.
    #[must_use]
    pub fn receiver(&self) -> Receiver {
        self.receiver
    }

    /// Declared return type, `None` for void methods.
    #[must_use]
    pub fn return_type(&self) -> Option<&'static TypeInfo> {
        self.ret.map(TypeHandle::get)
    }

    /// Returns `true` if the method returns nothing.
    #[must_use]
    pub fn is_void(&self) -> bool {
        self.ret.is_none()
    }

    /// Declared parameters in order.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Type of parameter `index`.
    #[must_use]
    pub fn param_type(&self, index: usize) -> Option<&'static TypeInfo> {
        self.params.get(index).map(Param::value_type)
    }

    /// Number of declared parameters.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    fn validate(
        &self,
        object: &AnyValue<'_>,
        args: &[AnyValue<'_>],
        out: Option<&AnyValue<'_>>,
    ) -> Result<&'static TypeInfo> {
        let owner = self.owner();
        match object.type_info() {
            Some(found) if found.is_same_or_derived_from(owner) => {}
            _ => {
                return Err(Error::OwnerMismatch {
                    expected: owner.name().to_string(),
                    found: object.type_name().to_string(),
                });
            }
        }
        if self.receiver == Receiver::Exclusive && !object.is_mutable() {
            return Err(Error::ConstViolation);
        }

        if args.len() != self.params.len() {
            return Err(Error::ArityMismatch {
                expected: self.params.len(),
                got: args.len(),
            });
        }
        for (index, (param, arg)) in self.params.iter().zip(args).enumerate() {
            let expected = param.value_type();
            if arg.type_info() != Some(expected) {
                return Err(Error::ArgumentMismatch {
                    index,
                    expected: expected.name().to_string(),
                    found: arg.type_name().to_string(),
                });
            }
            if param.passing == Passing::Mut && !arg.is_mutable() {
                return Err(Error::ConstViolation);
            }
        }

        match (self.return_type(), out) {
            (_, None) => {}
            (_, Some(out)) if out.is_void() => {}
            (None, Some(_)) => {
                return Err(Error::NotMutable {
                    name: self.name.clone(),
                });
            }
            (Some(ret), Some(out)) => {
                if out.type_info() != Some(ret) {
                    return Err(Error::TypeMismatch {
                        expected: ret.name().to_string(),
                        found: out.type_name().to_string(),
                    });
                }
                if out.is_const() {
                    return Err(Error::ConstViolation);
                }
            }
        }

        Ok(owner)
    }

    /// Returns `true` if [`call`](Self::call) would succeed.
    #[must_use]
    pub fn can_call(
        &self,
        object: &AnyValue<'_>,
        args: &[AnyValue<'_>],
        out: Option<&AnyValue<'_>>,
    ) -> bool {
        self.validate(object, args, out).is_ok()
    }

    /// Checks that [`call`](Self::call) would succeed.
    ///
    /// # Errors
    ///
    /// The first violated rule, in this order:
    ///
    /// - [`Error::OwnerMismatch`] if `object` is not of the owning type or
    ///   derived from it
    /// - [`Error::ConstViolation`] if the receiver is exclusive and `object`
    ///   is a const reference
    /// - [`Error::ArityMismatch`] if `args.len()` differs from the arity
    /// - [`Error::ArgumentMismatch`] if an argument's type is not exactly the
    ///   parameter type
    /// - [`Error::ConstViolation`] if a by-`Mut` argument is a const reference
    /// - [`Error::NotMutable`] if a non-void output is given to a void method
    /// - [`Error::TypeMismatch`] or [`Error::ConstViolation`] if the output
    ///   does not fit the return type
    pub fn check_call(
        &self,
        object: &AnyValue<'_>,
        args: &[AnyValue<'_>],
        out: Option<&AnyValue<'_>>,
    ) -> Result<()> {
        self.validate(object, args, out).map(|_| ())
    }

    /// Invokes the method on `object`.
    ///
    /// The result of a non-void method is written into `out`; with no
    /// output, or a void one, it is dropped.
    ///
    /// # Errors
    ///
    /// Same as [`check_call`](Self::check_call). Nothing is invoked and no
    /// handle is touched on error.
    pub fn call(
        &self,
        object: &mut AnyValue<'_>,
        args: &mut [AnyValue<'_>],
        out: Option<&mut AnyValue<'_>>,
    ) -> Result<()> {
        let owner = self
            .validate(object, args, out.as_deref())
            .map_err(|err| {
                trace!(
                    target: "oxidex_meta::method",
                    "call of '{}::{}' rejected: {err}",
                    self.owner().name(),
                    self.name
                );
                err
            })?;

        let ptr = match self.receiver {
            Receiver::Exclusive => object.pointer_mut(owner),
            Receiver::Shared => object.pointer(owner),
        }
        .ok_or_else(|| Error::BaseUnreachable {
            from: object.type_name().to_string(),
            to: owner.name().to_string(),
        })?;

        let out = out.filter(|out| self.ret.is_some() && !out.is_void());
        (self.invoke)(ptr, args, out);
        Ok(())
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("owner", &self.owner().name())
            .field("receiver", &self.receiver)
            .field("return", &self.return_type().map(TypeInfo::name))
            .field("params", &self.params)
            .finish()
    }
}
