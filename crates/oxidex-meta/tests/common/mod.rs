// Common test utilities for integration tests
//
// This module provides the shared fixture types and a registry that
// describes them, for use across all integration tests.

#![allow(dead_code)]

use oxidex_meta::{Params, TypeInfo, TypeRegistry};
use std::mem::offset_of;
use std::sync::atomic::{AtomicUsize, Ordering};

static TEST_ID: AtomicUsize = AtomicUsize::new(0);

/// Returns `prefix` with a process-unique suffix.
pub fn unique_name(prefix: &str) -> String {
    format!("{prefix}_{}", TEST_ID.fetch_add(1, Ordering::SeqCst))
}

/// Root fixture type with fields, computed members and methods.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Base {
    pub a: i32,
    pub b: f32,
}

impl Base {
    pub fn new(a: i32, b: f32) -> Self {
        Base { a, b }
    }
}

/// Single-base derivation of [`Base`].
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Child {
    pub base: Base,
    pub c: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Base1 {
    pub a: i32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Base2 {
    pub x: f32,
}

/// Two bases: `Base1` at offset 0 and `Base2` right after it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Derived {
    pub base1: Base1,
    pub base2: Base2,
    pub c: i32,
}

impl Derived {
    pub fn zeroed() -> Self {
        Derived {
            base1: Base1 { a: 0 },
            base2: Base2 { x: 0.0 },
            c: 0,
        }
    }
}

/// Type registered without any members.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Registry describing every fixture type.
pub struct Fixture {
    pub registry: TypeRegistry,
    pub base: &'static TypeInfo,
    pub child: &'static TypeInfo,
    pub base1: &'static TypeInfo,
    pub base2: &'static TypeInfo,
    pub derived: &'static TypeInfo,
    pub point: &'static TypeInfo,
}

impl Fixture {
    pub fn new() -> Self {
        let mut registry = TypeRegistry::with_primitives();

        // SAFETY: every offset below is `offset_of!` applied to a field of
        // the declared type with the declared field type.
        let base = unsafe {
            registry
                .new_type::<Base>("Base")
                .field::<i32>("a", offset_of!(Base, a))
                .field::<f32>("b", offset_of!(Base, b))
        }
        .getter("a2", |o: &Base| o.a)
        .getter_setter("a4", |o: &Base| o.a, |o: &mut Base, v: i32| o.a = v)
        .method("foo", |o: &mut Base| o.a *= 3)
        .method("bar", |_: &mut Base, p: f32| (p * 0.5).floor() as i32)
        .const_method("baz", |_: &Base, d: f64, limit: u8| {
            if d > f64::from(limit) { (d * 0.5) as f32 } else { 0.0 }
        })
        .const_method_with(
            "describe_into",
            Params::new().by_mut::<String>(),
            |o: &Base, args| {
                if let Some(out) = args.get_mut::<String>(0) {
                    *out = format!("Base(a={}, b={})", o.a, o.b);
                }
            },
        )
        .build()
        .expect("Base definition");
        let base = registry.register(base).expect("register Base");

        // SAFETY: as above.
        let child = unsafe {
            registry
                .new_type::<Child>("Child")
                .base::<Base>(offset_of!(Child, base))
                .field::<f32>("c", offset_of!(Child, c))
        }
        .method("gar", |o: &mut Child, m: f32| {
            o.c += m;
            o.c
        })
        .build()
        .expect("Child definition");
        let child = registry.register(child).expect("register Child");

        // SAFETY: as above.
        let (base1, base2, derived) = unsafe {
            let base1 = registry
                .new_type::<Base1>("Base1")
                .field::<i32>("a", offset_of!(Base1, a))
                .build()
                .expect("Base1 definition");
            let base1 = registry.register(base1).expect("register Base1");

            let base2 = registry
                .new_type::<Base2>("Base2")
                .field::<f32>("x", offset_of!(Base2, x))
                .method("scale", |o: &mut Base2, k: f32| o.x *= k)
                .build()
                .expect("Base2 definition");
            let base2 = registry.register(base2).expect("register Base2");

            let derived = registry
                .new_type::<Derived>("Derived")
                .base::<Base1>(offset_of!(Derived, base1))
                .base::<Base2>(offset_of!(Derived, base2))
                .field::<i32>("c", offset_of!(Derived, c))
                .build()
                .expect("Derived definition");
            let derived = registry.register(derived).expect("register Derived");
            (base1, base2, derived)
        };

        let point = registry
            .new_type::<Point>("Point")
            .build()
            .expect("Point definition");
        let point = registry.register(point).expect("register Point");

        Fixture {
            registry,
            base,
            child,
            base1,
            base2,
            derived,
            point,
        }
    }
}
