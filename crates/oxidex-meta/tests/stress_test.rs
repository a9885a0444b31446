//! Stress tests for the introspection engine.
//!
//! These tests validate behavior under heavy load:
//! - Concurrent lookups against one shared registry
//! - Concurrent calls on per-thread objects
//! - Deep single-base chains
//!
//! Run with: `cargo test --test stress_test -- --nocapture`

mod common;

use common::{Base, Child, Derived, Fixture};
use oxidex_meta::{TypeInfo, TypeRegistry};
use std::mem::offset_of;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const THREADS: usize = 8;
const ROUNDS: usize = 2_000;

// ============================================================================
// Concurrent Readers
// ============================================================================

#[test]
fn test_concurrent_lookups_agree() {
    let fx = Arc::new(Fixture::new());
    let expected: Vec<usize> = fx
        .registry
        .types()
        .map(|ty| std::ptr::from_ref(ty) as usize)
        .collect();

    let mut handles = vec![];
    for _ in 0..THREADS {
        let fx = Arc::clone(&fx);
        handles.push(thread::spawn(move || {
            for _ in 0..ROUNDS {
                let ty = fx.registry.find("Derived").unwrap();
                assert!(ty.is_derived_from(fx.registry.find("Base2").unwrap()));
                assert!(ty.has_member("x"));
            }
            fx.registry
                .types()
                .map(|ty| std::ptr::from_ref(ty) as usize)
                .collect::<Vec<_>>()
        }));
    }

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected);
    }
}

#[test]
fn test_concurrent_calls_on_private_objects() {
    let fx = Arc::new(Fixture::new());
    let start = Instant::now();

    let mut handles = vec![];
    for i in 0..THREADS {
        let fx = Arc::clone(&fx);
        handles.push(thread::spawn(move || {
            let gar = fx.child.find_method("gar").unwrap();
            let a = fx.child.find_member("a").unwrap();
            let mut o = Child {
                base: Base::new(i as i32, 0.0),
                c: 0.0,
            };
            let mut obj = fx.registry.any_mut(&mut o).unwrap();
            for _ in 0..ROUNDS {
                let mut args = [fx.registry.any_value(1.0f32).unwrap()];
                gar.call(&mut obj, &mut args, None).unwrap();
                assert_eq!(a.value::<i32>(&obj), Ok(i as i32));
            }
            drop(obj);
            o.c
        }));
    }

    for handle in handles {
        assert_eq!(handle.join().unwrap(), ROUNDS as f32);
    }
    println!(
        "{} calls across {THREADS} threads in {:?}",
        THREADS * ROUNDS,
        start.elapsed()
    );
}

#[test]
fn test_static_descriptors_outlive_threads() {
    let fx = Fixture::new();
    let derived: &'static TypeInfo = fx.derived;

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            thread::spawn(move || {
                let mut d = Derived::zeroed();
                d.base2.x = i as f32;
                let ptr = std::ptr::NonNull::from(&mut d).cast::<u8>();
                let base2 = derived.bases()[1].base();
                let adjusted = derived.adjust(base2, ptr).unwrap();
                // SAFETY: `adjusted` points to `d.base2`, a live `Base2`.
                unsafe { adjusted.cast::<common::Base2>().as_ref().x }
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.join().unwrap(), i as f32);
    }
}

// ============================================================================
// Deep Hierarchies
// ============================================================================

macro_rules! chain {
    ($root:ident; $($ty:ident : $parent:ident),* $(,)?) => {
        #[allow(dead_code)]
        #[repr(C)]
        struct $root {
            depth: u32,
        }
        $(
            #[allow(dead_code)]
            #[repr(C)]
            struct $ty {
                parent: $parent,
                pad: u8,
            }
        )*

        fn register_chain(registry: &mut TypeRegistry) -> Vec<&'static TypeInfo> {
            let mut out = Vec::new();
            // SAFETY: offsets come from `offset_of!`.
            let root = unsafe {
                registry
                    .new_type::<$root>(stringify!($root))
                    .field::<u32>("depth", offset_of!($root, depth))
            }
            .build()
            .unwrap();
            out.push(registry.register(root).unwrap());
            $(
                // SAFETY: as above.
                let def = unsafe {
                    registry
                        .new_type::<$ty>(stringify!($ty))
                        .base::<$parent>(offset_of!($ty, parent))
                        .field::<u8>(
                            concat!("pad_", stringify!($ty)),
                            offset_of!($ty, pad),
                        )
                }
                .build()
                .unwrap();
                out.push(registry.register(def).unwrap());
            )*
            out
        }
    };
}

chain!(L0; L1: L0, L2: L1, L3: L2, L4: L3, L5: L4, L6: L5, L7: L6, L8: L7);

#[test]
fn test_deep_chain_resolves_root_member() {
    let mut registry = TypeRegistry::with_primitives();
    let chain = register_chain(&mut registry);
    let leaf = *chain.last().unwrap();
    let root = chain[0];

    assert_eq!(leaf.hierarchy().len(), chain.len());
    assert_eq!(leaf.all_members().len(), chain.len());
    assert_eq!(registry.derived_types(root).len(), chain.len() - 1);
    for (i, ty) in chain.iter().enumerate() {
        assert_eq!(leaf.offset_to(ty), Some(0), "level {i}");
    }

    let mut value = L8 {
        parent: L7 {
            parent: L6 {
                parent: L5 {
                    parent: L4 {
                        parent: L3 {
                            parent: L2 {
                                parent: L1 {
                                    parent: L0 { depth: 8 },
                                    pad: 1,
                                },
                                pad: 2,
                            },
                            pad: 3,
                        },
                        pad: 4,
                    },
                    pad: 5,
                },
                pad: 6,
            },
            pad: 7,
        },
        pad: 8,
    };
    let mut obj = registry.any_mut(&mut value).unwrap();
    let depth = leaf.find_member("depth").unwrap();
    assert_eq!(depth.owner(), root);
    assert_eq!(depth.value::<u32>(&obj), Ok(8));
    depth.set_value(&mut obj, 80u32).unwrap();
    assert_eq!(
        leaf.find_member("pad_L4").unwrap().value::<u8>(&obj),
        Ok(4)
    );
    drop(obj);
    assert_eq!(value.parent.parent.parent.parent.parent.parent.parent.parent.depth, 80);
}
