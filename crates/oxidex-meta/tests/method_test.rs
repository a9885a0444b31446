//! Method invocation tests
//!
//! Tests for calling methods through type-erased handles:
//! - Void and value-returning methods
//! - Argument validation
//! - Reference parameters
//! - Methods inherited from a base
//!
//! Run with: `cargo test --test method_test`

mod common;

use common::{Base, Child, Derived, Fixture};
use oxidex_meta::{AnyValue, Error, Passing, Receiver};

// ============================================================================
// Calls
// ============================================================================

#[test]
fn test_bar_floors_half_of_argument() {
    let fx = Fixture::new();
    let mut o = Base::new(0, 0.0);
    let mut obj = fx.registry.any_mut(&mut o).unwrap();
    let bar = fx.base.find_method("bar").unwrap();

    let mut args = [fx.registry.any_value(11.0f32).unwrap()];
    let mut out = fx.registry.any_value(0i32).unwrap();
    assert!(bar.can_call(&obj, &args, Some(&out)));
    bar.call(&mut obj, &mut args, Some(&mut out)).unwrap();
    assert_eq!(out.value::<i32>(), Some(5));

    let two = [
        fx.registry.any_value(11.0f32).unwrap(),
        fx.registry.any_value(1.0f32).unwrap(),
    ];
    assert!(!bar.can_call(&obj, &two, Some(&out)));
}

#[test]
fn test_void_method_mutates_receiver() {
    let fx = Fixture::new();
    let mut o = Base::new(99, 0.0);
    {
        let mut obj = fx.registry.any_mut(&mut o).unwrap();
        let foo = fx.base.find_method("foo").unwrap();
        assert!(foo.is_void());
        foo.call(&mut obj, &mut [], None).unwrap();
    }
    assert_eq!(o.a, 297);
}

#[test]
fn test_const_method_with_two_arguments() {
    let fx = Fixture::new();
    let o = Base::new(0, 0.0);
    let mut obj = fx.registry.any_ref(&o).unwrap();
    let baz = fx.base.find_method("baz").unwrap();
    assert_eq!(baz.receiver(), Receiver::Shared);

    let mut result = 1.0f32;
    {
        let mut out = fx.registry.any_mut(&mut result).unwrap();
        let mut args = [
            fx.registry.any_value(5.0f64).unwrap(),
            fx.registry.any_value(7u8).unwrap(),
        ];
        baz.call(&mut obj, &mut args, Some(&mut out)).unwrap();
    }
    assert_eq!(result, 0.0);

    {
        let mut out = fx.registry.any_mut(&mut result).unwrap();
        let mut args = [
            fx.registry.any_value(20.0f64).unwrap(),
            fx.registry.any_value(7u8).unwrap(),
        ];
        baz.call(&mut obj, &mut args, Some(&mut out)).unwrap();
    }
    assert_eq!(result, 10.0);
}

#[test]
fn test_result_discarded_without_output() {
    let fx = Fixture::new();
    let mut o = Child {
        base: Base::new(0, 0.0),
        c: 17.0,
    };
    {
        let mut obj = fx.registry.any_mut(&mut o).unwrap();
        let mut args = [fx.registry.any_value(7.0f32).unwrap()];
        fx.child
            .find_method("gar")
            .unwrap()
            .call(&mut obj, &mut args, None)
            .unwrap();
    }
    assert_eq!(o.c, 24.0);
}

#[test]
fn test_reference_parameter() {
    let fx = Fixture::new();
    let o = Base::new(4, 0.5);
    let describe = fx.base.find_method("describe_into").unwrap();
    assert_eq!(describe.params()[0].passing(), Passing::Mut);
    assert_eq!(
        describe.param_type(0),
        Some(fx.registry.info_of::<String>().unwrap())
    );

    let mut text = String::new();
    {
        let mut obj = fx.registry.any_ref(&o).unwrap();
        let mut args = [fx.registry.any_mut(&mut text).unwrap()];
        describe.call(&mut obj, &mut args, None).unwrap();
    }
    assert_eq!(text, "Base(a=4, b=0.5)");
}

// ============================================================================
// Validation
// ============================================================================

#[test]
fn test_rejected_calls_leave_state_untouched() {
    let fx = Fixture::new();
    let mut o = Base::new(2, 0.0);
    let foo = fx.base.find_method("foo").unwrap();
    let bar = fx.base.find_method("bar").unwrap();
    {
        let mut obj = fx.registry.any_mut(&mut o).unwrap();

        let mut extra = [fx.registry.any_value(1i32).unwrap()];
        assert!(!foo.can_call(&obj, &extra, None));
        assert_eq!(
            foo.call(&mut obj, &mut extra, None),
            Err(Error::ArityMismatch {
                expected: 0,
                got: 1
            })
        );

        let mut wrong = [fx.registry.any_value(11.0f64).unwrap()];
        let mut out = fx.registry.any_value(-1i32).unwrap();
        assert_eq!(
            bar.call(&mut obj, &mut wrong, Some(&mut out)),
            Err(Error::ArgumentMismatch {
                index: 0,
                expected: "f32".into(),
                found: "f64".into()
            })
        );
        assert_eq!(out.value::<i32>(), Some(-1));
    }
    assert_eq!(o.a, 2);
}

#[test]
fn test_unrelated_object_rejected() {
    let fx = Fixture::new();
    let mut d = Derived::zeroed();
    let mut obj = fx.registry.any_mut(&mut d).unwrap();
    let foo = fx.base.find_method("foo").unwrap();

    assert!(!foo.can_call(&obj, &[], None));
    assert!(matches!(
        foo.call(&mut obj, &mut [], None),
        Err(Error::OwnerMismatch { .. })
    ));
}

#[test]
fn test_exclusive_receiver_rejects_const_object() {
    let fx = Fixture::new();
    let o = Base::new(2, 0.0);
    let mut obj = fx.registry.any_ref(&o).unwrap();
    let foo = fx.base.find_method("foo").unwrap();

    assert_eq!(
        foo.call(&mut obj, &mut [], None),
        Err(Error::ConstViolation)
    );
    assert_eq!(o.a, 2);
}

#[test]
fn test_void_method_rejects_output() {
    let fx = Fixture::new();
    let mut o = Base::new(2, 0.0);
    let mut obj = fx.registry.any_mut(&mut o).unwrap();
    let foo = fx.base.find_method("foo").unwrap();
    let mut out = fx.registry.any_value(0i32).unwrap();

    assert_eq!(
        foo.check_call(&obj, &[], Some(&out)),
        Err(Error::NotMutable { name: "foo".into() })
    );
    assert!(foo.call(&mut obj, &mut [], Some(&mut out)).is_err());
    assert!(foo.can_call(&obj, &[], Some(&AnyValue::void())));
    assert_eq!(obj.value::<Base>().unwrap().a, 2);
}

#[test]
fn test_const_reference_argument_for_mut_parameter() {
    let fx = Fixture::new();
    let o = Base::new(0, 0.0);
    let text = String::from("unchanged");
    let mut obj = fx.registry.any_ref(&o).unwrap();
    let mut args = [fx.registry.any_ref(&text).unwrap()];

    assert_eq!(
        fx.base
            .find_method("describe_into")
            .unwrap()
            .call(&mut obj, &mut args, None),
        Err(Error::ConstViolation)
    );
    assert_eq!(text, "unchanged");
}

// ============================================================================
// Inherited Methods
// ============================================================================

#[test]
fn test_inherited_method_through_second_base() {
    let fx = Fixture::new();
    let mut d = Derived::zeroed();
    d.base2.x = 3.0;
    {
        let mut obj = fx.registry.any_mut(&mut d).unwrap();
        let scale = fx.derived.find_method("scale").unwrap();
        assert_eq!(scale.owner(), fx.base2);

        let mut args = [fx.registry.any_value(2.0f32).unwrap()];
        scale.call(&mut obj, &mut args, None).unwrap();
    }
    assert_eq!(d.base2.x, 6.0);
    assert_eq!(d.base1.a, 0);
    assert_eq!(d.c, 0);
}

#[test]
fn test_missing_method() {
    let fx = Fixture::new();
    assert_eq!(
        fx.derived.find_method("foo").unwrap_err(),
        Error::MethodNotFound {
            type_name: "Derived".into(),
            method: "foo".into()
        }
    );
}
