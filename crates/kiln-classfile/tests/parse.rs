use kiln_classfile::{ClassSummary, Error};
use kiln_test_utils::{ClassFileBuilder, MethodSpec, ACC_ABSTRACT, ACC_PUBLIC};
use pretty_assertions::assert_eq;

#[test]
fn finds_public_annotated_test_methods() {
    let bytes = ClassFileBuilder::new("com/acme/FooTest")
        .method(MethodSpec::public("testBar").annotated("Lorg/junit/Test;"))
        .method(
            MethodSpec::public("parameterized")
                .annotated("Lorg/junit/jupiter/params/ParameterizedTest;")
                .with_string_element("name", "{0}"),
        )
        .method(MethodSpec::private("hidden").annotated("Lorg/junit/jupiter/api/Test;"))
        .method(MethodSpec::public("helper"))
        .method(MethodSpec::public("setUp").annotated("Lorg/junit/Before;"))
        .build();

    let class = ClassSummary::parse(&bytes).expect("parse class");
    assert_eq!(class.this_class, "com/acme/FooTest");
    assert_eq!(class.binary_name(), "com.acme.FooTest");
    assert_eq!(class.super_class.as_deref(), Some("java/lang/Object"));
    assert!(!class.is_abstract());

    let tests: Vec<_> = class.test_methods().map(|m| m.name.as_str()).collect();
    assert_eq!(tests, vec!["testBar", "parameterized"]);
}

#[test]
fn reports_abstract_classes_and_superclasses() {
    let bytes = ClassFileBuilder::new("com/acme/BaseTest")
        .access_flags(ACC_PUBLIC | ACC_ABSTRACT)
        .super_class("com/acme/Root")
        .method(MethodSpec::public("inherited").annotated("Lorg/testng/annotations/Test;"))
        .build();

    let class = ClassSummary::parse(&bytes).expect("parse class");
    assert!(class.is_abstract());
    assert!(!class.is_interface());
    assert_eq!(class.super_class.as_deref(), Some("com/acme/Root"));
    assert_eq!(class.test_methods().count(), 1);
}

#[test]
fn rejects_truncated_and_foreign_input() {
    let bytes = ClassFileBuilder::new("com/acme/FooTest")
        .method(MethodSpec::public("testBar").annotated("Lorg/junit/Test;"))
        .build();

    assert!(matches!(
        ClassSummary::parse(&bytes[..bytes.len() - 3]),
        Err(Error::Truncated { .. })
    ));

    let err = ClassSummary::parse(b"PK\x03\x04not a class").unwrap_err();
    assert_eq!(err, Error::NotAClassFile { magic: 0x504B0304 });
    assert_eq!(err.to_string(), "not a class file (starts with 0x504b0304)");
}

#[test]
fn rejects_bytes_after_the_last_attribute() {
    let mut bytes = ClassFileBuilder::new("com/acme/FooTest").build();
    let end = bytes.len();
    bytes.extend_from_slice(&[0, 0]);

    assert_eq!(
        ClassSummary::parse(&bytes),
        Err(Error::TrailingBytes {
            offset: end,
            len: 2
        })
    );
}
