use xmlbind::{Field, TypeDescriptor, TypeRef, Value, XmlErrorKind};

fn dog() -> TypeDescriptor {
    TypeDescriptor::class("zoo.Dog").field(Field::new("name", TypeDescriptor::string()))
}

fn cat() -> TypeDescriptor {
    TypeDescriptor::class("zoo.Cat").field(Field::new("lives", TypeDescriptor::int()))
}

fn animal() -> TypeDescriptor {
    TypeDescriptor::polymorphic(
        "zoo.Animal",
        vec![
            ("zoo.Dog".to_string(), TypeRef::from(dog())),
            ("zoo.Cat".to_string(), TypeRef::from(cat())),
        ],
    )
}

#[test]
fn declared_variants_are_transparent() {
    let desc = TypeDescriptor::class("Zoo")
        .field(Field::new("pet", animal()).with_poly_children([".Dog=dog", ".Cat=cat"]));

    let rex = Value::Struct(vec![
        Value::variant("zoo.Dog", Value::Struct(vec![Value::string("Rex")])),
    ]);
    let xml = xmlbind::to_string(&desc, &rex).expect("encode");
    assert_eq!(xml, r#"<Zoo><dog name="Rex"></dog></Zoo>"#);
    assert_eq!(xmlbind::from_str(&desc, &xml).expect("decode"), rex);

    let whiskers = Value::Struct(vec![
        Value::variant("zoo.Cat", Value::Struct(vec![Value::Int(9)])),
    ]);
    let xml = xmlbind::to_string(&desc, &whiskers).expect("encode");
    assert_eq!(xml, r#"<Zoo><cat lives="9"></cat></Zoo>"#);
    assert_eq!(xmlbind::from_str(&desc, &xml).expect("decode"), whiskers);
}

#[test]
fn undeclared_union_carries_an_explicit_discriminator() {
    let desc = TypeDescriptor::class("Zoo").field(Field::new("pet", animal()));
    let value = Value::Struct(vec![
        Value::variant("zoo.Cat", Value::Struct(vec![Value::Int(9)])),
    ]);

    let xml = xmlbind::to_string(&desc, &value).expect("encode");
    assert_eq!(
        xml,
        r#"<Zoo><pet type=".Cat"><value lives="9"></value></pet></Zoo>"#
    );
    assert_eq!(xmlbind::from_str(&desc, &xml).expect("decode"), value);
}

#[test]
fn unknown_discriminator_is_a_type_mismatch() {
    let desc = TypeDescriptor::class("Zoo").field(Field::new("pet", animal()));
    let err = xmlbind::from_str(
        &desc,
        r#"<Zoo><pet type=".Fox"><value/></pet></Zoo>"#,
    )
    .expect_err("unknown variant must not decode");
    assert!(matches!(err.kind(), XmlErrorKind::TypeMismatch(_)));
}

#[test]
fn missing_discriminator_is_a_type_mismatch() {
    let desc = TypeDescriptor::class("Zoo").field(Field::new("pet", animal()));
    let err = xmlbind::from_str(&desc, r#"<Zoo><pet><value/></pet></Zoo>"#)
        .expect_err("missing discriminator must not decode");
    assert!(matches!(err.kind(), XmlErrorKind::TypeMismatch(_)));
}

#[test]
fn repeated_polymorphic_children_mix_variants() {
    let desc = TypeDescriptor::class("Shelter").field(
        Field::new("animals", TypeDescriptor::list("List", animal()))
            .with_poly_children([".Dog=dog", ".Cat=cat"]),
    );
    let value = Value::Struct(vec![Value::List(vec![
        Value::variant("zoo.Dog", Value::Struct(vec![Value::string("Rex")])),
        Value::variant("zoo.Cat", Value::Struct(vec![Value::Int(9)])),
        Value::variant("zoo.Dog", Value::Struct(vec![Value::string("Fido")])),
    ])]);

    let xml = xmlbind::to_string(&desc, &value).expect("encode");
    assert_eq!(
        xml,
        r#"<Shelter><dog name="Rex"></dog><cat lives="9"></cat><dog name="Fido"></dog></Shelter>"#
    );
    assert_eq!(xmlbind::from_str(&desc, &xml).expect("decode"), value);
}

#[test]
fn variants_resolve_through_the_registry() {
    let mut xml = xmlbind::Xml::new();
    xml.register(dog());
    xml.register(cat());
    let animal = TypeDescriptor::polymorphic(
        "zoo.Animal",
        vec![
            ("zoo.Dog".to_string(), TypeRef::named("zoo.Dog")),
            ("zoo.Cat".to_string(), TypeRef::named("zoo.Cat")),
        ],
    );
    let desc = TypeDescriptor::class("Zoo")
        .field(Field::new("pet", animal).with_poly_children([".Dog=dog", ".Cat=cat"]));

    let value = Value::Struct(vec![
        Value::variant("zoo.Dog", Value::Struct(vec![Value::string("Rex")])),
    ]);
    let rendered = xml.to_string(&desc, &value).expect("encode");
    assert_eq!(rendered, r#"<Zoo><dog name="Rex"></dog></Zoo>"#);
    assert_eq!(xml.from_str(&desc, &rendered).expect("decode"), value);
}
