use indoc::indoc;
use xmlbind::{Field, TypeDescriptor, Value, XmlErrorKind};

#[test]
fn unknown_attribute_reports_the_candidates() {
    let desc = TypeDescriptor::class("P")
        .field(Field::new("a", TypeDescriptor::int()))
        .field(Field::new("b", TypeDescriptor::int()));
    let err = xmlbind::from_str(&desc, r#"<P c="1"/>"#).expect_err("unknown attribute");
    match err.kind() {
        XmlErrorKind::UnknownField { name, candidates } => {
            assert_eq!(name, "c");
            assert_eq!(candidates, &["a".to_string(), "b".to_string()]);
        }
        other => panic!("unexpected error kind: {other:?}"),
    }
    assert!(err.location().is_some());
}

#[test]
fn unknown_child_element_is_rejected() {
    let desc = TypeDescriptor::class("P")
        .field(Field::new("a", TypeDescriptor::int()).element());
    let err = xmlbind::from_str(
        &desc,
        indoc! {r#"
            <P>
              <a>1</a>
              <mystery>2</mystery>
            </P>
        "#},
    )
    .expect_err("unknown element");
    assert_eq!(err.kind().code(), "xml::unknown_field");
}

#[test]
fn missing_required_field() {
    let desc = TypeDescriptor::class("User")
        .field(Field::new("name", TypeDescriptor::string()));
    let err = xmlbind::from_str(&desc, "<User></User>").expect_err("missing field");
    match err.kind() {
        XmlErrorKind::MissingField { field } => assert_eq!(field, "name"),
        other => panic!("unexpected error kind: {other:?}"),
    }
}

#[test]
fn stray_text_in_a_struct_is_a_structure_mismatch() {
    let desc = TypeDescriptor::class("P")
        .field(Field::new("a", TypeDescriptor::int()));
    let err = xmlbind::from_str(&desc, r#"<P a="1">hello</P>"#).expect_err("stray text");
    assert!(matches!(err.kind(), XmlErrorKind::StructureMismatch { .. }));
}

#[test]
fn unparsable_scalar_is_an_invalid_value() {
    let desc = TypeDescriptor::class("P")
        .field(Field::new("a", TypeDescriptor::int()));
    let err = xmlbind::from_str(&desc, r#"<P a="zebra"/>"#).expect_err("bad int");
    match err.kind() {
        XmlErrorKind::InvalidValue { value, .. } => assert_eq!(value, "zebra"),
        other => panic!("unexpected error kind: {other:?}"),
    }
}

#[test]
fn bad_enum_variant_is_an_invalid_value() {
    let color = TypeDescriptor::enumeration("Color", ["red", "blue"]);
    let desc = TypeDescriptor::class("Pixel").field(Field::new("color", color));
    let err = xmlbind::from_str(&desc, r#"<Pixel color="plaid"/>"#).expect_err("bad variant");
    assert_eq!(err.kind().code(), "xml::invalid_value");
}

#[test]
fn malformed_markup_is_a_parse_error() {
    let desc = TypeDescriptor::class("P")
        .field(Field::new("a", TypeDescriptor::int()).element());
    let err = xmlbind::from_str(&desc, "<P><a></P>").expect_err("unbalanced");
    assert_eq!(err.kind().code(), "xml::parse");
}

#[test]
fn wrong_root_tag_is_a_structure_mismatch() {
    let desc = TypeDescriptor::class("P")
        .field(Field::new("a", TypeDescriptor::int()).optional());
    let err = xmlbind::from_str(&desc, "<Q></Q>").expect_err("wrong root");
    assert!(matches!(err.kind(), XmlErrorKind::StructureMismatch { .. }));
}

#[test]
fn wrapped_list_rejects_misnamed_items() {
    let desc = TypeDescriptor::class("Post").field(
        Field::new("tags", TypeDescriptor::list("List", TypeDescriptor::string()))
            .with_children_name(xmlbind::NameTemplate::local("tag")),
    );
    let err = xmlbind::from_str(
        &desc,
        "<Post><tags><tag>a</tag><label>b</label></tags></Post>",
    )
    .expect_err("misnamed item");
    assert!(matches!(err.kind(), XmlErrorKind::StructureMismatch { .. }));
}

#[test]
fn errors_format_with_code_and_location() {
    let desc = TypeDescriptor::class("P")
        .field(Field::new("a", TypeDescriptor::int()));
    let err = xmlbind::from_str(&desc, r#"<P b="1"/>"#).expect_err("unknown attribute");
    let rendered = err.to_string();
    assert!(rendered.contains("unknown field 'b'"), "got: {rendered}");
    assert!(rendered.contains("byte"), "got: {rendered}");
}

#[test]
fn list_descriptor_without_an_item_slot_is_rejected() {
    let mut list = TypeDescriptor::list("List", TypeDescriptor::int());
    list.fields.clear();
    let desc = TypeDescriptor::class("Box").field(
        Field::new("items", list).with_children_name(xmlbind::NameTemplate::local("i")),
    );
    let value = Value::Struct(vec![Value::List(vec![Value::Int(1)])]);
    let err = xmlbind::to_string(&desc, &value).expect_err("no item slot");
    assert!(matches!(err.kind(), XmlErrorKind::StructureMismatch { .. }));
}

#[test]
fn map_descriptor_without_a_value_slot_is_rejected() {
    let mut map =
        TypeDescriptor::map("Map", TypeDescriptor::string(), TypeDescriptor::int());
    map.fields.truncate(1);
    let desc = TypeDescriptor::class("Scores").field(
        Field::new("scores", map).with_children_name(xmlbind::NameTemplate::local("entry")),
    );
    let err = xmlbind::from_str(
        &desc,
        "<Scores><scores><entry><key>a</key></entry></scores></Scores>",
    )
    .expect_err("no value slot");
    assert!(matches!(err.kind(), XmlErrorKind::StructureMismatch { .. }));
}

#[test]
fn encoding_a_shape_mismatch_fails() {
    let desc = TypeDescriptor::class("P")
        .field(Field::new("a", TypeDescriptor::int()));
    let err = xmlbind::to_string(&desc, &Value::Int(3)).expect_err("not a struct");
    assert!(matches!(err.kind(), XmlErrorKind::StructureMismatch { .. }));
}
