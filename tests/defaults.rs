use indoc::indoc;
use xmlbind::{Field, NameTemplate, TypeDescriptor, Value};

#[test]
fn absent_field_takes_its_default() {
    let desc = TypeDescriptor::class("Counter")
        .field(Field::new("count", TypeDescriptor::int()).with_default("0"));
    let value = xmlbind::from_str(&desc, "<Counter></Counter>").expect("decode");
    assert_eq!(value, Value::Struct(vec![Value::Int(0)]));
}

#[test]
fn present_field_ignores_its_default() {
    let desc = TypeDescriptor::class("Counter")
        .field(Field::new("count", TypeDescriptor::int()).with_default("0"));
    let value = xmlbind::from_str(&desc, r#"<Counter count="5"/>"#).expect("decode");
    assert_eq!(value, Value::Struct(vec![Value::Int(5)]));
}

#[test]
fn empty_attribute_value_falls_back_to_default() {
    let desc = TypeDescriptor::class("Counter")
        .field(Field::new("count", TypeDescriptor::int()).with_default("0"));
    let value = xmlbind::from_str(&desc, r#"<Counter count=""/>"#).expect("decode");
    assert_eq!(value, Value::Struct(vec![Value::Int(0)]));
}

#[test]
fn empty_string_does_not_trigger_the_default() {
    let desc = TypeDescriptor::class("Label")
        .field(Field::new("text", TypeDescriptor::string()).with_default("fallback"));
    let value = xmlbind::from_str(&desc, r#"<Label text=""/>"#).expect("decode");
    assert_eq!(value, Value::Struct(vec![Value::Text(String::new())]));
}

#[test]
fn structured_default_parses_as_a_fragment() {
    let point = TypeDescriptor::class("Point")
        .field(Field::new("x", TypeDescriptor::int()))
        .field(Field::new("y", TypeDescriptor::int()));
    let desc = TypeDescriptor::class("Shape")
        .field(Field::new("origin", point).with_default(r#"<point x="0" y="0"/>"#));
    let value = xmlbind::from_str(&desc, "<Shape></Shape>").expect("decode");
    assert_eq!(
        value,
        Value::Struct(vec![Value::Struct(vec![Value::Int(0), Value::Int(0)])])
    );
}

#[test]
fn default_wins_over_optional() {
    let desc = TypeDescriptor::class("Note").field(
        Field::new("body", TypeDescriptor::string())
            .optional()
            .with_default("hi"),
    );
    let value = xmlbind::from_str(&desc, "<Note></Note>").expect("decode");
    assert_eq!(value, Value::Struct(vec![Value::string("hi")]));
}

#[test]
fn absent_collections_default_to_empty() {
    let desc = TypeDescriptor::class("Box")
        .field(
            Field::new("items", TypeDescriptor::list("List", TypeDescriptor::int()))
                .with_children_name(NameTemplate::local("i")),
        )
        .field(Field::new(
            "index",
            TypeDescriptor::map("Map", TypeDescriptor::string(), TypeDescriptor::int())
                .with_children_name(NameTemplate::local("entry")),
        ));
    let value = xmlbind::from_str(&desc, "<Box></Box>").expect("decode");
    assert_eq!(
        value,
        Value::Struct(vec![Value::List(vec![]), Value::Map(vec![])])
    );
}

#[test]
fn empty_child_element_falls_back_to_default() {
    let desc = TypeDescriptor::class("Job").field(
        Field::new("retries", TypeDescriptor::int())
            .element()
            .with_default("3"),
    );
    let value = xmlbind::from_str(
        &desc,
        indoc! {r#"
            <Job>
              <retries></retries>
            </Job>
        "#},
    )
    .expect("decode");
    assert_eq!(value, Value::Struct(vec![Value::Int(3)]));
}

#[test]
fn nullable_child_decodes_to_null_when_absent() {
    let desc = TypeDescriptor::class("Row")
        .field(Field::new("id", TypeDescriptor::int()))
        .field(Field::new("comment", TypeDescriptor::string().nullable()).element());
    let value = xmlbind::from_str(&desc, r#"<Row id="1"/>"#).expect("decode");
    assert_eq!(value, Value::Struct(vec![Value::Int(1), Value::Null]));
}
