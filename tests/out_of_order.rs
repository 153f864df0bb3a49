//! Attribute fields declared after element content still land on the
//! start tag: the encoder buffers element writes until the last such
//! attribute is out.

use xmlbind::{Field, TypeDescriptor, Value};

#[test]
fn attribute_declared_after_child_element() {
    let body = TypeDescriptor::class("Body")
        .field(Field::new("content", TypeDescriptor::string()).text());
    let desc = TypeDescriptor::class("Envelope")
        .field(Field::new("body", body))
        .field(Field::new("version", TypeDescriptor::string()));
    let value = Value::Struct(vec![
        Value::Struct(vec![Value::string("hi")]),
        Value::string("1.1"),
    ]);

    let xml = xmlbind::to_string(&desc, &value).expect("encode");
    assert_eq!(xml, r#"<Envelope version="1.1"><Body>hi</Body></Envelope>"#);
    assert_eq!(xmlbind::from_str(&desc, &xml).expect("decode"), value);
}

#[test]
fn interleaved_attributes_and_elements() {
    let desc = TypeDescriptor::class("M")
        .field(Field::new("a1", TypeDescriptor::string()))
        .field(Field::new("e1", TypeDescriptor::int()).element())
        .field(Field::new("a2", TypeDescriptor::string()))
        .field(Field::new("e2", TypeDescriptor::int()).element());
    let value = Value::Struct(vec![
        Value::string("x"),
        Value::Int(1),
        Value::string("y"),
        Value::Int(2),
    ]);

    let xml = xmlbind::to_string(&desc, &value).expect("encode");
    // Attributes keep declaration order on the tag; elements keep theirs
    // in the content.
    assert_eq!(xml, r#"<M a1="x" a2="y"><e1>1</e1><e2>2</e2></M>"#);
    assert_eq!(xmlbind::from_str(&desc, &xml).expect("decode"), value);
}

#[test]
fn trailing_attribute_with_null_content_before_it() {
    let desc = TypeDescriptor::class("M")
        .field(Field::new("e", TypeDescriptor::int()).element().optional())
        .field(Field::new("a", TypeDescriptor::string()));
    let value = Value::Struct(vec![Value::Null, Value::string("v")]);

    // The buffered frame flushes even when the buffered content was all
    // skipped.
    let xml = xmlbind::to_string(&desc, &value).expect("encode");
    assert_eq!(xml, r#"<M a="v"></M>"#);
    assert_eq!(xmlbind::from_str(&desc, &xml).expect("decode"), value);
}

#[test]
fn decoder_accepts_any_child_order() {
    let desc = TypeDescriptor::class("M")
        .field(Field::new("e1", TypeDescriptor::int()).element())
        .field(Field::new("e2", TypeDescriptor::int()).element());
    let value = xmlbind::from_str(&desc, r#"<M><e2>2</e2><e1>1</e1></M>"#).expect("decode");
    // Struct slots follow the descriptor, not the document.
    assert_eq!(value, Value::Struct(vec![Value::Int(1), Value::Int(2)]));
}
