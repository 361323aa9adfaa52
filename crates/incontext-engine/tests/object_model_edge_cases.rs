//! Integration tests for `object_model` edge cases not covered inline.
//!
//! Focus areas:
//! - Display formats of values and errors
//! - Deep prototype chains
//! - Descriptor interplay between own and inherited properties
//! - Serde round-trips for object graphs with function payloads

use std::rc::Rc;

use incontext_engine::ast::{FunctionTemplate, ret, this};
use incontext_engine::closure_model::{Closure, FunctionObject, GLOBAL_ENVIRONMENT};
use incontext_engine::object_model::{
    JsValue, ObjectError, ObjectHandle, ObjectHeap, PropertyDescriptor, PropertyKey,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn key(s: &str) -> PropertyKey {
    PropertyKey::from(s)
}

fn closure() -> FunctionObject {
    FunctionObject::Closure(Closure {
        template: Rc::new(FunctionTemplate::new("f8", &[], vec![ret(this())])),
        creation_env: GLOBAL_ENVIRONMENT,
    })
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

#[test]
fn js_value_display_all_variants() {
    assert_eq!(JsValue::Undefined.to_string(), "undefined");
    assert_eq!(JsValue::Null.to_string(), "null");
    assert_eq!(JsValue::Bool(true).to_string(), "true");
    assert_eq!(JsValue::Int(-3).to_string(), "-3");
    assert_eq!(JsValue::str("tex").to_string(), "tex");
    assert_eq!(JsValue::Object(ObjectHandle(4)).to_string(), "[object#4]");
    assert_eq!(JsValue::Function(ObjectHandle(5)).to_string(), "[function#5]");
}

#[test]
fn object_error_display() {
    assert_eq!(
        ObjectError::ObjectNotFound(ObjectHandle(9)).to_string(),
        "object#9 not found"
    );
    assert_eq!(
        ObjectError::PrototypeChainTooDeep { depth: 1025, max: 1024 }.to_string(),
        "TypeError: prototype chain depth 1025 exceeds max 1024"
    );
}

#[test]
fn typeof_names_follow_language() {
    assert_eq!(JsValue::Null.type_name(), "object");
    assert_eq!(JsValue::Function(ObjectHandle(0)).type_name(), "function");
}

// ---------------------------------------------------------------------------
// Prototype chains
// ---------------------------------------------------------------------------

#[test]
fn very_deep_chain_is_rejected_on_lookup() {
    let mut heap = ObjectHeap::new();
    let mut current = heap.alloc_plain();
    for _ in 0..1100 {
        current = heap.alloc(Some(current));
    }
    let err = heap.get_property(current, &key("missing")).unwrap_err();
    assert!(matches!(err, ObjectError::PrototypeChainTooDeep { max: 1024, .. }));
}

#[test]
fn shallow_chain_reads_from_root() {
    let mut heap = ObjectHeap::new();
    let root = heap.alloc_plain();
    heap.set_property(root, key("horn"), JsValue::str("beep")).unwrap();
    let mut current = root;
    for _ in 0..10 {
        current = heap.alloc(Some(current));
    }
    assert_eq!(
        heap.get_property(current, &key("horn")).unwrap(),
        JsValue::str("beep")
    );
    assert!(!heap.has_own(current, &key("horn")).unwrap());
}

#[test]
fn self_prototype_is_a_cycle() {
    let mut heap = ObjectHeap::new();
    let h = heap.alloc_plain();
    assert_eq!(
        heap.set_prototype_of(h, Some(h)),
        Err(ObjectError::PrototypeCycleDetected)
    );
}

#[test]
fn missing_handle_is_object_not_found() {
    let heap = ObjectHeap::new();
    assert_eq!(
        heap.get_property(ObjectHandle(3), &key("a")),
        Err(ObjectError::ObjectNotFound(ObjectHandle(3)))
    );
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

#[test]
fn own_writable_shadows_inherited_writable() {
    let mut heap = ObjectHeap::new();
    let proto = heap.alloc_plain();
    heap.set_property(proto, key("a"), JsValue::Int(1)).unwrap();
    let child = heap.alloc(Some(proto));
    assert!(heap.set_property(child, key("a"), JsValue::Int(2)).unwrap());
    assert_eq!(heap.get_property(proto, &key("a")).unwrap(), JsValue::Int(1));
    assert_eq!(heap.get_property(child, &key("a")).unwrap(), JsValue::Int(2));
}

#[test]
fn read_only_own_property_survives_write() {
    let mut heap = ObjectHeap::new();
    let f = heap.alloc_function(None, closure());
    heap.define_property(f, key("name"), PropertyDescriptor::read_only(JsValue::str("f8")))
        .unwrap();
    assert!(!heap.set_property(f, key("name"), JsValue::str("g")).unwrap());
    assert_eq!(heap.get_property(f, &key("name")).unwrap(), JsValue::str("f8"));
    assert!(heap.keys(f).unwrap().is_empty());
}

#[test]
fn own_properties_on_function_objects_are_ordinary() {
    let mut heap = ObjectHeap::new();
    let f = heap.alloc_function(None, closure());
    heap.set_property(f, key("horn"), JsValue::str("awooga")).unwrap();
    assert_eq!(heap.keys(f).unwrap(), ["horn"]);
    assert!(heap.callable(f).unwrap().is_some());
}

// ---------------------------------------------------------------------------
// Serde
// ---------------------------------------------------------------------------

#[test]
fn heap_with_function_payload_round_trips() {
    let mut heap = ObjectHeap::new();
    let proto = heap.alloc_plain();
    let f = heap.alloc_function(Some(proto), closure());
    heap.set_property(f, key("horn"), JsValue::str("honk")).unwrap();
    let json = serde_json::to_string(&heap).unwrap();
    let back: ObjectHeap = serde_json::from_str(&json).unwrap();
    assert_eq!(back.len(), heap.len());
    assert_eq!(back.get(f).unwrap(), heap.get(f).unwrap());
}
