//! Console sink, value inspection and structured trace events.
//!
//! The console is the only output surface: an ordered list of
//! human-readable lines. Alongside it the realm records [`TraceEvent`]s,
//! one per observable step, for machine consumption.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::closure_model::FunctionObject;
use crate::object_model::{JsValue, ObjectError, ObjectHandle, ObjectHeap, PropertyKey};

/// Nesting depth past which inspection prints `[Object]`.
const MAX_INSPECT_DEPTH: usize = 2;
/// Array elements printed before the remainder is summarised.
pub const MAX_INSPECT_ITEMS: usize = 100;

/// Ordered human-readable trace lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSink {
    lines: Vec<String>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Structured event emitted for every call, construction, bind and
/// rejected operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub trace_id: String,
    pub component: String,
    pub event: String,
    pub outcome: String,
    pub error_code: Option<String>,
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// `console.log` rendering: strings print raw, everything else inspected.
pub fn render_log(heap: &ObjectHeap, value: &JsValue) -> Result<String, ObjectError> {
    match value {
        JsValue::Str(s) => Ok(s.clone()),
        other => inspect(heap, other),
    }
}

/// `console.dir` / nested rendering.
pub fn inspect(heap: &ObjectHeap, value: &JsValue) -> Result<String, ObjectError> {
    let mut seen = BTreeSet::new();
    inspect_at(heap, value, 0, &mut seen)
}

fn inspect_at(
    heap: &ObjectHeap,
    value: &JsValue,
    depth: usize,
    seen: &mut BTreeSet<ObjectHandle>,
) -> Result<String, ObjectError> {
    let handle = match value {
        JsValue::Str(s) => return Ok(format!("'{s}'")),
        JsValue::Object(h) | JsValue::Function(h) => *h,
        primitive => return Ok(primitive.to_string()),
    };
    if seen.contains(&handle) {
        return Ok("[Circular]".to_string());
    }

    let head = match value {
        JsValue::Function(_) => Some(function_label(heap, handle)?),
        _ => None,
    };
    let tag = class_tag(heap, handle)?;
    let is_array = tag.as_deref() == Some("Array");
    let entries = if is_array {
        Vec::new()
    } else {
        heap.entries(handle)?
    };

    if let Some(h) = &head
        && entries.is_empty()
    {
        return Ok(h.clone());
    }
    if depth > MAX_INSPECT_DEPTH {
        return Ok(match (&head, is_array) {
            (Some(h), _) => h.clone(),
            (None, true) => "[Array]".to_string(),
            (None, false) => format!("[{}]", tag.as_deref().unwrap_or("Object")),
        });
    }

    seen.insert(handle);
    let rendered = if is_array {
        let length = array_length(heap, handle)?;
        let mut items = Vec::new();
        for value in array_items(heap, handle, MAX_INSPECT_ITEMS)? {
            items.push(inspect_at(heap, &value, depth + 1, seen)?);
        }
        if length > MAX_INSPECT_ITEMS {
            items.push(format!("... {} more items", length - MAX_INSPECT_ITEMS));
        }
        if items.is_empty() {
            "[]".to_string()
        } else {
            format!("[ {} ]", items.join(", "))
        }
    } else {
        let mut fields = Vec::with_capacity(entries.len());
        for (key, value) in &entries {
            fields.push(format!(
                "{}: {}",
                render_key(key),
                inspect_at(heap, value, depth + 1, seen)?
            ));
        }
        let body = if fields.is_empty() {
            "{}".to_string()
        } else {
            format!("{{ {} }}", fields.join(", "))
        };
        match (head, tag) {
            (Some(h), _) => format!("{h} {body}"),
            (None, Some(t)) => format!("{t} {body}"),
            (None, None) => body,
        }
    };
    seen.remove(&handle);
    Ok(rendered)
}

/// `[Function: name]`, `[Function (anonymous)]`, `[Function: bound name]`.
fn function_label(heap: &ObjectHeap, handle: ObjectHandle) -> Result<String, ObjectError> {
    let name = match heap.get_property(handle, &PropertyKey::from("name"))? {
        JsValue::Str(s) => s,
        _ => String::new(),
    };
    let bound = matches!(heap.callable(handle)?, Some(FunctionObject::Bound(_)));
    Ok(if name.is_empty() && !bound {
        "[Function (anonymous)]".to_string()
    } else {
        format!("[Function: {name}]")
    })
}

/// Constructor name recorded on the object's prototype.
fn class_tag(heap: &ObjectHeap, handle: ObjectHandle) -> Result<Option<String>, ObjectError> {
    match heap.get_prototype_of(handle)? {
        Some(proto) => Ok(heap.get(proto)?.class_tag.clone()),
        None => Ok(None),
    }
}

/// The `length` of an array-like object; anything but a positive integer
/// counts as zero.
pub fn array_length(heap: &ObjectHeap, handle: ObjectHandle) -> Result<usize, ObjectError> {
    Ok(match heap.get_property(handle, &PropertyKey::from("length"))? {
        JsValue::Int(n) if n > 0 => usize::try_from(n).unwrap_or(usize::MAX),
        _ => 0,
    })
}

/// Elements `0..min(length, limit)` of an array-like object.
pub fn array_items(
    heap: &ObjectHeap,
    handle: ObjectHandle,
    limit: usize,
) -> Result<Vec<JsValue>, ObjectError> {
    let length = array_length(heap, handle)?.min(limit);
    (0..length)
        .map(|i| heap.get_property(handle, &PropertyKey(i.to_string())))
        .collect()
}

fn render_key(key: &str) -> String {
    let plain = !key.is_empty()
        && !key.starts_with(|c: char| c.is_ascii_digit())
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if plain {
        key.to_string()
    } else {
        format!("'{key}'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_model::PropertyDescriptor;

    #[test]
    fn primitives_render() {
        let heap = ObjectHeap::new();
        assert_eq!(inspect(&heap, &JsValue::Undefined).unwrap(), "undefined");
        assert_eq!(inspect(&heap, &JsValue::Int(10)).unwrap(), "10");
        assert_eq!(inspect(&heap, &JsValue::str("x")).unwrap(), "'x'");
        assert_eq!(render_log(&heap, &JsValue::str("x")).unwrap(), "x");
    }

    #[test]
    fn plain_object_renders_sorted_fields() {
        let mut heap = ObjectHeap::new();
        let h = heap.from_entries(
            None,
            vec![("b".into(), JsValue::str("two")), ("a".into(), JsValue::Int(1))],
        );
        assert_eq!(inspect(&heap, &JsValue::Object(h)).unwrap(), "{ a: 1, b: 'two' }");
    }

    #[test]
    fn tagged_prototype_prefixes_class_name() {
        let mut heap = ObjectHeap::new();
        let proto = heap.alloc_plain();
        heap.get_mut(proto).unwrap().class_tag = Some("Car".to_string());
        let car = heap.alloc(Some(proto));
        assert_eq!(inspect(&heap, &JsValue::Object(car)).unwrap(), "Car {}");
    }

    #[test]
    fn cycles_are_marked() {
        let mut heap = ObjectHeap::new();
        let h = heap.alloc_plain();
        heap.set_property(h, "me".into(), JsValue::Object(h)).unwrap();
        assert_eq!(inspect(&heap, &JsValue::Object(h)).unwrap(), "{ me: [Circular] }");
    }

    #[test]
    fn quoted_keys_when_not_identifiers() {
        assert_eq!(render_key("horn"), "horn");
        assert_eq!(render_key("0"), "'0'");
        assert_eq!(render_key("two words"), "'two words'");
    }

    #[test]
    fn array_like_renders_elements() {
        let mut heap = ObjectHeap::new();
        let proto = heap.alloc_plain();
        heap.get_mut(proto).unwrap().class_tag = Some("Array".to_string());
        let arr = heap.from_entries(
            Some(proto),
            vec![("0".into(), JsValue::Int(1)), ("1".into(), JsValue::str("b"))],
        );
        heap.define_property(arr, "length".into(), PropertyDescriptor::hidden(JsValue::Int(2)))
            .unwrap();
        assert_eq!(inspect(&heap, &JsValue::Object(arr)).unwrap(), "[ 1, 'b' ]");
    }

    #[test]
    fn huge_array_like_is_summarised() {
        let mut heap = ObjectHeap::new();
        let proto = heap.alloc_plain();
        heap.get_mut(proto).unwrap().class_tag = Some("Array".to_string());
        let arr = heap.from_entries(Some(proto), vec![("0".into(), JsValue::Int(7))]);
        heap.define_property(
            arr,
            "length".into(),
            PropertyDescriptor::hidden(JsValue::Int(50_000_000)),
        )
        .unwrap();
        let rendered = inspect(&heap, &JsValue::Object(arr)).unwrap();
        assert!(rendered.starts_with("[ 7, undefined, "));
        assert!(rendered.ends_with(", ... 49999900 more items ]"));
        assert_eq!(rendered.matches("undefined").count(), MAX_INSPECT_ITEMS - 1);
    }

    #[test]
    fn array_items_stop_at_limit() {
        let mut heap = ObjectHeap::new();
        let arr = heap.alloc_plain();
        heap.set_property(arr, "length".into(), JsValue::Int(1_000_000)).unwrap();
        assert_eq!(array_length(&heap, arr).unwrap(), 1_000_000);
        assert_eq!(array_items(&heap, arr, 3).unwrap().len(), 3);
    }

    #[test]
    fn sink_keeps_order() {
        let mut sink = ConsoleSink::new();
        sink.push("first");
        sink.push(String::from("second"));
        assert_eq!(sink.lines(), ["first", "second"]);
        assert_eq!(sink.len(), 2);
    }
}
