//! Object model with data property descriptors and prototype chains.
//!
//! Everything a receiver can resolve to lives here:
//!
//! - **Values**: the primitive values plus typed handles for objects and
//!   function objects.
//! - **Property descriptors**: data descriptors with writable/enumerable/
//!   configurable attributes.
//! - **Prototype chains**: `[[Prototype]]` slot with bounded, cycle-checked
//!   traversal.
//! - **Function objects**: ordinary heap objects that additionally carry a
//!   callable payload, so they can own properties of their own (`f.name`,
//!   `f.prototype`, or anything a script assigns).
//!
//! `BTreeMap`/`BTreeSet` for deterministic ordering; own keys therefore
//! enumerate in key order rather than insertion order.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::closure_model::FunctionObject;

// ---------------------------------------------------------------------------
// PropertyKey
// ---------------------------------------------------------------------------

/// A property key. Only string keys exist in this model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyKey(pub String);

impl PropertyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ---------------------------------------------------------------------------
// ObjectHandle
// ---------------------------------------------------------------------------

/// Opaque handle referencing an object on the managed heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHandle(pub u32);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// JsValue
// ---------------------------------------------------------------------------

/// Runtime value.
///
/// Functions are heap objects too; the separate `Function` variant keeps
/// `typeof` and callability checks cheap without a heap lookup.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum JsValue {
    Undefined,
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Object(ObjectHandle),
    Function(ObjectHandle),
}

impl JsValue {
    pub fn str(s: &str) -> Self {
        Self::Str(s.to_string())
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Function(_))
    }

    /// `undefined` or `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, Self::Undefined | Self::Null)
    }

    /// Heap handle for objects and functions, `None` for primitives.
    pub fn as_handle(&self) -> Option<ObjectHandle> {
        match self {
            Self::Object(h) | Self::Function(h) => Some(*h),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "object",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "number",
            Self::Str(_) => "string",
            Self::Object(_) => "object",
            Self::Function(_) => "function",
        }
    }

    /// SameValue comparison. Objects compare by identity.
    pub fn same_value(&self, other: &Self) -> bool {
        self == other
    }
}

impl fmt::Display for JsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Undefined => write!(f, "undefined"),
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Object(h) => write!(f, "[object#{}]", h.0),
            Self::Function(h) => write!(f, "[function#{}]", h.0),
        }
    }
}

// ---------------------------------------------------------------------------
// PropertyDescriptor
// ---------------------------------------------------------------------------

/// Data property descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub value: JsValue,
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl PropertyDescriptor {
    /// Writable, enumerable, configurable: what plain assignment creates.
    pub fn data(value: JsValue) -> Self {
        Self {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// Non-writable, non-enumerable, configurable. Used for a function's
    /// `name` and `length`.
    pub fn read_only(value: JsValue) -> Self {
        Self {
            value,
            writable: false,
            enumerable: false,
            configurable: true,
        }
    }

    /// Writable but hidden from enumeration (`prototype`, `constructor`).
    pub fn hidden(value: JsValue) -> Self {
        Self {
            value,
            writable: true,
            enumerable: false,
            configurable: false,
        }
    }
}

// ---------------------------------------------------------------------------
// ObjectError
// ---------------------------------------------------------------------------

/// Errors from object model operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectError {
    /// Object not found in the heap.
    ObjectNotFound(ObjectHandle),
    /// Prototype chain cycle detected.
    PrototypeCycleDetected,
    /// Maximum prototype chain depth exceeded.
    PrototypeChainTooDeep { depth: u32, max: u32 },
}

impl fmt::Display for ObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectNotFound(h) => write!(f, "object#{} not found", h.0),
            Self::PrototypeCycleDetected => write!(f, "TypeError: prototype chain cycle detected"),
            Self::PrototypeChainTooDeep { depth, max } => {
                write!(
                    f,
                    "TypeError: prototype chain depth {depth} exceeds max {max}"
                )
            }
        }
    }
}

impl std::error::Error for ObjectError {}

// ---------------------------------------------------------------------------
// OrdinaryObject
// ---------------------------------------------------------------------------

/// Maximum prototype chain depth to prevent infinite loops.
const MAX_PROTOTYPE_CHAIN_DEPTH: u32 = 1024;

/// An ordinary object with internal slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdinaryObject {
    /// `[[Prototype]]` internal slot (`None` ends the chain).
    pub prototype: Option<ObjectHandle>,
    /// Own properties keyed by name.
    pub properties: BTreeMap<PropertyKey, PropertyDescriptor>,
    /// Constructor name shown by inspection (`Car {}`), set on prototype
    /// objects created for constructors.
    pub class_tag: Option<String>,
    /// Callable payload for function objects.
    pub callable: Option<FunctionObject>,
}

impl OrdinaryObject {
    pub fn with_prototype(proto: Option<ObjectHandle>) -> Self {
        Self {
            prototype: proto,
            ..Self::default()
        }
    }

    pub fn get_own_property(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
        self.properties.get(key)
    }

    pub fn has_own_property(&self, key: &PropertyKey) -> bool {
        self.properties.contains_key(key)
    }

    /// Define or replace a property. Non-configurable properties may only
    /// have their value changed, and only while writable.
    pub fn define_own_property(&mut self, key: PropertyKey, desc: PropertyDescriptor) -> bool {
        if let Some(current) = self.properties.get(&key)
            && !current.configurable
        {
            if desc.configurable || desc.enumerable != current.enumerable {
                return false;
            }
            if !current.writable && (desc.writable || !current.value.same_value(&desc.value)) {
                return false;
            }
        }
        self.properties.insert(key, desc);
        true
    }
}

// ---------------------------------------------------------------------------
// ObjectHeap
// ---------------------------------------------------------------------------

/// Arena of managed objects. Handles are indices and are never reused.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectHeap {
    objects: Vec<OrdinaryObject>,
}

impl ObjectHeap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new ordinary object with the given prototype.
    pub fn alloc(&mut self, proto: Option<ObjectHandle>) -> ObjectHandle {
        self.push(OrdinaryObject::with_prototype(proto))
    }

    /// Allocate a new ordinary object with no prototype.
    pub fn alloc_plain(&mut self) -> ObjectHandle {
        self.alloc(None)
    }

    /// Allocate a function object carrying `callable`.
    pub fn alloc_function(
        &mut self,
        proto: Option<ObjectHandle>,
        callable: FunctionObject,
    ) -> ObjectHandle {
        self.push(OrdinaryObject {
            callable: Some(callable),
            ..OrdinaryObject::with_prototype(proto)
        })
    }

    fn push(&mut self, object: OrdinaryObject) -> ObjectHandle {
        let handle = ObjectHandle(self.objects.len() as u32);
        self.objects.push(object);
        handle
    }

    pub fn get(&self, handle: ObjectHandle) -> Result<&OrdinaryObject, ObjectError> {
        self.objects
            .get(handle.0 as usize)
            .ok_or(ObjectError::ObjectNotFound(handle))
    }

    pub fn get_mut(&mut self, handle: ObjectHandle) -> Result<&mut OrdinaryObject, ObjectError> {
        self.objects
            .get_mut(handle.0 as usize)
            .ok_or(ObjectError::ObjectNotFound(handle))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Callable payload of a function object.
    pub fn callable(&self, handle: ObjectHandle) -> Result<Option<&FunctionObject>, ObjectError> {
        Ok(self.get(handle)?.callable.as_ref())
    }

    /// Walk the prototype chain starting at `handle` (inclusive), calling
    /// `visit` on each link until it returns `Some`.
    fn walk_chain<T>(
        &self,
        handle: ObjectHandle,
        mut visit: impl FnMut(ObjectHandle, &OrdinaryObject) -> Option<T>,
    ) -> Result<Option<T>, ObjectError> {
        let mut current = Some(handle);
        let mut depth: u32 = 0;
        let mut visited = BTreeSet::new();

        while let Some(h) = current {
            if depth > MAX_PROTOTYPE_CHAIN_DEPTH {
                return Err(ObjectError::PrototypeChainTooDeep {
                    depth,
                    max: MAX_PROTOTYPE_CHAIN_DEPTH,
                });
            }
            if !visited.insert(h) {
                return Err(ObjectError::PrototypeCycleDetected);
            }
            let obj = self.get(h)?;
            if let Some(found) = visit(h, obj) {
                return Ok(Some(found));
            }
            current = obj.prototype;
            depth += 1;
        }
        Ok(None)
    }

    /// `[[Get]](O, P)`: own property first, then the prototype chain.
    pub fn get_property(
        &self,
        handle: ObjectHandle,
        key: &PropertyKey,
    ) -> Result<JsValue, ObjectError> {
        let found = self.walk_chain(handle, |_, o| {
            o.get_own_property(key).map(|desc| desc.value.clone())
        })?;
        Ok(found.unwrap_or(JsValue::Undefined))
    }

    /// `[[HasProperty]](O, P)`: walks the prototype chain.
    pub fn has_property(&self, handle: ObjectHandle, key: &PropertyKey) -> Result<bool, ObjectError> {
        Ok(self
            .walk_chain(handle, |_, o| o.has_own_property(key).then_some(()))?
            .is_some())
    }

    pub fn has_own(&self, handle: ObjectHandle, key: &PropertyKey) -> Result<bool, ObjectError> {
        Ok(self.get(handle)?.has_own_property(key))
    }

    /// `[[Set]](O, P, V)` on the object itself.
    ///
    /// Returns `Ok(false)` when the write is rejected because the own
    /// property, or an inherited one of the same name, is non-writable.
    pub fn set_property(
        &mut self,
        handle: ObjectHandle,
        key: PropertyKey,
        value: JsValue,
    ) -> Result<bool, ObjectError> {
        let inherited_read_only = self
            .walk_chain(handle, |_, o| o.get_own_property(&key).map(|d| !d.writable))?
            .unwrap_or(false);
        let obj = self.get_mut(handle)?;
        match obj.properties.get_mut(&key) {
            Some(desc) if desc.writable => {
                desc.value = value;
                Ok(true)
            }
            Some(_) => Ok(false),
            None if inherited_read_only => Ok(false),
            None => {
                obj.properties.insert(key, PropertyDescriptor::data(value));
                Ok(true)
            }
        }
    }

    pub fn define_property(
        &mut self,
        handle: ObjectHandle,
        key: PropertyKey,
        desc: PropertyDescriptor,
    ) -> Result<bool, ObjectError> {
        Ok(self.get_mut(handle)?.define_own_property(key, desc))
    }

    pub fn get_prototype_of(&self, handle: ObjectHandle) -> Result<Option<ObjectHandle>, ObjectError> {
        Ok(self.get(handle)?.prototype)
    }

    /// `[[SetPrototypeOf]]`, rejecting chains that would loop back to
    /// `handle`.
    pub fn set_prototype_of(
        &mut self,
        handle: ObjectHandle,
        proto: Option<ObjectHandle>,
    ) -> Result<(), ObjectError> {
        if let Some(p) = proto {
            let loops = self
                .walk_chain(p, |h, _| (h == handle).then_some(()))?
                .is_some();
            if loops {
                return Err(ObjectError::PrototypeCycleDetected);
            }
        }
        self.get_mut(handle)?.prototype = proto;
        Ok(())
    }

    /// `Object.keys`: enumerable own string keys.
    pub fn keys(&self, handle: ObjectHandle) -> Result<Vec<String>, ObjectError> {
        Ok(self
            .get(handle)?
            .properties
            .iter()
            .filter(|(_, d)| d.enumerable)
            .map(|(k, _)| k.0.clone())
            .collect())
    }

    /// Enumerable own `(key, value)` pairs.
    pub fn entries(&self, handle: ObjectHandle) -> Result<Vec<(String, JsValue)>, ObjectError> {
        Ok(self
            .get(handle)?
            .properties
            .iter()
            .filter(|(_, d)| d.enumerable)
            .map(|(k, d)| (k.0.clone(), d.value.clone()))
            .collect())
    }

    /// Build a plain object from `(key, value)` pairs.
    pub fn from_entries(
        &mut self,
        proto: Option<ObjectHandle>,
        entries: Vec<(String, JsValue)>,
    ) -> ObjectHandle {
        let handle = self.alloc(proto);
        let obj = &mut self.objects[handle.0 as usize];
        for (k, v) in entries {
            obj.properties
                .insert(PropertyKey(k), PropertyDescriptor::data(v));
        }
        handle
    }
}
