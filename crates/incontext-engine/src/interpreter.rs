//! Tree-walking evaluator over [`crate::ast`] with explicit receiver
//! resolution.
//!
//! A [`Realm`] owns the object heap, the scope chain, the global object and
//! the console. Every call goes through [`Realm::invoke`] (or
//! [`Realm::construct`]) with an explicit [`InvocationStyle`]; the receiver
//! the body sees is whatever [`resolve_receiver`] returns for that style and
//! the callee's bind history. Nothing consults the global object implicitly
//! except sloppy-mode resolution, which receives it as an argument.

use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::ast::{Expression, FunctionTemplate, Script, Statement};
use crate::closure_model::{
    BoundFunction, Closure, EnvironmentHandle, FunctionObject, GLOBAL_ENVIRONMENT, ScopeChain,
};
use crate::console::{self, ConsoleSink, TraceEvent};
use crate::error::RealmError;
use crate::object_model::{JsValue, ObjectHandle, ObjectHeap, PropertyDescriptor, PropertyKey};
use crate::receiver::{
    ArgumentPassing, EvaluationMode, InvocationRecord, InvocationStyle, ReceiverRef,
    bind_receiver, resolve_receiver,
};

const COMPONENT: &str = "receiver_resolver";

// ---------------------------------------------------------------------------
// RealmConfig
// ---------------------------------------------------------------------------

/// Default activation limit. Each activation recurses through the tree
/// walker several frames deep, so this stays well inside a 2 MiB thread stack.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// Longest array-like accepted as an argument list or joined to a string.
pub const MAX_ARRAY_LIKE_LENGTH: usize = 65_536;

/// Realm configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmConfig {
    /// Strict (default) or sloppy receiver fallback.
    pub mode: EvaluationMode,
    /// Maximum nested function activations.
    pub max_call_depth: usize,
    /// Trace identifier stamped on every [`TraceEvent`].
    pub trace_id: String,
    /// How many recent [`InvocationRecord`]s to keep for inspection.
    pub invocation_history: usize,
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            mode: EvaluationMode::Strict,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            trace_id: "incontext-trace".to_string(),
            invocation_history: 64,
        }
    }
}

impl RealmConfig {
    pub fn with_mode(mode: EvaluationMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Realm
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Realm {
    config: RealmConfig,
    heap: ObjectHeap,
    scopes: ScopeChain,
    object_prototype: ObjectHandle,
    function_prototype: ObjectHandle,
    array_prototype: ObjectHandle,
    global: ObjectHandle,
    console: ConsoleSink,
    events: Vec<TraceEvent>,
    invocations: VecDeque<InvocationRecord>,
}

impl Realm {
    pub fn new(config: RealmConfig) -> Self {
        let mut heap = ObjectHeap::new();
        let object_prototype = heap.alloc_plain();
        let function_prototype = heap.alloc(Some(object_prototype));
        let array_prototype = heap.alloc(Some(object_prototype));
        let window_prototype = heap.alloc(Some(object_prototype));
        let global = heap.alloc(Some(window_prototype));
        if let Ok(proto) = heap.get_mut(array_prototype) {
            proto.class_tag = Some("Array".to_string());
        }
        if let Ok(proto) = heap.get_mut(window_prototype) {
            proto.class_tag = Some("Window".to_string());
        }
        for (key, desc) in [
            ("undefined", PropertyDescriptor::read_only(JsValue::Undefined)),
            ("window", PropertyDescriptor::hidden(JsValue::Object(global))),
            ("globalThis", PropertyDescriptor::hidden(JsValue::Object(global))),
        ] {
            // Fresh object: definitions cannot conflict.
            let _ = heap.define_property(global, key.into(), desc);
        }

        Self {
            config,
            heap,
            scopes: ScopeChain::new(JsValue::Object(global)),
            object_prototype,
            function_prototype,
            array_prototype,
            global,
            console: ConsoleSink::new(),
            events: Vec::new(),
            invocations: VecDeque::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(RealmConfig::default())
    }

    pub fn config(&self) -> &RealmConfig {
        &self.config
    }

    pub fn mode(&self) -> EvaluationMode {
        self.config.mode
    }

    pub fn heap(&self) -> &ObjectHeap {
        &self.heap
    }

    pub fn console(&self) -> &ConsoleSink {
        &self.console
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Drain console lines and events, leaving the heap intact.
    pub fn take_output(&mut self) -> (ConsoleSink, Vec<TraceEvent>) {
        (
            std::mem::take(&mut self.console),
            std::mem::take(&mut self.events),
        )
    }

    /// The explicit global object.
    pub fn global(&self) -> JsValue {
        JsValue::Object(self.global)
    }

    pub fn object_prototype(&self) -> ObjectHandle {
        self.object_prototype
    }

    /// Most recent invocation records, oldest first.
    pub fn invocations(&self) -> impl Iterator<Item = &InvocationRecord> {
        self.invocations.iter()
    }

    pub fn last_invocation(&self) -> Option<&InvocationRecord> {
        self.invocations.back()
    }

    // -- Object creation ----------------------------------------------------

    /// Plain object linked to the object prototype.
    pub fn create_object(&mut self, entries: Vec<(&str, JsValue)>) -> JsValue {
        let handle = self.heap.from_entries(
            Some(self.object_prototype),
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        );
        JsValue::Object(handle)
    }

    /// Array-like object: indexed elements plus a hidden `length`.
    pub fn create_array(&mut self, items: Vec<JsValue>) -> JsValue {
        let length = items.len() as i64;
        let handle = self.heap.from_entries(
            Some(self.array_prototype),
            items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), v))
                .collect(),
        );
        let _ = self.heap.define_property(
            handle,
            "length".into(),
            PropertyDescriptor::hidden(JsValue::Int(length)),
        );
        JsValue::Object(handle)
    }

    /// Function closed over the global environment.
    pub fn create_function(&mut self, template: FunctionTemplate) -> Result<JsValue, RealmError> {
        self.instantiate(Rc::new(template), GLOBAL_ENVIRONMENT, None)
    }

    fn instantiate(
        &mut self,
        template: Rc<FunctionTemplate>,
        env: EnvironmentHandle,
        inferred_name: Option<&str>,
    ) -> Result<JsValue, RealmError> {
        let name = match (template.name.as_str(), inferred_name) {
            ("", Some(inferred)) => inferred.to_string(),
            (own, _) => own.to_string(),
        };
        let arity = template.arity() as i64;
        let constructable = template.constructable;
        if env != GLOBAL_ENVIRONMENT {
            self.scopes.mark_captured(env)?;
        }
        let handle = self.heap.alloc_function(
            Some(self.function_prototype),
            FunctionObject::Closure(Closure {
                template,
                creation_env: env,
            }),
        );
        self.define_function_metadata(handle, &name, arity)?;

        if constructable {
            let proto = self.heap.alloc(Some(self.object_prototype));
            if !name.is_empty() {
                self.heap.get_mut(proto)?.class_tag = Some(name);
            }
            self.heap.define_property(
                proto,
                "constructor".into(),
                PropertyDescriptor::hidden(JsValue::Function(handle)),
            )?;
            self.heap.define_property(
                handle,
                "prototype".into(),
                PropertyDescriptor::hidden(JsValue::Object(proto)),
            )?;
        }
        Ok(JsValue::Function(handle))
    }

    fn define_function_metadata(
        &mut self,
        handle: ObjectHandle,
        name: &str,
        arity: i64,
    ) -> Result<(), RealmError> {
        self.heap.define_property(
            handle,
            "name".into(),
            PropertyDescriptor::read_only(JsValue::str(name)),
        )?;
        self.heap.define_property(
            handle,
            "length".into(),
            PropertyDescriptor::read_only(JsValue::Int(arity)),
        )?;
        Ok(())
    }

    // -- Globals ------------------------------------------------------------

    pub fn declare_global(&mut self, name: &str, value: JsValue) -> Result<(), RealmError> {
        self.heap.set_property(self.global, name.into(), value)?;
        Ok(())
    }

    pub fn get_global(&self, name: &str) -> Result<JsValue, RealmError> {
        let key = PropertyKey::from(name);
        if !self.heap.has_property(self.global, &key)? {
            return Err(RealmError::UndeclaredIdentifier {
                name: name.to_string(),
            });
        }
        Ok(self.heap.get_property(self.global, &key)?)
    }

    // -- Property access ----------------------------------------------------

    /// `base[key]`. Reading through `undefined`/`null` is a TypeError.
    pub fn get(&self, base: &JsValue, key: &str) -> Result<JsValue, RealmError> {
        match base {
            JsValue::Undefined | JsValue::Null => Err(RealmError::PropertyOfNonObject {
                key: key.to_string(),
                base: base.to_string(),
            }),
            JsValue::Object(h) | JsValue::Function(h) => {
                Ok(self.heap.get_property(*h, &PropertyKey::from(key))?)
            }
            JsValue::Str(s) if key == "length" => Ok(JsValue::Int(s.chars().count() as i64)),
            _ => Ok(JsValue::Undefined),
        }
    }

    /// `base[key] = value`.
    ///
    /// Writing through `undefined`/`null` is a [`RealmError::StrictAssignmentViolation`].
    /// Under strict evaluation, writes onto primitives and read-only
    /// properties fail too; sloppy evaluation drops them silently.
    pub fn set(&mut self, base: &JsValue, key: &str, value: JsValue) -> Result<(), RealmError> {
        let strict = self.config.mode == EvaluationMode::Strict;
        match base {
            JsValue::Undefined | JsValue::Null => Err(RealmError::StrictAssignmentViolation {
                key: key.to_string(),
                receiver: base.to_string(),
            }),
            JsValue::Object(h) | JsValue::Function(h) => {
                let written = self.heap.set_property(*h, key.into(), value)?;
                if !written && strict {
                    return Err(RealmError::ReadOnlyAssignment {
                        key: key.to_string(),
                        target: console::inspect(&self.heap, base)?,
                    });
                }
                Ok(())
            }
            primitive if strict => Err(RealmError::StrictAssignmentViolation {
                key: key.to_string(),
                receiver: format!("{} {}", primitive.type_name(), primitive),
            }),
            _ => Ok(()),
        }
    }

    pub fn has_own(&self, value: &JsValue, key: &str) -> Result<bool, RealmError> {
        match value.as_handle() {
            Some(h) => Ok(self.heap.has_own(h, &PropertyKey::from(key))?),
            None => Ok(false),
        }
    }

    /// Enumerable own keys of an object.
    pub fn own_keys(&self, value: &JsValue) -> Result<Vec<String>, RealmError> {
        match value.as_handle() {
            Some(h) => Ok(self.heap.keys(h)?),
            None => Ok(Vec::new()),
        }
    }

    pub fn prototype_of(&self, value: &JsValue) -> Result<Option<ObjectHandle>, RealmError> {
        match value.as_handle() {
            Some(h) => Ok(self.heap.get_prototype_of(h)?),
            None => Ok(None),
        }
    }

    /// `console.dir` rendering of a value.
    pub fn inspect(&self, value: &JsValue) -> Result<String, RealmError> {
        Ok(console::inspect(&self.heap, value)?)
    }

    /// ToString, as used by string concatenation.
    pub fn to_display_string(&self, value: &JsValue) -> Result<String, RealmError> {
        self.display_string_at(value, &mut BTreeSet::new())
    }

    /// An array already being joined renders as the empty string.
    fn display_string_at(
        &self,
        value: &JsValue,
        seen: &mut BTreeSet<ObjectHandle>,
    ) -> Result<String, RealmError> {
        match value {
            JsValue::Object(h) => {
                if self.heap.get_prototype_of(*h)? == Some(self.array_prototype) {
                    if !seen.insert(*h) {
                        return Ok(String::new());
                    }
                    let mut parts = Vec::new();
                    for item in self.bounded_array_items(*h, "array")? {
                        parts.push(match item {
                            JsValue::Undefined | JsValue::Null => String::new(),
                            other => self.display_string_at(&other, seen)?,
                        });
                    }
                    seen.remove(h);
                    Ok(parts.join(","))
                } else {
                    Ok("[object Object]".to_string())
                }
            }
            JsValue::Function(h) => {
                let name = self.heap.get_property(*h, &PropertyKey::from("name"))?;
                Ok(format!("function {name}() {{ [code] }}"))
            }
            primitive => Ok(primitive.to_string()),
        }
    }

    // -- Invocation ---------------------------------------------------------

    /// What `this` would resolve to if `callee` were invoked with `style`,
    /// without running it.
    pub fn resolve_for(
        &self,
        callee: &JsValue,
        style: &InvocationStyle,
    ) -> Result<ReceiverRef, RealmError> {
        let handle = self.callable_handle(callee, "value")?;
        let function = self.function_object(handle, "value")?;
        Ok(resolve_receiver(
            style,
            function.permanent_binding(),
            self.config.mode,
            &self.global(),
        ))
    }

    /// `f(args)`
    pub fn call_plain(&mut self, f: &JsValue, args: Vec<JsValue>) -> Result<JsValue, RealmError> {
        let result = self.invoke(f, InvocationStyle::Plain, args, "function");
        self.observe(result)
    }

    /// `owner.key(args)`
    pub fn call_method(
        &mut self,
        owner: &JsValue,
        key: &str,
        args: Vec<JsValue>,
    ) -> Result<JsValue, RealmError> {
        let result = self.get(owner, key).and_then(|f| {
            self.invoke(
                &f,
                InvocationStyle::Method {
                    owner: owner.clone(),
                },
                args,
                key,
            )
        });
        self.observe(result)
    }

    /// `f.call(receiver, ...args)`
    pub fn call_with_receiver(
        &mut self,
        f: &JsValue,
        receiver: JsValue,
        args: Vec<JsValue>,
    ) -> Result<JsValue, RealmError> {
        let style = InvocationStyle::ExplicitReceiver {
            receiver,
            passing: ArgumentPassing::Positional,
        };
        let result = self.invoke(f, style, args, "function");
        self.observe(result)
    }

    /// `f.apply(receiver, argList)`; `argList` is array-like or nullish.
    pub fn apply_with_receiver(
        &mut self,
        f: &JsValue,
        receiver: JsValue,
        arg_list: &JsValue,
    ) -> Result<JsValue, RealmError> {
        let result = self.list_from_array_like(arg_list, "apply").and_then(|args| {
            let style = InvocationStyle::ExplicitReceiver {
                receiver,
                passing: ArgumentPassing::Sequence,
            };
            self.invoke(f, style, args, "function")
        });
        self.observe(result)
    }

    /// `new ctor(args)`
    pub fn new_instance(
        &mut self,
        ctor: &JsValue,
        args: Vec<JsValue>,
    ) -> Result<JsValue, RealmError> {
        let result = self.construct(ctor, args, "constructor");
        self.observe(result)
    }

    /// `f.bind(receiver, ...args)`
    pub fn bind(
        &mut self,
        f: &JsValue,
        receiver: JsValue,
        args: Vec<JsValue>,
    ) -> Result<JsValue, RealmError> {
        let result = self.bind_function(f, receiver, args, "Bind target");
        self.observe(result)
    }

    /// Emit an error event for a failure escaping a public entry point.
    fn observe<T>(&mut self, result: Result<T, RealmError>) -> Result<T, RealmError> {
        if let Err(err) = &result {
            let event = TraceEvent {
                trace_id: self.config.trace_id.clone(),
                component: COMPONENT.to_string(),
                event: "rejected".to_string(),
                outcome: err.class().as_str().to_string(),
                error_code: Some(err.stable_code().to_string()),
            };
            self.events.push(event);
        }
        result
    }

    fn emit(&mut self, event: &str, outcome: &str) {
        self.events.push(TraceEvent {
            trace_id: self.config.trace_id.clone(),
            component: COMPONENT.to_string(),
            event: event.to_string(),
            outcome: outcome.to_string(),
            error_code: None,
        });
    }

    fn remember(&mut self, record: InvocationRecord) {
        if self.config.invocation_history == 0 {
            return;
        }
        if self.invocations.len() == self.config.invocation_history {
            self.invocations.pop_front();
        }
        self.invocations.push_back(record);
    }

    fn callable_handle(&self, value: &JsValue, description: &str) -> Result<ObjectHandle, RealmError> {
        match value {
            JsValue::Function(h) => Ok(*h),
            _ => Err(RealmError::NotCallable {
                description: description.to_string(),
            }),
        }
    }

    fn function_object(
        &self,
        handle: ObjectHandle,
        description: &str,
    ) -> Result<FunctionObject, RealmError> {
        self.heap
            .callable(handle)?
            .cloned()
            .ok_or_else(|| RealmError::NotCallable {
                description: description.to_string(),
            })
    }

    /// Call `callee` with an explicit invocation style.
    ///
    /// `Constructed` delegates to [`Realm::construct`], which allocates its
    /// own fresh object; the `target` carried by the style is not used.
    pub fn invoke(
        &mut self,
        callee: &JsValue,
        style: InvocationStyle,
        args: Vec<JsValue>,
        description: &str,
    ) -> Result<JsValue, RealmError> {
        if let InvocationStyle::Constructed { .. } = style {
            return self.construct(callee, args, description);
        }
        let handle = self.callable_handle(callee, description)?;
        let function = self.function_object(handle, description)?;
        let resolved = resolve_receiver(
            &style,
            function.permanent_binding(),
            self.config.mode,
            &self.global(),
        );
        self.emit(&format!("invoke_{}", style.name()), resolved.source.as_str());
        let receiver = resolved.value.clone();
        self.remember(InvocationRecord::new(handle, style, resolved));

        match function {
            FunctionObject::Bound(bound) => {
                let mut full_args = bound.bound_args;
                full_args.extend(args);
                self.invoke(
                    &JsValue::Function(bound.target),
                    InvocationStyle::PermanentlyBound { receiver },
                    full_args,
                    description,
                )
            }
            FunctionObject::Closure(closure) => self.run_closure(&closure, receiver, args),
        }
    }

    /// Constructor-style invocation.
    ///
    /// The body runs with a fresh object linked to `ctor.prototype`. The
    /// fresh object is the result unless the body returns an object. A bound
    /// constructor forwards to its target, ignoring the bound receiver.
    pub fn construct(
        &mut self,
        ctor: &JsValue,
        args: Vec<JsValue>,
        description: &str,
    ) -> Result<JsValue, RealmError> {
        let not_constructor = || RealmError::NotConstructor {
            description: description.to_string(),
        };
        let JsValue::Function(handle) = ctor else {
            return Err(not_constructor());
        };
        let closure = match self.function_object(*handle, description)? {
            FunctionObject::Bound(bound) => {
                let mut full_args = bound.bound_args;
                full_args.extend(args);
                return self.construct(&JsValue::Function(bound.target), full_args, description);
            }
            FunctionObject::Closure(closure) if closure.template.constructable => closure,
            FunctionObject::Closure(_) => return Err(not_constructor()),
        };

        let proto = match self.heap.get_property(*handle, &PropertyKey::from("prototype"))? {
            JsValue::Object(p) => p,
            _ => self.object_prototype,
        };
        let fresh = self.heap.alloc(Some(proto));
        let style = InvocationStyle::Constructed { target: fresh };
        let resolved = resolve_receiver(&style, None, self.config.mode, &self.global());
        self.emit("invoke_construct", resolved.source.as_str());
        self.remember(InvocationRecord::new(*handle, style, resolved));

        let result = self.run_closure(&closure, JsValue::Object(fresh), args)?;
        if result.is_object() {
            Ok(result)
        } else {
            Ok(JsValue::Object(fresh))
        }
    }

    fn bind_function(
        &mut self,
        f: &JsValue,
        receiver: JsValue,
        args: Vec<JsValue>,
        description: &str,
    ) -> Result<JsValue, RealmError> {
        let handle = self.callable_handle(f, description)?;
        let function = self.function_object(handle, description)?;
        let owner = self.heap.alloc(Some(self.function_prototype));
        let added = args.len() as i64;
        let (target, binding, bound_args) = match function {
            FunctionObject::Bound(existing) => {
                let mut bound_args = existing.bound_args;
                bound_args.extend(args);
                (
                    existing.target,
                    bind_receiver(Some(&existing.binding), owner, receiver),
                    bound_args,
                )
            }
            FunctionObject::Closure(_) => (handle, bind_receiver(None, owner, receiver), args),
        };

        let target_name = match self.heap.get_property(handle, &PropertyKey::from("name"))? {
            JsValue::Str(name) => name,
            _ => String::new(),
        };
        let target_length = match self.heap.get_property(handle, &PropertyKey::from("length"))? {
            JsValue::Int(n) => n,
            _ => 0,
        };
        let length = target_length.saturating_sub(added).max(0);

        self.heap.get_mut(owner)?.callable = Some(FunctionObject::Bound(BoundFunction {
            target,
            binding,
            bound_args,
        }));
        self.define_function_metadata(owner, &format!("bound {target_name}"), length)?;
        self.emit("bind", "permanent_binding");
        Ok(JsValue::Function(owner))
    }

    fn list_from_array_like(
        &self,
        arg_list: &JsValue,
        description: &str,
    ) -> Result<Vec<JsValue>, RealmError> {
        match arg_list {
            JsValue::Undefined | JsValue::Null => Ok(Vec::new()),
            JsValue::Object(h) | JsValue::Function(h) => self.bounded_array_items(*h, description),
            _ => Err(RealmError::NotArrayLike {
                description: description.to_string(),
            }),
        }
    }

    fn bounded_array_items(
        &self,
        handle: ObjectHandle,
        description: &str,
    ) -> Result<Vec<JsValue>, RealmError> {
        let length = console::array_length(&self.heap, handle)?;
        if length > MAX_ARRAY_LIKE_LENGTH {
            return Err(RealmError::ArrayLikeTooLong {
                description: description.to_string(),
                length,
                max: MAX_ARRAY_LIKE_LENGTH,
            });
        }
        Ok(console::array_items(&self.heap, handle, length)?)
    }

    fn run_closure(
        &mut self,
        closure: &Closure,
        this: JsValue,
        args: Vec<JsValue>,
    ) -> Result<JsValue, RealmError> {
        let depth = self.scopes.depth();
        if depth >= self.config.max_call_depth {
            return Err(RealmError::CallDepthExceeded {
                depth,
                max: self.config.max_call_depth,
            });
        }
        let env = self.scopes.push_function_env(closure.creation_env, this)?;
        let result = self.run_body(env, &closure.template, args);
        self.scopes.pop_scope()?;
        result
    }

    fn run_body(
        &mut self,
        env: EnvironmentHandle,
        template: &FunctionTemplate,
        args: Vec<JsValue>,
    ) -> Result<JsValue, RealmError> {
        let mut args = args.into_iter();
        for param in &template.params {
            let value = args.next().unwrap_or(JsValue::Undefined);
            self.scopes.declare(env, param, value)?;
        }
        for name in hoisted_vars(&template.body) {
            if !self.scopes.get_env(env)?.has_binding(name) {
                self.scopes.declare(env, name, JsValue::Undefined)?;
            }
        }
        for statement in &template.body {
            if let Some(value) = self.execute_in(env, statement)? {
                return Ok(value);
            }
        }
        Ok(JsValue::Undefined)
    }

    // -- Scripts ------------------------------------------------------------

    /// Hoist the script's function declarations and `var`s onto the global
    /// object, then run its statements with the global object as receiver.
    pub fn run_script(&mut self, script: &Script) -> Result<(), RealmError> {
        let result = self.run_script_inner(script);
        self.observe(result)
    }

    fn run_script_inner(&mut self, script: &Script) -> Result<(), RealmError> {
        self.hoist_inner(script)?;
        for statement in &script.body {
            if self.execute_in(GLOBAL_ENVIRONMENT, statement)?.is_some() {
                break;
            }
        }
        Ok(())
    }

    /// Only the declaration half of [`Realm::run_script`]: bind the
    /// script's functions and `var`s on the global object.
    pub fn hoist(&mut self, script: &Script) -> Result<(), RealmError> {
        let result = self.hoist_inner(script);
        self.observe(result)
    }

    fn hoist_inner(&mut self, script: &Script) -> Result<(), RealmError> {
        for template in &script.functions {
            let name = template.name.clone();
            let function = self.instantiate(Rc::clone(template), GLOBAL_ENVIRONMENT, None)?;
            self.declare_global(&name, function)?;
        }
        for name in hoisted_vars(&script.body) {
            if !self.heap.has_own(self.global, &PropertyKey::from(name))? {
                self.declare_global(name, JsValue::Undefined)?;
            }
        }
        Ok(())
    }

    /// Evaluate one expression at global scope.
    pub fn evaluate(&mut self, expression: &Expression) -> Result<JsValue, RealmError> {
        let result = self.eval_in(GLOBAL_ENVIRONMENT, expression);
        self.observe(result)
    }

    /// Execute one statement at global scope.
    pub fn execute(&mut self, statement: &Statement) -> Result<(), RealmError> {
        let result = self.execute_in(GLOBAL_ENVIRONMENT, statement).map(|_| ());
        self.observe(result)
    }

    /// Returns `Some` when the statement is a `return`.
    fn execute_in(
        &mut self,
        env: EnvironmentHandle,
        statement: &Statement,
    ) -> Result<Option<JsValue>, RealmError> {
        match statement {
            Statement::Var { name, init } => {
                let value = self.eval_named(env, init, name)?;
                if env == GLOBAL_ENVIRONMENT {
                    self.declare_global(name, value)?;
                } else {
                    self.scopes.declare(env, name, value)?;
                }
            }
            Statement::Assign { name, value } => {
                let value = self.eval_named(env, value, name)?;
                self.assign_identifier(env, name, value)?;
            }
            Statement::SetMember { object, key, value } => {
                let base = self.eval_in(env, object)?;
                let value = self.eval_in(env, value)?;
                self.set(&base, key, value)?;
            }
            Statement::Expression(expression) => {
                self.eval_in(env, expression)?;
            }
            Statement::Log(expression) => {
                let value = self.eval_in(env, expression)?;
                let line = console::render_log(&self.heap, &value)?;
                self.console.push(line);
            }
            Statement::Dir(expression) => {
                let value = self.eval_in(env, expression)?;
                let line = console::inspect(&self.heap, &value)?;
                self.console.push(line);
            }
            Statement::Return(expression) => {
                return Ok(Some(self.eval_in(env, expression)?));
            }
        }
        Ok(None)
    }

    /// `name = value`: innermost lexical binding, then an existing global.
    /// An undeclared name is a ReferenceError under strict evaluation and a
    /// new global property otherwise.
    fn assign_identifier(
        &mut self,
        env: EnvironmentHandle,
        name: &str,
        value: JsValue,
    ) -> Result<(), RealmError> {
        if self.scopes.set_value(env, name, value.clone())? {
            return Ok(());
        }
        let declared = self.heap.has_property(self.global, &PropertyKey::from(name))?;
        if !declared && self.config.mode == EvaluationMode::Strict {
            return Err(RealmError::UndeclaredIdentifier {
                name: name.to_string(),
            });
        }
        let global = self.global();
        self.set(&global, name, value)
    }

    fn lookup_identifier(&self, env: EnvironmentHandle, name: &str) -> Result<JsValue, RealmError> {
        match self.scopes.get_value(env, name)? {
            Some(value) => Ok(value),
            None => self.get_global(name),
        }
    }

    /// Evaluate with function-name inference for `var Dog = function () {}`.
    fn eval_named(
        &mut self,
        env: EnvironmentHandle,
        expression: &Expression,
        name: &str,
    ) -> Result<JsValue, RealmError> {
        match expression {
            Expression::Function(template) if template.name.is_empty() => {
                self.instantiate(Rc::clone(template), env, Some(name))
            }
            other => self.eval_in(env, other),
        }
    }

    fn eval_args(
        &mut self,
        env: EnvironmentHandle,
        args: &[Expression],
    ) -> Result<Vec<JsValue>, RealmError> {
        args.iter().map(|a| self.eval_in(env, a)).collect()
    }

    fn eval_in(
        &mut self,
        env: EnvironmentHandle,
        expression: &Expression,
    ) -> Result<JsValue, RealmError> {
        match expression {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::This => Ok(self
                .scopes
                .get_env(env)?
                .this_binding
                .clone()
                .unwrap_or(JsValue::Undefined)),
            Expression::Identifier(name) => self.lookup_identifier(env, name),
            Expression::Member { object, key } => {
                let base = self.eval_in(env, object)?;
                self.get(&base, key)
            }
            Expression::ObjectLiteral(entries) => {
                let handle = self.heap.alloc(Some(self.object_prototype));
                for (key, value) in entries {
                    let value = self.eval_named(env, value, key)?;
                    self.heap.set_property(handle, key.as_str().into(), value)?;
                }
                Ok(JsValue::Object(handle))
            }
            Expression::ArrayLiteral(items) => {
                let items = self.eval_args(env, items)?;
                Ok(self.create_array(items))
            }
            Expression::Function(template) => self.instantiate(Rc::clone(template), env, None),
            Expression::Concat(parts) => {
                let mut out = String::new();
                for part in parts {
                    let value = self.eval_in(env, part)?;
                    out.push_str(&self.to_display_string(&value)?);
                }
                Ok(JsValue::Str(out))
            }
            Expression::Call { callee, args } => {
                let description = describe(callee);
                match callee.as_ref() {
                    Expression::Member { object, key } => {
                        let owner = self.eval_in(env, object)?;
                        let function = self.get(&owner, key)?;
                        let args = self.eval_args(env, args)?;
                        self.invoke(&function, InvocationStyle::Method { owner }, args, &description)
                    }
                    other => {
                        let function = self.eval_in(env, other)?;
                        let args = self.eval_args(env, args)?;
                        self.invoke(&function, InvocationStyle::Plain, args, &description)
                    }
                }
            }
            Expression::CallWith {
                function,
                receiver,
                args,
            } => {
                let description = describe(function);
                let function = self.eval_in(env, function)?;
                let receiver = self.eval_in(env, receiver)?;
                let args = self.eval_args(env, args)?;
                let style = InvocationStyle::ExplicitReceiver {
                    receiver,
                    passing: ArgumentPassing::Positional,
                };
                self.invoke(&function, style, args, &description)
            }
            Expression::ApplyWith {
                function,
                receiver,
                arg_list,
            } => {
                let description = describe(function);
                let function = self.eval_in(env, function)?;
                let receiver = self.eval_in(env, receiver)?;
                let list = self.eval_in(env, arg_list)?;
                let args = self.list_from_array_like(&list, &description)?;
                let style = InvocationStyle::ExplicitReceiver {
                    receiver,
                    passing: ArgumentPassing::Sequence,
                };
                self.invoke(&function, style, args, &description)
            }
            Expression::Bind {
                function,
                receiver,
                args,
            } => {
                let description = describe(function);
                let function = self.eval_in(env, function)?;
                let receiver = self.eval_in(env, receiver)?;
                let args = self.eval_args(env, args)?;
                self.bind_function(&function, receiver, args, &description)
            }
            Expression::New { callee, args } => {
                let description = describe(callee);
                let ctor = self.eval_in(env, callee)?;
                let args = self.eval_args(env, args)?;
                self.construct(&ctor, args, &description)
            }
        }
    }
}

/// Names declared with top-level `var` in a body.
fn hoisted_vars(body: &[Statement]) -> Vec<&str> {
    body.iter()
        .filter_map(|s| match s {
            Statement::Var { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect()
}

/// Short source-like rendering of a callee for error messages.
fn describe(expression: &Expression) -> String {
    match expression {
        Expression::Identifier(name) => name.clone(),
        Expression::This => "this".to_string(),
        Expression::Member { object, key } => format!("{}.{key}", describe(object)),
        Expression::Call { callee, .. } => format!("{}(...)", describe(callee)),
        Expression::Literal(value) => value.to_string(),
        _ => "expression".to_string(),
    }
}
