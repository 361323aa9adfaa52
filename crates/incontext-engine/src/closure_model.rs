//! Closure and lexical scope model.
//!
//! Runtime representation of function-level scoping:
//! - **Environment records** hold `var` and parameter bindings for one
//!   function activation, plus that activation's `this` binding.
//! - **Scope chain** of active environments with push/pop matching call
//!   entry/exit. A record outlives its activation only when a closure
//!   captured it; otherwise its slot is recycled on pop.
//! - **Function objects**: either a closure (template + creation
//!   environment) or a bound function carrying its permanent receiver.
//!
//! The global environment has no bindings of its own; global `var`s and
//! function declarations are properties of the realm's global object.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::ast::FunctionTemplate;
use crate::object_model::{JsValue, ObjectHandle};
use crate::receiver::ReceiverBinding;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Opaque handle to an environment record in the [`ScopeChain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EnvironmentHandle(pub u32);

/// Handle of the global environment; always present.
pub const GLOBAL_ENVIRONMENT: EnvironmentHandle = EnvironmentHandle(0);

// ---------------------------------------------------------------------------
// Environment records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnvironmentKind {
    /// Backed by the global object.
    Global,
    /// One function activation.
    Function,
}

/// The binding storage for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub handle: EnvironmentHandle,
    pub kind: EnvironmentKind,
    /// Lexically enclosing environment (`None` only for the global one).
    pub outer: Option<EnvironmentHandle>,
    pub bindings: BTreeMap<String, JsValue>,
    /// Receiver resolved for this activation.
    pub this_binding: Option<JsValue>,
    /// Set once a closure is created over this environment.
    #[serde(default)]
    pub captured: bool,
}

impl EnvironmentRecord {
    pub fn new(
        handle: EnvironmentHandle,
        kind: EnvironmentKind,
        outer: Option<EnvironmentHandle>,
    ) -> Self {
        Self {
            handle,
            kind,
            outer,
            bindings: BTreeMap::new(),
            this_binding: None,
            captured: false,
        }
    }

    pub fn get_binding(&self, name: &str) -> Option<&JsValue> {
        self.bindings.get(name)
    }

    pub fn has_binding(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }
}

// ---------------------------------------------------------------------------
// Function objects
// ---------------------------------------------------------------------------

/// A function template closed over the environment it was created in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Closure {
    pub template: Rc<FunctionTemplate>,
    pub creation_env: EnvironmentHandle,
}

/// Result of `bind`: a new callable with a permanent receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundFunction {
    /// The function that actually runs.
    pub target: ObjectHandle,
    pub binding: ReceiverBinding,
    /// Leading arguments fixed at bind time.
    pub bound_args: Vec<JsValue>,
}

/// Callable payload of a function object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionObject {
    Closure(Closure),
    Bound(BoundFunction),
}

impl FunctionObject {
    /// Permanent receiver binding, if this is a bound function.
    pub fn permanent_binding(&self) -> Option<&ReceiverBinding> {
        match self {
            Self::Closure(_) => None,
            Self::Bound(b) => Some(&b.binding),
        }
    }
}

// ---------------------------------------------------------------------------
// Scope errors
// ---------------------------------------------------------------------------

/// Errors that can arise during scope chain operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScopeError {
    /// Popping would remove the global environment.
    EmptyScopeChain,
    /// Invalid environment handle.
    InvalidEnvironment { handle: EnvironmentHandle },
}

impl fmt::Display for ScopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyScopeChain => f.write_str("InternalError: scope chain is empty"),
            Self::InvalidEnvironment { handle } => {
                write!(f, "InternalError: invalid environment handle {}", handle.0)
            }
        }
    }
}

impl std::error::Error for ScopeError {}

// ---------------------------------------------------------------------------
// Scope chain
// ---------------------------------------------------------------------------

/// Stack of active environments over an arena of live environments.
///
/// The arena holds the active activations plus every environment a closure
/// captured. Slots of uncaptured activations are reused after pop, so the
/// arena is bounded by call depth plus captured environments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeChain {
    environments: Vec<EnvironmentRecord>,
    /// Active activations, innermost last. Always starts with the global one.
    chain: Vec<EnvironmentHandle>,
    /// Recycled slots, reused by the next push.
    #[serde(default)]
    free: Vec<EnvironmentHandle>,
}

impl ScopeChain {
    /// A chain holding only the global environment, whose receiver is
    /// `global_this`.
    pub fn new(global_this: JsValue) -> Self {
        let mut global = EnvironmentRecord::new(GLOBAL_ENVIRONMENT, EnvironmentKind::Global, None);
        global.this_binding = Some(global_this);
        Self {
            environments: vec![global],
            chain: vec![GLOBAL_ENVIRONMENT],
            free: Vec::new(),
        }
    }

    /// Enter a function activation whose lexical parent is `outer`.
    pub fn push_function_env(
        &mut self,
        outer: EnvironmentHandle,
        this_binding: JsValue,
    ) -> Result<EnvironmentHandle, ScopeError> {
        self.get_env(outer)?;
        let handle = self
            .free
            .pop()
            .unwrap_or(EnvironmentHandle(self.environments.len() as u32));
        let mut env = EnvironmentRecord::new(handle, EnvironmentKind::Function, Some(outer));
        env.this_binding = Some(this_binding);
        match self.environments.get_mut(handle.0 as usize) {
            Some(slot) => *slot = env,
            None => self.environments.push(env),
        }
        self.chain.push(handle);
        Ok(handle)
    }

    /// Leave the innermost activation, recycling its record unless a
    /// closure captured it.
    pub fn pop_scope(&mut self) -> Result<EnvironmentHandle, ScopeError> {
        if self.chain.len() <= 1 {
            return Err(ScopeError::EmptyScopeChain);
        }
        let handle = self.chain.pop().ok_or(ScopeError::EmptyScopeChain)?;
        let env = self.get_env_mut(handle)?;
        if !env.captured {
            env.bindings.clear();
            env.this_binding = None;
            self.free.push(handle);
        }
        Ok(handle)
    }

    /// Keep `handle` alive after its activation ends.
    pub fn mark_captured(&mut self, handle: EnvironmentHandle) -> Result<(), ScopeError> {
        self.get_env_mut(handle)?.captured = true;
        Ok(())
    }

    /// Number of active function activations (the global one excluded).
    pub fn depth(&self) -> usize {
        self.chain.len() - 1
    }

    /// Slots in the arena, recycled ones included.
    pub fn arena_len(&self) -> usize {
        self.environments.len()
    }

    pub fn get_env(&self, handle: EnvironmentHandle) -> Result<&EnvironmentRecord, ScopeError> {
        self.environments
            .get(handle.0 as usize)
            .ok_or(ScopeError::InvalidEnvironment { handle })
    }

    pub fn get_env_mut(
        &mut self,
        handle: EnvironmentHandle,
    ) -> Result<&mut EnvironmentRecord, ScopeError> {
        self.environments
            .get_mut(handle.0 as usize)
            .ok_or(ScopeError::InvalidEnvironment { handle })
    }

    /// Declare (or redeclare) a binding in a function environment.
    pub fn declare(
        &mut self,
        handle: EnvironmentHandle,
        name: &str,
        value: JsValue,
    ) -> Result<(), ScopeError> {
        self.get_env_mut(handle)?
            .bindings
            .insert(name.to_string(), value);
        Ok(())
    }

    /// Find the nearest function environment, starting at `start` and
    /// following `outer` links, that binds `name`. `None` means the name
    /// must be resolved against the global object.
    pub fn resolve(
        &self,
        start: EnvironmentHandle,
        name: &str,
    ) -> Result<Option<EnvironmentHandle>, ScopeError> {
        let mut current = Some(start);
        while let Some(handle) = current {
            let env = self.get_env(handle)?;
            if env.has_binding(name) {
                return Ok(Some(handle));
            }
            current = env.outer;
        }
        Ok(None)
    }

    pub fn get_value(&self, start: EnvironmentHandle, name: &str) -> Result<Option<JsValue>, ScopeError> {
        match self.resolve(start, name)? {
            Some(handle) => Ok(self.get_env(handle)?.get_binding(name).cloned()),
            None => Ok(None),
        }
    }

    /// Overwrite an existing lexical binding. Returns `false` when no
    /// function environment binds `name`.
    pub fn set_value(
        &mut self,
        start: EnvironmentHandle,
        name: &str,
        value: JsValue,
    ) -> Result<bool, ScopeError> {
        match self.resolve(start, name)? {
            Some(handle) => {
                self.declare(handle, name, value)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
