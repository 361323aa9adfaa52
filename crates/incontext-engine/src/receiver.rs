//! Receiver resolution: what `this` is inside a function body.
//!
//! Every call carries an explicit [`InvocationStyle`]. Resolution is a pure
//! function of that style, the callee's permanent binding (if it is a bound
//! function) and the [`EvaluationMode`]:
//!
//! | style | receiver |
//! |---|---|
//! | `Plain` | `undefined` |
//! | `Method { owner }` | `owner` |
//! | `ExplicitReceiver { receiver, .. }` | `receiver` |
//! | `Constructed { target }` | the fresh `target` object |
//! | `PermanentlyBound { receiver }` | `receiver` |
//!
//! A permanent binding overrides every style except construction. There is
//! no ambient global object: in [`EvaluationMode::Sloppy`] the caller passes
//! the global object in explicitly and it substitutes only for a nullish
//! receiver.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::object_model::{JsValue, ObjectHandle};

/// Whether unresolved receivers fall back to the global object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    #[default]
    Strict,
    Sloppy,
}

impl EvaluationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Sloppy => "sloppy",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "strict" => Some(Self::Strict),
            "sloppy" => Some(Self::Sloppy),
            _ => None,
        }
    }
}

/// How explicit-receiver invocation passes the remaining arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentPassing {
    /// `call`: trailing arguments, one by one.
    Positional,
    /// `apply`: one array-like sequence.
    Sequence,
}

/// The syntactic form of a call, as seen at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "style", rename_all = "snake_case")]
pub enum InvocationStyle {
    /// `f()`
    Plain,
    /// `owner.f()`
    Method { owner: JsValue },
    /// `f.call(receiver, ..)` / `f.apply(receiver, [..])`
    ExplicitReceiver {
        receiver: JsValue,
        passing: ArgumentPassing,
    },
    /// `new f()`, running with the freshly allocated `target`.
    Constructed { target: ObjectHandle },
    /// Target of a bound function, invoked with the bound receiver.
    PermanentlyBound { receiver: JsValue },
}

impl InvocationStyle {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::Method { .. } => "method",
            Self::ExplicitReceiver {
                passing: ArgumentPassing::Positional,
                ..
            } => "call",
            Self::ExplicitReceiver {
                passing: ArgumentPassing::Sequence,
                ..
            } => "apply",
            Self::Constructed { .. } => "construct",
            Self::PermanentlyBound { .. } => "bound",
        }
    }
}

impl fmt::Display for InvocationStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a resolved receiver came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiverSource {
    /// Plain call under strict evaluation.
    Unresolved,
    /// Object left of the access operator.
    CallSiteOwner,
    /// Supplied through `call` / `apply`.
    ExplicitReceiver,
    /// Allocated by constructor invocation.
    FreshObject,
    /// Fixed by `bind`.
    PermanentBinding,
    /// Sloppy-mode substitution of the global object.
    AmbientGlobal,
}

impl ReceiverSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unresolved => "unresolved",
            Self::CallSiteOwner => "call_site_owner",
            Self::ExplicitReceiver => "explicit_receiver",
            Self::FreshObject => "fresh_object",
            Self::PermanentBinding => "permanent_binding",
            Self::AmbientGlobal => "ambient_global",
        }
    }
}

/// Result of resolution: the receiver value and its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverRef {
    pub value: JsValue,
    pub source: ReceiverSource,
}

impl ReceiverRef {
    pub fn new(value: JsValue, source: ReceiverSource) -> Self {
        Self { value, source }
    }

    /// `false` when the receiver is `undefined` or `null`.
    pub fn is_resolved(&self) -> bool {
        !self.value.is_nullish()
    }
}

/// Association between a function and the receiver it runs with.
///
/// Per-call bindings are discarded when the call returns. A permanent
/// binding is created by `bind`, lives as long as the bound function object
/// and is never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverBinding {
    pub owner_function: ObjectHandle,
    pub resolved_value: JsValue,
    pub permanent: bool,
}

impl ReceiverBinding {
    pub fn permanent(owner_function: ObjectHandle, resolved_value: JsValue) -> Self {
        Self {
            owner_function,
            resolved_value,
            permanent: true,
        }
    }
}

/// One call site's worth of receiver information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationRecord {
    pub function: ObjectHandle,
    pub style: InvocationStyle,
    pub explicit_receiver: Option<JsValue>,
    pub constructed_target: Option<ObjectHandle>,
    pub resolved: ReceiverRef,
}

impl InvocationRecord {
    pub fn new(function: ObjectHandle, style: InvocationStyle, resolved: ReceiverRef) -> Self {
        let explicit_receiver = match &style {
            InvocationStyle::ExplicitReceiver { receiver, .. } => Some(receiver.clone()),
            _ => None,
        };
        let constructed_target = match &style {
            InvocationStyle::Constructed { target } => Some(*target),
            _ => None,
        };
        Self {
            function,
            style,
            explicit_receiver,
            constructed_target,
            resolved,
        }
    }
}

/// Resolve the receiver for one invocation.
///
/// `permanent` is the callee's bind-time binding, `global` the realm's
/// global object, consulted only in sloppy mode.
pub fn resolve_receiver(
    style: &InvocationStyle,
    permanent: Option<&ReceiverBinding>,
    mode: EvaluationMode,
    global: &JsValue,
) -> ReceiverRef {
    let resolved = match (style, permanent) {
        (InvocationStyle::Constructed { target }, _) => {
            return ReceiverRef::new(JsValue::Object(*target), ReceiverSource::FreshObject);
        }
        (_, Some(binding)) if binding.permanent => {
            ReceiverRef::new(binding.resolved_value.clone(), ReceiverSource::PermanentBinding)
        }
        (InvocationStyle::Plain, _) => {
            ReceiverRef::new(JsValue::Undefined, ReceiverSource::Unresolved)
        }
        (InvocationStyle::Method { owner }, _) => {
            ReceiverRef::new(owner.clone(), ReceiverSource::CallSiteOwner)
        }
        (InvocationStyle::ExplicitReceiver { receiver, .. }, _) => {
            ReceiverRef::new(receiver.clone(), ReceiverSource::ExplicitReceiver)
        }
        (InvocationStyle::PermanentlyBound { receiver }, _) => {
            ReceiverRef::new(receiver.clone(), ReceiverSource::PermanentBinding)
        }
    };

    if mode == EvaluationMode::Sloppy && !resolved.is_resolved() {
        return ReceiverRef::new(global.clone(), ReceiverSource::AmbientGlobal);
    }
    resolved
}

/// Binding produced by `bind(target, requested)` for the new function
/// `owner`. If the target is itself bound, its receiver is kept and the
/// requested one is ignored.
pub fn bind_receiver(
    existing: Option<&ReceiverBinding>,
    owner: ObjectHandle,
    requested: JsValue,
) -> ReceiverBinding {
    match existing {
        Some(binding) if binding.permanent => {
            ReceiverBinding::permanent(owner, binding.resolved_value.clone())
        }
        _ => ReceiverBinding::permanent(owner, requested),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GLOBAL: JsValue = JsValue::Object(ObjectHandle(0));

    fn obj(n: u32) -> JsValue {
        JsValue::Object(ObjectHandle(n))
    }

    fn strict(style: &InvocationStyle, permanent: Option<&ReceiverBinding>) -> ReceiverRef {
        resolve_receiver(style, permanent, EvaluationMode::Strict, &GLOBAL)
    }

    #[test]
    fn plain_call_is_undefined_in_strict_mode() {
        let r = strict(&InvocationStyle::Plain, None);
        assert_eq!(r.value, JsValue::Undefined);
        assert_eq!(r.source, ReceiverSource::Unresolved);
        assert!(!r.is_resolved());
    }

    #[test]
    fn plain_call_falls_back_to_global_in_sloppy_mode() {
        let r = resolve_receiver(&InvocationStyle::Plain, None, EvaluationMode::Sloppy, &GLOBAL);
        assert_eq!(r.value, GLOBAL);
        assert_eq!(r.source, ReceiverSource::AmbientGlobal);
    }

    #[test]
    fn method_call_uses_owner() {
        let r = strict(&InvocationStyle::Method { owner: obj(4) }, None);
        assert_eq!(r, ReceiverRef::new(obj(4), ReceiverSource::CallSiteOwner));
    }

    #[test]
    fn call_and_apply_resolve_identically() {
        let call = strict(
            &InvocationStyle::ExplicitReceiver {
                receiver: obj(2),
                passing: ArgumentPassing::Positional,
            },
            None,
        );
        let apply = strict(
            &InvocationStyle::ExplicitReceiver {
                receiver: obj(2),
                passing: ArgumentPassing::Sequence,
            },
            None,
        );
        assert_eq!(call, apply);
        assert_eq!(call.source, ReceiverSource::ExplicitReceiver);
    }

    #[test]
    fn explicit_undefined_receiver_stays_undefined_in_strict_mode() {
        let r = strict(
            &InvocationStyle::ExplicitReceiver {
                receiver: JsValue::Undefined,
                passing: ArgumentPassing::Positional,
            },
            None,
        );
        assert_eq!(r.value, JsValue::Undefined);
    }

    #[test]
    fn permanent_binding_beats_every_call_site_style() {
        let binding = ReceiverBinding::permanent(ObjectHandle(9), obj(8));
        for style in [
            InvocationStyle::Plain,
            InvocationStyle::Method { owner: obj(5) },
            InvocationStyle::ExplicitReceiver {
                receiver: obj(6),
                passing: ArgumentPassing::Positional,
            },
        ] {
            let r = strict(&style, Some(&binding));
            assert_eq!(r.value, obj(8), "style {style}");
            assert_eq!(r.source, ReceiverSource::PermanentBinding);
        }
    }

    #[test]
    fn construction_beats_permanent_binding() {
        let binding = ReceiverBinding::permanent(ObjectHandle(9), obj(8));
        let r = strict(
            &InvocationStyle::Constructed {
                target: ObjectHandle(12),
            },
            Some(&binding),
        );
        assert_eq!(r, ReceiverRef::new(obj(12), ReceiverSource::FreshObject));
    }

    #[test]
    fn non_permanent_binding_does_not_override() {
        let binding = ReceiverBinding {
            owner_function: ObjectHandle(9),
            resolved_value: obj(8),
            permanent: false,
        };
        let r = strict(&InvocationStyle::Plain, Some(&binding));
        assert_eq!(r.value, JsValue::Undefined);
    }

    #[test]
    fn rebinding_keeps_original_receiver() {
        let first = bind_receiver(None, ObjectHandle(1), obj(8));
        let second = bind_receiver(Some(&first), ObjectHandle(2), obj(20));
        assert_eq!(second.resolved_value, obj(8));
        assert_eq!(second.owner_function, ObjectHandle(2));
        assert!(second.permanent);
    }

    #[test]
    fn record_captures_style_payload() {
        let style = InvocationStyle::ExplicitReceiver {
            receiver: obj(3),
            passing: ArgumentPassing::Sequence,
        };
        let resolved = strict(&style, None);
        let record = InvocationRecord::new(ObjectHandle(1), style, resolved);
        assert_eq!(record.explicit_receiver, Some(obj(3)));
        assert_eq!(record.constructed_target, None);
        assert_eq!(record.style.name(), "apply");
    }

    #[test]
    fn mode_parse_round_trip() {
        for mode in [EvaluationMode::Strict, EvaluationMode::Sloppy] {
            assert_eq!(EvaluationMode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(EvaluationMode::parse("loose"), None);
    }

    #[test]
    fn style_serializes_with_tag() {
        let json = serde_json::to_string(&InvocationStyle::Plain).unwrap();
        assert_eq!(json, r#"{"style":"plain"}"#);
    }
}
