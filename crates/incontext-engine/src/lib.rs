#![forbid(unsafe_code)]

//! Receiver (`this`) resolution for a prototype-based object model.
//!
//! [`receiver::resolve_receiver`] decides what the implicit receiver is for
//! each invocation style. [`interpreter::Realm`] makes that observable by
//! running small function bodies over an object heap, and
//! [`demonstration`] exercises every rule end to end.

pub mod ast;
pub mod closure_model;
pub mod console;
pub mod demonstration;
pub mod error;
pub mod interpreter;
pub mod object_model;
pub mod receiver;

pub use demonstration::{DemonstrationReport, run_demonstration};
pub use error::RealmError;
pub use interpreter::{Realm, RealmConfig};
pub use object_model::JsValue;
pub use receiver::{EvaluationMode, InvocationStyle, ReceiverRef, ReceiverSource, resolve_receiver};
