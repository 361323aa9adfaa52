//! Realm-level errors and their stable codes.

use thiserror::Error;

use crate::closure_model::ScopeError;
use crate::object_model::ObjectError;

pub const ERROR_STRICT_ASSIGNMENT: &str = "IC_STRICT_ASSIGNMENT";
pub const ERROR_READ_ONLY_ASSIGNMENT: &str = "IC_READ_ONLY_ASSIGNMENT";
pub const ERROR_PROPERTY_OF_NON_OBJECT: &str = "IC_PROPERTY_OF_NON_OBJECT";
pub const ERROR_NOT_CALLABLE: &str = "IC_NOT_CALLABLE";
pub const ERROR_NOT_CONSTRUCTOR: &str = "IC_NOT_CONSTRUCTOR";
pub const ERROR_NOT_ARRAY_LIKE: &str = "IC_NOT_ARRAY_LIKE";
pub const ERROR_ARRAY_LIKE_TOO_LONG: &str = "IC_ARRAY_LIKE_TOO_LONG";
pub const ERROR_UNDECLARED_IDENTIFIER: &str = "IC_UNDECLARED_IDENTIFIER";
pub const ERROR_CALL_DEPTH_EXCEEDED: &str = "IC_CALL_DEPTH_EXCEEDED";
pub const ERROR_OBJECT_MODEL: &str = "IC_OBJECT_MODEL";
pub const ERROR_SCOPE: &str = "IC_SCOPE";

/// Language-level error class, as a script would observe it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    TypeError,
    ReferenceError,
    RangeError,
    InternalError,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TypeError => "TypeError",
            Self::ReferenceError => "ReferenceError",
            Self::RangeError => "RangeError",
            Self::InternalError => "InternalError",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RealmError {
    /// Property write through an unresolved receiver under strict evaluation.
    #[error("TypeError: cannot set property '{key}' of {receiver}")]
    StrictAssignmentViolation { key: String, receiver: String },
    #[error("TypeError: cannot assign to read only property '{key}' of {target}")]
    ReadOnlyAssignment { key: String, target: String },
    #[error("TypeError: cannot read properties of {base} (reading '{key}')")]
    PropertyOfNonObject { key: String, base: String },
    #[error("TypeError: {description} is not a function")]
    NotCallable { description: String },
    #[error("TypeError: {description} is not a constructor")]
    NotConstructor { description: String },
    #[error("TypeError: argument list for {description} is not an object")]
    NotArrayLike { description: String },
    #[error("RangeError: array-like length {length} for {description} exceeds max {max}")]
    ArrayLikeTooLong {
        description: String,
        length: usize,
        max: usize,
    },
    #[error("ReferenceError: {name} is not defined")]
    UndeclaredIdentifier { name: String },
    #[error("RangeError: maximum call depth {max} exceeded at depth {depth}")]
    CallDepthExceeded { depth: usize, max: usize },
    #[error("{0}")]
    Object(#[from] ObjectError),
    #[error("{0}")]
    Scope(#[from] ScopeError),
}

impl RealmError {
    pub fn stable_code(&self) -> &'static str {
        match self {
            Self::StrictAssignmentViolation { .. } => ERROR_STRICT_ASSIGNMENT,
            Self::ReadOnlyAssignment { .. } => ERROR_READ_ONLY_ASSIGNMENT,
            Self::PropertyOfNonObject { .. } => ERROR_PROPERTY_OF_NON_OBJECT,
            Self::NotCallable { .. } => ERROR_NOT_CALLABLE,
            Self::NotConstructor { .. } => ERROR_NOT_CONSTRUCTOR,
            Self::NotArrayLike { .. } => ERROR_NOT_ARRAY_LIKE,
            Self::ArrayLikeTooLong { .. } => ERROR_ARRAY_LIKE_TOO_LONG,
            Self::UndeclaredIdentifier { .. } => ERROR_UNDECLARED_IDENTIFIER,
            Self::CallDepthExceeded { .. } => ERROR_CALL_DEPTH_EXCEEDED,
            Self::Object(_) => ERROR_OBJECT_MODEL,
            Self::Scope(_) => ERROR_SCOPE,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::StrictAssignmentViolation { .. }
            | Self::ReadOnlyAssignment { .. }
            | Self::PropertyOfNonObject { .. }
            | Self::NotCallable { .. }
            | Self::NotConstructor { .. }
            | Self::NotArrayLike { .. } => ErrorClass::TypeError,
            Self::UndeclaredIdentifier { .. } => ErrorClass::ReferenceError,
            Self::CallDepthExceeded { .. } | Self::ArrayLikeTooLong { .. } => {
                ErrorClass::RangeError
            }
            Self::Object(ObjectError::ObjectNotFound(_)) | Self::Scope(_) => {
                ErrorClass::InternalError
            }
            Self::Object(_) => ErrorClass::TypeError,
        }
    }
}
