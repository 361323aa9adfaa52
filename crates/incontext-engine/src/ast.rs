//! Statement and expression tree for function bodies and scripts.
//!
//! There is no parser: programs are assembled with the constructor helpers at
//! the bottom of this module. The shapes mirror the source constructs whose
//! receiver behavior matters. In particular a call's invocation style is
//! decided by the syntactic shape of its callee, exactly as in the modeled
//! language: `obj.m()` is a method call, `m()` is a plain call.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::object_model::JsValue;

/// A function definition: what a function literal or declaration evaluates
/// to before it is closed over an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionTemplate {
    /// Empty for anonymous function expressions.
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Statement>,
    /// Whether `new` may be applied to the resulting function.
    pub constructable: bool,
}

impl FunctionTemplate {
    pub fn new(name: &str, params: &[&str], body: Vec<Statement>) -> Self {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body,
            constructable: true,
        }
    }

    pub fn anonymous(params: &[&str], body: Vec<Statement>) -> Self {
        Self::new("", params, body)
    }

    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expression {
    Literal(JsValue),
    /// The implicit receiver.
    This,
    Identifier(String),
    Member {
        object: Box<Expression>,
        key: String,
    },
    /// `{ k: v, ... }`
    ObjectLiteral(Vec<(String, Expression)>),
    /// `[a, b, ...]`, materialized as an array-like object.
    ArrayLiteral(Vec<Expression>),
    /// Function expression, closed over the current environment.
    Function(Rc<FunctionTemplate>),
    /// String concatenation of every operand's display form.
    Concat(Vec<Expression>),
    /// `callee(args)`: a method call when `callee` is a member expression,
    /// a plain call otherwise.
    Call {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
    /// `function.call(receiver, ...args)`
    CallWith {
        function: Box<Expression>,
        receiver: Box<Expression>,
        args: Vec<Expression>,
    },
    /// `function.apply(receiver, argList)`
    ApplyWith {
        function: Box<Expression>,
        receiver: Box<Expression>,
        arg_list: Box<Expression>,
    },
    /// `function.bind(receiver, ...args)`
    Bind {
        function: Box<Expression>,
        receiver: Box<Expression>,
        args: Vec<Expression>,
    },
    /// `new callee(args)`
    New {
        callee: Box<Expression>,
        args: Vec<Expression>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statement {
    /// `var name = init`
    Var { name: String, init: Expression },
    /// `name = value`
    Assign { name: String, value: Expression },
    /// `object.key = value`
    SetMember {
        object: Expression,
        key: String,
        value: Expression,
    },
    Expression(Expression),
    /// `console.log(value)`
    Log(Expression),
    /// `console.dir(value)`
    Dir(Expression),
    Return(Expression),
}

/// A script: hoisted function declarations followed by top-level
/// statements, evaluated with the global object as receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Script {
    pub functions: Vec<Rc<FunctionTemplate>>,
    pub body: Vec<Statement>,
}

// ---------------------------------------------------------------------------
// Constructor helpers
// ---------------------------------------------------------------------------

pub fn this() -> Expression {
    Expression::This
}

pub fn ident(name: &str) -> Expression {
    Expression::Identifier(name.to_string())
}

pub fn int(n: i64) -> Expression {
    Expression::Literal(JsValue::Int(n))
}

pub fn string(s: &str) -> Expression {
    Expression::Literal(JsValue::str(s))
}

pub fn undefined() -> Expression {
    Expression::Literal(JsValue::Undefined)
}

pub fn member(object: Expression, key: &str) -> Expression {
    Expression::Member {
        object: Box::new(object),
        key: key.to_string(),
    }
}

pub fn object(entries: Vec<(&str, Expression)>) -> Expression {
    Expression::ObjectLiteral(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

pub fn array(items: Vec<Expression>) -> Expression {
    Expression::ArrayLiteral(items)
}

pub fn function(template: FunctionTemplate) -> Expression {
    Expression::Function(Rc::new(template))
}

pub fn concat(parts: Vec<Expression>) -> Expression {
    Expression::Concat(parts)
}

pub fn call(callee: Expression, args: Vec<Expression>) -> Expression {
    Expression::Call {
        callee: Box::new(callee),
        args,
    }
}

pub fn call_with(function: Expression, receiver: Expression, args: Vec<Expression>) -> Expression {
    Expression::CallWith {
        function: Box::new(function),
        receiver: Box::new(receiver),
        args,
    }
}

pub fn apply_with(function: Expression, receiver: Expression, arg_list: Expression) -> Expression {
    Expression::ApplyWith {
        function: Box::new(function),
        receiver: Box::new(receiver),
        arg_list: Box::new(arg_list),
    }
}

pub fn bind(function: Expression, receiver: Expression, args: Vec<Expression>) -> Expression {
    Expression::Bind {
        function: Box::new(function),
        receiver: Box::new(receiver),
        args,
    }
}

pub fn new(callee: Expression, args: Vec<Expression>) -> Expression {
    Expression::New {
        callee: Box::new(callee),
        args,
    }
}

pub fn var(name: &str, init: Expression) -> Statement {
    Statement::Var {
        name: name.to_string(),
        init,
    }
}

pub fn assign(name: &str, value: Expression) -> Statement {
    Statement::Assign {
        name: name.to_string(),
        value,
    }
}

pub fn set_member(object: Expression, key: &str, value: Expression) -> Statement {
    Statement::SetMember {
        object,
        key: key.to_string(),
        value,
    }
}

pub fn expr(expression: Expression) -> Statement {
    Statement::Expression(expression)
}

pub fn log(expression: Expression) -> Statement {
    Statement::Log(expression)
}

pub fn dir(expression: Expression) -> Statement {
    Statement::Dir(expression)
}

pub fn ret(expression: Expression) -> Statement {
    Statement::Return(expression)
}
