//! The end-to-end receiver demonstration.
//!
//! One script, run step by step in a single [`Realm`]: scope isolation,
//! plain calls, method calls through the global object, constructors,
//! a factory "constructor", `call`/`apply`, and `bind`. The call sites that
//! cannot work under strict evaluation are kept as [`RejectedCallSite`]s and
//! run separately so their failures are asserted rather than commented out.

use std::rc::Rc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ast::*;
use crate::console::TraceEvent;
use crate::error::{ERROR_PROPERTY_OF_NON_OBJECT, ERROR_STRICT_ASSIGNMENT};
use crate::interpreter::{Realm, RealmConfig};
use crate::object_model::JsValue;
use crate::receiver::EvaluationMode;

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemonstrationStep {
    pub label: &'static str,
    pub body: Vec<Statement>,
}

/// A call site that must fail under strict evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedCallSite {
    pub label: &'static str,
    pub expression: Expression,
    /// Stable code expected in strict mode.
    pub expected_code: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Demonstration {
    pub functions: Vec<Rc<FunctionTemplate>>,
    pub steps: Vec<DemonstrationStep>,
    pub rejected: Vec<RejectedCallSite>,
}

impl Demonstration {
    /// The whole program as a single script.
    pub fn script(&self) -> Script {
        Script {
            functions: self.functions.clone(),
            body: self
                .steps
                .iter()
                .flat_map(|step| step.body.iter().cloned())
                .collect(),
        }
    }
}

fn declared(template: FunctionTemplate) -> Rc<FunctionTemplate> {
    Rc::new(template)
}

fn returns_this(name: &str, before: Vec<Statement>) -> Rc<FunctionTemplate> {
    let mut body = before;
    body.push(ret(this()));
    declared(FunctionTemplate::new(name, &[], body))
}

fn local_a(name: &str, value: i64) -> Rc<FunctionTemplate> {
    declared(FunctionTemplate::new(
        name,
        &[],
        vec![var("a", int(value)), ret(ident("a"))],
    ))
}

fn log_b() -> Statement {
    log(concat(vec![string("b : "), ident("b")]))
}

fn f4_of(argument: Expression) -> Expression {
    call(ident("f4"), vec![argument])
}

fn call0(name: &str) -> Expression {
    call(ident(name), vec![])
}

/// `Car(make, model, horn)`: assigns everything through the receiver and
/// logs it before and after.
fn car_constructor() -> Rc<FunctionTemplate> {
    let honk = FunctionTemplate::anonymous(&[], vec![log(member(this(), "horn"))]);
    declared(FunctionTemplate::new(
        "Car",
        &["make", "model", "horn"],
        vec![
            log(this()),
            set_member(this(), "make", ident("make")),
            set_member(this(), "model", ident("model")),
            set_member(this(), "horn", ident("horn")),
            set_member(this(), "honk", function(honk)),
            log(this()),
        ],
    ))
}

/// `Dog`: a factory that ignores its receiver and returns a literal.
fn dog_factory() -> Expression {
    let bark = FunctionTemplate::anonymous(
        &[],
        vec![log(concat(vec![string("My name is "), ident("name")]))],
    );
    function(FunctionTemplate::anonymous(
        &[],
        vec![ret(object(vec![
            ("breed", string("")),
            ("name", string("")),
            ("bark", function(bark)),
        ]))],
    ))
}

pub fn demonstration() -> Demonstration {
    let functions = vec![
        local_a("f1", 1),
        local_a("f2", 2),
        local_a("f3", 3),
        declared(FunctionTemplate::new(
            "f4",
            &["ctx"],
            vec![ret(member(ident("ctx"), "a"))],
        )),
        returns_this("f5", vec![assign("a", int(5)), dir(this())]),
        // `{a: 6}` in statement position is a labelled expression.
        returns_this("f6", vec![expr(int(6))]),
        returns_this("f7", vec![var("x", object(vec![("a", int(7))]))]),
        returns_this("f8", vec![]),
        returns_this("f9", vec![set_member(this(), "a", int(9)), dir(this())]),
        declared(FunctionTemplate::new(
            "f10",
            &[],
            vec![var("obj", object(vec![("a", int(10))])), ret(ident("obj"))],
        )),
        car_constructor(),
    ];

    let steps = vec![
        DemonstrationStep {
            label: "basic context",
            body: vec![
                log(string("Basic Context")),
                var("a", int(0)),
                log(concat(vec![string("global : "), ident("a")])),
                log(concat(vec![string("f1 : "), call0("f1")])),
                log(concat(vec![string("f2 : "), call0("f2")])),
                log(concat(vec![string("f3 : "), call0("f3")])),
            ],
        },
        DemonstrationStep {
            label: "receiver as argument",
            body: vec![
                log(string("Experimenting with the key word 'this'")),
                var("b", f4_of(this())),
                log_b(),
                assign("b", f4_of(call0("f10"))),
                log_b(),
            ],
        },
        DemonstrationStep {
            label: "method calls through the global object",
            body: vec![
                assign("b", f4_of(call0("f10"))),
                log_b(),
                assign(
                    "b",
                    call(
                        member(ident("window"), "f4"),
                        vec![call(member(ident("window"), "f10"), vec![])],
                    ),
                ),
                log_b(),
                assign(
                    "b",
                    call(
                        member(this(), "f4"),
                        vec![call(member(this(), "f10"), vec![])],
                    ),
                ),
                log_b(),
            ],
        },
        DemonstrationStep {
            label: "constructor",
            body: vec![
                var(
                    "car1",
                    new(
                        ident("Car"),
                        vec![string("Ford"), string("Bronco"), string("honk honk")],
                    ),
                ),
                expr(call(member(ident("car1"), "honk"), vec![])),
                var(
                    "car2",
                    new(
                        ident("Car"),
                        vec![string("Volkswagen"), string("Beetle"), string("beep beep")],
                    ),
                ),
                expr(call(member(ident("car2"), "honk"), vec![])),
            ],
        },
        DemonstrationStep {
            label: "factory constructor",
            body: vec![
                var("Dog", dog_factory()),
                var("tex", new(ident("Dog"), vec![])),
                set_member(ident("tex"), "breed", string("Mastif")),
                set_member(ident("tex"), "name", string("tex")),
                dir(ident("tex")),
                expr(call(member(ident("tex"), "bark"), vec![])),
            ],
        },
        DemonstrationStep {
            label: "call and apply",
            body: vec![
                log(string("Using call and apply")),
                assign("a", int(8)),
                assign("b", f4_of(call_with(ident("f8"), this(), vec![]))),
                log_b(),
                set_member(ident("tex"), "a", int(20)),
                assign("b", f4_of(call_with(ident("f8"), ident("tex"), vec![]))),
                log_b(),
            ],
        },
        DemonstrationStep {
            label: "bind",
            body: vec![
                log(string("using bind")),
                var(
                    "bindexample",
                    bind(ident("f8"), object(vec![("a", int(8))]), vec![]),
                ),
                assign("b", f4_of(call0("bindexample"))),
                log_b(),
                set_member(ident("tex"), "texbind", ident("bindexample")),
                assign(
                    "b",
                    f4_of(call(member(ident("tex"), "texbind"), vec![])),
                ),
                log_b(),
                set_member(
                    ident("tex"),
                    "honk",
                    bind(member(ident("car1"), "honk"), ident("car1"), vec![]),
                ),
                expr(call(member(ident("tex"), "honk"), vec![])),
                dir(ident("tex")),
                var(
                    "honk",
                    bind(member(ident("car1"), "honk"), ident("car1"), vec![]),
                ),
                expr(call0("honk")),
                set_member(ident("honk"), "horn", string("awooga awoooooooga")),
                expr(call0("honk")),
            ],
        },
    ];

    let rejected = vec![
        RejectedCallSite {
            label: "f4(f5())",
            expression: f4_of(call0("f5")),
            expected_code: ERROR_PROPERTY_OF_NON_OBJECT,
        },
        RejectedCallSite {
            label: "f4(f6())",
            expression: f4_of(call0("f6")),
            expected_code: ERROR_PROPERTY_OF_NON_OBJECT,
        },
        RejectedCallSite {
            label: "f4(f7())",
            expression: f4_of(call0("f7")),
            expected_code: ERROR_PROPERTY_OF_NON_OBJECT,
        },
        RejectedCallSite {
            label: "f4(f8())",
            expression: f4_of(call0("f8")),
            expected_code: ERROR_PROPERTY_OF_NON_OBJECT,
        },
        RejectedCallSite {
            label: "f4(f9())",
            expression: f4_of(call0("f9")),
            expected_code: ERROR_STRICT_ASSIGNMENT,
        },
    ];

    Demonstration {
        functions,
        steps,
        rejected,
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// What happened at one rejected call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionOutcome {
    pub call_site: String,
    /// `None` when the call site completed (possible in sloppy mode).
    pub error_code: Option<String>,
    /// Error message, or the inspected result when it completed.
    pub detail: String,
    pub expected_code: String,
}

impl RejectionOutcome {
    pub fn rejected_as_expected(&self) -> bool {
        self.error_code.as_deref() == Some(self.expected_code.as_str())
    }

    pub fn trace_line(&self) -> String {
        match &self.error_code {
            Some(code) => format!("{} -> {} [{code}]", self.call_site, self.detail),
            None => format!("{} -> {}", self.call_site, self.detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemonstrationReport {
    pub mode: EvaluationMode,
    /// Console lines of the main script.
    pub lines: Vec<String>,
    /// Console lines printed by rejected call sites before they failed.
    pub rejected_lines: Vec<String>,
    pub rejections: Vec<RejectionOutcome>,
    pub events: Vec<TraceEvent>,
    /// SHA-256 over the transcript (see [`DemonstrationReport::transcript`]).
    pub transcript_sha256: String,
}

impl DemonstrationReport {
    /// Main trace, then one line per rejected call site.
    pub fn transcript(&self) -> String {
        transcript(&self.lines, &self.rejected_lines, &self.rejections)
    }
}

fn transcript(lines: &[String], rejected_lines: &[String], rejections: &[RejectionOutcome]) -> String {
    let mut out = String::new();
    for line in lines.iter().chain(rejected_lines) {
        out.push_str(line);
        out.push('\n');
    }
    for rejection in rejections {
        out.push_str(&rejection.trace_line());
        out.push('\n');
    }
    out
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Seed the browser-like globals the script relies on (`window.name`).
pub fn prepare_realm(config: RealmConfig) -> anyhow::Result<Realm> {
    let mut realm = Realm::new(config);
    realm
        .declare_global("name", JsValue::str(""))
        .context("declaring window.name")?;
    Ok(realm)
}

/// Run every step, then (optionally) every rejected call site.
pub fn run_demonstration(
    config: RealmConfig,
    include_rejected: bool,
) -> anyhow::Result<DemonstrationReport> {
    let demo = demonstration();
    let mode = config.mode;
    let mut realm = prepare_realm(config)?;
    realm
        .hoist(&demo.script())
        .context("hoisting declarations")?;

    for step in &demo.steps {
        for statement in &step.body {
            realm
                .execute(statement)
                .with_context(|| format!("demonstration step '{}'", step.label))?;
        }
    }
    let (console, mut events) = realm.take_output();
    let lines = console.into_lines();

    let mut rejections = Vec::new();
    if include_rejected {
        for site in &demo.rejected {
            let (error_code, detail) = match realm.evaluate(&site.expression) {
                Ok(value) => (
                    None,
                    realm
                        .inspect(&value)
                        .with_context(|| format!("inspecting result of {}", site.label))?,
                ),
                Err(err) => (Some(err.stable_code().to_string()), err.to_string()),
            };
            rejections.push(RejectionOutcome {
                call_site: site.label.to_string(),
                error_code,
                detail,
                expected_code: site.expected_code.to_string(),
            });
        }
    }
    let (rejected_console, rejected_events) = realm.take_output();
    let rejected_lines = rejected_console.into_lines();
    events.extend(rejected_events);

    let transcript_sha256 =
        sha256_hex(transcript(&lines, &rejected_lines, &rejections).as_bytes());
    Ok(DemonstrationReport {
        mode,
        lines,
        rejected_lines,
        rejections,
        events,
        transcript_sha256,
    })
}
