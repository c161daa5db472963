//! Declarative scripted bodies
//!
//! A script is a list of [`Step`]s. It is enough to express every control
//! flow the weaver cares about (returns, faults, explicit join points,
//! nested calls, code security blocks, cancellation points) so a complete
//! program model can live in a TOML or JSON file.
//!
//! ```toml
//! [bodies]
//! transfer = [
//!     { op = "emit", text = "transfer {0} as {relation}" },
//!     { op = "join", name = "Audit", args = [{ arg = 0 }] },
//!     { op = "guard", relations = ["External"], then = [{ op = "fault", message = "denied" }] },
//!     { op = "call", member = "Bank.Account.Debit", args = [{ arg = 0 }], into = "ok" },
//!     { op = "return", value = { var = "ok" } },
//! ]
//! ```

use crate::body::{Body, BodyResult, Flow};
use crate::error::Fault;
use crate::relation::RelationSet;
use crate::value::{ObjectRef, Value};
use crate::weave::BodyContext;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shared sink for `emit` steps
///
/// Cloning shares the buffer; scripts running on different chains (and
/// threads) append to the same one.
#[derive(Debug, Clone, Default)]
pub struct Output {
    lines: Arc<Mutex<Vec<String>>>,
}

impl Output {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a line
    pub fn push(&self, line: impl Into<String>) {
        self.lines.lock().push(line.into());
    }

    /// Snapshot of every line so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// Take every line, leaving the buffer empty
    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.lines.lock())
    }
}

/// Value source for step arguments
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Operand {
    /// Bound argument by position
    Arg {
        /// Argument index
        arg: usize,
    },
    /// Script variable set by `into`
    Var {
        /// Variable name
        var: String,
    },
    /// Literal value
    Literal(Value),
}

impl Default for Operand {
    fn default() -> Self {
        Operand::Literal(Value::Null)
    }
}

/// Receiver of a `call` step
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// The current receiver
    #[default]
    This,
    /// No receiver
    Static,
    /// Object held in an argument
    Arg(usize),
    /// Object held in a script variable
    Var(String),
}

/// One script instruction
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Write a line; `{0}`, `{relation}`, `{this}`, `{result}` and `{var}` expand
    Emit {
        /// Template text
        text: String,
    },
    /// Return a value (`null` when omitted)
    Return {
        /// Returned value
        #[serde(default)]
        value: Operand,
    },
    /// Raise a fault
    Fault {
        /// Message template
        message: String,
    },
    /// Reach an explicit join point
    Join {
        /// Join point name
        name: String,
        /// Arguments seen by its advice
        #[serde(default)]
        args: Vec<Operand>,
    },
    /// Invoke a member
    Call {
        /// `Type.Member` path, or a bare member name of the current type
        member: String,
        /// Receiver
        #[serde(default)]
        on: Target,
        /// Dispatch by name on the receiver's runtime type
        #[serde(default, rename = "virtual")]
        is_virtual: bool,
        /// Arguments
        #[serde(default)]
        args: Vec<Operand>,
        /// Variable receiving the result
        #[serde(default, skip_serializing_if = "Option::is_none")]
        into: Option<String>,
    },
    /// Allocate an object
    New {
        /// Type name
        #[serde(rename = "type")]
        ty: String,
        /// Variable receiving the object
        into: String,
    },
    /// Code security block
    Guard {
        /// Relations allowed into `then`
        relations: RelationSet,
        /// Steps when permitted
        #[serde(default)]
        then: Vec<Step>,
        /// Steps otherwise
        #[serde(default, rename = "else")]
        otherwise: Vec<Step>,
    },
    /// Cancellation point
    Checkpoint,
}

/// A named script bound as a body
#[derive(Debug, Clone)]
pub struct Script {
    name: String,
    steps: Vec<Step>,
    output: Output,
}

type Vars = BTreeMap<String, Value>;

impl Script {
    /// Create a script writing to `output`
    pub fn new(name: impl Into<String>, steps: Vec<Step>, output: Output) -> Self {
        Self {
            name: name.into(),
            steps,
            output,
        }
    }

    fn exec(&self, steps: &[Step], cx: &mut BodyContext<'_>, vars: &mut Vars) -> BodyResult {
        for step in steps {
            match step {
                Step::Emit { text } => self.output.push(render(text, cx, vars)),
                Step::Return { value } => return Ok(Flow::Return(operand(value, cx, vars))),
                Step::Fault { message } => return Err(Fault::raised(render(message, cx, vars)).into()),
                Step::Join { name, args } => {
                    let args = operands(args, cx, vars);
                    cx.join_point(name, args)?;
                }
                Step::Call {
                    member,
                    on,
                    is_virtual,
                    args,
                    into,
                } => {
                    let receiver = receiver(on, cx, vars);
                    let args = operands(args, cx, vars);
                    let value = if *is_virtual {
                        let receiver = receiver.ok_or_else(|| Fault::NotAnInstance {
                            member: member.clone(),
                        })?;
                        cx.call_virtual(receiver, member, args)?
                    } else if member.contains('.') {
                        cx.call_path(member, receiver, args)?
                    } else {
                        let registry = cx.registry();
                        let owner = registry.member(cx.member()).map(|m| m.owner);
                        let target = owner
                            .and_then(|ty| registry.find_member_in(ty, member))
                            .ok_or_else(|| Fault::NoSuchMember {
                                member: member.clone(),
                            })?;
                        cx.call(target, receiver, args)?
                    };
                    if let Some(into) = into {
                        vars.insert(into.clone(), value);
                    }
                }
                Step::New { ty, into } => {
                    let id = cx
                        .registry()
                        .find_type(ty)
                        .ok_or_else(|| Fault::raised(format!("unknown type `{}`", ty)))?;
                    vars.insert(into.clone(), Value::Object(cx.new_instance(id)));
                }
                Step::Guard {
                    relations,
                    then,
                    otherwise,
                } => {
                    let branch = if cx.permits(*relations) { then } else { otherwise };
                    if let Flow::Return(value) = self.exec(branch, cx, vars)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Step::Checkpoint => cx.checkpoint()?,
            }
        }
        Ok(Flow::Next)
    }
}

impl Body for Script {
    fn run(&self, cx: &mut BodyContext<'_>) -> BodyResult {
        let mut vars = Vars::new();
        self.exec(&self.steps, cx, &mut vars)
    }

    fn describe(&self) -> &str {
        &self.name
    }
}

fn operand(op: &Operand, cx: &BodyContext<'_>, vars: &Vars) -> Value {
    match op {
        Operand::Arg { arg } => cx.arg(*arg),
        Operand::Var { var } => vars.get(var).cloned().unwrap_or_default(),
        Operand::Literal(value) => value.clone(),
    }
}

fn operands(ops: &[Operand], cx: &BodyContext<'_>, vars: &Vars) -> Vec<Value> {
    ops.iter().map(|op| operand(op, cx, vars)).collect()
}

fn receiver(target: &Target, cx: &BodyContext<'_>, vars: &Vars) -> Option<ObjectRef> {
    match target {
        Target::This => cx.this(),
        Target::Static => None,
        Target::Arg(index) => cx.arg(*index).as_object(),
        Target::Var(name) => vars.get(name).and_then(Value::as_object),
    }
}

/// Expand `{...}` placeholders; unknown ones are left as written
fn render(template: &str, cx: &BodyContext<'_>, vars: &Vars) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find('}') else {
            rest = &rest[start..];
            break;
        };
        let key = &rest[start + 1..start + len];
        match key {
            "relation" => out.push_str(cx.relation().name()),
            "this" => match cx.this() {
                Some(this) => out.push_str(&Value::Object(this).to_string()),
                None => out.push_str("null"),
            },
            "result" => out.push_str(&cx.result().cloned().unwrap_or_default().to_string()),
            _ => match key.parse::<usize>() {
                Ok(index) => out.push_str(&cx.arg(index).to_string()),
                Err(_) => match vars.get(key) {
                    Some(value) => out.push_str(&value.to_string()),
                    None => out.push_str(&rest[start..=start + len]),
                },
            },
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}
