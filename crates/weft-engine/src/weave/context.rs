//! Execution context handed to bodies

use super::Weaver;
use crate::body::Interrupt;
use crate::chain::CallChain;
use crate::error::Fault;
use crate::pointcut::JoinPointSite;
use crate::registry::{MemberId, PointcutId, Registry, TypeId};
use crate::relation::{Caller, RelationClass, RelationSet};
use crate::value::{ObjectRef, Value};

/// What kind of code a context runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Frame {
    /// Member body variant
    Member,
    /// Advice body at a join point
    Advice(PointcutId, JoinPointSite),
    /// Computed parameter default
    Default,
}

/// Everything a body can see and do
///
/// Nested calls made through the context are classified against the
/// identity of the running code: the member for member bodies and
/// defaults, the owning aspect or type for advice.
pub struct BodyContext<'a> {
    pub(crate) weaver: &'a Weaver,
    pub(crate) chain: &'a mut CallChain,
    pub(crate) frame: Frame,
    pub(crate) caller: Caller,
    pub(crate) member: MemberId,
    pub(crate) this: Option<ObjectRef>,
    pub(crate) args: Vec<Value>,
    pub(crate) result: Option<Value>,
    /// Explicit join points reached, with the arguments their after advice sees
    pub(crate) pending: Vec<(usize, Vec<Value>)>,
    /// Value returned on the member's behalf by explicit join point advice
    pub(crate) short_circuit: Option<Value>,
    /// Fault raised by explicit join point advice rather than by the body
    pub(crate) advice_fault: Option<Fault>,
}

impl<'a> BodyContext<'a> {
    pub(crate) fn new(
        weaver: &'a Weaver,
        chain: &'a mut CallChain,
        frame: Frame,
        caller: Caller,
        member: MemberId,
        this: Option<ObjectRef>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            weaver,
            chain,
            frame,
            caller,
            member,
            this,
            args,
            result: None,
            pending: Vec::new(),
            short_circuit: None,
            advice_fault: None,
        }
    }

    /// Arguments as bound for this code
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Argument `index`, `null` when absent
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Receiver of the join point, `None` for static members
    pub fn this(&self) -> Option<ObjectRef> {
        self.this
    }

    /// Member whose join point is running
    pub fn member(&self) -> MemberId {
        self.member
    }

    /// Result of the join point, visible to after advice
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Pointcut whose advice is running, if this is advice
    pub fn pointcut(&self) -> Option<PointcutId> {
        match self.frame {
            Frame::Advice(pointcut, _) => Some(pointcut),
            _ => None,
        }
    }

    /// Join point being advised, if this is advice
    pub fn site(&self) -> Option<JoinPointSite> {
        match self.frame {
            Frame::Advice(_, site) => Some(site),
            _ => None,
        }
    }

    /// Effective relation on the top security frame
    pub fn relation(&self) -> RelationClass {
        self.chain.current()
    }

    /// Code security block test: does the effective relation belong to `set`
    pub fn permits(&self, set: RelationSet) -> bool {
        set.contains(self.relation())
    }

    /// Registry being executed
    pub fn registry(&self) -> &'a Registry {
        self.weaver.registry()
    }

    /// Cancellation point
    pub fn checkpoint(&self) -> Result<(), Fault> {
        if self.chain.is_cancelled() {
            Err(Fault::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Invoke `target` from this code
    pub fn call(&mut self, target: MemberId, receiver: Option<ObjectRef>, args: Vec<Value>) -> Result<Value, Fault> {
        let caller = self.caller;
        self.weaver.invoke(self.chain, &caller, target, receiver, args)
    }

    /// Invoke a member by `Type.Member` path
    pub fn call_path(&mut self, path: &str, receiver: Option<ObjectRef>, args: Vec<Value>) -> Result<Value, Fault> {
        let target = self
            .registry()
            .find_member(path)
            .ok_or_else(|| Fault::NoSuchMember {
                member: path.to_string(),
            })?;
        self.call(target, receiver, args)
    }

    /// Invoke the most derived member named `name` on `receiver`
    pub fn call_virtual(&mut self, receiver: ObjectRef, name: &str, args: Vec<Value>) -> Result<Value, Fault> {
        let registry = self.registry();
        let target = registry
            .dispatch(receiver.ty, name)
            .ok_or_else(|| Fault::NoSuchMember {
                member: format!(
                    "{}.{}",
                    registry.ty(receiver.ty).map(|t| t.qualified_name()).unwrap_or_default(),
                    name
                ),
            })?;
        self.call(target, Some(receiver), args)
    }

    /// Allocate a fresh object of type `ty`
    pub fn new_instance(&self, ty: TypeId) -> ObjectRef {
        self.weaver.instantiate(ty)
    }

    /// Reach the explicit join point `name` of the running member
    ///
    /// Runs its before advice here. When advice returns a value on the
    /// member's behalf this yields `Interrupt::Return`; bodies propagate it
    /// with `?` so nothing after the join point runs. After advice is
    /// deferred until the member body completes normally.
    pub fn join_point(&mut self, name: &str, args: Vec<Value>) -> Result<(), Interrupt> {
        let registry = self.registry();
        let undeclared = |owner: String| Fault::UndeclaredJoinPoint {
            member: owner,
            name: name.to_string(),
        };
        match self.frame {
            Frame::Member => {}
            Frame::Advice(pointcut, _) => {
                let owner = registry
                    .pointcut(pointcut)
                    .map(|p| format!("advice `{}`", p.source))
                    .unwrap_or_default();
                return Err(undeclared(owner).into());
            }
            Frame::Default => {
                return Err(undeclared(format!("default of {}", registry.member_path(self.member))).into());
            }
        }

        let index = registry
            .member(self.member)
            .and_then(|m| m.join_point_index(name))
            .ok_or_else(|| undeclared(registry.member_path(self.member)))?;

        let site = JoinPointSite::Explicit {
            member: self.member,
            index,
        };
        match self.weaver.run_before(self.chain, site, self.this, &args) {
            Ok(None) => {}
            Ok(Some(value)) => {
                self.short_circuit = Some(value.clone());
                return Err(Interrupt::Return(value));
            }
            Err(fault) => {
                self.advice_fault = Some(fault.clone());
                return Err(fault.into());
            }
        }
        if !registry.plan(site).after.is_empty() {
            self.pending.push((index, args));
        }
        Ok(())
    }
}
