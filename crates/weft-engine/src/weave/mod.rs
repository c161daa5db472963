//! Weaving executor
//!
//! Every invocation goes through the same steps: classify the call site,
//! push a security frame, resolve the variant and mask arguments, then run
//! the before-chain, the body and the after-chain as an explicit state
//! machine. Advice control flow never unwinds through native frames: bodies
//! hand back [`Flow`] or [`Interrupt`] values and the machine decides what
//! runs next.

mod context;
mod trace;

pub use context::BodyContext;
pub use trace::TraceEvent;

use crate::body::{BodyResult, Flow, Interrupt};
use crate::chain::CallChain;
use crate::config::WeaveConfig;
use crate::error::Fault;
use crate::pointcut::JoinPointSite;
use crate::registry::{
    AdviceOwner, DefaultValue, MemberId, MemberInfo, PointcutId, Registry, TypeId, Variant,
};
use crate::relation::{classify, CallSite, Caller, RelationClass};
use crate::value::{ObjectRef, Value};
use crate::variant::{resolve, Binding};
use context::Frame;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Outcome of one host-level invocation
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Returned value or propagated fault
    pub result: Result<Value, Fault>,
    /// Events recorded on the chain
    pub trace: Vec<TraceEvent>,
}

impl Invocation {
    /// Pointcuts whose advice ran, in execution order
    pub fn advice_sequence(&self) -> Vec<PointcutId> {
        self.trace
            .iter()
            .filter_map(|event| match event {
                TraceEvent::Advice { pointcut, .. } => Some(*pointcut),
                _ => None,
            })
            .collect()
    }
}

/// How a chain of advice ended
enum ChainOutcome {
    /// Every advice continued
    Completed(Value),
    /// Some advice returned a value
    Returned(Value),
}

#[derive(Debug)]
enum WeaveState {
    Entry,
    RunBeforeChain,
    RunBody,
    RunAfterChain(Value),
    ShortCircuit(Value),
    Fault { fault: Fault, from_body: bool },
    Exit(Value),
}

/// Executes invocations against a frozen registry
///
/// A weaver is shared freely between threads; all mutable execution state
/// lives in the [`CallChain`] each invocation runs on.
#[derive(Debug)]
pub struct Weaver {
    registry: Arc<Registry>,
    config: WeaveConfig,
    next_object: AtomicU64,
}

impl Weaver {
    /// Create a weaver with default settings
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_config(registry, WeaveConfig::default())
    }

    /// Create a weaver with explicit settings
    pub fn with_config(registry: Arc<Registry>, config: WeaveConfig) -> Self {
        Self {
            registry,
            config,
            next_object: AtomicU64::new(1),
        }
    }

    /// Registry being executed
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Settings in force
    pub fn config(&self) -> &WeaveConfig {
        &self.config
    }

    /// Fresh call chain honoring the trace setting
    pub fn chain(&self) -> CallChain {
        CallChain::new(self.config.trace)
    }

    /// Allocate a fresh object of type `ty`
    pub fn instantiate(&self, ty: TypeId) -> ObjectRef {
        ObjectRef::new(self.next_object.fetch_add(1, Ordering::Relaxed), ty)
    }

    /// Invoke `target` from host code outside every module, on a fresh chain
    pub fn call_external(&self, target: MemberId, receiver: Option<ObjectRef>, args: Vec<Value>) -> Invocation {
        self.call_from(Caller::external(), target, receiver, args)
    }

    /// Invoke `target` on behalf of `caller`, on a fresh chain
    pub fn call_from(&self, caller: Caller, target: MemberId, receiver: Option<ObjectRef>, args: Vec<Value>) -> Invocation {
        let mut chain = self.chain();
        let result = self.invoke(&mut chain, &caller, target, receiver, args);
        Invocation {
            result,
            trace: chain.take_trace(),
        }
    }

    /// Invoke `target` on `chain`
    ///
    /// The security frame pushed here is popped on every exit path.
    pub fn invoke(
        &self,
        chain: &mut CallChain,
        caller: &Caller,
        target: MemberId,
        receiver: Option<ObjectRef>,
        args: Vec<Value>,
    ) -> Result<Value, Fault> {
        if chain.is_cancelled() {
            return Err(Fault::Cancelled);
        }
        let registry = self.registry();
        let member = registry.member(target).ok_or_else(|| Fault::NoSuchMember {
            member: target.to_string(),
        })?;
        if !member.is_static && receiver.is_none() {
            return Err(Fault::NotAnInstance {
                member: registry.member_path(target),
            });
        }
        if chain.depth() >= self.config.max_depth {
            return Err(Fault::CallDepthExceeded {
                limit: self.config.max_depth,
            });
        }

        let classified = classify(registry, &CallSite::new(*caller, receiver), member);
        let mut guard = chain.enter(classified, member.passthru);
        let relation = guard.frame().relation;
        let this = if member.is_static { None } else { receiver };

        let result = self.enter_member(&mut guard, member, classified, relation, this, args);
        match &result {
            Ok(_) => guard.record(TraceEvent::Exit { member: target }),
            Err(fault) => {
                if guard.depth() == 1 {
                    warn!(member = %registry.member_path(target), %fault, "invocation faulted");
                }
                guard.record(TraceEvent::Fault {
                    member: target,
                    message: fault.to_string(),
                });
            }
        }
        result
    }

    fn enter_member(
        &self,
        chain: &mut CallChain,
        member: &MemberInfo,
        classified: RelationClass,
        relation: RelationClass,
        this: Option<ObjectRef>,
        args: Vec<Value>,
    ) -> Result<Value, Fault> {
        // Variant and masking follow the call site; pass-through only shapes nested checks
        let resolution = resolve(self.registry(), member, classified, args)?;
        chain.record(TraceEvent::Enter {
            member: member.id,
            classified,
            relation,
            variant: resolution.index,
        });
        let args = self.bind_arguments(chain, member, this, resolution.bindings)?;
        self.weave(chain, member, resolution.variant, this, args)
    }

    /// Materialize bindings, evaluating computed defaults in the callee's frame
    fn bind_arguments(
        &self,
        chain: &mut CallChain,
        member: &MemberInfo,
        this: Option<ObjectRef>,
        bindings: Vec<Binding>,
    ) -> Result<Vec<Value>, Fault> {
        let mut args = Vec::with_capacity(bindings.len());
        for (param, binding) in member.params.iter().zip(bindings) {
            let default = match binding {
                Binding::Supplied(value) => {
                    args.push(value);
                    continue;
                }
                Binding::Masked(default) => {
                    chain.record(TraceEvent::Masked {
                        member: member.id,
                        param: param.name.clone(),
                    });
                    default
                }
                Binding::Omitted(default) => default,
            };
            let value = match default {
                DefaultValue::Const(value) => value,
                DefaultValue::Computed(body) => {
                    let caller = Caller::from_member(self.registry(), member.id, this);
                    let mut cx = BodyContext::new(self, chain, Frame::Default, caller, member.id, this, args.clone());
                    value_of(self.registry().body(body).run(&mut cx))?
                }
            };
            args.push(value);
        }
        Ok(args)
    }

    fn weave(
        &self,
        chain: &mut CallChain,
        member: &MemberInfo,
        variant: Variant,
        this: Option<ObjectRef>,
        args: Vec<Value>,
    ) -> Result<Value, Fault> {
        let mut state = WeaveState::Entry;
        loop {
            state = match state {
                WeaveState::Entry => WeaveState::RunBeforeChain,
                WeaveState::RunBeforeChain => {
                    match self.run_before(chain, JoinPointSite::Entry(member.id), this, &args) {
                        Ok(None) => WeaveState::RunBody,
                        Ok(Some(value)) => WeaveState::ShortCircuit(value),
                        Err(fault) => WeaveState::Fault {
                            fault,
                            from_body: false,
                        },
                    }
                }
                WeaveState::RunBody => self.run_body(chain, member, variant, this, &args),
                WeaveState::RunAfterChain(value) => {
                    match self.run_after(chain, JoinPointSite::Exit(member.id), this, &args, value) {
                        Ok(ChainOutcome::Completed(value) | ChainOutcome::Returned(value)) => WeaveState::Exit(value),
                        Err(fault) => WeaveState::Fault {
                            fault,
                            from_body: false,
                        },
                    }
                }
                WeaveState::ShortCircuit(value) => {
                    if self.config.after_on_short_circuit {
                        WeaveState::RunAfterChain(value)
                    } else {
                        WeaveState::Exit(value)
                    }
                }
                WeaveState::Fault { fault, from_body } => {
                    if from_body && self.config.after_on_fault {
                        // After advice observes the fault; its outcome cannot replace it
                        if let Err(dropped) = self.run_after(chain, JoinPointSite::Exit(member.id), this, &args, Value::Null) {
                            warn!(
                                member = %self.registry().member_path(member.id),
                                fault = %dropped,
                                "after advice faulted while observing a fault"
                            );
                            chain.record(TraceEvent::Fault {
                                member: member.id,
                                message: dropped.to_string(),
                            });
                        }
                    }
                    return Err(fault);
                }
                WeaveState::Exit(value) => return Ok(value),
            };
        }
    }

    /// Run the member body and the after-chains of explicit join points it reached
    ///
    /// Faults raised by join point advice are not body faults.
    fn run_body(
        &self,
        chain: &mut CallChain,
        member: &MemberInfo,
        variant: Variant,
        this: Option<ObjectRef>,
        args: &[Value],
    ) -> WeaveState {
        let registry = self.registry();
        let caller = Caller::from_member(registry, member.id, this);
        let body = registry.body(variant.body);
        trace!(member = %registry.member_path(member.id), body = body.describe(), "running body");
        let mut cx = BodyContext::new(self, chain, Frame::Member, caller, member.id, this, args.to_vec());
        let result = body.run(&mut cx);
        let short_circuit = cx.short_circuit.take();
        let advice_fault = cx.advice_fault.take();
        let pending = std::mem::take(&mut cx.pending);
        drop(cx);

        if let Some(value) = short_circuit {
            return WeaveState::ShortCircuit(value);
        }
        let value = match value_of(result) {
            Ok(value) => value,
            Err(fault) => {
                let from_body = advice_fault.as_ref() != Some(&fault);
                return WeaveState::Fault { fault, from_body };
            }
        };

        // Innermost (most recently reached) join point first
        for (index, jp_args) in pending.into_iter().rev() {
            let site = JoinPointSite::Explicit {
                member: member.id,
                index,
            };
            match self.run_after(chain, site, this, &jp_args, value.clone()) {
                Ok(ChainOutcome::Completed(_)) => {}
                Ok(ChainOutcome::Returned(value)) => return WeaveState::ShortCircuit(value),
                Err(fault) => {
                    return WeaveState::Fault {
                        fault,
                        from_body: false,
                    }
                }
            }
        }
        WeaveState::RunAfterChain(value)
    }

    /// Run the before-chain at `site`; `Some` is a short-circuit value
    pub(crate) fn run_before(
        &self,
        chain: &mut CallChain,
        site: JoinPointSite,
        this: Option<ObjectRef>,
        args: &[Value],
    ) -> Result<Option<Value>, Fault> {
        for id in &self.registry().plan(site).before {
            if let Some(value) = self.run_advice(chain, *id, site, this, args, None)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    fn run_after(
        &self,
        chain: &mut CallChain,
        site: JoinPointSite,
        this: Option<ObjectRef>,
        args: &[Value],
        result: Value,
    ) -> Result<ChainOutcome, Fault> {
        for id in &self.registry().plan(site).after {
            if let Some(value) = self.run_advice(chain, *id, site, this, args, Some(result.clone()))? {
                return Ok(ChainOutcome::Returned(value));
            }
        }
        Ok(ChainOutcome::Completed(result))
    }

    fn run_advice(
        &self,
        chain: &mut CallChain,
        id: PointcutId,
        site: JoinPointSite,
        this: Option<ObjectRef>,
        args: &[Value],
        result: Option<Value>,
    ) -> Result<Option<Value>, Fault> {
        if chain.is_cancelled() {
            return Err(Fault::Cancelled);
        }
        let registry = self.registry();
        let Some(pointcut) = registry.pointcut(id) else {
            return Ok(None);
        };
        chain.record(TraceEvent::Advice {
            pointcut: id,
            advice: pointcut.advice,
            site,
        });
        trace!(pointcut = %pointcut.source, advice = %pointcut.advice, "running advice");

        let caller = match pointcut.owner {
            AdviceOwner::Aspect(aspect) => Caller {
                module: registry.aspect(aspect).map(|a| a.module),
                ..Caller::default()
            },
            AdviceOwner::Type(ty) => Caller {
                ty: Some(ty),
                module: registry.ty(ty).map(|t| t.module),
                ..Caller::default()
            },
        };
        let mut cx = BodyContext::new(
            self,
            chain,
            Frame::Advice(id, site),
            caller,
            site.member(),
            this,
            args.to_vec(),
        );
        cx.result = result;
        let returned = match registry.body(pointcut.body).run(&mut cx) {
            Ok(Flow::Next) => return Ok(None),
            Ok(Flow::Return(value)) | Err(Interrupt::Return(value)) => value,
            Err(Interrupt::Fault(fault)) => return Err(fault),
        };
        drop(cx);

        if pointcut.returns.is_none() {
            return Err(Fault::IllegalAdviceReturn {
                pattern: pointcut.source.clone(),
            });
        }
        debug!(pointcut = %pointcut.source, at = %registry.describe_site(site), "advice short-circuited");
        chain.record(TraceEvent::ShortCircuit { pointcut: id, site });
        Ok(Some(returned))
    }
}

fn value_of(result: BodyResult) -> Result<Value, Fault> {
    match result {
        Ok(flow) => Ok(flow.into_value()),
        Err(Interrupt::Return(value)) => Ok(value),
        Err(Interrupt::Fault(fault)) => Err(fault),
    }
}
