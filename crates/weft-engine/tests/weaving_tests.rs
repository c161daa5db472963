use std::sync::Arc;
use weft_engine::{
    AspectDecl, CallChain, Caller, Fault, Flow, Interrupt, MemberDecl, ModuleDecl, ObjectRef, Output,
    ParamDecl, PointcutDecl, Registry, RegistryBuilder, RegistryError, RelationClass, RelationSet,
    TraceEvent, TypeDecl, Value, WeaveConfig, Weaver,
};

// Two modules, two bank types plus a plugin type, and an unscoped aspect
fn base() -> RegistryBuilder {
    let mut builder = RegistryBuilder::new();
    builder
        .module(ModuleDecl::new("core"))
        .module(ModuleDecl::new("plugins"))
        .ty(TypeDecl::new("Account", "Bank", "core"))
        .ty(TypeDecl::new("Teller", "Bank", "core"))
        .ty(TypeDecl::new("Script", "Ext", "plugins"))
        .aspect(AspectDecl::new("Audit", "core"))
        .body_fn("noop", |_| Ok(Flow::Next));
    builder
}

fn weaver(builder: RegistryBuilder) -> Weaver {
    Weaver::new(Arc::new(builder.build().unwrap()))
}

fn member(weaver: &Weaver, path: &str) -> weft_engine::MemberId {
    weaver.registry().find_member(path).unwrap()
}

fn object(weaver: &Weaver, ty: &str) -> ObjectRef {
    weaver.instantiate(weaver.registry().find_type(ty).unwrap())
}

fn logging(log: &Output, line: &'static str) -> impl Fn(&mut weft_engine::BodyContext<'_>) -> weft_engine::BodyResult {
    let log = log.clone();
    move |_| {
        log.push(line);
        Ok(Flow::Next)
    }
}

// ============================================================================
// Registration
// ============================================================================

#[test]
fn test_unpartitioned_variants_rejected() {
    let mut builder = base();
    builder.member(
        MemberDecl::function("Account", "Close")
            .variant(RelationSet::only(RelationClass::External), "noop")
            .variant(RelationSet::only(RelationClass::SameModule), "noop"),
    );
    let err = builder.build().unwrap_err();
    assert!(err.any(|e| matches!(e, RegistryError::UnpartitionedRelationSet { .. })));
}

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_before_descending_after_ascending() {
    let mut builder = base();
    builder.member(MemberDecl::function("Account", "Open").as_static().body("noop"));
    for _ in 0..3 {
        builder.pointcut(PointcutDecl::before("Account.Open", "noop", "Audit"));
    }
    for _ in 0..3 {
        builder.pointcut(PointcutDecl::after("Account.Open", "noop", "Audit"));
    }
    let weaver = weaver(builder);
    let outcome = weaver.call_external(member(&weaver, "Bank.Account.Open"), None, vec![]);
    assert_eq!(outcome.result, Ok(Value::Null));
    let sequence: Vec<usize> = outcome.advice_sequence().iter().map(|id| id.index()).collect();
    assert_eq!(sequence, vec![2, 1, 0, 3, 4, 5]);
}

#[test]
fn test_advice_order_is_deterministic() {
    let mut builder = base();
    builder
        .member(MemberDecl::function("Account", "Open").as_static().body("noop"))
        .pointcut(PointcutDecl::before("*", "noop", "Audit"))
        .pointcut(PointcutDecl::after("Bank :: *", "noop", "Audit"))
        .pointcut(PointcutDecl::before("Open()", "noop", "Audit"));
    let weaver = weaver(builder);
    let open = member(&weaver, "Bank.Account.Open");
    let first = weaver.call_external(open, None, vec![]).advice_sequence();
    for _ in 0..20 {
        assert_eq!(weaver.call_external(open, None, vec![]).advice_sequence(), first);
    }
}

// ============================================================================
// Security frames
// ============================================================================

#[test]
fn test_passthru_keeps_enclosing_relation() {
    let mut builder = base();
    builder
        .member(MemberDecl::function("Account", "Outer").body("outer"))
        .member(MemberDecl::function("Account", "Helper").passthru().body("relation"))
        .member(MemberDecl::function("Account", "Plain").body("relation"))
        .body_fn("outer", |cx| {
            let this = cx.this();
            let helper = cx.call_path("Bank.Account.Helper", this, vec![])?;
            let plain = cx.call_path("Bank.Account.Plain", this, vec![])?;
            Ok(Flow::Return(Value::from(format!("{}|{}", helper, plain))))
        })
        .body_fn("relation", |cx| Ok(Flow::Return(Value::from(cx.relation().name()))));
    let weaver = weaver(builder);
    let account = object(&weaver, "Account");

    let outcome = weaver.call_external(member(&weaver, "Bank.Account.Outer"), Some(account), vec![]);
    assert_eq!(outcome.result, Ok(Value::from("External|SameInstance")));

    let outcome = weaver.call_external(member(&weaver, "Bank.Account.Helper"), Some(account), vec![]);
    assert_eq!(outcome.result, Ok(Value::from("External")));

    // Trace shows the classification and the effective relation separately
    let outcome = weaver.call_external(member(&weaver, "Bank.Account.Outer"), Some(account), vec![]);
    assert!(outcome.trace.contains(&TraceEvent::Enter {
        member: member(&weaver, "Bank.Account.Helper"),
        classified: RelationClass::SameInstance,
        relation: RelationClass::External,
        variant: 0,
    }));
}

#[test]
fn test_passthru_masks_by_call_site() {
    let mut builder = base();
    builder
        .member(MemberDecl::function("Account", "Outer").returns("int").body("outer"))
        .member(
            MemberDecl::function("Account", "Helper")
                .passthru()
                .param(
                    ParamDecl::new("secret", "int")
                        .relations(RelationSet::only(RelationClass::SameInstance))
                        .default_value(Value::Int(-1)),
                )
                .returns("int")
                .body("secret"),
        )
        .body_fn("outer", |cx| {
            let this = cx.this();
            let value = cx.call_path("Bank.Account.Helper", this, vec![Value::Int(42)])?;
            Ok(Flow::Return(value))
        })
        .body_fn("secret", |cx| Ok(Flow::Return(cx.arg(0))));
    let weaver = weaver(builder);
    let account = object(&weaver, "Account");
    let helper = member(&weaver, "Bank.Account.Helper");

    // Own receiver: classified SameInstance, so the argument gets through
    let outcome = weaver.call_external(member(&weaver, "Bank.Account.Outer"), Some(account), vec![]);
    assert_eq!(outcome.result, Ok(Value::Int(42)));
    assert!(outcome.trace.contains(&TraceEvent::Enter {
        member: helper,
        classified: RelationClass::SameInstance,
        relation: RelationClass::External,
        variant: 0,
    }));
    assert!(!outcome.trace.iter().any(|e| matches!(e, TraceEvent::Masked { .. })));

    let outcome = weaver.call_external(helper, Some(account), vec![Value::Int(42)]);
    assert_eq!(outcome.result, Ok(Value::Int(-1)));
}

#[test]
fn test_fault_pops_frames_and_skips_after() {
    let log = Output::new();
    let mut builder = base();
    builder
        .member(MemberDecl::function("Account", "Fail").as_static().body("fail"))
        .body_fn("fail", |_| Err(Fault::raised("ledger offline").into()))
        .body_fn("after", logging(&log, "after"))
        .pointcut(PointcutDecl::after("Fail", "after", "Audit"));
    let weaver = weaver(builder);

    let mut chain = weaver.chain();
    let result = weaver.invoke(&mut chain, &Caller::external(), member(&weaver, "Account.Fail"), None, vec![]);
    assert_eq!(result, Err(Fault::raised("ledger offline")));
    assert_eq!(chain.depth(), 0);
    assert!(log.lines().is_empty());
    assert!(matches!(chain.trace().last(), Some(TraceEvent::Fault { message, .. }) if message == "ledger offline"));
}

// ============================================================================
// Masking and variants
// ============================================================================

#[test]
fn test_external_caller_sees_default() {
    let mut builder = base();
    builder
        .member(
            MemberDecl::function("Account", "Deposit")
                .as_static()
                .param(ParamDecl::new("amount", "int"))
                .param(
                    ParamDecl::new("fee", "int")
                        .relations(RelationSet::only(RelationClass::SameModule))
                        .default_value(Value::Int(1)),
                )
                .returns("int")
                .body("fee"),
        )
        .member(MemberDecl::function("Teller", "Serve").as_static().returns("int").body("serve"))
        .body_fn("fee", |cx| Ok(Flow::Return(cx.arg(1))))
        .body_fn("serve", |cx| {
            let value = cx.call_path("Bank.Account.Deposit", None, vec![Value::Int(100), Value::Int(0)])?;
            Ok(Flow::Return(value))
        });
    let weaver = weaver(builder);
    let deposit = member(&weaver, "Account.Deposit");

    let outside = weaver.call_external(deposit, None, vec![Value::Int(100), Value::Int(0)]);
    assert_eq!(outside.result, Ok(Value::Int(1)));
    assert!(outside.trace.contains(&TraceEvent::Masked {
        member: deposit,
        param: "fee".to_string(),
    }));

    let inside = weaver.call_external(member(&weaver, "Teller.Serve"), None, vec![]);
    assert_eq!(inside.result, Ok(Value::Int(0)));
}

#[test]
fn test_variant_by_module() {
    let internal = RelationSet::of(&[
        RelationClass::SameInstance,
        RelationClass::SameTypeDifferentInstance,
        RelationClass::DerivedType,
        RelationClass::BaseType,
        RelationClass::SameModule,
    ]);
    let mut builder = base();
    builder
        .member(
            MemberDecl::function("Account", "Balance")
                .as_static()
                .returns("string")
                .variant(internal, "a")
                .variant(RelationSet::only(RelationClass::External), "b"),
        )
        .body_fn("a", |_| Ok(Flow::Return(Value::from("A"))))
        .body_fn("b", |_| Ok(Flow::Return(Value::from("B"))));
    let weaver = weaver(builder);
    let balance = member(&weaver, "Account.Balance");
    let core = weaver.registry().find_module("core").unwrap();
    let plugins = weaver.registry().find_module("plugins").unwrap();

    let outcome = weaver.call_from(Caller::in_module(core), balance, None, vec![]);
    assert_eq!(outcome.result, Ok(Value::from("A")));
    let outcome = weaver.call_from(Caller::in_module(plugins), balance, None, vec![]);
    assert_eq!(outcome.result, Ok(Value::from("B")));
}

#[test]
fn test_computed_default_runs_in_callee_frame() {
    let mut builder = base();
    builder
        .member(
            MemberDecl::function("Account", "Stamp")
                .param(
                    ParamDecl::new("who", "string")
                        .relations(RelationSet::only(RelationClass::SameInstance))
                        .default_computed("owner"),
                )
                .returns("string")
                .body("echo"),
        )
        .body_fn("owner", |cx| {
            let this = cx.this().map(|o| o.id).unwrap_or_default();
            Ok(Flow::Return(Value::from(format!("owner of {} as {}", this, cx.relation()))))
        })
        .body_fn("echo", |cx| Ok(Flow::Return(cx.arg(0))));
    let weaver = weaver(builder);
    let account = object(&weaver, "Account");
    let outcome = weaver.call_external(member(&weaver, "Account.Stamp"), Some(account), vec![Value::from("mallory")]);
    assert_eq!(
        outcome.result,
        Ok(Value::from(format!("owner of {} as External", account.id)))
    );
}

// ============================================================================
// Short-circuits
// ============================================================================

fn guarded_transfer(log: &Output) -> RegistryBuilder {
    let mut builder = base();
    let steps = log.clone();
    builder
        .member(
            MemberDecl::function("Account", "Transfer")
                .as_static()
                .returns("bool")
                .join_point("Approve", &["int", "int"])
                .body("transfer"),
        )
        .body_fn("transfer", move |cx| {
            steps.push("before join");
            cx.join_point("Approve", vec![Value::Int(10), Value::Int(20)])?;
            steps.push("after join");
            Ok(Flow::Return(Value::Bool(true)))
        })
        .body_fn("deny", |_| Ok(Flow::Return(Value::Bool(false))))
        .body_fn("exit", logging(log, "exit advice"))
        .body_fn("approved", logging(log, "approved advice"))
        .pointcut(PointcutDecl::after("Transfer", "exit", "Audit"))
        .pointcut(PointcutDecl::after("point Transfer.Approve(int, int)", "approved", "Audit"));
    builder
}

#[test]
fn test_explicit_join_point_short_circuit() {
    let log = Output::new();
    let mut builder = guarded_transfer(&log);
    builder.pointcut(PointcutDecl::before("point Transfer.Approve", "deny", "Audit").returns("bool"));
    let weaver = weaver(builder);

    let outcome = weaver.call_external(member(&weaver, "Account.Transfer"), None, vec![]);
    assert_eq!(outcome.result, Ok(Value::Bool(false)));
    assert_eq!(log.lines(), vec!["before join".to_string()]);
    assert!(outcome
        .trace
        .iter()
        .any(|e| matches!(e, TraceEvent::ShortCircuit { pointcut, .. } if pointcut.index() == 2)));
}

#[test]
fn test_explicit_join_point_runs_after_chains_in_order() {
    let log = Output::new();
    let weaver = weaver(guarded_transfer(&log));
    let outcome = weaver.call_external(member(&weaver, "Account.Transfer"), None, vec![]);
    assert_eq!(outcome.result, Ok(Value::Bool(true)));
    assert_eq!(
        log.lines(),
        vec![
            "before join".to_string(),
            "after join".to_string(),
            "approved advice".to_string(),
            "exit advice".to_string(),
        ]
    );
}

#[test]
fn test_before_short_circuit_skips_body_and_after() {
    let log = Output::new();
    let mut builder = guarded_transfer(&log);
    builder.pointcut(PointcutDecl::before("Transfer", "deny", "Audit").returns("bool"));
    let weaver = weaver(builder);
    let outcome = weaver.call_external(member(&weaver, "Account.Transfer"), None, vec![]);
    assert_eq!(outcome.result, Ok(Value::Bool(false)));
    assert!(log.lines().is_empty());
}

#[test]
fn test_after_on_short_circuit_policy() {
    let log = Output::new();
    let mut builder = guarded_transfer(&log);
    builder.pointcut(PointcutDecl::before("Transfer", "deny", "Audit").returns("bool"));
    let registry = Arc::new(builder.build().unwrap());
    let weaver = Weaver::with_config(registry, WeaveConfig::default().after_on_short_circuit(true));
    let outcome = weaver.call_external(member(&weaver, "Account.Transfer"), None, vec![]);
    assert_eq!(outcome.result, Ok(Value::Bool(false)));
    assert_eq!(log.lines(), vec!["exit advice".to_string()]);
}

#[test]
fn test_after_on_fault_policy() {
    let log = Output::new();
    let mut builder = base();
    builder
        .member(MemberDecl::function("Account", "Fail").as_static().body("fail"))
        .body_fn("fail", |_| Err(Fault::raised("boom").into()))
        .body_fn("after", logging(&log, "after"))
        .pointcut(PointcutDecl::after("Fail", "after", "Audit"));
    let registry = Arc::new(builder.build().unwrap());
    let weaver = Weaver::with_config(registry, WeaveConfig::default().after_on_fault(true));
    let outcome = weaver.call_external(member(&weaver, "Account.Fail"), None, vec![]);
    assert_eq!(outcome.result, Err(Fault::raised("boom")));
    assert_eq!(log.lines(), vec!["after".to_string()]);
}

#[test]
fn test_after_on_fault_ignores_join_point_advice_faults() {
    let log = Output::new();
    let mut builder = guarded_transfer(&log);
    builder
        .body_fn("boom", |_| Err(Fault::raised("advice boom").into()))
        .pointcut(PointcutDecl::before("point Transfer.Approve", "boom", "Audit"));
    let registry = Arc::new(builder.build().unwrap());
    let weaver = Weaver::with_config(registry, WeaveConfig::default().after_on_fault(true));
    let outcome = weaver.call_external(member(&weaver, "Account.Transfer"), None, vec![]);
    assert_eq!(outcome.result, Err(Fault::raised("advice boom")));
    assert_eq!(log.lines(), vec!["before join".to_string()]);

    // Same for after advice of a join point the body reached
    let log = Output::new();
    let mut builder = guarded_transfer(&log);
    builder
        .body_fn("boom", |_| Err(Fault::raised("late boom").into()))
        .pointcut(PointcutDecl::after("point Transfer.Approve", "boom", "Audit"));
    let registry = Arc::new(builder.build().unwrap());
    let weaver = Weaver::with_config(registry, WeaveConfig::default().after_on_fault(true));
    let outcome = weaver.call_external(member(&weaver, "Account.Transfer"), None, vec![]);
    assert_eq!(outcome.result, Err(Fault::raised("late boom")));
    assert_eq!(
        log.lines(),
        vec!["before join".to_string(), "after join".to_string(), "approved advice".to_string()]
    );
}

#[test]
fn test_after_advice_fault_while_observing_is_traced() {
    let mut builder = base();
    builder
        .member(MemberDecl::function("Account", "Fail").as_static().body("fail"))
        .body_fn("fail", |_| Err(Fault::raised("boom").into()))
        .body_fn("after", |_| Err(Fault::raised("after boom").into()))
        .pointcut(PointcutDecl::after("Fail", "after", "Audit"));
    let registry = Arc::new(builder.build().unwrap());
    let weaver = Weaver::with_config(registry, WeaveConfig::default().after_on_fault(true));
    let fail = member(&weaver, "Account.Fail");
    let outcome = weaver.call_external(fail, None, vec![]);
    assert_eq!(outcome.result, Err(Fault::raised("boom")));
    assert!(outcome.trace.contains(&TraceEvent::Fault {
        member: fail,
        message: "after boom".to_string(),
    }));
    assert!(outcome.trace.contains(&TraceEvent::Fault {
        member: fail,
        message: "boom".to_string(),
    }));
}

#[test]
fn test_advice_return_requires_declared_type() {
    let mut builder = base();
    builder
        .member(MemberDecl::function("Account", "Open").as_static().returns("bool").body("noop"))
        .body_fn("deny", |_| Ok(Flow::Return(Value::Bool(false))))
        .pointcut(PointcutDecl::before("Open", "deny", "Audit"));
    let weaver = weaver(builder);
    let outcome = weaver.call_external(member(&weaver, "Account.Open"), None, vec![]);
    assert_eq!(
        outcome.result,
        Err(Fault::IllegalAdviceReturn {
            pattern: "Open".to_string()
        })
    );
}

#[test]
fn test_after_advice_replaces_result() {
    let mut builder = base();
    builder
        .member(MemberDecl::function("Account", "Rate").as_static().returns("int").body("rate"))
        .body_fn("rate", |_| Ok(Flow::Return(Value::Int(3))))
        .body_fn("double", |cx| {
            let rate = cx.result().and_then(Value::as_int).unwrap_or_default();
            Ok(Flow::Return(Value::Int(rate * 2)))
        })
        .body_fn("never", |_| Ok(Flow::Return(Value::Int(-1))))
        .pointcut(PointcutDecl::after("Rate", "double", "Audit").returns("int"))
        .pointcut(PointcutDecl::after("Rate", "never", "Audit").returns("int"));
    let weaver = weaver(builder);
    let outcome = weaver.call_external(member(&weaver, "Account.Rate"), None, vec![]);
    assert_eq!(outcome.result, Ok(Value::Int(6)));
    assert_eq!(outcome.advice_sequence().len(), 1);
}

// ============================================================================
// Advice context
// ============================================================================

#[test]
fn test_advice_sees_join_point_relation_and_receiver() {
    let seen = Output::new();
    let mut builder = base();
    let sink = seen.clone();
    builder
        .member(MemberDecl::function("Account", "Open").param(ParamDecl::new("n", "int")).body("noop"))
        .body_fn("watch", move |cx| {
            let this = cx.this().map(|o| o.id).unwrap_or_default();
            sink.push(format!("{} {} {}", cx.relation(), this, cx.arg(0)));
            Ok(Flow::Next)
        })
        .pointcut(PointcutDecl::before("Open(int)", "watch", "Audit"));
    let weaver = weaver(builder);
    let account = object(&weaver, "Account");
    let outcome = weaver.call_external(member(&weaver, "Account.Open"), Some(account), vec![Value::Int(7)]);
    assert!(outcome.result.is_ok());
    assert_eq!(seen.lines(), vec![format!("External {} 7", account.id)]);
}

#[test]
fn test_advice_cannot_reach_join_points() {
    let mut builder = base();
    builder
        .member(MemberDecl::function("Account", "Open").as_static().body("noop").join_point("Check", &[]))
        .body_fn("sneaky", |cx| {
            cx.join_point("Check", vec![])?;
            Ok(Flow::Next)
        })
        .pointcut(PointcutDecl::before("Open", "sneaky", "Audit"));
    let weaver = weaver(builder);
    let outcome = weaver.call_external(member(&weaver, "Account.Open"), None, vec![]);
    assert!(matches!(outcome.result, Err(Fault::UndeclaredJoinPoint { name, .. }) if name == "Check"));
}

fn type_owned(pattern: &str, seen: &Output) -> Weaver {
    let sink = seen.clone();
    let mut builder = base();
    builder
        .member(MemberDecl::function("Account", "Open").as_static().body("noop"))
        .member(MemberDecl::function("Teller", "Whoami").as_static().body("whoami"))
        .body_fn("whoami", move |cx| {
            sink.push(cx.relation().name());
            Ok(Flow::Next)
        })
        .body_fn("notify", |cx| {
            cx.call_path("Bank.Teller.Whoami", None, vec![])?;
            Ok(Flow::Next)
        })
        .pointcut(PointcutDecl::before(pattern, "notify", "Audit").owned_by_type("Bank.Teller"));
    weaver(builder)
}

#[test]
fn test_type_owned_advice_identity() {
    let seen = Output::new();

    // Without a type segment the pattern only sees its own type
    let own = type_owned("Open", &seen);
    let outcome = own.call_external(member(&own, "Account.Open"), None, vec![]);
    assert!(outcome.advice_sequence().is_empty());

    let any = type_owned("*.Open", &seen);
    let outcome = any.call_external(member(&any, "Account.Open"), None, vec![]);
    assert_eq!(outcome.advice_sequence().len(), 1);
    // Advice declared in Teller calls Teller code as the same type
    assert_eq!(seen.lines(), vec!["SameTypeDifferentInstance".to_string()]);
}

// ============================================================================
// Dispatch and invocation faults
// ============================================================================

#[test]
fn test_virtual_dispatch_from_base_is_base_type() {
    let mut builder = base();
    builder
        .ty(TypeDecl::new("Savings", "Bank", "core").base("Bank.Account"))
        .member(MemberDecl::function("Account", "Describe").returns("string").body("describe"))
        .member(MemberDecl::function("Account", "Kind").returns("string").body("relation"))
        .member(MemberDecl::function("Savings", "Kind").returns("string").body("relation"))
        .body_fn("describe", |cx| {
            let this = cx.this().ok_or_else(|| Interrupt::from(Fault::raised("no receiver")))?;
            Ok(Flow::Return(cx.call_virtual(this, "Kind", vec![])?))
        })
        .body_fn("relation", |cx| {
            let path = cx.registry().member_path(cx.member());
            Ok(Flow::Return(Value::from(format!("{} {}", path, cx.relation()))))
        });
    let weaver = weaver(builder);
    let describe = member(&weaver, "Account.Describe");

    let savings = object(&weaver, "Savings");
    let outcome = weaver.call_external(describe, Some(savings), vec![]);
    assert_eq!(outcome.result, Ok(Value::from("Bank.Savings.Kind BaseType")));

    let account = object(&weaver, "Account");
    let outcome = weaver.call_external(describe, Some(account), vec![]);
    assert_eq!(outcome.result, Ok(Value::from("Bank.Account.Kind SameInstance")));
}

#[test]
fn test_invocation_faults() {
    let mut builder = base();
    builder
        .member(MemberDecl::function("Account", "Open").param(ParamDecl::new("n", "int")).body("noop"));
    let weaver = weaver(builder);
    let open = member(&weaver, "Account.Open");
    let account = object(&weaver, "Account");

    let outcome = weaver.call_external(open, None, vec![Value::Int(1)]);
    assert!(matches!(outcome.result, Err(Fault::NotAnInstance { .. })));

    let outcome = weaver.call_external(open, Some(account), vec![]);
    assert!(matches!(outcome.result, Err(Fault::ArgumentCount { expected: 1, actual: 0, .. })));

    let outcome = weaver.call_external(weft_engine::MemberId::from_index(99), None, vec![]);
    assert!(matches!(outcome.result, Err(Fault::NoSuchMember { .. })));
}

#[test]
fn test_call_depth_limit() {
    let mut builder = base();
    builder
        .member(MemberDecl::function("Account", "Recurse").as_static().body("recurse"))
        .body_fn("recurse", |cx| {
            cx.call_path("Bank.Account.Recurse", None, vec![])?;
            Ok(Flow::Next)
        });
    let registry = Arc::new(builder.build().unwrap());
    let weaver = Weaver::with_config(registry, WeaveConfig::default().max_depth(16));
    let mut chain = weaver.chain();
    let result = weaver.invoke(&mut chain, &Caller::external(), member(&weaver, "Account.Recurse"), None, vec![]);
    assert_eq!(result, Err(Fault::CallDepthExceeded { limit: 16 }));
    assert_eq!(chain.depth(), 0);
}

#[test]
fn test_cancellation_from_another_thread() {
    let mut builder = base();
    builder
        .member(MemberDecl::function("Account", "Spin").as_static().body("spin"))
        .body_fn("spin", |cx| loop {
            cx.checkpoint()?;
            std::thread::yield_now();
        });
    let weaver = weaver(builder);
    let mut chain = CallChain::new(true);
    let handle = chain.cancel_handle();
    let canceller = std::thread::spawn(move || {
        std::thread::sleep(std::time::Duration::from_millis(10));
        handle.cancel();
    });
    let result = weaver.invoke(&mut chain, &Caller::external(), member(&weaver, "Account.Spin"), None, vec![]);
    canceller.join().unwrap();
    assert_eq!(result, Err(Fault::Cancelled));
    assert_eq!(chain.depth(), 0);
}

#[test]
fn test_registry_shared_by_reference() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Registry>();
    assert_send_sync::<Weaver>();
}
