//! `weft run`: invoke one member of a model and report what happened.

use crate::load_registry;
use crate::output::StyledOutput;
use anyhow::{anyhow, Context};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use weft_engine::{Caller, Fault, Output, TraceEvent, Value, WeaveConfig, Weaver};

pub struct RunArgs {
    pub file: PathBuf,
    pub member: String,
    pub args: Vec<String>,
    pub from: Option<String>,
    pub module: Option<String>,
    pub same_instance: bool,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub no_trace: bool,
}

/// Everything one invocation produced
#[derive(Debug)]
pub struct RunReport {
    /// Returned value or fault
    pub result: Result<Value, Fault>,
    /// Lines written by `emit` steps
    pub output: Vec<String>,
    /// Recorded trace
    pub trace: Vec<TraceEvent>,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    fault: Option<&'a Fault>,
    output: &'a [String],
    trace: Vec<String>,
}

pub fn execute(args: RunArgs, out: &mut StyledOutput) -> anyhow::Result<bool> {
    let (weaver, report) = invoke(&args)?;
    let registry = weaver.registry();

    if args.json {
        let json = JsonReport {
            result: report.result.as_ref().ok(),
            fault: report.result.as_ref().err(),
            output: &report.output,
            trace: report.trace.iter().map(|e| e.describe(registry)).collect(),
        };
        out.plain(&serde_json::to_string_pretty(&json)?);
        return Ok(report.result.is_ok());
    }

    for line in &report.output {
        out.plain(line);
    }
    if !report.trace.is_empty() {
        out.info("trace:");
        for event in &report.trace {
            out.trace_event(registry, event);
        }
    }
    match &report.result {
        Ok(value) => {
            out.success(&format!("=> {}", value));
            Ok(true)
        }
        Err(fault) => {
            out.error(&fault.to_string());
            Ok(false)
        }
    }
}

/// Load the model, resolve the caller and run the invocation
pub fn invoke(args: &RunArgs) -> anyhow::Result<(Weaver, RunReport)> {
    let output = Output::new();
    let registry = load_registry(&args.file, &output)??;

    let mut config = match &args.config {
        Some(path) => WeaveConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => WeaveConfig::default(),
    };
    if args.no_trace {
        config = config.trace(false);
    }
    let weaver = Weaver::with_config(Arc::new(registry), config);
    let registry = weaver.registry();

    let target = registry
        .find_member(&args.member)
        .ok_or_else(|| anyhow!("no such member: {}", args.member))?;
    let target_info = registry
        .member(target)
        .ok_or_else(|| anyhow!("no such member: {}", args.member))?;
    let receiver = (!target_info.is_static).then(|| weaver.instantiate(target_info.owner));

    let caller = match (&args.from, &args.module) {
        (Some(path), _) => {
            let from = registry
                .find_member(path)
                .ok_or_else(|| anyhow!("no such caller: {}", path))?;
            let from_info = registry
                .member(from)
                .ok_or_else(|| anyhow!("no such caller: {}", path))?;
            let this = if args.same_instance {
                receiver
            } else if from_info.is_static {
                None
            } else {
                Some(weaver.instantiate(from_info.owner))
            };
            Caller::from_member(registry, from, this)
        }
        (None, Some(name)) => {
            let module = registry
                .find_module(name)
                .ok_or_else(|| anyhow!("no such module: {}", name))?;
            Caller::in_module(module)
        }
        (None, None) => Caller::external(),
    };

    let values: Vec<Value> = args.args.iter().map(|a| Value::parse_literal(a)).collect();
    info!(member = %registry.member_path(target), args = values.len(), "invoking");
    let invocation = weaver.call_from(caller, target, receiver, values);

    let report = RunReport {
        result: invocation.result,
        output: output.take(),
        trace: invocation.trace,
    };
    Ok((weaver, report))
}
