//! Weft command-line front-end
//!
//! Loads a program model file, freezes it into a registry and runs
//! invocations against it. The binary in `main.rs` is a thin clap layer
//! over the commands here.

#![warn(rust_2018_idioms)]

pub mod commands;
pub mod output;

use anyhow::Context;
use std::path::Path;
use tracing::info;
use weft_engine::{BuildError, Output, ProgramModel, Registry};

/// Load a model file and build its registry, binding scripts to `output`
///
/// I/O and parse failures are `Err`; a model the builder rejects comes
/// back as the inner `Err` so callers can list every problem.
pub fn load_registry(path: &Path, output: &Output) -> anyhow::Result<Result<Registry, BuildError>> {
    let model = ProgramModel::load(path).with_context(|| format!("loading {}", path.display()))?;
    info!(
        path = %path.display(),
        types = model.types.len(),
        members = model.members.len(),
        pointcuts = model.pointcuts.len(),
        "model loaded"
    );
    Ok(model.into_builder(output).build())
}
