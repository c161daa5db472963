//! `weft check`: validate a program model without running it.

use crate::load_registry;
use crate::output::StyledOutput;
use std::path::Path;
use weft_engine::{Output, Registry};

/// Check `file`; `Ok(false)` when the model is rejected
pub fn execute(file: &Path, out: &mut StyledOutput) -> anyhow::Result<bool> {
    match load_registry(file, &Output::new())? {
        Ok(registry) => {
            out.success(&format!("{}: ok", file.display()));
            out.plain(&summary(&registry));
            Ok(true)
        }
        Err(rejected) => {
            for error in &rejected.errors {
                out.error(&error.to_string());
            }
            out.plain(&format!("{}: {} error(s)", file.display(), rejected.errors.len()));
            Ok(false)
        }
    }
}

/// One-line inventory of a registry
pub fn summary(registry: &Registry) -> String {
    format!(
        "{} module(s), {} type(s), {} member(s), {} pointcut(s)",
        registry.modules().len(),
        registry.types().len(),
        registry.members().len(),
        registry.pointcuts().len()
    )
}
