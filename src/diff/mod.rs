//! Unified diff → change units.

pub mod enclosing;
pub mod extent;
pub mod hunk;
pub mod parser;
pub mod signatures;
pub mod splitter;

use crate::context::BuildContext;
use crate::tour::models::ChangeUnit;
use tracing::info;

/// Parse `diff_text` and split every hunk into definition, global and
/// operation units.
pub fn build_change_units(diff_text: &str, ctx: &mut BuildContext) -> Vec<ChangeUnit> {
    let raw = parser::parse(diff_text, ctx.workspace_root(), ctx.filter());
    let hunks = raw.len();
    let units = splitter::split(raw, ctx);
    info!("{} hunk(s) split into {} change unit(s)", hunks, units.len());
    units
}
