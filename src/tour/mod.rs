//! Change units → ordered, explained tour.

pub mod background;
pub mod builder;
pub mod graph;
pub mod grouping;
pub mod models;
pub mod order;
pub mod overview;

pub use builder::{TourOptions, build_tour};
pub use graph::GraphMode;
pub use overview::build_overview_units;

use crate::context::BuildContext;
use crate::diff::build_change_units;
use crate::sources::SourceError;
use models::ChangeUnit;

/// Fetch the current diff from the context's sources, split it, and attach
/// background context to every unit.
pub fn collect_change_units(ctx: &mut BuildContext) -> Result<Vec<ChangeUnit>, SourceError> {
    let diff = ctx.sources().diff()?;
    let mut units = build_change_units(&diff, ctx);
    background::attach_background(&mut units, ctx);
    Ok(units)
}
