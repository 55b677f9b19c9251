use crate::analyzer::syntax::Definition;
use crate::context::BuildContext;
use crate::tour::models::{
    CallReference, ChangeKind, ChangeType, ChangeUnit, DefinitionKind, segment_id,
};
use tracing::{info, warn};

/// Units for exploring files as they are, without a diff.
///
/// Yields one `definition` unit per top-level definition and per method,
/// with calls to other definitions of the same file attached. Feed the
/// result to the tour builder with [`GraphMode::Overall`](crate::tour::graph::GraphMode).
pub fn build_overview_units(paths: &[String], ctx: &mut BuildContext) -> Vec<ChangeUnit> {
    let mut units = Vec::new();
    for path in paths {
        let path = path.trim_start_matches("./").replace('\\', "/");
        if ctx.revised_text(&path).is_none() {
            warn!("Skipping {path}: file cannot be read");
            continue;
        }
        let analysis = ctx.analyze_revised(&path);

        for def in analysis.definitions.iter().filter(|d| is_outline_level(d, &analysis.definitions)) {
            let mut unit = ChangeUnit::operation(path.as_str(), def.range, String::new());
            unit.change_kind = ChangeKind::Definition;
            unit.change_type = ChangeType::Unknown;
            unit.definition_name = Some(def.name.clone());
            unit.definition_type = Some(def.kind);
            unit.qualified_name = Some(def.qualified_name.clone());
            unit.container_name = def.container.clone();
            unit.element_kind = Some(def.kind);
            unit.symbol_name = Some(def.qualified_name.clone());
            unit.segment_id = Some(segment_id(&path, &def.range));

            if def.kind != DefinitionKind::Class {
                let mut calls: Vec<CallReference> = Vec::new();
                for call in analysis.calls.iter().filter(|c| def.range.contains_range(&c.range)) {
                    let Some(target) = analysis
                        .resolve(&call.name, call.qualified_name.as_deref())
                        .first()
                    else {
                        continue;
                    };
                    if target.qualified_name == def.qualified_name
                        || !is_outline_level(target, &analysis.definitions)
                    {
                        continue;
                    }
                    let reference = CallReference {
                        name: call.name.clone(),
                        qualified_name: Some(target.qualified_name.clone()),
                        range: call.range,
                    };
                    if !calls.contains(&reference) {
                        calls.push(reference);
                    }
                }
                unit.related_calls = calls;
            }
            units.push(unit);
        }
    }
    info!("Overview of {} file(s): {} definition(s)", paths.len(), units.len());
    units
}

/// Top-level definitions and methods; anything nested in a function body is skipped.
fn is_outline_level(def: &Definition, all: &[Definition]) -> bool {
    !all.iter().any(|other| {
        other.kind.is_callable() && other.range != def.range && other.range.contains_range(&def.range)
    })
}
