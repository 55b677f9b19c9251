//! Split raw hunk units into definition, global and operation units.
//!
//! Detection runs as two independent passes over the added lines of a hunk:
//! a syntax-tree pass (definitions starting on an added line) and a line
//! pattern pass (signatures and top-level bindings). `merge_candidates`
//! combines them. Syntax-tree hits always win; pattern hits only contribute
//! globals, because a callable signature the tree does not confirm is
//! treated as text that merely looks like one.

use super::enclosing::enclosing_definition_excluding;
use super::extent::expression_end;
use super::hunk::{self, HunkLine, LineMarker};
use super::signatures::{self, LineClassifier, Signature, meaningful_lines};
use crate::analyzer::languages::{LanguageFamily, family_for_path};
use crate::analyzer::syntax::{Analysis, Definition};
use crate::context::BuildContext;
use crate::tour::models::{
    ChangeKind, ChangeUnit, DefinitionKind, IntroducedDefinition, LineRange, segment_id,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// A definition or global accepted for one hunk.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Hit {
    range: LineRange,
    name: String,
    qualified_name: String,
    container: Option<String>,
    kind: DefinitionKind,
    change_kind: ChangeKind,
}

impl Hit {
    fn from_definition(def: &Definition) -> Self {
        Self {
            range: def.range,
            name: def.name.clone(),
            qualified_name: def.qualified_name.clone(),
            container: def.container.clone(),
            kind: def.kind,
            change_kind: ChangeKind::Definition,
        }
    }
}

/// Outcome of merging both detection passes.
#[derive(Debug, Default)]
struct Merged {
    hits: Vec<Hit>,
    /// Definitions declared inside an unchanged function; their lines stay
    /// operational and they are reported as introduced by the covering unit.
    introduced: Vec<Definition>,
}

/// What one hunk is split against.
struct HunkView<'a> {
    file_path: &'a str,
    family: LanguageFamily,
    analysis: &'a Analysis,
    lines: Vec<&'a str>,
    hunk: &'a [HunkLine],
}

/// Split every raw unit against the revised content of its file.
pub fn split(units: Vec<ChangeUnit>, ctx: &mut BuildContext) -> Vec<ChangeUnit> {
    let mut out = Vec::with_capacity(units.len());
    for raw in units {
        let file_path = raw.file_path.clone();
        let range = raw.range;
        let produced = split_unit(raw, ctx);
        debug!(
            "split {}:{} into {} unit(s)",
            file_path,
            range,
            produced.len()
        );
        out.extend(produced);
    }
    out
}

fn split_unit(raw: ChangeUnit, ctx: &mut BuildContext) -> Vec<ChangeUnit> {
    let Some(family) = family_for_path(&raw.file_path) else {
        return vec![raw];
    };

    let hunk_lines = hunk::replay(&raw.diff_text);
    let text = ctx.revised_text(&raw.file_path);
    let analysis = ctx.analyze_revised(&raw.file_path);
    let source: Arc<str> = text.unwrap_or_else(|| synthesize(&hunk_lines).into());
    let file_path = raw.file_path.clone();

    let view = HunkView {
        file_path: &file_path,
        family,
        analysis: &analysis,
        lines: source.lines().collect(),
        hunk: &hunk_lines,
    };

    let added = hunk::added_lines(&hunk_lines);
    if added.is_empty() {
        return vec![pass_through(raw, &view)];
    }

    let ast = ast_candidates(&added, &analysis);
    let pattern = pattern_candidates(&added, family);
    let merged = merge_candidates(ast, pattern, &view);

    let mut units: Vec<ChangeUnit> = merged
        .hits
        .iter()
        .map(|hit| definition_unit(hit, &view))
        .collect();
    units.extend(operation_units(&added, &merged, &view));
    units.sort_by_key(|u| u.range.start_line);
    units
}

/// Pass 1: definitions whose own first line was added.
fn ast_candidates(added: &[&HunkLine], analysis: &Analysis) -> Vec<Definition> {
    added
        .iter()
        .flat_map(|line| analysis.starting_at(line.new_line).cloned())
        .collect()
}

/// Pass 2: line signatures on added lines.
fn pattern_candidates(added: &[&HunkLine], family: LanguageFamily) -> Vec<(usize, Signature)> {
    added
        .iter()
        .filter_map(|line| signatures::detect(&line.text, family).map(|s| (line.new_line, s)))
        .collect()
}

fn merge_candidates(
    ast: Vec<Definition>,
    pattern: Vec<(usize, Signature)>,
    view: &HunkView,
) -> Merged {
    let mut candidates: Vec<Hit> = ast.iter().map(Hit::from_definition).collect();

    for (line, signature) in pattern {
        let confirmed = view
            .analysis
            .starting_at(line)
            .any(|d| d.name == signature.name);
        if confirmed || !signature.is_variable() {
            continue;
        }
        if !is_top_level(line, &signature, view) {
            continue;
        }
        let end = expression_end(&view.lines, line, view.family).max(line);
        candidates.push(Hit {
            range: LineRange::new(line, end),
            name: signature.name.clone(),
            qualified_name: signature.name,
            container: None,
            kind: DefinitionKind::Variable,
            change_kind: ChangeKind::Global,
        });
    }

    // Outermost first, so nested hits fold into their parent.
    candidates.sort_by(|a, b| {
        a.range
            .start_line
            .cmp(&b.range.start_line)
            .then(b.range.end_line.cmp(&a.range.end_line))
            .then(a.cmp(b))
    });
    candidates.dedup_by(|a, b| a.name == b.name && a.range == b.range && a.kind == b.kind);

    let mut merged = Merged::default();
    for hit in candidates {
        if merged.hits.iter().any(|h| h.range.contains_range(&hit.range)) {
            continue;
        }
        if hit.change_kind == ChangeKind::Definition && inside_unchanged_callable(&hit, view) {
            if let Some(def) = ast.iter().find(|d| d.range == hit.range && d.name == hit.name) {
                merged.introduced.push(def.clone());
            }
            continue;
        }
        merged.hits.push(hit);
    }
    merged
}

/// Variables only become globals outside every known definition.
fn is_top_level(line: usize, signature: &Signature, view: &HunkView) -> bool {
    match view.family {
        LanguageFamily::Python => signature.indent == 0,
        LanguageFamily::Script => {
            if view.analysis.definitions.is_empty() {
                signature.indent == 0
            } else {
                view.analysis.innermost_at(line).is_none()
            }
        }
    }
}

fn inside_unchanged_callable(hit: &Hit, view: &HunkView) -> bool {
    view.analysis.definitions.iter().any(|d| {
        d.kind.is_callable() && d.range != hit.range && d.range.contains_range(&hit.range)
    })
}

/// Group unabsorbed meaningful added lines into operation units.
///
/// A run is a stretch of consecutive added lines; it is cut again wherever the
/// innermost enclosing definition changes.
fn operation_units(added: &[&HunkLine], merged: &Merged, view: &HunkView) -> Vec<ChangeUnit> {
    let meaningful = meaningful_added(view);
    let mut units = Vec::new();
    let mut current: Vec<usize> = Vec::new();
    let mut current_owner: Option<Definition> = None;
    let mut previous: Option<usize> = None;

    for line in added {
        let n = line.new_line;
        let absorbed = merged.hits.iter().any(|h| h.range.contains(n));
        let adjacent = previous.is_some_and(|p| p.checked_add(1) == Some(n));
        if absorbed || !adjacent {
            flush_run(&mut current, &mut current_owner, merged, view, &mut units);
        }
        previous = (!absorbed).then_some(n);
        if absorbed || !meaningful.contains(&n) {
            continue;
        }

        let owner = enclosing_definition_excluding(
            view.analysis,
            &view.lines,
            &LineRange::single(n),
            Some(view.family),
            &merged.introduced,
        );
        let same_owner =
            owner.as_ref().map(|d| d.range) == current_owner.as_ref().map(|d| d.range);
        if !current.is_empty() && !same_owner {
            flush_run(&mut current, &mut current_owner, merged, view, &mut units);
        }
        current_owner = owner;
        current.push(n);
    }
    flush_run(&mut current, &mut current_owner, merged, view, &mut units);
    units
}

/// Added lines that carry behavior. Block comments are tracked over the whole
/// revised text, or over the hunk when there is none.
fn meaningful_added(view: &HunkView) -> BTreeSet<usize> {
    if !view.lines.is_empty() {
        let mask = meaningful_lines(view.lines.iter().copied(), Some(view.family));
        return view
            .hunk
            .iter()
            .filter(|l| l.marker == LineMarker::Added)
            .filter(|l| mask.get(l.new_line - 1).copied().unwrap_or(true))
            .map(|l| l.new_line)
            .collect();
    }
    let mut classifier = LineClassifier::new(Some(view.family));
    view.hunk
        .iter()
        .filter(|l| l.marker != LineMarker::Removed)
        .filter(|l| classifier.is_meaningful(&l.text) && l.marker == LineMarker::Added)
        .map(|l| l.new_line)
        .collect()
}

fn flush_run(
    current: &mut Vec<usize>,
    owner: &mut Option<Definition>,
    merged: &Merged,
    view: &HunkView,
    units: &mut Vec<ChangeUnit>,
) {
    let (Some(&first), Some(&last)) = (current.first(), current.last()) else {
        return;
    };
    let range = LineRange::new(first, last);
    let selected: Vec<&HunkLine> = view
        .hunk
        .iter()
        .filter(|l| l.marker != LineMarker::Removed && range.contains(l.new_line))
        .collect();

    let mut unit = ChangeUnit::operation(view.file_path, range, hunk::render(&selected));
    if let Some(def) = owner.take() {
        attach_identity(&mut unit, view.file_path, &def);
    }
    unit.introduced_definitions = merged
        .introduced
        .iter()
        .filter(|d| range.contains(d.range.start_line))
        .map(|d| IntroducedDefinition {
            name: d.name.clone(),
            qualified_name: d.qualified_name.clone(),
            kind: d.kind,
            range: d.range,
        })
        .collect();
    units.push(unit);
    current.clear();
}

fn definition_unit(hit: &Hit, view: &HunkView) -> ChangeUnit {
    let selected: Vec<&HunkLine> = view
        .hunk
        .iter()
        .filter(|l| hit.range.contains(l.new_line))
        .collect();
    let mut unit = ChangeUnit::operation(view.file_path, hit.range, hunk::render(&selected));
    unit.change_kind = hit.change_kind;
    unit.definition_name = Some(hit.name.clone());
    unit.definition_type = Some(hit.kind);
    unit.qualified_name = Some(hit.qualified_name.clone());
    unit.container_name = hit.container.clone();
    unit.element_kind = Some(hit.kind);
    unit.symbol_name = Some(hit.qualified_name.clone());
    unit.segment_id = Some(segment_id(view.file_path, &hit.range));
    unit
}

/// A hunk with nothing added keeps its original span and text.
fn pass_through(raw: ChangeUnit, view: &HunkView) -> ChangeUnit {
    let mut unit = raw;
    if let Some(def) = enclosing_definition_excluding(
        view.analysis,
        &view.lines,
        &unit.range,
        Some(view.family),
        &[],
    ) {
        attach_identity(&mut unit, view.file_path, &def);
    }
    unit
}

/// Label an operation with its enclosing definition; `change_kind` stays.
fn attach_identity(unit: &mut ChangeUnit, file_path: &str, def: &Definition) {
    unit.definition_name = Some(def.name.clone());
    unit.qualified_name = Some(def.qualified_name.clone());
    unit.container_name = def.container.clone();
    unit.element_kind = Some(def.kind);
    unit.symbol_name = Some(def.qualified_name.clone());
    unit.segment_id = Some(segment_id(file_path, &def.range));
}

/// Highest line number a synthesized revised text may reach.
const MAX_SYNTHESIZED_LINE: usize = 1 << 20;

/// Revised-side text rebuilt from the hunk alone, blank elsewhere. Hunks
/// placed past [`MAX_SYNTHESIZED_LINE`] get no text at all.
fn synthesize(hunk_lines: &[HunkLine]) -> String {
    let last = hunk_lines
        .iter()
        .filter(|l| l.marker != LineMarker::Removed)
        .map(|l| l.new_line)
        .max()
        .unwrap_or(0);
    if last > MAX_SYNTHESIZED_LINE {
        warn!("hunk at line {last} is too far out to rebuild the revised file");
        return String::new();
    }
    let mut lines = vec![""; last];
    for l in hunk_lines.iter().filter(|l| l.marker != LineMarker::Removed) {
        lines[l.new_line - 1] = l.text.as_str();
    }
    lines.join("\n")
}
