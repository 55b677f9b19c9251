use crate::analyzer::syntax::{Analysis, CallSite, Definition};
use crate::context::BuildContext;
use crate::tour::models::{CallReference, ChangeKind, ChangeUnit, CodeRegion};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Definition and global units of one batch, for calls into freshly added code.
struct BatchIndex {
    by_qualified: HashMap<String, String>,
    by_name: HashMap<String, Vec<String>>,
}

impl BatchIndex {
    fn new(units: &[ChangeUnit]) -> Self {
        let mut by_qualified = HashMap::new();
        let mut by_name: HashMap<String, Vec<String>> = HashMap::new();
        for unit in units {
            if unit.change_kind == ChangeKind::Operation {
                continue;
            }
            let (Some(name), Some(qualified)) = (&unit.definition_name, &unit.qualified_name)
            else {
                continue;
            };
            by_qualified.insert(qualified.clone(), qualified.clone());
            by_name.entry(name.clone()).or_default().push(qualified.clone());
        }
        Self {
            by_qualified,
            by_name,
        }
    }

    fn resolve(&self, call: &CallSite) -> Option<String> {
        if let Some(q) = call.qualified_name.as_ref().and_then(|q| self.by_qualified.get(q)) {
            return Some(q.clone());
        }
        match self.by_name.get(&call.name).map(Vec::as_slice) {
            Some([only]) => Some(only.clone()),
            _ => None,
        }
    }
}

/// Attach `related_calls` and `background_regions` to every unit.
///
/// Calls overlapping a unit that resolve to a definition at `HEAD` yield a
/// related call plus the definition's original location as a background
/// region. Calls into definitions that only exist in the working tree (same
/// file, or added elsewhere in this batch) yield a related call only.
/// Calls to anything unknown are dropped.
pub fn attach_background(units: &mut [ChangeUnit], ctx: &mut BuildContext) {
    let batch = BatchIndex::new(units);
    let mut analyses: HashMap<String, (Arc<Analysis>, Arc<Analysis>)> = HashMap::new();

    for unit in units.iter_mut() {
        let (revised, original) = analyses
            .entry(unit.file_path.clone())
            .or_insert_with(|| {
                (
                    ctx.analyze_revised(&unit.file_path),
                    ctx.analyze_original(&unit.file_path),
                )
            })
            .clone();

        let mut calls = Vec::new();
        let mut regions = Vec::new();
        let mut seen_calls = HashSet::new();
        let mut seen_regions = HashSet::new();

        for call in revised.calls.iter().filter(|c| c.range.overlaps(&unit.range)) {
            let Some((qualified, region)) = resolve_call(call, unit, &revised, &original, &batch)
            else {
                continue;
            };
            let reference = CallReference {
                name: call.name.clone(),
                qualified_name: Some(qualified),
                range: call.range,
            };
            if seen_calls.insert(reference.clone()) {
                calls.push(reference);
            }
            if let Some(def) = region {
                let region = CodeRegion {
                    file_path: unit.file_path.clone(),
                    range: def.range,
                    label: def.qualified_name.clone(),
                };
                if seen_regions.insert((region.file_path.clone(), region.range)) {
                    regions.push(region);
                }
            }
        }

        if !calls.is_empty() {
            debug!(
                "{}:{} calls {} known definition(s)",
                unit.file_path,
                unit.range,
                calls.len()
            );
        }
        unit.related_calls = calls;
        unit.background_regions = regions;
    }
}

/// Resolve a call to a qualified name, with the `HEAD` definition when there is one.
fn resolve_call(
    call: &CallSite,
    unit: &ChangeUnit,
    revised: &Analysis,
    original: &Analysis,
    batch: &BatchIndex,
) -> Option<(String, Option<Definition>)> {
    // A definition's own name, or an operation's enclosing one.
    let is_self = |qualified: &str| unit.qualified_name.as_deref() == Some(qualified);

    if let Some(def) = original.resolve(&call.name, call.qualified_name.as_deref()).first() {
        if is_self(&def.qualified_name) {
            return None;
        }
        return Some((def.qualified_name.clone(), Some(def.clone())));
    }
    if let Some(def) = revised.resolve(&call.name, call.qualified_name.as_deref()).first() {
        if is_self(&def.qualified_name) {
            return None;
        }
        return Some((def.qualified_name.clone(), None));
    }
    batch
        .resolve(call)
        .filter(|q| !is_self(q))
        .map(|q| (q, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::build_change_units;
    use crate::sources::MemorySources;
    use crate::tour::models::LineRange;

    const HEAD: &str = "def helper():
    return 1

def caller():
    return 0
";

    const NOW: &str = "def helper():
    return 1

def caller():
    return helper() + extra() + len([])

def extra():
    return 2
";

    const DIFF: &str = "+++ b/m.py
@@ -4,2 +4,5 @@
 def caller():
-    return 0
+    return helper() + extra() + len([])
+
+def extra():
+    return 2
";

    fn units_for(sources: &MemorySources) -> Vec<ChangeUnit> {
        let mut ctx = BuildContext::new("/repo", sources);
        let mut units = build_change_units(DIFF, &mut ctx);
        attach_background(&mut units, &mut ctx);
        units
    }

    #[test]
    fn test_head_definitions_become_background() {
        let sources = MemorySources::new(DIFF)
            .with_head("m.py", HEAD)
            .with_now("m.py", NOW);
        let units = units_for(&sources);
        assert_eq!(units.len(), 2);

        let op = &units[0];
        assert_eq!(op.change_kind, ChangeKind::Operation);
        let names: Vec<&str> = op.related_calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["helper", "extra"]);
        assert_eq!(op.background_regions.len(), 1);
        assert_eq!(op.background_regions[0].label, "helper");
        assert_eq!(op.background_regions[0].range, LineRange::new(1, 2));

        let extra = &units[1];
        assert_eq!(extra.definition_name.as_deref(), Some("extra"));
        assert!(extra.related_calls.is_empty());
    }

    #[test]
    fn test_missing_head_still_links_new_definitions() {
        let sources = MemorySources::new(DIFF).with_now("m.py", NOW);
        let units = units_for(&sources);
        let op = &units[0];
        assert!(op.background_regions.is_empty());
        assert_eq!(op.related_calls.len(), 2);
        assert_eq!(op.related_calls[1].qualified_name.as_deref(), Some("extra"));
    }

    #[test]
    fn test_recursive_call_is_not_background() {
        let diff = "+++ b/t.py\n@@ -1,2 +1,4 @@\n def walk(node):\n+    for child in node:\n+        walk(child)\n     return node\n";
        let head = "def walk(node):\n    return node\n";
        let now = "def walk(node):\n    for child in node:\n        walk(child)\n    return node\n";
        let sources = MemorySources::new(diff)
            .with_head("t.py", head)
            .with_now("t.py", now);
        let mut ctx = BuildContext::new("/repo", &sources);
        let mut units = build_change_units(diff, &mut ctx);
        attach_background(&mut units, &mut ctx);

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].change_kind, ChangeKind::Operation);
        assert_eq!(units[0].qualified_name.as_deref(), Some("walk"));
        assert!(units[0].related_calls.is_empty());
        assert!(units[0].background_regions.is_empty());
    }

    #[test]
    fn test_batch_index_requires_unambiguous_name() {
        let mut a = ChangeUnit::operation("a.js", LineRange::new(1, 2), String::new());
        a.change_kind = ChangeKind::Definition;
        a.definition_name = Some("run".into());
        a.qualified_name = Some("A.run".into());
        let mut b = a.clone();
        b.qualified_name = Some("B.run".into());

        let call = CallSite {
            name: "run".into(),
            qualified_name: None,
            range: LineRange::new(9, 9),
        };
        assert_eq!(BatchIndex::new(&[a.clone()]).resolve(&call).as_deref(), Some("A.run"));
        assert!(BatchIndex::new(&[a, b]).resolve(&call).is_none());
    }
}
