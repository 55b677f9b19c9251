use crate::tour::models::{ChangeUnit, ChangeUnitGroup};

pub const DEFAULT_PROXIMITY_THRESHOLD: usize = 5;

/// Bucket units by file and enclosing symbol, merging neighbours whose gap
/// (lines strictly between them) is at most `threshold`.
///
/// Output groups and their units are sorted by `(file_path, start_line)`.
pub fn group_units(units: &[ChangeUnit], threshold: usize) -> Vec<ChangeUnitGroup> {
    let mut sorted: Vec<&ChangeUnit> = units.iter().collect();
    sorted.sort_by(|a, b| {
        a.file_path
            .cmp(&b.file_path)
            .then(a.range.start_line.cmp(&b.range.start_line))
            .then(a.range.end_line.cmp(&b.range.end_line))
    });

    let mut groups: Vec<ChangeUnitGroup> = Vec::new();
    for unit in sorted {
        let joins = groups.last().is_some_and(|g| {
            g.file_path == unit.file_path
                && g.symbol_name == unit.symbol_name
                && unit.range.start_line.saturating_sub(g.range.end_line + 1) <= threshold
        });
        if let (true, Some(group)) = (joins, groups.last_mut()) {
            group.range = group.range.union(&unit.range);
            group.units.push(unit.clone());
            continue;
        }
        groups.push(ChangeUnitGroup {
            id: format!("group-{}", groups.len() + 1),
            file_path: unit.file_path.clone(),
            symbol_name: unit.symbol_name.clone(),
            range: unit.range,
            units: vec![unit.clone()],
        });
    }
    groups
}
