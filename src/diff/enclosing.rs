use super::signatures::indent_width;
use crate::analyzer::languages::LanguageFamily;
use crate::analyzer::syntax::{Analysis, Definition};
use crate::tour::models::{DefinitionKind, LineRange};
use regex::Regex;
use std::sync::LazyLock;

static PY_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:async\s+)?(def|class)\s+([A-Za-z_]\w*)").unwrap());

/// Nearest definition enclosing `range`.
///
/// Uses syntax-tree containment; for Python files without a usable tree it
/// falls back to indentation scanning over the revised text.
pub fn enclosing_definition(
    analysis: &Analysis,
    lines: &[&str],
    range: &LineRange,
    family: Option<LanguageFamily>,
) -> Option<Definition> {
    enclosing_definition_excluding(analysis, lines, range, family, &[])
}

/// Like [`enclosing_definition`], skipping the given syntax-tree definitions.
pub fn enclosing_definition_excluding(
    analysis: &Analysis,
    lines: &[&str],
    range: &LineRange,
    family: Option<LanguageFamily>,
    excluded: &[Definition],
) -> Option<Definition> {
    let innermost = analysis
        .definitions
        .iter()
        .filter(|d| d.range.contains_range(range) && !excluded.contains(d))
        .min_by_key(|d| (d.range.len(), std::cmp::Reverse(d.range.start_line)));
    if let Some(def) = innermost {
        return Some(def.clone());
    }
    if family == Some(LanguageFamily::Python) && analysis.definitions.is_empty() {
        return by_indentation(lines, range.start_line)
            .filter(|d| d.range.contains_range(range));
    }
    None
}

fn is_blank(line: &str) -> bool {
    let t = line.trim();
    t.is_empty() || t.starts_with('#')
}

/// Walk upward to the nearest `def`/`class` whose body contains `line`,
/// then downward to where indentation returns to its level.
pub fn by_indentation(lines: &[&str], line: usize) -> Option<Definition> {
    let idx = line.checked_sub(1)?;
    if idx >= lines.len() {
        return None;
    }

    let ref_idx = (0..=idx).rev().find(|&i| !is_blank(lines[i]))?;
    let own_header = (ref_idx == idx)
        .then(|| PY_HEADER.captures(lines[idx]))
        .flatten()
        .map(|c| (idx, indent_width(lines[idx]), c[1].to_string(), c[2].to_string()));
    let (header_idx, header_indent, keyword, name) = match own_header {
        Some(h) => h,
        None => find_header(lines, ref_idx, indent_width(lines[ref_idx]))?,
    };

    let end_idx = block_end(lines, header_idx, header_indent);

    let classes = enclosing_classes(lines, header_idx, header_indent);
    let container = (!classes.is_empty()).then(|| classes.join("."));
    let kind = match (keyword.as_str(), &container) {
        ("class", _) => DefinitionKind::Class,
        (_, Some(_)) => DefinitionKind::Method,
        _ => DefinitionKind::Function,
    };
    let qualified_name = match &container {
        Some(c) => format!("{c}.{name}"),
        None => name.clone(),
    };

    Some(Definition {
        name,
        qualified_name,
        kind,
        range: LineRange::clamped(header_idx + 1, end_idx + 1),
        container,
    })
}

/// Nearest header above `from_idx` whose indent is below `limit`.
fn find_header(
    lines: &[&str],
    from_idx: usize,
    limit: usize,
) -> Option<(usize, usize, String, String)> {
    let mut limit = limit;
    for i in (0..from_idx).rev() {
        let l = lines[i];
        if is_blank(l) {
            continue;
        }
        let indent = indent_width(l);
        if indent >= limit {
            continue;
        }
        if let Some(c) = PY_HEADER.captures(l) {
            return Some((i, indent, c[1].to_string(), c[2].to_string()));
        }
        limit = indent;
        if limit == 0 {
            return None;
        }
    }
    None
}

fn block_end(lines: &[&str], header_idx: usize, header_indent: usize) -> usize {
    let mut end = header_idx;
    for (i, l) in lines.iter().enumerate().skip(header_idx + 1) {
        if is_blank(l) {
            continue;
        }
        if indent_width(l) <= header_indent {
            break;
        }
        end = i;
    }
    end
}

fn enclosing_classes(lines: &[&str], header_idx: usize, header_indent: usize) -> Vec<String> {
    let mut classes = Vec::new();
    let mut idx = header_idx;
    let mut limit = header_indent;
    while limit > 0 {
        match find_header(lines, idx, limit) {
            Some((i, indent, keyword, name)) => {
                if keyword == "class" {
                    classes.push(name);
                }
                idx = i;
                limit = indent;
            }
            None => break,
        }
    }
    classes.reverse();
    classes
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRC: &str = "import os

class Store:
    def save(self, item):
        if item:
            write(item)
        return True

    def load(self):
        pass

def main():
    s = Store()
    # comment

    s.save(1)
x = 1
";

    fn lines() -> Vec<&'static str> {
        SRC.lines().collect()
    }

    #[test]
    fn test_method_by_indentation() {
        let def = by_indentation(&lines(), 6).unwrap();
        assert_eq!(def.qualified_name, "Store.save");
        assert_eq!(def.kind, DefinitionKind::Method);
        assert_eq!(def.range, LineRange::new(4, 7));
    }

    #[test]
    fn test_function_spanning_blank_and_comment_lines() {
        let def = by_indentation(&lines(), 16).unwrap();
        assert_eq!(def.qualified_name, "main");
        assert_eq!(def.kind, DefinitionKind::Function);
        assert_eq!(def.range, LineRange::new(12, 16));
    }

    #[test]
    fn test_module_level_line_has_no_enclosing() {
        assert!(by_indentation(&lines(), 17).is_none());
        assert!(by_indentation(&lines(), 1).is_none());
    }

    #[test]
    fn test_ast_lookup_preferred() {
        let analysis = Analysis::new(
            vec![Definition {
                name: "f".into(),
                qualified_name: "f".into(),
                kind: DefinitionKind::Function,
                range: LineRange::new(1, 10),
                container: None,
            }],
            vec![],
        );
        let found = enclosing_definition(
            &analysis,
            &lines(),
            &LineRange::new(5, 6),
            Some(LanguageFamily::Python),
        )
        .unwrap();
        assert_eq!(found.name, "f");

        let inner = Definition {
            name: "g".into(),
            qualified_name: "g".into(),
            kind: DefinitionKind::Function,
            range: LineRange::new(4, 6),
            container: None,
        };
        let analysis = Analysis::new(vec![analysis.definitions[0].clone(), inner.clone()], vec![]);
        let range = LineRange::new(5, 5);
        let found = enclosing_definition(&analysis, &lines(), &range, None).unwrap();
        assert_eq!(found.name, "g");
        let found =
            enclosing_definition_excluding(&analysis, &lines(), &range, None, &[inner]).unwrap();
        assert_eq!(found.name, "f");
    }

    #[test]
    fn test_python_fallback_when_tree_is_empty() {
        let found = enclosing_definition(
            &Analysis::default(),
            &lines(),
            &LineRange::new(9, 10),
            Some(LanguageFamily::Python),
        )
        .unwrap();
        assert_eq!(found.qualified_name, "Store.load");
        assert!(enclosing_definition(
            &Analysis::default(),
            &lines(),
            &LineRange::new(9, 10),
            Some(LanguageFamily::Script),
        )
        .is_none());
    }
}
