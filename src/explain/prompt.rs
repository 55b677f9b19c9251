use crate::tour::models::StepTarget;

pub const SYSTEM_PROMPT: &str = "You are walking a reviewer through a code change one step at a time. \
Explain the given step in plain prose, at most a short paragraph. \
Say what the code does and how it fits the change. Do not repeat the code.";

/// Cap on diff text sent per step.
const MAX_DIFF_CHARS: usize = 6000;

/// User message for one step.
pub fn build(target: &StepTarget, intent: Option<&str>) -> String {
    let mut out = String::new();
    match target {
        StepTarget::Unit(unit) => {
            out.push_str(&format!(
                "File: {}\nLines: {}\nKind: {} ({})\n",
                unit.file_path,
                unit.range,
                unit.change_kind.as_str(),
                unit.change_type.describe()
            ));
            if let Some(symbol) = unit.qualified_name.as_ref().or(unit.symbol_name.as_ref()) {
                out.push_str(&format!("Symbol: {symbol}\n"));
            }
            if !unit.related_calls.is_empty() {
                let names: Vec<&str> = unit.related_calls.iter().map(|c| c.name.as_str()).collect();
                out.push_str(&format!("Calls: {}\n", names.join(", ")));
            }
            out.push_str("\nDiff:\n");
            out.push_str(truncate(&unit.diff_text, MAX_DIFF_CHARS));
            out.push('\n');
        }
        StepTarget::Region(region) => {
            out.push_str(&format!(
                "Background for the change: existing code `{}` in {} (lines {}).\n\
                 Explain what it does so later steps that use it make sense.\n",
                region.label, region.file_path, region.range
            ));
        }
    }
    if let Some(intent) = intent.map(str::trim).filter(|i| !i.is_empty()) {
        out.push_str(&format!("\nAuthor's intent: {intent}\n"));
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tour::models::{CallReference, ChangeUnit, LineRange};

    #[test]
    fn test_unit_prompt() {
        let mut unit = ChangeUnit::operation(
            "a.py",
            LineRange::new(2, 2),
            "@@ -2 +2 @@\n-x()\n+helper()".to_string(),
        );
        unit.qualified_name = Some("main".into());
        unit.related_calls.push(CallReference {
            name: "helper".into(),
            qualified_name: None,
            range: LineRange::new(2, 2),
        });
        let prompt = build(&StepTarget::Unit(unit), Some("cleanup"));
        assert!(prompt.contains("File: a.py\nLines: 2-2\nKind: operation (modified)"));
        assert!(prompt.contains("Symbol: main"));
        assert!(prompt.contains("Calls: helper"));
        assert!(prompt.contains("+helper()"));
        assert!(prompt.ends_with("Author's intent: cleanup\n"));
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ab", 5), "ab");
    }
}
