use super::{ExplainError, Explainer};
use crate::tour::models::StepTarget;

/// Deterministic offline explainer.
///
/// Describes what a step points at without calling any model. Used for
/// `--offline` runs and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderExplainer;

impl Explainer for PlaceholderExplainer {
    fn explain(&self, target: &StepTarget, intent: Option<&str>) -> Result<String, ExplainError> {
        let mut text = match target {
            StepTarget::Unit(unit) => format!(
                "{} {} `{}` in {} (lines {}).",
                capitalize(unit.change_type.describe()),
                unit.change_kind.as_str(),
                unit.label(),
                unit.file_path,
                unit.range
            ),
            StepTarget::Region(region) => format!(
                "Existing code `{}` in {} (lines {}) used by the change.",
                region.label, region.file_path, region.range
            ),
        };
        if let Some(intent) = intent.map(str::trim).filter(|i| !i.is_empty()) {
            text.push_str(&format!(" Intent: {intent}"));
        }
        Ok(text)
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tour::models::{ChangeUnit, CodeRegion, LineRange};

    #[test]
    fn test_placeholder_text() {
        let mut unit = ChangeUnit::operation(
            "src/a.js",
            LineRange::new(3, 4),
            "@@ -3 +3,2 @@\n+a();\n+b();".to_string(),
        );
        unit.qualified_name = Some("run".into());
        let text = PlaceholderExplainer
            .explain(&StepTarget::Unit(unit), Some("  speed up  "))
            .unwrap();
        assert_eq!(
            text,
            "Added operation `run` in src/a.js (lines 3-4). Intent: speed up"
        );

        let region = CodeRegion {
            file_path: "src/b.js".into(),
            range: LineRange::new(1, 9),
            label: "helper".into(),
        };
        let text = PlaceholderExplainer
            .explain(&StepTarget::Region(region), None)
            .unwrap();
        assert!(text.starts_with("Existing code `helper`"));
    }
}
