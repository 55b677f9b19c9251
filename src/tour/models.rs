use serde::{Deserialize, Serialize};

/// A 1-based, inclusive line span in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRange {
    pub start_line: usize,
    pub end_line: usize,
}

impl LineRange {
    /// Build a range that is expected to be well-formed.
    ///
    /// Inverted ranges are a bug at the call site: debug builds assert,
    /// release builds clamp `end_line` up to `start_line`.
    pub fn new(start_line: usize, end_line: usize) -> Self {
        debug_assert!(
            start_line >= 1 && start_line <= end_line,
            "invalid line range {start_line}-{end_line}"
        );
        Self::clamped(start_line, end_line)
    }

    /// Build a range from untrusted input (e.g. diff headers), clamping silently.
    pub fn clamped(start_line: usize, end_line: usize) -> Self {
        let start_line = start_line.max(1);
        Self {
            start_line,
            end_line: end_line.max(start_line),
        }
    }

    pub fn single(line: usize) -> Self {
        Self::clamped(line, line)
    }

    pub fn contains(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    pub fn contains_range(&self, other: &LineRange) -> bool {
        self.start_line <= other.start_line && other.end_line <= self.end_line
    }

    pub fn overlaps(&self, other: &LineRange) -> bool {
        self.start_line <= other.end_line && other.start_line <= self.end_line
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.end_line - self.start_line + 1
    }

    /// Smallest range covering both.
    pub fn union(&self, other: &LineRange) -> LineRange {
        LineRange {
            start_line: self.start_line.min(other.start_line),
            end_line: self.end_line.max(other.end_line),
        }
    }
}

impl std::fmt::Display for LineRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start_line, self.end_line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Definition,
    Operation,
    Global,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Definition => "definition",
            ChangeKind::Operation => "operation",
            ChangeKind::Global => "global",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Add,
    Remove,
    Modify,
    Unknown,
}

impl ChangeType {
    /// Classify a slice of hunk text by its `+` / `-` content lines.
    ///
    /// Only `@@` headers are skipped; unit text never carries file headers,
    /// so `+++i;` is an added `++i;`.
    pub fn from_diff_text(diff_text: &str) -> Self {
        let mut added = false;
        let mut removed = false;
        for line in diff_text.lines() {
            if line.starts_with("@@") {
                continue;
            }
            if line.starts_with('+') {
                added = true;
            } else if line.starts_with('-') {
                removed = true;
            }
        }
        match (added, removed) {
            (true, true) => ChangeType::Modify,
            (true, false) => ChangeType::Add,
            (false, true) => ChangeType::Remove,
            (false, false) => ChangeType::Unknown,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            ChangeType::Add => "added",
            ChangeType::Remove => "removed",
            ChangeType::Modify => "modified",
            ChangeType::Unknown => "existing",
        }
    }
}

/// Kind of a source-level definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    Function,
    Method,
    Class,
    Interface,
    Enum,
    #[serde(rename = "type")]
    TypeAlias,
    Variable,
}

impl DefinitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefinitionKind::Function => "function",
            DefinitionKind::Method => "method",
            DefinitionKind::Class => "class",
            DefinitionKind::Interface => "interface",
            DefinitionKind::Enum => "enum",
            DefinitionKind::TypeAlias => "type",
            DefinitionKind::Variable => "variable",
        }
    }

    /// Function-like definitions own executable bodies.
    pub fn is_callable(&self) -> bool {
        matches!(self, DefinitionKind::Function | DefinitionKind::Method)
    }
}

/// A call site that resolved to a known definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    pub range: LineRange,
}

/// A definition declared inside an operational edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntroducedDefinition {
    pub name: String,
    pub qualified_name: String,
    pub kind: DefinitionKind,
    pub range: LineRange,
}

/// A location without diff content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRegion {
    pub file_path: String,
    pub range: LineRange,
    pub label: String,
}

/// One independently explainable slice of a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeUnit {
    pub file_path: String,
    pub range: LineRange,
    pub diff_text: String,
    pub change_kind: ChangeKind,
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_type: Option<DefinitionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    /// Kind of the element the unit is anchored to (its own definition, or the
    /// enclosing one for operations).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_kind: Option<DefinitionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub introduced_definitions: Vec<IntroducedDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_calls: Vec<CallReference>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub background_regions: Vec<CodeRegion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
}

impl ChangeUnit {
    /// A bare operation unit with no identification metadata.
    pub fn operation(file_path: impl Into<String>, range: LineRange, diff_text: String) -> Self {
        let change_type = ChangeType::from_diff_text(&diff_text);
        Self {
            file_path: file_path.into(),
            range,
            diff_text,
            change_kind: ChangeKind::Operation,
            change_type,
            definition_name: None,
            definition_type: None,
            qualified_name: None,
            container_name: None,
            element_kind: None,
            symbol_name: None,
            introduced_definitions: Vec::new(),
            related_calls: Vec::new(),
            background_regions: Vec::new(),
            segment_id: None,
        }
    }

    /// Display label: qualified name, then symbol, then `file:range`.
    pub fn label(&self) -> String {
        self.qualified_name
            .clone()
            .or_else(|| self.symbol_name.clone())
            .or_else(|| self.definition_name.clone())
            .unwrap_or_else(|| format!("{}:{}", self.file_path, self.range))
    }

    /// Name used for cross-reference lookups (`definition_name`, else `symbol_name`).
    pub fn simple_name(&self) -> Option<&str> {
        self.definition_name
            .as_deref()
            .or(self.symbol_name.as_deref())
    }
}

/// Stable identity of a definition's extent, shared by every unit inside it.
pub fn segment_id(file_path: &str, range: &LineRange) -> String {
    format!("{file_path}|{}-{}", range.start_line, range.end_line)
}

/// Derive the container (class / namespace) from a dotted qualified name.
pub fn container_of(qualified_name: &str) -> Option<String> {
    qualified_name
        .rsplit_once('.')
        .map(|(container, _)| container.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Background,
    Main,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Background => "background",
            StepKind::Main => "main",
        }
    }
}

/// What a step points at. Main steps target units, background steps regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StepTarget {
    Unit(ChangeUnit),
    Region(CodeRegion),
}

impl StepTarget {
    pub fn file_path(&self) -> &str {
        match self {
            StepTarget::Unit(u) => &u.file_path,
            StepTarget::Region(r) => &r.file_path,
        }
    }

    pub fn range(&self) -> LineRange {
        match self {
            StepTarget::Unit(u) => u.range,
            StepTarget::Region(r) => r.range,
        }
    }

    pub fn as_unit(&self) -> Option<&ChangeUnit> {
        match self {
            StepTarget::Unit(u) => Some(u),
            StepTarget::Region(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourStep {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub target: StepTarget,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl TourStep {
    pub fn main(id: impl Into<String>, unit: ChangeUnit) -> Self {
        Self {
            id: id.into(),
            kind: StepKind::Main,
            target: StepTarget::Unit(unit),
            explanation: String::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn background(id: impl Into<String>, region: CodeRegion) -> Self {
        Self {
            id: id.into(),
            kind: StepKind::Background,
            target: StepTarget::Region(region),
            explanation: String::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn unit(&self) -> Option<&ChangeUnit> {
        self.target.as_unit()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeUnitGroup {
    pub id: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol_name: Option<String>,
    pub range: LineRange,
    pub units: Vec<ChangeUnit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Operation,
    Definition,
    Global,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeKind {
    #[serde(rename = "op-to-def")]
    OpToDef,
    #[serde(rename = "def-to-def")]
    DefToDef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourGraphNode {
    pub id: String,
    pub kind: NodeKind,
    pub label: String,
    pub file_path: String,
    pub range: LineRange,
    pub step_ids: Vec<String>,
}

/// Directed edge from the node explained first to the node that uses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourGraphEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TourGraph {
    pub nodes: Vec<TourGraphNode>,
    pub edges: Vec<TourGraphEdge>,
}

/// The externally exposed result of one build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tour {
    pub steps: Vec<TourStep>,
    pub graph: TourGraph,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_type_from_diff_text() {
        assert_eq!(ChangeType::from_diff_text("+a\n-b"), ChangeType::Modify);
        assert_eq!(ChangeType::from_diff_text("@@ -1 +1 @@\n+a\n c"), ChangeType::Add);
        assert_eq!(ChangeType::from_diff_text("-a"), ChangeType::Remove);
        assert_eq!(ChangeType::from_diff_text(" ctx"), ChangeType::Unknown);
    }

    #[test]
    fn test_change_type_counts_header_lookalike_lines() {
        assert_eq!(
            ChangeType::from_diff_text("@@ -1,1 +1,2 @@\n let i = 0;\n+++i;"),
            ChangeType::Add
        );
        assert_eq!(
            ChangeType::from_diff_text("@@ -1,2 +1,1 @@\n--- note\n SELECT 1;"),
            ChangeType::Remove
        );
    }

    #[test]
    fn test_line_range_clamped() {
        let r = LineRange::clamped(0, 0);
        assert_eq!(r, LineRange { start_line: 1, end_line: 1 });
        let r = LineRange::clamped(9, 3);
        assert_eq!(r.end_line, 9);
    }

    #[test]
    fn test_line_range_overlap_and_union() {
        let a = LineRange::new(3, 6);
        let b = LineRange::new(6, 9);
        let c = LineRange::new(10, 12);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(a.union(&c), LineRange::new(3, 12));
        assert!(LineRange::new(1, 20).contains_range(&b));
        assert_eq!(b.len(), 4);
    }

    #[test]
    fn test_segment_id_and_container() {
        assert_eq!(segment_id("src/a.js", &LineRange::new(2, 8)), "src/a.js|2-8");
        assert_eq!(container_of("Cart.total").as_deref(), Some("Cart"));
        assert_eq!(container_of("a.b.c").as_deref(), Some("a.b"));
        assert_eq!(container_of("total"), None);
    }

    #[test]
    fn test_step_target_serializes_with_kind_tag() {
        let step = TourStep::background(
            "bg-1",
            CodeRegion {
                file_path: "a.py".to_string(),
                range: LineRange::new(1, 2),
                label: "helper".to_string(),
            },
        );
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "background");
        assert_eq!(json["target"]["kind"], "region");
        assert_eq!(json["target"]["range"]["startLine"], 1);
    }
}
