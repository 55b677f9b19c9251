use super::languages::LanguageConfig;
use crate::tour::models::{DefinitionKind, LineRange};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, warn};
use tree_sitter::{Node, Parser, Query, QueryCursor, StreamingIterator};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub name: String,
    /// Dotted path through enclosing classes, e.g. `Cart.total`.
    pub qualified_name: String,
    pub kind: DefinitionKind,
    pub range: LineRange,
    pub container: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub name: String,
    pub qualified_name: Option<String>,
    pub range: LineRange,
}

/// Definitions and calls extracted from one version of one file.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub definitions: Vec<Definition>,
    pub by_name: HashMap<String, Vec<Definition>>,
    pub by_qualified: HashMap<String, Vec<Definition>>,
    pub calls: Vec<CallSite>,
}

impl Analysis {
    pub fn new(definitions: Vec<Definition>, calls: Vec<CallSite>) -> Self {
        let mut by_name: HashMap<String, Vec<Definition>> = HashMap::new();
        let mut by_qualified: HashMap<String, Vec<Definition>> = HashMap::new();
        for def in &definitions {
            by_name.entry(def.name.clone()).or_default().push(def.clone());
            by_qualified
                .entry(def.qualified_name.clone())
                .or_default()
                .push(def.clone());
        }
        Self {
            definitions,
            by_name,
            by_qualified,
            calls,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty() && self.calls.is_empty()
    }

    /// Innermost definition whose range contains `line`.
    pub fn innermost_at(&self, line: usize) -> Option<&Definition> {
        self.definitions
            .iter()
            .filter(|d| d.range.contains(line))
            .min_by_key(|d| (d.range.len(), std::cmp::Reverse(d.range.start_line)))
    }

    /// Definitions starting exactly on `line`.
    pub fn starting_at(&self, line: usize) -> impl Iterator<Item = &Definition> {
        self.definitions
            .iter()
            .filter(move |d| d.range.start_line == line)
    }

    /// Qualified-name lookup first, then simple name.
    pub fn resolve(&self, name: &str, qualified_name: Option<&str>) -> &[Definition] {
        if let Some(found) = qualified_name.and_then(|q| self.by_qualified.get(q)) {
            return found;
        }
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

const IGNORED_CALLEES: &[&str] = &["print", "len", "range", "require", "super", "isinstance"];

struct CompiledLanguage {
    parser: Parser,
    definitions: Query,
    calls: Query,
}

/// Multi-language definition/call extractor.
///
/// Grammars and queries are compiled lazily, once per language, and
/// results are memoized per `(file_path, source)` for the lifetime of the
/// analyzer. An analyzer is meant to live for exactly one build.
#[derive(Default)]
pub struct SyntaxAnalyzer {
    languages: HashMap<&'static str, Option<CompiledLanguage>>,
    results: HashMap<(String, u64), Arc<Analysis>>,
}

impl SyntaxAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Analyze one file version. Never fails: unsupported or unparsable
    /// input yields an empty analysis.
    pub fn analyze(&mut self, file_path: &str, source: &str) -> Arc<Analysis> {
        let key = (file_path.to_string(), content_hash(source));
        if let Some(hit) = self.results.get(&key) {
            return Arc::clone(hit);
        }

        let analysis = Arc::new(self.analyze_uncached(file_path, source));
        self.results.insert(key, Arc::clone(&analysis));
        analysis
    }

    fn analyze_uncached(&mut self, file_path: &str, source: &str) -> Analysis {
        let Some(config) = LanguageConfig::for_path(file_path) else {
            return Analysis::default();
        };
        let Some(compiled) = self.compiled(config) else {
            return Analysis::default();
        };

        let Some(tree) = compiled.parser.parse(source, None) else {
            warn!("{file_path}: parse failed, treating file as operation-only");
            return Analysis::default();
        };
        let root = tree.root_node();
        let bytes = source.as_bytes();

        let definitions = extract_definitions(root, bytes, &compiled.definitions);
        let calls = extract_calls(root, bytes, &compiled.calls);
        debug!(
            "{file_path}: {} definitions, {} calls",
            definitions.len(),
            calls.len()
        );
        Analysis::new(definitions, calls)
    }

    fn compiled(&mut self, config: LanguageConfig) -> Option<&mut CompiledLanguage> {
        let name = config.name;
        self.languages
            .entry(name)
            .or_insert_with(|| match compile(config) {
                Ok(c) => Some(c),
                Err(e) => {
                    warn!("{name}: grammar unavailable ({e}), files will not be analyzed");
                    None
                }
            })
            .as_mut()
    }
}

fn compile(config: LanguageConfig) -> Result<CompiledLanguage, Box<dyn std::error::Error>> {
    let mut parser = Parser::new();
    parser.set_language(&config.language)?;
    let definitions = Query::new(&config.language, config.definition_query)?;
    let calls = Query::new(&config.language, config.call_query)?;
    Ok(CompiledLanguage {
        parser,
        definitions,
        calls,
    })
}

fn content_hash(source: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    source.hash(&mut hasher);
    hasher.finish()
}

fn extract_definitions(root: Node, source: &[u8], query: &Query) -> Vec<Definition> {
    let mut cursor = QueryCursor::new();
    let mut definitions = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let mut matches = cursor.matches(query, root, source);
    while let Some(m) = matches.next() {
        let mut main_node = None;
        let mut kind = None;
        let mut name = String::new();

        for cap in m.captures {
            let capture_name = query.capture_names()[cap.index as usize];
            match capture_name {
                "name" => {
                    if let Ok(text) = cap.node.utf8_text(source) {
                        name = text.to_string();
                    }
                }
                other => {
                    main_node = Some(cap.node);
                    kind = capture_kind(other);
                }
            }
        }

        let (Some(node), Some(mut kind)) = (main_node, kind) else {
            continue;
        };
        if name.is_empty() {
            continue;
        }

        let key = (node.start_byte(), node.end_byte());
        if !seen.insert(key) {
            continue;
        }

        let container = enclosing_class_path(node, source);
        if kind == DefinitionKind::Function && container.is_some() && is_class_member(node) {
            kind = DefinitionKind::Method;
        }
        let qualified_name = match &container {
            Some(c) => format!("{c}.{name}"),
            None => name.clone(),
        };

        definitions.push(Definition {
            name,
            qualified_name,
            kind,
            range: definition_range(node),
            container,
        });
    }

    definitions.sort_by_key(|d| (d.range.start_line, std::cmp::Reverse(d.range.end_line)));
    definitions
}

fn capture_kind(capture_name: &str) -> Option<DefinitionKind> {
    match capture_name {
        "function" => Some(DefinitionKind::Function),
        "method" => Some(DefinitionKind::Method),
        "class" => Some(DefinitionKind::Class),
        "interface" => Some(DefinitionKind::Interface),
        "type" => Some(DefinitionKind::TypeAlias),
        "enum" => Some(DefinitionKind::Enum),
        _ => None,
    }
}

/// Start line of the node through the end of its body (or its own end).
fn definition_range(node: Node) -> LineRange {
    let start = node.start_position().row + 1;
    let body_end = node
        .child_by_field_name("body")
        .or_else(|| {
            node.child_by_field_name("value")
                .and_then(|v| v.child_by_field_name("body"))
        })
        .map(|b| b.end_position().row + 1);
    let end = body_end.unwrap_or(node.end_position().row + 1);
    LineRange::clamped(start, end)
}

fn is_class_node(kind: &str) -> bool {
    matches!(
        kind,
        "class_declaration" | "abstract_class_declaration" | "class_definition" | "class"
    )
}

/// Python functions directly inside a class body are methods.
fn is_class_member(node: Node) -> bool {
    let mut parent = node.parent();
    while let Some(p) = parent {
        match p.kind() {
            "block" | "decorated_definition" | "class_body" => parent = p.parent(),
            kind => return is_class_node(kind),
        }
    }
    false
}

/// Dotted names of all classes enclosing `node`, outermost first.
fn enclosing_class_path(node: Node, source: &[u8]) -> Option<String> {
    let mut names = Vec::new();
    let mut parent = node.parent();
    while let Some(p) = parent {
        if is_class_node(p.kind()) {
            if let Some(name) = p
                .child_by_field_name("name")
                .and_then(|n| n.utf8_text(source).ok())
            {
                names.push(name.to_string());
            }
        }
        parent = p.parent();
    }
    if names.is_empty() {
        return None;
    }
    names.reverse();
    Some(names.join("."))
}

fn extract_calls(root: Node, source: &[u8], query: &Query) -> Vec<CallSite> {
    let mut cursor = QueryCursor::new();
    let mut calls = Vec::new();
    let mut seen = std::collections::HashSet::new();

    let mut matches = cursor.matches(query, root, source);
    while let Some(m) = matches.next() {
        let mut callee = None;
        let mut call = None;
        for cap in m.captures {
            match query.capture_names()[cap.index as usize] {
                "callee" => callee = Some(cap.node),
                "call" => call = Some(cap.node),
                _ => {}
            }
        }
        let (Some(callee), Some(call)) = (callee, call) else {
            continue;
        };

        let Some(mut segments) = callee_segments(callee, source) else {
            continue;
        };
        // `self.x()` / `this.x()` resolve against the enclosing class.
        if segments.len() > 1 && matches!(segments[0].as_str(), "self" | "this") {
            if let Some(class_path) = enclosing_class_path(call, source) {
                segments[0] = class_path;
            }
        }

        let Some(name) = segments.last().cloned() else {
            continue;
        };
        if IGNORED_CALLEES.contains(&name.as_str()) || name == "this" || name == "self" {
            continue;
        }
        let qualified_name = (segments.len() > 1).then(|| segments.join("."));
        let range = LineRange::clamped(
            call.start_position().row + 1,
            call.end_position().row + 1,
        );

        if seen.insert((call.start_byte(), call.end_byte())) {
            calls.push(CallSite {
                name,
                qualified_name,
                range,
            });
        }
    }

    calls.sort_by_key(|c| (c.range.start_line, c.range.end_line));
    calls
}

/// Flatten a callee expression into dotted segments; `None` for complex callees.
fn callee_segments(node: Node, source: &[u8]) -> Option<Vec<String>> {
    match node.kind() {
        "identifier" | "property_identifier" | "this" | "type_identifier" => {
            Some(vec![node.utf8_text(source).ok()?.to_string()])
        }
        "member_expression" => {
            let mut segments = callee_segments(node.child_by_field_name("object")?, source)?;
            segments.push(
                node.child_by_field_name("property")?
                    .utf8_text(source)
                    .ok()?
                    .to_string(),
            );
            Some(segments)
        }
        "attribute" => {
            let mut segments = callee_segments(node.child_by_field_name("object")?, source)?;
            segments.push(
                node.child_by_field_name("attribute")?
                    .utf8_text(source)
                    .ok()?
                    .to_string(),
            );
            Some(segments)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find<'a>(analysis: &'a Analysis, qualified: &str) -> &'a Definition {
        analysis
            .definitions
            .iter()
            .find(|d| d.qualified_name == qualified)
            .unwrap_or_else(|| panic!("missing {qualified}: {:?}", analysis.definitions))
    }

    #[test]
    fn test_analyze_javascript() {
        let mut analyzer = SyntaxAnalyzer::new();
        let source = r#"function helper(x) {
  return x + 1;
}

const double = (x) => {
  return x * 2;
};

class Cart {
  total() {
    return this.sum() + helper(1);
  }

  sum() {
    return 0;
  }
}
"#;
        let analysis = analyzer.analyze("src/cart.js", source);

        let helper = find(&analysis, "helper");
        assert_eq!(helper.kind, DefinitionKind::Function);
        assert_eq!(helper.range, LineRange::new(1, 3));

        let double = find(&analysis, "double");
        assert_eq!(double.kind, DefinitionKind::Function);
        assert_eq!(double.range, LineRange::new(5, 7));

        let cart = find(&analysis, "Cart");
        assert_eq!(cart.kind, DefinitionKind::Class);
        assert_eq!(cart.range, LineRange::new(9, 17));

        let total = find(&analysis, "Cart.total");
        assert_eq!(total.kind, DefinitionKind::Method);
        assert_eq!(total.container.as_deref(), Some("Cart"));
        assert_eq!(total.range, LineRange::new(10, 12));

        let sum_call = analysis.calls.iter().find(|c| c.name == "sum").unwrap();
        assert_eq!(sum_call.qualified_name.as_deref(), Some("Cart.sum"));
        assert_eq!(sum_call.range.start_line, 11);
        assert!(analysis.calls.iter().any(|c| c.name == "helper" && c.qualified_name.is_none()));

        assert_eq!(analysis.resolve("sum", Some("Cart.sum")).len(), 1);
        assert_eq!(analysis.by_name["helper"].len(), 1);
    }

    #[test]
    fn test_analyze_python_methods_and_self_calls() {
        let mut analyzer = SyntaxAnalyzer::new();
        let source = r#"class Worker:
    def run(self):
        self.step()
        os.path.join("a", "b")

    def step(self):
        pass


def main():
    Worker().run()
"#;
        let analysis = analyzer.analyze("pkg/worker.py", source);

        let run = find(&analysis, "Worker.run");
        assert_eq!(run.kind, DefinitionKind::Method);
        assert_eq!(run.range, LineRange::new(2, 4));
        let main = find(&analysis, "main");
        assert_eq!(main.kind, DefinitionKind::Function);
        assert_eq!(main.container, None);

        let step_call = analysis.calls.iter().find(|c| c.name == "step").unwrap();
        assert_eq!(step_call.qualified_name.as_deref(), Some("Worker.step"));
        let join_call = analysis.calls.iter().find(|c| c.name == "join").unwrap();
        assert_eq!(join_call.qualified_name.as_deref(), Some("os.path.join"));
        // `Worker().run()` has a call-expression callee and is skipped.
        assert!(!analysis.calls.iter().any(|c| c.name == "run"));
        assert!(analysis.calls.iter().any(|c| c.name == "Worker"));
    }

    #[test]
    fn test_innermost_at() {
        let mut analyzer = SyntaxAnalyzer::new();
        let source = "class A:\n    def f(self):\n        return 1\n";
        let analysis = analyzer.analyze("a.py", source);
        assert_eq!(analysis.innermost_at(3).unwrap().qualified_name, "A.f");
        assert_eq!(analysis.innermost_at(1).unwrap().qualified_name, "A");
        assert!(analysis.innermost_at(9).is_none());
    }

    #[test]
    fn test_unsupported_extension_is_empty() {
        let mut analyzer = SyntaxAnalyzer::new();
        let analysis = analyzer.analyze("main.go", "func main() {}\n");
        assert!(analysis.is_empty());
    }

    #[test]
    fn test_garbage_source_does_not_panic() {
        let mut analyzer = SyntaxAnalyzer::new();
        let analysis = analyzer.analyze("broken.ts", "function ((( {{{ class");
        assert!(analysis.definitions.iter().all(|d| d.range.start_line >= 1));
    }

    #[test]
    fn test_memoized_per_source() {
        let mut analyzer = SyntaxAnalyzer::new();
        let a = analyzer.analyze("x.py", "def f():\n    pass\n");
        let b = analyzer.analyze("x.py", "def f():\n    pass\n");
        assert!(Arc::ptr_eq(&a, &b));
        let c = analyzer.analyze("x.py", "def g():\n    pass\n");
        assert!(!Arc::ptr_eq(&a, &c));
    }
}
