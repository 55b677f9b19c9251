//! Line-level definition signature heuristics.
//!
//! These patterns run on single added lines and only propose candidates;
//! the splitter confirms callable candidates against the syntax tree and
//! decides whether variable candidates are globals.

use crate::analyzer::languages::LanguageFamily;
use crate::tour::models::DefinitionKind;
use regex::Regex;
use std::sync::LazyLock;

static JS_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)")
        .unwrap()
});
static JS_CLASS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:default\s+)?(?:abstract\s+)?class\s+([A-Za-z_$][\w$]*)")
        .unwrap()
});
static JS_BINDING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\s*)(?:export\s+)?(?:declare\s+)?(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*(?::[^=]+)?=(.*)$",
    )
    .unwrap()
});
static TS_INTERFACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:declare\s+)?interface\s+([A-Za-z_$][\w$]*)").unwrap()
});
static TS_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:declare\s+)?type\s+([A-Za-z_$][\w$]*)\s*(?:<[^=]*>)?\s*=")
        .unwrap()
});
static TS_ENUM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:export\s+)?(?:declare\s+)?(?:const\s+)?enum\s+([A-Za-z_$][\w$]*)").unwrap()
});
static ARROW_OR_FUNCTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"=>|\bfunction\b").unwrap());

static PY_DEF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)").unwrap());
static PY_CLASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*class\s+([A-Za-z_]\w*)").unwrap());
static PY_ASSIGN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_]\w*)\s*(?::[^=]+)?=(.*)$").unwrap());

/// Hard keywords; `else: x = 1` would otherwise read as an annotated `else`.
const PY_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try",
    "while", "with", "yield",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub kind: DefinitionKind,
    /// Leading whitespace width of the detection line.
    pub indent: usize,
}

impl Signature {
    fn new(name: &str, kind: DefinitionKind, line: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            indent: indent_width(line),
        }
    }

    pub fn is_variable(&self) -> bool {
        self.kind == DefinitionKind::Variable
    }
}

/// Detect a definition signature on one source line.
pub fn detect(line: &str, family: LanguageFamily) -> Option<Signature> {
    match family {
        LanguageFamily::Script => detect_script(line),
        LanguageFamily::Python => detect_python(line),
    }
}

fn detect_script(line: &str) -> Option<Signature> {
    if let Some(c) = JS_FUNCTION.captures(line) {
        return Some(Signature::new(&c[1], DefinitionKind::Function, line));
    }
    if let Some(c) = JS_CLASS.captures(line) {
        return Some(Signature::new(&c[1], DefinitionKind::Class, line));
    }
    if let Some(c) = TS_INTERFACE.captures(line) {
        return Some(Signature::new(&c[1], DefinitionKind::Interface, line));
    }
    if let Some(c) = TS_ENUM.captures(line) {
        return Some(Signature::new(&c[1], DefinitionKind::Enum, line));
    }
    if let Some(c) = TS_TYPE.captures(line) {
        return Some(Signature::new(&c[1], DefinitionKind::TypeAlias, line));
    }
    if let Some(c) = JS_BINDING.captures(line) {
        let initializer = c.get(3).map_or("", |m| m.as_str());
        if initializer.trim_start().starts_with('=') {
            return None;
        }
        let kind = if ARROW_OR_FUNCTION.is_match(initializer) {
            DefinitionKind::Function
        } else {
            DefinitionKind::Variable
        };
        return Some(Signature::new(&c[2], kind, line));
    }
    None
}

fn detect_python(line: &str) -> Option<Signature> {
    if let Some(c) = PY_DEF.captures(line) {
        return Some(Signature::new(&c[1], DefinitionKind::Function, line));
    }
    if let Some(c) = PY_CLASS.captures(line) {
        return Some(Signature::new(&c[1], DefinitionKind::Class, line));
    }
    // Module-level assignments only: no leading whitespace.
    if let Some(c) = PY_ASSIGN.captures(line) {
        let value = c.get(2).map_or("", |m| m.as_str());
        if value.starts_with('=') || PY_KEYWORDS.contains(&&c[1]) {
            return None;
        }
        let kind = if value.trim_start().starts_with("lambda") {
            DefinitionKind::Function
        } else {
            DefinitionKind::Variable
        };
        return Some(Signature::new(&c[1], kind, line));
    }
    None
}

pub fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

/// Tells blank and comment-only lines apart from lines that carry behavior.
///
/// Lines must be fed in file order: a `*`-led line is a comment only while a
/// `/* ... */` block is open.
#[derive(Debug, Clone)]
pub struct LineClassifier {
    family: Option<LanguageFamily>,
    in_block: bool,
}

impl LineClassifier {
    pub fn new(family: Option<LanguageFamily>) -> Self {
        Self {
            family,
            in_block: false,
        }
    }

    pub fn is_meaningful(&mut self, line: &str) -> bool {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return false;
        }
        match self.family {
            Some(LanguageFamily::Python) => !trimmed.starts_with('#'),
            Some(LanguageFamily::Script) => self.script_code(trimmed),
            None => true,
        }
    }

    /// Whether any code remains outside comments, updating the block state.
    fn script_code(&mut self, mut rest: &str) -> bool {
        let mut code = false;
        loop {
            if self.in_block {
                match rest.find("*/") {
                    Some(end) => {
                        self.in_block = false;
                        rest = &rest[end + 2..];
                    }
                    None => return code,
                }
            }
            let line_comment = rest.find("//");
            let block = rest.find("/*");
            match (line_comment, block) {
                (Some(lc), Some(b)) if lc < b => return code || !rest[..lc].trim().is_empty(),
                (Some(lc), None) => return code || !rest[..lc].trim().is_empty(),
                (_, Some(b)) => {
                    code |= !rest[..b].trim().is_empty();
                    self.in_block = true;
                    rest = &rest[b + 2..];
                }
                (None, None) => return code || !rest.trim().is_empty(),
            }
        }
    }
}

/// Classify `lines` in order; entry `i` tells whether line `i + 1` carries behavior.
pub fn meaningful_lines<'a>(
    lines: impl IntoIterator<Item = &'a str>,
    family: Option<LanguageFamily>,
) -> Vec<bool> {
    let mut classifier = LineClassifier::new(family);
    lines
        .into_iter()
        .map(|line| classifier.is_meaningful(line))
        .collect()
}
