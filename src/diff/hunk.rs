use regex::Regex;
use std::sync::LazyLock;

static HUNK_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
}

/// Parse an `@@ -a,b +c,d @@` header. A missing length defaults to 1.
///
/// Headers whose numbers do not fit, or whose `start + len` overflows, are
/// not headers.
pub fn parse_header(line: &str) -> Option<HunkHeader> {
    let caps = HUNK_HEADER.captures(line)?;
    let num = |i: usize, default: usize| match caps.get(i) {
        Some(m) => m.as_str().parse::<usize>().ok(),
        None => Some(default),
    };
    let header = HunkHeader {
        old_start: num(1, 0)?,
        old_len: num(2, 1)?,
        new_start: num(3, 0)?,
        new_len: num(4, 1)?,
    };
    header.old_start.checked_add(header.old_len)?;
    header.new_start.checked_add(header.new_len)?;
    Some(header)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineMarker {
    Context,
    Added,
    Removed,
}

/// One content line of a hunk, addressed on the revised side.
///
/// Removed lines carry the revised line they sit in front of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkLine {
    pub marker: LineMarker,
    pub new_line: usize,
    pub old_line: usize,
    pub text: String,
    pub raw: String,
}

/// Replay the `@@` counters of a hunk's text and address every content line.
///
/// Context and added lines advance the revised-side counter, removed lines do
/// not. Lines before the first header are ignored.
pub fn replay(diff_text: &str) -> Vec<HunkLine> {
    let mut lines = Vec::new();
    let mut counters: Option<(usize, usize)> = None;

    for raw in diff_text.lines() {
        if let Some(header) = parse_header(raw) {
            counters = Some((header.old_start.max(1), header.new_start.max(1)));
            continue;
        }
        let Some((old, new)) = counters.as_mut() else {
            continue;
        };

        let (marker, text) = match raw.chars().next() {
            Some('+') => (LineMarker::Added, &raw[1..]),
            Some('-') => (LineMarker::Removed, &raw[1..]),
            Some(' ') => (LineMarker::Context, &raw[1..]),
            // "\ No newline at end of file"
            Some('\\') => continue,
            // Some tools strip the leading space of blank context lines.
            None => (LineMarker::Context, ""),
            Some(_) => continue,
        };

        lines.push(HunkLine {
            marker,
            new_line: *new,
            old_line: *old,
            text: text.to_string(),
            raw: raw.to_string(),
        });
        if marker != LineMarker::Removed {
            *new = new.saturating_add(1);
        }
        if marker != LineMarker::Added {
            *old = old.saturating_add(1);
        }
    }

    lines
}

/// Re-emit a subset of hunk lines as a self-contained hunk with a fresh header.
///
/// The subset must be contiguous on both sides, which holds for any slice of
/// a hunk selected by a revised-side line range.
pub fn render(lines: &[&HunkLine]) -> String {
    let Some(first) = lines.first() else {
        return String::new();
    };
    let old_len = lines.iter().filter(|l| l.marker != LineMarker::Added).count();
    let new_len = lines.iter().filter(|l| l.marker != LineMarker::Removed).count();
    let mut out = format!(
        "@@ -{},{} +{},{} @@",
        first.old_line, old_len, first.new_line, new_len
    );
    for line in lines {
        out.push('\n');
        out.push_str(&line.raw);
    }
    out
}

/// Added lines with their revised line numbers.
pub fn added_lines(lines: &[HunkLine]) -> Vec<&HunkLine> {
    lines
        .iter()
        .filter(|l| l.marker == LineMarker::Added)
        .collect()
}
