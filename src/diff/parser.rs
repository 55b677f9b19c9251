use super::hunk::{self, HunkHeader};
use crate::tour::models::{ChangeUnit, LineRange};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::debug;

/// Files the diff parser never turns into units.
#[derive(Debug, Clone)]
pub struct PathFilter {
    exclude: GlobSet,
}

impl PathFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern.as_ref())?);
        }
        Ok(Self {
            exclude: builder.build()?,
        })
    }

    pub fn is_excluded(&self, file_path: &str) -> bool {
        self.exclude.is_match(file_path)
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::new(&["*.md", "*.markdown"]).unwrap_or_else(|_| Self {
            exclude: GlobSet::empty(),
        })
    }
}

struct OpenHunk {
    file_path: String,
    header: HunkHeader,
    lines: Vec<String>,
}

impl OpenHunk {
    fn into_unit(self) -> ChangeUnit {
        let start = self.header.new_start;
        let end = start.saturating_add(self.header.new_len.max(1) - 1);
        let diff_text = self.lines.join("\n");
        ChangeUnit::operation(self.file_path, LineRange::clamped(start, end), diff_text)
    }
}

/// Parse unified diff text into one raw unit per hunk.
///
/// Units are not yet split into definitions. Hunks of deleted files, of
/// files outside `workspace_root` and of excluded files are dropped.
pub fn parse(diff_text: &str, workspace_root: &Path, filter: &PathFilter) -> Vec<ChangeUnit> {
    let mut units = Vec::new();
    let mut current_file: Option<String> = None;
    let mut open: Option<OpenHunk> = None;

    for line in diff_text.lines() {
        if line.starts_with("diff --git ") {
            flush(&mut open, &mut units);
            current_file = git_header_path(line)
                .and_then(|p| normalize_path(&p, workspace_root, filter));
            continue;
        }

        // Inside a hunk every line is content until the next header.
        if open.is_none() {
            if let Some(path) = line.strip_prefix("+++ ") {
                current_file = target_path(path)
                    .and_then(|p| normalize_path(&p, workspace_root, filter));
                continue;
            }
            if line.starts_with("--- ") {
                continue;
            }
        }

        if let Some(header) = hunk::parse_header(line) {
            flush(&mut open, &mut units);
            if let Some(file_path) = &current_file {
                open = Some(OpenHunk {
                    file_path: file_path.clone(),
                    header,
                    lines: vec![line.to_string()],
                });
            }
            continue;
        }

        if let Some(h) = open.as_mut() {
            // Plain `diff -u` output has no `diff --git` line between files.
            if line.starts_with("--- ") && h.is_file_header_position() {
                continue;
            }
            if line.starts_with("+++ ") && h.is_file_header_position() {
                flush(&mut open, &mut units);
                current_file = line
                    .strip_prefix("+++ ")
                    .and_then(target_path)
                    .and_then(|p| normalize_path(&p, workspace_root, filter));
                continue;
            }
            h.lines.push(line.to_string());
        }
    }
    flush(&mut open, &mut units);

    debug!("parsed {} hunks from diff", units.len());
    units
}

fn flush(open: &mut Option<OpenHunk>, units: &mut Vec<ChangeUnit>) {
    if let Some(h) = open.take() {
        units.push(h.into_unit());
    }
}

impl OpenHunk {
    /// Whether the hunk has already received every line its header promised.
    fn is_file_header_position(&self) -> bool {
        let (mut old, mut new) = (0usize, 0usize);
        for line in self.lines.iter().skip(1) {
            match line.chars().next() {
                Some('+') => new = new.saturating_add(1),
                Some('-') => old = old.saturating_add(1),
                Some('\\') => {}
                _ => {
                    old = old.saturating_add(1);
                    new = new.saturating_add(1);
                }
            }
        }
        old >= self.header.old_len && new >= self.header.new_len
    }
}

/// `+++ b/path` → `path`; `/dev/null` → `None`.
fn target_path(raw: &str) -> Option<String> {
    let raw = raw.split('\t').next().unwrap_or(raw).trim();
    if raw == "/dev/null" {
        return None;
    }
    let raw = raw.trim_matches('"');
    Some(raw.strip_prefix("b/").unwrap_or(raw).to_string())
}

/// `diff --git a/x b/y` → `y`, used until a `+++` line overrides it.
fn git_header_path(line: &str) -> Option<String> {
    let rest = line.strip_prefix("diff --git ")?;
    let idx = rest.rfind(" b/")?;
    Some(rest[idx + 3..].trim_matches('"').to_string())
}

/// Forward-slash, workspace-relative path, or `None` when filtered out.
fn normalize_path(path: &str, workspace_root: &Path, filter: &PathFilter) -> Option<String> {
    let path = path.replace('\\', "/");
    let relative = if Path::new(&path).is_absolute() {
        let rel = Path::new(&path).strip_prefix(workspace_root).ok()?;
        rel.to_string_lossy().replace('\\', "/")
    } else {
        path.trim_start_matches("./").to_string()
    };
    if relative.is_empty() || filter.is_excluded(&relative) {
        return None;
    }
    Some(relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tour::models::{ChangeKind, ChangeType};

    const DIFF: &str = "diff --git a/src/app.js b/src/app.js
index 111..222 100644
--- a/src/app.js
+++ b/src/app.js
@@ -1,3 +1,4 @@
 const a = 1;
+const b = 2;
 function f() {
   return a;
@@ -20 +21,2 @@ function g() {
-  old();
+  fresh();
+  more();
diff --git a/README.md b/README.md
--- a/README.md
+++ b/README.md
@@ -1 +1 @@
-# Old
+# New
diff --git a/gone.py b/gone.py
deleted file mode 100644
--- a/gone.py
+++ /dev/null
@@ -1,2 +0,0 @@
-def gone():
-    pass
";

    #[test]
    fn test_parse_hunks() {
        let units = parse(DIFF, Path::new("/repo"), &PathFilter::default());
        assert_eq!(units.len(), 2, "markdown and deleted files are dropped");

        assert_eq!(units[0].file_path, "src/app.js");
        assert_eq!(units[0].range, LineRange::new(1, 4));
        assert_eq!(units[0].change_kind, ChangeKind::Operation);
        assert_eq!(units[0].change_type, ChangeType::Add);
        assert!(units[0].diff_text.starts_with("@@ -1,3 +1,4 @@"));

        assert_eq!(units[1].range, LineRange::new(21, 22));
        assert_eq!(units[1].change_type, ChangeType::Modify);
    }

    #[test]
    fn test_parse_is_idempotent() {
        let a = parse(DIFF, Path::new("/repo"), &PathFilter::default());
        let b = parse(DIFF, Path::new("/repo"), &PathFilter::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_length_hunk_defaults_to_one_line() {
        let diff = "+++ b/x.py\n@@ -4,2 +3,0 @@\n-a\n-b\n";
        let units = parse(diff, Path::new("/repo"), &PathFilter::default());
        assert_eq!(units[0].range, LineRange::new(3, 3));
        assert_eq!(units[0].change_type, ChangeType::Remove);
    }

    #[test]
    fn test_absolute_paths_outside_root_are_dropped() {
        let diff = "+++ /elsewhere/x.py\n@@ -1 +1 @@\n+a\n+++ /repo/pkg/y.py\n@@ -1 +1 @@\n+b\n";
        let units = parse(diff, Path::new("/repo"), &PathFilter::default());
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].file_path, "pkg/y.py");
    }

    #[test]
    fn test_removed_line_looking_like_header_stays_in_hunk() {
        let diff = "+++ b/q.sql\n@@ -1,2 +1,1 @@\n--- a comment\n keep\n";
        let units = parse(diff, Path::new("/repo"), &PathFilter::default());
        assert_eq!(units.len(), 1);
        assert!(units[0].diff_text.contains("--- a comment"));
        assert_eq!(units[0].change_type, ChangeType::Remove);

        let diff = "+++ b/c.js\n@@ -1,1 +1,2 @@\n let i = 0;\n+++i;\n";
        let units = parse(diff, Path::new("/repo"), &PathFilter::default());
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].change_type, ChangeType::Add);
    }

    #[test]
    fn test_overflowing_header_is_dropped() {
        let diff = "+++ b/x.py\n@@ -1 +18446744073709551615,2 @@\n+a = 1\n+b = 2\n";
        let units = parse(diff, Path::new("/repo"), &PathFilter::default());
        assert!(units.is_empty());

        let diff = "+++ b/x.py\n@@ -1 +18446744073709551614 @@\n+a = 1\n+b = 2\n";
        let units = parse(diff, Path::new("/repo"), &PathFilter::default());
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].range, LineRange::single(usize::MAX - 1));
    }

    #[test]
    fn test_malformed_header_attaches_to_open_hunk() {
        let diff = "+++ b/a.js\n@@ -1 +1,2 @@\n+x();\n@@ broken @@\n+y();\n";
        let units = parse(diff, Path::new("/repo"), &PathFilter::default());
        assert_eq!(units.len(), 1);
        assert!(units[0].diff_text.contains("@@ broken @@"));
    }

    #[test]
    fn test_plain_unified_diff_without_git_headers() {
        let diff = "--- a/one.py\n+++ b/one.py\n@@ -1 +1 @@\n-a = 1\n+a = 2\n--- a/two.py\n+++ b/two.py\n@@ -3 +3 @@\n-b = 1\n+b = 2\n";
        let units = parse(diff, Path::new("/repo"), &PathFilter::default());
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].file_path, "one.py");
        assert!(!units[0].diff_text.contains("two.py"));
        assert_eq!(units[1].file_path, "two.py");
        assert_eq!(units[1].range, LineRange::new(3, 3));
    }

    #[test]
    fn test_custom_filter() {
        let filter = PathFilter::new(&["vendor/**"]).unwrap();
        let diff = "+++ b/vendor/lib.js\n@@ -1 +1 @@\n+a\n+++ b/notes.md\n@@ -1 +1 @@\n+b\n";
        let units = parse(diff, Path::new("/repo"), &filter);
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].file_path, "notes.md");
    }
}
