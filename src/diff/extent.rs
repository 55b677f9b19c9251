use crate::analyzer::languages::LanguageFamily;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Single,
    Double,
    Backtick,
    TripleSingle,
    TripleDouble,
}

impl Quote {
    fn spans_lines(self) -> bool {
        matches!(self, Quote::Backtick | Quote::TripleSingle | Quote::TripleDouble)
    }
}

/// Find the last line (1-based) of the expression that starts on `start_line`.
///
/// Scans forward balancing `()`, `[]`, `{}` while skipping string contents and
/// comments, and for Python follows trailing-backslash continuations. Runs to
/// the end of the file when brackets never balance.
pub fn expression_end(lines: &[&str], start_line: usize, family: LanguageFamily) -> usize {
    let start_idx = start_line.saturating_sub(1);
    if start_idx >= lines.len() {
        return start_line.max(1);
    }

    let mut depth: i64 = 0;
    let mut quote: Option<Quote> = None;

    for (idx, line) in lines.iter().enumerate().skip(start_idx) {
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if let Some(q) = quote {
                match (q, c) {
                    (_, '\\') => i += 1,
                    (Quote::Single, '\'') | (Quote::Double, '"') | (Quote::Backtick, '`') => {
                        quote = None
                    }
                    (Quote::TripleSingle, '\'') if starts_with(&chars, i, "'''") => {
                        quote = None;
                        i += 2;
                    }
                    (Quote::TripleDouble, '"') if starts_with(&chars, i, "\"\"\"") => {
                        quote = None;
                        i += 2;
                    }
                    _ => {}
                }
                i += 1;
                continue;
            }

            match c {
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth -= 1,
                '#' if family == LanguageFamily::Python => break,
                '/' if family == LanguageFamily::Script && starts_with(&chars, i, "//") => break,
                '"' if family == LanguageFamily::Python && starts_with(&chars, i, "\"\"\"") => {
                    quote = Some(Quote::TripleDouble);
                    i += 2;
                }
                '\'' if family == LanguageFamily::Python && starts_with(&chars, i, "'''") => {
                    quote = Some(Quote::TripleSingle);
                    i += 2;
                }
                '"' => quote = Some(Quote::Double),
                '\'' => quote = Some(Quote::Single),
                '`' if family == LanguageFamily::Script => quote = Some(Quote::Backtick),
                _ => {}
            }
            i += 1;
        }

        // Unterminated single-line strings end with the line.
        if quote.is_some_and(|q| !q.spans_lines()) {
            quote = None;
        }

        let continued = family == LanguageFamily::Python && line.trim_end().ends_with('\\');
        if depth <= 0 && quote.is_none() && !continued {
            return idx + 1;
        }
    }

    lines.len()
}

fn starts_with(chars: &[char], at: usize, pattern: &str) -> bool {
    let mut i = at;
    for p in pattern.chars() {
        if chars.get(i) != Some(&p) {
            return false;
        }
        i += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn end(src: &str, start: usize, family: LanguageFamily) -> usize {
        let lines: Vec<&str> = src.lines().collect();
        expression_end(&lines, start, family)
    }

    #[test]
    fn test_single_line_constant() {
        assert_eq!(end("const MAX = 10;\nfoo();", 1, LanguageFamily::Script), 1);
    }

    #[test]
    fn test_multiline_object_with_braces_in_strings() {
        let src = "const cfg = {\n  open: '{',\n  nested: [1, 2],\n  s: \"}\",\n};\nrun();";
        assert_eq!(end(src, 1, LanguageFamily::Script), 5);
    }

    #[test]
    fn test_template_literal_spans_lines() {
        let src = "const q = `\n select ( from\n`;\nnext();";
        assert_eq!(end(src, 1, LanguageFamily::Script), 3);
    }

    #[test]
    fn test_script_comment_brackets_ignored() {
        let src = "const a = [ // (\n  1,\n];";
        assert_eq!(end(src, 1, LanguageFamily::Script), 3);
    }

    #[test]
    fn test_python_call_and_backslash() {
        let src = "ITEMS = dict(\n    a=1,  # )\n)\nTOTAL = 1 + \\\n    2\nx = 0";
        assert_eq!(end(src, 1, LanguageFamily::Python), 3);
        assert_eq!(end(src, 4, LanguageFamily::Python), 5);
        assert_eq!(end(src, 6, LanguageFamily::Python), 6);
    }

    #[test]
    fn test_python_triple_quoted() {
        let src = "DOC = \"\"\"\nline ( one\n\"\"\"\nx = 1";
        assert_eq!(end(src, 1, LanguageFamily::Python), 3);
    }

    #[test]
    fn test_unbalanced_runs_to_eof() {
        let src = "const a = [\n1,\n2";
        assert_eq!(end(src, 1, LanguageFamily::Script), 3);
    }
}
