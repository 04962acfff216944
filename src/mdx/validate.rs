//! Structural checks for the MDX-specific syntax that markdown parsers accept
//! silently: JSX elements and `{}` expressions.

use super::CompileError;

#[derive(Debug)]
struct OpenElement {
    name: String,
    line: usize,
}

/// Validate JSX nesting and expression braces outside code.
pub fn validate(source: &str) -> Result<(), CompileError> {
    let masked = mask_code_blocks(source);
    let chars: Vec<char> = masked.chars().collect();

    let mut stack: Vec<OpenElement> = Vec::new();
    let mut brace_depth: usize = 0;
    let mut brace_line: usize = 0;
    let mut line_no = 1;
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '\n' => line_no += 1,
            '`' => {
                // Skip an inline code span of matching backtick length
                let run = chars[i..].iter().take_while(|c| **c == '`').count();
                let rest = i + run;
                i = match find_backtick_run(&chars, rest, run) {
                    Some(end) => {
                        line_no += chars[rest..end].iter().filter(|c| **c == '\n').count();
                        end + run
                    }
                    None => rest,
                };
                continue;
            }
            '\\' => {
                if chars.get(i + 1) == Some(&'\n') {
                    line_no += 1;
                }
                i += 2;
                continue;
            }
            '{' => {
                if brace_depth == 0 {
                    brace_line = line_no;
                }
                brace_depth += 1;
            }
            '}' => {
                if brace_depth == 0 {
                    return Err(CompileError::UnbalancedExpression { line: line_no });
                }
                brace_depth -= 1;
            }
            '<' if brace_depth == 0 => {
                if let Some(consumed) = scan_tag(&chars, i, line_no, &mut stack)? {
                    line_no += chars[i..i + consumed].iter().filter(|c| **c == '\n').count();
                    i += consumed;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    if brace_depth > 0 {
        return Err(CompileError::UnbalancedExpression { line: brace_line });
    }
    if let Some(open) = stack.pop() {
        return Err(CompileError::UnclosedElement {
            name: open.name,
            line: open.line,
        });
    }
    Ok(())
}

/// Blank out fenced code blocks and ESM lines, keeping line numbering intact.
fn mask_code_blocks(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut fence: Option<(char, usize)> = None;
    for line in source.lines() {
        let mut keep = fence.is_none() && !is_esm_line(line);
        if let Some(marker) = fence_marker(line) {
            match fence {
                None => fence = Some(marker),
                Some((ch, len)) if marker.0 == ch && marker.1 >= len => fence = None,
                _ => {}
            }
            keep = false;
        }
        if keep {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

/// Top-level `import`/`export` statements, stripped before rendering.
pub fn is_esm_line(line: &str) -> bool {
    line.starts_with("import ") || line.starts_with("export ")
}

fn fence_marker(line: &str) -> Option<(char, usize)> {
    let trimmed = line.trim_start();
    if line.len() - trimmed.len() > 3 {
        return None;
    }
    let ch = trimmed.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let len = trimmed.chars().take_while(|c| *c == ch).count();
    (len >= 3).then_some((ch, len))
}

/// Closing backtick run of the same length. Code spans may wrap lines but
/// never cross a blank line.
fn find_backtick_run(chars: &[char], from: usize, run: usize) -> Option<usize> {
    let mut j = from;
    while j < chars.len() {
        if chars[j] == '\n' {
            let next = chars[j + 1..].iter().position(|c| !matches!(c, ' ' | '\t'));
            if next.map_or(true, |k| chars[j + 1 + k] == '\n') {
                return None;
            }
            j += 1;
        } else if chars[j] == '`' {
            let len = chars[j..].iter().take_while(|c| **c == '`').count();
            if len == run {
                return Some(j);
            }
            j += len;
        } else {
            j += 1;
        }
    }
    None
}

/// Scan a tag starting at `chars[start] == '<'`. Only component tags
/// (capitalized names) and fragments are tracked; lowercase HTML passes through.
/// Returns the number of chars consumed, or None when this `<` is not a tag.
fn scan_tag(
    chars: &[char],
    start: usize,
    line: usize,
    stack: &mut Vec<OpenElement>,
) -> Result<Option<usize>, CompileError> {
    let mut i = start + 1;
    let closing = chars.get(i) == Some(&'/');
    if closing {
        i += 1;
    }

    let name_start = i;
    while i < chars.len() && (chars[i].is_alphanumeric() || matches!(chars[i], '.' | '_' | '-')) {
        i += 1;
    }
    let name: String = chars[name_start..i].iter().collect();

    let is_fragment = name.is_empty() && chars.get(i) == Some(&'>');
    let is_component = name.chars().next().map_or(false, |c| c.is_ascii_uppercase());
    if !is_fragment && !is_component {
        return Ok(None);
    }

    // Find the end of the tag, honoring quoted attribute values and {} props
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut self_closing = false;
    let mut end = None;
    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' if depth == 0 => quote = Some(c),
                '{' => depth += 1,
                '}' => depth = depth.saturating_sub(1),
                '>' if depth == 0 => {
                    self_closing = i > 0 && chars[i - 1] == '/';
                    end = Some(i);
                    break;
                }
                _ => {}
            },
        }
        i += 1;
    }

    let end = match end {
        Some(e) => e,
        None => {
            return Err(CompileError::UnterminatedTag {
                name: if is_fragment { "<>".to_string() } else { name },
                line,
            })
        }
    };

    if closing {
        match stack.pop() {
            Some(open) if open.name == name => {}
            Some(open) => {
                return Err(CompileError::MismatchedClosingTag {
                    expected: open.name,
                    found: name,
                    line,
                })
            }
            None => return Err(CompileError::UnexpectedClosingTag { name, line }),
        }
    } else if !self_closing {
        stack.push(OpenElement { name, line });
    }

    Ok(Some(end - start + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_markdown_passes() {
        assert!(validate("# Hi\n\nSome *text* with <b>html</b> and a < b.\n").is_ok());
    }

    #[test]
    fn balanced_components_pass() {
        let src = "<Callout type=\"info\">\nHello <Badge label={\"x\"} />\n</Callout>\n";
        assert!(validate(src).is_ok());
    }

    #[test]
    fn multiline_props_pass() {
        let src = "<Chart\n  title=\"Growth\"\n  data={[1, 2, 3]}\n/>\n\n## After\n";
        assert!(validate(src).is_ok());
    }

    #[test]
    fn line_numbers_survive_multiline_tags() {
        let src = "<Chart\n  data={[1]}\n/>\n\n<Note>\n";
        match validate(src).unwrap_err() {
            CompileError::UnclosedElement { line, .. } => assert_eq!(line, 5),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn fragments_pass() {
        assert!(validate("<>\ninside\n</>\n").is_ok());
    }

    #[test]
    fn unclosed_component_fails_with_line() {
        let err = validate("intro\n<Callout>\nbody\n").unwrap_err();
        match err {
            CompileError::UnclosedElement { name, line } => {
                assert_eq!(name, "Callout");
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn mismatched_closing_tag_fails() {
        let err = validate("<Tabs>\n<Tab>\n</Tabs>\n").unwrap_err();
        assert!(matches!(err, CompileError::MismatchedClosingTag { line: 3, .. }));
    }

    #[test]
    fn stray_closing_tag_fails() {
        assert!(matches!(
            validate("</Note>\n").unwrap_err(),
            CompileError::UnexpectedClosingTag { .. }
        ));
    }

    #[test]
    fn unterminated_tag_fails() {
        assert!(matches!(
            validate("<Chart data={[1, 2]}\n").unwrap_err(),
            CompileError::UnterminatedTag { .. }
        ));
    }

    #[test]
    fn unbalanced_expression_fails() {
        assert!(matches!(
            validate("value is {1 + 2\n").unwrap_err(),
            CompileError::UnbalancedExpression { line: 1 }
        ));
        assert!(matches!(
            validate("oops }\n").unwrap_err(),
            CompileError::UnbalancedExpression { line: 1 }
        ));
    }

    #[test]
    fn code_is_ignored() {
        let src = "```jsx\n<Callout>\nconst x = {\n```\n\nInline `<Open>` and `{` are fine.\n";
        assert!(validate(src).is_ok());
    }

    #[test]
    fn code_span_may_wrap_a_line() {
        assert!(validate("Text with `multi\nline {code` span\n").is_ok());
        match validate("`wrapped\nspan`\n\n{open\n").unwrap_err() {
            CompileError::UnbalancedExpression { line } => assert_eq!(line, 4),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn code_span_stops_at_blank_line() {
        assert!(matches!(
            validate("a `tick\n\n{ open\n").unwrap_err(),
            CompileError::UnbalancedExpression { line: 3 }
        ));
    }

    #[test]
    fn escaped_braces_are_ignored() {
        assert!(validate("literal \\{ brace\n").is_ok());
    }

    #[test]
    fn esm_lines_are_skipped() {
        assert!(validate("import { Chart } from './chart'\n\n# Hi\n").is_ok());
    }
}
