//! Source re-indentation (`logic.format`, spec §6). Operates line-by-line
//! on the raw text rather than round-tripping through the AST, so
//! comments and literal spacing inside strings survive untouched —
//! only leading whitespace changes.

/// Options controlling `format`.
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    pub indent_width: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self { indent_width: 4 }
    }
}

const OPENERS: &[&str] = &["PROGRAM", "IF", "WHILE", "FOR", "VAR"];
const CLOSERS: &[&str] = &["END_PROGRAM", "END_IF", "END_WHILE", "END_FOR", "END_VAR"];
const SAME_LEVEL: &[&str] = &["ELSE", "ELSIF"];

fn leading_word(line: &str) -> String {
    line.trim()
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("")
        .to_uppercase()
}

/// Re-indent ST source to reflect block nesting. Unbalanced input (more
/// closers than openers) simply floors depth at zero rather than erroring
/// — formatting is advisory, not a validity check.
pub fn format(content: &str, options: FormatOptions) -> String {
    let pad = " ".repeat(options.indent_width);
    let mut depth: usize = 0;
    let mut out = Vec::new();

    for raw_line in content.lines() {
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            out.push(String::new());
            continue;
        }
        let word = leading_word(trimmed);
        let is_closer = CLOSERS.contains(&word.as_str());
        let is_same_level = SAME_LEVEL.contains(&word.as_str());

        let line_depth = if is_closer || is_same_level {
            depth.saturating_sub(1)
        } else {
            depth
        };
        out.push(format!("{}{}", pad.repeat(line_depth), trimmed));

        if is_closer {
            depth = depth.saturating_sub(1);
        } else if OPENERS.contains(&word.as_str()) {
            depth += 1;
        }
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indents_a_simple_if_block() {
        let source = "PROGRAM Main\nIF x THEN\ny := 1;\nEND_IF\nEND_PROGRAM";
        let formatted = format(source, FormatOptions::default());
        assert_eq!(
            formatted,
            "PROGRAM Main\n    IF x THEN\n        y := 1;\n    END_IF\nEND_PROGRAM"
        );
    }

    #[test]
    fn else_sits_at_the_if_s_level() {
        let source = "IF x THEN\ny := 1;\nELSE\ny := 2;\nEND_IF";
        let formatted = format(source, FormatOptions::default());
        let lines: Vec<&str> = formatted.lines().collect();
        assert_eq!(lines[2], "ELSE");
        assert_eq!(lines[3], "    y := 2;");
    }

    #[test]
    fn blank_lines_stay_blank() {
        let source = "PROGRAM Main\n\nEND_PROGRAM";
        let formatted = format(source, FormatOptions::default());
        assert_eq!(formatted, "PROGRAM Main\n\nEND_PROGRAM");
    }

    #[test]
    fn unbalanced_closers_do_not_panic() {
        let source = "END_IF\nEND_IF";
        let formatted = format(source, FormatOptions::default());
        assert_eq!(formatted, "END_IF\nEND_IF");
    }

    #[test]
    fn custom_indent_width_is_honoured() {
        let source = "IF x THEN\ny := 1;\nEND_IF";
        let formatted = format(source, FormatOptions { indent_width: 2 });
        assert_eq!(formatted, "IF x THEN\n  y := 1;\nEND_IF");
    }
}
