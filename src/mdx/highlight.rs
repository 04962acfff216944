use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

/// Theme used for every code block.
pub const THEME_NAME: &str = "base16-ocean.dark";

/// Syntax highlighter with one fixed theme. Loaded once and shared.
pub struct Highlighter {
    syntax_set: SyntaxSet,
    theme: Theme,
}

impl Highlighter {
    pub fn new() -> Self {
        let mut themes = ThemeSet::load_defaults();
        let theme = themes
            .themes
            .remove(THEME_NAME)
            .unwrap_or_default();
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme,
        }
    }

    /// Highlight a code block, falling back to escaped plain text.
    pub fn highlight(&self, code: &str, lang: Option<&str>) -> String {
        let lang = lang.map(str::trim).filter(|l| !l.is_empty()).unwrap_or("text");
        let syntax = self
            .syntax_set
            .find_syntax_by_token(lang)
            .or_else(|| self.syntax_set.find_syntax_by_extension(lang))
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());

        match highlighted_html_for_string(code, &self.syntax_set, syntax, &self.theme) {
            Ok(html) => format!(
                r#"<figure class="code-block" data-language="{}">{}</figure>"#,
                escape_html(lang),
                html
            ),
            Err(e) => {
                log::warn!("[mdx] highlight failed for '{}': {}", lang, e);
                format!(
                    r#"<pre><code class="language-{}">{}</code></pre>"#,
                    escape_html(lang),
                    escape_html(code)
                )
            }
        }
    }
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new()
    }
}

pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlights_known_language() {
        let h = Highlighter::new();
        let html = h.highlight("fn main() {}\n", Some("rust"));
        assert!(html.contains("data-language=\"rust\""));
        assert!(html.contains("<pre"));
    }

    #[test]
    fn unknown_language_still_renders() {
        let h = Highlighter::new();
        let html = h.highlight("<tag>\n", Some("no-such-lang"));
        assert!(html.contains("&lt;tag&gt;"));
    }
}
