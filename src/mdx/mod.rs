//! MDX compilation: validated markdown + JSX source into stored HTML plus a
//! table of contents.

pub mod highlight;
pub mod toc;
pub mod validate;

use std::collections::VecDeque;

use pulldown_cmark::{html, CodeBlockKind, CowStr, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use highlight::{escape_html, Highlighter};
pub use toc::{scan_headings, Slugger, TocEntry, TocLevel};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("line {line}: <{name}> is never closed")]
    UnclosedElement { name: String, line: usize },

    #[error("line {line}: expected </{expected}> but found </{found}>")]
    MismatchedClosingTag {
        expected: String,
        found: String,
        line: usize,
    },

    #[error("line {line}: closing tag </{name}> has no matching opening tag")]
    UnexpectedClosingTag { name: String, line: usize },

    #[error("line {line}: tag <{name} is not terminated")]
    UnterminatedTag { name: String, line: usize },

    #[error("line {line}: unbalanced braces in expression")]
    UnbalancedExpression { line: usize },
}

/// Serialized, pre-compiled article. Stored as JSON on the post row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledMdx {
    pub compiled_source: String,
    pub toc: Vec<TocEntry>,
}

impl CompiledMdx {
    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string(self).map_err(|e| e.to_string())
    }

    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// Compiler with a fixed extension set. Holds only immutable highlighting
/// data, so one instance serves every request.
pub struct MdxCompiler {
    highlighter: Highlighter,
}

impl MdxCompiler {
    pub fn new() -> Self {
        Self {
            highlighter: Highlighter::new(),
        }
    }

    fn options() -> Options {
        Options::ENABLE_TABLES
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_FOOTNOTES
            | Options::ENABLE_MATH
            | Options::ENABLE_HEADING_ATTRIBUTES
    }

    pub fn compile(&self, source: &str) -> Result<CompiledMdx, CompileError> {
        validate::validate(source)?;

        let headings = scan_headings(source);
        let body = strip_esm(source);
        let compiled_source = self.render_html(&body, &headings);
        let toc = headings.into_iter().map(|(_, entry)| entry).collect();

        Ok(CompiledMdx {
            compiled_source,
            toc,
        })
    }

    /// Render `source` to HTML. Heading ids come from the scanned TOC so every
    /// TOC link resolves; `source` must keep the line layout of the scanned text.
    fn render_html(&self, source: &str, headings: &[(usize, TocEntry)]) -> String {
        let parser = Parser::new_ext(source, Self::options()).into_offset_iter();
        let lines = LineIndex::new(source);
        let mut anchors = TocAnchors::new(headings);

        let mut events: Vec<Event> = Vec::new();
        let mut code_lang: Option<Option<String>> = None;
        let mut code_buf = String::new();
        let mut heading: Option<OpenHeading> = None;

        for (event, range) in parser {
            // Code blocks: collect text and emit highlighted HTML at the end
            if let Some(lang) = &code_lang {
                match event {
                    Event::Text(text) => code_buf.push_str(&text),
                    Event::End(TagEnd::CodeBlock) => {
                        let html = self.highlighter.highlight(&code_buf, lang.as_deref());
                        push_event(&mut heading, &mut events, Event::Html(CowStr::from(html)));
                        code_lang = None;
                        code_buf.clear();
                    }
                    _ => {}
                }
                continue;
            }

            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    // `#` lines inside the fence are TOC entries without a heading
                    let last_line = lines.line_of(range.end.saturating_sub(1));
                    for slug in anchors.orphans_through(last_line) {
                        push_event(&mut heading, &mut events, orphan_anchor(&slug));
                    }
                    code_lang = Some(match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(|l| l.to_string()),
                        CodeBlockKind::Indented => None,
                    });
                }
                Event::Start(Tag::Heading { level, id, .. }) => {
                    let line = lines.line_of(range.start);
                    if line > 0 {
                        for slug in anchors.orphans_through(line - 1) {
                            events.push(orphan_anchor(&slug));
                        }
                    }
                    heading = Some(OpenHeading {
                        level,
                        explicit_id: id.map(|i| i.to_string()),
                        line,
                        inner: Vec::new(),
                    });
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some(open) = heading.take() {
                        let slug = match anchors.take_line(open.line) {
                            Some(slug) => slug,
                            None => match open.explicit_id {
                                Some(id) => id,
                                None => anchors.fallback(&plain_text(&open.inner)),
                            },
                        };
                        let tag = heading_tag(open.level);
                        events.push(Event::Html(CowStr::from(format!(
                            "<{tag} id=\"{id}\"><a class=\"heading-anchor\" aria-hidden=\"true\" tabindex=\"-1\" href=\"#{id}\">#</a>",
                            tag = tag,
                            id = escape_html(&slug)
                        ))));
                        events.extend(open.inner);
                        events.push(Event::Html(CowStr::from(format!("</{}>\n", tag))));
                    }
                }
                Event::InlineMath(tex) => {
                    let html = format!(
                        "<span class=\"math math-inline\">\\({}\\)</span>",
                        escape_html(&tex)
                    );
                    push_event(&mut heading, &mut events, Event::InlineHtml(CowStr::from(html)));
                }
                Event::DisplayMath(tex) => {
                    let html = format!(
                        "<span class=\"math math-display\">\\[{}\\]</span>",
                        escape_html(&tex)
                    );
                    push_event(&mut heading, &mut events, Event::InlineHtml(CowStr::from(html)));
                }
                other => push_event(&mut heading, &mut events, other),
            }
        }

        for slug in anchors.orphans_through(usize::MAX) {
            events.push(orphan_anchor(&slug));
        }

        let mut out = String::new();
        html::push_html(&mut out, events.into_iter());
        out
    }
}

impl Default for MdxCompiler {
    fn default() -> Self {
        Self::new()
    }
}

struct OpenHeading<'a> {
    level: HeadingLevel,
    explicit_id: Option<String>,
    line: usize,
    inner: Vec<Event<'a>>,
}

fn push_event<'a>(heading: &mut Option<OpenHeading<'a>>, events: &mut Vec<Event<'a>>, event: Event<'a>) {
    match heading {
        Some(open) => open.inner.push(event),
        None => events.push(event),
    }
}

/// Byte offset to zero-based line number.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { starts }
    }

    fn line_of(&self, offset: usize) -> usize {
        self.starts.partition_point(|&start| start <= offset).saturating_sub(1)
    }
}

/// Hands out heading ids in source order. Scanned lines keep their TOC slug;
/// headings the scan missed get a slug that cannot clash with the TOC.
struct TocAnchors<'t> {
    pending: VecDeque<(usize, &'t str)>,
    fallback: Slugger,
}

impl<'t> TocAnchors<'t> {
    fn new(headings: &'t [(usize, TocEntry)]) -> Self {
        let mut fallback = Slugger::new();
        for (_, entry) in headings {
            fallback.reserve(&entry.slug);
        }
        Self {
            pending: headings.iter().map(|(line, e)| (*line, e.slug.as_str())).collect(),
            fallback,
        }
    }

    /// Slugs of scanned lines up to and including `line` that were not
    /// claimed by a rendered heading.
    fn orphans_through(&mut self, line: usize) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(&(next, slug)) = self.pending.front() {
            if next > line {
                break;
            }
            out.push(slug.to_string());
            self.pending.pop_front();
        }
        out
    }

    fn take_line(&mut self, line: usize) -> Option<String> {
        match self.pending.front() {
            Some(&(next, slug)) if next == line => {
                self.pending.pop_front();
                Some(slug.to_string())
            }
            _ => None,
        }
    }

    fn fallback(&mut self, text: &str) -> String {
        self.fallback.slug(text)
    }
}

fn orphan_anchor(slug: &str) -> Event<'static> {
    Event::Html(CowStr::from(format!(
        "<span id=\"{}\" class=\"toc-anchor\"></span>\n",
        escape_html(slug)
    )))
}

fn plain_text(events: &[Event]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            Event::InlineMath(t) => text.push_str(t),
            _ => {}
        }
    }
    text
}

fn heading_tag(level: HeadingLevel) -> &'static str {
    match level {
        HeadingLevel::H1 => "h1",
        HeadingLevel::H2 => "h2",
        HeadingLevel::H3 => "h3",
        HeadingLevel::H4 => "h4",
        HeadingLevel::H5 => "h5",
        HeadingLevel::H6 => "h6",
    }
}

/// Blank out top-level `import`/`export` lines; they have no HTML output.
/// Line count is preserved so heading offsets still match the scanned source.
fn strip_esm(source: &str) -> String {
    let mut in_fence = false;
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }
        if in_fence || !validate::is_esm_line(line) {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}
