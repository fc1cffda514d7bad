//! Line lexer for definition blocks.
//!
//! Definition blocks are a flat micro-syntax inside markdown:
//!
//! ```text
//! [[def: Access Control, AC]]
//! ~ The selective restriction of access to a resource.
//! ~
//! ~ Further paragraphs keep the continuation marker.
//! ```
//!
//! The lexer classifies every line once; [`scan_blocks`] folds the token stream into
//! blocks. A block greedily takes every following blank or continuation line and
//! stops at the first line of prose.

use std::ops::Range;

pub const DEF_OPEN_MARKER: &str = "[[def:";
pub const IREF_OPEN_MARKER: &str = "[[iref:";
pub const CLOSE_MARKER: &str = "]]";
pub const CONTINUATION_MARKER: char = '~';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Prose,
    Blank,
    BlockOpen,
    Continuation,
}

/// One classified line. `span` covers the line content without its line ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub span: Range<usize>,
    pub text: &'a str,
}

pub struct Lexer<'a> {
    source: &'a str,
    cursor: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, cursor: 0 }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.source.len() {
            return None;
        }
        let rest = &self.source[self.cursor..];
        let (line_len, advance) = match rest.find('\n') {
            Some(index) => (index, index + 1),
            None => (rest.len(), rest.len()),
        };
        let raw = &rest[..line_len];
        let text = raw.strip_suffix('\r').unwrap_or(raw);
        let start = self.cursor;
        self.cursor += advance;
        Some(Token {
            kind: classify_line(text),
            span: start..start + text.len(),
            text,
        })
    }
}

fn classify_line(line: &str) -> TokenKind {
    let content = line.trim_start();
    if content.is_empty() {
        return TokenKind::Blank;
    }
    if let Some(after) = content.strip_prefix(DEF_OPEN_MARKER)
        && after.contains(CLOSE_MARKER)
    {
        return TokenKind::BlockOpen;
    }
    if content.starts_with(CONTINUATION_MARKER) {
        return TokenKind::Continuation;
    }
    TokenKind::Prose
}

/// A definition block found in one document. Only lives for one scan pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefinitionBlock {
    pub head_term: String,
    pub aliases: Vec<String>,
    pub body_lines: Vec<String>,
    /// Starts at the open marker, ends after the last non-blank line of the block.
    pub range: Range<usize>,
}

impl DefinitionBlock {
    pub fn source_text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.range.clone()]
    }

    /// Content persisted to the block's term file.
    pub fn definition_text(&self, source: &str) -> String {
        format!("{}\n", self.source_text(source).trim())
    }

    pub fn inline_reference(&self) -> String {
        format!("{IREF_OPEN_MARKER} {}{CLOSE_MARKER}", self.head_term)
    }
}

pub fn scan_blocks(source: &str) -> Vec<DefinitionBlock> {
    let tokens = Lexer::new(source).collect::<Vec<_>>();
    let mut blocks = Vec::new();
    let mut index = 0usize;

    while index < tokens.len() {
        let head = &tokens[index];
        index += 1;
        if head.kind != TokenKind::BlockOpen {
            continue;
        }

        let indent = head.text.len() - head.text.trim_start().len();
        let start = head.span.start + indent;
        let mut end = head.span.end;
        let mut body_lines = Vec::new();
        let mut pending_blanks = Vec::new();

        while let Some(token) = tokens.get(index) {
            match token.kind {
                TokenKind::Blank => pending_blanks.push(token.text.to_string()),
                TokenKind::Continuation => {
                    body_lines.append(&mut pending_blanks);
                    body_lines.push(token.text.to_string());
                    end = token.span.end;
                }
                TokenKind::Prose | TokenKind::BlockOpen => break,
            }
            index += 1;
        }

        let (head_term, aliases) = parse_head_line(&head.text[indent..]);
        blocks.push(DefinitionBlock {
            head_term,
            aliases,
            body_lines,
            range: start..end,
        });
    }

    blocks
}

/// Split `[[def: term, alias, ...]]` into the head term and its aliases.
fn parse_head_line(line: &str) -> (String, Vec<String>) {
    let inner = line
        .strip_prefix(DEF_OPEN_MARKER)
        .and_then(|rest| rest.find(CLOSE_MARKER).map(|end| &rest[..end]))
        .unwrap_or_default();
    let mut segments = inner.split(',').map(str::trim);
    let head_term = segments.next().unwrap_or_default().to_string();
    let aliases = segments
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();
    (head_term, aliases)
}

/// Prose outside the given spans of a document: before the first, between, after the last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProseLayout<'a> {
    pub leading: &'a str,
    pub between: Vec<&'a str>,
    pub trailing: &'a str,
}

/// `spans` must be ordered and non-overlapping, as [`scan_blocks`] and
/// [`inline_reference_lines`] yield them.
pub fn prose_layout<'a>(source: &'a str, spans: &[Range<usize>]) -> ProseLayout<'a> {
    let (Some(first), Some(last)) = (spans.first(), spans.last()) else {
        return ProseLayout {
            leading: source,
            ..ProseLayout::default()
        };
    };
    let between = spans
        .windows(2)
        .map(|pair| &source[pair[0].end..pair[1].start])
        .filter(|gap| !gap.trim().is_empty())
        .collect();
    ProseLayout {
        leading: &source[..first.start],
        between,
        trailing: &source[last.end..],
    }
}

/// Lines holding nothing but one inline reference, which is what a rewritten
/// block leaves behind. Spans exclude indentation and line endings.
pub fn inline_reference_lines(source: &str) -> Vec<Range<usize>> {
    Lexer::new(source)
        .filter_map(|token| {
            let content = token.text.trim();
            let single = content.starts_with(IREF_OPEN_MARKER)
                && content.ends_with(CLOSE_MARKER)
                && content.matches(IREF_OPEN_MARKER).count() == 1;
            if token.kind != TokenKind::Prose || !single {
                return None;
            }
            let indent = token.text.len() - token.text.trim_start().len();
            let start = token.span.start + indent;
            Some(start..start + content.len())
        })
        .collect()
}

pub fn count_inline_references(source: &str) -> usize {
    source.matches(IREF_OPEN_MARKER).count()
}

pub fn contains_generated_marker(source: &str) -> bool {
    source.contains(DEF_OPEN_MARKER) || source.contains(IREF_OPEN_MARKER)
}
