use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

use pulldown_cmark::{BrokenLink, CodeBlockKind, CowStr, Event, Options, Parser, Tag};

/// Lexer settings shared by tokenizing and rendering: GFM-ish, no tables.
pub fn markdown_options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// `text` is the raw inline markdown of the heading.
    Heading { depth: u8, text: String },
    Code { fenced: bool, info: String, text: String },
    Paragraph,
    List,
    BlockQuote,
    Html,
    Rule,
    Other,
}

/// One top-level markdown block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte range in the lexed text.
    pub span: Range<usize>,
    pub source: String,
}

impl Token {
    /// Depth-1 headings delimit the description and the properties.
    pub fn is_top_level_heading(&self) -> bool {
        matches!(self.kind, TokenKind::Heading { depth: 1, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDefinition {
    pub dest: String,
    pub title: Option<String>,
}

/// `[label]: dest "title"` definitions of a lexed text, keyed by normalized label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkDefinitions(HashMap<String, LinkDefinition>);

impl LinkDefinitions {
    pub fn insert(&mut self, label: &str, definition: LinkDefinition) {
        self.0.entry(normalize_label(label)).or_insert(definition);
    }

    pub fn get(&self, label: &str) -> Option<&LinkDefinition> {
        self.0.get(&normalize_label(label))
    }

}

fn normalize_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Ordered top-level tokens plus the link definitions of the text they came
/// from. Every fragment split off a sequence shares the same definitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenSequence {
    tokens: Vec<Token>,
    links: Arc<LinkDefinitions>,
}

impl TokenSequence {
    pub fn new(tokens: Vec<Token>, links: Arc<LinkDefinitions>) -> Self {
        Self { tokens, links }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn links(&self) -> &Arc<LinkDefinitions> {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Removes the first `n` tokens and returns them as a fragment sharing
    /// this sequence's link definitions.
    pub fn split_front(&mut self, n: usize) -> TokenSequence {
        let n = n.min(self.tokens.len());
        TokenSequence {
            tokens: self.tokens.drain(..n).collect(),
            links: Arc::clone(&self.links),
        }
    }

    pub fn pop_front(&mut self) -> Option<Token> {
        if self.tokens.is_empty() {
            None
        } else {
            Some(self.tokens.remove(0))
        }
    }

    /// Markdown for re-parsing this fragment. Blocks are separated by a blank line.
    pub fn source(&self) -> String {
        self.tokens
            .iter()
            .map(|t| t.source.trim_end())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Lex `markdown` into top-level block tokens.
pub fn lex(markdown: &str) -> TokenSequence {
    let parser = Parser::new_ext(markdown, markdown_options());

    let mut links = LinkDefinitions::default();
    for (label, def) in parser.reference_definitions().iter() {
        links.insert(
            label,
            LinkDefinition {
                dest: def.dest.to_string(),
                title: def.title.as_ref().map(|t| t.to_string()),
            },
        );
    }

    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut current: Option<TokenBuilder> = None;

    for (event, range) in parser.into_offset_iter() {
        match event {
            Event::Start(tag) => {
                if depth == 0 {
                    current = Some(TokenBuilder::open(&tag, range));
                } else if let Some(builder) = current.as_mut() {
                    builder.observe(&Event::Start(tag), range);
                }
                depth += 1;
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    if let Some(builder) = current.take() {
                        tokens.push(builder.finish(markdown));
                    }
                }
            }
            event if depth == 0 => {
                let kind = match event {
                    Event::Rule => TokenKind::Rule,
                    Event::Html(_) => TokenKind::Html,
                    _ => TokenKind::Other,
                };
                tokens.push(make_token(kind, range, markdown));
            }
            event => {
                if let Some(builder) = current.as_mut() {
                    builder.observe(&event, range);
                }
            }
        }
    }

    TokenSequence::new(tokens, Arc::new(links))
}

struct TokenBuilder {
    kind: TokenKind,
    span: Range<usize>,
    inline: Option<Range<usize>>,
    text: String,
}

impl TokenBuilder {
    fn open(tag: &Tag<'_>, span: Range<usize>) -> Self {
        let kind = match tag {
            Tag::Heading { level, .. } => TokenKind::Heading {
                depth: *level as u8,
                text: String::new(),
            },
            Tag::CodeBlock(CodeBlockKind::Fenced(info)) => TokenKind::Code {
                fenced: true,
                info: info.to_string(),
                text: String::new(),
            },
            Tag::CodeBlock(CodeBlockKind::Indented) => TokenKind::Code {
                fenced: false,
                info: String::new(),
                text: String::new(),
            },
            Tag::Paragraph => TokenKind::Paragraph,
            Tag::List(_) => TokenKind::List,
            Tag::BlockQuote(_) => TokenKind::BlockQuote,
            Tag::HtmlBlock => TokenKind::Html,
            _ => TokenKind::Other,
        };
        Self {
            kind,
            span,
            inline: None,
            text: String::new(),
        }
    }

    fn observe(&mut self, event: &Event<'_>, range: Range<usize>) {
        self.inline = Some(match self.inline.take() {
            Some(r) => r.start.min(range.start)..r.end.max(range.end),
            None => range,
        });
        if let Event::Text(text) = event {
            self.text.push_str(text);
        }
    }

    fn finish(self, markdown: &str) -> Token {
        let kind = match self.kind {
            TokenKind::Heading { depth, .. } => TokenKind::Heading {
                depth,
                text: self
                    .inline
                    .map(|r| markdown[r].trim().to_string())
                    .unwrap_or_default(),
            },
            TokenKind::Code { fenced, info, .. } => TokenKind::Code {
                fenced,
                info,
                text: self.text,
            },
            other => other,
        };
        make_token(kind, self.span, markdown)
    }
}

/// Widen the span back to the start of its line when only indentation
/// precedes it, so indented code survives re-parsing.
fn make_token(kind: TokenKind, span: Range<usize>, markdown: &str) -> Token {
    let line_start = markdown[..span.start].rfind('\n').map_or(0, |i| i + 1);
    let start = if markdown[line_start..span.start].trim().is_empty() {
        line_start
    } else {
        span.start
    };
    Token {
        kind,
        source: markdown[start..span.end].to_string(),
        span: start..span.end,
    }
}

/// Parse a fragment of a lexed text. Reference links resolve through the
/// definitions of the whole text, wherever they were written.
pub fn parse_fragment<'a>(source: &'a str, links: &Arc<LinkDefinitions>) -> Vec<Event<'a>> {
    let links = Arc::clone(links);
    let callback = move |broken: BrokenLink| {
        links.get(&broken.reference).map(|def| {
            (
                CowStr::from(def.dest.clone()),
                CowStr::from(def.title.clone().unwrap_or_default()),
            )
        })
    };
    Parser::new_with_broken_link_callback(source, markdown_options(), Some(callback)).collect()
}

/// Concatenated text of inline events. Markup is dropped, entities are
/// already decoded by the parser.
pub fn plain_text(events: &[Event<'_>]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            _ => {}
        }
    }
    text
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(md: &str) -> Vec<TokenKind> {
        lex(md).tokens().iter().map(|t| t.kind.clone()).collect()
    }

    #[test]
    fn heading_keeps_depth_and_raw_text() {
        let seq = lex("# `exact_key`\n\n## Due *Date*");
        assert_eq!(
            seq.tokens()[0].kind,
            TokenKind::Heading {
                depth: 1,
                text: "`exact_key`".into()
            }
        );
        assert_eq!(
            seq.tokens()[1].kind,
            TokenKind::Heading {
                depth: 2,
                text: "Due *Date*".into()
            }
        );
        assert!(seq.tokens()[0].is_top_level_heading());
        assert!(!seq.tokens()[1].is_top_level_heading());
    }

    #[test]
    fn fenced_code_text() {
        let seq = lex("```yaml\na: 1\nb: two\n```");
        assert_eq!(seq.len(), 1);
        assert_eq!(
            seq.tokens()[0].kind,
            TokenKind::Code {
                fenced: true,
                info: "yaml".into(),
                text: "a: 1\nb: two\n".into()
            }
        );
    }

    #[test]
    fn top_level_blocks_only() {
        let md = "Intro paragraph\n\n- one\n- two\n  - nested\n\n> quoted\n\n---\n\n<div>x</div>\n";
        assert_eq!(
            kinds(md),
            vec![
                TokenKind::Paragraph,
                TokenKind::List,
                TokenKind::BlockQuote,
                TokenKind::Rule,
                TokenKind::Html,
            ]
        );
    }

    #[test]
    fn setext_heading_is_depth_one() {
        let seq = lex("Title\n=====\n\nbody");
        assert!(seq.tokens()[0].is_top_level_heading());
    }

    #[test]
    fn link_definitions_are_captured() {
        let seq = lex("See [the docs][Docs].\n\n[docs]: https://example.com \"Docs\"\n");
        let def = seq.links().get("DOCS").unwrap();
        assert_eq!(def.dest, "https://example.com");
        assert_eq!(def.title.as_deref(), Some("Docs"));
        // the definition itself is not a token
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn fragments_resolve_references_defined_elsewhere() {
        let seq = lex("intro\n\n[docs]: https://example.com\n");
        let events = parse_fragment("[Read][docs] and [missing][]", seq.links());
        let dests: Vec<String> = events
            .iter()
            .filter_map(|e| match e {
                Event::Start(Tag::Link { dest_url, .. }) => Some(dest_url.to_string()),
                _ => None,
            })
            .collect();
        assert_eq!(dests, ["https://example.com"]);
        assert_eq!(plain_text(&events), "Read and [missing][]");
    }

    #[test]
    fn split_front_shares_links() {
        let mut seq = lex("one\n\ntwo\n\nthree\n\n[x]: https://x.test\n");
        let front = seq.split_front(2);
        assert_eq!(front.len(), 2);
        assert_eq!(seq.len(), 1);
        assert!(Arc::ptr_eq(front.links(), seq.links()));
        assert_eq!(front.source(), "one\n\ntwo");
    }

    #[test]
    fn indented_code_survives_source_round_trip() {
        let seq = lex("para\n\n    let x = 1;\n");
        let code = &seq.tokens()[1];
        assert!(matches!(code.kind, TokenKind::Code { fenced: false, .. }));
        assert!(code.source.starts_with("    let"));
    }

    #[test]
    fn empty_text_has_no_tokens() {
        assert!(lex("").is_empty());
        assert!(lex("\n\n").is_empty());
    }

    #[test]
    fn plain_text_drops_markup() {
        let events: Vec<Event> = Parser::new("Hello *big* `world`").collect();
        assert_eq!(plain_text(&events), "Hello big world");
    }

    #[test]
    fn fixture_card_description() {
        let md = std::fs::read_to_string("tests/fixtures/recipe.md").unwrap();
        let seq = lex(&md);
        let top: Vec<_> = seq
            .tokens()
            .iter()
            .filter(|t| t.is_top_level_heading())
            .collect();
        assert_eq!(top.len(), 4);
    }
}
