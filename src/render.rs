use std::ops::Range;
use std::sync::LazyLock;

use html_escape::{encode_double_quoted_attribute, encode_text};
use pulldown_cmark::{html, CowStr, Event, LinkType, Tag, TagEnd};
use regex::Regex;

use crate::board::CardIndex;
use crate::card::CardRecord;
use crate::error::{Warning, WarningContext, WarningKind};
use crate::options::Options;
use crate::parser::tokens::{parse_fragment, plain_text, TokenSequence};

/// Groups: kind (`b`/`c`), short id, path suffix, fragment.
static TRELLO_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https://trello\.com/(b|c)/([0-9A-Za-z_]{8})([/0-9A-Za-z_-]+)?(#.*)?$").unwrap()
});
static BARE_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:https?://|www\.)[^\s<>]+").unwrap());
static HTML_ANCHOR_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^<a(\s|>)").unwrap());
static HTML_ANCHOR_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^</a\s*>").unwrap());

#[derive(Debug, Default)]
pub struct Rendered {
    pub html: String,
    pub warnings: Vec<Warning>,
}

/// Markdown-to-HTML for one property of one card. Links to other cards of
/// the board are resolved through the card index and headings are remapped.
pub struct CardRenderer<'a> {
    card: &'a CardRecord,
    key: &'a str,
    index: &'a CardIndex,
    options: &'a Options,
    warnings: Vec<Warning>,
}

impl<'a> CardRenderer<'a> {
    pub fn new(card: &'a CardRecord, key: &'a str, index: &'a CardIndex, options: &'a Options) -> Self {
        Self {
            card,
            key,
            index,
            options,
            warnings: Vec::new(),
        }
    }

    pub fn render(mut self, block: &TokenSequence) -> Rendered {
        let source = block.source();
        let events: Vec<Event> = parse_fragment(&source, block.links())
            .into_iter()
            .map(|event| match event {
                Event::SoftBreak => Event::HardBreak,
                other => other,
            })
            .collect();
        let events = self.rewrite(merge_text(events));

        let mut html = String::new();
        html::push_html(&mut html, events.into_iter());
        Rendered {
            html: html.trim_end_matches('\n').to_string(),
            warnings: self.warnings,
        }
    }

    fn rewrite<'e>(&mut self, events: Vec<Event<'e>>) -> Vec<Event<'e>> {
        let mut out = Vec::with_capacity(events.len());
        let mut iter = events.into_iter();
        // Raw `<a>` tags currently open; their text is already a link.
        let mut html_anchors = 0usize;

        while let Some(event) = iter.next() {
            match event {
                Event::Start(Tag::Link {
                    link_type,
                    dest_url,
                    title,
                    ..
                }) => {
                    let href = match link_type {
                        LinkType::Email => format!("mailto:{}", dest_url),
                        _ => dest_url.to_string(),
                    };
                    let text = to_html(take_inner(&mut iter));
                    let link = self.link(&href, &title, &text);
                    out.push(Event::InlineHtml(link.into()));
                }
                Event::Start(Tag::Heading { level, .. }) => {
                    let inner = take_inner(&mut iter);
                    let plain = plain_text(&inner);
                    let text = to_html(self.rewrite(inner));
                    let heading = self.heading(&text, level as u8, &plain);
                    out.push(Event::Html(heading.into()));
                }
                Event::Start(tag @ Tag::CodeBlock(_)) => {
                    out.push(Event::Start(tag));
                    out.extend(take_inner(&mut iter));
                    out.push(Event::End(TagEnd::CodeBlock));
                }
                // Alt text is written as an attribute, never as markup.
                Event::Start(tag @ Tag::Image { .. }) => {
                    out.push(Event::Start(tag));
                    out.extend(take_inner(&mut iter));
                    out.push(Event::End(TagEnd::Image));
                }
                Event::InlineHtml(raw) => {
                    if HTML_ANCHOR_OPEN_RE.is_match(&raw) {
                        html_anchors += 1;
                    } else if HTML_ANCHOR_CLOSE_RE.is_match(&raw) {
                        html_anchors = html_anchors.saturating_sub(1);
                    }
                    out.push(Event::InlineHtml(raw));
                }
                Event::Text(text) if html_anchors > 0 => out.push(Event::Text(text)),
                Event::Text(text) => self.autolink(text, &mut out),
                other => out.push(other),
            }
        }

        out
    }

    /// Bare URLs in text become links, then go through [`Self::link`].
    /// `www.` hosts get an `http://` href.
    fn autolink<'e>(&mut self, text: CowStr<'e>, out: &mut Vec<Event<'e>>) {
        let urls: Vec<Range<usize>> = BARE_URL_RE
            .find_iter(&text)
            .filter(|m| !m.as_str().starts_with("www.") || at_www_boundary(&text[..m.start()]))
            .map(|m| m.start()..m.start() + trim_url(m.as_str()).len())
            .filter(|r| {
                BARE_URL_RE
                    .find(&text[r.clone()])
                    .is_some_and(|m| m.len() == r.len())
            })
            .collect();
        if urls.is_empty() {
            out.push(Event::Text(text));
            return;
        }

        let mut last = 0;
        for range in urls {
            if range.start > last {
                out.push(Event::Text(text[last..range.start].to_string().into()));
            }
            let url = &text[range.clone()];
            let href = if url.starts_with("www.") {
                format!("http://{}", url)
            } else {
                url.to_string()
            };
            let link = self.link(&href, "", &encode_text(url));
            out.push(Event::InlineHtml(link.into()));
            last = range.end;
        }
        if last < text.len() {
            out.push(Event::Text(text[last..].to_string().into()));
        }
    }

    fn link(&mut self, href: &str, title: &str, text: &str) -> String {
        let Some(caps) = TRELLO_URL_RE.captures(href) else {
            return render_link(href, title, text);
        };

        if &caps[1] != "c" {
            self.unresolved("Link target is not a card", href);
            return render_link(href, title, text);
        }
        if caps.get(4).is_some_and(|fragment| fragment.as_str() != "#") {
            self.unresolved("Link target is a card element", href);
            return render_link(href, title, text);
        }
        let index = self.index;
        let Some(target) = index.get(&caps[2]) else {
            self.unresolved("Link target is an unknown card", href);
            return render_link(href, title, text);
        };

        let text = if text == href || text == encode_text(href) {
            encode_text(&target.title).into_owned()
        } else {
            text.to_string()
        };

        let url = match (self.options.link_target_url)(self.card, self.key, target) {
            Ok(url) => url,
            Err(e) => {
                self.warn(
                    WarningKind::PolicyFailed,
                    format!("link target URL policy failed: {}", e),
                    self.context().with_href(href),
                );
                String::new()
            }
        };

        if url.is_empty() {
            text
        } else {
            render_link(&url, title, &text)
        }
    }

    fn heading(&mut self, text: &str, level: u8, plain: &str) -> String {
        let mut mapped = match (self.options.header_map)(self.card, self.key, level) {
            Ok(mapped) => mapped,
            Err(e) => {
                self.warn(
                    WarningKind::PolicyFailed,
                    format!("header map policy failed: {}", e),
                    self.context().with_level(i32::from(level)),
                );
                i32::from(level)
            }
        };

        if !(1..=6).contains(&mapped) {
            self.warn(
                WarningKind::InvalidHeaderLevel,
                "Header level is not in the range 1 to 6",
                self.context().with_level(mapped),
            );
            mapped = mapped.clamp(1, 6);
        }

        let id = match (self.options.header_id)(self.card, self.key, plain) {
            Ok(id) => id,
            Err(e) => {
                self.warn(
                    WarningKind::PolicyFailed,
                    format!("header id policy failed: {}", e),
                    self.context().with_text(plain),
                );
                String::new()
            }
        };

        render_heading(mapped, &id, text)
    }

    fn unresolved(&mut self, message: &str, href: &str) {
        self.warn(
            WarningKind::UnresolvedLinkTarget,
            message,
            self.context().with_href(href),
        );
    }

    fn warn(&mut self, kind: WarningKind, message: impl Into<String>, context: WarningContext) {
        self.warnings.push(Warning::new(kind, message, context));
    }

    fn context(&self) -> WarningContext {
        WarningContext::new(self.card, self.key)
    }
}

/// `href` and `title` are raw; `text` is already HTML.
pub fn render_link(href: &str, title: &str, text: &str) -> String {
    let mut html = format!("<a href=\"{}\"", encode_double_quoted_attribute(href));
    if !title.is_empty() {
        html.push_str(&format!(" title=\"{}\"", encode_double_quoted_attribute(title)));
    }
    html.push('>');
    html.push_str(text);
    html.push_str("</a>");
    html
}

/// `id` is raw; `text` is already HTML. No `id` attribute when empty.
pub fn render_heading(level: i32, id: &str, text: &str) -> String {
    let mut html = format!("<h{}", level);
    if !id.is_empty() {
        html.push_str(&format!(" id=\"{}\"", encode_double_quoted_attribute(id)));
    }
    html.push_str(&format!(">{}</h{}>\n", text, level));
    html
}

/// Events between a `Start` already consumed and its matching `End`,
/// which is consumed and dropped.
fn take_inner<'e>(iter: &mut impl Iterator<Item = Event<'e>>) -> Vec<Event<'e>> {
    let mut depth = 0usize;
    let mut inner = Vec::new();
    for event in iter.by_ref() {
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) if depth == 0 => break,
            Event::End(_) => depth -= 1,
            _ => {}
        }
        inner.push(event);
    }
    inner
}

fn to_html(events: Vec<Event<'_>>) -> String {
    let mut html = String::new();
    html::push_html(&mut html, events.into_iter());
    html
}

/// The parser may split one run of text into several events.
fn merge_text(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut out: Vec<Event> = Vec::with_capacity(events.len());
    for event in events {
        if let Event::Text(next) = &event {
            if let Some(Event::Text(prev)) = out.last_mut() {
                *prev = format!("{}{}", prev, next).into();
                continue;
            }
        }
        out.push(event);
    }
    out
}

/// `www.` autolinks only start a line or follow whitespace or `*_~(`.
fn at_www_boundary(before: &str) -> bool {
    before
        .chars()
        .last()
        .map_or(true, |c| c.is_whitespace() || matches!(c, '*' | '_' | '~' | '('))
}

/// GFM autolink rules: trailing punctuation and unbalanced `)` are not part of the URL.
fn trim_url(url: &str) -> &str {
    let mut url = url.trim_end_matches(['.', ',', ':', ';', '!', '?', '"', '\'', '*', '_', '~']);
    while url.ends_with(')') && url.matches(')').count() > url.matches('(').count() {
        url = &url[..url.len() - 1];
        url = url.trim_end_matches(['.', ',', ':', ';', '!', '?', '"', '\'', '*', '_', '~']);
    }
    url
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::CardEntry;
    use crate::parser::tokens::lex;

    fn board() -> CardIndex {
        let mut index = CardIndex::default();
        index.insert(CardEntry::new(CardRecord::new("5a1", "abc12345", "Target & Co")));
        index.insert(CardEntry::new(CardRecord::new("5a2", "xyz98765", "Source")));
        index
    }

    fn render_with(md: &str, options: &Options) -> Rendered {
        let index = board();
        let card = index.get("xyz98765").unwrap();
        CardRenderer::new(card, "body", &index, options).render(&lex(md))
    }

    fn render(md: &str) -> Rendered {
        render_with(md, &Options::default())
    }

    #[test]
    fn card_link_with_url_text_uses_target_title() {
        let out = render("[https://trello.com/c/abc12345](https://trello.com/c/abc12345)");
        assert_eq!(out.html, "<p><a href=\"#5a1\">Target &amp; Co</a></p>");
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn card_link_keeps_custom_text() {
        let out = render("[see here](https://trello.com/c/abc12345/12-target-co)");
        assert_eq!(out.html, "<p><a href=\"#5a1\">see here</a></p>");
    }

    #[test]
    fn bare_card_url_is_autolinked() {
        let out = render("Related: https://trello.com/c/abc12345.");
        assert_eq!(out.html, "<p>Related: <a href=\"#5a1\">Target &amp; Co</a>.</p>");
    }

    #[test]
    fn top_of_card_anchor_resolves() {
        let out = render("[x](https://trello.com/c/abc12345#)");
        assert_eq!(out.html, "<p><a href=\"#5a1\">x</a></p>");
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn unknown_card_is_warned_and_passed_through() {
        let out = render("[gone](https://trello.com/c/zzzzzzzz)");
        assert_eq!(
            out.html,
            "<p><a href=\"https://trello.com/c/zzzzzzzz\">gone</a></p>"
        );
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].kind, WarningKind::UnresolvedLinkTarget);
        assert_eq!(out.warnings[0].message, "Link target is an unknown card");
        assert_eq!(
            out.warnings[0].context.href.as_deref(),
            Some("https://trello.com/c/zzzzzzzz")
        );
    }

    #[test]
    fn board_and_card_element_links_are_unresolved() {
        let out = render(
            "[board](https://trello.com/b/dMFueFPQ) [comment](https://trello.com/c/abc12345#comment-5a1)",
        );
        let messages: Vec<&str> = out.warnings.iter().map(|w| w.message.as_str()).collect();
        assert_eq!(
            messages,
            ["Link target is not a card", "Link target is a card element"]
        );
        assert!(out.html.contains("href=\"https://trello.com/b/dMFueFPQ\""));
    }

    #[test]
    fn external_links_are_untouched() {
        let out = render("[site](https://example.com/?a=1&b=2 \"Home\")");
        assert_eq!(
            out.html,
            "<p><a href=\"https://example.com/?a=1&amp;b=2\" title=\"Home\">site</a></p>"
        );
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn reference_links_resolve_through_shared_definitions() {
        let md = "intro\n\n# Prop\n\n[ref card][t]\n\n[t]: https://trello.com/c/abc12345\n";
        let segments = crate::parser::sections::segment(lex(md));
        let index = board();
        let card = index.get("xyz98765").unwrap();
        let options = Options::default();
        let out = CardRenderer::new(card, "prop", &index, &options)
            .render(&segments.properties[0].body);
        assert_eq!(out.html, "<p><a href=\"#5a1\">ref card</a></p>");
    }

    #[test]
    fn empty_link_target_renders_bare_text() {
        let options = Options::default().with_link_target_url(|_, _, _| Ok(String::new()));
        let out = render_with("[see](https://trello.com/c/abc12345)", &options);
        assert_eq!(out.html, "<p>see</p>");
    }

    #[test]
    fn link_target_policy_error_is_a_warning() {
        let options =
            Options::default().with_link_target_url(|_, _, _| Err(anyhow::anyhow!("no route")));
        let out = render_with("[see](https://trello.com/c/abc12345)", &options);
        assert_eq!(out.html, "<p>see</p>");
        assert_eq!(out.warnings[0].kind, WarningKind::PolicyFailed);
        assert!(out.warnings[0].message.contains("no route"));
    }

    #[test]
    fn link_target_is_escaped() {
        let options = Options::default()
            .with_link_target_url(|_, key, t| Ok(format!("/c?id={}&key=\"{}\"", t.id, key)));
        let out = render_with("[see](https://trello.com/c/abc12345)", &options);
        assert_eq!(
            out.html,
            "<p><a href=\"/c?id=5a1&amp;key=&quot;body&quot;\">see</a></p>"
        );
    }

    #[test]
    fn depth_two_heading_becomes_h1() {
        let out = render("## Getting Started");
        assert_eq!(out.html, "<h1 id=\"getting-started\">Getting Started</h1>");
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn heading_keeps_inline_markup() {
        let out = render("### The *best* part\n\ntext");
        assert_eq!(
            out.html,
            "<h2 id=\"the-best-part\">The <em>best</em> part</h2>\n<p>text</p>"
        );
    }

    #[test]
    fn out_of_range_level_is_clamped_and_warned() {
        let options = Options::default().with_header_map(|_, _, level| Ok(i32::from(level) + 5));
        let out = render_with("## Deep", &options);
        assert_eq!(out.html, "<h6 id=\"deep\">Deep</h6>");
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].kind, WarningKind::InvalidHeaderLevel);
        assert_eq!(out.warnings[0].context.level, Some(7));
    }

    #[test]
    fn nested_depth_one_heading_maps_to_zero() {
        let out = render("> # Quoted");
        assert!(out.html.contains("<h1 id=\"quoted\">Quoted</h1>"));
        assert_eq!(out.warnings[0].kind, WarningKind::InvalidHeaderLevel);
        assert_eq!(out.warnings[0].context.level, Some(0));
    }

    #[test]
    fn empty_header_id_omits_attribute() {
        let options = Options::default().with_header_id(|_, _, _| Ok(String::new()));
        let out = render_with("## Plain", &options);
        assert_eq!(out.html, "<h1>Plain</h1>");
    }

    #[test]
    fn header_id_policy_sees_plain_text_and_context() {
        let options = Options::default()
            .with_header_id(|card, key, text| Ok(format!("{}-{}-{}", card.short_id, key, text)));
        let out = render_with("## A `b` <c>", &options);
        assert!(out.html.starts_with("<h1 id=\"xyz98765-body-A b \">"));
    }

    #[test]
    fn soft_breaks_become_line_breaks() {
        let out = render("one\ntwo");
        assert_eq!(out.html, "<p>one<br />\ntwo</p>");
    }

    #[test]
    fn code_blocks_are_not_autolinked() {
        let out = render("```\nhttps://trello.com/c/zzzzzzzz\n```");
        assert_eq!(out.html, "<pre><code>https://trello.com/c/zzzzzzzz\n</code></pre>");
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn trailing_newlines_are_trimmed() {
        assert_eq!(render("para").html, "<p>para</p>");
        assert_eq!(render("").html, "");
    }

    #[test]
    fn image_alt_text_is_not_autolinked() {
        let out = render("![shot of https://trello.com/c/zzzzzzzz](https://img.test/a.png)");
        assert_eq!(
            out.html,
            "<p><img src=\"https://img.test/a.png\" alt=\"shot of https://trello.com/c/zzzzzzzz\" /></p>"
        );
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn raw_anchor_text_is_not_autolinked() {
        let out = render("<a href=\"https://x.test\">https://x.test</a> then https://y.test");
        assert_eq!(
            out.html,
            "<p><a href=\"https://x.test\">https://x.test</a> then <a href=\"https://y.test\">https://y.test</a></p>"
        );
    }

    #[test]
    fn raw_anchor_to_card_is_left_alone() {
        let out = render("<A HREF=\"/x\">https://trello.com/c/zzzzzzzz</A>");
        assert!(out.warnings.is_empty());
        assert!(!out.html.contains("<a href=\"https://trello.com"));
    }

    #[test]
    fn www_hosts_are_autolinked() {
        let out = render("Visit www.example.com/docs.");
        assert_eq!(
            out.html,
            "<p>Visit <a href=\"http://www.example.com/docs\">www.example.com/docs</a>.</p>"
        );
        assert_eq!(render("see awww.example.com").html, "<p>see awww.example.com</p>");
        assert_eq!(render("just www.").html, "<p>just www.</p>");
    }

    #[test]
    fn trims_autolink_punctuation() {
        assert_eq!(trim_url("https://x.test/a)."), "https://x.test/a");
        assert_eq!(trim_url("https://x.test/(a)"), "https://x.test/(a)");
        assert_eq!(trim_url("https://x.test/a,"), "https://x.test/a");
    }
}
