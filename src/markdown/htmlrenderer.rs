//! Renders Markdown [`Event`]s into HTML [`Token`]s. Generated markup is
//! tokenized as it's written; literal HTML from the source is carried as
//! [`Token::Raw`] so the `raw` stage can tokenize it in one piece. The
//! renderer itself is largely modeled after [`pulldown_cmark`]'s private
//! [`HtmlWriter`
//! struct](https://github.com/raphlinus/pulldown-cmark/blob/bf0a1a4938dbd2ec41c3add069b3d361d11731f4/src/html.rs#L36-L50).

use pulldown_cmark::escape::{escape_href, escape_html, StrWrite};
use pulldown_cmark::{Alignment, CodeBlockKind, CowStr, Event, LinkType, Tag};
use std::fmt::{self, Display};
use std::io;
use tracing::warn;

use super::html::{self, Token};
use super::{fence_language, Document, Form, Stage};

/// Prepended to footnote names to make their element ids.
const FOOTNOTE_PREFIX: &str = "fn-";

struct Adaptor<'a, T> {
    formatter: &'a mut T,
    result: fmt::Result,
}

impl<T> Adaptor<'_, T> {
    fn handle_result(&mut self, result: fmt::Result) -> io::Result<()> {
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.result = result;
                Err(io::Error::new(io::ErrorKind::Other, e))
            }
        }
    }
}

impl<T: fmt::Write> StrWrite for Adaptor<'_, T> {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        let result = self.formatter.write_str(s);
        self.handle_result(result)
    }

    fn write_fmt(&mut self, args: fmt::Arguments) -> io::Result<()> {
        let result = self.formatter.write_fmt(args);
        self.handle_result(result)
    }
}

struct EscapeHref<'a>(&'a str);

impl<'a> Display for EscapeHref<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut adaptor = Adaptor {
            formatter: f,
            result: Ok(()),
        };
        let _ = escape_href(&mut adaptor, self.0);
        adaptor.result
    }
}

struct EscapeHtml<'a>(&'a str);

impl<'a> Display for EscapeHtml<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut adaptor = Adaptor {
            formatter: f,
            result: Ok(()),
        };

        let _ = escape_html(&mut adaptor, self.0);
        adaptor.result
    }
}

enum TableState {
    Head,
    Body,
}

struct HtmlRenderer {
    table_alignments: Vec<Alignment>,
    table_state: TableState,
    table_cell_index: usize,

    /// Nesting depth of images. Inside an image everything renders as plain
    /// text into its `alt` attribute.
    image_depth: usize,
}

impl<'a> HtmlRenderer {
    fn on_event<W: StrWrite>(
        &mut self,
        w: &mut W,
        event: Event<'a>,
    ) -> io::Result<()> {
        if self.image_depth > 0 {
            return self.on_alt_text(w, event);
        }
        match event {
            Event::Start(tag) => self.on_start(w, tag),
            Event::End(tag) => self.on_end(w, tag),
            Event::Code(code) => self.on_code(w, code),
            Event::FootnoteReference(name) => write!(
                w,
                r##"<sup class="footnote-reference"><a href="#{}{}">{}</a></sup>"##,
                FOOTNOTE_PREFIX,
                EscapeHtml(&name),
                EscapeHtml(&name),
            ),
            Event::HardBreak => self.on_hard_break(w),
            Event::Html(html) => w.write_str(&html),
            Event::Rule => self.on_rule(w),
            Event::SoftBreak => self.on_soft_break(w),
            Event::TaskListMarker(checked) => {
                self.on_task_list_marker(w, checked)
            }
            Event::Text(text) => self.on_text(w, text),
        }
    }
}

impl<'a> HtmlRenderer {
    fn new() -> Self {
        HtmlRenderer {
            table_alignments: Vec::default(),
            table_state: TableState::Head,
            table_cell_index: usize::default(),
            image_depth: 0,
        }
    }

    fn on_start<W: StrWrite>(
        &mut self,
        w: &mut W,
        tag: Tag<'a>,
    ) -> io::Result<()> {
        match tag {
            Tag::BlockQuote => w.write_str("<blockquote>\n"),
            Tag::CodeBlock(kind) => match fence_language(&kind) {
                Some(lang) => write!(
                    w,
                    r#"<pre><code class="language-{}">"#,
                    EscapeHtml(lang)
                ),
                None => w.write_str("<pre><code>"),
            },
            Tag::Emphasis => w.write_str("<em>"),
            Tag::FootnoteDefinition(name) => {
                let name = EscapeHtml(&name);
                write!(
                    w,
                    r#"<div class="footnote-definition" id="{}{}"><sup class="footnote-definition-label">{}</sup>"#,
                    FOOTNOTE_PREFIX, &name, &name,
                )
            }
            Tag::Heading(level) => write!(w, "<h{}>", level),
            Tag::Image(_link_type, dest, _title) => {
                self.image_depth = 1;
                write!(w, r#"<img src="{}" alt=""#, EscapeHref(&dest))
            }
            Tag::Item => w.write_str("<li>"),
            Tag::Link(link_type, dest, title) => {
                let scheme = match link_type {
                    LinkType::Email => "mailto:",
                    _ => "",
                };
                write!(w, r#"<a href="{}{}""#, scheme, EscapeHref(&dest))?;
                if !title.is_empty() {
                    write!(w, r#" title="{}""#, EscapeHtml(&title))?;
                }
                w.write_str(">")
            }
            Tag::List(None) => w.write_str("<ul>\n"),
            Tag::List(Some(1)) => w.write_str("<ol>\n"),
            Tag::List(Some(start)) => write!(w, "<ol start=\"{}\">\n", start),
            Tag::Paragraph => w.write_str("<p>"),
            Tag::Strikethrough => w.write_str("<del>"),
            Tag::Strong => w.write_str("<strong>"),
            Tag::Table(alignments) => {
                self.table_alignments = alignments;
                w.write_str("<table>")
            }
            Tag::TableHead => {
                self.table_state = TableState::Head;
                self.table_cell_index = 0;
                w.write_str("<thead><tr>")
            }
            Tag::TableRow => {
                self.table_cell_index = 0;
                w.write_str("<tr>")
            }
            Tag::TableCell => write!(
                w,
                "<{}{}>",
                match self.table_state {
                    TableState::Head => "th",
                    TableState::Body => "td",
                },
                match self.table_alignments.get(self.table_cell_index) {
                    Some(Alignment::Left) => r#" align="left""#,
                    Some(Alignment::Right) => r#" align="right""#,
                    Some(Alignment::Center) => r#" align="center""#,
                    _ => "",
                }
            ),
        }
    }

    fn on_end<W: StrWrite>(&mut self, w: &mut W, tag: Tag) -> io::Result<()> {
        match tag {
            Tag::BlockQuote => w.write_str("</blockquote>\n"),
            Tag::CodeBlock(_) => w.write_str("</code></pre>\n"),
            Tag::Emphasis => w.write_str("</em>"),
            Tag::FootnoteDefinition(_) => w.write_str("</div>\n"),
            Tag::Heading(level) => write!(w, "</h{}>\n", level),
            Tag::Image(_, _, _) => Ok(()), // closed by on_alt_text
            Tag::Item => w.write_str("</li>\n"),
            Tag::Link(_, _, _) => w.write_str("</a>"),
            Tag::List(Some(_)) => w.write_str("</ol>\n"),
            Tag::List(None) => w.write_str("</ul>\n"),
            Tag::Paragraph => w.write_str("</p>\n"),
            Tag::Strikethrough => w.write_str("</del>"),
            Tag::Strong => w.write_str("</strong>"),
            Tag::Table(_) => w.write_str("</tbody></table>\n"),
            Tag::TableHead => {
                self.table_state = TableState::Body;
                w.write_str("</tr></thead><tbody>\n")
            }
            Tag::TableRow => w.write_str("</tr>\n"),
            Tag::TableCell => {
                self.table_cell_index += 1;
                w.write_str(match self.table_state {
                    TableState::Head => "</th>",
                    TableState::Body => "</td>",
                })
            }
        }
    }

    /// Handles events between an image's start and end, which make up its
    /// alt text.
    fn on_alt_text<W: StrWrite>(
        &mut self,
        w: &mut W,
        event: Event<'a>,
    ) -> io::Result<()> {
        match event {
            Event::Start(Tag::Image(..)) => {
                self.image_depth += 1;
                Ok(())
            }
            Event::End(Tag::Image(_, _, title)) => {
                self.image_depth -= 1;
                if self.image_depth > 0 {
                    return Ok(());
                }
                w.write_str("\"")?;
                if !title.is_empty() {
                    write!(w, r#" title="{}""#, EscapeHtml(&title))?;
                }
                w.write_str(" />")
            }
            Event::Text(text) | Event::Code(text) => escape_html(w, &text),
            Event::SoftBreak | Event::HardBreak => w.write_str(" "),
            _ => Ok(()),
        }
    }

    fn on_text<W: StrWrite>(
        &mut self,
        w: &mut W,
        s: CowStr,
    ) -> io::Result<()> {
        escape_html(w, &s)
    }

    fn on_code<W: StrWrite>(
        &mut self,
        w: &mut W,
        s: CowStr,
    ) -> io::Result<()> {
        write!(w, "<code>{}</code>", EscapeHtml(&s))
    }

    fn on_soft_break<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        w.write_str("\n")
    }

    fn on_hard_break<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        w.write_str("<br />\n")
    }

    fn on_rule<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        w.write_str("<hr />\n")
    }

    fn on_task_list_marker<W: StrWrite>(
        &mut self,
        w: &mut W,
        checked: bool,
    ) -> io::Result<()> {
        write!(
            w,
            r#"<input disabled="" type="checkbox" {}/>"#,
            match checked {
                true => r#"checked="" "#,
                false => "",
            }
        )
    }
}

/// Converts [`Event`]s into HTML tokens much like
/// `pulldown_cmark::html::push_html` converts them into a string. Literal
/// HTML events become [`Token::Raw`].
pub fn push_tokens<'a, I>(tokens: &mut Vec<Token>, events: I) -> io::Result<()>
where
    I: IntoIterator<Item = Event<'a>>,
{
    let mut renderer = HtmlRenderer::new();
    let mut buffer = String::new();
    for event in events {
        match event {
            Event::Html(literal) if renderer.image_depth == 0 => {
                flush(tokens, &mut buffer);
                tokens.push(Token::Raw(literal.into_string()));
            }
            event => renderer.on_event(&mut buffer, event)?,
        }
    }
    flush(tokens, &mut buffer);
    Ok(())
}

fn flush(tokens: &mut Vec<Token>, buffer: &mut String) {
    if !buffer.is_empty() {
        tokens.extend(html::tokenize(buffer));
        buffer.clear();
    }
}

/// The `to-html` stage.
pub struct ToHtml;

impl Stage for ToHtml {
    fn name(&self) -> &'static str {
        "to-html"
    }

    fn input(&self) -> Form {
        Form::Markdown
    }

    fn output(&self) -> Form {
        Form::Html
    }

    fn apply<'a>(&self, doc: Document<'a>) -> Document<'a> {
        let events = match doc {
            Document::Markdown(events) => events,
            other => return other,
        };
        let mut tokens = Vec::new();
        if let Err(err) = push_tokens(&mut tokens, events) {
            warn!(%err, "failed to render markdown events");
        }
        Document::Html(tokens)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::markdown::parse::Parse;

    fn render(source: &str) -> String {
        let doc = ToHtml.apply(Parse::new().apply(Document::Source(source)));
        match doc {
            Document::Html(tokens) => html::serialize(&tokens),
            other => panic!("unexpected document {:?}", other),
        }
    }

    #[test]
    fn test_render_blocks() {
        let cases = &[
            ("# Title", "<h1>Title</h1>\n"),
            ("#### Deep", "<h4>Deep</h4>\n"),
            ("a *b* **c** ~~d~~ `e<f`", "<p>a <em>b</em> <strong>c</strong> <del>d</del> <code>e&lt;f</code></p>\n"),
            ("> quoted", "<blockquote>\n<p>quoted</p>\n</blockquote>\n"),
            ("- one\n- two", "<ul>\n<li>one</li>\n<li>two</li>\n</ul>\n"),
            ("3. three", "<ol start=\"3\">\n<li>three</li>\n</ol>\n"),
            ("---", "<hr />\n"),
            ("```sh\necho hi\n```", "<pre><code class=\"language-sh\">echo hi\n</code></pre>\n"),
        ];
        for (source, wanted) in cases {
            assert_eq!(&render(source), wanted, "source: {}", source);
        }
    }

    #[test]
    fn test_render_links_and_images() {
        assert_eq!(
            render("[a](/x \"T\") [b](/y) <me@example.com>"),
            "<p><a href=\"/x\" title=\"T\">a</a> <a href=\"/y\">b</a> <a href=\"mailto:me@example.com\">me@example.com</a></p>\n"
        );
        assert_eq!(
            render("![the *alt* text](/img.png \"Title\")"),
            "<p><img src=\"/img.png\" alt=\"the alt text\" title=\"Title\" /></p>\n"
        );
    }

    #[test]
    fn test_render_table() {
        assert_eq!(
            render("| a | b |\n|:-:|---|\n| 1 | 2 |"),
            "<table><thead><tr><th align=\"center\">a</th><th>b</th></tr></thead><tbody>\n\
             <tr><td align=\"center\">1</td><td>2</td></tr>\n</tbody></table>\n"
        );
    }

    #[test]
    fn test_render_footnotes() {
        let html = render("Claim[^1].\n\n[^1]: Source.");
        assert!(
            html.contains("<sup class=\"footnote-reference\"><a href=\"#fn-1\">1</a></sup>"),
            "{}",
            html
        );
        assert!(
            html.contains("<div class=\"footnote-definition\" id=\"fn-1\">"),
            "{}",
            html
        );
    }

    #[test]
    fn test_literal_html_is_raw() {
        let doc = ToHtml.apply(Parse::new().apply(Document::Source(
            "<div class=\"x\">\n\ntext\n\n</div>\n",
        )));
        match doc {
            Document::Html(tokens) => {
                assert_eq!(tokens[0], Token::Raw("<div class=\"x\">\n".to_owned()));
                assert!(matches!(&tokens[1], Token::Start(tag) if tag.name() == "p"));
                assert_eq!(
                    tokens.last(),
                    Some(&Token::Raw("</div>\n".to_owned()))
                );
            }
            other => panic!("unexpected document {:?}", other),
        }
    }
}
