//! The first two stages: parsing Markdown source into events, and turning
//! bare URLs in the parsed text into links.

use pulldown_cmark::{CowStr, Event, LinkType, Options, Parser, Tag};

use super::{Document, Form, Stage};

/// Parses Markdown source with the GitHub-flavored extensions the parser
/// supports natively.
pub struct Parse {
    options: Options,
}

impl Parse {
    pub fn new() -> Parse {
        Parse {
            options: Options::ENABLE_TABLES
                | Options::ENABLE_FOOTNOTES
                | Options::ENABLE_STRIKETHROUGH
                | Options::ENABLE_TASKLISTS,
        }
    }
}

impl Default for Parse {
    fn default() -> Self {
        Parse::new()
    }
}

impl Stage for Parse {
    fn name(&self) -> &'static str {
        "parse"
    }

    fn input(&self) -> Form {
        Form::Source
    }

    fn output(&self) -> Form {
        Form::Markdown
    }

    fn apply<'a>(&self, doc: Document<'a>) -> Document<'a> {
        match doc {
            Document::Source(source) => {
                Document::Markdown(coalesce_text(Parser::new_ext(source, self.options)))
            }
            other => other,
        }
    }
}

/// Merges runs of adjacent text events. The parser splits text at every
/// character that might have started some inline construct, which would
/// otherwise hide URLs and shortcodes from the stages that look for them.
fn coalesce_text<'a, I>(events: I) -> Vec<Event<'a>>
where
    I: Iterator<Item = Event<'a>>,
{
    let mut out: Vec<Event<'a>> = Vec::new();
    for event in events {
        if let Event::Text(text) = &event {
            if let Some(Event::Text(prev)) = out.last_mut() {
                let mut merged = String::from(&**prev);
                merged.push_str(text);
                *prev = CowStr::from(merged);
                continue;
            }
        }
        out.push(event);
    }
    out
}

/// Links literal `http://`, `https://`, and `www.` URLs, GitHub style.
pub struct Gfm;

impl Stage for Gfm {
    fn name(&self) -> &'static str {
        "gfm"
    }

    fn input(&self) -> Form {
        Form::Markdown
    }

    fn output(&self) -> Form {
        Form::Markdown
    }

    fn apply<'a>(&self, doc: Document<'a>) -> Document<'a> {
        match doc {
            Document::Markdown(events) => Document::Markdown(link_urls(events)),
            other => other,
        }
    }
}

fn link_urls(events: Vec<Event>) -> Vec<Event> {
    let mut out = Vec::with_capacity(events.len());

    // depth of links, images, code blocks, and inline anchors
    let mut opaque = 0usize;
    for event in events {
        match &event {
            Event::Start(Tag::Link(..)) | Event::Start(Tag::Image(..)) | Event::Start(Tag::CodeBlock(_)) => {
                opaque += 1
            }
            Event::End(Tag::Link(..)) | Event::End(Tag::Image(..)) | Event::End(Tag::CodeBlock(_)) => {
                opaque = opaque.saturating_sub(1)
            }
            Event::Html(html) if opens_anchor(html) => opaque += 1,
            Event::Html(html) if closes_anchor(html) => opaque = opaque.saturating_sub(1),
            Event::Text(text) if opaque == 0 => {
                if let Some(linked) = link_text(text) {
                    out.extend(linked);
                    continue;
                }
            }
            _ => {}
        }
        out.push(event);
    }
    out
}

fn opens_anchor(html: &str) -> bool {
    let bytes = html.trim_start().as_bytes();
    bytes.len() >= 3
        && bytes[0] == b'<'
        && bytes[1].eq_ignore_ascii_case(&b'a')
        && (bytes[2] == b'>' || bytes[2].is_ascii_whitespace())
}

fn closes_anchor(html: &str) -> bool {
    let html = html.trim();
    html.get(..4).map_or(false, |head| head.eq_ignore_ascii_case("</a>"))
}

/// Splits `text` into text and link events, or returns `None` if it holds
/// no URLs.
fn link_text<'a>(text: &str) -> Option<Vec<Event<'a>>> {
    let mut events = Vec::new();
    let mut last = 0;
    let mut pos = 0;
    while pos < text.len() {
        let rest = &text[pos..];
        let at_boundary = text[..pos]
            .chars()
            .next_back()
            .map_or(true, |c| c.is_whitespace() || "(*_~\"'".contains(c));
        if at_boundary {
            if let Some(len) = url_len(rest) {
                if last < pos {
                    events.push(Event::Text(CowStr::from(text[last..pos].to_owned())));
                }
                let url = &rest[..len];
                let href = if starts_with_ignore_case(url, "www.") {
                    format!("http://{}", url)
                } else {
                    url.to_owned()
                };
                events.push(Event::Start(Tag::Link(
                    LinkType::Autolink,
                    CowStr::from(href.clone()),
                    CowStr::Borrowed(""),
                )));
                events.push(Event::Text(CowStr::from(url.to_owned())));
                events.push(Event::End(Tag::Link(
                    LinkType::Autolink,
                    CowStr::from(href),
                    CowStr::Borrowed(""),
                )));
                pos += len;
                last = pos;
                continue;
            }
        }
        pos += rest.chars().next().map_or(1, char::len_utf8);
    }

    if events.is_empty() {
        return None;
    }
    if last < text.len() {
        events.push(Event::Text(CowStr::from(text[last..].to_owned())));
    }
    Some(events)
}

const URL_PREFIXES: &[&str] = &["https://", "http://", "www."];

/// Returns the length of the URL at the start of `s`, if there is one.
fn url_len(s: &str) -> Option<usize> {
    let prefix = URL_PREFIXES
        .iter()
        .find(|prefix| starts_with_ignore_case(s, prefix))?;

    let end = s
        .find(|c: char| c.is_whitespace() || c == '<')
        .unwrap_or_else(|| s.len());
    let mut url = &s[..end];
    loop {
        let trimmed = url.trim_end_matches(|c: char| "?!.,:*_~'\"".contains(c));
        let trimmed = if trimmed.ends_with(')')
            && trimmed.matches('(').count() < trimmed.matches(')').count()
        {
            &trimmed[..trimmed.len() - 1]
        } else {
            trimmed
        };
        if trimmed.len() == url.len() {
            break;
        }
        url = trimmed;
    }

    if url.len() <= prefix.len() {
        return None;
    }
    let domain_start = if *prefix == "www." { 0 } else { prefix.len() };
    let domain = url[domain_start..]
        .split(|c: char| c == '/' || c == '?' || c == '#')
        .next()
        .and_then(|host| host.split(':').next())
        .unwrap_or("");
    if valid_domain(domain) {
        Some(url.len())
    } else {
        None
    }
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.get(..prefix.len())
        .map_or(false, |head| head.eq_ignore_ascii_case(prefix))
}

fn valid_domain(domain: &str) -> bool {
    domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
        && domain
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
}
