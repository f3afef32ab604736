//! Heading anchors: the `slug` stage gives every heading a unique `id`, and
//! the `autolink` stage wraps each heading's content in a link to itself.
//! Both work on the tokenized HTML, so headings written as literal HTML are
//! treated the same as Markdown headings.

use std::collections::HashMap;

use super::html::{decode_entities, EndTag, StartTag, Token};
use super::{Document, Form, SlugMode, Stage};

const HEADINGS: &[&str] = &["h1", "h2", "h3", "h4", "h5", "h6"];

/// Elements whose content is never touched.
const OPAQUE: &[&str] = &["pre", "code", "script", "style", "textarea"];

fn is_heading(name: &str) -> bool {
    HEADINGS.contains(&name)
}

fn is_opaque(name: &str) -> bool {
    OPAQUE.contains(&name)
}

/// Generates unique slugs for one document. Repeated slugs get a numeric
/// suffix (`intro`, `intro-1`, `intro-2`, ...), skipping any suffix that
/// would collide with a slug already in use.
pub struct Slugger {
    mode: SlugMode,
    occurrences: HashMap<String, usize>,
}

impl Slugger {
    pub fn new(mode: SlugMode) -> Slugger {
        Slugger {
            mode,
            occurrences: HashMap::new(),
        }
    }

    /// Marks `id` as taken.
    pub fn reserve(&mut self, id: &str) {
        self.occurrences.entry(id.to_owned()).or_insert(0);
    }

    /// Returns a unique slug for `text`, or `None` if `text` has nothing to
    /// slug.
    pub fn slug(&mut self, text: &str) -> Option<String> {
        let base = match self.mode {
            SlugMode::Github => github_slug(text),
            SlugMode::Ascii => slug::slugify(text),
        };
        if base.is_empty() {
            return None;
        }

        let mut result = base.clone();
        while self.occurrences.contains_key(&result) {
            let count = self.occurrences.entry(base.clone()).or_insert(0);
            *count += 1;
            result = format!("{}-{}", base, count);
        }
        self.occurrences.insert(result.clone(), 0);
        Some(result)
    }
}

/// Slugs text the way GitHub does for heading anchors: lowercase, with
/// whitespace turned into hyphens and punctuation dropped.
pub fn github_slug(text: &str) -> String {
    text.trim()
        .to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('-')
            } else if c.is_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else {
                None
            }
        })
        .collect()
}

/// Returns the index of the end tag closing the element that starts at
/// `start`.
fn element_end(tokens: &[Token], start: usize) -> Option<usize> {
    let name = match tokens.get(start)? {
        Token::Start(tag) => tag.name(),
        _ => return None,
    };
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(start + 1) {
        match token {
            Token::Start(tag) if tag.name() == name && !tag.self_closing() => depth += 1,
            Token::End(tag) if tag.name() == name => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// The decoded, trimmed text content of `tokens`.
fn text_content(tokens: &[Token]) -> String {
    let mut text = String::new();
    for token in tokens {
        if let Token::Text(s) = token {
            text.push_str(&decode_entities(s));
        }
    }
    text.trim().to_owned()
}

/// The `slug` stage. Headings that already have an `id` keep it. Every `id`
/// in the document (footnotes included) is reserved before any slug is
/// generated.
pub struct Slug {
    mode: SlugMode,
}

impl Slug {
    pub fn new(mode: SlugMode) -> Slug {
        Slug { mode }
    }
}

impl Stage for Slug {
    fn name(&self) -> &'static str {
        "slug"
    }

    fn input(&self) -> Form {
        Form::Html
    }

    fn output(&self) -> Form {
        Form::Html
    }

    fn apply<'a>(&self, doc: Document<'a>) -> Document<'a> {
        let mut tokens = match doc {
            Document::Html(tokens) => tokens,
            other => return other,
        };

        let mut slugger = Slugger::new(self.mode);
        for token in &tokens {
            if let Token::Start(tag) = token {
                if let Some(id) = tag.attribute("id") {
                    slugger.reserve(&id);
                }
            }
        }

        let mut opaque = 0usize;
        for i in 0..tokens.len() {
            let heading_end = match &tokens[i] {
                Token::Start(tag) if is_opaque(tag.name()) && !tag.self_closing() => {
                    opaque += 1;
                    None
                }
                Token::End(tag) if is_opaque(tag.name()) => {
                    opaque = opaque.saturating_sub(1);
                    None
                }
                Token::Start(tag)
                    if opaque == 0 && is_heading(tag.name()) && tag.attribute("id").is_none() =>
                {
                    element_end(&tokens, i)
                }
                _ => None,
            };

            let end = match heading_end {
                Some(end) => end,
                None => continue,
            };
            let text = text_content(&tokens[i + 1..end]);
            if let Some(id) = slugger.slug(&text) {
                if let Token::Start(tag) = &mut tokens[i] {
                    tag.set_attribute("id", &id);
                }
            }
        }
        Document::Html(tokens)
    }
}

/// The `autolink` stage. Headings that have no `id`, that sit inside a link
/// or an opaque element, or that already contain a link are left alone.
pub struct Autolink;

impl Stage for Autolink {
    fn name(&self) -> &'static str {
        "autolink"
    }

    fn input(&self) -> Form {
        Form::Html
    }

    fn output(&self) -> Form {
        Form::Html
    }

    fn apply<'a>(&self, doc: Document<'a>) -> Document<'a> {
        let tokens = match doc {
            Document::Html(tokens) => tokens,
            other => return other,
        };

        // (heading start, heading end, id)
        let mut wraps: Vec<(usize, usize, String)> = Vec::new();
        let mut anchors = 0usize;
        let mut opaque = 0usize;
        for (i, token) in tokens.iter().enumerate() {
            match token {
                Token::Start(tag) if tag.name() == "a" && !tag.self_closing() => anchors += 1,
                Token::End(tag) if tag.name() == "a" => anchors = anchors.saturating_sub(1),
                Token::Start(tag) if is_opaque(tag.name()) && !tag.self_closing() => opaque += 1,
                Token::End(tag) if is_opaque(tag.name()) => opaque = opaque.saturating_sub(1),
                Token::Start(tag) if is_heading(tag.name()) && anchors == 0 && opaque == 0 => {
                    let inside_previous = wraps.last().map_or(false, |(_, end, _)| i < *end);
                    let id = tag.attribute("id").filter(|id| !id.is_empty());
                    if let (Some(id), Some(end), false) = (id, element_end(&tokens, i), inside_previous) {
                        let has_anchor = tokens[i + 1..end]
                            .iter()
                            .any(|t| matches!(t, Token::Start(tag) if tag.name() == "a"));
                        if !has_anchor {
                            wraps.push((i, end, id));
                        }
                    }
                }
                _ => {}
            }
        }

        let mut out = Vec::with_capacity(tokens.len() + 2 * wraps.len());
        let mut wraps = wraps.into_iter().peekable();
        let mut close_at = None;
        for (i, token) in tokens.into_iter().enumerate() {
            if close_at == Some(i) {
                out.push(Token::End(EndTag::new("a")));
                close_at = None;
            }
            out.push(token);
            if wraps.peek().map_or(false, |(start, _, _)| *start == i) {
                if let Some((_, end, id)) = wraps.next() {
                    let mut anchor = StartTag::new("a");
                    anchor.set_attribute("href", &format!("#{}", id));
                    out.push(Token::Start(anchor));
                    close_at = Some(end);
                }
            }
        }
        Document::Html(out)
    }
}
