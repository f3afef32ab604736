//! A flat HTML token stream read with `quick-xml` in lenient mode. Reading
//! never fails: markup the reader rejects is kept as text. Tokens keep the
//! exact source bytes they were read from, so a token stream that nobody
//! modified serializes back to its input byte for byte.

use std::borrow::Cow;

use quick_xml::escape::{escape, resolve_html5_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::{Document, Form, Stage};

/// One piece of an HTML document.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    /// An opening (or self-closing) tag.
    Start(StartTag),

    /// A closing tag.
    End(EndTag),

    /// Character data, still escaped.
    Text(String),

    /// Comments, doctypes, and other `<!...>`/`<?...>` markup.
    Markup(String),

    /// Literal HTML that hasn't been tokenized yet.
    Raw(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct StartTag {
    /// Lowercase tag name.
    name: String,

    /// Everything between `<` and `>` (or `/>`), as written.
    elem: BytesStart<'static>,
    self_closing: bool,
}

impl StartTag {
    pub fn new(name: &str) -> StartTag {
        StartTag {
            name: name.to_ascii_lowercase(),
            elem: BytesStart::new(name.to_owned()),
            self_closing: false,
        }
    }

    fn read(elem: BytesStart, self_closing: bool) -> StartTag {
        StartTag {
            name: String::from_utf8_lossy(elem.name().as_ref()).to_ascii_lowercase(),
            elem: elem.into_owned(),
            self_closing,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn self_closing(&self) -> bool {
        self.self_closing
    }

    /// Returns the decoded value of an attribute. Valueless attributes (e.g.,
    /// `disabled`) have an empty value.
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.elem
            .html_attributes()
            .flatten()
            .find(|attr| attr.key.as_ref().eq_ignore_ascii_case(name.as_bytes()))
            .map(|attr| decode_entities(&String::from_utf8_lossy(&attr.value)).into_owned())
    }

    /// Sets an attribute to an unescaped value. A new attribute is appended
    /// to the tag as written; replacing one rebuilds the tag.
    pub fn set_attribute(&mut self, name: &str, value: &str) {
        let exists = self
            .elem
            .html_attributes()
            .flatten()
            .any(|attr| attr.key.as_ref().eq_ignore_ascii_case(name.as_bytes()));
        if !exists {
            self.elem.push_attribute((name, value));
            return;
        }

        let escaped = escape(value);
        let attrs: Vec<(Vec<u8>, Vec<u8>)> = self
            .elem
            .html_attributes()
            .flatten()
            .map(|attr| {
                let key = attr.key.as_ref().to_vec();
                if attr.key.as_ref().eq_ignore_ascii_case(name.as_bytes()) {
                    (key, escaped.as_bytes().to_vec())
                } else {
                    // Values are rewritten double-quoted.
                    let value = String::from_utf8_lossy(&attr.value).replace('"', "&quot;");
                    (key, value.into_bytes())
                }
            })
            .collect();
        let mut elem = BytesStart::new(String::from_utf8_lossy(self.elem.name().as_ref()).into_owned());
        for (key, value) in &attrs {
            elem.push_attribute((key.as_slice(), value.as_slice()));
        }
        self.elem = elem;
    }

    fn write(&self, out: &mut String) {
        out.push('<');
        out.push_str(&String::from_utf8_lossy(&self.elem));
        out.push_str(if self.self_closing { "/>" } else { ">" });
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EndTag {
    name: String,
    raw: String,
}

impl EndTag {
    pub fn new(name: &str) -> EndTag {
        EndTag {
            name: name.to_ascii_lowercase(),
            raw: format!("</{}>", name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Elements whose content is read as plain text up to the matching end tag.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea"];

fn create_reader(input: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_reader(input.as_bytes());
    reader.config_mut().trim_text(false);
    reader.config_mut().enable_all_checks(false);
    reader.config_mut().allow_unmatched_ends = true;
    reader
}

fn starts_with_letter(name: &[u8]) -> bool {
    name.first().map_or(false, u8::is_ascii_alphabetic)
}

/// Collects tokens, merging adjacent runs of text.
struct Tokens<'i> {
    input: &'i str,
    tokens: Vec<Token>,

    /// Where the pending text run starts.
    text_start: usize,
}

impl Tokens<'_> {
    fn push(&mut self, token: Token, start: usize) {
        if self.text_start < start {
            let text = &self.input[self.text_start..start];
            self.tokens.push(Token::Text(text.to_owned()));
        }
        self.tokens.push(token);
    }
}

/// Splits `input` into tokens.
pub fn tokenize(input: &str) -> Vec<Token> {
    let mut out = Tokens {
        input,
        tokens: Vec::new(),
        text_start: 0,
    };

    // The reader is restarted at `offset` whenever it has to be steered past
    // something it can't read.
    let mut offset = 0;
    let mut reader = create_reader(input);
    loop {
        let start = offset + reader.buffer_position() as usize;
        let event = reader.read_event();
        let end = offset + reader.buffer_position() as usize;
        let slice = || input.get(start..end).unwrap_or("").to_owned();

        let restart_at = match event {
            Ok(Event::Eof) => break,
            Ok(Event::Start(elem)) if starts_with_letter(elem.name().as_ref()) => {
                let tag = StartTag::read(elem, false);
                let raw_text = RAW_TEXT_ELEMENTS.contains(&tag.name());
                let name = tag.name.clone();
                out.push(Token::Start(tag), start);
                out.text_start = end;
                if raw_text {
                    Some(end + raw_text_len(&input[end..], &name))
                } else {
                    None
                }
            }
            Ok(Event::Empty(elem)) if starts_with_letter(elem.name().as_ref()) => {
                out.push(Token::Start(StartTag::read(elem, true)), start);
                out.text_start = end;
                None
            }
            Ok(Event::End(elem)) if starts_with_letter(elem.name().as_ref()) => {
                let name = String::from_utf8_lossy(elem.name().as_ref()).to_ascii_lowercase();
                out.push(Token::End(EndTag { name, raw: slice() }), start);
                out.text_start = end;
                None
            }
            Ok(Event::Comment(_))
            | Ok(Event::CData(_))
            | Ok(Event::Decl(_))
            | Ok(Event::PI(_))
            | Ok(Event::DocType(_)) => {
                out.push(Token::Markup(slice()), start);
                out.text_start = end;
                None
            }
            // Text and character references stay in the pending text run.
            Ok(_) if input.as_bytes().get(start) != Some(&b'<') => None,

            // A `<` that doesn't open a tag the way HTML spells one, or
            // markup the reader gave up on: it's text, and reading resumes
            // after it.
            _ => {
                let width = input[start..].chars().next().map_or(1, char::len_utf8);
                Some(start + width)
            }
        };

        if let Some(at) = restart_at {
            if at >= input.len() {
                break;
            }
            offset = at;
            reader = create_reader(&input[offset..]);
        }
    }

    if out.text_start < input.len() {
        out.tokens
            .push(Token::Text(input[out.text_start..].to_owned()));
    }
    out.tokens
}

/// Writes tokens back out as HTML.
pub fn serialize(tokens: &[Token]) -> String {
    let mut out = String::new();
    for token in tokens {
        match token {
            Token::Start(tag) => tag.write(&mut out),
            Token::End(tag) => out.push_str(&tag.raw),
            Token::Text(s) | Token::Markup(s) | Token::Raw(s) => out.push_str(s),
        }
    }
    out
}

/// Returns the length of the text before `</name` (case-insensitive), or the
/// whole input if there's no end tag.
fn raw_text_len(rest: &str, name: &str) -> usize {
    let bytes = rest.as_bytes();
    let mut pos = 0;
    while let Some(i) = rest[pos..].find("</") {
        let start = pos + i;
        let candidate = &bytes[start + 2..];
        if candidate.len() >= name.len()
            && candidate[..name.len()].eq_ignore_ascii_case(name.as_bytes())
        {
            return start;
        }
        pos = start + 2;
    }
    rest.len()
}

/// Escapes a string for use inside a double-quoted attribute value.
pub fn escape_attribute(s: &str) -> Cow<str> {
    escape(s)
}

/// Decodes character references, named ones by the HTML5 table. A reference
/// that isn't recognized is left as written.
pub fn decode_entities(s: &str) -> Cow<str> {
    if let Ok(decoded) = unescape_with(s, resolve_html5_entity) {
        return decoded;
    }

    // Something in `s` isn't a reference; decode the ones that are.
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .find(';')
            .filter(|semi| *semi > 1 && *semi <= 32)
            .and_then(|semi| {
                unescape_with(&rest[..=semi], resolve_html5_entity)
                    .ok()
                    .map(|c| (c.into_owned(), semi))
            });
        match decoded {
            Some((c, semi)) => {
                out.push_str(&c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Tokenizes literal HTML so later stages can see inside it. Adjacent
/// literal fragments are joined first, since a single element may have been
/// split across several of them.
pub struct Materialize;

impl Stage for Materialize {
    fn name(&self) -> &'static str {
        "raw"
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

        let mut out = Vec::with_capacity(tokens.len());
        let mut pending = String::new();
        for token in tokens {
            match token {
                Token::Raw(html) => pending.push_str(&html),
                token => {
                    if !pending.is_empty() {
                        out.extend(tokenize(&pending));
                        pending.clear();
                    }
                    out.push(token);
                }
            }
        }
        if !pending.is_empty() {
            out.extend(tokenize(&pending));
        }
        Document::Html(out)
    }
}

/// Serializes the token stream to a string.
pub struct Stringify;

impl Stage for Stringify {
    fn name(&self) -> &'static str {
        "stringify"
    }

    fn input(&self) -> Form {
        Form::Html
    }

    fn output(&self) -> Form {
        Form::Serialized
    }

    fn apply<'a>(&self, doc: Document<'a>) -> Document<'a> {
        match doc {
            Document::Html(tokens) => Document::Serialized(serialize(&tokens)),
            other => other,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_round_trip_is_byte_faithful() {
        let inputs = &[
            "<p>Hello <em>world</em></p>",
            "<div class='a' data-x=1 hidden><br><img src=\"x.png\" /></div>",
            "a < b && c > d",
            "<pre class=\"mermaid\">A-->B\nB<--C</pre>",
            "<!-- comment --><!DOCTYPE html><?xml version=\"1.0\"?>",
            "<script>if (a < b) { x = \"</p>\"; }</script><p>after</p>",
            "<unterminated attr=\"x",
            "<!-- never closed",
            "</>< >",
            "한글 <b>굵게</b> 텍스트 &mdash; &copy;",
            "<a href=\"#\"title=x>odd spacing</a >",
            "</p>stray end<br/>",
        ];
        for input in inputs {
            assert_eq!(&serialize(&tokenize(input)), input);
        }
    }

    #[test]
    fn test_tokenize_structure() {
        let tokens = tokenize("<h2 id=\"x\" class=title>Hi &amp; bye</h2>");
        assert_eq!(tokens.len(), 3);
        match &tokens[0] {
            Token::Start(tag) => {
                assert_eq!(tag.name(), "h2");
                assert_eq!(tag.attribute("id").as_deref(), Some("x"));
                assert_eq!(tag.attribute("CLASS").as_deref(), Some("title"));
                assert_eq!(tag.attribute("missing"), None);
            }
            other => panic!("unexpected token {:?}", other),
        }
        assert_eq!(tokens[1], Token::Text("Hi &amp; bye".to_owned()));
        match &tokens[2] {
            Token::End(tag) => assert_eq!(tag.name(), "h2"),
            other => panic!("unexpected token {:?}", other),
        }
    }

    #[test]
    fn test_unreadable_markup_is_text() {
        let tokens = tokenize("1 < 2 <b>bold</b>");
        assert_eq!(tokens[0], Token::Text("1 < 2 ".to_owned()));
        assert!(matches!(&tokens[1], Token::Start(tag) if tag.name() == "b"));
    }

    #[test]
    fn test_raw_text_elements() {
        let tokens = tokenize("<style>h1 > a { color: red }</STYLE>");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[1], Token::Text("h1 > a { color: red }".to_owned()));
        assert!(matches!(&tokens[2], Token::End(tag) if tag.name() == "style"));
    }

    #[test]
    fn test_set_attribute() {
        let mut tokens = tokenize("<H3 class='x'>T</H3>");
        if let Token::Start(tag) = &mut tokens[0] {
            tag.set_attribute("id", "a\"b");
        }
        assert_eq!(
            serialize(&tokens),
            "<H3 class='x' id=\"a&quot;b\">T</H3>"
        );

        if let Token::Start(tag) = &mut tokens[0] {
            tag.set_attribute("class", "y");
            assert_eq!(tag.attribute("id").as_deref(), Some("a\"b"));
        }
        assert_eq!(
            serialize(&tokens),
            "<H3 class=\"y\" id=\"a&quot;b\">T</H3>"
        );
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a &amp; b"), "a & b");
        assert_eq!(decode_entities("&lt;tag&gt; &#65;&#x42;"), "<tag> AB");
        assert_eq!(decode_entities("Rust &mdash; &copy; 2024"), "Rust \u{2014} \u{a9} 2024");
        assert_eq!(decode_entities("&unknown; & &hellip;"), "&unknown; & \u{2026}");
        assert_eq!(decode_entities("plain"), "plain");
    }

    #[test]
    fn test_materialize_joins_fragments() {
        let doc = Document::Html(vec![
            Token::Raw("<div\n".to_owned()),
            Token::Raw("class=\"x\">\n".to_owned()),
            Token::Raw("<h2>Inside</h2></div>".to_owned()),
        ]);
        match Materialize.apply(doc) {
            Document::Html(tokens) => {
                assert!(matches!(&tokens[0], Token::Start(tag) if tag.attribute("class").as_deref() == Some("x")));
                assert!(tokens
                    .iter()
                    .any(|t| matches!(t, Token::Start(tag) if tag.name() == "h2")));
                assert!(!tokens.iter().any(|t| matches!(t, Token::Raw(_))));
            }
            _ => panic!("expected html"),
        }
    }
}
