use std::borrow::Cow;

use pulldown_cmark::{CowStr, Event, LinkType, Tag};

use super::{Document, Form, Stage};

/// Text emoticons and the emoji that replace them.
const EMOTICONS: &[(&str, &str)] = &[
    (":)", "🙂"),
    (":-)", "🙂"),
    (":(", "🙁"),
    (":-(", "🙁"),
    (";)", "😉"),
    (";-)", "😉"),
    (":D", "😄"),
    (":-D", "😄"),
    (":P", "😛"),
    (":-P", "😛"),
    (":O", "😮"),
    ("<3", "\u{2764}\u{fe0f}"),
    (":'(", "😢"),
];

/// Replaces `:shortcode:`s with emoji and, optionally, free-standing
/// emoticons. Code and autolinked URLs are left alone.
pub struct Emoji {
    emoticons: bool,
}

impl Emoji {
    pub fn new(emoticons: bool) -> Emoji {
        Emoji { emoticons }
    }

    /// Returns the replaced text, or `None` if nothing was replaced.
    fn replace(&self, text: &str) -> Option<String> {
        let text = replace_shortcodes(text);
        if self.emoticons {
            if let Cow::Owned(replaced) = replace_emoticons(&text) {
                return Some(replaced);
            }
        }
        match text {
            Cow::Owned(replaced) => Some(replaced),
            Cow::Borrowed(_) => None,
        }
    }
}

impl Stage for Emoji {
    fn name(&self) -> &'static str {
        "emoji"
    }

    fn input(&self) -> Form {
        Form::Markdown
    }

    fn output(&self) -> Form {
        Form::Markdown
    }

    fn apply<'a>(&self, doc: Document<'a>) -> Document<'a> {
        let events = match doc {
            Document::Markdown(events) => events,
            other => return other,
        };

        // Code and autolinks, whose text is the URL, are left alone.
        let mut skip_depth = 0usize;
        let events = events
            .into_iter()
            .map(|event| match event {
                Event::Start(Tag::CodeBlock(_)) => {
                    skip_depth += 1;
                    event
                }
                Event::End(Tag::CodeBlock(_)) => {
                    skip_depth = skip_depth.saturating_sub(1);
                    event
                }
                Event::Start(Tag::Link(LinkType::Autolink, ..))
                | Event::Start(Tag::Link(LinkType::Email, ..)) => {
                    skip_depth += 1;
                    event
                }
                Event::End(Tag::Link(LinkType::Autolink, ..))
                | Event::End(Tag::Link(LinkType::Email, ..)) => {
                    skip_depth = skip_depth.saturating_sub(1);
                    event
                }
                Event::Text(text) if skip_depth == 0 => match self.replace(&text) {
                    Some(replaced) => Event::Text(CowStr::from(replaced)),
                    None => Event::Text(text),
                },
                event => event,
            })
            .collect();
        Document::Markdown(events)
    }
}

fn is_shortcode_byte(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'+' | b'-')
}

/// Replaces known `:shortcode:`s. Unknown ones are left as written.
fn replace_shortcodes(s: &str) -> Cow<str> {
    if !s.contains(':') {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut replaced = false;
    let mut rest = s;
    while let Some(start) = rest.find(':') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let name_len = after.bytes().take_while(|b| is_shortcode_byte(*b)).count();
        if name_len > 0 && after.as_bytes().get(name_len) == Some(&b':') {
            if let Some(emoji) = emojis::get_by_shortcode(&after[..name_len]) {
                out.push_str(emoji.as_str());
                rest = &after[name_len + 1..];
                replaced = true;
                continue;
            }
        }
        out.push(':');
        rest = after;
    }
    out.push_str(rest);

    if replaced {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(s)
    }
}

/// Replaces emoticons that stand alone between whitespace.
fn replace_emoticons(s: &str) -> Cow<str> {
    let mut out = String::with_capacity(s.len());
    let mut replaced = false;
    for piece in s.split_inclusive(char::is_whitespace) {
        let word = piece.trim_end_matches(char::is_whitespace);
        match EMOTICONS.iter().find(|(emoticon, _)| *emoticon == word) {
            Some((_, emoji)) => {
                out.push_str(emoji);
                replaced = true;
            }
            None => out.push_str(word),
        }
        out.push_str(&piece[word.len()..]);
    }

    if replaced {
        Cow::Owned(out)
    } else {
        Cow::Borrowed(s)
    }
}
