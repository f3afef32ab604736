//! Syntax highlighting for fenced code blocks. Highlighting is class-based;
//! the site's stylesheet decides the colors.

use pulldown_cmark::{CowStr, Event, Tag};
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;
use tracing::debug;

use super::html::escape_attribute;
use super::{fence_language, Document, Form, Stage};

/// Prepended to every highlight class name (e.g., `hl-keyword`).
pub const CLASS_PREFIX: &str = "hl-";

pub struct Highlight {
    syntaxes: SyntaxSet,
}

impl Highlight {
    pub fn new() -> Highlight {
        Highlight {
            syntaxes: SyntaxSet::load_defaults_newlines(),
        }
    }

    /// Highlights `code`, or returns `None` if the language is unknown.
    fn highlight(&self, language: &str, code: &str) -> Option<String> {
        let syntax = self.syntaxes.find_syntax_by_token(language)?;
        let mut generator = ClassedHTMLGenerator::new_with_class_style(
            syntax,
            &self.syntaxes,
            ClassStyle::SpacedPrefixed {
                prefix: CLASS_PREFIX,
            },
        );
        for line in LinesWithEndings::from(code) {
            if let Err(err) = generator.parse_html_for_line_which_includes_newline(line) {
                debug!(language, %err, "failed to highlight code block");
                return None;
            }
        }
        Some(format!(
            "<pre><code class=\"hljs language-{}\">{}</code></pre>\n",
            escape_attribute(language),
            generator.finalize()
        ))
    }
}

impl Default for Highlight {
    fn default() -> Self {
        Highlight::new()
    }
}

impl Stage for Highlight {
    fn name(&self) -> &'static str {
        "highlight"
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

        let mut out = Vec::with_capacity(events.len());
        let mut iter = events.into_iter();
        while let Some(event) = iter.next() {
            let language = match &event {
                Event::Start(Tag::CodeBlock(kind)) => fence_language(kind).map(str::to_owned),
                _ => None,
            };
            let language = match language {
                Some(language) => language,
                None => {
                    out.push(event);
                    continue;
                }
            };

            let mut block = vec![event];
            let mut code = String::new();
            for event in iter.by_ref() {
                if let Event::Text(text) = &event {
                    code.push_str(text);
                }
                let end = matches!(event, Event::End(Tag::CodeBlock(_)));
                block.push(event);
                if end {
                    break;
                }
            }

            match self.highlight(&language, &code) {
                Some(html) => out.push(Event::Html(CowStr::from(html))),
                None => out.extend(block),
            }
        }
        Document::Markdown(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::markdown::parse::Parse;

    fn events(highlight: &Highlight, source: &'static str) -> Vec<Event<'static>> {
        match highlight.apply(Parse::new().apply(Document::Source(source))) {
            Document::Markdown(events) => events,
            other => panic!("unexpected document {:?}", other),
        }
    }

    #[test]
    fn test_known_language_is_highlighted() {
        let highlight = Highlight::new();
        let events = events(&highlight, "```rust\nfn main() { let s = \"<&>\"; }\n```\n");
        assert_eq!(events.len(), 1);
        match &events[0] {
            Event::Html(html) => {
                assert!(html.starts_with("<pre><code class=\"hljs language-rust\">"), "{}", html);
                assert!(html.contains("class=\"hl-"), "{}", html);
                assert!(html.contains("&lt;&amp;&gt;"), "{}", html);
                assert!(!html.contains("<&>"), "{}", html);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_language_falls_through() {
        let highlight = Highlight::new();
        let source = "```no-such-language\nx\n```\n\n```\nno language\n```\n";
        let before = match Parse::new().apply(Document::Source(source)) {
            Document::Markdown(events) => events,
            other => panic!("unexpected document {:?}", other),
        };
        assert_eq!(events(&highlight, source), before);
    }
}
