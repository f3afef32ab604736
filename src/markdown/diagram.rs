use pulldown_cmark::{CowStr, Event, Tag};

use super::html::escape_attribute;
use super::{fence_language, Document, Form, Stage};

/// Replaces fenced code blocks in a diagram language (e.g., `mermaid`) with a
/// literal `<pre class="{language}">` holding the unescaped block text, which
/// is what client-side diagram renderers look for.
pub struct Diagrams {
    languages: Vec<String>,
}

impl Diagrams {
    pub fn new(languages: Vec<String>) -> Diagrams {
        Diagrams { languages }
    }

    fn is_diagram(&self, language: &str) -> bool {
        self.languages
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }
}

impl Stage for Diagrams {
    fn name(&self) -> &'static str {
        "diagram"
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
                Event::Start(Tag::CodeBlock(kind)) => fence_language(kind)
                    .filter(|language| self.is_diagram(language))
                    .map(str::to_owned),
                _ => None,
            };
            let language = match language {
                Some(language) => language,
                None => {
                    out.push(event);
                    continue;
                }
            };

            let mut literal = String::new();
            for event in iter.by_ref() {
                match event {
                    Event::End(Tag::CodeBlock(_)) => break,
                    Event::Text(text) => literal.push_str(&text),
                    _ => {}
                }
            }
            out.push(Event::Html(CowStr::from(format!(
                "<pre class=\"{}\">{}</pre>\n",
                escape_attribute(&language),
                literal
            ))));
        }
        Document::Markdown(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::markdown::parse::Parse;

    fn events(source: &str) -> Vec<Event> {
        let diagrams = Diagrams::new(vec!["mermaid".to_owned(), "dot".to_owned()]);
        match diagrams.apply(Parse::new().apply(Document::Source(source))) {
            Document::Markdown(events) => events,
            other => panic!("unexpected document {:?}", other),
        }
    }

    #[test]
    fn test_diagram_block_becomes_literal_html() {
        let events = events("```mermaid\ngraph TD\n  A-->B & C\n```\n");
        assert_eq!(
            events,
            vec![Event::Html(CowStr::from(
                "<pre class=\"mermaid\">graph TD\n  A-->B & C\n</pre>\n".to_owned()
            ))]
        );
    }

    #[test]
    fn test_language_match_ignores_case_and_info() {
        let events = events("```DOT {.wide}\ndigraph {}\n```\n");
        assert!(matches!(&events[0], Event::Html(html) if html.starts_with("<pre class=\"DOT\">")));
    }

    #[test]
    fn test_other_code_blocks_are_untouched() {
        let events = events("```rust\nlet x = 1;\n```\n\n    indented\n");
        assert!(events.iter().all(|event| !matches!(event, Event::Html(_))));
        assert!(events
            .iter()
            .any(|event| matches!(event, Event::Text(text) if &**text == "let x = 1;\n")));
    }
}
