//! Converts Markdown to HTML. Rendering is a [`Pipeline`] of named
//! [`Stage`]s, each of which takes a [`Document`] in one [`Form`] and hands
//! the next stage a document in the same or a later form:
//!
//! 1. `parse`: Markdown source into pulldown-cmark events, with tables,
//!    strikethrough, task lists, and footnotes recognized by the parser
//! 2. `gfm`: bare URLs in text become links
//! 3. `diagram`: diagram code blocks become literal `<pre class="...">`
//! 4. `highlight`: code blocks with a known language get highlight spans
//! 5. `emoji`: `:shortcode:`s (and, optionally, emoticons) become glyphs
//! 6. `to-html`: events into HTML tokens, raw HTML kept literal
//! 7. `raw`: literal HTML is tokenized
//! 8. `slug`: headings get unique `id`s
//! 9. `autolink`: heading contents are wrapped in a link to the heading
//! 10. `stringify`: tokens into an HTML string
//!
//! Rendering never fails. Malformed Markdown is rendered the way the
//! CommonMark recovery rules say it should be, and malformed raw HTML is
//! carried through as text.

pub mod diagram;
pub mod emoji;
pub mod heading;
pub mod highlight;
pub mod html;
pub mod htmlrenderer;
pub mod parse;

use std::fmt;

use pulldown_cmark::{CodeBlockKind, Event};
use serde::Deserialize;

use self::html::Token;

/// The representation a [`Document`] is in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Form {
    Source,
    Markdown,
    Html,
    Serialized,
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Form::Source => "markdown source",
            Form::Markdown => "markdown events",
            Form::Html => "html tokens",
            Form::Serialized => "serialized html",
        })
    }
}

/// A document partway through the pipeline.
#[derive(Debug)]
pub enum Document<'a> {
    Source(&'a str),
    Markdown(Vec<Event<'a>>),
    Html(Vec<Token>),
    Serialized(String),
}

impl Document<'_> {
    pub fn form(&self) -> Form {
        match self {
            Document::Source(_) => Form::Source,
            Document::Markdown(_) => Form::Markdown,
            Document::Html(_) => Form::Html,
            Document::Serialized(_) => Form::Serialized,
        }
    }
}

/// One transformation in a [`Pipeline`]. A stage handed a document in a form
/// other than [`Stage::input`] returns it unchanged; [`Pipeline::new`]
/// makes sure that never happens.
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    fn input(&self) -> Form;

    fn output(&self) -> Form;

    fn apply<'a>(&self, doc: Document<'a>) -> Document<'a>;
}

/// How heading text is turned into `id`s.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SlugMode {
    /// Lowercase, drop punctuation, spaces to hyphens; non-ASCII letters are
    /// kept as-is.
    Github,

    /// Transliterate to ASCII with [`slug::slugify`].
    Ascii,
}

impl Default for SlugMode {
    fn default() -> Self {
        SlugMode::Github
    }
}

/// Rendering options, as found under `markdown:` in the project file.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Options {
    /// Code block languages rendered as diagrams rather than code.
    pub diagram_languages: Vec<String>,

    /// Whether text emoticons like `:)` are replaced as well as shortcodes.
    pub emoticons: bool,

    pub slug: SlugMode,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            diagram_languages: vec!["mermaid".to_owned()],
            emoticons: true,
            slug: SlugMode::default(),
        }
    }
}

/// An ordered list of stages that turns Markdown source into HTML.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Builds a pipeline from `stages`, checking that each stage accepts the
    /// form the previous one produces, that the first takes Markdown source,
    /// and that the last produces serialized HTML.
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Result<Pipeline, PipelineError> {
        let mut form = Form::Source;
        for stage in &stages {
            if stage.input() != form {
                return Err(PipelineError::Mismatch {
                    stage: stage.name(),
                    expected: stage.input(),
                    found: form,
                });
            }
            form = stage.output();
        }
        if form != Form::Serialized {
            return Err(PipelineError::Incomplete(form));
        }
        Ok(Pipeline { stages })
    }

    /// The standard ten-stage pipeline.
    pub fn standard(options: &Options) -> Pipeline {
        Pipeline {
            stages: standard_stages(options),
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Renders Markdown to HTML.
    pub fn render(&self, markdown: &str) -> String {
        let doc = self
            .stages
            .iter()
            .fold(Document::Source(markdown), |doc, stage| stage.apply(doc));
        match doc {
            Document::Serialized(html) => html,
            Document::Html(tokens) => html::serialize(&tokens),
            Document::Markdown(_) | Document::Source(_) => String::new(),
        }
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline::standard(&Options::default())
    }
}

/// The stages of [`Pipeline::standard`], in order.
pub fn standard_stages(options: &Options) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(parse::Parse::new()),
        Box::new(parse::Gfm),
        Box::new(diagram::Diagrams::new(options.diagram_languages.clone())),
        Box::new(highlight::Highlight::new()),
        Box::new(emoji::Emoji::new(options.emoticons)),
        Box::new(htmlrenderer::ToHtml),
        Box::new(html::Materialize),
        Box::new(heading::Slug::new(options.slug)),
        Box::new(heading::Autolink),
        Box::new(html::Stringify),
    ]
}

/// Returns the language tag of a fenced code block: the first word of its
/// info string.
pub fn fence_language<'k>(kind: &'k CodeBlockKind) -> Option<&'k str> {
    match kind {
        CodeBlockKind::Fenced(info) => info.split_whitespace().next(),
        CodeBlockKind::Indented => None,
    }
}

/// Represents a pipeline whose stages don't fit together.
#[derive(Debug, PartialEq)]
pub enum PipelineError {
    /// Returned when a stage is handed a form it doesn't take.
    Mismatch {
        stage: &'static str,
        expected: Form,
        found: Form,
    },

    /// Returned when the last stage doesn't produce serialized HTML.
    Incomplete(Form),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PipelineError::Mismatch {
                stage,
                expected,
                found,
            } => write!(
                f,
                "stage `{}` takes {} but would be handed {}",
                stage, expected, found
            ),
            PipelineError::Incomplete(form) => {
                write!(f, "pipeline ends with {} instead of serialized html", form)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

#[cfg(test)]
mod test {
    use super::*;

    fn render(markdown: &str) -> String {
        Pipeline::default().render(markdown)
    }

    #[test]
    fn test_standard_stage_order() -> Result<(), PipelineError> {
        let options = Options::default();
        let pipeline = Pipeline::new(standard_stages(&options))?;
        assert_eq!(
            pipeline.stage_names(),
            vec![
                "parse",
                "gfm",
                "diagram",
                "highlight",
                "emoji",
                "to-html",
                "raw",
                "slug",
                "autolink",
                "stringify"
            ]
        );
        Ok(())
    }

    #[test]
    fn test_pipeline_rejects_misordered_stages() {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(parse::Parse::new()),
            Box::new(heading::Autolink),
            Box::new(html::Stringify),
        ];
        assert_eq!(
            Pipeline::new(stages).err(),
            Some(PipelineError::Mismatch {
                stage: "autolink",
                expected: Form::Html,
                found: Form::Markdown,
            })
        );

        let stages: Vec<Box<dyn Stage>> =
            vec![Box::new(parse::Parse::new()), Box::new(htmlrenderer::ToHtml)];
        assert_eq!(
            Pipeline::new(stages).err(),
            Some(PipelineError::Incomplete(Form::Html))
        );
    }

    #[test]
    fn test_minimal_pipeline() -> Result<(), PipelineError> {
        let pipeline = Pipeline::new(vec![
            Box::new(parse::Parse::new()),
            Box::new(htmlrenderer::ToHtml),
            Box::new(html::Stringify),
        ])?;
        assert_eq!(pipeline.render("# Hi"), "<h1>Hi</h1>\n");
        Ok(())
    }

    #[test]
    fn test_diagram_literal_survives() {
        let html = render("```mermaid\nA-->B\n```\n");
        assert!(html.contains("<pre class=\"mermaid\">A-->B\n</pre>"), "{}", html);
        assert!(!html.contains("A--&gt;B"));
    }

    #[test]
    fn test_diagram_text_untouched_by_later_stages() {
        let html = render("```mermaid\ngraph LR\n  A[:smile:] --> B[www.example.com]\n```\n");
        assert!(html.contains("A[:smile:] --> B[www.example.com]"), "{}", html);
    }

    #[test]
    fn test_render_is_idempotent() {
        let source = "# Title\n\nSome *text* :tada: with https://example.com\n\n\
                      ## Title\n\n```rust\nfn main() {}\n```\n\n<h3>Raw</h3>\n\n\
                      | a | b |\n|---|---|\n| 1 | 2 |\n";
        assert_eq!(render(source), render(source));
    }

    #[test]
    fn test_headings_get_ids_and_links() {
        let html = render("# Hello World\n\n## Hello World\n");
        assert!(
            html.contains("<h1 id=\"hello-world\"><a href=\"#hello-world\">Hello World</a></h1>"),
            "{}",
            html
        );
        assert!(
            html.contains("<h2 id=\"hello-world-1\"><a href=\"#hello-world-1\">Hello World</a></h2>"),
            "{}",
            html
        );
    }

    #[test]
    fn test_raw_html_headings_are_found() {
        let html = render("<h2>Raw Heading</h2>\n\nText\n");
        assert!(
            html.contains("<h2 id=\"raw-heading\"><a href=\"#raw-heading\">Raw Heading</a></h2>"),
            "{}",
            html
        );
    }

    #[test]
    fn test_no_nested_autolinks() {
        let html = render("<a href=\"/elsewhere\"><h2>Wrapped</h2></a>\n");
        assert!(!html.contains("href=\"#wrapped\""), "{}", html);
        assert!(html.contains("<h2 id=\"wrapped\">Wrapped</h2>"), "{}", html);

        let html = render("## [Docs](https://example.com/docs)\n");
        assert!(!html.contains("href=\"#docs\""), "{}", html);
        assert_eq!(html.matches("<a ").count(), 1, "{}", html);
    }

    #[test]
    fn test_gfm_extensions() {
        let html = render(
            "| a | b |\n|:--|--:|\n| 1 | 2 |\n\n~~gone~~\n\n- [x] done\n- [ ] todo\n\nsee https://example.com/a_b.\n",
        );
        assert!(html.contains("<table>"), "{}", html);
        assert!(html.contains("<th align=\"left\">a</th>"), "{}", html);
        assert!(html.contains("<del>gone</del>"), "{}", html);
        assert!(html.contains("checked=\"\""), "{}", html);
        assert!(
            html.contains("<a href=\"https://example.com/a_b\">https://example.com/a_b</a>."),
            "{}",
            html
        );
    }

    #[test]
    fn test_raw_html_passes_through() {
        let html = render("<div class=\"note\">\n\n**bold**\n\n</div>\n");
        assert!(html.contains("<div class=\"note\">"), "{}", html);
        assert!(html.contains("<strong>bold</strong>"), "{}", html);
        assert!(html.contains("</div>"), "{}", html);
    }

    #[test]
    fn test_malformed_markdown_renders() {
        let html = render("*unclosed emphasis\n\n[stray bracket\n\n<div\n\n```\nunclosed fence");
        assert!(html.contains("*unclosed emphasis"), "{}", html);
        assert!(html.contains("[stray bracket"), "{}", html);
        assert!(html.contains("unclosed fence"), "{}", html);
    }

    #[test]
    fn test_emoji() {
        let html = render("Party :tada: and :not_a_real_emoji: :)\n");
        assert!(html.contains('🎉'), "{}", html);
        assert!(html.contains(":not_a_real_emoji:"), "{}", html);
        assert!(html.contains('🙂'), "{}", html);

        let plain = Pipeline::standard(&Options {
            emoticons: false,
            ..Options::default()
        })
        .render("smile :)\n");
        assert!(plain.contains(":)"), "{}", plain);
    }

    #[test]
    fn test_code_is_not_emojified() {
        let html = render("`:tada:`\n\n```\n:tada:\n```\n");
        assert!(!html.contains('🎉'), "{}", html);
    }

    #[test]
    fn test_highlighting() {
        let html = render("```rust\nfn main() {}\n```\n");
        assert!(html.contains("<code class=\"hljs language-rust\">"), "{}", html);
        assert!(html.contains("<span class=\"hl-"), "{}", html);

        let html = render("```not-a-language\n<x>\n```\n");
        assert!(
            html.contains("<pre><code class=\"language-not-a-language\">&lt;x&gt;\n</code></pre>"),
            "{}",
            html
        );
    }

    #[test]
    fn test_ascii_slugs() {
        let pipeline = Pipeline::standard(&Options {
            slug: SlugMode::Ascii,
            ..Options::default()
        });
        let html = pipeline.render("# Ünïcödé Title!\n");
        assert!(html.contains("id=\"unicode-title\""), "{}", html);
    }
}
