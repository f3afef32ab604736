//! Exports the [`Resolver`], which turns post source files into
//! [`RenderedPost`]s: it reads a post through the [`Repository`], renders its
//! Markdown body through the [`Pipeline`], and normalizes its front matter.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_yaml::Value;

use crate::cache::{source_hash, RenderCache};
use crate::content::{self, strip_extension, ContentPath, RawPost, Repository};
use crate::date::{normalize_date, DateError};
use crate::markdown::Pipeline;
use crate::pool;

/// Front matter keys that [`RenderedPost`] holds in its own fields.
const RESERVED_KEYS: &[&str] = &["id", "title", "date", "html"];

/// A rendered post. Serializes as a flat object: `id`, `title`, `date`,
/// `html`, and every other front matter field.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderedPost {
    pub id: String,

    /// The post title, if the front matter has a usable one.
    pub title: Option<String>,

    /// The post date as an ISO-8601 calendar day (`YYYY-MM-DD`).
    pub date: String,

    pub html: String,

    /// The remaining front matter fields.
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl RenderedPost {
    /// Returns the title, or `placeholder` if the post has none.
    pub fn title_or<'a>(&'a self, placeholder: &'a str) -> &'a str {
        self.title.as_deref().unwrap_or(placeholder)
    }
}

/// Resolves posts below one content root.
pub struct Resolver {
    repository: Repository,
    pipeline: Pipeline,
    threads: usize,
    cache: Option<RenderCache>,
}

impl Resolver {
    pub fn new(repository: Repository, pipeline: Pipeline) -> Resolver {
        Resolver {
            repository,
            pipeline,
            threads: 1,
            cache: None,
        }
    }

    /// Sets the number of threads [`Resolver::get_all_posts`] renders with.
    pub fn with_threads(mut self, threads: usize) -> Resolver {
        self.threads = threads;
        self
    }

    pub fn with_cache(mut self, cache: RenderCache) -> Resolver {
        self.cache = Some(cache);
        self
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn cache(&self) -> Option<&RenderCache> {
        self.cache.as_ref()
    }

    /// Reads and renders one post. A trailing `.md` on `id` is ignored.
    pub fn get_post(&self, content_path: &ContentPath, id: &str) -> Result<RenderedPost> {
        let id = strip_extension(id);
        let (path, source) = self.repository.read_source(content_path, id)?;

        let hash = self.cache.as_ref().map(|_| source_hash(&source));
        if let (Some(cache), Some(hash)) = (&self.cache, &hash) {
            if let Some(post) = cache.get(content_path, id, hash) {
                return Ok(post);
            }
        }

        let raw = RawPost::parse(&source)
            .map_err(|err| content::Error::MalformedFrontMatter { path, err })?;
        let post = self.render(content_path, id, raw)?;

        if let (Some(cache), Some(hash)) = (&self.cache, hash) {
            cache.insert(content_path.clone(), id.to_owned(), hash, post.clone());
        }
        Ok(post)
    }

    /// Renders every post in `content_path`, newest first. Posts with the
    /// same date come in no particular order.
    pub fn get_all_posts(&self, content_path: &ContentPath) -> Result<Vec<RenderedPost>> {
        let ids = self.repository.list_ids(content_path)?;
        let mut posts = pool::try_map(&ids, self.threads, |id| self.get_post(content_path, id))?;
        posts.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(posts)
    }

    /// Lists the post IDs in `content_path` in ascending order.
    pub fn get_all_ids(&self, content_path: &ContentPath) -> Result<Vec<String>> {
        let mut ids = self.repository.list_ids(content_path)?;
        ids.sort();
        Ok(ids)
    }

    fn render(&self, content_path: &ContentPath, id: &str, raw: RawPost) -> Result<RenderedPost> {
        let RawPost {
            mut front_matter,
            content,
        } = raw;

        let date = match front_matter.remove("date") {
            None | Some(Value::Null) => {
                return Err(Error::MissingDate {
                    content_path: content_path.clone(),
                    id: id.to_owned(),
                })
            }
            Some(value) => normalize_date(&value).map_err(|err| Error::InvalidDate {
                content_path: content_path.clone(),
                id: id.to_owned(),
                err,
            })?,
        };
        let title = front_matter.remove("title").and_then(scalar_string);
        for key in RESERVED_KEYS {
            front_matter.remove(*key);
        }

        Ok(RenderedPost {
            id: id.to_owned(),
            title,
            date,
            html: self.pipeline.render(&content),
            fields: front_matter,
        })
    }
}

/// Converts a scalar YAML value to a string. Sequences, mappings, and null
/// yield `None`.
fn scalar_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a post that couldn't be resolved.
#[derive(Debug)]
pub enum Error {
    /// Returned when the post couldn't be listed, read, or split.
    Content(content::Error),

    /// Returned when the front matter has no `date`.
    MissingDate { content_path: ContentPath, id: String },

    /// Returned when the front matter `date` can't be normalized.
    InvalidDate {
        content_path: ContentPath,
        id: String,
        err: DateError,
    },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Content(err) if err.is_not_found())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Content(err) => fmt::Display::fmt(err, f),
            Error::MissingDate { content_path, id } => {
                write!(f, "post `{}/{}` has no date", content_path, id)
            }
            Error::InvalidDate {
                content_path,
                id,
                err,
            } => write!(f, "post `{}/{}`: {}", content_path, id, err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Content(err) => Some(err),
            Error::MissingDate { .. } => None,
            Error::InvalidDate { err, .. } => Some(err),
        }
    }
}

impl From<content::Error> for Error {
    /// Converts [`content::Error`]s into [`Error`]. This allows us to use the
    /// `?` operator.
    fn from(err: content::Error) -> Error {
        Error::Content(err)
    }
}
