//! Writes a rendered site to disk. Every post and every listing gets an
//! `index.json`; when the project has a theme, each also gets an
//! `index.html` rendered through its template. Post pages carry `prev` and
//! `next` links to their neighbours in ascending ID order.

use crate::content::ContentPath;
use crate::post::RenderedPost;
use crate::routes::{join_url, Route};
use crate::taxonomy::NavGroup;
use crate::value::{option_to_value, to_value};
use gtmpl::{Template, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// The parsed templates for each kind of page.
pub struct PageTemplates {
    pub post: Template,
    pub listing: Template,
    pub not_found: Template,
}

/// The rendered posts for one content path, in ascending ID order.
pub struct RenderedListing {
    pub content_path: ContentPath,
    pub posts: Vec<RenderedPost>,
}

impl RenderedListing {
    fn ids(&self) -> Vec<&str> {
        self.posts.iter().map(|post| post.id.as_str()).collect()
    }
}

/// A fully rendered site, ready to be written.
pub struct Site {
    pub listings: Vec<RenderedListing>,
    pub navigation: Vec<NavGroup>,
}

impl Site {
    pub fn routes(&self) -> Vec<Route> {
        self.listings
            .iter()
            .flat_map(|listing| {
                listing.posts.iter().map(move |post| Route {
                    content_path: listing.content_path.clone(),
                    id: post.id.clone(),
                })
            })
            .collect()
    }
}

/// The entry for one post in a listing's `index.json`.
#[derive(Serialize)]
struct Summary<'a> {
    id: &'a str,
    title: &'a str,
    date: &'a str,
}

/// The contents of a listing's `index.json`.
#[derive(Serialize)]
struct ListingIndex<'a> {
    /// Post IDs, ascending.
    ids: Vec<&'a str>,

    /// Post summaries, newest first.
    posts: Vec<Summary<'a>>,
}

/// Responsible for writing the JSON and HTML files for a [`Site`].
pub struct Writer<'a> {
    pub output_directory: &'a Path,

    /// The URL path the site is served below. Used to build `prev`/`next`
    /// links and the route list.
    pub base_path: &'a str,

    /// Substituted for missing post titles in everything written.
    pub placeholder_title: &'a str,

    /// `None` when only JSON is written.
    pub templates: Option<&'a PageTemplates>,
}

impl Writer<'_> {
    /// Writes every file for `site` below the output directory.
    pub fn write_site(&self, site: &Site) -> Result<()> {
        std::fs::create_dir_all(self.output_directory)?;

        let urls: Vec<String> = site
            .routes()
            .iter()
            .map(|route| route.url(self.base_path))
            .collect();
        self.write_json(&self.output_directory.join("routes.json"), &urls)?;
        self.write_json(
            &self.output_directory.join("navigation.json"),
            &site.navigation,
        )?;

        let navigation = to_value(&site.navigation)?;
        for listing in &site.listings {
            self.write_listing(listing, &navigation)?;
        }

        if let Some(templates) = self.templates {
            let page = Page {
                item: Value::Nil,
                prev: None,
                next: None,
            };
            self.write_page(
                &templates.not_found,
                page.to_value(&navigation, self.base_path),
                &self.output_directory.join("404.html"),
            )?;
        }
        Ok(())
    }

    fn write_listing(&self, listing: &RenderedListing, navigation: &Value) -> Result<()> {
        let directory = listing.content_path.to_path(self.output_directory);
        debug!(content_path = %listing.content_path, posts = listing.posts.len(), "writing listing");

        let mut by_date: Vec<&RenderedPost> = listing.posts.iter().collect();
        by_date.sort_by(|a, b| b.date.cmp(&a.date));
        let index = ListingIndex {
            ids: listing.ids(),
            posts: by_date
                .iter()
                .map(|post| Summary {
                    id: &post.id,
                    title: post.title_or(self.placeholder_title),
                    date: &post.date,
                })
                .collect(),
        };
        self.write_json(&directory.join("index.json"), &index)?;

        if let Some(templates) = self.templates {
            let mut item = to_value(&index)?;
            if let Value::Object(obj) = &mut item {
                obj.insert(
                    "content_path".to_owned(),
                    Value::String(listing.content_path.to_string()),
                );
                obj.insert("url".to_owned(), Value::String(self.url(&listing.content_path, None)));
            }
            let page = Page {
                item,
                prev: None,
                next: None,
            };
            self.write_page(
                &templates.listing,
                page.to_value(navigation, self.base_path),
                &directory.join("index.html"),
            )?;
        }

        let posts = &listing.posts;
        for (i, post) in posts.iter().enumerate() {
            let post_directory = directory.join(&post.id);
            let post = self.titled(post);
            self.write_json(&post_directory.join("index.json"), &post)?;

            if let Some(templates) = self.templates {
                let neighbour = |j: Option<usize>| {
                    j.and_then(|j| posts.get(j))
                        .map(|p| self.url(&listing.content_path, Some(&p.id)))
                };
                let page = Page {
                    item: to_value(&post)?,
                    prev: neighbour(i.checked_sub(1)),
                    next: neighbour(Some(i + 1)),
                };
                self.write_page(
                    &templates.post,
                    page.to_value(navigation, self.base_path),
                    &post_directory.join("index.html"),
                )?;
            }
        }
        Ok(())
    }

    /// Returns a copy of `post` with the placeholder title filled in.
    fn titled(&self, post: &RenderedPost) -> RenderedPost {
        let mut post = post.clone();
        if post.title.is_none() {
            post.title = Some(self.placeholder_title.to_owned());
        }
        post
    }

    fn url(&self, content_path: &ContentPath, id: Option<&str>) -> String {
        let segments: Vec<&str> = content_path
            .components()
            .iter()
            .map(String::as_str)
            .chain(id)
            .collect();
        join_url(self.base_path, &segments)
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let mut writer = BufWriter::new(create(path)?);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Templates a single page and writes it to disk.
    fn write_page(&self, template: &Template, value: Value, path: &Path) -> Result<()> {
        let context = gtmpl::Context::from(value).map_err(|e| Error::Template(e.to_string()))?;
        let mut writer = BufWriter::new(create(path)?);
        template
            .execute(&mut writer, &context)
            .map_err(|e| Error::Template(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }
}

/// Creates a file, creating its parent directories first.
fn create(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|err| Error::Create {
            path: dir.to_owned(),
            err,
        })?;
    }
    File::create(path).map_err(|err| Error::Create {
        path: path.to_owned(),
        err,
    })
}

/// An output HTML file's template data. It converts to a [`Value::Object`]
/// with fields `item`, `prev`, `next`, `navigation`, and `base_path`.
struct Page {
    /// The main item for the page.
    item: Value,

    /// The URL for the previous page, if any.
    prev: Option<String>,

    /// The URL for the next page, if any.
    next: Option<String>,
}

impl Page {
    fn to_value(self, navigation: &Value, base_path: &str) -> Value {
        let mut m: HashMap<String, Value> = HashMap::new();
        m.insert("item".to_owned(), self.item);
        m.insert("prev".to_owned(), option_to_value(self.prev.as_deref()));
        m.insert("next".to_owned(), option_to_value(self.next.as_deref()));
        m.insert("navigation".to_owned(), navigation.clone());
        m.insert("base_path".to_owned(), Value::String(base_path.to_owned()));
        Value::Object(m)
    }
}

/// The result of a fallible page-writing operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error in a page-writing operation.
#[derive(Debug)]
pub enum Error {
    /// An error during templating.
    Template(String),

    /// An error serializing JSON output.
    Json(serde_json::Error),

    /// An error creating an output file or directory.
    Create { path: PathBuf, err: io::Error },

    /// An error writing the output files.
    Io(io::Error),
}

impl From<io::Error> for Error {
    /// Converts an [`io::Error`] into an [`Error`]. This allows us to use the
    /// `?` operator for fallible I/O operations.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Json(err)
    }
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as presentable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Template(err) => write!(f, "Executing template: {}", err),
            Error::Json(err) => write!(f, "Serializing JSON: {}", err),
            Error::Create { path, err } => {
                write!(f, "Creating '{}': {}", path.display(), err)
            }
            Error::Io(err) => fmt::Display::fmt(err, f),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Template(_) => None,
            Error::Json(err) => Some(err),
            Error::Create { err, .. } => Some(err),
            Error::Io(err) => Some(err),
        }
    }
}
