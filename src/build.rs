//! Exports the [`build_site`] function which stitches together the high-level
//! steps of building the output static site: enumerating routes
//! ([`crate::routes`]), rendering every post ([`crate::post`]), writing the
//! JSON and HTML pages ([`crate::write`]), and copying the static source
//! directory into the output directory.

use crate::cache::RenderCache;
use crate::config::{Config, Templates};
use crate::content::Repository;
use crate::markdown::Pipeline;
use crate::pool;
use crate::post::{Error as PostError, Resolver};
use crate::routes::{Enumerator, Route};
use crate::taxonomy::Error as TaxonomyError;
use crate::write::{Error as WriteError, PageTemplates, RenderedListing, Site, Writer};
use gtmpl::Template;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Builds the site from a [`Config`]. Every route is rendered before anything
/// is written, so a post that fails to render leaves the output directory
/// untouched.
pub fn build_site(config: &Config) -> Result<()> {
    config.taxonomy.validate()?;

    // Parse the templates before rendering so a broken theme fails fast.
    let templates = match &config.templates {
        Some(templates) => Some(parse_templates(templates)?),
        None => None,
    };

    let resolver = Resolver::new(
        Repository::new(&config.content_directory),
        Pipeline::standard(&config.markdown),
    )
    .with_threads(config.threads)
    .with_cache(RenderCache::new());
    let enumerator = Enumerator::new(&config.taxonomy, &resolver);

    let listings = enumerator.listings()?;
    let routes: Vec<Route> = listings
        .iter()
        .flat_map(|listing| {
            listing.ids.iter().map(move |id| Route {
                content_path: listing.content_path.clone(),
                id: id.clone(),
            })
        })
        .collect();
    info!(
        routes = routes.len(),
        threads = config.threads,
        "rendering posts"
    );

    let mut posts = pool::try_map(&routes, config.threads, |route| {
        resolver.get_post(&route.content_path, &route.id)
    })?
    .into_iter();

    let site = Site {
        listings: listings
            .into_iter()
            .map(|listing| RenderedListing {
                posts: posts.by_ref().take(listing.ids.len()).collect(),
                content_path: listing.content_path,
            })
            .collect(),
        navigation: config.taxonomy.navigation(),
    };

    // Only the output directory is cleaned; it belongs to the build.
    info!(path = %config.output_directory.display(), "writing site");
    rmdir(&config.output_directory)?;
    let writer = Writer {
        output_directory: &config.output_directory,
        base_path: &config.base_path,
        placeholder_title: &config.placeholder_title,
        templates: templates.as_ref(),
    };
    writer.write_site(&site)?;

    if let Some(static_directory) = &config.static_directory {
        info!(path = %static_directory.display(), "copying static files");
        copy_dir(static_directory, &config.output_directory)?;
    }

    info!("done");
    Ok(())
}

/// Copies every file below `src` into `dst`, keeping relative paths.
fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry.map_err(|err| Error::Copy {
            path: src.to_owned(),
            err: err.into(),
        })?;
        let relative = match entry.path().strip_prefix(src) {
            Ok(relative) => relative,
            Err(_) => continue,
        };
        let target = dst.join(relative);
        let copy_err = |err: std::io::Error| Error::Copy {
            path: entry.path().to_owned(),
            err,
        };
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(copy_err)?;
        } else {
            debug!(path = %relative.display(), "copying");
            std::fs::copy(entry.path(), &target).map_err(copy_err)?;
        }
    }
    Ok(())
}

fn parse_templates(templates: &Templates) -> Result<PageTemplates> {
    Ok(PageTemplates {
        post: parse_template(templates.post.iter())?,
        listing: parse_template(templates.listing.iter())?,
        not_found: parse_template(templates.not_found.iter())?,
    })
}

// Loads the template file contents, concatenates them, and parses the result
// into a template.
fn parse_template<P: AsRef<Path>>(template_files: impl Iterator<Item = P>) -> Result<Template> {
    let mut contents = String::new();
    for template_file in template_files {
        use std::io::Read;
        let template_file = template_file.as_ref();
        File::open(&template_file)
            .and_then(|mut file| file.read_to_string(&mut contents))
            .map_err(|e| Error::OpenTemplateFile {
                path: template_file.to_owned(),
                err: e,
            })?;
    }

    let mut template = Template::default();
    template
        .parse(&contents)
        .map_err(|e| Error::ParseTemplate(e.to_string()))?;
    Ok(template)
}

pub type Result<T> = std::result::Result<T, Error>;

/// The error type for building a site. Errors can be during taxonomy
/// validation, rendering, writing, cleaning the output directory, parsing
/// template files, and copying static files.
#[derive(Debug)]
pub enum Error {
    /// Returned when the taxonomy is invalid.
    Taxonomy(TaxonomyError),

    /// Returned for errors reading or rendering posts.
    Post(PostError),

    /// Returned for errors writing pages to disk.
    Write(WriteError),

    /// Returned for I/O problems while cleaning the output directory.
    Clean { path: PathBuf, err: std::io::Error },

    /// Returned for I/O problems while opening template files.
    OpenTemplateFile { path: PathBuf, err: std::io::Error },

    /// Returned for errors parsing template files.
    ParseTemplate(String),

    /// Returned for I/O problems while copying static files.
    Copy { path: PathBuf, err: std::io::Error },
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Taxonomy(err) => write!(f, "Invalid taxonomy: {}", err),
            Error::Post(err) => fmt::Display::fmt(err, f),
            Error::Write(err) => fmt::Display::fmt(err, f),
            Error::Clean { path, err } => {
                write!(f, "Cleaning directory '{}': {}", path.display(), err)
            }
            Error::OpenTemplateFile { path, err } => {
                write!(f, "Opening template file '{}': {}", path.display(), err)
            }
            Error::ParseTemplate(err) => write!(f, "Parsing template: {}", err),
            Error::Copy { path, err } => {
                write!(f, "Copying static file '{}': {}", path.display(), err)
            }
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Taxonomy(err) => Some(err),
            Error::Post(err) => Some(err),
            Error::Write(err) => Some(err),
            Error::Clean { path: _, err } => Some(err),
            Error::OpenTemplateFile { path: _, err } => Some(err),
            Error::ParseTemplate(_) => None,
            Error::Copy { path: _, err } => Some(err),
        }
    }
}

impl From<TaxonomyError> for Error {
    fn from(err: TaxonomyError) -> Error {
        Error::Taxonomy(err)
    }
}

impl From<PostError> for Error {
    /// Converts [`PostError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: PostError) -> Error {
        Error::Post(err)
    }
}

impl From<WriteError> for Error {
    /// Converts [`WriteError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: WriteError) -> Error {
        Error::Write(err)
    }
}

fn rmdir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(x) => Ok(x),
        Err(e) => match e.kind() {
            std::io::ErrorKind::NotFound => Ok(()),
            _ => Err(Error::Clean {
                path: dir.to_owned(),
                err: e,
            }),
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::PROJECT_FILE;
    use std::path::Path;

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn write(root: &Path, path: &str, contents: &str) -> std::io::Result<()> {
        let path = root.join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)
    }

    fn project(root: &Path) -> std::io::Result<()> {
        write(
            root,
            PROJECT_FILE,
            "static_directory: static\ntheme: theme\ntaxonomy:\n  sections: [cs, front]\n  segments:\n    cs: [os, DSA]\n    front: []\n",
        )?;
        write(
            root,
            "theme/theme.yaml",
            "post_template: [post.html]\nlisting_template: [listing.html]\nnot_found_template: [404.html]\n",
        )?;
        write(root, "theme/post.html", "<title>{{.item.title}}</title>{{.item.html}}")?;
        write(root, "theme/listing.html", "{{range .item.posts}}{{.id}};{{end}}")?;
        write(root, "theme/404.html", "missing")?;
        write(root, "static/css/site.css", "body {}")?;
        write(
            root,
            "posts/cs/os/paging.md",
            "---\ntitle: Paging\ndate: 2024-02-01\n---\n# Pages\n",
        )?;
        write(
            root,
            "posts/cs/os/interrupts.md",
            "---\ndate: 2024-03-01\n---\nNo title here.\n",
        )
    }

    #[test]
    fn test_build_site() -> TestResult {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        project(root)?;
        let output = root.join("out");
        write(&output, "stale.html", "stale")?;

        let config = Config::from_directory(root, Some(output.as_path()), Some(2))?;
        build_site(&config)?;

        let read = |path: &str| std::fs::read_to_string(output.join(path));
        let routes: Vec<String> = serde_json::from_str(&read("routes.json")?)?;
        assert_eq!(routes, vec!["/cs/os/interrupts/", "/cs/os/paging/"]);
        assert_eq!(
            read("cs/os/paging/index.html")?,
            "<title>Paging</title><h1 id=\"pages\"><a href=\"#pages\">Pages</a></h1>\n"
        );
        assert!(read("cs/os/interrupts/index.html")?.starts_with("<title>Untitled</title>"));
        assert_eq!(read("cs/os/index.html")?, "interrupts;paging;");
        assert_eq!(read("cs/DSA/index.html")?, "");
        assert_eq!(read("404.html")?, "missing");
        assert_eq!(read("css/site.css")?, "body {}");
        assert!(!output.join("stale.html").exists());
        Ok(())
    }

    #[test]
    fn test_failed_render_writes_nothing() -> TestResult {
        let dir = tempfile::tempdir()?;
        let root = dir.path();
        project(root)?;
        write(root, "posts/cs/DSA/broken.md", "---\ntitle: No date\n---\n")?;
        let output = root.join("out");
        write(&output, "previous.html", "previous build")?;

        let config = Config::from_directory(root, Some(output.as_path()), Some(4))?;
        match build_site(&config) {
            Err(Error::Post(PostError::MissingDate { id, .. })) => assert_eq!(id, "broken"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(output.join("previous.html").exists());
        assert!(!output.join("routes.json").exists());
        Ok(())
    }

    #[test]
    fn test_invalid_taxonomy() -> TestResult {
        let dir = tempfile::tempdir()?;
        write(dir.path(), PROJECT_FILE, "taxonomy:\n  sections: [a, a]\n")?;
        let config = Config::from_directory(dir.path(), None, Some(1))?;
        assert!(matches!(build_site(&config), Err(Error::Taxonomy(_))));
        Ok(())
    }
}
