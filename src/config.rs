//! Loads a project's configuration. A project is a directory containing a
//! `folio.yaml` file; the project file names the content directory, the
//! [`Taxonomy`], the Markdown [`Options`], and optionally a theme directory
//! whose `theme.yaml` lists the template files for each kind of page.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::markdown::Options;
use crate::taxonomy::Taxonomy;

/// The name of the project file.
pub const PROJECT_FILE: &str = "folio.yaml";

/// The name of the theme file inside a theme directory.
pub const THEME_FILE: &str = "theme.yaml";

fn default_content_directory() -> PathBuf {
    PathBuf::from("posts")
}

fn default_placeholder_title() -> String {
    String::from("Untitled")
}

#[derive(Deserialize)]
struct Project {
    #[serde(default = "default_content_directory")]
    content_directory: PathBuf,

    #[serde(default)]
    static_directory: Option<PathBuf>,

    #[serde(default)]
    theme: Option<PathBuf>,

    #[serde(default)]
    base_path: String,

    #[serde(default = "default_placeholder_title")]
    placeholder_title: String,

    #[serde(default)]
    taxonomy: Taxonomy,

    #[serde(default)]
    markdown: Options,
}

#[derive(Deserialize)]
struct Theme {
    post_template: Vec<PathBuf>,
    listing_template: Vec<PathBuf>,
    not_found_template: Vec<PathBuf>,
}

/// The template files for each kind of page, resolved against the theme
/// directory. Each list is concatenated into one template.
#[derive(Clone, Debug, PartialEq)]
pub struct Templates {
    pub post: Vec<PathBuf>,
    pub listing: Vec<PathBuf>,
    pub not_found: Vec<PathBuf>,
}

/// A fully resolved configuration. Every path is absolute or relative to the
/// working directory, never to the project file.
#[derive(Clone, Debug)]
pub struct Config {
    pub project_root: PathBuf,
    pub content_directory: PathBuf,
    pub static_directory: Option<PathBuf>,
    pub output_directory: PathBuf,

    /// The URL path the site is served below, e.g. `/blog`. Empty for the
    /// root.
    pub base_path: String,

    /// The title written for posts that don't have one.
    pub placeholder_title: String,

    pub taxonomy: Taxonomy,
    pub markdown: Options,

    /// `None` when the project has no theme; only JSON is written then.
    pub templates: Option<Templates>,

    pub threads: usize,
}

impl Config {
    /// Searches `dir` and then each of its ancestors for a project file and
    /// loads the first one found. `output_directory` defaults to `_site`
    /// inside the project root and `threads` to the number of CPUs.
    pub fn from_directory(
        dir: &Path,
        output_directory: Option<&Path>,
        threads: Option<usize>,
    ) -> Result<Config> {
        let path = dir.join(PROJECT_FILE);
        if path.exists() {
            Config::from_project_file(&path, output_directory, threads)
                .with_context(|| format!("Loading configuration from `{}`", path.display()))
        } else {
            match dir.parent() {
                Some(parent) => Config::from_directory(parent, output_directory, threads),
                None => Err(anyhow!(
                    "Could not find `{}` in any parent directory",
                    PROJECT_FILE
                )),
            }
        }
    }

    pub fn from_project_file(
        path: &Path,
        output_directory: Option<&Path>,
        threads: Option<usize>,
    ) -> Result<Config> {
        let project: Project = serde_yaml::from_reader(open(path, "project")?)
            .with_context(|| format!("Parsing project file `{}`", path.display()))?;
        let project_root = match path.parent() {
            Some(root) => root.to_owned(),
            None => {
                return Err(anyhow!(
                    "Can't get parent directory for provided project file path '{}'",
                    path.display()
                ))
            }
        };

        let templates = match &project.theme {
            Some(theme) => Some(load_theme(&project_root.join(theme))?),
            None => None,
        };

        let static_directory = project.static_directory.map(|dir| project_root.join(dir));
        if let Some(dir) = &static_directory {
            if !dir.is_dir() {
                warn!(path = %dir.display(), "static directory doesn't exist; ignoring");
            }
        }

        Ok(Config {
            content_directory: project_root.join(&project.content_directory),
            static_directory: static_directory.filter(|dir| dir.is_dir()),
            output_directory: match output_directory {
                Some(dir) => dir.to_owned(),
                None => project_root.join("_site"),
            },
            base_path: project.base_path,
            placeholder_title: project.placeholder_title,
            taxonomy: project.taxonomy,
            markdown: project.markdown,
            templates,
            threads: match threads {
                None | Some(0) => num_cpus::get(),
                Some(threads) => threads,
            },
            project_root,
        })
    }
}

fn load_theme(theme_dir: &Path) -> Result<Templates> {
    let theme_path = theme_dir.join(THEME_FILE);
    let theme: Theme = serde_yaml::from_reader(open(&theme_path, "theme")?)
        .with_context(|| format!("Parsing theme file `{}`", theme_path.display()))?;
    let resolve = |paths: Vec<PathBuf>| -> Vec<PathBuf> {
        paths.iter().map(|relpath| theme_dir.join(relpath)).collect()
    };
    Ok(Templates {
        post: resolve(theme.post_template),
        listing: resolve(theme.listing_template),
        not_found: resolve(theme.not_found_template),
    })
}

/// Opens a file, naming its `kind` in the error.
pub fn open(path: &Path, kind: &str) -> Result<File> {
    match File::open(path) {
        Err(e) => Err(anyhow!("Opening {} file `{}`: {}", kind, path.display(), e)),
        Ok(file) => Ok(file),
    }
}
