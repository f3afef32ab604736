//! Defines [`ContentPath`] and [`Repository`], which together locate post
//! source files on disk. The repository only lists and reads files; turning
//! them into HTML is the job of [`crate::post::Resolver`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::warn;

/// The extension of post source files.
pub const MARKDOWN_EXTENSION: &str = ".md";

/// The line that opens and closes a front matter block.
const FENCE: &str = "---";

/// A logical location for a group of posts, e.g., `cs/os`. Each component
/// maps to one directory below the content root.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentPath(Vec<String>);

impl ContentPath {
    pub fn new(components: &[&str]) -> ContentPath {
        ContentPath(components.iter().map(|c| (*c).to_owned()).collect())
    }

    pub fn components(&self) -> &[String] {
        &self.0
    }

    /// Resolves the content path against a directory.
    pub fn to_path(&self, root: &Path) -> PathBuf {
        self.0.iter().fold(root.to_owned(), |acc, c| acc.join(c))
    }
}

impl std::str::FromStr for ContentPath {
    type Err = std::convert::Infallible;

    /// Splits a free-form path like `interface/html` on `/`, dropping empty
    /// components.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(ContentPath(
            s.split('/')
                .filter(|c| !c.is_empty())
                .map(String::from)
                .collect(),
        ))
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// Front matter fields in key order.
pub type FrontMatter = BTreeMap<String, serde_yaml::Value>;

/// The unrendered contents of a post source file.
#[derive(Clone, Debug, PartialEq)]
pub struct RawPost {
    pub front_matter: FrontMatter,
    pub content: String,
}

impl RawPost {
    /// Splits `input` into front matter and body. The front matter block is
    /// optional, but if the first line is `---` there must be a closing
    /// `---` line and the YAML between them must be a mapping.
    pub fn parse(input: &str) -> std::result::Result<RawPost, FrontMatterError> {
        let input = input.strip_prefix('\u{feff}').unwrap_or(input);
        let (yaml, body) = match split_front_matter(input)? {
            Some(split) => split,
            None => {
                return Ok(RawPost {
                    front_matter: FrontMatter::new(),
                    content: input.to_owned(),
                })
            }
        };

        let front_matter = if yaml.trim().is_empty() {
            FrontMatter::new()
        } else {
            match serde_yaml::from_str::<serde_yaml::Value>(yaml)? {
                serde_yaml::Value::Mapping(mapping) => {
                    let mut front_matter = FrontMatter::new();
                    for (key, value) in mapping {
                        match key {
                            serde_yaml::Value::String(key) => {
                                front_matter.insert(key, value);
                            }
                            _ => return Err(FrontMatterError::NotAMapping),
                        }
                    }
                    front_matter
                }
                serde_yaml::Value::Null => FrontMatter::new(),
                _ => return Err(FrontMatterError::NotAMapping),
            }
        };

        Ok(RawPost {
            front_matter,
            content: body.to_owned(),
        })
    }
}

/// Returns `(yaml, body)` if the input opens with a front matter fence.
fn split_front_matter(
    input: &str,
) -> std::result::Result<Option<(&str, &str)>, FrontMatterError> {
    let mut lines = input.split_inclusive('\n');
    let first = match lines.next() {
        Some(line) if line.trim_end() == FENCE => line,
        _ => return Ok(None),
    };

    let yaml_start = first.len();
    let mut offset = yaml_start;
    for line in lines {
        if line.trim_end() == FENCE {
            return Ok(Some((
                &input[yaml_start..offset],
                &input[offset + line.len()..],
            )));
        }
        offset += line.len();
    }
    Err(FrontMatterError::MissingEndFence)
}

/// Lists and reads post source files below a content root.
#[derive(Clone, Debug)]
pub struct Repository {
    root: PathBuf,
}

impl Repository {
    pub fn new<P: Into<PathBuf>>(root: P) -> Repository {
        Repository { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the directory for a content path.
    pub fn directory(&self, content_path: &ContentPath) -> PathBuf {
        content_path.to_path(&self.root)
    }

    /// Lists the post IDs (file names less the `.md` extension) in the
    /// directory for `content_path`, in directory iteration order. Only
    /// regular files ending in `.md` are listed.
    pub fn list_ids(&self, content_path: &ContentPath) -> Result<Vec<String>> {
        let dir = self.directory(content_path);
        let entries = fs::read_dir(&dir).map_err(|err| Error::from_io(&dir, err))?;

        let mut ids = Vec::new();
        for result in entries {
            let entry = result.map_err(|err| Error::from_io(&dir, err))?;
            let os_file_name = entry.file_name();
            let file_name = match os_file_name.to_str() {
                Some(file_name) => file_name,
                None => {
                    warn!(path = %entry.path().display(), "skipping non-UTF-8 file name");
                    continue;
                }
            };
            if !file_name.ends_with(MARKDOWN_EXTENSION) {
                continue;
            }
            let file_type = entry
                .file_type()
                .map_err(|err| Error::from_io(&entry.path(), err))?;
            if !(file_type.is_file() || (file_type.is_symlink() && entry.path().is_file())) {
                continue;
            }
            // `post_path` strips one `.md` from an ID, so IDs that keep one
            // (or are empty) couldn't be read back.
            let id = &file_name[..file_name.len() - MARKDOWN_EXTENSION.len()];
            if id.is_empty() || id.ends_with(MARKDOWN_EXTENSION) {
                warn!(path = %entry.path().display(), "skipping file whose ID can't be resolved");
                continue;
            }
            ids.push(id.to_owned());
        }
        Ok(ids)
    }

    /// Resolves `id` to a source file path. A trailing `.md` on `id` is
    /// ignored.
    pub fn post_path(&self, content_path: &ContentPath, id: &str) -> Result<PathBuf> {
        let id = strip_extension(id);
        let dir = self.directory(content_path);
        if id.is_empty() || id.contains('/') || id.contains('\\') || id == "." || id == ".." {
            return Err(Error::NotFound(dir.join(id)));
        }
        Ok(dir.join(format!("{}{}", id, MARKDOWN_EXTENSION)))
    }

    /// Reads the raw source file for a post.
    pub fn read_source(&self, content_path: &ContentPath, id: &str) -> Result<(PathBuf, String)> {
        let path = self.post_path(content_path, id)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok((path, contents)),
            Err(err) => Err(Error::from_io(&path, err)),
        }
    }

    /// Reads a post and splits it into front matter and Markdown body.
    pub fn read_post(&self, content_path: &ContentPath, id: &str) -> Result<RawPost> {
        let (path, contents) = self.read_source(content_path, id)?;
        RawPost::parse(&contents).map_err(|err| Error::MalformedFrontMatter { path, err })
    }
}

/// Strips one trailing `.md` from a post ID.
pub fn strip_extension(id: &str) -> &str {
    id.strip_suffix(MARKDOWN_EXTENSION).unwrap_or(id)
}

/// Represents the result of a [`Repository`] operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error listing or reading posts.
#[derive(Debug)]
pub enum Error {
    /// Returned when a content directory or post source file doesn't exist.
    NotFound(PathBuf),

    /// Returned when a post's front matter block can't be parsed.
    MalformedFrontMatter { path: PathBuf, err: FrontMatterError },

    /// Returned for other I/O errors.
    Io { path: PathBuf, err: io::Error },
}

impl Error {
    fn from_io(path: &Path, err: io::Error) -> Error {
        match err.kind() {
            io::ErrorKind::NotFound => Error::NotFound(path.to_owned()),
            _ => Error::Io {
                path: path.to_owned(),
                err,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NotFound(path) => write!(f, "not found: {}", path.display()),
            Error::MalformedFrontMatter { path, err } => {
                write!(f, "malformed front matter in {}: {}", path.display(), err)
            }
            Error::Io { path, err } => write!(f, "reading {}: {}", path.display(), err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::NotFound(_) => None,
            Error::MalformedFrontMatter { err, .. } => Some(err),
            Error::Io { err, .. } => Some(err),
        }
    }
}

/// Represents a front matter block that couldn't be parsed.
#[derive(Debug)]
pub enum FrontMatterError {
    /// Returned when the opening `---` has no matching closing `---`.
    MissingEndFence,

    /// Returned when the block isn't valid YAML.
    Yaml(serde_yaml::Error),

    /// Returned when the block is valid YAML but not a mapping with string
    /// keys.
    NotAMapping,
}

impl fmt::Display for FrontMatterError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FrontMatterError::MissingEndFence => write!(f, "missing closing `---`"),
            FrontMatterError::Yaml(err) => fmt::Display::fmt(err, f),
            FrontMatterError::NotAMapping => {
                write!(f, "front matter must be a mapping with string keys")
            }
        }
    }
}

impl std::error::Error for FrontMatterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FrontMatterError::Yaml(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for FrontMatterError {
    /// Converts a [`serde_yaml::Error`] into a [`FrontMatterError`]. It
    /// allows us to use the `?` operator for [`serde_yaml`] deserialization
    /// functions.
    fn from(err: serde_yaml::Error) -> FrontMatterError {
        FrontMatterError::Yaml(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn fixture(files: &[(&str, &str)]) -> io::Result<(TempDir, Repository)> {
        let dir = tempfile::tempdir()?;
        for (path, contents) in files {
            let path = dir.path().join(path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, contents)?;
        }
        let repository = Repository::new(dir.path());
        Ok((dir, repository))
    }

    #[test]
    fn test_parse_front_matter() -> std::result::Result<(), FrontMatterError> {
        let post = RawPost::parse("---\ntitle: Hello\ndate: 2024-01-01\ntags: [a, b]\n---\n# Body\n")?;
        assert_eq!(
            post.front_matter.get("title"),
            Some(&serde_yaml::Value::String("Hello".to_owned()))
        );
        assert_eq!(post.front_matter.len(), 3);
        assert_eq!(post.content, "# Body\n");
        Ok(())
    }

    #[test]
    fn test_parse_without_front_matter() -> std::result::Result<(), FrontMatterError> {
        let post = RawPost::parse("# Just a body\n\n---\n")?;
        assert!(post.front_matter.is_empty());
        assert_eq!(post.content, "# Just a body\n\n---\n");
        Ok(())
    }

    #[test]
    fn test_parse_empty_front_matter() -> std::result::Result<(), FrontMatterError> {
        let post = RawPost::parse("---\n---\nbody")?;
        assert!(post.front_matter.is_empty());
        assert_eq!(post.content, "body");
        Ok(())
    }

    #[test]
    fn test_parse_crlf_fences() -> std::result::Result<(), FrontMatterError> {
        let post = RawPost::parse("---\r\ntitle: Hi\r\n---\r\nbody\r\n")?;
        assert_eq!(post.front_matter.len(), 1);
        assert_eq!(post.content, "body\r\n");
        Ok(())
    }

    #[test]
    fn test_parse_dashes_inside_yaml_value() -> std::result::Result<(), FrontMatterError> {
        let post = RawPost::parse("---\ntitle: a --- b\n---\nbody")?;
        assert_eq!(
            post.front_matter.get("title"),
            Some(&serde_yaml::Value::String("a --- b".to_owned()))
        );
        Ok(())
    }

    #[test]
    fn test_parse_malformed_front_matter() {
        assert!(matches!(
            RawPost::parse("---\ntitle: Hello\n"),
            Err(FrontMatterError::MissingEndFence)
        ));
        assert!(matches!(
            RawPost::parse("---\ntitle: [unclosed\n---\n"),
            Err(FrontMatterError::Yaml(_))
        ));
        assert!(matches!(
            RawPost::parse("---\n- just\n- a list\n---\n"),
            Err(FrontMatterError::NotAMapping)
        ));
    }

    #[test]
    fn test_list_ids() -> io::Result<()> {
        let (_dir, repository) = fixture(&[
            ("cs/os/b.md", "---\n---\n"),
            ("cs/os/a.md", "---\n---\n"),
            ("cs/os/notes.txt", "ignored"),
            ("cs/os/nested/c.md", "---\n---\n"),
            ("cs/os/notes.md.md", "---\n---\n"),
            ("cs/os/.md", "---\n---\n"),
        ])?;
        let ids = repository
            .list_ids(&ContentPath::new(&["cs", "os"]))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let ids: HashSet<String> = ids.into_iter().collect();
        let wanted: HashSet<String> = vec!["a".to_owned(), "b".to_owned()].into_iter().collect();
        assert_eq!(ids, wanted);
        Ok(())
    }

    #[test]
    fn test_list_ids_missing_directory() -> io::Result<()> {
        let (_dir, repository) = fixture(&[])?;
        match repository.list_ids(&ContentPath::new(&["cs", "os"])) {
            Err(Error::NotFound(_)) => Ok(()),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_read_post_strips_extension() -> io::Result<()> {
        let (_dir, repository) = fixture(&[("cs/os/intro.md", "---\ntitle: Intro\n---\nHi")])?;
        let path = ContentPath::new(&["cs", "os"]);
        for id in &["intro", "intro.md"] {
            let post = repository
                .read_post(&path, id)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            assert_eq!(post.content, "Hi");
        }
        Ok(())
    }

    #[test]
    fn test_read_post_errors() -> io::Result<()> {
        let (_dir, repository) = fixture(&[("cs/os/bad.md", "---\ntitle: [\n---\nHi")])?;
        let path = ContentPath::new(&["cs", "os"]);
        assert!(matches!(
            repository.read_post(&path, "missing"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            repository.read_post(&path, "../os/bad"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            repository.read_post(&path, "bad"),
            Err(Error::MalformedFrontMatter { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_content_path() {
        let path: ContentPath = "/interface//html/".parse().unwrap_or_else(|e| match e {});
        assert_eq!(path, ContentPath::new(&["interface", "html"]));
        assert_eq!(path.to_string(), "interface/html");
        assert_eq!(
            path.to_path(Path::new("/posts")),
            PathBuf::from("/posts/interface/html")
        );
    }
}
