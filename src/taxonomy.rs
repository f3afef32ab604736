//! Defines the [`Taxonomy`] type: the sections of the site, the segments
//! allowed within each section, and the flat content trees that live outside
//! of the section/segment scheme. The taxonomy is the single source of truth
//! for which content paths (and therefore which routes) may exist.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::content::ContentPath;

/// The section/segment table for a site. A [`Taxonomy`] is a plain value;
/// it's loaded from the project file and handed to whatever needs it.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Taxonomy {
    /// The section set, in navigation order.
    #[serde(default)]
    sections: Vec<String>,

    /// The segments allowed in each section. Sections without an entry have
    /// no segments.
    #[serde(default)]
    segments: BTreeMap<String, Vec<String>>,

    /// Content trees keyed directly by a flat segment list (e.g.,
    /// `interface: [html, css]` yields `interface/html` and
    /// `interface/css`).
    #[serde(default)]
    trees: BTreeMap<String, Vec<String>>,
}

impl Taxonomy {
    /// Builds a taxonomy from `(section, segments)` pairs. Every section in
    /// `sections` is part of the section set, including those with no
    /// segments.
    pub fn new<S, I>(sections: I) -> Taxonomy
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, Vec<&'static str>)>,
    {
        let mut taxonomy = Taxonomy::default();
        for (section, segments) in sections {
            let section = section.into();
            taxonomy.segments.insert(
                section.clone(),
                segments.into_iter().map(String::from).collect(),
            );
            taxonomy.sections.push(section);
        }
        taxonomy
    }

    /// Adds a flat content tree.
    pub fn with_tree(mut self, name: &str, segments: Vec<&'static str>) -> Taxonomy {
        self.trees.insert(
            name.to_owned(),
            segments.into_iter().map(String::from).collect(),
        );
        self
    }

    /// Adds a section with no entry in the segment table.
    pub fn with_bare_section(mut self, name: &str) -> Taxonomy {
        self.sections.push(name.to_owned());
        self
    }

    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    /// Returns the segments allowed in `section`, or an empty slice if the
    /// section has no entry in the segment table.
    pub fn segments(&self, section: &str) -> &[String] {
        self.segments
            .get(section)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn trees(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.trees
            .iter()
            .map(|(name, segments)| (name.as_str(), segments.as_slice()))
    }

    /// Returns true if `section/segment` is declared, either as a section
    /// segment or as a tree segment.
    pub fn allows(&self, section: &str, segment: &str) -> bool {
        let in_sections = self.sections.iter().any(|s| s == section)
            && self.segments(section).iter().any(|s| s == segment);
        in_sections
            || self
                .trees
                .get(section)
                .map_or(false, |segments| segments.iter().any(|s| s == segment))
    }

    /// Every declared content path: section segments in declaration order,
    /// followed by tree segments.
    pub fn content_paths(&self) -> Vec<ContentPath> {
        let mut paths = Vec::new();
        for section in &self.sections {
            for segment in self.segments(section) {
                paths.push(ContentPath::new(&[section.as_str(), segment.as_str()]));
            }
        }
        for (tree, segments) in self.trees() {
            for segment in segments {
                paths.push(ContentPath::new(&[tree, segment.as_str()]));
            }
        }
        paths
    }

    /// Checks that every name can be used as a single path component and
    /// that no section or segment is declared twice.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for section in &self.sections {
            check_name(section)?;
            if !seen.insert(section.as_str()) {
                return Err(Error::DuplicateSection(section.clone()));
            }
        }

        for (section, segments) in self.segments.iter().chain(self.trees.iter()) {
            check_name(section)?;
            let mut seen = HashSet::new();
            for segment in segments {
                check_name(segment)?;
                if !seen.insert(segment.as_str()) {
                    return Err(Error::DuplicateSegment {
                        section: section.clone(),
                        segment: segment.clone(),
                    });
                }
            }
        }

        for section in self.segments.keys() {
            if !self.sections.contains(section) {
                warn!(
                    section = %section,
                    "segment table entry has no matching section; ignoring"
                );
            }
        }
        Ok(())
    }

    /// Builds the navigation menu: one group per section (then per tree),
    /// one item per segment.
    pub fn navigation(&self) -> Vec<NavGroup> {
        let group = |name: &str, segments: &[String]| NavGroup {
            name: name.to_owned(),
            children: segments
                .iter()
                .map(|segment| NavItem {
                    path: format!("/{}/{}", name, segment),
                    name: segment.clone(),
                    key: segment.clone(),
                    active: true,
                })
                .collect(),
        };

        self.sections
            .iter()
            .map(|section| group(section, self.segments(section)))
            .chain(self.trees().map(|(tree, segments)| group(tree, segments)))
            .collect()
    }
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(Error::InvalidName(name.to_owned()));
    }
    Ok(())
}

/// A group of navigation links, one per section or tree.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NavGroup {
    pub name: String,
    pub children: Vec<NavItem>,
}

/// A link to a segment's listing page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NavItem {
    pub path: String,
    pub name: String,
    pub key: String,
    pub active: bool,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Represents a problem with a [`Taxonomy`] definition.
#[derive(Debug, PartialEq)]
pub enum Error {
    /// Returned when a section, segment, or tree name can't be used as a path
    /// component.
    InvalidName(String),

    /// Returned when a section appears twice in the section set.
    DuplicateSection(String),

    /// Returned when a segment appears twice within one section or tree.
    DuplicateSegment { section: String, segment: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidName(name) => {
                write!(f, "invalid taxonomy name `{}`", name)
            }
            Error::DuplicateSection(section) => {
                write!(f, "section `{}` is declared more than once", section)
            }
            Error::DuplicateSegment { section, segment } => write!(
                f,
                "segment `{}` is declared more than once in `{}`",
                segment, section
            ),
        }
    }
}

impl std::error::Error for Error {}
