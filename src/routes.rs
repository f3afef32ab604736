//! Enumerates the static routes of a site. Every content path the
//! [`Taxonomy`] declares is listed through the [`Resolver`], and every post
//! ID found there becomes one [`Route`]. A declared content path with no
//! directory on disk yet contributes nothing.

use tracing::debug;

use crate::content::ContentPath;
use crate::post::{self, Resolver};
use crate::taxonomy::Taxonomy;

/// One static page: a post at a content path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Route {
    pub content_path: ContentPath,
    pub id: String,
}

impl Route {
    /// The route's path segments: the content path followed by the ID.
    pub fn segments(&self) -> Vec<&str> {
        self.content_path
            .components()
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.id.as_str()))
            .collect()
    }

    /// The route's URL path below `base_path`, with a trailing slash (e.g.,
    /// `/cs/os/paging/`).
    pub fn url(&self, base_path: &str) -> String {
        join_url(base_path, &self.segments())
    }
}

/// Joins URL path segments below `base_path`, with leading and trailing
/// slashes. Segments are percent-encoded; `base_path` is used as written.
pub fn join_url(base_path: &str, segments: &[&str]) -> String {
    let mut url = String::from("/");
    for part in base_path.split('/').filter(|part| !part.is_empty()) {
        url.push_str(part);
        url.push('/');
    }
    for segment in segments.iter().filter(|segment| !segment.is_empty()) {
        url.push_str(&urlencoding::encode(segment));
        url.push('/');
    }
    url
}

/// The posts listed under one content path, IDs ascending.
#[derive(Clone, Debug, PartialEq)]
pub struct Listing {
    pub content_path: ContentPath,
    pub ids: Vec<String>,
}

pub struct Enumerator<'a> {
    taxonomy: &'a Taxonomy,
    resolver: &'a Resolver,
}

impl<'a> Enumerator<'a> {
    pub fn new(taxonomy: &'a Taxonomy, resolver: &'a Resolver) -> Enumerator<'a> {
        Enumerator { taxonomy, resolver }
    }

    /// Lists every declared content path in taxonomy order. Content paths
    /// without a directory have no IDs.
    pub fn listings(&self) -> post::Result<Vec<Listing>> {
        let mut listings = Vec::new();
        for content_path in self.taxonomy.content_paths() {
            let ids = match self.resolver.get_all_ids(&content_path) {
                Ok(ids) => ids,
                Err(err) if err.is_not_found() => {
                    debug!(%content_path, "no content directory; skipping");
                    Vec::new()
                }
                Err(err) => return Err(err),
            };
            listings.push(Listing { content_path, ids });
        }
        Ok(listings)
    }

    /// Returns every route, in taxonomy order and then by ID.
    pub fn enumerate(&self) -> post::Result<Vec<Route>> {
        Ok(self
            .listings()?
            .into_iter()
            .flat_map(|listing| {
                let content_path = listing.content_path;
                listing.ids.into_iter().map(move |id| Route {
                    content_path: content_path.clone(),
                    id,
                })
            })
            .collect())
    }

    /// The content paths that get a listing page, whether or not they have
    /// content yet.
    pub fn listing_routes(&self) -> Vec<ContentPath> {
        self.taxonomy.content_paths()
    }

    pub fn section_routes(&self) -> Vec<String> {
        self.taxonomy.sections().to_vec()
    }
}
