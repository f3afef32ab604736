//! An in-process cache of rendered posts, keyed by content path and post ID
//! and validated against a hash of the source file. Nothing is persisted; a
//! cache lives as long as the [`crate::post::Resolver`] holding it.

use std::collections::HashMap;

use blake3::Hash;
use parking_lot::RwLock;
use tracing::debug;

use crate::content::ContentPath;
use crate::post::RenderedPost;

type Key = (ContentPath, String);

#[derive(Default)]
pub struct RenderCache {
    entries: RwLock<HashMap<Key, (Hash, RenderedPost)>>,
}

impl RenderCache {
    pub fn new() -> RenderCache {
        RenderCache::default()
    }

    /// Returns the cached post if one exists for this source hash.
    pub fn get(&self, content_path: &ContentPath, id: &str, hash: &Hash) -> Option<RenderedPost> {
        let entries = self.entries.read();
        let (cached_hash, post) = entries.get(&(content_path.clone(), id.to_owned()))?;
        if cached_hash != hash {
            debug!(%content_path, id, "source changed; cached render is stale");
            return None;
        }
        debug!(%content_path, id, "render cache hit");
        Some(post.clone())
    }

    pub fn insert(&self, content_path: ContentPath, id: String, hash: Hash, post: RenderedPost) {
        self.entries.write().insert((content_path, id), (hash, post));
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Hashes a post source file's contents.
pub fn source_hash(contents: &str) -> Hash {
    blake3::hash(contents.as_bytes())
}

#[cfg(test)]
mod test {
    use super::*;

    fn post(html: &str) -> RenderedPost {
        RenderedPost {
            id: "a".to_owned(),
            title: Some("A".to_owned()),
            date: "2024-01-01".to_owned(),
            html: html.to_owned(),
            fields: Default::default(),
        }
    }

    #[test]
    fn test_hit_requires_matching_hash() {
        let cache = RenderCache::new();
        let content_path = ContentPath::new(&["cs", "os"]);
        let old = source_hash("old");
        cache.insert(content_path.clone(), "a".to_owned(), old, post("<p>old</p>"));

        assert_eq!(
            cache.get(&content_path, "a", &old).map(|p| p.html),
            Some("<p>old</p>".to_owned())
        );
        assert_eq!(cache.get(&content_path, "a", &source_hash("new")), None);
        assert_eq!(cache.get(&content_path, "b", &old), None);
        assert_eq!(cache.get(&ContentPath::new(&["cs"]), "a", &old), None);
        assert_eq!(cache.len(), 1);
    }
}
