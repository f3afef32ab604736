//! The library code for the `folio` static site generator. A site is a tree
//! of Markdown posts laid out by a [`taxonomy::Taxonomy`] of sections and
//! segments, and building it breaks down into three distinct steps:
//!
//! 1. Enumerating the static routes: one per post in each declared content
//!    path ([`crate::routes`])
//! 2. Rendering every post: front matter is normalized and the Markdown body
//!    is run through the rendering pipeline ([`crate::post`],
//!    [`crate::markdown`])
//! 3. Writing the rendered posts and their listings to disk as JSON and,
//!    when the project has a theme, templated HTML ([`crate::write`])
//!
//! Of the three, the second step is the more involved. The pipeline is a
//! fixed sequence of stages that each take the document from one
//! representation to the same or a later one: Markdown source, parser
//! events, HTML tokens, and finally an HTML string. Rendering is spread over
//! a worker pool ([`crate::pool`]) and memoized by source hash
//! ([`crate::cache`]).
//!
//! [`build::build_site`] runs all three steps and won't write anything until
//! every post has rendered.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod cache;
pub mod config;
pub mod content;
pub mod date;
pub mod markdown;
pub mod pool;
pub mod post;
pub mod routes;
pub mod taxonomy;
pub mod value;
pub mod write;
