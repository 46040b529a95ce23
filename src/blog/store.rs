use crate::{
    blog::front_matter::{self, FrontMatter, FrontMatterError},
    utils::metrics::POST_READS,
};
use chrono::NaiveDate;
use serde::Serialize;
use std::{
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

const EXTENSION: &str = "md";

/// Errors from the post store.
#[derive(Debug, thiserror::Error)]
pub enum BlogError {
    /// No post exists with this slug.
    #[error("no post named `{0}`")]
    NotFound(String),
    /// The posts directory or a post file could not be read.
    #[error("failed to read posts")]
    Io(#[from] io::Error),
    /// A post's front matter is invalid.
    #[error("invalid front matter in `{slug}`")]
    FrontMatter {
        /// The post's slug.
        slug: String,
        /// What was wrong with it.
        #[source]
        source: FrontMatterError,
    },
}

/// The metadata of one post, as listed on the blog index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostMetadata {
    /// File stem of the post, used in its URL.
    pub slug: String,
    /// Post title.
    pub title: String,
    /// Publication date.
    pub date: NaiveDate,
    /// Short summary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Cover image path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Tags.
    pub tags: Vec<String>,
}

impl PostMetadata {
    fn new(slug: String, fm: FrontMatter) -> Self {
        Self {
            slug,
            title: fm.title,
            date: fm.date,
            description: fm.description,
            image: fm.image,
            tags: fm.tags,
        }
    }
}

/// A full post: metadata plus the raw markdown body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    /// The post's metadata.
    pub front_matter: PostMetadata,
    /// Markdown source, without the front matter.
    pub body: String,
}

/// Reads posts from `<root>/<slug>.md`.
#[derive(Debug, Clone)]
pub struct PostStore {
    root: PathBuf,
}

/// Slugs are file stems made of ASCII alphanumerics, `-` and `_`. Anything
/// else could escape the posts directory.
fn valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn parse_post(slug: String, source: &str) -> Result<Post, BlogError> {
    let (fm, body) = front_matter::parse(source).map_err(|source| BlogError::FrontMatter {
        slug: slug.clone(),
        source,
    })?;
    Ok(Post {
        front_matter: PostMetadata::new(slug, fm),
        body: body.to_owned(),
    })
}

impl PostStore {
    /// Create a store reading from the given directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The posts directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, slug: &str) -> PathBuf {
        self.root.join(slug).with_extension(EXTENSION)
    }

    /// List every post, newest first. Posts with the same date are ordered
    /// by slug. Files that cannot be read or have invalid front matter are
    /// skipped.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub async fn list_posts(&self) -> Result<Vec<PostMetadata>, BlogError> {
        let mut posts = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(slug) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .filter(|s| valid_slug(s))
            else {
                debug!(path = %path.display(), "Skipping file without a valid slug");
                continue;
            };
            let slug = slug.to_owned();

            let source = match tokio::fs::read_to_string(&path).await {
                Ok(source) => source,
                Err(err) => {
                    warn!(%err, path = %path.display(), "Skipping unreadable post");
                    continue;
                }
            };
            match parse_post(slug, &source) {
                Ok(post) => posts.push(post.front_matter),
                Err(err) => warn!(%err, path = %path.display(), "Skipping post"),
            }
        }

        posts.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.slug.cmp(&b.slug)));
        Ok(posts)
    }

    /// Read one post by slug.
    #[instrument(skip(self))]
    pub async fn read_post(&self, slug: &str) -> Result<Post, BlogError> {
        if !valid_slug(slug) {
            return Err(BlogError::NotFound(slug.to_owned()));
        }

        let source = match tokio::fs::read_to_string(self.path_for(slug)).await {
            Ok(source) => source,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BlogError::NotFound(slug.to_owned()))
            }
            Err(e) => return Err(e.into()),
        };
        metrics::counter!(POST_READS).increment(1);

        parse_post(slug.to_owned(), &source)
    }

    /// The `n` most recent posts other than `slug`.
    pub async fn more_posts(&self, slug: &str, n: usize) -> Result<Vec<PostMetadata>, BlogError> {
        Ok(self
            .list_posts()
            .await?
            .into_iter()
            .filter(|post| post.slug != slug)
            .take(n)
            .collect())
    }
}
