//! Article and discussion input.

use std::path::Path;

use tokio::fs;

use crate::error::PodcastError;

/// Used when no discussion summary is available.
pub const NO_DISCUSSION: &str = "No discussion content found.";

/// Source material for one podcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleInput {
    pub article: String,
    pub discussion: String,
}

impl ArticleInput {
    pub fn new(article: impl Into<String>) -> Self {
        Self {
            article: article.into(),
            discussion: NO_DISCUSSION.to_string(),
        }
    }

    pub fn with_discussion(mut self, discussion: impl Into<String>) -> Self {
        self.discussion = discussion.into();
        self
    }

    /// Load the article and, if given, the discussion summary.
    pub async fn load(article_path: &Path, discussion_path: Option<&Path>) -> Result<Self, PodcastError> {
        let article = load_article(article_path).await?;
        let discussion = match discussion_path {
            Some(path) => load_discussion(path).await,
            None => NO_DISCUSSION.to_string(),
        };
        Ok(Self { article, discussion })
    }
}

/// Read the article text; a missing or blank file is an error.
pub async fn load_article(path: &Path) -> Result<String, PodcastError> {
    let text = fs::read_to_string(path).await.map_err(|e| {
        PodcastError::InputError(format!("Failed to read article '{}': {}", path.display(), e))
    })?;

    let text = text.trim();
    if text.is_empty() {
        return Err(PodcastError::InputError(format!(
            "Article '{}' is empty",
            path.display()
        )));
    }
    Ok(text.to_string())
}

/// Read the discussion summary, degrading to [`NO_DISCUSSION`].
pub async fn load_discussion(path: &Path) -> String {
    match fs::read_to_string(path).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => NO_DISCUSSION.to_string(),
    }
}
