use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

/// Number of hex characters kept from the URL digest.
pub const ID_LEN: usize = 16;

/// Derive the article identity from its URL.
///
/// The id is the first [`ID_LEN`] hex characters of SHA-256 over the raw URL
/// bytes, so it is stable across processes, machines and releases.
pub fn article_id(url: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(url.as_bytes()));
    digest[..ID_LEN].to_string()
}

/// An immutable news article with an identity derived from its URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    id: String,
    title: String,
    description: String,
    content: String,
    url: String,
    source_name: String,
    published_at: String,
    author: Option<String>,
}

impl Article {
    /// Build an article. Only a blank `url` is rejected; every other field
    /// may be empty.
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        content: impl Into<String>,
        url: impl Into<String>,
        source_name: impl Into<String>,
        published_at: impl Into<String>,
        author: Option<String>,
    ) -> Result<Self> {
        let url = url.into();
        if url.trim().is_empty() {
            return Err(Error::Validation("article url must not be blank".to_string()));
        }

        Ok(Self {
            id: article_id(&url),
            title: title.into(),
            description: description.into(),
            content: content.into(),
            url,
            source_name: source_name.into(),
            published_at: published_at.into(),
            author,
        })
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[inline]
    pub fn description(&self) -> &str {
        &self.description
    }

    #[inline]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[inline]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[inline]
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    #[inline]
    pub fn published_at(&self) -> &str {
        &self.published_at
    }

    #[inline]
    pub fn author(&self) -> Option<&str> {
        self.author.as_deref()
    }

    /// Labelled, newline-joined rendering of every field.
    ///
    /// This is the text handed to the embedder and the document returned as
    /// retrieval context.
    pub fn full_text(&self) -> String {
        let author = self.author.as_deref().unwrap_or("None");
        let parts = [
            format!("Title: {}", self.title),
            format!("Description: {}", self.description),
            format!("Content: {}", self.content),
            format!("URL: {}", self.url),
            format!("Source: {}", self.source_name),
            format!("Published At: {}", self.published_at),
            format!("Author: {}", author),
        ];
        parts.join("\n").trim().to_string()
    }

    pub fn metadata(&self) -> ArticleMetadata {
        ArticleMetadata {
            title: self.title.clone(),
            url: self.url.clone(),
            source_name: self.source_name.clone(),
            published_at: self.published_at.clone(),
        }
    }

    /// Flat key/value form used by the article store and API responses
    pub fn to_record(&self) -> ArticleRecord {
        ArticleRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            description: self.description.clone(),
            content: self.content.clone(),
            url: self.url.clone(),
            source_name: self.source_name.clone(),
            published_at: self.published_at.clone(),
            author: self.author.clone(),
        }
    }
}

/// Subset of article fields stored next to each indexed vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleMetadata {
    pub title: String,
    pub url: String,
    pub source_name: String,
    pub published_at: String,
}

/// Serialized shape of an article.
///
/// Text fields accept `null` or a missing key and read back as empty strings,
/// since feed records frequently carry nulls through to storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub source_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub published_at: String,
    #[serde(default)]
    pub author: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ArticleRecord {
    /// Rebuild the article. The id is always re-derived from the url; a stale
    /// stored id is ignored.
    pub fn into_article(self) -> Result<Article> {
        let article = Article::new(
            self.title,
            self.description,
            self.content,
            self.url,
            self.source_name,
            self.published_at,
            self.author,
        )?;
        if !self.id.is_empty() && self.id != article.id {
            warn!(stored = %self.id, derived = %article.id, "stored article id does not match its url");
        }
        Ok(article)
    }
}

impl From<&Article> for ArticleRecord {
    fn from(article: &Article) -> Self {
        article.to_record()
    }
}

/// Source block of an upstream feed record
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedSource {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

/// One article as delivered by the upstream news feed.
///
/// Every field may be missing or null; nulls become empty strings on
/// conversion, except `author` which stays optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedArticle {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub source: Option<FeedSource>,
    #[serde(default)]
    pub published_at: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
}

impl FeedArticle {
    pub fn into_article(self) -> Result<Article> {
        let source_name = self.source.and_then(|s| s.name).unwrap_or_default();
        Article::new(
            self.title.unwrap_or_default(),
            self.description.unwrap_or_default(),
            self.content.unwrap_or_default(),
            self.url.unwrap_or_default(),
            source_name,
            self.published_at.unwrap_or_default(),
            self.author,
        )
    }
}

/// Convert a batch of feed records, dropping the ones that fail validation.
pub fn parse_feed(records: Vec<FeedArticle>) -> Vec<Article> {
    records
        .into_iter()
        .filter_map(|record| {
            let title = record.title.clone().unwrap_or_default();
            match record.into_article() {
                Ok(article) => Some(article),
                Err(e) => {
                    warn!(%title, error = %e, "skipping feed article");
                    None
                }
            }
        })
        .collect()
}
