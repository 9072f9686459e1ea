use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::command::{ContentType, LessonAction};

/// Routing surface of the host application.
#[cfg_attr(test, automock)]
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str) -> Result<()>;
    fn current_route(&self) -> Option<String>;
    /// Scrolls the viewport; `amount` is in screen heights.
    fn scroll(&self, direction: crate::command::ScrollDirection, amount: u32);
    /// Moves through history by `delta` entries, negative is back.
    fn history(&self, delta: i32);
}

/// Player and quiz controls of the lesson currently on screen.
#[cfg_attr(test, automock)]
pub trait LessonControls: Send + Sync {
    fn control(&self, action: LessonAction) -> Result<()>;
    fn select_quiz_option(&self, index: usize) -> Result<()>;
    fn submit_quiz(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub class_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: String,
    pub title: String,
    /// Sort key; chapter ordinals count in this order.
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Microsection {
    pub id: String,
    pub title: String,
    pub content_type: ContentType,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: String,
    pub title: String,
    pub order: u32,
    #[serde(default)]
    pub microsections: Vec<Microsection>,
}

/// Read side of the lesson store.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait LessonCatalog: Send + Sync {
    async fn subjects(&self) -> Result<Vec<Subject>>;
    async fn chapters(&self, subject_slug: &str) -> Result<Vec<Chapter>>;
    /// Section and microsection tree of one chapter.
    async fn chapter_tree(&self, class_id: &str, subject_slug: &str, chapter_id: &str) -> Result<Vec<Section>>;
}

/// Server side copy of the user's language preference.
#[async_trait]
#[cfg_attr(test, automock)]
pub trait PreferenceSync: Send + Sync {
    async fn put_language(&self, language: &str) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogChapter {
    #[serde(flatten)]
    chapter: Chapter,
    #[serde(default)]
    sections: Vec<Section>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogSubject {
    #[serde(flatten)]
    subject: Subject,
    #[serde(default)]
    chapters: Vec<CatalogChapter>,
}

/// Catalog held in memory, loadable from a JSON document of nested
/// subjects, chapters and sections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryCatalog {
    subjects: Vec<CatalogSubject>,
}

impl InMemoryCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse lesson catalog")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lesson catalog at {}", path.display()))?;
        Self::from_json(&json)
    }

    fn find(&self, slug: &str) -> Option<&CatalogSubject> {
        self.subjects.iter().find(|s| s.subject.slug == slug)
    }
}

#[async_trait]
impl LessonCatalog for InMemoryCatalog {
    async fn subjects(&self) -> Result<Vec<Subject>> {
        Ok(self.subjects.iter().map(|s| s.subject.clone()).collect())
    }

    async fn chapters(&self, subject_slug: &str) -> Result<Vec<Chapter>> {
        let subject = self
            .find(subject_slug)
            .ok_or_else(|| anyhow::anyhow!("unknown subject {}", subject_slug))?;
        Ok(subject.chapters.iter().map(|c| c.chapter.clone()).collect())
    }

    async fn chapter_tree(&self, _class_id: &str, subject_slug: &str, chapter_id: &str) -> Result<Vec<Section>> {
        let subject = self
            .find(subject_slug)
            .ok_or_else(|| anyhow::anyhow!("unknown subject {}", subject_slug))?;
        let chapter = subject
            .chapters
            .iter()
            .find(|c| c.chapter.id == chapter_id)
            .ok_or_else(|| anyhow::anyhow!("unknown chapter {}", chapter_id))?;
        Ok(chapter.sections.clone())
    }
}

/// Upper bound for one preference request, connect included.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// PUTs the language to `{base_url}/users/{user_id}/preferences`.
pub struct HttpPreferenceSync {
    client: Client,
    base_url: String,
    user_id: String,
    token: Option<SecretString>,
}

impl HttpPreferenceSync {
    pub fn new(base_url: &str, user_id: &str, token: Option<SecretString>) -> Result<Self> {
        let client = Client::builder()
            .timeout(SYNC_TIMEOUT)
            .build()
            .context("Failed to build preference HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.to_string(),
            token,
        })
    }

    fn url(&self) -> String {
        format!("{}/users/{}/preferences", self.base_url, self.user_id)
    }
}

#[async_trait]
impl PreferenceSync for HttpPreferenceSync {
    async fn put_language(&self, language: &str) -> Result<()> {
        let mut request = self
            .client
            .put(self.url())
            .json(&serde_json::json!({ "language": language }));
        if let Some(token) = self.token.as_ref() {
            request = request.bearer_auth(token.expose_secret());
        }
        request
            .send()
            .await
            .context("Failed to reach preference endpoint")?
            .error_for_status()
            .context("Preference endpoint rejected the language")?;
        Ok(())
    }
}
