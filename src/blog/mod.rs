//! Blog articles: the JSON-file store plus import, generation and scheduling.

pub mod generator;
pub mod integration;
pub mod scheduler;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging::{log, obj, v_str, Domain, Level};
use serde_json::json;

pub const DEFAULT_AUTHOR: &str = "ETF Italia AI";
pub const UNCATEGORIZED: &str = "Senza Categoria";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Article {
    pub id: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub author: String,
    /// RFC 3339 timestamp; ordering is lexicographic on this field.
    pub date: String,
    pub category: String,
    pub tags: Vec<String>,
    pub featured: bool,
    pub published: bool,
    pub image: String,
    pub read_time: u32,
    pub views: u64,
    pub likes: u64,
    pub ai_generated: bool,
}

impl Default for Article {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            content: String::new(),
            excerpt: String::new(),
            author: DEFAULT_AUTHOR.to_string(),
            date: String::new(),
            category: String::new(),
            tags: Vec::new(),
            featured: false,
            published: true,
            image: String::new(),
            read_time: 1,
            views: 0,
            likes: 0,
            ai_generated: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogStats {
    pub total_articles: usize,
    pub ai_articles: usize,
    pub manual_articles: usize,
    pub last_updated: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub total: usize,
    pub ai: usize,
}

/// Lowercases, turns spaces into dashes and drops `: , .`.
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_'))
        .collect()
}

pub fn article_id(title: &str, now: DateTime<Utc>) -> String {
    format!("{}-{}", slugify(title), now.timestamp())
}

/// Accepts a bare JSON array or a script wrapping one (`const blogArticles = [...];`).
pub fn parse_articles(raw: &str) -> Result<Vec<Article>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let start = trimmed.find('[').context("no article array found")?;
    let end = trimmed.rfind(']').context("unterminated article array")?;
    if end < start {
        anyhow::bail!("malformed article array");
    }
    serde_json::from_str(&trimmed[start..=end]).context("parse article array")
}

pub fn sort_by_date_desc(articles: &mut [Article]) {
    articles.sort_by(|a, b| b.date.cmp(&a.date));
}

/// Articles persisted as one pretty-printed JSON array.
pub struct ArticleStore {
    path: PathBuf,
    articles: Vec<Article>,
}

impl ArticleStore {
    /// Opens the store; a missing file is an empty blog.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let articles = if path.exists() {
            let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
            parse_articles(&raw)?
        } else {
            Vec::new()
        };
        log(
            Level::Debug,
            Domain::Blog,
            "store_opened",
            obj(&[("path", v_str(&path.display().to_string())), ("count", json!(articles.len()))]),
        );
        Ok(Self { path, articles })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&self.articles)?)?;
        fs::rename(&tmp, &self.path).with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }

    pub fn all(&self) -> &[Article] {
        &self.articles
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    pub fn by_id(&self, id: &str) -> Option<&Article> {
        self.articles.iter().find(|a| a.id == id)
    }

    pub fn by_category(&self, category: &str) -> Vec<&Article> {
        self.articles.iter().filter(|a| a.category == category).collect()
    }

    pub fn featured(&self) -> Vec<&Article> {
        self.articles.iter().filter(|a| a.featured).collect()
    }

    pub fn published(&self) -> Vec<&Article> {
        self.articles.iter().filter(|a| a.published).collect()
    }

    pub fn ai_generated(&self) -> Vec<&Article> {
        self.articles.iter().filter(|a| a.ai_generated).collect()
    }

    /// `base`, or `base-2`, `base-3`... when that id is taken.
    pub fn unused_id(&self, base: &str) -> String {
        let mut id = base.to_string();
        let mut n = 1;
        while self.by_id(&id).is_some() {
            n += 1;
            id = format!("{}-{}", base, n);
        }
        id
    }

    fn upsert(&mut self, article: Article) {
        match self.articles.iter_mut().find(|a| a.id == article.id) {
            Some(existing) => *existing = article,
            None => self.articles.push(article),
        }
    }

    /// Replaces the article with the same id, or appends it.
    pub fn save(&mut self, article: Article) -> Result<()> {
        self.upsert(article);
        self.persist()
    }

    /// Upserts every article and writes once; returns how many were stored.
    pub fn save_many(&mut self, articles: Vec<Article>) -> Result<usize> {
        let count = articles.len();
        for article in articles {
            self.upsert(article);
        }
        self.persist()?;
        Ok(count)
    }

    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let before = self.articles.len();
        self.articles.retain(|a| a.id != id);
        if self.articles.len() == before {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    pub fn replace_all(&mut self, articles: Vec<Article>) -> Result<()> {
        self.articles = articles;
        self.persist()
    }

    pub fn stats(&self, now: DateTime<Utc>) -> BlogStats {
        let ai = self.articles.iter().filter(|a| a.ai_generated).count();
        BlogStats {
            total_articles: self.articles.len(),
            ai_articles: ai,
            manual_articles: self.articles.len() - ai,
            last_updated: now.to_rfc3339(),
        }
    }

    pub fn category_stats(&self) -> BTreeMap<String, CategoryCount> {
        let mut out: BTreeMap<String, CategoryCount> = BTreeMap::new();
        for a in &self.articles {
            let key = if a.category.is_empty() { UNCATEGORIZED } else { a.category.as_str() };
            let entry = out.entry(key.to_string()).or_default();
            entry.total += 1;
            if a.ai_generated {
                entry.ai += 1;
            }
        }
        out
    }

    pub fn record_view(&mut self, id: &str) -> Result<Option<u64>> {
        let views = match self.articles.iter_mut().find(|a| a.id == id) {
            Some(a) => {
                a.views += 1;
                a.views
            }
            None => return Ok(None),
        };
        self.persist()?;
        Ok(Some(views))
    }

    pub fn like(&mut self, id: &str) -> Result<Option<u64>> {
        let likes = match self.articles.iter_mut().find(|a| a.id == id) {
            Some(a) => {
                a.likes += 1;
                a.likes
            }
            None => return Ok(None),
        };
        self.persist()?;
        Ok(Some(likes))
    }
}
