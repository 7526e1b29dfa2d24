//! Imports generated article files into the blog store.

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::json;
use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use super::{sort_by_date_desc, Article, ArticleStore, DEFAULT_AUTHOR};
use crate::logging::{log, obj, v_str, Domain, Level};

const DEFAULT_IMAGE: &str = "https://images.unsplash.com/photo-1611974789855-9c2a0a7236a3?w=800";

pub fn category_image(category: &str) -> &'static str {
    match category {
        "Analisi di Mercato" => "https://images.unsplash.com/photo-1611974789855-9c2a0a7236a3?w=800",
        "Guide agli Investimenti" => "https://images.unsplash.com/photo-1554224155-6726b3ff858f?w=800",
        "Confronti ETF" => "https://images.unsplash.com/photo-1590283603385-17ffb3a7f29f?w=800",
        "Trend e Previsioni" => "https://images.unsplash.com/photo-1642790106117-e829e14a795f?w=800",
        "Strategie di Investimento" => "https://images.unsplash.com/photo-1559526324-4b87b5e36e44?w=800",
        "ETF News" => "https://images.unsplash.com/photo-1486406146926-c627a92ad1ab?w=800",
        _ => DEFAULT_IMAGE,
    }
}

fn tag_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").ok()).as_ref()
}

pub fn strip_tags(content: &str) -> Cow<'_, str> {
    match tag_re() {
        Some(re) => re.replace_all(content, ""),
        None => Cow::Borrowed(content),
    }
}

/// Minutes at 200 words per minute on the tag-stripped text, at least 1.
pub fn read_time(content: &str) -> u32 {
    let text = strip_tags(content);
    let words = text.split_whitespace().count();
    ((words as f64 / 200.0).round() as u32).max(1)
}

/// Normalises a generated article for publication.
pub fn format_for_blog(raw: Article) -> Article {
    let author = if raw.author.trim().is_empty() { DEFAULT_AUTHOR.to_string() } else { raw.author };
    Article {
        image: category_image(&raw.category).to_string(),
        read_time: read_time(&raw.content),
        views: 0,
        likes: 0,
        ai_generated: true,
        author,
        ..raw
    }
}

#[derive(Debug, Clone)]
pub struct BlogIntegration {
    generated_dir: PathBuf,
    processed_dir: PathBuf,
}

impl BlogIntegration {
    pub fn new(generated_dir: impl Into<PathBuf>, processed_dir: impl Into<PathBuf>) -> Self {
        Self { generated_dir: generated_dir.into(), processed_dir: processed_dir.into() }
    }

    pub fn generated_dir(&self) -> &Path {
        &self.generated_dir
    }

    /// `article_*.json` files not yet copied into the processed directory, sorted by name.
    pub fn new_article_files(&self) -> Result<Vec<PathBuf>> {
        if !self.generated_dir.exists() {
            log(
                Level::Warn,
                Domain::Blog,
                "generated_dir_missing",
                obj(&[("path", v_str(&self.generated_dir.display().to_string()))]),
            );
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.generated_dir)? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n.to_string(),
                None => continue,
            };
            if name.starts_with("article_") && name.ends_with(".json") && !self.processed_dir.join(&name).exists() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn load(path: &Path) -> Result<Article> {
        let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
    }

    fn mark_processed(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(&self.processed_dir)?;
        let name = path.file_name().context("article file without name")?;
        fs::copy(path, self.processed_dir.join(name))?;
        Ok(())
    }

    /// Imports every new generated article; returns how many were added.
    pub fn process_new_articles(&self, store: &mut ArticleStore) -> Result<usize> {
        let files = self.new_article_files()?;
        if files.is_empty() {
            log(Level::Info, Domain::Blog, "import_nothing_new", obj(&[]));
            return Ok(0);
        }

        let mut articles = store.all().to_vec();
        let mut processed = 0;
        for path in files {
            let article = match Self::load(&path) {
                Ok(a) => format_for_blog(a),
                Err(e) => {
                    log(
                        Level::Error,
                        Domain::Blog,
                        "import_load_failed",
                        obj(&[("path", v_str(&path.display().to_string())), ("error", v_str(&e.to_string()))]),
                    );
                    continue;
                }
            };
            if articles.iter().any(|a| a.id == article.id) {
                log(Level::Warn, Domain::Blog, "import_duplicate", obj(&[("id", v_str(&article.id))]));
                continue;
            }
            let title = article.title.clone();
            articles.push(article);
            match self.mark_processed(&path) {
                Ok(()) => {
                    processed += 1;
                    log(Level::Info, Domain::Blog, "imported", obj(&[("title", v_str(&title))]));
                }
                Err(e) => log(
                    Level::Error,
                    Domain::Blog,
                    "mark_processed_failed",
                    obj(&[("path", v_str(&path.display().to_string())), ("error", v_str(&e.to_string()))]),
                ),
            }
        }

        if processed > 0 {
            sort_by_date_desc(&mut articles);
            store.replace_all(articles)?;
            log(Level::Info, Domain::Blog, "import_complete", obj(&[("processed", json!(processed))]));
        }
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_article(dir: &Path, id: &str, date: &str) {
        fs::create_dir_all(dir).unwrap();
        let body = json!({
            "id": id,
            "title": format!("Guida {}", id),
            "content": "<p><strong>Uno due tre.</strong></p>",
            "excerpt": "Uno due...",
            "date": date,
            "category": "Confronti ETF",
            "tags": ["ETF"],
        });
        fs::write(dir.join(format!("article_{}.json", id)), body.to_string()).unwrap();
    }

    #[test]
    fn read_time_strips_tags() {
        assert_eq!(read_time("<p>breve</p>"), 1);
        let long = format!("<p>{}</p>", "parola ".repeat(500));
        assert_eq!(read_time(&long), 3);
    }

    #[test]
    fn imports_once_and_skips_duplicates() {
        let dir = TempDir::new().unwrap();
        let generated = dir.path().join("generated");
        let processed = dir.path().join("processed");
        write_article(&generated, "a", "2024-01-01T08:00:00");
        write_article(&generated, "b", "2024-01-02T08:00:00");
        fs::write(generated.join("notes.json"), "{}").unwrap();

        let mut store = ArticleStore::open(dir.path().join("blog.json")).unwrap();
        let integration = BlogIntegration::new(&generated, &processed);
        assert_eq!(integration.process_new_articles(&mut store).unwrap(), 2);
        assert_eq!(store.all()[0].id, "b");
        let a = store.by_id("a").unwrap();
        assert!(a.ai_generated && a.published);
        assert_eq!(a.author, DEFAULT_AUTHOR);
        assert_eq!(a.image, category_image("Confronti ETF"));
        assert!(processed.join("article_a.json").exists());

        assert_eq!(integration.process_new_articles(&mut store).unwrap(), 0);

        // Same id under a new file name is skipped and left unprocessed.
        let dup = fs::read_to_string(generated.join("article_a.json")).unwrap();
        fs::write(generated.join("article_a_copy.json"), dup).unwrap();
        assert_eq!(integration.process_new_articles(&mut store).unwrap(), 0);
        assert_eq!(store.len(), 2);
        assert!(!processed.join("article_a_copy.json").exists());
    }

    #[test]
    fn missing_generated_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let integration = BlogIntegration::new(dir.path().join("nope"), dir.path().join("done"));
        assert!(integration.new_article_files().unwrap().is_empty());
    }
}
