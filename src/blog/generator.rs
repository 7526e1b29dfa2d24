//! Template-based article generator writing `article_<id>.json` files.

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};

use super::{article_id, Article, DEFAULT_AUTHOR};
use crate::logging::{log, obj, v_str, Domain, Level};
use serde_json::json;

pub const TOPICS: [&str; 10] = [
    "ETF azionari europei",
    "ETF obbligazionari",
    "ETF settoriali tecnologia",
    "ETF mercati emergenti",
    "ETF sostenibili ESG",
    "ETF commodities",
    "ETF immobiliari REIT",
    "ETF small cap",
    "ETF dividend yield",
    "ETF value investing",
];

/// (kind, template) with `{topic}` and `{year}` placeholders.
pub const TITLE_TEMPLATES: [(&str, &str); 5] = [
    ("analisi", "Analisi {topic}: Opportunità e Rischi nel {year}"),
    ("guida", "Guida Completa agli {topic}: Come Investire nel {year}"),
    ("confronto", "Confronto {topic}: I Migliori ETF del {year}"),
    ("trend", "Trend {topic}: Previsioni per il {year}"),
    ("strategia", "Strategie di Investimento con {topic} nel {year}"),
];

const BASE_CONTENT: [&str; 3] = [
    "Gli ETF rappresentano uno strumento di investimento sempre più popolare tra gli investitori italiani. Questi fondi offrono diversificazione, bassi costi e facilità di accesso ai mercati finanziari.",
    "Investire in ETF può essere una strategia efficace per costruire un portafoglio diversificato. È importante comprendere i rischi e le opportunità di ogni tipologia di ETF.",
    "Il mercato degli ETF continua a crescere, offrendo agli investitori nuove opportunità di investimento in diversi settori e asset class.",
];

pub const DISCLAIMER: &str = "Questo articolo fornisce informazioni generali sugli ETF e non costituisce consulenza finanziaria. È sempre consigliabile consultare un consulente finanziario qualificato prima di prendere decisioni di investimento.";

pub fn title_for(topic: &str, template: &str, year: i32) -> String {
    template.replace("{topic}", topic).replace("{year}", &year.to_string())
}

pub fn random_title<R: Rng + ?Sized>(rng: &mut R, now: DateTime<Utc>) -> String {
    let topic = TOPICS.choose(rng).copied().unwrap_or(TOPICS[0]);
    let (_, template) = TITLE_TEMPLATES.choose(rng).copied().unwrap_or(TITLE_TEMPLATES[0]);
    title_for(topic, template, now.year())
}

pub fn prompt_for<R: Rng + ?Sized>(title: &str, rng: &mut R) -> String {
    let prompts = [
        format!("Scrivi un articolo professionale su: {}. L'articolo deve essere informativo e utile per investitori italiani interessati agli ETF.", title),
        format!("Articolo finanziario: {}. Includi analisi di mercato, vantaggi, rischi e consigli pratici per investitori.", title),
        format!("Guida agli investimenti: {}. Spiega in modo chiaro e professionale le opportunità di investimento.", title),
    ];
    let idx = rng.gen_range(0..prompts.len());
    prompts[idx].clone()
}

/// A base paragraph plus a sentence tied to the prompt's topic.
pub fn template_content<R: Rng + ?Sized>(prompt: &str, rng: &mut R) -> String {
    let mut content = BASE_CONTENT.choose(rng).copied().unwrap_or(BASE_CONTENT[0]).to_string();
    let lower = prompt.to_lowercase();
    if lower.contains("commodities") {
        content.push_str(" Le materie prime rappresentano un'asset class importante per la diversificazione del portafoglio.");
    } else if lower.contains("tecnologia") {
        content.push_str(" Il settore tecnologico offre opportunità di crescita interessanti per gli investitori.");
    } else if lower.contains("obbligazionari") {
        content.push_str(" Gli ETF obbligazionari possono fornire stabilità e reddito al portafoglio.");
    }
    content
}

/// One `<p>` per sentence; the first sentence is bold.
pub fn format_paragraphs(text: &str) -> String {
    let mut out = String::new();
    let sentences = text.split(". ").map(|s| s.trim().trim_end_matches('.')).filter(|s| !s.is_empty());
    for (i, sentence) in sentences.enumerate() {
        if i == 0 {
            out.push_str(&format!("<p><strong>{}.</strong></p>\n\n", sentence));
        } else {
            out.push_str(&format!("<p>{}.</p>\n\n", sentence));
        }
    }
    out
}

pub fn category_from_title(title: &str) -> &'static str {
    let t = title.to_lowercase();
    if t.contains("analisi") {
        "Analisi di Mercato"
    } else if t.contains("guida") {
        "Guide agli Investimenti"
    } else if t.contains("confronto") {
        "Confronti ETF"
    } else if t.contains("trend") || t.contains("previsioni") {
        "Trend e Previsioni"
    } else if t.contains("strategia") || t.contains("strategie") {
        "Strategie di Investimento"
    } else {
        "ETF News"
    }
}

pub fn tags_from_title(title: &str) -> Vec<String> {
    let t = title.to_lowercase();
    let rules: [(&[&str], &str); 7] = [
        (&["azionari", "azioni"], "ETF Azionari"),
        (&["obbligazionari", "obbligazioni"], "ETF Obbligazionari"),
        (&["europei", "europa"], "Mercati Europei"),
        (&["emergenti"], "Mercati Emergenti"),
        (&["esg", "sostenibili"], "ESG"),
        (&["tecnologia", "tech"], "Tecnologia"),
        (&["dividend", "dividendi"], "Dividendi"),
    ];
    let mut tags: Vec<String> = ["ETF", "Investimenti", "Finanza"].iter().map(|s| s.to_string()).collect();
    for (needles, tag) in rules {
        if needles.iter().any(|n| t.contains(n)) {
            tags.push(tag.to_string());
        }
    }
    tags
}

pub fn excerpt(content: &str) -> String {
    let head: String = content.chars().take(200).collect();
    format!("{}...", head)
}

pub struct ArticleGenerator {
    output_dir: PathBuf,
}

impl ArticleGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self { output_dir: output_dir.into() }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn build_article<R: Rng + ?Sized>(&self, title: &str, rng: &mut R, now: DateTime<Utc>) -> Article {
        let prompt = prompt_for(title, rng);
        let body = format!("{} {}", template_content(&prompt, rng), DISCLAIMER);
        let content = format_paragraphs(&body);
        Article {
            id: article_id(title, now),
            title: title.to_string(),
            excerpt: excerpt(&content),
            content,
            author: DEFAULT_AUTHOR.to_string(),
            date: now.to_rfc3339(),
            category: category_from_title(title).to_string(),
            tags: tags_from_title(title),
            featured: false,
            published: true,
            ..Article::default()
        }
    }

    /// Writes `article_<id>.json`, suffixing the id when the file already exists.
    pub fn save(&self, article: &mut Article) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("create {}", self.output_dir.display()))?;
        let base_id = article.id.clone();
        let mut n = 1;
        let mut path = self.output_dir.join(format!("article_{}.json", article.id));
        while path.exists() {
            n += 1;
            article.id = format!("{}-{}", base_id, n);
            path = self.output_dir.join(format!("article_{}.json", article.id));
        }
        fs::write(&path, serde_json::to_string_pretty(article)?)?;
        log(
            Level::Info,
            Domain::Blog,
            "article_saved",
            obj(&[("path", v_str(&path.display().to_string())), ("id", v_str(&article.id))]),
        );
        Ok(path)
    }

    /// Generates and saves `count` articles; failures are logged and skipped.
    pub fn generate_daily<R: Rng + ?Sized>(&self, count: usize, rng: &mut R, now: DateTime<Utc>) -> Vec<Article> {
        log(Level::Info, Domain::Blog, "generation_started", obj(&[("count", json!(count))]));
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            let title = random_title(rng, now);
            let mut article = self.build_article(&title, rng, now);
            match self.save(&mut article) {
                Ok(_) => out.push(article),
                Err(e) => log(
                    Level::Error,
                    Domain::Blog,
                    "generation_failed",
                    obj(&[("index", json!(i + 1)), ("error", v_str(&e.to_string()))]),
                ),
            }
        }
        log(Level::Info, Domain::Blog, "generation_complete", obj(&[("created", json!(out.len()))]));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blog::integration::BlogIntegration;
    use crate::blog::ArticleStore;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    #[test]
    fn titles_categories_tags() {
        let title = title_for("ETF obbligazionari", TITLE_TEMPLATES[1].1, 2025);
        assert_eq!(title, "Guida Completa agli ETF obbligazionari: Come Investire nel 2025");
        assert_eq!(category_from_title(&title), "Guide agli Investimenti");
        assert_eq!(category_from_title("Trend ETF small cap"), "Trend e Previsioni");
        assert_eq!(category_from_title("ETF news del giorno"), "ETF News");
        let tags = tags_from_title("Analisi ETF sostenibili ESG europei");
        assert_eq!(tags, vec!["ETF", "Investimenti", "Finanza", "Mercati Europei", "ESG"]);
    }

    #[test]
    fn paragraphs_bold_first_sentence() {
        let html = format_paragraphs("Prima frase. Seconda frase. Terza.");
        assert_eq!(
            html,
            "<p><strong>Prima frase.</strong></p>\n\n<p>Seconda frase.</p>\n\n<p>Terza.</p>\n\n"
        );
    }

    #[test]
    fn topic_sentence_added() {
        let mut rng = StdRng::seed_from_u64(5);
        assert!(template_content("Guida ETF commodities", &mut rng).contains("materie prime"));
        assert!(template_content("ETF obbligazionari", &mut rng).contains("stabilità e reddito"));
    }

    #[test]
    fn generated_files_import_cleanly() {
        let dir = TempDir::new().unwrap();
        let generator = ArticleGenerator::new(dir.path().join("generated"));
        let mut rng = StdRng::seed_from_u64(11);
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();

        let articles = generator.generate_daily(3, &mut rng, now);
        assert_eq!(articles.len(), 3);
        for a in &articles {
            assert!(a.content.starts_with("<p><strong>"));
            assert!(a.content.contains("consulenza finanziaria"));
            assert!(a.excerpt.ends_with("..."));
            assert!(a.title.contains("2025"));
        }

        let mut store = ArticleStore::open(dir.path().join("blog.json")).unwrap();
        let integration = BlogIntegration::new(dir.path().join("generated"), dir.path().join("processed"));
        assert_eq!(integration.process_new_articles(&mut store).unwrap(), 3);
    }
}
