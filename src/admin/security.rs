//! Input validation, HTML sanitisation and persisted per-action rate limits.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::{EtfError, EtfResult};
use crate::logging::{log, obj, v_str, Domain, Level};
use crate::storage::{keys, LocalStore};
use serde_json::json;

pub const MAX_TITLE: usize = 200;
pub const MAX_EXCERPT: usize = 500;
pub const MAX_CONTENT: usize = 50_000;
pub const MAX_BROKER_NAME: usize = 100;
pub const MAX_BROKER_DESCRIPTION: usize = 1_000;
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
pub const IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

pub const DEFAULT_RATE_LIMIT: usize = 10;
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);
pub const SAVE_DATA_ACTION: &str = "save_data";
pub const SAVE_DATA_LIMIT: usize = 20;

/// Escapes the five HTML-significant characters.
pub fn sanitize_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

struct ContentFilters {
    script: Regex,
    handler: Regex,
    js_scheme: Regex,
}

fn content_filters() -> Option<&'static ContentFilters> {
    static FILTERS: OnceLock<Option<ContentFilters>> = OnceLock::new();
    FILTERS
        .get_or_init(|| {
            Some(ContentFilters {
                script: Regex::new(r"(?is)<script[^>]*>.*?</script>").ok()?,
                handler: Regex::new(r#"(?i)on\w+\s*=\s*["'][^"']*["']"#).ok()?,
                js_scheme: Regex::new(r"(?i)javascript:").ok()?,
            })
        })
        .as_ref()
}

/// Keeps markup but drops `<script>` blocks, inline `on*=` handlers and `javascript:` URLs.
pub fn sanitize_content(content: &str) -> String {
    let Some(f) = content_filters() else {
        return sanitize_html(content);
    };
    let step: Cow<'_, str> = f.script.replace_all(content, "");
    let step = f.handler.replace_all(&step, "").into_owned();
    f.js_scheme.replace_all(&step, "").into_owned()
}

pub fn is_valid_url(raw: &str) -> bool {
    url::Url::parse(raw).is_ok()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanArticle {
    pub title: String,
    pub excerpt: String,
    pub content: String,
}

/// Lengths are counted in characters.
pub fn validate_article(title: &str, excerpt: &str, content: &str) -> EtfResult<CleanArticle> {
    let mut errors = Vec::new();
    if title.trim().is_empty() {
        errors.push("Il titolo è obbligatorio".to_string());
    } else if title.chars().count() > MAX_TITLE {
        errors.push(format!("Il titolo non può superare {} caratteri", MAX_TITLE));
    }
    if excerpt.chars().count() > MAX_EXCERPT {
        errors.push(format!("L'estratto non può superare {} caratteri", MAX_EXCERPT));
    }
    if content.chars().count() > MAX_CONTENT {
        errors.push(format!("Il contenuto non può superare {} caratteri", MAX_CONTENT));
    }
    if !errors.is_empty() {
        return Err(EtfError::Validation(errors));
    }
    Ok(CleanArticle {
        title: sanitize_html(title),
        excerpt: sanitize_html(excerpt),
        content: sanitize_content(content),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct CleanBroker {
    pub name: String,
    pub description: String,
    pub website: String,
    pub rating: f64,
    pub features: Vec<String>,
}

pub fn validate_broker(
    name: &str,
    description: &str,
    website: &str,
    rating: Option<f64>,
    features: &[String],
) -> EtfResult<CleanBroker> {
    let mut errors = Vec::new();
    if name.trim().is_empty() {
        errors.push("Il nome del broker è obbligatorio".to_string());
    } else if name.chars().count() > MAX_BROKER_NAME {
        errors.push(format!("Il nome del broker non può superare {} caratteri", MAX_BROKER_NAME));
    }
    if description.chars().count() > MAX_BROKER_DESCRIPTION {
        errors.push(format!("La descrizione non può superare {} caratteri", MAX_BROKER_DESCRIPTION));
    }
    if !website.is_empty() && !is_valid_url(website) {
        errors.push("L'URL del sito web non è valido".to_string());
    }
    if let Some(r) = rating {
        if !r.is_finite() || !(0.0..=5.0).contains(&r) {
            errors.push("La valutazione deve essere un numero tra 0 e 5".to_string());
        }
    }
    if !errors.is_empty() {
        return Err(EtfError::Validation(errors));
    }
    Ok(CleanBroker {
        name: sanitize_html(name),
        description: sanitize_html(description),
        website: website.to_string(),
        rating: rating.unwrap_or(0.0),
        features: features.iter().map(|f| sanitize_html(f)).collect(),
    })
}

pub fn validate_image(mime: &str, size: u64) -> EtfResult<()> {
    let mut errors = Vec::new();
    if !IMAGE_TYPES.contains(&mime) {
        errors.push("Tipo di file non supportato. Usa JPG, PNG, GIF o WebP".to_string());
    }
    if size > MAX_IMAGE_BYTES {
        errors.push(format!("Il file è troppo grande. Massimo {}MB", MAX_IMAGE_BYTES / (1024 * 1024)));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(EtfError::Validation(errors))
    }
}

/// Sliding-window limiter whose timestamps (ms) live under `rateLimit_<action>`.
/// A denied attempt is not recorded.
pub fn check_rate_limit(
    store: &mut LocalStore,
    action: &str,
    max: usize,
    window: Duration,
    now: DateTime<Utc>,
) -> EtfResult<()> {
    let key = keys::rate_limit(action);
    let now_ms = now.timestamp_millis();
    let window_ms = window.as_millis() as i64;
    let mut stamps: Vec<i64> = store.get_or_default(&key)?;
    stamps.retain(|t| now_ms - t < window_ms);
    if stamps.len() >= max {
        let retry_after_secs = window.as_secs() + u64::from(window.subsec_nanos() > 0);
        log(
            Level::Warn,
            Domain::Admin,
            "rate_limited",
            obj(&[("action", v_str(action)), ("attempts", json!(stamps.len()))]),
        );
        return Err(EtfError::RateLimited { retry_after_secs });
    }
    stamps.push(now_ms);
    store.set_json(&key, &stamps)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            sanitize_html(r#"<b onclick="x">Tom & 'Jerry'</b>"#),
            "&lt;b onclick=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn content_keeps_safe_tags() {
        let dirty = r#"<p onclick="steal()">Ciao</p><SCRIPT type="x">alert(1)
</script><a href="javascript:void(0)">link</a>"#;
        assert_eq!(sanitize_content(dirty), r#"<p >Ciao</p><a href="void(0)">link</a>"#);
    }

    #[test]
    fn article_limits() {
        let err = validate_article("", &"x".repeat(501), "").unwrap_err();
        assert_eq!(
            err.messages(),
            vec!["Il titolo è obbligatorio", "L'estratto non può superare 500 caratteri"]
        );
        let long = "é".repeat(201);
        assert_eq!(
            validate_article(&long, "", "").unwrap_err().messages(),
            vec!["Il titolo non può superare 200 caratteri"]
        );
        let ok = validate_article("<i>ETF</i>", "breve", "<p>ok</p>").unwrap();
        assert_eq!(ok.title, "&lt;i&gt;ETF&lt;/i&gt;");
        assert_eq!(ok.content, "<p>ok</p>");
    }

    #[test]
    fn broker_rules() {
        let err = validate_broker("Degiro", "", "not a url", Some(7.0), &[]).unwrap_err();
        assert_eq!(
            err.messages(),
            vec!["L'URL del sito web non è valido", "La valutazione deve essere un numero tra 0 e 5"]
        );
        let ok = validate_broker("Degiro", "d", "https://degiro.it", None, &["<b>".to_string()]).unwrap();
        assert_eq!(ok.rating, 0.0);
        assert_eq!(ok.features, vec!["&lt;b&gt;"]);
        assert!(validate_broker(" ", "", "", None, &[]).is_err());
    }

    #[test]
    fn image_rules() {
        assert!(validate_image("image/png", 1024).is_ok());
        let err = validate_image("image/bmp", MAX_IMAGE_BYTES + 1).unwrap_err();
        assert_eq!(err.messages().len(), 2);
        assert_eq!(err.messages()[1], "Il file è troppo grande. Massimo 5MB");
    }

    #[test]
    fn rate_limit_window_slides() {
        let mut store = LocalStore::in_memory().unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap();
        for _ in 0..3 {
            check_rate_limit(&mut store, "login", 3, DEFAULT_RATE_WINDOW, t0).unwrap();
        }
        let err = check_rate_limit(&mut store, "login", 3, DEFAULT_RATE_WINDOW, t0).unwrap_err();
        assert_eq!(err.to_string(), "Troppi tentativi. Riprova tra 60 secondi.");
        let later = t0 + chrono::Duration::seconds(60);
        assert!(check_rate_limit(&mut store, "login", 3, DEFAULT_RATE_WINDOW, later).is_ok());
        assert!(store.get_raw("rateLimit_login").unwrap().is_some());
    }
}
