//! Page metadata and sitemap generation for ETF detail pages.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::catalog::Etf;
use crate::market::EtfData;

const SITE_NAME: &str = "GuadagnareConETF";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaTag {
    /// `name` for plain tags, `property` for OpenGraph and Twitter ones.
    pub attribute: &'static str,
    pub key: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EtfPageMeta {
    pub title: String,
    pub description: String,
    pub canonical: String,
    pub tags: Vec<MetaTag>,
    pub structured_data: Value,
}

impl EtfPageMeta {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.iter().find(|t| t.key == key).map(|t| t.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SitemapEntry {
    pub url: String,
    pub lastmod: String,
    pub changefreq: &'static str,
    pub priority: &'static str,
}

/// "N/A" for zero, otherwise one decimal with B€/M€/K€ suffix.
pub fn format_aum(aum: f64) -> String {
    if aum == 0.0 || !aum.is_finite() {
        "N/A".to_string()
    } else if aum >= 1e9 {
        format!("{:.1}B€", aum / 1e9)
    } else if aum >= 1e6 {
        format!("{:.1}M€", aum / 1e6)
    } else {
        format!("{:.1}K€", aum / 1e3)
    }
}

/// Strips the query string and fragment.
pub fn canonical_url(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    without_fragment.split('?').next().unwrap_or(without_fragment).to_string()
}

fn meta(attribute: &'static str, key: &str, content: &str) -> MetaTag {
    MetaTag { attribute, key: key.to_string(), content: content.to_string() }
}

pub fn page_meta(data: &EtfData, page_url: &str) -> EtfPageMeta {
    let fundamentals = data.fundamentals.clone().unwrap_or(Value::Null);
    let benchmark = fundamentals["benchmark"].as_str().filter(|s| !s.is_empty()).unwrap_or("Analisi");
    let title = format!("{} - ETF {} | {}", data.symbol, benchmark, SITE_NAME);

    let price = data
        .quote
        .as_ref()
        .map(|q| format!("{:.2}", q.latest_price))
        .unwrap_or_else(|| "N/A".to_string());
    let ter = fundamentals["ter"]
        .as_f64()
        .map(|t| format!("{:.2}", t))
        .unwrap_or_else(|| "N/A".to_string());
    let aum = format_aum(fundamentals["aum"].as_f64().unwrap_or(0.0));
    let description = format!(
        "Analizza {} ({}): prezzo {}€, TER {}%, AUM {}. Confronta performance e costi.",
        data.symbol, data.isin, price, ter, aum
    );

    let tags = vec![
        meta("name", "description", &description),
        meta("property", "og:title", &title),
        meta("property", "og:description", &description),
        meta("property", "og:type", "website"),
        meta("property", "og:url", page_url),
        meta("property", "twitter:card", "summary"),
        meta("property", "twitter:title", &title),
        meta("property", "twitter:description", &description),
    ];

    EtfPageMeta {
        title,
        description,
        canonical: canonical_url(page_url),
        tags,
        structured_data: structured_data(data),
    }
}

/// schema.org FinancialProduct JSON-LD.
pub fn structured_data(data: &EtfData) -> Value {
    let fundamentals = data.fundamentals.clone().unwrap_or(Value::Null);
    json!({
        "@context": "https://schema.org",
        "@type": "FinancialProduct",
        "name": data.symbol,
        "identifier": data.isin,
        "category": "ETF",
        "provider": { "@type": "Organization", "name": SITE_NAME },
        "offers": {
            "@type": "Offer",
            "price": data.quote.as_ref().map(|q| q.latest_price).unwrap_or(0.0),
            "priceCurrency": fundamentals["currency"].as_str().unwrap_or("EUR"),
        },
        "additionalProperty": [
            { "@type": "PropertyValue", "name": "TER", "value": fundamentals["ter"].as_f64().unwrap_or(0.0) },
            { "@type": "PropertyValue", "name": "AUM", "value": fundamentals["aum"].as_f64().unwrap_or(0.0) },
        ],
    })
}

pub fn sitemap(etfs: &[Etf], origin: &str, now: DateTime<Utc>) -> Vec<SitemapEntry> {
    let origin = origin.trim_end_matches('/');
    let lastmod = now.to_rfc3339();
    etfs.iter()
        .map(|etf| SitemapEntry {
            url: format!("{}/etf/{}", origin, etf.isin),
            lastmod: lastmod.clone(),
            changefreq: "daily",
            priority: "0.8",
        })
        .collect()
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

pub fn sitemap_xml(entries: &[SitemapEntry]) -> String {
    let mut out = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for e in entries {
        out.push_str(&format!(
            "  <url>\n    <loc>{}</loc>\n    <lastmod>{}</lastmod>\n    <changefreq>{}</changefreq>\n    <priority>{}</priority>\n  </url>\n",
            xml_escape(&e.url),
            e.lastmod,
            e.changefreq,
            e.priority
        ));
    }
    out.push_str("</urlset>\n");
    out
}
