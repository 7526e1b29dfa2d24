//! Broker directory, click tracking and the analytics blob behind it.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::error::{EtfError, EtfResult};
use crate::logging::{agg_increment, log, obj, v_str, Domain, Level};
use crate::storage::{keys, LocalStore};

pub const COOKIE_DAYS: i64 = 30;
pub const COOKIE_SOURCE: &str = "guadagnareconetf";
/// The click log and the event log each keep only their newest entries.
pub const MAX_TRACKED_CLICKS: usize = 1000;
pub const MAX_TRACKED_EVENTS: usize = 1000;

fn keep_latest<T>(list: &mut Vec<T>, max: usize) {
    if list.len() > max {
        let excess = list.len() - max;
        list.drain(..excess);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AffiliateBroker {
    pub key: &'static str,
    pub name: &'static str,
    pub logo: &'static str,
    pub description: &'static str,
    pub features: Vec<&'static str>,
    pub min_deposit: u32,
    pub commission: &'static str,
    pub rating: f64,
    pub pros: Vec<&'static str>,
    pub cons: Vec<&'static str>,
    pub affiliate_url: &'static str,
    pub tracking_id: &'static str,
}

/// The five partner brokers in display order.
pub fn brokers() -> Vec<AffiliateBroker> {
    vec![
        AffiliateBroker {
            key: "etoro",
            name: "eToro",
            logo: "🌟",
            description: "Piattaforma di social trading leader mondiale",
            features: vec!["Copy Trading", "ETF senza commissioni", "App mobile avanzata"],
            min_deposit: 50,
            commission: "Spread variabile",
            rating: 4.5,
            pros: vec!["Social trading", "Interfaccia intuitiva", "Regolamentato CySEC"],
            cons: vec!["Spread più alti", "Prelievi a pagamento"],
            affiliate_url: "https://etoro.tw/3XXX",
            tracking_id: "etoro_guadagnareconetf",
        },
        AffiliateBroker {
            key: "scalable",
            name: "Scalable Capital",
            logo: "📈",
            description: "Broker tedesco con commissioni competitive",
            features: vec!["ETF gratuiti", "Piani di accumulo", "Robo-advisor"],
            min_deposit: 1,
            commission: "0.99€ per ordine",
            rating: 4.3,
            pros: vec!["Commissioni basse", "Ampia selezione ETF", "Piani di accumulo gratuiti"],
            cons: vec!["Solo in tedesco/inglese", "Interfaccia complessa"],
            affiliate_url: "https://de.scalable.capital/XXX",
            tracking_id: "scalable_guadagnareconetf",
        },
        AffiliateBroker {
            key: "traderepublic",
            name: "Trade Republic",
            logo: "📱",
            description: "Broker mobile-first con commissioni minime",
            features: vec!["1€ per ordine", "App mobile", "ETF gratuiti"],
            min_deposit: 1,
            commission: "1€ per ordine",
            rating: 4.2,
            pros: vec!["Commissioni bassissime", "App eccellente", "ETF gratuiti"],
            cons: vec!["Solo mobile", "Selezione limitata"],
            affiliate_url: "https://traderepublic.com/XXX",
            tracking_id: "tr_guadagnareconetf",
        },
        AffiliateBroker {
            key: "degiro",
            name: "DEGIRO",
            logo: "🏦",
            description: "Broker olandese con commissioni competitive",
            features: vec!["Commissioni basse", "Ampia gamma prodotti", "Piattaforma web"],
            min_deposit: 0,
            commission: "2€ + 0.03%",
            rating: 4.1,
            pros: vec!["Commissioni molto basse", "Molti mercati", "Trasparenza"],
            cons: vec!["Interfaccia datata", "Servizio clienti limitato"],
            affiliate_url: "https://www.degiro.it/XXX",
            tracking_id: "degiro_guadagnareconetf",
        },
        AffiliateBroker {
            key: "freedom24",
            name: "Freedom24",
            logo: "🚀",
            description: "Accesso ai mercati USA ed europei",
            features: vec!["Mercati USA", "IPO", "Commissioni competitive"],
            min_deposit: 1,
            commission: "Da 2€",
            rating: 4.0,
            pros: vec!["Accesso IPO", "Mercati internazionali", "Piattaforma moderna"],
            cons: vec!["Meno conosciuto", "Supporto limitato in italiano"],
            affiliate_url: "https://freedom24.com/XXX",
            tracking_id: "freedom24_guadagnareconetf",
        },
    ]
}

pub fn broker(key: &str) -> Option<AffiliateBroker> {
    brokers().into_iter().find(|b| b.key == key)
}

/// Full stars for the integer part, one hollow star for any fraction, hollow padding to five.
pub fn star_rating(rating: f64) -> String {
    let rating = rating.clamp(0.0, 5.0);
    let full = rating.floor() as usize;
    let half = usize::from(rating.fract() != 0.0);
    let empty = 5usize.saturating_sub(full + half);
    format!("{}{}{}", "★".repeat(full), "☆".repeat(half), "☆".repeat(empty))
}

pub fn categories(broker: &AffiliateBroker) -> Vec<&'static str> {
    let mut out = Vec::new();
    if broker.commission.contains('0') || broker.commission.contains("gratuiti") {
        out.push("low-cost");
    }
    if broker.features.contains(&"Copy Trading") || broker.description.contains("intuitiva") {
        out.push("beginner");
    }
    if broker.features.contains(&"Robo-advisor") || broker.features.contains(&"Ampia gamma prodotti") {
        out.push("advanced");
    }
    out
}

/// `"all"` matches every broker.
pub fn filter_by_category(category: &str) -> Vec<AffiliateBroker> {
    brokers()
        .into_iter()
        .filter(|b| category == "all" || categories(b).contains(&category))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub title: &'static str,
    pub badge: &'static str,
    pub description: &'static str,
    pub broker_key: &'static str,
}

pub fn recommendations() -> Vec<Recommendation> {
    vec![
        Recommendation {
            title: "Migliore per Principianti",
            badge: "🌟 Consigliato",
            description: "Perfetto per chi inizia con gli ETF. Interfaccia semplice e copy trading.",
            broker_key: "etoro",
        },
        Recommendation {
            title: "Commissioni più Basse",
            badge: "💰 Risparmio",
            description: "Ideale per investitori attivi che vogliono minimizzare i costi.",
            broker_key: "scalable",
        },
        Recommendation {
            title: "Migliore App Mobile",
            badge: "📱 Mobile",
            description: "Per chi preferisce investire dal telefono con un'app moderna.",
            broker_key: "traderepublic",
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Click {
    pub broker: String,
    pub source: String,
    pub timestamp: String,
    pub url: String,
    pub user_agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEvent {
    pub name: String,
    pub data: Value,
    pub timestamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Analytics {
    pub events: Vec<TrackedEvent>,
    pub broker_clicks: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickOutcome {
    pub redirect_url: String,
    pub broker_name: String,
    pub cookie: String,
}

/// `affiliate_<key>=<base64 json>; Expires=...; Path=/`
pub fn tracking_cookie(key: &str, now: DateTime<Utc>) -> String {
    let payload = json!({
        "broker": key,
        "timestamp": now.to_rfc3339(),
        "source": COOKIE_SOURCE,
    });
    let expires = now + Duration::days(COOKIE_DAYS);
    format!(
        "affiliate_{}={}; Expires={}; Path=/",
        key,
        URL_SAFE_NO_PAD.encode(payload.to_string()),
        expires.format("%a, %d %b %Y %H:%M:%S GMT")
    )
}

pub fn analytics(store: &LocalStore) -> anyhow::Result<Analytics> {
    store.get_or_default(keys::AFFILIATE_ANALYTICS)
}

pub fn clicks(store: &LocalStore) -> anyhow::Result<Vec<Click>> {
    store.get_or_default(keys::AFFILIATE_CLICKS)
}

/// Appends an analytics event; `affiliate_click` also bumps the counter of a
/// known partner broker.
pub fn track_event(store: &mut LocalStore, name: &str, data: Value, now: DateTime<Utc>) -> anyhow::Result<()> {
    let mut a = analytics(store)?;
    if name == "affiliate_click" {
        if let Some(partner) = data.get("broker").and_then(Value::as_str).and_then(broker) {
            *a.broker_clicks.entry(partner.key.to_string()).or_insert(0) += 1;
        }
    }
    a.events.push(TrackedEvent { name: name.to_string(), data, timestamp: now.to_rfc3339() });
    keep_latest(&mut a.events, MAX_TRACKED_EVENTS);
    store.set_json(keys::AFFILIATE_ANALYTICS, &a)?;
    agg_increment(name);
    Ok(())
}

pub fn track_click(
    store: &mut LocalStore,
    key: &str,
    source: &str,
    url: &str,
    user_agent: &str,
    now: DateTime<Utc>,
) -> EtfResult<ClickOutcome> {
    let broker = broker(key).ok_or_else(|| EtfError::NotFound(format!("Broker non trovato: {}", key)))?;
    let click = Click {
        broker: key.to_string(),
        source: source.to_string(),
        timestamp: now.to_rfc3339(),
        url: url.to_string(),
        user_agent: user_agent.to_string(),
    };
    let mut history = clicks(store)?;
    history.push(click.clone());
    keep_latest(&mut history, MAX_TRACKED_CLICKS);
    store.set_json(keys::AFFILIATE_CLICKS, &history)?;
    track_event(store, "affiliate_click", serde_json::to_value(&click)?, now)?;
    log(
        Level::Info,
        Domain::Affiliate,
        "click",
        obj(&[("broker", v_str(key)), ("source", v_str(source))]),
    );
    Ok(ClickOutcome {
        redirect_url: broker.affiliate_url.to_string(),
        broker_name: broker.name.to_string(),
        cookie: tracking_cookie(key, now),
    })
}

/// Top `n` brokers by recorded clicks; ties keep key order.
pub fn popular_brokers(store: &LocalStore, n: usize) -> anyhow::Result<Vec<(String, u64)>> {
    let mut ranked: Vec<(String, u64)> = analytics(store)?.broker_clicks.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked.truncate(n);
    Ok(ranked)
}

pub fn preferences(store: &LocalStore) -> anyhow::Result<Map<String, Value>> {
    store.get_or_default(keys::USER_PREFERENCES)
}

/// Shallow merge over the stored preferences; returns the merged map.
pub fn save_preferences(store: &mut LocalStore, update: Map<String, Value>) -> anyhow::Result<Map<String, Value>> {
    let mut prefs = preferences(store)?;
    prefs.extend(update);
    store.set_json(keys::USER_PREFERENCES, &prefs)?;
    Ok(prefs)
}
