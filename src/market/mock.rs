//! Synthetic market data served when every provider for a part is unavailable.

use chrono::{Duration as ChronoDuration, Utc};
use rand::Rng;
use serde_json::{json, Value};

use super::service::Quote;

fn round_to(v: f64, decimals: i32) -> f64 {
    let f = 10f64.powi(decimals);
    (v * f).round() / f
}

pub fn quote<R: Rng + ?Sized>(symbol: &str, rng: &mut R) -> Quote {
    let base_price = 50.0 + rng.gen::<f64>() * 100.0;
    let change = (rng.gen::<f64>() - 0.5) * 5.0;
    Quote {
        symbol: symbol.to_string(),
        latest_price: round_to(base_price, 2),
        change: round_to(change, 2),
        change_percent: round_to(change / base_price, 4),
        volume: rng.gen_range(0..1_000_000),
        market_cap: Some(rng.gen_range(0..10_000_000_000u64) as f64),
        pe_ratio: Some(round_to(15.0 + rng.gen::<f64>() * 20.0, 2)),
        week52_high: Some(round_to(base_price * (1.1 + rng.gen::<f64>() * 0.3), 2)),
        week52_low: Some(round_to(base_price * (0.7 + rng.gen::<f64>() * 0.2), 2)),
        ytd_change: Some(round_to((rng.gen::<f64>() - 0.5) * 0.4, 4)),
        ..Quote::default()
    }
}

const SECTORS: [&str; 5] = ["Technology", "Healthcare", "Financial Services", "Consumer Cyclical", "Industrials"];
const COMPANIES: [&str; 5] = ["Apple Inc", "Microsoft Corp", "Amazon.com Inc", "Alphabet Inc", "Tesla Inc"];

pub fn holdings<R: Rng + ?Sized>(_isin: &str, rng: &mut R) -> Value {
    let rows: Vec<Value> = (0..10)
        .map(|i| {
            json!({
                "name": COMPANIES[i % COMPANIES.len()],
                "weight": round_to(rng.gen::<f64>() * 10.0, 2),
                "sector": SECTORS[i % SECTORS.len()],
                "country": "US",
                "shares": rng.gen_range(0..1_000_000u64),
                "marketValue": rng.gen_range(0..1_000_000_000u64),
            })
        })
        .collect();
    json!({
        "holdings": rows,
        "totalHoldings": 500 + rng.gen_range(0..1000u32),
        "topHoldingsWeight": round_to(45.0 + rng.gen::<f64>() * 20.0, 2),
    })
}

pub fn fundamentals<R: Rng + ?Sized>(isin: &str, rng: &mut R) -> Value {
    let tail: String = isin.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    json!({
        "name": format!("ETF {}", tail),
        "ter": round_to(0.1 + rng.gen::<f64>() * 0.5, 3),
        "aum": rng.gen_range(0..5_000_000_000u64),
        "inception": "2015-01-01",
        "domicile": "Ireland",
        "currency": "EUR",
        "distribution": if rng.gen_bool(0.5) { "Accumulating" } else { "Distributing" },
        "replicationMethod": if rng.gen_bool(0.5) { "Physical" } else { "Synthetic" },
        "benchmark": "MSCI World Index",
        "performance1Y": round_to((rng.gen::<f64>() - 0.5) * 0.3, 4),
        "performance3Y": round_to((rng.gen::<f64>() - 0.3) * 0.5, 4),
        "performance5Y": round_to((rng.gen::<f64>() - 0.2) * 0.8, 4),
        "dividend": round_to(rng.gen::<f64>() * 3.0, 2),
    })
}

pub fn risk<R: Rng + ?Sized>(_isin: &str, rng: &mut R) -> Value {
    json!({
        "volatility": round_to(0.1 + rng.gen::<f64>() * 0.3, 4),
        "sharpeRatio": round_to(rng.gen::<f64>() * 2.0, 3),
        "maxDrawdown": round_to(-(rng.gen::<f64>() * 0.3), 4),
        "beta": round_to(0.8 + rng.gen::<f64>() * 0.4, 3),
        "var95": round_to(-(rng.gen::<f64>() * 0.1), 4),
        "trackingError": round_to(rng.gen::<f64>() * 0.05, 4),
    })
}

pub fn history_days(range: &str) -> usize {
    match range {
        "1y" => 252,
        "6m" => 126,
        _ => 30,
    }
}

/// Daily closes ending yesterday.
pub fn historical<R: Rng + ?Sized>(_symbol: &str, range: &str, rng: &mut R) -> Value {
    let days = history_days(range);
    let base_price = 50.0 + rng.gen::<f64>() * 100.0;
    let today = Utc::now().date_naive();
    let points: Vec<Value> = (0..days)
        .map(|i| {
            let date = today - ChronoDuration::days((days - i) as i64);
            json!({
                "date": date.format("%Y-%m-%d").to_string(),
                "close": base_price * (0.9 + rng.gen::<f64>() * 0.2),
                "volume": rng.gen_range(0..1_000_000u64),
            })
        })
        .collect();
    Value::Array(points)
}

pub fn borsa_italiana<R: Rng + ?Sized>(_isin: &str, rng: &mut R) -> Value {
    json!({
        "officialName": "Mock ETF Name",
        "market": "Borsa Italiana",
        "segment": "ETF",
        "currency": "EUR",
        "lastPrice": 50.0 + rng.gen::<f64>() * 100.0,
        "lastUpdate": Utc::now().to_rfc3339(),
    })
}
