//! ETF catalog: the bundled fund list plus search, filtering and sorting.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::logging::{log, obj, v_str, Domain, Level};

const BUNDLED: &str = include_str!("../data/etf_catalog.json");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Etf {
    pub id: String,
    pub isin: String,
    pub name: String,
    pub ticker: String,
    pub price: f64,
    pub currency: String,
    pub change: f64,
    pub change_percent: f64,
    /// Total expense ratio, in percent.
    pub ter: f64,
    /// Assets under management, in euro.
    pub aum: f64,
    #[serde(rename = "yield")]
    pub dividend_yield: f64,
    pub sector: String,
    pub region: String,
    pub distribution: String,
    pub domicile: String,
    pub replication_method: String,
    pub fund_size: String,
    pub risk_level: String,
    pub inception_date: String,
    pub benchmark: String,
    pub holdings: u32,
    #[serde(default)]
    pub top_holdings: Vec<String>,
    #[serde(default)]
    pub sector_allocation: BTreeMap<String, f64>,
    #[serde(default)]
    pub geographic_allocation: BTreeMap<String, f64>,
    pub performance_1y: f64,
    pub performance_3y: f64,
    pub performance_5y: f64,
    pub volatility: f64,
}

/// Search form state. Empty strings behave like "any".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchFilters {
    pub search: String,
    pub sector: String,
    pub region: String,
    pub ter: f64,
    pub distribution: String,
    pub min_aum: f64,
    pub max_aum: f64,
    pub risk_level: String,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            search: String::new(),
            sector: String::new(),
            region: String::new(),
            ter: 2.0,
            distribution: String::new(),
            min_aum: 0.0,
            max_aum: f64::INFINITY,
            risk_level: String::new(),
        }
    }
}

impl SearchFilters {
    pub fn matches(&self, etf: &Etf) -> bool {
        if !self.search.is_empty() {
            let needle = self.search.to_lowercase();
            let hit = etf.name.to_lowercase().contains(&needle)
                || etf.isin.to_lowercase().contains(&needle)
                || etf.ticker.to_lowercase().contains(&needle);
            if !hit {
                return false;
            }
        }
        let exact = |want: &str, have: &str| want.is_empty() || want == have;
        exact(&self.sector, &etf.sector)
            && exact(&self.region, &etf.region)
            && exact(&self.distribution, &etf.distribution)
            && exact(&self.risk_level, &etf.risk_level)
            && etf.ter <= self.ter
            && etf.aum >= self.min_aum
            && etf.aum <= self.max_aum
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Name,
    Ter,
    #[default]
    Aum,
    Yield,
    Price,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "name" => Ok(SortKey::Name),
            "ter" => Ok(SortKey::Ter),
            "aum" => Ok(SortKey::Aum),
            "yield" => Ok(SortKey::Yield),
            "price" => Ok(SortKey::Price),
            other => Err(format!("ordinamento sconosciuto: {}", other)),
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("direzione sconosciuta: {}", other)),
        }
    }
}

pub fn sort_etfs(etfs: &mut [Etf], key: SortKey, order: SortOrder) {
    etfs.sort_by(|a, b| {
        let ord = match key {
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::Ter => a.ter.total_cmp(&b.ter),
            SortKey::Aum => a.aum.total_cmp(&b.aum),
            SortKey::Yield => a.dividend_yield.total_cmp(&b.dividend_yield),
            SortKey::Price => a.price.total_cmp(&b.price),
        };
        match order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });
}

#[derive(Debug, Clone)]
pub struct Catalog {
    etfs: Vec<Etf>,
}

impl Catalog {
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED).context("bundled etf catalog")
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let etfs: Vec<Etf> = serde_json::from_str(raw)?;
        Ok(Self { etfs })
    }

    pub fn new(etfs: Vec<Etf>) -> Self {
        Self { etfs }
    }

    pub fn all(&self) -> &[Etf] {
        &self.etfs
    }

    pub fn len(&self) -> usize {
        self.etfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.etfs.is_empty()
    }

    pub fn filter(&self, filters: &SearchFilters) -> Vec<Etf> {
        self.etfs.iter().filter(|e| filters.matches(e)).cloned().collect()
    }

    pub fn search(&self, filters: &SearchFilters, key: SortKey, order: SortOrder) -> Vec<Etf> {
        let mut out = self.filter(filters);
        sort_etfs(&mut out, key, order);
        log(
            Level::Debug,
            Domain::Catalog,
            "search",
            obj(&[
                ("query", v_str(&filters.search)),
                ("results", serde_json::json!(out.len())),
            ]),
        );
        out
    }

    pub fn by_isin(&self, isin: &str) -> Option<&Etf> {
        self.etfs.iter().find(|e| e.isin == isin)
    }

    pub fn by_id(&self, id: &str) -> Option<&Etf> {
        self.etfs.iter().find(|e| e.id == id)
    }

    pub fn by_ticker(&self, ticker: &str) -> Option<&Etf> {
        self.etfs.iter().find(|e| e.ticker.eq_ignore_ascii_case(ticker))
    }

    /// Lookup by id, ISIN or ticker, whichever matches first.
    pub fn resolve(&self, key: &str) -> Option<&Etf> {
        self.by_id(key)
            .or_else(|| self.by_isin(key))
            .or_else(|| self.by_ticker(key))
    }

    pub fn by_region(&self, region: &str) -> Vec<Etf> {
        self.etfs.iter().filter(|e| e.region == region).cloned().collect()
    }

    pub fn by_sector(&self, sector: &str) -> Vec<Etf> {
        self.etfs.iter().filter(|e| e.sector == sector).cloned().collect()
    }

    pub fn top_by_aum(&self, limit: usize) -> Vec<Etf> {
        let mut out = self.etfs.clone();
        sort_etfs(&mut out, SortKey::Aum, SortOrder::Desc);
        out.truncate(limit);
        out
    }

    pub fn low_ter(&self, max_ter: f64) -> Vec<Etf> {
        self.etfs.iter().filter(|e| e.ter <= max_ter).cloned().collect()
    }

    /// Autocomplete used by the comparator and portfolio builder.
    pub fn suggest(&self, query: &str) -> Vec<Etf> {
        if query.chars().count() < 2 {
            return Vec::new();
        }
        let needle = query.to_lowercase();
        self.etfs
            .iter()
            .filter(|e| {
                e.name.to_lowercase().contains(&needle)
                    || e.ticker.to_lowercase().contains(&needle)
                    || e.isin.to_lowercase().contains(&needle)
            })
            .take(10)
            .cloned()
            .collect()
    }
}

pub fn format_aum(aum: f64) -> String {
    if aum >= 1e9 {
        format!("€{:.1}B", aum / 1e9)
    } else if aum >= 1e6 {
        format!("€{:.0}M", aum / 1e6)
    } else {
        format!("€{:.0}K", aum / 1e3)
    }
}

pub fn results_label(count: usize) -> String {
    if count == 1 {
        "1 ETF trovato".to_string()
    } else {
        format!("{} ETF trovati", count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::bundled().unwrap()
    }

    #[test]
    fn bundled_catalog_loads() {
        let c = catalog();
        assert_eq!(c.len(), 11);
        assert!(c.by_isin("IE00BK5BQT80").is_some());
        assert_eq!(c.by_ticker("vwce").unwrap().id, "vwce");
    }

    #[test]
    fn default_search_is_aum_descending() {
        let out = catalog().search(&SearchFilters::default(), SortKey::default(), SortOrder::default());
        assert_eq!(out.len(), 11);
        assert_eq!(out[0].ticker, "CSPX");
        assert!(out.windows(2).all(|w| w[0].aum >= w[1].aum));
    }

    #[test]
    fn text_search_matches_name_isin_and_ticker() {
        let c = catalog();
        let by_name = c.filter(&SearchFilters { search: "vanguard".into(), ..Default::default() });
        assert!(by_name.iter().all(|e| e.name.contains("Vanguard")));
        assert!(!by_name.is_empty());
        let by_isin = c.filter(&SearchFilters { search: "ie00b4l5y983".into(), ..Default::default() });
        assert_eq!(by_isin.len(), 1);
        let by_ticker = c.filter(&SearchFilters { search: "EIMI".into(), ..Default::default() });
        assert_eq!(by_ticker[0].id, "eimi");
    }

    #[test]
    fn combined_filters() {
        let filters = SearchFilters {
            sector: "azionario".into(),
            region: "europa".into(),
            ter: 0.1,
            ..Default::default()
        };
        let mut ids: Vec<String> = catalog().filter(&filters).into_iter().map(|e| e.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["meud", "veur"]);
    }

    #[test]
    fn aum_bounds_are_inclusive() {
        let filters = SearchFilters { min_aum: 3.2e9, max_aum: 4.8e9, ..Default::default() };
        let ids: Vec<String> = catalog().filter(&filters).into_iter().map(|e| e.id).collect();
        assert!(ids.contains(&"meud".to_string()));
        assert!(ids.contains(&"xeur".to_string()));
        assert!(!ids.contains(&"vfem".to_string()));
    }

    #[test]
    fn name_sort_ignores_case() {
        let out = catalog().search(&SearchFilters::default(), SortKey::Name, SortOrder::Asc);
        let names: Vec<String> = out.iter().map(|e| e.name.to_lowercase()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn helpers() {
        let c = catalog();
        assert_eq!(c.top_by_aum(3).len(), 3);
        assert!(c.low_ter(0.2).iter().all(|e| e.ter <= 0.2));
        assert_eq!(c.by_region("usa").len(), 1);
        assert_eq!(c.by_sector("obbligazionario").len(), 3);
        assert!(c.suggest("v").is_empty());
        assert!(c.suggest("ishares").len() >= 2);
    }

    #[test]
    fn aum_formatting() {
        assert_eq!(format_aum(15_200_000_000.0), "€15.2B");
        assert_eq!(format_aum(450_000_000.0), "€450M");
        assert_eq!(format_aum(12_000.0), "€12K");
        assert_eq!(results_label(1), "1 ETF trovato");
        assert_eq!(results_label(0), "0 ETF trovati");
    }
}
