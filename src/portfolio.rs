//! Portfolio builder: allocations, analytics, templates and saved portfolios.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{Catalog, Etf};
use crate::error::{EtfError, EtfResult};
use crate::simulator::check_iterations;
use crate::storage::{keys, LocalStore};

pub const MAX_PORTFOLIO_ETFS: usize = 10;
const FULL: f64 = 100.0;
const EPS: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub etf: Etf,
    /// Percent of the portfolio.
    pub allocation: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    holdings: Vec<Holding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    #[serde(rename = "weightedTER")]
    pub weighted_ter: f64,
    #[serde(rename = "expectedReturn1Y")]
    pub expected_return_1y: f64,
    pub estimated_volatility: f64,
    pub diversification_score: u32,
    pub sector_breakdown: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskLevel {
    pub level: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrontierPoint {
    pub risk: f64,
    #[serde(rename = "return")]
    pub expected_return: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPercentiles {
    pub p5: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p95: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub summary: Summary,
    pub risk_level: RiskLevel,
    pub recommendations: Vec<Recommendation>,
    pub efficient_frontier: Vec<FrontierPoint>,
    pub monte_carlo_results: ReturnPercentiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validation {
    Complete,
    Excessive,
    Incomplete,
}

impl Validation {
    pub fn message(&self, total: f64) -> String {
        match self {
            Validation::Complete => "✓ Portafoglio completo (100%)".to_string(),
            Validation::Excessive => format!("⚠ Allocazione eccessiva ({:.1}%)", total),
            Validation::Incomplete => format!("⚠ Allocazione incompleta ({:.1}%)", total),
        }
    }
}

impl Portfolio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holdings(&self) -> &[Holding] {
        &self.holdings
    }

    pub fn len(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn total_allocation(&self) -> f64 {
        self.holdings.iter().map(|h| h.allocation).sum()
    }

    /// Allocation offered to a newcomer. When the portfolio is already full
    /// every holding is reset to an equal share that includes the newcomer.
    fn suggested_allocation(&mut self) -> f64 {
        if self.holdings.is_empty() {
            return FULL;
        }
        let remaining = FULL - self.total_allocation();
        if remaining <= 0.0 {
            let equal = FULL / (self.holdings.len() + 1) as f64;
            for h in &mut self.holdings {
                h.allocation = equal;
            }
            return equal;
        }
        remaining.min(20.0)
    }

    fn ensure_room(&self) -> EtfResult<()> {
        if self.holdings.len() >= MAX_PORTFOLIO_ETFS {
            return Err(EtfError::Limit(format!(
                "Puoi aggiungere massimo {} ETF al portafoglio",
                MAX_PORTFOLIO_ETFS
            )));
        }
        Ok(())
    }

    pub fn add(&mut self, catalog: &Catalog, key: &str) -> EtfResult<f64> {
        self.ensure_room()?;
        let etf = catalog
            .resolve(key)
            .ok_or_else(|| EtfError::NotFound("ETF non trovato".to_string()))?;
        if self.holdings.iter().any(|h| h.etf.id == etf.id) {
            return Err(EtfError::Duplicate("ETF già presente nel portafoglio".to_string()));
        }
        let allocation = self.suggested_allocation();
        self.holdings.push(Holding { etf: etf.clone(), allocation });
        Ok(allocation)
    }

    /// Inserts with an explicit allocation, used by templates and saved portfolios.
    pub fn push_with_allocation(&mut self, etf: Etf, allocation: f64) -> EtfResult<()> {
        self.ensure_room()?;
        if self.holdings.iter().any(|h| h.etf.id == etf.id) {
            return Err(EtfError::Duplicate("ETF già presente nel portafoglio".to_string()));
        }
        self.holdings.push(Holding { etf, allocation: allocation.max(0.0) });
        Ok(())
    }

    /// Removes a holding and spreads its weight evenly over the rest.
    pub fn remove(&mut self, id: &str) -> bool {
        let Some(index) = self.holdings.iter().position(|h| h.etf.id == id) else {
            return false;
        };
        let removed = self.holdings.remove(index);
        if !self.holdings.is_empty() {
            let share = removed.allocation / self.holdings.len() as f64;
            for h in &mut self.holdings {
                h.allocation += share;
            }
        }
        true
    }

    /// Clamps the new weight so the total never exceeds 100. Returns the applied value.
    pub fn update_allocation(&mut self, id: &str, value: f64) -> EtfResult<f64> {
        let total = self.total_allocation();
        let holding = self
            .holdings
            .iter_mut()
            .find(|h| h.etf.id == id)
            .ok_or_else(|| EtfError::NotFound("ETF non trovato".to_string()))?;
        let max = FULL - (total - holding.allocation);
        let applied = value.min(max).max(0.0);
        holding.allocation = applied;
        Ok(applied)
    }

    pub fn rebalance(&mut self) {
        if self.holdings.is_empty() {
            return;
        }
        let equal = FULL / self.holdings.len() as f64;
        for h in &mut self.holdings {
            h.allocation = equal;
        }
    }

    pub fn clear(&mut self) {
        self.holdings.clear();
    }

    pub fn validate(&self) -> Validation {
        let total = self.total_allocation();
        if (total - FULL).abs() < EPS {
            Validation::Complete
        } else if total > FULL {
            Validation::Excessive
        } else {
            Validation::Incomplete
        }
    }

    pub fn summary(&self) -> Summary {
        let weighted = |f: fn(&Etf) -> f64| {
            self.holdings.iter().map(|h| f(&h.etf) * h.allocation / FULL).sum::<f64>()
        };
        let sectors: BTreeSet<&str> = self.holdings.iter().map(|h| h.etf.sector.as_str()).collect();
        let raw_score = (self.holdings.len() as f64 * 2.0 + sectors.len() as f64 * 1.5).round();
        let mut breakdown = BTreeMap::new();
        for h in &self.holdings {
            *breakdown.entry(h.etf.sector.clone()).or_insert(0.0) += h.allocation;
        }
        Summary {
            weighted_ter: weighted(|e| e.ter),
            expected_return_1y: weighted(|e| e.performance_1y),
            estimated_volatility: weighted(|e| e.volatility),
            diversification_score: raw_score.min(10.0) as u32,
            sector_breakdown: breakdown,
        }
    }

    pub fn recommendations(&self) -> Vec<Recommendation> {
        let summary = self.summary();
        let mut out = Vec::new();
        let rec = |kind: &str, title: &str, description: &str| Recommendation {
            kind: kind.to_string(),
            title: title.to_string(),
            description: description.to_string(),
        };
        if summary.weighted_ter > 0.5 {
            out.push(rec(
                "warning",
                "Costi Elevati",
                "Il TER medio del portafoglio è superiore allo 0.5%. Considera ETF con costi più bassi.",
            ));
        }
        if summary.diversification_score < 6 {
            out.push(rec(
                "info",
                "Diversificazione",
                "Considera di aggiungere ETF di settori diversi per migliorare la diversificazione.",
            ));
        }
        let max_sector = summary.sector_breakdown.values().cloned().fold(f64::MIN, f64::max);
        if max_sector > 50.0 {
            out.push(rec(
                "warning",
                "Concentrazione Settoriale",
                "Un settore rappresenta più del 50% del portafoglio. Considera di diversificare.",
            ));
        }
        if summary.expected_return_1y < 5.0 {
            out.push(rec(
                "info",
                "Rendimento Atteso",
                "Il rendimento atteso è relativamente basso. Valuta ETF con maggiore potenziale di crescita.",
            ));
        }
        out
    }

    /// One-year return spread: expected ± volatility, uniformly drawn.
    pub fn monte_carlo<R: Rng>(&self, rng: &mut R, iterations: usize) -> EtfResult<ReturnPercentiles> {
        check_iterations(iterations)?;
        let summary = self.summary();
        let n = iterations;
        let mut results: Vec<f64> = (0..n)
            .map(|_| {
                summary.expected_return_1y + (rng.gen::<f64>() - 0.5) * summary.estimated_volatility * 2.0
            })
            .collect();
        results.sort_by(|a, b| a.total_cmp(b));
        let at = |p: f64| results[((n as f64 * p).floor() as usize).min(n - 1)];
        Ok(ReturnPercentiles { p5: at(0.05), p25: at(0.25), p50: at(0.5), p75: at(0.75), p95: at(0.95) })
    }

    pub fn analysis<R: Rng>(&self, rng: &mut R, iterations: usize) -> EtfResult<Analysis> {
        if self.holdings.is_empty() {
            return Err(EtfError::validation("Il portafoglio è vuoto"));
        }
        let monte_carlo_results = self.monte_carlo(rng, iterations)?;
        let summary = self.summary();
        Ok(Analysis {
            risk_level: risk_level(summary.estimated_volatility),
            recommendations: self.recommendations(),
            efficient_frontier: efficient_frontier(rng),
            monte_carlo_results,
            summary,
        })
    }
}

pub fn risk_level(volatility: f64) -> RiskLevel {
    let (level, description) = if volatility < 10.0 {
        ("Basso", "Portafoglio conservativo con bassa volatilità")
    } else if volatility < 20.0 {
        ("Moderato", "Portafoglio bilanciato con volatilità media")
    } else {
        ("Alto", "Portafoglio aggressivo con alta volatilità")
    };
    RiskLevel { level: level.to_string(), description: description.to_string() }
}

/// Indicative risk/return curve for the analysis chart.
pub fn efficient_frontier<R: Rng>(rng: &mut R) -> Vec<FrontierPoint> {
    (5..=25)
        .step_by(2)
        .map(|risk| FrontierPoint {
            risk: risk as f64,
            expected_return: 3.0 + (risk as f64 - 5.0) * 0.4 + rng.gen::<f64>() * 2.0,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub description: String,
    pub allocation: Vec<(String, f64)>,
}

pub fn templates() -> Vec<Template> {
    let t = |name: &str, description: &str, allocation: &[(&str, f64)]| Template {
        name: name.to_string(),
        description: description.to_string(),
        allocation: allocation.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
    };
    vec![
        t(
            "Conservativo",
            "Portafoglio a basso rischio con focus su obbligazioni",
            &[("VGEA", 40.0), ("AGGH", 35.0), ("VWCE", 25.0)],
        ),
        t(
            "Bilanciato",
            "Mix equilibrato tra azioni e obbligazioni",
            &[("VWCE", 60.0), ("AGGH", 30.0), ("VGEA", 10.0)],
        ),
        t(
            "Aggressivo",
            "Portafoglio azionario ad alto potenziale",
            &[("VWCE", 70.0), ("VGEA", 20.0), ("VFEM", 10.0)],
        ),
    ]
}

/// Builds a portfolio from a template index; tickers missing from the catalog are skipped.
pub fn load_template(catalog: &Catalog, index: usize) -> EtfResult<Portfolio> {
    let template = templates()
        .into_iter()
        .nth(index)
        .ok_or_else(|| EtfError::NotFound(format!("Template {} non trovato", index)))?;
    let mut portfolio = Portfolio::new();
    for (ticker, allocation) in &template.allocation {
        if let Some(etf) = catalog.by_ticker(ticker) {
            portfolio.push_with_allocation(etf.clone(), *allocation)?;
        }
    }
    Ok(portfolio)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedHolding {
    pub etf_id: String,
    pub allocation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedPortfolio {
    pub name: String,
    pub etfs: Vec<SavedHolding>,
    pub created_at: DateTime<Utc>,
    pub summary: Summary,
}

pub fn save(store: &mut LocalStore, portfolio: &Portfolio, name: &str, now: DateTime<Utc>) -> EtfResult<SavedPortfolio> {
    if portfolio.is_empty() || portfolio.validate() != Validation::Complete {
        return Err(EtfError::validation("Completa il portafoglio prima di salvarlo"));
    }
    let name = name.trim();
    if name.is_empty() {
        return Err(EtfError::validation("Il nome del portafoglio è obbligatorio"));
    }
    let saved = SavedPortfolio {
        name: name.to_string(),
        etfs: portfolio
            .holdings
            .iter()
            .map(|h| SavedHolding { etf_id: h.etf.id.clone(), allocation: h.allocation })
            .collect(),
        created_at: now,
        summary: portfolio.summary(),
    };
    let mut all = list_saved(store)?;
    all.push(saved.clone());
    store.set_json(keys::SAVED_PORTFOLIOS, &all)?;
    Ok(saved)
}

pub fn list_saved(store: &LocalStore) -> Result<Vec<SavedPortfolio>> {
    store.get_or_default(keys::SAVED_PORTFOLIOS)
}

pub fn load_saved(store: &LocalStore, catalog: &Catalog, index: usize) -> EtfResult<Portfolio> {
    let saved = list_saved(store)?
        .into_iter()
        .nth(index)
        .ok_or_else(|| EtfError::NotFound("Portafoglio non trovato".to_string()))?;
    let mut portfolio = Portfolio::new();
    for item in saved.etfs {
        if let Some(etf) = catalog.by_id(&item.etf_id) {
            portfolio.push_with_allocation(etf.clone(), item.allocation)?;
        }
    }
    Ok(portfolio)
}

pub fn delete_saved(store: &mut LocalStore, index: usize) -> EtfResult<SavedPortfolio> {
    let mut all = list_saved(store)?;
    if index >= all.len() {
        return Err(EtfError::NotFound("Portafoglio non trovato".to_string()));
    }
    let removed = all.remove(index);
    store.set_json(keys::SAVED_PORTFOLIOS, &all)?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn catalog() -> Catalog {
        Catalog::bundled().unwrap()
    }

    #[test]
    fn suggested_allocations() {
        let c = catalog();
        let mut p = Portfolio::new();
        assert_eq!(p.add(&c, "vwce").unwrap(), 100.0);
        // Already full: everyone resets to an equal share.
        assert_eq!(p.add(&c, "aggh").unwrap(), 50.0);
        assert_eq!(p.total_allocation(), 100.0);
        p.update_allocation("vwce", 30.0).unwrap();
        assert_eq!(p.add(&c, "vgea").unwrap(), 20.0);
        assert!(matches!(p.add(&c, "vgea"), Err(EtfError::Duplicate(_))));
    }

    #[test]
    fn limit_of_ten() {
        let c = catalog();
        let mut p = Portfolio::new();
        for etf in c.all().iter().take(10) {
            p.add(&c, &etf.id).unwrap();
        }
        assert!(matches!(p.add(&c, &c.all()[10].id), Err(EtfError::Limit(_))));
    }

    #[test]
    fn explicit_allocations_respect_the_limit() {
        let c = catalog();
        let mut p = Portfolio::new();
        for etf in c.all().iter().take(MAX_PORTFOLIO_ETFS) {
            p.push_with_allocation(etf.clone(), 10.0).unwrap();
        }
        let extra = c.all()[MAX_PORTFOLIO_ETFS].clone();
        assert!(matches!(p.push_with_allocation(extra, 0.0), Err(EtfError::Limit(_))));
        assert_eq!(p.len(), MAX_PORTFOLIO_ETFS);
    }

    #[test]
    fn removal_redistributes() {
        let mut p = load_template(&catalog(), 0).unwrap();
        assert!(p.remove("vgea"));
        assert_eq!(p.len(), 2);
        assert!((p.total_allocation() - 100.0).abs() < 1e-9);
        assert!((p.holdings()[0].allocation - 55.0).abs() < 1e-9);
        assert!(!p.remove("vgea"));
    }

    #[test]
    fn update_is_clamped() {
        let mut p = load_template(&catalog(), 1).unwrap();
        p.update_allocation("vgea", 5.0).unwrap();
        assert_eq!(p.update_allocation("vgea", 80.0).unwrap(), 10.0);
        assert_eq!(p.update_allocation("vgea", -3.0).unwrap(), 0.0);
        assert_eq!(p.validate(), Validation::Incomplete);
        assert!(p.update_allocation("nope", 1.0).is_err());
    }

    #[test]
    fn rebalance_and_validation_messages() {
        let mut p = load_template(&catalog(), 2).unwrap();
        p.rebalance();
        assert!(p.holdings().iter().all(|h| (h.allocation - 100.0 / 3.0).abs() < 1e-9));
        assert_eq!(p.validate(), Validation::Complete);
        assert_eq!(Validation::Excessive.message(120.0), "⚠ Allocazione eccessiva (120.0%)");
    }

    #[test]
    fn summary_of_balanced_template() {
        let p = load_template(&catalog(), 1).unwrap();
        let s = p.summary();
        let expected_ter = 0.22 * 0.6 + 0.10 * 0.3 + 0.07 * 0.1;
        assert!((s.weighted_ter - expected_ter).abs() < 1e-9);
        // 3 holdings, 2 sectors: 6 + 3 = 9
        assert_eq!(s.diversification_score, 9);
        assert_eq!(s.sector_breakdown["azionario"], 60.0);
        assert_eq!(s.sector_breakdown["obbligazionario"], 40.0);
        assert_eq!(risk_level(s.estimated_volatility).level, "Moderato");
    }

    #[test]
    fn recommendations_flag_concentration_and_low_return() {
        let c = catalog();
        let mut p = Portfolio::new();
        p.add(&c, "ieag").unwrap();
        let titles: Vec<String> = p.recommendations().into_iter().map(|r| r.title).collect();
        assert_eq!(titles, vec!["Diversificazione", "Concentrazione Settoriale", "Rendimento Atteso"]);
    }

    #[test]
    fn analysis_is_reproducible_with_seed() {
        let p = load_template(&catalog(), 2).unwrap();
        let a = p.analysis(&mut StdRng::seed_from_u64(9), 1000).unwrap();
        let b = p.analysis(&mut StdRng::seed_from_u64(9), 1000).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.efficient_frontier.len(), 11);
        let mc = a.monte_carlo_results;
        assert!(mc.p5 <= mc.p25 && mc.p25 <= mc.p50 && mc.p50 <= mc.p75 && mc.p75 <= mc.p95);
        assert!(Portfolio::new().analysis(&mut StdRng::seed_from_u64(1), 10).is_err());
    }

    #[test]
    fn analysis_rejects_unbounded_iterations() {
        let p = load_template(&catalog(), 1).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(p.analysis(&mut rng, 1usize << 40), Err(EtfError::Validation(_))));
        assert!(matches!(p.analysis(&mut rng, 0), Err(EtfError::Validation(_))));
    }

    #[test]
    fn saved_portfolios_lifecycle() {
        let c = catalog();
        let mut store = LocalStore::in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

        let mut incomplete = load_template(&c, 0).unwrap();
        incomplete.update_allocation("vwce", 10.0).unwrap();
        assert!(save(&mut store, &incomplete, "x", now).is_err());

        let p = load_template(&c, 0).unwrap();
        save(&mut store, &p, "Pensione", now).unwrap();
        assert_eq!(list_saved(&store).unwrap()[0].etfs.len(), 3);

        let loaded = load_saved(&store, &c, 0).unwrap();
        assert_eq!(loaded, p);
        assert_eq!(delete_saved(&mut store, 0).unwrap().name, "Pensione");
        assert!(delete_saved(&mut store, 0).is_err());
    }
}
