//! Side-by-side comparison of up to five ETFs.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Etf};
use crate::error::{EtfError, EtfResult};
use crate::format::{csv_field, format_currency};

pub const MAX_ETFS: usize = 5;
const SERIES_MONTHS: usize = 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comparison {
    etfs: Vec<Etf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub best_performance: Etf,
    pub lowest_cost: Etf,
    pub largest_aum: Etf,
    pub lowest_volatility: Etf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    pub label: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesLine {
    pub ticker: String,
    /// Cumulative return in percent, one entry per month.
    pub values: Vec<f64>,
}

impl Comparison {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a comparison from ids, ISINs or tickers in the given order.
    pub fn from_keys(catalog: &Catalog, keys: &[String]) -> EtfResult<Self> {
        let mut cmp = Self::new();
        for key in keys {
            cmp.add(catalog, key)?;
        }
        Ok(cmp)
    }

    pub fn etfs(&self) -> &[Etf] {
        &self.etfs
    }

    pub fn len(&self) -> usize {
        self.etfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.etfs.is_empty()
    }

    pub fn add(&mut self, catalog: &Catalog, key: &str) -> EtfResult<&Etf> {
        if self.etfs.len() >= MAX_ETFS {
            return Err(EtfError::Limit(format!("Puoi confrontare massimo {} ETF", MAX_ETFS)));
        }
        let etf = catalog
            .resolve(key)
            .ok_or_else(|| EtfError::NotFound("ETF non trovato".to_string()))?;
        if self.etfs.iter().any(|e| e.id == etf.id) {
            return Err(EtfError::Duplicate("ETF già aggiunto al confronto".to_string()));
        }
        self.etfs.push(etf.clone());
        Ok(&self.etfs[self.etfs.len() - 1])
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.etfs.len();
        self.etfs.retain(|e| e.id != id);
        self.etfs.len() != before
    }

    pub fn clear(&mut self) {
        self.etfs.clear();
    }

    /// Moves `dragged` to the position currently held by `target`.
    pub fn reorder(&mut self, dragged: &str, target: &str) -> bool {
        let from = self.etfs.iter().position(|e| e.id == dragged);
        let to = self.etfs.iter().position(|e| e.id == target);
        match (from, to) {
            (Some(from), Some(to)) => {
                let etf = self.etfs.remove(from);
                self.etfs.insert(to, etf);
                true
            }
            _ => false,
        }
    }

    fn ensure_comparable(&self) -> EtfResult<()> {
        if self.etfs.len() < 2 {
            return Err(EtfError::validation("Seleziona almeno 2 ETF per il confronto"));
        }
        Ok(())
    }

    /// Picks the leader per metric; earlier entries win ties.
    pub fn analyze(&self) -> EtfResult<Analysis> {
        self.ensure_comparable()?;
        let pick = |better: fn(&Etf, &Etf) -> bool| {
            let mut best = &self.etfs[0];
            for etf in &self.etfs[1..] {
                if better(etf, best) {
                    best = etf;
                }
            }
            best.clone()
        };
        Ok(Analysis {
            best_performance: pick(|a, b| a.performance_1y > b.performance_1y),
            lowest_cost: pick(|a, b| a.ter < b.ter),
            largest_aum: pick(|a, b| a.aum > b.aum),
            lowest_volatility: pick(|a, b| a.volatility < b.volatility),
        })
    }

    pub fn recommendation(&self) -> EtfResult<String> {
        let a = self.analyze()?;
        let mut out = Vec::new();
        if a.best_performance.performance_1y > 10.0 {
            out.push(format!(
                "{} ha mostrato la migliore performance nell'ultimo anno.",
                a.best_performance.ticker
            ));
        }
        if a.lowest_cost.ter < 0.2 {
            out.push(format!(
                "{} offre i costi più competitivi con un TER del {}%.",
                a.lowest_cost.ticker, a.lowest_cost.ter
            ));
        }
        if a.largest_aum.aum > 1e9 {
            out.push(format!(
                "{} ha il patrimonio più elevato, indicando maggiore liquidità.",
                a.largest_aum.ticker
            ));
        }
        if a.lowest_volatility.volatility < 15.0 {
            out.push(format!(
                "{} presenta la volatilità più bassa, ideale per investitori conservativi.",
                a.lowest_volatility.ticker
            ));
        }
        if out.is_empty() {
            return Ok("Tutti gli ETF selezionati presentano caratteristiche interessanti. \
                       Considera i tuoi obiettivi di investimento per la scelta finale."
                .to_string());
        }
        Ok(out.join(" "))
    }

    /// Display table, one row per metric.
    pub fn table(&self) -> Vec<MetricRow> {
        let rows: [(&str, fn(&Etf) -> String); 12] = [
            ("Nome", |e| e.name.clone()),
            ("Ticker", |e| e.ticker.clone()),
            ("ISIN", |e| e.isin.clone()),
            ("TER (%)", |e| pct(e.ter)),
            ("Patrimonio", |e| format_currency(e.aum)),
            ("1 Anno (%)", |e| signed_pct(e.performance_1y)),
            ("3 Anni (%)", |e| signed_pct(e.performance_3y)),
            ("5 Anni (%)", |e| signed_pct(e.performance_5y)),
            ("Volatilità (%)", |e| pct(e.volatility)),
            ("Dividend Yield (%)", |e| pct(e.dividend_yield)),
            ("Replica", |e| e.replication_method.clone()),
            ("Distribuzione", |e| e.distribution.clone()),
        ];
        rows.iter()
            .map(|(label, f)| MetricRow {
                label: label.to_string(),
                values: self.etfs.iter().map(f).collect(),
            })
            .collect()
    }

    pub fn to_csv(&self) -> EtfResult<String> {
        if self.etfs.len() < 2 {
            return Err(EtfError::validation(
                "Seleziona almeno 2 ETF per esportare il confronto",
            ));
        }
        let row = |label: &str, f: fn(&Etf) -> String| {
            let mut cells = vec![csv_field(label)];
            cells.extend(self.etfs.iter().map(|e| csv_field(&f(e))));
            cells.join(",")
        };
        let lines = [
            row("Metrica", |e| e.ticker.clone()),
            row("Nome", |e| e.name.clone()),
            row("ISIN", |e| e.isin.clone()),
            row("TER (%)", |e| e.ter.to_string()),
            row("Patrimonio (€)", |e| e.aum.to_string()),
            row("Performance 1Y (%)", |e| e.performance_1y.to_string()),
            row("Performance 3Y (%)", |e| e.performance_3y.to_string()),
            row("Performance 5Y (%)", |e| e.performance_5y.to_string()),
            row("Volatilità (%)", |e| e.volatility.to_string()),
            row("Dividend Yield (%)", |e| e.dividend_yield.to_string()),
        ];
        Ok(lines.join("\n"))
    }

    /// Illustrative 5-year path per ETF: the average monthly slice of the
    /// 5-year performance plus up to ±1% noise each month.
    pub fn performance_series<R: Rng>(&self, rng: &mut R) -> Vec<SeriesLine> {
        self.etfs
            .iter()
            .map(|etf| {
                let mut cumulative = 0.0;
                let values = (0..SERIES_MONTHS)
                    .map(|_| {
                        cumulative += etf.performance_5y / 100.0 / 12.0 + (rng.gen::<f64>() - 0.5) * 0.02;
                        cumulative * 100.0
                    })
                    .collect();
                SeriesLine { ticker: etf.ticker.clone(), values }
            })
            .collect()
    }
}

fn pct(v: f64) -> String {
    format!("{:.2}%", v)
}

fn signed_pct(v: f64) -> String {
    format!("{}{:.2}%", if v >= 0.0 { "+" } else { "" }, v)
}

/// The "popular" picks shown under the comparator search box.
pub fn featured(catalog: &Catalog) -> Vec<Etf> {
    catalog.all().iter().take(6).cloned().collect()
}
