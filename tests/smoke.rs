//! Smoke tests: the bundled catalog and the calculators agree with each other.

use etfitalia::catalog::{Catalog, SearchFilters, SortKey, SortOrder};
use etfitalia::comparator::Comparison;
use etfitalia::fire::{self, FireInput};
use etfitalia::portfolio::{self, Validation};
use etfitalia::seo;
use etfitalia::simulator::{self, SimulationInput};
use rand::rngs::StdRng;
use rand::SeedableRng;

// ---------------------------------------------------------------------------
// S01: catalog integrity
// ---------------------------------------------------------------------------
#[test]
fn s01_catalog_ids_are_unique_and_resolvable() {
    let catalog = Catalog::bundled().unwrap();
    assert!(catalog.len() >= 10);
    let mut ids: Vec<&str> = catalog.all().iter().map(|e| e.id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), catalog.len());
    for etf in catalog.all() {
        assert_eq!(etf.isin.len(), 12, "{}", etf.id);
        assert_eq!(catalog.resolve(&etf.isin).map(|e| &e.id), Some(&etf.id));
        assert_eq!(catalog.resolve(&etf.ticker).map(|e| &e.id), Some(&etf.id));
    }
}

#[test]
fn s02_default_search_returns_everything_by_aum() {
    let catalog = Catalog::bundled().unwrap();
    let all = catalog.search(&SearchFilters::default(), SortKey::default(), SortOrder::default());
    assert_eq!(all.len(), catalog.len());
    assert!(all.windows(2).all(|w| w[0].aum >= w[1].aum));
}

// ---------------------------------------------------------------------------
// S03: every model portfolio is complete and analysable
// ---------------------------------------------------------------------------
#[test]
fn s03_templates_load_fully() {
    let catalog = Catalog::bundled().unwrap();
    for (i, t) in portfolio::templates().iter().enumerate() {
        let p = portfolio::load_template(&catalog, i).unwrap();
        assert_eq!(p.len(), t.allocation.len(), "{}", t.name);
        assert_eq!(p.validate(), Validation::Complete);
        p.analysis(&mut StdRng::seed_from_u64(3), 200).unwrap();
    }
    assert!(portfolio::load_template(&catalog, 99).is_err());
}

// ---------------------------------------------------------------------------
// S04: simulator and Monte Carlo agree on the median order of magnitude
// ---------------------------------------------------------------------------
#[test]
fn s04_monte_carlo_brackets_deterministic_projection() {
    let input = SimulationInput::default();
    let sim = simulator::simulate(&input).unwrap();
    let mc = simulator::monte_carlo(&input, 2000, 0.10, 5).unwrap();
    assert!(mc.p10 < sim.summary.final_value && sim.summary.final_value < mc.p90);
}

#[test]
fn s05_fire_and_compare_run_on_defaults() {
    let report = fire::report(&FireInput::default()).unwrap();
    assert!(report.result.years_to_fire > 0.0);
    assert!(!report.projection.is_empty());

    let catalog = Catalog::bundled().unwrap();
    let keys: Vec<String> = catalog.top_by_aum(3).into_iter().map(|e| e.id).collect();
    let cmp = Comparison::from_keys(&catalog, &keys).unwrap();
    assert_eq!(cmp.analyze().unwrap().largest_aum.id, keys[0]);
    let csv = cmp.to_csv().unwrap();
    assert!(csv.starts_with("Metrica,"));
    assert_eq!(csv.lines().count(), 10);
}

#[test]
fn s06_sitemap_lists_every_etf() {
    let catalog = Catalog::bundled().unwrap();
    let entries = seo::sitemap(catalog.all(), "https://guadagnareconetf.it/", chrono::Utc::now());
    assert_eq!(entries.len(), catalog.len());
    let xml = seo::sitemap_xml(&entries);
    assert_eq!(xml.matches("<url>").count(), catalog.len());
}
