//! Investment growth simulator.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{EtfError, EtfResult};
use crate::logging::{log, obj, v_num, Domain, Level, ProfileScope};

/// Upper bound on Monte Carlo paths per request, for both the simulator and
/// the portfolio spread.
pub const MAX_MONTE_CARLO_ITERATIONS: usize = 100_000;

pub fn check_iterations(iterations: usize) -> EtfResult<()> {
    if iterations == 0 || iterations > MAX_MONTE_CARLO_ITERATIONS {
        return Err(EtfError::validation(format!(
            "Il numero di simulazioni deve essere tra 1 e {}",
            MAX_MONTE_CARLO_ITERATIONS
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationInput {
    pub initial_amount: f64,
    pub monthly_amount: f64,
    /// Years.
    pub investment_period: u32,
    /// Annual return as a fraction (0.07 = 7%).
    pub expected_return: f64,
}

impl Default for SimulationInput {
    fn default() -> Self {
        Self {
            initial_amount: 10_000.0,
            monthly_amount: 500.0,
            investment_period: 20,
            expected_return: 0.07,
        }
    }
}

impl SimulationInput {
    pub fn validate(&self) -> EtfResult<()> {
        let mut errors = Vec::new();
        if !(self.initial_amount >= 0.0) {
            errors.push("L'investimento iniziale deve essere positivo".to_string());
        }
        if !(self.monthly_amount >= 0.0) {
            errors.push("Il versamento mensile deve essere positivo".to_string());
        }
        if !(1..=50).contains(&self.investment_period) {
            errors.push("Il periodo di investimento deve essere tra 1 e 50 anni".to_string());
        }
        if !(0.0..=0.3).contains(&self.expected_return) {
            errors.push("Il rendimento atteso deve essere tra 0% e 30%".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EtfError::Validation(errors))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowthPoint {
    pub year: u32,
    pub value: f64,
    pub invested: f64,
    pub gain: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthPoint {
    pub month: u32,
    pub value: f64,
    pub invested: f64,
    pub gain: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationSummary {
    pub initial_amount: f64,
    pub monthly_amount: f64,
    pub investment_period: u32,
    /// Percent.
    pub expected_return: f64,
    pub total_invested: f64,
    pub final_value: f64,
    pub total_gain: f64,
    pub total_return: f64,
    /// `None` without an initial amount, where the ratio is undefined.
    pub annualized_return: Option<f64>,
    pub multiplier: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Simulation {
    pub yearly: Vec<GrowthPoint>,
    pub monthly: Vec<MonthPoint>,
    pub summary: SimulationSummary,
}

/// Contribution at the start of each month, then a month of growth at r/12.
pub fn simulate(input: &SimulationInput) -> EtfResult<Simulation> {
    input.validate()?;
    Ok(project(input))
}

fn project(input: &SimulationInput) -> Simulation {
    let monthly_return = input.expected_return / 12.0;
    let total_months = input.investment_period * 12;

    let mut value = input.initial_amount;
    let mut invested = input.initial_amount;
    let mut yearly = vec![GrowthPoint { year: 0, value, invested, gain: 0.0 }];
    let mut monthly = Vec::with_capacity(total_months as usize);

    for month in 1..=total_months {
        value += input.monthly_amount;
        invested += input.monthly_amount;
        value *= 1.0 + monthly_return;
        monthly.push(MonthPoint { month, value, invested, gain: value - invested });
        if month % 12 == 0 {
            yearly.push(GrowthPoint { year: month / 12, value, invested, gain: value - invested });
        }
    }

    let total_return = if invested > 0.0 { (value / invested - 1.0) * 100.0 } else { 0.0 };
    let annualized_return = (input.initial_amount > 0.0).then(|| {
        ((value / input.initial_amount).powf(1.0 / input.investment_period as f64) - 1.0) * 100.0
    });

    Simulation {
        yearly,
        monthly,
        summary: SimulationSummary {
            initial_amount: input.initial_amount,
            monthly_amount: input.monthly_amount,
            investment_period: input.investment_period,
            expected_return: input.expected_return * 100.0,
            total_invested: invested,
            final_value: value,
            total_gain: value - invested,
            total_return,
            annualized_return,
            multiplier: if invested > 0.0 { value / invested } else { 0.0 },
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub name: String,
    /// Percent.
    pub rate: f64,
    pub final_value: f64,
    pub total_gain: f64,
}

/// Pessimistic, realistic and optimistic runs two points apart.
pub fn scenarios(input: &SimulationInput) -> EtfResult<Vec<Scenario>> {
    input.validate()?;
    let cases = [
        ("Pessimistico", (input.expected_return - 0.02).max(0.0)),
        ("Realistico", input.expected_return),
        ("Ottimistico", input.expected_return + 0.02),
    ];
    Ok(cases
        .iter()
        .map(|(name, rate)| {
            let run = project(&SimulationInput { expected_return: *rate, ..*input });
            Scenario {
                name: name.to_string(),
                rate: rate * 100.0,
                final_value: run.summary.final_value,
                total_gain: run.summary.total_gain,
            }
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloResult {
    pub iterations: usize,
    pub volatility: f64,
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub mean: f64,
}

pub const DEFAULT_VOLATILITY: f64 = 0.15;
const CHUNK: usize = 64;

fn one_path(input: &SimulationInput, normal: &Normal<f64>, rng: &mut StdRng) -> f64 {
    let mut value = input.initial_amount;
    for _ in 0..input.investment_period {
        let yearly = normal.sample(rng).max(-0.5);
        for _ in 0..12 {
            value += input.monthly_amount;
            value *= 1.0 + yearly / 12.0;
        }
    }
    value
}

/// Draws a yearly return per simulated year from N(r, volatility), floored at -50%.
///
/// Work is cut into fixed chunks, each with an RNG derived from `seed` and the
/// chunk index, and the chunks are spread over one worker per CPU. The result
/// depends only on the seed, not on the worker count.
pub fn monte_carlo(
    input: &SimulationInput,
    iterations: usize,
    volatility: f64,
    seed: u64,
) -> EtfResult<MonteCarloResult> {
    input.validate()?;
    check_iterations(iterations)?;
    let normal = Normal::new(input.expected_return, volatility)
        .map_err(|e| EtfError::validation(format!("volatilità non valida: {}", e)))?;
    let _scope = ProfileScope::new("monte_carlo");

    let chunks = iterations.div_ceil(CHUNK);
    let workers = num_cpus::get().clamp(1, chunks);
    let mut results = vec![0.0; iterations];
    {
        let mut slices: Vec<(usize, &mut [f64])> = results.chunks_mut(CHUNK).enumerate().collect();
        let per_worker = slices.len().div_ceil(workers);
        std::thread::scope(|s| {
            while !slices.is_empty() {
                let take = per_worker.min(slices.len());
                let batch: Vec<(usize, &mut [f64])> = slices.drain(..take).collect();
                let normal = &normal;
                s.spawn(move || {
                    for (idx, out) in batch {
                        let mut rng = StdRng::seed_from_u64(seed ^ (idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
                        for slot in out.iter_mut() {
                            *slot = one_path(input, normal, &mut rng);
                        }
                    }
                });
            }
        });
    }

    results.sort_by(|a, b| a.total_cmp(b));
    let n = results.len();
    let at = |p: f64| results[((n as f64 * p).floor() as usize).min(n - 1)];
    let mean = results.iter().sum::<f64>() / n as f64;
    let out = MonteCarloResult {
        iterations: n,
        volatility,
        p10: at(0.10),
        p25: at(0.25),
        p50: at(0.50),
        p75: at(0.75),
        p90: at(0.90),
        mean,
    };
    log(
        Level::Debug,
        Domain::Calc,
        "monte_carlo",
        obj(&[
            ("iterations", serde_json::json!(n)),
            ("workers", serde_json::json!(workers)),
            ("p50", v_num(out.p50)),
        ]),
    );
    Ok(out)
}

pub fn to_csv(sim: &Simulation) -> String {
    let mut csv = String::from("Anno,Valore Portafoglio,Capitale Investito,Guadagno\n");
    for p in &sim.yearly {
        csv.push_str(&format!("{},{:.2},{:.2},{:.2}\n", p.year, p.value, p.invested, p.gain));
    }
    csv
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(rate: f64, years: u32) -> SimulationInput {
        SimulationInput {
            initial_amount: 10_000.0,
            monthly_amount: 200.0,
            investment_period: years,
            expected_return: rate,
        }
    }

    #[test]
    fn zero_rate_returns_contributions() {
        let sim = simulate(&input(0.0, 10)).unwrap();
        assert_eq!(sim.summary.total_invested, 10_000.0 + 200.0 * 120.0);
        assert!((sim.summary.final_value - sim.summary.total_invested).abs() < 1e-9);
        assert_eq!(sim.yearly.len(), 11);
        assert_eq!(sim.monthly.len(), 120);
        assert_eq!(sim.yearly[0].year, 0);
    }

    #[test]
    fn lump_sum_matches_closed_form() {
        let inp = SimulationInput { monthly_amount: 0.0, ..input(0.06, 5) };
        let sim = simulate(&inp).unwrap();
        let expected = 10_000.0 * (1.0f64 + 0.06 / 12.0).powi(60);
        assert!((sim.summary.final_value - expected).abs() < 1e-6);
        assert!(sim.summary.annualized_return.unwrap() > 6.0);
    }

    #[test]
    fn final_value_is_monotonic_in_rate_and_time() {
        let mut last = 0.0;
        for step in 0..=30 {
            let v = simulate(&input(step as f64 / 100.0, 15)).unwrap().summary.final_value;
            assert!(v >= last, "rate {}", step);
            last = v;
        }
        let mut last = 0.0;
        for years in 1..=50 {
            let v = simulate(&input(0.05, years)).unwrap().summary.final_value;
            assert!(v >= last, "years {}", years);
            last = v;
        }
    }

    #[test]
    fn annualized_is_none_without_initial_amount() {
        let inp = SimulationInput { initial_amount: 0.0, ..input(0.05, 3) };
        assert_eq!(simulate(&inp).unwrap().summary.annualized_return, None);
    }

    #[test]
    fn validation_collects_every_error() {
        let bad = SimulationInput {
            initial_amount: -1.0,
            monthly_amount: -1.0,
            investment_period: 0,
            expected_return: 0.5,
        };
        match simulate(&bad) {
            Err(EtfError::Validation(errors)) => assert_eq!(errors.len(), 4),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn scenarios_are_ordered() {
        let s = scenarios(&input(0.01, 10)).unwrap();
        assert_eq!(s[0].name, "Pessimistico");
        assert_eq!(s[0].rate, 0.0);
        assert!(s[0].final_value < s[1].final_value);
        assert!(s[1].final_value < s[2].final_value);
    }

    #[test]
    fn monte_carlo_is_seeded_and_ordered() {
        let a = monte_carlo(&input(0.07, 10), 500, DEFAULT_VOLATILITY, 7).unwrap();
        let b = monte_carlo(&input(0.07, 10), 500, DEFAULT_VOLATILITY, 7).unwrap();
        assert_eq!(a, b);
        assert!(a.p10 <= a.p25 && a.p25 <= a.p50 && a.p50 <= a.p75 && a.p75 <= a.p90);
        assert_eq!(a.iterations, 500);
    }

    #[test]
    fn monte_carlo_iterations_are_bounded() {
        let inp = input(0.07, 10);
        for n in [0, MAX_MONTE_CARLO_ITERATIONS + 1, 1usize << 40] {
            assert!(matches!(monte_carlo(&inp, n, DEFAULT_VOLATILITY, 1), Err(EtfError::Validation(_))));
        }
        assert!(check_iterations(MAX_MONTE_CARLO_ITERATIONS).is_ok());
    }

    #[test]
    fn monte_carlo_without_volatility_matches_projection() {
        let inp = input(0.05, 5);
        let mc = monte_carlo(&inp, 10, 0.0, 1).unwrap();
        let det = simulate(&inp).unwrap().summary.final_value;
        assert!((mc.p50 - det).abs() < 1e-6);
    }

    #[test]
    fn csv_has_header_and_year_rows() {
        let csv = to_csv(&simulate(&input(0.05, 2)).unwrap());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "Anno,Valore Portafoglio,Capitale Investito,Guadagno");
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("0,10000.00,10000.00,0.00"));
    }
}
