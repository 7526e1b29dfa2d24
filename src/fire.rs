//! FIRE (financial independence, retire early) calculator.
//!
//! All rates are percentages as typed by the user; the projection runs on
//! the inflation-adjusted monthly return.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EtfError, EtfResult};
use crate::format::{csv_field, format_currency};
use crate::storage::{keys, LocalStore};

/// Years reported when the target is out of reach.
pub const MAX_YEARS: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FireInput {
    pub current_age: f64,
    pub retirement_age: f64,
    pub current_savings: f64,
    pub monthly_income: f64,
    pub monthly_expenses: f64,
    pub monthly_savings: f64,
    pub expected_return: f64,
    pub inflation_rate: f64,
    pub withdrawal_rate: f64,
}

impl Default for FireInput {
    fn default() -> Self {
        Self {
            current_age: 30.0,
            retirement_age: 65.0,
            current_savings: 10_000.0,
            monthly_income: 3_000.0,
            monthly_expenses: 2_000.0,
            monthly_savings: 1_000.0,
            expected_return: 7.0,
            inflation_rate: 2.0,
            withdrawal_rate: 4.0,
        }
    }
}

impl FireInput {
    pub fn validate(&self) -> EtfResult<()> {
        let mut errors = Vec::new();
        if !(self.withdrawal_rate > 0.0) {
            errors.push("Il tasso di prelievo deve essere maggiore di zero".to_string());
        }
        if self.current_savings < 0.0 || self.monthly_expenses < 0.0 || self.monthly_income < 0.0 {
            errors.push("Gli importi non possono essere negativi".to_string());
        }
        if !(0.0..=120.0).contains(&self.current_age) {
            errors.push("Età non valida".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(EtfError::Validation(errors))
        }
    }

    /// Income minus expenses, never negative.
    pub fn derived_savings(&self) -> f64 {
        (self.monthly_income - self.monthly_expenses).max(0.0)
    }

    pub fn fire_number(&self) -> f64 {
        fire_number(self.monthly_expenses, self.withdrawal_rate)
    }

    pub fn real_monthly_return(&self) -> f64 {
        real_monthly_return(self.expected_return, self.inflation_rate)
    }
}

pub fn fire_number(monthly_expenses: f64, withdrawal_rate: f64) -> f64 {
    monthly_expenses * 12.0 / (withdrawal_rate / 100.0)
}

pub fn real_monthly_return(expected_return: f64, inflation_rate: f64) -> f64 {
    (1.0 + expected_return / 100.0 / 12.0) / (1.0 + inflation_rate / 100.0 / 12.0) - 1.0
}

/// Months of contributions to reach `target`, crediting one year of growth
/// on savings already held.
fn months_with_growth(current: f64, contribution: f64, target: f64, real: f64) -> f64 {
    let target = if current > 0.0 {
        (target - current * (1.0 + real).powi(12)).max(0.0)
    } else {
        target
    };
    if target <= 0.0 {
        return 0.0;
    }
    ((target * real / contribution) + 1.0).ln() / (1.0 + real).ln()
}

/// Years to FIRE for what-if comparisons; unreachable cases yield [`MAX_YEARS`].
pub fn years_to_fire(
    current_savings: f64,
    monthly_savings: f64,
    fire_number: f64,
    expected_return: f64,
    inflation_rate: f64,
) -> f64 {
    let real = real_monthly_return(expected_return, inflation_rate);
    if monthly_savings <= 0.0 || real <= 0.0 {
        return MAX_YEARS;
    }
    let years = (months_with_growth(current_savings, monthly_savings, fire_number, real) / 12.0).max(0.0);
    if years.is_finite() {
        years.min(MAX_YEARS)
    } else {
        MAX_YEARS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FireResult {
    pub fire_number: f64,
    pub years_to_fire: f64,
    pub fire_age: f64,
    pub real_monthly_return: f64,
    pub savings_rate: f64,
    pub progress_percent: f64,
}

pub fn calculate(input: &FireInput) -> EtfResult<FireResult> {
    input.validate()?;
    let target = input.fire_number();
    let real = input.real_monthly_return();
    let contribution = input.monthly_savings;

    let months = if contribution > 0.0 && real > 0.0 {
        months_with_growth(input.current_savings, contribution, target, real)
    } else if contribution > 0.0 {
        (target - input.current_savings) / contribution
    } else {
        f64::INFINITY
    };

    let mut years = (months / 12.0).max(0.0);
    if years > MAX_YEARS || !years.is_finite() {
        years = MAX_YEARS;
    }
    let savings_rate = if input.monthly_income > 0.0 {
        contribution / input.monthly_income * 100.0
    } else {
        0.0
    };
    Ok(FireResult {
        fire_number: target,
        years_to_fire: years,
        fire_age: input.current_age + years,
        real_monthly_return: real,
        savings_rate,
        progress_percent: progress_percent(input.current_savings, target),
    })
}

pub fn progress_percent(current_savings: f64, fire_number: f64) -> f64 {
    if fire_number <= 0.0 {
        return 100.0;
    }
    (current_savings / fire_number * 100.0).clamp(0.0, 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionPoint {
    pub age: f64,
    pub wealth: f64,
    pub fire_target: f64,
}

/// Yearly wealth from today until a few years past FIRE, at most 50 years.
pub fn projection(input: &FireInput, result: &FireResult) -> Vec<ProjectionPoint> {
    let years = ((result.years_to_fire.ceil() as u32) + 5).min(50);
    let real = input.real_monthly_return();
    let mut wealth = input.current_savings;
    let mut out = Vec::with_capacity(years as usize + 1);
    for year in 0..=years {
        out.push(ProjectionPoint {
            age: input.current_age + year as f64,
            wealth,
            fire_target: result.fire_number,
        });
        for _ in 0..12 {
            wealth = wealth * (1.0 + real) + input.monthly_savings;
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub icon: String,
    pub title: String,
    pub description: String,
    /// Years saved; negative means the change delays FIRE.
    pub impact: f64,
}

pub fn strategies(input: &FireInput, result: &FireResult) -> Vec<Strategy> {
    let mut out = Vec::new();
    let current = result.years_to_fire;
    let income = input.monthly_income;

    if income > 0.0 && input.monthly_savings / income * 100.0 < 50.0 {
        let new_savings = input.monthly_savings + 200.0;
        let years = years_to_fire(
            input.current_savings,
            new_savings,
            result.fire_number,
            input.expected_return,
            input.inflation_rate,
        );
        out.push(Strategy {
            icon: "💰".into(),
            title: "Aumenta il Risparmio Mensile".into(),
            description: format!(
                "Risparmia €200 in più al mese ({:.1}% del reddito)",
                new_savings / income * 100.0
            ),
            impact: current - years,
        });
    }

    if input.monthly_expenses > 1000.0 {
        let reduced = input.monthly_expenses * 0.9;
        let new_savings = income - reduced;
        let new_target = fire_number(reduced, input.withdrawal_rate);
        let years = years_to_fire(
            input.current_savings,
            new_savings,
            new_target,
            input.expected_return,
            input.inflation_rate,
        );
        out.push(Strategy {
            icon: "✂️".into(),
            title: "Riduci le Spese del 10%".into(),
            description: format!(
                "Riduci le spese mensili a €{:.0} (-€{:.0}/mese)",
                reduced,
                input.monthly_expenses - reduced
            ),
            impact: current - years,
        });
    }

    let raised = income * 1.2;
    let savings_from_raise = raised - input.monthly_expenses;
    if savings_from_raise > input.monthly_savings {
        let years = years_to_fire(
            input.current_savings,
            savings_from_raise,
            result.fire_number,
            input.expected_return,
            input.inflation_rate,
        );
        out.push(Strategy {
            icon: "📈".into(),
            title: "Aumenta il Reddito del 20%".into(),
            description: format!(
                "Porta il reddito a €{:.0}/mese (+€{:.0}/mese)",
                raised,
                raised - income
            ),
            impact: current - years,
        });
    }

    if input.expected_return < 8.0 {
        let better = input.expected_return + 1.0;
        let years = years_to_fire(
            input.current_savings,
            input.monthly_savings,
            result.fire_number,
            better,
            input.inflation_rate,
        );
        out.push(Strategy {
            icon: "📊".into(),
            title: "Ottimizza gli Investimenti".into(),
            description: format!("Migliora il rendimento al {}% annuo con ETF più performanti", better),
            impact: current - years,
        });
    }

    out.truncate(4);
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireScenario {
    pub name: String,
    pub kind: String,
    /// Percent.
    #[serde(rename = "return")]
    pub expected_return: f64,
    pub probability: u32,
    pub years: f64,
    pub fire_age: f64,
}

pub fn scenarios(input: &FireInput, result: &FireResult) -> Vec<FireScenario> {
    const CASES: [(&str, &str, f64, u32); 5] = [
        ("Pessimistico", "pessimistic", -2.0, 20),
        ("Conservativo", "conservative", -1.0, 30),
        ("Realistico", "realistic", 0.0, 40),
        ("Ottimistico", "optimistic", 1.0, 25),
        ("Molto Ottimistico", "very-optimistic", 2.0, 10),
    ];
    CASES
        .iter()
        .map(|(name, kind, delta, probability)| {
            let rate = input.expected_return + delta;
            let years = years_to_fire(
                input.current_savings,
                input.monthly_savings,
                result.fire_number,
                rate,
                input.inflation_rate,
            );
            FireScenario {
                name: name.to_string(),
                kind: kind.to_string(),
                expected_return: rate,
                probability: *probability,
                years,
                fire_age: input.current_age + years,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FireReport {
    pub input: FireInput,
    pub result: FireResult,
    pub projection: Vec<ProjectionPoint>,
    pub strategies: Vec<Strategy>,
    pub scenarios: Vec<FireScenario>,
}

pub fn report(input: &FireInput) -> EtfResult<FireReport> {
    let result = calculate(input)?;
    Ok(FireReport {
        input: *input,
        projection: projection(input, &result),
        strategies: strategies(input, &result),
        scenarios: scenarios(input, &result),
        result,
    })
}

pub fn plan_csv(input: &FireInput, result: &FireResult) -> String {
    let money = |v: f64| csv_field(&format_currency(v));
    let mut csv = String::from("Piano FIRE - GuadagnareConETF\n\n");
    csv.push_str("SITUAZIONE ATTUALE\n");
    csv.push_str(&format!("Età,{}\n", input.current_age));
    csv.push_str(&format!("Risparmi Attuali,{}\n", money(input.current_savings)));
    csv.push_str(&format!("Reddito Mensile,{}\n", money(input.monthly_income)));
    csv.push_str(&format!("Spese Mensili,{}\n", money(input.monthly_expenses)));
    csv.push_str(&format!("Risparmio Mensile,{}\n\n", money(input.monthly_savings)));
    csv.push_str("PARAMETRI DI INVESTIMENTO\n");
    csv.push_str(&format!("Rendimento Atteso,{}%\n", input.expected_return));
    csv.push_str(&format!("Tasso di Inflazione,{}%\n", input.inflation_rate));
    csv.push_str(&format!("Tasso di Prelievo,{}%\n\n", input.withdrawal_rate));
    csv.push_str("RISULTATI\n");
    csv.push_str(&format!("Numero FIRE,{}\n", money(result.fire_number)));
    csv.push_str(&format!("Anni al FIRE,{:.1}\n", result.years_to_fire));
    csv.push_str(&format!("Età FIRE,{}\n", result.fire_age.round()));
    csv
}

pub fn plan_filename(now: DateTime<Utc>) -> String {
    format!("piano-fire-{}.csv", now.format("%Y-%m-%d"))
}

pub fn share_text(result: &FireResult) -> String {
    format!(
        "🔥 Il mio Piano FIRE:\n💰 Obiettivo: {}\n⏰ Tempo rimanente: {:.1} anni\n🎂 Età FIRE: {} anni\n\nCalcolato su GuadagnareConETF",
        format_currency(result.fire_number),
        result.years_to_fire,
        result.fire_age.round()
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedPlan {
    pub id: String,
    pub name: String,
    pub date: DateTime<Utc>,
    pub state: FireInput,
    pub result: FireResult,
}

pub fn save_plan(store: &mut LocalStore, input: &FireInput, now: DateTime<Utc>) -> EtfResult<SavedPlan> {
    let result = calculate(input)?;
    let plan = SavedPlan {
        id: now.timestamp_millis().to_string(),
        name: format!("Piano FIRE {}", now.format("%d/%m/%Y")),
        date: now,
        state: *input,
        result,
    };
    let mut plans: Vec<SavedPlan> = store.get_or_default(keys::FIRE_PLANS)?;
    plans.push(plan.clone());
    store.set_json(keys::FIRE_PLANS, &plans)?;
    Ok(plan)
}

pub fn list_plans(store: &LocalStore) -> Result<Vec<SavedPlan>> {
    store.get_or_default(keys::FIRE_PLANS)
}

pub fn delete_plan(store: &mut LocalStore, id: &str) -> EtfResult<()> {
    let mut plans = list_plans(store)?;
    let before = plans.len();
    plans.retain(|p| p.id != id);
    if plans.len() == before {
        return Err(EtfError::NotFound(format!("Piano FIRE {} non trovato", id)));
    }
    store.set_json(keys::FIRE_PLANS, &plans)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fire_number_uses_withdrawal_rate() {
        assert_eq!(FireInput::default().fire_number(), 600_000.0);
        assert_eq!(fire_number(1_000.0, 3.0), 400_000.0);
    }

    #[test]
    fn default_profile_reaches_fire_in_reasonable_time() {
        let input = FireInput::default();
        let r = calculate(&input).unwrap();
        assert!(r.years_to_fire > 20.0 && r.years_to_fire < 30.0, "{}", r.years_to_fire);
        assert!((r.fire_age - input.current_age - r.years_to_fire).abs() < 1e-9);
        assert!((r.savings_rate - 33.333).abs() < 0.01);
    }

    #[test]
    fn already_rich_means_zero_years() {
        let input = FireInput { current_savings: 2_000_000.0, ..Default::default() };
        assert_eq!(calculate(&input).unwrap().years_to_fire, 0.0);
    }

    #[test]
    fn no_savings_caps_at_max() {
        let input = FireInput { monthly_savings: 0.0, ..Default::default() };
        let r = calculate(&input).unwrap();
        assert_eq!(r.years_to_fire, MAX_YEARS);
        assert_eq!(r.fire_age, 130.0);
    }

    #[test]
    fn non_positive_real_return_is_linear() {
        let input = FireInput { expected_return: 2.0, inflation_rate: 2.0, ..Default::default() };
        let r = calculate(&input).unwrap();
        assert!((r.years_to_fire - (600_000.0 - 10_000.0) / 1_000.0 / 12.0).abs() < 1e-9);
        assert_eq!(years_to_fire(10_000.0, 1_000.0, 600_000.0, 2.0, 2.0), MAX_YEARS);
    }

    #[test]
    fn more_return_means_fewer_years() {
        let mut last = f64::MAX;
        for rate in 3..=12 {
            let y = years_to_fire(10_000.0, 1_000.0, 600_000.0, rate as f64, 2.0);
            assert!(y <= last);
            last = y;
        }
    }

    #[test]
    fn projection_spans_past_fire() {
        let input = FireInput::default();
        let r = calculate(&input).unwrap();
        let points = projection(&input, &r);
        assert_eq!(points.len() as u32, ((r.years_to_fire.ceil() as u32) + 5).min(50) + 1);
        assert_eq!(points[0].wealth, input.current_savings);
        assert!(points.last().unwrap().wealth > r.fire_number);
    }

    #[test]
    fn strategies_for_default_profile() {
        let input = FireInput::default();
        let r = calculate(&input).unwrap();
        let s = strategies(&input, &r);
        assert_eq!(s.len(), 4);
        assert!(s.iter().all(|st| st.impact > 0.0));
        assert_eq!(s[1].title, "Riduci le Spese del 10%");
    }

    #[test]
    fn zero_income_skips_savings_rate_strategy() {
        let input = FireInput { monthly_income: 0.0, monthly_expenses: 500.0, ..Default::default() };
        let r = calculate(&input).unwrap();
        assert!(strategies(&input, &r).iter().all(|s| s.title != "Aumenta il Risparmio Mensile"));
    }

    #[test]
    fn scenarios_have_fixed_shape() {
        let input = FireInput::default();
        let r = calculate(&input).unwrap();
        let sc = scenarios(&input, &r);
        assert_eq!(sc.len(), 5);
        assert_eq!(sc.iter().map(|s| s.probability).collect::<Vec<_>>(), vec![20, 30, 40, 25, 10]);
        assert!(sc[0].years >= sc[4].years);
    }

    #[test]
    fn csv_export_sections() {
        let input = FireInput::default();
        let r = calculate(&input).unwrap();
        let csv = plan_csv(&input, &r);
        assert!(csv.starts_with("Piano FIRE - GuadagnareConETF\n\nSITUAZIONE ATTUALE\n"));
        assert!(csv.contains("PARAMETRI DI INVESTIMENTO\nRendimento Atteso,7%\n"));
        assert!(csv.contains("Numero FIRE,\"600.000,00 €\""));
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        assert_eq!(plan_filename(now), "piano-fire-2024-03-09.csv");
    }

    #[test]
    fn plans_are_persisted() {
        let mut store = LocalStore::in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let plan = save_plan(&mut store, &FireInput::default(), now).unwrap();
        assert_eq!(plan.name, "Piano FIRE 09/03/2024");
        assert_eq!(list_plans(&store).unwrap().len(), 1);
        delete_plan(&mut store, &plan.id).unwrap();
        assert!(list_plans(&store).unwrap().is_empty());
        assert!(delete_plan(&mut store, &plan.id).is_err());
    }
}
