//! Daily article generation slots and the loop that fires them.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;

use super::generator::ArticleGenerator;
use super::integration::BlogIntegration;
use super::{Article, ArticleStore};
use crate::logging::{log, obj, v_str, Domain, Level};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub label: &'static str,
    pub at: NaiveTime,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    slots: Vec<Slot>,
}

impl Default for Schedule {
    /// Two articles at 08:00, one at 18:00.
    fn default() -> Self {
        let at = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap_or_default();
        Self {
            slots: vec![
                Slot { label: "mattino", at: at(8), count: 2 },
                Slot { label: "sera", at: at(18), count: 1 },
            ],
        }
    }
}

impl Schedule {
    pub fn new(mut slots: Vec<Slot>) -> Self {
        slots.sort_by_key(|s| s.at);
        Self { slots }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Next slot strictly after `now`, with its wall-clock time.
    pub fn next_run(&self, now: NaiveDateTime) -> Option<(NaiveDateTime, &Slot)> {
        self.slots
            .iter()
            .map(|slot| {
                let today = now.date().and_time(slot.at);
                let when = if today > now { today } else { today + ChronoDuration::days(1) };
                (when, slot)
            })
            .min_by_key(|(when, _)| *when)
    }

    /// Slots whose latest occurrence falls in `(last, now]`.
    pub fn due(&self, last: NaiveDateTime, now: NaiveDateTime) -> Vec<&Slot> {
        self.slots
            .iter()
            .filter(|slot| {
                let today = now.date().and_time(slot.at);
                let latest = if today <= now { today } else { today - ChronoDuration::days(1) };
                latest > last && latest <= now
            })
            .collect()
    }
}

/// Generates `count` articles and, when an importer is given, publishes them.
pub fn run_slot(
    generator: &ArticleGenerator,
    import: Option<(&BlogIntegration, &mut ArticleStore)>,
    label: &str,
    count: usize,
) -> Result<Vec<Article>> {
    let mut rng = rand::thread_rng();
    let articles = generator.generate_daily(count, &mut rng, Utc::now());
    if articles.is_empty() {
        log(Level::Warn, Domain::Scheduler, "slot_empty", obj(&[("slot", v_str(label))]));
    } else {
        for a in &articles {
            log(
                Level::Info,
                Domain::Scheduler,
                "article_generated",
                obj(&[
                    ("slot", v_str(label)),
                    ("id", v_str(&a.id)),
                    ("title", v_str(&a.title)),
                    ("category", v_str(&a.category)),
                ]),
            );
        }
    }
    if let Some((integration, store)) = import {
        let imported = integration.process_new_articles(store)?;
        log(Level::Info, Domain::Scheduler, "slot_imported", obj(&[("slot", v_str(label)), ("imported", json!(imported))]));
    }
    Ok(articles)
}

/// Checks the schedule every `tick` until `shutdown` resolves.
pub async fn run_loop<C, F, S>(schedule: &Schedule, tick: Duration, mut clock: C, mut on_slot: F, shutdown: S)
where
    C: FnMut() -> NaiveDateTime,
    F: FnMut(&Slot),
    S: Future<Output = ()>,
{
    let mut last = clock();
    if let Some((when, slot)) = schedule.next_run(last) {
        log(
            Level::Info,
            Domain::Scheduler,
            "scheduler_started",
            obj(&[("next_run", v_str(&when.to_string())), ("slot", v_str(slot.label))]),
        );
    }
    let mut interval = tokio::time::interval(tick);
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log(Level::Info, Domain::Scheduler, "scheduler_stopped", obj(&[]));
                break;
            }
            _ = interval.tick() => {
                let now = clock();
                for slot in schedule.due(last, now) {
                    on_slot(slot);
                }
                last = now;
            }
        }
    }
}
