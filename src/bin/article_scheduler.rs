use anyhow::Result;
use chrono::Local;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::time::Duration;

use etfitalia::blog::generator::ArticleGenerator;
use etfitalia::blog::integration::BlogIntegration;
use etfitalia::blog::scheduler::{run_loop, run_slot, Schedule, Slot};
use etfitalia::blog::{Article, ArticleStore};
use etfitalia::config::Config;
use etfitalia::logging::{log, obj, v_str, Domain, Level};

#[derive(Parser)]
#[command(name = "article-scheduler", about = "Generazione automatica degli articoli del blog", version)]
struct Cli {
    /// Also import the new articles into the blog store.
    #[arg(long, global = true)]
    import: bool,
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Generate now; asks for the count when none is given.
    Manual { count: Option<usize> },
    /// Generate a single article.
    Test,
    /// Run the daily slots (08:00 x2, 18:00 x1) until interrupted.
    Schedule {
        #[arg(long, default_value_t = 60)]
        tick_secs: u64,
    },
}

fn ask_count() -> usize {
    print!("Quanti articoli generare? [2] ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        return 2;
    }
    line.trim().parse().unwrap_or(2)
}

fn report(articles: &[Article], generator: &ArticleGenerator) {
    println!("{} articoli generati", articles.len());
    for a in articles {
        println!("- {}", a.title);
        println!("  {}", generator.output_dir().join(format!("article_{}.json", a.id)).display());
    }
}

struct Runner {
    generator: ArticleGenerator,
    integration: BlogIntegration,
    store: Option<ArticleStore>,
}

impl Runner {
    fn new(cfg: &Config, import: bool) -> Result<Self> {
        let store = if import { Some(ArticleStore::open(&cfg.blog_data_path)?) } else { None };
        Ok(Self {
            generator: ArticleGenerator::new(&cfg.generated_dir),
            integration: BlogIntegration::new(&cfg.generated_dir, &cfg.processed_dir),
            store,
        })
    }

    fn run(&mut self, label: &str, count: usize) -> Result<Vec<Article>> {
        let import = self.store.as_mut().map(|s| (&self.integration, s));
        run_slot(&self.generator, import, label, count)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::from_env();
    let mut runner = Runner::new(&cfg, cli.import)?;

    match cli.mode {
        Mode::Manual { count } => {
            let count = count.unwrap_or_else(ask_count);
            let articles = runner.run("manuale", count)?;
            report(&articles, &runner.generator);
        }
        Mode::Test => {
            let articles = runner.run("test", 1)?;
            report(&articles, &runner.generator);
        }
        Mode::Schedule { tick_secs } => {
            let schedule = Schedule::default();
            println!("Scheduler attivo. Ctrl+C per fermare.");
            run_loop(
                &schedule,
                Duration::from_secs(tick_secs.max(1)),
                || Local::now().naive_local(),
                |slot: &Slot| {
                    if let Err(e) = runner.run(slot.label, slot.count) {
                        log(
                            Level::Error,
                            Domain::Scheduler,
                            "slot_failed",
                            obj(&[("slot", v_str(slot.label)), ("error", v_str(&e.to_string()))]),
                        );
                    }
                },
                async {
                    let _ = tokio::signal::ctrl_c().await;
                },
            )
            .await;
        }
    }
    Ok(())
}
