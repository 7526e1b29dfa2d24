use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::Serialize;

use etfitalia::admin::AdminConsole;
use etfitalia::backup;
use etfitalia::blog::integration::BlogIntegration;
use etfitalia::blog::ArticleStore;
use etfitalia::catalog::{format_aum, results_label, Catalog, SearchFilters, SortKey, SortOrder};
use etfitalia::comparator::Comparison;
use etfitalia::config::Config;
use etfitalia::fire::{self, FireInput};
use etfitalia::format::{format_currency, format_percentage};
use etfitalia::portfolio;
use etfitalia::seo;
use etfitalia::simulator::{self, SimulationInput, DEFAULT_VOLATILITY};
use etfitalia::storage::LocalStore;

#[derive(Parser)]
#[command(name = "etfitalia-cli", about = "Catalogo ETF, calcolatori e manutenzione", version)]
struct Cli {
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search the bundled catalog.
    Search {
        #[arg(long, default_value = "")]
        query: String,
        #[arg(long, default_value = "")]
        sector: String,
        #[arg(long, default_value = "")]
        region: String,
        #[arg(long, default_value_t = 2.0)]
        max_ter: f64,
        #[arg(long, default_value = "aum")]
        sort: String,
        #[arg(long, default_value = "desc")]
        order: String,
    },
    /// Side-by-side comparison by id, ISIN or ticker.
    Compare {
        etfs: Vec<String>,
        #[arg(long)]
        csv: bool,
    },
    Simulate {
        #[arg(long, default_value_t = 10_000.0)]
        initial: f64,
        #[arg(long, default_value_t = 500.0)]
        monthly: f64,
        #[arg(long, default_value_t = 20)]
        years: u32,
        /// Expected annual return in percent.
        #[arg(long, default_value_t = 7.0)]
        rate: f64,
        #[arg(long)]
        csv: bool,
    },
    MonteCarlo {
        #[arg(long, default_value_t = 10_000.0)]
        initial: f64,
        #[arg(long, default_value_t = 500.0)]
        monthly: f64,
        #[arg(long, default_value_t = 20)]
        years: u32,
        #[arg(long, default_value_t = 7.0)]
        rate: f64,
        #[arg(long, default_value_t = 1000)]
        iterations: usize,
        #[arg(long, default_value_t = DEFAULT_VOLATILITY)]
        volatility: f64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    Fire {
        #[arg(long, default_value_t = 30.0)]
        age: f64,
        #[arg(long, default_value_t = 10_000.0)]
        savings: f64,
        #[arg(long, default_value_t = 3_000.0)]
        income: f64,
        #[arg(long, default_value_t = 2_000.0)]
        expenses: f64,
        #[arg(long, default_value_t = 1_000.0)]
        monthly_savings: f64,
        #[arg(long, default_value_t = 7.0)]
        rate: f64,
        #[arg(long, default_value_t = 2.0)]
        inflation: f64,
        #[arg(long, default_value_t = 4.0)]
        withdrawal: f64,
        #[arg(long)]
        csv: bool,
    },
    /// Analyse one of the model portfolios.
    Template { index: usize },
    Sitemap,
    #[command(subcommand)]
    Backup(BackupCommand),
    #[command(subcommand)]
    Blog(BlogCommand),
}

#[derive(Subcommand)]
enum BackupCommand {
    /// Write a full backup; prints it when no path is given.
    Export { path: Option<String> },
    Restore { path: String },
    Undo,
    List,
}

#[derive(Subcommand)]
enum BlogCommand {
    /// Import generated articles into the blog store.
    Import,
    List,
}

fn emit<T: Serialize>(json: bool, value: &T, plain: impl FnOnce(&T)) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        plain(value);
    }
    Ok(())
}

fn sim_input(initial: f64, monthly: f64, years: u32, rate: f64) -> SimulationInput {
    SimulationInput {
        initial_amount: initial,
        monthly_amount: monthly,
        investment_period: years,
        expected_return: rate / 100.0,
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::from_env();
    let json = cli.json;
    match cli.command {
        Commands::Search { query, sector, region, max_ter, sort, order } => {
            let catalog = Catalog::bundled()?;
            let filters = SearchFilters { search: query, sector, region, ter: max_ter, ..SearchFilters::default() };
            let key: SortKey = sort.parse().map_err(anyhow::Error::msg)?;
            let order: SortOrder = order.parse().map_err(anyhow::Error::msg)?;
            let etfs = catalog.search(&filters, key, order);
            emit(json, &etfs, |etfs| {
                println!("{}", results_label(etfs.len()));
                for e in etfs.iter() {
                    println!(
                        "{:<8} {:<14} TER {:>6}  AUM {:>10}  {}",
                        e.ticker,
                        e.isin,
                        format_percentage(e.ter, 2),
                        format_aum(e.aum),
                        e.name
                    );
                }
            })?;
        }
        Commands::Compare { etfs, csv } => {
            let catalog = Catalog::bundled()?;
            let cmp = Comparison::from_keys(&catalog, &etfs)?;
            if csv {
                print!("{}", cmp.to_csv()?);
                return Ok(());
            }
            let analysis = cmp.analyze()?;
            emit(json, &analysis, |_| {
                for row in cmp.table() {
                    println!("{:<22} {}", row.label, row.values.join(" | "));
                }
            })?;
            if !json {
                println!("\n{}", cmp.recommendation()?);
            }
        }
        Commands::Simulate { initial, monthly, years, rate, csv } => {
            let sim = simulator::simulate(&sim_input(initial, monthly, years, rate))?;
            if csv {
                print!("{}", simulator::to_csv(&sim));
                return Ok(());
            }
            emit(json, &sim.summary, |s| {
                println!("Investito:      {}", format_currency(s.total_invested));
                println!("Valore finale:  {}", format_currency(s.final_value));
                println!("Guadagno:       {}", format_currency(s.total_gain));
                println!("Rendimento:     {}", format_percentage(s.total_return, 2));
                if let Some(a) = s.annualized_return {
                    println!("Annualizzato:   {}", format_percentage(a, 2));
                }
                println!("Moltiplicatore: {:.2}x", s.multiplier);
            })?;
        }
        Commands::MonteCarlo { initial, monthly, years, rate, iterations, volatility, seed } => {
            let input = sim_input(initial, monthly, years, rate);
            let result = simulator::monte_carlo(&input, iterations, volatility, seed)?;
            emit(json, &result, |r| {
                println!("{} simulazioni, volatilità {}", r.iterations, format_percentage(r.volatility * 100.0, 1));
                for (label, v) in [("P10", r.p10), ("P25", r.p25), ("P50", r.p50), ("P75", r.p75), ("P90", r.p90)] {
                    println!("{}  {}", label, format_currency(v));
                }
                println!("Media {}", format_currency(r.mean));
            })?;
        }
        Commands::Fire { age, savings, income, expenses, monthly_savings, rate, inflation, withdrawal, csv } => {
            let input = FireInput {
                current_age: age,
                current_savings: savings,
                monthly_income: income,
                monthly_expenses: expenses,
                monthly_savings,
                expected_return: rate,
                inflation_rate: inflation,
                withdrawal_rate: withdrawal,
                ..FireInput::default()
            };
            let report = fire::report(&input)?;
            if csv {
                print!("{}", fire::plan_csv(&input, &report.result));
                return Ok(());
            }
            emit(json, &report, |r| {
                println!("{}", fire::share_text(&r.result));
                for s in &r.strategies {
                    println!("- {}", s.title);
                }
            })?;
        }
        Commands::Template { index } => {
            let catalog = Catalog::bundled()?;
            let p = portfolio::load_template(&catalog, index)?;
            let analysis = p.analysis(&mut rand::thread_rng(), cfg.monte_carlo_iterations)?;
            emit(json, &analysis, |_| {
                for h in p.holdings() {
                    println!("{:<8} {:>6}", h.etf.ticker, format_percentage(h.allocation, 1));
                }
                println!("{}", p.validate().message(p.total_allocation()));
            })?;
        }
        Commands::Sitemap => {
            let catalog = Catalog::bundled()?;
            print!("{}", seo::sitemap_xml(&seo::sitemap(catalog.all(), &cfg.site_url, Utc::now())));
        }
        Commands::Backup(cmd) => {
            let mut store = LocalStore::new(&cfg.sqlite_path)?;
            let mut articles = ArticleStore::open(&cfg.blog_data_path)?;
            let mut console = AdminConsole::load(&mut store, &mut articles)?;
            if let Some(password) = console.take_generated_password() {
                eprintln!("credenziali admin generate: {}", password);
            }
            match cmd {
                BackupCommand::Export { path } => {
                    let body = backup::create_backup(&console).to_json()?;
                    match path {
                        Some(p) => {
                            std::fs::write(&p, &body).with_context(|| format!("write {}", p))?;
                            println!("{}  {}", backup::checksum(body.as_bytes()), p);
                        }
                        None => println!("{}", body),
                    }
                }
                BackupCommand::Restore { path } => {
                    let raw = std::fs::read_to_string(&path).with_context(|| format!("read {}", path))?;
                    let data = backup::validate_backup_str(&raw)?;
                    backup::restore(&mut console, data)?;
                    println!("backup ripristinato da {}", path);
                }
                BackupCommand::Undo => {
                    backup::undo_restore(&mut console)?;
                    println!("ripristino annullato");
                }
                BackupCommand::List => {
                    let list = backup::auto_backups(console.store())?;
                    emit(json, &list, |list| {
                        for (i, b) in list.iter().enumerate() {
                            println!("{}  {}", i, b.timestamp);
                        }
                    })?;
                }
            }
        }
        Commands::Blog(cmd) => {
            let mut articles = ArticleStore::open(&cfg.blog_data_path)?;
            match cmd {
                BlogCommand::Import => {
                    let integration = BlogIntegration::new(&cfg.generated_dir, &cfg.processed_dir);
                    let imported = integration.process_new_articles(&mut articles)?;
                    println!("{} articoli importati", imported);
                }
                BlogCommand::List => {
                    emit(json, &articles.all(), |list| {
                        for a in list.iter() {
                            let state = if a.published { "pubblicato" } else { "bozza" };
                            println!("{:<40} {:<11} {}", a.id, state, a.title);
                        }
                    })?;
                }
            }
        }
    }
    Ok(())
}
