//! Q-learning driver.
//!
//! Trains a population of tabular learners for one parameter set,
//! writing a CSV of per-episode statistics, a JSON manifest, and
//! binary snapshots of representative tables. Type "Q" + Enter for a
//! graceful stop.

use clap::Parser;
use colored::Colorize;
use reciprocity::config::Config;
use reciprocity::population::qlearning::Training;
use reciprocity::save;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON file providing the base parameters
    #[arg(long)]
    config: Option<String>,
    /// number of donor/recipient pairs
    #[arg(long)]
    population: Option<usize>,
    /// games per episode
    #[arg(long)]
    steps: Option<usize>,
    /// training episodes
    #[arg(long)]
    episodes: Option<usize>,
    /// canonical norm id in 0..16
    #[arg(long)]
    norm: Option<usize>,
    /// initial good-standing probability
    #[arg(long)]
    p0: Option<f64>,
    /// action slip probability
    #[arg(long)]
    tremble: Option<f64>,
    /// norm misjudgment probability
    #[arg(long)]
    assessment: Option<f64>,
    /// donation benefit
    #[arg(long)]
    b: Option<f64>,
    /// reciprocation benefit
    #[arg(long)]
    beta: Option<f64>,
    /// donation cost
    #[arg(long)]
    c: Option<f64>,
    /// reciprocation cost
    #[arg(long)]
    gamma: Option<f64>,
    /// learning rate
    #[arg(long)]
    alpha: Option<f64>,
    /// discount factor
    #[arg(long)]
    discount: Option<f64>,
    /// epsilon-greedy exploration rate
    #[arg(long)]
    epsilon: Option<f64>,
    /// Boltzmann inverse temperature, replacing epsilon-greedy
    #[arg(long)]
    boltzmann: Option<f64>,
    /// replay capacity per agent and role
    #[arg(long)]
    capacity: Option<usize>,
    /// replay batch size
    #[arg(long)]
    batch: Option<usize>,
    /// norm file overriding the canonical norm id
    #[arg(long)]
    norm_file: Option<String>,
    /// results directory
    #[arg(long)]
    out: Option<String>,
}

impl Args {
    fn apply(&self, mut config: Config) -> Config {
        macro_rules! overlay {
            ($field:ident) => {
                if let Some(value) = self.$field.clone() {
                    config.$field = value;
                }
            };
        }
        overlay!(population);
        overlay!(steps);
        overlay!(episodes);
        overlay!(norm);
        overlay!(p0);
        overlay!(tremble);
        overlay!(assessment);
        overlay!(b);
        overlay!(beta);
        overlay!(c);
        overlay!(gamma);
        overlay!(alpha);
        overlay!(discount);
        overlay!(epsilon);
        overlay!(capacity);
        overlay!(batch);
        overlay!(out);
        config.boltzmann = self.boltzmann.or(config.boltzmann);
        config.norm_file = self.norm_file.clone().or(config.norm_file);
        config
    }
}

fn main() {
    let args = Args::parse();
    reciprocity::log();
    reciprocity::brb();
    let base = match &args.config {
        Some(path) => Config::load(std::path::Path::new(path)).expect("load config"),
        None => Config::default(),
    };
    let config = args.apply(base);
    config.validate().expect("valid parameters");
    match run(config) {
        Ok(path) => log::info!("{} {}", "done".green(), path.display()),
        Err(e) => log::error!("{} {:#}", "failed".red(), e),
    }
}

fn run(config: Config) -> anyhow::Result<std::path::PathBuf> {
    let mut training = Training::new(config.clone())?;
    let stem = save::training_name(&config);
    let path = save::run_path(&config, training.norm().name(), &stem);
    let mut ledger = save::Ledger::create(&path)?;
    save::manifest(&config, &path)?;
    training.run(&mut ledger)?;
    ledger.flush()?;
    training.snapshot(&path.with_extension("").to_string_lossy());
    if let Some(table) = training.population().donor(0).qtable() {
        log::info!("donor 0\n{}", table);
    }
    if let Some(table) = training.population().recipient(0).qtable() {
        log::info!("recipient 0\n{}", table);
    }
    log::info!("{}", training);
    Ok(path)
}
