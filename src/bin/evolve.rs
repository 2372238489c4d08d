//! Fermi-dynamics driver.
//!
//! Runs imitation dynamics for one parameter set, or sweeps selection
//! strengths and norm ids in parallel, writing one CSV and one JSON
//! manifest per run. Type "Q" + Enter for a graceful stop.

use clap::Parser;
use colored::Colorize;
use rayon::iter::IntoParallelIterator;
use rayon::iter::ParallelIterator;
use reciprocity::config::Config;
use reciprocity::population::fermi::Evolution;
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
    /// imitation steps per run
    #[arg(long)]
    steps: Option<usize>,
    /// steps between statistics records
    #[arg(long)]
    window: Option<usize>,
    /// canonical norm id in 0..16
    #[arg(long)]
    norm: Option<usize>,
    /// initial good-standing probability
    #[arg(long)]
    p0: Option<f64>,
    /// selection strength
    #[arg(long)]
    s: Option<f64>,
    /// mutation probability
    #[arg(long)]
    mu: Option<f64>,
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
    /// payoff matrix file overriding the built-in donation game
    #[arg(long)]
    matrix: Option<String>,
    /// norm file overriding the canonical norm id
    #[arg(long)]
    norm_file: Option<String>,
    /// strategy table directory overriding the built-in sets
    #[arg(long)]
    strategies: Option<String>,
    /// results directory
    #[arg(long)]
    out: Option<String>,
    /// comma-separated selection strengths to sweep in parallel
    #[arg(long, value_delimiter = ',')]
    sweep: Vec<f64>,
    /// comma-separated norm ids to sweep in parallel
    #[arg(long, value_delimiter = ',')]
    norms: Vec<usize>,
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
        overlay!(window);
        overlay!(norm);
        overlay!(p0);
        overlay!(s);
        overlay!(mu);
        overlay!(tremble);
        overlay!(assessment);
        overlay!(b);
        overlay!(beta);
        overlay!(c);
        overlay!(gamma);
        overlay!(out);
        config.matrix = self.matrix.clone().or(config.matrix);
        config.norm_file = self.norm_file.clone().or(config.norm_file);
        config.strategies = self.strategies.clone().or(config.strategies);
        config
    }

    /// Every (norm, selection strength) combination requested.
    fn grid(&self, base: &Config) -> Vec<Config> {
        let norms = match self.norms.is_empty() {
            true => vec![base.norm],
            false => self.norms.clone(),
        };
        let strengths = match self.sweep.is_empty() {
            true => vec![base.s],
            false => self.sweep.clone(),
        };
        let mut grid = Vec::new();
        for &norm in &norms {
            for &s in &strengths {
                let mut config = base.clone();
                config.norm = norm;
                config.s = s;
                grid.push(config);
            }
        }
        grid
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
    let base = args.apply(base);
    base.validate().expect("valid parameters");
    let grid = args.grid(&base);
    log::info!("{} run(s) queued", grid.len());
    if grid.len() == 1 {
        finish(run(grid.into_iter().next().expect("one run")));
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_cpus::get())
            .build()
            .expect("build thread pool");
        pool.install(|| {
            grid.into_par_iter().for_each(|config| finish(run(config)));
        });
    }
}

fn run(config: Config) -> anyhow::Result<std::path::PathBuf> {
    let mut engine = Evolution::new(config.clone())?;
    let stem = save::run_name(&config);
    let path = save::run_path(&config, engine.norm().name(), &stem);
    let mut ledger = save::Ledger::create(&path)?;
    save::manifest(&config, &path)?;
    engine.run(&mut ledger)?;
    ledger.flush()?;
    log::info!("{}", engine);
    Ok(path)
}

fn finish(outcome: anyhow::Result<std::path::PathBuf>) {
    match outcome {
        Ok(path) => log::info!("{} {}", "done".green(), path.display()),
        Err(e) => log::error!("{} {:#}", "failed".red(), e),
    }
}
