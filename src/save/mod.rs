use crate::config::Config;
use anyhow::Context;
use anyhow::Result;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

/// Where statistics rows go: a header once, then one record per
/// window. File-backed for runs, in-memory for tests.
pub trait Sink {
    fn header(&mut self, columns: &[String]) -> Result<()>;
    fn record(&mut self, line: &str) -> Result<()>;
}

/// Buffered CSV file sink. Parent directories are created on demand.
pub struct Ledger {
    path: PathBuf,
    writer: std::io::BufWriter<std::fs::File>,
}

impl Ledger {
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("create {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: std::io::BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flush {}", self.path.display()))
    }
}

impl Sink for Ledger {
    fn header(&mut self, columns: &[String]) -> Result<()> {
        writeln!(self.writer, "{}", columns.join(","))
            .with_context(|| format!("write {}", self.path.display()))
    }
    fn record(&mut self, line: &str) -> Result<()> {
        writeln!(self.writer, "{}", line)
            .with_context(|| format!("write {}", self.path.display()))
    }
}

/// In-memory sink for assertions.
#[derive(Debug, Default)]
pub struct Tape {
    columns: Vec<String>,
    lines: Vec<String>,
}

impl Tape {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl Sink for Tape {
    fn header(&mut self, columns: &[String]) -> Result<()> {
        self.columns = columns.to_vec();
        Ok(())
    }
    fn record(&mut self, line: &str) -> Result<()> {
        self.lines.push(line.to_string());
        Ok(())
    }
}

/// Parameter-coded file stem for an evolutionary run.
pub fn run_name(config: &Config) -> String {
    format!(
        "steps-{}_population-{}_s-{}_mu-{}_p0-{}_tremble-{}_assessment-{}",
        config.steps,
        config.population,
        config.s,
        config.mu,
        config.p0,
        config.tremble,
        config.assessment
    )
}

/// Parameter-coded file stem for a training run.
pub fn training_name(config: &Config) -> String {
    let explore = match config.boltzmann {
        Some(beta) => format!("boltzmann-{}", beta),
        None => format!("epsilon-{}", config.epsilon),
    };
    format!(
        "episodes-{}_steps-{}_population-{}_alpha-{}_discount-{}_{}_batch-{}",
        config.episodes,
        config.steps,
        config.population,
        config.alpha,
        config.discount,
        explore,
        config.batch
    )
}

/// Where a run's CSV lands: `<out>/<norm>/<stem>.csv`.
pub fn run_path(config: &Config, norm: &str, stem: &str) -> PathBuf {
    Path::new(&config.out)
        .join(norm)
        .join(format!("{}.csv", stem))
}

/// Drop a JSON manifest of the configuration next to a results file.
pub fn manifest(config: &Config, results: &Path) -> Result<()> {
    let path = results.with_extension("json");
    let text = serde_json::to_string_pretty(config).context("serialize manifest")?;
    std::fs::write(&path, text).with_context(|| format!("write {}", path.display()))?;
    log::debug!("manifest {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(stem: &str) -> PathBuf {
        std::env::temp_dir().join(format!("reciprocity-{}-{}.csv", stem, std::process::id()))
    }

    #[test]
    fn ledger_writes_header_then_records() {
        let path = scratch("ledger");
        let mut ledger = Ledger::create(&path).unwrap();
        ledger
            .header(&["step".to_string(), "good".to_string()])
            .unwrap();
        ledger.record("0,0.500000").unwrap();
        ledger.record("100,0.620000").unwrap();
        ledger.flush().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "step,good\n0,0.500000\n100,0.620000\n");
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn tape_captures_everything_in_order() {
        let mut tape = Tape::new();
        tape.header(&["a".to_string(), "b".to_string()]).unwrap();
        tape.record("1,2").unwrap();
        tape.record("3,4").unwrap();
        assert_eq!(tape.columns(), ["a", "b"]);
        assert_eq!(tape.lines(), ["1,2", "3,4"]);
    }

    #[test]
    fn run_names_encode_the_parameters() {
        let mut config = Config::default();
        config.steps = 500;
        config.population = 32;
        config.s = 2.0;
        assert_eq!(
            run_name(&config),
            "steps-500_population-32_s-2_mu-0.001_p0-0.5_tremble-0.01_assessment-0.01"
        );
        config.boltzmann = Some(1.5);
        assert!(training_name(&config).contains("boltzmann-1.5"));
        config.boltzmann = None;
        assert!(training_name(&config).contains("epsilon-0.1"));
    }

    #[test]
    fn run_path_groups_by_norm() {
        let config = Config::default();
        let path = run_path(&config, "norm10", "stem");
        assert_eq!(path, Path::new("log").join("norm10").join("stem.csv"));
    }

    #[test]
    fn manifest_round_trips_the_config() {
        let path = scratch("manifest");
        let config = Config::default();
        manifest(&config, &path).unwrap();
        let sibling = path.with_extension("json");
        let text = std::fs::read_to_string(&sibling).unwrap();
        let back = serde_json::from_str::<Config>(&text).unwrap();
        assert_eq!(config, back);
        std::fs::remove_file(&sibling).unwrap();
    }
}
