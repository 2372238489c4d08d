use anyhow::Context;
use anyhow::Result;
use anyhow::ensure;
use serde::Deserialize;
use serde::Serialize;

/// Every knob a run needs, in one immutable place. Drivers build one
/// from flags, engines borrow it, and each run writes it back out as a
/// JSON manifest so results stay reproducible.
///
/// The donation-game parameters default to `b > c` and `beta > gamma`,
/// the regime where giving is socially efficient but individually
/// costly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of donor/recipient agent pairs.
    pub population: usize,
    /// Imitation steps per evolutionary run.
    pub steps: usize,
    /// Training episodes per learning run.
    pub episodes: usize,
    /// Steps between statistics records.
    pub window: usize,
    /// Canonical norm id in 0..16.
    pub norm: usize,
    /// Probability an initial reputation is good.
    pub p0: f64,
    /// Selection strength of the Fermi rule.
    pub s: f64,
    /// Mutation probability per imitation step.
    pub mu: f64,
    /// Probability a chosen action slips to another one.
    pub tremble: f64,
    /// Probability the norm misjudges an interaction.
    pub assessment: f64,
    /// Benefit handed to the recipient by a donation.
    pub b: f64,
    /// Benefit handed back to the donor by reciprocation.
    pub beta: f64,
    /// Cost of donating.
    pub c: f64,
    /// Cost of reciprocating.
    pub gamma: f64,
    /// Q-learning step size.
    pub alpha: f64,
    /// Q-learning discount factor.
    pub discount: f64,
    /// Exploration rate for epsilon-greedy learners.
    pub epsilon: f64,
    /// Inverse temperature for Boltzmann learners. None selects
    /// epsilon-greedy exploration.
    pub boltzmann: Option<f64>,
    /// Replay buffer capacity per agent and role.
    pub capacity: usize,
    /// Replay batch size per update.
    pub batch: usize,
    /// Payoff matrix definition file. None selects the built-in
    /// donation game.
    pub matrix: Option<String>,
    /// Norm definition file. None selects the canonical norm id.
    pub norm_file: Option<String>,
    /// Strategy table directory. None selects the built-in tables.
    pub strategies: Option<String>,
    /// Directory results are written under.
    pub out: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            population: 100,
            steps: 100_000,
            episodes: 1_000,
            window: 100,
            norm: 10,
            p0: 0.5,
            s: 1.0,
            mu: 0.001,
            tremble: 0.01,
            assessment: 0.01,
            b: 4.0,
            beta: 3.0,
            c: 1.0,
            gamma: 1.0,
            alpha: 0.1,
            discount: 0.0,
            epsilon: 0.1,
            boltzmann: None,
            capacity: 1_000,
            batch: 32,
            matrix: None,
            norm_file: None,
            strategies: None,
            out: "log".to_string(),
        }
    }
}

impl Config {
    /// Read a configuration from a JSON file. Missing fields take
    /// their defaults.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let config = serde_json::from_str::<Self>(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameter combinations no run can make sense of.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.population >= 2, "population {} below two pairs", self.population);
        ensure!(self.steps >= 1, "steps must be positive");
        ensure!(self.episodes >= 1, "episodes must be positive");
        ensure!(
            (1..=self.steps).contains(&self.window),
            "window {} outside 1..={}",
            self.window,
            self.steps
        );
        ensure!(self.norm < crate::norm::Norm::COUNT, "norm id {} out of range", self.norm);
        for (name, value) in [
            ("p0", self.p0),
            ("mu", self.mu),
            ("tremble", self.tremble),
            ("assessment", self.assessment),
            ("epsilon", self.epsilon),
            ("discount", self.discount),
        ] {
            ensure!((0.0..=1.0).contains(&value), "{} = {} outside [0, 1]", name, value);
        }
        ensure!(self.alpha > 0.0 && self.alpha <= 1.0, "alpha = {} outside (0, 1]", self.alpha);
        ensure!(self.s.is_finite() && self.s >= 0.0, "selection strength {} invalid", self.s);
        for (name, value) in [("b", self.b), ("beta", self.beta), ("c", self.c), ("gamma", self.gamma)]
        {
            ensure!(value.is_finite(), "{} = {} is not finite", name, value);
        }
        if let Some(beta) = self.boltzmann {
            ensure!(beta.is_finite() && beta >= 0.0, "boltzmann beta {} invalid", beta);
        }
        ensure!(self.capacity >= 1, "capacity must be positive");
        ensure!(
            (1..=self.capacity).contains(&self.batch),
            "batch {} outside 1..={}",
            self.batch,
            self.capacity
        );
        Ok(())
    }
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "norm {} population {} s {} mu {} p0 {} tremble {} assessment {} b {} beta {} c {} gamma {}",
            self.norm,
            self.population,
            self.s,
            self.mu,
            self.p0,
            self.tremble,
            self.assessment,
            self.b,
            self.beta,
            self.c,
            self.gamma
        )
    }
}
