use crate::COOPERATE;
use crate::FRACTION;
use crate::Probability;
use crate::REPUTATION;
use crate::Utility;
use crate::agent::player::Player;
use crate::agent::tables::StrategyTable;
use crate::config::Config;
use crate::game::role::Role;
use crate::matrix::matrix::PayoffMatrix;
use crate::matrix::matrix::RewardMatrix;
use crate::norm::Norm;
use crate::population::census::Census;
use crate::population::population::Population;
use crate::save::Sink;
use anyhow::Result;
use anyhow::ensure;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Probability that a focal agent copies a model agent under the Fermi
/// imitation rule with selection strength `s`.
pub fn fermi(focal: Utility, model: Utility, s: f64) -> Probability {
    1.0 / (1.0 + ((focal - model) * s).exp())
}

/// Imitation dynamics over a scripted population.
///
/// Each step snapshots the good-standing fraction, lets one focal pair
/// mutate or imitate a better-scoring model, then plays one observed
/// game whose verdict feeds back into reputations. Payoff comparisons
/// use the expected payoff against the current strategy mix, with the
/// donor role seeing the population fraction and the recipient role
/// seeing its own standing.
pub struct Evolution {
    config: Config,
    matrix: PayoffMatrix,
    rewards: RewardMatrix,
    norm: Norm,
    population: Population,
    rng: SmallRng,
    steps: usize,
    fraction: Probability,
    games: usize,
    cooperations: usize,
    gains: Utility,
}

impl Evolution {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let mut rng = SmallRng::from_os_rng();
        let donors = match &config.strategies {
            Some(dir) => StrategyTable::from_dir(
                std::path::Path::new(dir),
                Role::Donor,
                &["C", "DISC", "NDISC", "D"],
                &["C", "D"],
            )?,
            None => StrategyTable::donor(),
        };
        let recipients = match &config.strategies {
            Some(dir) => StrategyTable::from_dir(
                std::path::Path::new(dir),
                Role::Recipient,
                &["NR", "SR", "AR", "UR"],
                &["C", "D"],
            )?,
            None => StrategyTable::recipient(),
        };
        let mut matrix = match &config.matrix {
            Some(path) => PayoffMatrix::from_file(std::path::Path::new(path))?,
            None => PayoffMatrix::donation(),
        };
        let norm = match &config.norm_file {
            Some(path) => Norm::from_file(std::path::Path::new(path))?,
            None => Norm::from_id(config.norm),
        };
        let rows = matrix.rows().iter().map(|s| s.name().to_string()).collect::<Vec<_>>();
        let held = donors.strategies().iter().map(|s| s.name().to_string()).collect::<Vec<_>>();
        ensure!(
            rows == held,
            "payoff rows [{}] do not match donor strategies [{}]",
            rows.join(", "),
            held.join(", ")
        );
        let cols = matrix.cols().iter().map(|s| s.name().to_string()).collect::<Vec<_>>();
        let held = recipients.strategies().iter().map(|s| s.name().to_string()).collect::<Vec<_>>();
        ensure!(
            cols == held,
            "payoff columns [{}] do not match recipient strategies [{}]",
            cols.join(", "),
            held.join(", ")
        );
        let donor = Player::scripted("donor", Arc::new(donors), &rows[0])?;
        let recipient = Player::scripted("recipient", Arc::new(recipients), &cols[0])?;
        let population = Population::seeded(&donor, &recipient, config.population, config.p0, &mut rng)?;
        let fraction = population.fraction();
        matrix.set("b", config.b);
        matrix.set("beta", config.beta);
        matrix.set("c", config.c);
        matrix.set("gamma", config.gamma);
        matrix.set(FRACTION, fraction);
        matrix.evaluate()?;
        let mut rewards = RewardMatrix::donation();
        rewards.set("b", config.b);
        rewards.set("beta", config.beta);
        rewards.set("c", config.c);
        rewards.set("gamma", config.gamma);
        rewards.evaluate()?;
        Ok(Self {
            config,
            matrix,
            rewards,
            norm,
            population,
            rng,
            steps: 0,
            fraction,
            games: 0,
            cooperations: 0,
            gains: 0.0,
        })
    }

    /// One evolutionary step: snapshot the fraction, mutate or imitate,
    /// then play one observed game.
    pub fn step(&mut self) -> Result<()> {
        self.fraction = self.population.fraction();
        let focal = self.rng.random_range(0..self.population.len());
        if self.rng.random::<f64>() < self.config.mu {
            self.mutate(focal)?;
        } else {
            self.imitate(focal)?;
        }
        self.matrix.set(FRACTION, self.fraction);
        self.matrix.evaluate()?;
        self.play(focal)?;
        self.steps += 1;
        Ok(())
    }

    /// Run to completion, recording one census per window.
    pub fn run(&mut self, sink: &mut impl Sink) -> Result<()> {
        log::info!("evolving {} under {}", self.config, self.norm.name());
        sink.header(&Census::header(self.matrix.rows(), self.matrix.cols()))?;
        let mut clock = std::time::Instant::now();
        while self.steps < self.config.steps {
            if crate::interrupted() {
                log::warn!("interrupted at step {}", self.steps);
                break;
            }
            self.step()?;
            if self.steps % self.config.window == 0 {
                let census = self.census()?;
                sink.record(&census.line())?;
                log::debug!("{}", census);
                if clock.elapsed() > crate::RUN_LOG_INTERVAL {
                    log::info!("{}", census);
                    clock = std::time::Instant::now();
                }
                self.games = 0;
                self.cooperations = 0;
                self.gains = 0.0;
                self.population.reset_deltas();
            }
        }
        Ok(())
    }

    /// Expected payoff of pair `i` against the current strategy mix:
    /// donor-role games against every recipient bucket plus
    /// recipient-role games against every donor bucket, less half the
    /// self-pair payoff per role, averaged over the other pairs.
    fn average_payoff(&mut self, i: usize) -> Result<Utility> {
        let donor_env = BTreeMap::from([(FRACTION.to_string(), self.fraction)]);
        let recipient_env = BTreeMap::from([(
            FRACTION.to_string(),
            self.population.recipient(i).var(REPUTATION)?,
        )]);
        self.matrix.evaluate_for(&[donor_env, recipient_env])?;
        let di = self
            .population
            .donor(i)
            .strategy()
            .expect("imitation dynamics run scripted agents");
        let ri = self
            .population
            .recipient(i)
            .strategy()
            .expect("imitation dynamics run scripted agents");
        let mut total = 0.0;
        for (name, bucket) in self.population.buckets(Role::Recipient) {
            let col = self
                .matrix
                .cols()
                .iter()
                .find(|s| s.name() == name)
                .expect("bucket strategy sits on the matrix axis");
            total += bucket.len() as Utility * self.matrix.payoff(di, col)?[Role::Donor.index()];
        }
        for (name, bucket) in self.population.buckets(Role::Donor) {
            let row = self
                .matrix
                .rows()
                .iter()
                .find(|s| s.name() == name)
                .expect("bucket strategy sits on the matrix axis");
            total += bucket.len() as Utility * self.matrix.payoff(row, ri)?[Role::Recipient.index()];
        }
        let own = self.matrix.payoff(di, ri)?;
        total -= (own[Role::Donor.index()] + own[Role::Recipient.index()]) / 2.0;
        Ok(total / (self.population.len() - 1) as Utility)
    }

    /// Reassign the focal pair to a uniformly drawn different strategy pair.
    fn mutate(&mut self, focal: usize) -> Result<()> {
        let held = self.held(focal);
        loop {
            let d = self.draw(Role::Donor);
            let r = self.draw(Role::Recipient);
            if (d.as_str(), r.as_str()) != (held.0.as_str(), held.1.as_str()) {
                self.population.reassign(Role::Donor, focal, &d)?;
                self.population.reassign(Role::Recipient, focal, &r)?;
                return Ok(());
            }
        }
    }

    /// Compare the focal pair against a random model pair and copy its
    /// strategies with the Fermi probability.
    fn imitate(&mut self, focal: usize) -> Result<()> {
        let model = loop {
            let j = self.rng.random_range(0..self.population.len());
            if j != focal {
                break j;
            }
        };
        let mine = self.average_payoff(focal)?;
        let theirs = self.average_payoff(model)?;
        if self.rng.random::<f64>() < fermi(mine, theirs, self.config.s) {
            let held = self.held(model);
            self.population.reassign(Role::Donor, focal, &held.0)?;
            self.population.reassign(Role::Recipient, focal, &held.1)?;
        }
        Ok(())
    }

    /// One observed game between the focal pair and a random other,
    /// with a coin flip deciding who donates.
    fn play(&mut self, focal: usize) -> Result<()> {
        let other = loop {
            let j = self.rng.random_range(0..self.population.len());
            if j != focal {
                break j;
            }
        };
        let (di, ri) = if self.rng.random::<f64>() < 0.5 {
            (focal, other)
        } else {
            (other, focal)
        };
        let standing = crate::standing(self.population.recipient(ri).var(REPUTATION)?);
        let gift = self
            .population
            .donor_mut(di)
            .donate(standing, self.config.tremble)?;
        let back = self
            .population
            .recipient_mut(ri)
            .reward(gift.name(), self.config.tremble)?;
        let payout = self.rewards.payoff(&gift, &back)?;
        let (dg, rg) = (payout[Role::Donor.index()], payout[Role::Recipient.index()]);
        self.population.donor_mut(di).gain(dg);
        self.population.recipient_mut(ri).gain(rg);
        let verdict = self.norm.reputation(&gift, &back, self.config.assessment)?;
        self.population.restand(ri, verdict)?;
        self.games += 1;
        if gift.name() == COOPERATE {
            self.cooperations += 1;
        }
        self.gains += dg + rg;
        Ok(())
    }

    fn census(&mut self) -> Result<Census> {
        let cooperation = match self.games {
            0 => 0.0,
            n => self.cooperations as Probability / n as Probability,
        };
        let reward = match self.games {
            0 => 0.0,
            n => self.gains / n as Utility,
        };
        Census::take(
            self.steps,
            &mut self.population,
            self.matrix.rows(),
            self.matrix.cols(),
            cooperation,
            reward,
        )
    }

    fn held(&self, i: usize) -> (String, String) {
        let d = self
            .population
            .donor(i)
            .strategy()
            .expect("imitation dynamics run scripted agents");
        let r = self
            .population
            .recipient(i)
            .strategy()
            .expect("imitation dynamics run scripted agents");
        (d.name().to_string(), r.name().to_string())
    }

    fn draw(&mut self, role: Role) -> String {
        let axis = match role {
            Role::Donor => self.matrix.rows(),
            Role::Recipient => self.matrix.cols(),
        };
        axis[self.rng.random_range(0..axis.len())].name().to_string()
    }

    pub fn steps(&self) -> usize {
        self.steps
    }
    /// The good-standing fraction as of the start of the last step.
    pub fn fraction(&self) -> Probability {
        self.fraction
    }
    pub fn population(&self) -> &Population {
        &self.population
    }
    pub fn config(&self) -> &Config {
        &self.config
    }
    pub fn norm(&self) -> &Norm {
        &self.norm
    }
}

impl std::fmt::Display for Evolution {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} over {} pairs at step {} ({:.3} good)",
            self.norm.name(),
            self.population.len(),
            self.steps,
            self.population.fraction()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save::Tape;

    fn config() -> Config {
        let mut config = Config::default();
        config.population = 10;
        config.steps = 200;
        config.window = 50;
        config.tremble = 0.0;
        config.assessment = 0.0;
        config
    }

    #[test]
    fn fermi_is_balanced_at_parity() {
        assert_eq!(fermi(1.0, 1.0, 5.0), 0.5);
        assert_eq!(fermi(-2.0, -2.0, 0.1), 0.5);
        assert_eq!(fermi(3.0, -3.0, 0.0), 0.5);
    }

    #[test]
    fn fermi_favors_the_better_model() {
        assert!(fermi(0.0, 10.0, 1.0) > 0.999);
        assert!(fermi(10.0, 0.0, 1.0) < 0.001);
        assert!(fermi(0.0, 1.0, 10.0) > fermi(0.0, 1.0, 1.0));
    }

    #[test]
    fn seeding_snapshots_the_initial_fraction() {
        let mut config = config();
        config.p0 = 1.0;
        let engine = Evolution::new(config).unwrap();
        assert_eq!(engine.fraction(), 1.0);
        assert_eq!(engine.population().fraction(), 1.0);
    }

    #[test]
    fn payoffs_average_over_the_buckets() {
        let mut config = config();
        config.population = 4;
        config.p0 = 1.0;
        let mut engine = Evolution::new(config).unwrap();
        engine.population.reassign(Role::Donor, 0, "C").unwrap();
        for i in 1..4 {
            engine.population.reassign(Role::Donor, i, "D").unwrap();
        }
        for i in 0..4 {
            engine.population.reassign(Role::Recipient, i, "NR").unwrap();
        }
        // b 4, beta 3, c 1, gamma 1: C vs NR pays (-1, 4), D vs NR pays (0, 0).
        let focal = engine.average_payoff(0).unwrap();
        assert!((focal - (4.0 * -1.0 + 4.0 - (-1.0 + 4.0) / 2.0) / 3.0).abs() < 1e-9);
        assert!((focal + 0.5).abs() < 1e-9);
        let defector = engine.average_payoff(1).unwrap();
        assert!((defector - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn recipient_payoffs_follow_own_standing() {
        let mut config = config();
        config.population = 2;
        config.p0 = 1.0;
        let mut engine = Evolution::new(config).unwrap();
        for i in 0..2 {
            engine.population.reassign(Role::Donor, i, "DISC").unwrap();
            engine.population.reassign(Role::Recipient, i, "NR").unwrap();
        }
        engine.population.restand(1, crate::BAD).unwrap();
        engine.fraction = engine.population.fraction();
        assert_eq!(engine.fraction, 0.5);
        // donor sees r = 0.5; each recipient sees its own standing.
        let good = engine.average_payoff(0).unwrap();
        assert!((good - 5.25).abs() < 1e-9, "good-standing payoff {}", good);
        let bad = engine.average_payoff(1).unwrap();
        assert!((bad + 0.75).abs() < 1e-9, "bad-standing payoff {}", bad);
    }

    #[test]
    fn the_fraction_lags_the_population_within_a_step() {
        let mut config = config();
        config.population = 10;
        config.p0 = 1.0;
        config.norm = 0;
        config.mu = 0.0;
        let mut engine = Evolution::new(config).unwrap();
        engine.step().unwrap();
        assert_eq!(engine.fraction(), 1.0);
        assert_eq!(engine.population().fraction(), 0.9);
    }

    #[test]
    fn stepping_keeps_the_bucket_partition() {
        let mut engine = Evolution::new(config()).unwrap();
        for _ in 0..500 {
            engine.step().unwrap();
        }
        assert_eq!(engine.steps(), 500);
        assert!(engine.population().coherent());
    }

    #[test]
    fn mutation_always_moves_the_focal_pair() {
        let mut config = config();
        config.population = 2;
        config.mu = 1.0;
        let mut engine = Evolution::new(config).unwrap();
        let before = [engine.held(0), engine.held(1)];
        engine.step().unwrap();
        let after = [engine.held(0), engine.held(1)];
        let changed = (0..2).filter(|&i| before[i] != after[i]).count();
        assert_eq!(changed, 1);
        assert!(engine.population().coherent());
    }

    #[test]
    fn runs_record_one_census_per_window() {
        let mut engine = Evolution::new(config()).unwrap();
        let mut tape = Tape::new();
        engine.run(&mut tape).unwrap();
        assert_eq!(tape.columns().len(), 1 + 16 + 4 + 4 + 3);
        assert_eq!(tape.lines().len(), 4);
        let last = tape.lines().last().unwrap();
        let fields = last.split(',').collect::<Vec<&str>>();
        assert_eq!(fields[0], "200");
        let cooperation = fields[fields.len() - 2].parse::<f64>().unwrap();
        assert!((0.0..=1.0).contains(&cooperation));
    }

    #[test]
    fn unconditional_goodness_never_breaks_standing() {
        let mut config = config();
        config.norm = 15;
        config.p0 = 1.0;
        let mut engine = Evolution::new(config).unwrap();
        for _ in 0..100 {
            engine.step().unwrap();
        }
        assert_eq!(engine.population().fraction(), 1.0);
        assert_eq!(engine.population().good(), 10);
    }
}
