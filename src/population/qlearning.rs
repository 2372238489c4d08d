use crate::COOPERATE;
use crate::Probability;
use crate::REPUTATION;
use crate::Utility;
use crate::agent::player::Player;
use crate::agent::policy::Exploration;
use crate::agent::tables::StrategyTable;
use crate::config::Config;
use crate::game::role::Role;
use crate::game::strategy::Strategy;
use crate::game::transition::Transition;
use crate::learning::buffer::ReplayBuffer;
use crate::learning::qtable::QTable;
use crate::matrix::matrix::RewardMatrix;
use crate::norm::Norm;
use crate::population::census::Census;
use crate::population::population::Population;
use crate::save::Sink;
use anyhow::Result;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Episodic Q-learning over a population of learner pairs.
///
/// Every game draws a donor and a recipient uniformly, plays one stage
/// game under the learners' exploration policies, pushes both
/// experiences into per-agent replay pools, and replays a uniform
/// batch through each participant's table once enough experience has
/// accumulated. Pools are cleared between episodes.
pub struct Training {
    config: Config,
    rewards: RewardMatrix,
    norm: Norm,
    population: Population,
    buffer: ReplayBuffer,
    donors: Vec<Strategy>,
    recipients: Vec<Strategy>,
    rng: SmallRng,
    episodes: usize,
    games: usize,
    cooperations: usize,
    gains: Utility,
}

impl Training {
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let mut rng = SmallRng::from_os_rng();
        let exploration = match config.boltzmann {
            Some(beta) => Exploration::Boltzmann(beta),
            None => Exploration::EpsilonGreedy(config.epsilon),
        };
        let donor = Player::learner(
            "donor",
            Role::Donor,
            QTable::new(&["0", "1"], &["C", "D"]),
            exploration,
        );
        let recipient = Player::learner(
            "recipient",
            Role::Recipient,
            QTable::new(&["C", "D"], &["C", "D"]),
            exploration,
        );
        let population =
            Population::seeded(&donor, &recipient, config.population, config.p0, &mut rng)?;
        let norm = match &config.norm_file {
            Some(path) => Norm::from_file(std::path::Path::new(path))?,
            None => Norm::from_id(config.norm),
        };
        let mut rewards = RewardMatrix::donation();
        rewards.set("b", config.b);
        rewards.set("beta", config.beta);
        rewards.set("c", config.c);
        rewards.set("gamma", config.gamma);
        rewards.evaluate()?;
        let buffer = ReplayBuffer::new(config.population, config.capacity);
        Ok(Self {
            buffer,
            rewards,
            norm,
            population,
            donors: StrategyTable::donor().strategies().to_vec(),
            recipients: StrategyTable::recipient().strategies().to_vec(),
            rng,
            episodes: 0,
            games: 0,
            cooperations: 0,
            gains: 0.0,
            config,
        })
    }

    /// One episode: a fresh replay buffer and `steps` games.
    pub fn episode(&mut self) -> Result<()> {
        self.buffer.clear();
        for _ in 0..self.config.steps {
            self.game()?;
        }
        self.episodes += 1;
        Ok(())
    }

    /// Run every episode, recording one census per episode.
    pub fn run(&mut self, sink: &mut impl Sink) -> Result<()> {
        log::info!("training {} under {}", self.config, self.norm.name());
        sink.header(&Census::header(&self.donors, &self.recipients))?;
        let mut clock = std::time::Instant::now();
        while self.episodes < self.config.episodes {
            if crate::interrupted() {
                log::warn!("interrupted at episode {}", self.episodes);
                break;
            }
            self.episode()?;
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
        Ok(())
    }

    /// One stage game between independently drawn donor and recipient.
    fn game(&mut self) -> Result<()> {
        let di = self.rng.random_range(0..self.population.len());
        let ri = self.rng.random_range(0..self.population.len());
        let before = crate::standing(self.population.recipient(ri).var(REPUTATION)?);
        let gift = self
            .population
            .donor_mut(di)
            .donate(before, self.config.tremble)?;
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
        // the donor's state is the standing it observed; the recipient's
        // is the move it faced, standing in for an unknowable successor.
        self.buffer.add(
            Role::Donor,
            di,
            Transition::new(before, gift.clone(), dg, crate::standing(verdict)),
        );
        self.buffer.add(
            Role::Recipient,
            ri,
            Transition::new(gift.name(), back.clone(), rg, gift.name()),
        );
        if self.buffer.len(Role::Donor, di) >= self.config.batch {
            let batch = self.buffer.sample(Role::Donor, di, self.config.batch);
            self.population
                .donor_mut(di)
                .learn(&batch, self.config.alpha, self.config.discount)?;
        }
        if self.buffer.len(Role::Recipient, ri) >= self.config.batch {
            let batch = self.buffer.sample(Role::Recipient, ri, self.config.batch);
            self.population
                .recipient_mut(ri)
                .learn(&batch, self.config.alpha, self.config.discount)?;
        }
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
            self.episodes,
            &mut self.population,
            &self.donors,
            &self.recipients,
            cooperation,
            reward,
        )
    }

    /// Persist representative tables under `<stem>-donor` / `<stem>-recipient`.
    pub fn snapshot(&self, stem: &str) {
        if let Some(table) = self.population.donor(0).qtable() {
            table.save(&format!("{}-donor", stem));
        }
        if let Some(table) = self.population.recipient(0).qtable() {
            table.save(&format!("{}-recipient", stem));
        }
    }

    pub fn episodes(&self) -> usize {
        self.episodes
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

impl std::fmt::Display for Training {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} learners after {} episodes ({:.3} good)",
            self.population.len(),
            self.episodes,
            self.population.fraction()
        )
    }
}
