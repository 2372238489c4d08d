use super::policy::Exploration;
use super::policy::Policy;
use super::tables::StrategyTable;
use crate::Probability;
use crate::Utility;
use crate::game::action::Action;
use crate::game::role::Role;
use crate::game::strategy::Strategy;
use crate::game::transition::Transition;
use crate::learning::qtable::QTable;
use anyhow::Result;
use anyhow::bail;
use anyhow::ensure;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One agent seated on one side of the stage game.
///
/// A player decides through its policy (scripted table or Q-table),
/// slips to a uniformly random different action with the trembling-hand
/// probability passed per decision, keeps a running payoff ledger, and
/// carries named variables (its standing, among anything else a payoff
/// matrix wants to read). Every player owns its generator; `replicate`
/// copies everything but draws fresh randomness.
#[derive(Debug)]
pub struct Player {
    name: String,
    role: Role,
    policy: Policy,
    vars: BTreeMap<String, f64>,
    score: Utility,
    delta: Utility,
    rng: SmallRng,
}

impl Player {
    /// A scripted player following one strategy from a shared table set.
    pub fn scripted(name: &str, tables: Arc<StrategyTable>, initial: &str) -> Result<Self> {
        let assigned = tables.strategy(initial)?.clone();
        Ok(Self {
            name: name.to_string(),
            role: tables.role(),
            policy: Policy::Scripted { tables, assigned },
            vars: BTreeMap::new(),
            score: 0.0,
            delta: 0.0,
            rng: SmallRng::from_os_rng(),
        })
    }

    /// A learning player following its own Q-table.
    pub fn learner(name: &str, role: Role, qtable: QTable, exploration: Exploration) -> Self {
        Self {
            name: name.to_string(),
            role,
            policy: Policy::Learner {
                qtable,
                exploration,
            },
            vars: BTreeMap::new(),
            score: 0.0,
            delta: 0.0,
            rng: SmallRng::from_os_rng(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn role(&self) -> Role {
        self.role
    }

    /// Declare a variable. Redeclaring one is a data error.
    pub fn add(&mut self, name: &str, value: f64) -> Result<()> {
        ensure!(
            !self.vars.contains_key(name),
            "variable '{}' declared twice on {}",
            name,
            self.name
        );
        self.vars.insert(name.to_string(), value);
        Ok(())
    }

    /// Reassign a declared variable. Unknown names are data errors.
    pub fn update(&mut self, name: &str, value: f64) -> Result<()> {
        match self.vars.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => bail!("variable '{}' not declared on {}", name, self.name),
        }
    }

    /// Read a declared variable.
    pub fn var(&self, name: &str) -> Result<f64> {
        match self.vars.get(name) {
            Some(value) => Ok(*value),
            None => bail!("variable '{}' not declared on {}", name, self.name),
        }
    }

    pub fn vars(&self) -> &BTreeMap<String, f64> {
        &self.vars
    }

    /// Choose the donor move given the recipient's standing.
    pub fn donate(&mut self, standing: &str, tremble: Probability) -> Result<Action> {
        assert!(self.role == Role::Donor, "{} is not seated as donor", self.name);
        self.decide(standing, tremble)
    }

    /// Choose the recipient response given the donor's observed move.
    pub fn reward(&mut self, observed: &str, tremble: Probability) -> Result<Action> {
        assert!(
            self.role == Role::Recipient,
            "{} is not seated as recipient",
            self.name
        );
        self.decide(observed, tremble)
    }

    fn decide(&mut self, input: &str, tremble: Probability) -> Result<Action> {
        let intended = match &mut self.policy {
            Policy::Scripted { tables, assigned } => {
                tables.lookup(assigned.name(), &[input])?.clone()
            }
            Policy::Learner {
                qtable,
                exploration,
            } => match exploration {
                Exploration::EpsilonGreedy(epsilon) => {
                    if self.rng.random::<f64>() < *epsilon {
                        let j = self.rng.random_range(0..qtable.actions().len());
                        Action::new(qtable.actions()[j].as_str(), j)
                    } else {
                        qtable.best(input)?
                    }
                }
                Exploration::Boltzmann(beta) => qtable.boltzmann(input, *beta)?,
            },
        };
        self.deviate(intended, tremble)
    }

    /// Trembling hand: with the given probability, slip to a uniformly
    /// random different action.
    fn deviate(&mut self, intended: Action, tremble: Probability) -> Result<Action> {
        if self.rng.random::<f64>() < tremble {
            let others = self
                .actions()
                .into_iter()
                .filter(|a| a.name() != intended.name())
                .collect::<Vec<_>>();
            if others.is_empty() {
                return Ok(intended);
            }
            Ok(others[self.rng.random_range(0..others.len())].clone())
        } else {
            Ok(intended)
        }
    }

    /// The action set this player draws from.
    pub fn actions(&self) -> Vec<Action> {
        match &self.policy {
            Policy::Scripted { tables, .. } => tables.actions().to_vec(),
            Policy::Learner { qtable, .. } => qtable
                .actions()
                .iter()
                .enumerate()
                .map(|(id, name)| Action::new(name, id))
                .collect(),
        }
    }

    /// The scripted assignment, if any.
    pub fn strategy(&self) -> Option<&Strategy> {
        match &self.policy {
            Policy::Scripted { assigned, .. } => Some(assigned),
            Policy::Learner { .. } => None,
        }
    }

    /// The scripted strategies available to this player, if any.
    pub fn strategies(&self) -> Option<&[Strategy]> {
        match &self.policy {
            Policy::Scripted { tables, .. } => Some(tables.strategies()),
            Policy::Learner { .. } => None,
        }
    }

    /// Reassign a scripted player and return the strategy it held.
    pub fn adopt(&mut self, name: &str) -> Result<Strategy> {
        match &mut self.policy {
            Policy::Scripted { tables, assigned } => {
                let next = tables.strategy(name)?.clone();
                Ok(std::mem::replace(assigned, next))
            }
            Policy::Learner { .. } => bail!("{} learns rather than adopts", self.name),
        }
    }

    /// Replay a batch of experiences through the Q-table.
    pub fn learn(&mut self, batch: &[Transition], alpha: f64, discount: f64) -> Result<()> {
        match &mut self.policy {
            Policy::Learner { qtable, .. } => {
                for t in batch {
                    qtable.update(t, alpha, discount)?;
                }
                Ok(())
            }
            Policy::Scripted { .. } => bail!("{} is scripted and does not learn", self.name),
        }
    }

    /// The strategy this player effectively follows: the assignment for
    /// scripted players, the greedy readout of the Q-table for learners.
    pub fn classify(&mut self) -> Result<Strategy> {
        match &mut self.policy {
            Policy::Scripted { assigned, .. } => Ok(assigned.clone()),
            Policy::Learner { qtable, .. } => match self.role {
                Role::Donor => {
                    let bad = qtable.best("0")?;
                    let good = qtable.best("1")?;
                    match (bad.name(), good.name()) {
                        ("C", "C") => Ok(Strategy::new("C", 0)),
                        ("D", "C") => Ok(Strategy::new("DISC", 1)),
                        ("C", "D") => Ok(Strategy::new("NDISC", 2)),
                        ("D", "D") => Ok(Strategy::new("D", 3)),
                        (b, g) => bail!("donor preferring {} then {} has no name", b, g),
                    }
                }
                Role::Recipient => {
                    let after_c = qtable.best("C")?;
                    let after_d = qtable.best("D")?;
                    match (after_c.name(), after_d.name()) {
                        ("D", "D") => Ok(Strategy::new("NR", 0)),
                        ("C", "D") => Ok(Strategy::new("SR", 1)),
                        ("D", "C") => Ok(Strategy::new("AR", 2)),
                        ("C", "C") => Ok(Strategy::new("UR", 3)),
                        (c, d) => bail!("recipient answering {} then {} has no name", c, d),
                    }
                }
            },
        }
    }

    /// Credit a payoff to the running ledgers.
    pub fn gain(&mut self, payoff: Utility) {
        self.score += payoff;
        self.delta += payoff;
    }
    /// Lifetime payoff.
    pub fn score(&self) -> Utility {
        self.score
    }
    /// Payoff since the last window reset.
    pub fn delta(&self) -> Utility {
        self.delta
    }
    pub fn reset_delta(&mut self) {
        self.delta = 0.0;
    }

    /// The learner's table, if any.
    pub fn qtable(&self) -> Option<&QTable> {
        match &self.policy {
            Policy::Learner { qtable, .. } => Some(qtable),
            Policy::Scripted { .. } => None,
        }
    }

    /// A fresh copy of this player drawing its own randomness.
    pub fn replicate(&self) -> Self {
        Self {
            name: self.name.clone(),
            role: self.role,
            policy: self.policy.replicate(),
            vars: self.vars.clone(),
            score: self.score,
            delta: self.delta,
            rng: SmallRng::from_os_rng(),
        }
    }
}

impl std::fmt::Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} [{} {}]", self.name, self.role, self.policy)
    }
}
