use super::tables::StrategyTable;
use crate::Probability;
use crate::Utility;
use crate::game::strategy::Strategy;
use crate::learning::qtable::QTable;
use std::sync::Arc;

/// How exploration perturbs a learner's greedy choice. Fixed per run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Exploration {
    /// With probability epsilon, act uniformly instead of greedily.
    EpsilonGreedy(Probability),
    /// Sample the softmax of Q-values at inverse temperature beta.
    Boltzmann(Utility),
}

impl std::fmt::Display for Exploration {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::EpsilonGreedy(epsilon) => write!(f, "epsilon-greedy({})", epsilon),
            Self::Boltzmann(beta) => write!(f, "boltzmann({})", beta),
        }
    }
}

/// What drives an agent's decisions, chosen once at construction.
/// Scripted agents read an immutable strategy table shared across the
/// population; learners own a Q-table and an exploration rule.
#[derive(Debug)]
pub enum Policy {
    Scripted {
        tables: Arc<StrategyTable>,
        assigned: Strategy,
    },
    Learner {
        qtable: QTable,
        exploration: Exploration,
    },
}

impl Policy {
    /// A fresh copy of the same decision rule drawing its own randomness.
    pub fn replicate(&self) -> Self {
        match self {
            Self::Scripted { tables, assigned } => Self::Scripted {
                tables: Arc::clone(tables),
                assigned: assigned.clone(),
            },
            Self::Learner {
                qtable,
                exploration,
            } => Self::Learner {
                qtable: qtable.replicate(),
                exploration: *exploration,
            },
        }
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Scripted { assigned, .. } => write!(f, "scripted({})", assigned),
            Self::Learner { exploration, .. } => write!(f, "learner({})", exploration),
        }
    }
}
