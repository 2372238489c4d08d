use crate::GOOD;
use crate::Probability;
use crate::REPUTATION;
use crate::Reputation;
use crate::agent::player::Player;
use crate::game::role::Role;
use anyhow::Result;
use anyhow::ensure;
use rand::Rng;
use rand::rngs::SmallRng;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// A well-mixed population of agent pairs: one donor and one recipient
/// persona per index.
///
/// Scripted populations additionally maintain strategy buckets, one set
/// of agent indices per strategy name and role. The buckets partition
/// the population at all times: reassignment moves an index between
/// buckets atomically. A running counter tracks how many recipients
/// stand in good repute so the fraction is O(1) to read.
#[derive(Debug)]
pub struct Population {
    donors: Vec<Player>,
    recipients: Vec<Player>,
    donor_buckets: BTreeMap<String, BTreeSet<usize>>,
    recipient_buckets: BTreeMap<String, BTreeSet<usize>>,
    good: usize,
}

impl Population {
    /// Replicate a template pair into `count` agent pairs. Scripted
    /// replicas draw a uniform initial strategy; every recipient is
    /// seeded with a standing, good with probability `p0`.
    pub fn seeded(
        donor: &Player,
        recipient: &Player,
        count: usize,
        p0: Probability,
        rng: &mut SmallRng,
    ) -> Result<Self> {
        ensure!(count >= 2, "population needs at least two agent pairs");
        ensure!(
            (0.0..=1.0).contains(&p0),
            "initial good fraction {} out of range",
            p0
        );
        let mut donors = Vec::with_capacity(count);
        let mut recipients = Vec::with_capacity(count);
        let mut donor_buckets: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
        let mut recipient_buckets: BTreeMap<String, BTreeSet<usize>> = BTreeMap::new();
        let mut good = 0;
        for i in 0..count {
            let mut d = donor.replicate();
            let mut r = recipient.replicate();
            let pick = d
                .strategies()
                .map(|s| s[rng.random_range(0..s.len())].name().to_string());
            if let Some(name) = pick {
                d.adopt(&name)?;
                donor_buckets.entry(name).or_default().insert(i);
            }
            let pick = r
                .strategies()
                .map(|s| s[rng.random_range(0..s.len())].name().to_string());
            if let Some(name) = pick {
                r.adopt(&name)?;
                recipient_buckets.entry(name).or_default().insert(i);
            }
            let standing = if rng.random::<f64>() < p0 { GOOD } else { crate::BAD };
            match r.var(REPUTATION) {
                Ok(_) => r.update(REPUTATION, standing)?,
                Err(_) => r.add(REPUTATION, standing)?,
            }
            if standing == GOOD {
                good += 1;
            }
            donors.push(d);
            recipients.push(r);
        }
        Ok(Self {
            donors,
            recipients,
            donor_buckets,
            recipient_buckets,
            good,
        })
    }

    pub fn len(&self) -> usize {
        self.donors.len()
    }
    pub fn is_empty(&self) -> bool {
        self.donors.is_empty()
    }

    pub fn donor(&self, i: usize) -> &Player {
        assert!(i < self.donors.len(), "donor index {} out of range", i);
        &self.donors[i]
    }
    pub fn donor_mut(&mut self, i: usize) -> &mut Player {
        assert!(i < self.donors.len(), "donor index {} out of range", i);
        &mut self.donors[i]
    }
    pub fn recipient(&self, i: usize) -> &Player {
        assert!(i < self.recipients.len(), "recipient index {} out of range", i);
        &self.recipients[i]
    }
    pub fn recipient_mut(&mut self, i: usize) -> &mut Player {
        assert!(i < self.recipients.len(), "recipient index {} out of range", i);
        &mut self.recipients[i]
    }

    /// How many recipients stand in good repute.
    pub fn good(&self) -> usize {
        self.good
    }
    /// The good-standing fraction of the population.
    pub fn fraction(&self) -> Probability {
        self.good as Probability / self.len() as Probability
    }

    /// Update a recipient's standing, keeping the good counter in step.
    pub fn restand(&mut self, i: usize, standing: Reputation) -> Result<()> {
        assert!(
            standing == GOOD || standing == crate::BAD,
            "standing must be GOOD or BAD"
        );
        let old = self.recipient(i).var(REPUTATION)?;
        self.recipient_mut(i).update(REPUTATION, standing)?;
        if old == GOOD && standing != GOOD {
            self.good -= 1;
        }
        if old != GOOD && standing == GOOD {
            self.good += 1;
        }
        Ok(())
    }

    /// Reassign a scripted agent's strategy, moving it between buckets.
    pub fn reassign(&mut self, role: Role, i: usize, name: &str) -> Result<()> {
        let (players, buckets) = match role {
            Role::Donor => (&mut self.donors, &mut self.donor_buckets),
            Role::Recipient => (&mut self.recipients, &mut self.recipient_buckets),
        };
        assert!(i < players.len(), "agent index {} out of range", i);
        let old = players[i].adopt(name)?;
        if old.name() != name {
            let moved = buckets
                .get_mut(old.name())
                .map(|bucket| bucket.remove(&i))
                .unwrap_or(false);
            assert!(moved, "agent {} was not in bucket {}", i, old.name());
            buckets.entry(name.to_string()).or_default().insert(i);
        }
        Ok(())
    }

    /// How many agents of a role currently hold this strategy.
    pub fn bucket(&self, role: Role, name: &str) -> usize {
        let buckets = match role {
            Role::Donor => &self.donor_buckets,
            Role::Recipient => &self.recipient_buckets,
        };
        buckets.get(name).map(|b| b.len()).unwrap_or(0)
    }

    pub fn buckets(&self, role: Role) -> &BTreeMap<String, BTreeSet<usize>> {
        match role {
            Role::Donor => &self.donor_buckets,
            Role::Recipient => &self.recipient_buckets,
        }
    }

    /// Count the (donor strategy, recipient strategy) pairs held by
    /// scripted agent pairs.
    pub fn pairs(&self) -> BTreeMap<(String, String), usize> {
        let mut counts = BTreeMap::new();
        for i in 0..self.len() {
            if let (Some(d), Some(r)) = (self.donors[i].strategy(), self.recipients[i].strategy())
            {
                *counts
                    .entry((d.name().to_string(), r.name().to_string()))
                    .or_insert(0) += 1;
            }
        }
        counts
    }

    /// Zero every agent's window ledger.
    pub fn reset_deltas(&mut self) {
        for player in self.donors.iter_mut().chain(self.recipients.iter_mut()) {
            player.reset_delta();
        }
    }

    /// Whether the bookkeeping invariants hold: buckets partition each
    /// scripted role, and the good counter matches a full recount.
    pub fn coherent(&self) -> bool {
        let scripted = self.donors.first().map(|d| d.strategy().is_some()).unwrap_or(false);
        let donors = self.donor_buckets.values().map(|b| b.len()).sum::<usize>();
        let recipients = self.recipient_buckets.values().map(|b| b.len()).sum::<usize>();
        let partition = if scripted {
            donors == self.len()
                && recipients == self.len()
                && self.donors.iter().enumerate().all(|(i, d)| {
                    d.strategy()
                        .map(|s| {
                            self.donor_buckets
                                .get(s.name())
                                .map(|b| b.contains(&i))
                                .unwrap_or(false)
                        })
                        .unwrap_or(false)
                })
                && self.recipients.iter().enumerate().all(|(i, r)| {
                    r.strategy()
                        .map(|s| {
                            self.recipient_buckets
                                .get(s.name())
                                .map(|b| b.contains(&i))
                                .unwrap_or(false)
                        })
                        .unwrap_or(false)
                })
        } else {
            donors == 0 && recipients == 0
        };
        let standing = self
            .recipients
            .iter()
            .filter(|r| r.var(REPUTATION).map(|v| v == GOOD).unwrap_or(false))
            .count()
            == self.good;
        partition && standing
    }
}

impl std::fmt::Display for Population {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} pairs, {:.3} in good standing",
            self.len(),
            self.fraction()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::player::Player;
    use crate::agent::policy::Exploration;
    use crate::agent::tables::StrategyTable;
    use crate::learning::qtable::QTable;
    use rand::SeedableRng;
    use std::sync::Arc;

    pub const TOLERANCE: f64 = 0.05;

    fn templates() -> (Player, Player) {
        let donor = Player::scripted("donor", Arc::new(StrategyTable::donor()), "C").unwrap();
        let recipient =
            Player::scripted("recipient", Arc::new(StrategyTable::recipient()), "NR").unwrap();
        (donor, recipient)
    }

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(42)
    }

    #[test]
    fn seeding_spreads_strategies_uniformly() {
        let (donor, recipient) = templates();
        let population = Population::seeded(&donor, &recipient, 1000, 0.5, &mut rng()).unwrap();
        assert!(population.coherent());
        for name in ["C", "DISC", "NDISC", "D"] {
            let share = population.bucket(Role::Donor, name) as f64 / 1000.0;
            assert!((share - 0.25).abs() < TOLERANCE, "{} share {}", name, share);
        }
        let fraction = population.fraction();
        assert!((fraction - 0.5).abs() < TOLERANCE, "good fraction {}", fraction);
    }

    #[test]
    fn seeding_honors_extreme_initial_fractions() {
        let (donor, recipient) = templates();
        let all = Population::seeded(&donor, &recipient, 50, 1.0, &mut rng()).unwrap();
        assert_eq!(all.good(), 50);
        let none = Population::seeded(&donor, &recipient, 50, 0.0, &mut rng()).unwrap();
        assert_eq!(none.good(), 0);
    }

    #[test]
    fn reassignment_moves_exactly_one_index() {
        let (donor, recipient) = templates();
        let mut population = Population::seeded(&donor, &recipient, 20, 1.0, &mut rng()).unwrap();
        let from = population.donor(0).strategy().unwrap().name().to_string();
        let to = if from == "D" { "C" } else { "D" };
        let before = population.bucket(Role::Donor, &from);
        population.reassign(Role::Donor, 0, to).unwrap();
        assert_eq!(population.bucket(Role::Donor, &from), before - 1);
        assert_eq!(population.donor(0).strategy().unwrap().name(), to);
        assert!(population.coherent());
    }

    #[test]
    fn reassigning_the_same_strategy_is_a_no_op() {
        let (donor, recipient) = templates();
        let mut population = Population::seeded(&donor, &recipient, 20, 1.0, &mut rng()).unwrap();
        let held = population.donor(3).strategy().unwrap().name().to_string();
        population.reassign(Role::Donor, 3, &held).unwrap();
        assert!(population.coherent());
    }

    #[test]
    fn restanding_tracks_the_good_counter() {
        let (donor, recipient) = templates();
        let mut population = Population::seeded(&donor, &recipient, 10, 1.0, &mut rng()).unwrap();
        assert_eq!(population.good(), 10);
        population.restand(4, crate::BAD).unwrap();
        assert_eq!(population.good(), 9);
        population.restand(4, crate::BAD).unwrap();
        assert_eq!(population.good(), 9, "repeated bad standing does not double count");
        population.restand(4, GOOD).unwrap();
        assert_eq!(population.good(), 10);
        assert!(population.coherent());
    }

    #[test]
    fn learner_populations_have_no_buckets() {
        let donor = Player::learner(
            "donor",
            Role::Donor,
            QTable::new(&["0", "1"], &["C", "D"]),
            Exploration::EpsilonGreedy(0.1),
        );
        let recipient = Player::learner(
            "recipient",
            Role::Recipient,
            QTable::new(&["C", "D"], &["C", "D"]),
            Exploration::EpsilonGreedy(0.1),
        );
        let population = Population::seeded(&donor, &recipient, 10, 0.5, &mut rng()).unwrap();
        assert!(population.coherent());
        assert_eq!(population.buckets(Role::Donor).len(), 0);
        assert!(population.pairs().is_empty());
    }

    #[test]
    fn tiny_and_invalid_seeds_are_rejected() {
        let (donor, recipient) = templates();
        assert!(Population::seeded(&donor, &recipient, 1, 0.5, &mut rng()).is_err());
        assert!(Population::seeded(&donor, &recipient, 10, 1.5, &mut rng()).is_err());
    }

    #[test]
    fn pair_counts_cover_the_whole_population() {
        let (donor, recipient) = templates();
        let population = Population::seeded(&donor, &recipient, 60, 0.5, &mut rng()).unwrap();
        let total = population.pairs().values().sum::<usize>();
        assert_eq!(total, 60);
    }
}
