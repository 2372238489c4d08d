use crate::Probability;
use crate::Utility;
use crate::game::strategy::Strategy;
use crate::population::population::Population;
use anyhow::Result;
use anyhow::ensure;

/// One observation row: pair and per-strategy population shares plus
/// window aggregates at a given step. Counting goes through
/// classification, so scripted agents report their assigned strategy
/// and learners report the greedy readout of their tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Census {
    step: usize,
    pairs: Vec<usize>,
    donors: Vec<usize>,
    recipients: Vec<usize>,
    count: usize,
    fraction: Probability,
    cooperation: Probability,
    reward: Utility,
}

impl Census {
    /// Column names, in the order `line` emits them.
    pub fn header(donors: &[Strategy], recipients: &[Strategy]) -> Vec<String> {
        let mut columns = vec!["step".to_string()];
        for d in donors {
            for r in recipients {
                columns.push(format!("{}-{}", d.name(), r.name()));
            }
        }
        for d in donors {
            columns.push(format!("donor-{}", d.name()));
        }
        for r in recipients {
            columns.push(format!("recipient-{}", r.name()));
        }
        columns.push("good".to_string());
        columns.push("cooperation".to_string());
        columns.push("reward".to_string());
        columns
    }

    /// Snapshot the population against the given strategy axes.
    /// Classification of a learner reads its table, so the population
    /// is borrowed mutably for the tie-breaking draws.
    pub fn take(
        step: usize,
        population: &mut Population,
        donors: &[Strategy],
        recipients: &[Strategy],
        cooperation: Probability,
        reward: Utility,
    ) -> Result<Self> {
        let mut pairs = vec![0; donors.len() * recipients.len()];
        let mut dcounts = vec![0; donors.len()];
        let mut rcounts = vec![0; recipients.len()];
        for i in 0..population.len() {
            let d = population.donor_mut(i).classify()?;
            let r = population.recipient_mut(i).classify()?;
            let dpos = donors.iter().position(|s| s.name() == d.name());
            let rpos = recipients.iter().position(|s| s.name() == r.name());
            ensure!(dpos.is_some(), "donor strategy {} not on the axis", d.name());
            ensure!(rpos.is_some(), "recipient strategy {} not on the axis", r.name());
            let (dpos, rpos) = (dpos.unwrap(), rpos.unwrap());
            pairs[dpos * recipients.len() + rpos] += 1;
            dcounts[dpos] += 1;
            rcounts[rpos] += 1;
        }
        Ok(Self {
            step,
            pairs,
            donors: dcounts,
            recipients: rcounts,
            count: population.len(),
            fraction: population.fraction(),
            cooperation,
            reward,
        })
    }

    /// One CSV record matching `header`. Strategy columns are emitted
    /// as population shares rather than raw counts.
    pub fn line(&self) -> String {
        let n = self.count as f64;
        let mut fields = vec![self.step.to_string()];
        fields.extend(self.pairs.iter().map(|k| format!("{:.6}", *k as f64 / n)));
        fields.extend(self.donors.iter().map(|k| format!("{:.6}", *k as f64 / n)));
        fields.extend(self.recipients.iter().map(|k| format!("{:.6}", *k as f64 / n)));
        fields.push(format!("{:.6}", self.fraction));
        fields.push(format!("{:.6}", self.cooperation));
        fields.push(format!("{:.6}", self.reward));
        fields.join(",")
    }

    pub fn step(&self) -> usize {
        self.step
    }
    /// How many agent pairs the snapshot covered.
    pub fn count(&self) -> usize {
        self.count
    }
    pub fn fraction(&self) -> Probability {
        self.fraction
    }
    pub fn cooperation(&self) -> Probability {
        self.cooperation
    }
    pub fn reward(&self) -> Utility {
        self.reward
    }
    /// Count for a donor strategy by axis position.
    pub fn donor(&self, i: usize) -> usize {
        self.donors[i]
    }
    /// Count for a recipient strategy by axis position.
    pub fn recipient(&self, i: usize) -> usize {
        self.recipients[i]
    }
}

impl std::fmt::Display for Census {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "step {:>8} good {:.3} coop {:.3} reward {:+.3}",
            self.step, self.fraction, self.cooperation, self.reward
        )
    }
}
