use crate::Arbitrary;
use crate::BAD;
use crate::GOOD;
use crate::Probability;
use crate::Reputation;
use crate::game::action::Action;
use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use anyhow::ensure;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use std::collections::BTreeMap;

/// A social norm: the observers' rule turning one observed game into
/// the recipient's next standing.
///
/// The table is keyed by (donor action, recipient action). With two
/// actions per seat there are exactly sixteen norms; `from_id` reads the
/// id as a four-bit assignment over the column order (C,C) (C,D) (D,C)
/// (D,D), most significant bit first. Assessment noise flips the
/// assigned standing with the probability passed per observation.
pub struct Norm {
    name: String,
    table: BTreeMap<(String, String), Reputation>,
    rng: SmallRng,
}

impl Norm {
    /// How many distinct norms exist over two binary action sets.
    pub const COUNT: usize = 16;

    /// The canonical norm with the given four-bit id.
    pub fn from_id(id: usize) -> Self {
        assert!(id < Self::COUNT, "norm id {} out of range", id);
        let pairs = [("C", "C"), ("C", "D"), ("D", "C"), ("D", "D")];
        let table = pairs
            .iter()
            .enumerate()
            .map(|(i, (donor, recipient))| {
                let bit = (id >> (pairs.len() - 1 - i)) & 1;
                let rep = if bit == 1 { GOOD } else { BAD };
                ((donor.to_string(), recipient.to_string()), rep)
            })
            .collect();
        Self {
            name: format!("norm{}", id),
            table,
            rng: SmallRng::from_os_rng(),
        }
    }

    /// Read a norm from disk, named after the file stem.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read norm {}", path.display()))?;
        let mut norm = Self::try_from(text.as_str())
            .with_context(|| format!("parse norm {}", path.display()))?;
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            norm.name = stem.to_string();
        }
        Ok(norm)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Judge one observed game and return the recipient's new standing,
    /// flipped with probability `error`.
    pub fn reputation(
        &mut self,
        donor: &Action,
        recipient: &Action,
        error: Probability,
    ) -> Result<Reputation> {
        let key = (donor.name().to_string(), recipient.name().to_string());
        let rep = match self.table.get(&key) {
            Some(rep) => *rep,
            None => bail!(
                "norm {} has no entry for ({}, {})",
                self.name,
                donor,
                recipient
            ),
        };
        assert!(rep == GOOD || rep == BAD, "norm table holds a non-binary standing");
        if self.rng.random::<f64>() < error {
            Ok(GOOD + BAD - rep)
        } else {
            Ok(rep)
        }
    }

    /// A fresh copy judging the same way but drawing its own randomness.
    pub fn replicate(&self) -> Self {
        Self {
            name: self.name.clone(),
            table: self.table.clone(),
            rng: SmallRng::from_os_rng(),
        }
    }
}

impl TryFrom<&str> for Norm {
    type Error = anyhow::Error;
    fn try_from(text: &str) -> Result<Self> {
        let rows = text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.split(',').map(|c| c.trim().to_string()).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        ensure!(
            rows.len() == 3,
            "norm text needs donor, recipient, and standing rows, got {}",
            rows.len()
        );
        let width = rows[0].len();
        ensure!(width > 0, "norm text declares no columns");
        ensure!(
            rows.iter().all(|r| r.len() == width),
            "norm rows are jagged"
        );
        let mut table = BTreeMap::new();
        for i in 0..width {
            let donor = rows[0][i].clone();
            let recipient = rows[1][i].clone();
            let rep = rows[2][i]
                .parse::<Reputation>()
                .with_context(|| format!("standing '{}' is not a number", rows[2][i]))?;
            ensure!(
                rep == GOOD || rep == BAD,
                "standing for ({}, {}) must be {} or {}, got {}",
                donor,
                recipient,
                BAD,
                GOOD,
                rep
            );
            ensure!(
                table.insert((donor.clone(), recipient.clone()), rep).is_none(),
                "duplicate norm entry for ({}, {})",
                donor,
                recipient
            );
        }
        Ok(Self {
            name: "custom".to_string(),
            table,
            rng: SmallRng::from_os_rng(),
        })
    }
}

impl std::fmt::Display for Norm {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} {{", self.name)?;
        for ((donor, recipient), rep) in self.table.iter() {
            write!(f, " ({},{})->{}", donor, recipient, rep)?;
        }
        write!(f, " }}")
    }
}

impl std::fmt::Debug for Norm {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

impl Arbitrary for Norm {
    fn random() -> Self {
        let mut rng = rand::rng();
        Self::from_id(rng.random_range(0..Self::COUNT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub const TOLERANCE: f64 = 0.05;

    fn c() -> Action {
        Action::new("C", 0)
    }
    fn d() -> Action {
        Action::new("D", 1)
    }

    #[test]
    fn norm_ten_judges_reciprocity() {
        let mut norm = Norm::from_id(10);
        assert_eq!(norm.reputation(&c(), &c(), 0.0).unwrap(), GOOD);
        assert_eq!(norm.reputation(&c(), &d(), 0.0).unwrap(), BAD);
        assert_eq!(norm.reputation(&d(), &c(), 0.0).unwrap(), GOOD);
        assert_eq!(norm.reputation(&d(), &d(), 0.0).unwrap(), BAD);
    }

    #[test]
    fn every_norm_is_total_over_action_pairs() {
        for id in 0..Norm::COUNT {
            let mut norm = Norm::from_id(id);
            for donor in [c(), d()] {
                for recipient in [c(), d()] {
                    let rep = norm.reputation(&donor, &recipient, 0.0).unwrap();
                    assert!(rep == GOOD || rep == BAD);
                }
            }
        }
    }

    #[test]
    fn certain_error_always_flips_and_no_error_never_does() {
        let mut norm = Norm::from_id(10);
        for _ in 0..100 {
            assert_eq!(norm.reputation(&c(), &c(), 0.0).unwrap(), GOOD);
            assert_eq!(norm.reputation(&c(), &c(), 1.0).unwrap(), BAD);
        }
    }

    #[test]
    fn error_rate_matches_flip_frequency() {
        let mut norm = Norm::from_id(10);
        let n = 10_000;
        let flips = (0..n)
            .filter(|_| norm.reputation(&c(), &c(), 0.3).unwrap() == BAD)
            .count();
        let rate = flips as f64 / n as f64;
        assert!((rate - 0.3).abs() < TOLERANCE, "flip rate {}", rate);
    }

    #[test]
    fn text_format_matches_canonical_enumeration() {
        let text = "C,C,D,D\nC,D,C,D\n1,0,1,0";
        let mut parsed = Norm::try_from(text).unwrap();
        let mut canonical = Norm::from_id(10);
        for donor in [c(), d()] {
            for recipient in [c(), d()] {
                assert_eq!(
                    parsed.reputation(&donor, &recipient, 0.0).unwrap(),
                    canonical.reputation(&donor, &recipient, 0.0).unwrap()
                );
            }
        }
    }

    #[test]
    fn unknown_action_pairs_are_named_in_errors() {
        let mut norm = Norm::from_id(10);
        let alien = Action::new("X", 7);
        let e = norm.reputation(&alien, &c(), 0.0).unwrap_err();
        assert!(e.to_string().contains("X"));
    }

    #[test]
    fn malformed_text_is_rejected() {
        assert!(Norm::try_from("C,C\nC,D").is_err());
        assert!(Norm::try_from("C,C\nC,D\n1").is_err());
        assert!(Norm::try_from("C,C\nC,D\n1,2").is_err());
        assert!(Norm::try_from("C,C\nC,C\n1,1").is_err());
        assert!(Norm::try_from("").is_err());
    }

    #[test]
    fn replicas_judge_identically() {
        let mut norm = Norm::from_id(9);
        let mut replica = norm.replicate();
        for donor in [c(), d()] {
            for recipient in [c(), d()] {
                assert_eq!(
                    norm.reputation(&donor, &recipient, 0.0).unwrap(),
                    replica.reputation(&donor, &recipient, 0.0).unwrap()
                );
            }
        }
    }
}
