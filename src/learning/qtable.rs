use super::bimap::BiMap;
use crate::Arbitrary;
use crate::Utility;
use crate::game::action::Action;
use crate::game::transition::Transition;
use anyhow::Result;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

/// A dense tabular action-value function.
///
/// Rows are states, columns are actions, both addressed by label through
/// a BiMap. Greedy selection breaks exact ties uniformly at random, and
/// Boltzmann selection rolls a cumulative roulette over softmax weights,
/// so the table owns its own generator.
#[derive(Debug)]
pub struct QTable {
    states: BiMap,
    actions: BiMap,
    table: Vec<Vec<Utility>>,
    rng: SmallRng,
}

impl QTable {
    /// A zero-initialized table over the given axes.
    pub fn new(states: &[&str], actions: &[&str]) -> Self {
        assert!(!states.is_empty(), "q-table needs at least one state");
        assert!(!actions.is_empty(), "q-table needs at least one action");
        Self {
            states: BiMap::from(states),
            actions: BiMap::from(actions),
            table: vec![vec![0.0; actions.len()]; states.len()],
            rng: SmallRng::from_os_rng(),
        }
    }

    pub fn states(&self) -> &[String] {
        self.states.names()
    }
    pub fn actions(&self) -> &[String] {
        self.actions.names()
    }

    /// Value at a labeled cell.
    pub fn loc(&self, state: &str, action: &str) -> Result<Utility> {
        Ok(self.table[self.states.index(state)?][self.actions.index(action)?])
    }

    /// Value at a positional cell.
    pub fn iloc(&self, state: usize, action: usize) -> Utility {
        assert!(state < self.states.len(), "state index {} out of range", state);
        assert!(action < self.actions.len(), "action index {} out of range", action);
        self.table[state][action]
    }

    /// Overwrite a labeled cell.
    pub fn set(&mut self, state: &str, action: &str, value: Utility) -> Result<()> {
        let i = self.states.index(state)?;
        let j = self.actions.index(action)?;
        self.table[i][j] = value;
        Ok(())
    }

    /// Greedy action for a state. Exact ties split uniformly.
    pub fn best(&mut self, state: &str) -> Result<Action> {
        let row = &self.table[self.states.index(state)?];
        let max = row.iter().copied().fold(Utility::NEG_INFINITY, Utility::max);
        let ties = row
            .iter()
            .enumerate()
            .filter(|(_, q)| **q == max)
            .map(|(j, _)| j)
            .collect::<Vec<_>>();
        let j = ties[self.rng.random_range(0..ties.len())];
        Ok(Action::new(self.actions.name(j), j))
    }

    /// Softmax action for a state at inverse temperature `beta`. Samples
    /// by walking the cumulative weights; if rounding exhausts the walk
    /// the last action is returned.
    pub fn boltzmann(&mut self, state: &str, beta: Utility) -> Result<Action> {
        let row = &self.table[self.states.index(state)?];
        let weights = row.iter().map(|q| (beta * q).exp()).collect::<Vec<_>>();
        let total = weights.iter().sum::<Utility>();
        let mut x = self.rng.random::<f64>() * total;
        for (j, w) in weights.iter().enumerate() {
            x -= w;
            if x <= 0.0 {
                return Ok(Action::new(self.actions.name(j), j));
            }
        }
        let j = self.actions.len() - 1;
        Ok(Action::new(self.actions.name(j), j))
    }

    /// One temporal-difference step toward the observed transition:
    /// Q(s,a) += alpha * (r + discount * max Q(s',.) - Q(s,a)).
    pub fn update(&mut self, t: &Transition, alpha: f64, discount: f64) -> Result<()> {
        let bootstrap = self.maximum(t.next())?;
        let i = self.states.index(t.state())?;
        let j = self.actions.index(t.action().name())?;
        let q = self.table[i][j];
        self.table[i][j] = q + alpha * (t.reward() + discount * bootstrap - q);
        Ok(())
    }

    /// Best achievable value from a state. Shared by all tied actions.
    fn maximum(&self, state: &str) -> Result<Utility> {
        let row = &self.table[self.states.index(state)?];
        Ok(row.iter().copied().fold(Utility::NEG_INFINITY, Utility::max))
    }

    /// A fresh copy of the same values drawing its own randomness.
    pub fn replicate(&self) -> Self {
        Self {
            states: self.states.clone(),
            actions: self.actions.clone(),
            table: self.table.clone(),
            rng: SmallRng::from_os_rng(),
        }
    }

    /// persist the table to disk
    pub fn save(&self, name: &str) {
        use byteorder::BE;
        use byteorder::WriteBytesExt;
        use std::fs::File;
        use std::io::Write;
        log::info!("saving q-table to {}.qtable.pgcopy", name);
        let ref mut file = File::create(format!("{}.qtable.pgcopy", name)).expect("touch");
        file.write_all(b"PGCOPY\n\xFF\r\n\0").expect("header");
        file.write_u32::<BE>(0).expect("flags");
        file.write_u32::<BE>(0).expect("extension");
        for (i, row) in self.table.iter().enumerate() {
            for (j, q) in row.iter().enumerate() {
                const N_FIELDS: u16 = 3;
                file.write_u16::<BE>(N_FIELDS).unwrap();
                file.write_u32::<BE>(size_of::<u64>() as u32).unwrap();
                file.write_u64::<BE>(i as u64).unwrap();
                file.write_u32::<BE>(size_of::<u64>() as u32).unwrap();
                file.write_u64::<BE>(j as u64).unwrap();
                file.write_u32::<BE>(size_of::<f64>() as u32).unwrap();
                file.write_f64::<BE>(*q).unwrap();
            }
        }
        file.write_u16::<BE>(0xFFFF).expect("trailer");
    }

    /// restore a table saved under this name, re-keyed by the given axes
    pub fn load(name: &str, states: &[&str], actions: &[&str]) -> Self {
        use byteorder::BE;
        use byteorder::ReadBytesExt;
        use std::fs::File;
        use std::io::BufReader;
        use std::io::Read;
        use std::io::Seek;
        use std::io::SeekFrom;
        log::info!("loading q-table from {}.qtable.pgcopy", name);
        let mut fresh = Self::new(states, actions);
        let file = File::open(format!("{}.qtable.pgcopy", name)).expect("open file");
        let mut buffer = [0u8; 2];
        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(19)).expect("seek past header");
        while reader.read_exact(&mut buffer).is_ok() {
            if u16::from_be_bytes(buffer) == 3 {
                reader.read_u32::<BE>().expect("state length");
                let i = reader.read_u64::<BE>().expect("read state") as usize;
                reader.read_u32::<BE>().expect("action length");
                let j = reader.read_u64::<BE>().expect("read action") as usize;
                reader.read_u32::<BE>().expect("value length");
                let q = reader.read_f64::<BE>().expect("read value");
                assert!(i < fresh.states.len(), "snapshot state {} out of range", i);
                assert!(j < fresh.actions.len(), "snapshot action {} out of range", j);
                fresh.table[i][j] = q;
                continue;
            } else {
                break;
            }
        }
        fresh
    }
}

impl std::fmt::Display for QTable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let bars = (0..=self.actions.len())
            .map(|_| "─".repeat(10))
            .collect::<Vec<_>>();
        writeln!(f, "┌{}┐", bars.join("┬"))?;
        write!(f, "│ {:>8} ", "")?;
        for action in self.actions.names() {
            write!(f, "│ {:>8} ", action)?;
        }
        writeln!(f, "│")?;
        writeln!(f, "├{}┤", bars.join("┼"))?;
        for (i, state) in self.states.names().iter().enumerate() {
            write!(f, "│ {:>8} ", state)?;
            for j in 0..self.actions.len() {
                write!(f, "│ {:>+8.3} ", self.table[i][j])?;
            }
            writeln!(f, "│")?;
        }
        write!(f, "└{}┘", bars.join("┴"))
    }
}

impl Arbitrary for QTable {
    fn random() -> Self {
        let mut rng = rand::rng();
        let mut table = Self::new(&["0", "1"], &["C", "D"]);
        for i in 0..2 {
            for j in 0..2 {
                table.table[i][j] = rng.random_range(-4.0..4.0);
            }
        }
        table
    }
}
