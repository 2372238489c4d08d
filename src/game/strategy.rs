use crate::Arbitrary;

/// A named behavioral rule for one seat of the stage game.
///
/// Like actions, strategies are declared by the payoff matrices and
/// strategy tables that reference them, keeping name and index together.
#[derive(Debug, Clone)]
pub struct Strategy {
    name: String,
    id: usize,
}

impl Strategy {
    pub fn new(name: &str, id: usize) -> Self {
        Self {
            name: name.to_string(),
            id,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn id(&self) -> usize {
        self.id
    }
}

impl From<(&str, usize)> for Strategy {
    fn from((name, id): (&str, usize)) -> Self {
        Self::new(name, id)
    }
}

impl PartialEq for Strategy {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name
    }
}
impl Eq for Strategy {}

impl Ord for Strategy {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.name.cmp(&other.name))
    }
}
impl PartialOrd for Strategy {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for Strategy {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.name.hash(state);
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Arbitrary for Strategy {
    fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        match rng.random_range(0..4) {
            0 => Self::new("C", 0),
            1 => Self::new("DISC", 1),
            2 => Self::new("NDISC", 2),
            _ => Self::new("D", 3),
        }
    }
}
