use crate::Arbitrary;

/// A move available to one seat of the stage game.
///
/// Actions are declared by the matrices and tables that use them, so each
/// carries its display name together with its index into those tables.
/// Ordering is by index first so action sets iterate in declaration order.
#[derive(Debug, Clone)]
pub struct Action {
    name: String,
    id: usize,
}

impl Action {
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

impl From<(&str, usize)> for Action {
    fn from((name, id): (&str, usize)) -> Self {
        Self::new(name, id)
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.name == other.name
    }
}
impl Eq for Action {}

impl Ord for Action {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id
            .cmp(&other.id)
            .then_with(|| self.name.cmp(&other.name))
    }
}
impl PartialOrd for Action {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl std::hash::Hash for Action {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.name.hash(state);
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Arbitrary for Action {
    fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        match rng.random_range(0..2) {
            0 => Self::new("C", 0),
            _ => Self::new("D", 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_requires_name_and_id() {
        assert_eq!(Action::new("C", 0), Action::new("C", 0));
        assert_ne!(Action::new("C", 0), Action::new("C", 1));
        assert_ne!(Action::new("C", 0), Action::new("D", 0));
    }

    #[test]
    fn ordering_follows_declaration_index() {
        let mut actions = vec![Action::new("D", 1), Action::new("C", 0)];
        actions.sort();
        assert_eq!(actions[0].name(), "C");
        assert_eq!(actions[1].name(), "D");
    }
}
