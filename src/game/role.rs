use crate::Arbitrary;

/// The two seats of the stage game. Donors move first; recipients
/// respond after observing the donor's move.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub enum Role {
    Donor,
    Recipient,
}

impl Role {
    pub const COUNT: usize = 2;

    pub const fn index(&self) -> usize {
        match self {
            Self::Donor => 0,
            Self::Recipient => 1,
        }
    }
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Donor => "donor",
            Self::Recipient => "recipient",
        }
    }
    pub const fn all() -> [Self; Self::COUNT] {
        [Self::Donor, Self::Recipient]
    }
}

impl From<usize> for Role {
    fn from(index: usize) -> Self {
        match index {
            0 => Self::Donor,
            1 => Self::Recipient,
            _ => panic!("no role at index {}", index),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Arbitrary for Role {
    fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        match rng.random_bool(0.5) {
            true => Self::Donor,
            false => Self::Recipient,
        }
    }
}
