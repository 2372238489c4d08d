use crate::Arbitrary;
use crate::Utility;
use crate::game::action::Action;

/// One unit of experience: the state an agent observed, the action it
/// took, the reward it collected, and the state that followed.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    state: String,
    action: Action,
    reward: Utility,
    next: String,
}

impl Transition {
    pub fn new(state: &str, action: Action, reward: Utility, next: &str) -> Self {
        Self {
            state: state.to_string(),
            action,
            reward,
            next: next.to_string(),
        }
    }
    pub fn state(&self) -> &str {
        &self.state
    }
    pub fn action(&self) -> &Action {
        &self.action
    }
    pub fn reward(&self) -> Utility {
        self.reward
    }
    pub fn next(&self) -> &str {
        &self.next
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "({} -{}-> {}) {:+.3}",
            self.state, self.action, self.next, self.reward
        )
    }
}

impl Arbitrary for Transition {
    fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::rng();
        let states = ["0", "1"];
        Self::new(
            states[rng.random_range(0..2)],
            Action::random(),
            rng.random_range(-4.0..4.0),
            states[rng.random_range(0..2)],
        )
    }
}
