use crate::game::action::Action;
use crate::game::role::Role;
use crate::game::strategy::Strategy;
use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use anyhow::ensure;
use std::collections::HashMap;

/// The scripted strategies available to one seat, compiled for lookup.
///
/// Each strategy is a small table read column-wise: every row but the
/// last is an input field, the last row is the prescribed action. A
/// donor table is keyed by the recipient's standing, a recipient table
/// by the donor's observed move:
///
/// ```text
/// 0,1
/// D,C
/// ```
///
/// Compiled entries are keyed by (strategy, input fields) so lookups
/// never go through string concatenation. The whole set is immutable
/// once built and shared by reference across a population.
#[derive(Debug)]
pub struct StrategyTable {
    role: Role,
    strategies: Vec<Strategy>,
    actions: Vec<Action>,
    compiled: HashMap<(String, Vec<String>), Action>,
}

impl StrategyTable {
    pub fn new(role: Role, actions: &[&str]) -> Self {
        assert!(!actions.is_empty(), "strategy table needs actions");
        Self {
            role,
            strategies: Vec::new(),
            actions: actions
                .iter()
                .enumerate()
                .map(|(id, name)| Action::new(name, id))
                .collect(),
            compiled: HashMap::new(),
        }
    }

    /// The canonical donor set: unconditional cooperators and defectors
    /// plus both discriminators, keyed by the recipient's standing.
    pub fn donor() -> Self {
        let mut tables = Self::new(Role::Donor, &["C", "D"]);
        tables.insert("C", "0,1\nC,C").expect("built-in table compiles");
        tables.insert("DISC", "0,1\nD,C").expect("built-in table compiles");
        tables.insert("NDISC", "0,1\nC,D").expect("built-in table compiles");
        tables.insert("D", "0,1\nD,D").expect("built-in table compiles");
        tables
    }

    /// The canonical recipient set: never, strict, anti, and
    /// unconditional reciprocators, keyed by the donor's move.
    pub fn recipient() -> Self {
        let mut tables = Self::new(Role::Recipient, &["C", "D"]);
        tables.insert("NR", "C,D\nD,D").expect("built-in table compiles");
        tables.insert("SR", "C,D\nC,D").expect("built-in table compiles");
        tables.insert("AR", "C,D\nD,C").expect("built-in table compiles");
        tables.insert("UR", "C,D\nC,C").expect("built-in table compiles");
        tables
    }

    /// Load one table per strategy from `<dir>/<role>/<strategy>.csv`.
    pub fn from_dir(
        dir: &std::path::Path,
        role: Role,
        strategies: &[&str],
        actions: &[&str],
    ) -> Result<Self> {
        let mut tables = Self::new(role, actions);
        for strategy in strategies {
            let path = dir.join(role.name()).join(format!("{}.csv", strategy));
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("read strategy table {}", path.display()))?;
            tables
                .insert(strategy, &text)
                .with_context(|| format!("compile strategy table {}", path.display()))?;
        }
        Ok(tables)
    }

    /// Register a strategy from its table text.
    pub fn insert(&mut self, strategy: &str, text: &str) -> Result<()> {
        ensure!(
            !self.strategies.iter().any(|s| s.name() == strategy),
            "strategy '{}' registered twice",
            strategy
        );
        let rows = text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.split(',').map(|c| c.trim().to_string()).collect::<Vec<_>>())
            .collect::<Vec<_>>();
        ensure!(
            rows.len() >= 2,
            "strategy '{}' needs input and action rows",
            strategy
        );
        let width = rows[0].len();
        ensure!(width > 0, "strategy '{}' declares no entries", strategy);
        ensure!(
            rows.iter().all(|r| r.len() == width),
            "strategy '{}' table is jagged",
            strategy
        );
        let mut entries = HashMap::new();
        for column in 0..width {
            let inputs = rows[..rows.len() - 1]
                .iter()
                .map(|row| row[column].clone())
                .collect::<Vec<_>>();
            let output = &rows[rows.len() - 1][column];
            let action = match self.actions.iter().find(|a| a.name() == output) {
                Some(action) => action.clone(),
                None => bail!("strategy '{}' prescribes unknown action '{}'", strategy, output),
            };
            let key = (strategy.to_string(), inputs);
            ensure!(
                entries.insert(key, action).is_none(),
                "strategy '{}' repeats an input column",
                strategy
            );
        }
        self.compiled.extend(entries);
        let id = self.strategies.len();
        self.strategies.push(Strategy::new(strategy, id));
        Ok(())
    }

    /// The prescribed action for a strategy given its observed inputs.
    pub fn lookup(&self, strategy: &str, inputs: &[&str]) -> Result<&Action> {
        let key = (
            strategy.to_string(),
            inputs.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        );
        match self.compiled.get(&key) {
            Some(action) => Ok(action),
            None => bail!(
                "no entry for strategy '{}' given ({})",
                strategy,
                inputs.join(", ")
            ),
        }
    }

    /// The registered strategy with this name.
    pub fn strategy(&self, name: &str) -> Result<&Strategy> {
        match self.strategies.iter().find(|s| s.name() == name) {
            Some(strategy) => Ok(strategy),
            None => bail!("unknown strategy '{}'", name),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }
    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }
}

impl std::fmt::Display for StrategyTable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} strategies [{}]",
            self.role,
            self.strategies
                .iter()
                .map(|s| s.name().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}
