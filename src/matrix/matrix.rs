use super::expr::Expr;
use crate::Utility;
use crate::game::action::Action;
use crate::game::strategy::Strategy;
use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use anyhow::ensure;
use std::collections::BTreeMap;

/// Axis labels for an expression matrix. Strategies label the imitation
/// payoff matrix, raw actions label the Q-learning reward matrix.
pub trait Label: Clone + PartialEq + std::fmt::Display {
    fn label(name: &str, id: usize) -> Self;
    fn name(&self) -> &str;
    fn id(&self) -> usize;
}

impl Label for Strategy {
    fn label(name: &str, id: usize) -> Self {
        Self::new(name, id)
    }
    fn name(&self) -> &str {
        Strategy::name(self)
    }
    fn id(&self) -> usize {
        Strategy::id(self)
    }
}

impl Label for Action {
    fn label(name: &str, id: usize) -> Self {
        Self::new(name, id)
    }
    fn name(&self) -> &str {
        Action::name(self)
    }
    fn id(&self) -> usize {
        Action::id(self)
    }
}

/// A table of per-role payoff expressions indexed `[row][col][role]`.
///
/// The text format is one header line and one line per row label:
///
/// ```text
/// donor recipient:b beta c gamma r,NR,SR,AR,UR
/// C,-c:b,beta-c:b-gamma,-c:b,beta-c:b-gamma
/// ...
/// ```
///
/// The first header cell declares the role names and, after the colon,
/// the variable names the expressions may reference. Each body cell
/// carries one expression per role, colon-separated in role order.
/// Expressions stay symbolic until `evaluate` (shared environment) or
/// `evaluate_for` (per-role overlays) caches the numeric table.
#[derive(Debug, Clone)]
pub struct ExprMatrix<L> {
    roles: Vec<String>,
    vars: BTreeMap<String, f64>,
    rows: Vec<L>,
    cols: Vec<L>,
    cells: Vec<Vec<Vec<Expr>>>,
    values: Vec<Vec<Vec<Utility>>>,
}

pub type PayoffMatrix = ExprMatrix<Strategy>;
pub type RewardMatrix = ExprMatrix<Action>;

impl<L: Label> ExprMatrix<L> {
    /// Read a matrix from disk in the text format.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        std::fs::read_to_string(path)
            .with_context(|| format!("read matrix {}", path.display()))?
            .as_str()
            .try_into()
            .with_context(|| format!("parse matrix {}", path.display()))
    }

    pub fn roles(&self) -> &[String] {
        &self.roles
    }
    pub fn rows(&self) -> &[L] {
        &self.rows
    }
    pub fn cols(&self) -> &[L] {
        &self.cols
    }
    pub fn vars(&self) -> &BTreeMap<String, f64> {
        &self.vars
    }

    /// Bind a variable, adding it if the header never declared it.
    pub fn set(&mut self, name: &str, value: f64) {
        self.vars.insert(name.to_string(), value);
    }

    /// Evaluate every cell for every role against the shared environment.
    pub fn evaluate(&mut self) -> Result<()> {
        let n = self.roles.len();
        let envs = vec![self.vars.clone(); n];
        self.cache(&envs)
    }

    /// Evaluate with per-role variable overrides layered over the shared
    /// environment. One overlay per role, in role order.
    pub fn evaluate_for(&mut self, overlays: &[BTreeMap<String, f64>]) -> Result<()> {
        ensure!(
            overlays.len() == self.roles.len(),
            "got {} overlays for {} roles",
            overlays.len(),
            self.roles.len()
        );
        let envs = overlays
            .iter()
            .map(|overlay| {
                let mut env = self.vars.clone();
                env.extend(overlay.iter().map(|(k, v)| (k.clone(), *v)));
                env
            })
            .collect::<Vec<_>>();
        self.cache(&envs)
    }

    fn cache(&mut self, envs: &[BTreeMap<String, f64>]) -> Result<()> {
        let mut values = Vec::with_capacity(self.rows.len());
        for (i, row) in self.cells.iter().enumerate() {
            let mut cols = Vec::with_capacity(self.cols.len());
            for (j, cell) in row.iter().enumerate() {
                let mut payoffs = Vec::with_capacity(envs.len());
                for (k, expr) in cell.iter().enumerate() {
                    let value = expr.eval(&envs[k]).with_context(|| {
                        format!(
                            "evaluate {} vs {} for {}",
                            self.rows[i], self.cols[j], self.roles[k]
                        )
                    })?;
                    payoffs.push(value);
                }
                cols.push(payoffs);
            }
            values.push(cols);
        }
        self.values = values;
        Ok(())
    }

    /// Per-role payoffs for a row/col pairing, in role order. Labels must
    /// be members of this matrix, and the matrix must have been evaluated.
    pub fn payoff(&self, row: &L, col: &L) -> Result<&[Utility]> {
        assert!(
            !self.values.is_empty(),
            "matrix must be evaluated before payoff lookups"
        );
        let i = match self.rows.iter().position(|r| r == row) {
            Some(i) => i,
            None => bail!("no row '{}' in matrix", row),
        };
        let j = match self.cols.iter().position(|c| c == col) {
            Some(j) => j,
            None => bail!("no column '{}' in matrix", col),
        };
        Ok(&self.values[i][j])
    }
}

impl<L: Label> TryFrom<&str> for ExprMatrix<L> {
    type Error = anyhow::Error;
    fn try_from(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty());
        let header = match lines.next() {
            Some(line) => line,
            None => bail!("matrix text is empty"),
        };
        let mut cells = header.split(',');
        let corner = cells.next().unwrap_or_default();
        let (roles, vars) = match corner.split_once(':') {
            Some((roles, vars)) => (roles, vars),
            None => (corner, ""),
        };
        let roles = roles
            .split_whitespace()
            .map(|s| s.to_string())
            .collect::<Vec<_>>();
        ensure!(!roles.is_empty(), "matrix header declares no roles");
        let vars = vars
            .split_whitespace()
            .map(|s| (s.to_string(), 0.0))
            .collect::<BTreeMap<_, _>>();
        let cols = cells
            .enumerate()
            .map(|(id, name)| L::label(name.trim(), id))
            .collect::<Vec<_>>();
        ensure!(!cols.is_empty(), "matrix header declares no columns");
        let mut rows = Vec::new();
        let mut table = Vec::new();
        for line in lines {
            let mut cells = line.split(',');
            let name = cells.next().unwrap_or_default().trim();
            let row = L::label(name, rows.len());
            ensure!(
                !rows.iter().any(|r: &L| r.name() == name),
                "duplicate row '{}'",
                name
            );
            let mut exprs = Vec::with_capacity(cols.len());
            for (j, cell) in cells.enumerate() {
                ensure!(j < cols.len(), "row '{}' has too many cells", name);
                let pieces = cell.split(':').collect::<Vec<_>>();
                ensure!(
                    pieces.len() == roles.len(),
                    "cell {} vs {} has {} expressions for {} roles",
                    name,
                    cols[j],
                    pieces.len(),
                    roles.len()
                );
                let parsed = pieces
                    .iter()
                    .map(|piece| Expr::try_from(piece.trim()))
                    .collect::<Result<Vec<_>>>()
                    .with_context(|| format!("parse cell {} vs {}", name, cols[j]))?;
                exprs.push(parsed);
            }
            ensure!(
                exprs.len() == cols.len(),
                "row '{}' has {} cells for {} columns",
                name,
                exprs.len(),
                cols.len()
            );
            rows.push(row);
            table.push(exprs);
        }
        ensure!(!rows.is_empty(), "matrix declares no rows");
        Ok(Self {
            roles,
            vars,
            rows,
            cols,
            cells: table,
            values: Vec::new(),
        })
    }
}

impl<L: Label> std::fmt::Display for ExprMatrix<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}x{} matrix over ({})",
            self.rows.len(),
            self.cols.len(),
            self.roles.join(", ")
        )
    }
}

impl PayoffMatrix {
    /// The donation game over the canonical strategy sets, parameterized
    /// by the population's good-standing fraction `r`. A donor pays `c`
    /// to hand the recipient `b`; a reciprocating recipient pays `gamma`
    /// to hand the donor `beta`. Discriminators condition on `r`.
    pub fn donation() -> Self {
        Self::try_from(
            "donor recipient:b beta c gamma r,NR,SR,AR,UR\n\
             C,-c:b,beta-c:b-gamma,-c:b,beta-c:b-gamma\n\
             DISC,-c*r:b*r,(beta-c)*r:(b-gamma)*r,beta-(beta+c)*r:(b+gamma)*r-gamma,beta-c*r:b*r-gamma\n\
             NDISC,c*r-c:b-b*r,(beta-c)*(1-r):(b-gamma)*(1-r),(beta+c)*r-c:b-(b+gamma)*r,beta-c+c*r:b-gamma-b*r\n\
             D,0:0,0:0,beta:-gamma,beta:-gamma",
        )
        .expect("donation payoff matrix parses")
    }
}

impl RewardMatrix {
    /// The donation game over raw actions, for learners that experience
    /// single games rather than strategy-vs-strategy expectations.
    pub fn donation() -> Self {
        Self::try_from(
            "donor recipient:b beta c gamma,C,D\n\
             C,beta-c:b-gamma,-c:b\n\
             D,beta:-gamma,0:0",
        )
        .expect("donation reward matrix parses")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound() -> PayoffMatrix {
        let mut matrix = PayoffMatrix::donation();
        matrix.set("b", 4.0);
        matrix.set("beta", 3.0);
        matrix.set("c", 1.0);
        matrix.set("gamma", 1.0);
        matrix
    }

    fn strategy(axis: &[Strategy], name: &str) -> Strategy {
        axis.iter().find(|s| s.name() == name).unwrap().clone()
    }

    #[test]
    fn donation_matrix_has_declared_shape() {
        let matrix = PayoffMatrix::donation();
        assert_eq!(matrix.rows().len(), 4);
        assert_eq!(matrix.cols().len(), 4);
        assert_eq!(matrix.roles().len(), 2);
        assert!(matrix.vars().contains_key("b"));
        assert!(matrix.vars().contains_key("r"));
    }

    #[test]
    fn cooperator_versus_reciprocator_pays_both() {
        let mut matrix = bound();
        matrix.set("r", 1.0);
        matrix.evaluate().unwrap();
        let c = strategy(matrix.rows(), "C");
        let sr = strategy(matrix.cols(), "SR");
        assert_eq!(matrix.payoff(&c, &sr).unwrap(), &[2.0, 3.0]);
    }

    #[test]
    fn discriminators_collapse_at_fraction_extremes() {
        let mut matrix = bound();
        matrix.set("r", 1.0);
        matrix.evaluate().unwrap();
        for col in matrix.cols().to_vec() {
            let disc = strategy(matrix.rows(), "DISC");
            let c = strategy(matrix.rows(), "C");
            let ndisc = strategy(matrix.rows(), "NDISC");
            let d = strategy(matrix.rows(), "D");
            assert_eq!(
                matrix.payoff(&disc, &col).unwrap(),
                matrix.payoff(&c, &col).unwrap(),
                "DISC acts like C when everyone stands well"
            );
            assert_eq!(
                matrix.payoff(&ndisc, &col).unwrap(),
                matrix.payoff(&d, &col).unwrap(),
                "NDISC acts like D when everyone stands well"
            );
        }
        matrix.set("r", 0.0);
        matrix.evaluate().unwrap();
        for col in matrix.cols().to_vec() {
            let disc = strategy(matrix.rows(), "DISC");
            let d = strategy(matrix.rows(), "D");
            assert_eq!(
                matrix.payoff(&disc, &col).unwrap(),
                matrix.payoff(&d, &col).unwrap(),
                "DISC acts like D when no one stands well"
            );
        }
    }

    #[test]
    fn reward_matrix_covers_all_action_pairs() {
        let mut matrix = RewardMatrix::donation();
        matrix.set("b", 4.0);
        matrix.set("beta", 3.0);
        matrix.set("c", 1.0);
        matrix.set("gamma", 1.0);
        matrix.evaluate().unwrap();
        let c = Action::new("C", 0);
        let d = Action::new("D", 1);
        assert_eq!(matrix.payoff(&c, &c).unwrap(), &[2.0, 3.0]);
        assert_eq!(matrix.payoff(&c, &d).unwrap(), &[-1.0, 4.0]);
        assert_eq!(matrix.payoff(&d, &c).unwrap(), &[3.0, -1.0]);
        assert_eq!(matrix.payoff(&d, &d).unwrap(), &[0.0, 0.0]);
    }

    #[test]
    fn evaluation_is_deterministic() {
        let mut matrix = bound();
        matrix.set("r", 0.25);
        matrix.evaluate().unwrap();
        let first = matrix
            .rows()
            .to_vec()
            .iter()
            .flat_map(|r| {
                matrix
                    .cols()
                    .to_vec()
                    .iter()
                    .map(|c| matrix.payoff(r, c).unwrap().to_vec())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        matrix.evaluate().unwrap();
        let second = matrix
            .rows()
            .to_vec()
            .iter()
            .flat_map(|r| {
                matrix
                    .cols()
                    .to_vec()
                    .iter()
                    .map(|c| matrix.payoff(r, c).unwrap().to_vec())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        assert_eq!(first, second);
    }

    #[test]
    fn overlays_bind_variables_per_role() {
        let mut matrix = bound();
        let donor = std::iter::once(("r".to_string(), 1.0)).collect::<BTreeMap<_, _>>();
        let recipient = std::iter::once(("r".to_string(), 0.0)).collect::<BTreeMap<_, _>>();
        matrix.evaluate_for(&[donor, recipient]).unwrap();
        let disc = strategy(matrix.rows(), "DISC");
        let ur = strategy(matrix.cols(), "UR");
        let payoffs = matrix.payoff(&disc, &ur).unwrap();
        assert_eq!(payoffs[0], 2.0, "donor side sees r = 1");
        assert_eq!(payoffs[1], -1.0, "recipient side sees r = 0");
    }

    #[test]
    fn wrong_overlay_count_is_rejected() {
        let mut matrix = bound();
        assert!(matrix.evaluate_for(&[BTreeMap::new()]).is_err());
    }

    #[test]
    #[should_panic(expected = "evaluated")]
    fn payoff_before_evaluation_panics() {
        let matrix = bound();
        let c = strategy(matrix.rows(), "C");
        let nr = strategy(matrix.cols(), "NR");
        let _ = matrix.payoff(&c, &nr);
    }

    #[test]
    fn foreign_labels_are_named_in_errors() {
        let mut matrix = bound();
        matrix.set("r", 0.5);
        matrix.evaluate().unwrap();
        let alien = Strategy::new("TFT", 9);
        let nr = strategy(matrix.cols(), "NR");
        let e = matrix.payoff(&alien, &nr).unwrap_err();
        assert!(e.to_string().contains("TFT"));
    }

    #[test]
    fn jagged_and_misshapen_text_is_rejected() {
        assert!(PayoffMatrix::try_from("donor recipient:x,A\nR,1:2,3:4").is_err());
        assert!(PayoffMatrix::try_from("donor recipient:x,A\nR,1").is_err());
        assert!(PayoffMatrix::try_from("donor recipient:x,A\nR,1:2\nR,1:2").is_err());
        assert!(PayoffMatrix::try_from("").is_err());
        assert!(PayoffMatrix::try_from(":x,A\nR,1").is_err());
    }

    #[test]
    fn undeclared_variables_can_still_be_bound() {
        let mut matrix = PayoffMatrix::try_from("donor recipient:,A\nR,lambda:0").unwrap();
        assert!(matrix.evaluate().is_err(), "lambda starts unbound");
        matrix.set("lambda", 2.5);
        matrix.evaluate().unwrap();
        let r = strategy(matrix.rows(), "R");
        let a = strategy(matrix.cols(), "A");
        assert_eq!(matrix.payoff(&r, &a).unwrap(), &[2.5, 0.0]);
    }
}
