use anyhow::Result;
use anyhow::anyhow;
use anyhow::bail;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// An arithmetic expression over named variables.
///
/// Payoff matrices store one of these per cell per role and re-evaluate
/// them whenever a variable (benefit, cost, reputation fraction) moves.
/// The grammar is the usual one: `+ -` bind loosest, then `* /`, then
/// unary minus, then `^` (right-associative), with parentheses to taste.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(f64),
    Var(String),
    Neg(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Evaluate against a variable environment. Referencing a variable
    /// absent from the environment is a data error, not a zero.
    pub fn eval(&self, vars: &BTreeMap<String, f64>) -> Result<f64> {
        match self {
            Self::Num(x) => Ok(*x),
            Self::Var(name) => vars
                .get(name)
                .copied()
                .ok_or_else(|| anyhow!("unknown variable '{}' in expression", name)),
            Self::Neg(e) => Ok(-e.eval(vars)?),
            Self::Add(a, b) => Ok(a.eval(vars)? + b.eval(vars)?),
            Self::Sub(a, b) => Ok(a.eval(vars)? - b.eval(vars)?),
            Self::Mul(a, b) => Ok(a.eval(vars)? * b.eval(vars)?),
            Self::Div(a, b) => Ok(a.eval(vars)? / b.eval(vars)?),
            Self::Pow(a, b) => Ok(a.eval(vars)?.powf(b.eval(vars)?)),
        }
    }

    /// Every variable name this expression references.
    pub fn variables(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect(&mut names);
        names
    }

    fn collect<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Self::Num(_) => {}
            Self::Var(name) => {
                names.insert(name.as_str());
            }
            Self::Neg(e) => e.collect(names),
            Self::Add(a, b) | Self::Sub(a, b) | Self::Mul(a, b) | Self::Div(a, b)
            | Self::Pow(a, b) => {
                a.collect(names);
                b.collect(names);
            }
        }
    }
}

impl TryFrom<&str> for Expr {
    type Error = anyhow::Error;
    fn try_from(src: &str) -> Result<Self> {
        let tokens = Lexer::new(src).tokenize()?;
        let mut parser = Parser {
            tokens: &tokens,
            cursor: 0,
        };
        let expr = parser.expr()?;
        match parser.peek() {
            None => Ok(expr),
            Some(t) => bail!("trailing '{}' after expression '{}'", t, src),
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Num(x) => write!(f, "{}", x),
            Self::Var(name) => write!(f, "{}", name),
            Self::Neg(e) => write!(f, "-{}", e),
            Self::Add(a, b) => write!(f, "({} + {})", a, b),
            Self::Sub(a, b) => write!(f, "({} - {})", a, b),
            Self::Mul(a, b) => write!(f, "({} * {})", a, b),
            Self::Div(a, b) => write!(f, "({} / {})", a, b),
            Self::Pow(a, b) => write!(f, "({} ^ {})", a, b),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Open,
    Close,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Num(x) => write!(f, "{}", x),
            Self::Ident(s) => write!(f, "{}", s),
            Self::Plus => write!(f, "+"),
            Self::Minus => write!(f, "-"),
            Self::Star => write!(f, "*"),
            Self::Slash => write!(f, "/"),
            Self::Caret => write!(f, "^"),
            Self::Open => write!(f, "("),
            Self::Close => write!(f, ")"),
        }
    }
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let c = self.peek();
        self.pos += 1;
        c
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let start = self.pos;
            let Some(c) = self.advance() else {
                return Ok(tokens);
            };
            let token = match c {
                b'+' => Token::Plus,
                b'-' => Token::Minus,
                b'*' => Token::Star,
                b'/' => Token::Slash,
                b'^' => Token::Caret,
                b'(' => Token::Open,
                b')' => Token::Close,
                b'0'..=b'9' | b'.' => {
                    while let Some(c) = self.peek() {
                        if c.is_ascii_digit() || c == b'.' {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    let text = std::str::from_utf8(&self.src[start..self.pos])?;
                    let value = text
                        .parse::<f64>()
                        .map_err(|_| anyhow!("malformed number '{}' at byte {}", text, start))?;
                    Token::Num(value)
                }
                c if c.is_ascii_alphabetic() || c == b'_' => {
                    while let Some(c) = self.peek() {
                        if c.is_ascii_alphanumeric() || c == b'_' {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    let text = std::str::from_utf8(&self.src[start..self.pos])?;
                    Token::Ident(text.to_string())
                }
                c => bail!("unexpected character '{}' at byte {}", c as char, start),
            };
            tokens.push(token);
        }
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    cursor: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor)
    }

    fn next(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.cursor);
        self.cursor += 1;
        t
    }

    fn expr(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.cursor += 1;
                    lhs = Expr::Add(Box::new(lhs), Box::new(self.term()?));
                }
                Some(Token::Minus) => {
                    self.cursor += 1;
                    lhs = Expr::Sub(Box::new(lhs), Box::new(self.term()?));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.cursor += 1;
                    lhs = Expr::Mul(Box::new(lhs), Box::new(self.unary()?));
                }
                Some(Token::Slash) => {
                    self.cursor += 1;
                    lhs = Expr::Div(Box::new(lhs), Box::new(self.unary()?));
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.cursor += 1;
                Ok(Expr::Neg(Box::new(self.unary()?)))
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.atom()?;
        match self.peek() {
            Some(Token::Caret) => {
                self.cursor += 1;
                Ok(Expr::Pow(Box::new(base), Box::new(self.unary()?)))
            }
            _ => Ok(base),
        }
    }

    fn atom(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Num(x)) => Ok(Expr::Num(*x)),
            Some(Token::Ident(name)) => Ok(Expr::Var(name.clone())),
            Some(Token::Open) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => bail!("unclosed parenthesis"),
                }
            }
            Some(t) => bail!("unexpected '{}' in expression", t),
            None => bail!("expression ends unexpectedly"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(src: &str) -> f64 {
        let vars = BTreeMap::new();
        Expr::try_from(src).unwrap().eval(&vars).unwrap()
    }

    fn eval_with(src: &str, bindings: &[(&str, f64)]) -> f64 {
        let vars = bindings
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect::<BTreeMap<_, _>>();
        Expr::try_from(src).unwrap().eval(&vars).unwrap()
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        assert_eq!(eval("2 + 3 * 4"), 14.0);
        assert_eq!(eval("2 * 3 + 4"), 10.0);
    }

    #[test]
    fn parentheses_override_precedence() {
        assert_eq!(eval("(2 + 3) * 4"), 20.0);
        assert_eq!(eval("2 * (3 + 4)"), 14.0);
    }

    #[test]
    fn exponentiation_is_right_associative() {
        assert_eq!(eval("2 ^ 3 ^ 2"), 512.0);
        assert_eq!(eval("(2 ^ 3) ^ 2"), 64.0);
    }

    #[test]
    fn unary_minus_stacks_and_binds_below_power() {
        assert_eq!(eval("-3"), -3.0);
        assert_eq!(eval("--3"), 3.0);
        assert_eq!(eval("-2 ^ 2"), -4.0);
        assert_eq!(eval("2 ^ -1"), 0.5);
        assert_eq!(eval("4 - -1"), 5.0);
    }

    #[test]
    fn division_associates_left() {
        assert_eq!(eval("12 / 3 / 2"), 2.0);
    }

    #[test]
    fn variables_resolve_from_environment() {
        let x = eval_with("b - c * r", &[("b", 4.0), ("c", 1.0), ("r", 0.5)]);
        assert_eq!(x, 3.5);
    }

    #[test]
    fn missing_variable_names_the_offender() {
        let vars = BTreeMap::new();
        let e = Expr::try_from("b - c").unwrap().eval(&vars).unwrap_err();
        assert!(e.to_string().contains("'b'"));
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(Expr::try_from("2 +").is_err());
        assert!(Expr::try_from("(2 + 3").is_err());
        assert!(Expr::try_from("2 3").is_err());
        assert!(Expr::try_from("2 & 3").is_err());
        assert!(Expr::try_from("1.2.3").is_err());
    }

    #[test]
    fn variables_are_collected_once_each() {
        let expr = Expr::try_from("b + b * c - r ^ c").unwrap();
        let names = expr.variables();
        assert_eq!(names.len(), 3);
        assert!(names.contains("b"));
        assert!(names.contains("c"));
        assert!(names.contains("r"));
    }
}
