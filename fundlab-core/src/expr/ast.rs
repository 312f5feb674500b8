use std::fmt;

/// Parsed expression. Built once per request and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Column(String),
    Literal(Literal),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call(Call),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// `<`, `<=`, `>`, `>=`; equality is separate.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Reduction functions over a quarter column's Q4 series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Cagr,
    Mean,
}

impl Reduction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cagr" => Some(Reduction::Cagr),
            "mean" => Some(Reduction::Mean),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Reduction::Cagr => "cagr",
            Reduction::Mean => "mean",
        }
    }
}

/// `cagr(column[, years[, strict]])` or `mean(column)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub func: Reduction,
    pub column: String,
    /// Anchor the start `years` fiscal years before the latest one.
    pub years: Option<u32>,
    /// Require every year-over-year change in the window to be non-negative.
    pub strict: bool,
}

impl Expr {
    /// Column names referenced anywhere in the expression, in order of
    /// first appearance.
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.visit_columns(&mut out);
        out
    }

    fn visit_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Column(name) | Expr::Call(Call { column: name, .. }) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Expr::Literal(_) => {}
            Expr::Neg(inner) => inner.visit_columns(out),
            Expr::Binary { left, right, .. } => {
                left.visit_columns(out);
                right.visit_columns(out);
            }
        }
    }

    pub fn has_call(&self) -> bool {
        match self {
            Expr::Call(_) => true,
            Expr::Column(_) | Expr::Literal(_) => false,
            Expr::Neg(inner) => inner.has_call(),
            Expr::Binary { left, right, .. } => left.has_call() || right.has_call(),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{n}"),
            Literal::Text(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Literal::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Fully parenthesized, so the output parses back to the same tree.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Column(name) => f.write_str(name),
            Expr::Literal(lit) => write!(f, "{lit}"),
            Expr::Neg(inner) => write!(f, "(-{inner})"),
            Expr::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Expr::Call(call) => {
                write!(f, "{}({}", call.func.name(), call.column)?;
                if let Some(years) = call.years {
                    write!(f, ", {years}")?;
                }
                if call.strict {
                    f.write_str(", true")?;
                }
                f.write_str(")")
            }
        }
    }
}
