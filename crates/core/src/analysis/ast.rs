#[derive(Clone, Debug, PartialEq)]
pub struct Script {
    pub statements: Vec<Statement>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Let { name: String, pipeline: Pipeline },
    Emit { pipeline: Pipeline },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pipeline {
    pub source: String,
    pub stages: Vec<Stage>,
    pub line: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stage {
    Where(Expr),
    Select(Vec<String>),
    Derive(Vec<(String, Expr)>),
    Join { source: String, key: String },
    Summarize { aggregates: Vec<Aggregate>, by: Vec<String> },
    Sort { column: String, descending: bool },
    Limit(usize),
    Count,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggFunction {
    Count,
    Sum,
    Mean,
    Min,
    Max,
    Median,
    Std,
    Corr,
}

impl AggFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(Self::Count),
            "sum" => Some(Self::Sum),
            "mean" | "avg" => Some(Self::Mean),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            "median" => Some(Self::Median),
            "std" | "stddev" => Some(Self::Std),
            "corr" => Some(Self::Corr),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Min => "min",
            Self::Max => "max",
            Self::Median => "median",
            Self::Std => "std",
            Self::Corr => "corr",
        }
    }

    /// Accepted column-argument counts.
    pub fn arity(&self) -> &'static [usize] {
        match self {
            Self::Count => &[0, 1],
            Self::Corr => &[2],
            _ => &[1],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    pub function: AggFunction,
    pub args: Vec<String>,
    pub alias: Option<String>,
}

impl Aggregate {
    pub fn output_name(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        if self.args.is_empty() {
            return self.function.name().to_string();
        }
        format!("{}_{}", self.function.name(), self.args.join("_"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Number(f64),
    Column(String),
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
}
