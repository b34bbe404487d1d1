//! Aggregate, selector and transformation functions for SELECT clauses.
//!
//! ```rust
//! use influxable::function::{self, FunctionArg};
//!
//! assert_eq!(function::mean("value").evaluate(), "MEAN(value)");
//! assert_eq!(function::count(FunctionArg::All).evaluate(), "COUNT(*)");
//! assert_eq!(function::top(["value"], 3).evaluate(), "TOP(value, 3)");
//! assert_eq!(
//!     function::derivative(function::mean("value")).evaluate(),
//!     "DERIVATIVE(MEAN(value))"
//! );
//! ```

use std::fmt;

/// Subject of a function call.
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionArg {
    /// `*`
    All,
    /// A field name, rendered verbatim.
    Field(String),
    /// A nested call.
    Function(Box<Function>),
}

impl fmt::Display for FunctionArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Field(name) => f.write_str(name),
            Self::Function(inner) => write!(f, "{inner}"),
        }
    }
}

impl From<&str> for FunctionArg {
    fn from(name: &str) -> Self {
        if name == "*" {
            Self::All
        } else {
            Self::Field(name.to_string())
        }
    }
}

impl From<String> for FunctionArg {
    fn from(name: String) -> Self {
        name.as_str().into()
    }
}

impl From<Function> for FunctionArg {
    fn from(inner: Function) -> Self {
        Self::Function(Box::new(inner))
    }
}

/// A call expression `NAME(subject[, subject...][, parameter])`.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    name: &'static str,
    subjects: Vec<FunctionArg>,
    parameter: Option<String>,
}

impl Function {
    /// Creates a call with the given subjects. No subjects renders `*`.
    pub fn new<I, A>(name: &'static str, subjects: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<FunctionArg>,
    {
        Self {
            name,
            subjects: subjects.into_iter().map(Into::into).collect(),
            parameter: None,
        }
    }

    /// Appends a trailing parameter, as used by selectors like `TOP`.
    #[must_use]
    pub fn with_parameter(mut self, parameter: impl fmt::Display) -> Self {
        self.parameter = Some(parameter.to_string());
        self
    }

    /// Returns the function name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Renders the call.
    pub fn evaluate(&self) -> String {
        let mut args: Vec<String> = if self.subjects.is_empty() {
            vec![FunctionArg::All.to_string()]
        } else {
            self.subjects.iter().map(ToString::to_string).collect()
        };
        args.extend(self.parameter.iter().cloned());
        format!("{}({})", self.name, args.join(", "))
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.evaluate())
    }
}

macro_rules! unary_functions {
    ($($(#[$doc:meta])* $fn_name:ident => $name:literal),+ $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $fn_name(subject: impl Into<FunctionArg>) -> Function {
                Function::new($name, [subject.into()])
            }
        )+
    };
}

unary_functions! {
    /// `COUNT(subject)`
    count => "COUNT",
    /// `DISTINCT(subject)`
    distinct => "DISTINCT",
    /// `INTEGRAL(subject)`
    integral => "INTEGRAL",
    /// `MEAN(subject)`
    mean => "MEAN",
    /// `MEDIAN(subject)`
    median => "MEDIAN",
    /// `MODE(subject)`
    mode => "MODE",
    /// `SPREAD(subject)`
    spread => "SPREAD",
    /// `STDDEV(subject)`
    stddev => "STDDEV",
    /// `SUM(subject)`
    sum => "SUM",
    /// `FIRST(subject)`
    first => "FIRST",
    /// `LAST(subject)`
    last => "LAST",
    /// `MAX(subject)`
    max => "MAX",
    /// `MIN(subject)`
    min => "MIN",
    /// `ABS(subject)`
    abs => "ABS",
    /// `CEIL(subject)`
    ceil => "CEIL",
    /// `FLOOR(subject)`
    floor => "FLOOR",
    /// `ROUND(subject)`
    round => "ROUND",
    /// `SQRT(subject)`
    sqrt => "SQRT",
    /// `DERIVATIVE(subject)`
    derivative => "DERIVATIVE",
    /// `DIFFERENCE(subject)`
    difference => "DIFFERENCE",
    /// `CUMULATIVE_SUM(subject)`
    cumulative_sum => "CUMULATIVE_SUM",
}

/// `TOP(subjects, n)`
pub fn top<I, A>(subjects: I, n: u64) -> Function
where
    I: IntoIterator<Item = A>,
    A: Into<FunctionArg>,
{
    Function::new("TOP", subjects).with_parameter(n)
}

/// `BOTTOM(subjects, n)`
pub fn bottom<I, A>(subjects: I, n: u64) -> Function
where
    I: IntoIterator<Item = A>,
    A: Into<FunctionArg>,
{
    Function::new("BOTTOM", subjects).with_parameter(n)
}

/// `SAMPLE(subject, n)`
pub fn sample(subject: impl Into<FunctionArg>, n: u64) -> Function {
    Function::new("SAMPLE", [subject.into()]).with_parameter(n)
}

/// `PERCENTILE(subject, n)`
pub fn percentile(subject: impl Into<FunctionArg>, n: f64) -> Function {
    Function::new("PERCENTILE", [subject.into()]).with_parameter(n)
}
