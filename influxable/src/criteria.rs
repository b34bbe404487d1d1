//! Comparison expressions for WHERE clauses.
//!
//! ```rust
//! use influxable::criteria::Field;
//!
//! let value = Field::new("value");
//! let either = value.lt(400).or(value.gt(800));
//! assert_eq!(either.evaluate(), r#"("value" < 400 OR "value" > 800)"#);
//! assert_eq!((!value.lt(400)).evaluate(), r#""value" >= 400"#);
//! ```

use std::fmt;
use std::ops::Not;

use crate::error::InvalidArgumentError;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// `<`
    Lt,
    /// `<=`
    Lte,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `=`
    Eq,
    /// `!=`
    Ne,
}

impl Operator {
    /// Returns the textual symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "=",
            Self::Ne => "!=",
        }
    }

    /// Returns the logical complement.
    pub fn complement(self) -> Self {
        match self {
            Self::Lt => Self::Gte,
            Self::Gte => Self::Lt,
            Self::Lte => Self::Gt,
            Self::Gt => Self::Lte,
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
        }
    }
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// Integer, rendered unquoted.
    Integer(i64),
    /// Float, rendered unquoted.
    Float(f64),
    /// Boolean, rendered unquoted.
    Boolean(bool),
    /// Text, rendered single-quoted.
    String(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "'{v}'"),
        }
    }
}

macro_rules! literal_from {
    ($variant:ident: $($ty:ty),+) => {
        $(
            impl From<$ty> for Literal {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )+
    };
}

literal_from!(Integer: i64, i32, i16, i8, u32, u16, u8);
literal_from!(Float: f64, f32);
literal_from!(Boolean: bool);
literal_from!(String: String, &str);

/// A named column to compare against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    name: String,
}

impl Field {
    /// Creates a field reference.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn compare(&self, operator: Operator, literal: impl Into<Literal>) -> Comparison {
        Comparison {
            field: self.name.clone(),
            operator,
            literal: literal.into(),
        }
    }

    /// `field < literal`
    pub fn lt(&self, literal: impl Into<Literal>) -> Comparison {
        self.compare(Operator::Lt, literal)
    }

    /// `field <= literal`
    pub fn lte(&self, literal: impl Into<Literal>) -> Comparison {
        self.compare(Operator::Lte, literal)
    }

    /// `field > literal`
    pub fn gt(&self, literal: impl Into<Literal>) -> Comparison {
        self.compare(Operator::Gt, literal)
    }

    /// `field >= literal`
    pub fn gte(&self, literal: impl Into<Literal>) -> Comparison {
        self.compare(Operator::Gte, literal)
    }

    /// `field = literal`
    pub fn eq(&self, literal: impl Into<Literal>) -> Comparison {
        self.compare(Operator::Eq, literal)
    }

    /// `field != literal`
    pub fn ne(&self, literal: impl Into<Literal>) -> Comparison {
        self.compare(Operator::Ne, literal)
    }
}

/// A single `"field" op literal` relation.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    field: String,
    operator: Operator,
    literal: Literal,
}

impl Comparison {
    /// Returns the field name.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Returns the operator.
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Returns the literal.
    pub fn literal(&self) -> &Literal {
        &self.literal
    }

    /// Renders the relation.
    pub fn evaluate(&self) -> String {
        format!("\"{}\" {} {}", self.field, self.operator.symbol(), self.literal)
    }

    /// Combines with another criterion into a disjunction.
    pub fn or(self, other: impl Into<Criterion>) -> Criterion {
        Criterion::from(self).or(other)
    }
}

impl Not for Comparison {
    type Output = Self;

    fn not(self) -> Self {
        Self {
            operator: self.operator.complement(),
            ..self
        }
    }
}

/// A WHERE-clause expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    /// A single comparison.
    Compare(Comparison),
    /// `(left OR right)`
    Or(Box<Criterion>, Box<Criterion>),
}

impl Criterion {
    /// Combines with another criterion into a disjunction.
    pub fn or(self, other: impl Into<Self>) -> Self {
        Self::Or(Box::new(self), Box::new(other.into()))
    }

    /// Renders the expression.
    pub fn evaluate(&self) -> String {
        match self {
            Self::Compare(cmp) => cmp.evaluate(),
            Self::Or(left, right) => format!("({} OR {})", left.evaluate(), right.evaluate()),
        }
    }

    /// Checks that every comparison names a field and carries a finite literal.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgumentError::MalformedCriterion`] otherwise.
    pub fn validate(&self) -> Result<(), InvalidArgumentError> {
        match self {
            Self::Compare(cmp) => {
                if cmp.field.trim().is_empty() {
                    return Err(InvalidArgumentError::MalformedCriterion {
                        reason: "comparison has an empty field name".to_string(),
                    });
                }
                if let Literal::Float(v) = cmp.literal
                    && !v.is_finite()
                {
                    return Err(InvalidArgumentError::MalformedCriterion {
                        reason: format!("field '{}' is compared to non-finite {v}", cmp.field),
                    });
                }
                Ok(())
            }
            Self::Or(left, right) => {
                left.validate()?;
                right.validate()
            }
        }
    }
}

impl From<Comparison> for Criterion {
    fn from(cmp: Comparison) -> Self {
        Self::Compare(cmp)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.evaluate())
    }
}
