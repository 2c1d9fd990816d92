//! Query AST structures
//!
//! Defines the predicate tree, sort specification and result window the
//! compilers consume.

use crate::item::Value;

/// A filter over one entity.
///
/// A closed set of operators; compilation rejects anything it cannot serve
/// from the declared indices.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// All children match
    And(Vec<Predicate>),
    /// Any child matches
    Or(Vec<Predicate>),
    /// field = value
    Equal(String, Value),
    /// field != value
    NotEqual(String, Value),
    /// field > value
    GreaterThan(String, Value),
    /// field >= value
    GreaterOrEqual(String, Value),
    /// field < value
    LowerThan(String, Value),
    /// field <= value
    LowerOrEqual(String, Value),
    /// field is one of the values
    In(String, Vec<Value>),
    /// field is none of the values
    NotIn(String, Vec<Value>),
}

impl Predicate {
    /// Create a conjunction
    pub fn and(children: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::And(children.into_iter().collect())
    }

    /// Create a disjunction
    pub fn or(children: impl IntoIterator<Item = Predicate>) -> Self {
        Predicate::Or(children.into_iter().collect())
    }

    /// Create an equality predicate
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Equal(field.into(), value.into())
    }

    /// Create an inequality predicate
    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::NotEqual(field.into(), value.into())
    }

    /// Create a range predicate (gt)
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::GreaterThan(field.into(), value.into())
    }

    /// Create a range predicate (gte)
    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::GreaterOrEqual(field.into(), value.into())
    }

    /// Create a range predicate (lt)
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::LowerThan(field.into(), value.into())
    }

    /// Create a range predicate (lte)
    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::LowerOrEqual(field.into(), value.into())
    }

    /// Create a membership predicate
    pub fn is_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Predicate::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    /// Create an exclusion predicate
    pub fn not_in<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Predicate::NotIn(field.into(), values.into_iter().map(Into::into).collect())
    }

    /// Operator name for logs and errors
    pub fn op_name(&self) -> &'static str {
        match self {
            Predicate::And(_) => "and",
            Predicate::Or(_) => "or",
            Predicate::Equal(..) => "eq",
            Predicate::NotEqual(..) => "ne",
            Predicate::GreaterThan(..) => "gt",
            Predicate::GreaterOrEqual(..) => "gte",
            Predicate::LowerThan(..) => "lt",
            Predicate::LowerOrEqual(..) => "lte",
            Predicate::In(..) => "in",
            Predicate::NotIn(..) => "nin",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Sort specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    /// Field to sort by
    pub field: String,
    /// Sort direction
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Slice of the sorted match list to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    /// Leading matches to skip
    pub offset: usize,
    /// Maximum items returned, `None` for all
    pub limit: Option<usize>,
}

impl Window {
    /// Every match
    pub fn all() -> Self {
        Self::default()
    }

    /// `limit` matches after skipping `offset`
    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: Some(limit),
        }
    }
}

/// A find request
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    /// Top-level predicates, combined with AND
    pub predicates: Vec<Predicate>,
    /// Sort specification; at most one field is supported
    pub sort: Vec<SortSpec>,
    /// Result window
    pub window: Window,
}

impl Query {
    /// Creates a query matching every item
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a predicate
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Adds an equality filter
    pub fn filter_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_predicate(Predicate::eq(field, value))
    }

    /// Adds a sort field
    pub fn with_sort(mut self, sort: SortSpec) -> Self {
        self.sort.push(sort);
        self
    }

    /// Sets the maximum number of items returned
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.window.limit = Some(limit);
        self
    }

    /// Sets the number of leading matches skipped
    pub fn with_offset(mut self, offset: usize) -> Self {
        self.window.offset = offset;
        self
    }
}
