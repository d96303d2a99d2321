//! RQL abstract syntax tree and tree-walking utilities.
//!
//! The tree is produced by an upstream query-string parser and consumed
//! read-only by the emitter. The single mutation the engine ever needs,
//! swapping a LIMIT window while building pagination links, is expressed as
//! [`RqlNode::replace_clause`], which returns a rewritten copy instead of
//! mutating in place so the same tree can seed several links safely.

use crate::value::SqlValue;
use std::fmt;

/// Comparison operator carried by a predicate leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    /// SQL rendering of the operator.
    pub fn sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
        }
    }

    /// RQL operator name, used for query-string serialization.
    pub fn rql(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Ge => "ge",
            Self::Lt => "lt",
            Self::Le => "le",
        }
    }
}

/// Aggregate function carried by an aggregate leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Sum,
    Min,
    Max,
    Mean,
}

impl AggregateFn {
    /// SQL function name. `Mean` renders as `AVG`.
    pub fn sql(self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Mean => "AVG",
        }
    }

    pub fn rql(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Mean => "mean",
        }
    }
}

/// One sort key from a SORT clause. Serialized with a `+`/`-` prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }
}

/// Kind tag used by the clause-extraction utilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RqlKind {
    And,
    Or,
    Compare,
    In,
    Out,
    Contains,
    Excludes,
    Sort,
    Select,
    Limit,
    Distinct,
    First,
    Aggregate,
}

/// A node of the RQL query tree.
///
/// `And`/`Or` carry only child nodes; every other variant is a leaf carrying
/// named, typed payload.
#[derive(Debug, Clone, PartialEq)]
pub enum RqlNode {
    And(Vec<RqlNode>),
    Or(Vec<RqlNode>),
    Compare {
        op: CompareOp,
        field: String,
        value: Option<SqlValue>,
    },
    In {
        field: String,
        values: Vec<SqlValue>,
    },
    Out {
        field: String,
        values: Vec<SqlValue>,
    },
    Contains {
        field: String,
        pattern: String,
    },
    Excludes {
        field: String,
        pattern: String,
    },
    Sort {
        keys: Vec<SortKey>,
    },
    Select {
        fields: Vec<String>,
    },
    /// One-based window start and row count.
    Limit {
        start: u64,
        count: u64,
    },
    Distinct,
    First,
    Aggregate {
        func: AggregateFn,
        field: String,
    },
}

impl RqlNode {
    /// Convenience constructor for a comparison leaf.
    pub fn compare(op: CompareOp, field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        let value = value.into();
        Self::Compare {
            op,
            field: field.into(),
            value: if value.is_null() { None } else { Some(value) },
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(CompareOp::Eq, field, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(CompareOp::Ne, field, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(CompareOp::Gt, field, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Self::compare(CompareOp::Lt, field, value)
    }

    pub fn limit(start: u64, count: u64) -> Self {
        Self::Limit { start, count }
    }

    pub fn kind(&self) -> RqlKind {
        match self {
            Self::And(_) => RqlKind::And,
            Self::Or(_) => RqlKind::Or,
            Self::Compare { .. } => RqlKind::Compare,
            Self::In { .. } => RqlKind::In,
            Self::Out { .. } => RqlKind::Out,
            Self::Contains { .. } => RqlKind::Contains,
            Self::Excludes { .. } => RqlKind::Excludes,
            Self::Sort { .. } => RqlKind::Sort,
            Self::Select { .. } => RqlKind::Select,
            Self::Limit { .. } => RqlKind::Limit,
            Self::Distinct => RqlKind::Distinct,
            Self::First => RqlKind::First,
            Self::Aggregate { .. } => RqlKind::Aggregate,
        }
    }

    fn children(&self) -> Option<&[RqlNode]> {
        match self {
            Self::And(children) | Self::Or(children) => Some(children),
            _ => None,
        }
    }

    /// Depth-first search through `And`/`Or` combinators for the first node
    /// of the given kind. A match at the root wins over any descendant.
    pub fn extract_clause(&self, kind: RqlKind) -> Option<&RqlNode> {
        if self.kind() == kind {
            return Some(self);
        }
        self.children()?
            .iter()
            .find_map(|child| child.extract_clause(kind))
    }

    /// All aggregate leaves, collected depth-first through `And`/`Or` in
    /// encounter order.
    pub fn extract_aggregates(&self) -> Vec<&RqlNode> {
        let mut found = Vec::new();
        self.collect_aggregates(&mut found);
        found
    }

    fn collect_aggregates<'a>(&'a self, found: &mut Vec<&'a RqlNode>) {
        match self {
            Self::Aggregate { .. } => found.push(self),
            Self::And(children) | Self::Or(children) => {
                for child in children {
                    child.collect_aggregates(found);
                }
            }
            _ => {}
        }
    }

    /// Rewrites the first node of the given kind (same depth-first order as
    /// [`RqlNode::extract_clause`]) with `replacement`, returning a new tree.
    /// The original tree is left untouched; when no node of that kind exists
    /// the result is an unchanged copy.
    pub fn replace_clause(&self, kind: RqlKind, replacement: &RqlNode) -> RqlNode {
        self.replace_first(kind, replacement).0
    }

    fn replace_first(&self, kind: RqlKind, replacement: &RqlNode) -> (RqlNode, bool) {
        if self.kind() == kind {
            return (replacement.clone(), true);
        }
        match self {
            Self::And(children) | Self::Or(children) => {
                let mut replaced = false;
                let rewritten: Vec<RqlNode> = children
                    .iter()
                    .map(|child| {
                        if replaced {
                            child.clone()
                        } else {
                            let (node, hit) = child.replace_first(kind, replacement);
                            replaced |= hit;
                            node
                        }
                    })
                    .collect();
                let node = match self {
                    Self::And(_) => Self::And(rewritten),
                    _ => Self::Or(rewritten),
                };
                (node, replaced)
            }
            _ => (self.clone(), false),
        }
    }
}

/// Serializes the tree back into an RQL query string, the inverse of the
/// upstream parser. Used to build pagination link URLs.
impl fmt::Display for RqlNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(children) | Self::Or(children) => {
                let name = if matches!(self, Self::And(_)) { "and" } else { "or" };
                write!(f, "{name}(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            Self::Compare { op, field, value } => match value {
                Some(value) => write!(f, "{}({field},{value})", op.rql()),
                None => write!(f, "{}({field},null)", op.rql()),
            },
            Self::In { field, values } | Self::Out { field, values } => {
                let name = if matches!(self, Self::In { .. }) { "in" } else { "out" };
                write!(f, "{name}({field}")?;
                for value in values {
                    write!(f, ",{value}")?;
                }
                write!(f, ")")
            }
            Self::Contains { field, pattern } => write!(f, "contains({field},{pattern})"),
            Self::Excludes { field, pattern } => write!(f, "excludes({field},{pattern})"),
            Self::Sort { keys } => {
                write!(f, "sort(")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    let sign = if key.descending { '-' } else { '+' };
                    write!(f, "{sign}{}", key.field)?;
                }
                write!(f, ")")
            }
            Self::Select { fields } => {
                write!(f, "select(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, ")")
            }
            Self::Limit { start, count } => write!(f, "limit({start},{count})"),
            Self::Distinct => write!(f, "distinct()"),
            Self::First => write!(f, "first()"),
            Self::Aggregate { func, field } => write!(f, "{}({field})", func.rql()),
        }
    }
}
