//! Syntax tree for the expression dialect the store accepts.

use std::fmt;

// ---------------------------------------------------------------------------
// Paths and operands
// ---------------------------------------------------------------------------

/// A document path: a head attribute followed by map keys and list indexes,
/// e.g. `#deep.#items[3]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    /// Segments in traversal order; the first is always an attribute.
    pub segments: Vec<Seg>,
}

/// One step of a document path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seg {
    /// Attribute name, kept verbatim: `#token` placeholders are resolved
    /// against the name substitution map at evaluation time.
    Attr(String),
    /// List element index.
    Index(usize),
}

impl Path {
    /// The raw head attribute text, when the path is non-empty.
    #[must_use]
    pub fn head(&self) -> Option<&str> {
        match self.segments.first() {
            Some(Seg::Attr(name)) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                Seg::Attr(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                Seg::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

/// A value-producing term inside a condition or update action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Document path resolved against the item.
    Path(Path),
    /// `:token` placeholder resolved against the value substitution map.
    /// The leading colon is kept so the token doubles as the map key.
    Value(String),
    /// `size(path)`: the stored size of the value at the path.
    Size(Path),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{path}"),
            Self::Value(token) => f.write_str(token),
            Self::Size(path) => write!(f, "size({path})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Comparison operator between two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `=`
    Eq,
    /// `<>`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        })
    }
}

/// A parsed condition, filter, or key-condition expression.
///
/// Functions get dedicated variants rather than a generic call node; the
/// parser enforces each function's arity and argument shapes, so evaluation
/// never has to re-check them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `lhs <op> rhs`
    Compare {
        /// Comparison operator.
        op: CompareOp,
        /// Left operand.
        lhs: Operand,
        /// Right operand.
        rhs: Operand,
    },
    /// `probe BETWEEN low AND high` (inclusive on both ends).
    Between {
        /// Value under test.
        probe: Operand,
        /// Lower bound.
        low: Operand,
        /// Upper bound.
        high: Operand,
    },
    /// `probe IN (choice, ...)`
    In {
        /// Value under test.
        probe: Operand,
        /// Accepted values.
        choices: Vec<Operand>,
    },
    /// Both sub-conditions hold.
    And(Box<Expr>, Box<Expr>),
    /// Either sub-condition holds.
    Or(Box<Expr>, Box<Expr>),
    /// The sub-condition does not hold.
    Not(Box<Expr>),
    /// `attribute_exists(path)`
    Exists(Path),
    /// `attribute_not_exists(path)`
    NotExists(Path),
    /// `begins_with(path, prefix)`
    BeginsWith(Path, Operand),
    /// `contains(path, needle)`
    Contains(Path, Operand),
}

// ---------------------------------------------------------------------------
// Updates
// ---------------------------------------------------------------------------

/// A parsed update expression: the four clause kinds, each possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Update {
    /// `SET path = rhs` assignments.
    pub set: Vec<Assign>,
    /// `REMOVE path` deletions.
    pub remove: Vec<Path>,
    /// `ADD path operand` actions (numeric increment or set union).
    pub add: Vec<(Path, Operand)>,
    /// `DELETE path operand` actions (set subtraction).
    pub delete: Vec<(Path, Operand)>,
}

impl Update {
    /// Whether no clause carries any action.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
            && self.remove.is_empty()
            && self.add.is_empty()
            && self.delete.is_empty()
    }
}

/// One `SET` assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assign {
    /// Destination path.
    pub path: Path,
    /// Value to store there.
    pub rhs: Rhs,
}

/// Right-hand side of a `SET` assignment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rhs {
    /// Plain operand.
    Operand(Operand),
    /// `a + b` numeric addition.
    Add(Operand, Operand),
    /// `a - b` numeric subtraction.
    Sub(Operand, Operand),
    /// `if_not_exists(path, default)`: the stored value when the path
    /// resolves, otherwise the default.
    IfNotExists(Path, Operand),
    /// `list_append(a, b)`: concatenation of two lists.
    ListAppend(Operand, Operand),
}
