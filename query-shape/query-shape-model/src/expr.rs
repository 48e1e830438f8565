//! A small closed expression IR for composable queries.
//!
//! Expressions are plain trees. Lambdas bind a single [Var], and rewriting
//! is done through the combinators in [crate::rewrite].

use arcstr::ArcStr;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

use crate::{PropId, TypeId, Var, catalog::Catalog, order::Direction, types::PrimitiveKind};

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Literal {
    /// A null, typed when the value type is known
    Null(Option<TypeId>),
    Bool(bool),
    I64(i64),
    Text(ArcStr),
}

#[derive(Clone, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum FieldRef {
    Declared(PropId),
    /// A dynamic field, resolved by name at runtime
    Open(ArcStr),
}

/// Built-in operations
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum Proc {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Not,
    IsNull,
    /// Type test delegated to the data source
    ProviderIsOfType(TypeId),
    /// Conversion to the untyped object representation
    ToObject,
}

impl Proc {
    pub fn returns_bool(self) -> bool {
        !matches!(self, Self::ToObject)
    }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Lambda {
    pub param: Var,
    pub body: Box<Expr>,
}

impl Lambda {
    pub fn new(param: Var, body: Expr) -> Self {
        Self {
            param,
            body: Box::new(body),
        }
    }

    /// The body with the parameter replaced by `arg`
    pub fn apply(&self, arg: &Expr) -> Expr {
        crate::rewrite::substitute_param(&self.body, self.param, arg)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum RecordKind {
    /// A subset of a record's fields with a type discriminator
    Projected,
    /// An element combined with its expanded children
    Expanded,
    /// Ordering key values with their descriptor
    ContinuationToken,
    /// Stands in for null where the source cannot express a typed null
    EmptyMarker,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct OrderKey {
    pub key: Lambda,
    pub direction: Direction,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum QueryOp {
    Where(Lambda),
    OrderBy(Vec<OrderKey>),
    Skip(u64),
    Take(u64),
    Select(Lambda),
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub enum Expr {
    Param(Var),
    Constant(Literal),
    Field(Box<Expr>, FieldRef),
    /// Positional access into a synthesized record
    Slot(Box<Expr>, usize),
    Call(Proc, Vec<Expr>),
    Condition(Box<Expr>, Box<Expr>, Box<Expr>),
    Lambda(Lambda),
    /// Runtime type test
    TypeCheck(Box<Expr>, TypeId),
    /// Type narrowing, producing null when the type does not match
    TypeAs(Box<Expr>, TypeId),
    Record(RecordKind, Vec<Expr>),
    /// The base data source of a named set
    Source(ArcStr),
    Query(Box<Expr>, Box<QueryOp>),
}

impl Expr {
    pub fn param(var: Var) -> Self {
        Self::Param(var)
    }

    pub fn field(receiver: Expr, prop_id: PropId) -> Self {
        Self::Field(Box::new(receiver), FieldRef::Declared(prop_id))
    }

    pub fn open_field(receiver: Expr, name: impl Into<ArcStr>) -> Self {
        Self::Field(Box::new(receiver), FieldRef::Open(name.into()))
    }

    pub fn slot(receiver: Expr, index: usize) -> Self {
        Self::Slot(Box::new(receiver), index)
    }

    pub fn null(ty: Option<TypeId>) -> Self {
        Self::Constant(Literal::Null(ty))
    }

    pub fn text(text: impl Into<ArcStr>) -> Self {
        Self::Constant(Literal::Text(text.into()))
    }

    pub fn i64(value: i64) -> Self {
        Self::Constant(Literal::I64(value))
    }

    pub fn bool(value: bool) -> Self {
        Self::Constant(Literal::Bool(value))
    }

    pub fn call(proc: Proc, args: impl IntoIterator<Item = Expr>) -> Self {
        Self::Call(proc, args.into_iter().collect())
    }

    pub fn eq(left: Expr, right: Expr) -> Self {
        Self::call(Proc::Eq, [left, right])
    }

    pub fn is_null(expr: Expr) -> Self {
        Self::call(Proc::IsNull, [expr])
    }

    pub fn condition(test: Expr, then: Expr, otherwise: Expr) -> Self {
        Self::Condition(Box::new(test), Box::new(then), Box::new(otherwise))
    }

    pub fn type_check(expr: Expr, ty: TypeId) -> Self {
        Self::TypeCheck(Box::new(expr), ty)
    }

    pub fn type_as(expr: Expr, ty: TypeId) -> Self {
        Self::TypeAs(Box::new(expr), ty)
    }

    pub fn record(kind: RecordKind, slots: impl IntoIterator<Item = Expr>) -> Self {
        Self::Record(kind, slots.into_iter().collect())
    }

    pub fn source(set_name: impl Into<ArcStr>) -> Self {
        Self::Source(set_name.into())
    }

    /// Compose a query operator on top of this expression
    pub fn then(self, op: QueryOp) -> Self {
        Self::Query(Box::new(self), Box::new(op))
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self, Self::Constant(Literal::Null(_)))
    }

    pub fn as_record(&self) -> Option<(RecordKind, &[Expr])> {
        match self {
            Self::Record(kind, slots) => Some((*kind, slots.as_slice())),
            _ => None,
        }
    }

    /// The query operators applied on top of the innermost non-query input, innermost first
    pub fn query_ops(&self) -> Vec<&QueryOp> {
        let mut ops = vec![];
        let mut current = self;
        while let Self::Query(input, op) = current {
            ops.push(op.as_ref());
            current = input;
        }
        ops.reverse();
        ops
    }

    /// Infer the value type of the expression, where possible.
    ///
    /// `params` maps lambda parameters in scope to the type of record they are bound to.
    pub fn value_type(
        &self,
        catalog: &(impl Catalog + ?Sized),
        params: &FnvHashMap<Var, TypeId>,
    ) -> Option<TypeId> {
        let primitive = |kind: PrimitiveKind| catalog.find_type(kind.name());

        match self {
            Self::Param(var) => params.get(var).copied(),
            Self::Constant(Literal::Null(ty)) => *ty,
            Self::Constant(Literal::Bool(_)) => primitive(PrimitiveKind::Boolean),
            Self::Constant(Literal::I64(_)) => primitive(PrimitiveKind::Int64),
            Self::Constant(Literal::Text(_)) => primitive(PrimitiveKind::String),
            Self::Field(_, FieldRef::Declared(prop_id)) => Some(catalog.property(*prop_id).target),
            Self::Field(_, FieldRef::Open(_)) => None,
            Self::Slot(..) => None,
            Self::Call(proc, _) if proc.returns_bool() => primitive(PrimitiveKind::Boolean),
            Self::Call(..) => None,
            Self::Condition(_, then, otherwise) => then
                .value_type(catalog, params)
                .or_else(|| otherwise.value_type(catalog, params)),
            Self::TypeCheck(..) => primitive(PrimitiveKind::Boolean),
            Self::TypeAs(_, ty) => Some(*ty),
            Self::Lambda(_) | Self::Record(..) | Self::Source(_) | Self::Query(..) => None,
        }
    }
}

impl From<Lambda> for Expr {
    fn from(value: Lambda) -> Self {
        Self::Lambda(value)
    }
}
