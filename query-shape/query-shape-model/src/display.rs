use std::fmt::{Display, Formatter};

use crate::{
    TypeId,
    catalog::Catalog,
    expr::{Expr, FieldRef, Lambda, Literal, Proc, QueryOp, RecordKind},
};

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Printer { catalog: None }.print(self, f)
    }
}

impl Expr {
    /// Display using type and property names from the catalog
    pub fn display<'a>(&'a self, catalog: &'a dyn Catalog) -> WithNames<'a> {
        WithNames {
            expr: self,
            catalog,
        }
    }
}

pub struct WithNames<'a> {
    expr: &'a Expr,
    catalog: &'a dyn Catalog,
}

impl Display for WithNames<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Printer {
            catalog: Some(self.catalog),
        }
        .print(self.expr, f)
    }
}

/// Prints expressions as single-line s-expressions
#[derive(Clone, Copy)]
struct Printer<'c> {
    catalog: Option<&'c dyn Catalog>,
}

impl Printer<'_> {
    fn print(self, expr: &Expr, f: &mut Formatter) -> std::fmt::Result {
        match expr {
            Expr::Param(var) => write!(f, "{var}"),
            Expr::Constant(literal) => self.print_literal(literal, f),
            Expr::Field(receiver, field) => {
                match field {
                    FieldRef::Declared(_) => write!(f, "(. ")?,
                    FieldRef::Open(_) => write!(f, "(.? ")?,
                }
                self.print(receiver, f)?;
                match field {
                    FieldRef::Declared(prop_id) => match self.catalog {
                        Some(catalog) => write!(f, " {})", catalog.property(*prop_id).name),
                        None => write!(f, " {prop_id:?})"),
                    },
                    FieldRef::Open(name) => write!(f, " {name})"),
                }
            }
            Expr::Slot(receiver, index) => {
                write!(f, "(slot ")?;
                self.print(receiver, f)?;
                write!(f, " {index})")
            }
            Expr::Call(proc, args) => {
                let name = match proc {
                    Proc::Eq => "==",
                    Proc::NotEq => "!=",
                    Proc::Lt => "<",
                    Proc::LtEq => "<=",
                    Proc::Gt => ">",
                    Proc::GtEq => ">=",
                    Proc::And => "and",
                    Proc::Or => "or",
                    Proc::Not => "not",
                    Proc::IsNull => "is-null",
                    Proc::ToObject => "to-object",
                    Proc::ProviderIsOfType(ty) => {
                        write!(f, "(provider-is-of-type ")?;
                        self.print_type(*ty, f)?;
                        for arg in args {
                            write!(f, " ")?;
                            self.print(arg, f)?;
                        }
                        return write!(f, ")");
                    }
                };
                write!(f, "({name}")?;
                for arg in args {
                    write!(f, " ")?;
                    self.print(arg, f)?;
                }
                write!(f, ")")
            }
            Expr::Condition(test, then, otherwise) => {
                write!(f, "(if ")?;
                self.print(test, f)?;
                write!(f, " ")?;
                self.print(then, f)?;
                write!(f, " ")?;
                self.print(otherwise, f)?;
                write!(f, ")")
            }
            Expr::Lambda(lambda) => self.print_lambda(lambda, f),
            Expr::TypeCheck(inner, ty) | Expr::TypeAs(inner, ty) => {
                let name = if matches!(expr, Expr::TypeCheck(..)) {
                    "is"
                } else {
                    "as"
                };
                write!(f, "({name} ")?;
                self.print(inner, f)?;
                write!(f, " ")?;
                self.print_type(*ty, f)?;
                write!(f, ")")
            }
            Expr::Record(kind, slots) => {
                let name = match kind {
                    RecordKind::Projected => "projected",
                    RecordKind::Expanded => "expanded",
                    RecordKind::ContinuationToken => "token",
                    RecordKind::EmptyMarker => "empty",
                };
                write!(f, "({name}")?;
                for slot in slots {
                    write!(f, " ")?;
                    self.print(slot, f)?;
                }
                write!(f, ")")
            }
            Expr::Source(set_name) => write!(f, "(source {set_name})"),
            Expr::Query(input, op) => {
                let name = match op.as_ref() {
                    QueryOp::Where(_) => "where",
                    QueryOp::OrderBy(_) => "order-by",
                    QueryOp::Skip(_) => "skip",
                    QueryOp::Take(_) => "take",
                    QueryOp::Select(_) => "select",
                };
                write!(f, "({name} ")?;
                self.print(input, f)?;
                match op.as_ref() {
                    QueryOp::Where(lambda) | QueryOp::Select(lambda) => {
                        write!(f, " ")?;
                        self.print_lambda(lambda, f)?;
                    }
                    QueryOp::OrderBy(keys) => {
                        for key in keys {
                            write!(f, " ({} ", key.direction.as_str())?;
                            self.print_lambda(&key.key, f)?;
                            write!(f, ")")?;
                        }
                    }
                    QueryOp::Skip(count) | QueryOp::Take(count) => {
                        write!(f, " {count}")?;
                    }
                }
                write!(f, ")")
            }
        }
    }

    fn print_lambda(self, lambda: &Lambda, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "(fn ({}) ", lambda.param)?;
        self.print(&lambda.body, f)?;
        write!(f, ")")
    }

    fn print_literal(self, literal: &Literal, f: &mut Formatter) -> std::fmt::Result {
        match literal {
            Literal::Null(None) => write!(f, "null"),
            Literal::Null(Some(ty)) => {
                write!(f, "null:")?;
                self.print_type(*ty, f)
            }
            Literal::Bool(value) => write!(f, "{value}"),
            Literal::I64(value) => write!(f, "{value}"),
            Literal::Text(text) => write!(f, "'{text}'"),
        }
    }

    fn print_type(self, ty: TypeId, f: &mut Formatter) -> std::fmt::Result {
        match self.catalog {
            Some(catalog) => write!(f, "{}", catalog.type_info(ty).name),
            None => write!(f, "{ty:?}"),
        }
    }
}
