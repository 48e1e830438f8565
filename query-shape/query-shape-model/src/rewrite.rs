//! Rewrite combinators and traversal over [Expr]

use crate::{
    TypeId, Var,
    expr::{Expr, Lambda, OrderKey, Proc, QueryOp},
};

pub trait ExprVisitor<'e> {
    fn visit_expr(&mut self, expr: &'e Expr) {
        self.traverse_expr(expr);
    }

    #[allow(unused_variables)]
    fn visit_param(&mut self, var: Var) {}

    #[allow(unused_variables)]
    fn visit_binder(&mut self, var: Var) {}

    fn visit_lambda(&mut self, lambda: &'e Lambda) {
        self.visit_binder(lambda.param);
        self.visit_expr(&lambda.body);
    }

    fn traverse_expr(&mut self, expr: &'e Expr) {
        match expr {
            Expr::Param(var) => self.visit_param(*var),
            Expr::Constant(_) | Expr::Source(_) => {}
            Expr::Field(receiver, _) | Expr::Slot(receiver, _) => self.visit_expr(receiver),
            Expr::Call(_, args) | Expr::Record(_, args) => {
                for arg in args {
                    self.visit_expr(arg);
                }
            }
            Expr::Condition(test, then, otherwise) => {
                self.visit_expr(test);
                self.visit_expr(then);
                self.visit_expr(otherwise);
            }
            Expr::Lambda(lambda) => self.visit_lambda(lambda),
            Expr::TypeCheck(inner, _) | Expr::TypeAs(inner, _) => self.visit_expr(inner),
            Expr::Query(input, op) => {
                self.visit_expr(input);
                match op.as_ref() {
                    QueryOp::Where(lambda) | QueryOp::Select(lambda) => self.visit_lambda(lambda),
                    QueryOp::OrderBy(keys) => {
                        for key in keys {
                            self.visit_lambda(&key.key);
                        }
                    }
                    QueryOp::Skip(_) | QueryOp::Take(_) => {}
                }
            }
        }
    }
}

/// Replace free occurrences of `var` in `expr` with `with`.
///
/// Lambdas binding the same variable shadow it.
pub fn substitute_param(expr: &Expr, var: Var, with: &Expr) -> Expr {
    let sub = |expr: &Expr| substitute_param(expr, var, with);
    let sub_lambda = |lambda: &Lambda| {
        if lambda.param == var {
            lambda.clone()
        } else {
            Lambda::new(lambda.param, sub(&lambda.body))
        }
    };

    match expr {
        Expr::Param(param) if *param == var => with.clone(),
        Expr::Param(_) | Expr::Constant(_) | Expr::Source(_) => expr.clone(),
        Expr::Field(receiver, field) => Expr::Field(Box::new(sub(receiver)), field.clone()),
        Expr::Slot(receiver, index) => Expr::Slot(Box::new(sub(receiver)), *index),
        Expr::Call(proc, args) => Expr::Call(*proc, args.iter().map(sub).collect()),
        Expr::Record(kind, slots) => Expr::Record(*kind, slots.iter().map(sub).collect()),
        Expr::Condition(test, then, otherwise) => {
            Expr::condition(sub(test), sub(then), sub(otherwise))
        }
        Expr::Lambda(lambda) => Expr::Lambda(sub_lambda(lambda)),
        Expr::TypeCheck(inner, ty) => Expr::type_check(sub(inner), *ty),
        Expr::TypeAs(inner, ty) => Expr::type_as(sub(inner), *ty),
        Expr::Query(input, op) => {
            let op = match op.as_ref() {
                QueryOp::Where(lambda) => QueryOp::Where(sub_lambda(lambda)),
                QueryOp::Select(lambda) => QueryOp::Select(sub_lambda(lambda)),
                QueryOp::OrderBy(keys) => QueryOp::OrderBy(
                    keys.iter()
                        .map(|key| OrderKey {
                            key: sub_lambda(&key.key),
                            direction: key.direction,
                        })
                        .collect(),
                ),
                QueryOp::Skip(count) => QueryOp::Skip(*count),
                QueryOp::Take(count) => QueryOp::Take(*count),
            };
            sub(input).then(op)
        }
    }
}

/// `access` when `receiver` is non-null, otherwise `fallback`
pub fn null_guard(receiver: Expr, access: Expr, fallback: Expr) -> Expr {
    Expr::condition(Expr::is_null(receiver), fallback, access)
}

/// `access` when `receiver` is of type `ty`, otherwise `fallback`.
///
/// The type test is evaluated by the source itself when `provider_callback` is set.
pub fn narrowing_guard(
    receiver: Expr,
    ty: TypeId,
    access: Expr,
    fallback: Expr,
    provider_callback: bool,
) -> Expr {
    Expr::condition(type_test(receiver, ty, provider_callback), access, fallback)
}

pub fn type_test(receiver: Expr, ty: TypeId, provider_callback: bool) -> Expr {
    if provider_callback {
        Expr::call(Proc::ProviderIsOfType(ty), [receiver])
    } else {
        Expr::type_check(receiver, ty)
    }
}

/// Apply `selector` to every element of `input`.
///
/// When `input` already ends in a select, the two selectors are fused into one.
pub fn compose_select(input: Expr, selector: Lambda) -> Expr {
    match input {
        Expr::Query(inner, op) => match *op {
            QueryOp::Select(previous) => {
                let fused = selector.apply(&previous.body);
                inner.then(QueryOp::Select(Lambda::new(previous.param, fused)))
            }
            op => Expr::Query(inner, Box::new(op)).then(QueryOp::Select(selector)),
        },
        input => input.then(QueryOp::Select(selector)),
    }
}

/// The highest variable used anywhere in the expression
pub fn max_var(expr: &Expr) -> Option<Var> {
    struct MaxVar(Option<Var>);

    impl<'e> ExprVisitor<'e> for MaxVar {
        fn visit_param(&mut self, var: Var) {
            self.0 = self.0.max(Some(var));
        }

        fn visit_binder(&mut self, var: Var) {
            self.0 = self.0.max(Some(var));
        }
    }

    let mut visitor = MaxVar(None);
    visitor.visit_expr(expr);
    visitor.0
}
