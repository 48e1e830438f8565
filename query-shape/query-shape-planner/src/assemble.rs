//! Compilation of a frozen expand tree into one composable query

use itertools::Itertools;
use query_shape_model::{
    TypeId, Var, VarAllocator,
    catalog::Catalog,
    expr::{Expr, FieldRef, Lambda, OrderKey, Proc, QueryOp, RecordKind},
    rewrite::{compose_select, narrowing_guard, null_guard, type_test},
};
use tracing::{debug, debug_span};

use crate::{
    Capabilities, PlanResult, PlannerConfig,
    expand_tree::{ExpandNode, FrozenExpandTree},
    projection::ProjectedPropertyList,
    wrapper::WrapperKind,
};

pub(crate) struct Assembled {
    pub query: Expr,
    pub unwrap_null_marker: bool,
}

pub(crate) struct Assembler<'a, C: Catalog + ?Sized> {
    pub catalog: &'a C,
    pub tree: &'a FrozenExpandTree,
    pub config: &'a PlannerConfig,
    pub capabilities: Capabilities,
    pub vars: VarAllocator,
}

/// Where a value read by a root ordering key lives in the projected output
struct Location<'a> {
    node: &'a ExpandNode,
    /// The value the node produced
    value: Expr,
    /// The type the record is known to have
    bound_type: TypeId,
}

impl<'a, C: Catalog + ?Sized> Assembler<'a, C> {
    pub fn assemble(mut self) -> PlanResult<Assembled> {
        let root = self.tree.root();
        let _entered = debug_span!("assemble", set = %root.set_name()).entered();

        let mut query = Expr::source(root.set_name().clone());
        if let Some(filter) = root.filter() {
            query = query.then(QueryOp::Where(filter.clone()));
        }

        let mut unwrap_null_marker = false;
        if !root.yields_raw_record() {
            let var = self.vars.alloc();
            let record = Expr::param(var);
            let mut value = self.node_value(root, &record);

            if root.single_result() && !self.capabilities.can_express_typed_null {
                value = null_guard(record, value, Expr::record(RecordKind::EmptyMarker, []));
                unwrap_null_marker = true;
            }

            query = compose_select(query, Lambda::new(var, value));
        }

        if let Some(ordering) = root.ordering() {
            let keys = ordering
                .keys
                .iter()
                .map(|key| OrderKey {
                    key: Lambda::new(key.key.param, self.rebase(&key.key.body, key.key.param)),
                    direction: key.direction,
                })
                .collect();
            query = query.then(QueryOp::OrderBy(keys));
        }

        if let Some(skip) = root.skip() {
            query = query.then(QueryOp::Skip(skip));
        }
        if let Some(take) = root.take() {
            query = query.then(QueryOp::Take(take));
        }
        query = self.apply_limit(root, query);

        debug!("assembled {query}");

        Ok(Assembled {
            query,
            unwrap_null_marker,
        })
    }

    /// The value `node` produces for the raw `record`
    fn node_value(&mut self, node: &ExpandNode, record: &Expr) -> Expr {
        match node.wrapper().kind() {
            WrapperKind::None => record.clone(),
            WrapperKind::ProjectionOnly => match node.projected() {
                Some(projected) => self.element_value(node, projected, record),
                None => record.clone(),
            },
            WrapperKind::Expansion => {
                let element = match node.projected() {
                    Some(projected) if node.wrapper().element_projected() => {
                        self.element_value(node, projected, record)
                    }
                    _ => record.clone(),
                };

                let mut slots = vec![element];
                for child in node.children().values() {
                    let child = self.tree.node(*child);
                    let value = self.child_value(child, record);
                    slots.push(self.object_cast(value));
                }

                if let (Some(continuation), Some(ordering)) = (node.continuation(), node.ordering())
                {
                    slots.push(continuation.embed(&ordering.keys, record));
                }

                debug_assert_eq!(slots.len(), node.wrapper().slots().len());
                Expr::record(RecordKind::Expanded, slots)
            }
        }
    }

    /// Projection of `record` dispatched on its runtime type.
    ///
    /// The most derived type is tested first.
    fn element_value(
        &mut self,
        node: &ExpandNode,
        projected: &ProjectedPropertyList,
        record: &Expr,
    ) -> Expr {
        let base_type = node.base_type();
        if node.hierarchy().len() == 1 {
            return self.projection_branch(node, projected, record, base_type);
        }

        let mut chain = if self.catalog.type_info(base_type).is_abstract() {
            Expr::null(None)
        } else {
            self.projection_branch(node, projected, record, base_type)
        };

        let provider_callback = self.capabilities.provider_type_dispatch();
        for ty in node.hierarchy()[1..].iter().copied() {
            if self.catalog.type_info(ty).is_abstract() {
                continue;
            }

            let branch = self.projection_branch(node, projected, record, ty);
            debug_assert!(
                chain.is_null_constant()
                    || chain_width(&chain) == branch.as_record().map(|(_, slots)| slots.len()),
                "type dispatch branches of different shape"
            );

            chain = Expr::condition(
                type_test(record.clone(), ty, provider_callback),
                branch,
                chain,
            );
        }

        chain
    }

    /// The projection record of an instance of `ty`
    fn projection_branch(
        &mut self,
        node: &ExpandNode,
        projected: &ProjectedPropertyList,
        record: &Expr,
        ty: TypeId,
    ) -> Expr {
        let catalog = self.catalog;
        let mut populated_names = vec![];
        let mut slots = Vec::with_capacity(projected.len() + 2);

        for property in projected.iter() {
            let populated = match property.declaring_type {
                Some(declaring_type) => catalog.is_ancestor_or_self(declaring_type, ty),
                None => catalog.resolve_open_field(ty, &property.name).is_none(),
            };

            let value = if populated {
                populated_names.push(property.name.clone());

                let receiver = if property.target_type == node.base_type() {
                    record.clone()
                } else {
                    Expr::type_as(record.clone(), property.target_type)
                };

                match property.declared {
                    Some(prop_id) => Expr::field(receiver, prop_id),
                    None => Expr::open_field(receiver, property.name.clone()),
                }
            } else if self.capabilities.can_express_typed_null {
                Expr::null(property.declared.map(|prop_id| catalog.property(prop_id).target))
            } else {
                Expr::null(None)
            };

            slots.push(self.object_cast(value));
        }

        slots.push(Expr::text(catalog.type_info(ty).name.clone()));
        slots.push(Expr::text(populated_names.iter().join(",")));

        Expr::record(RecordKind::Projected, slots)
    }

    /// The value of an expanded child, navigated to from the parent `record`
    fn child_value(&mut self, child: &ExpandNode, record: &Expr) -> Expr {
        let _entered = debug_span!("child", path = %self.tree.path(child.id())).entered();

        let Some(relationship) = child.relationship() else {
            return Expr::null(None);
        };

        let mut access = if relationship.narrowed {
            Expr::field(
                Expr::type_as(record.clone(), relationship.declaring_type),
                relationship.prop_id,
            )
        } else {
            Expr::field(record.clone(), relationship.prop_id)
        };

        if relationship.narrowed && self.capabilities.requires_null_guards_for_polymorphic_access {
            access = narrowing_guard(
                record.clone(),
                relationship.declaring_type,
                access,
                Expr::null(None),
                self.capabilities.provider_type_dispatch(),
            );
        }

        if child.single_result() {
            return if child.yields_raw_record() {
                access
            } else {
                let value = self.node_value(child, &access);
                null_guard(access, value, Expr::null(None))
            };
        }

        let mut query = access;
        if let Some(filter) = child.filter() {
            query = query.then(QueryOp::Where(filter.clone()));
        }
        if let Some(ordering) = child.ordering() {
            query = query.then(QueryOp::OrderBy(ordering.keys.clone()));
        }
        if let Some(skip) = child.skip() {
            query = query.then(QueryOp::Skip(skip));
        }
        if let Some(take) = child.take() {
            query = query.then(QueryOp::Take(take));
        }
        query = self.apply_limit(child, query);

        if child.yields_raw_record() {
            query
        } else {
            let var = self.vars.alloc();
            let value = self.node_value(child, &Expr::param(var));
            compose_select(query, Lambda::new(var, value))
        }
    }

    /// The page cap, or one element beyond the soft limit so that excess results are detected
    fn apply_limit(&self, node: &ExpandNode, query: Expr) -> Expr {
        if let Some(page_size) = node.page_size() {
            return query.then(QueryOp::Take(u64::from(page_size)));
        }

        if node.single_result() {
            return query;
        }

        match node
            .max_results()
            .or(self.config.max_results_per_collection)
        {
            Some(limit) => query.then(QueryOp::Take(limit.saturating_add(1))),
            None => query,
        }
    }

    fn object_cast(&self, value: Expr) -> Expr {
        if self.capabilities.requires_explicit_object_cast {
            Expr::call(Proc::ToObject, [value])
        } else {
            value
        }
    }

    /// Rewrite a root ordering key to read from the projected output instead of the record
    fn rebase(&self, expr: &Expr, param: Var) -> Expr {
        match expr {
            Expr::Field(receiver, field) => match self.locate(receiver, param) {
                Some(location) => self.read_field(&location, field),
                None => Expr::Field(Box::new(self.rebase(receiver, param)), field.clone()),
            },
            Expr::Param(var) if *var == param => {
                let root = self.tree.root();
                match root.wrapper().kind() {
                    WrapperKind::Expansion => Expr::slot(expr.clone(), 0),
                    _ => expr.clone(),
                }
            }
            Expr::TypeAs(inner, ty) => Expr::type_as(self.rebase(inner, param), *ty),
            Expr::TypeCheck(inner, ty) => Expr::type_check(self.rebase(inner, param), *ty),
            Expr::Call(proc, args) => Expr::call(*proc, args.iter().map(|arg| self.rebase(arg, param))),
            Expr::Condition(test, then, otherwise) => Expr::condition(
                self.rebase(test, param),
                self.rebase(then, param),
                self.rebase(otherwise, param),
            ),
            _ => expr.clone(),
        }
    }

    fn locate(&self, expr: &Expr, param: Var) -> Option<Location<'a>> {
        match expr {
            Expr::Param(var) if *var == param => {
                let root = self.tree.root();
                Some(Location {
                    node: root,
                    value: expr.clone(),
                    bound_type: root.base_type(),
                })
            }
            Expr::TypeAs(inner, ty) => {
                let location = self.locate(inner, param)?;
                Some(Location {
                    bound_type: *ty,
                    ..location
                })
            }
            Expr::Field(receiver, field @ FieldRef::Declared(prop_id)) => {
                let location = self.locate(receiver, param)?;
                let child = location.node.children().values().find_map(|child| {
                    let child = self.tree.node(*child);
                    child
                        .relationship()
                        .filter(|relationship| relationship.prop_id == *prop_id)
                        .map(|relationship| (child, relationship))
                })?;

                let (child, relationship) = child;
                let value = match location
                    .node
                    .wrapper()
                    .child_slot(&relationship.name)
                {
                    Some(index) => Expr::slot(location.value.clone(), index),
                    None => self.read_field(&location, field),
                };

                Some(Location {
                    node: child,
                    value,
                    bound_type: child.base_type(),
                })
            }
            _ => None,
        }
    }

    fn read_field(&self, location: &Location, field: &FieldRef) -> Expr {
        let node = location.node;
        let (element, projected) = match node.wrapper().kind() {
            WrapperKind::Expansion => (
                Expr::slot(location.value.clone(), 0),
                node.projected()
                    .filter(|_| node.wrapper().element_projected()),
            ),
            WrapperKind::ProjectionOnly => (location.value.clone(), node.projected()),
            WrapperKind::None => (location.value.clone(), None),
        };

        let raw_field = |element: Expr| {
            let receiver = if location.bound_type == node.base_type() {
                element
            } else {
                Expr::type_as(element, location.bound_type)
            };
            Expr::Field(Box::new(receiver), field.clone())
        };

        let Some(projected) = projected else {
            return raw_field(element);
        };

        let indexes: Vec<usize> = match field {
            FieldRef::Declared(prop_id) => projected
                .index_of(
                    &self.catalog.property(*prop_id).name,
                    Some(prop_id.declaring_type()),
                )
                .into_iter()
                .collect(),
            // one slot per declaring type, and each instance populates at most one of them
            FieldRef::Open(name) => projected.indexes_named(name).collect(),
        };

        debug_assert!(!indexes.is_empty(), "ordering field {field:?} is not projected");

        coalesce_slots(&element, &indexes).unwrap_or_else(|| raw_field(element))
    }
}

/// The first non-null of the given slots of `record`
fn coalesce_slots(record: &Expr, indexes: &[usize]) -> Option<Expr> {
    let (last, rest) = indexes.split_last()?;

    Some(
        rest.iter()
            .rev()
            .fold(Expr::slot(record.clone(), *last), |fallback, index| {
                let slot = Expr::slot(record.clone(), *index);
                null_guard(slot.clone(), slot, fallback)
            }),
    )
}

fn chain_width(expr: &Expr) -> Option<usize> {
    match expr {
        Expr::Condition(_, then, _) => chain_width(then),
        expr => expr.as_record().map(|(_, slots)| slots.len()),
    }
}
