//! Continuation tokens for paged levels

use arcstr::ArcStr;
use fnv::FnvHashMap;
use itertools::Itertools;
use query_shape_model::{
    TypeId,
    catalog::Catalog,
    expr::{Expr, FieldRef, OrderKey, RecordKind},
};
use serde::Serialize;
use smallvec::SmallVec;

use crate::{
    PlanError, PlanResult,
    expand_tree::{ExpandTree, NodeId},
};

/// Describes the continuation token sub-record of a paged node.
///
/// The token holds one value slot per ordering key followed by the descriptor slot.
#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct ContinuationDescriptor {
    /// Value type of each key, None when it is only known at runtime (open fields)
    key_types: SmallVec<Option<TypeId>, 2>,
    /// The comma separated key names
    key_names: ArcStr,
}

impl ContinuationDescriptor {
    pub fn key_types(&self) -> &[Option<TypeId>] {
        &self.key_types
    }

    pub fn key_names(&self) -> &ArcStr {
        &self.key_names
    }

    pub fn slot_count(&self) -> usize {
        self.key_types.len() + 1
    }

    /// The token record for the element `record`
    pub fn embed(&self, keys: &[OrderKey], record: &Expr) -> Expr {
        debug_assert_eq!(keys.len(), self.key_types.len());

        Expr::record(
            RecordKind::ContinuationToken,
            keys.iter()
                .map(|key| key.key.apply(record))
                .chain([Expr::text(self.key_names.clone())]),
        )
    }
}

/// Describe the continuation token of every node that needs one.
pub(crate) fn describe_continuations<C: Catalog + ?Sized>(
    tree: &mut ExpandTree,
    catalog: &C,
) -> PlanResult<()> {
    for id in tree.node_ids() {
        let node = tree.node(id);
        if !node.needs_continuation_token() {
            continue;
        }
        let Some(ordering) = node.ordering() else {
            continue;
        };

        let descriptor = describe(tree, id, &ordering.keys, catalog)?;
        tree.node_mut(id).continuation = Some(descriptor);
    }

    Ok(())
}

fn describe<C: Catalog + ?Sized>(
    tree: &ExpandTree,
    id: NodeId,
    keys: &[OrderKey],
    catalog: &C,
) -> PlanResult<ContinuationDescriptor> {
    let base_type = tree.node(id).base_type();

    let mut key_types = SmallVec::new();
    for (index, key) in keys.iter().enumerate() {
        let params = FnvHashMap::from_iter([(key.key.param, base_type)]);
        match key.key.body.value_type(catalog, &params) {
            Some(ty) => key_types.push(Some(ty)),
            None if is_open_access(&key.key.body) => key_types.push(None),
            None => {
                return Err(PlanError::UninferableOrderKey {
                    path: tree.path(id),
                    index,
                });
            }
        }
    }

    let key_names = keys
        .iter()
        .enumerate()
        .map(|(index, key)| {
            field_path(&key.key.body, catalog)
                .filter(|path| !path.is_empty())
                .map(|path| path.join("/"))
                .unwrap_or_else(|| format!("key{index}"))
        })
        .join(",");

    Ok(ContinuationDescriptor {
        key_types,
        key_names: key_names.into(),
    })
}

fn is_open_access(expr: &Expr) -> bool {
    match expr {
        Expr::Field(_, FieldRef::Open(_)) => true,
        Expr::TypeAs(inner, _) => is_open_access(inner),
        _ => false,
    }
}

/// Names of the fields navigated from the key parameter, outermost last
fn field_path<C: Catalog + ?Sized>(expr: &Expr, catalog: &C) -> Option<Vec<ArcStr>> {
    match expr {
        Expr::Param(_) => Some(vec![]),
        Expr::TypeAs(inner, _) => field_path(inner, catalog),
        Expr::Field(receiver, field) => {
            let mut path = field_path(receiver, catalog)?;
            path.push(match field {
                FieldRef::Declared(prop_id) => catalog.property(*prop_id).name.clone(),
                FieldRef::Open(name) => name.clone(),
            });
            Some(path)
        }
        _ => None,
    }
}
