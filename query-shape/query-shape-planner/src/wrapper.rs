//! Layout of the synthesized records wrapping each node's output

use arcstr::ArcStr;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::debug;

use crate::{
    PlanError, PlanResult, PlannerConfig,
    expand_tree::{ExpandNode, ExpandTree},
    projection::ProjectedPropertyList,
};

#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Serialize)]
pub enum WrapperKind {
    /// The record is returned as is
    #[default]
    None,
    /// A subset of the record's fields with a type discriminator
    ProjectionOnly,
    /// The element combined with its expanded children
    Expansion,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub enum Slot {
    /// A projected property, by its index in the projected property list
    Field(usize),
    TypeName,
    /// Comma separated names of the fields that are populated for the instance
    PopulatedNames,
    Element,
    Child(ArcStr),
    ContinuationToken,
}

#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize)]
pub struct WrapperShape {
    kind: WrapperKind,
    slots: SmallVec<Slot, 8>,
    /// For expansion wrappers, whether the element is a projection
    element_projected: bool,
}

impl WrapperShape {
    pub fn kind(&self) -> WrapperKind {
        self.kind
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot_index(&self, slot: &Slot) -> Option<usize> {
        self.slots.iter().position(|candidate| candidate == slot)
    }

    pub fn child_slot(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Slot::Child(child) if child == name))
    }

    pub fn element_projected(&self) -> bool {
        self.element_projected
    }

    fn projection(projected: &ProjectedPropertyList) -> Self {
        Self {
            kind: WrapperKind::ProjectionOnly,
            slots: projection_slots(projected),
            element_projected: false,
        }
    }
}

/// The slots of a projection record with the given properties
pub fn projection_slots(projected: &ProjectedPropertyList) -> SmallVec<Slot, 8> {
    (0..projected.len())
        .map(Slot::Field)
        .chain([Slot::TypeName, Slot::PopulatedNames])
        .collect()
}

/// Assign a wrapper shape to every node in the tree.
pub(crate) fn plan_wrappers(tree: &mut ExpandTree, config: &PlannerConfig) -> PlanResult<()> {
    for id in tree.node_ids() {
        let shape = if tree.is_source_expanded(id) {
            WrapperShape::default()
        } else {
            let shape = plan_node(tree.node(id));
            if shape.kind == WrapperKind::Expansion && shape.slots.len() > config.max_wrapper_breadth
            {
                return Err(PlanError::WrapperTooWide {
                    path: tree.path(id),
                    required: shape.slots.len(),
                    limit: config.max_wrapper_breadth,
                });
            }
            shape
        };

        debug!(
            "wrapper of `{}`: {:?} with {} slots",
            tree.path(id),
            shape.kind,
            shape.slots.len()
        );
        tree.node_mut(id).wrapper = shape;
    }

    Ok(())
}

fn plan_node(node: &ExpandNode) -> WrapperShape {
    if node.requires_wrapper() {
        let mut slots: SmallVec<Slot, 8> = SmallVec::new();
        slots.push(Slot::Element);
        slots.extend(node.children().keys().cloned().map(Slot::Child));
        if node.needs_continuation_token() {
            slots.push(Slot::ContinuationToken);
        }

        WrapperShape {
            kind: WrapperKind::Expansion,
            slots,
            element_projected: node.projected().is_some(),
        }
    } else if let Some(projected) = node.projected() {
        WrapperShape::projection(projected)
    } else {
        WrapperShape::default()
    }
}
