//! The planning tree: one [ExpandNode] per expanded level of a request

use std::sync::Arc;

use arcstr::ArcStr;
use indexmap::IndexMap;
use query_shape_model::{
    PropId, TypeId,
    catalog::Catalog,
    expr::{Lambda, OrderKey},
    request::RequestNode,
    types::PropertyKind,
};
use serde::Serialize;
use tracing::{debug, debug_span};

use crate::{
    PlanError, PlanResult, PlannerConfig,
    continuation::ContinuationDescriptor,
    metadata_cache::{MetadataCache, ResolvedType},
    projection::ProjectedPropertyList,
    wrapper::{WrapperKind, WrapperShape},
};

#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct NodeId(u32);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Debug for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node@{}", self.0)
    }
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Default, Serialize, Debug)]
    pub struct ExpandFlags: u8 {
        const IS_ROOT                  = 0b00000001;
        const SINGLE_RESULT            = 0b00000010;
        /// The node or one of its descendants carries a filter
        const HAS_FILTER_WITHIN        = 0b00000100;
        const REQUIRES_WRAPPER         = 0b00001000;
        const NEEDS_CONTINUATION_TOKEN = 0b00010000;
        /// Neither this node nor any non-root ancestor uses partial selection or ordering
        const BACK_COMPATIBLE          = 0b00100000;
        const PROJECT_ALL              = 0b01000000;
    }
}

/// The relationship a child node is reached through
#[derive(Clone, Debug)]
pub struct Relationship {
    pub name: ArcStr,
    pub prop_id: PropId,
    pub declaring_type: TypeId,
    /// The relationship is declared on a strict subtype of the parent's type,
    /// so the parent record must be narrowed before navigating
    pub narrowed: bool,
}

#[derive(Clone, Debug)]
pub struct NodeOrdering {
    pub keys: Vec<OrderKey>,
    /// Set when the level is paged
    pub page_size: Option<u32>,
}

#[derive(Clone, Debug)]
pub struct ExpandNode {
    pub(crate) id: NodeId,
    pub(crate) parent: Option<NodeId>,
    pub(crate) relationship: Option<Relationship>,
    pub(crate) set_name: ArcStr,
    pub(crate) resolved: Arc<ResolvedType>,
    pub(crate) flags: ExpandFlags,
    pub(crate) selected: Vec<ArcStr>,
    pub(crate) filter: Option<Lambda>,
    pub(crate) ordering: Option<NodeOrdering>,
    pub(crate) skip: Option<u64>,
    pub(crate) take: Option<u64>,
    pub(crate) max_results: Option<u64>,
    pub(crate) children: IndexMap<ArcStr, NodeId>,
    pub(crate) projected: Option<ProjectedPropertyList>,
    pub(crate) wrapper: WrapperShape,
    pub(crate) continuation: Option<ContinuationDescriptor>,
}

impl ExpandNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn relationship(&self) -> Option<&Relationship> {
        self.relationship.as_ref()
    }

    pub fn set_name(&self) -> &ArcStr {
        &self.set_name
    }

    pub fn base_type(&self) -> TypeId {
        self.resolved.id
    }

    pub fn hierarchy(&self) -> &[TypeId] {
        &self.resolved.hierarchy
    }

    pub fn flags(&self) -> ExpandFlags {
        self.flags
    }

    pub fn is_root(&self) -> bool {
        self.flags.contains(ExpandFlags::IS_ROOT)
    }

    pub fn single_result(&self) -> bool {
        self.flags.contains(ExpandFlags::SINGLE_RESULT)
    }

    pub fn requires_wrapper(&self) -> bool {
        self.flags.contains(ExpandFlags::REQUIRES_WRAPPER)
    }

    pub fn needs_continuation_token(&self) -> bool {
        self.flags.contains(ExpandFlags::NEEDS_CONTINUATION_TOKEN)
    }

    pub fn project_all(&self) -> bool {
        self.flags.contains(ExpandFlags::PROJECT_ALL)
    }

    pub fn selected(&self) -> &[ArcStr] {
        &self.selected
    }

    pub fn filter(&self) -> Option<&Lambda> {
        self.filter.as_ref()
    }

    pub fn ordering(&self) -> Option<&NodeOrdering> {
        self.ordering.as_ref()
    }

    pub fn page_size(&self) -> Option<u32> {
        self.ordering.as_ref().and_then(|ordering| ordering.page_size)
    }

    pub fn skip(&self) -> Option<u64> {
        self.skip
    }

    pub fn take(&self) -> Option<u64> {
        self.take
    }

    pub fn max_results(&self) -> Option<u64> {
        self.max_results
    }

    /// Expanded children by relationship name, in request order
    pub fn children(&self) -> &IndexMap<ArcStr, NodeId> {
        &self.children
    }

    /// The projected property list, absent when the whole record is fetched
    pub fn projected(&self) -> Option<&ProjectedPropertyList> {
        self.projected.as_ref()
    }

    pub fn wrapper(&self) -> &WrapperShape {
        &self.wrapper
    }

    pub fn continuation(&self) -> Option<&ContinuationDescriptor> {
        self.continuation.as_ref()
    }

    /// Whether the value this node produces per record is the record itself
    pub fn yields_raw_record(&self) -> bool {
        self.wrapper.kind() == WrapperKind::None
    }
}

/// The mutable planning tree, before freezing.
#[derive(Debug)]
pub struct ExpandTree {
    nodes: Vec<ExpandNode>,
    effective_expand_by_default: bool,
}

impl ExpandTree {
    /// Build the planning tree for a request, with structural flags computed bottom-up.
    pub fn build<C: Catalog + ?Sized>(
        request: &RequestNode,
        cache: &MetadataCache<C>,
        config: &PlannerConfig,
    ) -> PlanResult<Self> {
        let mut builder = TreeBuilder {
            cache,
            config,
            nodes: vec![],
        };
        builder.add_node(request, None, true)?;

        let mut tree = ExpandTree {
            nodes: builder.nodes,
            effective_expand_by_default: false,
        };

        let back_compatible = tree
            .nodes
            .iter()
            .all(|node| node.flags.contains(ExpandFlags::BACK_COMPATIBLE));
        tree.effective_expand_by_default = config.expand_by_default && back_compatible;

        debug!(
            "expand tree with {} nodes, expand by default: {}",
            tree.nodes.len(),
            tree.effective_expand_by_default
        );

        tree.compute_requires_wrapper(NodeId::ROOT);

        Ok(tree)
    }

    pub fn root(&self) -> &ExpandNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &ExpandNode {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut ExpandNode {
        &mut self.nodes[id.index()]
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + use<> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn effective_expand_by_default(&self) -> bool {
        self.effective_expand_by_default
    }

    /// A readable path of relationship names from the root
    pub fn path(&self, id: NodeId) -> ArcStr {
        path(&self.nodes, id)
    }

    /// Whether the node is loaded by the data source as part of its parent record
    pub fn is_source_expanded(&self, id: NodeId) -> bool {
        is_source_expanded(&self.nodes, id)
    }

    /// End the planning phase. Nothing in the tree can change afterwards.
    pub fn freeze(self) -> FrozenExpandTree {
        FrozenExpandTree {
            nodes: self.nodes.into(),
            effective_expand_by_default: self.effective_expand_by_default,
        }
    }

    fn compute_requires_wrapper(&mut self, id: NodeId) -> bool {
        let children: Vec<NodeId> = self.node(id).children.values().copied().collect();
        let mut any_child_requires_wrapper = false;
        for child in &children {
            // every child must be visited, so no short-circuit here
            any_child_requires_wrapper |= self.compute_requires_wrapper(*child);
        }

        let expand_by_default = self.effective_expand_by_default;
        let node = self.node_mut(id);
        let requires_wrapper = node.flags.contains(ExpandFlags::NEEDS_CONTINUATION_TOKEN)
            || any_child_requires_wrapper
            || node.flags.contains(ExpandFlags::HAS_FILTER_WITHIN)
            || (!expand_by_default && !children.is_empty());

        node.flags.set(ExpandFlags::REQUIRES_WRAPPER, requires_wrapper);
        requires_wrapper
    }
}

/// The planning tree after freezing. Slot assignments in it are final.
#[derive(Debug)]
pub struct FrozenExpandTree {
    nodes: Box<[ExpandNode]>,
    effective_expand_by_default: bool,
}

impl FrozenExpandTree {
    pub fn root(&self) -> &ExpandNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &ExpandNode {
        &self.nodes[id.index()]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ExpandNode> {
        self.nodes.iter()
    }

    pub fn child(&self, node: &ExpandNode, relationship: &str) -> Option<&ExpandNode> {
        node.children.get(relationship).map(|id| self.node(*id))
    }

    pub fn effective_expand_by_default(&self) -> bool {
        self.effective_expand_by_default
    }

    pub fn path(&self, id: NodeId) -> ArcStr {
        path(&self.nodes, id)
    }

    pub fn is_source_expanded(&self, id: NodeId) -> bool {
        is_source_expanded(&self.nodes, id)
    }
}

fn is_source_expanded(nodes: &[ExpandNode], id: NodeId) -> bool {
    nodes[id.index()].parent.is_some_and(|parent| {
        !nodes[parent.index()]
            .flags
            .contains(ExpandFlags::REQUIRES_WRAPPER)
    })
}

fn path(nodes: &[ExpandNode], id: NodeId) -> ArcStr {
    let mut segments = vec![];
    let mut next = Some(id);
    while let Some(current) = next {
        let node = &nodes[current.index()];
        match &node.relationship {
            Some(relationship) => segments.push(relationship.name.clone()),
            None => segments.push(node.set_name.clone()),
        }
        next = node.parent;
    }
    segments.reverse();
    segments.join("/").into()
}

struct TreeBuilder<'a, 'c, C: Catalog + ?Sized> {
    cache: &'a MetadataCache<'c, C>,
    config: &'a PlannerConfig,
    nodes: Vec<ExpandNode>,
}

impl<C: Catalog + ?Sized> TreeBuilder<'_, '_, C> {
    fn add_node(
        &mut self,
        request: &RequestNode,
        parent: Option<(NodeId, Relationship)>,
        parent_back_compatible: bool,
    ) -> PlanResult<NodeId> {
        let resolved = self
            .cache
            .resolve_id(request.resource_type)
            .ok_or(PlanError::UnknownType(request.resource_type))?;

        let id = NodeId(self.nodes.len() as u32);
        let _entered = debug_span!("expand", ?id, set = %request.set_name).entered();

        let (parent_id, relationship) = match parent {
            Some((parent_id, relationship)) => (Some(parent_id), Some(relationship)),
            None => (None, None),
        };
        let is_root = parent_id.is_none();

        let single_result = match &relationship {
            Some(relationship) => {
                self.cache.catalog().property(relationship.prop_id).kind
                    == PropertyKind::ResourceReference
            }
            None => request.single_result,
        };

        let partial_selection = !request.project_all;
        let back_compatible = parent_back_compatible
            && (is_root || !(partial_selection || request.ordering.is_some()));

        let ordering = request.ordering.as_ref().map(|ordering| NodeOrdering {
            keys: ordering.keys.clone(),
            page_size: if ordering.is_paged && !single_result {
                Some(self.config.page_size(&request.set_name))
            } else {
                None
            },
        });

        let mut flags = ExpandFlags::empty();
        flags.set(ExpandFlags::IS_ROOT, is_root);
        flags.set(ExpandFlags::SINGLE_RESULT, single_result);
        flags.set(ExpandFlags::BACK_COMPATIBLE, back_compatible);
        flags.set(ExpandFlags::PROJECT_ALL, request.project_all);
        flags.set(
            ExpandFlags::NEEDS_CONTINUATION_TOKEN,
            ordering
                .as_ref()
                .is_some_and(|ordering| ordering.page_size.is_some()),
        );
        // the root filter is request-level and applies to the source itself
        flags.set(
            ExpandFlags::HAS_FILTER_WITHIN,
            !is_root && request.filter.is_some(),
        );

        self.nodes.push(ExpandNode {
            id,
            parent: parent_id,
            relationship,
            set_name: request.set_name.clone(),
            resolved: resolved.clone(),
            flags,
            selected: request.selected.clone(),
            filter: request.filter.clone(),
            ordering,
            skip: request.skip,
            take: request.take,
            max_results: request.max_results,
            children: Default::default(),
            projected: None,
            wrapper: WrapperShape::default(),
            continuation: None,
        });

        let mut filter_within = false;
        for (name, child_request) in &request.children {
            let relationship = self.resolve_relationship(&resolved, name)?;
            let child = self.add_node(child_request, Some((id, relationship)), back_compatible)?;

            filter_within |= self.nodes[child.index()]
                .flags
                .contains(ExpandFlags::HAS_FILTER_WITHIN);
            self.nodes[id.index()].children.insert(name.clone(), child);
        }

        if filter_within {
            self.nodes[id.index()]
                .flags
                .insert(ExpandFlags::HAS_FILTER_WITHIN);
        }

        Ok(id)
    }

    fn resolve_relationship(&self, resolved: &ResolvedType, name: &ArcStr) -> PlanResult<Relationship> {
        let catalog = self.cache.catalog();
        let base = resolved.id;

        let prop_id = catalog.resolve_open_field(base, name).or_else(|| {
            resolved.derived().iter().find_map(|ty| {
                catalog
                    .type_info(*ty)
                    .own_property(name)
                    .map(|prop| prop.id)
            })
        });

        let Some(prop_id) = prop_id else {
            let type_name = catalog.type_info(base).name.clone();
            let any_open = resolved
                .hierarchy
                .iter()
                .any(|ty| catalog.type_info(*ty).is_open());

            return Err(if any_open {
                PlanError::OpenPropertyExpansion {
                    type_name,
                    name: name.clone(),
                }
            } else {
                PlanError::PropertyNotFound {
                    type_name,
                    name: name.clone(),
                }
            });
        };

        let prop = catalog.property(prop_id);
        if !prop.kind.is_relationship() {
            return Err(PlanError::NotARelationship {
                type_name: catalog.type_info(base).name.clone(),
                name: name.clone(),
            });
        }

        let declaring_type = prop_id.declaring_type();

        Ok(Relationship {
            name: name.clone(),
            prop_id,
            declaring_type,
            narrowed: !catalog.is_ancestor_or_self(declaring_type, base),
        })
    }
}
