//! Resolution of the projected property set of each expand node

use arcstr::ArcStr;
use fnv::FnvHashMap;
use query_shape_model::{
    PropId, TypeId, Var,
    catalog::Catalog,
    expr::{Expr, FieldRef, QueryOp},
    types::PropertyKind,
};
use tracing::{debug, debug_span, trace};

use crate::{
    PlanError, PlanResult,
    expand_tree::{ExpandNode, ExpandTree, NodeId},
};

/// One field a wrapper carries.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProjectedProperty {
    pub name: ArcStr,
    /// Absent for open fields
    pub declared: Option<PropId>,
    /// The type the record must have for the field to be read
    pub target_type: TypeId,
    pub declaring_type: Option<TypeId>,
}

impl ProjectedProperty {
    pub fn is_open(&self) -> bool {
        self.declared.is_none()
    }
}

/// The frozen, ordered field list of one node.
///
/// The position of a property is its slot index within the projection wrapper.
#[derive(Clone, Debug)]
pub struct ProjectedPropertyList {
    properties: Box<[ProjectedProperty]>,
}

impl ProjectedPropertyList {
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ProjectedProperty> {
        self.properties.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProjectedProperty> {
        self.properties.iter()
    }

    /// The slot of the property `name` as declared by `declaring_type`
    pub fn index_of(&self, name: &str, declaring_type: Option<TypeId>) -> Option<usize> {
        self.properties
            .iter()
            .position(|prop| prop.name == name && prop.declaring_type == declaring_type)
    }

    /// All slots of properties named `name`, one per declaring type
    pub fn indexes_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = usize> + 'a {
        self.properties
            .iter()
            .enumerate()
            .filter(move |(_, prop)| prop.name == name)
            .map(|(index, _)| index)
    }
}

/// Resolve and freeze the projected property list of every node in the tree.
pub(crate) fn resolve_projections<C: Catalog + ?Sized>(
    tree: &mut ExpandTree,
    catalog: &C,
) -> PlanResult<()> {
    let mut annotator = OrderingAnnotator {
        tree,
        fields: Default::default(),
    };
    annotator.annotate_tree();
    let mut ordering_fields = annotator.fields;

    for id in tree.node_ids() {
        let node = tree.node(id);
        let _entered = debug_span!("project", path = %tree.path(id)).entered();

        let projected = if tree.is_source_expanded(id) {
            None
        } else {
            let resolver = NodeResolver {
                catalog,
                node,
                candidates: vec![],
            };
            resolver.resolve(
                source_expanded_relationships(tree, id),
                ordering_fields.remove(&id).unwrap_or_default(),
            )?
        };

        match &projected {
            Some(list) => debug!("{} projected properties", list.len()),
            None => debug!("full record"),
        }

        tree.node_mut(id).projected = projected;
    }

    Ok(())
}

/// Relationships of the children the data source loads together with the records of `id`
fn source_expanded_relationships(tree: &ExpandTree, id: NodeId) -> Vec<PropId> {
    let node = tree.node(id);
    if node.requires_wrapper() {
        return vec![];
    }

    node.children()
        .values()
        .filter_map(|child| tree.node(*child).relationship())
        .map(|relationship| relationship.prop_id)
        .collect()
}

struct NodeResolver<'a, C: Catalog + ?Sized> {
    catalog: &'a C,
    node: &'a ExpandNode,
    candidates: Vec<ProjectedProperty>,
}

impl<C: Catalog + ?Sized> NodeResolver<'_, C> {
    fn resolve(
        mut self,
        source_expanded: Vec<PropId>,
        ordering_fields: Vec<(FieldRef, TypeId)>,
    ) -> PlanResult<Option<ProjectedPropertyList>> {
        let catalog = self.catalog;
        let node = self.node;

        if node
            .hierarchy()
            .iter()
            .any(|ty| catalog.type_info(*ty).has_stream())
        {
            return Ok(None);
        }

        let selects_stream = node.selected().iter().any(|name| self.is_stream(name));
        if node.project_all() {
            if !selects_stream {
                return Ok(None);
            }
            self.register_all_fields();
        }

        for name in node.selected() {
            self.select(name)?;
        }

        // without an expansion wrapper, expanded children travel in the relationship field
        for prop_id in source_expanded {
            self.register_declared(prop_id);
        }

        for prop_id in catalog.key_properties(node.base_type()) {
            self.register_declared(prop_id);
        }

        for (field, bound_type) in ordering_fields {
            match field {
                FieldRef::Declared(prop_id) => self.register_declared(prop_id),
                FieldRef::Open(name) => match catalog.resolve_open_field(bound_type, &name) {
                    Some(prop_id) => self.register_declared(prop_id),
                    None => self.select(&name)?,
                },
            }
        }

        for ty in self.concrete_types() {
            for prop_id in catalog.etag_properties(node.set_name(), ty) {
                self.register_declared(prop_id);
            }
        }

        self.expand_open_candidates();

        Ok(Some(self.freeze()))
    }

    fn concrete_types(&self) -> Vec<TypeId> {
        self.node
            .hierarchy()
            .iter()
            .copied()
            .filter(|ty| !self.catalog.type_info(*ty).is_abstract())
            .collect()
    }

    fn is_stream(&self, name: &str) -> bool {
        self.node.hierarchy().iter().any(|ty| {
            self.catalog
                .resolve_open_field(*ty, name)
                .is_some_and(|prop_id| self.catalog.property(prop_id).kind == PropertyKind::Stream)
        })
    }

    /// Every declared non-navigation field of every type in the hierarchy
    fn register_all_fields(&mut self) {
        let catalog = self.catalog;
        let mut ancestry = vec![];
        let mut next = catalog.type_info(self.node.base_type()).base;
        while let Some(ty) = next {
            ancestry.push(ty);
            next = catalog.type_info(ty).base;
        }
        ancestry.reverse();
        ancestry.extend(self.node.hierarchy());

        for ty in ancestry {
            for prop in &catalog.type_info(ty).properties {
                if !prop.kind.is_relationship() {
                    self.register_declared(prop.id);
                }
            }
        }
    }

    fn select(&mut self, name: &ArcStr) -> PlanResult<()> {
        let catalog = self.catalog;
        let node = self.node;

        if let Some(prop_id) = catalog.resolve_open_field(node.base_type(), name) {
            if !self.is_expanded_by_wrapper(prop_id) {
                self.register_declared(prop_id);
            }
            return Ok(());
        }

        if node
            .hierarchy()
            .iter()
            .any(|ty| catalog.type_info(*ty).is_open())
        {
            self.register(ProjectedProperty {
                name: name.clone(),
                declared: None,
                target_type: node.base_type(),
                declaring_type: None,
            });
            return Ok(());
        }

        let declared_on_subtypes: Vec<PropId> = node
            .hierarchy()
            .iter()
            .filter_map(|ty| catalog.type_info(*ty).own_property(name))
            .map(|prop| prop.id)
            .collect();

        if declared_on_subtypes.is_empty() {
            return Err(PlanError::PropertyNotFound {
                type_name: catalog.type_info(node.base_type()).name.clone(),
                name: name.clone(),
            });
        }

        for prop_id in declared_on_subtypes {
            if !self.is_expanded_by_wrapper(prop_id) {
                self.register_declared(prop_id);
            }
        }

        Ok(())
    }

    /// Relationships delivered through a child slot of the expansion wrapper
    fn is_expanded_by_wrapper(&self, prop_id: PropId) -> bool {
        self.catalog.property(prop_id).kind.is_relationship()
            && self.node.requires_wrapper()
            && self
                .node
                .children()
                .contains_key(&self.catalog.property(prop_id).name)
    }

    fn register_declared(&mut self, prop_id: PropId) {
        let declaring_type = prop_id.declaring_type();
        let base = self.node.base_type();
        let target_type = if self.catalog.is_ancestor_or_self(declaring_type, base) {
            base
        } else {
            declaring_type
        };

        self.register(ProjectedProperty {
            name: self.catalog.property(prop_id).name.clone(),
            declared: Some(prop_id),
            target_type,
            declaring_type: Some(declaring_type),
        });
    }

    fn register(&mut self, property: ProjectedProperty) {
        if self.candidates.iter().any(|candidate| {
            candidate.name == property.name && candidate.declaring_type == property.declaring_type
        }) {
            return;
        }

        trace!("register `{}` ({:?})", property.name, property.declaring_type);
        self.candidates.push(property);
    }

    /// Give each concrete type declaring an open name its own slot
    fn expand_open_candidates(&mut self) {
        let open_names: Vec<ArcStr> = self
            .candidates
            .iter()
            .filter(|candidate| candidate.is_open())
            .map(|candidate| candidate.name.clone())
            .collect();

        for name in open_names {
            let mut lacking_type = false;
            for ty in self.concrete_types() {
                match self.catalog.resolve_open_field(ty, &name) {
                    Some(prop_id) => self.register_declared(prop_id),
                    None => lacking_type = true,
                }
            }

            if !lacking_type {
                self.candidates
                    .retain(|candidate| !(candidate.is_open() && candidate.name == name));
            }
        }
    }

    fn freeze(self) -> ProjectedPropertyList {
        debug_assert!(
            self.candidates.iter().enumerate().all(|(index, candidate)| {
                self.candidates[..index].iter().all(|other| {
                    other.name != candidate.name || other.declaring_type != candidate.declaring_type
                })
            }),
            "duplicate projection slot"
        );

        ProjectedPropertyList {
            properties: self.candidates.into(),
        }
    }
}

/// Finds the fields ordering keys read, and the node whose records they are read from.
struct OrderingAnnotator<'a> {
    tree: &'a ExpandTree,
    fields: FnvHashMap<NodeId, Vec<(FieldRef, TypeId)>>,
}

impl OrderingAnnotator<'_> {
    fn annotate_tree(&mut self) {
        for id in self.tree.node_ids() {
            let node = self.tree.node(id);
            // the root is ordered after projection, other levels only need their keys when paged
            if !(node.is_root() || node.page_size().is_some()) {
                continue;
            }

            let Some(ordering) = node.ordering() else {
                continue;
            };

            for key in &ordering.keys {
                self.annotate(&key.key.body, key.key.param, id);
            }
        }
    }

    /// Register the field accesses of `expr` on the nodes they read from.
    ///
    /// Returns the node, and the type of its record, that `expr` evaluates to.
    fn annotate(&mut self, expr: &Expr, param: Var, node: NodeId) -> Option<(NodeId, TypeId)> {
        match expr {
            Expr::Param(var) if *var == param => Some((node, self.tree.node(node).base_type())),
            Expr::TypeAs(inner, ty) => {
                let (located, _) = self.annotate(inner, param, node)?;
                Some((located, *ty))
            }
            Expr::Field(receiver, field) => {
                let (located, bound_type) = self.annotate(receiver, param, node)?;
                let located_node = self.tree.node(located);

                if let FieldRef::Declared(prop_id) = field {
                    let child = located_node
                        .children()
                        .values()
                        .copied()
                        .find(|child| {
                            self.tree
                                .node(*child)
                                .relationship()
                                .is_some_and(|relationship| relationship.prop_id == *prop_id)
                        });

                    if let Some(child) = child {
                        return Some((child, self.tree.node(child).base_type()));
                    }
                }

                trace!("ordering reads {field:?} on {located:?}");
                self.fields
                    .entry(located)
                    .or_default()
                    .push((field.clone(), bound_type));

                None
            }
            Expr::Slot(receiver, _) => {
                self.annotate(receiver, param, node);
                None
            }
            Expr::Call(_, args) | Expr::Record(_, args) => {
                for arg in args {
                    self.annotate(arg, param, node);
                }
                None
            }
            Expr::Condition(test, then, otherwise) => {
                self.annotate(test, param, node);
                self.annotate(then, param, node);
                self.annotate(otherwise, param, node);
                None
            }
            Expr::TypeCheck(inner, _) => {
                self.annotate(inner, param, node);
                None
            }
            Expr::Lambda(lambda) if lambda.param != param => {
                self.annotate(&lambda.body, param, node);
                None
            }
            Expr::Query(input, op) => {
                self.annotate(input, param, node);
                match op.as_ref() {
                    QueryOp::Where(lambda) | QueryOp::Select(lambda) if lambda.param != param => {
                        self.annotate(&lambda.body, param, node);
                    }
                    _ => {}
                }
                None
            }
            Expr::Param(_) | Expr::Constant(_) | Expr::Lambda(_) | Expr::Source(_) => None,
        }
    }
}
