//! The metadata surface the planner consumes

use crate::{
    PropId, TypeId,
    types::{PropFlags, PropertyInfo, TypeInfo, TypeTable},
};

/// Resolves type hierarchies and declared, open, etag and key properties.
///
/// Lookups that find nothing return `None` or an empty list, meaning the feature is absent.
pub trait Catalog {
    fn type_count(&self) -> usize;

    fn type_info(&self, id: TypeId) -> &TypeInfo;

    fn find_type(&self, full_name: &str) -> Option<TypeId>;

    /// All strict descendants of `id`. Ancestors always precede their descendants.
    fn resolve_derived_types(&self, id: TypeId) -> Vec<TypeId>;

    fn has_derived_types(&self, id: TypeId) -> bool;

    /// Properties making up the etag of `id` when accessed through the set `set_name`
    fn etag_properties(&self, set_name: &str, id: TypeId) -> Vec<PropId>;

    /// The type in the ancestry of `id` that declares `name`
    fn declaring_type(&self, id: TypeId, name: &str) -> Option<TypeId>;

    /// The declared field a dynamic name resolves to on `id`, if any
    fn resolve_open_field(&self, id: TypeId, name: &str) -> Option<PropId>;

    fn property(&self, prop_id: PropId) -> &PropertyInfo {
        &self.type_info(prop_id.0).properties[prop_id.1 as usize]
    }

    /// Key properties of `id`, root-most declarations first
    fn key_properties(&self, id: TypeId) -> Vec<PropId> {
        let mut ancestry = vec![];
        let mut next = Some(id);
        while let Some(current) = next {
            let type_info = self.type_info(current);
            ancestry.push(type_info);
            next = type_info.base;
        }

        ancestry
            .into_iter()
            .rev()
            .flat_map(|type_info| type_info.key_properties())
            .map(|prop| prop.id)
            .collect()
    }

    fn is_ancestor_or_self(&self, ancestor: TypeId, id: TypeId) -> bool {
        let mut next = Some(id);
        while let Some(current) = next {
            if current == ancestor {
                return true;
            }
            next = self.type_info(current).base;
        }
        false
    }
}

impl Catalog for TypeTable {
    fn type_count(&self) -> usize {
        self.len()
    }

    fn type_info(&self, id: TypeId) -> &TypeInfo {
        self.get(id)
    }

    fn find_type(&self, full_name: &str) -> Option<TypeId> {
        self.by_name(full_name)
    }

    fn resolve_derived_types(&self, id: TypeId) -> Vec<TypeId> {
        let mut output = vec![];
        let mut stack: Vec<TypeId> = self.direct_derived(id).iter().rev().copied().collect();

        // pre-order: a type is emitted before anything derived from it
        while let Some(next) = stack.pop() {
            output.push(next);
            stack.extend(self.direct_derived(next).iter().rev().copied());
        }

        output
    }

    fn has_derived_types(&self, id: TypeId) -> bool {
        !self.direct_derived(id).is_empty()
    }

    fn etag_properties(&self, set_name: &str, id: TypeId) -> Vec<PropId> {
        if let Some(props) = self.set_etag_override(set_name, id) {
            return props.to_vec();
        }

        let mut ancestry: Vec<&TypeInfo> = self.ancestry(id).collect();
        ancestry.reverse();

        ancestry
            .into_iter()
            .flat_map(|type_info| type_info.properties.iter())
            .filter(|prop| prop.flags.contains(PropFlags::ETAG))
            .map(|prop| prop.id)
            .collect()
    }

    fn declaring_type(&self, id: TypeId, name: &str) -> Option<TypeId> {
        self.find_property(id, name).map(|prop| prop.id.declaring_type())
    }

    fn resolve_open_field(&self, id: TypeId, name: &str) -> Option<PropId> {
        self.find_property(id, name).map(|prop| prop.id)
    }
}
