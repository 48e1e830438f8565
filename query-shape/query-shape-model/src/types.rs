//! Type table: resource types, their inheritance and their declared properties

use arcstr::ArcStr;
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{PropId, TypeId};

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Boolean,
    Int32,
    Int64,
    Decimal,
    Double,
    String,
    DateTime,
    Guid,
    Binary,
    Stream,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 10] = [
        Self::Boolean,
        Self::Int32,
        Self::Int64,
        Self::Decimal,
        Self::Double,
        Self::String,
        Self::DateTime,
        Self::Guid,
        Self::Binary,
        Self::Stream,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Boolean => "Core.Boolean",
            Self::Int32 => "Core.Int32",
            Self::Int64 => "Core.Int64",
            Self::Decimal => "Core.Decimal",
            Self::Double => "Core.Double",
            Self::String => "Core.String",
            Self::DateTime => "Core.DateTime",
            Self::Guid => "Core.Guid",
            Self::Binary => "Core.Binary",
            Self::Stream => "Core.Stream",
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum TypeKind {
    Primitive(PrimitiveKind),
    Complex,
    Entity,
    /// A collection of primitive or complex values
    Collection(TypeId),
    /// A collection of entities, the target of a set-valued relationship
    EntityCollection(TypeId),
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize, Debug)]
    pub struct TypeFlags: u8 {
        /// No instance has exactly this type
        const ABSTRACT   = 0b00000001;
        /// Instances may carry properties that are not declared
        const OPEN       = 0b00000010;
        /// Instances have an attached binary resource
        const HAS_STREAM = 0b00000100;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeInfo {
    pub id: TypeId,
    /// Full (namespace-qualified) name
    pub name: ArcStr,
    pub kind: TypeKind,
    pub base: Option<TypeId>,
    pub flags: TypeFlags,
    /// Properties declared by this type itself, not inherited ones
    pub properties: Vec<PropertyInfo>,
}

impl TypeInfo {
    pub fn is_abstract(&self) -> bool {
        self.flags.contains(TypeFlags::ABSTRACT)
    }

    pub fn is_open(&self) -> bool {
        self.flags.contains(TypeFlags::OPEN)
    }

    pub fn has_stream(&self) -> bool {
        self.flags.contains(TypeFlags::HAS_STREAM)
    }

    pub fn is_structured(&self) -> bool {
        matches!(self.kind, TypeKind::Complex | TypeKind::Entity)
    }

    pub fn own_property(&self, name: &str) -> Option<&PropertyInfo> {
        self.properties.iter().find(|prop| prop.name == name)
    }

    pub fn key_properties(&self) -> impl Iterator<Item = &PropertyInfo> {
        self.properties
            .iter()
            .filter(|prop| prop.flags.contains(PropFlags::KEY))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub enum PropertyKind {
    Primitive,
    Complex,
    Collection,
    /// Single-valued relationship to another entity
    ResourceReference,
    /// Set-valued relationship to other entities
    ResourceSetReference,
    /// A named binary stream
    Stream,
}

impl PropertyKind {
    pub fn is_relationship(self) -> bool {
        matches!(self, Self::ResourceReference | Self::ResourceSetReference)
    }
}

bitflags::bitflags! {
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Default, Serialize, Deserialize, Debug)]
    pub struct PropFlags: u8 {
        /// Part of the entity key
        const KEY  = 0b00000001;
        /// Takes part in the concurrency token
        const ETAG = 0b00000010;
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub id: PropId,
    pub name: ArcStr,
    pub kind: PropertyKind,
    /// The value type. For set-valued relationships this is the entity type of each element.
    pub target: TypeId,
    pub flags: PropFlags,
}

/// The in-memory metadata catalog.
///
/// Types are stored in registration order, and a base type must be registered
/// before its derived types. TypeId order is therefore always a topological order.
#[derive(Clone, Debug)]
pub struct TypeTable {
    types: Vec<TypeInfo>,
    by_name: FnvHashMap<ArcStr, TypeId>,
    /// Directly derived types, per type
    derived: Vec<Vec<TypeId>>,
    set_etags: FnvHashMap<(ArcStr, TypeId), Vec<PropId>>,
}

impl TypeTable {
    pub fn builder() -> TypeTableBuilder {
        TypeTableBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn get(&self, id: TypeId) -> &TypeInfo {
        &self.types[id.index()]
    }

    pub fn get_option(&self, id: TypeId) -> Option<&TypeInfo> {
        self.types.get(id.index())
    }

    pub fn by_name(&self, name: &str) -> Option<TypeId> {
        self.by_name.get(name).copied()
    }

    pub fn primitive(&self, kind: PrimitiveKind) -> TypeId {
        TypeTableBuilder::primitive_id(kind)
    }

    pub fn property(&self, prop_id: PropId) -> &PropertyInfo {
        &self.get(prop_id.0).properties[prop_id.1 as usize]
    }

    pub fn direct_derived(&self, id: TypeId) -> &[TypeId] {
        &self.derived[id.index()]
    }

    /// Find a declared property visible on `id`, searching the type itself first and then its ancestors.
    pub fn find_property(&self, id: TypeId, name: &str) -> Option<&PropertyInfo> {
        self.ancestry(id)
            .find_map(|type_info| type_info.own_property(name))
    }

    /// The type itself followed by its ancestors, most derived first
    pub fn ancestry(&self, id: TypeId) -> impl Iterator<Item = &TypeInfo> {
        std::iter::successors(Some(self.get(id)), |type_info| {
            type_info.base.map(|base| self.get(base))
        })
    }

    pub fn is_ancestor_or_self(&self, ancestor: TypeId, id: TypeId) -> bool {
        self.ancestry(id).any(|type_info| type_info.id == ancestor)
    }

    pub(crate) fn set_etag_override(&self, set_name: &str, id: TypeId) -> Option<&[PropId]> {
        self.set_etags
            .get(&(ArcStr::from(set_name), id))
            .map(Vec::as_slice)
    }
}

pub struct TypeTableBuilder {
    types: Vec<TypeInfo>,
    set_etags: FnvHashMap<(ArcStr, TypeId), Vec<PropId>>,
}

impl Default for TypeTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeTableBuilder {
    pub fn new() -> Self {
        let mut builder = Self {
            types: vec![],
            set_etags: Default::default(),
        };
        for kind in PrimitiveKind::ALL {
            builder.add_type(kind.name().into(), TypeKind::Primitive(kind), None);
        }
        builder
    }

    /// Primitives occupy the first slots of every table, in [PrimitiveKind::ALL] order
    pub fn primitive_id(kind: PrimitiveKind) -> TypeId {
        let index = PrimitiveKind::ALL
            .iter()
            .position(|candidate| *candidate == kind)
            .unwrap_or_default();
        TypeId(index as u32)
    }

    pub fn primitive(&self, kind: PrimitiveKind) -> TypeId {
        Self::primitive_id(kind)
    }

    pub fn add_entity(&mut self, name: &str, base: Option<TypeId>) -> TypeId {
        self.add_type(name.into(), TypeKind::Entity, base)
    }

    pub fn add_complex(&mut self, name: &str, base: Option<TypeId>) -> TypeId {
        self.add_type(name.into(), TypeKind::Complex, base)
    }

    pub fn add_collection(&mut self, element: TypeId) -> TypeId {
        let name = arcstr::format!("Collection({})", self.types[element.index()].name);
        self.add_type(name, TypeKind::Collection(element), None)
    }

    pub fn add_entity_collection(&mut self, element: TypeId) -> TypeId {
        let name = arcstr::format!("EntityCollection({})", self.types[element.index()].name);
        self.add_type(name, TypeKind::EntityCollection(element), None)
    }

    pub fn set_flags(&mut self, id: TypeId, flags: TypeFlags) -> &mut Self {
        self.types[id.index()].flags |= flags;
        self
    }

    pub fn add_property(
        &mut self,
        owner: TypeId,
        name: &str,
        kind: PropertyKind,
        target: TypeId,
        flags: PropFlags,
    ) -> PropId {
        let type_info = &mut self.types[owner.index()];
        assert!(
            type_info.own_property(name).is_none(),
            "property `{name}` declared twice on `{}`",
            type_info.name
        );
        let prop_id = PropId(owner, type_info.properties.len() as u16);
        type_info.properties.push(PropertyInfo {
            id: prop_id,
            name: name.into(),
            kind,
            target,
            flags,
        });
        prop_id
    }

    /// Override which properties make up the etag of a type when accessed through a specific set
    pub fn set_etag_properties(&mut self, set_name: &str, id: TypeId, props: Vec<PropId>) {
        self.set_etags.insert((set_name.into(), id), props);
    }

    pub fn build(self) -> TypeTable {
        let mut by_name: FnvHashMap<ArcStr, TypeId> = Default::default();
        let mut derived: Vec<Vec<TypeId>> = vec![vec![]; self.types.len()];

        for type_info in &self.types {
            let previous = by_name.insert(type_info.name.clone(), type_info.id);
            assert!(previous.is_none(), "duplicate type name `{}`", type_info.name);

            if let Some(base) = type_info.base {
                derived[base.index()].push(type_info.id);
            }
        }

        trace!("built type table with {} types", self.types.len());

        TypeTable {
            types: self.types,
            by_name,
            derived,
            set_etags: self.set_etags,
        }
    }

    fn add_type(&mut self, name: ArcStr, kind: TypeKind, base: Option<TypeId>) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        if let Some(base) = base {
            assert!(base < id, "base type must be registered before `{name}`");
        }
        self.types.push(TypeInfo {
            id,
            name,
            kind,
            base,
            flags: TypeFlags::empty(),
            properties: vec![],
        });
        id
    }
}
