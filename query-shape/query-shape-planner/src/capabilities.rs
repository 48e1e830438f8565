use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub enum TypeDispatchStrategy {
    /// Type tests are expressed directly in the query
    #[default]
    RuntimeCheck,
    /// Type tests are delegated to a callback the data source provides
    ProviderCallback,
}

/// What the data source executing the query can and cannot express.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub requires_null_guards_for_polymorphic_access: bool,
    pub requires_explicit_object_cast: bool,
    pub type_dispatch_strategy: TypeDispatchStrategy,
    pub can_express_typed_null: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            requires_null_guards_for_polymorphic_access: false,
            requires_explicit_object_cast: false,
            type_dispatch_strategy: TypeDispatchStrategy::RuntimeCheck,
            can_express_typed_null: true,
        }
    }
}

impl Capabilities {
    pub(crate) fn provider_type_dispatch(&self) -> bool {
        matches!(
            self.type_dispatch_strategy,
            TypeDispatchStrategy::ProviderCallback
        )
    }
}
