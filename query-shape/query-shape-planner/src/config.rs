use std::collections::BTreeMap;

use arcstr::ArcStr;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Whether the data source loads expanded relationships by itself,
    /// making expansion wrappers unnecessary when nothing else requires them
    pub expand_by_default: bool,
    /// The maximum number of slots in one expansion wrapper
    pub max_wrapper_breadth: usize,
    /// Page size for paged sets without an explicit page size
    pub default_page_size: u32,
    /// Page sizes by set name
    pub page_sizes: BTreeMap<ArcStr, u32>,
    /// Soft limit on the number of results per collection
    pub max_results_per_collection: Option<u64>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            expand_by_default: false,
            max_wrapper_breadth: 12,
            default_page_size: 20,
            page_sizes: Default::default(),
            max_results_per_collection: None,
        }
    }
}

impl PlannerConfig {
    pub fn page_size(&self, set_name: &str) -> u32 {
        self.page_sizes
            .get(set_name)
            .copied()
            .unwrap_or(self.default_page_size)
    }
}
