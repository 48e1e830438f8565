//! The hierarchical request a query shape is compiled from

use arcstr::ArcStr;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{TypeId, expr::OrderKey};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrderingInfo {
    pub keys: Vec<OrderKey>,
    pub is_paged: bool,
}

/// One level of a request: a resource set or relationship, what to select from it,
/// and what to expand below it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestNode {
    pub resource_type: TypeId,
    /// The set the records of this level belong to
    pub set_name: ArcStr,
    pub project_all: bool,
    pub selected: Vec<ArcStr>,
    /// Expanded relationships, by relationship name, in request order
    pub children: IndexMap<ArcStr, RequestNode>,
    pub filter: Option<crate::expr::Lambda>,
    pub ordering: Option<OrderingInfo>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    /// Soft limit: results beyond it are only detected, never returned
    pub max_results: Option<u64>,
    /// The level yields at most one record, e.g. a key lookup at the root
    pub single_result: bool,
}

impl RequestNode {
    /// A level selecting everything and expanding nothing
    pub fn new(set_name: impl Into<ArcStr>, resource_type: TypeId) -> Self {
        Self {
            resource_type,
            set_name: set_name.into(),
            project_all: true,
            selected: vec![],
            children: Default::default(),
            filter: None,
            ordering: None,
            skip: None,
            take: None,
            max_results: None,
            single_result: false,
        }
    }

    /// Select exactly the given fields instead of the whole record
    pub fn select<S: Into<ArcStr>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.project_all = false;
        self.selected = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Select the whole record, plus the given extra fields (e.g. named streams)
    pub fn select_all_with<S: Into<ArcStr>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.project_all = true;
        self.selected = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn expand(mut self, relationship: impl Into<ArcStr>, child: RequestNode) -> Self {
        self.children.insert(relationship.into(), child);
        self
    }

    pub fn filter(mut self, predicate: crate::expr::Lambda) -> Self {
        self.filter = Some(predicate);
        self
    }

    pub fn order_by(mut self, keys: Vec<OrderKey>, is_paged: bool) -> Self {
        self.ordering = Some(OrderingInfo { keys, is_paged });
        self
    }

    pub fn skip(mut self, count: u64) -> Self {
        self.skip = Some(count);
        self
    }

    pub fn take(mut self, count: u64) -> Self {
        self.take = Some(count);
        self
    }

    pub fn max_results(mut self, count: u64) -> Self {
        self.max_results = Some(count);
        self
    }

    pub fn single_result(mut self) -> Self {
        self.single_result = true;
        self
    }
}
