use query_shape_model::{
    VarAllocator,
    catalog::Catalog,
    expr::Expr,
    request::RequestNode,
    rewrite::max_var,
};
use tracing::{debug, debug_span};

use crate::{
    Capabilities, PlanResult, PlannerConfig,
    assemble::Assembler,
    continuation::describe_continuations,
    expand_tree::{ExpandTree, FrozenExpandTree},
    metadata_cache::MetadataCache,
    projection::resolve_projections,
    wrapper::{WrapperKind, plan_wrappers},
};

/// The compiled shape of one request.
#[derive(Debug)]
pub struct QueryPlan {
    /// The query to run against the data source
    pub query: Expr,
    /// The result is a single empty-marker record where the source cannot express a typed null,
    /// and the caller must read it as null
    pub unwrap_null_marker: bool,
    /// Root results are expansion wrappers, i.e. element and children, rather than records
    pub root_is_expansion: bool,
    /// The planning tree, for addressing wrapper slots in the results
    pub tree: FrozenExpandTree,
}

/// Compiles requests into query plans.
///
/// One planner serves one logical request. The metadata cache may be shared with
/// other planners compiling sub-requests of the same request.
pub struct Planner<'a, 'c, C: Catalog + ?Sized> {
    cache: &'a MetadataCache<'c, C>,
    config: &'a PlannerConfig,
    capabilities: Capabilities,
}

impl<'a, 'c, C: Catalog + ?Sized> Planner<'a, 'c, C> {
    pub fn new(
        cache: &'a MetadataCache<'c, C>,
        config: &'a PlannerConfig,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            cache,
            config,
            capabilities,
        }
    }

    pub fn plan(&self, request: &RequestNode) -> PlanResult<QueryPlan> {
        let _entered = debug_span!("plan", set = %request.set_name).entered();
        let catalog = self.cache.catalog();

        let mut tree = ExpandTree::build(request, self.cache, self.config)?;
        resolve_projections(&mut tree, catalog)?;
        plan_wrappers(&mut tree, self.config)?;
        describe_continuations(&mut tree, catalog)?;
        let tree = tree.freeze();

        let assembled = Assembler {
            catalog,
            tree: &tree,
            config: self.config,
            capabilities: self.capabilities,
            vars: VarAllocator::starting_at(next_free_var(request)),
        }
        .assemble()?;

        let root_is_expansion = tree.root().wrapper().kind() == WrapperKind::Expansion;
        debug!(
            "planned {} nodes, root is expansion: {root_is_expansion}",
            tree.nodes().count()
        );

        Ok(QueryPlan {
            query: assembled.query,
            unwrap_null_marker: assembled.unwrap_null_marker,
            root_is_expansion,
            tree,
        })
    }
}

/// The first variable not bound by any lambda of the request
pub(crate) fn next_free_var(request: &RequestNode) -> u32 {
    let mut max = None;
    let mut stack = vec![request];

    while let Some(node) = stack.pop() {
        let lambdas = node
            .filter
            .iter()
            .chain(node.ordering.iter().flat_map(|ordering| {
                ordering.keys.iter().map(|key| &key.key)
            }));

        for lambda in lambdas {
            max = max.max(max_var(&Expr::Lambda(lambda.clone())));
        }

        stack.extend(node.children.values());
    }

    max.map(|var| var.0 + 1).unwrap_or(0)
}
