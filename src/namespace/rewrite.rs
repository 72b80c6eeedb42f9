//! Type-reference rewriting across a namespace rename.

use crate::graph::{Node, ReferenceVisitor, TypeRef};
use crate::namespace::{join_namespace, strip_namespace, NamespaceMapping};

/// Moves every reference under `from` to the same place under `to`.
#[derive(Debug, Clone)]
pub struct PrefixRewriter {
    from: String,
    to: String,
    rewritten: usize,
}

impl PrefixRewriter {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            rewritten: 0,
        }
    }

    pub fn rewritten(&self) -> usize {
        self.rewritten
    }

    /// Rewritten module path, or `None` if `module` lies outside `from`.
    pub fn map_module(&self, module: &str) -> Option<String> {
        strip_namespace(module, &self.from).map(|rest| join_namespace(&self.to, rest))
    }
}

impl ReferenceVisitor for PrefixRewriter {
    fn visit_type_ref(&mut self, type_ref: &mut TypeRef) {
        if let Some(module) = self.map_module(&type_ref.module) {
            type_ref.module = module;
            self.rewritten += 1;
        }
    }
}

/// Rename `original_prefix.*` references to `renamed_prefix.*`.
/// Returns the number of references changed.
pub fn rewrite_on_write(node: &mut Node, mapping: &NamespaceMapping) -> usize {
    let mut rewriter = PrefixRewriter::new(&mapping.original_prefix, &mapping.renamed_prefix);
    node.walk_type_refs_mut(&mut rewriter);
    tracing::debug!(
        from = %mapping.original_prefix,
        to = %mapping.renamed_prefix,
        rewritten = rewriter.rewritten(),
        "Rewrote payload references"
    );
    rewriter.rewritten()
}

/// Move references living under any of `sources` to `target`.
///
/// Each reference is rewritten at most once, by the first source that
/// contains it. No compatibility checking happens here; callers resolve the
/// result against the target tree.
pub fn rewrite_on_read(node: &mut Node, sources: &[&str], target: &str) -> usize {
    let rewriters: Vec<PrefixRewriter> = sources
        .iter()
        .filter(|source| **source != target)
        .map(|source| PrefixRewriter::new(*source, target))
        .collect();

    let mut total = 0;
    node.walk_type_refs_mut(&mut |type_ref: &mut TypeRef| {
        if let Some(module) = rewriters.iter().find_map(|r| r.map_module(&type_ref.module)) {
            type_ref.module = module;
            total += 1;
        }
    });
    tracing::debug!(?sources, to = target, rewritten = total, "Rewrote payload references for read");
    total
}
