//! build order
//!
//! A depth first traversal over validated dependencies. Every node is emitted after all nodes it depends on, and
//! every node of the tree is emitted exactly once. Dependencies are visited ordered by path and tree nodes in
//! declaration order, so the order only depends on the schema.
use crate::error::{Error, Result};
use crate::util::display_path;
use crate::validate::ValidatedSchema;
use std::collections::HashSet;

/// Compute the build order for a validated schema
pub fn build_order(schema: &ValidatedSchema) -> Result<Vec<String>> {
    let mut traversal = Traversal::new(schema);

    // the root first, then every node not reached through a dependency
    for path in schema.nodes().keys() {
        traversal.visit(path)?;
    }

    tracing::debug!(order = ?traversal.order, "build order");
    Ok(traversal.order)
}

#[derive(derive_new::new)]
struct Traversal<'s> {
    schema: &'s ValidatedSchema,
    /// globally finished
    #[new(default)]
    finished: HashSet<String>,
    /// active branch of the traversal
    #[new(default)]
    stack: Vec<String>,
    #[new(default)]
    order: Vec<String>,
}

impl<'s> Traversal<'s> {
    fn visit(&mut self, path: &str) -> Result<()> {
        if self.finished.contains(path) {
            return Ok(());
        }

        if let Some(start) = self.stack.iter().position(|active| active == path) {
            let mut cycle = self.stack[start..].to_vec();
            cycle.push(path.to_string());
            return Err(Error::CyclicDependency { cycle });
        }

        let node = self.schema.node(path).ok_or_else(|| {
            Error::invariant(format!(
                "dependency '{}' is not a schema node",
                display_path(path)
            ))
        })?;

        self.stack.push(path.to_string());
        for dependency in node.dependencies.keys() {
            tracing::trace!(path, %dependency, "visit dependency");
            self.visit(dependency)?;
        }
        self.stack.pop();

        self.finished.insert(path.to_string());
        self.order.push(path.to_string());
        Ok(())
    }
}
