//! visitor pattern helpers
mod visit_schema;
pub use visit_schema::{walk_schema, SchemaEntry};

/// Visitor that visits its subjects
pub trait Visit<T> {
    fn visit(&mut self, value: &T) -> crate::error::Result<()>;
}

// blanket impl for FnMut
impl<T, F> Visit<T> for F
where
    F: FnMut(&T) -> crate::error::Result<()>,
{
    fn visit(&mut self, value: &T) -> crate::error::Result<()> {
        self(value)
    }
}
