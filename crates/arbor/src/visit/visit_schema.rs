use super::Visit;
use crate::error::Result;
use crate::schema::{FieldType, RecordSchema, SchemaType};
use crate::util::join_path;
use std::sync::Arc;

/// A schema node reached while walking the tree
#[derive(Debug, Clone)]
pub struct SchemaEntry {
    pub path: String,
    pub schema: SchemaType,
    /// Paths of the records holding a variant selection between the root and this node
    pub selection_holders: Vec<String>,
}

/// Visit every record and variant node of the tree, parents before children
///
/// Fields of a variant's superschema are visited once. Fields of the options are visited once per option that declares
/// them, so such a path can be visited more than once.
/// Fields are visited in declaration order.
pub fn walk_schema(root: &Arc<RecordSchema>, visitor: &mut dyn Visit<SchemaEntry>) -> Result<()> {
    let entry = SchemaEntry {
        path: String::new(),
        schema: SchemaType::Record(root.clone()),
        selection_holders: vec![],
    };
    walk_entry(entry, visitor)
}

fn walk_entry(entry: SchemaEntry, visitor: &mut dyn Visit<SchemaEntry>) -> Result<()> {
    visitor.visit(&entry)?;

    match &entry.schema {
        SchemaType::Record(record) => walk_fields(&entry, record, None, visitor)?,
        SchemaType::Variant(variant) => {
            // options repeat the superschema's fields, those are walked once
            let shared: &RecordSchema = variant.superschema();
            walk_fields(&entry, shared, None, visitor)?;
            for record in variant.options().values() {
                walk_fields(&entry, record, Some(shared), visitor)?;
            }
        }
    }

    Ok(())
}

/// Walk the schema fields of `record`, except those `shared` already has
fn walk_fields(
    parent: &SchemaEntry,
    record: &RecordSchema,
    shared: Option<&RecordSchema>,
    visitor: &mut dyn Visit<SchemaEntry>,
) -> Result<()> {
    for (name, ty) in record.fields() {
        if shared.is_some_and(|shared| shared.field(name).is_some()) {
            continue;
        }
        let path = join_path(&parent.path, name);
        let (schema, selection_holders) = match ty {
            FieldType::Primitive(_) => continue,
            FieldType::Record(record) => (
                SchemaType::Record(record.clone()),
                parent.selection_holders.clone(),
            ),
            FieldType::Variant(variant) => {
                let mut holders = parent.selection_holders.clone();
                holders.push(parent.path.clone());
                (SchemaType::Variant(variant.clone()), holders)
            }
        };

        let entry = SchemaEntry {
            path,
            schema,
            selection_holders,
        };
        walk_entry(entry, visitor)?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::schema::VariantSchema;
    use pretty_assertions::assert_eq;

    #[test]
    fn walks_all_branches() {
        let inner = RecordSchema::builder("Inner").integer("x").build().unwrap();
        let a = RecordSchema::builder("A")
            .field("inner", inner.clone())
            .build()
            .unwrap();
        let b = RecordSchema::builder("B").string("y").build().unwrap();
        let multi = VariantSchema::builder("Multi", RecordSchema::builder("Base").build().unwrap())
            .option("a", a)
            .option("b", b)
            .build()
            .unwrap();
        let root = RecordSchema::builder("Root")
            .string("name")
            .field("multi", multi)
            .field("plain", inner)
            .build()
            .unwrap();

        let mut seen = vec![];
        walk_schema(&root, &mut |entry: &SchemaEntry| {
            seen.push((entry.path.clone(), entry.selection_holders.clone()));
            Ok(())
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![
                (String::new(), vec![]),
                ("multi".to_string(), vec![String::new()]),
                ("multi.inner".to_string(), vec![String::new()]),
                ("plain".to_string(), vec![]),
            ]
        );
    }

    #[test]
    fn superschema_fields_are_walked_once() {
        let mode = VariantSchema::builder("Mode", RecordSchema::builder("ModeBase").build().unwrap())
            .option("x", RecordSchema::builder("X").integer("x").build().unwrap())
            .option("y", RecordSchema::builder("Y").integer("y").build().unwrap())
            .build()
            .unwrap();
        let base = RecordSchema::builder("Base")
            .field(
                "settings",
                RecordSchema::builder("Settings").integer("level").build().unwrap(),
            )
            .field("mode", mode)
            .build()
            .unwrap();
        let a = RecordSchema::builder("A")
            .field("extra", RecordSchema::builder("Extra").string("note").build().unwrap())
            .build()
            .unwrap();
        let b = RecordSchema::builder("B").boolean("flag").build().unwrap();
        let multi = VariantSchema::builder("Multi", base)
            .option("a", a)
            .option("b", b)
            .build()
            .unwrap();
        let root = RecordSchema::builder("Root").field("multi", multi).build().unwrap();

        let mut seen = vec![];
        walk_schema(&root, &mut |entry: &SchemaEntry| {
            seen.push((entry.path.clone(), entry.selection_holders.clone()));
            Ok(())
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![
                (String::new(), vec![]),
                ("multi".to_string(), vec![String::new()]),
                ("multi.settings".to_string(), vec![String::new()]),
                ("multi.mode".to_string(), vec![String::new(), "multi".to_string()]),
                ("multi.extra".to_string(), vec![String::new()]),
            ]
        );
    }
}
