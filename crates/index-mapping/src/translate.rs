//! Row change events → index operations.

use crate::coerce::coerce;
use crate::mapping::{validate, FieldType, IndexTarget, MappingError, MappingKind, TableMapping};
use std::collections::HashMap;
use sync_core::{DocumentKey, Fields, IndexOperation, RowChangeEvent, RowImage, RowOp, UniversalValue};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranslateError {
    #[error("row of table '{table}' is missing projected columns: {}", missing.join(", "))]
    UnmappedSchema { table: String, missing: Vec<String> },

    /// `stale` names the document the row was indexed under before an
    /// update moved it to an unroutable value; callers still delete it.
    #[error("row of table '{table}' has routing value '{value}' with no index")]
    Unroutable {
        table: String,
        value: String,
        stale: Option<DocumentKey>,
    },

    #[error("row of table '{table}' has a NULL key in column '{column}'")]
    NullKey { table: String, column: String },

    #[error("column '{column}' of table '{table}' cannot be written as {expected:?}: {found}")]
    Coercion {
        table: String,
        column: String,
        expected: FieldType,
        found: String,
    },

    #[error("{op} event for table '{table}' carries no row image")]
    MissingImage { table: String, op: RowOp },
}

impl TranslateError {
    pub fn table(&self) -> &str {
        match self {
            TranslateError::UnmappedSchema { table, .. }
            | TranslateError::Unroutable { table, .. }
            | TranslateError::NullKey { table, .. }
            | TranslateError::Coercion { table, .. }
            | TranslateError::MissingImage { table, .. } => table,
        }
    }

    /// Short label used in counters and log records.
    pub fn kind(&self) -> &'static str {
        match self {
            TranslateError::UnmappedSchema { .. } => "unmapped_schema",
            TranslateError::Unroutable { .. } => "unroutable",
            TranslateError::NullKey { .. } => "null_key",
            TranslateError::Coercion { .. } => "coercion",
            TranslateError::MissingImage { .. } => "missing_image",
        }
    }
}

/// Maps row changes of the configured tables onto index operations.
///
/// Translation is a pure function of the event and the mappings. Events for
/// tables without a mapping translate to no operations.
#[derive(Debug, Clone)]
pub struct Translator {
    tables: HashMap<String, TableMapping>,
}

impl Translator {
    pub fn new(mappings: Vec<TableMapping>) -> Result<Self, MappingError> {
        validate(&mappings)?;
        Ok(Self {
            tables: mappings.into_iter().map(|m| (m.table.clone(), m)).collect(),
        })
    }

    pub fn tracks(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Mapped table names, sorted.
    pub fn tables(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn mapping(&self, table: &str) -> Option<&TableMapping> {
        self.tables.get(table)
    }

    pub fn translate(&self, event: &RowChangeEvent) -> Result<Vec<IndexOperation>, TranslateError> {
        let Some(mapping) = self.tables.get(&event.table) else {
            return Ok(Vec::new());
        };
        let row = RowContext { mapping, event };

        match event.op {
            RowOp::Insert => {
                let after = row.image(event.after.as_ref())?;
                Ok(vec![row.write(after)?])
            }
            RowOp::Update => {
                let after = row.image(event.after.as_ref())?;
                let before = match event.before.as_ref() {
                    Some(before) if mapping.kind == MappingKind::Document => before,
                    _ => return Ok(vec![row.write(after)?]),
                };
                // An unroutable old row was never indexed, so there is nothing to move.
                let old_key = match row.document_key(before) {
                    Ok(key) => Some(key),
                    Err(TranslateError::Unroutable { .. }) => None,
                    Err(e) => return Err(e),
                };
                let write = match row.write(after) {
                    Ok(op) => op,
                    Err(TranslateError::Unroutable { table, value, .. }) => {
                        return Err(TranslateError::Unroutable {
                            table,
                            value,
                            stale: old_key,
                        })
                    }
                    Err(e) => return Err(e),
                };
                match old_key {
                    Some(old_key) if &old_key != write.key() => {
                        Ok(vec![IndexOperation::delete(old_key), write])
                    }
                    _ => Ok(vec![write]),
                }
            }
            RowOp::Delete => {
                if mapping.ignores_deletes() {
                    return Ok(Vec::new());
                }
                let before = row.image(event.before.as_ref())?;
                Ok(vec![IndexOperation::delete(row.document_key(before)?)])
            }
        }
    }

    /// Translate a bulk-export row as an insert.
    ///
    /// Export rows carry no schema, so the document key is read from the
    /// mapping's `key_column`, or `primary_key_column` when it has none.
    pub fn translate_row(
        &self,
        table: &str,
        primary_key_column: &str,
        row: &RowImage,
    ) -> Result<Vec<IndexOperation>, TranslateError> {
        let Some(mapping) = self.tables.get(table) else {
            return Ok(Vec::new());
        };
        let key_column = mapping.key_column.as_deref().unwrap_or(primary_key_column);
        let event = RowChangeEvent::insert(
            table,
            key_column,
            row.get(key_column).cloned().unwrap_or(UniversalValue::Null),
            row.clone(),
            sync_core::LogPosition::new("", 0),
        );
        self.translate(&event)
    }
}

struct RowContext<'a> {
    mapping: &'a TableMapping,
    event: &'a RowChangeEvent,
}

impl RowContext<'_> {
    fn table(&self) -> String {
        self.mapping.table.clone()
    }

    fn image<'b>(&self, image: Option<&'b RowImage>) -> Result<&'b RowImage, TranslateError> {
        image.ok_or_else(|| TranslateError::MissingImage {
            table: self.table(),
            op: self.event.op,
        })
    }

    fn key_column(&self) -> &str {
        self.mapping
            .key_column
            .as_deref()
            .unwrap_or(&self.event.primary_key_column)
    }

    /// Document rows upsert; partial rows only update an existing parent.
    fn write(&self, image: &RowImage) -> Result<IndexOperation, TranslateError> {
        self.check_columns(image)?;
        let key = self.document_key(image)?;
        let mut fields = Fields::new();
        for field in &self.mapping.fields {
            let value = image.get(&field.column).unwrap_or(&UniversalValue::Null);
            let coerced = coerce(value, field).map_err(|failure| TranslateError::Coercion {
                table: self.table(),
                column: field.column.clone(),
                expected: failure.expected,
                found: failure.found,
            })?;
            fields.insert(field.field_name().to_string(), coerced);
        }
        Ok(match self.mapping.kind {
            MappingKind::Document => IndexOperation::upsert(key, fields),
            MappingKind::Partial => IndexOperation::update(key, fields),
        })
    }

    fn check_columns(&self, image: &RowImage) -> Result<(), TranslateError> {
        let mut columns = self.mapping.projected_columns();
        if !columns.contains(&self.key_column()) {
            columns.push(self.key_column());
        }
        let missing: Vec<String> = columns
            .into_iter()
            .filter(|c| !image.contains_key(*c))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(TranslateError::UnmappedSchema {
                table: self.table(),
                missing,
            })
        }
    }

    fn document_key(&self, image: &RowImage) -> Result<DocumentKey, TranslateError> {
        let column = self.key_column();
        let key = match image.get(column) {
            Some(UniversalValue::Null) => {
                return Err(TranslateError::NullKey {
                    table: self.table(),
                    column: column.to_string(),
                })
            }
            Some(value) => value,
            None => {
                return Err(TranslateError::UnmappedSchema {
                    table: self.table(),
                    missing: vec![column.to_string()],
                })
            }
        };
        let id = format!("{}:{}", self.mapping.prefix(), key.to_key_string());
        Ok(DocumentKey::new(self.index(image)?, id))
    }

    fn index(&self, image: &RowImage) -> Result<String, TranslateError> {
        let routed = match &self.mapping.index {
            IndexTarget::Static(index) => return Ok(index.clone()),
            IndexTarget::Routed(routed) => routed,
        };
        let value = image
            .get(&routed.column)
            .ok_or_else(|| TranslateError::UnmappedSchema {
                table: self.table(),
                missing: vec![routed.column.clone()],
            })?;
        let class = match routed.mask {
            Some(mask) => value
                .as_i64()
                .map(|bits| (bits & mask).to_string())
                .unwrap_or_else(|| value.to_string()),
            None => value.to_key_string(),
        };
        routed
            .indices
            .get(&class)
            .or(routed.default.as_ref())
            .cloned()
            .ok_or(TranslateError::Unroutable {
                table: self.table(),
                value: class,
                stale: None,
            })
    }
}
