//! Additive schema synchronization.
//!
//! For every entity, in the order given: create the table when it is
//! missing, otherwise add each declared column the live table lacks. Existing
//! columns are never dropped, renamed or retyped, so data written by older
//! versions survives an upgrade.

use crate::database::Database;
use crate::dialect::{Binder, Dialect, Statement};
use crate::entity::{ColumnDef, EntityDescriptor, Value};
use crate::error::{DbError, QueryError};

/// What a synchronization pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Tables created from scratch.
    pub tables_created: Vec<String>,
    /// `(table, column)` pairs added to existing tables.
    pub columns_added: Vec<(String, String)>,
}

impl SyncReport {
    /// Whether the pass changed nothing.
    pub fn is_empty(&self) -> bool {
        self.tables_created.is_empty() && self.columns_added.is_empty()
    }
}

impl Database {
    /// Synchronizes every entity's table with its descriptor.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Sync` naming the first entity that failed; entities
    /// after it are not touched.
    pub async fn sync_all(&self, entities: &[&EntityDescriptor]) -> Result<SyncReport, DbError> {
        let mut report = SyncReport::default();
        for entity in entities {
            self.sync_entity(entity, &mut report)
                .await
                .map_err(|source| DbError::Sync {
                    entity: entity.name,
                    source,
                })?;
        }
        tracing::info!(
            tables_created = report.tables_created.len(),
            columns_added = report.columns_added.len(),
            "schema synchronized"
        );
        Ok(report)
    }

    async fn sync_entity(
        &self,
        entity: &EntityDescriptor,
        report: &mut SyncReport,
    ) -> Result<(), QueryError> {
        let dialect = self.dialect();
        let table = self.table_name(entity);
        let live = self
            .fetch_strings(live_columns_statement(dialect, &table))
            .await?;

        if live.is_empty() {
            self.execute(Statement::new(create_table_sql(dialect, &table, entity)))
                .await?;
            tracing::info!(table = %table, entity = entity.name, "created table");
            report.tables_created.push(table);
            return Ok(());
        }

        for column in entity.columns {
            let name = column.column_name();
            if live.iter().any(|existing| existing.eq_ignore_ascii_case(&name)) {
                continue;
            }
            self.execute(Statement::new(add_column_sql(dialect, &table, column)))
                .await?;
            tracing::info!(table = %table, column = %name, "added column");
            report.columns_added.push((table.clone(), name));
        }
        Ok(())
    }
}

/// Lists the live columns of `table` in the current database / schema.
fn live_columns_statement(dialect: Dialect, table: &str) -> Statement {
    let mut binder = Binder::new(dialect);
    let placeholder = binder.bind(Value::from(table));
    let sql = match dialect {
        Dialect::Sqlite => format!("SELECT name FROM pragma_table_info({placeholder})"),
        Dialect::MySql => format!(
            "SELECT CAST(column_name AS CHAR) FROM information_schema.columns \
             WHERE table_schema = DATABASE() AND table_name = {placeholder}"
        ),
        Dialect::Postgres => format!(
            "SELECT column_name::text FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = {placeholder}"
        ),
    };
    binder.finish(sql)
}

fn create_table_sql(dialect: Dialect, table: &str, entity: &EntityDescriptor) -> String {
    let mut parts: Vec<String> = entity
        .columns
        .iter()
        .map(|c| dialect.column_definition(c))
        .collect();
    let keys: Vec<String> = entity
        .key_columns()
        .map(|c| dialect.quote(&c.column_name()))
        .collect();
    if !keys.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        dialect.quote(table),
        parts.join(", ")
    )
}

// Added columns are always nullable so rows that predate them stay valid.
fn add_column_sql(dialect: Dialect, table: &str, column: &ColumnDef) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        dialect.quote(table),
        dialect.quote(&column.column_name()),
        dialect.column_type(column.kind)
    )
}
