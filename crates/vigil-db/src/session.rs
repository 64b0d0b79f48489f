//! Query sessions built from untyped request parameters.
//!
//! A request hands over owner, pagination, a field/value substring filter and
//! a sort field/direction exactly as received. [`QueryPlan::build`] turns them
//! into a plan that never fails: every clause is optional, and anything that
//! cannot be applied safely is left out.
//!
//! Field names are the only request input that ends up as SQL text. Each one
//! must be a plain alphanumeric name *and* a declared field of the entity;
//! the descriptor maps it to its storage column. Values are always bound.

use std::marker::PhantomData;

use vigil_types::{CREATED_TIME_FIELD, OWNER_FIELD};

use crate::database::{select_list, Database};
use crate::dialect::{Binder, Dialect, Statement};
use crate::entity::{ColumnDef, ColumnKind, Entity, EntityDescriptor, Row, Value};
use crate::error::DbError;
use crate::naming::{is_safe_field_name, snake_case};

/// Offset/limit value meaning "no pagination".
pub const NO_PAGINATION: i64 = -1;

/// Sort order value that selects ascending order. Anything else is descending.
pub const ASCEND: &str = "ascend";

/// Untyped query parameters of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    /// Exact-match owner filter; empty means any owner.
    pub owner: String,
    /// Rows to skip.
    pub offset: i64,
    /// Rows to return.
    pub limit: i64,
    /// Logical field to filter on.
    pub field: String,
    /// Substring the field must contain.
    pub value: String,
    /// Logical field to sort by; empty means `createdTime`.
    pub sort_field: String,
    /// `ascend` for ascending order, anything else for descending.
    pub sort_order: String,
}

impl Default for QuerySpec {
    fn default() -> Self {
        Self {
            owner: String::new(),
            offset: NO_PAGINATION,
            limit: NO_PAGINATION,
            field: String::new(),
            value: String::new(),
            sort_field: String::new(),
            sort_order: String::new(),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

impl SortDirection {
    /// Maps a request's sort order. Only the exact string `ascend` is ascending.
    pub fn from_request(order: &str) -> Self {
        if order == ASCEND {
            Self::Ascending
        } else {
            Self::Descending
        }
    }

    fn as_sql(self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// `LIMIT`/`OFFSET` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Rows to return.
    pub limit: i64,
    /// Rows to skip.
    pub offset: i64,
}

/// One `WHERE` condition. The column is always a validated storage name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `column = value`
    Equals {
        /// Storage column.
        column: String,
        /// Bound value.
        value: String,
    },
    /// `column LIKE pattern`
    Like {
        /// Storage column.
        column: String,
        /// Bound pattern, wildcards included.
        pattern: String,
        /// The column is not a string type and is cast before matching.
        cast_to_text: bool,
    },
}

/// A fully resolved, dialect-independent query over one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    entity: &'static EntityDescriptor,
    predicates: Vec<Predicate>,
    sort_column: String,
    direction: SortDirection,
    page: Option<Page>,
}

impl QueryPlan {
    /// Builds a plan from request parameters. Never fails.
    pub fn build(entity: &'static EntityDescriptor, spec: &QuerySpec) -> Self {
        let page = (spec.offset >= 0 && spec.limit >= 0).then_some(Page {
            limit: spec.limit,
            offset: spec.offset,
        });

        let mut predicates = Vec::new();

        if !spec.owner.is_empty() {
            match entity.column(OWNER_FIELD) {
                Some(column) => predicates.push(Predicate::Equals {
                    column: column.column_name(),
                    value: spec.owner.clone(),
                }),
                None => tracing::debug!(entity = entity.name, "entity has no owner column"),
            }
        }

        if !spec.field.is_empty() && !spec.value.is_empty() {
            match allowed_column(entity, &spec.field) {
                Some(column) => predicates.push(Predicate::Like {
                    column: column.column_name(),
                    pattern: format!("%{}%", spec.value),
                    cast_to_text: !matches!(
                        column.kind,
                        ColumnKind::Varchar(_) | ColumnKind::Text
                    ),
                }),
                None => tracing::debug!(
                    entity = entity.name,
                    field = %spec.field,
                    "ignoring filter on unknown field"
                ),
            }
        }

        let sort_field = if spec.sort_field.is_empty() {
            CREATED_TIME_FIELD
        } else if allowed_column(entity, &spec.sort_field).is_some() {
            spec.sort_field.as_str()
        } else {
            tracing::debug!(
                entity = entity.name,
                field = %spec.sort_field,
                "ignoring sort on unknown field"
            );
            CREATED_TIME_FIELD
        };

        Self {
            entity,
            predicates,
            sort_column: snake_case(sort_field),
            direction: SortDirection::from_request(&spec.sort_order),
            page,
        }
    }

    /// The entity queried.
    pub fn entity(&self) -> &'static EntityDescriptor {
        self.entity
    }

    /// `WHERE` conditions, joined with `AND`.
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Storage column the rows are ordered by.
    pub fn sort_column(&self) -> &str {
        &self.sort_column
    }

    /// Order direction.
    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Pagination, if any.
    pub fn page(&self) -> Option<Page> {
        self.page
    }

    /// Renders the row query.
    pub fn select_statement(&self, dialect: Dialect, table: &str) -> Statement {
        let mut binder = Binder::new(dialect);
        let mut sql = format!(
            "SELECT {} FROM {}",
            select_list(dialect, self.entity),
            dialect.quote(table)
        );
        self.push_where(&mut sql, &mut binder, dialect);
        sql.push_str(&format!(
            " ORDER BY {} {}",
            dialect.quote(&self.sort_column),
            self.direction.as_sql()
        ));
        if let Some(page) = self.page {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit, page.offset));
        }
        binder.finish(sql)
    }

    /// Renders the count query. Pagination and ordering do not apply.
    pub fn count_statement(&self, dialect: Dialect, table: &str) -> Statement {
        let mut binder = Binder::new(dialect);
        let mut sql = format!("SELECT COUNT(*) FROM {}", dialect.quote(table));
        self.push_where(&mut sql, &mut binder, dialect);
        binder.finish(sql)
    }

    fn push_where(&self, sql: &mut String, binder: &mut Binder, dialect: Dialect) {
        let conditions: Vec<String> = self
            .predicates
            .iter()
            .map(|predicate| match predicate {
                Predicate::Equals { column, value } => format!(
                    "{} = {}",
                    dialect.quote(column),
                    binder.bind(Value::from(value.as_str()))
                ),
                Predicate::Like {
                    column,
                    pattern,
                    cast_to_text,
                } => {
                    let quoted = dialect.quote(column);
                    let target = if *cast_to_text {
                        dialect.cast_to_text(&quoted)
                    } else {
                        quoted
                    };
                    format!(
                        "{} LIKE {}",
                        target,
                        binder.bind(Value::from(pattern.as_str()))
                    )
                }
            })
            .collect();
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
    }
}

/// Resolves a request-supplied field through the entity's allow-list.
fn allowed_column(entity: &'static EntityDescriptor, field: &str) -> Option<&'static ColumnDef> {
    if !is_safe_field_name(field) {
        return None;
    }
    entity.column(field)
}

/// A configured, not yet executed query bound to the database handle.
#[derive(Debug)]
pub struct QuerySession<'db, E> {
    db: &'db Database,
    plan: QueryPlan,
    _entity: PhantomData<fn() -> E>,
}

impl<'db, E: Entity> QuerySession<'db, E> {
    /// Builds a session over `E`'s table from request parameters.
    pub fn build(db: &'db Database, spec: &QuerySpec) -> Self {
        Self {
            db,
            plan: QueryPlan::build(E::DESCRIPTOR, spec),
            _entity: PhantomData,
        }
    }

    /// The resolved plan.
    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    /// Counts matching rows, ignoring pagination.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Query` if the statement fails.
    pub async fn count(&self) -> Result<i64, DbError> {
        let stmt = self
            .plan
            .count_statement(self.db.dialect(), &self.db.table_name(E::DESCRIPTOR));
        Ok(self.db.fetch_count(stmt).await?)
    }

    /// Fetches the matching rows without decoding them into `E`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Query` if the statement fails.
    pub async fn fetch_rows(&self) -> Result<Vec<Row>, DbError> {
        let stmt = self
            .plan
            .select_statement(self.db.dialect(), &self.db.table_name(E::DESCRIPTOR));
        Ok(self.db.fetch_rows(stmt, E::DESCRIPTOR.columns).await?)
    }

    /// Fetches and decodes the matching rows.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Query` if the statement fails or a row does not
    /// decode into `E`.
    pub async fn fetch(&self) -> Result<Vec<E>, DbError> {
        let rows = self.fetch_rows().await?;
        Ok(rows
            .into_iter()
            .map(Row::decode::<E>)
            .collect::<Result<Vec<E>, _>>()?)
    }
}

impl Database {
    /// Builds a query session over `E`'s table. See [`QuerySession::build`].
    pub fn session<E: Entity>(&self, spec: &QuerySpec) -> QuerySession<'_, E> {
        QuerySession::build(self, spec)
    }
}
