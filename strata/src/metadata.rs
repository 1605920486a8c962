//! Column metadata queries against the warehouse's information schema.
//!
//! Column sets are always re-read from the warehouse rather than cached on an
//! object: the warehouse is externally mutable shared state, so these are
//! stateless query functions, not memoized fields.

use crate::error::{ErrorKind, StrataResult};
use crate::strata_error;
use crate::warehouse::{WarehouseClient, statements};

/// One column: uppercase name and uppercase type name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into().to_uppercase(),
            data_type: data_type.into().to_uppercase(),
        }
    }
}

/// An order-preserving mapping from uppercase column name to uppercase type.
///
/// Owned transiently by a single inference, evolution, or merge call. The
/// ordering is the table's ordinal order, which keeps generated column lists
/// and physical layouts predictable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet {
    columns: Vec<Column>,
}

impl ColumnSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column, ignoring duplicates by name.
    pub fn push(&mut self, name: &str, data_type: &str) {
        if !self.contains(name) {
            self.columns.push(Column::new(name, data_type));
        }
    }

    /// Case-insensitive membership test.
    pub fn contains(&self, name: &str) -> bool {
        self.columns
            .iter()
            .any(|column| column.name.eq_ignore_ascii_case(name))
    }

    /// Returns the type of a column, if present.
    pub fn type_of(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name))
            .map(|column| column.data_type.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl FromIterator<Column> for ColumnSet {
    fn from_iter<I: IntoIterator<Item = Column>>(iter: I) -> Self {
        let mut set = ColumnSet::new();
        for column in iter {
            set.push(&column.name, &column.data_type);
        }
        set
    }
}

/// Reads the column set of a table from the information schema, ordered by
/// ordinal position.
///
/// A table that does not exist yields an empty set, never an error: "no
/// columns yet" is a normal state during the first run of a pipeline.
pub async fn table_columns<W>(
    client: &W,
    database: &str,
    schema: &str,
    table: &str,
) -> StrataResult<ColumnSet>
where
    W: WarehouseClient,
{
    let statement = statements::table_columns_query(database, schema, table);
    let rows = client.execute(&statement).await?.unwrap_or_default();

    let mut columns = ColumnSet::new();
    for row in rows {
        let (Some(Some(name)), Some(Some(data_type))) = (row.first(), row.get(1)) else {
            return Err(strata_error!(
                ErrorKind::InvalidData,
                "Malformed information schema row",
                format!("expected (COLUMN_NAME, DATA_TYPE), got {row:?}")
            ));
        };
        columns.push(name, data_type);
    }

    Ok(columns)
}
