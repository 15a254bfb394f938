use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::Relationship;

/// Where a diagnostic applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum Location {
    Project,
    Table {
        table: String,
    },
    Column {
        table: String,
        column: String,
    },
    Relationship {
        child_table: String,
        child_column: String,
        parent_table: String,
        parent_column: String,
    },
}

impl Location {
    pub fn relationship(rel: &Relationship) -> Self {
        Location::Relationship {
            child_table: rel.child_table.clone(),
            child_column: rel.child_column.clone(),
            parent_table: rel.parent_table.clone(),
            parent_column: rel.parent_column.clone(),
        }
    }

    /// Table the location belongs to, if any. Relationships report their child table.
    pub fn table(&self) -> Option<&str> {
        match self {
            Location::Project => None,
            Location::Table { table } | Location::Column { table, .. } => Some(table),
            Location::Relationship { child_table, .. } => Some(child_table),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Project => write!(f, "Project"),
            Location::Table { table } => write!(f, "Table '{table}'"),
            Location::Column { table, column } => write!(f, "Table '{table}', column '{column}'"),
            Location::Relationship {
                child_table,
                child_column,
                parent_table,
                parent_column,
            } => write!(
                f,
                "Foreign key '{child_table}.{child_column} -> {parent_table}.{parent_column}'"
            ),
        }
    }
}

/// Actionable validation finding, rendered as `<Location>: <issue>. Fix: <hint>.`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub location: Location,
    pub issue: String,
    pub hint: String,
}

impl Diagnostic {
    pub fn new(location: Location, issue: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            location,
            issue: issue.into(),
            hint: hint.into(),
        }
    }

    pub fn project(issue: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::new(Location::Project, issue, hint)
    }

    pub fn table(table: &str, issue: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::new(
            Location::Table {
                table: table.to_string(),
            },
            issue,
            hint,
        )
    }

    pub fn column(
        table: &str,
        column: &str,
        issue: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self::new(
            Location::Column {
                table: table.to_string(),
                column: column.to_string(),
            },
            issue,
            hint,
        )
    }

    pub fn relationship(
        rel: &Relationship,
        issue: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self::new(Location::relationship(rel), issue, hint)
    }

    /// The canonical single-line rendering.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}. Fix: {}.",
            self.location,
            self.issue.trim_end_matches('.'),
            self.hint.trim_end_matches('.')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_canonical_shape() {
        let diagnostic = Diagnostic::column(
            "customers",
            "email",
            "business_key columns must be non-nullable",
            "set nullable=false for business_key columns",
        );
        assert_eq!(
            diagnostic.to_string(),
            "Table 'customers', column 'email': business_key columns must be non-nullable. \
             Fix: set nullable=false for business_key columns."
        );
    }

    #[test]
    fn trailing_periods_are_not_doubled() {
        let diagnostic = Diagnostic::project("no tables.", "add a table.");
        assert_eq!(diagnostic.to_string(), "Project: no tables. Fix: add a table.");
    }

    #[test]
    fn relationship_location_names_both_sides() {
        let rel = Relationship {
            child_table: "orders".to_string(),
            child_column: "customer_id".to_string(),
            parent_table: "customers".to_string(),
            parent_column: "id".to_string(),
            min_children: 1,
            max_children: 3,
        };
        let location = Location::relationship(&rel);
        assert_eq!(
            location.to_string(),
            "Foreign key 'orders.customer_id -> customers.id'"
        );
        assert_eq!(location.table(), Some("orders"));
    }
}
