pub mod cache;
pub mod filter;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(default)]
    pub is_primary_key: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            is_primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyDescriptor {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    pub name: String,
    #[serde(rename = "schema")]
    pub schema_namespace: String,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
}

impl TableDescriptor {
    pub fn new(schema_namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema_namespace: schema_namespace.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: ColumnDescriptor) -> Self {
        self.columns.push(column);
        self
    }

    /// `schema.table`, or just the table when the namespace is empty.
    pub fn qualified_name(&self) -> String {
        if self.schema_namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema_namespace, self.name)
        }
    }
}

/// Ordered tables of one database as seen at introspection time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: Vec<TableDescriptor>,
}

impl SchemaSnapshot {
    pub fn new(tables: Vec<TableDescriptor>) -> Self {
        Self { tables }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    /// Plain-text rendering handed to the model.
    pub fn to_prompt_text(&self) -> String {
        let mut out = String::from("DATABASE SCHEMA:\n================\n\n");

        for table in &self.tables {
            out.push_str(&format!("TABLE: {}\n", table.qualified_name()));
            out.push_str("COLUMNS:\n");
            for col in &table.columns {
                let nullable = if col.nullable { "NULL" } else { "NOT NULL" };
                let key = if col.is_primary_key { ", PRIMARY KEY" } else { "" };
                out.push_str(&format!("  - {} ({}, {}{})\n", col.name, col.data_type, nullable, key));
            }
            if !table.foreign_keys.is_empty() {
                out.push_str("FOREIGN KEYS:\n");
                for fk in &table.foreign_keys {
                    out.push_str(&format!(
                        "  - {} -> {}.{}\n",
                        fk.column, fk.referenced_table, fk.referenced_column
                    ));
                }
            }
            out.push('\n');
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_text_lists_tables_columns_and_keys() {
        let mut orders = TableDescriptor::new("dbo", "ORDERS")
            .with_column(ColumnDescriptor::new("ID", "int", false).primary_key())
            .with_column(ColumnDescriptor::new("CUSTOMER_ID", "int", true));
        orders.foreign_keys.push(ForeignKeyDescriptor {
            column: "CUSTOMER_ID".into(),
            referenced_table: "CUSTOMER".into(),
            referenced_column: "ID".into(),
        });
        let snapshot = SchemaSnapshot::new(vec![orders, TableDescriptor::new("", "lonely")]);

        let text = snapshot.to_prompt_text();
        assert!(text.starts_with("DATABASE SCHEMA:"));
        assert!(text.contains("TABLE: dbo.ORDERS\n"));
        assert!(text.contains("  - ID (int, NOT NULL, PRIMARY KEY)\n"));
        assert!(text.contains("  - CUSTOMER_ID (int, NULL)\n"));
        assert!(text.contains("  - CUSTOMER_ID -> CUSTOMER.ID\n"));
        assert!(text.contains("TABLE: lonely\n"));
    }

    #[test]
    fn table_lookup_ignores_case() {
        let snapshot = SchemaSnapshot::new(vec![TableDescriptor::new("main", "Customers")]);
        assert!(snapshot.table("customers").is_some());
        assert!(snapshot.table("orders").is_none());
    }
}
