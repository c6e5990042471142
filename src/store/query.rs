//! PostgREST query-string builder.
//!
//! Produces the `(key, value)` pairs appended to `/rest/v1/{table}`. Values
//! are left unencoded; the URL builder encodes them.

use crate::models::{BranchFilter, DateRange};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostgrestQuery {
    table: String,
    params: Vec<(String, String)>,
}

impl PostgrestQuery {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            params: Vec::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    fn push(mut self, key: &str, value: String) -> Self {
        self.params.push((key.to_string(), value));
        self
    }

    pub fn select(self, columns: &str) -> Self {
        // Embedded resources are easier to read with whitespace; PostgREST
        // does not accept it.
        let compact: String = columns.chars().filter(|c| !c.is_whitespace()).collect();
        self.push("select", compact)
    }

    pub fn eq(self, column: &str, value: &str) -> Self {
        self.push(column, format!("eq.{value}"))
    }

    pub fn gte(self, column: &str, value: &str) -> Self {
        self.push(column, format!("gte.{value}"))
    }

    pub fn lte(self, column: &str, value: &str) -> Self {
        self.push(column, format!("lte.{value}"))
    }

    pub fn in_list(self, column: &str, values: &[&str]) -> Self {
        let quoted: Vec<String> = values
            .iter()
            .map(|v| {
                if v.contains([',', '(', ')', '"']) {
                    format!("\"{}\"", v.replace('"', "\\\""))
                } else {
                    v.to_string()
                }
            })
            .collect();
        self.push(column, format!("in.({})", quoted.join(",")))
    }

    pub fn order(self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.push("order", format!("{column}.{direction}"))
    }

    pub fn limit(self, n: usize) -> Self {
        self.push("limit", n.to_string())
    }

    /// Restrict to one branch; `AllBranches` adds nothing.
    pub fn for_branch(self, branch: &BranchFilter) -> Self {
        match branch.branch_id() {
            Some(id) => self.eq("branch_id", id),
            None => self,
        }
    }

    /// Closed window on a timestamp column.
    pub fn within(self, column: &str, range: &DateRange) -> Self {
        self.gte(column, &range.start_text())
            .lte(column, &range.end_text())
    }
}
