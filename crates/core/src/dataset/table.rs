/// Row-major numeric table. Missing cells are NaN.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl Table {
    /// Rows must all have `columns.len()` cells; callers enforce this.
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        debug_assert!(rows.iter().all(|row| row.len() == columns.len()));
        Self { name: name.into(), columns, rows }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn column_values(&self, column: &str) -> Option<Vec<f64>> {
        let index = self.column_index(column)?;
        Some(self.rows.iter().map(|row| row[index]).collect())
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn into_parts(self) -> (String, Vec<String>, Vec<Vec<f64>>) {
        (self.name, self.columns, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::Table;

    #[test]
    fn column_lookup_is_exact() {
        let table = Table::new(
            "health",
            vec!["Patient_Number".to_string(), "BMI".to_string()],
            vec![vec![1.0, 22.5], vec![2.0, 31.0]],
        );

        assert_eq!(table.column_index("BMI"), Some(1));
        assert_eq!(table.column_index("bmi"), None);
        assert_eq!(table.column_values("BMI"), Some(vec![22.5, 31.0]));
        assert_eq!(table.len(), 2);
        assert_eq!(table.width(), 2);
    }
}
