use std::fs;
use std::path::Path;

use crate::dataset::table::Table;
use crate::dataset::DatasetError;

pub fn read_csv_table(name: &str, path: &Path) -> Result<Table, DatasetError> {
    let content = fs::read_to_string(path)
        .map_err(|source| DatasetError::ReadFile { path: path.to_path_buf(), source })?;
    parse_csv_table(name, &path.display().to_string(), &content)
}

/// Parses a header row followed by comma separated numeric rows. Fields may be
/// double-quoted (with `""` as an escaped quote) but may not span lines.
pub fn parse_csv_table(name: &str, origin: &str, content: &str) -> Result<Table, DatasetError> {
    let mut lines = content
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let Some((_, header_line)) = lines.next() else {
        return Err(DatasetError::Empty(origin.to_string()));
    };

    let columns = split_record(header_line);
    if columns.iter().any(String::is_empty) {
        return Err(DatasetError::Empty(format!("blank header in {origin}")));
    }

    let mut rows = Vec::new();
    for (line_number, line) in lines {
        let cells = split_record(line);
        if cells.len() != columns.len() {
            return Err(DatasetError::ColumnMismatch {
                origin: origin.to_string(),
                line: line_number,
                expected: columns.len(),
                actual: cells.len(),
            });
        }

        let row = cells
            .iter()
            .map(|cell| parse_cell(cell))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| DatasetError::InvalidNumber {
                origin: origin.to_string(),
                line: line_number,
            })?;
        rows.push(row);
    }

    Ok(Table::new(name, columns, rows))
}

fn split_record(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if quoted && chars.peek() == Some(&'"') => {
                chars.next();
                field.push('"');
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(ch),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

fn parse_cell(cell: &str) -> Option<f64> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") {
        return Some(f64::NAN);
    }
    match cell.to_ascii_lowercase().as_str() {
        "true" => Some(1.0),
        "false" => Some(0.0),
        _ => cell.parse::<f64>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_csv_table;
    use crate::dataset::DatasetError;

    #[test]
    fn parses_numeric_rows_and_blank_cells() {
        let table = parse_csv_table(
            "activity",
            "inline",
            "Patient_Number,Day_Number,Physical_activity\n1,1,4500\n1,2,\n\n2,1,7000.5\n",
        )
        .expect("valid csv");

        assert_eq!(table.columns().len(), 3);
        assert_eq!(table.len(), 3);
        assert!(table.rows()[1][2].is_nan());
        assert_eq!(table.rows()[2][2], 7000.5);
    }

    #[test]
    fn rejects_ragged_rows_with_line_number() {
        let error = parse_csv_table("health", "inline", "a,b\n1,2\n3\n")
            .expect_err("ragged row should fail");

        assert!(matches!(
            error,
            DatasetError::ColumnMismatch { line: 3, expected: 2, actual: 1, .. }
        ));
    }

    #[test]
    fn quoted_fields_may_contain_commas() {
        let table = parse_csv_table(
            "health",
            "inline",
            "\"Patient_Number\",\"Weight, kg\"\n\"1\",\"70.5\"\n2,81\n",
        )
        .expect("quoted csv");

        assert_eq!(table.columns(), &["Patient_Number".to_string(), "Weight, kg".to_string()]);
        assert_eq!(table.rows()[0], vec![1.0, 70.5]);
        assert_eq!(table.rows()[1], vec![2.0, 81.0]);
    }

    #[test]
    fn quoted_text_with_commas_is_a_number_error_not_a_ragged_row() {
        let error = parse_csv_table("health", "inline", "a,b\n\"1,5\",2\n")
            .expect_err("quoted text should fail as a number");
        assert!(matches!(error, DatasetError::InvalidNumber { line: 2, .. }));
    }

    #[test]
    fn rejects_non_numeric_cells() {
        let error = parse_csv_table("health", "inline", "a,b\n1,yes\n")
            .expect_err("text cell should fail");
        assert!(matches!(error, DatasetError::InvalidNumber { line: 2, .. }));
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(matches!(
            parse_csv_table("health", "inline", "\n\n"),
            Err(DatasetError::Empty(_))
        ));
    }
}
