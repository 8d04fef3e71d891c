use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::analysis::ast::{
    AggFunction, Aggregate, BinaryOp, Expr, Pipeline, Script, Stage, Statement, UnaryOp,
};
use crate::analysis::render::render_table;
use crate::analysis::AnalysisError;
use crate::dataset::{Datasets, Table};

const JOIN_SUFFIX: &str = "_right";

/// Runs every statement in order and returns the concatenated printed output.
pub fn execute(script: &Script, datasets: &Datasets) -> Result<String, AnalysisError> {
    let mut interpreter = Interpreter { datasets, bindings: HashMap::new() };
    let mut printed = Vec::new();

    for statement in &script.statements {
        match statement {
            Statement::Let { name, pipeline } => {
                let table = interpreter.pipeline(pipeline)?.renamed(name.clone());
                interpreter.bindings.insert(name.clone(), table);
            }
            Statement::Emit { pipeline } => {
                let table = interpreter.pipeline(pipeline)?;
                printed.push(render_table(&table));
            }
        }
    }

    Ok(printed.join("\n"))
}

struct Interpreter<'a> {
    datasets: &'a Datasets,
    bindings: HashMap<String, Table>,
}

impl Interpreter<'_> {
    fn pipeline(&self, pipeline: &Pipeline) -> Result<Table, AnalysisError> {
        let mut table = self.lookup(&pipeline.source)?.clone();
        for stage in &pipeline.stages {
            table = self.stage(table, stage)?;
        }
        Ok(table)
    }

    fn lookup(&self, name: &str) -> Result<&Table, AnalysisError> {
        self.bindings
            .get(name)
            .or_else(|| self.datasets.table(name))
            .ok_or_else(|| AnalysisError::UnknownTable(name.to_string()))
    }

    fn stage(&self, table: Table, stage: &Stage) -> Result<Table, AnalysisError> {
        match stage {
            Stage::Where(predicate) => filter(table, predicate),
            Stage::Select(columns) => select(table, columns),
            Stage::Derive(columns) => {
                let mut table = table;
                for (name, expr) in columns {
                    table = derive(table, name, expr)?;
                }
                Ok(table)
            }
            Stage::Join { source, key } => join(table, self.lookup(source)?, key),
            Stage::Summarize { aggregates, by } => summarize(&table, aggregates, by),
            Stage::Sort { column, descending } => sort(table, column, *descending),
            Stage::Limit(count) => {
                let (name, columns, mut rows) = table.into_parts();
                rows.truncate(*count);
                Ok(Table::new(name, columns, rows))
            }
            Stage::Count => {
                Ok(Table::new(table.name(), vec!["count".to_string()], vec![vec![table.len() as f64]]))
            }
        }
    }
}

/// Expression with column names resolved to row offsets.
enum Bound {
    Number(f64),
    Column(usize),
    Unary(UnaryOp, Box<Bound>),
    Binary(BinaryOp, Box<Bound>, Box<Bound>),
}

impl Bound {
    fn bind(expr: &Expr, table: &Table) -> Result<Self, AnalysisError> {
        Ok(match expr {
            Expr::Number(value) => Self::Number(*value),
            Expr::Column(name) => Self::Column(column_index(table, name)?),
            Expr::Unary { op, expr } => Self::Unary(*op, Box::new(Self::bind(expr, table)?)),
            Expr::Binary { op, left, right } => Self::Binary(
                *op,
                Box::new(Self::bind(left, table)?),
                Box::new(Self::bind(right, table)?),
            ),
        })
    }

    fn eval(&self, row: &[f64]) -> f64 {
        match self {
            Self::Number(value) => *value,
            Self::Column(index) => row[*index],
            Self::Unary(UnaryOp::Neg, expr) => -expr.eval(row),
            Self::Unary(UnaryOp::Not, expr) => flag(!truthy(expr.eval(row))),
            Self::Binary(op, left, right) => {
                let left = left.eval(row);
                let right = right.eval(row);
                match op {
                    BinaryOp::Add => left + right,
                    BinaryOp::Sub => left - right,
                    BinaryOp::Mul => left * right,
                    BinaryOp::Div => left / right,
                    BinaryOp::Eq => flag(left == right),
                    BinaryOp::NotEq => flag(!left.is_nan() && !right.is_nan() && left != right),
                    BinaryOp::Lt => flag(left < right),
                    BinaryOp::Le => flag(left <= right),
                    BinaryOp::Gt => flag(left > right),
                    BinaryOp::Ge => flag(left >= right),
                    BinaryOp::And => flag(truthy(left) && truthy(right)),
                    BinaryOp::Or => flag(truthy(left) || truthy(right)),
                }
            }
        }
    }
}

fn truthy(value: f64) -> bool {
    !value.is_nan() && value != 0.0
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

fn column_index(table: &Table, column: &str) -> Result<usize, AnalysisError> {
    table.column_index(column).ok_or_else(|| AnalysisError::UnknownColumn {
        table: table.name().to_string(),
        column: column.to_string(),
        available: table.columns().join(", "),
    })
}

fn filter(table: Table, predicate: &Expr) -> Result<Table, AnalysisError> {
    let predicate = Bound::bind(predicate, &table)?;
    let (name, columns, rows) = table.into_parts();
    let rows = rows.into_iter().filter(|row| truthy(predicate.eval(row))).collect();
    Ok(Table::new(name, columns, rows))
}

fn select(table: Table, columns: &[String]) -> Result<Table, AnalysisError> {
    let indices =
        columns.iter().map(|column| column_index(&table, column)).collect::<Result<Vec<_>, _>>()?;
    let rows = table
        .rows()
        .iter()
        .map(|row| indices.iter().map(|index| row[*index]).collect())
        .collect();
    Ok(Table::new(table.name(), columns.to_vec(), rows))
}

fn derive(table: Table, column: &str, expr: &Expr) -> Result<Table, AnalysisError> {
    let bound = Bound::bind(expr, &table)?;
    let existing = table.column_index(column);
    let (name, mut columns, mut rows) = table.into_parts();

    for row in &mut rows {
        let value = bound.eval(row);
        match existing {
            Some(index) => row[index] = value,
            None => row.push(value),
        }
    }
    if existing.is_none() {
        columns.push(column.to_string());
    }
    Ok(Table::new(name, columns, rows))
}

/// Inner join on `key`; right-hand columns that clash with the left get a suffix.
fn join(left: Table, right: &Table, key: &str) -> Result<Table, AnalysisError> {
    let left_key = column_index(&left, key)?;
    let right_key = column_index(right, key)?;

    let mut index: HashMap<u64, Vec<usize>> = HashMap::new();
    for (position, row) in right.rows().iter().enumerate() {
        let value = row[right_key];
        if !value.is_nan() {
            index.entry(normalized_bits(value)).or_default().push(position);
        }
    }

    let kept: Vec<usize> = (0..right.width()).filter(|column| *column != right_key).collect();
    let mut columns = left.columns().to_vec();
    for column in &kept {
        let name = &right.columns()[*column];
        if columns.contains(name) {
            columns.push(format!("{name}{JOIN_SUFFIX}"));
        } else {
            columns.push(name.clone());
        }
    }

    let mut rows = Vec::new();
    for row in left.rows() {
        let value = row[left_key];
        if value.is_nan() {
            continue;
        }
        let Some(matches) = index.get(&normalized_bits(value)) else {
            continue;
        };
        for position in matches {
            let other = &right.rows()[*position];
            let mut joined = row.clone();
            joined.extend(kept.iter().map(|column| other[*column]));
            rows.push(joined);
        }
    }

    Ok(Table::new(left.name(), columns, rows))
}

fn normalized_bits(value: f64) -> u64 {
    // -0.0 and 0.0 must hash to the same bucket.
    if value == 0.0 {
        0.0_f64.to_bits()
    } else {
        value.to_bits()
    }
}

#[derive(Debug, PartialEq)]
struct GroupKey(Vec<f64>);

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (left, right) in self.0.iter().zip(&other.0) {
            let ordering = left.total_cmp(right);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

fn summarize(table: &Table, aggregates: &[Aggregate], by: &[String]) -> Result<Table, AnalysisError> {
    let group_indices =
        by.iter().map(|column| column_index(table, column)).collect::<Result<Vec<_>, _>>()?;
    let argument_indices = aggregates
        .iter()
        .map(|aggregate| {
            aggregate
                .args
                .iter()
                .map(|column| column_index(table, column))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut groups: BTreeMap<GroupKey, Vec<&[f64]>> = BTreeMap::new();
    if group_indices.is_empty() {
        groups.insert(GroupKey(Vec::new()), table.rows().iter().map(Vec::as_slice).collect());
    } else {
        for row in table.rows() {
            let key = GroupKey(group_indices.iter().map(|index| row[*index]).collect());
            groups.entry(key).or_default().push(row.as_slice());
        }
    }

    let mut columns = by.to_vec();
    columns.extend(aggregates.iter().map(Aggregate::output_name));

    let rows = groups
        .into_iter()
        .map(|(GroupKey(mut key), rows)| {
            for (aggregate, indices) in aggregates.iter().zip(&argument_indices) {
                key.push(aggregate_value(aggregate.function, indices, &rows));
            }
            key
        })
        .collect();

    Ok(Table::new(table.name(), columns, rows))
}

fn aggregate_value(function: AggFunction, indices: &[usize], rows: &[&[f64]]) -> f64 {
    let present = |index: usize| -> Vec<f64> {
        rows.iter().map(|row| row[index]).filter(|value| !value.is_nan()).collect()
    };

    match (function, indices) {
        (AggFunction::Count, []) => rows.len() as f64,
        (AggFunction::Count, [index]) => present(*index).len() as f64,
        (AggFunction::Sum, [index]) => present(*index).iter().sum(),
        (AggFunction::Mean, [index]) => mean(&present(*index)),
        (AggFunction::Min, [index]) => {
            present(*index).into_iter().min_by(f64::total_cmp).unwrap_or(f64::NAN)
        }
        (AggFunction::Max, [index]) => {
            present(*index).into_iter().max_by(f64::total_cmp).unwrap_or(f64::NAN)
        }
        (AggFunction::Median, [index]) => median(present(*index)),
        (AggFunction::Std, [index]) => sample_std(&present(*index)),
        (AggFunction::Corr, [x, y]) => {
            let pairs: Vec<(f64, f64)> = rows
                .iter()
                .map(|row| (row[*x], row[*y]))
                .filter(|(a, b)| !a.is_nan() && !b.is_nan())
                .collect();
            pearson(&pairs)
        }
        _ => f64::NAN,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    let middle = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[middle - 1] + values[middle]) / 2.0
    } else {
        values[middle]
    }
}

// Sample standard deviation (n - 1 denominator).
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let center = mean(values);
    let squares: f64 = values.iter().map(|value| (value - center).powi(2)).sum();
    (squares / (values.len() - 1) as f64).sqrt()
}

fn pearson(pairs: &[(f64, f64)]) -> f64 {
    if pairs.len() < 2 {
        return f64::NAN;
    }
    let count = pairs.len() as f64;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / count;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / count;

    let mut covariance = 0.0;
    let mut variance_x = 0.0;
    let mut variance_y = 0.0;
    for (x, y) in pairs {
        covariance += (x - mean_x) * (y - mean_y);
        variance_x += (x - mean_x).powi(2);
        variance_y += (y - mean_y).powi(2);
    }

    let denominator = (variance_x * variance_y).sqrt();
    if denominator == 0.0 {
        f64::NAN
    } else {
        covariance / denominator
    }
}

/// Stable sort; NaN cells always go last.
fn sort(table: Table, column: &str, descending: bool) -> Result<Table, AnalysisError> {
    let index = column_index(&table, column)?;
    let (name, columns, mut rows) = table.into_parts();
    rows.sort_by(|left, right| {
        let (left, right) = (left[index], right[index]);
        match (left.is_nan(), right.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if descending => right.total_cmp(&left),
            (false, false) => left.total_cmp(&right),
        }
    });
    Ok(Table::new(name, columns, rows))
}

#[cfg(test)]
mod tests {
    use super::{median, pearson, sample_std};

    #[test]
    fn median_averages_the_middle_pair() {
        assert_eq!(median(vec![4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(vec![5.0, 1.0, 3.0]), 3.0);
        assert!(median(Vec::new()).is_nan());
    }

    #[test]
    fn std_uses_sample_denominator() {
        let std = sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((std - 2.138_089_935).abs() < 1e-6);
        assert!(sample_std(&[1.0]).is_nan());
    }

    #[test]
    fn pearson_detects_perfect_correlation() {
        let pairs = [(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)];
        assert!((pearson(&pairs) - 1.0).abs() < 1e-12);
        assert!(pearson(&[(1.0, 1.0), (1.0, 2.0)]).is_nan());
    }
}
