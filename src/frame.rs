//! In-memory tabular result sets.
//!
//! A [`Frame`] is what flows between the pipeline stages: the extractor
//! produces one, a transform reshapes it, and the loader writes it out.
//! Rows are positional and always as wide as the column list.

use chrono::NaiveDateTime;
use std::fmt;

use crate::error::{EtlError, EtlResult};

/// Dynamic scalar value held in a frame cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }

    /// Text rendering of any non-null value.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Read a text cell, failing if it holds anything but text or null.
    pub fn expect_text(&self, column: &str) -> EtlResult<Option<&str>> {
        match self {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s)),
            other => Err(EtlError::mismatch(column, "text", other.type_name())),
        }
    }

    /// Read an integer cell, failing if it holds anything but an integer or null.
    pub fn expect_int(&self, column: &str) -> EtlResult<Option<i64>> {
        match self {
            Value::Null => Ok(None),
            Value::Int(n) => Ok(Some(*n)),
            other => Err(EtlError::mismatch(column, "integer", other.type_name())),
        }
    }

    /// Read a numeric cell as `f64`.
    pub fn expect_number(&self, column: &str) -> EtlResult<Option<f64>> {
        match self {
            Value::Null => Ok(None),
            Value::Int(_) | Value::Float(_) => Ok(self.as_f64()),
            other => Err(EtlError::mismatch(column, "number", other.type_name())),
        }
    }

    /// Read a timestamp cell that must be present.
    pub fn require_timestamp(&self, column: &str) -> EtlResult<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Ok(*ts),
            other => Err(EtlError::mismatch(column, "timestamp", other.type_name())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An ordered set of named columns and positional rows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Frame {
    /// Create an empty frame with the given column names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. It must have exactly one value per column.
    pub fn push_row(&mut self, row: Vec<Value>) -> EtlResult<()> {
        if row.len() != self.columns.len() {
            return Err(EtlError::RowArity {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Builder-style [`Frame::push_row`].
    pub fn with_row(mut self, row: Vec<Value>) -> EtlResult<Self> {
        self.push_row(row)?;
        Ok(self)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Position of `name` in the column list.
    pub fn column_index(&self, name: &str) -> EtlResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| EtlError::MissingColumn(name.to_string()))
    }

    /// Iterate over one column's values, top to bottom.
    pub fn column_values<'a>(&'a self, name: &str) -> EtlResult<impl Iterator<Item = &'a Value> + use<'a>> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Relabel columns according to `(from, to)` pairs.
    ///
    /// Every `from` column must be present; the first missing one aborts the
    /// rename and leaves the frame untouched.
    pub fn rename(&mut self, mapping: &[(&str, &str)]) -> EtlResult<()> {
        let positions = mapping
            .iter()
            .map(|(from, _)| self.column_index(from))
            .collect::<EtlResult<Vec<_>>>()?;

        for (idx, (_, to)) in positions.into_iter().zip(mapping) {
            self.columns[idx] = (*to).to_string();
        }
        Ok(())
    }

    /// Add a column at the end, or overwrite it in place if the name exists.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<Value>) -> EtlResult<()> {
        if values.len() != self.rows.len() {
            return Err(EtlError::RowArity {
                expected: self.rows.len(),
                found: values.len(),
            });
        }

        let name = name.into();
        match self.columns.iter().position(|c| *c == name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name);
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::new(["ProductID", "ProductName"])
            .with_row(vec![1.into(), "Road Bike".into()])
            .unwrap()
            .with_row(vec![2.into(), Value::Null])
            .unwrap()
    }

    #[test]
    fn test_push_row_checks_arity() {
        let mut frame = Frame::new(["a", "b"]);
        let err = frame.push_row(vec![1.into()]).unwrap_err();
        assert!(matches!(err, EtlError::RowArity { expected: 2, found: 1 }));
    }

    #[test]
    fn test_rename() {
        let mut frame = sample();
        frame
            .rename(&[("ProductID", "id_produto"), ("ProductName", "nome_produto")])
            .unwrap();
        assert_eq!(frame.columns(), ["id_produto", "nome_produto"]);
        assert_eq!(frame.rows()[0][1], Value::Text("Road Bike".into()));
    }

    #[test]
    fn test_rename_missing_column_is_fatal() {
        let mut frame = sample();
        let err = frame
            .rename(&[("ProductID", "id_produto"), ("CategoryName", "categoria")])
            .unwrap_err();
        assert!(matches!(err, EtlError::MissingColumn(ref c) if c == "CategoryName"));
        // Nothing was relabelled.
        assert_eq!(frame.columns(), ["ProductID", "ProductName"]);
    }

    #[test]
    fn test_push_column_appends_and_overwrites() {
        let mut frame = sample();
        frame.push_column("flag", vec![true.into(), false.into()]).unwrap();
        assert_eq!(frame.width(), 3);

        frame.push_column("flag", vec![Value::Null, true.into()]).unwrap();
        assert_eq!(frame.width(), 3);
        assert_eq!(frame.rows()[1][2], Value::Bool(true));
    }

    #[test]
    fn test_push_column_length_mismatch() {
        let mut frame = sample();
        assert!(frame.push_column("x", vec![1.into()]).is_err());
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Int(3).as_f64(), Some(3.0));
        assert_eq!(Value::Null.expect_text("c").unwrap(), None);
        assert!(Value::Int(1).expect_text("c").is_err());
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::Float(1.5).to_text().as_deref(), Some("1.5"));
    }

    #[test]
    fn test_column_values() {
        let frame = sample();
        let ids: Vec<_> = frame.column_values("ProductID").unwrap().cloned().collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2)]);
    }
}
