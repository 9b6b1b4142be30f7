//! Live variable values exchanged with a running model.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A value held by a model variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Complex { real: f64, imag: f64 },
    Text(String),
    Tuple(Vec<Value>),
    Set(Vec<Value>),
    /// Row-major matrix.
    Matrix {
        rows: usize,
        columns: usize,
        data: Vec<Value>,
    },
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::Complex { real, imag } => {
                if *imag < 0.0 {
                    write!(f, "{} - {}i", real, -imag)
                } else {
                    write!(f, "{} + {}i", real, imag)
                }
            }
            Value::Text(v) => write!(f, "\"{}\"", v),
            Value::Tuple(items) => write_list(f, "(", items, ")"),
            Value::Set(items) => write_list(f, "{", items, "}"),
            Value::Matrix { rows, columns, data } => {
                f.write_str("[")?;
                for row in 0..*rows {
                    if row > 0 {
                        f.write_str("; ")?;
                    }
                    for column in 0..*columns {
                        if column > 0 {
                            f.write_str(", ")?;
                        }
                        match data.get(row * columns + column) {
                            Some(value) => write!(f, "{}", value)?,
                            None => f.write_str("?")?,
                        }
                    }
                }
                f.write_str("]")
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    f.write_str(close)
}

/// A value computed for (or assigned to) a named variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculatedValue {
    pub name: String,
    pub value: Value,
}

impl CalculatedValue {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}
