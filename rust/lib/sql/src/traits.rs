use crate::error::SQLError;

/// A dynamically-typed SQL parameter or column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

/// Booleans are stored as 0/1 integers.
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Integer(i64::from(b))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A row returned from a SQL query: column name to value.
#[derive(Debug, Clone)]
pub struct Row {
    pub columns: Vec<(String, Value)>,
}

impl Row {
    /// Get a column value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Get a text column value by name. `None` for NULL or non-text.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(Value::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Get an integer column value by name.
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name) {
            Some(Value::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    /// Get a 0/1 integer column as a boolean.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get_i64(name).map(|i| i != 0)
    }
}

/// SQLStore provides a SQL execution interface backed by an embedded database.
///
/// Implementations must be safe to share across request handlers; each
/// call is its own implicit transaction.
pub trait SQLStore: Send + Sync {
    /// Execute a query and return rows. Also used for statements with a
    /// `RETURNING` clause.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError>;

    /// Execute several `;`-separated statements without parameters.
    /// Used for schema setup.
    fn exec_batch(&self, sql: &str) -> Result<(), SQLError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_conversions() {
        assert_eq!(Value::from("a"), Value::Text("a".into()));
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from(false), Value::Integer(0));
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(Value::from(Some(false)), Value::Integer(0));
        assert_eq!(Value::from(Some("x".to_string())), Value::Text("x".into()));
    }

    #[test]
    fn row_accessors() {
        let row = Row {
            columns: vec![
                ("name".into(), Value::Text("n".into())),
                ("flag".into(), Value::Integer(1)),
                ("gone".into(), Value::Null),
            ],
        };
        assert_eq!(row.get_str("name"), Some("n"));
        assert_eq!(row.get_bool("flag"), Some(true));
        assert_eq!(row.get_str("gone"), None);
        assert_eq!(row.get_bool("gone"), None);
        assert!(row.get("missing").is_none());
    }
}
