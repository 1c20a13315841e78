//! Typed records: upstream payloads and the rows written to the store

pub mod historical;
pub mod modern;
pub mod rows;

use serde::{Deserialize, Deserializer};

/// A list element that decodes to `T` when it can.
///
/// A malformed element keeps the rest of the list usable; the stage counts it
/// as failed and moves on.
#[derive(Debug, Clone)]
pub enum Lenient<T> {
    Ok(T),
    Malformed(String),
}

impl<T> Lenient<T> {
    pub fn as_ok(&self) -> Option<&T> {
        match self {
            Lenient::Ok(value) => Some(value),
            Lenient::Malformed(_) => None,
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            Lenient::Ok(value) => Ok(value),
            Lenient::Malformed(reason) => Err(reason),
        }
    }
}

impl<'de, T> Deserialize<'de> for Lenient<T>
where
    T: serde::de::DeserializeOwned,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match serde_json::from_value::<T>(value) {
            Ok(record) => Lenient::Ok(record),
            Err(e) => Lenient::Malformed(e.to_string()),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Row {
        n: i32,
    }

    #[test]
    fn test_lenient_keeps_good_elements() {
        let rows: Vec<Lenient<Row>> = serde_json::from_str(r#"[{"n":1},{"n":"x"},{"n":3}]"#).unwrap();
        let good: Vec<i32> = rows.iter().filter_map(|r| r.as_ok()).map(|r| r.n).collect();
        assert_eq!(good, vec![1, 3]);
        assert!(rows.into_iter().nth(1).unwrap().into_result().is_err());
    }
}
