//! Named URL parameters (`/key:value`, `/key[]:v`)

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ParamValue {
    Scalar(String),
    List(Vec<String>),
}

/// Ordered set of named parameters appended to a path
///
/// ```rust
/// use mispsync_core::sync::NamedParams;
///
/// let params = NamedParams::new()
///     .with("deleted", 1)
///     .with_list("tags", ["tlp:white", "osint"]);
/// assert_eq!(params.to_path(), "/deleted:1/tags[]:tlp:white/tags[]:osint");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedParams(Vec<(String, ParamValue)>);

impl NamedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.push((key.into(), ParamValue::Scalar(value.to_string())));
        self
    }

    pub fn with_list<I, V>(mut self, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.0.push((key.into(), ParamValue::List(values)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path suffix, empty when there are no parameters
    pub fn to_path(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NamedParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.0 {
            match value {
                ParamValue::Scalar(v) => write!(f, "/{}:{}", key, v)?,
                ParamValue::List(values) => {
                    for v in values {
                        write!(f, "/{}[]:{}", key, v)?;
                    }
                }
            }
        }
        Ok(())
    }
}
