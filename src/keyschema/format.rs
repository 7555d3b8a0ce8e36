use std::fmt::{self, Display};

use super::KeySchemaError;

const MARKER: &str = "{}";

/// A positional key template, `{}` marking each value.
///
/// Produced by [`KeySchema::to_format`](super::KeySchema::to_format) for
/// callers that pass values in order rather than by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyFormat(String);

impl KeyFormat {
    pub fn new(format: impl Into<String>) -> Self {
        Self(format.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of `{}` markers.
    pub fn arity(&self) -> usize {
        self.0.matches(MARKER).count()
    }

    /// Fill the markers in order; the number of values must match.
    pub fn make(&self, values: &[&dyn Display]) -> Result<String, KeySchemaError> {
        let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        self.fill(&rendered)
    }

    /// Bind the leading values now; the returned closure takes the rest.
    pub fn partial(&self, leading: &[&dyn Display]) -> impl Fn(&[&dyn Display]) -> Result<String, KeySchemaError> {
        let format = self.clone();
        let leading: Vec<String> = leading.iter().map(|v| v.to_string()).collect();
        move |rest: &[&dyn Display]| {
            let mut values = leading.clone();
            values.extend(rest.iter().map(|v| v.to_string()));
            format.fill(&values)
        }
    }

    /// The `:`-separated parts of the format.
    pub fn split(&self) -> Vec<&str> {
        self.0.split(':').collect()
    }

    /// True when every marker starts a `:`-delimited part (or the format).
    pub fn is_well_formed(&self) -> bool {
        self.0
            .match_indices(MARKER)
            .all(|(i, _)| i == 0 || self.0.as_bytes()[i - 1] == b':')
    }

    fn fill(&self, values: &[String]) -> Result<String, KeySchemaError> {
        let expected = self.arity();
        if values.len() != expected {
            return Err(KeySchemaError::Arity { expected, got: values.len() });
        }

        let mut out = String::with_capacity(self.0.len() + values.iter().map(String::len).sum::<usize>());
        let mut parts = self.0.split(MARKER);
        if let Some(first) = parts.next() {
            out.push_str(first);
        }
        for (part, value) in parts.zip(values) {
            out.push_str(value);
            out.push_str(part);
        }
        Ok(out)
    }
}

impl Display for KeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
