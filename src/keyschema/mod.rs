// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Named-placeholder key templates.
//!
//! A [`KeySchema`] binds a template such as `"pocket:{account_id}:{name}"`
//! to a parameter type and an expiration. The template is parsed and every
//! placeholder resolved against the parameter's [`KeyParams`] table once,
//! at construction, so building a key afterwards cannot fail.
//!
//! ```
//! use memstore::{key_params, KeySchema};
//! use std::time::Duration;
//!
//! struct A {
//!     xxx: String,
//!     yyy: i32,
//! }
//!
//! key_params!(A { xxx, yyy });
//!
//! let schema = KeySchema::<A>::new("key:{xxx}:{yyy}:{xxx}", Duration::from_secs(600)).unwrap();
//! assert_eq!(schema.build(&A { xxx: "a".into(), yyy: 1 }), "key:a:1:a");
//! ```

mod field;
mod format;
mod placeholder;

pub use field::{to_snake_case, Accessor, Field, KeyParams, ParamShape};
pub use format::KeyFormat;

use std::fmt::{self, Display};
use std::time::Duration;

use thiserror::Error;
use tracing::error;

use placeholder::Segment;

/// Upper bound on placeholders in one template.
pub const MAX_PLACEHOLDERS: usize = 1000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeySchemaError {
    #[error("malformed schema '{template}': {reason}")]
    Malformed { template: String, reason: &'static str },

    #[error("placeholder '{name}' does not match any field (fields: {fields:?})")]
    UnknownField { name: String, fields: Vec<String> },

    #[error("schema '{template}' must have exactly one placeholder for a scalar parameter, found {found}")]
    PlaceholderCount { template: String, found: usize },

    #[error("schema has more than {0} placeholders")]
    TooManyPlaceholders(usize),

    #[error("expected {expected} values, got {got}")]
    Arity { expected: usize, got: usize },
}

/// A compiled key template for parameters of type `P`.
pub struct KeySchema<P> {
    template: String,
    segments: Vec<Segment>,
    // One per placeholder occurrence, in template order.
    accessors: Vec<Accessor<P>>,
    exp: Duration,
}

impl<P: KeyParams> KeySchema<P> {
    pub fn new(template: impl Into<String>, exp: Duration) -> Result<Self, KeySchemaError> {
        let template = template.into();
        let segments = placeholder::parse(&template)?;
        let names: Vec<&str> = segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect();

        let accessors = match P::shape() {
            ParamShape::Record(fields) => names
                .iter()
                .map(|name| {
                    fields
                        .iter()
                        .find(|f| f.name() == *name)
                        .map(Field::accessor)
                        .ok_or_else(|| KeySchemaError::UnknownField {
                            name: name.to_string(),
                            fields: fields.iter().map(|f| f.name().to_string()).collect(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?,
            ParamShape::Scalar(render) => {
                if names.len() != 1 {
                    return Err(KeySchemaError::PlaceholderCount { template, found: names.len() });
                }
                vec![render]
            }
        };

        Ok(Self { template, segments, accessors, exp })
    }

    /// Like [`new`](Self::new) but panics on an invalid template. Intended
    /// for schemas declared once at startup.
    pub fn must_new(template: impl Into<String>, exp: Duration) -> Self {
        let template = template.into();
        match Self::new(template.clone(), exp) {
            Ok(schema) => schema,
            Err(e) => {
                error!(template = %template, error = %e, "failed to build key schema");
                panic!("failed to build key schema '{}': {}", template, e);
            }
        }
    }
}

impl<P> KeySchema<P> {
    /// Substitute every placeholder occurrence with the matching value.
    pub fn build(&self, params: &P) -> String {
        let mut accessors = self.accessors.iter();
        let mut out = String::with_capacity(self.template.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(_) => {
                    if let Some(render) = accessors.next() {
                        out.push_str(&render(params));
                    }
                }
            }
        }
        out
    }

    /// Bind the first placeholder values positionally; the closure takes the
    /// remaining ones in template order.
    pub fn partial(&self, leading: &[&dyn Display]) -> impl Fn(&[&dyn Display]) -> Result<String, KeySchemaError> {
        self.to_format().partial(leading)
    }

    /// The template with each placeholder replaced by a `{}` marker.
    pub fn to_format(&self) -> KeyFormat {
        let mut out = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(_) => out.push_str("{}"),
            }
        }
        KeyFormat::new(out)
    }

    /// Placeholder names in template order, repeats included.
    pub fn placeholders(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn exp(&self) -> Duration {
        self.exp
    }

    #[must_use]
    pub fn with_exp(mut self, exp: Duration) -> Self {
        self.exp = exp;
        self
    }
}

impl<P> Clone for KeySchema<P> {
    fn clone(&self) -> Self {
        Self {
            template: self.template.clone(),
            segments: self.segments.clone(),
            accessors: self.accessors.clone(),
            exp: self.exp,
        }
    }
}

impl<P> fmt::Debug for KeySchema<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySchema")
            .field("template", &self.template)
            .field("exp", &self.exp)
            .finish()
    }
}
