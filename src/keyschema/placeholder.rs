use super::{KeySchemaError, MAX_PLACEHOLDERS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Split a template into literal text and `{name}` placeholders.
///
/// A `{` opens a placeholder that runs to the next `}`; a stray `}` is
/// literal text.
pub(crate) fn parse(template: &str) -> Result<Vec<Segment>, KeySchemaError> {
    let mut segments = Vec::new();
    let mut rest = template;
    let mut found = 0;

    while let Some(open) = rest.find('{') {
        let close = rest[open..].find('}').map(|i| i + open).ok_or_else(|| KeySchemaError::Malformed {
            template: template.to_string(),
            reason: "unclosed placeholder",
        })?;

        found += 1;
        if found > MAX_PLACEHOLDERS {
            return Err(KeySchemaError::TooManyPlaceholders(MAX_PLACEHOLDERS));
        }

        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        segments.push(Segment::Placeholder(rest[open + 1..close].to_string()));
        rest = &rest[close + 1..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lit(s: &str) -> Segment {
        Segment::Literal(s.into())
    }

    fn ph(s: &str) -> Segment {
        Segment::Placeholder(s.into())
    }

    #[test]
    fn test_parse_mixed() {
        let segments = parse("key:{xxx}:{yyy}:{xxx}").unwrap();
        assert_eq!(segments, vec![lit("key:"), ph("xxx"), lit(":"), ph("yyy"), lit(":"), ph("xxx")]);
    }

    #[test]
    fn test_parse_edges() {
        assert!(parse("").unwrap().is_empty());
        assert_eq!(parse("plain").unwrap(), vec![lit("plain")]);
        assert_eq!(parse("{a}{b}").unwrap(), vec![ph("a"), ph("b")]);
        assert_eq!(parse("a}b").unwrap(), vec![lit("a}b")]);
        assert_eq!(parse("x:{}").unwrap(), vec![lit("x:"), ph("")]);
    }

    #[test]
    fn test_unclosed_placeholder() {
        let err = parse("key:{id").unwrap_err();
        assert!(matches!(err, KeySchemaError::Malformed { reason: "unclosed placeholder", .. }));
    }

    #[test]
    fn test_placeholder_cap() {
        let ok = "{a}".repeat(MAX_PLACEHOLDERS);
        assert_eq!(parse(&ok).unwrap().len(), MAX_PLACEHOLDERS);

        let too_many = "{a}".repeat(MAX_PLACEHOLDERS + 1);
        assert_eq!(parse(&too_many).unwrap_err(), KeySchemaError::TooManyPlaceholders(MAX_PLACEHOLDERS));
    }
}
