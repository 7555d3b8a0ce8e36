//! Static parameter tables for key schemas.

/// Renders one parameter value as key text.
pub type Accessor<P> = fn(&P) -> String;

/// A named field of a record parameter.
pub struct Field<P> {
    name: String,
    get: Accessor<P>,
}

impl<P> Field<P> {
    pub fn new(name: impl Into<String>, get: Accessor<P>) -> Self {
        Self { name: name.into(), get }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn accessor(&self) -> Accessor<P> {
        self.get
    }
}

/// How a parameter type feeds placeholders.
pub enum ParamShape<P> {
    /// Placeholders are resolved by field name.
    Record(Vec<Field<P>>),
    /// The whole value fills the template's only placeholder.
    Scalar(Accessor<P>),
}

/// Types usable as [`KeySchema`](super::KeySchema) parameters.
///
/// Records are usually declared with [`key_params!`](crate::key_params).
pub trait KeyParams: Sized {
    fn shape() -> ParamShape<Self>;
}

macro_rules! scalar_params {
    ($($t:ty),*) => {
        $(impl KeyParams for $t {
            fn shape() -> ParamShape<Self> {
                ParamShape::Scalar(|v| v.to_string())
            }
        })*
    };
}

scalar_params!(String, i8, i16, i32, i64, u8, u16, u32, u64, isize, usize, bool, char);

impl<'a> KeyParams for &'a str {
    fn shape() -> ParamShape<Self> {
        ParamShape::Scalar(|v| v.to_string())
    }
}

/// Convert an identifier to snake_case.
///
/// An underscore goes before an uppercase letter that follows a lowercase
/// one or precedes a lowercase one, so acronym runs stay together:
/// `FooBar` → `foo_bar`, `HTTPCode` → `http_code`.
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_uppercase() {
            let after_lower = chars[i - 1].is_lowercase();
            let before_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            if after_lower || before_lower {
                out.push('_');
            }
        }
        out.extend(c.to_lowercase());
    }
    out
}

/// Implement [`KeyParams`](crate::keyschema::KeyParams) for a struct by
/// listing the fields placeholders may reference.
///
/// Field names are converted with
/// [`to_snake_case`](crate::keyschema::to_snake_case) unless overridden with
/// `as "name"`. Field values render through `ToString`.
///
/// ```
/// use memstore::{key_params, KeySchema};
/// use std::time::Duration;
///
/// #[allow(non_snake_case)]
/// struct Lookup {
///     HTTPCode: u16,
///     region: String,
/// }
///
/// key_params!(Lookup { HTTPCode, region as "zone" });
///
/// let schema = KeySchema::<Lookup>::new("hits:{zone}:{http_code}", Duration::ZERO).unwrap();
/// let key = schema.build(&Lookup { HTTPCode: 404, region: "eu".into() });
/// assert_eq!(key, "hits:eu:404");
/// ```
#[macro_export]
macro_rules! key_params {
    (@name $field:ident as $name:literal) => {
        ::std::string::String::from($name)
    };
    (@name $field:ident) => {
        $crate::keyschema::to_snake_case(::std::stringify!($field))
    };
    ($ty:ty { $($field:ident $(as $name:literal)?),* $(,)? }) => {
        impl $crate::keyschema::KeyParams for $ty {
            fn shape() -> $crate::keyschema::ParamShape<Self> {
                $crate::keyschema::ParamShape::Record(::std::vec![
                    $($crate::keyschema::Field::new(
                        $crate::key_params!(@name $field $(as $name)?),
                        |p: &Self| ::std::string::ToString::to_string(&p.$field),
                    ),)*
                ])
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case() {
        assert_eq!(to_snake_case("FooBar"), "foo_bar");
        assert_eq!(to_snake_case("HTTPCode"), "http_code");
        assert_eq!(to_snake_case("userID"), "user_id");
        assert_eq!(to_snake_case("ID"), "id");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
        assert_eq!(to_snake_case("Field1Name"), "field1_name");
        assert_eq!(to_snake_case(""), "");
    }

    #[allow(non_snake_case)]
    struct Row {
        UserID: u64,
        Kind: String,
        raw: bool,
    }

    key_params!(Row { UserID, Kind as "k", raw });

    #[test]
    fn test_macro_builds_record_table() {
        let ParamShape::Record(fields) = Row::shape() else {
            panic!("expected record shape");
        };
        let names: Vec<&str> = fields.iter().map(Field::name).collect();
        assert_eq!(names, vec!["user_id", "k", "raw"]);

        let row = Row { UserID: 7, Kind: "gold".into(), raw: true };
        let values: Vec<String> = fields.iter().map(|f| (f.accessor())(&row)).collect();
        assert_eq!(values, vec!["7", "gold", "true"]);
    }

    #[test]
    fn test_scalar_shapes() {
        let ParamShape::Scalar(render) = <u32 as KeyParams>::shape() else {
            panic!("expected scalar shape");
        };
        assert_eq!(render(&42), "42");

        let ParamShape::Scalar(render) = <&str as KeyParams>::shape() else {
            panic!("expected scalar shape");
        };
        assert_eq!(render(&"abc"), "abc");
    }
}
