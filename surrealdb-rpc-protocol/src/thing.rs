//! Record identifiers (`table:id`).
//!
//! Text form:
//!
//! ```text
//! person:tobie              string id, bare
//! person:`tobie-h`          string id, escaped
//! person:`42`               string id that would otherwise read as a number
//! person:42                 integer id
//! person:u'0190...'         uuid id
//! temp:['London', 2024]     array id, nested strings single-quoted
//! other:{foo: {bar: 'baz'}} object id
//! `my-table`:1              escaped table name
//! ``:1                      empty table name
//! ```

use crate::error::ParseError;
use crate::parser::Parser;
use crate::uid::Uuid;
use crate::value::{Object, Value};
use rand::Rng;
use std::fmt;
use std::str::FromStr;

/// The id half of a record identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Id {
    String(String),
    Number(i64),
    Array(Vec<Id>),
    Object(Object<Id>),
    Uuid(Uuid),
}

/// A record identifier: a table name and an [`Id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thing {
    table: String,
    id: Id,
}

const RANDOM_ID_LEN: usize = 20;
const RANDOM_ID_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

impl Thing {
    pub fn new(table: impl Into<String>, id: impl Into<Id>) -> Self {
        Self {
            table: table.into(),
            id: id.into(),
        }
    }

    /// Parses the canonical text form.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        Parser::new(text).parse_thing()
    }

    /// A 20 character `[a-z0-9]` id.
    pub fn random(table: impl Into<String>) -> Self {
        let mut rng = rand::thread_rng();
        let id: String = (0..RANDOM_ID_LEN)
            .map(|_| RANDOM_ID_CHARS[rng.gen_range(0..RANDOM_ID_CHARS.len())] as char)
            .collect();
        Self::new(table, id)
    }

    /// A lowercase ULID string id.
    pub fn ulid(table: impl Into<String>) -> Self {
        Self::new(table, ulid::Ulid::new().to_string().to_lowercase())
    }

    pub fn uuid_v4(table: impl Into<String>) -> Self {
        Self::new(table, Uuid::new_v4())
    }

    pub fn uuid_v7(table: impl Into<String>) -> Self {
        Self::new(table, Uuid::new_v7())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn into_parts(self) -> (String, Id) {
        (self.table, self.id)
    }
}

impl FromStr for Thing {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Thing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_ident(f, &self.table)?;
        write!(f, ":")?;
        match &self.id {
            Id::String(s) if is_bare(s) && !s.bytes().all(|b| b.is_ascii_digit()) => {
                write!(f, "{}", s)
            }
            Id::String(s) => write_backticked(f, s),
            id => write!(f, "{}", id),
        }
    }
}

impl fmt::Display for Id {
    /// Renders the id as it appears nested inside an array or object.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) => write_quoted(f, s),
            Id::Number(n) => write!(f, "{}", n),
            Id::Uuid(uuid) => write!(f, "u'{}'", uuid),
            Id::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Id::Object(object) => {
                write!(f, "{{")?;
                for (i, (k, v)) in object.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_ident(f, k)?;
                    write!(f, ": {}", v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

impl From<i32> for Id {
    fn from(n: i32) -> Self {
        Id::Number(n.into())
    }
}

impl From<Uuid> for Id {
    fn from(uuid: Uuid) -> Self {
        Id::Uuid(uuid)
    }
}

impl From<Vec<Id>> for Id {
    fn from(items: Vec<Id>) -> Self {
        Id::Array(items)
    }
}

impl From<Object<Id>> for Id {
    fn from(object: Object<Id>) -> Self {
        Id::Object(object)
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        match id {
            Id::String(s) => Value::String(s),
            Id::Number(n) => Value::Int(n),
            Id::Uuid(uuid) => Value::Uuid(uuid),
            Id::Array(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Id::Object(object) => {
                Value::Object(object.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl TryFrom<Value> for Id {
    /// The kind of the first value that cannot be part of an id.
    type Error = &'static str;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Id::String(s)),
            Value::Int(n) => Ok(Id::Number(n)),
            Value::Uuid(uuid) => Ok(Id::Uuid(uuid)),
            Value::Array(items) => items
                .into_iter()
                .map(Id::try_from)
                .collect::<Result<Vec<_>, _>>()
                .map(Id::Array),
            Value::Object(object) => object
                .into_iter()
                .map(|(k, v)| Id::try_from(v).map(|id| (k, id)))
                .collect::<Result<Object<Id>, _>>()
                .map(Id::Object),
            other => Err(other.kind()),
        }
    }
}

/// True if `s` can be written without escaping: non-empty `[A-Za-z0-9_]+`.
pub(crate) fn is_bare(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str, quote: char) -> fmt::Result {
    for c in s.chars() {
        if c == quote || c == '\\' {
            write!(f, "\\")?;
        }
        write!(f, "{}", c)?;
    }
    Ok(())
}

fn write_backticked(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "`")?;
    write_escaped(f, s, '`')?;
    write!(f, "`")
}

/// Writes a table name or object key, backtick-escaped when not bare.
pub(crate) fn write_ident(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    if is_bare(s) {
        write!(f, "{}", s)
    } else {
        write_backticked(f, s)
    }
}

/// Writes a single-quoted string literal.
pub(crate) fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "'")?;
    write_escaped(f, s, '\'')?;
    write!(f, "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_object() -> Id {
        Id::Object(Object::from([(
            "foo",
            Id::Object(Object::from([("bar", Id::from("baz"))])),
        )]))
    }

    #[test]
    fn test_render_text_ids() {
        assert_eq!(Thing::new("test", "foo").to_string(), "test:foo");
        assert_eq!(Thing::new("test", "foo-bar").to_string(), "test:`foo-bar`");
        assert_eq!(Thing::new("test", "foo bar").to_string(), "test:`foo bar`");
        assert_eq!(Thing::new("test", "42").to_string(), "test:`42`");
        assert_eq!(Thing::new("test", "").to_string(), "test:``");
        assert_eq!(Thing::new("test", "a`b\\c").to_string(), r"test:`a\`b\\c`");
    }

    #[test]
    fn test_render_numeric_ids() {
        assert_eq!(Thing::new("test", 42).to_string(), "test:42");
        assert_eq!(Thing::new("test", -7).to_string(), "test:-7");
    }

    #[test]
    fn test_render_composite_ids() {
        let array = Id::Array(vec![Id::from("foo"), Id::from(1), Id::from("it's")]);
        assert_eq!(
            Thing::new("test", array).to_string(),
            r"test:['foo', 1, 'it\'s']"
        );

        assert_eq!(
            Thing::new("other", nested_object()).to_string(),
            "other:{foo: {bar: 'baz'}}"
        );

        let keyed = Id::Object(Object::from([("two words", Id::from(1))]));
        assert_eq!(Thing::new("t", keyed).to_string(), "t:{`two words`: 1}");

        assert_eq!(Thing::new("t", Id::Array(vec![])).to_string(), "t:[]");
        assert_eq!(Thing::new("t", Id::Object(Object::new())).to_string(), "t:{}");
    }

    #[test]
    fn test_render_escaped_table() {
        assert_eq!(Thing::new("foo-bar", 1).to_string(), "`foo-bar`:1");
        assert_eq!(
            Thing::new("test:foo:bar", "x").to_string(),
            "`test:foo:bar`:x"
        );
    }

    #[test]
    fn test_render_uuid_id() {
        let uuid: Uuid = "0190d8ee-7e13-7a0f-a3d9-8e3c7f3a2b10".parse().unwrap();
        assert_eq!(
            Thing::new("t", uuid).to_string(),
            "t:u'0190d8ee-7e13-7a0f-a3d9-8e3c7f3a2b10'"
        );
    }

    #[test]
    fn test_random_id_shape() {
        let thing = Thing::random("person");
        assert_eq!(thing.table(), "person");
        match thing.id() {
            Id::String(s) => {
                assert_eq!(s.len(), RANDOM_ID_LEN);
                assert!(s.bytes().all(|b| RANDOM_ID_CHARS.contains(&b)));
            }
            other => panic!("expected string id, got {:?}", other),
        }
    }

    #[test]
    fn test_ulid_id_shape() {
        let a = Thing::ulid("event");
        let b = Thing::ulid("event");
        assert_ne!(a, b);
        match a.id() {
            Id::String(s) => {
                assert_eq!(s.len(), 26);
                assert!(s.bytes().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit()));
                assert_eq!(Thing::parse(&a.to_string()).unwrap(), a);
            }
            other => panic!("expected string id, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_table_roundtrip() {
        let thing = Thing::new("", 1);
        assert_eq!(thing.to_string(), "``:1");
        assert_eq!(Thing::parse("``:1").unwrap(), thing);
    }

    #[test]
    fn test_uuid_constructors() {
        match Thing::uuid_v7("event").id() {
            Id::Uuid(uuid) => assert_eq!(uuid.kind(), crate::UuidKind::TimeOrdered),
            other => panic!("expected uuid id, got {:?}", other),
        }
    }

    #[test]
    fn test_id_value_conversion() {
        let id = nested_object();
        let value = Value::from(id.clone());
        assert_eq!(Id::try_from(value).unwrap(), id);

        let bad = Value::Array(vec![Value::from(1), Value::Bool(true)]);
        assert_eq!(Id::try_from(bad), Err("bool"));
    }

    #[test]
    fn test_object_id_equality_ignores_key_order() {
        let a = Id::Object(Object::from([("x", Id::from(1)), ("y", Id::from(2))]));
        let b = Id::Object(Object::from([("y", Id::from(2)), ("x", Id::from(1))]));
        assert_eq!(Thing::new("t", a), Thing::new("t", b));
    }
}
