//! Parser for the record identifier text form.

use crate::error::ParseError;
use crate::thing::{is_bare, Id, Thing};
use crate::uid::Uuid;
use crate::value::Object;
use crate::MAX_DEPTH;

pub(crate) struct Parser<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    pub(crate) fn parse_thing(mut self) -> Result<Thing, ParseError> {
        let table = match self.peek() {
            Some('`') => self.quoted('`', '`', "table name")?,
            Some('⟨') => self.quoted('⟨', '⟩', "table name")?,
            _ => {
                let end = self
                    .rest()
                    .find(':')
                    .ok_or_else(|| ParseError::MissingSeparator(self.input.to_string()))?;
                if end == 0 {
                    return Err(ParseError::EmptyTable);
                }
                let table = self.rest()[..end].to_string();
                self.pos += end;
                table
            }
        };
        self.expect(':', "':'")?;

        let id = self.top_level_id()?;
        Ok(Thing::new(table, id))
    }

    fn top_level_id(&mut self) -> Result<Id, ParseError> {
        let rest = self.rest();
        if rest.is_empty() {
            return Err(ParseError::EmptyId);
        }
        if self.at_opener() {
            let id = self.id()?;
            if self.pos < self.input.len() {
                return Err(ParseError::TrailingCharacters(self.pos));
            }
            return Ok(id);
        }
        self.pos = self.input.len();
        if is_integer(rest) {
            return parse_integer(rest).map(Id::Number);
        }
        // Anything else, bare or not, is taken verbatim.
        Ok(Id::String(rest.to_string()))
    }

    fn id(&mut self) -> Result<Id, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some('[') => self.nested(Self::array),
            Some('{') => self.nested(Self::object),
            Some('\'') => self.quoted('\'', '\'', "string").map(Id::String),
            Some('"') => self.quoted('"', '"', "string").map(Id::String),
            Some('`') => self.quoted('`', '`', "string").map(Id::String),
            Some('⟨') => self.quoted('⟨', '⟩', "string").map(Id::String),
            Some('u') if self.at_uuid() => self.uuid().map(Id::Uuid),
            Some(c) if c == '-' || c == '_' || c.is_ascii_alphanumeric() => {
                let token = self.token();
                if is_integer(token) {
                    parse_integer(token).map(Id::Number)
                } else if is_bare(token) {
                    Ok(Id::String(token.to_string()))
                } else {
                    Err(self.unexpected_at(self.pos - token.len(), "record id"))
                }
            }
            _ => Err(self.unexpected("record id")),
        }
    }

    fn nested(
        &mut self,
        parse: fn(&mut Self) -> Result<Id, ParseError>,
    ) -> Result<Id, ParseError> {
        if self.depth >= MAX_DEPTH {
            return Err(ParseError::NestingTooDeep(MAX_DEPTH));
        }
        self.depth += 1;
        let id = parse(self);
        self.depth -= 1;
        id
    }

    fn array(&mut self) -> Result<Id, ParseError> {
        self.expect('[', "'['")?;
        let mut items = Vec::new();
        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(']') => {
                    self.bump();
                    return Ok(Id::Array(items));
                }
                None => return Err(ParseError::Unterminated("array")),
                _ => {}
            }
            items.push(self.id()?);
            if !self.separator(']')? {
                return Err(ParseError::Unterminated("array"));
            }
        }
    }

    fn object(&mut self) -> Result<Id, ParseError> {
        self.expect('{', "'{'")?;
        let mut object = Object::new();
        loop {
            self.skip_whitespace();
            let key = match self.peek() {
                Some('}') => {
                    self.bump();
                    return Ok(Id::Object(object));
                }
                None => return Err(ParseError::Unterminated("object")),
                Some('\'') => self.quoted('\'', '\'', "object key")?,
                Some('"') => self.quoted('"', '"', "object key")?,
                Some('`') => self.quoted('`', '`', "object key")?,
                Some('⟨') => self.quoted('⟨', '⟩', "object key")?,
                Some(_) => {
                    let key = self.token();
                    if !is_bare(key) {
                        return Err(self.unexpected_at(self.pos - key.len(), "object key"));
                    }
                    key.to_string()
                }
            };
            self.skip_whitespace();
            self.expect(':', "':'")?;
            let value = self.id()?;
            object.insert(key, value);
            if !self.separator('}')? {
                return Err(ParseError::Unterminated("object"));
            }
        }
    }

    /// Consumes a `,` (returning true) or leaves `close` for the caller.
    /// Returns false at end of input.
    fn separator(&mut self, close: char) -> Result<bool, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(',') => {
                self.bump();
                Ok(true)
            }
            Some(c) if c == close => Ok(true),
            None => Ok(false),
            Some(_) => Err(self.unexpected(if close == ']' { "',' or ']'" } else { "',' or '}'" })),
        }
    }

    fn uuid(&mut self) -> Result<Uuid, ParseError> {
        self.expect('u', "'u'")?;
        let text = match self.peek() {
            Some('"') => self.quoted('"', '"', "uuid")?,
            _ => self.quoted('\'', '\'', "uuid")?,
        };
        text.parse()
    }

    /// Reads a quoted run, resolving backslash escapes.
    fn quoted(&mut self, open: char, close: char, what: &'static str) -> Result<String, ParseError> {
        self.expect(open, "quote")?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::Unterminated(what)),
                Some(c) if c == close => return Ok(out),
                Some('\\') => match self.bump() {
                    None => return Err(ParseError::Unterminated(what)),
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('r') => out.push('\r'),
                    Some(c) => out.push(c),
                },
                Some(c) => out.push(c),
            }
        }
    }

    /// Reads a run of `[A-Za-z0-9_]`, with an optional leading `-`.
    fn token(&mut self) -> &'a str {
        let input = self.input;
        let rest = &input[self.pos..];
        let skip = usize::from(rest.starts_with('-'));
        let len = rest[skip..]
            .find(|c: char| !(c == '_' || c.is_ascii_alphanumeric()))
            .map_or(rest.len(), |n| n + skip);
        self.pos += len;
        &rest[..len]
    }

    fn at_opener(&self) -> bool {
        matches!(self.peek(), Some('[' | '{' | '\'' | '"' | '`' | '⟨')) || self.at_uuid()
    }

    fn at_uuid(&self) -> bool {
        let rest = self.rest();
        rest.starts_with("u'") || rest.starts_with("u\"")
    }

    fn rest(&self) -> &'a str {
        let input = self.input;
        &input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn expect(&mut self, c: char, expected: &'static str) -> Result<(), ParseError> {
        match self.peek() {
            Some(found) if found == c => {
                self.bump();
                Ok(())
            }
            _ => Err(self.unexpected(expected)),
        }
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        self.unexpected_at(self.pos, expected)
    }

    fn unexpected_at(&self, offset: usize, expected: &'static str) -> ParseError {
        let found = match self.input[offset..].chars().next() {
            Some(c) => format!("{:?}", c),
            None => "end of input".to_string(),
        };
        ParseError::Unexpected {
            offset,
            expected,
            found,
        }
    }
}

/// `-?[0-9]+`
fn is_integer(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn parse_integer(s: &str) -> Result<i64, ParseError> {
    s.parse()
        .map_err(|_| ParseError::IntegerOverflow(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(text: &str) -> Result<Thing, ParseError> {
        Thing::parse(text)
    }

    #[test]
    fn test_parse_simple_ids() {
        assert_eq!(parse("person:tobie").unwrap(), Thing::new("person", "tobie"));
        assert_eq!(parse("person:42").unwrap(), Thing::new("person", 42));
        assert_eq!(parse("person:-42").unwrap(), Thing::new("person", -42));
        assert_eq!(parse("person:`42`").unwrap(), Thing::new("person", "42"));
        assert_eq!(parse("person:`a\\`b`").unwrap(), Thing::new("person", "a`b"));
        assert_eq!(parse("person:⟨tobie⟩").unwrap(), Thing::new("person", "tobie"));
        assert_eq!(parse("person:'x y'").unwrap(), Thing::new("person", "x y"));
    }

    #[test]
    fn test_parse_lenient_string_id() {
        assert_eq!(parse("test:foo-bar").unwrap(), Thing::new("test", "foo-bar"));
        assert_eq!(parse("test:foo bar").unwrap(), Thing::new("test", "foo bar"));
        assert_eq!(parse("test:a:b").unwrap(), Thing::new("test", "a:b"));
    }

    #[test]
    fn test_parse_composite_ids() {
        let thing = parse("other:{foo: {bar: 'baz'}}").unwrap();
        let expected = Id::Object(Object::from([(
            "foo",
            Id::Object(Object::from([("bar", Id::from("baz"))])),
        )]));
        assert_eq!(thing, Thing::new("other", expected));

        let thing = parse("temp:['London', 2024, [1, -2], u'0190d8ee-7e13-7a0f-a3d9-8e3c7f3a2b10']")
            .unwrap();
        let uuid: Uuid = "0190d8ee-7e13-7a0f-a3d9-8e3c7f3a2b10".parse().unwrap();
        let expected = Id::Array(vec![
            Id::from("London"),
            Id::from(2024),
            Id::Array(vec![Id::from(1), Id::from(-2)]),
            Id::from(uuid),
        ]);
        assert_eq!(thing, Thing::new("temp", expected));

        let thing = parse("t:{ \"a b\" : 1 , c:[] ,}").unwrap();
        let expected = Id::Object(Object::from([
            ("a b", Id::from(1)),
            ("c", Id::Array(vec![])),
        ]));
        assert_eq!(thing, Thing::new("t", expected));
    }

    #[test]
    fn test_parse_uuid_id() {
        let thing = parse("t:u\"0190d8ee-7e13-7a0f-a3d9-8e3c7f3a2b10\"").unwrap();
        assert!(matches!(thing.id(), Id::Uuid(_)));
        assert!(matches!(
            parse("t:u'nope'"),
            Err(ParseError::InvalidUuid(_))
        ));
    }

    #[test]
    fn test_parse_escaped_table() {
        let thing = parse("`my-table`:1").unwrap();
        assert_eq!(thing.table(), "my-table");
        assert_eq!(thing.id(), &Id::Number(1));

        let thing = parse("`test:foo:bar`:x").unwrap();
        assert_eq!(thing.table(), "test:foo:bar");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("person"), Err(ParseError::MissingSeparator(_))));
        assert_eq!(parse(":1"), Err(ParseError::EmptyTable));
        assert_eq!(parse("``:1").unwrap(), Thing::new("", 1));
        assert_eq!(parse("person:"), Err(ParseError::EmptyId));
        assert!(matches!(
            parse("person:99999999999999999999"),
            Err(ParseError::IntegerOverflow(_))
        ));
        assert_eq!(parse("t:'abc"), Err(ParseError::Unterminated("string")));
        assert_eq!(parse("t:[1, 2"), Err(ParseError::Unterminated("array")));
        assert_eq!(parse("t:{a: 1"), Err(ParseError::Unterminated("object")));
        assert!(matches!(parse("t:[1]x"), Err(ParseError::TrailingCharacters(5))));
        assert!(matches!(parse("`t`x"), Err(ParseError::Unexpected { .. })));
        assert!(matches!(parse("t:[1 2]"), Err(ParseError::Unexpected { .. })));
        assert!(matches!(parse("t:{a 1}"), Err(ParseError::Unexpected { .. })));
    }

    #[test]
    fn test_parse_depth_limit() {
        let deep = format!("t:{}{}", "[".repeat(MAX_DEPTH + 1), "]".repeat(MAX_DEPTH + 1));
        assert_eq!(parse(&deep), Err(ParseError::NestingTooDeep(MAX_DEPTH)));

        let ok = format!("t:{}{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert!(parse(&ok).is_ok());
    }

    fn arb_id() -> impl Strategy<Value = Id> {
        let leaf = prop_oneof![
            ".*".prop_map(Id::String),
            any::<i64>().prop_map(Id::Number),
            any::<[u8; 16]>().prop_map(|b| Id::Uuid(Uuid::from_bytes(b))),
        ];
        leaf.prop_recursive(4, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Id::Array),
                prop::collection::vec((".*", inner), 0..6)
                    .prop_map(|entries| Id::Object(entries.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_render_parse_roundtrip(table in ".*", id in arb_id()) {
            let thing = Thing::new(table, id);
            let text = thing.to_string();
            prop_assert_eq!(Thing::parse(&text), Ok(thing), "text was {}", text);
        }
    }
}
