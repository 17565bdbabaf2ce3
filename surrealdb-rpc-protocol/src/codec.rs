//! MessagePack encoding of [`Value`]s.
//!
//! Native types map onto MessagePack markers; everything else is carried in
//! extension types:
//!
//! ```text
//! tag  value              payload
//!  1   NONE               empty
//!  2   uuid (text)        hyphenated uuid string, decode only
//!  3   decimal            decimal text
//!  4   duration           duration text (`1h30m`)
//!  5   datetime           RFC 3339 text
//!  6   thing              record id text (`person:tobie`)
//!  7   uuid               16 bytes, unspecified version
//!  8   uuid v4            16 bytes
//!  9   uuid v7            16 bytes
//! 10   bytes              raw bytes
//! 11   point              [x, y]
//! 12   line               [[x, y], ...]
//! 13   polygon            [[[x, y], ...], ...]
//! 14   multipoint         [[x, y], ...]
//! 15   multiline          [[[x, y], ...], ...]
//! 16   multipolygon       [[[[x, y], ...], ...], ...]
//! 17   collection         [geometry ext, ...]
//! ```
//!
//! Bracketed payloads are themselves MessagePack. Tags 4, 5 and 6 also
//! decode from a nested `[secs, nanos]` or `[table, id]` array; datetimes
//! outside the years 1 to 9999 have no RFC 3339 form and are written that way.

use crate::decimal::Decimal;
use crate::error::DecodeError;
use crate::geometry::{Coord, Geometry};
use crate::temporal::{Datetime, Duration};
use crate::thing::{Id, Thing};
use crate::uid::{Uuid, UuidKind};
use crate::value::{Object, Value};
use crate::MAX_DEPTH;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rmp::Marker;
use std::fmt;
use std::str::FromStr;

pub const TAG_NONE: i8 = 1;
pub const TAG_UUID_TEXT: i8 = 2;
pub const TAG_DECIMAL: i8 = 3;
pub const TAG_DURATION: i8 = 4;
pub const TAG_DATETIME: i8 = 5;
pub const TAG_THING: i8 = 6;
pub const TAG_UUID: i8 = 7;
pub const TAG_UUID_V4: i8 = 8;
pub const TAG_UUID_V7: i8 = 9;
pub const TAG_BYTES: i8 = 10;
pub const TAG_GEOMETRY_POINT: i8 = 11;
pub const TAG_GEOMETRY_LINE: i8 = 12;
pub const TAG_GEOMETRY_POLYGON: i8 = 13;
pub const TAG_GEOMETRY_MULTIPOINT: i8 = 14;
pub const TAG_GEOMETRY_MULTILINE: i8 = 15;
pub const TAG_GEOMETRY_MULTIPOLYGON: i8 = 16;
pub const TAG_GEOMETRY_COLLECTION: i8 = 17;

/// Encodes values into MessagePack.
pub struct Encoder;

impl Encoder {
    pub fn encode(value: &Value) -> Bytes {
        let mut buf = BytesMut::new();
        write_value(&mut buf, value);
        buf.freeze()
    }
}

fn put_marker(buf: &mut BytesMut, marker: Marker) {
    buf.put_u8(marker.to_u8());
}

pub(crate) fn write_value(buf: &mut BytesMut, value: &Value) {
    match value {
        Value::None => write_ext(buf, TAG_NONE, &[]),
        Value::Null => put_marker(buf, Marker::Null),
        Value::Bool(true) => put_marker(buf, Marker::True),
        Value::Bool(false) => put_marker(buf, Marker::False),
        Value::Int(n) => write_int(buf, *n),
        Value::Float(f) => {
            put_marker(buf, Marker::F64);
            buf.put_f64(*f);
        }
        Value::Decimal(d) => write_ext(buf, TAG_DECIMAL, d.as_str().as_bytes()),
        Value::String(s) => write_str(buf, s),
        Value::Bytes(b) => write_ext(buf, TAG_BYTES, b),
        Value::Array(items) => {
            write_array_len(buf, items.len());
            for item in items {
                write_value(buf, item);
            }
        }
        Value::Object(object) => {
            write_map_len(buf, object.len());
            for (k, v) in object.iter() {
                write_str(buf, k);
                write_value(buf, v);
            }
        }
        Value::Thing(thing) => write_ext(buf, TAG_THING, thing.to_string().as_bytes()),
        Value::Uuid(uuid) => write_uuid(buf, uuid),
        Value::Datetime(dt) => match dt.to_rfc3339() {
            Some(text) => write_ext(buf, TAG_DATETIME, text.as_bytes()),
            None => write_secs_nanos(buf, TAG_DATETIME, dt.secs(), dt.nanos()),
        },
        Value::Duration(d) => write_ext(buf, TAG_DURATION, d.to_string().as_bytes()),
        Value::Geometry(g) => write_geometry(buf, g),
    }
}

/// Writes an integer in the smallest form that holds it.
pub(crate) fn write_int(buf: &mut BytesMut, n: i64) {
    match n {
        0..=0x7f => put_marker(buf, Marker::FixPos(n as u8)),
        -32..=-1 => put_marker(buf, Marker::FixNeg(n as i8)),
        0x80..=0xff => {
            put_marker(buf, Marker::U8);
            buf.put_u8(n as u8);
        }
        0x100..=0xffff => {
            put_marker(buf, Marker::U16);
            buf.put_u16(n as u16);
        }
        0x1_0000..=0xffff_ffff => {
            put_marker(buf, Marker::U32);
            buf.put_u32(n as u32);
        }
        n if n > 0 => {
            put_marker(buf, Marker::U64);
            buf.put_u64(n as u64);
        }
        -128..=-33 => {
            put_marker(buf, Marker::I8);
            buf.put_i8(n as i8);
        }
        -32_768..=-129 => {
            put_marker(buf, Marker::I16);
            buf.put_i16(n as i16);
        }
        -2_147_483_648..=-32_769 => {
            put_marker(buf, Marker::I32);
            buf.put_i32(n as i32);
        }
        _ => {
            put_marker(buf, Marker::I64);
            buf.put_i64(n);
        }
    }
}

pub(crate) fn write_str(buf: &mut BytesMut, s: &str) {
    let len = s.len();
    if len < 32 {
        put_marker(buf, Marker::FixStr(len as u8));
    } else if len <= 0xff {
        put_marker(buf, Marker::Str8);
        buf.put_u8(len as u8);
    } else if len <= 0xffff {
        put_marker(buf, Marker::Str16);
        buf.put_u16(len as u16);
    } else {
        put_marker(buf, Marker::Str32);
        buf.put_u32(len as u32);
    }
    buf.put_slice(s.as_bytes());
}

pub(crate) fn write_array_len(buf: &mut BytesMut, len: usize) {
    if len < 16 {
        put_marker(buf, Marker::FixArray(len as u8));
    } else if len <= 0xffff {
        put_marker(buf, Marker::Array16);
        buf.put_u16(len as u16);
    } else {
        put_marker(buf, Marker::Array32);
        buf.put_u32(len as u32);
    }
}

pub(crate) fn write_map_len(buf: &mut BytesMut, len: usize) {
    if len < 16 {
        put_marker(buf, Marker::FixMap(len as u8));
    } else if len <= 0xffff {
        put_marker(buf, Marker::Map16);
        buf.put_u16(len as u16);
    } else {
        put_marker(buf, Marker::Map32);
        buf.put_u32(len as u32);
    }
}

fn write_ext(buf: &mut BytesMut, tag: i8, payload: &[u8]) {
    match payload.len() {
        1 => put_marker(buf, Marker::FixExt1),
        2 => put_marker(buf, Marker::FixExt2),
        4 => put_marker(buf, Marker::FixExt4),
        8 => put_marker(buf, Marker::FixExt8),
        16 => put_marker(buf, Marker::FixExt16),
        len if len <= 0xff => {
            put_marker(buf, Marker::Ext8);
            buf.put_u8(len as u8);
        }
        len if len <= 0xffff => {
            put_marker(buf, Marker::Ext16);
            buf.put_u16(len as u16);
        }
        len => {
            put_marker(buf, Marker::Ext32);
            buf.put_u32(len as u32);
        }
    }
    buf.put_i8(tag);
    buf.put_slice(payload);
}

/// Writes an extension whose payload is built by `f`.
fn write_nested_ext(buf: &mut BytesMut, tag: i8, f: impl FnOnce(&mut BytesMut)) {
    let mut payload = BytesMut::new();
    f(&mut payload);
    write_ext(buf, tag, &payload);
}

fn write_uuid(buf: &mut BytesMut, uuid: &Uuid) {
    let tag = match uuid.kind() {
        UuidKind::Unspecified => TAG_UUID,
        UuidKind::Random => TAG_UUID_V4,
        UuidKind::TimeOrdered => TAG_UUID_V7,
    };
    write_ext(buf, tag, uuid.as_bytes());
}

fn write_secs_nanos(buf: &mut BytesMut, tag: i8, secs: i64, nanos: u32) {
    write_nested_ext(buf, tag, |p| {
        write_array_len(p, 2);
        write_int(p, secs);
        write_int(p, nanos.into());
    });
}

fn write_coord(buf: &mut BytesMut, c: &Coord) {
    write_array_len(buf, 2);
    put_marker(buf, Marker::F64);
    buf.put_f64(c.x);
    put_marker(buf, Marker::F64);
    buf.put_f64(c.y);
}

fn write_coords(buf: &mut BytesMut, coords: &[Coord]) {
    write_array_len(buf, coords.len());
    for c in coords {
        write_coord(buf, c);
    }
}

fn write_rings(buf: &mut BytesMut, rings: &[Vec<Coord>]) {
    write_array_len(buf, rings.len());
    for ring in rings {
        write_coords(buf, ring);
    }
}

fn write_geometry(buf: &mut BytesMut, geometry: &Geometry) {
    match geometry {
        Geometry::Point(c) => write_nested_ext(buf, TAG_GEOMETRY_POINT, |p| write_coord(p, c)),
        Geometry::Line(l) => write_nested_ext(buf, TAG_GEOMETRY_LINE, |p| write_coords(p, l)),
        Geometry::Polygon(r) => write_nested_ext(buf, TAG_GEOMETRY_POLYGON, |p| write_rings(p, r)),
        Geometry::MultiPoint(m) => {
            write_nested_ext(buf, TAG_GEOMETRY_MULTIPOINT, |p| write_coords(p, m))
        }
        Geometry::MultiLine(m) => {
            write_nested_ext(buf, TAG_GEOMETRY_MULTILINE, |p| write_rings(p, m))
        }
        Geometry::MultiPolygon(m) => write_nested_ext(buf, TAG_GEOMETRY_MULTIPOLYGON, |p| {
            write_array_len(p, m.len());
            for polygon in m {
                write_rings(p, polygon);
            }
        }),
        Geometry::Collection(items) => write_nested_ext(buf, TAG_GEOMETRY_COLLECTION, |p| {
            write_array_len(p, items.len());
            for item in items {
                write_geometry(p, item);
            }
        }),
    }
}

/// Decodes MessagePack into values.
pub struct Decoder;

impl Decoder {
    /// Decodes exactly one value; trailing bytes are an error.
    pub fn decode(input: &[u8]) -> Result<Value, DecodeError> {
        let mut reader = Reader::new(input, 0);
        let value = reader.value()?;
        reader.finish()?;
        Ok(value)
    }

    /// Decodes a top-level map one field at a time.
    ///
    /// A field whose value fails to decode is reported in place, so the
    /// fields around it are still available. A value cut short by the end of
    /// the input ends the map early with the fields read so far. Errors in
    /// the map structure itself fail the whole call.
    pub fn decode_fields(
        input: &[u8],
    ) -> Result<Vec<(String, Result<Value, DecodeError>)>, DecodeError> {
        let mut reader = Reader::new(input, 0);
        let marker = reader.marker()?;
        if !matches!(marker, Marker::FixMap(_) | Marker::Map16 | Marker::Map32) {
            return Err(DecodeError::malformed(format!(
                "expected a map, found {:?}",
                marker
            )));
        }
        let len = reader.header_len(marker)?;

        let mut fields = Vec::with_capacity(len.min(16));
        for _ in 0..len {
            let key = reader.key()?;
            let start = reader.buf;
            match reader.nested(Reader::value) {
                Ok(value) => fields.push((key, Ok(value))),
                Err(err) => {
                    reader.buf = start;
                    let skipped = reader.skip();
                    fields.push((key, Err(err)));
                    if skipped.is_err() {
                        return Ok(fields);
                    }
                }
            }
        }
        reader.finish()?;
        Ok(fields)
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    depth: usize,
}

macro_rules! read_be {
    ($($name:ident: $ty:ty => $get:ident),* $(,)?) => {
        $(
            fn $name(&mut self) -> Result<$ty, DecodeError> {
                self.ensure(std::mem::size_of::<$ty>())?;
                Ok(self.buf.$get())
            }
        )*
    };
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], depth: usize) -> Self {
        Self { buf, depth }
    }

    read_be! {
        read_u8: u8 => get_u8,
        read_u16: u16 => get_u16,
        read_u32: u32 => get_u32,
        read_u64: u64 => get_u64,
        read_i8: i8 => get_i8,
        read_i16: i16 => get_i16,
        read_i32: i32 => get_i32,
        read_i64: i64 => get_i64,
        read_f32: f32 => get_f32,
        read_f64: f64 => get_f64,
    }

    fn ensure(&self, needed: usize) -> Result<(), DecodeError> {
        if self.buf.len() < needed {
            return Err(DecodeError::Truncated {
                needed,
                available: self.buf.len(),
            });
        }
        Ok(())
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn finish(&self) -> Result<(), DecodeError> {
        if !self.buf.is_empty() {
            return Err(DecodeError::malformed(format!(
                "{} trailing bytes",
                self.buf.len()
            )));
        }
        Ok(())
    }

    fn marker(&mut self) -> Result<Marker, DecodeError> {
        self.read_u8().map(Marker::from_u8)
    }

    /// Length carried by a str, bin, array, map or ext header.
    fn header_len(&mut self, marker: Marker) -> Result<usize, DecodeError> {
        match marker {
            Marker::FixStr(n) | Marker::FixArray(n) | Marker::FixMap(n) => Ok(n.into()),
            Marker::Str8 | Marker::Bin8 | Marker::Ext8 => self.read_u8().map(usize::from),
            Marker::Str16 | Marker::Bin16 | Marker::Array16 | Marker::Map16 | Marker::Ext16 => {
                self.read_u16().map(usize::from)
            }
            Marker::Str32 | Marker::Bin32 | Marker::Array32 | Marker::Map32 | Marker::Ext32 => {
                self.read_u32().map(|n| n as usize)
            }
            Marker::FixExt1 => Ok(1),
            Marker::FixExt2 => Ok(2),
            Marker::FixExt4 => Ok(4),
            Marker::FixExt8 => Ok(8),
            Marker::FixExt16 => Ok(16),
            _ => Ok(0),
        }
    }

    /// Runs `f` one nesting level deeper.
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<T, DecodeError> {
        if self.depth >= MAX_DEPTH {
            return Err(DecodeError::malformed(format!(
                "nesting deeper than {} levels",
                MAX_DEPTH
            )));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }

    fn value(&mut self) -> Result<Value, DecodeError> {
        let marker = self.marker()?;
        match marker {
            Marker::Null => Ok(Value::Null),
            Marker::True => Ok(Value::Bool(true)),
            Marker::False => Ok(Value::Bool(false)),
            Marker::FixPos(n) => Ok(Value::Int(n.into())),
            Marker::FixNeg(n) => Ok(Value::Int(n.into())),
            Marker::U8 => self.read_u8().map(|n| Value::Int(n.into())),
            Marker::U16 => self.read_u16().map(|n| Value::Int(n.into())),
            Marker::U32 => self.read_u32().map(|n| Value::Int(n.into())),
            Marker::U64 => {
                let n = self.read_u64()?;
                i64::try_from(n).map(Value::Int).map_err(|_| {
                    DecodeError::malformed(format!("integer {} does not fit in i64", n))
                })
            }
            Marker::I8 => self.read_i8().map(|n| Value::Int(n.into())),
            Marker::I16 => self.read_i16().map(|n| Value::Int(n.into())),
            Marker::I32 => self.read_i32().map(|n| Value::Int(n.into())),
            Marker::I64 => self.read_i64().map(Value::Int),
            Marker::F32 => self.read_f32().map(|f| Value::Float(f.into())),
            Marker::F64 => self.read_f64().map(Value::Float),
            Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => {
                let len = self.header_len(marker)?;
                self.string(len).map(Value::String)
            }
            Marker::Bin8 | Marker::Bin16 | Marker::Bin32 => {
                let len = self.header_len(marker)?;
                self.take(len)
                    .map(|b| Value::Bytes(Bytes::copy_from_slice(b)))
            }
            Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => {
                let len = self.header_len(marker)?;
                self.nested(|r| r.array(len)).map(Value::Array)
            }
            Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => {
                let len = self.header_len(marker)?;
                self.nested(|r| r.object(len)).map(Value::Object)
            }
            Marker::FixExt1
            | Marker::FixExt2
            | Marker::FixExt4
            | Marker::FixExt8
            | Marker::FixExt16
            | Marker::Ext8
            | Marker::Ext16
            | Marker::Ext32 => {
                let len = self.header_len(marker)?;
                let tag = self.read_i8()?;
                let payload = self.take(len)?;
                self.extension(tag, payload)
            }
            Marker::Reserved => Err(DecodeError::malformed("reserved marker 0xc1")),
        }
    }

    fn string(&mut self, len: usize) -> Result<String, DecodeError> {
        let bytes = self.take(len)?;
        text(bytes).map(str::to_string)
    }

    fn key(&mut self) -> Result<String, DecodeError> {
        let marker = self.marker()?;
        match marker {
            Marker::FixStr(_) | Marker::Str8 | Marker::Str16 | Marker::Str32 => {
                let len = self.header_len(marker)?;
                self.string(len)
            }
            other => Err(DecodeError::malformed(format!(
                "map key must be a string, found {:?}",
                other
            ))),
        }
    }

    fn array(&mut self, len: usize) -> Result<Vec<Value>, DecodeError> {
        let mut items = Vec::with_capacity(len.min(self.buf.len()));
        for _ in 0..len {
            items.push(self.value()?);
        }
        Ok(items)
    }

    fn object(&mut self, len: usize) -> Result<Object, DecodeError> {
        let mut object = Object::with_capacity(len.min(self.buf.len()));
        for _ in 0..len {
            let key = self.key()?;
            let value = self.value()?;
            object.insert(key, value);
        }
        Ok(object)
    }

    /// Decodes an extension payload that is itself MessagePack.
    fn payload(&mut self, payload: &[u8]) -> Result<Value, DecodeError> {
        let depth = self.depth;
        self.nested(|_| {
            let mut inner = Reader::new(payload, depth + 1);
            let value = inner.value().map_err(|err| match err {
                DecodeError::Truncated { .. } => {
                    DecodeError::malformed(format!("extension payload: {}", err))
                }
                other => other,
            })?;
            inner.finish()?;
            Ok(value)
        })
    }

    fn extension(&mut self, tag: i8, payload: &'a [u8]) -> Result<Value, DecodeError> {
        match tag {
            TAG_NONE => Ok(Value::None),
            TAG_UUID_TEXT => parsed::<Uuid>(payload).map(Value::Uuid),
            TAG_DECIMAL => parsed::<Decimal>(payload).map(Value::Decimal),
            TAG_DURATION if is_pair(payload) => {
                let (secs, nanos) = self.secs_nanos(payload)?;
                Duration::new(secs, nanos)
                    .map(Value::Duration)
                    .ok_or_else(|| DecodeError::malformed("duration nanos out of range"))
            }
            // An empty duration is zero.
            TAG_DURATION if payload.is_empty() => Ok(Value::Duration(Duration::default())),
            TAG_DURATION => parsed::<Duration>(payload).map(Value::Duration),
            TAG_DATETIME if is_pair(payload) => {
                let (secs, nanos) = self.secs_nanos(payload)?;
                Datetime::new(secs, nanos)
                    .map(Value::Datetime)
                    .ok_or_else(|| DecodeError::malformed("datetime nanos out of range"))
            }
            TAG_DATETIME => parsed::<Datetime>(payload).map(Value::Datetime),
            TAG_THING if is_pair(payload) => self.thing(payload).map(Value::Thing),
            TAG_THING => parsed::<Thing>(payload).map(Value::Thing),
            TAG_UUID | TAG_UUID_V4 | TAG_UUID_V7 => uuid(tag, payload).map(Value::Uuid),
            TAG_BYTES => Ok(Value::Bytes(Bytes::copy_from_slice(payload))),
            TAG_GEOMETRY_POINT..=TAG_GEOMETRY_COLLECTION => {
                self.geometry(tag, payload).map(Value::Geometry)
            }
            other => Err(DecodeError::UnknownExtension(other)),
        }
    }

    fn secs_nanos(&mut self, payload: &[u8]) -> Result<(i64, u32), DecodeError> {
        match self.payload(payload)?.as_array() {
            Some([Value::Int(secs), Value::Int(nanos)]) => {
                let nanos = u32::try_from(*nanos)
                    .map_err(|_| DecodeError::malformed("nanos out of range"))?;
                Ok((*secs, nanos))
            }
            _ => Err(DecodeError::malformed("expected [secs, nanos]")),
        }
    }

    fn thing(&mut self, payload: &[u8]) -> Result<Thing, DecodeError> {
        let parts = match self.payload(payload)? {
            Value::Array(parts) => parts,
            _ => return Err(DecodeError::malformed("expected [table, id]")),
        };
        let mut parts = parts.into_iter();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(Value::String(table)), Some(id), None) => {
                let id = Id::try_from(id).map_err(|kind| {
                    DecodeError::malformed(format!("{} is not a valid record id", kind))
                })?;
                Ok(Thing::new(table, id))
            }
            _ => Err(DecodeError::malformed("expected [table, id]")),
        }
    }

    fn geometry(&mut self, tag: i8, payload: &[u8]) -> Result<Geometry, DecodeError> {
        let value = self.payload(payload)?;
        let geometry = match tag {
            TAG_GEOMETRY_POINT => Geometry::Point(coord(&value)?),
            TAG_GEOMETRY_LINE => Geometry::Line(coords(&value)?),
            TAG_GEOMETRY_POLYGON => Geometry::Polygon(rings(&value)?),
            TAG_GEOMETRY_MULTIPOINT => Geometry::MultiPoint(coords(&value)?),
            TAG_GEOMETRY_MULTILINE => Geometry::MultiLine(rings(&value)?),
            TAG_GEOMETRY_MULTIPOLYGON => Geometry::MultiPolygon(
                items(&value)?
                    .iter()
                    .map(rings)
                    .collect::<Result<_, _>>()?,
            ),
            _ => Geometry::Collection(
                items(&value)?
                    .iter()
                    .map(|item| match item {
                        Value::Geometry(g) => Ok(g.clone()),
                        other => Err(DecodeError::malformed(format!(
                            "geometry collection member is a {}",
                            other.kind()
                        ))),
                    })
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(geometry)
    }

    /// Skips one value without decoding it.
    fn skip(&mut self) -> Result<(), DecodeError> {
        let mut remaining: usize = 1;
        while remaining > 0 {
            remaining -= 1;
            let marker = self.marker()?;
            match marker {
                Marker::Reserved => return Err(DecodeError::malformed("reserved marker 0xc1")),
                Marker::FixPos(_)
                | Marker::FixNeg(_)
                | Marker::Null
                | Marker::True
                | Marker::False => {}
                Marker::U8 | Marker::I8 => {
                    self.take(1)?;
                }
                Marker::U16 | Marker::I16 => {
                    self.take(2)?;
                }
                Marker::U32 | Marker::I32 | Marker::F32 => {
                    self.take(4)?;
                }
                Marker::U64 | Marker::I64 | Marker::F64 => {
                    self.take(8)?;
                }
                Marker::FixStr(_)
                | Marker::Str8
                | Marker::Str16
                | Marker::Str32
                | Marker::Bin8
                | Marker::Bin16
                | Marker::Bin32 => {
                    let len = self.header_len(marker)?;
                    self.take(len)?;
                }
                Marker::FixExt1
                | Marker::FixExt2
                | Marker::FixExt4
                | Marker::FixExt8
                | Marker::FixExt16
                | Marker::Ext8
                | Marker::Ext16
                | Marker::Ext32 => {
                    let len = self.header_len(marker)?;
                    self.take(len.saturating_add(1))?;
                }
                Marker::FixArray(_) | Marker::Array16 | Marker::Array32 => {
                    let len = self.header_len(marker)?;
                    remaining = remaining.saturating_add(len);
                }
                Marker::FixMap(_) | Marker::Map16 | Marker::Map32 => {
                    let len = self.header_len(marker)?;
                    remaining = remaining.saturating_add(len.saturating_mul(2));
                }
            }
        }
        Ok(())
    }
}

fn text(bytes: &[u8]) -> Result<&str, DecodeError> {
    std::str::from_utf8(bytes).map_err(|e| DecodeError::malformed(format!("invalid utf-8: {}", e)))
}

/// True if `payload` opens a two element MessagePack array. The marker is
/// never the first byte of UTF-8 text.
fn is_pair(payload: &[u8]) -> bool {
    payload.first() == Some(&Marker::FixArray(2).to_u8())
}

/// Parses a text payload.
fn parsed<T>(payload: &[u8]) -> Result<T, DecodeError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    text(payload)?
        .parse()
        .map_err(|e: T::Err| DecodeError::malformed(e.to_string()))
}

fn uuid(tag: i8, payload: &[u8]) -> Result<Uuid, DecodeError> {
    let bytes: [u8; 16] = payload.try_into().map_err(|_| {
        DecodeError::malformed(format!("uuid payload is {} bytes, expected 16", payload.len()))
    })?;
    let uuid = Uuid::from_bytes(bytes);
    let expected = match uuid.kind() {
        UuidKind::Unspecified => TAG_UUID,
        UuidKind::Random => TAG_UUID_V4,
        UuidKind::TimeOrdered => TAG_UUID_V7,
    };
    if tag != expected {
        return Err(DecodeError::malformed(format!(
            "uuid {} does not match extension tag {}",
            uuid, tag
        )));
    }
    Ok(uuid)
}

fn items(value: &Value) -> Result<&[Value], DecodeError> {
    value
        .as_array()
        .ok_or_else(|| DecodeError::malformed(format!("expected array, found {}", value.kind())))
}

fn number(value: &Value) -> Result<f64, DecodeError> {
    value
        .as_f64()
        .ok_or_else(|| DecodeError::malformed(format!("expected number, found {}", value.kind())))
}

fn coord(value: &Value) -> Result<Coord, DecodeError> {
    match value.as_array() {
        Some([x, y]) => Ok(Coord::new(number(x)?, number(y)?)),
        _ => Err(DecodeError::malformed("expected [x, y] coordinate")),
    }
}

fn coords(value: &Value) -> Result<Vec<Coord>, DecodeError> {
    items(value)?.iter().map(coord).collect()
}

fn rings(value: &Value) -> Result<Vec<Vec<Coord>>, DecodeError> {
    items(value)?.iter().map(coords).collect()
}
