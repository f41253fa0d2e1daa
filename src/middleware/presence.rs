//! Decoding that tells absent fields apart from bad ones.
//!
//! serde stops at the first missing field. To report every absent required
//! field next to the validator's findings, a decode that failed on a missing
//! field is retried through [`Filling`]: a deserializer over a
//! [`serde_json::Value`] that learns each struct's declared fields from
//! `deserialize_struct` and answers the absent ones with zero values. The
//! paths it had to fill are the *gaps*. A value built that way is validated
//! and then thrown away; it never reaches a handler.
//!
//! Query strings and urlencoded forms arrive as maps of strings. In textual
//! mode scalar fields are parsed from those strings.

use std::cell::RefCell;
use std::iter::Enumerate;
use std::slice;
use std::vec;

use serde::de::value::StringDeserializer;
use serde::de::{
    self, DeserializeOwned, DeserializeSeed, Deserializer, IntoDeserializer, MapAccess, SeqAccess,
    Unexpected, Visitor,
};
use serde::forward_to_deserialize_any;
use serde_json::{Map, Value};

type Gaps = RefCell<Vec<String>>;

/// A decoded value and the required paths that were absent from the source.
pub(crate) struct Decoded<T> {
    pub value: T,
    pub gaps: Vec<String>,
}

/// Decodes `source` as `T`.
///
/// Returns an error only for problems other than absent fields, or when the
/// absent fields cannot be filled (e.g. an enum); the error is then the
/// plain decode's.
pub(crate) fn decode<T: DeserializeOwned>(source: Value, textual: bool) -> Result<Decoded<T>, serde_json::Error> {
    match T::deserialize(Filling::root(source.clone(), textual, None)) {
        Ok(value) => Ok(Decoded { value, gaps: Vec::new() }),
        Err(e) if missing_field(&e.to_string()).is_some() => {
            let gaps = Gaps::default();
            match T::deserialize(Filling::root(source, textual, Some(&gaps))) {
                Ok(value) => Ok(Decoded { value, gaps: gaps.into_inner() }),
                Err(_) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// The field named by a serde `missing field` error message.
pub(crate) fn missing_field(message: &str) -> Option<&str> {
    message.strip_prefix("missing field `")?.split('`').next()
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() { key.to_owned() } else { format!("{path}.{key}") }
}

// ── Filling ───────────────────────────────────────────────────────────────────

struct Filling<'g> {
    value: Value,
    path: String,
    textual: bool,
    /// `None` on the plain pass: absent fields are left to serde.
    gaps: Option<&'g Gaps>,
}

impl<'g> Filling<'g> {
    fn root(value: Value, textual: bool, gaps: Option<&'g Gaps>) -> Self {
        Self { value, path: String::new(), textual, gaps }
    }
}

macro_rules! textual_scalars {
    ($($method:ident => $ty:ty, $visit:ident;)*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
            let textual = self.textual;
            match self.value {
                Value::String(s) if textual => match s.parse::<$ty>() {
                    Ok(v) => visitor.$visit(v),
                    Err(_) => Err(de::Error::invalid_value(Unexpected::Str(&s), &visitor)),
                },
                other => other.$method(visitor),
            }
        }
    )*};
}

impl<'de, 'g> Deserializer<'de> for Filling<'g> {
    type Error = serde_json::Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.value.deserialize_any(visitor)
    }

    textual_scalars! {
        deserialize_bool => bool, visit_bool;
        deserialize_i8 => i8, visit_i8;
        deserialize_i16 => i16, visit_i16;
        deserialize_i32 => i32, visit_i32;
        deserialize_i64 => i64, visit_i64;
        deserialize_u8 => u8, visit_u8;
        deserialize_u16 => u16, visit_u16;
        deserialize_u32 => u32, visit_u32;
        deserialize_u64 => u64, visit_u64;
        deserialize_f32 => f32, visit_f32;
        deserialize_f64 => f64, visit_f64;
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        if self.value.is_null() {
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        let Filling { value, path, textual, gaps } = self;
        match value {
            Value::Array(items) => visitor.visit_seq(FillSeq {
                items: items.into_iter().enumerate(),
                path,
                textual,
                gaps,
            }),
            other => other.deserialize_seq(visitor),
        }
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        let Filling { value, path, textual, gaps } = self;
        match value {
            Value::Object(map) => {
                let absent: Vec<&'static str> = match gaps {
                    Some(_) => fields.iter().copied().filter(|f| !map.contains_key(*f)).collect(),
                    None => Vec::new(),
                };
                visitor.visit_map(FillMap {
                    present: map.into_iter(),
                    absent: absent.into_iter(),
                    next: None,
                    path,
                    textual,
                    gaps,
                })
            }
            other => other.deserialize_struct(name, fields, visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.value.deserialize_enum(name, variants, visitor)
    }

    forward_to_deserialize_any! {
        i128 u128 char str string bytes byte_buf unit unit_struct map tuple
        tuple_struct identifier ignored_any
    }
}

enum Next {
    Present(String, Value),
    Absent(String),
}

struct FillMap<'g> {
    present: serde_json::map::IntoIter,
    absent: vec::IntoIter<&'static str>,
    next: Option<Next>,
    path: String,
    textual: bool,
    gaps: Option<&'g Gaps>,
}

impl<'de, 'g> MapAccess<'de> for FillMap<'g> {
    type Error = serde_json::Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error> {
        let key = if let Some((key, value)) = self.present.next() {
            self.next = Some(Next::Present(join(&self.path, &key), value));
            key
        } else if let Some(field) = self.absent.next() {
            self.next = Some(Next::Absent(join(&self.path, field)));
            field.to_owned()
        } else {
            return Ok(None);
        };
        let key: StringDeserializer<serde_json::Error> = key.into_deserializer();
        seed.deserialize(key).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Self::Error> {
        match self.next.take() {
            Some(Next::Present(path, value)) => seed.deserialize(Filling {
                value,
                path,
                textual: self.textual,
                gaps: self.gaps,
            }),
            Some(Next::Absent(path)) => seed.deserialize(Zero { path, gaps: self.gaps }),
            None => Err(de::Error::custom("map value requested before its key")),
        }
    }
}

struct FillSeq<'g> {
    items: Enumerate<vec::IntoIter<Value>>,
    path: String,
    textual: bool,
    gaps: Option<&'g Gaps>,
}

impl<'de, 'g> SeqAccess<'de> for FillSeq<'g> {
    type Error = serde_json::Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>, Self::Error> {
        let Some((i, value)) = self.items.next() else {
            return Ok(None);
        };
        seed.deserialize(Filling {
            value,
            path: format!("{}[{i}]", self.path),
            textual: self.textual,
            gaps: self.gaps,
        })
        .map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

// ── Zero ──────────────────────────────────────────────────────────────────────

/// Stands in for an absent field with the zero value of whatever type asks.
///
/// Records its path unless the field turns out to be optional. Members of a
/// zeroed struct are zeroed without being recorded.
struct Zero<'g> {
    path: String,
    gaps: Option<&'g Gaps>,
}

impl Zero<'_> {
    fn record(&self) {
        if let Some(gaps) = self.gaps {
            gaps.borrow_mut().push(self.path.clone());
        }
    }
}

macro_rules! zero_values {
    ($($method:ident => $visit:ident($($zero:expr)?);)*) => {$(
        fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
            self.record();
            visitor.$visit($($zero)?)
        }
    )*};
}

impl<'de, 'g> Deserializer<'de> for Zero<'g> {
    type Error = serde_json::Error;

    zero_values! {
        deserialize_any => visit_unit();
        deserialize_bool => visit_bool(false);
        deserialize_i8 => visit_i64(0);
        deserialize_i16 => visit_i64(0);
        deserialize_i32 => visit_i64(0);
        deserialize_i64 => visit_i64(0);
        deserialize_i128 => visit_i64(0);
        deserialize_u8 => visit_u64(0);
        deserialize_u16 => visit_u64(0);
        deserialize_u32 => visit_u64(0);
        deserialize_u64 => visit_u64(0);
        deserialize_u128 => visit_u64(0);
        deserialize_f32 => visit_f64(0.0);
        deserialize_f64 => visit_f64(0.0);
        deserialize_char => visit_char('\0');
        deserialize_str => visit_str("");
        deserialize_string => visit_str("");
        deserialize_identifier => visit_str("");
        deserialize_bytes => visit_bytes(&[]);
        deserialize_byte_buf => visit_bytes(&[]);
        deserialize_unit => visit_unit();
        deserialize_ignored_any => visit_unit();
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_none()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.record();
        Value::Array(Vec::new()).deserialize_seq(visitor)
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        self.record();
        Value::Object(Map::new()).deserialize_map(visitor)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.record();
        visitor.visit_map(ZeroFields { fields: fields.iter(), path: self.path, next: None })
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        Err(de::Error::custom(format!("no zero value for enum at `{}`", self.path)))
    }
}

struct ZeroFields {
    fields: slice::Iter<'static, &'static str>,
    path: String,
    next: Option<String>,
}

impl<'de> MapAccess<'de> for ZeroFields {
    type Error = serde_json::Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Self::Error> {
        let Some(field) = self.fields.next() else {
            return Ok(None);
        };
        self.next = Some(join(&self.path, field));
        let key: StringDeserializer<serde_json::Error> = (*field).to_owned().into_deserializer();
        seed.deserialize(key).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Self::Error> {
        let path = self.next.take().unwrap_or_default();
        seed.deserialize(Zero { path, gaps: None })
    }
}
