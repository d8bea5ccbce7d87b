use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{ser, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::RecallError;

/// Keyword arguments of a call. Sorted by name, so iteration order (and
/// therefore serialization) never depends on the order they were given in.
pub type Kwargs = BTreeMap<String, Value>;

/// Canonical key of a call, derived from its positional and keyword arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signature of a key derivation function. Backends accept a custom one so
/// that collision handling can be exercised deterministically.
pub type KeyFn = fn(&[Value], &Kwargs) -> Result<CacheKey, RecallError>;

/// Derive the key of a call: SHA-256 over the canonical JSON encoding of
/// `[args, kwargs]`. The encoding is stable across processes because keyword
/// arguments are kept sorted and JSON numbers are always finite.
pub fn make_key(args: &[Value], kwargs: &Kwargs) -> Result<CacheKey, RecallError> {
    let canonical = serde_json::to_string(&(args, kwargs))
        .map_err(|e| RecallError::InvalidArguments(format!("arguments not serializable: {e}")))?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash: String = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    tracing::debug!(key = %hash, "derived cache key");
    Ok(CacheKey(hash))
}

/// Canonical string form of a filtered kwargs mapping. Calls sharing a
/// signature share an interpolation subspace.
pub fn signature(kwargs: &Kwargs) -> Result<String, RecallError> {
    serde_json::to_string(kwargs)
        .map_err(|e| RecallError::InvalidArguments(format!("kwargs not serializable: {e}")))
}

/// Filters keyword arguments before they reach the key and the stored record.
#[derive(Debug, Clone, Default)]
pub struct KeyCodec {
    ignore_kwargs: BTreeSet<String>,
}

impl KeyCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclude the given keyword names from keys and stored kwargs.
    pub fn ignore<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_kwargs.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn ignored(&self) -> &BTreeSet<String> {
        &self.ignore_kwargs
    }

    /// The kwargs that take part in caching.
    pub fn filter(&self, kwargs: &Kwargs) -> Kwargs {
        if self.ignore_kwargs.is_empty() {
            return kwargs.clone();
        }
        kwargs
            .iter()
            .filter(|(name, _)| !self.ignore_kwargs.contains(*name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Filter the kwargs and derive the key in one step.
    pub fn make_key(&self, args: &[Value], kwargs: &Kwargs) -> Result<CacheKey, RecallError> {
        make_key(args, &self.filter(kwargs))
    }
}

/// Positional and keyword arguments of one call, built from any
/// `Serialize` values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    args: Vec<Value>,
    kwargs: Kwargs,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg<T: Serialize>(mut self, value: T) -> Result<Self, RecallError> {
        self.args.push(to_arg(value)?);
        Ok(self)
    }

    /// Set a keyword argument.
    pub fn kwarg<T: Serialize>(mut self, name: impl Into<String>, value: T) -> Result<Self, RecallError> {
        self.kwargs.insert(name.into(), to_arg(value)?);
        Ok(self)
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }
}

/// Non-finite floats are rejected: `serde_json` would turn them into `null`.
fn to_arg<T: Serialize>(value: T) -> Result<Value, RecallError> {
    value
        .serialize(FiniteCheck)
        .and_then(|()| serde_json::to_value(value))
        .map_err(|e| RecallError::InvalidArguments(format!("argument not serializable: {e}")))
}

/// Walks a value and fails on the first non-finite float.
#[derive(Clone, Copy)]
struct FiniteCheck;

impl FiniteCheck {
    fn float(v: f64) -> Result<(), serde_json::Error> {
        if v.is_finite() {
            Ok(())
        } else {
            Err(ser::Error::custom(format!("non-finite number {v}")))
        }
    }
}

impl ser::Serializer for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_i8(self, _: i8) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_i16(self, _: i16) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_i32(self, _: i32) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_i64(self, _: i64) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_i128(self, _: i128) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_u8(self, _: u8) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_u16(self, _: u16) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_u32(self, _: u32) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_u64(self, _: u64) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_u128(self, _: u128) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_f32(self, v: f32) -> Result<(), Self::Error> {
        Self::float(f64::from(v))
    }
    fn serialize_f64(self, v: f64) -> Result<(), Self::Error> {
        Self::float(v)
    }
    fn serialize_char(self, _: char) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_str(self, _: &str) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_bytes(self, _: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_none(self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<(), Self::Error> {
        value.serialize(self)
    }
    fn serialize_unit(self) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_unit_struct(self, _: &'static str) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Result<(), Self::Error> {
        Ok(())
    }
    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(self)
    }
    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(self)
    }
    fn serialize_seq(self, _: Option<usize>) -> Result<Self, Self::Error> {
        Ok(self)
    }
    fn serialize_tuple(self, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }
    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, Self::Error> {
        Ok(self)
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self, Self::Error> {
        Ok(self)
    }
    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, Self::Error> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, Self::Error> {
        Ok(self)
    }
}

impl ser::SerializeSeq for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(*self)
    }
    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTuple for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(*self)
    }
    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(*self)
    }
    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(*self)
    }
    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeMap for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Result<(), Self::Error> {
        key.serialize(*self)
    }
    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<(), Self::Error> {
        value.serialize(*self)
    }
    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeStruct for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Result<(), Self::Error> {
        value.serialize(*self)
    }
    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Result<(), Self::Error> {
        value.serialize(*self)
    }
    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Collect `(name, value)` pairs into a [`Kwargs`] mapping.
pub fn kwargs<I, K>(pairs: I) -> Kwargs
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
