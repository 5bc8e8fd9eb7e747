//! Determinism invariant checks for authoritative values.
//!
//! [`validate`] walks any `Serialize` value through a recording serializer
//! and rejects the shapes that break cross-platform replay:
//!
//! - floating-point numbers, including integral ones such as `2.0`
//! - integers outside `±(2^53 - 1)`
//! - explicit nulls (`None`, `()`); absent fields must be skipped instead
//! - maps whose keys are not strings
//! - maps whose iteration order is not ascending byte order, which is how a
//!   hash-ordered container shows up once serialized
//! - wall-clock values (`std::time::SystemTime`)
//!
//! The walk is advisory: the kernel runs it over post-apply state before
//! hashing, not on every read.

use serde::Serialize;
use serde::ser::{self, Impossible};

use crate::error::{ErrorSeverity, SimError};

/// Largest integer every replica can represent exactly (`2^53 - 1`).
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Authoritative data contains a disallowed value shape.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("determinism violation at {}: {reason}", location(.path))]
pub struct DeterminismViolation {
    /// Dotted path to the offending value, e.g. `entities.npc.ida.components[2]`.
    pub path: String,
    pub reason: String,
}

fn location(path: &str) -> &str {
    if path.is_empty() { "root" } else { path }
}

impl SimError for DeterminismViolation {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Integrity
    }

    fn error_code(&self) -> &'static str {
        "determinism_violation"
    }
}

impl ser::Error for DeterminismViolation {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        Self {
            path: String::new(),
            reason: msg.to_string(),
        }
    }
}

/// Checks `value` against the determinism invariant.
///
/// `path` prefixes every reported location; pass `""` to report paths
/// relative to `value`.
pub fn validate<T>(value: &T, path: &str) -> Result<(), DeterminismViolation>
where
    T: Serialize + ?Sized,
{
    value.serialize(Walker {
        path: path.to_string(),
    })
}

fn join_field(base: &str, field: &str) -> String {
    if base.is_empty() {
        field.to_string()
    } else {
        format!("{base}.{field}")
    }
}

fn join_index(base: &str, index: usize) -> String {
    format!("{base}[{index}]")
}

/// Serializer that produces nothing and fails on the first violation.
struct Walker {
    path: String,
}

impl Walker {
    fn fail(&self, reason: impl Into<String>) -> DeterminismViolation {
        DeterminismViolation {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn check_int(&self, value: i128) -> Result<(), DeterminismViolation> {
        if value.unsigned_abs() > MAX_SAFE_INTEGER as u128 {
            return Err(self.fail(format!("integer {value} outside the safe range")));
        }
        Ok(())
    }

    fn check_float(&self, value: f64) -> Result<(), DeterminismViolation> {
        if !value.is_finite() {
            Err(self.fail("non-finite number"))
        } else if value.fract() != 0.0 {
            Err(self.fail(format!("non-integer number {value}")))
        } else {
            Err(self.fail(format!("floating-point number {value}; store an integer")))
        }
    }

    fn compound(self) -> Compound {
        Compound {
            path: self.path,
            index: 0,
            pending_key: None,
            last_key: None,
        }
    }
}

impl ser::Serializer for Walker {
    type Ok = ();
    type Error = DeterminismViolation;

    type SerializeSeq = Compound;
    type SerializeTuple = Compound;
    type SerializeTupleStruct = Compound;
    type SerializeTupleVariant = Compound;
    type SerializeMap = Compound;
    type SerializeStruct = Compound;
    type SerializeStructVariant = Compound;

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

    fn serialize_i64(self, v: i64) -> Result<(), Self::Error> {
        self.check_int(i128::from(v))
    }

    fn serialize_i128(self, v: i128) -> Result<(), Self::Error> {
        self.check_int(v)
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

    fn serialize_u64(self, v: u64) -> Result<(), Self::Error> {
        self.check_int(i128::from(v))
    }

    fn serialize_u128(self, v: u128) -> Result<(), Self::Error> {
        if v > MAX_SAFE_INTEGER as u128 {
            return Err(self.fail(format!("integer {v} outside the safe range")));
        }
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Result<(), Self::Error> {
        self.check_float(f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Result<(), Self::Error> {
        self.check_float(v)
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
        Err(self.fail("explicit null; omit the field instead"))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<(), Self::Error> {
        Err(self.fail("explicit null; omit the field instead"))
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<(), Self::Error> {
        Err(self.fail(format!("unit struct {name} encodes as null")))
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
    ) -> Result<(), Self::Error> {
        Ok(())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        value.serialize(Walker {
            path: join_field(&self.path, variant),
        })
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Compound, Self::Error> {
        Ok(self.compound())
    }

    fn serialize_tuple(self, _: usize) -> Result<Compound, Self::Error> {
        Ok(self.compound())
    }

    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Compound, Self::Error> {
        Ok(self.compound())
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Compound, Self::Error> {
        let path = join_field(&self.path, variant);
        Ok(Walker { path }.compound())
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Compound, Self::Error> {
        Ok(self.compound())
    }

    fn serialize_struct(self, name: &'static str, _: usize) -> Result<Compound, Self::Error> {
        if name == "SystemTime" {
            return Err(self.fail("wall-clock time value"));
        }
        Ok(self.compound())
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Compound, Self::Error> {
        let path = join_field(&self.path, variant);
        Ok(Walker { path }.compound())
    }
}

/// Element, field and entry visitor shared by every compound shape.
struct Compound {
    path: String,
    index: usize,
    pending_key: Option<String>,
    last_key: Option<String>,
}

impl Compound {
    fn element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), DeterminismViolation> {
        let path = join_index(&self.path, self.index);
        self.index += 1;
        value.serialize(Walker { path })
    }

    fn field<T: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &T,
    ) -> Result<(), DeterminismViolation> {
        value.serialize(Walker {
            path: join_field(&self.path, key),
        })
    }

    fn fail(&self, reason: impl Into<String>) -> DeterminismViolation {
        DeterminismViolation {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }
}

impl ser::SerializeSeq for Compound {
    type Ok = ();
    type Error = DeterminismViolation;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.element(value)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTuple for Compound {
    type Ok = ();
    type Error = DeterminismViolation;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.element(value)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for Compound {
    type Ok = ();
    type Error = DeterminismViolation;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.element(value)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for Compound {
    type Ok = ();
    type Error = DeterminismViolation;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        self.element(value)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeMap for Compound {
    type Ok = ();
    type Error = DeterminismViolation;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), Self::Error> {
        let key = key.serialize(KeyCapture).map_err(|_| self.fail("map key is not a string"))?;

        if let Some(previous) = &self.last_key {
            if previous.as_bytes() >= key.as_bytes() {
                return Err(self.fail(format!(
                    "map key \"{key}\" out of order after \"{previous}\"; use an ordered map"
                )));
            }
        }

        self.last_key = Some(key.clone());
        self.pending_key = Some(key);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Self::Error> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| self.fail("map value without a key"))?;
        self.field(&key, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeStruct for Compound {
    type Ok = ();
    type Error = DeterminismViolation;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        self.field(key, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ser::SerializeStructVariant for Compound {
    type Ok = ();
    type Error = DeterminismViolation;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), Self::Error> {
        self.field(key, value)
    }

    fn end(self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Accepts string-like map keys and nothing else.
struct KeyCapture;

macro_rules! reject_key {
    ($($method:ident($($arg:ty),*)),* $(,)?) => {
        $(
            fn $method(self, $(_: $arg),*) -> Result<String, DeterminismViolation> {
                Err(ser::Error::custom("map key is not a string"))
            }
        )*
    };
}

impl ser::Serializer for KeyCapture {
    type Ok = String;
    type Error = DeterminismViolation;

    type SerializeSeq = Impossible<String, DeterminismViolation>;
    type SerializeTuple = Impossible<String, DeterminismViolation>;
    type SerializeTupleStruct = Impossible<String, DeterminismViolation>;
    type SerializeTupleVariant = Impossible<String, DeterminismViolation>;
    type SerializeMap = Impossible<String, DeterminismViolation>;
    type SerializeStruct = Impossible<String, DeterminismViolation>;
    type SerializeStructVariant = Impossible<String, DeterminismViolation>;

    fn serialize_str(self, v: &str) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }

    fn serialize_char(self, v: char) -> Result<String, Self::Error> {
        Ok(v.to_string())
    }

    fn serialize_unit_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
    ) -> Result<String, Self::Error> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        value: &T,
    ) -> Result<String, Self::Error> {
        value.serialize(self)
    }

    reject_key!(
        serialize_bool(bool),
        serialize_i8(i8),
        serialize_i16(i16),
        serialize_i32(i32),
        serialize_i64(i64),
        serialize_u8(u8),
        serialize_u16(u16),
        serialize_u32(u32),
        serialize_u64(u64),
        serialize_f32(f32),
        serialize_f64(f64),
        serialize_bytes(&[u8]),
        serialize_none(),
        serialize_unit(),
        serialize_unit_struct(&'static str),
    );

    fn serialize_some<T: Serialize + ?Sized>(self, _: &T) -> Result<String, Self::Error> {
        Err(ser::Error::custom("map key is not a string"))
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<String, Self::Error> {
        Err(ser::Error::custom("map key is not a string"))
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self::SerializeSeq, Self::Error> {
        Err(ser::Error::custom("map key is not a string"))
    }

    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple, Self::Error> {
        Err(ser::Error::custom("map key is not a string"))
    }

    fn serialize_tuple_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleStruct, Self::Error> {
        Err(ser::Error::custom("map key is not a string"))
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant, Self::Error> {
        Err(ser::Error::custom("map key is not a string"))
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap, Self::Error> {
        Err(ser::Error::custom("map key is not a string"))
    }

    fn serialize_struct(
        self,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStruct, Self::Error> {
        Err(ser::Error::custom("map key is not a string"))
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant, Self::Error> {
        Err(ser::Error::custom("map key is not a string"))
    }
}
