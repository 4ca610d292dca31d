//! Value Equality (component 4, §4.4): structural equality over two
//! decoded default/const values, tolerant of the encoding's defaulting
//! conventions (null pointer ≡ all-zero struct ≡ empty list) and the
//! enum-code/UInt16 cross-kind equivalence the compatibility table allows.

use std::fmt;

use crate::error::DifferError;
use crate::message::{self, Content, ElementSize, ListReader, PointerRef, StructReader};
use crate::schema::Value;

/// A value pair `value_eq` recognizes but cannot fully analyze: the soft
/// half of the error duality, same role as `CompatError` for types. Holds a
/// human-readable reason, since the differ surfaces this in an `unsupported`
/// change record. A `Fatal` variant promotes a hard-abort error found while
/// walking a pointer (a malformed message, not merely an unanalyzable one).
#[derive(Debug)]
pub enum ValueEqError {
    Unsupported(String),
    Fatal(DifferError),
}

impl fmt::Display for ValueEqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported(reason) => write!(f, "{reason}"),
            Self::Fatal(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ValueEqError {}

impl From<message::Error> for ValueEqError {
    fn from(err: message::Error) -> Self {
        Self::Fatal(DifferError::from(err))
    }
}

impl From<DifferError> for ValueEqError {
    fn from(err: DifferError) -> Self {
        Self::Fatal(err)
    }
}

/// Compares two values for structural equality, per the laws in §8: every
/// value is reflexive; a null pointer equals an all-zero struct of any
/// width and a zero-length list; an enum code equals the `UInt16` value of
/// the same integer.
pub fn value_eq(old: &Value, new: &Value) -> Result<bool, ValueEqError> {
    match (old, new) {
        (Value::Void, Value::Void) => Ok(true),
        (Value::Bool(a), Value::Bool(b)) => Ok(a == b),
        (Value::Int8(a), Value::Int8(b)) => Ok(a == b),
        (Value::Int16(a), Value::Int16(b)) => Ok(a == b),
        (Value::Int32(a), Value::Int32(b)) => Ok(a == b),
        (Value::Int64(a), Value::Int64(b)) => Ok(a == b),
        (Value::UInt8(a), Value::UInt8(b)) => Ok(a == b),
        (Value::UInt16(a), Value::UInt16(b)) => Ok(a == b),
        (Value::UInt32(a), Value::UInt32(b)) => Ok(a == b),
        (Value::UInt64(a), Value::UInt64(b)) => Ok(a == b),
        (Value::Float32(a), Value::Float32(b)) => Ok(a.to_bits() == b.to_bits()),
        (Value::Float64(a), Value::Float64(b)) => Ok(a.to_bits() == b.to_bits()),
        (Value::Enum(a), Value::Enum(b)) => Ok(a == b),
        // Enums encode as unsigned 16-bit integers, so a value comparison
        // across the two kinds is legal wherever `compat` allowed the type
        // change through.
        (Value::Enum(a), Value::UInt16(b)) | (Value::UInt16(b), Value::Enum(a)) => Ok(a == b),
        (Value::Text(a), Value::Text(b)) => pointer_eq(a, b),
        (Value::Data(a), Value::Data(b)) => pointer_eq(a, b),
        (Value::Struct(a), Value::Struct(b)) => pointer_eq(a, b),
        (Value::List(a), Value::List(b)) => pointer_eq(a, b),
        (Value::AnyPointer(a), Value::AnyPointer(b)) => pointer_eq(a, b),
        (Value::Interface(a), Value::Interface(b)) => interface_eq(a, b),
        _ => Err(ValueEqError::Unsupported(format!(
            "cannot compare values of differing kinds ({old:?} vs {new:?})"
        ))),
    }
}

fn interface_eq(old: &PointerRef, new: &PointerRef) -> Result<bool, ValueEqError> {
    // The only legal interface-typed default is null; anything else means
    // the schema loader handed us a malformed const/default value.
    if !matches!(old.resolve()?, Content::Null) {
        return Err(DifferError::NonNullInterfacePointer.into());
    }
    if !matches!(new.resolve()?, Content::Null) {
        return Err(DifferError::NonNullInterfacePointer.into());
    }
    Ok(true)
}

/// Compares two pointers, treating null, an all-zero struct, and an
/// empty list as mutually equal defaults.
fn pointer_eq(old: &PointerRef, new: &PointerRef) -> Result<bool, ValueEqError> {
    let old_default = message::is_default_pointer(old)?;
    let new_default = message::is_default_pointer(new)?;
    if old_default && new_default {
        return Ok(true);
    }
    if old_default != new_default {
        return Ok(false);
    }

    match (old.resolve()?, new.resolve()?) {
        (Content::Null, Content::Null) => Ok(true),
        (Content::Struct(a), Content::Struct(b)) => struct_eq(&a, &b),
        (Content::List(a), Content::List(b)) => list_eq(&a, &b),
        (Content::Capability(_), Content::Capability(_)) => {
            Err(DifferError::NonNullInterfacePointer.into())
        }
        _ => Err(ValueEqError::Unsupported(
            "default pointers of differing wire kinds cannot be compared".to_string(),
        )),
    }
}

/// Word-by-word comparison, tolerant of one struct declaring more words
/// than the other: the upgrade-compatible semantics define a read past a
/// struct's declared size as zero/null, so comparing over `0..max(a, b)`
/// is equivalent to comparing over each struct's own declared range.
fn struct_eq(old: &StructReader, new: &StructReader) -> Result<bool, ValueEqError> {
    let data_words = old.data_word_count().max(new.data_word_count());
    for i in 0..data_words {
        if old.data_word(i)? != new.data_word(i)? {
            return Ok(false);
        }
    }
    let pointer_words = old.pointer_word_count().max(new.pointer_word_count());
    for i in 0..pointer_words {
        if !pointer_eq(&old.pointer_word(i), &new.pointer_word(i))? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn list_eq(old: &ListReader, new: &ListReader) -> Result<bool, ValueEqError> {
    if old.len() != new.len() {
        return Ok(false);
    }
    if old.element_size() != new.element_size() {
        return Err(ValueEqError::Unsupported(
            "cannot compare lists with differing element representations".to_string(),
        ));
    }
    let len = old.len() as u32;
    match old.element_size() {
        ElementSize::Void => Ok(true),
        ElementSize::Bit => {
            for i in 0..len {
                if old.bit(i)? != new.bit(i)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ElementSize::Byte => {
            for i in 0..len {
                if old.byte(i)? != new.byte(i)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ElementSize::TwoBytes => {
            for i in 0..len {
                if old.u16_element(i)? != new.u16_element(i)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ElementSize::FourBytes => {
            for i in 0..len {
                if old.u32_element(i)? != new.u32_element(i)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ElementSize::EightBytes => {
            for i in 0..len {
                if old.u64_element(i)? != new.u64_element(i)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ElementSize::Pointer => {
            for i in 0..len {
                if !pointer_eq(&old.pointer(i)?, &new.pointer(i)?)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        ElementSize::InlineComposite => {
            for i in 0..len {
                if !struct_eq(&old.element_struct(i)?, &new.element_struct(i)?)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::message::Message;

    #[test]
    fn primitives_are_reflexive() {
        assert!(value_eq(&Value::UInt32(7), &Value::UInt32(7)).unwrap());
        assert!(!value_eq(&Value::UInt32(7), &Value::UInt32(8)).unwrap());
        assert!(value_eq(&Value::Bool(true), &Value::Bool(true)).unwrap());
    }

    #[test]
    fn enum_code_equals_uint16_value() {
        assert!(value_eq(&Value::Enum(3), &Value::UInt16(3)).unwrap());
        assert!(value_eq(&Value::UInt16(3), &Value::Enum(3)).unwrap());
        assert!(!value_eq(&Value::Enum(3), &Value::UInt16(4)).unwrap());
    }

    #[test]
    fn null_pointer_equals_empty_list() {
        let null = PointerRef::null();
        let words = vec![1u64 | (2u64 << 32)]; // list pointer, Byte size, length 0
        let message = Arc::new(Message::new(vec![words.into_boxed_slice()]));
        let empty_list = PointerRef::new(message, 0, 0);
        assert!(value_eq(&Value::List(null), &Value::List(empty_list)).unwrap());
    }

    #[test]
    fn null_pointer_equals_all_zero_struct() {
        let null = PointerRef::null();
        // struct pointer, offset 0, 1 data word, 0 pointer words; the data
        // word itself is zero.
        let words = vec![1u64 << 32, 0u64];
        let message = Arc::new(Message::new(vec![words.into_boxed_slice()]));
        let zero_struct = PointerRef::new(message, 0, 0);
        assert!(value_eq(&Value::Struct(null), &Value::Struct(zero_struct)).unwrap());
    }

    #[test]
    fn differing_primitive_kinds_are_unsupported() {
        let result = value_eq(&Value::UInt8(1), &Value::UInt32(1));
        assert!(matches!(result, Err(ValueEqError::Unsupported(_))));
    }
}
