//! Runtime values captured by the evaluation recorder, plus the value
//! formatter that turns a (value, static type) pair into its printable form.

use crate::types::{CType, IntWidth};

pub const NULL_TEXT: &str = "(nil)";

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub enum Value {
    /// An integer, stored canonically for its type: sign-extended when the
    /// type is signed, masked non-negative when unsigned.
    Int { value: i128, ty: CType },
    /// A pointer. `pointee` carries the referenced text when the host knows
    /// it (string literals, functions returning into known buffers).
    Ptr { addr: u64, pointee: Option<String> },
}

impl Value {
    pub fn int(value: i64) -> Self {
        Value::Int {
            value: value as i128,
            ty: CType::int(),
        }
    }

    pub fn typed_int(value: i128, ty: CType) -> Self {
        let canon = wrap_to(value, &ty);
        Value::Int { value: canon, ty }
    }

    pub fn null() -> Self {
        Value::Ptr {
            addr: 0,
            pointee: None,
        }
    }

    pub fn string(addr: u64, text: impl Into<String>) -> Self {
        Value::Ptr {
            addr,
            pointee: Some(text.into()),
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Int { value, .. } => *value != 0,
            Value::Ptr { addr, .. } => *addr != 0,
        }
    }

    pub fn raw_bits(&self) -> i128 {
        match self {
            Value::Int { value, .. } => *value,
            Value::Ptr { addr, .. } => *addr as i128,
        }
    }

    /// C cast semantics: integers truncate (or re-extend) to the target
    /// width, pointers convert bitwise.
    pub fn cast_to(&self, ty: &CType) -> Value {
        match ty {
            CType::Int { .. } => Value::Int {
                value: wrap_to(self.raw_bits(), ty),
                ty: ty.clone(),
            },
            CType::Pointer(_) => match self {
                Value::Ptr { addr, pointee } => Value::Ptr {
                    addr: *addr,
                    pointee: pointee.clone(),
                },
                Value::Int { value, .. } => Value::Ptr {
                    addr: *value as u64,
                    pointee: None,
                },
            },
            CType::Void => self.clone(),
        }
    }
}

/// Wraps a raw integer into the canonical representation for `ty`.
/// Non-integer targets return the value unchanged.
pub fn wrap_to(raw: i128, ty: &CType) -> i128 {
    let CType::Int { width, signed } = ty else {
        return raw;
    };
    let bits = width.bits();
    let mask = (1u128 << bits) - 1;
    let low = (raw as u128) & mask;
    if *signed && (low >> (bits - 1)) & 1 == 1 {
        (low | !mask) as i128
    } else {
        low as i128
    }
}

/// The value formatter. The format is chosen by the static type; the one
/// value-dependent rule is the null check that keeps a null `char *` from
/// rendering as a quoted string.
pub fn format_value(value: &Value, ty: &CType) -> String {
    match value {
        Value::Ptr { addr: 0, .. } => NULL_TEXT.to_string(),
        Value::Ptr { addr, pointee } => {
            if ty.is_char_pointer() {
                if let Some(text) = pointee {
                    return format!("\"{text}\"");
                }
            }
            format!("{addr:#x}")
        }
        Value::Int { value, .. } => match ty {
            CType::Int {
                signed: false,
                width,
            } => {
                let mask = (1u128 << width.bits()) - 1;
                format!("{}", (*value as u128) & mask)
            }
            // Most generic representation when the type carries no
            // formatting rule of its own.
            _ => format!("{value}"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_renders_nil_never_a_string() {
        assert_eq!(format_value(&Value::null(), &CType::char_ptr()), "(nil)");
        assert_eq!(format_value(&Value::null(), &CType::void_ptr()), "(nil)");
    }

    #[test]
    fn char_pointer_renders_quoted_pointee() {
        let v = Value::string(0x1000, "world");
        assert_eq!(format_value(&v, &CType::char_ptr()), "\"world\"");
    }

    #[test]
    fn generic_pointer_renders_hex() {
        let v = Value::Ptr {
            addr: 0xdead,
            pointee: None,
        };
        assert_eq!(format_value(&v, &CType::void_ptr()), "0xdead");
    }

    #[test]
    fn narrowing_cast_truncates() {
        let v = Value::int(70000);
        let narrowed = v.cast_to(&CType::short());
        assert_eq!(narrowed.raw_bits(), 4464); // 70000 mod 2^16

        let negative = Value::int(65535).cast_to(&CType::short());
        assert_eq!(negative.raw_bits(), -1);
    }

    #[test]
    fn unsigned_formatting_masks() {
        let ty = CType::unsigned(IntWidth::Char);
        let v = Value::typed_int(-1, ty.clone());
        assert_eq!(format_value(&v, &ty), "255");
    }
}
