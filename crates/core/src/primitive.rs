//! Primitive type mapper.
//!
//! Maps a scalar type name to its native representation and produces the
//! C fragments that parse, validate and forward a value of that type. Swift
//! names come from here too so every backend agrees on the vocabulary.
//!
//! Integer width decides the representation:
//! - up to 32 bits: `uint32_t` / `int32_t`
//! - up to 64 bits: `uint64_t` / `int64_t`
//! - wider: big-endian `bytes_t` of at most `width / 8` bytes

use serde_json::Value;

use crate::emit::c::{CStmt, CType, c_str};
use crate::model::Encoding;
use crate::registry::ResolvedField;

/// A scalar type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// `bool`
    Bool,
    /// `uint<N>`
    Uint(u16),
    /// `int<N>`
    Int(u16),
    /// `float`
    Float,
    /// 20-byte account address
    Address,
    /// `bytes<N>`, exact length
    FixedBytes(u16),
    /// `bytes`, variable length
    Bytes,
    /// `hex`: `bytes` with hex encoding
    Hex,
    /// UTF-8 string
    String,
    /// Unvalidated JSON
    Any,
}

/// How an integer is carried in native code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntRepr {
    /// 32-bit scalar.
    Narrow,
    /// 64-bit scalar.
    Wide,
    /// Big-endian byte buffer of at most this many bytes.
    Big(u16),
}

fn parse_width(digits: &str, default: u16) -> Option<u16> {
    if digits.is_empty() {
        return Some(default);
    }
    let width: u16 = digits.parse().ok()?;
    (width % 8 == 0 && (8..=256).contains(&width)).then_some(width)
}

impl Primitive {
    /// Parse a primitive type name. Returns `None` for anything else.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "bool" => return Some(Primitive::Bool),
            "float" => return Some(Primitive::Float),
            "address" => return Some(Primitive::Address),
            "bytes" => return Some(Primitive::Bytes),
            "hex" => return Some(Primitive::Hex),
            "string" => return Some(Primitive::String),
            "any" => return Some(Primitive::Any),
            _ => {}
        }
        if let Some(digits) = name.strip_prefix("uint") {
            return parse_width(digits, 256).map(Primitive::Uint);
        }
        if let Some(digits) = name.strip_prefix("int") {
            return parse_width(digits, 256).map(Primitive::Int);
        }
        if let Some(digits) = name.strip_prefix("bytes") {
            let n: u16 = digits.parse().ok()?;
            return (1..=32).contains(&n).then_some(Primitive::FixedBytes(n));
        }
        None
    }

    /// Canonical type name.
    pub fn name(&self) -> String {
        match self {
            Primitive::Bool => "bool".to_string(),
            Primitive::Uint(n) => format!("uint{n}"),
            Primitive::Int(n) => format!("int{n}"),
            Primitive::Float => "float".to_string(),
            Primitive::Address => "address".to_string(),
            Primitive::FixedBytes(n) => format!("bytes{n}"),
            Primitive::Bytes => "bytes".to_string(),
            Primitive::Hex => "hex".to_string(),
            Primitive::String => "string".to_string(),
            Primitive::Any => "any".to_string(),
        }
    }

    /// Integer representation, `None` for non-integers.
    pub fn int_repr(&self) -> Option<IntRepr> {
        let width = match self {
            Primitive::Uint(n) | Primitive::Int(n) => *n,
            _ => return None,
        };
        Some(match width {
            0..=32 => IntRepr::Narrow,
            33..=64 => IntRepr::Wide,
            n => IntRepr::Big(n / 8),
        })
    }

    /// Native type.
    pub fn c_type(&self) -> CType {
        match (self, self.int_repr()) {
            (Primitive::Uint(_), Some(IntRepr::Narrow)) => CType::U32,
            (Primitive::Int(_), Some(IntRepr::Narrow)) => CType::I32,
            (Primitive::Uint(_), Some(IntRepr::Wide)) => CType::U64,
            (Primitive::Int(_), Some(IntRepr::Wide)) => CType::I64,
            (
                Primitive::Uint(_)
                | Primitive::Int(_)
                | Primitive::FixedBytes(_)
                | Primitive::Bytes
                | Primitive::Hex,
                _,
            ) => CType::Bytes,
            (Primitive::Bool, _) => CType::Bool,
            (Primitive::Float, _) => CType::Double,
            (Primitive::Address, _) => CType::Address,
            (Primitive::String, _) => CType::Str,
            (Primitive::Any, _) => CType::Json,
        }
    }

    /// Swift type name; `any` has none.
    pub fn swift_type(&self) -> Option<&'static str> {
        match (self, self.int_repr()) {
            (Primitive::Uint(_), Some(IntRepr::Narrow)) => Some("UInt32"),
            (Primitive::Int(_), Some(IntRepr::Narrow)) => Some("Int32"),
            (Primitive::Uint(_), Some(IntRepr::Wide)) => Some("UInt64"),
            (Primitive::Int(_), Some(IntRepr::Wide)) => Some("Int64"),
            (Primitive::Bool, _) => Some("Bool"),
            (Primitive::Float, _) => Some("Double"),
            (Primitive::Any, _) => None,
            _ => Some("String"),
        }
    }

    /// Sample JSON value used when synthesizing documentation.
    pub fn sample(&self) -> Value {
        match (self, self.int_repr()) {
            (Primitive::Bool, _) => Value::Bool(true),
            (Primitive::Float, _) => serde_json::json!(1.5),
            (_, Some(IntRepr::Narrow | IntRepr::Wide)) => serde_json::json!(1),
            (_, Some(IntRepr::Big(_))) => Value::String("0x1".into()),
            (Primitive::Address, _) => Value::String(format!("0x{}", "ab".repeat(20))),
            (Primitive::FixedBytes(n), _) => {
                Value::String(format!("0x{}", "00".repeat(usize::from(*n))))
            }
            (Primitive::Bytes | Primitive::Hex, _) => Value::String("0x1234".into()),
            (Primitive::String, _) => Value::String("text".into()),
            _ => Value::Null,
        }
    }

    /// Statements parsing JSON expression `src` into lvalue `dst`.
    ///
    /// `what` names the value in error messages, e.g. `param 'block'` or
    /// `field 'to' in Tx`.
    pub fn parse_stmts(&self, field: &ResolvedField, src: &str, dst: &str, what: &str) -> Vec<CStmt> {
        let expect = |ty: &str| format!("{what}: expected {ty}");
        let call = match (self, self.int_repr()) {
            (Primitive::Bool, _) => format!("json_as_bool({src}, &{dst})"),
            (Primitive::Uint(_), Some(IntRepr::Narrow)) => format!("json_as_u32({src}, &{dst})"),
            (Primitive::Int(_), Some(IntRepr::Narrow)) => format!("json_as_i32({src}, &{dst})"),
            (Primitive::Uint(_), Some(IntRepr::Wide)) => format!("json_as_u64({src}, &{dst})"),
            (Primitive::Int(_), Some(IntRepr::Wide)) => format!("json_as_i64({src}, &{dst})"),
            (Primitive::Uint(_), Some(IntRepr::Big(max))) => {
                format!("json_as_bigint(ctx, {src}, &{dst}, {max}, false)")
            }
            (Primitive::Int(_), Some(IntRepr::Big(max))) => {
                format!("json_as_bigint(ctx, {src}, &{dst}, {max}, true)")
            }
            (Primitive::Float, _) => format!("json_as_double({src}, &{dst})"),
            (Primitive::Address, _) => format!("json_as_address({src}, {dst})"),
            (Primitive::FixedBytes(_) | Primitive::Hex, _) => {
                format!("json_as_bytes(ctx, {src}, &{dst}, RPC_ENC_HEX)")
            }
            (Primitive::Bytes, _) => format!(
                "json_as_bytes(ctx, {src}, &{dst}, {})",
                encoding_const(field.encoding)
            ),
            (Primitive::String, _) => format!("json_as_string({src}, &{dst})"),
            (Primitive::Any, _) => return vec![CStmt::Expr(format!("{dst} = {src}"))],
            (Primitive::Uint(_) | Primitive::Int(_), None) => return Vec::new(),
        };
        vec![CStmt::throw_if(format!("!{call}"), expect(&self.name()))]
    }

    /// Validation statements for an already-parsed element in `dst`.
    ///
    /// Length bounds are left to [`length_checks`] when the field is an array.
    pub fn validation_stmts(&self, field: &ResolvedField, dst: &str, what: &str) -> Vec<CStmt> {
        let mut out = Vec::new();
        match (self, self.int_repr()) {
            (Primitive::Uint(n), Some(IntRepr::Narrow)) if *n < 32 => {
                let max = (1u64 << n) - 1;
                out.push(CStmt::throw_if(
                    format!("{dst} > {max}U"),
                    format!("{what}: exceeds uint{n}"),
                ));
            }
            (Primitive::Uint(n), Some(IntRepr::Wide)) if *n < 64 => {
                let max = (1u64 << n) - 1;
                out.push(CStmt::throw_if(
                    format!("{dst} > {max}ULL"),
                    format!("{what}: exceeds uint{n}"),
                ));
            }
            (Primitive::Int(n), Some(repr @ (IntRepr::Narrow | IntRepr::Wide)))
                if (repr == IntRepr::Narrow && *n < 32) || (repr == IntRepr::Wide && *n < 64) =>
            {
                let max = (1i64 << (n - 1)) - 1;
                let suffix = if repr == IntRepr::Wide { "LL" } else { "" };
                out.push(CStmt::throw_if(
                    format!("{dst} < -{max}{suffix} - 1 || {dst} > {max}{suffix}"),
                    format!("{what}: out of range for int{n}"),
                ));
            }
            (Primitive::Uint(n) | Primitive::Int(n), Some(IntRepr::Big(max))) => {
                out.push(CStmt::throw_if(
                    format!("{dst}.len > {max}"),
                    format!("{what}: exceeds {n} bits"),
                ));
            }
            (Primitive::FixedBytes(n), _) => {
                out.push(CStmt::throw_if(
                    format!("{dst}.len != {n}"),
                    format!("{what}: must be exactly {n} bytes"),
                ));
            }
            (Primitive::Bytes | Primitive::Hex, _) if !field.array => {
                out.extend(length_checks(&format!("{dst}.len"), field, what));
            }
            (Primitive::String, _) => {
                if !field.array {
                    out.extend(length_checks(&format!("strlen({dst})"), field, what));
                }
                if let Some(values) = &field.enum_values
                    && !values.is_empty()
                {
                    let cond = values
                        .iter()
                        .map(|v| format!("strcmp({dst}, {}) != 0", c_str(v)))
                        .collect::<Vec<_>>()
                        .join(" && ");
                    out.push(CStmt::throw_if(
                        cond,
                        format!("{what}: must be one of {}", values.join(", ")),
                    ));
                }
                if field.format.as_deref() == Some("url") {
                    out.push(CStmt::throw_if(
                        format!("!rpc_is_url({dst})"),
                        format!("{what}: must be a URL"),
                    ));
                }
            }
            _ => {}
        }
        out
    }

    /// Statements assigning the declared `default` to `dst`, if one is usable.
    pub fn default_stmts(&self, default: &Value, dst: &str) -> Option<Vec<CStmt>> {
        let assign = |expr: String| Some(vec![CStmt::Expr(format!("{dst} = {expr}"))]);
        match (self, self.int_repr(), default) {
            (Primitive::Bool, _, Value::Bool(b)) => assign(b.to_string()),
            (_, Some(IntRepr::Narrow | IntRepr::Wide), Value::Number(n)) => assign(n.to_string()),
            (_, Some(IntRepr::Big(_)), Value::Number(n)) => {
                assign(format!("bytes_from_uint(ctx, {n}ULL)"))
            }
            (_, Some(IntRepr::Big(_)), Value::String(s)) => {
                assign(format!("bytes_from_hex(ctx, {})", c_str(s)))
            }
            (Primitive::Float, _, Value::Number(n)) => assign(n.to_string()),
            (Primitive::String, _, Value::String(s)) => assign(c_str(s)),
            (Primitive::FixedBytes(_) | Primitive::Bytes | Primitive::Hex, _, Value::String(s)) => {
                assign(format!("bytes_from_hex(ctx, {})", c_str(s)))
            }
            (Primitive::Address, _, Value::String(s)) => Some(vec![CStmt::Expr(format!(
                "hex_to_address({}, {dst})",
                c_str(s)
            ))]),
            (Primitive::Any, _, v) => assign(format!("json_parse(ctx, {})", c_str(&v.to_string()))),
            _ => None,
        }
    }
}

/// `minLength`/`maxLength` checks against a length expression.
pub fn length_checks(len: &str, field: &ResolvedField, what: &str) -> Vec<CStmt> {
    let mut out = Vec::new();
    if let Some(min) = field.min_length {
        out.push(CStmt::throw_if(
            format!("{len} < {min}"),
            format!("{what}: shorter than {min}"),
        ));
    }
    if let Some(max) = field.max_length {
        out.push(CStmt::throw_if(
            format!("{len} > {max}"),
            format!("{what}: longer than {max}"),
        ));
    }
    out
}

fn encoding_const(encoding: Option<Encoding>) -> &'static str {
    match encoding {
        None | Some(Encoding::Hex) => "RPC_ENC_HEX",
        Some(Encoding::Base64) => "RPC_ENC_BASE64",
        Some(Encoding::Utf8) => "RPC_ENC_UTF8",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::registry::FieldKind;

    fn field(prim: Primitive) -> ResolvedField {
        ResolvedField::primitive("value", prim)
    }

    fn emit(stmts: &[CStmt]) -> String {
        stmts.iter().map(|s| s.emit_indented(0)).collect()
    }

    #[test]
    fn test_parse_names() {
        assert_eq!(Primitive::parse("uint32"), Some(Primitive::Uint(32)));
        assert_eq!(Primitive::parse("int8"), Some(Primitive::Int(8)));
        assert_eq!(Primitive::parse("uint"), Some(Primitive::Uint(256)));
        assert_eq!(Primitive::parse("bytes32"), Some(Primitive::FixedBytes(32)));
        assert_eq!(Primitive::parse("bytes"), Some(Primitive::Bytes));
        assert_eq!(Primitive::parse("uint7"), None);
        assert_eq!(Primitive::parse("uint512"), None);
        assert_eq!(Primitive::parse("bytes33"), None);
        assert_eq!(Primitive::parse("Tx"), None);
    }

    #[test]
    fn test_width_boundaries() {
        assert_eq!(Primitive::Uint(32).c_type(), CType::U32);
        assert_eq!(Primitive::Uint(64).c_type(), CType::U64);
        assert_eq!(Primitive::Uint(256).c_type(), CType::Bytes);
        assert_eq!(Primitive::Int(40).c_type(), CType::I64);
        assert_eq!(Primitive::Uint(72).int_repr(), Some(IntRepr::Big(9)));
    }

    #[test]
    fn test_uint32_parses_on_32_bit_path() {
        let out = emit(&Primitive::Uint(32).parse_stmts(&field(Primitive::Uint(32)), "v", "x", "param 'x'"));
        assert!(out.contains("json_as_u32(v, &x)"));
        assert!(Primitive::Uint(32).validation_stmts(&field(Primitive::Uint(32)), "x", "p").is_empty());
    }

    #[test]
    fn test_uint64_parses_on_64_bit_path() {
        let out = emit(&Primitive::Uint(64).parse_stmts(&field(Primitive::Uint(64)), "v", "x", "p"));
        assert!(out.contains("json_as_u64(v, &x)"));
    }

    #[test]
    fn test_uint256_parses_on_raw_bytes_path() {
        let f = field(Primitive::Uint(256));
        let out = emit(&Primitive::Uint(256).parse_stmts(&f, "v", "x", "p"));
        assert!(out.contains("json_as_bigint(ctx, v, &x, 32, false)"));
        let checks = emit(&Primitive::Uint(256).validation_stmts(&f, "x", "p"));
        assert!(checks.contains("x.len > 32"));
    }

    #[test]
    fn test_narrow_range_checks() {
        let checks = emit(&Primitive::Uint(8).validation_stmts(&field(Primitive::Uint(8)), "x", "p"));
        assert!(checks.contains("x > 255U"));
        let checks = emit(&Primitive::Int(16).validation_stmts(&field(Primitive::Int(16)), "x", "p"));
        assert!(checks.contains("x < -32767 - 1 || x > 32767"));
        let checks = emit(&Primitive::Uint(48).validation_stmts(&field(Primitive::Uint(48)), "x", "p"));
        assert!(checks.contains("x > 281474976710655ULL"));
    }

    #[test]
    fn test_fixed_bytes_exact_length() {
        let f = field(Primitive::FixedBytes(32));
        let checks = emit(&Primitive::FixedBytes(32).validation_stmts(&f, "x", "param 'hash'"));
        assert!(checks.contains("x.len != 32"));
        assert!(checks.contains("must be exactly 32 bytes"));
    }

    #[test]
    fn test_string_constraints() {
        let mut f = field(Primitive::String);
        f.min_length = Some(1);
        f.enum_values = Some(vec!["latest".into(), "pending".into()]);
        f.format = Some("url".into());
        let checks = emit(&Primitive::String.validation_stmts(&f, "x", "p"));
        assert!(checks.contains("strlen(x) < 1"));
        assert!(checks.contains("strcmp(x, \"latest\") != 0 && strcmp(x, \"pending\") != 0"));
        assert!(checks.contains("rpc_is_url(x)"));
    }

    #[test]
    fn test_array_skips_element_length_checks() {
        let mut f = field(Primitive::Bytes);
        f.array = true;
        f.max_length = Some(4);
        assert!(Primitive::Bytes.validation_stmts(&f, "x", "p").is_empty());
        assert_eq!(length_checks("x_len", &f, "p").len(), 1);
    }

    #[test]
    fn test_defaults() {
        let out = emit(&Primitive::Uint(32).default_stmts(&serde_json::json!(7), "x").unwrap());
        assert_eq!(out, "x = 7;\n");
        let out = emit(&Primitive::String.default_stmts(&serde_json::json!("send"), "x").unwrap());
        assert_eq!(out, "x = \"send\";\n");
        assert!(Primitive::Bool.default_stmts(&serde_json::json!("nope"), "x").is_none());
    }

    #[test]
    fn test_swift_types() {
        assert_eq!(Primitive::Uint(32).swift_type(), Some("UInt32"));
        assert_eq!(Primitive::Uint(256).swift_type(), Some("String"));
        assert_eq!(Primitive::Any.swift_type(), None);
        assert!(matches!(field(Primitive::Bool).kind, FieldKind::Primitive(Primitive::Bool)));
    }
}
