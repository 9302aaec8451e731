//! External Term Format encode/decode for the subset of terms the client's
//! erlpack codec produces and consumes.
//!
//! The mapping follows erlpack rather than the full Erlang term space:
//! strings are binaries, object keys are binaries, booleans and null are the
//! small atoms `true`/`false`/`nil`, arrays are proper lists (empty array is
//! a bare NIL), and objects are maps. Anything outside that subset on the
//! inbound side is a decode error, which the session turns into a 4002 close.

use serde_json::{Map, Number, Value};

pub const FORMAT_VERSION: u8 = 131;

const NEW_FLOAT_EXT: u8 = 70;
const SMALL_INTEGER_EXT: u8 = 97;
const INTEGER_EXT: u8 = 98;
const ATOM_EXT: u8 = 100;
const NIL_EXT: u8 = 106;
const STRING_EXT: u8 = 107;
const LIST_EXT: u8 = 108;
const BINARY_EXT: u8 = 109;
const SMALL_BIG_EXT: u8 = 110;
const SMALL_ATOM_EXT: u8 = 115;
const MAP_EXT: u8 = 116;
const ATOM_UTF8_EXT: u8 = 118;
const SMALL_ATOM_UTF8_EXT: u8 = 119;

#[derive(Debug, thiserror::Error)]
pub enum EtfError {
    #[error("truncated term")]
    Truncated,
    #[error("unsupported format version {0}")]
    BadVersion(u8),
    #[error("unsupported term tag {0}")]
    UnsupportedTag(u8),
    #[error("big integer does not fit in 64 bits")]
    BigIntOverflow,
    #[error("binary is not valid UTF-8")]
    InvalidUtf8,
    #[error("map key is not a string-like term")]
    InvalidKey,
    #[error("improper list tail")]
    ImproperList,
}

/// Serializes a JSON value to a versioned external term.
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.push(FORMAT_VERSION);
    encode_term(value, &mut out);
    out
}

fn encode_term(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => encode_atom("nil", out),
        Value::Bool(true) => encode_atom("true", out),
        Value::Bool(false) => encode_atom("false", out),
        Value::Number(n) => encode_number(n, out),
        Value::String(s) => encode_binary(s.as_bytes(), out),
        Value::Array(items) => encode_list(items, out),
        Value::Object(map) => encode_map(map, out),
    }
}

fn encode_atom(name: &str, out: &mut Vec<u8>) {
    out.push(SMALL_ATOM_EXT);
    out.push(name.len() as u8);
    out.extend_from_slice(name.as_bytes());
}

fn encode_binary(bytes: &[u8], out: &mut Vec<u8>) {
    out.push(BINARY_EXT);
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn encode_number(n: &Number, out: &mut Vec<u8>) {
    if let Some(u) = n.as_u64() {
        if u <= u8::MAX as u64 {
            out.push(SMALL_INTEGER_EXT);
            out.push(u as u8);
        } else if u <= i32::MAX as u64 {
            out.push(INTEGER_EXT);
            out.extend_from_slice(&(u as i32).to_be_bytes());
        } else {
            encode_small_big(u, false, out);
        }
    } else if let Some(i) = n.as_i64() {
        if i >= i32::MIN as i64 {
            out.push(INTEGER_EXT);
            out.extend_from_slice(&(i as i32).to_be_bytes());
        } else {
            encode_small_big(i.unsigned_abs(), true, out);
        }
    } else {
        out.push(NEW_FLOAT_EXT);
        out.extend_from_slice(&n.as_f64().unwrap_or(0.0).to_bits().to_be_bytes());
    }
}

fn encode_small_big(magnitude: u64, negative: bool, out: &mut Vec<u8>) {
    let bytes = magnitude.to_le_bytes();
    let len = bytes.iter().rposition(|&b| b != 0).map_or(1, |p| p + 1);
    out.push(SMALL_BIG_EXT);
    out.push(len as u8);
    out.push(u8::from(negative));
    out.extend_from_slice(&bytes[..len]);
}

fn encode_list(items: &[Value], out: &mut Vec<u8>) {
    if items.is_empty() {
        out.push(NIL_EXT);
        return;
    }
    out.push(LIST_EXT);
    out.extend_from_slice(&(items.len() as u32).to_be_bytes());
    for item in items {
        encode_term(item, out);
    }
    out.push(NIL_EXT);
}

fn encode_map(map: &Map<String, Value>, out: &mut Vec<u8>) {
    out.push(MAP_EXT);
    out.extend_from_slice(&(map.len() as u32).to_be_bytes());
    for (key, value) in map {
        encode_binary(key.as_bytes(), out);
        encode_term(value, out);
    }
}

/// Parses a versioned external term into a JSON value.
pub fn decode(raw: &[u8]) -> Result<Value, EtfError> {
    let mut reader = Reader { buf: raw, pos: 0 };
    if reader.u8()? != FORMAT_VERSION {
        return Err(EtfError::BadVersion(raw[0]));
    }
    let value = decode_term(&mut reader)?;
    Ok(value)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], EtfError> {
        let end = self.pos.checked_add(n).ok_or(EtfError::Truncated)?;
        if end > self.buf.len() {
            return Err(EtfError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, EtfError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, EtfError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, EtfError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn decode_term(r: &mut Reader<'_>) -> Result<Value, EtfError> {
    match r.u8()? {
        SMALL_INTEGER_EXT => Ok(Value::from(r.u8()?)),
        INTEGER_EXT => {
            let b = r.take(4)?;
            Ok(Value::from(i32::from_be_bytes([b[0], b[1], b[2], b[3]])))
        }
        NEW_FLOAT_EXT => {
            let b = r.take(8)?;
            let mut bits = [0u8; 8];
            bits.copy_from_slice(b);
            Ok(Value::from(f64::from_bits(u64::from_be_bytes(bits))))
        }
        SMALL_BIG_EXT => {
            let len = r.u8()? as usize;
            let sign = r.u8()?;
            decode_big(r.take(len)?, sign != 0)
        }
        ATOM_EXT | ATOM_UTF8_EXT => {
            let len = r.u16()? as usize;
            atom_value(r.take(len)?)
        }
        SMALL_ATOM_EXT | SMALL_ATOM_UTF8_EXT => {
            let len = r.u8()? as usize;
            atom_value(r.take(len)?)
        }
        BINARY_EXT => {
            let len = r.u32()? as usize;
            let bytes = r.take(len)?;
            let s = std::str::from_utf8(bytes).map_err(|_| EtfError::InvalidUtf8)?;
            Ok(Value::from(s))
        }
        NIL_EXT => Ok(Value::Array(Vec::new())),
        STRING_EXT => {
            // A byte list; erlpack can produce this for arrays of small ints.
            let len = r.u16()? as usize;
            let bytes = r.take(len)?;
            Ok(Value::Array(bytes.iter().map(|&b| Value::from(b)).collect()))
        }
        LIST_EXT => {
            let count = r.u32()? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(decode_term(r)?);
            }
            if r.u8()? != NIL_EXT {
                return Err(EtfError::ImproperList);
            }
            Ok(Value::Array(items))
        }
        MAP_EXT => {
            let count = r.u32()? as usize;
            let mut map = Map::with_capacity(count);
            for _ in 0..count {
                let key = decode_key(r)?;
                let value = decode_term(r)?;
                map.insert(key, value);
            }
            Ok(Value::Object(map))
        }
        tag => Err(EtfError::UnsupportedTag(tag)),
    }
}

fn decode_big(digits: &[u8], negative: bool) -> Result<Value, EtfError> {
    if digits.len() > 8 {
        return Err(EtfError::BigIntOverflow);
    }
    let mut magnitude: u64 = 0;
    for (i, &b) in digits.iter().enumerate() {
        magnitude |= (b as u64) << (8 * i);
    }
    if negative {
        let n = i64::try_from(magnitude)
            .map(|v| -v)
            .map_err(|_| EtfError::BigIntOverflow)?;
        Ok(Value::from(n))
    } else {
        Ok(Value::from(magnitude))
    }
}

fn atom_value(bytes: &[u8]) -> Result<Value, EtfError> {
    let name = std::str::from_utf8(bytes).map_err(|_| EtfError::InvalidUtf8)?;
    Ok(match name {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "nil" | "null" => Value::Null,
        other => Value::from(other),
    })
}

fn decode_key(r: &mut Reader<'_>) -> Result<String, EtfError> {
    match decode_term(r)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok("nil".to_string()),
        _ => Err(EtfError::InvalidKey),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_is_bit_exact_for_ack_frame() {
        // serde_json maps iterate in key order, so the layout is stable:
        // {"d": nil, "op": 11}
        let encoded = encode(&json!({ "op": 11, "d": null }));
        let expected = vec![
            131, 116, 0, 0, 0, 2, // version, map of 2
            109, 0, 0, 0, 1, b'd', // "d"
            115, 3, b'n', b'i', b'l', // nil
            109, 0, 0, 0, 2, b'o', b'p', // "op"
            97, 11, // 11
        ];
        assert_eq!(encoded, expected);
    }

    #[test]
    fn test_encode_empty_array_is_nil() {
        assert_eq!(encode(&json!([])), vec![131, 106]);
    }

    #[test]
    fn test_encode_list_has_nil_tail() {
        let encoded = encode(&json!([1]));
        assert_eq!(encoded, vec![131, 108, 0, 0, 0, 1, 97, 1, 106]);
    }

    #[test]
    fn test_integer_width_selection() {
        assert_eq!(encode(&json!(255))[1], SMALL_INTEGER_EXT);
        assert_eq!(encode(&json!(256))[1], INTEGER_EXT);
        assert_eq!(encode(&json!(-5))[1], INTEGER_EXT);
        assert_eq!(encode(&json!(u64::from(u32::MAX) << 10))[1], SMALL_BIG_EXT);
        assert_eq!(encode(&json!(1.5))[1], NEW_FLOAT_EXT);
    }

    #[test]
    fn test_decode_rejects_bad_version() {
        assert!(matches!(decode(&[130, 106]), Err(EtfError::BadVersion(130))));
    }

    #[test]
    fn test_decode_identify_shape() {
        // The client packs strings as binaries and booleans as atoms.
        let frame = encode(&json!({
            "op": 2,
            "d": { "token": "powerunit", "compress": false }
        }));
        let decoded = decode(&frame).unwrap();
        assert_eq!(decoded["op"], 2);
        assert_eq!(decoded["d"]["token"], "powerunit");
        assert_eq!(decoded["d"]["compress"], false);
    }

    #[test]
    fn test_decode_utf8_atom_tags() {
        // SMALL_ATOM_UTF8 "true"
        let raw = [131, 119, 4, b't', b'r', b'u', b'e'];
        assert_eq!(decode(&raw).unwrap(), Value::Bool(true));
        // ATOM_EXT "nil"
        let raw = [131, 100, 0, 3, b'n', b'i', b'l'];
        assert_eq!(decode(&raw).unwrap(), Value::Null);
    }

    #[test]
    fn test_decode_big_integers() {
        let id: u64 = 539_465_812_421_836_800;
        let decoded = decode(&encode(&json!(id))).unwrap();
        assert_eq!(decoded.as_u64(), Some(id));

        let neg: i64 = i32::MIN as i64 - 1;
        let decoded = decode(&encode(&json!(neg))).unwrap();
        assert_eq!(decoded.as_i64(), Some(neg));
    }

    #[test]
    fn test_decode_truncated_is_error() {
        let mut frame = encode(&json!({ "op": 1, "d": 42 }));
        frame.truncate(frame.len() - 1);
        assert!(decode(&frame).is_err());
    }

    #[test]
    fn test_decode_string_ext_as_byte_list() {
        let raw = [131, 107, 0, 2, 1, 2];
        assert_eq!(decode(&raw).unwrap(), json!([1, 2]));
    }
}
