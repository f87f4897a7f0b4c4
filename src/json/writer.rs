use serde_json::Value;

use crate::error::JoseError;

/// Incremental canonical-JSON object writer over a caller buffer.
///
/// Emits no whitespace. Member order is whatever order the caller makes
/// the `member_*` calls in; the token writers use this to pin the
/// registered header members (`alg`, `enc`, `zip`, `cty`, `typ`, `kid`)
/// ahead of extension members.
pub(crate) struct ObjectWriter<'a> {
    out: &'a mut Vec<u8>,
    first: bool,
}

impl<'a> ObjectWriter<'a> {
    pub fn begin(out: &'a mut Vec<u8>) -> Self {
        out.push(b'{');
        Self { out, first: true }
    }

    fn name(&mut self, name: &str) {
        if !self.first {
            self.out.push(b',');
        }
        self.first = false;
        self.out.push(b'"');
        escape_into(self.out, name);
        self.out.push(b'"');
        self.out.push(b':');
    }

    pub fn member_str(&mut self, name: &str, value: &str) {
        self.name(name);
        self.out.push(b'"');
        escape_into(self.out, value);
        self.out.push(b'"');
    }

    pub fn member_u64(&mut self, name: &str, value: u64) {
        self.name(name);
        self.out.extend_from_slice(value.to_string().as_bytes());
    }

    /// Splices pre-serialized JSON in as the member value.
    pub fn member_raw(&mut self, name: &str, raw: &[u8]) {
        self.name(name);
        self.out.extend_from_slice(raw);
    }

    pub fn member_value(&mut self, name: &str, value: &Value) -> Result<(), JoseError> {
        self.name(name);
        // serde_json emits canonical (whitespace-free) output
        serde_json::to_writer(&mut *self.out, value).map_err(|_| JoseError::MalformedToken)
    }

    pub fn finish(self) {
        self.out.push(b'}');
    }
}

/// JSON string escaping per RFC 8259: quote, backslash, and control
/// characters; everything else passes through as UTF-8.
pub(crate) fn escape_into(out: &mut Vec<u8>, s: &str) {
    for byte in s.bytes() {
        match byte {
            b'"' => out.extend_from_slice(b"\\\""),
            b'\\' => out.extend_from_slice(b"\\\\"),
            0x08 => out.extend_from_slice(b"\\b"),
            0x0C => out.extend_from_slice(b"\\f"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b if b < 0x20 => {
                out.extend_from_slice(format!("\\u{b:04x}").as_bytes());
            }
            b => out.push(b),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn ordered_members() {
        let mut out = Vec::new();
        let mut w = ObjectWriter::begin(&mut out);
        w.member_str("alg", "HS256");
        w.member_str("typ", "JWT");
        w.member_u64("p2c", 4096);
        w.finish();
        assert_eq!(out, br#"{"alg":"HS256","typ":"JWT","p2c":4096}"#);
    }

    #[test]
    fn empty_object() {
        let mut out = Vec::new();
        ObjectWriter::begin(&mut out).finish();
        assert_eq!(out, b"{}");
    }

    #[test]
    fn escaping() {
        let mut out = Vec::new();
        let mut w = ObjectWriter::begin(&mut out);
        w.member_str("x", "a\"b\\c\n\u{1}é");
        w.finish();
        assert_eq!(out, "{\"x\":\"a\\\"b\\\\c\\n\\u0001é\"}".as_bytes());
    }

    #[test]
    fn value_member() {
        let mut out = Vec::new();
        let mut w = ObjectWriter::begin(&mut out);
        w.member_value("aud", &json!(["a", "b"])).unwrap();
        w.member_raw("n", b"42");
        w.finish();
        assert_eq!(out, br#"{"aud":["a","b"],"n":42}"#);
    }

    #[test]
    fn round_trips_through_reader() {
        let mut out = Vec::new();
        let mut w = ObjectWriter::begin(&mut out);
        w.member_str("sub", "al\"ice");
        w.finish();

        let index = super::super::JsonIndex::parse(&out).unwrap();
        let sub = index.member(&out, index.root(), b"sub").unwrap();
        assert_eq!(index.str_value(&out, sub).unwrap(), "al\"ice");
    }
}
