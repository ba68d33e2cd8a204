use crate::metric::{FieldValue, Metric};
use bytes::{BufMut, BytesMut};
use shim_error::{Result, ShimError};
use std::fmt::Write;
use tokio_util::codec::Encoder;

/// Encoder for the textual line protocol:
///
/// `measurement[,tag=value...] field=value[,field=value...] timestamp\n`
///
/// A metric is validated completely before any byte reaches the destination
/// buffer, so a rejected metric never leaves a partial line behind.
#[derive(Debug, Default, Clone, Copy)]
pub struct LineProtocol;

impl LineProtocol {
    fn validate(metric: &Metric) -> Result<()> {
        let reject = |reason: &str| Err(ShimError::encoding(metric.name(), reason));

        if metric.name().is_empty() {
            return reject("empty measurement name");
        }
        if metric.fields().is_empty() {
            return reject("metric has no fields");
        }
        if metric.tags().keys().any(|k| k.is_empty()) {
            return reject("empty tag key");
        }
        for (key, value) in metric.fields() {
            if key.is_empty() {
                return reject("empty field key");
            }
            if let FieldValue::Float(f) = value {
                if !f.is_finite() {
                    return Err(ShimError::encoding(
                        metric.name(),
                        format!("field '{}' is not a finite number", key),
                    ));
                }
            }
        }
        Ok(())
    }
}

impl<'a> Encoder<&'a Metric> for LineProtocol {
    type Error = ShimError;

    fn encode(&mut self, metric: &'a Metric, dst: &mut BytesMut) -> Result<()> {
        Self::validate(metric)?;

        escape(dst, metric.name(), &[',', ' ']);

        for (key, value) in metric.tags() {
            if value.is_empty() {
                continue;
            }
            dst.put_u8(b',');
            escape(dst, key, KEY_SPECIALS);
            dst.put_u8(b'=');
            escape(dst, value, KEY_SPECIALS);
        }

        let mut sep = b' ';
        for (key, value) in metric.fields() {
            dst.put_u8(sep);
            sep = b',';

            escape(dst, key, KEY_SPECIALS);
            dst.put_u8(b'=');
            encode_value(dst, value);
        }

        let mut buf = itoa::Buffer::new();
        dst.put_u8(b' ');
        dst.put_slice(buf.format(metric.timestamp_nanos()).as_bytes());
        dst.put_u8(b'\n');

        Ok(())
    }
}

const KEY_SPECIALS: &[char] = &[',', '=', ' '];

fn escape(dst: &mut BytesMut, s: &str, specials: &[char]) {
    for c in s.chars() {
        match c {
            '\n' => dst.put_slice(b"\\n"),
            '\r' => dst.put_slice(b"\\r"),
            '\t' => dst.put_slice(b"\\t"),
            c if specials.contains(&c) => {
                dst.put_u8(b'\\');
                dst.put_u8(c as u8);
            }
            c => {
                let mut tmp = [0u8; 4];
                dst.put_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
}

fn encode_value(dst: &mut BytesMut, value: &FieldValue) {
    let mut buf = itoa::Buffer::new();

    match value {
        FieldValue::Int(v) => {
            dst.put_slice(buf.format(*v).as_bytes());
            dst.put_u8(b'i');
        }
        FieldValue::UInt(v) => {
            dst.put_slice(buf.format(*v).as_bytes());
            dst.put_u8(b'u');
        }
        FieldValue::Float(v) => {
            // BytesMut's fmt::Write impl never fails
            let _ = write!(dst, "{}", v);
        }
        FieldValue::Bool(v) => {
            dst.put_slice(if *v { b"true" } else { b"false" });
        }
        FieldValue::Str(v) => {
            dst.put_u8(b'"');
            escape(dst, v, &['"', '\\']);
            dst.put_u8(b'"');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(metric: &Metric) -> Result<String> {
        let mut dst = BytesMut::new();
        LineProtocol.encode(metric, &mut dst)?;
        Ok(String::from_utf8(dst.to_vec()).unwrap())
    }

    #[test]
    fn test_simple_line() {
        let metric = Metric::new("measurement")
            .tag("tag", "tag")
            .field("field", 1i64)
            .timestamp(1234000005678);

        assert_eq!(
            encode(&metric).unwrap(),
            "measurement,tag=tag field=1i 1234000005678\n"
        );
    }

    #[test]
    fn test_all_field_types_sorted() {
        let metric = Metric::new("m")
            .field("s", "hello")
            .field("f", 0.5)
            .field("b", true)
            .field("u", 7u64)
            .field("i", -3i64)
            .timestamp(1);

        assert_eq!(
            encode(&metric).unwrap(),
            "m b=true,f=0.5,i=-3i,s=\"hello\",u=7u 1\n"
        );
    }

    #[test]
    fn test_escaping() {
        let metric = Metric::new("cpu load,x")
            .tag("host name", "a=b,c")
            .field("msg", "say \"hi\" \\o/")
            .field("a,b", 1.0)
            .timestamp(0);

        assert_eq!(
            encode(&metric).unwrap(),
            "cpu\\ load\\,x,host\\ name=a\\=b\\,c a\\,b=1,msg=\"say \\\"hi\\\" \\\\o/\" 0\n"
        );
    }

    #[test]
    fn test_newlines_stay_on_one_line() {
        let metric = Metric::new("m").field("s", "a\nb").timestamp(0);
        let line = encode(&metric).unwrap();
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(line, "m s=\"a\\nb\" 0\n");
    }

    #[test]
    fn test_empty_tag_values_skipped() {
        let metric = Metric::new("m")
            .tag("empty", "")
            .tag("k", "v")
            .field("x", 1i64)
            .timestamp(0);
        assert_eq!(encode(&metric).unwrap(), "m,k=v x=1i 0\n");
    }

    #[test]
    fn test_rejected_metrics_leave_no_bytes() {
        let cases = [
            Metric::new("m").timestamp(0),
            Metric::new("").field("x", 1i64),
            Metric::new("m").field("x", f64::NAN),
            Metric::new("m").field("x", f64::INFINITY),
            Metric::new("m").tag("", "v").field("x", 1i64),
        ];

        for metric in cases {
            let mut dst = BytesMut::new();
            let err = LineProtocol.encode(&metric, &mut dst).unwrap_err();
            assert!(matches!(err, ShimError::Encoding { .. }), "{:?}", err);
            assert!(dst.is_empty());
        }
    }
}
