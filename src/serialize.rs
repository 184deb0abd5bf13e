//! Serialization stages: values in, JSON text out.

use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::error::{StreamError, StreamResult};
use crate::pipe::{from_transform, Emitter, Pipe, Transform};
use crate::stream_configuration::StringifyOptions;

const JSON_INDENT: usize = 2;

/// Serialize `value` as JSON text, pretty-printed with `indent` spaces per
/// level when given.
pub fn to_json_text<T>(value: &T, indent: Option<usize>) -> StreamResult<String>
where
    T: Serialize + ?Sized,
{
    let Some(width) = indent else {
        return Ok(serde_json::to_string(value)?);
    };

    let pad = " ".repeat(width);
    let mut buf = Vec::new();
    let mut ser =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(pad.as_bytes()));
    value.serialize(&mut ser)?;
    String::from_utf8(buf).map_err(|e| StreamError::Serialization(e.to_string()))
}

struct StringifyStage {
    indent: Option<usize>,
}

impl<T: Serialize> Transform<T, String> for StringifyStage {
    fn transform(&mut self, value: T, out: &mut Emitter<String>) -> StreamResult<()> {
        out.push(to_json_text(&value, self.indent)?);
        Ok(())
    }
}

/// Serialize every value to compact JSON text, one chunk per value.
///
/// Text is produced by serde_json, which writes floating-point numbers with a
/// fraction: `1.0f64` becomes `1.0`, not `1`. Integers are written as is.
pub fn stringify<T>() -> Pipe<T, String>
where
    T: Serialize + Send + 'static,
{
    stringify_with(StringifyOptions::default())
}

/// [`stringify`] with formatting options
pub fn stringify_with<T>(options: StringifyOptions) -> Pipe<T, String>
where
    T: Serialize + Send + 'static,
{
    let indent = options.effective_indent();
    from_transform(move || StringifyStage { indent })
}

struct JsonArrayStage {
    first: bool,
}

impl<T: Serialize> Transform<T, String> for JsonArrayStage {
    fn transform(&mut self, value: T, out: &mut Emitter<String>) -> StreamResult<()> {
        let text = to_json_text(&value, Some(JSON_INDENT))?;
        if self.first {
            self.first = false;
            out.push("[\n".to_string());
            out.push(text);
        } else {
            out.push(format!(", {}", text));
        }
        Ok(())
    }

    fn flush(&mut self, out: &mut Emitter<String>) -> StreamResult<()> {
        if self.first {
            out.push("[\n".to_string());
        }
        out.push("\n]".to_string());
        Ok(())
    }
}

/// Frame the stream as one JSON array document.
///
/// Emits `"[\n"` and the first value, then `", "` before every later value,
/// then `"\n]"` on end. Values are pretty-printed with 2-space indentation.
/// An empty stream produces `"[\n\n]"`.
pub fn json<T>() -> Pipe<T, String>
where
    T: Serialize + Send + 'static,
{
    from_transform(|| JsonArrayStage { first: true })
}
