//! Input parsing and output formatting.
//!
//! Text input is a sequence of integers separated by whitespace or line breaks, JSON input is an array of
//! integers. Both are read token by token: JSON input is not validated as a document, commas and brackets just
//! separate tokens, so a truncated array still yields its complete items. Unparseable tokens are skipped with a
//! warning rather than aborting the sort.

use std::fmt::Display;
use std::io::{self, prelude::*};

use log;
use serde_json;

use crate::Element;

/// Input data format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    /// JSON if the first non-whitespace character is `[`, text otherwise.
    Auto,
    /// JSON array. Integral floats and numeric strings are accepted as items.
    Json,
    /// Whitespace or line delimited integers.
    Text,
}

/// Output data format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JSON array, one element per line.
    Json,
    /// One element per line.
    Lines,
    /// Space separated elements.
    Space,
}

/// Lazy input element stream.
pub type Elements = Box<dyn Iterator<Item = io::Result<Element>>>;

/// Creates an element stream reading the input in the provided format.
pub fn read_input<R: Read + 'static>(reader: R, format: InputFormat) -> io::Result<Elements> {
    let mut reader = io::BufReader::new(reader);

    let format = match format {
        InputFormat::Auto => detect_format(&mut reader)?,
        format => format,
    };
    log::debug!("reading input as {:?}", format);

    return Ok(Box::new(InputElements::new(reader, format == InputFormat::Json)));
}

/// Skips leading whitespace and peeks at the first significant byte.
fn detect_format<R: BufRead>(reader: &mut R) -> io::Result<InputFormat> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(InputFormat::Text);
        }

        match buf.iter().position(|byte| !byte.is_ascii_whitespace()) {
            Some(pos) => {
                let format = if buf[pos] == b'[' {
                    InputFormat::Json
                } else {
                    InputFormat::Text
                };
                reader.consume(pos);
                return Ok(format);
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

/// Tokens longer than this can't be an integer; only their prefix is kept for the warning.
const MAX_TOKEN_LEN: usize = 64;

fn is_separator(byte: u8, json: bool) -> bool {
    byte.is_ascii_whitespace() || (json && matches!(byte, b',' | b'[' | b']'))
}

/// Parses a single token. JSON tokens may also be integral floats (`3.0`) or numeric strings (`"3"`).
fn parse_token(token: &[u8], json: bool) -> Option<Element> {
    if let Some(element) = std::str::from_utf8(token).ok().and_then(|text| text.parse::<Element>().ok()) {
        return Some(element);
    }
    if !json {
        return None;
    }

    return match serde_json::from_slice::<serde_json::Value>(token).ok()? {
        serde_json::Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.fract() == 0.0 && *float >= i64::MIN as f64 && *float < i64::MAX as f64)
                .map(|float| float as Element)
        }),
        serde_json::Value::String(string) => string.trim().parse::<Element>().ok(),
        _ => None,
    };
}

/// Lazily parsed integers. The input is split into tokens directly on the reader's buffer, so memory use does not
/// depend on line length or on the size of a JSON array.
struct InputElements<R: BufRead> {
    reader: R,
    /// JSON mode: `,`, `[` and `]` separate tokens too.
    json: bool,
    /// Current token, at most [`MAX_TOKEN_LEN`] bytes.
    token: Vec<u8>,
    /// The current token is longer than [`MAX_TOKEN_LEN`].
    oversized: bool,
    /// Input offset of the current token.
    token_start: u64,
    /// Number of consumed input bytes.
    consumed: u64,
}

impl<R: BufRead> InputElements<R> {
    fn new(reader: R, json: bool) -> Self {
        InputElements {
            reader,
            json,
            token: Vec::with_capacity(MAX_TOKEN_LEN),
            oversized: false,
            token_start: 0,
            consumed: 0,
        }
    }

    /// Reads the next token. Returns `false` at the end of the input.
    fn next_token(&mut self) -> io::Result<bool> {
        self.token.clear();
        self.oversized = false;
        let json = self.json;

        loop {
            let buf = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            };
            if buf.is_empty() {
                return Ok(!self.token.is_empty());
            }

            let mut used = 0;
            let mut complete = false;
            for &byte in buf {
                used += 1;
                if is_separator(byte, json) {
                    if self.token.is_empty() {
                        continue;
                    }
                    complete = true;
                    break;
                }

                if self.token.is_empty() {
                    self.token_start = self.consumed + used as u64 - 1;
                }
                if self.token.len() < MAX_TOKEN_LEN {
                    self.token.push(byte);
                } else {
                    self.oversized = true;
                }
            }

            self.reader.consume(used);
            self.consumed += used as u64;
            if complete {
                return Ok(true);
            }
        }
    }
}

impl<R: BufRead> Iterator for InputElements<R> {
    type Item = io::Result<Element>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.next_token() {
                Ok(true) => {}
                Ok(false) => return None,
                Err(err) => return Some(Err(err)),
            }

            if self.oversized {
                log::warn!(
                    "skipping oversized token {:?}... at byte {}",
                    String::from_utf8_lossy(&self.token),
                    self.token_start
                );
                continue;
            }

            match parse_token(&self.token, self.json) {
                Some(element) => return Some(Ok(element)),
                None => log::warn!(
                    "skipping invalid token {:?} at byte {}",
                    String::from_utf8_lossy(&self.token),
                    self.token_start
                ),
            }
        }
    }
}

/// Writes sorted elements in the provided format. Returns the number of written elements.
/// The first stream error aborts writing.
pub fn write_output<W, E, I>(writer: &mut W, items: I, format: OutputFormat) -> io::Result<usize>
where
    W: Write,
    E: Display,
    I: IntoIterator<Item = Result<Element, E>>,
{
    let mut count = 0;

    if format == OutputFormat::Json {
        writer.write_all(b"[")?;
    }

    for item in items {
        let item = item.map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))?;

        match format {
            OutputFormat::Json => {
                writer.write_all(if count == 0 { &b"\n  "[..] } else { &b",\n  "[..] })?;
                serde_json::to_writer(&mut *writer, &item)?;
            }
            OutputFormat::Lines => writeln!(writer, "{}", item)?,
            OutputFormat::Space => {
                if count > 0 {
                    writer.write_all(b" ")?;
                }
                write!(writer, "{}", item)?;
            }
        }
        count += 1;
    }

    if format == OutputFormat::Json {
        writer.write_all(if count == 0 { &b"]"[..] } else { &b"\n]"[..] })?;
    }

    return Ok(count);
}

#[cfg(test)]
mod test {
    use std::io::{self, Cursor, Read};

    use rstest::*;

    use super::{read_input, write_output, InputFormat, OutputFormat};

    fn parse(input: &'static str, format: InputFormat) -> Vec<i64> {
        let elements = read_input(Cursor::new(input.as_bytes()), format).unwrap();
        elements.collect::<io::Result<Vec<_>>>().unwrap()
    }

    /// Reader returning at most `step` bytes per call.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..len].copy_from_slice(&self.data[self.pos..self.pos + len]);
            self.pos += len;
            Ok(len)
        }
    }

    #[rstest]
    #[case("5\n3\n8\n", InputFormat::Text, vec![5, 3, 8])]
    #[case("5 3\n\n 8   -1\n", InputFormat::Text, vec![5, 3, 8, -1])]
    #[case("1 two 3\n4.5 6\n", InputFormat::Text, vec![1, 3, 6])]
    #[case("3.0 4", InputFormat::Text, vec![4])]
    #[case("", InputFormat::Text, vec![])]
    #[case("[5, 3, 8]", InputFormat::Json, vec![5, 3, 8])]
    #[case("[1, \"2\", \"x\", null, 3.5, 4]", InputFormat::Json, vec![1, 2, 4])]
    #[case("[3.0, -2.0, 1e3, 7]", InputFormat::Json, vec![3, -2, 1000, 7])]
    #[case("[1e30, 99999999999999999999, 5]", InputFormat::Json, vec![5])]
    #[case("[\n  1,\n  2\n]\n", InputFormat::Json, vec![1, 2])]
    #[case("[1, 2", InputFormat::Json, vec![1, 2])]
    #[case("{\"a\": 1}", InputFormat::Json, vec![])]
    #[case("  \n [9, -9]", InputFormat::Auto, vec![9, -9])]
    #[case("[1, oops, 2", InputFormat::Auto, vec![1, 2])]
    #[case("  9 -9", InputFormat::Auto, vec![9, -9])]
    #[case("", InputFormat::Auto, vec![])]
    fn test_read_input(#[case] input: &'static str, #[case] format: InputFormat, #[case] expected: Vec<i64>) {
        assert_eq!(parse(input, format), expected);
    }

    #[rstest]
    #[case(InputFormat::Text, " ", "", "")]
    #[case(InputFormat::Json, ",", "[", "]")]
    #[case(InputFormat::Auto, ", ", "[", "]")]
    fn test_read_long_line(
        #[case] format: InputFormat,
        #[case] separator: &str,
        #[case] open: &str,
        #[case] close: &str,
    ) {
        let expected = Vec::from_iter(-10_000..10_000);
        let items = Vec::from_iter(expected.iter().map(|item| item.to_string()));
        let input = format!("{}{}{}", open, items.join(separator), close);
        assert!(!input.contains('\n'));

        for step in [3, 1 << 20] {
            let reader = Trickle {
                data: input.clone().into_bytes(),
                pos: 0,
                step,
            };
            let elements = read_input(reader, format).unwrap();
            assert_eq!(elements.collect::<io::Result<Vec<_>>>().unwrap(), expected);
        }
    }

    #[test]
    fn test_oversized_token_skipped() {
        let input = format!("1 {} 2 {}", "7".repeat(10_000), "x".repeat(100));

        let elements = read_input(Cursor::new(input.into_bytes()), InputFormat::Text).unwrap();

        assert_eq!(elements.collect::<io::Result<Vec<_>>>().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_read_error() {
        struct Broken;

        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "broken reader"))
            }
        }

        let mut elements = read_input(Broken, InputFormat::Text).unwrap();

        assert_eq!(elements.next().unwrap().unwrap_err().to_string(), "broken reader");
    }

    #[rstest]
    #[case(OutputFormat::Json, vec![1, 2, 3], "[\n  1,\n  2,\n  3\n]")]
    #[case(OutputFormat::Json, vec![], "[]")]
    #[case(OutputFormat::Lines, vec![-1, 2], "-1\n2\n")]
    #[case(OutputFormat::Space, vec![-1, 2, 3], "-1 2 3")]
    #[case(OutputFormat::Space, vec![], "")]
    fn test_write_output(#[case] format: OutputFormat, #[case] items: Vec<i64>, #[case] expected: &str) {
        let mut output = Vec::new();
        let len = items.len();
        let items = items.into_iter().map(Ok::<_, io::Error>);

        let count = write_output(&mut output, items, format).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), expected);
        assert_eq!(count, len);
    }

    #[test]
    fn test_write_output_error() {
        let mut output = Vec::new();
        let items = vec![Ok(1), Err(io::Error::new(io::ErrorKind::Other, "broken stream"))];

        let result = write_output(&mut output, items, OutputFormat::Lines);

        assert_eq!(result.unwrap_err().to_string(), "broken stream");
        assert_eq!(output, b"1\n");
    }
}
