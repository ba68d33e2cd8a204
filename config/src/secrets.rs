//! Environment-variable placeholders in configuration text
//!
//! `$NAME` and `${NAME}` are replaced inside TOML string literals only, so
//! keys, bare values and comments are never touched. Substituted values are
//! escaped for the literal they land in, which makes the decoded string equal
//! to the variable's value byte for byte.

use shim_error::{Result, ShimError};
use std::fmt::Write;

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves secret placeholders before the document is decoded
pub struct SecretResolver {
    lookup: Lookup,
}

impl Default for SecretResolver {
    fn default() -> Self {
        Self::from_env()
    }
}

impl SecretResolver {
    /// Resolve against the process environment
    pub fn from_env() -> Self {
        Self::with_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve with a custom variable lookup
    pub fn with_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            lookup: Box::new(lookup),
        }
    }

    /// Substitute every placeholder found in a string value of `text`.
    ///
    /// Quoted keys and quoted table-header segments are keys, not values,
    /// and are left as written.
    pub fn resolve(&self, text: &str) -> Result<String> {
        let bytes = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut state = State::Bare;
        // Arrays and inline tables opened on the value side of a key
        let mut nesting: Vec<u8> = Vec::new();
        let mut expect_value = false;
        let mut copied = 0;
        let mut i = 0;

        while i < bytes.len() {
            match state {
                State::Bare => {
                    let quote = match bytes[i] {
                        b'"' if bytes[i..].starts_with(b"\"\"\"") => Some(Quote::MultiBasic),
                        b'"' => Some(Quote::Basic),
                        b'\'' if bytes[i..].starts_with(b"'''") => Some(Quote::MultiLiteral),
                        b'\'' => Some(Quote::Literal),
                        b'#' => {
                            state = State::Comment;
                            None
                        }
                        b'=' => {
                            expect_value = true;
                            None
                        }
                        b'\n' => {
                            if nesting.is_empty() {
                                expect_value = false;
                            }
                            None
                        }
                        b @ (b'[' | b'{') => {
                            // Outside a value `[` opens a table header
                            if expect_value || nesting.last() == Some(&b'[') {
                                nesting.push(b);
                                expect_value = false;
                            }
                            None
                        }
                        b']' | b'}' => {
                            nesting.pop();
                            None
                        }
                        b',' => {
                            if nesting.last() == Some(&b'{') {
                                expect_value = false;
                            }
                            None
                        }
                        _ => None,
                    };

                    match quote {
                        Some(quote) => {
                            let is_value = expect_value || nesting.last() == Some(&b'[');
                            state = State::Quoted(quote, is_value);
                            i += quote.delimiter().len();
                        }
                        None => i += 1,
                    }
                }
                State::Comment => {
                    // The newline itself is handled as bare text
                    if bytes[i] == b'\n' {
                        state = State::Bare;
                    } else {
                        i += 1;
                    }
                }
                State::Quoted(quote, is_value) => match bytes[i] {
                    b'\\' if quote.has_escapes() => {
                        // Keep the escape pair verbatim
                        let escaped = text[i + 1..].chars().next().map_or(0, char::len_utf8);
                        i += 1 + escaped;
                    }
                    b'$' if is_value => match placeholder(&text[i..]) {
                        Some((name, len)) => {
                            let value = (self.lookup)(name).ok_or_else(|| {
                                ShimError::configuration(format!(
                                    "environment variable '{}' is not set",
                                    name
                                ))
                            })?;

                            out.push_str(&text[copied..i]);
                            quote.push_escaped(&mut out, name, &value)?;
                            i += len;
                            copied = i;
                        }
                        None => i += 1,
                    },
                    _ if bytes[i..].starts_with(quote.delimiter().as_bytes()) => {
                        state = State::Bare;
                        i += quote.delimiter().len();
                    }
                    // An unterminated single-line string; let the decoder
                    // report it
                    b'\n' if !quote.is_multiline() => state = State::Bare,
                    _ => i += 1,
                },
            }
        }

        out.push_str(&text[copied..]);
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Bare,
    Comment,
    /// The flag is set for string values, which are the only strings
    /// placeholders are substituted in
    Quoted(Quote, bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Basic,
    MultiBasic,
    Literal,
    MultiLiteral,
}

impl Quote {
    fn delimiter(self) -> &'static str {
        match self {
            Quote::Basic => "\"",
            Quote::MultiBasic => "\"\"\"",
            Quote::Literal => "'",
            Quote::MultiLiteral => "'''",
        }
    }

    fn has_escapes(self) -> bool {
        matches!(self, Quote::Basic | Quote::MultiBasic)
    }

    fn is_multiline(self) -> bool {
        matches!(self, Quote::MultiBasic | Quote::MultiLiteral)
    }

    fn push_escaped(self, out: &mut String, name: &str, value: &str) -> Result<()> {
        if self.has_escapes() {
            for c in value.chars() {
                match c {
                    '\\' => out.push_str("\\\\"),
                    '"' => out.push_str("\\\""),
                    '\n' => out.push_str("\\n"),
                    '\r' => out.push_str("\\r"),
                    '\t' => out.push_str("\\t"),
                    c if c.is_control() => {
                        let _ = write!(out, "\\u{:04X}", c as u32);
                    }
                    c => out.push(c),
                }
            }
            return Ok(());
        }

        let representable = match self {
            Quote::Literal => !value.contains(['\'', '\n', '\r']),
            _ => !value.contains("'''"),
        };
        if !representable {
            return Err(ShimError::configuration(format!(
                "value of environment variable '{}' cannot be placed in a literal string; \
                 use a double-quoted string instead",
                name
            )));
        }

        out.push_str(value);
        Ok(())
    }
}

/// Parse the placeholder at the start of `s` (which starts with `$`),
/// returning the variable name and the placeholder's length.
fn placeholder(s: &str) -> Option<(&str, usize)> {
    let rest = &s[1..];

    if let Some(braced) = rest.strip_prefix('{') {
        let end = braced.find('}')?;
        let name = &braced[..end];
        return is_name(name).then_some((name, end + 3));
    }

    let len = rest
        .bytes()
        .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
        .count();
    let name = &rest[..len];
    is_name(name).then_some((name, len + 1))
}

fn is_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {
            bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
        }
        _ => false,
    }
}
