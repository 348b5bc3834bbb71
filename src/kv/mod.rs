//! Ordered key/value trees and their on-disk text form.
//!
//! The persistence format is a nested mapping of quoted tokens:
//!
//! ```text
//! "BSP"
//! {
//!     "maxWidth"  "1024"
//!     "elements"
//!     {
//!         "0" { ... }
//!     }
//! }
//! ```
//!
//! Keys are strings, values are either strings or sub-mappings, and
//! insertion order is preserved; the serialization bridge relies on
//! it for stable element ids. `//` starts a comment running to end
//! of line.

use thiserror::Error;

/*──────────────────────────── model ──────────────────────────────────*/

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KvValue {
    String(String),
    Map(KvMap),
}

/// An insertion-ordered string map.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KvMap {
    entries: Vec<(String, KvValue)>,
}

impl KvMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Later duplicates shadow nothing: `get`
    /// returns the first match, the formatter writes every entry.
    pub fn insert(&mut self, key: impl Into<String>, value: KvValue) {
        self.entries.push((key.into(), value));
    }

    pub fn insert_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key, KvValue::String(value.into()));
    }

    pub fn insert_map(&mut self, key: impl Into<String>, value: KvMap) {
        self.insert(key, KvValue::Map(value));
    }

    pub fn get(&self, key: &str) -> Option<&KvValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// String value under `key`, or the matching `KvError`.
    pub fn str_field(&self, key: &'static str) -> Result<&str, KvError> {
        match self.get(key) {
            Some(KvValue::String(s)) => Ok(s),
            Some(KvValue::Map(_)) => Err(KvError::NotAString(key)),
            None => Err(KvError::MissingKey(key)),
        }
    }

    /// Sub-mapping under `key`, or the matching `KvError`.
    pub fn map_field(&self, key: &'static str) -> Result<&KvMap, KvError> {
        match self.get(key) {
            Some(KvValue::Map(m)) => Ok(m),
            Some(KvValue::String(_)) => Err(KvError::NotAMap(key)),
            None => Err(KvError::MissingKey(key)),
        }
    }

    /// Integer field parsed from its string form.
    pub fn int_field(&self, key: &'static str) -> Result<i32, KvError> {
        let raw = self.str_field(key)?;
        raw.parse().map_err(|_| KvError::BadNumber {
            key: key.to_owned(),
            value: raw.to_owned(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &KvValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/*──────────────────────────── errors ─────────────────────────────────*/

/// Malformed persisted data, at either the token or the record level.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum KvError {
    #[error("syntax error at line {line}: {reason}")]
    Syntax { line: usize, reason: String },

    #[error("missing key {0:?}")]
    MissingKey(&'static str),

    #[error("expected a string value under {0:?}")]
    NotAString(&'static str),

    #[error("expected subkeys under {0:?}")]
    NotAMap(&'static str),

    #[error("bad integer for {key:?}: {value:?}")]
    BadNumber { key: String, value: String },

    #[error("bad boolean for {key:?}: {value:?} (expected \"True\" or \"False\")")]
    BadBool { key: &'static str, value: String },

    #[error("unknown element type {0:?}")]
    UnknownElementType(String),

    #[error("unknown orientation {0:?}")]
    UnknownOrientation(String),

    #[error("child id {0} does not name an element")]
    DanglingChild(usize),

    #[error("element {0} has bounds inconsistent with its node")]
    InconsistentBounds(usize),

    #[error("world has no elements")]
    NoElements,

    #[error("world dimensions must be positive, got {0}x{1}")]
    BadWorldSize(i32, i32),
}

/*──────────────────────────── parsing ────────────────────────────────*/

#[derive(Debug, PartialEq)]
enum Token {
    String(String),
    Open,
    Close,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn err(&self, reason: impl Into<String>) -> KvError {
        KvError::Syntax {
            line: self.line,
            reason: reason.into(),
        }
    }

    fn next_token(&mut self) -> Result<Option<Token>, KvError> {
        loop {
            let Some(&c) = self.chars.peek() else {
                return Ok(None);
            };
            match c {
                '\n' => {
                    self.line += 1;
                    self.chars.next();
                }
                c if c.is_whitespace() => {
                    self.chars.next();
                }
                '/' => {
                    self.chars.next();
                    if self.chars.next() != Some('/') {
                        return Err(self.err("stray '/'"));
                    }
                    // comment runs to end of line
                    for c in self.chars.by_ref() {
                        if c == '\n' {
                            self.line += 1;
                            break;
                        }
                    }
                }
                '{' => {
                    self.chars.next();
                    return Ok(Some(Token::Open));
                }
                '}' => {
                    self.chars.next();
                    return Ok(Some(Token::Close));
                }
                '"' => {
                    self.chars.next();
                    let mut s = String::new();
                    loop {
                        match self.chars.next() {
                            Some('"') => return Ok(Some(Token::String(s))),
                            Some('\n') | None => {
                                return Err(self.err("unterminated string"));
                            }
                            Some(c) => s.push(c),
                        }
                    }
                }
                c => return Err(self.err(format!("unexpected character {c:?}"))),
            }
        }
    }
}

/// Parse the text form into an ordered map. Duplicate keys within
/// one mapping are rejected.
pub fn parse_kv(text: &str) -> Result<KvMap, KvError> {
    let mut lexer = Lexer::new(text);
    let map = parse_map(&mut lexer, true)?;
    Ok(map)
}

fn parse_map(lexer: &mut Lexer<'_>, top_level: bool) -> Result<KvMap, KvError> {
    let mut map = KvMap::new();
    loop {
        let token = lexer.next_token()?;
        let key = match token {
            None if top_level => return Ok(map),
            None => return Err(lexer.err("unexpected end of input inside mapping")),
            Some(Token::Close) if !top_level => return Ok(map),
            Some(Token::Close) => return Err(lexer.err("unmatched '}'")),
            Some(Token::Open) => return Err(lexer.err("expected a key before '{'")),
            Some(Token::String(s)) => s,
        };
        if map.get(&key).is_some() {
            return Err(lexer.err(format!("duplicate key {key:?}")));
        }
        match lexer.next_token()? {
            Some(Token::String(value)) => map.insert_str(key, value),
            Some(Token::Open) => {
                let sub = parse_map(lexer, false)?;
                map.insert_map(key, sub);
            }
            Some(Token::Close) | None => {
                return Err(lexer.err(format!("key {key:?} has no value")));
            }
        }
    }
}

/*──────────────────────────── formatting ─────────────────────────────*/

/// Render a map in the text form parsed by [`parse_kv`].
pub fn format_kv(map: &KvMap) -> String {
    let mut out = String::new();
    write_map(map, 0, &mut out);
    out
}

fn write_map(map: &KvMap, depth: usize, out: &mut String) {
    let indent = "    ".repeat(depth);
    for (key, value) in map.iter() {
        match value {
            KvValue::String(s) => {
                out.push_str(&format!("{indent}\"{key}\" \"{s}\"\n"));
            }
            KvValue::Map(sub) => {
                out.push_str(&format!("{indent}\"{key}\"\n{indent}{{\n"));
                write_map(sub, depth + 1, out);
                out.push_str(&format!("{indent}}}\n"));
            }
        }
    }
}

/*====================================================================*/
/*                                Tests                                */
/*====================================================================*/
