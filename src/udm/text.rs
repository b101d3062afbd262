//! Text form of UDM documents.
//!
//! ```text
//! udm_version 1
//! $string assetType "PMAT"
//! assetData
//! {
//!     $vec3 color_factor [1, 0.5, 0.25]
//!     $array materials [string] ["a", "b"]
//!     $array verts [struct {vec3 pos, vec2 uv}] [0, 0, 0, 0, 0]
//! }
//! ```
//!
//! Fixed-size values are written as flat component lists; arrays of them are
//! one flat list for all items. `//` starts a comment.

use std::iter::Peekable;
use std::str::Chars;

use half::f16;

use super::array::Array;
use super::binary::MAX_DEPTH;
use super::format::*;
use super::property::{Element, Property};
use super::reader::BinaryReader;
use super::value::{StructLayout, StructValue, Value};
use crate::util::{Error, Result, Type};

#[derive(Clone, Debug, PartialEq)]
enum Token {
    /// `$name`
    Type(String),
    /// Bare identifier or number.
    Word(String),
    /// Quoted string.
    Str(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Type(t) => format!("'${t}'"),
            Self::Word(w) => format!("'{w}'"),
            Self::Str(s) => format!("\"{s}\""),
            Self::LBrace => "'{'".into(),
            Self::RBrace => "'}'".into(),
            Self::LBracket => "'['".into(),
            Self::RBracket => "']'".into(),
            Self::Comma => "','".into(),
            Self::Eof => "end of input".into(),
        }
    }
}

fn parse_error(line: usize, message: impl Into<String>) -> Error {
    Error::Parse {
        line,
        message: message.into(),
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '+' | '.' | ':' | '#' | '@')
}

fn read_word(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if !is_word_char(c) {
            break;
        }
        word.push(c);
        chars.next();
    }
    word
}

fn tokenize(src: &str) -> Result<Vec<(Token, usize)>> {
    let mut tokens = Vec::new();
    let mut line = 1;
    let mut chars = src.chars().peekable();

    while let Some(&c) = chars.peek() {
        let punct = match c {
            '{' => Some(Token::LBrace),
            '}' => Some(Token::RBrace),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            ',' => Some(Token::Comma),
            _ => None,
        };
        if let Some(tok) = punct {
            chars.next();
            tokens.push((tok, line));
            continue;
        }

        match c {
            '\n' => {
                line += 1;
                chars.next();
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '/' => {
                chars.next();
                if chars.next() != Some('/') {
                    return Err(parse_error(line, "expected '//' comment"));
                }
                while chars.peek().is_some_and(|&c| c != '\n') {
                    chars.next();
                }
            }
            '"' => {
                chars.next();
                let start = line;
                let mut s = String::new();
                loop {
                    match chars.next() {
                        None => return Err(parse_error(start, "unterminated string")),
                        Some('"') => break,
                        Some('\\') => s.push(match chars.next() {
                            Some('n') => '\n',
                            Some('t') => '\t',
                            Some('r') => '\r',
                            Some('0') => '\0',
                            Some('"') => '"',
                            Some('\\') => '\\',
                            other => {
                                return Err(parse_error(line, format!("invalid escape {other:?}")))
                            }
                        }),
                        Some(c) => {
                            if c == '\n' {
                                line += 1;
                            }
                            s.push(c);
                        }
                    }
                }
                tokens.push((Token::Str(s), start));
            }
            '$' => {
                chars.next();
                let name = read_word(&mut chars);
                if name.is_empty() {
                    return Err(parse_error(line, "expected a type name after '$'"));
                }
                tokens.push((Token::Type(name), line));
            }
            c if is_word_char(c) => {
                let word = read_word(&mut chars);
                tokens.push((Token::Word(word), line));
            }
            other => return Err(parse_error(line, format!("unexpected character {other:?}"))),
        }
    }
    tokens.push((Token::Eof, line));
    Ok(tokens)
}

/// Primitive component type and count of a fixed-size type.
fn components(ty: Type) -> Option<(Type, usize)> {
    Some(match ty {
        Type::Int8
        | Type::UInt8
        | Type::Int16
        | Type::UInt16
        | Type::Int32
        | Type::UInt32
        | Type::Int64
        | Type::UInt64
        | Type::Half
        | Type::Float
        | Type::Double
        | Type::Boolean => (ty, 1),
        Type::Vector2 => (Type::Float, 2),
        Type::Vector3 | Type::EulerAngles => (Type::Float, 3),
        Type::Vector4 | Type::Quaternion => (Type::Float, 4),
        Type::Transform => (Type::Float, 7),
        Type::ScaledTransform => (Type::Float, 10),
        Type::Mat3x4 => (Type::Float, 12),
        Type::Mat4 => (Type::Float, 16),
        Type::Srgba => (Type::UInt8, 4),
        Type::HdrColor => (Type::UInt16, 3),
        Type::Vector2i => (Type::Int32, 2),
        Type::Vector3i => (Type::Int32, 3),
        Type::Vector4i => (Type::Int32, 4),
        _ => return None,
    })
}

/// Primitive components making up one item of `ty` (with `layout` for structs).
fn item_components(ty: Type, layout: Option<&StructLayout>) -> Option<Vec<Type>> {
    match (ty, layout) {
        (Type::Struct, Some(layout)) => {
            let mut out = Vec::new();
            for m in layout.members() {
                let (prim, n) = components(m.ty)?;
                out.extend(std::iter::repeat(prim).take(n));
            }
            Some(out)
        }
        _ => components(ty).map(|(prim, n)| vec![prim; n]),
    }
}

fn encode_component(prim: Type, word: &str, out: &mut Vec<u8>) -> std::result::Result<(), String> {
    fn int<T: TryFrom<i128>>(word: &str) -> std::result::Result<T, String> {
        let v: i128 = word.parse().map_err(|_| format!("'{word}' is not an integer"))?;
        T::try_from(v).map_err(|_| format!("{word} is out of range"))
    }
    fn float<T: std::str::FromStr>(word: &str) -> std::result::Result<T, String> {
        word.parse().map_err(|_| format!("'{word}' is not a number"))
    }
    match prim {
        Type::Int8 => out.extend_from_slice(&int::<i8>(word)?.to_le_bytes()),
        Type::UInt8 => out.extend_from_slice(&int::<u8>(word)?.to_le_bytes()),
        Type::Int16 => out.extend_from_slice(&int::<i16>(word)?.to_le_bytes()),
        Type::UInt16 => out.extend_from_slice(&int::<u16>(word)?.to_le_bytes()),
        Type::Int32 => out.extend_from_slice(&int::<i32>(word)?.to_le_bytes()),
        Type::UInt32 => out.extend_from_slice(&int::<u32>(word)?.to_le_bytes()),
        Type::Int64 => out.extend_from_slice(&int::<i64>(word)?.to_le_bytes()),
        Type::UInt64 => out.extend_from_slice(&int::<u64>(word)?.to_le_bytes()),
        Type::Half => out.extend_from_slice(&f16::from_f32(float(word)?).to_le_bytes()),
        Type::Float => out.extend_from_slice(&float::<f32>(word)?.to_le_bytes()),
        Type::Double => out.extend_from_slice(&float::<f64>(word)?.to_le_bytes()),
        Type::Boolean => out.push(match word {
            "true" | "1" => 1,
            "false" | "0" => 0,
            _ => return Err(format!("'{word}' is not a boolean")),
        }),
        other => return Err(format!("{other} is not a primitive")),
    }
    Ok(())
}

fn format_component(prim: Type, r: &mut BinaryReader<'_>) -> Result<String> {
    Ok(match prim {
        Type::Int8 => r.read_i8()?.to_string(),
        Type::UInt8 => r.read_u8()?.to_string(),
        Type::Int16 => r.read_i16()?.to_string(),
        Type::UInt16 => r.read_u16()?.to_string(),
        Type::Int32 => r.read_i32()?.to_string(),
        Type::UInt32 => r.read_u32()?.to_string(),
        Type::Int64 => r.read_i64()?.to_string(),
        Type::UInt64 => r.read_u64()?.to_string(),
        Type::Half => r.read_f16()?.to_f32().to_string(),
        Type::Float => r.read_f32()?.to_string(),
        Type::Double => r.read_f64()?.to_string(),
        Type::Boolean => (r.read_u8()? != 0).to_string(),
        other => return Err(Error::invalid(format!("{other} is not a primitive"))),
    })
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn line(&self) -> usize {
        self.tokens[self.pos].1
    }

    fn next(&mut self) -> Token {
        let tok = self.tokens[self.pos].0.clone();
        if tok != Token::Eof {
            self.pos += 1;
        }
        tok
    }

    fn error<T>(&self, message: impl Into<String>) -> Result<T> {
        Err(parse_error(self.line(), message))
    }

    fn expect(&mut self, want: Token) -> Result<()> {
        if *self.peek() == want {
            self.next();
            Ok(())
        } else {
            self.error(format!("expected {}, found {}", want.describe(), self.peek().describe()))
        }
    }

    fn skip_commas(&mut self) {
        while *self.peek() == Token::Comma {
            self.next();
        }
    }

    fn word(&mut self, what: &str) -> Result<String> {
        match self.next() {
            Token::Word(w) => Ok(w),
            other => {
                self.pos -= usize::from(other != Token::Eof);
                self.error(format!("expected {what}, found {}", other.describe()))
            }
        }
    }

    fn key(&mut self) -> Result<String> {
        match self.next() {
            Token::Word(w) | Token::Str(w) => Ok(w),
            other => {
                self.pos -= usize::from(other != Token::Eof);
                self.error(format!("expected a key, found {}", other.describe()))
            }
        }
    }

    fn parse_document(&mut self) -> Result<(u32, Element)> {
        if self.word("'udm_version'")? != TEXT_MAGIC {
            return Err(Error::BadMagic(Vec::new()));
        }
        let version_word = self.word("a version number")?;
        let version: u32 = match version_word.parse() {
            Ok(v) => v,
            Err(_) => return self.error(format!("invalid version '{version_word}'")),
        };
        if !is_supported_version(version) {
            return Err(Error::UnsupportedVersion(version));
        }
        let root = self.parse_entries(Token::Eof)?;
        Ok((version, root))
    }

    /// Entries up to and including `end`. Every nested element passes
    /// through here, so this is where nesting depth is bounded.
    fn parse_entries(&mut self, end: Token) -> Result<Element> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::invalid(format!("nesting deeper than {MAX_DEPTH} levels")));
        }
        let mut element = Element::new();
        loop {
            self.skip_commas();
            if *self.peek() == end {
                self.next();
                self.depth -= 1;
                return Ok(element);
            }
            let line = self.line();
            let (key, property) = self.parse_entry()?;
            element
                .insert(key, property)
                .map_err(|e| parse_error(line, e.to_string()))?;
        }
    }

    fn parse_entry(&mut self) -> Result<(String, Property)> {
        match self.peek().clone() {
            Token::Type(name) => {
                self.next();
                let key = self.key()?;
                let property = match name.as_str() {
                    "array" => Property::Array(self.parse_array()?),
                    "arrayLz4" => Property::Array(self.parse_array()?.compressed(true)),
                    "struct" => {
                        self.expect(Token::LBrace)?;
                        let layout = self.parse_layout()?;
                        let bytes = self.parse_packed(Type::Struct, Some(&layout), Some(1))?.1;
                        let value = StructValue::new(layout, bytes).map_err(|e| parse_error(self.line(), e.to_string()))?;
                        Property::Scalar(Value::Struct(value))
                    }
                    "element" => {
                        self.expect(Token::LBrace)?;
                        Property::Element(self.parse_entries(Token::RBrace)?)
                    }
                    other => match Type::from_name(other) {
                        Some(ty) => Property::Scalar(self.parse_value(ty)?),
                        None => return self.error(format!("unknown type '${other}'")),
                    },
                };
                Ok((key, property))
            }
            Token::Word(_) | Token::Str(_) => {
                let key = self.key()?;
                self.expect(Token::LBrace)?;
                Ok((key, Property::Element(self.parse_entries(Token::RBrace)?)))
            }
            other => self.error(format!("expected an entry, found {}", other.describe())),
        }
    }

    /// Members up to and including the closing `}`.
    fn parse_layout(&mut self) -> Result<StructLayout> {
        let mut layout = StructLayout::new();
        loop {
            self.skip_commas();
            if *self.peek() == Token::RBrace {
                self.next();
                return Ok(layout);
            }
            let type_name = self.word("a member type")?;
            let ty = match Type::from_name(&type_name) {
                Some(ty) => ty,
                None => return self.error(format!("unknown member type '{type_name}'")),
            };
            let name = self.key()?;
            layout
                .push(ty, name)
                .map_err(|e| parse_error(self.line(), e.to_string()))?;
        }
    }

    fn parse_value(&mut self, ty: Type) -> Result<Value> {
        match ty {
            Type::Nil => Ok(Value::Nil),
            Type::String | Type::Utf8String | Type::Reference => {
                let s = match self.next() {
                    Token::Str(s) => s,
                    other => return self.error(format!("expected a string, found {}", other.describe())),
                };
                Ok(match ty {
                    Type::String => Value::String(s),
                    Type::Utf8String => Value::Utf8(s),
                    _ => Value::Reference(s),
                })
            }
            Type::Blob | Type::BlobLz4 => {
                let bytes = self.parse_packed(Type::UInt8, None, None)?.1;
                Ok(if ty == Type::Blob {
                    Value::Blob(bytes)
                } else {
                    Value::BlobLz4(bytes)
                })
            }
            _ if ty.is_trivial() => {
                let single = components(ty).is_some_and(|(_, n)| n == 1);
                let bytes = if single && *self.peek() != Token::LBracket {
                    let line = self.line();
                    let word = self.word("a value")?;
                    let mut bytes = Vec::new();
                    encode_component(ty, &word, &mut bytes).map_err(|m| parse_error(line, m))?;
                    bytes
                } else {
                    self.parse_packed(ty, None, Some(1))?.1
                };
                Value::read_packed(ty, &mut BinaryReader::new(&bytes))
            }
            other => self.error(format!("'${other}' cannot hold a scalar value")),
        }
    }

    /// Bracketed flat component list. Returns the item count and packed bytes.
    fn parse_packed(
        &mut self,
        ty: Type,
        layout: Option<&StructLayout>,
        expect_items: Option<usize>,
    ) -> Result<(usize, Vec<u8>)> {
        let prims = match item_components(ty, layout) {
            Some(p) if !p.is_empty() => p,
            _ => return self.error(format!("{ty} has no packed form")),
        };
        let start_line = self.line();
        self.expect(Token::LBracket)?;
        let mut bytes = Vec::new();
        let mut n = 0usize;
        loop {
            self.skip_commas();
            if *self.peek() == Token::RBracket {
                self.next();
                break;
            }
            let line = self.line();
            let word = self.word("a number")?;
            encode_component(prims[n % prims.len()], &word, &mut bytes)
                .map_err(|m| parse_error(line, m))?;
            n += 1;
        }
        if n % prims.len() != 0 {
            return Err(parse_error(start_line, format!(
                "{n} components do not split into {ty} items of {}",
                prims.len()
            )));
        }
        let items = n / prims.len();
        if let Some(want) = expect_items {
            if items != want {
                return Err(parse_error(
                    start_line,
                    format!("expected {} components for {ty}, found {n}", want * prims.len()),
                ));
            }
        }
        Ok((items, bytes))
    }

    fn parse_array(&mut self) -> Result<Array> {
        self.expect(Token::LBracket)?;
        let type_name = self.word("an item type")?;
        let ty = match Type::from_name(&type_name) {
            Some(ty) if ty.is_array_value_type() => ty,
            _ => return self.error(format!("invalid array item type '{type_name}'")),
        };
        let layout = if ty == Type::Struct {
            self.expect(Token::LBrace)?;
            Some(self.parse_layout()?)
        } else {
            None
        };
        self.expect(Token::RBracket)?;

        let line = self.line();
        let in_line = |e: Error| parse_error(line, e.to_string());
        match ty {
            Type::Element => {
                self.expect(Token::LBracket)?;
                let mut items = Vec::new();
                loop {
                    self.skip_commas();
                    if *self.peek() == Token::RBracket {
                        self.next();
                        break;
                    }
                    self.expect(Token::LBrace)?;
                    items.push(self.parse_entries(Token::RBrace)?);
                }
                Ok(Array::from_elements(items))
            }
            Type::String | Type::Utf8String => {
                self.expect(Token::LBracket)?;
                let mut items = Vec::new();
                loop {
                    self.skip_commas();
                    match self.next() {
                        Token::RBracket => break,
                        Token::Str(s) => items.push(s),
                        other => return self.error(format!("expected a string, found {}", other.describe())),
                    }
                }
                Ok(Array::from_strings_typed(ty, items))
            }
            Type::Struct => {
                let layout = layout.unwrap_or_default();
                let (count, bytes) = self.parse_packed(ty, Some(&layout), None)?;
                Array::from_structs(layout, count, bytes).map_err(in_line)
            }
            _ => {
                let (count, bytes) = self.parse_packed(ty, None, None)?;
                Array::from_packed(ty, count, bytes).map_err(in_line)
            }
        }
    }
}

/// Check whether text starts with the version keyword.
pub fn is_text(data: &[u8]) -> bool {
    let trimmed = data.trim_ascii_start();
    trimmed.starts_with(TEXT_MAGIC.as_bytes())
        && trimmed
            .get(TEXT_MAGIC.len())
            .is_some_and(|b| b.is_ascii_whitespace())
}

/// Parse a text document into its version and root element.
pub fn parse_text(src: &str) -> Result<(u32, Element)> {
    let tokens = tokenize(src)?;
    Parser {
        tokens,
        pos: 0,
        depth: 0,
    }
    .parse_document()
}

/// Render a root element as a text document.
pub fn write_text(root: &Element) -> Result<String> {
    let mut w = TextWriter::default();
    w.out.push_str(&format!("{TEXT_MAGIC} {CURRENT_VERSION}\n"));
    w.entries(root)?;
    Ok(w.out)
}

#[derive(Default)]
struct TextWriter {
    out: String,
    indent: usize,
}

fn quote(s: &str) -> String {
    let mut q = String::with_capacity(s.len() + 2);
    q.push('"');
    for c in s.chars() {
        match c {
            '"' => q.push_str("\\\""),
            '\\' => q.push_str("\\\\"),
            '\n' => q.push_str("\\n"),
            '\t' => q.push_str("\\t"),
            '\r' => q.push_str("\\r"),
            '\0' => q.push_str("\\0"),
            c => q.push(c),
        }
    }
    q.push('"');
    q
}

fn key_text(key: &str) -> String {
    if !key.is_empty() && key.chars().all(is_word_char) {
        key.to_string()
    } else {
        quote(key)
    }
}

fn packed_text(prims: &[Type], bytes: &[u8]) -> Result<String> {
    let mut r = BinaryReader::new(bytes);
    let mut parts = Vec::new();
    let mut i = 0;
    while r.remaining() > 0 {
        parts.push(format_component(prims[i % prims.len()], &mut r)?);
        i += 1;
    }
    Ok(format!("[{}]", parts.join(", ")))
}

fn layout_text(layout: &StructLayout) -> String {
    let members: Vec<_> = layout
        .members()
        .iter()
        .map(|m| format!("{} {}", m.ty.name(), key_text(&m.name)))
        .collect();
    format!("{{{}}}", members.join(", "))
}

impl TextWriter {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push('\t');
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn entries(&mut self, element: &Element) -> Result<()> {
        for (key, child) in element.iter() {
            self.property(&key_text(key), child)?;
        }
        Ok(())
    }

    fn block(&mut self, head: &str, element: &Element, tail: &str) -> Result<()> {
        self.line(head);
        self.line("{");
        self.indent += 1;
        self.entries(element)?;
        self.indent -= 1;
        self.line(&format!("}}{tail}"));
        Ok(())
    }

    fn property(&mut self, key: &str, property: &Property) -> Result<()> {
        match property {
            Property::Element(e) => self.block(key, e, ""),
            Property::Scalar(v) => {
                let text = value_text(v)?;
                if text.is_empty() {
                    self.line(&format!("${} {key}", v.value_type().name()));
                } else {
                    self.line(&format!("${} {key} {text}", v.value_type().name()));
                }
                Ok(())
            }
            Property::Array(a) => self.array(key, a),
        }
    }

    fn array(&mut self, key: &str, array: &Array) -> Result<()> {
        let kw = if array.is_compressed() { "arrayLz4" } else { "array" };
        let ty = array.value_type();
        let item_type = match array.layout() {
            Some(layout) => format!("struct {}", layout_text(layout)),
            None => ty.name().to_string(),
        };
        let head = format!("${kw} {key} [{item_type}]");
        match ty {
            Type::Element => {
                let items = array.elements()?;
                if items.is_empty() {
                    self.line(&format!("{head} []"));
                    return Ok(());
                }
                self.line(&format!("{head} ["));
                self.indent += 1;
                for (i, item) in items.iter().enumerate() {
                    let tail = if i + 1 < items.len() { "," } else { "" };
                    self.line("{");
                    self.indent += 1;
                    self.entries(item.as_element()?)?;
                    self.indent -= 1;
                    self.line(&format!("}}{tail}"));
                }
                self.indent -= 1;
                self.line("]");
            }
            Type::String | Type::Utf8String => {
                let items: Vec<_> = array.strings()?.iter().map(|s| quote(s)).collect();
                self.line(&format!("{head} [{}]", items.join(", ")));
            }
            _ => {
                let buffer = array.array_value()?;
                let prims = item_components(ty, array.layout())
                    .ok_or_else(|| Error::invalid(format!("{ty} has no text form")))?;
                self.line(&format!("{head} {}", packed_text(&prims, buffer.as_bytes())?));
            }
        }
        Ok(())
    }
}

fn value_text(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Nil => String::new(),
        Value::String(s) | Value::Utf8(s) | Value::Reference(s) => quote(s),
        Value::Blob(b) | Value::BlobLz4(b) => packed_text(&[Type::UInt8], b)?,
        Value::Struct(s) => {
            let prims = item_components(Type::Struct, Some(&s.layout))
                .ok_or_else(|| Error::invalid("struct without members"))?;
            format!("{} {}", layout_text(&s.layout), packed_text(&prims, &s.bytes)?)
        }
        other => {
            let ty = other.value_type();
            let (prim, n) = components(ty).ok_or_else(|| Error::invalid(format!("{ty} has no text form")))?;
            let bytes = other
                .packed_bytes()
                .ok_or_else(|| Error::invalid(format!("{ty} has no text form")))?;
            if n == 1 {
                format_component(prim, &mut BinaryReader::new(&bytes))?
            } else {
                packed_text(&[prim], &bytes)?
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{Quat, Vec2, Vec3};

    const SAMPLE: &str = r#"
udm_version 1
// material
$string assetType "PMAT"
$uint32 assetVersion 1
assetData
{
    $string shader "pbr"
    $vec3 color_factor [1, 0.5, 0.25]
    $array materials [string] ["a", "b"]
    $array bones [element] [ { $int32 index 0 }, { $int32 index 1 } ]
    $struct vertex {vec3 pos, vec2 uv} [0, 0, 0, 1, 1]
    $array verts [struct {vec3 pos, vec2 uv}] [0,0,0,0,0, 1,1,1,1,1]
    $arrayLz4 ids [uint16] [1, 2, 3]
    "quoted key" { $bool on true }
    $quat rot [0, 0, 0, 1]
    $nil nothing
}
"#;

    #[test]
    fn test_parse_sample() {
        let (version, root) = parse_text(SAMPLE).unwrap();
        assert_eq!(version, 1);
        let root = Property::Element(root);
        assert_eq!(root.get("assetType").unwrap().as_str().unwrap(), "PMAT");
        assert_eq!(root.get("assetVersion").unwrap().as_u32().unwrap(), 1);
        assert_eq!(
            root.get("assetData/color_factor").unwrap().as_vec3().unwrap(),
            Vec3::new(1.0, 0.5, 0.25)
        );
        assert_eq!(root.get("assetData/materials").unwrap().as_array().unwrap().strings().unwrap(), ["a", "b"]);
        assert_eq!(root.get("assetData/bones/1/index").unwrap().as_int().unwrap(), 1);
        let verts = root.get("assetData/verts").unwrap().array_value().unwrap();
        assert_eq!(verts.len(), 2);
        assert_eq!(verts.field::<Vec2>("uv").unwrap()[1], Vec2::ONE);
        let vertex = root.get("assetData/vertex").unwrap().as_type::<StructValue>().unwrap();
        assert_eq!(vertex.field::<Vec2>("uv").unwrap(), Vec2::ONE);
        let ids = root.get("assetData/ids").unwrap().as_array().unwrap();
        assert!(ids.is_compressed());
        assert_eq!(ids.to_vec::<u16>().unwrap(), vec![1, 2, 3]);
        assert!(root.get("assetData/quoted key/on").unwrap().as_bool().unwrap());
        assert_eq!(root.get("assetData/rot").unwrap().as_quat().unwrap(), Quat::IDENTITY);
        assert_eq!(root.get("assetData/nothing").unwrap().kind(), Type::Nil);
    }

    #[test]
    fn test_text_roundtrip() {
        let (_, root) = parse_text(SAMPLE).unwrap();
        let text = write_text(&root).unwrap();
        let (_, again) = parse_text(&text).unwrap();
        assert_eq!(write_text(&again).unwrap(), text);
        assert_eq!(
            Property::Element(again).to_json().unwrap(),
            Property::Element(root).to_json().unwrap()
        );
    }

    #[test]
    fn test_parse_errors_carry_lines() {
        let err = parse_text("udm_version 1\n$int32 x 1\n$int8 y 300\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }), "{err:?}");

        let err = parse_text("udm_version 1\n$vec3 v [1, 2]\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }), "{err:?}");

        let err = parse_text("udm_version 1\n$int32 x 1\n$int32 x 2\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 3, .. }), "{err:?}");

        assert!(matches!(parse_text("udm_version 1\na {\n"), Err(Error::Parse { .. })));
        assert!(matches!(parse_text("udm_version 1\n$wat x 1"), Err(Error::Parse { .. })));
        assert!(matches!(parse_text("udm_version 1\n$string s \"open"), Err(Error::Parse { .. })));
    }

    #[test]
    fn test_nesting_is_bounded() {
        let deep = format!("udm_version 1\n{}", "a{".repeat(200_000));
        let err = parse_text(&deep).unwrap_err();
        assert!(matches!(&err, Error::InvalidStructure(m) if m.contains("nesting")), "{err:?}");

        let deep_arrays = format!("udm_version 1\n{}", "$array a [element] [{".repeat(10_000));
        assert!(matches!(parse_text(&deep_arrays), Err(Error::InvalidStructure(_))));

        let depth = MAX_DEPTH - 1;
        let ok = format!("udm_version 1\n{}{}", "a{".repeat(depth), "}".repeat(depth));
        let (_, root) = parse_text(&ok).unwrap();
        let path = vec!["a"; depth].join("/");
        assert!(Property::Element(root).get(&path).is_ok());
    }

    #[test]
    fn test_unterminated_input_fails() {
        for src in [
            "udm_version 1\na {\n$int32 x 1\n",
            "udm_version 1\na { b { }\n",
            "udm_version 1\n$vec3 v [1, 2, 3\n",
            "udm_version 1\n$array ids [uint16] [1, 2\n",
            "udm_version 1\n$array ids [uint16\n",
            "udm_version 1\n$array names [string] [\"a\", \"b\"\n",
            "udm_version 1\n$array items [element] [ { $int32 i 0 }, {\n",
            "udm_version 1\n$struct s {vec3 pos [0, 0, 0]\n",
            "udm_version 1\na }\n",
        ] {
            assert!(matches!(parse_text(src), Err(Error::Parse { .. })), "{src:?}");
        }
    }

    #[test]
    fn test_truncated_array_payloads_fail() {
        // Components that do not fill a whole item.
        let err = parse_text("udm_version 1\n$array v [vec3] [0, 0, 0, 1, 1]\n").unwrap_err();
        assert!(matches!(err, Error::Parse { line: 2, .. }), "{err:?}");
        let err = parse_text("udm_version 1\n$array v [struct {vec3 p, uint8 f}] [0, 0, 0]\n").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }), "{err:?}");
        // Type header with no payload.
        assert!(parse_text("udm_version 1\n$array v [float]\n").is_err());
        assert!(parse_text("udm_version 1\n$arrayLz4 v [float]").is_err());
    }

    #[test]
    fn test_version_checks() {
        assert!(matches!(parse_text("udm_version 7\n"), Err(Error::UnsupportedVersion(7))));
        assert!(matches!(parse_text("version 1\n"), Err(Error::BadMagic(_))));
    }

    #[test]
    fn test_int_rules() {
        assert!(parse_text("udm_version 1\n$int32 x 1.5\n").is_err());
        let (_, root) = parse_text("udm_version 1\n$float x 2\n$double y -1e-3\n$half h 0.5\n").unwrap();
        let root = Property::Element(root);
        assert_eq!(root.get("x").unwrap().as_f32().unwrap(), 2.0);
        assert_eq!(root.get("y").unwrap().as_f64().unwrap(), -1e-3);
        assert_eq!(root.get("h").unwrap().as_f32().unwrap(), 0.5);
    }

    #[test]
    fn test_is_text() {
        assert!(is_text(b"  udm_version 1\n"));
        assert!(!is_text(b"udm_versionx"));
        assert!(!is_text(b"UDMB"));
    }

    #[test]
    fn test_quoting() {
        let root = Element::new()
            .with("odd key", "say \"hi\"\n")
            .unwrap();
        let text = write_text(&root).unwrap();
        assert!(text.contains("\"odd key\""));
        let (_, back) = parse_text(&text).unwrap();
        assert_eq!(back.child("odd key").unwrap().as_str().unwrap(), "say \"hi\"\n");
    }
}
