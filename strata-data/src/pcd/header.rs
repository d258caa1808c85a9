//! Point-file header parsing.
//!
//! The header is a run of whitespace-delimited `KEY value...` lines ending
//! with a `DATA <mode>` line. Everything after that line's terminator is
//! point data in the declared encoding.

use crate::error::FormatError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, BufRead};
use tracing::debug;

/// Point data encoding declared by the `DATA` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataEncoding {
    Ascii,
    Binary,
    BinaryCompressed,
}

impl DataEncoding {
    /// Case-insensitive parse of a `DATA` mode token.
    pub fn parse(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "ascii" => Some(Self::Ascii),
            "binary" => Some(Self::Binary),
            "binary_compressed" => Some(Self::BinaryCompressed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascii => "ascii",
            Self::Binary => "binary",
            Self::BinaryCompressed => "binary_compressed",
        }
    }
}

impl fmt::Display for DataEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scalar element type of a field (`TYPE` tag plus `SIZE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
}

impl ScalarType {
    pub fn from_tag(tag: char, size: usize) -> Option<Self> {
        match (tag.to_ascii_uppercase(), size) {
            ('I', 1) => Some(Self::I8),
            ('I', 2) => Some(Self::I16),
            ('I', 4) => Some(Self::I32),
            ('I', 8) => Some(Self::I64),
            ('U', 1) => Some(Self::U8),
            ('U', 2) => Some(Self::U16),
            ('U', 4) => Some(Self::U32),
            ('U', 8) => Some(Self::U64),
            ('F', 4) => Some(Self::F32),
            ('F', 8) => Some(Self::F64),
            _ => None,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    pub fn tag(&self) -> char {
        match self {
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => 'I',
            Self::U8 | Self::U16 | Self::U32 | Self::U64 => 'U',
            Self::F32 | Self::F64 => 'F',
        }
    }

    /// Decode one little-endian element. `bytes` must hold at least `size()` bytes.
    pub fn decode(&self, bytes: &[u8]) -> f64 {
        match self {
            Self::I8 => bytes[0] as i8 as f64,
            Self::I16 => i16::from_le_bytes(le(bytes)) as f64,
            Self::I32 => i32::from_le_bytes(le(bytes)) as f64,
            Self::I64 => i64::from_le_bytes(le(bytes)) as f64,
            Self::U8 => bytes[0] as f64,
            Self::U16 => u16::from_le_bytes(le(bytes)) as f64,
            Self::U32 => u32::from_le_bytes(le(bytes)) as f64,
            Self::U64 => u64::from_le_bytes(le(bytes)) as f64,
            Self::F32 => f32::from_le_bytes(le(bytes)) as f64,
            Self::F64 => f64::from_le_bytes(le(bytes)),
        }
    }

    /// Append `value` as one little-endian element.
    pub fn encode(&self, value: f64, out: &mut Vec<u8>) {
        match self {
            Self::I8 => out.push(value as i8 as u8),
            Self::I16 => out.extend_from_slice(&(value as i16).to_le_bytes()),
            Self::I32 => out.extend_from_slice(&(value as i32).to_le_bytes()),
            Self::I64 => out.extend_from_slice(&(value as i64).to_le_bytes()),
            Self::U8 => out.push(value as u8),
            Self::U16 => out.extend_from_slice(&(value as u16).to_le_bytes()),
            Self::U32 => out.extend_from_slice(&(value as u32).to_le_bytes()),
            Self::U64 => out.extend_from_slice(&(value as u64).to_le_bytes()),
            Self::F32 => out.extend_from_slice(&(value as f32).to_le_bytes()),
            Self::F64 => out.extend_from_slice(&value.to_le_bytes()),
        }
    }
}

fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

/// One declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: ScalarType,
    pub count: usize,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: ScalarType, count: usize) -> Self {
        Self {
            name: name.into(),
            ty,
            count,
        }
    }

    /// Bytes occupied by this field in one record (`size * count`).
    pub fn byte_len(&self) -> usize {
        self.ty.size() * self.count
    }
}

/// Which packed color field a file carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorChannels {
    /// `rgb`: alpha defaults to 255.
    Rgb,
    /// `rgba`: alpha is stored in the top byte.
    Rgba,
}

/// Parsed header.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub version: Option<String>,
    pub fields: Vec<Field>,
    pub width: usize,
    pub height: usize,
    /// Declared point count (`POINTS`, or `WIDTH * HEIGHT` when absent).
    pub points: usize,
    /// Sensor origin and orientation quaternion, when declared.
    pub viewpoint: Option<[f64; 7]>,
    pub encoding: DataEncoding,
    /// Byte offset immediately after the `DATA` line terminator.
    pub data_offset: u64,
}

impl Header {
    /// Read header lines up to and including `DATA`.
    ///
    /// The reader is left positioned at the first data byte.
    #[tracing::instrument(skip_all)]
    pub fn parse<R: BufRead>(reader: &mut R) -> Result<Header, FormatError> {
        let mut position = 0u64;
        let mut line = Vec::new();
        let mut line_no = 0usize;

        let mut version = None;
        let mut names: Vec<String> = Vec::new();
        let mut sizes: Option<Vec<usize>> = None;
        let mut tags: Option<Vec<char>> = None;
        let mut counts: Option<Vec<usize>> = None;
        let mut width: Option<usize> = None;
        let mut height: Option<usize> = None;
        let mut points: Option<usize> = None;
        let mut viewpoint = None;

        let encoding = loop {
            line.clear();
            let consumed = read_line(reader, &mut line)?;
            if consumed == 0 {
                return Err(FormatError::MissingData);
            }
            position += consumed;
            line_no += 1;

            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() || text.starts_with('#') {
                continue;
            }
            let mut tokens = text.split_ascii_whitespace();
            let Some(key) = tokens.next() else { continue };
            let values: Vec<&str> = tokens.collect();

            match key.to_ascii_uppercase().as_str() {
                "VERSION" => version = values.first().map(|v| v.to_string()),
                "FIELDS" | "COLUMNS" => names = values.iter().map(|v| v.to_string()).collect(),
                "SIZE" => sizes = Some(parse_list(&values, line_no)?),
                "TYPE" => {
                    let parsed = values
                        .iter()
                        .map(|v| {
                            let mut chars = v.chars();
                            match (chars.next(), chars.next()) {
                                (Some(c), None) => Ok(c),
                                _ => Err(invalid(line_no, format!("bad TYPE tag '{v}'"))),
                            }
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    tags = Some(parsed);
                }
                "COUNT" => counts = Some(parse_list(&values, line_no)?),
                "WIDTH" => width = Some(parse_one(&values, line_no)?),
                "HEIGHT" => height = Some(parse_one(&values, line_no)?),
                "POINTS" => points = Some(parse_one(&values, line_no)?),
                "VIEWPOINT" => {
                    let parsed: Vec<f64> = parse_list(&values, line_no)?;
                    let vp: [f64; 7] = parsed.try_into().map_err(|v: Vec<f64>| {
                        invalid(line_no, format!("VIEWPOINT needs 7 values, got {}", v.len()))
                    })?;
                    viewpoint = Some(vp);
                }
                "DATA" => {
                    let mode = values.first().copied().unwrap_or_default();
                    break DataEncoding::parse(mode)
                        .ok_or_else(|| FormatError::UnsupportedMode(mode.to_string()))?;
                }
                other => debug!("Ignoring unknown header key {}", other),
            }
        };

        let fields = assemble_fields(&names, sizes, tags, counts, line_no)?;
        for axis in ["x", "y", "z"] {
            if !fields.iter().any(|f| f.name == axis) {
                return Err(FormatError::MissingCoordinate(axis));
            }
        }

        let width = width.or(points).unwrap_or(0);
        let height = height.unwrap_or(1);
        let points = points.unwrap_or(width * height);

        debug!(
            "Parsed header: {} fields, {} points, {} encoding, data at byte {}",
            fields.len(),
            points,
            encoding,
            position
        );

        Ok(Header {
            version,
            fields,
            width,
            height,
            points,
            viewpoint,
            encoding,
            data_offset: position,
        })
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The packed color field, if the file has a usable one.
    pub fn color_field(&self) -> Option<(usize, ColorChannels)> {
        let (index, channels) = match (self.field_index("rgba"), self.field_index("rgb")) {
            (Some(i), _) => (i, ColorChannels::Rgba),
            (None, Some(i)) => (i, ColorChannels::Rgb),
            (None, None) => return None,
        };
        // Only 32-bit packed colors are meaningful.
        (self.fields[index].ty.size() == 4).then_some((index, channels))
    }

    /// Bytes per interleaved record.
    pub fn record_size(&self) -> usize {
        self.fields.iter().map(Field::byte_len).sum()
    }

    /// Render the header as text, ending with the `DATA` line.
    pub fn to_text(&self) -> String {
        let mut text = String::new();
        text.push_str(&format!(
            "VERSION {}\n",
            self.version.as_deref().unwrap_or("0.7")
        ));
        text.push_str(&format!("FIELDS {}\n", self.field_list(|f| f.name.clone())));
        text.push_str(&format!("SIZE {}\n", self.field_list(|f| f.ty.size().to_string())));
        text.push_str(&format!("TYPE {}\n", self.field_list(|f| f.ty.tag().to_string())));
        text.push_str(&format!("COUNT {}\n", self.field_list(|f| f.count.to_string())));
        text.push_str(&format!("WIDTH {}\n", self.width));
        text.push_str(&format!("HEIGHT {}\n", self.height));
        let vp = self.viewpoint.unwrap_or([0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
        text.push_str(&format!(
            "VIEWPOINT {}\n",
            vp.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
        ));
        text.push_str(&format!("POINTS {}\n", self.points));
        text.push_str(&format!("DATA {}\n", self.encoding));
        text
    }

    fn field_list(&self, describe: impl Fn(&Field) -> String) -> String {
        self.fields.iter().map(describe).collect::<Vec<_>>().join(" ")
    }
}

fn invalid(line: usize, reason: String) -> FormatError {
    FormatError::InvalidHeader { line, reason }
}

fn parse_one<T: std::str::FromStr>(values: &[&str], line: usize) -> Result<T, FormatError> {
    let token = values
        .first()
        .ok_or_else(|| invalid(line, "missing value".to_string()))?;
    token
        .parse()
        .map_err(|_| invalid(line, format!("cannot parse '{token}'")))
}

fn parse_list<T: std::str::FromStr>(values: &[&str], line: usize) -> Result<Vec<T>, FormatError> {
    values
        .iter()
        .map(|v| {
            v.parse()
                .map_err(|_| invalid(line, format!("cannot parse '{v}'")))
        })
        .collect()
}

fn assemble_fields(
    names: &[String],
    sizes: Option<Vec<usize>>,
    tags: Option<Vec<char>>,
    counts: Option<Vec<usize>>,
    line: usize,
) -> Result<Vec<Field>, FormatError> {
    let n = names.len();
    let sizes = sizes.unwrap_or_else(|| vec![4; n]);
    let tags = tags.unwrap_or_else(|| vec!['F'; n]);
    let counts = counts.unwrap_or_else(|| vec![1; n]);
    if sizes.len() != n || tags.len() != n || counts.len() != n {
        return Err(invalid(
            line,
            format!(
                "field lists disagree: {} names, {} sizes, {} types, {} counts",
                n,
                sizes.len(),
                tags.len(),
                counts.len()
            ),
        ));
    }

    names
        .iter()
        .zip(sizes)
        .zip(tags)
        .zip(counts)
        .map(|(((name, size), tag), count)| {
            let ty = ScalarType::from_tag(tag, size).ok_or_else(|| {
                FormatError::UnsupportedFieldType {
                    field: name.clone(),
                    kind: tag,
                    size,
                }
            })?;
            Ok(Field::new(name.clone(), ty, count.max(1)))
        })
        .collect()
}

/// Read one line terminated by LF, CR or CRLF into `line` (terminator
/// excluded). Returns the number of bytes consumed, terminator included;
/// zero means end of input.
///
/// A CRLF pair split across two buffer fills is still consumed as one
/// terminator.
pub(crate) fn read_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> io::Result<u64> {
    let mut consumed = 0u64;
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(consumed);
        }
        match buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
            Some(i) => {
                let terminator = buf[i];
                line.extend_from_slice(&buf[..i]);
                reader.consume(i + 1);
                consumed += i as u64 + 1;
                if terminator == b'\r' {
                    let next = reader.fill_buf()?;
                    if next.first() == Some(&b'\n') {
                        reader.consume(1);
                        consumed += 1;
                    }
                }
                return Ok(consumed);
            }
            None => {
                let n = buf.len();
                line.extend_from_slice(buf);
                reader.consume(n);
                consumed += n as u64;
            }
        }
    }
}
