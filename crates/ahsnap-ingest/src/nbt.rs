//! Item payload decoding
//!
//! Listings carry their item as `item_bytes`: base64 of a gzip-compressed
//! named binary tag (NBT) tree. The whole tree is reconstructed before any
//! attribute lookup.
//!
//! Wire format (big-endian): a tag is `id: u8`, then for named tags a
//! `u16`-length-prefixed name, then the payload. Compounds end with tag 0.
//!
//! # Example
//!
//! ```rust
//! use ahsnap_ingest::nbt::decode_payload;
//!
//! let blob = "H4sIAAAAAAAC/+NiYOBkYMzkYmBgYORiYC5JTOdi4HetKClKdCwpKcpMKi1JLeZgYMpMYWAOcA3hYGAvSC3xzEvLZ5CtViqpLEhVslIK9/dxU9JRKslMLQLyXAM8nZVqgcYxAAD+8o5OWwAAAA==";
//!
//! let item = decode_payload(blob).unwrap();
//! assert_eq!(item.item_id().unwrap(), "PET");
//! assert_eq!(item.pet_type().as_deref(), Some("WOLF"));
//! ```

use base64::Engine;
use flate2::read::GzDecoder;
use std::io::Read;

use crate::error::DecodeError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const MAX_DEPTH: usize = 512;

const TAG_END: u8 = 0;
const TAG_BYTE: u8 = 1;
const TAG_SHORT: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BYTE_ARRAY: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_COMPOUND: u8 = 10;
const TAG_INT_ARRAY: u8 = 11;
const TAG_LONG_ARRAY: u8 = 12;

/// A decoded tag payload
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(Vec<Tag>),
    /// Entries in wire order
    Compound(Vec<(String, Tag)>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl Tag {
    pub fn string(value: impl Into<String>) -> Self {
        Tag::String(value.into())
    }

    pub fn compound<K: Into<String>>(entries: impl IntoIterator<Item = (K, Tag)>) -> Self {
        Tag::Compound(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Wire id of this tag's type
    pub fn id(&self) -> u8 {
        match self {
            Tag::Byte(_) => TAG_BYTE,
            Tag::Short(_) => TAG_SHORT,
            Tag::Int(_) => TAG_INT,
            Tag::Long(_) => TAG_LONG,
            Tag::Float(_) => TAG_FLOAT,
            Tag::Double(_) => TAG_DOUBLE,
            Tag::ByteArray(_) => TAG_BYTE_ARRAY,
            Tag::String(_) => TAG_STRING,
            Tag::List(_) => TAG_LIST,
            Tag::Compound(_) => TAG_COMPOUND,
            Tag::IntArray(_) => TAG_INT_ARRAY,
            Tag::LongArray(_) => TAG_LONG_ARRAY,
        }
    }

    /// Child of a compound by name
    pub fn get(&self, key: &str) -> Option<&Tag> {
        match self {
            Tag::Compound(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Tag]> {
        match self {
            Tag::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tag::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Tag::Byte(v) => Some(v.into()),
            Tag::Short(v) => Some(v.into()),
            Tag::Int(v) => Some(v.into()),
            Tag::Long(v) => Some(v),
            _ => None,
        }
    }

    pub fn entries(&self) -> &[(String, Tag)] {
        match self {
            Tag::Compound(entries) => entries,
            _ => &[],
        }
    }
}

/// Root of a decoded item payload
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedItem {
    pub root_name: String,
    pub root: Tag,
}

impl DecodedItem {
    /// `i[0].tag.ExtraAttributes`
    pub fn extra_attributes(&self) -> Option<&Tag> {
        self.root
            .get("i")?
            .as_list()?
            .first()?
            .get("tag")?
            .get("ExtraAttributes")
    }

    /// The item's internal id (`ExtraAttributes.id`)
    pub fn item_id(&self) -> Result<&str, DecodeError> {
        self.extra_attributes()
            .and_then(|attrs| attrs.get("id"))
            .and_then(Tag::as_str)
            .ok_or(DecodeError::MissingAttribute("ExtraAttributes.id"))
    }

    /// Species of a companion pet (`ExtraAttributes.petInfo.type`)
    ///
    /// `petInfo` is a JSON document stored in a string tag.
    pub fn pet_type(&self) -> Option<String> {
        let raw = self.extra_attributes()?.get("petInfo")?.as_str()?;
        let info: serde_json::Value = serde_json::from_str(raw).ok()?;
        info.get("type")?.as_str().map(str::to_uppercase)
    }

    /// Enchantments as upper-cased `"NAME;LEVEL"` pairs, empty when absent
    pub fn enchantments(&self) -> Vec<String> {
        let Some(enchants) = self
            .extra_attributes()
            .and_then(|attrs| attrs.get("enchantments"))
        else {
            return Vec::new();
        };

        enchants
            .entries()
            .iter()
            .map(|(name, level)| {
                let level = level
                    .as_i64()
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| format!("{:?}", level));
                format!("{};{}", name, level).to_uppercase()
            })
            .collect()
    }
}

/// Decode a base64 item payload
pub fn decode_payload(blob: &str) -> Result<DecodedItem, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(blob.trim())
        .map_err(|e| DecodeError::Base64(e.to_string()))?;
    decode_bytes(&bytes)
}

/// Decode raw (optionally gzip-compressed) NBT bytes
pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedItem, DecodeError> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut inflated = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut inflated)
            .map_err(|e| DecodeError::Gzip(e.to_string()))?;
        parse(&inflated)
    } else {
        parse(bytes)
    }
}

fn parse(bytes: &[u8]) -> Result<DecodedItem, DecodeError> {
    let mut reader = Reader { data: bytes, pos: 0 };
    let id = reader.u8()?;
    if id != TAG_COMPOUND {
        return Err(DecodeError::RootNotCompound(id));
    }
    let root_name = reader.string()?;
    let root = reader.payload(TAG_COMPOUND, 0)?;
    Ok(DecodedItem { root_name, root })
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::Truncated { offset: self.pos })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.array::<1>()?[0])
    }

    fn i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, DecodeError> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        let len = u16::from_be_bytes(self.array()?) as usize;
        Ok(String::from_utf8_lossy(self.take(len)?).into_owned())
    }

    /// Length prefix of an array or list, checked against the remaining input
    fn length(&mut self, elem_size: usize) -> Result<usize, DecodeError> {
        let offset = self.pos;
        let len = self.i32()?;
        if len < 0 {
            return Err(DecodeError::NegativeLength { len, offset });
        }
        let len = len as usize;
        if len.saturating_mul(elem_size) > self.data.len() - self.pos {
            return Err(DecodeError::Truncated { offset: self.pos });
        }
        Ok(len)
    }

    fn payload(&mut self, id: u8, depth: usize) -> Result<Tag, DecodeError> {
        if depth > MAX_DEPTH {
            return Err(DecodeError::TooDeep(MAX_DEPTH));
        }

        let tag = match id {
            TAG_BYTE => Tag::Byte(self.u8()? as i8),
            TAG_SHORT => Tag::Short(self.i16()?),
            TAG_INT => Tag::Int(self.i32()?),
            TAG_LONG => Tag::Long(self.i64()?),
            TAG_FLOAT => Tag::Float(f32::from_bits(self.i32()? as u32)),
            TAG_DOUBLE => Tag::Double(f64::from_bits(self.i64()? as u64)),
            TAG_BYTE_ARRAY => {
                let len = self.length(1)?;
                Tag::ByteArray(self.take(len)?.iter().map(|b| *b as i8).collect())
            },
            TAG_STRING => Tag::String(self.string()?),
            TAG_LIST => {
                let elem = self.u8()?;
                // an empty list may declare any element type, including End
                let len = self.length(if elem == TAG_END { 0 } else { 1 })?;
                if len > 0 && elem == TAG_END {
                    return Err(DecodeError::UnknownTag {
                        id: elem,
                        offset: self.pos,
                    });
                }
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.payload(elem, depth + 1)?);
                }
                Tag::List(items)
            },
            TAG_COMPOUND => {
                let mut entries = Vec::new();
                loop {
                    let child = self.u8()?;
                    if child == TAG_END {
                        break;
                    }
                    let name = self.string()?;
                    entries.push((name, self.payload(child, depth + 1)?));
                }
                Tag::Compound(entries)
            },
            TAG_INT_ARRAY => {
                let len = self.length(4)?;
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push(self.i32()?);
                }
                Tag::IntArray(values)
            },
            TAG_LONG_ARRAY => {
                let len = self.length(8)?;
                let mut values = Vec::with_capacity(len);
                for _ in 0..len {
                    values.push(self.i64()?);
                }
                Tag::LongArray(values)
            },
            other => {
                return Err(DecodeError::UnknownTag {
                    id: other,
                    offset: self.pos.saturating_sub(1),
                })
            },
        };

        Ok(tag)
    }
}

/// Encode a named root tag, optionally gzip-compressed
///
/// Only built for tests and fixtures (feature `test-util`).
#[cfg(any(test, feature = "test-util"))]
pub fn encode(root_name: &str, root: &Tag, gzip: bool) -> Vec<u8> {
    let mut out = vec![root.id()];
    write_string(&mut out, root_name);
    write_payload(&mut out, root);

    if !gzip {
        return out;
    }

    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    // writes into a Vec cannot fail
    let _ = encoder.write_all(&out);
    encoder.finish().unwrap_or(out)
}

#[cfg(any(test, feature = "test-util"))]
fn write_string(out: &mut Vec<u8>, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize);
    out.extend_from_slice(&(len as u16).to_be_bytes());
    out.extend_from_slice(&bytes[..len]);
}

#[cfg(any(test, feature = "test-util"))]
fn write_payload(out: &mut Vec<u8>, tag: &Tag) {
    match tag {
        Tag::Byte(v) => out.push(*v as u8),
        Tag::Short(v) => out.extend_from_slice(&v.to_be_bytes()),
        Tag::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
        Tag::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
        Tag::Float(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
        Tag::Double(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
        Tag::ByteArray(values) => {
            out.extend_from_slice(&(values.len() as i32).to_be_bytes());
            out.extend(values.iter().map(|b| *b as u8));
        },
        Tag::String(s) => write_string(out, s),
        Tag::List(items) => {
            out.push(items.first().map(Tag::id).unwrap_or(TAG_END));
            out.extend_from_slice(&(items.len() as i32).to_be_bytes());
            for item in items {
                write_payload(out, item);
            }
        },
        Tag::Compound(entries) => {
            for (name, value) in entries {
                out.push(value.id());
                write_string(out, name);
                write_payload(out, value);
            }
            out.push(TAG_END);
        },
        Tag::IntArray(values) => {
            out.extend_from_slice(&(values.len() as i32).to_be_bytes());
            for v in values {
                out.extend_from_slice(&v.to_be_bytes());
            }
        },
        Tag::LongArray(values) => {
            out.extend_from_slice(&(values.len() as i32).to_be_bytes());
            for v in values {
                out.extend_from_slice(&v.to_be_bytes());
            }
        },
    }
}
