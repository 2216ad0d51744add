//! BinaryCIF decoder.
//!
//! BinaryCIF is the MessagePack encoding of mmCIF in which every column carries
//! a chain of encodings (`ByteArray`, `FixedPoint`, `RunLength`, `Delta`,
//! `IntegerPacking`, `IntervalQuantization`, `StringArray`). Files may be gzipped.
//! Decoding yields the same [`Block`] structure as the text reader.

use super::cif::{Block, Category, Column};
use crate::errors::{Result, SurfaceError};
use flate2::read::GzDecoder;
use rmp::Marker;
use std::io::Read;

/// Upper bound on the number of values a single encoding step may produce.
const MAX_DECODED_LEN: usize = 1 << 30;

/// Decode BinaryCIF bytes (optionally gzip-compressed) into the first data block.
pub fn parse(bytes: &[u8]) -> Result<Block> {
    let inflated;
    let bytes = if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut out = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut out)
            .map_err(|e| SurfaceError::parse(format!("gzip decompression failed: {e}")))?;
        inflated = out;
        &inflated[..]
    } else {
        bytes
    };

    let root = Reader { data: bytes, pos: 0 }.value()?;
    let block = field(&root, "dataBlocks")?
        .as_array()
        .and_then(|blocks| blocks.first())
        .ok_or_else(|| SurfaceError::parse("BinaryCIF file has no data blocks"))?;
    decode_block(block)
}

fn decode_block(node: &Value) -> Result<Block> {
    let name = node.get("header").and_then(Value::as_str).unwrap_or_default();
    let mut block = Block::new(name);
    let categories = field(node, "categories")?
        .as_array()
        .ok_or_else(|| SurfaceError::parse("'categories' is not an array"))?;

    for cat in categories {
        let name = field(cat, "name")?
            .as_str()
            .ok_or_else(|| SurfaceError::parse("category name is not a string"))?;
        let row_count = field(cat, "rowCount")?
            .as_i64()
            .ok_or_else(|| SurfaceError::parse(format!("{name}: rowCount is not an integer")))?;
        let mut category = Category::new(name, usize::try_from(row_count).unwrap_or(0));

        let columns = field(cat, "columns")?
            .as_array()
            .ok_or_else(|| SurfaceError::parse(format!("{name}: 'columns' is not an array")))?;
        for col in columns {
            let col_name = field(col, "name")?
                .as_str()
                .ok_or_else(|| SurfaceError::parse(format!("{name}: column name is not a string")))?;
            let column = decode_column(col).map_err(|e| match e {
                SurfaceError::Parse(msg) => SurfaceError::parse(format!("{name}.{col_name}: {msg}")),
                other => other,
            })?;
            category.push_field(col_name, column)?;
        }
        block.push_category(category);
    }
    Ok(block)
}

/// Decode a column and apply its presence mask.
fn decode_column(col: &Value) -> Result<Column> {
    let data = decode_encoded(field(col, "data")?)?;
    let mask = match col.get("mask") {
        Some(Value::Nil) | None => None,
        Some(mask) => match decode_encoded(mask)? {
            Data::Int(m) => Some(m),
            _ => return Err(SurfaceError::parse("mask must decode to integers")),
        },
    };
    let present = |i: usize| mask.as_ref().map_or(true, |m| m.get(i) == Some(&0));

    Ok(match data {
        Data::Int(v) => Column::Int(
            v.into_iter()
                .enumerate()
                .map(|(i, x)| present(i).then_some(x))
                .collect(),
        ),
        Data::Float(v) => Column::Float(
            v.into_iter()
                .enumerate()
                .map(|(i, x)| present(i).then_some(x))
                .collect(),
        ),
        Data::Text(v) => Column::Text(
            v.into_iter()
                .enumerate()
                .map(|(i, x)| present(i).then_some(x))
                .collect(),
        ),
        Data::Bytes(_) => return Err(SurfaceError::parse("column data left undecoded")),
    })
}

/// Intermediate representation while walking an encoding chain.
#[derive(Debug)]
enum Data {
    Bytes(Vec<u8>),
    Int(Vec<i32>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

/// Decode an `EncodedData` node: `{ data: bin, encoding: [..] }`.
fn decode_encoded(node: &Value) -> Result<Data> {
    let bytes = field(node, "data")?
        .as_bin()
        .ok_or_else(|| SurfaceError::parse("'data' is not binary"))?;
    let encodings = field(node, "encoding")?
        .as_array()
        .ok_or_else(|| SurfaceError::parse("'encoding' is not an array"))?;
    apply_chain(bytes.to_vec(), encodings)
}

/// Encodings are listed in the order they were applied, so decode in reverse.
fn apply_chain(bytes: Vec<u8>, encodings: &[Value]) -> Result<Data> {
    let mut data = Data::Bytes(bytes);
    for enc in encodings.iter().rev() {
        let kind = field(enc, "kind")?
            .as_str()
            .ok_or_else(|| SurfaceError::parse("encoding kind is not a string"))?;
        data = match kind {
            "ByteArray" => byte_array(data, enc)?,
            "FixedPoint" => {
                let factor = num(enc, "factor")?;
                Data::Float(ints(data, kind)?.into_iter().map(|v| v as f64 / factor).collect())
            }
            "IntervalQuantization" => {
                let min = num(enc, "min")?;
                let max = num(enc, "max")?;
                let steps = num(enc, "numSteps")?;
                let delta = if steps > 1.0 { (max - min) / (steps - 1.0) } else { 0.0 };
                Data::Float(ints(data, kind)?.into_iter().map(|v| min + v as f64 * delta).collect())
            }
            "RunLength" => {
                let runs = ints(data, kind)?;
                if runs.len() % 2 != 0 {
                    return Err(SurfaceError::parse("RunLength data has odd length"));
                }
                let total = runs
                    .chunks_exact(2)
                    .try_fold(0usize, |n, pair| n.checked_add(pair[1].max(0) as usize))
                    .filter(|&n| n <= MAX_DECODED_LEN)
                    .ok_or_else(|| SurfaceError::parse("RunLength expands past the column size limit"))?;
                let mut out = Vec::with_capacity(total);
                for pair in runs.chunks_exact(2) {
                    out.extend(std::iter::repeat(pair[0]).take(pair[1].max(0) as usize));
                }
                Data::Int(out)
            }
            "Delta" => {
                let mut acc = enc.get("origin").and_then(Value::as_i64).unwrap_or(0) as i32;
                let mut out = ints(data, kind)?;
                for v in out.iter_mut() {
                    acc = acc.wrapping_add(*v);
                    *v = acc;
                }
                Data::Int(out)
            }
            "IntegerPacking" => integer_packing(ints(data, kind)?, enc)?,
            "StringArray" => string_array(data, enc)?,
            other => {
                return Err(SurfaceError::parse(format!("unknown encoding '{other}'")));
            }
        };
    }
    Ok(data)
}

fn ints(data: Data, kind: &str) -> Result<Vec<i32>> {
    match data {
        Data::Int(v) => Ok(v),
        other => Err(SurfaceError::parse(format!(
            "{kind} expects integer input, got {}",
            data_kind(&other)
        ))),
    }
}

fn data_kind(data: &Data) -> &'static str {
    match data {
        Data::Bytes(_) => "bytes",
        Data::Int(_) => "integers",
        Data::Float(_) => "floats",
        Data::Text(_) => "strings",
    }
}

fn num(enc: &Value, key: &str) -> Result<f64> {
    field(enc, key)?
        .as_f64()
        .ok_or_else(|| SurfaceError::parse(format!("'{key}' is not a number")))
}

/// Little-endian typed array view of raw bytes.
fn byte_array(data: Data, enc: &Value) -> Result<Data> {
    let Data::Bytes(bytes) = data else {
        return Err(SurfaceError::parse("ByteArray expects raw bytes"));
    };
    let ty = field(enc, "type")?
        .as_i64()
        .ok_or_else(|| SurfaceError::parse("ByteArray type is not an integer"))?;

    fn chunks<const N: usize>(bytes: &[u8]) -> Result<impl Iterator<Item = [u8; N]> + '_> {
        let chunks = bytes.chunks_exact(N);
        if !chunks.remainder().is_empty() {
            return Err(SurfaceError::parse(format!(
                "ByteArray of {} bytes is not a multiple of {N}",
                bytes.len()
            )));
        }
        Ok(chunks.map(|c| {
            let mut a = [0u8; N];
            a.copy_from_slice(c);
            a
        }))
    }

    Ok(match ty {
        1 => Data::Int(bytes.iter().map(|&b| i32::from(b as i8)).collect()),
        2 => Data::Int(chunks::<2>(&bytes)?.map(|c| i32::from(i16::from_le_bytes(c))).collect()),
        3 => Data::Int(chunks::<4>(&bytes)?.map(i32::from_le_bytes).collect()),
        4 => Data::Int(bytes.iter().map(|&b| i32::from(b)).collect()),
        5 => Data::Int(chunks::<2>(&bytes)?.map(|c| i32::from(u16::from_le_bytes(c))).collect()),
        6 => Data::Int(chunks::<4>(&bytes)?.map(|c| u32::from_le_bytes(c) as i32).collect()),
        32 => Data::Float(chunks::<4>(&bytes)?.map(|c| f64::from(f32::from_le_bytes(c))).collect()),
        33 => Data::Float(chunks::<8>(&bytes)?.map(f64::from_le_bytes).collect()),
        other => return Err(SurfaceError::parse(format!("unknown ByteArray type {other}"))),
    })
}

/// Values equal to the packing limits continue into the next element.
fn integer_packing(packed: Vec<i32>, enc: &Value) -> Result<Data> {
    let byte_count = field(enc, "byteCount")?.as_i64().unwrap_or(1);
    let src_size = field(enc, "srcSize")?.as_i64().unwrap_or(0).max(0) as usize;
    let unsigned = enc.get("isUnsigned").and_then(Value::as_bool).unwrap_or(false);
    let (upper, lower) = match (unsigned, byte_count) {
        (true, 1) => (0xFF, 0),
        (true, _) => (0xFFFF, 0),
        (false, 1) => (0x7F, -0x80),
        (false, _) => (0x7FFF, -0x8000),
    };

    // srcSize comes from the file; every output value consumes at least one input
    let mut out = Vec::with_capacity(src_size.min(packed.len()));
    let mut values = packed.into_iter();
    while out.len() < src_size {
        let mut acc = 0i32;
        loop {
            let Some(v) = values.next() else {
                return Err(SurfaceError::parse("IntegerPacking ran out of data"));
            };
            acc = acc
                .checked_add(v)
                .ok_or_else(|| SurfaceError::parse("IntegerPacking value overflows i32"))?;
            // Unsigned packing has no lower sentinel
            let continues = v == upper || (!unsigned && v == lower);
            if !continues {
                break;
            }
        }
        out.push(acc);
    }
    Ok(Data::Int(out))
}

fn string_array(data: Data, enc: &Value) -> Result<Data> {
    let Data::Bytes(bytes) = data else {
        return Err(SurfaceError::parse("StringArray expects raw bytes"));
    };
    let strings = field(enc, "stringData")?
        .as_str()
        .ok_or_else(|| SurfaceError::parse("stringData is not a string"))?;
    let offset_bytes = field(enc, "offsets")?
        .as_bin()
        .ok_or_else(|| SurfaceError::parse("offsets are not binary"))?;
    let offset_chain = field(enc, "offsetEncoding")?
        .as_array()
        .ok_or_else(|| SurfaceError::parse("offsetEncoding is not an array"))?;
    let data_chain = field(enc, "dataEncoding")?
        .as_array()
        .ok_or_else(|| SurfaceError::parse("dataEncoding is not an array"))?;

    let offsets = ints(apply_chain(offset_bytes.to_vec(), offset_chain)?, "StringArray offsets")?;
    let table = offsets
        .windows(2)
        .map(|w| {
            let (start, end) = (w[0] as usize, w[1] as usize);
            strings
                .get(start..end)
                .ok_or_else(|| SurfaceError::parse("string offset out of bounds"))
        })
        .collect::<Result<Vec<&str>>>()?;

    let indices = ints(apply_chain(bytes, data_chain)?, "StringArray indices")?;
    Ok(Data::Text(
        indices
            .into_iter()
            .map(|i| {
                usize::try_from(i)
                    .ok()
                    .and_then(|i| table.get(i))
                    .map_or_else(String::new, |s| s.to_string())
            })
            .collect(),
    ))
}

fn field<'a>(node: &'a Value, key: &str) -> Result<&'a Value> {
    node.get(key)
        .ok_or_else(|| SurfaceError::parse(format!("missing key '{key}'")))
}

/// MessagePack document tree.
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bin(Vec<u8>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    fn get(&self, key: &str) -> Option<&Value> {
        let Value::Map(pairs) = self else { return None };
        pairs
            .iter()
            .find(|(k, _)| matches!(k, Value::Str(s) if s == key))
            .map(|(_, v)| v)
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn as_bin(&self) -> Option<&[u8]> {
        match self {
            Value::Bin(b) => Some(b),
            _ => None,
        }
    }

    fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }
}

/// Cursor over a MessagePack buffer. Markers are read with `rmp`, payloads by hand.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| SurfaceError::parse("unexpected end of MessagePack data"))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn be<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn len8(&mut self) -> Result<usize> {
        Ok(usize::from(self.be::<1>()?[0]))
    }

    fn len16(&mut self) -> Result<usize> {
        Ok(usize::from(u16::from_be_bytes(self.be()?)))
    }

    fn len32(&mut self) -> Result<usize> {
        Ok(u32::from_be_bytes(self.be()?) as usize)
    }

    fn value(&mut self) -> Result<Value> {
        let mut rest = &self.data[self.pos..];
        let before = rest.len();
        let marker = rmp::decode::read_marker(&mut rest)
            .map_err(|_| SurfaceError::parse("invalid MessagePack marker"))?;
        self.pos += before - rest.len();

        Ok(match marker {
            Marker::Null => Value::Nil,
            Marker::True => Value::Bool(true),
            Marker::False => Value::Bool(false),
            Marker::FixPos(v) => Value::Int(i64::from(v)),
            Marker::FixNeg(v) => Value::Int(i64::from(v)),
            Marker::U8 => Value::Int(i64::from(self.be::<1>()?[0])),
            Marker::U16 => Value::Int(i64::from(u16::from_be_bytes(self.be()?))),
            Marker::U32 => Value::Int(i64::from(u32::from_be_bytes(self.be()?))),
            Marker::U64 => Value::Int(u64::from_be_bytes(self.be()?) as i64),
            Marker::I8 => Value::Int(i64::from(self.be::<1>()?[0] as i8)),
            Marker::I16 => Value::Int(i64::from(i16::from_be_bytes(self.be()?))),
            Marker::I32 => Value::Int(i64::from(i32::from_be_bytes(self.be()?))),
            Marker::I64 => Value::Int(i64::from_be_bytes(self.be()?)),
            Marker::F32 => Value::Float(f64::from(f32::from_be_bytes(self.be()?))),
            Marker::F64 => Value::Float(f64::from_be_bytes(self.be()?)),
            Marker::FixStr(n) => self.string(usize::from(n))?,
            Marker::Str8 => {
                let n = self.len8()?;
                self.string(n)?
            }
            Marker::Str16 => {
                let n = self.len16()?;
                self.string(n)?
            }
            Marker::Str32 => {
                let n = self.len32()?;
                self.string(n)?
            }
            Marker::Bin8 => {
                let n = self.len8()?;
                Value::Bin(self.take(n)?.to_vec())
            }
            Marker::Bin16 => {
                let n = self.len16()?;
                Value::Bin(self.take(n)?.to_vec())
            }
            Marker::Bin32 => {
                let n = self.len32()?;
                Value::Bin(self.take(n)?.to_vec())
            }
            Marker::FixArray(n) => self.array(usize::from(n))?,
            Marker::Array16 => {
                let n = self.len16()?;
                self.array(n)?
            }
            Marker::Array32 => {
                let n = self.len32()?;
                self.array(n)?
            }
            Marker::FixMap(n) => self.map(usize::from(n))?,
            Marker::Map16 => {
                let n = self.len16()?;
                self.map(n)?
            }
            Marker::Map32 => {
                let n = self.len32()?;
                self.map(n)?
            }
            other => {
                return Err(SurfaceError::parse(format!(
                    "unsupported MessagePack marker {other:?}"
                )))
            }
        })
    }

    fn string(&mut self, n: usize) -> Result<Value> {
        let bytes = self.take(n)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| SurfaceError::parse(format!("invalid UTF-8 in MessagePack string: {e}")))?;
        Ok(Value::Str(s.to_string()))
    }

    fn array(&mut self, n: usize) -> Result<Value> {
        (0..n)
            .map(|_| self.value())
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }

    fn map(&mut self, n: usize) -> Result<Value> {
        (0..n)
            .map(|_| Ok((self.value()?, self.value()?)))
            .collect::<Result<Vec<_>>>()
            .map(Value::Map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    // Minimal MessagePack writer for building fixtures
    fn w_str(out: &mut Vec<u8>, s: &str) {
        rmp::encode::write_str(out, s).unwrap();
    }

    fn w_bin(out: &mut Vec<u8>, b: &[u8]) {
        rmp::encode::write_bin(out, b).unwrap();
    }

    fn w_int(out: &mut Vec<u8>, v: i64) {
        rmp::encode::write_sint(out, v).unwrap();
    }

    fn byte_array_enc(out: &mut Vec<u8>, ty: i64) {
        rmp::encode::write_map_len(out, 2).unwrap();
        w_str(out, "kind");
        w_str(out, "ByteArray");
        w_str(out, "type");
        w_int(out, ty);
    }

    /// One category `_test` with an int column (delta + run-length), a float
    /// column (fixed point) and a string column with a mask.
    fn fixture() -> Vec<u8> {
        let mut out = Vec::new();
        rmp::encode::write_map_len(&mut out, 2).unwrap();
        w_str(&mut out, "version");
        w_str(&mut out, "0.3.0");
        w_str(&mut out, "dataBlocks");
        rmp::encode::write_array_len(&mut out, 1).unwrap();
        rmp::encode::write_map_len(&mut out, 2).unwrap();
        w_str(&mut out, "header");
        w_str(&mut out, "TEST");
        w_str(&mut out, "categories");
        rmp::encode::write_array_len(&mut out, 1).unwrap();

        rmp::encode::write_map_len(&mut out, 3).unwrap();
        w_str(&mut out, "name");
        w_str(&mut out, "_test");
        w_str(&mut out, "rowCount");
        w_int(&mut out, 3);
        w_str(&mut out, "columns");
        rmp::encode::write_array_len(&mut out, 3).unwrap();

        // id: RunLength([1, 3]) then Delta(origin 10) => [11, 12, 13]
        rmp::encode::write_map_len(&mut out, 3).unwrap();
        w_str(&mut out, "name");
        w_str(&mut out, "id");
        w_str(&mut out, "data");
        rmp::encode::write_map_len(&mut out, 2).unwrap();
        w_str(&mut out, "data");
        let raw: Vec<u8> = [1i32, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
        w_bin(&mut out, &raw);
        w_str(&mut out, "encoding");
        rmp::encode::write_array_len(&mut out, 3).unwrap();
        rmp::encode::write_map_len(&mut out, 3).unwrap();
        w_str(&mut out, "kind");
        w_str(&mut out, "Delta");
        w_str(&mut out, "origin");
        w_int(&mut out, 10);
        w_str(&mut out, "srcType");
        w_int(&mut out, 3);
        rmp::encode::write_map_len(&mut out, 3).unwrap();
        w_str(&mut out, "kind");
        w_str(&mut out, "RunLength");
        w_str(&mut out, "srcType");
        w_int(&mut out, 3);
        w_str(&mut out, "srcSize");
        w_int(&mut out, 3);
        byte_array_enc(&mut out, 3);
        w_str(&mut out, "mask");
        rmp::encode::write_nil(&mut out).unwrap();

        // x: FixedPoint(100) over int32 => [1.5, -2.25, 0.0]
        rmp::encode::write_map_len(&mut out, 3).unwrap();
        w_str(&mut out, "name");
        w_str(&mut out, "x");
        w_str(&mut out, "data");
        rmp::encode::write_map_len(&mut out, 2).unwrap();
        w_str(&mut out, "data");
        let raw: Vec<u8> = [150i32, -225, 0].iter().flat_map(|v| v.to_le_bytes()).collect();
        w_bin(&mut out, &raw);
        w_str(&mut out, "encoding");
        rmp::encode::write_array_len(&mut out, 2).unwrap();
        rmp::encode::write_map_len(&mut out, 3).unwrap();
        w_str(&mut out, "kind");
        w_str(&mut out, "FixedPoint");
        w_str(&mut out, "factor");
        w_int(&mut out, 100);
        w_str(&mut out, "srcType");
        w_int(&mut out, 33);
        byte_array_enc(&mut out, 3);
        w_str(&mut out, "mask");
        rmp::encode::write_nil(&mut out).unwrap();

        // name: StringArray ["A", "BC"], indices [0, 1, 0], third row masked as '?'
        rmp::encode::write_map_len(&mut out, 3).unwrap();
        w_str(&mut out, "name");
        w_str(&mut out, "name");
        w_str(&mut out, "data");
        rmp::encode::write_map_len(&mut out, 2).unwrap();
        w_str(&mut out, "data");
        w_bin(&mut out, &[0, 1, 0]);
        w_str(&mut out, "encoding");
        rmp::encode::write_array_len(&mut out, 1).unwrap();
        rmp::encode::write_map_len(&mut out, 5).unwrap();
        w_str(&mut out, "kind");
        w_str(&mut out, "StringArray");
        w_str(&mut out, "dataEncoding");
        rmp::encode::write_array_len(&mut out, 1).unwrap();
        byte_array_enc(&mut out, 4);
        w_str(&mut out, "stringData");
        w_str(&mut out, "ABC");
        w_str(&mut out, "offsetEncoding");
        rmp::encode::write_array_len(&mut out, 1).unwrap();
        byte_array_enc(&mut out, 4);
        w_str(&mut out, "offsets");
        w_bin(&mut out, &[0, 1, 3]);
        w_str(&mut out, "mask");
        rmp::encode::write_map_len(&mut out, 2).unwrap();
        w_str(&mut out, "data");
        w_bin(&mut out, &[0, 0, 2]);
        w_str(&mut out, "encoding");
        rmp::encode::write_array_len(&mut out, 1).unwrap();
        byte_array_enc(&mut out, 4);

        out
    }

    #[test]
    fn decodes_encoding_chains_and_masks() {
        let block = parse(&fixture()).unwrap();
        assert_eq!(block.name, "TEST");
        let cat = block.category("test").unwrap();
        assert_eq!(cat.row_count(), 3);

        let id = cat.field("id").unwrap();
        assert_eq!((0..3).map(|i| id.i32(i)).collect::<Vec<_>>(), vec![Some(11), Some(12), Some(13)]);

        let x = cat.field("x").unwrap();
        assert_eq!(x.f64(0), Some(1.5));
        assert_eq!(x.f64(1), Some(-2.25));

        let name = cat.field("name").unwrap();
        assert_eq!(name.str(0).as_deref(), Some("A"));
        assert_eq!(name.str(1).as_deref(), Some("BC"));
        assert_eq!(name.str(2), None);
    }

    #[test]
    fn gzipped_input_is_inflated() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&fixture()).unwrap();
        let gz = encoder.finish().unwrap();
        let block = parse(&gz).unwrap();
        assert_eq!(block.category("test").unwrap().row_count(), 3);
    }

    #[test]
    fn integer_packing_accumulates_sentinels() {
        let mut enc = Vec::new();
        rmp::encode::write_map_len(&mut enc, 3).unwrap();
        w_str(&mut enc, "byteCount");
        w_int(&mut enc, 1);
        w_str(&mut enc, "srcSize");
        w_int(&mut enc, 3);
        w_str(&mut enc, "isUnsigned");
        rmp::encode::write_bool(&mut enc, false).unwrap();
        let enc = Reader { data: &enc, pos: 0 }.value().unwrap();

        let Data::Int(v) = integer_packing(vec![127, 3, -128, -2, 5], &enc).unwrap() else {
            panic!("expected integers");
        };
        assert_eq!(v, vec![130, -130, 5]);
    }

    fn encoding(pairs: &[(&str, Value)]) -> Value {
        Value::Map(
            pairs
                .iter()
                .map(|(k, v)| (Value::Str(k.to_string()), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn integer_packing_rejects_bad_sizes() {
        let enc = encoding(&[
            ("byteCount", Value::Int(1)),
            ("srcSize", Value::Int(i64::MAX)),
            ("isUnsigned", Value::Bool(false)),
        ]);
        assert!(matches!(
            integer_packing(vec![1, 2], &enc),
            Err(SurfaceError::Parse(_))
        ));

        let enc = encoding(&[
            ("byteCount", Value::Int(2)),
            ("srcSize", Value::Int(1)),
            ("isUnsigned", Value::Bool(true)),
        ]);
        let sentinels = vec![0xFFFF; 40_000];
        assert!(matches!(
            integer_packing(sentinels, &enc),
            Err(SurfaceError::Parse(_))
        ));
    }

    #[test]
    fn run_length_is_bounded() {
        let chain = [encoding(&[("kind", Value::Str("RunLength".into()))])];
        let mut bytes = Vec::new();
        for v in [7i32, i32::MAX, 8, i32::MAX] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let byte_array = encoding(&[("kind", Value::Str("ByteArray".into())), ("type", Value::Int(3))]);
        let err = apply_chain(bytes, &[chain[0].clone(), byte_array.clone()]);
        assert!(matches!(err, Err(SurfaceError::Parse(_))));

        let mut bytes = Vec::new();
        for v in [7i32, 3, 8, 1] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let Data::Int(v) = apply_chain(bytes, &[chain[0].clone(), byte_array]).unwrap() else {
            panic!("expected integers");
        };
        assert_eq!(v, vec![7, 7, 7, 8]);
    }

    #[test]
    fn byte_array_length_must_match_element_size() {
        let int32 = encoding(&[("type", Value::Int(3))]);
        assert!(matches!(
            byte_array(Data::Bytes(vec![1, 0, 0, 0, 2]), &int32),
            Err(SurfaceError::Parse(_))
        ));
        let float64 = encoding(&[("type", Value::Int(33))]);
        assert!(byte_array(Data::Bytes(vec![0; 12]), &float64).is_err());
        let Data::Int(v) = byte_array(Data::Bytes(vec![1, 0, 0, 0, 2, 0, 0, 0]), &int32).unwrap() else {
            panic!("expected integers");
        };
        assert_eq!(v, vec![1, 2]);
    }

    #[test]
    fn truncated_input_is_a_parse_error() {
        let bytes = fixture();
        assert!(matches!(
            parse(&bytes[..bytes.len() / 2]),
            Err(SurfaceError::Parse(_))
        ));
    }
}
