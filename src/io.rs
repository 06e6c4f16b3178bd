//! Serialization to/from the compact binary representation (component F).
//! Little-endian, tightly packed, no implicit padding; readers reject
//! unknown magic, unknown version, or any length field exceeding the
//! remaining input.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{RagFileError, Result};
use crate::header::{DenseVector, Flags, RagFileHeader, CURRENT_VERSION, EMBEDDING_ID_LEN, MAGIC, TOKENIZER_ID_LEN};
use crate::record::RagFile;

// ---------------------------------------------------------------------------
// Byte-level writer helpers
// ---------------------------------------------------------------------------

fn write_zero_padded(out: &mut Vec<u8>, s: &str, len: usize) {
    let bytes = s.as_bytes();
    out.extend_from_slice(bytes);
    out.resize(out.len() + (len - bytes.len()), 0);
}

fn write_dense_vector(out: &mut Vec<u8>, dense: &DenseVector) {
    match dense {
        DenseVector::F16(v) => {
            for &x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
        DenseVector::F32(v) => {
            for &x in v {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
    }
}

fn write_matrix(out: &mut Vec<u8>, matrix: &[Vec<f32>], as_f16: bool) {
    for row in matrix {
        for &x in row {
            if as_f16 {
                out.extend_from_slice(&crate::float16::f32_to_f16(x).to_le_bytes());
            } else {
                out.extend_from_slice(&x.to_le_bytes());
            }
        }
    }
}

/// Serialize `record` to the canonical byte sequence.
pub fn dumps(record: &RagFile) -> Result<Vec<u8>> {
    record.header.validate()?;

    let h = &record.header;
    let mut out = Vec::new();

    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&h.version.to_le_bytes());
    out.extend_from_slice(&h.flags.0.to_le_bytes());
    write_zero_padded(&mut out, &h.tokenizer_id, TOKENIZER_ID_LEN);
    write_zero_padded(&mut out, &h.embedding_id, EMBEDDING_ID_LEN);
    out.extend_from_slice(&h.metadata_version.to_le_bytes());
    out.extend_from_slice(&h.minhash_permute.to_le_bytes());
    for &word in &h.minhash {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out.extend_from_slice(&h.scan_vector_dim.to_le_bytes());
    out.extend_from_slice(&h.scan_vector);
    out.extend_from_slice(&h.dense_vector_dim.to_le_bytes());
    write_dense_vector(&mut out, &h.dense_vector);
    out.extend_from_slice(&(h.extended_metadata.len() as u32).to_le_bytes());
    out.extend_from_slice(&h.extended_metadata);

    let text_bytes = record.text.as_bytes();
    out.extend_from_slice(&(text_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(text_bytes);

    out.extend_from_slice(&(record.token_ids.len() as u32).to_le_bytes());
    for &t in &record.token_ids {
        out.extend_from_slice(&t.to_le_bytes());
    }

    match &record.embeddings {
        Some(matrix) => {
            let rows = matrix.len() as u32;
            let cols = matrix.first().map(|r| r.len()).unwrap_or(0) as u32;
            out.extend_from_slice(&rows.to_le_bytes());
            out.extend_from_slice(&cols.to_le_bytes());
            write_matrix(&mut out, matrix, h.dense_vector.is_f16());
        }
        None => {
            out.extend_from_slice(&0u32.to_le_bytes());
            out.extend_from_slice(&0u32.to_le_bytes());
        }
    }

    Ok(out)
}

/// Write `record`'s canonical byte sequence to `sink`.
pub fn dump(record: &RagFile, sink: &mut impl Write) -> Result<()> {
    let bytes = dumps(record)?;
    sink.write_all(&bytes)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Byte-level reader helpers
// ---------------------------------------------------------------------------

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.buf.len() - self.pos < n {
            return Err(RagFileError::Truncated {
                needed: n,
                available: self.buf.len() - self.pos,
            });
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn zero_padded_string(&mut self, len: usize) -> Result<String> {
        let field = self.take(len)?;
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        String::from_utf8(field[..end].to_vec())
            .map_err(|e| RagFileError::InvalidArgument(format!("non-UTF-8 string field: {e}")))
    }
}

/// Deserialize a record from the canonical byte sequence.
pub fn loads(bytes: &[u8]) -> Result<RagFile> {
    let mut c = Cursor::new(bytes);

    let magic_bytes = c.take(4)?;
    if magic_bytes != MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(magic_bytes);
        return Err(RagFileError::MagicMismatch { found });
    }

    let version = c.u16()?;
    if version != CURRENT_VERSION {
        return Err(RagFileError::VersionMismatch {
            found: version,
            supported: CURRENT_VERSION,
        });
    }

    let flags = Flags(c.u16()?);
    let tokenizer_id = c.zero_padded_string(TOKENIZER_ID_LEN)?;
    let embedding_id = c.zero_padded_string(EMBEDDING_ID_LEN)?;
    let metadata_version = c.u16()?;
    let minhash_permute = c.u16()?;

    let mut minhash = Vec::with_capacity(minhash_permute as usize);
    for _ in 0..minhash_permute {
        minhash.push(c.u64()?);
    }

    let scan_vector_dim = c.u32()?;
    let scan_vector = c.take(scan_vector_dim as usize / 8)?.to_vec();

    let dense_vector_dim = c.u32()?;
    let dense_vector = if flags.dense_is_f16() {
        let mut v = Vec::with_capacity(dense_vector_dim as usize);
        for _ in 0..dense_vector_dim {
            v.push(c.u16()?);
        }
        DenseVector::F16(v)
    } else {
        let mut v = Vec::with_capacity(dense_vector_dim as usize);
        for _ in 0..dense_vector_dim {
            v.push(c.f32()?);
        }
        DenseVector::F32(v)
    };

    let extended_metadata_len = c.u32()? as usize;
    let extended_metadata = c.take(extended_metadata_len)?.to_vec();

    let header = RagFileHeader {
        version,
        flags,
        tokenizer_id,
        embedding_id,
        metadata_version,
        minhash_permute,
        minhash,
        scan_vector_dim,
        scan_vector,
        dense_vector_dim,
        dense_vector,
        extended_metadata,
    };
    header.validate()?;

    let text_len = c.u32()? as usize;
    let text = String::from_utf8(c.take(text_len)?.to_vec())
        .map_err(|e| RagFileError::InvalidArgument(format!("text is not valid UTF-8: {e}")))?;

    let token_ids_len = c.u32()? as usize;
    let mut token_ids = Vec::with_capacity(token_ids_len);
    for _ in 0..token_ids_len {
        token_ids.push(c.u32()?);
    }

    let embeddings_rows = c.u32()? as usize;
    let embeddings_cols = c.u32()? as usize;
    let embeddings = if embeddings_rows == 0 {
        None
    } else {
        let mut matrix = Vec::with_capacity(embeddings_rows);
        for _ in 0..embeddings_rows {
            let mut row = Vec::with_capacity(embeddings_cols);
            for _ in 0..embeddings_cols {
                if header.flags.dense_is_f16() {
                    row.push(crate::float16::f16_to_f32(c.u16()?));
                } else {
                    row.push(c.f32()?);
                }
            }
            matrix.push(row);
        }
        Some(matrix)
    };

    Ok(RagFile {
        header,
        text,
        token_ids,
        embeddings,
    })
}

/// Read and deserialize a record from `source`.
pub fn load(source: &mut impl Read) -> Result<RagFile> {
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes)?;
    loads(&bytes)
}

// ---------------------------------------------------------------------------
// Streaming reads for the top-k scanner — header only, or header + the
// embeddings matrix, without materializing text/token_ids/body at all.
// ---------------------------------------------------------------------------

fn io_u16<R: Read>(r: &mut R) -> Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn io_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn io_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

fn io_f32<R: Read>(r: &mut R) -> Result<f32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(f32::from_le_bytes(b))
}

fn io_bytes<R: Read>(r: &mut R, n: usize) -> Result<Vec<u8>> {
    let mut b = vec![0u8; n];
    r.read_exact(&mut b)?;
    Ok(b)
}

fn io_zero_padded_string<R: Read>(r: &mut R, len: usize) -> Result<String> {
    let field = io_bytes(r, len)?;
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8(field[..end].to_vec())
        .map_err(|e| RagFileError::InvalidArgument(format!("non-UTF-8 string field: {e}")))
}

/// Read and validate just the header from a stream — the scanner's fast path
/// for `jaccard`/`hamming`, which never touch the body.
pub fn read_header_from<R: Read>(r: &mut R) -> Result<RagFileHeader> {
    let magic_bytes = io_bytes(r, 4)?;
    if magic_bytes != MAGIC {
        let mut found = [0u8; 4];
        found.copy_from_slice(&magic_bytes);
        return Err(RagFileError::MagicMismatch { found });
    }

    let version = io_u16(r)?;
    if version != CURRENT_VERSION {
        return Err(RagFileError::VersionMismatch {
            found: version,
            supported: CURRENT_VERSION,
        });
    }

    let flags = Flags(io_u16(r)?);
    let tokenizer_id = io_zero_padded_string(r, TOKENIZER_ID_LEN)?;
    let embedding_id = io_zero_padded_string(r, EMBEDDING_ID_LEN)?;
    let metadata_version = io_u16(r)?;
    let minhash_permute = io_u16(r)?;

    let mut minhash = Vec::with_capacity(minhash_permute as usize);
    for _ in 0..minhash_permute {
        minhash.push(io_u64(r)?);
    }

    let scan_vector_dim = io_u32(r)?;
    let scan_vector = io_bytes(r, scan_vector_dim as usize / 8)?;

    let dense_vector_dim = io_u32(r)?;
    let dense_vector = if flags.dense_is_f16() {
        let mut v = Vec::with_capacity(dense_vector_dim as usize);
        for _ in 0..dense_vector_dim {
            v.push(io_u16(r)?);
        }
        DenseVector::F16(v)
    } else {
        let mut v = Vec::with_capacity(dense_vector_dim as usize);
        for _ in 0..dense_vector_dim {
            v.push(io_f32(r)?);
        }
        DenseVector::F32(v)
    };

    let extended_metadata_len = io_u32(r)? as usize;
    let extended_metadata = io_bytes(r, extended_metadata_len)?;

    let header = RagFileHeader {
        version,
        flags,
        tokenizer_id,
        embedding_id,
        metadata_version,
        minhash_permute,
        minhash,
        scan_vector_dim,
        scan_vector,
        dense_vector_dim,
        dense_vector,
        extended_metadata,
    };
    header.validate()?;
    Ok(header)
}

/// Continue reading immediately after [`read_header_from`] left off, skipping
/// `text`/`token_ids` without materializing them, and return the embeddings
/// matrix if the header's embeddings flag is set.
pub fn read_embeddings_after_header<R: Read + Seek>(
    r: &mut R,
    header: &RagFileHeader,
) -> Result<Option<Vec<Vec<f32>>>> {
    let text_len = io_u32(r)? as i64;
    r.seek(SeekFrom::Current(text_len))?;

    let token_ids_len = io_u32(r)? as i64;
    r.seek(SeekFrom::Current(token_ids_len * 4))?;

    let rows = io_u32(r)? as usize;
    let cols = io_u32(r)? as usize;
    if rows == 0 {
        return Ok(None);
    }

    let mut matrix = Vec::with_capacity(rows);
    for _ in 0..rows {
        let mut row = Vec::with_capacity(cols);
        for _ in 0..cols {
            if header.flags.dense_is_f16() {
                row.push(crate::float16::f16_to_f32(io_u16(r)?));
            } else {
                row.push(io_f32(r)?);
            }
        }
        matrix.push(row);
    }
    Ok(Some(matrix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuilderConfig;
    use crate::record::EmbeddingInput;

    fn sample() -> RagFile {
        RagFile::new(
            "Sample text",
            &[1, 2, 3, 4],
            EmbeddingInput::Single(vec![0.1, 0.2, 0.3, 0.4]),
            "some-huggingface/tokenizer_id",
            "some/embedding_id_str",
            1,
            None,
            &BuilderConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn round_trip_is_bit_exact_on_reserialize() {
        let r = sample();
        let bytes = dumps(&r).unwrap();
        let back = loads(&bytes).unwrap();
        assert_eq!(back, r);
        let bytes2 = dumps(&back).unwrap();
        assert_eq!(bytes, bytes2);
    }

    #[test]
    fn dump_load_round_trips_through_a_stream() {
        let r = sample();
        let mut buf = Vec::new();
        dump(&r, &mut buf).unwrap();
        let mut cursor = std::io::Cursor::new(buf);
        let back = load(&mut cursor).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn rejects_wrong_magic() {
        let mut bytes = dumps(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(loads(&bytes), Err(RagFileError::MagicMismatch { .. })));
    }

    #[test]
    fn rejects_unknown_version() {
        let mut bytes = dumps(&sample()).unwrap();
        bytes[4] = 0xFF;
        bytes[5] = 0xFF;
        assert!(matches!(loads(&bytes), Err(RagFileError::VersionMismatch { .. })));
    }

    #[test]
    fn rejects_truncated_input() {
        let bytes = dumps(&sample()).unwrap();
        let truncated = &bytes[..bytes.len() - 20];
        assert!(matches!(loads(truncated), Err(RagFileError::Truncated { .. })));
    }

    #[test]
    fn embedding_round_trips_within_f16_tolerance() {
        let r = sample();
        let back = loads(&dumps(&r).unwrap()).unwrap();
        let original = r.header.dense_vector.to_f32();
        let restored = back.header.dense_vector.to_f32();
        for (a, b) in original.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-3);
        }
    }

    #[test]
    fn f32_precision_round_trips_exactly() {
        let mut cfg = BuilderConfig::default();
        cfg.store_dense_as_f16 = false;
        let r = RagFile::new(
            "Sample text",
            &[1, 2, 3, 4],
            EmbeddingInput::Single(vec![0.1, 0.2, 0.3, 0.4]),
            "tok",
            "emb",
            1,
            None,
            &cfg,
        )
        .unwrap();
        let back = loads(&dumps(&r).unwrap()).unwrap();
        let original = r.header.dense_vector.to_f32();
        let restored = back.header.dense_vector.to_f32();
        for (a, b) in original.iter().zip(restored.iter()) {
            assert!((a - b).abs() < 1e-7);
        }
    }

    #[test]
    fn embeddings_matrix_round_trips() {
        let r = RagFile::new(
            "multi chunk",
            &[1, 2, 3],
            EmbeddingInput::Matrix(vec![vec![0.1, 0.2], vec![0.3, 0.4]]),
            "tok",
            "emb",
            1,
            None,
            &BuilderConfig::default(),
        )
        .unwrap();
        let back = loads(&dumps(&r).unwrap()).unwrap();
        assert_eq!(back.embeddings.as_ref().unwrap().len(), 2);
    }
}
