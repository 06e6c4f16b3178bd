//! Metadata V1 (component G): a fixed-size packed extended-metadata record,
//! with its own base64 transport codec. The canonical on-disk form embedded
//! in a RagFile's `extended_metadata` is the raw packed bytes; base64 is a
//! convenience for string-only transport contexts (spec §9).

use sha2::{Digest, Sha256};

use crate::error::{RagFileError, Result};

const LABELS_COUNT: usize = 16;
const DATASET_NAME_LEN: usize = 128;
const DATASET_ROW_ID_LEN: usize = 16;
const SOURCEFILE_NAME_LEN: usize = 128;
const SOURCEFILE_HASH_LEN: usize = 64;

/// Total packed size: 16 * u16 + 128 + 16 + 128 + 64 + i32 + u64.
pub const PACKED_LEN: usize =
    LABELS_COUNT * 2 + DATASET_NAME_LEN + DATASET_ROW_ID_LEN + SOURCEFILE_NAME_LEN + SOURCEFILE_HASH_LEN + 4 + 8;

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataV1 {
    pub labels: [u16; LABELS_COUNT],
    pub dataset_name: String,
    pub dataset_row_id: String,
    pub sourcefile_name: String,
    /// Lowercase hex SHA-256 of the source text, truncated to 64 chars.
    pub sourcefile_hash: String,
    pub chunk_number: i32,
    pub creation_timestamp: u64,
}

fn write_fixed_str(out: &mut Vec<u8>, s: &str, len: usize) -> Result<()> {
    let bytes = s.as_bytes();
    if bytes.len() > len {
        return Err(RagFileError::InvalidArgument(format!(
            "field exceeds {len} bytes: {s:?}"
        )));
    }
    out.extend_from_slice(bytes);
    out.resize(out.len() + (len - bytes.len()), 0);
    Ok(())
}

fn read_fixed_str(buf: &[u8], offset: &mut usize, len: usize) -> Result<String> {
    if buf.len() < *offset + len {
        return Err(RagFileError::Truncated {
            needed: *offset + len,
            available: buf.len(),
        });
    }
    let field = &buf[*offset..*offset + len];
    *offset += len;
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8(field[..end].to_vec())
        .map_err(|e| RagFileError::InvalidArgument(format!("field is not valid UTF-8: {e}")))
}

impl MetadataV1 {
    /// Build a record for `source_text`, computing `sourcefile_hash` and
    /// stamping `creation_timestamp` from the given epoch-seconds value.
    pub fn build(
        dataset_name: &str,
        dataset_row_id: &str,
        sourcefile_name: &str,
        source_text: &str,
        chunk_number: i32,
        labels: &[u16],
        creation_timestamp: u64,
    ) -> Result<Self> {
        if labels.len() > LABELS_COUNT {
            return Err(RagFileError::InvalidArgument(format!(
                "labels: at most {LABELS_COUNT} entries, got {}",
                labels.len()
            )));
        }
        let mut fixed_labels = [0u16; LABELS_COUNT];
        fixed_labels[..labels.len()].copy_from_slice(labels);

        let digest = Sha256::digest(source_text.as_bytes());
        let hex = format!("{digest:x}");
        let sourcefile_hash = hex[..SOURCEFILE_HASH_LEN.min(hex.len())].to_string();

        Ok(Self {
            labels: fixed_labels,
            dataset_name: dataset_name.to_string(),
            dataset_row_id: dataset_row_id.to_string(),
            sourcefile_name: sourcefile_name.to_string(),
            sourcefile_hash,
            chunk_number,
            creation_timestamp,
        })
    }

    /// Serialize to the canonical raw packed bytes.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(PACKED_LEN);
        for label in &self.labels {
            out.extend_from_slice(&label.to_le_bytes());
        }
        write_fixed_str(&mut out, &self.dataset_name, DATASET_NAME_LEN)?;
        write_fixed_str(&mut out, &self.dataset_row_id, DATASET_ROW_ID_LEN)?;
        write_fixed_str(&mut out, &self.sourcefile_name, SOURCEFILE_NAME_LEN)?;
        write_fixed_str(&mut out, &self.sourcefile_hash, SOURCEFILE_HASH_LEN)?;
        out.extend_from_slice(&self.chunk_number.to_le_bytes());
        out.extend_from_slice(&self.creation_timestamp.to_le_bytes());
        debug_assert_eq!(out.len(), PACKED_LEN);
        Ok(out)
    }

    /// Deserialize from the canonical raw packed bytes.
    pub fn deserialize(buf: &[u8]) -> Result<Self> {
        if buf.len() < PACKED_LEN {
            return Err(RagFileError::Truncated {
                needed: PACKED_LEN,
                available: buf.len(),
            });
        }
        let mut offset = 0usize;
        let mut labels = [0u16; LABELS_COUNT];
        for label in &mut labels {
            *label = u16::from_le_bytes([buf[offset], buf[offset + 1]]);
            offset += 2;
        }
        let dataset_name = read_fixed_str(buf, &mut offset, DATASET_NAME_LEN)?;
        let dataset_row_id = read_fixed_str(buf, &mut offset, DATASET_ROW_ID_LEN)?;
        let sourcefile_name = read_fixed_str(buf, &mut offset, SOURCEFILE_NAME_LEN)?;
        let sourcefile_hash = read_fixed_str(buf, &mut offset, SOURCEFILE_HASH_LEN)?;
        let chunk_number = i32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap());
        offset += 4;
        let creation_timestamp = u64::from_le_bytes(buf[offset..offset + 8].try_into().unwrap());

        Ok(Self {
            labels,
            dataset_name,
            dataset_row_id,
            sourcefile_name,
            sourcefile_hash,
            chunk_number,
            creation_timestamp,
        })
    }

    /// Base64 transport encoding — a convenience wrapper, not the canonical form.
    pub fn to_base64(&self) -> Result<String> {
        use base64::Engine;
        Ok(base64::engine::general_purpose::STANDARD.encode(self.serialize()?))
    }

    /// Decode a base64 transport encoding back into a record.
    pub fn from_base64(s: &str) -> Result<Self> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(|e| RagFileError::InvalidArgument(format!("invalid base64 metadata: {e}")))?;
        Self::deserialize(&bytes)
    }
}
