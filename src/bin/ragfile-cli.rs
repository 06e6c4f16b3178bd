use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ignore::WalkBuilder;
use indicatif::{ProgressBar, ProgressStyle};
use ragfile::config::load_config;
use ragfile::error::RagFileError;
use ragfile::metadata::MetadataV1;
use ragfile::record::EmbeddingInput;
use ragfile::scan::{match_top_k, ScanMatch, ScanMethod};
use ragfile::{io, RagFile};
use serde_json::{json, Value};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "ragfile-cli")]
#[command(version)]
#[command(about = "Build, inspect, and similarity-scan RagFile containers")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Build a .rag file from a JSON description of (text, token_ids, embedding, ...).
    Build {
        /// JSON input path; reads stdin when omitted.
        #[arg(long, value_name = "PATH")]
        input: Option<PathBuf>,

        /// Output .rag path.
        #[arg(long, short = 'o', value_name = "PATH")]
        output: PathBuf,

        /// Optional builder config JSON; falls back to defaults when absent.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Print a .rag file's header fields as JSON without loading the body.
    Inspect {
        /// Path to the .rag file.
        path: PathBuf,
    },

    /// Rank a directory of .rag files against a query .rag by similarity.
    Match {
        /// Path to the query .rag file.
        query: PathBuf,

        /// Directory to walk for candidate .rag files.
        dir: PathBuf,

        /// Number of top matches to keep.
        #[arg(long, default_value_t = 10)]
        top_k: usize,

        /// Similarity method.
        #[arg(long, value_enum, default_value = "cosine")]
        method: MethodArg,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum MethodArg {
    Jaccard,
    Hamming,
    Cosine,
}

impl From<MethodArg> for ScanMethod {
    fn from(m: MethodArg) -> Self {
        match m {
            MethodArg::Jaccard => ScanMethod::Jaccard,
            MethodArg::Hamming => ScanMethod::Hamming,
            MethodArg::Cosine => ScanMethod::Cosine,
        }
    }
}

/// Read a JSON array of numbers into `Vec<u32>`, rejecting any element that
/// isn't an unsigned integer with `TypeMismatch` rather than silently
/// truncating or coercing it.
fn json_u32_array(value: &Value, field: &str) -> Result<Vec<u32>, RagFileError> {
    let arr = value.as_array().ok_or_else(|| {
        RagFileError::TypeMismatch(format!("{field} must be a JSON array"))
    })?;
    arr.iter()
        .map(|v| {
            v.as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| RagFileError::TypeMismatch(format!("{field} element is not a u32: {v}")))
        })
        .collect()
}

/// Read a JSON array of numbers into `Vec<f32>`, rejecting non-numeric
/// elements with `TypeMismatch`.
fn json_f32_array(value: &Value, field: &str) -> Result<Vec<f32>, RagFileError> {
    let arr = value.as_array().ok_or_else(|| {
        RagFileError::TypeMismatch(format!("{field} must be a JSON array"))
    })?;
    arr.iter()
        .map(|v| {
            v.as_f64()
                .map(|n| n as f32)
                .ok_or_else(|| RagFileError::TypeMismatch(format!("{field} element is not a number: {v}")))
        })
        .collect()
}

/// Read a JSON array of numbers into `Vec<u16>`, rejecting any element that
/// isn't an unsigned integer that fits in 16 bits.
fn json_u16_array(value: &Value, field: &str) -> Result<Vec<u16>, RagFileError> {
    let arr = value.as_array().ok_or_else(|| {
        RagFileError::TypeMismatch(format!("{field} must be a JSON array"))
    })?;
    arr.iter()
        .map(|v| {
            v.as_u64()
                .and_then(|n| u16::try_from(n).ok())
                .ok_or_else(|| RagFileError::TypeMismatch(format!("{field} element is not a u16: {v}")))
        })
        .collect()
}

/// Parse the optional `"metadata"` object into a [`MetadataV1`] record.
/// `source_text` is hashed into `sourcefile_hash`, matching the same text
/// the record itself is built from.
fn parse_metadata(value: &Value, source_text: &str) -> Result<MetadataV1, RagFileError> {
    let obj = value
        .as_object()
        .ok_or_else(|| RagFileError::TypeMismatch("metadata must be a JSON object".into()))?;

    let dataset_name = obj.get("dataset_name").and_then(Value::as_str).unwrap_or("");
    let dataset_row_id = obj.get("dataset_row_id").and_then(Value::as_str).unwrap_or("");
    let sourcefile_name = obj.get("sourcefile_name").and_then(Value::as_str).unwrap_or("");
    let chunk_number = obj.get("chunk_number").and_then(Value::as_i64).unwrap_or(0) as i32;
    let creation_timestamp = obj.get("creation_timestamp").and_then(Value::as_u64).unwrap_or(0);
    let labels = match obj.get("labels") {
        Some(v) => json_u16_array(v, "metadata.labels")?,
        None => Vec::new(),
    };

    MetadataV1::build(
        dataset_name,
        dataset_row_id,
        sourcefile_name,
        source_text,
        chunk_number,
        &labels,
        creation_timestamp,
    )
}

fn parse_embedding(value: &Value) -> Result<EmbeddingInput, RagFileError> {
    let arr = value.as_array().ok_or_else(|| {
        RagFileError::TypeMismatch("embedding must be a JSON array".into())
    })?;
    let is_matrix = arr.first().map(|v| v.is_array()).unwrap_or(false);
    if is_matrix {
        let rows = arr
            .iter()
            .map(|row| json_f32_array(row, "embedding row"))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EmbeddingInput::Matrix(rows))
    } else {
        Ok(EmbeddingInput::Single(json_f32_array(value, "embedding")?))
    }
}

fn build(input: Option<PathBuf>, output: PathBuf, config: Option<PathBuf>) -> Result<()> {
    let raw = match input {
        Some(path) => fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };
    let doc: Value = serde_json::from_str(&raw).context("parsing input JSON")?;

    let text = doc
        .get("text")
        .and_then(Value::as_str)
        .ok_or_else(|| RagFileError::InvalidArgument("missing required field: text".into()))?;
    let token_ids_value = doc
        .get("token_ids")
        .ok_or_else(|| RagFileError::InvalidArgument("missing required field: token_ids".into()))?;
    let embedding_value = doc
        .get("embedding")
        .ok_or_else(|| RagFileError::InvalidArgument("missing required field: embedding".into()))?;
    let tokenizer_id = doc
        .get("tokenizer_id")
        .and_then(Value::as_str)
        .ok_or_else(|| RagFileError::InvalidArgument("missing required field: tokenizer_id".into()))?;
    let embedding_id = doc
        .get("embedding_id")
        .and_then(Value::as_str)
        .ok_or_else(|| RagFileError::InvalidArgument("missing required field: embedding_id".into()))?;
    let metadata_version = doc.get("metadata_version").and_then(Value::as_u64).unwrap_or(1) as u16;

    let token_ids = json_u32_array(token_ids_value, "token_ids")?;
    let embedding = parse_embedding(embedding_value)?;
    let extended_metadata = match doc.get("metadata") {
        Some(meta_value) => Some(parse_metadata(meta_value, text)?.serialize()?),
        None => None,
    };

    let cfg = config.as_deref().map(load_config).unwrap_or_default();

    let record = RagFile::new(
        text,
        &token_ids,
        embedding,
        tokenizer_id,
        embedding_id,
        metadata_version,
        extended_metadata,
        &cfg,
    )?;

    let mut out = fs::File::create(&output).with_context(|| format!("creating {}", output.display()))?;
    io::dump(&record, &mut out)?;
    println!("wrote {}", output.display());
    Ok(())
}

fn inspect(path: PathBuf) -> Result<()> {
    let bytes = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
    let mut cursor = bytes.as_slice();
    let header = io::read_header_from(&mut cursor)?;

    let out = json!({
        "version": header.version,
        "tokenizer_id": header.tokenizer_id,
        "embedding_id": header.embedding_id,
        "metadata_version": header.metadata_version,
        "minhash_permute": header.minhash_permute,
        "dense_vector_dim": header.dense_vector_dim,
        "scan_vector_dim": header.scan_vector_dim,
        "dense_is_f16": header.flags.dense_is_f16(),
        "has_scan_vector": header.flags.has_scan_vector(),
        "has_embeddings": header.flags.has_embeddings(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn find_rag_files(dir: &Path) -> impl Iterator<Item = std::result::Result<String, RagFileError>> {
    WalkBuilder::new(dir).build().filter_map(|entry| match entry {
        Ok(e) if e.path().extension().and_then(|x| x.to_str()) == Some("rag") => {
            Some(Ok(e.path().to_string_lossy().into_owned()))
        }
        Ok(_) => None,
        Err(e) => Some(Err(RagFileError::ScanAborted(e.to_string()))),
    })
}

fn run_match(query: PathBuf, dir: PathBuf, top_k: usize, method: MethodArg) -> Result<()> {
    let query_bytes = fs::read(&query).with_context(|| format!("reading {}", query.display()))?;
    let query_record = io::loads(&query_bytes)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner} scanning {msg}")
            .unwrap()
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    spinner.set_message(dir.display().to_string());

    let identifiers = find_rag_files(&dir);
    let matches: Vec<ScanMatch> = match_top_k(&query_record, identifiers, top_k, method.into(), || false)?;
    spinner.finish_with_message(format!("{} matches", matches.len()));

    let out: Vec<Value> = matches
        .iter()
        .map(|m| json!({"identifier": m.identifier, "score": m.score}))
        .collect();
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Build { input, output, config } => build(input, output, config),
        Command::Inspect { path } => inspect(path),
        Command::Match { query, dir, top_k, method } => run_match(query, dir, top_k, method),
    }
}
