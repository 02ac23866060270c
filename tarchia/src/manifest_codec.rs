/*!
Manifest (de)serialization, recursive manifest trees, and building manifest
entries from Parquet files.
*/

use std::collections::HashMap;
use std::sync::Arc;

use apache_avro::{Reader as AvroReader, Schema as AvroSchema, Writer as AvroWriter};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use parquet::arrow::async_reader::{AsyncFileReader, ParquetObjectReader};
use parquet::arrow::ParquetRecordBatchStreamBuilder;
use parquet::file::statistics::Statistics;
use sha2::{Digest, Sha256};
use tarchia_spec::manifest::{EntryType, Filter, ManifestEntry};
use tarchia_spec::schema::{Column, ColumnType, Schema as TableSchema};
use tarchia_spec::to_int::{to_int, Orderable};

use crate::error::{Error, Result};
use crate::storage::{dispatch_by_scheme, Storage};

const MAX_MANIFEST_DEPTH: u32 = 16;

const MANIFEST_SCHEMA: &str = r#"{
    "type": "record",
    "name": "ManifestEntry",
    "fields": [
        {"name": "file_path", "type": "string"},
        {"name": "file_format", "type": "string"},
        {"name": "file_type", "type": "string"},
        {"name": "file_size", "type": "long"},
        {"name": "record_count", "type": "long"},
        {"name": "sha256_checksum", "type": "string"},
        {"name": "lower_bounds", "type": {"type": "map", "values": "long"}},
        {"name": "upper_bounds", "type": {"type": "map", "values": "long"}}
    ]
}"#;

fn avro_schema() -> Result<AvroSchema> {
    AvroSchema::parse_str(MANIFEST_SCHEMA).map_err(Error::from)
}

/// Reads a manifest (or manifest tree) into a flat list of data-file
/// entries, recursing through nested manifests and applying `filters` to
/// prune whole entries without reading the files they point to.
///
/// Returns an empty list for `location: None`, matching the reference
/// behavior that a table with no commits yet has no manifest.
pub fn get_manifest<'a>(
    location: Option<&'a str>,
    storage: &'a dyn Storage,
    filters: &'a [Filter],
) -> BoxFuture<'a, Result<Vec<ManifestEntry>>> {
    async move { get_manifest_at_depth(location, storage, filters, 0).await }.boxed()
}

fn get_manifest_at_depth<'a>(
    location: Option<&'a str>,
    storage: &'a dyn Storage,
    filters: &'a [Filter],
    depth: u32,
) -> BoxFuture<'a, Result<Vec<ManifestEntry>>> {
    async move {
        let Some(location) = location else {
            return Ok(Vec::new());
        };
        if depth > MAX_MANIFEST_DEPTH {
            return Err(Error::ManifestDepthExceeded);
        }

        let Some(bytes) = storage.read_blob(location).await? else {
            return Ok(Vec::new());
        };

        let schema = avro_schema()?;
        let reader = AvroReader::with_schema(&schema, &bytes[..])?;

        let mut entries = Vec::new();
        for value in reader {
            let entry: ManifestEntry = apache_avro::from_value(&value?)?;

            if !filters.is_empty() && tarchia_spec::manifest::prune(&entry, filters) {
                continue;
            }

            match entry.file_type {
                EntryType::Manifest => {
                    let nested =
                        get_manifest_at_depth(Some(&entry.file_path), storage, filters, depth + 1)
                            .await?;
                    entries.extend(nested);
                }
                EntryType::Data => entries.push(entry),
            }
        }
        Ok(entries)
    }
    .boxed()
}

/// Serializes `entries` with the zstd-compressed Avro container format and
/// writes them to `location`.
pub async fn write_manifest(
    location: &str,
    storage: &dyn Storage,
    entries: &[ManifestEntry],
) -> Result<()> {
    let schema = avro_schema()?;
    let mut writer = AvroWriter::with_codec(&schema, Vec::new(), apache_avro::Codec::Zstandard);
    for entry in entries {
        writer.append_ser(entry)?;
    }
    let bytes = writer.into_inner()?;
    storage.write_blob(location, bytes).await
}

/// Reads a Parquet file's footer and builds a manifest entry with real
/// per-column statistics, packed through `to_int` so they stay orderable
/// without keeping the original column type around.
#[tracing::instrument(skip(expected_schema))]
pub async fn build_manifest_entry(path: &str, expected_schema: &TableSchema) -> Result<ManifestEntry> {
    let (object_store, object_path) = dispatch_by_scheme(path)?;

    let head = object_store.head(&object_path).await?;
    let file_size = head.size as u64;

    let file_bytes = object_store.get(&object_path).await?.bytes().await?;
    let sha256_checksum = format!("{:x}", Sha256::digest(&file_bytes));

    let reader = ParquetObjectReader::new(object_store.clone(), head);
    let builder = ParquetRecordBatchStreamBuilder::new(reader).await?;
    let parquet_schema = builder.schema().clone();
    let metadata = builder.metadata().clone();

    let present: std::collections::HashSet<String> =
        parquet_schema.fields().iter().map(|f| f.name().clone()).collect();

    for column in &expected_schema.columns {
        let all_names: Vec<&str> = std::iter::once(column.name.as_str())
            .chain(column.aliases.iter().map(String::as_str))
            .collect();
        let has_default = column.default.is_some();
        let present_in_file = all_names.iter().any(|name| present.contains(*name));
        if !has_default && !present_in_file {
            return Err(Error::DataEntry(format!(
                "file '{path}' is missing column '{}': add a default or include it in every file",
                column.name
            )));
        }
    }

    let record_count = metadata.file_metadata().num_rows() as u64;

    let mut lower_bounds: HashMap<String, i64> = HashMap::new();
    let mut upper_bounds: HashMap<String, i64> = HashMap::new();

    for row_group in metadata.row_groups() {
        for column_chunk in row_group.columns() {
            let Some(stats) = column_chunk.statistics() else {
                continue;
            };
            let file_name = column_chunk.column_path().string();
            let Some(column) = declared_column_for(expected_schema, &file_name) else {
                continue;
            };
            let bounds_key = column.name.clone();

            if let Some(packed) = pack_bound(stats, column, Bound::Min) {
                lower_bounds
                    .entry(bounds_key.clone())
                    .and_modify(|current| *current = (*current).min(packed))
                    .or_insert(packed);
            }
            if let Some(packed) = pack_bound(stats, column, Bound::Max) {
                upper_bounds
                    .entry(bounds_key)
                    .and_modify(|current| *current = (*current).max(packed))
                    .or_insert(packed);
            }
        }
    }

    Ok(ManifestEntry {
        file_path: path.to_string(),
        file_format: "parquet".to_string(),
        file_type: EntryType::Data,
        file_size,
        record_count,
        sha256_checksum,
        lower_bounds,
        upper_bounds,
    })
}

/// Finds the declared column a Parquet file's column path refers to, by
/// exact name or any of its recorded aliases (a file written against an
/// older schema may still carry a since-renamed column's old name).
fn declared_column_for<'a>(schema: &'a TableSchema, file_column_name: &str) -> Option<&'a Column> {
    schema
        .columns
        .iter()
        .find(|c| c.name == file_column_name || c.aliases.iter().any(|a| a == file_column_name))
}

#[derive(Clone, Copy)]
enum Bound {
    Min,
    Max,
}

/// Packs one bound (min or max) of a column chunk's statistics into an
/// orderable integer, routing through the `Orderable` arm that matches the
/// column's *declared* type rather than treating every column's raw
/// on-disk bytes as an opaque byte string. `Statistics::min_bytes_opt`/
/// `max_bytes_opt` return the physical encoding (little-endian fixed-width
/// ints, IEEE-754 bit patterns for floats), which is only meaningful as an
/// opaque byte string for String/Binary columns; every other type needs
/// its typed `min_opt`/`max_opt` accessor instead.
fn pack_bound(stats: &Statistics, column: &Column, bound: Bound) -> Option<i64> {
    match stats {
        Statistics::Boolean(s) => {
            let v = *pick(s.min_opt(), s.max_opt(), bound)?;
            to_int(&Orderable::Int(v as i64))
        }
        Statistics::Int32(s) => {
            let v = *pick(s.min_opt(), s.max_opt(), bound)?;
            match column.data_type {
                ColumnType::Date => {
                    let date = NaiveDate::from_ymd_opt(1970, 1, 1)?.checked_add_signed(chrono::Duration::days(v as i64))?;
                    to_int(&Orderable::Date(date))
                }
                ColumnType::Time => {
                    let millis = v as u32;
                    let time = NaiveTime::from_num_seconds_from_midnight_opt(millis / 1000, (millis % 1000) * 1_000_000)?;
                    to_int(&Orderable::Time(time))
                }
                // No column-descriptor scale is threaded through here, so a
                // Decimal backed by INT32/INT64 is packed as its unscaled
                // integer: ordering is preserved (both bounds share the
                // same implicit scale) even though the absolute value is
                // not divided by 10^scale.
                ColumnType::Decimal => to_int(&Orderable::Decimal(v as f64)),
                _ => to_int(&Orderable::Int(v as i64)),
            }
        }
        Statistics::Int64(s) => {
            let v = *pick(s.min_opt(), s.max_opt(), bound)?;
            match column.data_type {
                ColumnType::Timestamp | ColumnType::TimestampTZ => {
                    let dt: DateTime<Utc> = DateTime::from_timestamp_millis(v)?;
                    to_int(&Orderable::DateTime(dt))
                }
                ColumnType::Time => {
                    let micros = v;
                    let secs = (micros / 1_000_000) as u32;
                    let nanos = ((micros % 1_000_000) * 1_000) as u32;
                    let time = NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)?;
                    to_int(&Orderable::Time(time))
                }
                ColumnType::Decimal => to_int(&Orderable::Decimal(v as f64)),
                _ => to_int(&Orderable::Int(v)),
            }
        }
        // INT96 is the deprecated Parquet timestamp encoding; neither
        // writers nor readers in this workspace produce it, so its bounds
        // are left unpruneable rather than guessed at.
        Statistics::Int96(_) => None,
        Statistics::Float(s) => {
            let v = *pick(s.min_opt(), s.max_opt(), bound)?;
            to_int(&Orderable::Float(v as f64))
        }
        Statistics::Double(s) => {
            let v = *pick(s.min_opt(), s.max_opt(), bound)?;
            to_int(&Orderable::Float(v))
        }
        Statistics::ByteArray(s) => {
            let v = pick(s.min_opt(), s.max_opt(), bound)?;
            match column.data_type {
                ColumnType::String => std::str::from_utf8(v.data()).ok().and_then(|s| to_int(&Orderable::Str(s))),
                _ => to_int(&Orderable::Bytes(v.data())),
            }
        }
        Statistics::FixedLenByteArray(s) => {
            let v = pick(s.min_opt(), s.max_opt(), bound)?;
            to_int(&Orderable::Bytes(v.data()))
        }
    }
}

fn pick<'a, T>(min: Option<&'a T>, max: Option<&'a T>, bound: Bound) -> Option<&'a T> {
    match bound {
        Bound::Min => min,
        Bound::Max => max,
    }
}

/// XORs a list of hex-encoded SHA-256 digests together, returning the
/// all-zero digest for an empty list.
pub fn xor_checksums(hex_digests: &[String]) -> Result<String> {
    if hex_digests.is_empty() {
        return Ok("0".repeat(64));
    }
    let mut acc = decode_hex(&hex_digests[0])?;
    for digest in &hex_digests[1..] {
        let bytes = decode_hex(digest)?;
        for (a, b) in acc.iter_mut().zip(bytes.iter()) {
            *a ^= b;
        }
    }
    Ok(acc.iter().map(|b| format!("{b:02x}")).collect())
}

fn decode_hex(value: &str) -> Result<Vec<u8>> {
    (0..value.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&value[i..i + 2], 16)
                .map_err(|_| Error::Transaction(format!("invalid hex digest: {value}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xor_of_empty_list_is_all_zero() {
        assert_eq!(xor_checksums(&[]).unwrap(), "0".repeat(64));
    }

    #[test]
    fn xor_is_order_independent() {
        let a = "11".repeat(32);
        let b = "22".repeat(32);
        let forward = xor_checksums(&[a.clone(), b.clone()]).unwrap();
        let backward = xor_checksums(&[b, a]).unwrap();
        assert_eq!(forward, backward);
    }

    struct UnreachableStorage;

    #[async_trait::async_trait]
    impl crate::storage::Storage for UnreachableStorage {
        async fn write_blob(&self, _location: &str, _content: Vec<u8>) -> Result<()> {
            unreachable!("test never writes")
        }
        async fn read_blob(&self, _location: &str) -> Result<Option<Vec<u8>>> {
            unreachable!("test never reads: location is None")
        }
    }

    #[tokio::test]
    async fn get_manifest_of_none_is_empty() {
        let storage = UnreachableStorage;
        let entries = get_manifest(None, &storage, &[]).await.unwrap();
        assert!(entries.is_empty());
    }
}
