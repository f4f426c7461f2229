//! Chunker: splits oversize artifacts from `.pf/raw/` into size-bounded
//! pieces under `.pf/readthis/`, preserving element order.
//!
//! Grounded on the original Python `extraction.py`
//! (`examples/original_source/theauditor/extraction.py`): the JSON/JSONL
//! probe, the canonical list-valued-key fallback chain, the taint-artifact
//! merge-with-dedup, and the unenforced extraction budget all come from
//! there — `spec.md` only specifies the externally observable chunk shape.

use crate::config::PipelineConfig;
use crate::errors::ChunkerError;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Keys whose value, if a JSON array, is the thing this artifact is really
/// "a list of" — checked in this priority order. `all_findings` must win
/// over `findings` because the FCE artifact carries both, and the list the
/// rest of the system cares about is the merged one.
const LIST_KEYS: &[&str] = &[
    "all_findings",
    "merged_findings",
    "findings",
    "vulnerabilities",
    "issues",
    "edges",
    "nodes",
    "taint_paths",
    "paths",
    "dependencies",
    "files",
    "results",
];

/// Artifact name (minus extension) whose several finding-bearing keys get
/// merged into one list before the usual `LIST_KEYS` split, mirroring
/// `extraction.py`'s `base_name == 'taint_analysis'` special case.
const TAINT_ARTIFACT_NAME: &str = "taint-analyze";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArtifactFormat {
    Json,
    Jsonl,
    Other,
}

fn detect_format(text: &str) -> ArtifactFormat {
    let first_non_ws = text.chars().find(|c| !c.is_whitespace());
    match first_non_ws {
        Some('{') | Some('[') => {
            if serde_json::from_str::<Value>(text).is_ok() {
                ArtifactFormat::Json
            } else if text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .all(|l| serde_json::from_str::<Value>(l).is_ok())
            {
                ArtifactFormat::Jsonl
            } else {
                ArtifactFormat::Other
            }
        }
        _ => ArtifactFormat::Other,
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChunkInfo {
    chunk_number: usize,
    total_chunks: usize,
    /// Element count carried by this one chunk.
    total_items_in_chunk: usize,
    /// Element count of the list this chunk was split from, before any
    /// cap-triggered truncation dropped items.
    original_total_items: usize,
    /// Which key in the source document this chunk's elements came from.
    list_key: String,
    /// Set once `max_chunks_per_file` was hit and trailing elements were
    /// dropped rather than folded into the last chunk.
    truncated: bool,
}

/// Split `source_name` into a stem and a leading-dot extension
/// (`"fce.json"` -> `("fce", ".json")`), the way `extraction.py` derives
/// `base_name`/`ext` before formatting a chunk filename.
fn split_stem_ext(source_name: &str) -> (String, String) {
    let path = Path::new(source_name);
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| source_name.to_string());
    (stem, ext)
}

/// Outcome of chunking one artifact.
#[derive(Debug, Clone)]
pub struct ChunkOutcome {
    pub chunks_written: Vec<PathBuf>,
    /// Estimated size of the artifact in KB, for the (non-enforcing)
    /// extraction budget report.
    pub size_kb: f64,
    pub over_budget: bool,
}

/// One artifact's entry in the extraction summary report.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionEntry {
    pub name: String,
    pub size_kb: f64,
    pub chunks: usize,
}

/// Aggregate extraction-budget report written to
/// `.pf/readthis/extraction_summary.json`, field names matching the
/// original Python `extract_all_to_readthis` return value exactly
/// (`extraction.py`). Reports the budget; never enforces it.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub budget_kb: u64,
    pub total_used_kb: f64,
    pub utilization_percent: f64,
    pub budget_exceeded: bool,
    pub over_budget_kb: f64,
    pub artifacts: Vec<ExtractionEntry>,
}

pub struct Chunker<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Chunker<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// Chunk one artifact's raw bytes into `readthis_dir`. Artifacts that
    /// fit under `max_chunk_size` are copied through verbatim under their
    /// original name; artifacts that need splitting are written as
    /// `<stem>_chunk<NN>.<ext>`, one file per chunk.
    pub fn chunk(
        &self,
        readthis_dir: &Path,
        source_name: &str,
        contents: &[u8],
    ) -> Result<ChunkOutcome, ChunkerError> {
        std::fs::create_dir_all(readthis_dir).map_err(|source| ChunkerError::WriteChunk {
            path: readthis_dir.to_path_buf(),
            source,
        })?;

        let size_kb = contents.len() as f64 / 1024.0;
        let over_budget = size_kb > self.config.extraction_budget_kb as f64;
        if over_budget {
            tracing::info!(
                source = source_name,
                size_kb,
                budget_kb = self.config.extraction_budget_kb,
                "artifact exceeds extraction budget (reporting only, not enforced)"
            );
        }

        if contents.len() <= self.config.max_chunk_size {
            let path = readthis_dir.join(source_name);
            std::fs::write(&path, contents).map_err(|source| ChunkerError::WriteChunk {
                path: path.clone(),
                source,
            })?;
            return Ok(ChunkOutcome {
                chunks_written: vec![path],
                size_kb,
                over_budget,
            });
        }

        let text = String::from_utf8_lossy(contents);
        let written = match detect_format(&text) {
            ArtifactFormat::Json => self.chunk_json(readthis_dir, source_name, &text)?,
            ArtifactFormat::Jsonl => self.chunk_jsonl(readthis_dir, source_name, &text)?,
            ArtifactFormat::Other => self.chunk_bytes(readthis_dir, source_name, contents)?,
        };

        Ok(ChunkOutcome {
            chunks_written: written,
            size_kb,
            over_budget,
        })
    }

    fn chunk_json(&self, dir: &Path, source: &str, text: &str) -> Result<Vec<PathBuf>, ChunkerError> {
        let value: Value = serde_json::from_str(text).map_err(|e| ChunkerError::ParseFailed {
            path: dir.join(source),
            source: e,
        })?;

        match value {
            Value::Array(items) => self.write_json_groups(dir, source, items, None),
            Value::Object(map) => {
                let map = if source.trim_end_matches(".json") == TAINT_ARTIFACT_NAME
                    && (map.contains_key("taint_paths") || map.contains_key("all_rule_findings"))
                {
                    Self::merge_taint_artifacts(map)
                } else {
                    map
                };
                if let Some(key) = LIST_KEYS.iter().find(|k| matches!(map.get(**k), Some(Value::Array(_)))) {
                    let items = match map.get(*key) {
                        Some(Value::Array(items)) => items.clone(),
                        _ => unreachable!(),
                    };
                    let mut header = map.clone();
                    header.remove(*key);
                    self.write_json_groups(dir, source, items, Some((key.to_string(), header)))
                } else {
                    // No recognized list key: nothing to split element-wise.
                    // Write the whole object as a single unsplit chunk under
                    // its original name rather than lose data.
                    let path = dir.join(source);
                    let rendered = serde_json::to_vec(&Value::Object(map)).map_err(|e| ChunkerError::ParseFailed {
                        path: path.clone(),
                        source: e,
                    })?;
                    std::fs::write(&path, rendered).map_err(|source| ChunkerError::WriteChunk {
                        path: path.clone(),
                        source,
                    })?;
                    Ok(vec![path])
                }
            }
            other => {
                let path = dir.join(source);
                let rendered = serde_json::to_vec(&other).map_err(|e| ChunkerError::ParseFailed {
                    path: path.clone(),
                    source: e,
                })?;
                std::fs::write(&path, rendered).map_err(|source| ChunkerError::WriteChunk {
                    path: path.clone(),
                    source,
                })?;
                Ok(vec![path])
            }
        }
    }

    /// Group `items` (in original order — never sorted, reversed, or
    /// deduped) into size-bounded chunks, each reassembled under `list_key`
    /// alongside any shared header fields. Once `max_chunks_per_file` is
    /// reached, grouping stops and any remaining items are dropped rather
    /// than folded into the last chunk, matching `extraction.py`'s
    /// stop-at-the-cap behavior; the chunk is marked `truncated` when this
    /// happens.
    fn write_json_groups(
        &self,
        dir: &Path,
        source: &str,
        items: Vec<Value>,
        list_key: Option<(String, Map<String, Value>)>,
    ) -> Result<Vec<PathBuf>, ChunkerError> {
        let axis = list_key.as_ref().map(|(k, _)| k.clone()).unwrap_or_else(|| "items".to_string());
        let original_total_items = items.len();

        if items.is_empty() {
            let path = dir.join(source);
            let body = Self::assemble(&list_key, Vec::new(), 1, 1, 0, 0, axis, false);
            let rendered = serde_json::to_vec(&body).map_err(|e| ChunkerError::ParseFailed {
                path: path.clone(),
                source: e,
            })?;
            std::fs::write(&path, rendered).map_err(|source| ChunkerError::WriteChunk {
                path: path.clone(),
                source,
            })?;
            return Ok(vec![path]);
        }

        let cap = self.config.max_chunks_per_file.max(1);
        let mut groups: Vec<Vec<Value>> = Vec::new();
        let mut current: Vec<Value> = Vec::new();
        let mut current_size = 0usize;
        let mut placed = 0usize;
        let mut truncated = false;

        'outer: for item in items {
            if groups.len() >= cap {
                truncated = true;
                break;
            }
            let item_size = serde_json::to_vec(&item).map(|b| b.len()).unwrap_or(0);
            if !current.is_empty() && current_size + item_size > self.config.max_chunk_size {
                groups.push(std::mem::take(&mut current));
                current_size = 0;
                if groups.len() >= cap {
                    truncated = true;
                    break 'outer;
                }
            }
            current_size += item_size;
            placed += 1;
            current.push(item);
        }
        if !truncated && !current.is_empty() {
            groups.push(current);
        }

        if truncated {
            tracing::warn!(
                source,
                cap,
                dropped = original_total_items - placed,
                "artifact needed more chunks than the configured cap; trailing items were dropped"
            );
        }

        let total = groups.len();
        let (stem, ext) = split_stem_ext(source);
        let mut written = Vec::with_capacity(total);
        for (i, group) in groups.into_iter().enumerate() {
            let path = if total == 1 {
                dir.join(source)
            } else {
                dir.join(format!("{stem}_chunk{:02}{ext}", i + 1))
            };
            let group_len = group.len();
            let body = Self::assemble(&list_key, group, i + 1, total, group_len, original_total_items, axis.clone(), truncated);
            let rendered = serde_json::to_vec(&body).map_err(|e| ChunkerError::ParseFailed {
                path: path.clone(),
                source: e,
            })?;
            std::fs::write(&path, rendered).map_err(|source| ChunkerError::WriteChunk {
                path: path.clone(),
                source,
            })?;
            written.push(path);
        }
        Ok(written)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        list_key: &Option<(String, Map<String, Value>)>,
        group: Vec<Value>,
        chunk_number: usize,
        total_chunks: usize,
        total_items_in_chunk: usize,
        original_total_items: usize,
        axis: String,
        truncated: bool,
    ) -> Value {
        let chunk_info = serde_json::to_value(ChunkInfo {
            chunk_number,
            total_chunks,
            total_items_in_chunk,
            original_total_items,
            list_key: axis,
            truncated,
        })
        .expect("ChunkInfo serializes");

        match list_key {
            Some((key, header)) => {
                let mut map = header.clone();
                map.insert(key.clone(), Value::Array(group));
                map.insert("chunk_info".to_string(), chunk_info);
                Value::Object(map)
            }
            None => {
                let mut map = Map::new();
                map.insert("items".to_string(), Value::Array(group));
                map.insert("chunk_info".to_string(), chunk_info);
                Value::Object(map)
            }
        }
    }

    fn chunk_jsonl(&self, dir: &Path, source: &str, text: &str) -> Result<Vec<PathBuf>, ChunkerError> {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let cap = self.config.max_chunks_per_file.max(1);
        let mut groups: Vec<Vec<&str>> = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut current_size = 0usize;
        let mut truncated = false;

        for line in lines {
            if groups.len() >= cap {
                truncated = true;
                break;
            }
            if !current.is_empty() && current_size + line.len() > self.config.max_chunk_size {
                groups.push(std::mem::take(&mut current));
                current_size = 0;
                if groups.len() >= cap {
                    truncated = true;
                    break;
                }
            }
            current_size += line.len();
            current.push(line);
        }
        if !truncated && !current.is_empty() {
            groups.push(current);
        }
        if truncated {
            tracing::warn!(source, cap, "artifact needed more chunks than the configured cap; trailing lines were dropped");
        }

        let total = groups.len();
        let (stem, ext) = split_stem_ext(source);
        let mut written = Vec::with_capacity(total);
        for (i, group) in groups.into_iter().enumerate() {
            let path = if total == 1 {
                dir.join(source)
            } else {
                dir.join(format!("{stem}_chunk{:02}{ext}", i + 1))
            };
            let body = group.join("\n");
            std::fs::write(&path, body).map_err(|source| ChunkerError::WriteChunk {
                path: path.clone(),
                source,
            })?;
            written.push(path);
        }
        Ok(written)
    }

    /// Split `contents` into size-bounded byte ranges. Once
    /// `max_chunks_per_file` is reached, splitting stops and the remaining
    /// bytes are dropped rather than appended to the last chunk, matching
    /// `extraction.py`'s stop-at-the-cap behavior.
    fn chunk_bytes(&self, dir: &Path, source: &str, contents: &[u8]) -> Result<Vec<PathBuf>, ChunkerError> {
        let chunk_size = self.config.max_chunk_size.max(1);
        let cap = self.config.max_chunks_per_file.max(1);

        let mut ranges: Vec<(usize, usize)> = Vec::new();
        let mut offset = 0usize;
        while offset < contents.len() {
            if ranges.len() >= cap {
                tracing::warn!(
                    source,
                    cap,
                    dropped_bytes = contents.len() - offset,
                    "artifact needed more chunks than the configured cap; trailing bytes were dropped"
                );
                break;
            }
            let end = (offset + chunk_size).min(contents.len());
            ranges.push((offset, end));
            offset = end;
        }

        let total = ranges.len();
        let (stem, ext) = split_stem_ext(source);
        let mut written = Vec::with_capacity(total);
        for (i, (start, end)) in ranges.into_iter().enumerate() {
            let path = if total == 1 {
                dir.join(source)
            } else {
                dir.join(format!("{stem}_chunk{:02}{ext}", i + 1))
            };
            std::fs::write(&path, &contents[start..end]).map_err(|source| ChunkerError::WriteChunk {
                path: path.clone(),
                source,
            })?;
            written.push(path);
        }
        Ok(written)
    }

    /// Build the aggregate extraction-budget report across every artifact
    /// chunked this run and write it to
    /// `<readthis_dir>/extraction_summary.json`.
    pub fn write_extraction_summary(
        &self,
        readthis_dir: &Path,
        entries: &[(String, ChunkOutcome)],
    ) -> Result<ExtractionSummary, ChunkerError> {
        let total_used_kb: f64 = entries.iter().map(|(_, o)| o.size_kb).sum();
        let budget_kb = self.config.extraction_budget_kb;
        let utilization_percent = if budget_kb > 0 {
            (total_used_kb / budget_kb as f64) * 100.0
        } else {
            0.0
        };
        let budget_exceeded = total_used_kb > budget_kb as f64;
        let over_budget_kb = (total_used_kb - budget_kb as f64).max(0.0);

        let artifacts = entries
            .iter()
            .map(|(name, outcome)| ExtractionEntry {
                name: name.clone(),
                size_kb: outcome.size_kb,
                chunks: outcome.chunks_written.len(),
            })
            .collect();

        let summary = ExtractionSummary {
            budget_kb,
            total_used_kb,
            utilization_percent,
            budget_exceeded,
            over_budget_kb,
            artifacts,
        };

        let path = readthis_dir.join("extraction_summary.json");
        let json = serde_json::to_string_pretty(&summary).expect("ExtractionSummary serializes");
        std::fs::write(&path, json).map_err(|source| ChunkerError::WriteChunk { path, source })?;

        Ok(summary)
    }

    /// Merge the taint artifact's several finding-bearing keys
    /// (`taint_paths`, `all_rule_findings`, `infrastructure_issues`,
    /// `paths`, `vulnerabilities`) into a single `merged_findings` list,
    /// tagging each entry with the `finding_type` it came from. A bucket is
    /// skipped when its content is a canonical-JSON-identical set to a
    /// bucket already merged (e.g. `infrastructure_issues` duplicating
    /// `all_rule_findings`), matching `extraction.py`'s set-equality check
    /// rather than per-item dedup.
    fn merge_taint_artifacts(mut map: Map<String, Value>) -> Map<String, Value> {
        fn as_array(map: &Map<String, Value>, key: &str) -> Vec<Value> {
            match map.get(key) {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            }
        }
        fn canonical_set(items: &[Value]) -> HashSet<[u8; 32]> {
            items
                .iter()
                .map(|item| Sha256::digest(canonical_json(item).as_bytes()).into())
                .collect()
        }
        fn tag(items: Vec<Value>, finding_type: &str) -> Vec<Value> {
            items
                .into_iter()
                .map(|mut item| {
                    if let Value::Object(obj) = &mut item {
                        obj.insert("finding_type".to_string(), Value::String(finding_type.to_string()));
                    }
                    item
                })
                .collect()
        }

        let taint_paths = as_array(&map, "taint_paths");
        let all_rule_findings = as_array(&map, "all_rule_findings");
        let infrastructure_issues = as_array(&map, "infrastructure_issues");
        let paths = as_array(&map, "paths");
        let vulnerabilities = as_array(&map, "vulnerabilities");

        let mut merged = Vec::new();
        merged.extend(tag(taint_paths.clone(), "taint_path"));
        merged.extend(tag(all_rule_findings.clone(), "rule_finding"));
        if canonical_set(&infrastructure_issues) != canonical_set(&all_rule_findings) {
            merged.extend(tag(infrastructure_issues, "infrastructure"));
        }
        if canonical_set(&paths) != canonical_set(&taint_paths) {
            merged.extend(tag(paths, "path"));
        }
        merged.extend(tag(vulnerabilities, "vulnerability"));

        let total_vulnerabilities = map
            .get("total_vulnerabilities")
            .cloned()
            .unwrap_or_else(|| Value::from(merged.len()));

        let mut out = Map::new();
        out.insert("success".to_string(), map.remove("success").unwrap_or(Value::Bool(true)));
        out.insert("summary".to_string(), map.remove("summary").unwrap_or(Value::Object(Map::new())));
        out.insert("total_vulnerabilities".to_string(), total_vulnerabilities);
        out.insert("sources_found".to_string(), map.remove("sources_found").unwrap_or(Value::from(0)));
        out.insert("sinks_found".to_string(), map.remove("sinks_found").unwrap_or(Value::from(0)));
        out.insert("merged_findings".to_string(), Value::Array(merged));
        out
    }
}

/// Render `value` with sorted object keys so semantically identical JSON
/// documents hash identically regardless of field order.
fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut sorted = Map::new();
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                for key in keys {
                    sorted.insert(key.clone(), sort(&map[key]));
                }
                Value::Object(sorted)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    serde_json::to_string(&sort(value)).expect("sorted JSON value always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn config() -> PipelineConfig {
        let mut c = PipelineConfig::default();
        c.max_chunk_size = 64;
        c.max_chunks_per_file = 10;
        c
    }

    #[test]
    fn small_artifact_is_a_single_chunk() {
        let dir = TempDir::new().unwrap();
        let chunker = Chunker::new(&config());
        let outcome = chunker.chunk(dir.path(), "small", b"{}").unwrap();
        assert_eq!(outcome.chunks_written.len(), 1);
        assert!(outcome.chunks_written[0].ends_with("small"));
    }

    #[test]
    fn json_array_splits_preserving_order() {
        let dir = TempDir::new().unwrap();
        let chunker = Chunker::new(&config());
        let items: Vec<Value> = (0..20).map(|i| json!({"id": i, "pad": "xxxxxxxxxx"})).collect();
        let text = serde_json::to_vec(&Value::Array(items)).unwrap();
        let outcome = chunker.chunk(dir.path(), "arr", &text).unwrap();
        assert!(outcome.chunks_written.len() > 1);

        let mut seen_ids = Vec::new();
        for path in &outcome.chunks_written {
            let body: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
            for item in body["items"].as_array().unwrap() {
                seen_ids.push(item["id"].as_i64().unwrap());
            }
        }
        let expected: Vec<i64> = (0..20).collect();
        assert_eq!(seen_ids, expected, "chunking must never reorder elements");
    }

    #[test]
    fn findings_key_chunking_keeps_header_fields() {
        let dir = TempDir::new().unwrap();
        let chunker = Chunker::new(&config());
        let findings: Vec<Value> = (0..10).map(|i| json!({"rule": format!("R{i}"), "pad": "yyyyyyyyyyyyyy"})).collect();
        let doc = json!({"tool": "fce", "all_findings": findings});
        let text = serde_json::to_vec(&doc).unwrap();
        let outcome = chunker.chunk(dir.path(), "fce", &text).unwrap();
        assert!(outcome.chunks_written.len() > 1);
        let body: Value = serde_json::from_slice(&std::fs::read(&outcome.chunks_written[0]).unwrap()).unwrap();
        assert_eq!(body["tool"], "fce");
        assert!(body["all_findings"].is_array());
        assert!(body["chunk_info"]["total_chunks"].as_u64().unwrap() >= 2);
        assert_eq!(body["chunk_info"]["list_key"], "all_findings");
        assert_eq!(body["chunk_info"]["original_total_items"], 10);
        assert_eq!(body["chunk_info"]["truncated"], false);
        assert!(outcome.chunks_written[0].to_string_lossy().contains("fce_chunk01"));
    }

    #[test]
    fn jsonl_splits_whole_lines() {
        let dir = TempDir::new().unwrap();
        let chunker = Chunker::new(&config());
        let mut text = String::new();
        for i in 0..10 {
            text.push_str(&format!("{{\"n\": {i}, \"pad\": \"zzzzzzzzzzzz\"}}\n"));
        }
        let outcome = chunker.chunk(dir.path(), "log", text.as_bytes()).unwrap();
        assert!(outcome.chunks_written.len() > 1);
        for path in &outcome.chunks_written {
            for line in std::fs::read_to_string(path).unwrap().lines() {
                assert!(serde_json::from_str::<Value>(line).is_ok());
            }
        }
    }

    #[test]
    fn non_json_text_splits_on_byte_boundaries_without_losing_data() {
        let dir = TempDir::new().unwrap();
        let chunker = Chunker::new(&config());
        let text = "x".repeat(500);
        let outcome = chunker.chunk(dir.path(), "raw", text.as_bytes()).unwrap();
        let mut total = Vec::new();
        for path in &outcome.chunks_written {
            total.extend(std::fs::read(path).unwrap());
        }
        assert_eq!(total.len(), 500);
    }

    #[test]
    fn chunk_cap_is_respected_by_dropping_the_remainder() {
        let dir = TempDir::new().unwrap();
        let mut c = config();
        c.max_chunks_per_file = 3;
        let chunker = Chunker::new(&c);
        let text = "y".repeat(1000);
        let outcome = chunker.chunk(dir.path(), "raw", text.as_bytes()).unwrap();
        assert_eq!(outcome.chunks_written.len(), 3, "grouping must stop at the cap");
        let mut total = Vec::new();
        for path in &outcome.chunks_written {
            total.extend(std::fs::read(path).unwrap());
        }
        assert!(total.len() < 1000, "bytes beyond the cap must be dropped, not folded into the last chunk");
        for path in &outcome.chunks_written {
            assert!(std::fs::read(path).unwrap().len() <= c.max_chunk_size);
        }
    }

    #[test]
    fn json_list_cap_marks_chunk_info_truncated_and_drops_trailing_items() {
        let dir = TempDir::new().unwrap();
        let mut c = config();
        c.max_chunks_per_file = 2;
        let chunker = Chunker::new(&c);
        let findings: Vec<Value> = (0..20).map(|i| json!({"rule": format!("R{i}"), "pad": "yyyyyyyyyyyyyy"})).collect();
        let doc = json!({"all_findings": findings});
        let text = serde_json::to_vec(&doc).unwrap();
        let outcome = chunker.chunk(dir.path(), "fce.json", &text).unwrap();
        assert_eq!(outcome.chunks_written.len(), 2);

        let mut seen = 0;
        for path in &outcome.chunks_written {
            let body: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
            assert_eq!(body["chunk_info"]["truncated"], true);
            assert_eq!(body["chunk_info"]["original_total_items"], 20);
            seen += body["all_findings"].as_array().unwrap().len();
        }
        assert!(seen < 20, "items beyond the cap must be dropped, not absorbed into the last chunk");
    }

    #[test]
    fn extraction_budget_is_reported_but_never_enforced() {
        let dir = TempDir::new().unwrap();
        let mut c = config();
        c.extraction_budget_kb = 0;
        let chunker = Chunker::new(&c);
        let outcome = chunker.chunk(dir.path(), "small", b"{}").unwrap();
        assert!(outcome.over_budget);
        // Still wrote the chunk despite being "over budget".
        assert_eq!(outcome.chunks_written.len(), 1);
    }

    #[test]
    fn taint_artifact_is_merged_into_one_tagged_list_before_chunking() {
        let dir = TempDir::new().unwrap();
        let chunker = Chunker::new(&config());
        let doc = json!({
            "success": true,
            "total_vulnerabilities": 2,
            "taint_paths": [{"sink": "x", "source": "y"}],
            "all_rule_findings": [{"rule": "sqli"}],
            // Identical content to all_rule_findings (just reordered keys):
            // must be recognized as a duplicate and dropped, not merged in.
            "infrastructure_issues": [{"rule": "sqli"}],
            "vulnerabilities": [{"cwe": "CWE-89"}],
        });
        let text = serde_json::to_string(&doc).unwrap();
        let written = chunker.chunk_json(dir.path(), "taint-analyze.json", &text).unwrap();
        assert_eq!(written.len(), 1);

        let body: Value = serde_json::from_str(&std::fs::read_to_string(&written[0]).unwrap()).unwrap();
        let findings = body["merged_findings"].as_array().unwrap();
        assert_eq!(findings.len(), 2, "infrastructure_issues duplicating all_rule_findings must be dropped");
        assert_eq!(findings[0]["finding_type"], "taint_path");
        assert_eq!(findings[1]["finding_type"], "rule_finding");
    }

    #[test]
    fn non_taint_artifacts_with_taint_paths_key_are_not_merged() {
        let dir = TempDir::new().unwrap();
        let chunker = Chunker::new(&config());
        let doc = json!({"taint_paths": [{"a": 1}]});
        let text = serde_json::to_string(&doc).unwrap();
        let written = chunker.chunk_json(dir.path(), "other-phase.json", &text).unwrap();
        let body: Value = serde_json::from_str(&std::fs::read_to_string(&written[0]).unwrap()).unwrap();
        assert!(body.get("merged_findings").is_none());
        assert_eq!(body["taint_paths"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn detect_format_distinguishes_json_jsonl_and_other() {
        assert_eq!(detect_format("{\"a\": 1}"), ArtifactFormat::Json);
        assert_eq!(detect_format("{\"a\": 1}\n{\"b\": 2}"), ArtifactFormat::Jsonl);
        assert_eq!(detect_format("not json at all"), ArtifactFormat::Other);
    }

    #[test]
    fn extraction_summary_reports_but_does_not_enforce_the_budget() {
        let dir = TempDir::new().unwrap();
        let mut c = config();
        c.extraction_budget_kb = 1;
        let chunker = Chunker::new(&c);

        let a = chunker.chunk(dir.path(), "a", &"x".repeat(2000).into_bytes()).unwrap();
        let b = chunker.chunk(dir.path(), "b", b"{}").unwrap();
        let entries = vec![("a".to_string(), a), ("b".to_string(), b)];

        let summary = chunker.write_extraction_summary(dir.path(), &entries).unwrap();
        assert!(summary.budget_exceeded);
        assert!(summary.over_budget_kb > 0.0);
        assert_eq!(summary.artifacts.len(), 2);
        assert!(dir.path().join("extraction_summary.json").exists());
    }
}
