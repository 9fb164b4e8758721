//! Protocol descriptor types and the path-keyed loader/cache.

use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Deserialize;

use crate::error::ProtocolError;

/// One entry in a descriptor's `header` map: a bit range and its description.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolField {
    #[serde(default)]
    pub description: String,
}

/// The `next_protocol` block of a descriptor: how to pick and locate the
/// next layer's descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct NextProtocol {
    pub selector: String,
    pub start_after: String,
    pub mappings: HashMap<String, MappingEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MappingEntry {
    pub file: String,
}

/// A fully parsed protocol descriptor, immutable once loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolDescriptor {
    pub name: String,
    pub header: HashMap<String, ProtocolField>,
    #[serde(default)]
    pub next_protocol: Option<NextProtocol>,
}

/// A single `(bit_offset, bit_length)` header entry, parsed from its
/// `"offset_length"` string key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRange {
    pub offset: u64,
    pub length: u64,
}

impl ProtocolDescriptor {
    /// Header entries as parsed `(BitRange, description)` pairs. Every key
    /// is already validated as `"offset_length"` by [`ProtocolCache`] at
    /// load time, so none are skipped here.
    pub fn header_ranges(&self) -> Vec<(BitRange, &str)> {
        self.header
            .iter()
            .map(|(key, field)| {
                let range = parse_bit_key(key).expect("header keys are validated at load time");
                (range, field.description.as_str())
            })
            .collect()
    }

    /// Resolves a 16-bit selector value against `next_protocol.mappings`,
    /// accepting both decimal and `0x`-prefixed hex keys.
    pub fn resolve_mapping(&self, selector_value: u16) -> Option<&str> {
        let next = self.next_protocol.as_ref()?;
        for (key, entry) in &next.mappings {
            if parse_mapping_key(key) == Some(selector_value) {
                return Some(entry.file.as_str());
            }
        }
        None
    }
}

/// Parses a `"{offset}_{length}"` key into a [`BitRange`].
pub fn parse_bit_key(key: &str) -> Option<BitRange> {
    let (off, len) = key.split_once('_')?;
    Some(BitRange { offset: off.parse().ok()?, length: len.parse().ok()? })
}

fn parse_mapping_key(key: &str) -> Option<u16> {
    if let Some(hex) = key.strip_prefix("0x").or_else(|| key.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        key.parse().ok()
    }
}

/// Splits a selector string of the form `"offset_length"` into its two
/// numeric components.
pub fn parse_selector(selector: &str) -> Option<BitRange> {
    parse_bit_key(selector)
}

/// Joins `rel` against the directory of `base`, then lexically normalizes
/// (collapsing `.` and `..`) without touching the filesystem.
pub fn resolve_relative(base: &str, rel: &str) -> String {
    let base_dir = Path::new(base).parent().unwrap_or_else(|| Path::new(""));
    let joined = base_dir.join(rel);
    lexical_normalize(&joined)
}

fn lexical_normalize(path: &Path) -> String {
    let mut out: Vec<Component> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.last(), Some(Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push(comp);
                }
            }
            other => out.push(other),
        }
    }
    let mut result = PathBuf::new();
    for comp in out {
        result.push(comp.as_os_str());
    }
    result.to_string_lossy().into_owned()
}

/// Path-keyed cache of loaded descriptors. Descriptors are immutable once
/// inserted and are never evicted; a single instance is intended to be
/// owned by one parser and confined to one worker thread, so no internal
/// synchronization is needed.
#[derive(Default)]
pub struct ProtocolCache {
    by_path: HashMap<String, ProtocolDescriptor>,
}

impl ProtocolCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the descriptor at `path` from disk, using the cached copy if
    /// present under this exact path string.
    pub fn load(&mut self, path: &str) -> Result<&ProtocolDescriptor, ProtocolError> {
        if !self.by_path.contains_key(path) {
            let text = fs::read_to_string(path)
                .map_err(|source| ProtocolError::Read { path: path.to_string(), source })?;
            self.insert_from_str(path, &text)?;
        }
        Ok(self.by_path.get(path).expect("just inserted"))
    }

    /// Parses `json` and inserts it under `path` as the cache key, without
    /// reading from disk. Useful for injecting synthetic descriptors (e.g.
    /// in tests) under an arbitrary path.
    pub fn load_from_str(&mut self, path: &str, json: &str) -> Result<&ProtocolDescriptor, ProtocolError> {
        self.insert_from_str(path, json)?;
        Ok(self.by_path.get(path).expect("just inserted"))
    }

    fn insert_from_str(&mut self, path: &str, json: &str) -> Result<(), ProtocolError> {
        let descriptor: ProtocolDescriptor = serde_json::from_str(json)
            .map_err(|source| ProtocolError::Parse { path: path.to_string(), source })?;
        for key in descriptor.header.keys() {
            if parse_bit_key(key).is_none() {
                return Err(ProtocolError::MalformedHeaderKey(key.clone()));
            }
        }
        self.by_path.insert(path.to_string(), descriptor);
        Ok(())
    }

    pub fn get_cached(&self, path: &str) -> Option<&ProtocolDescriptor> {
        self.by_path.get(path)
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ETH_JSON: &str = r#"{
        "name": "ethernet",
        "header": {
            "0_48": {"description": "dst mac"},
            "48_48": {"description": "src mac"},
            "96_16": {"description": "ethertype"}
        },
        "next_protocol": {
            "selector": "96_16",
            "start_after": "112",
            "mappings": {
                "0x0800": {"file": "./ipv4.json"},
                "34525": {"file": "./ipv6.json"}
            }
        }
    }"#;

    #[test]
    fn test_load_from_str_and_cache_hit() {
        let mut cache = ProtocolCache::new();
        cache.load_from_str("./eth.json", ETH_JSON).unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.get_cached("./eth.json").is_some());
    }

    #[test]
    fn test_resolve_mapping_accepts_hex_and_decimal() {
        let mut cache = ProtocolCache::new();
        let descriptor = cache.load_from_str("./eth.json", ETH_JSON).unwrap();
        assert_eq!(descriptor.resolve_mapping(0x0800), Some("./ipv4.json"));
        assert_eq!(descriptor.resolve_mapping(34525), Some("./ipv6.json"));
        assert_eq!(descriptor.resolve_mapping(0x9999), None);
    }

    #[test]
    fn test_header_ranges_parses_keys() {
        let mut cache = ProtocolCache::new();
        let descriptor = cache.load_from_str("./eth.json", ETH_JSON).unwrap();
        let ranges = descriptor.header_ranges();
        assert_eq!(ranges.len(), 3);
        assert!(ranges.iter().any(|(r, _)| *r == BitRange { offset: 96, length: 16 }));
    }

    #[test]
    fn test_resolve_relative_normalizes_parent_refs() {
        assert_eq!(resolve_relative("/protocols/eth.json", "./ipv4.json"), "/protocols/ipv4.json");
        assert_eq!(resolve_relative("/protocols/l2/eth.json", "../ipv4.json"), "/protocols/ipv4.json");
    }

    #[test]
    fn test_malformed_json_surfaces_parse_error() {
        let mut cache = ProtocolCache::new();
        let err = cache.load_from_str("./bad.json", "{not json").unwrap_err();
        assert!(matches!(err, ProtocolError::Parse { .. }));
    }

    #[test]
    fn test_malformed_header_key_rejected_and_not_cached() {
        let mut cache = ProtocolCache::new();
        let bad_json = r#"{
            "name": "broken",
            "header": {
                "not_a_bit_range": {"description": "oops"}
            }
        }"#;
        let err = cache.load_from_str("./broken.json", bad_json).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedHeaderKey(ref key) if key == "not_a_bit_range"));
        assert!(cache.get_cached("./broken.json").is_none());
        assert!(cache.is_empty());
    }
}
