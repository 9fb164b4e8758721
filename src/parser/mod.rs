//! Bit-level, data-driven packet decoding.
//!
//! [`DescriptorParser`] walks a frame one protocol layer at a time, guided
//! entirely by externally-loaded [`ProtocolDescriptor`]s: it extracts
//! header fields by bit range, dereferences a selector field to locate the
//! next layer's descriptor, and advances the bit cursor by an expression
//! evaluated against the fields just extracted.

pub mod expr;

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::config::MAX_DESCENT_DEPTH;
use crate::protocol::{parse_selector, resolve_relative, BitRange, ProtocolCache};
use crate::types::{ParsedLayer, ParsedPacket, RawFrame};

/// Capability implemented by anything that can turn a raw frame into a
/// layered, decoded packet. The sniffer depends on this trait rather than
/// on `DescriptorParser` directly, so alternate decoding strategies can be
/// substituted without touching the capture/orchestration code.
pub trait Parser {
    fn parse_packet(&mut self, frame: &RawFrame) -> ParsedPacket;
    fn set_protocol_entry_file(&mut self, path: String);
}

/// The descriptor-driven parser: owns its own descriptor cache and an
/// entry-point file path that descent starts from for every frame.
pub struct DescriptorParser {
    cache: ProtocolCache,
    entry_file: String,
}

impl DescriptorParser {
    pub fn new(entry_file: impl Into<String>) -> Self {
        Self { cache: ProtocolCache::new(), entry_file: entry_file.into() }
    }

    /// Preloads a descriptor under `path` from a JSON string, without
    /// touching the filesystem. Useful for tests and for entry points that
    /// are constructed in memory.
    pub fn preload(&mut self, path: &str, json: &str) {
        if let Err(err) = self.cache.load_from_str(path, json) {
            warn!(%path, %err, "failed to preload protocol descriptor");
        }
    }
}

impl Parser for DescriptorParser {
    fn parse_packet(&mut self, frame: &RawFrame) -> ParsedPacket {
        let mut packet = ParsedPacket::new();
        let mut cursor: u64 = 0;
        let mut current_path = self.entry_file.clone();
        let data = frame.as_bytes();
        let data_len = data.len();

        for depth in 0..MAX_DESCENT_DEPTH {
            let descriptor = match self.cache.load(&current_path) {
                Ok(d) => d,
                Err(err) => {
                    debug!(path = %current_path, %err, "stopping descent: descriptor load failed");
                    break;
                }
            };

            let mut layer = ParsedLayer::new(current_path.clone());
            let mut field_values: HashMap<String, u64> = HashMap::new();
            for (range, _description) in descriptor.header_ranges() {
                let absolute_bit = cursor + range.offset;
                let value = extract_bits(data, data_len, absolute_bit, range.length);
                layer
                    .fields
                    .insert(format!("{}_{}_{}", range.offset, range.length, absolute_bit), value);
                field_values.insert(format!("{}_{}", range.offset, range.length), value);
            }
            packet.push_layer(layer);

            let Some(next) = descriptor.next_protocol.clone() else { break };

            let Some(sel) = parse_selector(&next.selector) else {
                debug!(selector = %next.selector, "stopping descent: malformed selector");
                break;
            };
            let selector_value = extract_bits(data, data_len, cursor + sel.offset, sel.length) as u16;

            let Some(next_file) = descriptor.resolve_mapping(selector_value) else {
                debug!(selector_value, "stopping descent: no mapping for selector value");
                break;
            };
            let next_file = next_file.to_string();

            let advance = evaluate_start_after(&next.start_after, &field_values);
            cursor += advance;
            current_path = resolve_relative(&current_path, &next_file);

            if depth + 1 == MAX_DESCENT_DEPTH {
                warn!(depth = MAX_DESCENT_DEPTH, "stopping descent: max depth reached");
            }
        }

        packet
    }

    fn set_protocol_entry_file(&mut self, path: String) {
        self.entry_file = path;
    }
}

/// Extracts `bit_length` bits starting at `bit_offset` (MSB-first within
/// each byte) from `data[..data_len]`. Returns `0` when `bit_length` is `0`
/// or exceeds `64`. When the requested run would read past `data_len`,
/// returns whatever has been accumulated so far rather than padding with
/// zero bits or erroring.
pub fn extract_bits(data: &[u8], data_len: usize, bit_offset: u64, bit_length: u64) -> u64 {
    if bit_length == 0 || bit_length > 64 {
        return 0;
    }
    let total_bits = (data_len as u64) * 8;
    let mut result: u64 = 0;
    for i in 0..bit_length {
        let pos = bit_offset + i;
        if pos >= total_bits {
            break;
        }
        let byte_idx = (pos / 8) as usize;
        let bit_idx = (pos % 8) as u32;
        let bit = (data[byte_idx] >> (7 - bit_idx)) & 1;
        result = (result << 1) | bit as u64;
    }
    result
}

/// Evaluates a descriptor's `start_after` string against the field values
/// extracted from the current layer. Supports a plain decimal constant or
/// a `"calculate:..."` arithmetic expression referencing `[off_len]`
/// tokens. Any parse failure silently yields `0`, matching the decoder's
/// policy of never aborting a frame over a single bad expression.
pub fn evaluate_start_after(start_after: &str, field_values: &HashMap<String, u64>) -> u64 {
    let trimmed = start_after.trim();
    if trimmed.is_empty() {
        return 0;
    }
    if let Some(rest) = trimmed.strip_prefix("calculate:") {
        let substituted = substitute_tokens(rest.trim(), field_values);
        return expr::eval(&substituted)
            .map(|v| v.max(0.0) as u64 as u32 as u64)
            .unwrap_or(0);
    }
    trimmed.parse().unwrap_or(0)
}

/// Replaces every `[off_len]` token with the decimal value of
/// `field_values["off_len"]`, or `0` when the field wasn't extracted.
fn substitute_tokens(expr: &str, field_values: &HashMap<String, u64>) -> String {
    let mut out = String::with_capacity(expr.len());
    let bytes = expr.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'[' {
            if let Some(end) = expr[i..].find(']') {
                let token = &expr[i + 1..i + end];
                let value = field_values.get(token).copied().unwrap_or(0);
                out.push_str(&value.to_string());
                i += end + 1;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bits_crosses_byte_boundary() {
        let data = [0xAB, 0xCD];
        assert_eq!(extract_bits(&data, 2, 4, 8), 0xBC);
    }

    #[test]
    fn test_extract_bits_zero_or_oversized_length() {
        let data = [0xFF];
        assert_eq!(extract_bits(&data, 1, 0, 0), 0);
        assert_eq!(extract_bits(&data, 1, 0, 65), 0);
    }

    #[test]
    fn test_extract_bits_stops_early_without_padding() {
        let data = [0b1111_0000u8];
        // only 4 bits available past offset 4, but we ask for 8.
        let value = extract_bits(&data, 1, 4, 8);
        assert_eq!(value, 0b0000); // just the 4 available bits, no pad
    }

    #[test]
    fn test_evaluate_start_after_decimal_constant() {
        let fields = HashMap::new();
        assert_eq!(evaluate_start_after("112", &fields), 112);
    }

    #[test]
    fn test_evaluate_start_after_calculate_expression() {
        let mut fields = HashMap::new();
        fields.insert("96_16".to_string(), 5);
        assert_eq!(evaluate_start_after("calculate: [96_16] * 8 + 16", &fields), 56);
    }

    #[test]
    fn test_evaluate_start_after_malformed_falls_back_to_zero() {
        let fields = HashMap::new();
        assert_eq!(evaluate_start_after("calculate: [missing] + + ", &fields), 0);
        assert_eq!(evaluate_start_after("not-a-number", &fields), 0);
        assert_eq!(evaluate_start_after("", &fields), 0);
    }

    fn ethernet_json() -> &'static str {
        r#"{
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
                    "0x0800": {"file": "./ipv4.json"}
                }
            }
        }"#
    }

    fn ipv4_json() -> &'static str {
        r#"{
            "name": "ipv4",
            "header": {
                "0_4": {"description": "version"},
                "4_4": {"description": "ihl"}
            }
        }"#
    }

    fn build_frame(ethertype: u16) -> RawFrame {
        let mut bytes = vec![0u8; 34];
        bytes[0..6].copy_from_slice(&[0xFF; 6]);
        bytes[6..12].copy_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);
        bytes[12..14].copy_from_slice(&ethertype.to_be_bytes());
        bytes[14] = 0x45; // version=4, ihl=5
        RawFrame::from_slice(&bytes)
    }

    #[test]
    fn test_parse_packet_descends_two_layers_on_known_selector() {
        let mut parser = DescriptorParser::new("./eth.json");
        parser.preload("./eth.json", ethernet_json());
        parser.preload("./ipv4.json", ipv4_json());

        let frame = build_frame(0x0800);
        let packet = parser.parse_packet(&frame);

        assert_eq!(packet.layers.len(), 2);
        assert!(packet.layers[1].source_file.ends_with("ipv4.json"));
    }

    #[test]
    fn test_parse_packet_stops_on_unknown_selector() {
        let mut parser = DescriptorParser::new("./eth.json");
        parser.preload("./eth.json", ethernet_json());
        parser.preload("./ipv4.json", ipv4_json());

        let frame = build_frame(0x9999);
        let packet = parser.parse_packet(&frame);

        assert_eq!(packet.layers.len(), 1);
    }

    #[test]
    fn test_parse_packet_single_layer_when_no_next_protocol() {
        let mut parser = DescriptorParser::new("./ipv4.json");
        parser.preload("./ipv4.json", ipv4_json());

        let frame = build_frame(0x0800);
        let packet = parser.parse_packet(&frame);

        assert_eq!(packet.layers.len(), 1);
    }

    #[test]
    fn test_parse_packet_emits_no_layer_for_malformed_entry_descriptor() {
        let bad_json = r#"{
            "name": "broken",
            "header": {
                "not_a_bit_range": {"description": "oops"}
            }
        }"#;
        let mut parser = DescriptorParser::new("./broken.json");
        parser.preload("./broken.json", bad_json);

        let frame = build_frame(0x0800);
        let packet = parser.parse_packet(&frame);

        // The bad key means the descriptor was never cached, so the load
        // inside parse_packet fails too and no layer is emitted for it.
        assert_eq!(packet.layers.len(), 0);
    }
}
