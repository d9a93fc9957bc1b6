//! Validator and sink: fully reconstruct each candidate address on the
//! host, verify it satisfies the pattern at the string level, and persist an
//! append-only JSON record.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::sync::Mutex;

use base64::Engine as _;
use fs4::FileExt as _;
use serde::Serialize;

use crate::cell::{build_code_repr, to_boc_single_cell};
use crate::config::SearchConfig;
use crate::pattern::{KernelConfig, TOTAL_BYTES};
use crate::primitives::{crc16, sha256};

#[derive(Debug, Serialize)]
pub struct SpecialFlags {
    pub tick: bool,
    pub tock: bool,
}

#[derive(Debug, Serialize)]
pub struct InitObj {
    pub code: String,
    #[serde(rename = "fixedPrefixLength")]
    pub fixed_prefix_length: u8,
    pub special: Option<SpecialFlags>,
}

#[derive(Debug, Serialize)]
pub struct Record {
    pub address: String,
    pub init: InitObj,
    pub config: SearchConfig,
    pub timestamp: f64,
}

/// Append-only, lock-serialized sink for `addresses.jsonl`.
pub struct Sink {
    file: Mutex<File>,
}

impl Sink {
    pub fn open(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        Ok(Self { file: Mutex::new(file) })
    }

    pub fn append(&self, record: &Record) -> std::io::Result<()> {
        let line = serde_json::to_string(record).expect("Record serialization is infallible");
        let mut file = self.file.lock().expect("sink mutex poisoned");
        file.lock_exclusive()?;
        let result = (|| -> std::io::Result<()> {
            writeln!(file, "{line}")?;
            file.flush()
        })();
        let _ = file.unlock();
        result
    }
}

/// Outcome of validating one kernel-reported hit.
pub enum Validation {
    /// The candidate satisfies the pattern; here is the record to persist.
    Match(Record),
    /// The candidate failed a check the kernel itself should have rejected
    /// on (mask mismatch) — not a fatal condition by itself at this layer;
    /// callers that see this for kernel-reported hits should treat it as a
    /// fatal kernel/host consistency error.
    Rejected(&'static str),
}

/// Validate and (on success) build the output record for `(base_salt,
/// iter_idx, idx, variant_idx)`: reconstruct the candidate address on the
/// host, re-check it against the byte masks and start/end patterns, and
/// build the persisted record.
#[allow(clippy::too_many_arguments)]
pub fn validate_hit(
    cfg: &SearchConfig,
    kernel_cfg: &KernelConfig,
    base_salt: [u8; 16],
    iter_idx: u32,
    idx: u32,
    variant_idx: u32,
    now: f64,
) -> Validation {
    if variant_idx as usize >= kernel_cfg.stateinit_variants.len() {
        return Validation::Rejected("variant_idx out of range");
    }

    // 1. XOR iter_idx/idx into the low two 32-bit little-endian salt words.
    let mut salt = base_salt;
    xor_word_le(&mut salt, 0, iter_idx);
    xor_word_le(&mut salt, 1, idx);

    // 2. code_hash = SHA-256(build_code_repr(owner_raw, salt))
    let code_repr = build_code_repr(&cfg.owner_raw, &salt);
    let code_hash = sha256(&code_repr);

    // 3. main_hash = SHA-256(stateinit_prefix[variant_idx] ++ code_hash)
    let prefix = &kernel_cfg.stateinit_variants[variant_idx as usize];
    let mut main_data = prefix.clone();
    main_data.extend_from_slice(&code_hash);
    let main_hash = sha256(&main_data);

    // 4. Build the 36-byte friendly-address representation.
    let mut repr = [0u8; TOTAL_BYTES];
    repr[0] = kernel_cfg.flags_hi;
    repr[1] = kernel_cfg.flags_lo;
    let hash0 = main_hash[0];
    repr[2] = (hash0 & !kernel_cfg.free_hash_mask) | (kernel_cfg.free_hash_val & kernel_cfg.free_hash_mask);
    repr[3..34].copy_from_slice(&main_hash[1..32]);
    let crc_val = crc16(&repr[0..34], &kernel_cfg.crc16_table);
    repr[34] = (crc_val >> 8) as u8;
    repr[35] = (crc_val & 0xFF) as u8;

    // 5. Byte-mask validation, identical to the kernel's constraints.
    for i in 0..TOTAL_BYTES {
        let m = kernel_cfg.prefix_mask[i];
        if m != 0 && (repr[i] & m) != kernel_cfg.prefix_val[i] {
            return Validation::Rejected("prefix mask mismatch");
        }
    }

    // 6. Base64url-encode to the 48-character friendly string.
    let addr_str = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(repr);

    // 7. Start-pattern check (case-folded if case-insensitive).
    if let Some(start) = &cfg.start {
        let start_digit_base = kernel_cfg.start_digit_base as usize;
        let len = start.chars().count();
        let slice: String = addr_str.chars().skip(start_digit_base).take(len).collect();
        let matches = if cfg.case_sensitive {
            slice == *start
        } else {
            slice.to_lowercase() == start.to_lowercase()
        };
        if !matches {
            return Validation::Rejected("start mismatch");
        }
    }

    // 8. End-pattern check.
    if let Some(end) = &cfg.end {
        let len = end.chars().count();
        let slice: String = addr_str.chars().skip(48 - len).collect();
        let matches = if cfg.case_sensitive {
            slice == *end
        } else {
            slice.to_lowercase() == end.to_lowercase()
        };
        if !matches {
            return Validation::Rejected("end mismatch");
        }
    }

    // 9. Build the output record.
    let n_special = kernel_cfg.special_variants.len();
    let split_idx = variant_idx as usize / n_special;
    let special_idx = variant_idx as usize % n_special;
    let fpl_val = kernel_cfg.fixed_prefix_lengths[split_idx];
    let special = kernel_cfg.special_variants[special_idx];
    let boc_code = to_boc_single_cell(&code_repr);

    let init_obj = InitObj {
        code: base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(boc_code),
        fixed_prefix_length: fpl_val.unwrap_or(0),
        special: special.map(|(tick, tock)| SpecialFlags { tick, tock }),
    };

    Validation::Match(Record {
        address: addr_str,
        init: init_obj,
        config: cfg.clone(),
        timestamp: now,
    })
}

fn xor_word_le(salt: &mut [u8; 16], word_idx: usize, value: u32) {
    let off = word_idx * 4;
    let cur = u32::from_le_bytes(salt[off..off + 4].try_into().unwrap());
    let new = cur ^ value;
    salt[off..off + 4].copy_from_slice(&new.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RawArgs;
    use crate::pattern::PatternCompiler;

    fn cfg_end(end: &str, case_sensitive: bool) -> SearchConfig {
        let args = RawArgs {
            owner: "EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c".to_string(),
            start: None,
            end: Some(end.to_string()),
            masterchain: false,
            non_bounceable: false,
            testnet: false,
            case_sensitive,
            only_one: false,
        };
        SearchConfig::try_from(args).unwrap()
    }

    #[test]
    fn handcrafted_hit_matching_end_validates_and_serializes() {
        let cfg = cfg_end("", false); // empty end always matches; exercises the pipeline shape
        let kc = PatternCompiler::compile(&cfg).unwrap();
        match validate_hit(&cfg, &kc, [0u8; 16], 0, 0, 0, 0.0) {
            Validation::Match(record) => {
                assert_eq!(record.address.len(), 48);
            }
            Validation::Rejected(reason) => panic!("expected match, got rejection: {reason}"),
        }
    }

    #[test]
    fn out_of_range_variant_is_rejected() {
        let cfg = cfg_end("A", false);
        let kc = PatternCompiler::compile(&cfg).unwrap();
        let huge_variant = kc.stateinit_variants.len() as u32 + 1;
        match validate_hit(&cfg, &kc, [0u8; 16], 0, 0, huge_variant, 0.0) {
            Validation::Rejected(reason) => assert_eq!(reason, "variant_idx out of range"),
            Validation::Match(_) => panic!("expected rejection"),
        }
    }

    #[test]
    fn crc_round_trip_holds_for_every_validated_hit() {
        let cfg = cfg_end("A", false);
        let kc = PatternCompiler::compile(&cfg).unwrap();
        for variant_idx in 0..kc.stateinit_variants.len() as u32 {
            if let Validation::Match(record) = validate_hit(&cfg, &kc, [7u8; 16], 1, 2, variant_idx, 0.0) {
                let repr = base64::engine::general_purpose::URL_SAFE_NO_PAD
                    .decode(&record.address)
                    .unwrap();
                let crc = crc16(&repr[0..34], &kc.crc16_table);
                assert_eq!(repr[34], (crc >> 8) as u8);
                assert_eq!(repr[35], (crc & 0xFF) as u8);
            }
        }
    }
}
