//! Pattern compiler: turns `(start, end, flags, case_sensitive)` into a
//! [`KernelConfig`] — byte masks, the free-byte rewrite rule, the
//! case-insensitive ambiguity table, StateInit variants, and the SHA-256
//! midstate after the code cell's salt-independent prefix.

use crate::cell::{build_code_repr, build_stateinit_prefix, pack_prefix_words};
use crate::config::SearchConfig;
use crate::error::ConfigError;
use crate::primitives::{char_bit_variants, crc16_table, sha256_compress_block};

pub const TOTAL_BYTES: usize = 36;
pub const TOTAL_BITS: usize = TOTAL_BYTES * 8; // 288
pub const HASH_BIT_START: usize = 16;
pub const HASH_BIT_END: usize = HASH_BIT_START + 256; // exclusive

/// The five `(tick, tock)` combinations enumerated per fixed-prefix-length
/// choice, in the order the reference generator enumerates them.
const SPECIAL_VARIANTS: [Option<(bool, bool)>; 5] = [
    None,
    Some((false, false)),
    Some((false, true)),
    Some((true, false)),
    Some((true, true)),
];

/// Immutable bundle produced by the pattern compiler and shared, read-only,
/// across every device worker.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    pub flags_hi: u8,
    pub flags_lo: u8,
    pub free_hash_mask: u8,
    pub free_hash_val: u8,
    pub prefix_mask: [u8; TOTAL_BYTES],
    pub prefix_val: [u8; TOTAL_BYTES],
    pub has_crc_constraint: bool,
    pub prefix_pos: Vec<usize>,
    pub prefix_pos_nocrc: Vec<usize>,
    pub stateinit_variants: Vec<Vec<u8>>,
    pub stateinit_prefix_lens: Vec<usize>,
    pub stateinit_prefix_max_len: usize,
    pub stateinit_prefix_padded: Vec<Vec<u8>>,
    pub prefix_w_matrix: Vec<[u32; 16]>,
    pub code_prefix_bytes: [u8; 64],
    pub code_state_base: [u32; 8],
    pub crc16_table: [u16; 256],
    pub fixed_prefix_lengths: Vec<Option<u8>>,
    pub special_variants: Vec<Option<(bool, bool)>>,
    /// `(bit_position, alt0, alt1)` triples — case-insensitive ambiguity table.
    pub ci_bitpos: Vec<u32>,
    pub ci_alt0: Vec<u8>,
    pub ci_alt1: Vec<u8>,
    pub start_digit_base: u32,
}

fn bits_from_byte_u8(b: u8) -> [u8; 8] {
    crate::primitives::bits_from_byte(b)
}

fn set_mask_bit(mask: &mut [u8; TOTAL_BYTES], val: &mut [u8; TOTAL_BYTES], bit_index: usize, bit_value: u8) {
    let byte = bit_index / 8;
    let offset = 7 - (bit_index % 8);
    mask[byte] |= 1 << offset;
    if bit_value != 0 {
        val[byte] |= 1 << offset;
    }
}

/// Pick the earliest base64 digit offset where the start pattern can fit
/// without contradicting the fixed flags/workchain bits (bits 0..15).
/// Returns the digit offset and, for each pattern character, the subset of
/// its bit-variants compatible with that offset.
fn choose_start_alignment(
    start: &str,
    case_sensitive: bool,
    prefix_bits: &[u8; 16],
) -> Result<(u32, Vec<Vec<[u8; 6]>>), ConfigError> {
    let char_opts: Vec<Vec<[u8; 6]>> = start
        .chars()
        .map(|c| char_bit_variants(c, case_sensitive))
        .collect::<Result<_, _>>()?;

    let len_bits = start.chars().count() * 6;
    let max_digit_offset = (TOTAL_BITS - len_bits) / 6;

    for digit_offset in 0..=max_digit_offset {
        let bit_offset = 6 * digit_offset;
        let mut ok = true;
        let mut filtered: Vec<Vec<[u8; 6]>> = Vec::with_capacity(char_opts.len());

        for (ci, variants) in char_opts.iter().enumerate() {
            let char_bit_base = bit_offset + ci * 6;
            let overlap: Vec<usize> = (0..6).filter(|&b| char_bit_base + b < 16).collect();
            if overlap.is_empty() {
                filtered.push(variants.clone());
                continue;
            }

            let valid: Vec<[u8; 6]> = variants
                .iter()
                .filter(|var| overlap.iter().all(|&b| var[b] == prefix_bits[char_bit_base + b]))
                .cloned()
                .collect();
            if valid.is_empty() {
                ok = false;
                break;
            }
            filtered.push(valid);
        }

        if ok {
            return Ok((digit_offset as u32, filtered));
        }
    }

    // Fallback: place after flags/workchain if nothing matched (should be rare).
    Ok((((16 + 5) / 6) as u32, char_opts))
}

/// Record a case-insensitive ambiguity entry for `ch` at `bit_index`, if its
/// upper/lower 6-bit values differ, using the variants allowed at this
/// position (already filtered to those compatible with any overlap).
fn maybe_record_ambiguity(
    ch: char,
    case_sensitive: bool,
    variants: &[[u8; 6]],
    bit_in_char: usize,
    bit_index: usize,
    ci_bitpos: &mut Vec<u32>,
    ci_alt0: &mut Vec<u8>,
    ci_alt1: &mut Vec<u8>,
) {
    if case_sensitive || bit_in_char != 0 || !ch.is_alphabetic() {
        return;
    }
    let mut vals: Vec<u8> = variants
        .iter()
        .map(|v| v.iter().fold(0u8, |acc, &bit| (acc << 1) | bit))
        .collect();
    vals.sort_unstable();
    vals.dedup();
    if vals.len() == 2 {
        ci_bitpos.push(bit_index as u32);
        ci_alt0.push(vals[0]);
        ci_alt1.push(vals[1]);
    }
}

pub struct PatternCompiler;

impl PatternCompiler {
    /// Compile a [`SearchConfig`] into a [`KernelConfig`].
    pub fn compile(cfg: &SearchConfig) -> Result<KernelConfig, ConfigError> {
        let flags_byte = if cfg.non_bounceable { 0x51 } else { 0x11 } | if cfg.testnet { 0x80 } else { 0x00 };
        let wc_byte: u8 = if cfg.masterchain { 0xFF } else { 0x00 };

        let mut prefix_bits = [0u8; 16];
        prefix_bits[0..8].copy_from_slice(&bits_from_byte_u8(flags_byte));
        prefix_bits[8..16].copy_from_slice(&bits_from_byte_u8(wc_byte));

        let mut prefix_mask = [0u8; TOTAL_BYTES];
        let mut prefix_val = [0u8; TOTAL_BYTES];
        let mut free_mask: u8 = 0;
        let mut free_val: u8 = 0;

        let mut ci_bitpos: Vec<u32> = Vec::new();
        let mut ci_alt0: Vec<u8> = Vec::new();
        let mut ci_alt1: Vec<u8> = Vec::new();
        let mut start_digit_base: u32 = 0;

        if let Some(start) = &cfg.start {
            let (digit_base, start_variants) = choose_start_alignment(start, cfg.case_sensitive, &prefix_bits)?;
            start_digit_base = digit_base;
            let bit_offset = (digit_base as usize) * 6;
            let start_len_bits = start.chars().count() * 6;

            for i in 0..start_len_bits {
                let char_idx = i / 6;
                let bit_in_char = i % 6;
                let variants = &start_variants[char_idx];
                let bit_index = bit_offset + i;

                let ch = start.chars().nth(char_idx).unwrap();
                maybe_record_ambiguity(
                    ch,
                    cfg.case_sensitive,
                    variants,
                    bit_in_char,
                    bit_index,
                    &mut ci_bitpos,
                    &mut ci_alt0,
                    &mut ci_alt1,
                );

                if bit_index < 16 {
                    continue; // already satisfied by flags/workchain
                }

                let allowed: Vec<u8> = variants.iter().map(|v| v[bit_in_char]).collect::<std::collections::HashSet<_>>().into_iter().collect();
                if allowed.len() != 1 {
                    continue;
                }
                let bit = allowed[0];

                if (HASH_BIT_START..HASH_BIT_START + 8).contains(&bit_index) {
                    let offset = 7 - (bit_index % 8);
                    free_mask |= 1 << offset;
                    if bit != 0 {
                        free_val |= 1 << offset;
                    }
                } else if bit_index < TOTAL_BITS && bit_index < HASH_BIT_END {
                    set_mask_bit(&mut prefix_mask, &mut prefix_val, bit_index, bit);
                }
            }
        }

        if let Some(end) = &cfg.end {
            let end_variants: Vec<Vec<[u8; 6]>> = end
                .chars()
                .map(|c| char_bit_variants(c, cfg.case_sensitive))
                .collect::<Result<_, _>>()?;
            let end_len_bits = end.chars().count() * 6;
            let bit_base = TOTAL_BITS - end_len_bits;

            for i in 0..end_len_bits {
                let char_idx = i / 6;
                let bit_in_char = i % 6;
                let variants = &end_variants[char_idx];
                let bit_index = bit_base + i;

                let ch = end.chars().nth(char_idx).unwrap();
                maybe_record_ambiguity(
                    ch,
                    cfg.case_sensitive,
                    variants,
                    bit_in_char,
                    bit_index,
                    &mut ci_bitpos,
                    &mut ci_alt0,
                    &mut ci_alt1,
                );

                if bit_index < 16 {
                    continue;
                }
                let allowed: Vec<u8> = variants.iter().map(|v| v[bit_in_char]).collect::<std::collections::HashSet<_>>().into_iter().collect();
                if allowed.len() != 1 {
                    continue;
                }
                let bit = allowed[0];
                set_mask_bit(&mut prefix_mask, &mut prefix_val, bit_index, bit);
            }
        }

        let has_crc_constraint = prefix_mask[34] != 0 || prefix_mask[35] != 0;
        let prefix_pos: Vec<usize> = (0..TOTAL_BYTES).filter(|&i| prefix_mask[i] != 0).collect();
        let prefix_pos_nocrc: Vec<usize> = prefix_pos.iter().copied().filter(|&i| i < 34).collect();

        // StateInit variants: fixed-prefix-length forced to 8 when `start` is
        // present (bit-compatibility convention, see design notes), else all
        // nine values enumerated.
        let fixed_prefix_lengths: Vec<Option<u8>> = if cfg.start.is_some() {
            vec![Some(8)]
        } else {
            std::iter::once(None).chain((0..=8u8).map(Some)).collect()
        };
        let special_variants: Vec<Option<(bool, bool)>> = SPECIAL_VARIANTS.to_vec();

        let mut stateinit_variants = Vec::new();
        let mut stateinit_prefix_lens = Vec::new();
        for &fpl in &fixed_prefix_lengths {
            for &special in &special_variants {
                let prefix = build_stateinit_prefix(fpl, special);
                stateinit_prefix_lens.push(prefix.len());
                stateinit_variants.push(prefix);
            }
        }
        let stateinit_prefix_max_len = *stateinit_prefix_lens.iter().max().unwrap();
        let stateinit_prefix_padded: Vec<Vec<u8>> = stateinit_variants
            .iter()
            .map(|p| {
                let mut padded = p.clone();
                padded.resize(stateinit_prefix_max_len, 0);
                padded
            })
            .collect();
        let prefix_w_matrix: Vec<[u32; 16]> = stateinit_variants.iter().map(|p| pack_prefix_words(p)).collect();

        let zero_salt = [0u8; 16];
        let code_repr_zero = build_code_repr(&cfg.owner_raw, &zero_salt);
        let mut code_prefix_bytes = [0u8; 64];
        code_prefix_bytes.copy_from_slice(&code_repr_zero[0..64]);
        let code_state_base = sha256_compress_block(&code_prefix_bytes, None);

        Ok(KernelConfig {
            flags_hi: flags_byte,
            flags_lo: wc_byte,
            free_hash_mask: free_mask,
            free_hash_val: free_val,
            prefix_mask,
            prefix_val,
            has_crc_constraint,
            prefix_pos,
            prefix_pos_nocrc,
            stateinit_variants,
            stateinit_prefix_lens,
            stateinit_prefix_max_len,
            stateinit_prefix_padded,
            prefix_w_matrix,
            code_prefix_bytes,
            code_state_base,
            crc16_table: crc16_table(),
            fixed_prefix_lengths,
            special_variants,
            ci_bitpos,
            ci_alt0,
            ci_alt1,
            start_digit_base,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RawArgs, SearchConfig};

    fn cfg_with(start: Option<&str>, end: Option<&str>, case_sensitive: bool) -> SearchConfig {
        let args = RawArgs {
            owner: "EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c".to_string(),
            start: start.map(str::to_string),
            end: end.map(str::to_string),
            masterchain: false,
            non_bounceable: false,
            testnet: false,
            case_sensitive,
            only_one: false,
        };
        SearchConfig::try_from(args).unwrap()
    }

    #[test]
    fn start_pattern_yields_five_stateinit_variants() {
        let cfg = cfg_with(Some("kQBE"), None, true);
        let kc = PatternCompiler::compile(&cfg).unwrap();
        assert_eq!(kc.stateinit_variants.len(), 5);
        assert_eq!(kc.fixed_prefix_lengths, vec![Some(8)]);
    }

    #[test]
    fn no_start_yields_forty_five_stateinit_variants() {
        let cfg = cfg_with(None, Some("AAAA"), false);
        let kc = PatternCompiler::compile(&cfg).unwrap();
        assert_eq!(kc.stateinit_variants.len(), 45);
    }

    #[test]
    fn end_pattern_constrains_crc_bytes_and_sets_flag() {
        let cfg = cfg_with(None, Some("AAAA"), false);
        let kc = PatternCompiler::compile(&cfg).unwrap();
        assert!(kc.has_crc_constraint);
        assert!(kc.prefix_mask[34] != 0 || kc.prefix_mask[35] != 0);
    }

    #[test]
    fn case_insensitive_end_pattern_of_letters_has_ambiguity_entries() {
        let cfg = cfg_with(None, Some("AAAA"), false);
        let kc = PatternCompiler::compile(&cfg).unwrap();
        assert_eq!(kc.ci_bitpos.len(), 4);
        assert_eq!(kc.ci_alt0.len(), 4);
        assert_eq!(kc.ci_alt1.len(), 4);
    }

    #[test]
    fn compilation_is_idempotent() {
        let cfg = cfg_with(Some("kQBE"), Some("zz"), false);
        let a = PatternCompiler::compile(&cfg).unwrap();
        let b = PatternCompiler::compile(&cfg).unwrap();
        assert_eq!(a.prefix_mask, b.prefix_mask);
        assert_eq!(a.prefix_val, b.prefix_val);
        assert_eq!(a.free_hash_mask, b.free_hash_mask);
        assert_eq!(a.free_hash_val, b.free_hash_val);
        assert_eq!(a.stateinit_variants, b.stateinit_variants);
        assert_eq!(a.code_state_base, b.code_state_base);
        assert_eq!(a.start_digit_base, b.start_digit_base);
    }

    #[test]
    fn mask_correctness_property_holds_for_satisfying_bytes() {
        let cfg = cfg_with(Some("kQBE"), None, true);
        let kc = PatternCompiler::compile(&cfg).unwrap();

        // Construct a 36-byte repr satisfying mask/val exactly, leaving
        // unconstrained bits at zero, and check the friendly encoding
        // begins with the start pattern from start_digit_base.
        let mut repr = [0u8; TOTAL_BYTES];
        for i in 0..TOTAL_BYTES {
            repr[i] = kc.prefix_val[i];
        }
        // Apply free-byte rewrite bits too, since those also encode start chars.
        repr[2] = (repr[2] & !kc.free_hash_mask) | (kc.free_hash_val & kc.free_hash_mask);

        use base64::Engine as _;
        let addr_str = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(repr);
        let start = cfg.start.as_ref().unwrap();
        let slice: String = addr_str
            .chars()
            .skip(kc.start_digit_base as usize)
            .take(start.chars().count())
            .collect();
        assert_eq!(slice.to_lowercase(), start.to_lowercase());
    }
}
