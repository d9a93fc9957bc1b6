//! TON cell serialisation: the 80-byte vanity-contract code cell, the
//! StateInit prefix variants, and a minimal single-root no-refs BoC wrapper.

use crate::primitives::{bits_from_byte, bits_to_padded_bytes, int_to_bits};

/// Fixed 50-bit constant baked into the vanity contract's code cell.
const CONST1: u128 = 1_065_632_427_291_681;
/// Fixed 179-bit constant baked into the vanity contract's code cell.
const CONST2: u128 = 457_587_318_777_827_214_152_676_959_512_820_176_586_892_797_206_855_680;

/// Bits of `MsgAddressInt`: tag(2), anycast(1), workchain(8), account id(256).
fn owner_bits(owner_raw: &[u8]) -> Vec<u8> {
    let workchain = owner_raw[1];
    let addr_hash = &owner_raw[2..34];

    let mut bits = vec![1, 0, 0]; // tag `10`, anycast none
    bits.extend_from_slice(&bits_from_byte(workchain));
    for &b in addr_hash {
        bits.extend_from_slice(&bits_from_byte(b));
    }

    debug_assert_eq!(bits.len(), 267, "unexpected owner bits length");
    bits
}

/// Serialise the code cell: constant bits + owner + constant + salt.
/// Always exactly 80 bytes (2 descriptor bytes + 78 data bytes).
pub fn build_code_repr(owner_raw: &[u8], salt: &[u8; 16]) -> [u8; 80] {
    assert!(owner_raw.len() >= 34, "owner payload too short");

    let mut bits = Vec::with_capacity(624);
    bits.extend(int_to_bits(CONST1, 50));
    bits.extend(owner_bits(owner_raw));
    bits.extend(int_to_bits(CONST2, 179));
    for &b in salt {
        bits.extend_from_slice(&bits_from_byte(b));
    }
    debug_assert_eq!(bits.len(), 624, "unexpected code bits length");

    let data_bytes: Vec<u8> = bits
        .chunks(8)
        .map(|chunk| chunk.iter().fold(0u8, |acc, &bit| (acc << 1) | bit))
        .collect();

    let b = bits.len();
    let d1 = 0x00u8; // 0 refs
    let d2 = (b / 8 + (b + 7) / 8) as u8;

    let mut out = [0u8; 80];
    out[0] = d1;
    out[1] = d2;
    out[2..].copy_from_slice(&data_bytes);
    out
}

/// Build one StateInit prefix variant (descriptor bytes + padded bits + ref
/// depth placeholder). Typical length 5-7 bytes.
pub fn build_stateinit_prefix(fixed_prefix_length: Option<u8>, special: Option<(bool, bool)>) -> Vec<u8> {
    let mut bits: Vec<u8> = Vec::new();

    match fixed_prefix_length {
        Some(fpl) => {
            assert!(fpl < 32, "fixedPrefixLength must be 0..31");
            bits.push(1);
            bits.extend(int_to_bits(fpl as u128, 5));
        }
        None => bits.push(0),
    }

    match special {
        Some((tick, tock)) => {
            bits.push(1);
            bits.push(tick as u8);
            bits.push(tock as u8);
        }
        None => bits.push(0),
    }

    bits.push(1); // code: Some
    bits.push(0); // data: None
    bits.push(0); // libraries: empty dict

    let padded_bits = bits_to_padded_bytes(&bits);
    let bits_desc = ((bits.len() + 7) / 8 + bits.len() / 8) as u8;

    let d1 = 1u8; // ordinary cell, level mask 0, 1 ref
    let d2 = bits_desc;

    let mut out = vec![d1, d2];
    out.extend(padded_bits);
    out.extend_from_slice(&[0, 0]); // single ref's depth
    out
}

/// Pack a StateInit prefix variant into 16 big-endian 32-bit words for the
/// kernel's prefix word matrix.
pub fn pack_prefix_words(prefix: &[u8]) -> [u32; 16] {
    let mut words = [0u32; 16];
    for (i, &b) in prefix.iter().enumerate() {
        let w = i >> 2;
        let shift = 24 - ((i & 3) * 8);
        words[w] |= (b as u32) << shift;
    }
    words
}

/// Serialise a single-root, no-refs cell into a minimal Bag of Cells (no
/// index, no CRC32C).
pub fn to_boc_single_cell(cell_bytes: &[u8]) -> Vec<u8> {
    let cells: u32 = 1;
    let roots: u32 = 1;
    let absent: u32 = 0;

    let size_bytes = (((32 - cells.leading_zeros()) + 7) / 8).clamp(1, 4);
    let tot_cells_size = cell_bytes.len() as u64;
    let off_bytes = if tot_cells_size == 0 {
        1
    } else {
        (((64 - tot_cells_size.leading_zeros()) + 7) / 8).clamp(1, 8)
    };

    let has_idx = 0u8;
    let has_crc32c = 0u8;
    let has_cache_bits = 0u8;
    let flags = 0u8;

    let mut out = Vec::with_capacity(10 + (size_bytes as usize) * 3 + (off_bytes as usize) + cell_bytes.len());
    out.extend_from_slice(&[0xb5, 0xee, 0x9c, 0x72]);
    let flags_byte = (has_idx << 7) | (has_crc32c << 6) | (has_cache_bits << 5) | ((flags & 0x3) << 3) | (size_bytes as u8 & 0x7);
    out.push(flags_byte);
    out.push(off_bytes as u8);
    out.extend_from_slice(&cells.to_be_bytes()[4 - size_bytes as usize..]);
    out.extend_from_slice(&roots.to_be_bytes()[4 - size_bytes as usize..]);
    out.extend_from_slice(&absent.to_be_bytes()[4 - size_bytes as usize..]);
    out.extend_from_slice(&tot_cells_size.to_be_bytes()[8 - off_bytes as usize..]);
    out.extend_from_slice(&0u32.to_be_bytes()[4 - size_bytes as usize..]); // root index 0
    out.extend_from_slice(cell_bytes);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_owner() -> [u8; 36] {
        // flags byte, workchain 0, 32-byte account id, 2 crc bytes (unused here)
        let mut owner = [0u8; 36];
        owner[0] = 0x11;
        owner[1] = 0x00;
        owner[34] = 0xAA;
        owner[35] = 0xBB;
        owner
    }

    #[test]
    fn code_repr_is_exactly_80_bytes() {
        let owner = sample_owner();
        let salt = [0u8; 16];
        let repr = build_code_repr(&owner, &salt);
        assert_eq!(repr.len(), 80);
        assert_eq!(repr[0], 0x00);
    }

    #[test]
    fn stateinit_prefix_length_in_expected_range() {
        for fpl in [None, Some(0), Some(8)] {
            for special in [None, Some((true, false))] {
                let prefix = build_stateinit_prefix(fpl, special);
                assert!(prefix.len() >= 5 && prefix.len() <= 7, "len={}", prefix.len());
            }
        }
    }

    #[test]
    fn boc_header_has_expected_magic_and_counts() {
        let cell = vec![0u8; 80];
        let boc = to_boc_single_cell(&cell);
        assert_eq!(&boc[0..4], &[0xb5, 0xee, 0x9c, 0x72]);
        // size_bytes=1 (cells=1), off_bytes=1 (tot_cells_size=80 < 256)
        assert_eq!(boc[5], 1); // cells, 1 byte
        assert_eq!(boc[6], 1); // roots, 1 byte
        assert_eq!(boc[7], 0); // absent, 1 byte
        assert_eq!(boc[8], 80); // tot_cells_size, 1 byte
        assert_eq!(boc[9], 0); // root index
        assert_eq!(&boc[10..], &cell[..]);
    }

    #[test]
    fn pack_prefix_words_round_trips_bytes() {
        let prefix: Vec<u8> = (0..7u8).collect();
        let words = pack_prefix_words(&prefix);
        let mut rebuilt = Vec::new();
        for w in words {
            rebuilt.extend_from_slice(&w.to_be_bytes());
        }
        assert_eq!(&rebuilt[0..7], &prefix[..]);
    }
}
