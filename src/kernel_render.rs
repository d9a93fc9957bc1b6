//! Kernel renderer: substitutes a [`KernelConfig`] into the `<<TAG>>`
//! placeholders of an OpenCL source template.

use std::fmt::Write as _;

use crate::error::SetupError;
use crate::pattern::KernelConfig;

/// The OpenCL kernel's hashing body is maintained separately from the host
/// orchestrator; the host only templates it. This file ships the
/// placeholder contract the renderer fills in.
pub static KERNEL_TEMPLATE: &str = include_str!("./kernels/vanity.cl");

fn replace(src: &mut String, tag: &str, value: &str) {
    *src = src.replace(tag, value);
}

fn join_decimal<T: std::fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    items
        .into_iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_hex_words(items: &[u32]) -> String {
    items
        .iter()
        .map(|w| format!("0x{:08x}u", w))
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_word_matrix(rows: &[[u32; 16]]) -> String {
    rows.iter()
        .map(|row| format!("{{ {} }}", join_decimal(row.iter())))
        .collect::<Vec<_>>()
        .join(",\n    ")
}

fn join_byte_matrix(rows: &[Vec<u8>]) -> String {
    rows.iter()
        .map(|row| format!("{{ {} }}", join_decimal(row.iter())))
        .collect::<Vec<_>>()
        .join(",\n    ")
}

/// Render the kernel source by substituting every `<<TAG>>` placeholder with
/// its computed value. Fails with `UnresolvedPlaceholder` if any
/// `<<[A-Z0-9_]+>>` token remains afterward.
pub fn render_kernel(template: &str, cfg: &KernelConfig) -> Result<String, SetupError> {
    let mut src = String::with_capacity(template.len() + 4096);
    src.push_str(template);

    replace(&mut src, "<<CODE_PREFIX_BYTES>>", &join_decimal(cfg.code_prefix_bytes.iter()));
    replace(&mut src, "<<CODE_STATE_BASE>>", &join_hex_words(&cfg.code_state_base));
    replace(&mut src, "<<CRC16_TABLE>>", &join_decimal(cfg.crc16_table.iter()));
    replace(&mut src, "<<PREFIX_W_MATRIX>>", &join_word_matrix(&cfg.prefix_w_matrix));
    replace(&mut src, "<<PREFIX_MASK>>", &join_decimal(cfg.prefix_mask.iter()));
    replace(&mut src, "<<PREFIX_VAL>>", &join_decimal(cfg.prefix_val.iter()));
    replace(&mut src, "<<HAS_CRC_CONSTRAINT>>", &(cfg.has_crc_constraint as u8).to_string());
    replace(&mut src, "<<N_ACTIVE>>", &cfg.prefix_pos.len().to_string());
    replace(&mut src, "<<N_ACTIVE_NOCRC>>", &cfg.prefix_pos_nocrc.len().to_string());
    replace(&mut src, "<<PREFIX_POS>>", &join_decimal(cfg.prefix_pos.iter()));
    replace(&mut src, "<<PREFIX_POS_NOCRC>>", &join_decimal(cfg.prefix_pos_nocrc.iter()));
    replace(&mut src, "<<N_CASE_INSENSITIVE>>", &cfg.ci_bitpos.len().to_string());
    replace(&mut src, "<<CASE_BITPOS>>", &join_decimal(cfg.ci_bitpos.iter()));
    replace(&mut src, "<<CASE_ALT0>>", &join_decimal(cfg.ci_alt0.iter()));
    replace(&mut src, "<<CASE_ALT1>>", &join_decimal(cfg.ci_alt1.iter()));
    replace(&mut src, "<<N_STATEINIT_VARIANTS>>", &cfg.stateinit_variants.len().to_string());
    replace(&mut src, "<<STATEINIT_PREFIX_MAX_LEN>>", &cfg.stateinit_prefix_max_len.to_string());
    replace(&mut src, "<<STATEINIT_PREFIX_MATRIX>>", &join_byte_matrix(&cfg.stateinit_prefix_padded));
    replace(&mut src, "<<STATEINIT_PREFIX_LENS>>", &join_decimal(cfg.stateinit_prefix_lens.iter()));
    replace(&mut src, "<<FLAGS_HI>>", &cfg.flags_hi.to_string());
    replace(&mut src, "<<FLAGS_LO>>", &cfg.flags_lo.to_string());
    replace(&mut src, "<<FREE_HASH_MASK>>", &cfg.free_hash_mask.to_string());
    replace(&mut src, "<<FREE_HASH_VAL>>", &cfg.free_hash_val.to_string());

    if let Some(tag) = find_unresolved_placeholder(&src) {
        return Err(SetupError::UnresolvedPlaceholder(tag));
    }

    Ok(src)
}

fn find_unresolved_placeholder(src: &str) -> Option<String> {
    let bytes = src.as_bytes();
    let mut i = 0;
    while i + 1 < bytes.len() {
        if bytes[i] == b'<' && bytes[i + 1] == b'<' {
            if let Some(end) = src[i + 2..].find(">>") {
                let tag = &src[i + 2..i + 2 + end];
                if !tag.is_empty() && tag.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'_') {
                    let mut out = String::new();
                    let _ = write!(out, "<<{}>>", tag);
                    return Some(out);
                }
            }
        }
        i += 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RawArgs, SearchConfig};
    use crate::pattern::PatternCompiler;

    fn sample_kernel_config() -> KernelConfig {
        let args = RawArgs {
            owner: "EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c".to_string(),
            start: Some("kQ".to_string()),
            end: None,
            masterchain: false,
            non_bounceable: false,
            testnet: false,
            case_sensitive: true,
            only_one: false,
        };
        let cfg = SearchConfig::try_from(args).unwrap();
        PatternCompiler::compile(&cfg).unwrap()
    }

    #[test]
    fn render_leaves_no_placeholders() {
        let kc = sample_kernel_config();
        let rendered = render_kernel(KERNEL_TEMPLATE, &kc).unwrap();
        assert!(find_unresolved_placeholder(&rendered).is_none());
    }

    #[test]
    fn missing_placeholder_in_template_is_harmless() {
        let kc = sample_kernel_config();
        let rendered = render_kernel("no placeholders here", &kc).unwrap();
        assert_eq!(rendered, "no placeholders here");
    }

    #[test]
    fn leftover_placeholder_is_reported() {
        let kc = sample_kernel_config();
        let err = render_kernel("<<NOT_A_REAL_TAG>>", &kc).unwrap_err();
        match err {
            SetupError::UnresolvedPlaceholder(tag) => assert_eq!(tag, "<<NOT_A_REAL_TAG>>"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
