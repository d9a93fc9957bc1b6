//! CLI surface and validated search configuration.
//!
//! Argument parsing itself is an external collaborator from the core's point
//! of view; this module only owns the `clap` derive and the validation step
//! that turns raw args into an immutable [`SearchConfig`].

use base64::Engine as _;
use clap::Parser;
use serde::Serialize;

use crate::error::ConfigError;
use crate::primitives::is_base64url;

/// Generate beautiful TON wallet addresses on GPU using the vanity contract.
#[derive(Parser, Debug)]
#[command(
    name = "ton-vanity-gen",
    about = "Generate beautiful TON wallet addresses on GPU using the vanity contract.",
    disable_help_subcommand = true
)]
pub struct RawArgs {
    /// Base64url owner address for the vanity contract.
    #[arg(short, long)]
    pub owner: String,

    /// Address prefix to match, base64url.
    #[arg(short, long)]
    pub start: Option<String>,

    /// Address suffix to match, base64url.
    #[arg(short, long)]
    pub end: Option<String>,

    /// Use masterchain (workchain -1) instead of basechain.
    #[arg(short, long)]
    pub masterchain: bool,

    /// Search for non-bounceable addresses instead of bounceable.
    #[arg(short, long)]
    pub non_bounceable: bool,

    /// Search for testnet addresses.
    #[arg(short, long)]
    pub testnet: bool,

    /// Treat prefix/suffix matching as case-sensitive.
    #[arg(long)]
    pub case_sensitive: bool,

    /// Stop after the first matching address is found.
    #[arg(long)]
    pub only_one: bool,
}

/// Validated, immutable search configuration threaded through the compiler,
/// the kernel renderer, and every device worker.
#[derive(Debug, Clone, Serialize)]
pub struct SearchConfig {
    pub owner: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub masterchain: bool,
    pub non_bounceable: bool,
    pub testnet: bool,
    pub case_sensitive: bool,
    pub only_one: bool,

    /// Decoded owner bytes (at least 34 bytes: flags, workchain, account id, ...).
    #[serde(skip)]
    pub owner_raw: Vec<u8>,
}

impl TryFrom<RawArgs> for SearchConfig {
    type Error = ConfigError;

    fn try_from(args: RawArgs) -> Result<Self, ConfigError> {
        if args.start.is_none() && args.end.is_none() {
            return Err(ConfigError::MissingPattern);
        }

        if !is_base64url(&args.owner) {
            return Err(ConfigError::OwnerNotBase64Url);
        }
        let owner_raw = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&args.owner)
            .map_err(|_| ConfigError::OwnerDecodeFailed)?;
        if owner_raw.len() < 34 {
            return Err(ConfigError::OwnerTooShort);
        }

        if let Some(start) = &args.start {
            if !is_base64url(start) {
                return Err(ConfigError::StartNotBase64Url);
            }
        }
        if let Some(end) = &args.end {
            if !is_base64url(end) {
                return Err(ConfigError::EndNotBase64Url);
            }
        }

        Ok(SearchConfig {
            owner: args.owner,
            start: args.start,
            end: args.end,
            masterchain: args.masterchain,
            non_bounceable: args.non_bounceable,
            testnet: args.testnet,
            case_sensitive: args.case_sensitive,
            only_one: args.only_one,
            owner_raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args(owner: &str) -> RawArgs {
        RawArgs {
            owner: owner.to_string(),
            start: Some("kQ".to_string()),
            end: None,
            masterchain: false,
            non_bounceable: false,
            testnet: false,
            case_sensitive: false,
            only_one: false,
        }
    }

    #[test]
    fn rejects_missing_start_and_end() {
        let mut args = base_args("EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c");
        args.start = None;
        args.end = None;
        let err = SearchConfig::try_from(args).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPattern));
    }

    #[test]
    fn rejects_too_short_owner() {
        let args = base_args("QQ");
        let err = SearchConfig::try_from(args).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OwnerTooShort | ConfigError::OwnerDecodeFailed
        ));
    }

    #[test]
    fn accepts_well_formed_owner() {
        let args = base_args("EQAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAM9c");
        let cfg = SearchConfig::try_from(args).unwrap();
        assert!(cfg.owner_raw.len() >= 34);
    }
}
