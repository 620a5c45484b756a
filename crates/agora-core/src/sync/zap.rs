//! Zap receipt (kind 9735) wire parsing.
//!
//! Both parsers degrade instead of erroring: a receipt with an unreadable
//! invoice still produces a notification for 0 sats, and an unreadable
//! description produces an [`ZapAttribution::Unattributed`] record. Neither
//! outcome aborts a sync tick.

use std::sync::OnceLock;

use base64::Engine;
use regex_lite::Regex;
use serde::Deserialize;

/// Millisat amount segment inside the bolt11 invoice tag, matched as
/// `s=(\d+)`. An `s=` without digits does not count as the segment; absent or
/// malformed segments yield 0 sats.
pub fn amount_sats_from_bolt11(invoice: &str) -> u64 {
    static AMOUNT: OnceLock<Regex> = OnceLock::new();
    let re = AMOUNT.get_or_init(|| Regex::new(r"s=(\d+)").expect("static pattern"));
    re.captures(invoice)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(|millisats| millisats / 1000)
        .unwrap_or(0)
}

/// Who sent the zap, recovered from the receipt's `description` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZapAttribution {
    Sender { pubkey: String },
    /// Named fallback: the description tag was missing, not base64, not JSON,
    /// or carried no pubkey. The record gets no sender, deliberately.
    Unattributed,
}

#[derive(Deserialize)]
struct ZapRequest {
    pubkey: Option<String>,
}

/// Decode the base64 zap-request JSON embedded in the `description` tag.
pub fn attribution_from_description(description: &str) -> ZapAttribution {
    let Ok(raw) = base64::engine::general_purpose::STANDARD.decode(description) else {
        return ZapAttribution::Unattributed;
    };
    let Ok(request) = serde_json::from_slice::<ZapRequest>(&raw) else {
        return ZapAttribution::Unattributed;
    };
    match request.pubkey {
        Some(pubkey) if !pubkey.is_empty() => ZapAttribution::Sender { pubkey },
        _ => ZapAttribution::Unattributed,
    }
}
