//! Client identifier derivation
//!
//! The forwarding headers are trusted as-is. That is only sound behind a
//! reverse proxy that overwrites them; nothing here can verify it.

use crm_common::Environment;
use std::sync::OnceLock;
use tracing::warn;

/// Shared bucket for header-less requests in production
pub const UNATTRIBUTED: &str = "unattributed";

static PROCESS_IDENTIFIER: OnceLock<String> = OnceLock::new();

/// Derive the rate-limit identifier of a request from its headers.
///
/// First entry of `X-Forwarded-For`, then `X-Real-IP`. Without either,
/// production maps the request to [`UNATTRIBUTED`] and other environments
/// use an identifier generated once per process.
pub fn client_identifier<'a, I>(headers: I, environment: Environment) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut forwarded_for = None;
    let mut real_ip = None;
    for (name, value) in headers {
        if forwarded_for.is_none() && name.eq_ignore_ascii_case("x-forwarded-for") {
            forwarded_for = value.split(',').next().map(str::trim).filter(|v| !v.is_empty());
        } else if real_ip.is_none() && name.eq_ignore_ascii_case("x-real-ip") {
            real_ip = Some(value.trim()).filter(|v| !v.is_empty());
        }
    }

    if let Some(ip) = forwarded_for.or(real_ip) {
        return ip.to_string();
    }

    if environment.is_production() {
        warn!(target: "security", bucket = UNATTRIBUTED, "request without client address headers");
        return UNATTRIBUTED.to_string();
    }

    PROCESS_IDENTIFIER
        .get_or_init(|| format!("local-{}", uuid::Uuid::new_v4()))
        .clone()
}
