use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::str::FromStr;

use alloy::primitives::{Address, U256};
use url::Url;

use crate::constants::{DEFAULT_CHAIN_ID, MAX_FEE_BPS, MAX_VALID_FOR_SEC, NATIVE_TOKEN};
use crate::error::ValidationError;
use crate::gate::NewGate;

/// Longest display name accepted for a gate.
const MAX_NAME_LEN: usize = 128;

/// Check if an IPv4 address is private, loopback, or otherwise non-routable.
pub fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()          // 127.0.0.0/8
        || ip.is_private()    // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
        || ip.is_link_local() // 169.254.0.0/16
        || ip.is_broadcast()
        || ip.is_unspecified()
        || ip.octets()[0] == 100 && (ip.octets()[1] & 0xC0) == 64 // 100.64.0.0/10 (CGNAT)
}

/// Check if an IPv6 address is private, loopback, or otherwise non-routable.
pub fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    ip.is_loopback()
        || ip.is_unspecified()
        || {
            let segments = ip.segments();
            // fc00::/7 unique local, fe80::/10 link-local
            (segments[0] & 0xFE00) == 0xFC00
                || (segments[0] & 0xFFC0) == 0xFE80
                || ip.to_ipv4_mapped().is_some_and(|v4| is_private_ipv4(&v4))
        }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_ipv4(v4),
        IpAddr::V6(v6) => is_private_ipv6(v6),
    }
}

/// Validate an upstream URL for a new gate.
///
/// HTTPS only, and the host must not be loopback, private, or a local
/// domain unless `allow_private` is set (local development).
pub fn validate_api_url(url: &str, allow_private: bool) -> Result<Url, ValidationError> {
    let parsed =
        Url::parse(url).map_err(|_| ValidationError::InvalidUrl("invalid URL format".to_string()))?;

    let scheme_ok = match parsed.scheme() {
        "https" => true,
        "http" => allow_private,
        _ => false,
    };
    if !scheme_ok {
        return Err(ValidationError::InvalidUrl(
            "upstream must use HTTPS".to_string(),
        ));
    }

    let private = match parsed.host() {
        Some(url::Host::Ipv4(ip)) => is_private_ipv4(&ip),
        Some(url::Host::Ipv6(ip)) => is_private_ipv6(&ip),
        Some(url::Host::Domain(domain)) => {
            let domain = domain.to_lowercase();
            domain == "localhost"
                || domain.ends_with(".localhost")
                || domain.ends_with(".local")
                || domain.ends_with(".internal")
        }
        None => {
            return Err(ValidationError::InvalidUrl(
                "upstream URL must have a host".to_string(),
            ));
        }
    };
    if private && !allow_private {
        return Err(ValidationError::InvalidUrl(
            "upstream cannot be localhost or a private address".to_string(),
        ));
    }

    Ok(parsed)
}

/// Resolve `host` and reject it if any address is private or loopback.
///
/// Runs right before each upstream fetch so a domain that was public at
/// registration cannot later be rebound to an internal address. Returns the
/// address that passed, which the fetch must connect to.
pub async fn validate_resolved_host(host: &str, port: u16) -> Result<SocketAddr, String> {
    if let Ok(ip) = host.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
        return if is_private_ip(&ip) {
            Err("upstream resolves to a private IP address".to_string())
        } else {
            Ok(SocketAddr::new(ip, port))
        };
    }

    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| format!("DNS resolution failed for {host}: {e}"))?
        .collect();

    if addrs.iter().any(|addr| is_private_ip(&addr.ip())) {
        return Err("upstream resolves to a private IP address".to_string());
    }
    addrs
        .into_iter()
        .next()
        .ok_or_else(|| format!("DNS resolution returned no addresses for {host}"))
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, ValidationError> {
    Address::from_str(value.trim()).map_err(|_| ValidationError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

/// Raw gate registration fields, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GateDraft {
    pub name: Option<String>,
    pub api_url: String,
    pub merchant_wallet: String,
    pub token_address: Option<String>,
    pub amount_wei: String,
    pub valid_for_sec: i64,
    pub chain_id: Option<u64>,
    pub fee_bps_snapshot: Option<u32>,
}

impl GateDraft {
    /// Check every field and produce the typed registration.
    pub fn validate(self, allow_private: bool) -> Result<NewGate, ValidationError> {
        let api_url = validate_api_url(self.api_url.trim(), allow_private)?;
        let merchant_wallet = parse_address("merchant_wallet", &self.merchant_wallet)?;
        if merchant_wallet == Address::ZERO {
            return Err(ValidationError::InvalidAddress {
                field: "merchant_wallet",
                value: self.merchant_wallet,
            });
        }
        let token_address = match self.token_address.as_deref().map(str::trim) {
            None | Some("") => NATIVE_TOKEN,
            Some(token) => parse_address("token_address", token)?,
        };

        let amount_wei = U256::from_str_radix(self.amount_wei.trim(), 10)
            .map_err(|_| ValidationError::InvalidAmount(self.amount_wei.clone()))?;
        if amount_wei.is_zero() {
            return Err(ValidationError::InvalidAmount(
                "amount must be greater than zero".to_string(),
            ));
        }

        let valid_for_sec = u64::try_from(self.valid_for_sec)
            .ok()
            .filter(|&secs| secs > 0 && secs <= MAX_VALID_FOR_SEC)
            .ok_or_else(|| {
                ValidationError::InvalidValidity(format!(
                    "{} (must be between 1 and {MAX_VALID_FOR_SEC} seconds)",
                    self.valid_for_sec
                ))
            })?;

        if let Some(fee) = self.fee_bps_snapshot {
            if fee > MAX_FEE_BPS {
                return Err(ValidationError::InvalidFee(format!(
                    "{fee} bps exceeds {MAX_FEE_BPS}"
                )));
            }
        }

        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        if name.as_ref().is_some_and(|n| n.chars().count() > MAX_NAME_LEN) {
            return Err(ValidationError::InvalidName(format!(
                "must be at most {MAX_NAME_LEN} characters"
            )));
        }

        Ok(NewGate {
            name,
            api_url: api_url.to_string(),
            merchant_wallet,
            token_address,
            amount_wei,
            valid_for_sec,
            chain_id: self.chain_id.unwrap_or(DEFAULT_CHAIN_ID),
            fee_bps_snapshot: self.fee_bps_snapshot,
        })
    }
}
