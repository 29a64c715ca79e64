//! Webhook source authentication.
//!
//! Before a notification body is even parsed, the caller's network
//! address must match the gateway's published ranges. Matching is done
//! with prefix arithmetic over the address bits, never string
//! comparison, and an undeterminable address is always a denial.

use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

use axum::http::HeaderMap;
use once_cell::sync::Lazy;

use super::errors::WebhookError;

/// Headers consulted for the client address, most specific first:
/// the first hop of a forwarded-for chain, then a single-hop reverse
/// proxy header, then the CDN header.
const IP_HEADER_PRECEDENCE: [&str; 3] = ["x-forwarded-for", "x-real-ip", "cf-connecting-ip"];

/// Gateway notification ranges used when no allowlist is configured.
pub static DEFAULT_ALLOWLIST: Lazy<Vec<AllowRule>> = Lazy::new(|| {
    [
        "197.97.145.144/28",
        "41.74.179.192/27",
        "102.216.36.0/28",
        "102.216.36.128/28",
        "144.126.193.139",
    ]
    .iter()
    .map(|s| AllowRule::from_str(s).expect("default allowlist entries are valid"))
    .collect()
});

/// A single allowlist entry: one address or a CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowRule {
    V4 { network: u32, prefix: u8 },
    V6 { network: u128, prefix: u8 },
}

impl AllowRule {
    /// Builds a rule covering exactly one address.
    pub fn single(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(v4) => AllowRule::V4 {
                network: u32::from(v4),
                prefix: 32,
            },
            IpAddr::V6(v6) => AllowRule::V6 {
                network: u128::from(v6),
                prefix: 128,
            },
        }
    }

    /// Builds a CIDR rule, zeroing host bits of the network.
    pub fn cidr(addr: IpAddr, prefix: u8) -> Result<Self, WebhookError> {
        match addr {
            IpAddr::V4(v4) => {
                if prefix > 32 {
                    return Err(WebhookError::ParseError(format!(
                        "invalid v4 prefix length {}",
                        prefix
                    )));
                }
                Ok(AllowRule::V4 {
                    network: u32::from(v4) & mask_v4(prefix),
                    prefix,
                })
            }
            IpAddr::V6(v6) => {
                if prefix > 128 {
                    return Err(WebhookError::ParseError(format!(
                        "invalid v6 prefix length {}",
                        prefix
                    )));
                }
                Ok(AllowRule::V6 {
                    network: u128::from(v6) & mask_v6(prefix),
                    prefix,
                })
            }
        }
    }

    /// True when `addr` falls inside this rule.
    ///
    /// Address families never match each other; a v4-mapped v6 address is
    /// compared as v4.
    pub fn contains(&self, addr: IpAddr) -> bool {
        let addr = canonicalize(addr);
        match (self, addr) {
            (AllowRule::V4 { network, prefix }, IpAddr::V4(v4)) => {
                u32::from(v4) & mask_v4(*prefix) == *network
            }
            (AllowRule::V6 { network, prefix }, IpAddr::V6(v6)) => {
                u128::from(v6) & mask_v6(*prefix) == *network
            }
            _ => false,
        }
    }
}

impl FromStr for AllowRule {
    type Err = WebhookError;

    /// Parses `"a.b.c.d"`, `"a.b.c.d/n"`, or the v6 equivalents.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr
                    .parse()
                    .map_err(|_| WebhookError::ParseError(format!("invalid address: {}", s)))?;
                let prefix: u8 = prefix
                    .parse()
                    .map_err(|_| WebhookError::ParseError(format!("invalid prefix: {}", s)))?;
                AllowRule::cidr(addr, prefix)
            }
            None => {
                let addr: IpAddr = s
                    .parse()
                    .map_err(|_| WebhookError::ParseError(format!("invalid address: {}", s)))?;
                Ok(AllowRule::single(addr))
            }
        }
    }
}

fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix))
    }
}

fn canonicalize(addr: IpAddr) -> IpAddr {
    if let IpAddr::V6(v6) = addr {
        if let Some(v4) = v6.to_ipv4_mapped() {
            return IpAddr::V4(v4);
        }
    }
    addr
}

/// Extracts the client address from request headers.
///
/// Walks the precedence list and returns the first parseable address.
/// For a forwarded-for chain only the first hop counts; later entries
/// are proxies.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    for name in IP_HEADER_PRECEDENCE {
        let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
            continue;
        };
        let candidate = value.split(',').next().unwrap_or("").trim();
        if let Ok(addr) = candidate.parse::<IpAddr>() {
            return Some(addr);
        }
    }
    None
}

/// Decides whether a webhook caller is the payment gateway.
pub struct SourceAuthenticator {
    allowlist: Vec<AllowRule>,
    skip_check: bool,
}

impl SourceAuthenticator {
    /// Creates an authenticator over the given allowlist.
    ///
    /// `skip_check` exists for local testing only; when enabled every
    /// authorization logs a loud warning.
    pub fn new(allowlist: Vec<AllowRule>, skip_check: bool) -> Self {
        Self {
            allowlist,
            skip_check,
        }
    }

    /// Creates an authenticator over the gateway's published ranges.
    pub fn with_default_allowlist(skip_check: bool) -> Self {
        Self::new(DEFAULT_ALLOWLIST.clone(), skip_check)
    }

    /// Allows or denies the caller. Deny-by-default when the address is
    /// unknown.
    pub fn authorize(&self, client_ip: Option<IpAddr>) -> Result<IpAddr, WebhookError> {
        if self.skip_check {
            tracing::warn!(
                "SOURCE IP CHECK DISABLED - accepting webhook without gateway address verification. \
                 Never run with this setting in production."
            );
            return Ok(client_ip.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED)));
        }

        let ip = client_ip.ok_or(WebhookError::SourceUnknown)?;
        if self.allowlist.iter().any(|rule| rule.contains(ip)) {
            Ok(ip)
        } else {
            Err(WebhookError::SourceRejected)
        }
    }
}
