//! Pure IPv4 subnet math for the network allocator.
//!
//! Parsing, overlap detection, DNS host derivation, and the candidate
//! ordering are all here; discovery of in-use CIDRs lives in
//! `infra::network`.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::domain::error::ConfigError;

/// Offset of the DNS host inside an allocated subnet (`network + 53`).
pub const DNS_HOST_OFFSET: u32 = 53;

/// An IPv4 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: u32,
    prefix: u8,
}

impl Subnet {
    #[must_use]
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Self {
        let raw = u32::from(addr);
        let mask = Self::mask(prefix);
        Self {
            network: raw & mask,
            prefix,
        }
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }

    /// Network address as an [`Ipv4Addr`].
    #[must_use]
    pub fn network_addr(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        (u32::from(addr) & Self::mask(self.prefix)) == self.network
    }

    /// Two networks overlap when either contains the other's network address.
    #[must_use]
    pub fn overlaps(&self, other: &Subnet) -> bool {
        self.contains(other.network_addr()) || other.contains(self.network_addr())
    }

    /// DNS host address for this subnet: network + 53 when that lands on a
    /// usable host octet, else network + 3.
    #[must_use]
    pub fn dns_host(&self) -> Ipv4Addr {
        let candidate = Ipv4Addr::from(self.network.wrapping_add(DNS_HOST_OFFSET));
        if self.contains(candidate) && valid_host_octet(candidate) {
            return candidate;
        }
        let fallback = Ipv4Addr::from(self.network.wrapping_add(3));
        if self.contains(fallback) && valid_host_octet(fallback) {
            return fallback;
        }
        self.network_addr()
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network_addr(), self.prefix)
    }
}

impl FromStr for Subnet {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| format!("not CIDR notation: {s}"))?;
        let addr: Ipv4Addr = addr.parse().map_err(|e| format!("bad address {addr}: {e}"))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|e| format!("bad prefix {prefix}: {e}"))?;
        if prefix > 32 {
            return Err(format!("prefix out of range: {prefix}"));
        }
        Ok(Subnet::new(addr, prefix))
    }
}

fn valid_host_octet(addr: Ipv4Addr) -> bool {
    let last = addr.octets()[3];
    last != 0 && last != 255
}

/// True when `candidate` overlaps any entry in `used`. Unparseable entries in
/// `used` are skipped (route tables carry IPv6 and host routes too).
#[must_use]
pub fn overlaps_any(candidate: &Subnet, used: &[String]) -> bool {
    used.iter()
        .filter_map(|u| u.parse::<Subnet>().ok())
        .any(|u| candidate.overlaps(&u))
}

/// Ordered candidate /24 subnets: the preferred CIDR (when given) first, then
/// the `172.16.0.0/12` private range walked by third octet, then `10.0.0.0/8`
/// blocks, then `192.168.0.0/16`.
#[must_use]
pub fn candidate_subnets(preferred: Option<Subnet>) -> Vec<Subnet> {
    let mut out = Vec::with_capacity(96);
    if let Some(p) = preferred {
        out.push(p);
    }
    // 172.30.10.0/24, 172.30.20.0/24, ... then the sibling /16s of the
    // 172.16.0.0/12 block.
    for second in [30u8, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27, 28, 29, 31] {
        for third in (10..=250).step_by(10) {
            out.push(Subnet::new(Ipv4Addr::new(172, second, third, 0), 24));
        }
    }
    for second in (10..=250).step_by(10) {
        out.push(Subnet::new(Ipv4Addr::new(10, second, 0, 0), 24));
    }
    for third in (10..=250).step_by(10) {
        out.push(Subnet::new(Ipv4Addr::new(192, 168, third, 0), 24));
    }
    out
}

/// Pick the first candidate that overlaps nothing in `used` or `reserved`.
///
/// # Errors
///
/// Returns [`ConfigError::SubnetExhausted`] when every candidate collides.
pub fn pick_free_subnet(
    preferred: Option<Subnet>,
    used: &[String],
    reserved: &[Subnet],
) -> Result<Subnet, ConfigError> {
    let candidates = candidate_subnets(preferred);
    let total = candidates.len();
    for c in candidates {
        if overlaps_any(&c, used) {
            continue;
        }
        if reserved.iter().any(|r| c.overlaps(r)) {
            continue;
        }
        return Ok(c);
    }
    Err(ConfigError::SubnetExhausted(total))
}
