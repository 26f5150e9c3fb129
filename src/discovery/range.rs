//! CIDR range parsing and enumeration

use crate::{AuditError, Result};
use ipnetwork::Ipv4Network;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An IPv4 network given as base address plus prefix length.
///
/// Host bits of the base address are masked off, so `10.0.0.7/30` covers
/// `10.0.0.4` through `10.0.0.7`. Network and broadcast addresses are part
/// of the enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRange {
    network: Ipv4Network,
}

impl AddressRange {
    pub fn new(base: Ipv4Addr, prefix: u8) -> Result<Self> {
        let network = Ipv4Network::new(base, prefix)
            .map_err(|e| AuditError::ConfigError(format!("Invalid network {}/{}: {}", base, prefix, e)))?;
        // Normalise to the network address so enumeration starts at the range base
        let network = Ipv4Network::new(network.network(), prefix)
            .map_err(|e| AuditError::ConfigError(e.to_string()))?;
        Ok(Self { network })
    }

    pub fn base(&self) -> Ipv4Addr {
        self.network.network()
    }

    pub fn prefix(&self) -> u8 {
        self.network.prefix()
    }

    /// Number of addresses in the range, network and broadcast included
    pub fn len(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix()))
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.network.contains(addr)
    }

    /// Lazily enumerate every address in ascending order.
    ///
    /// Each call starts a fresh iterator.
    pub fn iter(&self) -> AddressIter {
        let start = u64::from(u32::from(self.base()));
        AddressIter {
            next: start,
            end: start + self.len(),
        }
    }
}

impl FromStr for AddressRange {
    type Err = AuditError;

    fn from_str(cidr: &str) -> Result<Self> {
        let cidr = cidr.trim();
        let (addr_part, prefix_part) = cidr.split_once('/').ok_or_else(|| {
            AuditError::ConfigError(format!("Missing prefix length in network '{}'", cidr))
        })?;

        if prefix_part.contains('/') {
            return Err(AuditError::ConfigError(format!("Invalid CIDR format: '{}'", cidr)));
        }

        // Ipv4Addr's parser is strict: exactly four decimal octets, each 0..=255
        let base = Ipv4Addr::from_str(addr_part).map_err(|_| {
            AuditError::ConfigError(format!("Invalid IPv4 address '{}' in network '{}'", addr_part, cidr))
        })?;

        if prefix_part.is_empty() || !prefix_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AuditError::ConfigError(format!(
                "Invalid prefix length '{}' in network '{}'",
                prefix_part, cidr
            )));
        }
        let prefix: u8 = prefix_part.parse().map_err(|_| {
            AuditError::ConfigError(format!("Prefix length '{}' out of range", prefix_part))
        })?;
        if prefix > 32 {
            return Err(AuditError::ConfigError(format!(
                "IPv4 prefix length cannot exceed 32 (got {})",
                prefix
            )));
        }

        Self::new(base, prefix)
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base(), self.prefix())
    }
}

impl IntoIterator for &AddressRange {
    type Item = Ipv4Addr;
    type IntoIter = AddressIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over the addresses of an [`AddressRange`]
#[derive(Debug, Clone)]
pub struct AddressIter {
    // u64 so a /0 range can run one past 255.255.255.255
    next: u64,
    end: u64,
}

impl Iterator for AddressIter {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        let addr = Ipv4Addr::from(self.next as u32);
        self.next += 1;
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // A /0 range does not fit in a 32-bit usize
        match usize::try_from(self.end - self.next) {
            Ok(remaining) => (remaining, Some(remaining)),
            Err(_) => (usize::MAX, None),
        }
    }
}
