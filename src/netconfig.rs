//! Persisted static IPv4 configuration of the station interface.
//!
//! The record is five little-endian `u32` addresses followed by a `u32`
//! integrity tag, written as a single 24-byte blob:
//!
//! ```text
//!  0        4        8        12       16       20       24
//!  ├address─┼gateway─┼mask────┼dns0────┼dns1────┼tag─────┤
//! ```
//!
//! An all-ones address marks "no stored configuration".

use core::fmt;
use core::net::Ipv4Addr;

use log::{debug, warn};

use crate::app::ports::{StorageError, StoragePort};

/// NVS namespace of the record.
pub const NAMESPACE: &str = "netcfg";
/// NVS key of the record.
pub const KEY: &str = "ipv4";

/// Integrity tag closing every valid record.
pub const TAG: u32 = 0xDEAD_BEEF;

/// Encoded record size.
pub const RECORD_LEN: usize = 24;

/// Address value meaning "no stored configuration".
pub const SENTINEL: Ipv4Addr = Ipv4Addr::BROADCAST;

// ───────────────────────────────────────────────────────────────
// NetworkIdentity
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub address: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet_mask: Ipv4Addr,
    pub dns0: Ipv4Addr,
    pub dns1: Ipv4Addr,
}

impl Default for NetworkIdentity {
    fn default() -> Self {
        Self {
            address: Ipv4Addr::UNSPECIFIED,
            gateway: Ipv4Addr::UNSPECIFIED,
            subnet_mask: Ipv4Addr::UNSPECIFIED,
            dns0: Ipv4Addr::UNSPECIFIED,
            dns1: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl NetworkIdentity {
    /// The record `clear()` writes.
    pub const fn unset() -> Self {
        Self {
            address: SENTINEL,
            gateway: Ipv4Addr::UNSPECIFIED,
            subnet_mask: Ipv4Addr::UNSPECIFIED,
            dns0: Ipv4Addr::UNSPECIFIED,
            dns1: Ipv4Addr::UNSPECIFIED,
        }
    }

    pub fn is_unset(&self) -> bool {
        self.address == SENTINEL
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let words = [
            u32::from(self.address),
            u32::from(self.gateway),
            u32::from(self.subnet_mask),
            u32::from(self.dns0),
            u32::from(self.dns1),
            TAG,
        ];
        let mut out = [0u8; RECORD_LEN];
        for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Decodes a stored record.  Wrong length, wrong tag and the
    /// sentinel address all yield `None`.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != RECORD_LEN {
            return None;
        }
        let mut words = [0u32; RECORD_LEN / 4];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        if words[5] != TAG {
            return None;
        }
        let id = Self {
            address: Ipv4Addr::from(words[0]),
            gateway: Ipv4Addr::from(words[1]),
            subnet_mask: Ipv4Addr::from(words[2]),
            dns0: Ipv4Addr::from(words[3]),
            dns1: Ipv4Addr::from(words[4]),
        };
        (!id.is_unset()).then_some(id)
    }

    fn mask(&self) -> u32 {
        u32::from(self.subnet_mask)
    }
}

impl fmt::Display for NetworkIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ip:{}, gw:{}, sn:{}, d0:{}, d1:{}",
            self.address, self.gateway, self.subnet_mask, self.dns0, self.dns1
        )
    }
}

// ───────────────────────────────────────────────────────────────
// Store
// ───────────────────────────────────────────────────────────────

/// Loads the stored identity.  Any storage or integrity problem means
/// "absent" and boot continues with DHCP.
pub fn load(storage: &impl StoragePort) -> Option<NetworkIdentity> {
    let mut buf = [0u8; RECORD_LEN + 1];
    match storage.read(NAMESPACE, KEY, &mut buf) {
        Ok(n) => {
            let id = NetworkIdentity::decode(&buf[..n]);
            if id.is_none() {
                warn!("NetId: stored record invalid ({} bytes), using DHCP", n);
            }
            id
        }
        Err(StorageError::NotFound) => {
            debug!("NetId: no stored record");
            None
        }
        Err(e) => {
            warn!("NetId: read failed: {}", e);
            None
        }
    }
}

pub fn save(storage: &mut impl StoragePort, identity: &NetworkIdentity) -> Result<(), StorageError> {
    storage.write(NAMESPACE, KEY, &identity.encode())
}

/// Overwrites the record with the sentinel.
pub fn clear(storage: &mut impl StoragePort) -> Result<(), StorageError> {
    save(storage, &NetworkIdentity::unset())
}

// ───────────────────────────────────────────────────────────────
// Reconfiguration requests
// ───────────────────────────────────────────────────────────────

/// An accepted address change, applied after the acknowledging response
/// has been flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpChange {
    /// Keep the network, switch to this host address.
    Static(Ipv4Addr),
    /// Drop the static record and ask for a lease.
    Dynamic,
}

impl IpChange {
    pub fn address(&self) -> Ipv4Addr {
        match self {
            Self::Static(a) => *a,
            Self::Dynamic => Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl fmt::Display for IpChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Change IP to '{}'", self.address())
    }
}

/// Longest candidate text echoed back in messages.
pub const CANDIDATE_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpChangeError {
    /// Not an IPv4 address.
    Invalid(heapless::String<CANDIDATE_LEN>),
    /// Resolves to the active address.
    Unchanged(heapless::String<CANDIDATE_LEN>),
    /// Resolves to the subnet broadcast address.
    Broadcast(Ipv4Addr),
}

impl fmt::Display for IpChangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(text) => write!(f, "Invalid ip '{}'", text),
            Self::Unchanged(text) => write!(f, "No IP change for '{}'", text),
            Self::Broadcast(addr) => write!(f, "Broadcast address '{}' not possible", addr),
        }
    }
}

fn echo(candidate: &str) -> heapless::String<CANDIDATE_LEN> {
    let mut s = heapless::String::new();
    for ch in candidate.chars() {
        if s.push(ch).is_err() {
            break;
        }
    }
    s
}

/// Validates a requested address against the active configuration.
///
/// `0.0.0.0` requests DHCP.  Any other address contributes only its host
/// bits; the network bits stay those of the active address.
pub fn plan_ip_change(candidate: &str, active: &NetworkIdentity) -> Result<IpChange, IpChangeError> {
    let requested: Ipv4Addr = candidate
        .trim()
        .parse()
        .map_err(|_| IpChangeError::Invalid(echo(candidate)))?;

    let mask = active.mask();
    let old = u32::from(active.address);
    let new = match u32::from(requested) {
        0 => 0,
        host => (host & !mask) | (old & mask),
    };

    if new == old {
        return Err(IpChangeError::Unchanged(echo(candidate)));
    }
    if new == 0 {
        return Ok(IpChange::Dynamic);
    }
    if new & !mask == !mask {
        return Err(IpChangeError::Broadcast(Ipv4Addr::from(new)));
    }
    Ok(IpChange::Static(Ipv4Addr::from(new)))
}
