//! Cloud objects kept by the store actors, serialized in the shape the real APIs return.

pub mod backup;
pub mod eip;
pub mod peering;
pub mod port;
pub mod router;
pub mod subnet;
pub mod vpc;

pub use backup::Backup;
pub use eip::Eip;
pub use peering::Peering;
pub use port::Port;
pub use router::Router;
pub use subnet::Subnet;
pub use vpc::Vpc;

/// Reads `present`-aware JSON: a missing key is `None`, an explicit `null` is `Some(None)`.
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    serde::Deserialize::deserialize(deserializer).map(Some)
}

/// Small stable number derived from an ID, used for generated addresses.
pub(crate) fn octet(id: &str, salt: u8) -> u8 {
    let sum = id.bytes().fold(salt as u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    (sum % 200) as u8 + 10
}
