//! Last-write-wins resolution for writes presented out of band, e.g. by
//! another replica. The decision depends only on wall-clock timestamps, so
//! clock skew between writers can let an older write win.

use crate::types::{Entry, Timestamp};

/// A write arriving from outside the local put path
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingWrite {
    pub value: String,
    pub version: u64,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Replace the local entry with this one
    Accept(Entry),
    /// Keep the local entry untouched
    KeepExisting,
}

/// Decide between the local entry and an incoming write.
///
/// An absent key always takes the incoming write, with no expiry. A present
/// key takes it only when its timestamp is strictly newer; ties keep the
/// local entry. An accepted write inherits the local entry's expiry.
pub fn resolve(existing: Option<&Entry>, incoming: IncomingWrite) -> Resolution {
    let expiry = match existing {
        None => None,
        Some(local) if incoming.timestamp > local.timestamp => local.expiry,
        Some(_) => return Resolution::KeepExisting,
    };
    Resolution::Accept(Entry::new(
        incoming.value,
        incoming.version,
        incoming.timestamp,
        expiry,
    ))
}
