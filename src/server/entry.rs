use bytes::Bytes;

/// A stored value with its optional expiration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    value: Bytes,
    expires_at: Option<u64>,
}

impl Entry {
    /// Creates an entry that expires at the given unix time in milliseconds,
    /// or never when `expires_at` is `None`.
    pub fn new(value: Bytes, expires_at: Option<u64>) -> Self {
        Self { value, expires_at }
    }

    pub fn value(&self) -> &Bytes {
        &self.value
    }

    pub fn expires_at(&self) -> Option<u64> {
        self.expires_at
    }
}
