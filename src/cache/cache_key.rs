// Cache keys: one per logical target address
use std::fmt;

/// Identifies one cached handle. `Default` lets the factory pick its configured target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Default,
    Address(String),
}

impl CacheKey {
    pub fn address(&self) -> Option<&str> {
        match self {
            CacheKey::Default => None,
            CacheKey::Address(address) => Some(address),
        }
    }
}

impl From<Option<&str>> for CacheKey {
    fn from(address: Option<&str>) -> Self {
        match address {
            Some(address) => CacheKey::Address(address.to_string()),
            None => CacheKey::Default,
        }
    }
}

impl From<&str> for CacheKey {
    fn from(address: &str) -> Self {
        CacheKey::Address(address.to_string())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Default => write!(f, "<default>"),
            CacheKey::Address(address) => write!(f, "{}", address),
        }
    }
}
