//! Defining loader identities
//!
//! The engine never loads anything itself; a loader is only an identity that
//! distinguishes two modules carrying the same name.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque identity of a user-defined loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoaderId(u64);

impl LoaderId {
    /// Allocate a loader id never handed out before
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        LoaderId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Loader a module is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Loader {
    /// The platform's default loader (the boot layer uses it for every module)
    #[default]
    Platform,
    /// A user-defined loader
    Custom(LoaderId),
}

impl Loader {
    /// Bind to a freshly allocated user-defined loader
    pub fn custom() -> Self {
        Loader::Custom(LoaderId::next())
    }

    /// Whether this is the platform loader
    pub fn is_platform(&self) -> bool {
        matches!(self, Loader::Platform)
    }
}

impl fmt::Display for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loader::Platform => write!(f, "platform"),
            Loader::Custom(id) => write!(f, "loader#{}", id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_loaders_are_distinct() {
        assert_ne!(Loader::custom(), Loader::custom());
        assert_eq!(Loader::default(), Loader::Platform);
    }

    #[test]
    fn test_display() {
        assert_eq!(Loader::Platform.to_string(), "platform");
        let id = LoaderId::next();
        assert_eq!(Loader::Custom(id).to_string(), format!("loader#{}", id.as_u64()));
    }
}
