//! Transport mode identifier.

use std::fmt;
use std::sync::Arc;

/// A transport mode such as `"bus"`, `"rail"` or `"tram"`.
///
/// Modes are interned strings: cloning is cheap (an `Arc` bump), so route
/// stops can carry their mode by value and the planner can hash it when
/// looking up per-mode cost parameters.
///
/// # Examples
///
/// ```
/// use transit_raptor::domain::Mode;
///
/// let rail = Mode::new("rail");
/// assert_eq!(rail.as_str(), "rail");
/// assert_eq!(rail, Mode::new("rail"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mode(Arc<str>);

impl Mode {
    /// Creates a mode from its name.
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    /// Returns the mode name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Mode {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_and_display() {
        let a = Mode::new("bus");
        let b = Mode::from("bus");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "bus");
        assert_ne!(a, Mode::new("rail"));
    }

    #[test]
    fn hash_consistent() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(Mode::new("tram"));
        assert!(set.contains(&Mode::new("tram")));
        assert!(!set.contains(&Mode::new("bus")));
    }
}
