//! Store key names for the single active draw.

/// Prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "luckydraw";

/// Rendered key names under a shared prefix.
///
/// There is no draw identifier: opening a new draw overwrites the keys of the
/// previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
    pub is_open: String,
    pub entrants: String,
    pub prizes: String,
    pub winners: String,
    /// Pairs drawn by an allocation that has not finished yet.
    pub winners_pending: String,
    pub winners_json: String,
    pub allocating: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let key = |name: &str| format!("{prefix}:{name}");
        Self {
            is_open: key("is_open"),
            entrants: key("entrants"),
            prizes: key("prizes"),
            winners: key("winners"),
            winners_pending: key("winners_pending"),
            winners_json: key("winners_json"),
            allocating: key("allocating"),
            prefix,
        }
    }

    /// Cached profile record for a normalized identity.
    pub fn profile(&self, identity: &str) -> String {
        format!("{}:profiles:{identity}", self.prefix)
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}
