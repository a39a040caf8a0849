use serde::{Deserialize, Serialize};

/// Identifier of a cluster member or client, e.g. `n3` or `c12`
#[derive(
    Clone, Debug, Default, Deserialize, Serialize, PartialEq, PartialOrd, Ord, Eq, Hash,
)]
#[serde(transparent)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        MemberId::new(id.to_string())
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        MemberId::new(id)
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_as_plain_string() {
        let id = MemberId::from("n4");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"n4\"");
        let back: MemberId = serde_json::from_str("\"c1\"").unwrap();
        assert_eq!(back.as_str(), "c1");
    }

    #[test]
    fn test_ordering_follows_string() {
        let mut ids: Vec<MemberId> = vec!["n2".into(), "n0".into(), "n1".into()];
        ids.sort();
        assert_eq!(ids, vec!["n0".into(), "n1".into(), "n2".into()]);
    }
}
