//! Shared name validation (spec §4.2: snapshot-set/schedule names).

use crate::error::{Error, Result};

const FORBIDDEN: &[char] = &['/', '\\', '_', ' ', '@', '|'];

/// Validate a snapshot-set or schedule name against the forbidden-character
/// set. Does not check uniqueness; callers check that against their own index.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::argument("name must not be empty"));
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN.contains(c)) {
        return Err(Error::argument(format!(
            "name {name:?} contains forbidden character {c:?}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_underscore() {
        assert!(validate_name("test_set").is_err());
    }

    #[test]
    fn rejects_slash() {
        assert!(validate_name("test/set").is_err());
    }

    #[test]
    fn accepts_plain_name() {
        assert!(validate_name("testset0").is_ok());
    }
}
