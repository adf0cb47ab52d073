use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn from_str(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(TaskId);
id_newtype!(PatchName);
id_newtype!(RunId);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl PatchName {
    /// Ledger name of the single candidate in a baseline run (the checked-out source itself).
    pub fn developer() -> Self {
        Self::from_str("developer")
    }

    /// Prompt variant encoded in a `{task}_prompt{N}` patch name, if any.
    pub fn prompt_variant(&self) -> Option<u32> {
        let (_, tail) = self.0.rsplit_once("_prompt")?;
        let digits: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn prompt_variant_parses_suffix() {
        assert_eq!(PatchName::from_str("KAFKA-1_prompt3").prompt_variant(), Some(3));
        assert_eq!(PatchName::from_str("abc_prompt12_run2").prompt_variant(), Some(12));
        assert_eq!(PatchName::from_str("developer").prompt_variant(), None);
        assert_eq!(PatchName::from_str("x_prompt").prompt_variant(), None);
    }
}
