use serde::{Deserialize, Serialize};

/// Policy governing how instances of a binding are shared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifetime {
    /// New instance for every `resolve`
    Transient,
    /// One instance per container
    Scoped,
    /// One instance per root container, shared with every scope below it
    Singleton,
}

impl Lifetime {
    /// Check if the lifetime is singleton
    pub fn is_singleton(&self) -> bool {
        matches!(self, Lifetime::Singleton)
    }

    /// Check if the lifetime is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Lifetime::Transient)
    }

    /// Check if the lifetime is scoped
    pub fn is_scoped(&self) -> bool {
        matches!(self, Lifetime::Scoped)
    }

    /// Whether instances are cached in a lazy slot
    pub fn is_cached(&self) -> bool {
        !self.is_transient()
    }

    /// Get the lifetime name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifetime::Transient => "transient",
            Lifetime::Scoped => "scoped",
            Lifetime::Singleton => "singleton",
        }
    }
}

impl std::fmt::Display for Lifetime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Lifetime {
    type Err = crate::errors::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "transient" => Ok(Lifetime::Transient),
            "scoped" => Ok(Lifetime::Scoped),
            "singleton" => Ok(Lifetime::Singleton),
            _ => Err(crate::errors::CoreError::configuration(format!(
                "invalid lifetime '{}', expected transient, scoped or singleton",
                s
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetime_from_str() {
        assert_eq!("singleton".parse::<Lifetime>().unwrap(), Lifetime::Singleton);
        assert_eq!("Transient".parse::<Lifetime>().unwrap(), Lifetime::Transient);
        assert_eq!("scoped".parse::<Lifetime>().unwrap(), Lifetime::Scoped);

        assert!("request".parse::<Lifetime>().unwrap_err().is_configuration());
    }

    #[test]
    fn test_lifetime_display() {
        assert_eq!(format!("{}", Lifetime::Singleton), "singleton");
        assert_eq!(format!("{}", Lifetime::Transient), "transient");
        assert_eq!(format!("{}", Lifetime::Scoped), "scoped");
    }

    #[test]
    fn test_cached_lifetimes() {
        assert!(!Lifetime::Transient.is_cached());
        assert!(Lifetime::Scoped.is_cached());
        assert!(Lifetime::Singleton.is_cached());
    }
}
