use serde::{Deserialize, Serialize};

/// Injection tier for progressive disclosure.
///
/// The hierarchy is fixed: `[mandate, guardrail, reference]`. Mandates are
/// always-inject rules, guardrails are anti-patterns/gotchas, reference is
/// semantically retrieved patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionTier {
    Mandate,
    Guardrail,
    Reference,
}

impl InjectionTier {
    pub fn as_str(self) -> &'static str {
        match self {
            InjectionTier::Mandate => "mandate",
            InjectionTier::Guardrail => "guardrail",
            InjectionTier::Reference => "reference",
        }
    }

    /// The next tier down, or `None` at the bottom.
    pub fn next_lower(self) -> Option<InjectionTier> {
        match self {
            InjectionTier::Mandate => Some(InjectionTier::Guardrail),
            InjectionTier::Guardrail => Some(InjectionTier::Reference),
            InjectionTier::Reference => None,
        }
    }

    /// The next tier up, or `None` at the top.
    pub fn next_higher(self) -> Option<InjectionTier> {
        match self {
            InjectionTier::Mandate => None,
            InjectionTier::Guardrail => Some(InjectionTier::Mandate),
            InjectionTier::Reference => Some(InjectionTier::Guardrail),
        }
    }
}

impl std::str::FromStr for InjectionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mandate" => Ok(InjectionTier::Mandate),
            "guardrail" => Ok(InjectionTier::Guardrail),
            "reference" => Ok(InjectionTier::Reference),
            other => Err(format!("unknown injection tier: {other}")),
        }
    }
}

impl std::fmt::Display for InjectionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_walks_both_ways() {
        assert_eq!(
            InjectionTier::Mandate.next_lower(),
            Some(InjectionTier::Guardrail)
        );
        assert_eq!(
            InjectionTier::Guardrail.next_lower(),
            Some(InjectionTier::Reference)
        );
        assert_eq!(InjectionTier::Reference.next_lower(), None);

        assert_eq!(
            InjectionTier::Reference.next_higher(),
            Some(InjectionTier::Guardrail)
        );
        assert_eq!(InjectionTier::Mandate.next_higher(), None);
    }

    #[test]
    fn serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&InjectionTier::Mandate).unwrap(),
            r#""mandate""#
        );
        let t: InjectionTier = serde_json::from_str(r#""guardrail""#).unwrap();
        assert_eq!(t, InjectionTier::Guardrail);
    }
}
