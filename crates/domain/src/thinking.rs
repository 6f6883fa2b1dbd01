use serde::{Deserialize, Serialize};

/// Semantic extended-thinking level.
///
/// Providers map a level to their own token budget; `Minimal` disables
/// extended thinking entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Minimal,
    Low,
    Medium,
    High,
    Ultrathink,
}

impl ThinkingLevel {
    /// Claude thinking-token budget for this level. `None` disables thinking.
    pub fn claude_budget_tokens(self) -> Option<u32> {
        match self {
            ThinkingLevel::Minimal => None,
            ThinkingLevel::Low => Some(1_024),
            ThinkingLevel::Medium => Some(4_096),
            ThinkingLevel::High => Some(16_384),
            ThinkingLevel::Ultrathink => Some(65_536),
        }
    }
}

impl std::str::FromStr for ThinkingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" => Ok(ThinkingLevel::Minimal),
            "low" => Ok(ThinkingLevel::Low),
            "medium" => Ok(ThinkingLevel::Medium),
            "high" => Ok(ThinkingLevel::High),
            "ultrathink" => Ok(ThinkingLevel::Ultrathink),
            other => Err(format!("unknown thinking level: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_disables_thinking() {
        assert_eq!(ThinkingLevel::Minimal.claude_budget_tokens(), None);
    }

    #[test]
    fn budgets_increase_with_level() {
        let low = ThinkingLevel::Low.claude_budget_tokens().unwrap();
        let high = ThinkingLevel::High.claude_budget_tokens().unwrap();
        let ultra = ThinkingLevel::Ultrathink.claude_budget_tokens().unwrap();
        assert!(low < high && high < ultra);
    }

    #[test]
    fn parses_from_str() {
        assert_eq!(
            "ultrathink".parse::<ThinkingLevel>().unwrap(),
            ThinkingLevel::Ultrathink
        );
        assert!("extreme".parse::<ThinkingLevel>().is_err());
    }
}
