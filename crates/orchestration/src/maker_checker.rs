//! Maker-checker verification.
//!
//! A maker subagent generates output; a checker subagent reviews it against
//! a structured decision format. Rejection feeds the issues and suggestions
//! back into a revision task, up to the iteration cap. The checker always
//! gets a fresh context.

use std::sync::Arc;

use serde::Serialize;

use crate::subagent::{SubagentConfig, SubagentManager, SubagentResult, SubagentStatus};

pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

const DEFAULT_CHECKER_PROMPT: &str = "\
You are a verification agent. Review the output provided by another agent,
identify problems, and decide whether it is acceptable.

Format your response as:
DECISION: [APPROVED or NEEDS_REVISION]
CONFIDENCE: [0.0-1.0]
ISSUES:
- [issue 1]
SUGGESTIONS:
- [suggestion 1]

Be thorough but fair. Only reject if there are genuine problems.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parsed checker decision
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckerDecision {
    pub approved: bool,
    pub confidence: f64,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Parse the structured decision out of checker output. Lines outside the
/// expected sections are ignored; a missing DECISION means not approved.
pub fn parse_checker_response(content: &str) -> CheckerDecision {
    let mut decision = CheckerDecision {
        confidence: 0.5,
        ..Default::default()
    };
    let mut section: Option<&str> = None;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix("DECISION:") {
            decision.approved = rest.trim().eq_ignore_ascii_case("APPROVED");
            section = None;
        } else if let Some(rest) = line.strip_prefix("CONFIDENCE:") {
            if let Ok(conf) = rest.trim().parse::<f64>() {
                decision.confidence = conf.clamp(0.0, 1.0);
            }
            section = None;
        } else if line.starts_with("ISSUES:") {
            section = Some("issues");
        } else if line.starts_with("SUGGESTIONS:") {
            section = Some("suggestions");
        } else if let Some(item) = line.strip_prefix("- ") {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            match section {
                Some("issues") => decision.issues.push(item.to_string()),
                Some("suggestions") => decision.suggestions.push(item.to_string()),
                _ => {}
            }
        }
    }

    decision
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Verification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub maker_result: SubagentResult,
    pub checker_result: Option<SubagentResult>,
    pub approved: bool,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub confidence: f64,
    pub final_output: String,
    pub iterations: u32,
}

pub struct MakerChecker {
    manager: Arc<SubagentManager>,
    maker_config: SubagentConfig,
    checker_config: SubagentConfig,
    max_iterations: u32,
}

impl MakerChecker {
    pub fn new(
        manager: Arc<SubagentManager>,
        maker_config: SubagentConfig,
        mut checker_config: SubagentConfig,
        max_iterations: u32,
    ) -> Self {
        if checker_config.system_prompt.is_none() {
            checker_config.system_prompt = Some(DEFAULT_CHECKER_PROMPT.to_string());
        }
        Self {
            manager,
            maker_config,
            checker_config,
            max_iterations: max_iterations.max(1),
        }
    }

    /// Cross-provider code review preset: maker and checker on different
    /// providers for diverse perspectives.
    pub fn code_review(manager: Arc<SubagentManager>) -> Self {
        let maker = SubagentConfig {
            name: "code_generator".into(),
            provider: "claude".into(),
            system_prompt: Some(
                "You are an expert programmer. Generate clean, well-documented code \
                 with error handling where appropriate."
                    .into(),
            ),
            max_tokens: 4096,
            ..Default::default()
        };
        let checker = SubagentConfig {
            name: "code_reviewer".into(),
            provider: "gemini".into(),
            system_prompt: Some(format!(
                "You are a senior code reviewer. Review for correctness, security, \
                 performance, and readability.\n\n{DEFAULT_CHECKER_PROMPT}"
            )),
            max_tokens: 2048,
            ..Default::default()
        };
        Self::new(manager, maker, checker, 2)
    }

    /// Run the maker-checker loop.
    ///
    /// Terminates on approval or after `max_iterations` maker+checker
    /// pairs; a never-approving checker yields `approved = false` with the
    /// last maker output as `final_output`.
    pub async fn verify(&self, task: &str) -> VerificationResult {
        let mut iterations = 0u32;
        let mut current_task = task.to_string();
        let mut maker_result: Option<SubagentResult> = None;
        let mut checker_result: Option<SubagentResult> = None;
        let mut decision = CheckerDecision::default();

        while iterations < self.max_iterations {
            iterations += 1;

            let maker = self
                .manager
                .spawn(&current_task, &self.maker_config, None, None, None)
                .await;
            if maker.status != SubagentStatus::Completed {
                tracing::warn!(status = ?maker.status, "maker failed");
                maker_result = Some(maker);
                break;
            }

            let checker_task = format!(
                "Review the following output from another agent:\n\n\
                 TASK: {task}\n\n\
                 OUTPUT:\n{output}\n\n\
                 Verify the output is correct, complete, and addresses the task.",
                output = maker.content,
            );
            maker_result = Some(maker);

            let checker = self
                .manager
                .spawn(&checker_task, &self.checker_config, None, None, None)
                .await;
            if checker.status != SubagentStatus::Completed {
                tracing::warn!(status = ?checker.status, "checker failed");
                checker_result = Some(checker);
                break;
            }

            decision = parse_checker_response(&checker.content);
            checker_result = Some(checker);

            if decision.approved {
                tracing::info!(iterations, "maker output approved");
                break;
            }

            if iterations < self.max_iterations {
                current_task = format!(
                    "Your previous attempt was not approved.\n\n\
                     ORIGINAL TASK: {task}\n\n\
                     YOUR PREVIOUS OUTPUT:\n{output}\n\n\
                     ISSUES IDENTIFIED:\n{issues}\n\n\
                     SUGGESTIONS:\n{suggestions}\n\n\
                     Revise your output addressing the issues above.",
                    output = maker_result.as_ref().map(|m| m.content.as_str()).unwrap_or(""),
                    issues = decision.issues.join("\n"),
                    suggestions = decision.suggestions.join("\n"),
                );
                tracing::info!(iteration = iterations, "maker revising after feedback");
            }
        }

        let maker_result = maker_result.unwrap_or_else(|| {
            // max_iterations >= 1 guarantees at least one spawn; this arm
            // only serves the type system.
            unreachable!("maker ran at least once")
        });

        VerificationResult {
            final_output: maker_result.content.clone(),
            maker_result,
            checker_result,
            approved: decision.approved,
            issues: decision.issues,
            suggestions: decision.suggestions,
            confidence: decision.confidence,
            iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_approved_decision() {
        let decision = parse_checker_response(
            "DECISION: APPROVED\nCONFIDENCE: 0.9\nISSUES:\nSUGGESTIONS:\n- consider caching",
        );
        assert!(decision.approved);
        assert_eq!(decision.confidence, 0.9);
        assert!(decision.issues.is_empty());
        assert_eq!(decision.suggestions, vec!["consider caching"]);
    }

    #[test]
    fn parses_rejection_with_issues() {
        let decision = parse_checker_response(
            "Some preamble.\n\
             DECISION: NEEDS_REVISION\n\
             CONFIDENCE: 0.75\n\
             ISSUES:\n- off-by-one in loop\n- missing error case\n\
             SUGGESTIONS:\n- add bounds test",
        );
        assert!(!decision.approved);
        assert_eq!(decision.issues.len(), 2);
        assert_eq!(decision.suggestions.len(), 1);
    }

    #[test]
    fn missing_decision_is_not_approved() {
        let decision = parse_checker_response("Looks fine to me!");
        assert!(!decision.approved);
        assert_eq!(decision.confidence, 0.5);
    }

    #[test]
    fn out_of_range_confidence_clamped() {
        let decision = parse_checker_response("DECISION: APPROVED\nCONFIDENCE: 7.5");
        assert_eq!(decision.confidence, 1.0);
    }

    #[test]
    fn bullet_lines_outside_sections_ignored() {
        let decision = parse_checker_response(
            "- stray bullet\nDECISION: APPROVED\nISSUES:\n- real issue",
        );
        assert_eq!(decision.issues, vec!["real issue"]);
    }
}
