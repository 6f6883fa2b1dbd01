//! The source-description tag grammar.
//!
//! Episode metadata rides in a single whitespace-delimited string field:
//!
//! ```text
//! <category> <tier> source:<origin> confidence:<0-100>
//!   [type:anti_pattern] [cluster:<id>] [migrated_from:<file>]
//!   [status:provisional|canonical] [promoted:<reason>] [context:<≤100 chars>]
//! ```
//!
//! Tokens without a `:` are the category and tier. This is a concession to
//! a backend without structured metadata; parse once, then work with the
//! typed form.

use ah_domain::tier::InjectionTier;

/// Provisional/canonical learning status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningStatus {
    Provisional,
    Canonical,
}

impl LearningStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LearningStatus::Provisional => "provisional",
            LearningStatus::Canonical => "canonical",
        }
    }
}

/// Parsed form of the tag string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceTags {
    pub category: Option<String>,
    pub tier: Option<InjectionTier>,
    pub origin: Option<String>,
    pub confidence: Option<f64>,
    pub anti_pattern: bool,
    pub cluster_id: Option<String>,
    pub migrated_from: Option<String>,
    pub status: Option<String>,
    pub promoted_reason: Option<String>,
    pub context: Option<String>,
}

impl SourceTags {
    /// Parse a tag string. Unknown tokens are ignored; the first bare token
    /// is the category, a bare tier name sets the tier.
    pub fn parse(raw: &str) -> Self {
        let mut tags = SourceTags::default();

        for token in raw.split_whitespace() {
            match token.split_once(':') {
                Some(("source", v)) => tags.origin = Some(v.to_string()),
                Some(("confidence", v)) => tags.confidence = v.parse().ok(),
                Some(("type", "anti_pattern")) => tags.anti_pattern = true,
                Some(("cluster", v)) => tags.cluster_id = Some(v.to_string()),
                Some(("migrated_from", v)) => tags.migrated_from = Some(v.to_string()),
                Some(("status", v)) => tags.status = Some(v.to_string()),
                Some(("promoted", v)) => tags.promoted_reason = Some(v.to_string()),
                Some(("context", v)) => tags.context = Some(v.to_string()),
                Some(("tier", v)) => tags.tier = v.parse().ok(),
                Some(_) => {}
                None => {
                    if let Ok(tier) = token.parse::<InjectionTier>() {
                        tags.tier = Some(tier);
                    } else if tags.category.is_none() {
                        tags.category = Some(token.to_string());
                    }
                }
            }
        }

        tags
    }

    pub fn is_golden(&self) -> bool {
        self.origin.as_deref() == Some("golden_standard")
    }

    pub fn is_provisional(&self) -> bool {
        self.status.as_deref() == Some("provisional")
    }

    pub fn is_canonical(&self) -> bool {
        self.status.as_deref() == Some("canonical")
    }

    /// Render back to the wire form, fields in grammar order.
    pub fn format(&self) -> String {
        let mut parts: Vec<String> = Vec::new();

        if let Some(ref cat) = self.category {
            parts.push(cat.clone());
        }
        if let Some(tier) = self.tier {
            parts.push(tier.as_str().to_string());
        }
        if let Some(ref origin) = self.origin {
            parts.push(format!("source:{origin}"));
        }
        if let Some(conf) = self.confidence {
            parts.push(format!("confidence:{}", conf.round() as i64));
        }
        if self.anti_pattern {
            parts.push("type:anti_pattern".into());
        }
        if let Some(ref cluster) = self.cluster_id {
            parts.push(format!("cluster:{cluster}"));
        }
        if let Some(ref file) = self.migrated_from {
            parts.push(format!("migrated_from:{file}"));
        }
        if let Some(ref status) = self.status {
            parts.push(format!("status:{status}"));
        }
        if let Some(ref reason) = self.promoted_reason {
            parts.push(format!("promoted:{reason}"));
        }
        if let Some(ref ctx) = self.context {
            let mut ctx = ctx.clone();
            ctx.truncate(100);
            parts.push(format!("context:{ctx}"));
        }

        parts.join(" ")
    }
}

/// Rewrite the confidence tag in place. Targeted edit, not a parse/format
/// round-trip: tokens this module does not model survive untouched.
pub fn replace_confidence(raw: &str, new_confidence: f64) -> String {
    let re = regex::Regex::new(r"confidence:\d+(?:\.\d+)?").expect("static regex");
    let replacement = format!("confidence:{}", new_confidence.round() as i64);
    if re.is_match(raw) {
        re.replace(raw, replacement.as_str()).into_owned()
    } else {
        format!("{} {replacement}", raw.trim_end())
    }
}

/// Flip `status:provisional` to `status:canonical`, appending a promotion
/// reason when given. A string without a status gets one appended; other
/// tokens survive untouched.
pub fn promote_status(raw: &str, reason: Option<&str>) -> String {
    let mut out = if raw.contains("status:provisional") {
        raw.replace("status:provisional", "status:canonical")
    } else if raw.contains("status:canonical") {
        raw.to_string()
    } else {
        format!("{} status:canonical", raw.trim_end())
    };
    if let Some(reason) = reason {
        out.push_str(&format!(" promoted:{reason}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_grammar() {
        let raw = "coding_standard mandate source:golden_standard confidence:100 \
                   type:anti_pattern cluster:git_flow migrated_from:dev-standards.md \
                   status:provisional";
        let tags = SourceTags::parse(raw);
        assert_eq!(tags.category.as_deref(), Some("coding_standard"));
        assert_eq!(tags.tier, Some(InjectionTier::Mandate));
        assert_eq!(tags.origin.as_deref(), Some("golden_standard"));
        assert_eq!(tags.confidence, Some(100.0));
        assert!(tags.anti_pattern);
        assert_eq!(tags.cluster_id.as_deref(), Some("git_flow"));
        assert_eq!(tags.migrated_from.as_deref(), Some("dev-standards.md"));
        assert!(tags.is_provisional());
        assert!(tags.is_golden());
    }

    #[test]
    fn roundtrip_preserves_fields() {
        let raw = "troubleshooting_guide guardrail source:learning confidence:85 status:provisional";
        let tags = SourceTags::parse(raw);
        assert_eq!(SourceTags::parse(&tags.format()), tags);
    }

    #[test]
    fn promote_status_flips_and_appends_reason() {
        let raw = "domain_knowledge reference source:learning confidence:90 status:provisional";
        let promoted = promote_status(raw, Some("manual_review"));
        let tags = SourceTags::parse(&promoted);
        assert!(tags.is_canonical());
        assert_eq!(tags.promoted_reason.as_deref(), Some("manual_review"));
    }

    #[test]
    fn promote_status_without_existing_status() {
        let promoted = promote_status("reference confidence:75", None);
        assert!(SourceTags::parse(&promoted).is_canonical());
    }

    #[test]
    fn replace_confidence_keeps_rest() {
        let raw = "domain_knowledge verified source:learning confidence:70 status:provisional";
        let updated = replace_confidence(raw, 85.4);
        let tags = SourceTags::parse(&updated);
        assert_eq!(tags.confidence, Some(85.0));
        assert!(tags.is_provisional());
        // Tokens outside the modeled grammar survive the edit.
        assert!(updated.contains("verified"));
    }

    #[test]
    fn replace_confidence_appends_when_absent() {
        let updated = replace_confidence("domain_knowledge reference", 80.0);
        assert!(updated.ends_with("confidence:80"));
    }

    #[test]
    fn context_tag_truncated_to_100_chars() {
        let mut tags = SourceTags::default();
        tags.context = Some("x".repeat(200));
        let rendered = tags.format();
        let parsed = SourceTags::parse(&rendered);
        assert_eq!(parsed.context.unwrap().len(), 100);
    }
}
