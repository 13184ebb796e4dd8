//! `SecurityAnalyzer`: classifies proposed actions as LOW/MEDIUM/HIGH/
//! UNKNOWN risk. The one concrete variant shipped here delegates the
//! judgment to the LLM itself — it doesn't compute a risk, it demands
//! the model supply one per call.

pub use crate::event::SecurityRisk;

pub trait SecurityAnalyzer: Send + Sync {
    /// Does this analyzer require the LLM to self-label
    /// `security_risk` on every non-read-only tool call? The one
    /// shipped analyzer answers `true`; a hypothetical static-analysis
    /// variant could answer `false` and compute risk independently.
    fn requires_risk_prediction(&self) -> bool;
}

/// Delegates the risk judgment to the LLM via a required
/// `security_risk` tool-call argument. A weak guarantee — the model
/// can mislabel — but keeping the schema field present regardless of
/// whether this analyzer is configured avoids schema churn if a
/// stronger analyzer is swapped in later.
#[derive(Debug, Default, Clone, Copy)]
pub struct LlmSecurityAnalyzer;

impl SecurityAnalyzer for LlmSecurityAnalyzer {
    fn requires_risk_prediction(&self) -> bool {
        true
    }
}

/// Extracts and validates the `security_risk` field from a tool call's
/// raw arguments, mutating `arguments` to remove it so it never leaks
/// into the action payload passed to the tool executor.
///
/// Mirrors the exact precedence: a read-only tool always gets
/// `Unknown` regardless of analyzer; otherwise, if the configured
/// analyzer requires the field and it's absent, that's an error; if no
/// analyzer requires it and it's absent, `Unknown` is returned
/// silently; otherwise the supplied value is parsed.
pub fn extract_security_risk(
    tool_name: &str,
    read_only: bool,
    analyzer: Option<&dyn SecurityAnalyzer>,
    arguments: &mut serde_json::Map<String, serde_json::Value>,
) -> Result<SecurityRisk, String> {
    let raw = arguments.remove("security_risk");

    if read_only {
        return Ok(SecurityRisk::Unknown);
    }

    let requires_sr = analyzer.map(|a| a.requires_risk_prediction()).unwrap_or(false);

    match raw {
        None if requires_sr => {
            Err(format!("Failed to provide security_risk field in tool '{tool_name}'"))
        }
        None => Ok(SecurityRisk::Unknown),
        Some(value) => parse_security_risk(&value)
            .ok_or_else(|| format!("invalid security_risk value for tool '{tool_name}': {value}")),
    }
}

fn parse_security_risk(value: &serde_json::Value) -> Option<SecurityRisk> {
    let s = value.as_str()?;
    match s.to_uppercase().as_str() {
        "LOW" => Some(SecurityRisk::Low),
        "MEDIUM" => Some(SecurityRisk::Medium),
        "HIGH" => Some(SecurityRisk::High),
        "UNKNOWN" => Some(SecurityRisk::Unknown),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_tool_is_always_unknown() {
        let mut args = serde_json::Map::new();
        args.insert("security_risk".into(), serde_json::json!("HIGH"));
        let risk = extract_security_risk("read_file", true, Some(&LlmSecurityAnalyzer), &mut args).unwrap();
        assert_eq!(risk, SecurityRisk::Unknown);
        assert!(!args.contains_key("security_risk"));
    }

    #[test]
    fn missing_field_errors_when_analyzer_requires_it() {
        let mut args = serde_json::Map::new();
        let err = extract_security_risk("exec", false, Some(&LlmSecurityAnalyzer), &mut args).unwrap_err();
        assert!(err.contains("Failed to provide security_risk"));
    }

    #[test]
    fn missing_field_is_unknown_without_analyzer() {
        let mut args = serde_json::Map::new();
        let risk = extract_security_risk("exec", false, None, &mut args).unwrap();
        assert_eq!(risk, SecurityRisk::Unknown);
    }

    #[test]
    fn valid_value_is_parsed_and_removed() {
        let mut args = serde_json::Map::new();
        args.insert("security_risk".into(), serde_json::json!("MEDIUM"));
        let risk = extract_security_risk("exec", false, Some(&LlmSecurityAnalyzer), &mut args).unwrap();
        assert_eq!(risk, SecurityRisk::Medium);
        assert!(!args.contains_key("security_risk"));
    }
}
