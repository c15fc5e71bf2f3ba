//! Value canonicalization for extracted fields.
//!
//! Model output is never trusted verbatim: every extracted value passes
//! through one of these functions before it lands in a row.

use crate::models::NOT_FOUND;

const TRUE_TOKENS: &[&str] = &["true", "yes", "y", "1", "checked"];
const FALSE_TOKENS: &[&str] = &["false", "no", "n", "0", "unchecked"];

const PF_TOKENS: &[&str] = &["pf", "pilot flying", "pilot-flying", "p/f"];
const PM_TOKENS: &[&str] = &["pm", "pilot monitoring", "pilot-monitoring", "p/m"];
const BOTH_TOKENS: &[&str] = &["pf/pm", "pm/pf", "both"];

/// Longest free-text role still considered for the substring heuristic.
const MAX_ROLE_CHARS: usize = 40;

/// Trim a value; absent or blank becomes `"not found"`.
pub fn normalize_missing(value: Option<&str>) -> String {
    match value.map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => NOT_FOUND.to_string(),
    }
}

/// Map boolean-like text to `"true"`, `"false"` or `"not found"`.
pub fn normalize_boolish(value: Option<&str>) -> String {
    let s = normalize_missing(value).to_lowercase();
    if TRUE_TOKENS.contains(&s.as_str()) {
        "true".to_string()
    } else if FALSE_TOKENS.contains(&s.as_str()) {
        "false".to_string()
    } else {
        NOT_FOUND.to_string()
    }
}

/// Map crew-role text to `"PF"`, `"PM"`, `"PF/PM"` or `"not found"`.
pub fn normalize_role(value: Option<&str>) -> String {
    let s = normalize_missing(value).to_lowercase();
    let s = s.as_str();

    if PF_TOKENS.contains(&s) {
        return "PF".to_string();
    }
    if PM_TOKENS.contains(&s) {
        return "PM".to_string();
    }
    if BOTH_TOKENS.contains(&s) {
        return "PF/PM".to_string();
    }
    if s == NOT_FOUND || s.chars().count() > MAX_ROLE_CHARS {
        return NOT_FOUND.to_string();
    }
    if s.contains("flying") {
        return "PF".to_string();
    }
    if s.contains("monitor") {
        return "PM".to_string();
    }
    NOT_FOUND.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing() {
        assert_eq!(normalize_missing(None), "not found");
        assert_eq!(normalize_missing(Some("   ")), "not found");
        assert_eq!(normalize_missing(Some("  B737 ")), "B737");
    }

    #[test]
    fn test_boolish_tokens() {
        for t in ["TRUE", "Yes", "y", "1", "Checked", " yes "] {
            assert_eq!(normalize_boolish(Some(t)), "true", "{}", t);
        }
        for t in ["false", "NO", "n", "0", "unchecked"] {
            assert_eq!(normalize_boolish(Some(t)), "false", "{}", t);
        }
        for t in ["N/A", "maybe", "not found", ""] {
            assert_eq!(normalize_boolish(Some(t)), "not found", "{}", t);
        }
        assert_eq!(normalize_boolish(None), "not found");
    }

    #[test]
    fn test_boolish_idempotent() {
        for t in ["yes", "no", "garbage", "", "TRUE", "not found", "0", "Unchecked"] {
            let once = normalize_boolish(Some(t));
            assert_eq!(normalize_boolish(Some(&once)), once, "{}", t);
        }
    }

    #[test]
    fn test_role_variants() {
        assert_eq!(normalize_role(Some("Pilot Flying")), "PF");
        assert_eq!(normalize_role(Some("p/f")), "PF");
        assert_eq!(normalize_role(Some("PILOT-MONITORING")), "PM");
        assert_eq!(normalize_role(Some("pm/pf")), "PF/PM");
        assert_eq!(normalize_role(Some("Both")), "PF/PM");
    }

    #[test]
    fn test_role_not_found() {
        assert_eq!(normalize_role(Some("N/A")), "not found");
        assert_eq!(normalize_role(Some("")), "not found");
        assert_eq!(normalize_role(None), "not found");
        assert_eq!(normalize_role(Some("Captain")), "not found");
    }

    #[test]
    fn test_role_heuristics() {
        assert_eq!(normalize_role(Some("Captain (flying)")), "PF");
        assert_eq!(normalize_role(Some("monitoring pilot")), "PM");
        let long = format!("{} flying", "x".repeat(40));
        assert_eq!(normalize_role(Some(&long)), "not found");
    }
}
