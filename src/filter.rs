//! Filter and gating rules: version requirements, tag/schema matching, and
//! the SQL-safety check applied before a metric or query is sent to a
//! tenant (spec.md §4.C).

use std::cmp::Ordering;

/// Comparison operator parsed out of one whitespace-separated clause of a
/// version filter expression (e.g. `>=2.00.040 <3.00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionOp {
    Ge,
    Le,
    Gt,
    Lt,
    Eq,
}

fn parse_clause(raw: &str) -> Option<(VersionOp, &str)> {
    if let Some(rest) = raw.strip_prefix(">=") {
        Some((VersionOp::Ge, rest.trim()))
    } else if let Some(rest) = raw.strip_prefix("<=") {
        Some((VersionOp::Le, rest.trim()))
    } else if let Some(rest) = raw.strip_prefix('>') {
        Some((VersionOp::Gt, rest.trim()))
    } else if let Some(rest) = raw.strip_prefix('<') {
        Some((VersionOp::Lt, rest.trim()))
    } else if let Some(rest) = raw.strip_prefix('=') {
        Some((VersionOp::Eq, rest.trim()))
    } else {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some((VersionOp::Eq, trimmed))
        }
    }
}

/// Compares two dotted-numeric version strings component by component,
/// treating a missing trailing component as `0`. Used only when
/// `component_aware` is set; non-numeric components fall back to string
/// comparison for that component.
fn compare_components(a: &str, b: &str) -> Ordering {
    let mut a_parts = a.split('.');
    let mut b_parts = b.split('.');
    loop {
        match (a_parts.next(), b_parts.next()) {
            (None, None) => return Ordering::Equal,
            (a_part, b_part) => {
                let a_val = a_part.unwrap_or("0");
                let b_val = b_part.unwrap_or("0");
                let ordering = match (a_val.parse::<u64>(), b_val.parse::<u64>()) {
                    (Ok(a_num), Ok(b_num)) => a_num.cmp(&b_num),
                    _ => a_val.cmp(b_val),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
        }
    }
}

/// Checks a HANA version string against a requirement expression made of
/// one or more whitespace-separated clauses, all of which must hold.
///
/// Preserves the documented default behavior: plain lexicographic string
/// comparison, not numeric component comparison, so `"2.9" < "2.10"` is
/// false under the default. Pass `component_aware = true` (wired to the
/// `component_aware_versions` config flag) to compare dotted components
/// numerically instead.
pub fn check_version_requirement(version: &str, requirement: &str, component_aware: bool) -> bool {
    let requirement = requirement.trim();
    if requirement.is_empty() {
        return true;
    }
    for clause in requirement.split_whitespace() {
        let Some((op, req_version)) = parse_clause(clause) else {
            continue;
        };
        let ordering = if component_aware {
            compare_components(version, req_version)
        } else {
            version.cmp(req_version)
        };
        let satisfied = match op {
            VersionOp::Ge => ordering != Ordering::Less,
            VersionOp::Le => ordering != Ordering::Greater,
            VersionOp::Gt => ordering == Ordering::Greater,
            VersionOp::Lt => ordering == Ordering::Less,
            VersionOp::Eq => ordering == Ordering::Equal,
        };
        if !satisfied {
            return false;
        }
    }
    true
}

/// True if `slice` contains `value`, case-insensitively.
pub fn contains_string(value: &str, slice: &[String]) -> bool {
    slice.iter().any(|s| s.eq_ignore_ascii_case(value))
}

/// True if every item of `sub_slice` exists in `slice` (case-insensitive),
/// or `sub_slice` is empty. Used to gate a metric's tag filter against a
/// tenant's configured tags.
pub fn sub_slice_in_slice(sub_slice: &[String], slice: &[String]) -> bool {
    sub_slice.iter().all(|v| contains_string(v, slice))
}

/// Returns the schemas from `schema_filter` that also appear (case
/// insensitively) in the tenant's `tenant_schemas`, preserving
/// `schema_filter`'s order.
pub fn matched_schemas(schema_filter: &[String], tenant_schemas: &[String]) -> Vec<String> {
    schema_filter
        .iter()
        .filter(|schema| contains_string(schema, tenant_schemas))
        .cloned()
        .collect()
}

/// Rejects anything but a `SELECT` statement, matching the original's
/// blunt prefix check. Whitespace is trimmed first; the check is
/// case-insensitive on the leading keyword only, so this is a guard
/// against obviously wrong configuration, not a SQL parser.
pub fn validate_select_only(sql: &str) -> bool {
    let trimmed = sql.trim_start();
    trimmed.len() >= 6 && trimmed[..6].eq_ignore_ascii_case("select")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_requirement_always_passes() {
        assert!(check_version_requirement("2.00.040", "", false));
    }

    #[test]
    fn lexicographic_default_can_misorder_numerically_equal_lengths() {
        assert!(check_version_requirement("2.00.050", ">=2.00.040", false));
        assert!(!check_version_requirement("2.00.030", ">=2.00.040", false));
    }

    #[test]
    fn lexicographic_default_documented_quirk() {
        // Preserved as-is: lexicographic comparison of differing-length
        // numeric strings does not match numeric ordering.
        assert!(!check_version_requirement("2.9", ">=2.10", false));
    }

    #[test]
    fn component_aware_fixes_the_quirk() {
        assert!(check_version_requirement("2.10", ">=2.9", true));
    }

    #[test]
    fn multiple_clauses_are_all_required() {
        assert!(check_version_requirement("2.00.050", ">=2.00.040 <=2.00.060", false));
        assert!(!check_version_requirement("2.00.070", ">=2.00.040 <=2.00.060", false));
    }

    #[test]
    fn sub_slice_in_slice_empty_sublice_passes() {
        assert!(sub_slice_in_slice(&[], &v(&["prod"])));
    }

    #[test]
    fn sub_slice_in_slice_requires_every_item() {
        assert!(sub_slice_in_slice(&v(&["prod", "eu"]), &v(&["PROD", "eu", "extra"])));
        assert!(!sub_slice_in_slice(&v(&["prod", "us"]), &v(&["prod", "eu"])));
    }

    #[test]
    fn matched_schemas_preserves_filter_order() {
        let filter = v(&["sys", "app1"]);
        let tenant = v(&["APP1", "SYS", "other"]);
        assert_eq!(matched_schemas(&filter, &tenant), v(&["sys", "app1"]));
    }

    #[test]
    fn validate_select_only_rejects_non_select() {
        assert!(validate_select_only("  select * from dummy"));
        assert!(!validate_select_only("delete from t"));
        assert!(!validate_select_only("sel"));
    }
}
