use rusqlite::{params_from_iter, types::Value, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Fixed cohort weights: student/peer ratings carry 60% of the combined
/// score, the evaluator-of-record (chair/supervisor) the remaining 40%.
pub const PEER_WEIGHT: f64 = 0.6;
pub const HIERARCHY_WEIGHT: f64 = 0.4;

/// Ratings are submitted on a 1-5 scale; scaled scores are percentages.
pub const MAX_POINTS: f64 = 5.0;

pub const SCHOOL_YEARS: [&str; 6] = [
    "2022-2023",
    "2023-2024",
    "2024-2025",
    "2025-2026",
    "2026-2027",
    "2027-2028",
];
pub const SEMESTERS: [&str; 2] = ["1st Semester", "2nd Semester"];
pub const DEPARTMENTS: [&str; 3] = ["CCIT", "CTE", "CBAPA"];

/// The two record families. Both tables share one column shape, so family
/// selection is just a table name plus a weight; there is deliberately no
/// per-role duplication of the query or tabulation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Peer,
    Hierarchy,
}

impl Family {
    pub fn parse(s: &str) -> Option<Family> {
        match s {
            "peer" => Some(Family::Peer),
            "hierarchy" => Some(Family::Hierarchy),
            _ => None,
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Family::Peer => "peer_evaluations",
            Family::Hierarchy => "hierarchy_evaluations",
        }
    }

    pub fn weight(self) -> f64 {
        match self {
            Family::Peer => PEER_WEIGHT,
            Family::Hierarchy => HIERARCHY_WEIGHT,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Family::Peer => "peer",
            Family::Hierarchy => "hierarchy",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TabError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl TabError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }
}

/// Filter over a target's evaluation records. Omitting an optional field
/// widens the match to all values of that field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultFilters {
    pub school_year: Option<String>,
    pub department: Option<String>,
    pub semester: Option<String>,
    pub subject_title: Option<String>,
}

fn optional_enum(
    obj: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    allowed: &[&str],
) -> Result<Option<String>, TabError> {
    match obj.get(key) {
        None => Ok(None),
        Some(v) if v.is_null() => Ok(None),
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(TabError::new(
                    "bad_params",
                    format!("filters.{} must be string or null", key),
                ));
            };
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("ALL") {
                return Ok(None);
            }
            if !allowed.contains(&t) {
                return Err(TabError::new(
                    "bad_params",
                    format!("filters.{}: unknown value '{}'", key, t),
                ));
            }
            Ok(Some(t.to_string()))
        }
    }
}

pub fn parse_result_filters(raw: Option<&serde_json::Value>) -> Result<ResultFilters, TabError> {
    let Some(raw) = raw else {
        return Ok(ResultFilters::default());
    };
    let Some(obj) = raw.as_object() else {
        return Err(TabError::new("bad_params", "filters must be an object"));
    };

    let school_year = optional_enum(obj, "schoolYear", &SCHOOL_YEARS)?;
    let department = optional_enum(obj, "department", &DEPARTMENTS)?;
    let semester = optional_enum(obj, "semester", &SEMESTERS)?;

    let subject_title = match obj.get("subjectTitle") {
        None => None,
        Some(v) if v.is_null() => None,
        Some(v) => {
            let Some(s) = v.as_str() else {
                return Err(TabError::new(
                    "bad_params",
                    "filters.subjectTitle must be string or null",
                ));
            };
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("ALL") {
                None
            } else {
                Some(t.to_string())
            }
        }
    };

    Ok(ResultFilters {
        school_year,
        department,
        semester,
        subject_title,
    })
}

/// One target's view of the store: both family tables are queried with the
/// same (target_id, target_role) key and identical filters.
#[derive(Debug, Clone)]
pub struct QueryContext<'a> {
    pub conn: &'a Connection,
    pub target_id: &'a str,
    pub target_role: &'a str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRow {
    pub id: String,
    pub evaluator_name: String,
    pub department: String,
    pub school_year: String,
    pub semester: String,
    pub subject_title: String,
    pub points: f64,
    pub created_at: String,
}

fn filter_clauses(filters: &ResultFilters, where_sql: &mut String, binds: &mut Vec<Value>) {
    let pairs = [
        ("school_year", &filters.school_year),
        ("department", &filters.department),
        ("semester", &filters.semester),
        ("subject_title", &filters.subject_title),
    ];
    for (column, value) in pairs {
        if let Some(v) = value {
            where_sql.push_str(&format!(" AND {} = ?", column));
            binds.push(Value::Text(v.clone()));
        }
    }
}

/// Fetches all matching records from one family, newest first. An empty
/// match is an empty list, never an error.
pub fn fetch_family(
    ctx: &QueryContext<'_>,
    family: Family,
    filters: &ResultFilters,
) -> Result<Vec<EvaluationRow>, TabError> {
    let mut where_sql = String::from("WHERE target_id = ? AND target_role = ?");
    let mut binds: Vec<Value> = vec![
        Value::Text(ctx.target_id.to_string()),
        Value::Text(ctx.target_role.to_string()),
    ];
    filter_clauses(filters, &mut where_sql, &mut binds);

    let sql = format!(
        "SELECT id, evaluator_name, department, school_year, semester, subject_title, points, created_at
         FROM {} {}
         ORDER BY created_at DESC, id",
        family.table(),
        where_sql
    );
    let mut stmt = ctx
        .conn
        .prepare(&sql)
        .map_err(|e| TabError::new("db_query_failed", e.to_string()))?;
    stmt.query_map(params_from_iter(binds), |r| {
        Ok(EvaluationRow {
            id: r.get(0)?,
            evaluator_name: r.get(1)?,
            department: r.get(2)?,
            school_year: r.get(3)?,
            semester: r.get(4)?,
            subject_title: r.get(5)?,
            points: r.get(6)?,
            created_at: r.get(7)?,
        })
    })
    .and_then(|it| it.collect::<Result<Vec<_>, _>>())
    .map_err(|e| TabError::new("db_query_failed", e.to_string()))
}

/// Both families for one target under one filter. The two reads are
/// independent; neither result feeds the other.
pub fn fetch_combined(
    ctx: &QueryContext<'_>,
    filters: &ResultFilters,
) -> Result<(Vec<EvaluationRow>, Vec<EvaluationRow>), TabError> {
    let peer = fetch_family(ctx, Family::Peer, filters)?;
    let hierarchy = fetch_family(ctx, Family::Hierarchy, filters)?;
    Ok((peer, hierarchy))
}

pub fn facet_column(field: &str) -> Option<&'static str> {
    match field {
        "schoolYear" => Some("school_year"),
        "department" => Some("department"),
        "semester" => Some("semester"),
        "subjectTitle" => Some("subject_title"),
        _ => None,
    }
}

/// Distinct values of one column across both families, deduplicated as a
/// set and returned sorted. If one family has no matches the union degrades
/// to the other family's values; if both are empty, so is the result.
pub fn distinct_union(
    ctx: &QueryContext<'_>,
    column: &str,
    filters: &ResultFilters,
) -> Result<Vec<String>, TabError> {
    let mut values: BTreeSet<String> = BTreeSet::new();
    for family in [Family::Peer, Family::Hierarchy] {
        let mut where_sql = String::from("WHERE target_id = ? AND target_role = ?");
        let mut binds: Vec<Value> = vec![
            Value::Text(ctx.target_id.to_string()),
            Value::Text(ctx.target_role.to_string()),
        ];
        filter_clauses(filters, &mut where_sql, &mut binds);

        let sql = format!(
            "SELECT DISTINCT {} FROM {} {}",
            column,
            family.table(),
            where_sql
        );
        let mut stmt = ctx
            .conn
            .prepare(&sql)
            .map_err(|e| TabError::new("db_query_failed", e.to_string()))?;
        let rows = stmt
            .query_map(params_from_iter(binds), |r| r.get::<_, String>(0))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(|e| TabError::new("db_query_failed", e.to_string()))?;
        values.extend(rows);
    }
    Ok(values.into_iter().collect())
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolYearFacet {
    pub school_year: String,
    pub subject_count: usize,
}

/// School years with evaluations for a target, each with the count of
/// distinct subjects seen across both families, newest year first.
pub fn school_year_facets(ctx: &QueryContext<'_>) -> Result<Vec<SchoolYearFacet>, TabError> {
    let years = distinct_union(ctx, "school_year", &ResultFilters::default())?;
    let mut out: Vec<SchoolYearFacet> = Vec::with_capacity(years.len());
    for year in years {
        let filters = ResultFilters {
            school_year: Some(year.clone()),
            ..ResultFilters::default()
        };
        let subjects = distinct_union(ctx, "subject_title", &filters)?;
        out.push(SchoolYearFacet {
            school_year: year,
            subject_count: subjects.len(),
        });
    }
    out.sort_by(|a, b| b.school_year.cmp(&a.school_year));
    Ok(out)
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CohortScore {
    pub raw_average: f64,
    pub scaled_score: f64,
    pub weighted_raw_average: f64,
    pub weighted_scaled_score: f64,
    pub count: usize,
}

/// Average one cohort's points and apply its weight. An empty cohort
/// contributes zero; the division is guarded, never NaN.
pub fn cohort_score(points: &[f64], weight: f64) -> CohortScore {
    let count = points.len();
    let raw_average = if count > 0 {
        points.iter().sum::<f64>() / (count as f64)
    } else {
        0.0
    };
    let scaled_score = raw_average * 100.0 / MAX_POINTS;
    CohortScore {
        raw_average,
        scaled_score,
        weighted_raw_average: raw_average * weight,
        weighted_scaled_score: scaled_score * weight,
        count,
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CombinedScore {
    pub total_score: f64,
    pub total_rating: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SemesterTabulation {
    pub semester: String,
    pub peer: CohortScore,
    pub hierarchy: CohortScore,
    pub total: CombinedScore,
}

fn semester_sort_key(semester: &str) -> (usize, String) {
    let idx = SEMESTERS
        .iter()
        .position(|s| *s == semester)
        .unwrap_or(SEMESTERS.len());
    (idx, semester.to_string())
}

/// The weighted tabulation engine: one result per semester observed in the
/// combined record set. Semesters with no records on either side are absent
/// from the output, never synthesized. A semester rated by only one cohort
/// caps at that cohort's weight share (60 peer / 40 hierarchy).
pub fn tabulate_semesters(
    peer_rows: &[EvaluationRow],
    hierarchy_rows: &[EvaluationRow],
) -> Vec<SemesterTabulation> {
    let mut semesters: Vec<String> = peer_rows
        .iter()
        .chain(hierarchy_rows.iter())
        .map(|r| r.semester.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    semesters.sort_by_key(|s| semester_sort_key(s));

    semesters
        .into_iter()
        .map(|semester| {
            let peer_points: Vec<f64> = peer_rows
                .iter()
                .filter(|r| r.semester == semester)
                .map(|r| r.points)
                .collect();
            let hierarchy_points: Vec<f64> = hierarchy_rows
                .iter()
                .filter(|r| r.semester == semester)
                .map(|r| r.points)
                .collect();

            let peer = cohort_score(&peer_points, Family::Peer.weight());
            let hierarchy = cohort_score(&hierarchy_points, Family::Hierarchy.weight());
            let total = CombinedScore {
                total_score: peer.weighted_scaled_score + hierarchy.weighted_scaled_score,
                total_rating: peer.weighted_raw_average + hierarchy.weighted_raw_average,
            };
            SemesterTabulation {
                semester,
                peer,
                hierarchy,
                total,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(semester: &str, points: f64) -> EvaluationRow {
        EvaluationRow {
            id: format!("r-{}-{}", semester, points),
            evaluator_name: "Test Evaluator".to_string(),
            department: "CCIT".to_string(),
            school_year: "2024-2025".to_string(),
            semester: semester.to_string(),
            subject_title: "Data Structures".to_string(),
            points,
            created_at: "2025-01-15T08:00:00Z".to_string(),
        }
    }

    #[test]
    fn empty_cohort_contributes_zero_not_nan() {
        let score = cohort_score(&[], PEER_WEIGHT);
        assert_eq!(score.raw_average, 0.0);
        assert_eq!(score.scaled_score, 0.0);
        assert_eq!(score.weighted_scaled_score, 0.0);
        assert_eq!(score.count, 0);
        assert!(!score.raw_average.is_nan());
    }

    #[test]
    fn scaled_score_is_raw_average_times_twenty() {
        assert_eq!(cohort_score(&[5.0], 1.0).scaled_score, 100.0);
        assert_eq!(cohort_score(&[0.0], 1.0).scaled_score, 0.0);
        assert_eq!(cohort_score(&[2.5], 1.0).scaled_score, 50.0);
    }

    #[test]
    fn weights_sum_to_one() {
        assert_eq!(PEER_WEIGHT + HIERARCHY_WEIGHT, 1.0);
    }

    #[test]
    fn worked_scenario_combines_cohorts() {
        // peer [5,4,3] -> avg 4, scaled 80, weighted 48
        // hierarchy [3,3] -> avg 3, scaled 60, weighted 24
        let peer: Vec<EvaluationRow> = [5.0, 4.0, 3.0]
            .iter()
            .map(|p| row("1st Semester", *p))
            .collect();
        let hierarchy: Vec<EvaluationRow> =
            [3.0, 3.0].iter().map(|p| row("1st Semester", *p)).collect();

        let out = tabulate_semesters(&peer, &hierarchy);
        assert_eq!(out.len(), 1);
        let t = &out[0];
        assert_eq!(t.semester, "1st Semester");
        assert!((t.peer.raw_average - 4.0).abs() < 1e-9);
        assert!((t.peer.weighted_scaled_score - 48.0).abs() < 1e-9);
        assert!((t.hierarchy.weighted_scaled_score - 24.0).abs() < 1e-9);
        assert!((t.total.total_score - 72.0).abs() < 1e-9);
        assert!((t.total.total_rating - 3.6).abs() < 1e-9);
    }

    #[test]
    fn single_cohort_caps_at_its_weight_share() {
        let hierarchy: Vec<EvaluationRow> =
            [5.0, 5.0].iter().map(|p| row("2nd Semester", *p)).collect();
        let out = tabulate_semesters(&[], &hierarchy);
        assert_eq!(out.len(), 1);
        let t = &out[0];
        assert_eq!(t.peer.count, 0);
        assert!((t.total.total_score - 40.0).abs() < 1e-9);
        assert!((t.total.total_rating - 2.0).abs() < 1e-9);

        let peer: Vec<EvaluationRow> =
            [5.0, 5.0].iter().map(|p| row("1st Semester", *p)).collect();
        let out = tabulate_semesters(&peer, &[]);
        assert!((out[0].total.total_score - 60.0).abs() < 1e-9);
    }

    #[test]
    fn unobserved_semesters_are_absent() {
        let peer: Vec<EvaluationRow> = vec![row("2nd Semester", 4.0)];
        let out = tabulate_semesters(&peer, &[]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].semester, "2nd Semester");

        let out = tabulate_semesters(&[], &[]);
        assert!(out.is_empty());
    }

    #[test]
    fn semesters_emit_in_calendar_order() {
        let peer = vec![row("2nd Semester", 4.0), row("1st Semester", 5.0)];
        let out = tabulate_semesters(&peer, &[]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].semester, "1st Semester");
        assert_eq!(out[1].semester, "2nd Semester");
    }

    #[test]
    fn parse_filters_accepts_all_and_null_as_widen() {
        let raw = serde_json::json!({
            "schoolYear": "2024-2025",
            "department": "ALL",
            "semester": null
        });
        let parsed = parse_result_filters(Some(&raw)).expect("parse filters");
        assert_eq!(parsed.school_year.as_deref(), Some("2024-2025"));
        assert_eq!(parsed.department, None);
        assert_eq!(parsed.semester, None);
        assert_eq!(parsed.subject_title, None);
    }

    #[test]
    fn parse_filters_rejects_unknown_enum_values() {
        let raw = serde_json::json!({ "department": "LAW" });
        let e = parse_result_filters(Some(&raw)).expect_err("unknown department");
        assert_eq!(e.code, "bad_params");

        let raw = serde_json::json!({ "schoolYear": "1999-2000" });
        assert!(parse_result_filters(Some(&raw)).is_err());
    }
}
