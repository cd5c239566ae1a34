use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::tabulate::{Family, DEPARTMENTS, SCHOOL_YEARS, SEMESTERS};
use chrono::Utc;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

/// Which roles a family accepts on each side of a submission.
/// Peer records come from students about any evaluated role; hierarchy
/// records come from the role exactly one level above the target.
fn target_roles(family: Family) -> &'static [&'static str] {
    match family {
        Family::Peer => &["instructor", "faculty", "programchair"],
        Family::Hierarchy => &["faculty", "programchair"],
    }
}

fn expected_evaluator_role(family: Family, target_role: &str) -> &'static str {
    match family {
        Family::Peer => "student",
        Family::Hierarchy => match target_role {
            "faculty" => "programchair",
            _ => "supervisor",
        },
    }
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };

    let family_raw = match required_str(req, "family") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(family) = Family::parse(&family_raw) else {
        return err(
            &req.id,
            "bad_params",
            format!("family must be 'peer' or 'hierarchy', got '{}'", family_raw),
            None,
        );
    };

    let target_id = match required_str(req, "targetId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let target_role = match required_str(req, "targetRole") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let evaluator_id = match required_str(req, "evaluatorId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let subject_title = match required_str(req, "subjectTitle") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let semester = match required_str(req, "semester") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let school_year = match required_str(req, "schoolYear") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let department = match required_str(req, "department") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(points) = req.params.get("points").and_then(|v| v.as_f64()) else {
        return err(&req.id, "bad_params", "missing points", None);
    };

    if !SEMESTERS.contains(&semester.as_str()) {
        return err(
            &req.id,
            "bad_params",
            format!("unknown semester: {}", semester),
            None,
        );
    }
    if !SCHOOL_YEARS.contains(&school_year.as_str()) {
        return err(
            &req.id,
            "bad_params",
            format!("unknown school year: {}", school_year),
            None,
        );
    }
    if !DEPARTMENTS.contains(&department.as_str()) {
        return err(
            &req.id,
            "bad_params",
            format!("unknown department: {}", department),
            None,
        );
    }
    if !points.is_finite() || !(1.0..=5.0).contains(&points) {
        return err(
            &req.id,
            "bad_params",
            "points must be between 1 and 5",
            None,
        );
    }
    if !target_roles(family).contains(&target_role.as_str()) {
        return err(
            &req.id,
            "bad_params",
            format!(
                "{} evaluations cannot target role '{}'",
                family.as_str(),
                target_role
            ),
            None,
        );
    }

    // Resolve the submitter's current display name. The snapshot lives on
    // the record; later profile renames do not rewrite history.
    let profile: Option<(String, String)> = match conn
        .query_row(
            "SELECT name, role FROM profiles WHERE id = ?",
            [&evaluator_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((evaluator_name, evaluator_role)) = profile else {
        return err(&req.id, "not_found", "evaluator profile not found", None);
    };

    let expected_role = expected_evaluator_role(family, &target_role);
    if evaluator_role != expected_role {
        return err(
            &req.id,
            "bad_params",
            format!(
                "{} evaluations of a {} must come from a {}, got {}",
                family.as_str(),
                target_role,
                expected_role,
                evaluator_role
            ),
            None,
        );
    }

    let evaluation_id = Uuid::new_v4().to_string();
    let created_at = Utc::now().to_rfc3339();
    let sql = format!(
        "INSERT INTO {}(id, target_id, target_role, evaluator_id, evaluator_name,
                        department, school_year, semester, subject_title, points, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        family.table()
    );
    if let Err(e) = conn.execute(
        &sql,
        (
            &evaluation_id,
            &target_id,
            &target_role,
            &evaluator_id,
            &evaluator_name,
            &department,
            &school_year,
            &semester,
            &subject_title,
            points,
            &created_at,
        ),
    ) {
        if is_constraint_violation(&e) {
            return err(
                &req.id,
                "duplicate_submission",
                "an evaluation for this target, subject, semester and school year was already submitted",
                None,
            );
        }
        return err(&req.id, "db_query_failed", e.to_string(), None);
    }

    ok(
        &req.id,
        json!({
            "evaluationId": evaluation_id,
            "family": family.as_str(),
            "evaluatorName": evaluator_name,
            "createdAt": created_at,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "evaluations.submit" => Some(handle_submit(state, req)),
        _ => None,
    }
}
