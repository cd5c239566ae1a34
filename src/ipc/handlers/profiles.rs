use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::tabulate::DEPARTMENTS;
use serde_json::json;
use uuid::Uuid;

pub const PROFILE_ROLES: [&str; 5] = [
    "student",
    "instructor",
    "faculty",
    "programchair",
    "supervisor",
];

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let role = match required_str(req, "role") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let department = match required_str(req, "department") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    if !PROFILE_ROLES.contains(&role.as_str()) {
        return err(
            &req.id,
            "bad_params",
            format!("unknown role: {}", role),
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

    let profile_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO profiles(id, name, role, department) VALUES (?, ?, ?, ?)",
        (&profile_id, &name, &role, &department),
    ) {
        return err(&req.id, "db_query_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "profileId": profile_id }))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let role = req
        .params
        .get("role")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let mut sql = String::from("SELECT id, name, role, department FROM profiles");
    if role.is_some() {
        sql.push_str(" WHERE role = ?");
    }
    sql.push_str(" ORDER BY name, id");

    let result = (|| -> Result<Vec<serde_json::Value>, rusqlite::Error> {
        let mut stmt = conn.prepare(&sql)?;
        match &role {
            Some(r) => stmt
                .query_map([r], |r| {
                    Ok(json!({
                        "profileId": r.get::<_, String>(0)?,
                        "name": r.get::<_, String>(1)?,
                        "role": r.get::<_, String>(2)?,
                        "department": r.get::<_, String>(3)?,
                    }))
                })?
                .collect(),
            None => stmt
                .query_map([], |r| {
                    Ok(json!({
                        "profileId": r.get::<_, String>(0)?,
                        "name": r.get::<_, String>(1)?,
                        "role": r.get::<_, String>(2)?,
                        "department": r.get::<_, String>(3)?,
                    }))
                })?
                .collect(),
        }
    })();

    match result {
        Ok(profiles) => ok(&req.id, json!({ "profiles": profiles })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "profiles.create" => Some(handle_create(state, req)),
        "profiles.list" => Some(handle_list(state, req)),
        _ => None,
    }
}
