use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::tabulate::{self, QueryContext};
use serde_json::json;

fn parse_filters(req: &Request) -> Result<tabulate::ResultFilters, serde_json::Value> {
    tabulate::parse_result_filters(req.params.get("filters"))
        .map_err(|e| err(&req.id, &e.code, e.message, e.details))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let target_id = match required_str(req, "targetId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let target_role = match required_str(req, "targetRole") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let filters = match parse_filters(req) {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    let ctx = QueryContext {
        conn,
        target_id: &target_id,
        target_role: &target_role,
    };
    match tabulate::fetch_combined(&ctx, &filters) {
        Ok((peer, hierarchy)) => ok(
            &req.id,
            json!({
                "peer": peer,
                "hierarchy": hierarchy,
            }),
        ),
        Err(e) => err(&req.id, &e.code, e.message, e.details),
    }
}

fn handle_tabulate(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let target_id = match required_str(req, "targetId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let target_role = match required_str(req, "targetRole") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let filters = match parse_filters(req) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    // Tabulation is always per school year; the other filters narrow it
    // from the dashboard view down to one subject.
    if filters.school_year.is_none() {
        return err(&req.id, "bad_params", "missing filters.schoolYear", None);
    }

    let ctx = QueryContext {
        conn,
        target_id: &target_id,
        target_role: &target_role,
    };
    let (peer, hierarchy) = match tabulate::fetch_combined(&ctx, &filters) {
        Ok(v) => v,
        Err(e) => return err(&req.id, &e.code, e.message, e.details),
    };
    let semesters = tabulate::tabulate_semesters(&peer, &hierarchy);

    ok(
        &req.id,
        json!({
            "filters": filters,
            "semesters": semesters,
        }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.list" => Some(handle_list(state, req)),
        "results.tabulate" => Some(handle_tabulate(state, req)),
        _ => None,
    }
}
