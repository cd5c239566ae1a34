use crate::ipc::error::{err, ok};
use crate::ipc::handlers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::tabulate::{self, QueryContext};
use serde_json::json;

fn parse_filters(req: &Request) -> Result<tabulate::ResultFilters, serde_json::Value> {
    tabulate::parse_result_filters(req.params.get("filters"))
        .map_err(|e| err(&req.id, &e.code, e.message, e.details))
}

fn handle_school_years(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let ctx = QueryContext {
        conn,
        target_id: &target_id,
        target_role: &target_role,
    };
    match tabulate::school_year_facets(&ctx) {
        Ok(years) => ok(&req.id, json!({ "schoolYears": years })),
        Err(e) => err(&req.id, &e.code, e.message, e.details),
    }
}

fn handle_facet(state: &mut AppState, req: &Request) -> serde_json::Value {
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
    let field = match required_str(req, "field") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Some(column) = tabulate::facet_column(&field) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown facet field: {}", field),
            None,
        );
    };
    let filters = match parse_filters(req) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    // Drill-down facets are always scoped to a school year; only the
    // school-year facet itself starts unscoped.
    if field != "schoolYear" && filters.school_year.is_none() {
        return err(&req.id, "bad_params", "missing filters.schoolYear", None);
    }

    let ctx = QueryContext {
        conn,
        target_id: &target_id,
        target_role: &target_role,
    };
    match tabulate::distinct_union(&ctx, column, &filters) {
        Ok(values) => ok(&req.id, json!({ "field": field, "values": values })),
        Err(e) => err(&req.id, &e.code, e.message, e.details),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "results.schoolYears" => Some(handle_school_years(state, req)),
        "results.facet" => Some(handle_facet(state, req)),
        _ => None,
    }
}
