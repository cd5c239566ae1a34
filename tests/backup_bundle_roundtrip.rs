
use serde_json::json;
use test_support::{
    create_profile, error_code, request, request_ok, spawn_sidecar, submit_evaluation, temp_dir,
};

#[test]
fn bundle_roundtrips_workspace_into_a_fresh_directory() {
    let source = temp_dir("evald-backup-source");
    let restored = temp_dir("evald-backup-restored");
    let bundle = source.join("export.evbackup.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": source.to_string_lossy() }),
    );
    let student = create_profile(&mut stdin, &mut reader, "2", "Reyes, Ana", "student", "CBAPA");
    let faculty = create_profile(&mut stdin, &mut reader, "3", "Santos, Carla", "faculty", "CBAPA");
    let resp = submit_evaluation(
        &mut stdin, &mut reader, "4", "peer", &faculty, "faculty", &student,
        "Business Ethics", "1st Semester", "2025-2026", "CBAPA", 5.0,
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(true));

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": source.to_string_lossy(),
            "outPath": bundle.to_string_lossy()
        }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("evald-workspace-v1")
    );
    assert!(exported
        .get("dbSha256")
        .and_then(|v| v.as_str())
        .map(|s| s.len() == 64)
        .unwrap_or(false));

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "backup.importWorkspaceBundle",
        json!({
            "workspacePath": restored.to_string_lossy(),
            "inPath": bundle.to_string_lossy()
        }),
    );
    assert_eq!(
        imported.get("bundleFormatDetected").and_then(|v| v.as_str()),
        Some("evald-workspace-v1")
    );

    // The restored workspace carries the evaluation data.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "workspace.select",
        json!({ "path": restored.to_string_lossy() }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "results.list",
        json!({
            "targetId": faculty,
            "targetRole": "faculty",
            "filters": { "schoolYear": "2025-2026" }
        }),
    );
    assert_eq!(
        listed.get("peer").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(source);
    let _ = std::fs::remove_dir_all(restored);
}

#[test]
fn export_refuses_a_workspace_without_a_database() {
    let empty = temp_dir("evald-backup-empty");
    let out = empty.join("never.zip");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(
        &mut stdin,
        &mut reader,
        "1",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": empty.to_string_lossy(),
            "outPath": out.to_string_lossy()
        }),
    );
    assert_eq!(error_code(&resp), "backup_export_failed");

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(empty);
}
