
use serde_json::json;
use test_support::{
    create_profile, request_ok, spawn_sidecar, submit_evaluation, temp_dir,
};

fn facet_values(result: &serde_json::Value) -> Vec<String> {
    result
        .get("values")
        .and_then(|v| v.as_array())
        .expect("values array")
        .iter()
        .map(|v| v.as_str().expect("string facet value").to_string())
        .collect()
}

#[test]
fn facets_union_both_families_and_degrade_to_empty_lists() {
    let workspace = temp_dir("evald-facets-drilldown");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let student_a = create_profile(&mut stdin, &mut reader, "2", "Reyes, Ana", "student", "CCIT");
    let student_b = create_profile(&mut stdin, &mut reader, "3", "Lim, Ben", "student", "CTE");
    let chair = create_profile(&mut stdin, &mut reader, "4", "Cruz, Bien", "programchair", "CCIT");
    let faculty = create_profile(&mut stdin, &mut reader, "5", "Santos, Carla", "faculty", "CCIT");

    // Peer records in CCIT and CTE; hierarchy record only in CCIT. The
    // department facet must be the deduplicated union of both families.
    let _ = submit_evaluation(
        &mut stdin, &mut reader, "6", "peer", &faculty, "faculty", &student_a,
        "Data Structures", "1st Semester", "2024-2025", "CCIT", 5.0,
    );
    let _ = submit_evaluation(
        &mut stdin, &mut reader, "7", "peer", &faculty, "faculty", &student_b,
        "Teaching Methods", "2nd Semester", "2024-2025", "CTE", 4.0,
    );
    let _ = submit_evaluation(
        &mut stdin, &mut reader, "8", "hierarchy", &faculty, "faculty", &chair,
        "Data Structures", "1st Semester", "2024-2025", "CCIT", 3.0,
    );
    let _ = submit_evaluation(
        &mut stdin, &mut reader, "9", "hierarchy", &faculty, "faculty", &chair,
        "Algorithms", "1st Semester", "2023-2024", "CCIT", 4.0,
    );

    let years = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "results.schoolYears",
        json!({ "targetId": faculty, "targetRole": "faculty" }),
    );
    let years = years
        .get("schoolYears")
        .and_then(|v| v.as_array())
        .expect("schoolYears")
        .clone();
    assert_eq!(years.len(), 2);
    // Newest year first, each carrying its distinct-subject count.
    assert_eq!(
        years[0].get("schoolYear").and_then(|v| v.as_str()),
        Some("2024-2025")
    );
    assert_eq!(years[0].get("subjectCount").and_then(|v| v.as_u64()), Some(2));
    assert_eq!(
        years[1].get("schoolYear").and_then(|v| v.as_str()),
        Some("2023-2024")
    );
    assert_eq!(years[1].get("subjectCount").and_then(|v| v.as_u64()), Some(1));

    let departments = request_ok(
        &mut stdin,
        &mut reader,
        "11",
        "results.facet",
        json!({
            "targetId": faculty,
            "targetRole": "faculty",
            "field": "department",
            "filters": { "schoolYear": "2024-2025" }
        }),
    );
    assert_eq!(facet_values(&departments), vec!["CCIT", "CTE"]);

    // Narrowing by department shrinks the semester facet accordingly.
    let semesters = request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "results.facet",
        json!({
            "targetId": faculty,
            "targetRole": "faculty",
            "field": "semester",
            "filters": { "schoolYear": "2024-2025", "department": "CTE" }
        }),
    );
    assert_eq!(facet_values(&semesters), vec!["2nd Semester"]);

    let subjects = request_ok(
        &mut stdin,
        &mut reader,
        "13",
        "results.facet",
        json!({
            "targetId": faculty,
            "targetRole": "faculty",
            "field": "subjectTitle",
            "filters": {
                "schoolYear": "2024-2025",
                "department": "CCIT",
                "semester": "1st Semester"
            }
        }),
    );
    assert_eq!(facet_values(&subjects), vec!["Data Structures"]);

    // Resolving the same facet twice yields the same set.
    let again = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "results.facet",
        json!({
            "targetId": faculty,
            "targetRole": "faculty",
            "field": "department",
            "filters": { "schoolYear": "2024-2025" }
        }),
    );
    assert_eq!(facet_values(&again), facet_values(&departments));

    // A target with no records in either family: empty lists, not errors.
    let none = request_ok(
        &mut stdin,
        &mut reader,
        "15",
        "results.schoolYears",
        json!({ "targetId": "unrated-target", "targetRole": "faculty" }),
    );
    assert_eq!(
        none.get("schoolYears").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );
    let none = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "results.facet",
        json!({
            "targetId": "unrated-target",
            "targetRole": "faculty",
            "field": "subjectTitle",
            "filters": { "schoolYear": "2024-2025" }
        }),
    );
    assert!(facet_values(&none).is_empty());

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
