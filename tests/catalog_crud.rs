mod support;

use serde_json::json;
use support::*;

#[tokio::test]
async fn duplicate_names_and_foreign_sections_are_rejected() {
    let server = spawn_server().await;
    let admin = login_admin(server.addr).await;
    let campus = seed_campus(server.addr, &admin).await;

    let resp = post(server.addr, "/api/admin/programs", &admin, json!({ "name": "BSCS" })).await;
    assert_eq!(resp.status, 409);
    assert_eq!(resp.error_code(), "conflict");

    let resp = post(server.addr, "/api/admin/programs", &admin, json!({ "name": "  " })).await;
    assert_eq!(resp.status, 400);

    let other_program =
        create(server.addr, &admin, "/api/admin/programs", json!({ "name": "BSIT" })).await;
    let resp = post(
        server.addr,
        "/api/admin/courses",
        &admin,
        json!({
            "programId": other_program,
            "sectionId": campus.section_id,
            "code": "IT101",
            "name": "Networks",
        }),
    )
    .await;
    assert_eq!(resp.status, 400, "{}", resp.body);

    let resp = post(
        server.addr,
        "/api/admin/teachers",
        &admin,
        json!({ "facultyId": "F-001", "fullName": "Someone Else" }),
    )
    .await;
    assert_eq!(resp.status, 409);
}

#[tokio::test]
async fn list_filters_narrow_results() {
    let server = spawn_server().await;
    let admin = login_admin(server.addr).await;
    let campus = seed_campus(server.addr, &admin).await;
    let section_b = create(
        server.addr,
        &admin,
        "/api/admin/sections",
        json!({ "programId": campus.program_id, "name": "1B" }),
    )
    .await;
    create(
        server.addr,
        &admin,
        "/api/admin/students",
        json!({
            "idNumber": "2024-002",
            "fullName": "Ben Cruz",
            "programId": campus.program_id,
            "sectionId": section_b,
        }),
    )
    .await;

    let all = get(server.addr, "/api/admin/students", &admin).await.result();
    assert_eq!(all["students"].as_array().map(Vec::len), Some(2));

    let path = format!("/api/admin/students?sectionId={}", campus.section_id);
    let only_a = get(server.addr, &path, &admin).await.result();
    let students = only_a["students"].as_array().expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(students[0]["idNumber"], json!("2024-001"));
    assert_eq!(students[0]["evaluationsAssigned"], json!(1));
    assert_eq!(students[0]["evaluationsCompleted"], json!(0));

    let path = format!("/api/admin/sections?programId={}", campus.program_id);
    let sections = get(server.addr, &path, &admin).await.result();
    assert_eq!(sections["sections"].as_array().map(Vec::len), Some(2));

    let path = format!("/api/admin/questions?categoryId={}", campus.category_ids[1]);
    let questions = get(server.addr, &path, &admin).await.result();
    assert_eq!(questions["questions"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn enrolled_programs_and_sections_cannot_be_deleted() {
    let server = spawn_server().await;
    let admin = login_admin(server.addr).await;
    let campus = seed_campus(server.addr, &admin).await;

    let resp = delete(
        server.addr,
        &format!("/api/admin/programs/{}", campus.program_id),
        &admin,
    )
    .await;
    assert_eq!(resp.status, 409);
    let resp = delete(
        server.addr,
        &format!("/api/admin/sections/{}", campus.section_id),
        &admin,
    )
    .await;
    assert_eq!(resp.status, 409);

    let resp = delete(
        server.addr,
        &format!("/api/admin/students/{}", campus.student_id),
        &admin,
    )
    .await;
    assert_eq!(resp.status, 200, "{}", resp.body);

    let resp = delete(
        server.addr,
        &format!("/api/admin/programs/{}", campus.program_id),
        &admin,
    )
    .await;
    assert_eq!(resp.status, 200, "{}", resp.body);

    let courses = get(server.addr, "/api/admin/courses", &admin).await.result();
    assert_eq!(courses["courses"].as_array().map(Vec::len), Some(0));
    let assignments = get(server.addr, "/api/admin/assignments", &admin).await.result();
    assert_eq!(assignments["assignments"].as_array().map(Vec::len), Some(0));
    // The teacher outlives the program.
    let teachers = get(server.addr, "/api/admin/teachers", &admin).await.result();
    assert_eq!(teachers["teachers"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn student_update_moves_program_and_section_together() {
    let server = spawn_server().await;
    let admin = login_admin(server.addr).await;
    let campus = seed_campus(server.addr, &admin).await;
    let section_b = create(
        server.addr,
        &admin,
        "/api/admin/sections",
        json!({ "programId": campus.program_id, "name": "1B" }),
    )
    .await;
    let path = format!("/api/admin/students/{}", campus.student_id);

    let resp = put(server.addr, &path, &admin, json!({ "sectionId": section_b })).await;
    assert_eq!(resp.status, 400);

    let resp = put(
        server.addr,
        &path,
        &admin,
        json!({ "programId": campus.program_id, "sectionId": section_b, "fullName": "Ana R. Reyes" }),
    )
    .await;
    assert_eq!(resp.status, 200, "{}", resp.body);
    let student = resp.result();
    assert_eq!(student["sectionName"], json!("1B"));
    assert_eq!(student["fullName"], json!("Ana R. Reyes"));
    // No teacher is assigned to 1B yet.
    assert_eq!(student["evaluationsAssigned"], json!(0));
}

#[tokio::test]
async fn csv_import_is_all_or_nothing() {
    let server = spawn_server().await;
    let admin = login_admin(server.addr).await;
    seed_campus(server.addr, &admin).await;

    let bad = "idNumber,fullName,programName,sectionName\n\
               2024-010,Carla Diaz,BSCS,1A\n\
               2024-011,Dan Lim,BSCS,9Z\n";
    let resp = post(server.addr, "/api/admin/students/import", &admin, json!({ "csv": bad })).await;
    assert_eq!(resp.status, 400);
    assert_eq!(resp.json()["error"]["details"]["line"], json!(3));
    let listed = get(server.addr, "/api/admin/students", &admin).await.result();
    assert_eq!(listed["students"].as_array().map(Vec::len), Some(1));

    let good = "2024-010,\"Diaz, Carla\",BSCS,1A,carla-pw\n2024-011,Dan Lim,BSCS,1A\n";
    let resp = post(server.addr, "/api/admin/students/import", &admin, json!({ "csv": good })).await;
    assert_eq!(resp.status, 200, "{}", resp.body);
    assert_eq!(resp.result()["imported"], json!(2));

    login(server.addr, "2024-010", "carla-pw").await;
    login(server.addr, "2024-011", "2024-011").await;
}

#[tokio::test]
async fn option_values_stay_on_the_likert_scale() {
    let server = spawn_server().await;
    let admin = login_admin(server.addr).await;

    let options = get(server.addr, "/api/admin/options", &admin).await.result();
    let values: Vec<i64> = options["options"]
        .as_array()
        .expect("options")
        .iter()
        .filter_map(|o| o["value"].as_i64())
        .collect();
    assert_eq!(values, vec![1, 2, 3, 4, 5]);

    let resp = post(
        server.addr,
        "/api/admin/options",
        &admin,
        json!({ "text": "Off the charts", "value": 6 }),
    )
    .await;
    assert_eq!(resp.status, 400);

    let resp = post(
        server.addr,
        "/api/admin/options",
        &admin,
        json!({ "text": "Agree again", "value": 4 }),
    )
    .await;
    assert_eq!(resp.status, 409);
}

#[tokio::test]
async fn dashboard_counts_entities() {
    let server = spawn_server().await;
    let admin = login_admin(server.addr).await;
    seed_campus(server.addr, &admin).await;

    let dash = get(server.addr, "/api/admin/dashboard", &admin).await.result();
    assert_eq!(dash["programs"], json!(1));
    assert_eq!(dash["teachers"], json!(1));
    assert_eq!(dash["students"], json!(1));
    assert_eq!(dash["questions"], json!(3));
    assert_eq!(dash["expectedSubmissions"], json!(1));
    assert_eq!(dash["submissions"], json!(0));
    assert_eq!(dash["completionRate"], json!(0.0));
}

#[tokio::test]
async fn rejected_updates_leave_every_field_unchanged() {
    let server = spawn_server().await;
    let admin = login_admin(server.addr).await;
    let campus = seed_campus(server.addr, &admin).await;

    let resp = put(
        server.addr,
        &format!("/api/admin/teachers/{}", campus.teacher_id),
        &admin,
        json!({ "facultyId": "F-CHANGED", "fullName": "   " }),
    )
    .await;
    assert_eq!(resp.status, 400);
    let teachers = get(server.addr, "/api/admin/teachers", &admin).await.result();
    assert_eq!(teachers["teachers"][0]["facultyId"], json!("F-001"));
    assert_eq!(teachers["teachers"][0]["fullName"], json!("Maria Santos"));

    let strongly_disagree = &campus.option_ids[0];
    let resp = put(
        server.addr,
        &format!("/api/admin/options/{strongly_disagree}"),
        &admin,
        json!({ "text": "RENAMED", "value": 9 }),
    )
    .await;
    assert_eq!(resp.status, 400);

    // Value 2 is taken, so the rename must roll back with it.
    let resp = put(
        server.addr,
        &format!("/api/admin/options/{strongly_disagree}"),
        &admin,
        json!({ "text": "RENAMED", "value": 2 }),
    )
    .await;
    assert_eq!(resp.status, 409);

    let options = get(server.addr, "/api/admin/options", &admin).await.result();
    let first = &options["options"][0];
    assert_eq!(first["id"], json!(strongly_disagree));
    assert_eq!(first["text"], json!("Strongly Disagree"));
    assert_eq!(first["value"], json!(1));

    let resp = put(
        server.addr,
        &format!("/api/admin/questions/{}", campus.question_ids[0]),
        &admin,
        json!({ "text": "Moved", "categoryId": "no-such-category" }),
    )
    .await;
    assert_eq!(resp.status, 404);
    let questions = get(server.addr, "/api/admin/questions", &admin).await.result();
    assert!(questions["questions"]
        .as_array()
        .expect("questions")
        .iter()
        .all(|q| q["text"] != json!("Moved")));
}
