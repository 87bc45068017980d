mod support;

use serde_json::{json, Value};
use support::*;

async fn submit(server: &TestServer, campus: &Campus, id_number: &str, values: &[usize]) {
    let student = login(server.addr, id_number, id_number).await;
    let resp = post(
        server.addr,
        "/api/survey/submit",
        &student,
        json!({
            "assignmentId": campus.assignment_id,
            "answers": answers(campus, values),
            "suggestion": format!("note from {id_number}"),
        }),
    )
    .await;
    assert_eq!(resp.status, 200, "{}", resp.body);
}

async fn second_student(server: &TestServer, admin: &str, campus: &Campus) -> String {
    create(
        server.addr,
        admin,
        "/api/admin/students",
        json!({
            "idNumber": "2024-002",
            "fullName": "Ben Cruz",
            "programId": campus.program_id,
            "sectionId": campus.section_id,
        }),
    )
    .await
}

fn close(a: &Value, expected: f64) -> bool {
    a.as_f64().map(|v| (v - expected).abs() < 1e-9).unwrap_or(false)
}

#[tokio::test]
async fn teachers_without_answers_report_zeros() {
    let server = spawn_server().await;
    let admin = login_admin(server.addr).await;
    let campus = seed_campus(server.addr, &admin).await;

    let resp = get(
        server.addr,
        &format!("/api/admin/evaluations/{}", campus.teacher_id),
        &admin,
    )
    .await;
    assert_eq!(resp.status, 200, "{}", resp.body);
    let summary = &resp.result()["summary"];
    assert_eq!(summary["overallAverage"], json!(0.0));
    assert_eq!(summary["totalResponses"], json!(0));
    assert_eq!(summary["categories"], json!([]));
    assert_eq!(summary["programs"], json!([]));
    assert_eq!(summary["courses"], json!([]));

    let resp = get(server.addr, "/api/admin/evaluations/unknown", &admin).await;
    assert_eq!(resp.status, 404);
}

#[tokio::test]
async fn summaries_aggregate_every_answer() {
    let server = spawn_server().await;
    let admin = login_admin(server.addr).await;
    let campus = seed_campus(server.addr, &admin).await;
    second_student(&server, &admin, &campus).await;
    open_survey(server.addr, &admin).await;

    submit(&server, &campus, "2024-001", &[5, 4, 3]).await;
    submit(&server, &campus, "2024-002", &[1, 2, 3]).await;

    let all = get(server.addr, "/api/admin/evaluations", &admin).await.result();
    let summaries = all["summaries"].as_array().expect("summaries");
    assert_eq!(summaries.len(), 1);
    let s = &summaries[0];
    assert_eq!(s["totalScore"], json!(18));
    assert_eq!(s["count"], json!(6));
    assert!(close(&s["overallAverage"], 3.0));
    assert_eq!(s["totalResponses"], json!(2));
    assert_eq!(s["studentsServed"], json!(2));

    let categories = s["categories"].as_array().expect("categories");
    assert_eq!(categories.len(), 2);
    assert_eq!(categories[0]["name"], json!("Teaching"));
    assert_eq!(categories[0]["totalScore"], json!(12));
    assert_eq!(categories[0]["count"], json!(4));
    assert_eq!(categories[1]["name"], json!("Conduct"));
    assert!(close(&categories[1]["average"], 3.0));
    let category_total: i64 = categories
        .iter()
        .filter_map(|c| c["totalScore"].as_i64())
        .sum();
    assert_eq!(category_total, 18);

    let courses = s["courses"].as_array().expect("courses");
    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0]["courseCode"], json!("CS101"));
    assert_eq!(courses[0]["responses"], json!(2));
}

#[tokio::test]
async fn deleted_options_score_zero_but_still_count() {
    let server = spawn_server().await;
    let admin = login_admin(server.addr).await;
    let campus = seed_campus(server.addr, &admin).await;
    open_survey(server.addr, &admin).await;
    submit(&server, &campus, "2024-001", &[5, 4, 3]).await;

    let resp = delete(
        server.addr,
        &format!("/api/admin/options/{}", campus.option_ids[4]),
        &admin,
    )
    .await;
    assert_eq!(resp.status, 200, "{}", resp.body);
    assert_eq!(resp.result()["orphanedResponses"], json!(1));

    let resp = get(
        server.addr,
        &format!("/api/admin/evaluations/{}", campus.teacher_id),
        &admin,
    )
    .await;
    let summary = &resp.result()["summary"];
    assert_eq!(summary["totalScore"], json!(7));
    assert_eq!(summary["count"], json!(3));
    assert!(close(&summary["overallAverage"], 7.0 / 3.0));
}

#[tokio::test]
async fn report_document_is_paginated_with_labels() {
    let server = spawn_server_with(|c| c.report_rows_per_page = 6).await;
    let admin = login_admin(server.addr).await;
    let campus = seed_campus(server.addr, &admin).await;
    open_survey(server.addr, &admin).await;
    submit(&server, &campus, "2024-001", &[5, 5, 4]).await;

    let resp = get(
        server.addr,
        &format!("/api/admin/evaluations/{}/report", campus.teacher_id),
        &admin,
    )
    .await;
    assert_eq!(resp.status, 200, "{}", resp.body);
    let report = &resp.result()["report"];
    assert_eq!(report["teacherName"], json!("Maria Santos"));

    let pages = report["pages"].as_array().expect("pages");
    let count = pages.len();
    assert!(count > 1);
    assert_eq!(report["pageCount"], json!(count));
    for (i, page) in pages.iter().enumerate() {
        assert_eq!(page["number"], json!(i + 1));
        assert_eq!(page["footer"], json!(format!("Page {} of {}", i + 1, count)));
    }

    let text = report.to_string();
    // 14 / 3 rounds to 4.67.
    assert!(text.contains("4.67"), "{text}");
    assert!(text.contains("Outstanding"));
    assert!(text.contains("note from 2024-001"));
}

#[tokio::test]
async fn csv_exports_carry_headers_and_rows() {
    let server = spawn_server().await;
    let admin = login_admin(server.addr).await;
    let campus = seed_campus(server.addr, &admin).await;
    open_survey(server.addr, &admin).await;
    submit(&server, &campus, "2024-001", &[5, 4, 3]).await;

    let resp = get(server.addr, "/api/admin/evaluations/export.csv", &admin).await;
    assert_eq!(resp.status, 200);
    assert!(resp
        .header("content-type")
        .unwrap_or_default()
        .starts_with("text/csv"));
    let lines: Vec<&str> = resp.body.lines().collect();
    assert_eq!(
        lines[0],
        "facultyId,fullName,overallAverage,rating,totalResponses,studentsServed,answerCount"
    );
    assert_eq!(lines[1], "F-001,Maria Santos,4.00,Very Satisfactory,1,1,3");

    let resp = get(
        server.addr,
        &format!("/api/admin/evaluations/{}/report.csv", campus.teacher_id),
        &admin,
    )
    .await;
    assert_eq!(resp.status, 200);
    assert!(resp
        .header("content-disposition")
        .unwrap_or_default()
        .contains("evaluation-F-001.csv"));
    assert!(resp.body.contains("Teaching,,9,2,4.50,Outstanding"));
    assert!(resp.body.contains("Conduct,Is punctual,3,1,3.00,Satisfactory"));
}

#[tokio::test]
async fn deleting_a_teacher_removes_their_evaluations() {
    let server = spawn_server().await;
    let admin = login_admin(server.addr).await;
    let campus = seed_campus(server.addr, &admin).await;
    open_survey(server.addr, &admin).await;
    submit(&server, &campus, "2024-001", &[5, 4, 3]).await;

    let resp = delete(
        server.addr,
        &format!("/api/admin/teachers/{}", campus.teacher_id),
        &admin,
    )
    .await;
    assert_eq!(resp.status, 200, "{}", resp.body);

    let all = get(server.addr, "/api/admin/evaluations", &admin).await.result();
    assert_eq!(all["summaries"], json!([]));
    let suggestions = get(server.addr, "/api/admin/suggestions", &admin).await.result();
    assert_eq!(suggestions["suggestions"], json!([]));
    let dash = get(server.addr, "/api/admin/dashboard", &admin).await.result();
    assert_eq!(dash["responses"], json!(0));
    assert_eq!(dash["assignments"], json!(0));
}
