use axum::routing::{get, post, put};
use axum::Router;

use super::handlers::{
    admins, assignments, auth, backup_exchange, core, courses, evaluations, programs, questions,
    sections, students, survey, teachers,
};
use super::types::AppState;

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(core::dashboard))
        .route("/programs", get(programs::list).post(programs::create))
        .route(
            "/programs/:id",
            put(programs::update).delete(programs::delete),
        )
        .route("/sections", get(sections::list).post(sections::create))
        .route(
            "/sections/:id",
            put(sections::update).delete(sections::delete),
        )
        .route("/courses", get(courses::list).post(courses::create))
        .route("/courses/:id", put(courses::update).delete(courses::delete))
        .route("/teachers", get(teachers::list).post(teachers::create))
        .route(
            "/teachers/:id",
            put(teachers::update).delete(teachers::delete),
        )
        .route("/students", get(students::list).post(students::create))
        .route("/students/import", post(students::import))
        .route(
            "/students/:id",
            put(students::update).delete(students::delete),
        )
        .route("/students/:id/password", post(students::reset_password))
        .route(
            "/assignments",
            get(assignments::list).post(assignments::create),
        )
        .route(
            "/assignments/:id",
            put(assignments::update).delete(assignments::delete),
        )
        .route(
            "/categories",
            get(questions::list_categories).post(questions::create_category),
        )
        .route(
            "/categories/:id",
            put(questions::update_category).delete(questions::delete_category),
        )
        .route(
            "/questions",
            get(questions::list_questions).post(questions::create_question),
        )
        .route(
            "/questions/:id",
            put(questions::update_question).delete(questions::delete_question),
        )
        .route(
            "/options",
            get(questions::list_options).post(questions::create_option),
        )
        .route(
            "/options/:id",
            put(questions::update_option).delete(questions::delete_option),
        )
        .route("/admins", get(admins::list).post(admins::create))
        .route("/admins/:id", put(admins::update).delete(admins::delete))
        .route(
            "/survey-status",
            get(survey::status).put(survey::set_status),
        )
        .route("/survey-status/toggle", post(survey::toggle_status))
        .route(
            "/evaluations",
            get(evaluations::list).delete(evaluations::delete_all),
        )
        .route("/evaluations/export.csv", get(evaluations::export_csv))
        .route("/evaluations/:teacher_id", get(evaluations::get))
        .route("/evaluations/:teacher_id/report", get(evaluations::report))
        .route(
            "/evaluations/:teacher_id/report.csv",
            get(evaluations::report_csv),
        )
        .route("/suggestions", get(evaluations::suggestions))
        .route("/backup/export", post(backup_exchange::export))
        .route("/backup/import", post(backup_exchange::import))
}

fn survey_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(survey::status))
        .route("/form", get(survey::form))
        .route("/assessments", get(survey::assessments))
        .route("/submit", post(survey::submit))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(core::health))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/password", post(auth::change_password))
        .nest("/api/admin", admin_routes())
        .nest("/api/survey", survey_routes())
        .with_state(state)
}
