//! SAST: a student assessment service for rating instructors.
//!
//! Students answer a Likert questionnaire once per teaching assignment while
//! the survey is open. Admins manage the academic structure and the
//! questionnaire, open and close the survey, and read aggregated reports.

pub mod api;
pub mod auth;
pub mod backup;
pub mod calc;
pub mod config;
pub mod db;
pub mod report;
