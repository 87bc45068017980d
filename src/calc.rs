use anyhow::Context;
use rusqlite::{params_from_iter, types::Value, Connection};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// One answer row joined with everything aggregation needs.
#[derive(Debug, Clone)]
pub struct EvaluationRow {
    pub student_id: String,
    pub teacher_id: String,
    pub assignment_id: String,
    pub question_id: String,
    pub question_text: String,
    pub question_sort: i64,
    pub category_id: String,
    pub category_name: String,
    pub category_sort: i64,
    /// None when the chosen option no longer exists; scored as 0.
    pub option_value: Option<i64>,
    pub program_id: String,
    pub program_name: String,
    pub section_id: String,
    pub section_name: String,
    pub course_id: String,
    pub course_code: String,
    pub course_name: String,
}

impl EvaluationRow {
    pub fn score(&self) -> i64 {
        self.option_value.unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherRef {
    pub id: String,
    pub faculty_id: String,
    pub full_name: String,
}

pub fn average(total_score: i64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total_score as f64 / count as f64
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSummary {
    pub question_id: String,
    pub text: String,
    pub total_score: i64,
    pub count: usize,
    pub average: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub category_id: String,
    pub name: String,
    pub total_score: i64,
    pub count: usize,
    pub average: f64,
    pub questions: Vec<QuestionSummary>,
}

/// Totals shared by the program, section and course groupings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupTally {
    pub total_score: i64,
    pub count: usize,
    /// Distinct (student, assignment) submissions.
    pub responses: usize,
    pub students_served: usize,
    pub average: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramSummary {
    pub program_id: String,
    pub program_name: String,
    #[serde(flatten)]
    pub tally: GroupTally,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSummary {
    pub section_id: String,
    pub section_name: String,
    pub program_name: String,
    #[serde(flatten)]
    pub tally: GroupTally,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub course_id: String,
    pub course_code: String,
    pub course_name: String,
    pub section_id: String,
    pub section_name: String,
    #[serde(flatten)]
    pub tally: GroupTally,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSummary {
    pub teacher_id: String,
    pub faculty_id: String,
    pub full_name: String,
    pub overall_average: f64,
    pub total_score: i64,
    pub count: usize,
    pub total_responses: usize,
    pub students_served: usize,
    pub categories: Vec<CategorySummary>,
    pub programs: Vec<ProgramSummary>,
    pub sections: Vec<SectionSummary>,
    pub courses: Vec<CourseSummary>,
}

#[derive(Default)]
struct GroupAcc<'a> {
    total_score: i64,
    count: usize,
    submissions: HashSet<(&'a str, &'a str)>,
    students: HashSet<&'a str>,
}

impl<'a> GroupAcc<'a> {
    fn add(&mut self, row: &'a EvaluationRow) {
        self.total_score += row.score();
        self.count += 1;
        self.submissions
            .insert((row.student_id.as_str(), row.assignment_id.as_str()));
        self.students.insert(row.student_id.as_str());
    }

    fn tally(&self) -> GroupTally {
        GroupTally {
            total_score: self.total_score,
            count: self.count,
            responses: self.submissions.len(),
            students_served: self.students.len(),
            average: average(self.total_score, self.count),
        }
    }
}

struct QuestionAcc<'a> {
    row: &'a EvaluationRow,
    total_score: i64,
    count: usize,
}

struct CategoryAcc<'a> {
    row: &'a EvaluationRow,
    total_score: i64,
    count: usize,
    questions: HashMap<&'a str, QuestionAcc<'a>>,
}

fn cmp_names(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

/// Folds one teacher's answer rows into nested averages. Rows for other
/// teachers are ignored.
pub fn summarize_teacher(teacher: &TeacherRef, rows: &[&EvaluationRow]) -> TeacherSummary {
    let mut categories: HashMap<&str, CategoryAcc> = HashMap::new();
    let mut programs: HashMap<&str, (&EvaluationRow, GroupAcc)> = HashMap::new();
    let mut sections: HashMap<&str, (&EvaluationRow, GroupAcc)> = HashMap::new();
    let mut courses: HashMap<(&str, &str), (&EvaluationRow, GroupAcc)> = HashMap::new();
    let mut overall = GroupAcc::default();

    for &row in rows.iter().filter(|r| r.teacher_id == teacher.id) {
        let score = row.score();
        overall.add(row);

        let cat = categories
            .entry(row.category_id.as_str())
            .or_insert_with(|| CategoryAcc {
                row,
                total_score: 0,
                count: 0,
                questions: HashMap::new(),
            });
        cat.total_score += score;
        cat.count += 1;
        let q = cat
            .questions
            .entry(row.question_id.as_str())
            .or_insert_with(|| QuestionAcc {
                row,
                total_score: 0,
                count: 0,
            });
        q.total_score += score;
        q.count += 1;

        programs
            .entry(row.program_id.as_str())
            .or_insert_with(|| (row, GroupAcc::default()))
            .1
            .add(row);
        sections
            .entry(row.section_id.as_str())
            .or_insert_with(|| (row, GroupAcc::default()))
            .1
            .add(row);
        courses
            .entry((row.course_id.as_str(), row.section_id.as_str()))
            .or_insert_with(|| (row, GroupAcc::default()))
            .1
            .add(row);
    }

    let mut category_out: Vec<(i64, CategorySummary)> = categories
        .into_values()
        .map(|acc| {
            let mut questions: Vec<(i64, QuestionSummary)> = acc
                .questions
                .into_values()
                .map(|q| {
                    (
                        q.row.question_sort,
                        QuestionSummary {
                            question_id: q.row.question_id.clone(),
                            text: q.row.question_text.clone(),
                            total_score: q.total_score,
                            count: q.count,
                            average: average(q.total_score, q.count),
                        },
                    )
                })
                .collect();
            questions.sort_by(|(sa, a), (sb, b)| {
                sa.cmp(sb)
                    .then_with(|| cmp_names(&a.text, &b.text))
                    .then_with(|| a.question_id.cmp(&b.question_id))
            });
            (
                acc.row.category_sort,
                CategorySummary {
                    category_id: acc.row.category_id.clone(),
                    name: acc.row.category_name.clone(),
                    total_score: acc.total_score,
                    count: acc.count,
                    average: average(acc.total_score, acc.count),
                    questions: questions.into_iter().map(|(_, q)| q).collect(),
                },
            )
        })
        .collect();
    category_out.sort_by(|(sa, a), (sb, b)| sa.cmp(sb).then_with(|| cmp_names(&a.name, &b.name)));

    let mut program_out: Vec<ProgramSummary> = programs
        .into_values()
        .map(|(row, acc)| ProgramSummary {
            program_id: row.program_id.clone(),
            program_name: row.program_name.clone(),
            tally: acc.tally(),
        })
        .collect();
    program_out.sort_by(|a, b| {
        cmp_names(&a.program_name, &b.program_name).then_with(|| a.program_id.cmp(&b.program_id))
    });

    let mut section_out: Vec<SectionSummary> = sections
        .into_values()
        .map(|(row, acc)| SectionSummary {
            section_id: row.section_id.clone(),
            section_name: row.section_name.clone(),
            program_name: row.program_name.clone(),
            tally: acc.tally(),
        })
        .collect();
    section_out.sort_by(|a, b| {
        cmp_names(&a.program_name, &b.program_name)
            .then_with(|| cmp_names(&a.section_name, &b.section_name))
            .then_with(|| a.section_id.cmp(&b.section_id))
    });

    let mut course_out: Vec<CourseSummary> = courses
        .into_values()
        .map(|(row, acc)| CourseSummary {
            course_id: row.course_id.clone(),
            course_code: row.course_code.clone(),
            course_name: row.course_name.clone(),
            section_id: row.section_id.clone(),
            section_name: row.section_name.clone(),
            tally: acc.tally(),
        })
        .collect();
    course_out.sort_by(|a, b| {
        cmp_names(&a.course_code, &b.course_code)
            .then_with(|| cmp_names(&a.section_name, &b.section_name))
            .then_with(|| a.course_id.cmp(&b.course_id))
            .then_with(|| a.section_id.cmp(&b.section_id))
    });

    let overall_tally = overall.tally();
    TeacherSummary {
        teacher_id: teacher.id.clone(),
        faculty_id: teacher.faculty_id.clone(),
        full_name: teacher.full_name.clone(),
        overall_average: overall_tally.average,
        total_score: overall_tally.total_score,
        count: overall_tally.count,
        total_responses: overall_tally.responses,
        students_served: overall_tally.students_served,
        categories: category_out.into_iter().map(|(_, c)| c).collect(),
        programs: program_out,
        sections: section_out,
        courses: course_out,
    }
}

/// Summaries for every listed teacher, in the given order. Teachers without
/// rows get an all-zero summary.
pub fn summarize_teachers(teachers: &[TeacherRef], rows: &[EvaluationRow]) -> Vec<TeacherSummary> {
    let mut by_teacher: HashMap<&str, Vec<&EvaluationRow>> = HashMap::new();
    for row in rows {
        by_teacher.entry(row.teacher_id.as_str()).or_default().push(row);
    }
    teachers
        .iter()
        .map(|t| {
            let rows = by_teacher
                .get(t.id.as_str())
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            summarize_teacher(t, rows)
        })
        .collect()
}

pub fn load_teachers(conn: &Connection, teacher_id: Option<&str>) -> anyhow::Result<Vec<TeacherRef>> {
    let mut sql = String::from("SELECT id, faculty_id, full_name FROM teachers");
    let mut binds: Vec<Value> = Vec::new();
    if let Some(id) = teacher_id {
        sql.push_str(" WHERE id = ?");
        binds.push(Value::Text(id.to_string()));
    }
    sql.push_str(" ORDER BY full_name COLLATE NOCASE, faculty_id");
    let mut stmt = conn.prepare(&sql)?;
    let teachers = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(TeacherRef {
                id: r.get(0)?,
                faculty_id: r.get(1)?,
                full_name: r.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to load teachers")?;
    Ok(teachers)
}

/// Answer rows reachable through each teacher's assignments.
pub fn load_evaluation_rows(
    conn: &Connection,
    teacher_id: Option<&str>,
) -> anyhow::Result<Vec<EvaluationRow>> {
    let mut sql = String::from(
        "SELECT
           r.student_id, r.teacher_id, r.assignment_id,
           q.id, q.text, q.sort_order,
           c.id, c.name, c.sort_order,
           o.value,
           p.id, p.name,
           s.id, s.name,
           co.id, co.code, co.name
         FROM responses r
         JOIN teachers_assigned a ON a.id = r.assignment_id AND a.teacher_id = r.teacher_id
         JOIN questions q ON q.id = r.question_id
         JOIN categories c ON c.id = q.category_id
         JOIN programs p ON p.id = a.program_id
         JOIN sections s ON s.id = a.section_id
         JOIN courses co ON co.id = a.course_id
         LEFT JOIN options o ON o.id = r.option_id",
    );
    let mut binds: Vec<Value> = Vec::new();
    if let Some(id) = teacher_id {
        sql.push_str(" WHERE r.teacher_id = ?");
        binds.push(Value::Text(id.to_string()));
    }
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), |r| {
            Ok(EvaluationRow {
                student_id: r.get(0)?,
                teacher_id: r.get(1)?,
                assignment_id: r.get(2)?,
                question_id: r.get(3)?,
                question_text: r.get(4)?,
                question_sort: r.get(5)?,
                category_id: r.get(6)?,
                category_name: r.get(7)?,
                category_sort: r.get(8)?,
                option_value: r.get(9)?,
                program_id: r.get(10)?,
                program_name: r.get(11)?,
                section_id: r.get(12)?,
                section_name: r.get(13)?,
                course_id: r.get(14)?,
                course_code: r.get(15)?,
                course_name: r.get(16)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("failed to load evaluation rows")?;
    Ok(rows)
}

pub fn all_teacher_summaries(conn: &Connection) -> anyhow::Result<Vec<TeacherSummary>> {
    let teachers = load_teachers(conn, None)?;
    let rows = load_evaluation_rows(conn, None)?;
    Ok(summarize_teachers(&teachers, &rows))
}

pub fn teacher_summary(conn: &Connection, teacher_id: &str) -> anyhow::Result<Option<TeacherSummary>> {
    let teachers = load_teachers(conn, Some(teacher_id))?;
    let Some(teacher) = teachers.first() else {
        return Ok(None);
    };
    let rows = load_evaluation_rows(conn, Some(teacher_id))?;
    let refs: Vec<&EvaluationRow> = rows.iter().collect();
    Ok(Some(summarize_teacher(teacher, &refs)))
}
