//! Turns aggregated teacher summaries into printable document models and CSV.
//!
//! The document model is what the admin client lays out as a PDF; pagination
//! happens here so every client prints the same pages.

use serde::Serialize;

use crate::calc::{CategorySummary, GroupTally, TeacherSummary};

const HIGHLIGHT_COUNT: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct ReportOptions {
    /// Line budget per page. Headings and table headers count as one line each.
    pub rows_per_page: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self { rows_per_page: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReportBlock {
    Heading {
        text: String,
    },
    Paragraph {
        text: String,
    },
    KeyValues {
        rows: Vec<(String, String)>,
    },
    Table {
        title: String,
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    List {
        title: String,
        items: Vec<String>,
    },
}

impl ReportBlock {
    fn lines(&self) -> usize {
        match self {
            ReportBlock::Heading { .. } | ReportBlock::Paragraph { .. } => 1,
            ReportBlock::KeyValues { rows } => rows.len().max(1),
            ReportBlock::Table { rows, .. } => rows.len() + 2,
            ReportBlock::List { items, .. } => items.len() + 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPage {
    pub number: usize,
    pub header: String,
    pub footer: String,
    pub blocks: Vec<ReportBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub title: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub page_count: usize,
    pub pages: Vec<ReportPage>,
}

/// Likert wording for an average score.
pub fn rating_label(average: f64) -> &'static str {
    if average >= 4.5 {
        "Outstanding"
    } else if average >= 3.5 {
        "Very Satisfactory"
    } else if average >= 2.5 {
        "Satisfactory"
    } else if average >= 1.5 {
        "Fair"
    } else if average > 0.0 {
        "Poor"
    } else {
        "No Rating"
    }
}

pub fn format_average(average: f64) -> String {
    format!("{:.2}", average)
}

/// Top categories by average (descending) and bottom categories (ascending).
/// Categories without answers take no part.
pub fn highlights(categories: &[CategorySummary]) -> (Vec<&CategorySummary>, Vec<&CategorySummary>) {
    let mut rated: Vec<&CategorySummary> = categories.iter().filter(|c| c.count > 0).collect();

    rated.sort_by(|a, b| {
        b.average
            .total_cmp(&a.average)
            .then_with(|| a.name.cmp(&b.name))
    });
    let strengths: Vec<&CategorySummary> = rated.iter().copied().take(HIGHLIGHT_COUNT).collect();

    rated.sort_by(|a, b| {
        a.average
            .total_cmp(&b.average)
            .then_with(|| a.name.cmp(&b.name))
    });
    let improvements: Vec<&CategorySummary> = rated.into_iter().take(HIGHLIGHT_COUNT).collect();

    (strengths, improvements)
}

fn highlight_item(c: &CategorySummary) -> String {
    format!(
        "{}: {} ({})",
        c.name,
        format_average(c.average),
        rating_label(c.average)
    )
}

fn tally_cells(t: &GroupTally) -> Vec<String> {
    vec![
        t.responses.to_string(),
        t.students_served.to_string(),
        t.count.to_string(),
        format_average(t.average),
        rating_label(t.average).to_string(),
    ]
}

fn tally_columns(leading: &[&str]) -> Vec<String> {
    leading
        .iter()
        .chain(["Responses", "Students", "Answers", "Average", "Rating"].iter())
        .map(|s| s.to_string())
        .collect()
}

struct Paginator {
    budget: usize,
    used: usize,
    header: String,
    pages: Vec<Vec<ReportBlock>>,
}

impl Paginator {
    fn new(budget: usize, header: String) -> Self {
        Self {
            budget: budget.max(3),
            used: 0,
            header,
            pages: vec![Vec::new()],
        }
    }

    fn break_page(&mut self) {
        if self.pages.last().map(|p| !p.is_empty()).unwrap_or(false) {
            self.pages.push(Vec::new());
            self.used = 0;
        }
    }

    fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.used)
    }

    fn push(&mut self, block: ReportBlock) {
        if let ReportBlock::Table {
            title,
            columns,
            rows,
        } = block
        {
            self.push_table(title, columns, rows);
            return;
        }
        if let ReportBlock::List { title, items } = block {
            self.push_list(title, items);
            return;
        }
        let lines = block.lines();
        if lines > self.remaining() {
            self.break_page();
        }
        self.used += lines;
        if let Some(page) = self.pages.last_mut() {
            page.push(block);
        }
    }

    /// Splits tables across pages; continuation chunks repeat the header row.
    fn push_table(&mut self, title: String, columns: Vec<String>, rows: Vec<Vec<String>>) {
        // A table needs its title, header and at least one row on a page.
        if self.remaining() < 3 {
            self.break_page();
        }
        let mut rest = rows;
        let mut first = true;
        loop {
            if !first {
                self.break_page();
            }
            let fit = self.remaining().saturating_sub(2).max(1);
            let tail = if rest.len() > fit {
                rest.split_off(fit)
            } else {
                Vec::new()
            };
            let chunk_title = if first {
                title.clone()
            } else {
                format!("{} (continued)", title)
            };
            let block = ReportBlock::Table {
                title: chunk_title,
                columns: columns.clone(),
                rows: rest,
            };
            self.used += block.lines();
            if let Some(page) = self.pages.last_mut() {
                page.push(block);
            }
            if tail.is_empty() {
                break;
            }
            rest = tail;
            first = false;
        }
    }

    fn push_list(&mut self, title: String, items: Vec<String>) {
        if self.remaining() < 2 || (items.len() + 1 > self.remaining() && items.len() < self.budget)
        {
            self.break_page();
        }
        let mut rest = items;
        let mut first = true;
        loop {
            if !first {
                self.break_page();
            }
            let fit = self.remaining().saturating_sub(1).max(1);
            let tail = if rest.len() > fit {
                rest.split_off(fit)
            } else {
                Vec::new()
            };
            let block = ReportBlock::List {
                title: if first {
                    title.clone()
                } else {
                    format!("{} (continued)", title)
                },
                items: rest,
            };
            self.used += block.lines();
            if let Some(page) = self.pages.last_mut() {
                page.push(block);
            }
            if tail.is_empty() {
                break;
            }
            rest = tail;
            first = false;
        }
    }

    fn finish(self) -> Vec<ReportPage> {
        let pages: Vec<Vec<ReportBlock>> =
            self.pages.into_iter().filter(|p| !p.is_empty()).collect();
        let total = pages.len();
        pages
            .into_iter()
            .enumerate()
            .map(|(i, blocks)| ReportPage {
                number: i + 1,
                header: self.header.clone(),
                footer: format!("Page {} of {}", i + 1, total),
                blocks,
            })
            .collect()
    }
}

pub fn render_teacher_report(
    summary: &TeacherSummary,
    suggestions: &[String],
    options: &ReportOptions,
) -> ReportDocument {
    let title = format!("Instructor Evaluation Report: {}", summary.full_name);
    let mut pager = Paginator::new(options.rows_per_page, title.clone());

    pager.push(ReportBlock::Heading {
        text: "Overview".to_string(),
    });
    pager.push(ReportBlock::KeyValues {
        rows: vec![
            ("Instructor".to_string(), summary.full_name.clone()),
            ("Faculty ID".to_string(), summary.faculty_id.clone()),
            (
                "Overall Average".to_string(),
                format_average(summary.overall_average),
            ),
            (
                "Rating".to_string(),
                rating_label(summary.overall_average).to_string(),
            ),
            (
                "Evaluations Received".to_string(),
                summary.total_responses.to_string(),
            ),
            (
                "Students Served".to_string(),
                summary.students_served.to_string(),
            ),
        ],
    });

    if summary.count == 0 {
        pager.push(ReportBlock::Paragraph {
            text: "No evaluations have been submitted for this instructor.".to_string(),
        });
    }

    let (strengths, improvements) = highlights(&summary.categories);
    if !strengths.is_empty() {
        pager.push(ReportBlock::List {
            title: "Strengths".to_string(),
            items: strengths.into_iter().map(highlight_item).collect(),
        });
        pager.push(ReportBlock::List {
            title: "Areas for Improvement".to_string(),
            items: improvements.into_iter().map(highlight_item).collect(),
        });
    }

    if !summary.programs.is_empty() {
        pager.break_page();
        pager.push(ReportBlock::Table {
            title: "By Program".to_string(),
            columns: tally_columns(&["Program"]),
            rows: summary
                .programs
                .iter()
                .map(|p| {
                    let mut row = vec![p.program_name.clone()];
                    row.extend(tally_cells(&p.tally));
                    row
                })
                .collect(),
        });
        pager.push(ReportBlock::Table {
            title: "By Section".to_string(),
            columns: tally_columns(&["Program", "Section"]),
            rows: summary
                .sections
                .iter()
                .map(|s| {
                    let mut row = vec![s.program_name.clone(), s.section_name.clone()];
                    row.extend(tally_cells(&s.tally));
                    row
                })
                .collect(),
        });
        pager.push(ReportBlock::Table {
            title: "By Course".to_string(),
            columns: tally_columns(&["Course", "Title", "Section"]),
            rows: summary
                .courses
                .iter()
                .map(|c| {
                    let mut row = vec![
                        c.course_code.clone(),
                        c.course_name.clone(),
                        c.section_name.clone(),
                    ];
                    row.extend(tally_cells(&c.tally));
                    row
                })
                .collect(),
        });
    }

    if !summary.categories.is_empty() {
        pager.break_page();
        pager.push(ReportBlock::Table {
            title: "By Category".to_string(),
            columns: ["Category", "Answers", "Average", "Rating"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rows: summary
                .categories
                .iter()
                .map(|c| {
                    vec![
                        c.name.clone(),
                        c.count.to_string(),
                        format_average(c.average),
                        rating_label(c.average).to_string(),
                    ]
                })
                .collect(),
        });
        for c in &summary.categories {
            pager.push(ReportBlock::Table {
                title: c.name.clone(),
                columns: ["Question", "Answers", "Average", "Rating"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                rows: c
                    .questions
                    .iter()
                    .map(|q| {
                        vec![
                            q.text.clone(),
                            q.count.to_string(),
                            format_average(q.average),
                            rating_label(q.average).to_string(),
                        ]
                    })
                    .collect(),
            });
        }
    }

    if !suggestions.is_empty() {
        pager.break_page();
        pager.push(ReportBlock::List {
            title: "Student Suggestions".to_string(),
            items: suggestions.to_vec(),
        });
    }

    let pages = pager.finish();
    ReportDocument {
        title,
        teacher_id: summary.teacher_id.clone(),
        teacher_name: summary.full_name.clone(),
        page_count: pages.len(),
        pages,
    }
}

pub fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

fn csv_line(fields: &[String]) -> String {
    let mut line = fields
        .iter()
        .map(|f| csv_quote(f))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

/// One row per teacher.
pub fn summaries_csv(summaries: &[TeacherSummary]) -> String {
    let mut out = csv_line(&[
        "facultyId".to_string(),
        "fullName".to_string(),
        "overallAverage".to_string(),
        "rating".to_string(),
        "totalResponses".to_string(),
        "studentsServed".to_string(),
        "answerCount".to_string(),
    ]);
    for s in summaries {
        out.push_str(&csv_line(&[
            s.faculty_id.clone(),
            s.full_name.clone(),
            format_average(s.overall_average),
            rating_label(s.overall_average).to_string(),
            s.total_responses.to_string(),
            s.students_served.to_string(),
            s.count.to_string(),
        ]));
    }
    out
}

/// Category and question breakdown for one teacher. Category total rows use
/// an empty question column.
pub fn teacher_breakdown_csv(summary: &TeacherSummary) -> String {
    let mut out = csv_line(&[
        "category".to_string(),
        "question".to_string(),
        "totalScore".to_string(),
        "count".to_string(),
        "average".to_string(),
        "rating".to_string(),
    ]);
    for c in &summary.categories {
        out.push_str(&csv_line(&[
            c.name.clone(),
            String::new(),
            c.total_score.to_string(),
            c.count.to_string(),
            format_average(c.average),
            rating_label(c.average).to_string(),
        ]));
        for q in &c.questions {
            out.push_str(&csv_line(&[
                c.name.clone(),
                q.text.clone(),
                q.total_score.to_string(),
                q.count.to_string(),
                format_average(q.average),
                rating_label(q.average).to_string(),
            ]));
        }
    }
    out
}
