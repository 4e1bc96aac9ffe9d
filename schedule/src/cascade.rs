//! Four-stage dependent selection: faculty, course, group, student.
//!
//! `SelectionCascade` is a pure state machine. Every selection returns the
//! `FetchRequest` the caller must run; the result comes back through
//! [`SelectionCascade::apply`]. Each request is tagged with a generation and
//! the parent selections it was issued for. A result whose request is no
//! longer the outstanding one is discarded, so a slow response for an old
//! parent can never populate a stage.
use crate::types::{Course, Faculty, Group, Student};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Faculty,
    Course,
    Group,
    Student,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Faculty, Stage::Course, Stage::Group, Stage::Student];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Stage::Faculty => "faculty",
            Stage::Course => "course",
            Stage::Group => "group",
            Stage::Student => "student",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum StageStatus<T> {
    /// No fetch attempted since the parent was last selected.
    Idle,
    Loading,
    Loaded(Vec<T>),
    Failed(String),
}

impl<T> StageStatus<T> {
    /// Selectable options. Empty unless the stage is loaded.
    pub fn options(&self) -> &[T] {
        match self {
            StageStatus::Loaded(options) => options,
            _ => &[],
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, StageStatus::Loading)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, StageStatus::Loaded(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            StageStatus::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// What a stage fetch asks for, including the parent selections it depends on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageQuery {
    Faculties,
    Courses { faculty_id: u32 },
    Groups { faculty_id: u32, course: u32 },
    Students { group_id: u32 },
}

impl StageQuery {
    pub fn stage(&self) -> Stage {
        match self {
            StageQuery::Faculties => Stage::Faculty,
            StageQuery::Courses { .. } => Stage::Course,
            StageQuery::Groups { .. } => Stage::Group,
            StageQuery::Students { .. } => Stage::Student,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    pub generation: u64,
    pub tenant_id: String,
    pub query: StageQuery,
}

#[derive(Clone, Debug, PartialEq)]
pub enum StageData {
    Faculties(Vec<Faculty>),
    Courses(Vec<Course>),
    Groups(Vec<Group>),
    Students(Vec<Student>),
}

impl StageData {
    fn stage(&self) -> Stage {
        match self {
            StageData::Faculties(_) => Stage::Faculty,
            StageData::Courses(_) => Stage::Course,
            StageData::Groups(_) => Stage::Group,
            StageData::Students(_) => Stage::Student,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FetchOutcome {
    pub request: FetchRequest,
    pub result: Result<StageData, String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Applied {
    Loaded { stage: Stage, len: usize },
    Failed { stage: Stage, message: String },
    Discarded { stage: Stage },
}

/// Selected ids. A field is only set when every field before it is set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub faculty_id: Option<u32>,
    pub course: Option<u32>,
    pub group_id: Option<u32>,
    pub student_id: Option<u32>,
}

/// Result of a completed cascade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStudent {
    pub student_id: u32,
    pub group_name: String,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum CascadeError {
    #[error("{0} options are not loaded")]
    StageNotReady(Stage),
    #[error("{id} is not a loaded {stage} option")]
    UnknownOption { stage: Stage, id: u32 },
    #[error("{0} stage has not failed")]
    NotFailed(Stage),
}

pub struct SelectionCascade {
    tenant_id: String,
    generation: u64,
    pending: Option<FetchRequest>,
    selection: Selection,
    faculties: StageStatus<Faculty>,
    courses: StageStatus<Course>,
    groups: StageStatus<Group>,
    students: StageStatus<Student>,
}

impl SelectionCascade {
    pub fn new(tenant_id: &str) -> Self {
        SelectionCascade {
            tenant_id: tenant_id.to_string(),
            generation: 0,
            pending: None,
            selection: Selection::default(),
            faculties: StageStatus::Idle,
            courses: StageStatus::Idle,
            groups: StageStatus::Idle,
            students: StageStatus::Idle,
        }
    }

    /// Clears every stage and starts over with the faculty list of `tenant_id`.
    pub fn reset(&mut self, tenant_id: &str) -> FetchRequest {
        self.tenant_id = tenant_id.to_string();
        self.clear_from(Stage::Faculty);
        self.issue(StageQuery::Faculties)
    }

    pub fn select_faculty(&mut self, faculty_id: u32) -> Result<FetchRequest, CascadeError> {
        ensure_option(Stage::Faculty, &self.faculties, faculty_id, |f| f.id)?;

        self.clear_from(Stage::Course);
        self.selection.faculty_id = Some(faculty_id);
        Ok(self.issue(StageQuery::Courses { faculty_id }))
    }

    pub fn select_course(&mut self, course: u32) -> Result<FetchRequest, CascadeError> {
        ensure_option(Stage::Course, &self.courses, course, |c| c.course)?;
        let faculty_id = self
            .selection
            .faculty_id
            .ok_or(CascadeError::StageNotReady(Stage::Course))?;

        self.clear_from(Stage::Group);
        self.selection.course = Some(course);
        Ok(self.issue(StageQuery::Groups { faculty_id, course }))
    }

    pub fn select_group(&mut self, group_id: u32) -> Result<FetchRequest, CascadeError> {
        ensure_option(Stage::Group, &self.groups, group_id, |g| g.id)?;

        self.clear_from(Stage::Student);
        self.selection.group_id = Some(group_id);
        Ok(self.issue(StageQuery::Students { group_id }))
    }

    /// Selecting a student completes the cascade.
    pub fn select_student(&mut self, student_id: u32) -> Result<ResolvedStudent, CascadeError> {
        ensure_option(Stage::Student, &self.students, student_id, |s| s.id)?;

        self.selection.student_id = Some(student_id);
        self.completion()
            .ok_or(CascadeError::StageNotReady(Stage::Group))
    }

    /// Re-issues the fetch of a failed stage with its current parent selections.
    pub fn retry(&mut self, stage: Stage) -> Result<FetchRequest, CascadeError> {
        if self.error(stage).is_none() {
            return Err(CascadeError::NotFailed(stage));
        }
        let query = self
            .query_for(stage)
            .ok_or(CascadeError::StageNotReady(stage))?;
        Ok(self.issue(query))
    }

    pub fn apply(&mut self, outcome: FetchOutcome) -> Applied {
        let stage = outcome.request.query.stage();
        if self.pending.as_ref() != Some(&outcome.request) {
            return Applied::Discarded { stage };
        }

        let data = match outcome.result {
            Ok(data) if data.stage() == stage => data,
            Ok(data) => {
                tracing::warn!(%stage, got = %data.stage(), "Fetch returned data for another stage");
                return Applied::Discarded { stage };
            }
            Err(message) => {
                self.pending = None;
                self.set_failed(stage, message.clone());
                return Applied::Failed { stage, message };
            }
        };

        self.pending = None;
        let len = match data {
            StageData::Faculties(list) => store(&mut self.faculties, list),
            StageData::Courses(list) => store(&mut self.courses, list),
            StageData::Groups(list) => store(&mut self.groups, list),
            StageData::Students(list) => store(&mut self.students, list),
        };
        Applied::Loaded { stage, len }
    }

    /// The resolved student once all four stages are selected.
    pub fn completion(&self) -> Option<ResolvedStudent> {
        let student_id = self.selection.student_id?;
        let group_id = self.selection.group_id?;
        if !self.students.is_loaded() {
            return None;
        }
        let group = self.groups.options().iter().find(|g| g.id == group_id)?;

        Some(ResolvedStudent {
            student_id,
            group_name: group.name.clone(),
        })
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn pending(&self) -> Option<&FetchRequest> {
        self.pending.as_ref()
    }

    pub fn faculties(&self) -> &StageStatus<Faculty> {
        &self.faculties
    }

    pub fn courses(&self) -> &StageStatus<Course> {
        &self.courses
    }

    pub fn groups(&self) -> &StageStatus<Group> {
        &self.groups
    }

    pub fn students(&self) -> &StageStatus<Student> {
        &self.students
    }

    pub fn is_loading(&self, stage: Stage) -> bool {
        match stage {
            Stage::Faculty => self.faculties.is_loading(),
            Stage::Course => self.courses.is_loading(),
            Stage::Group => self.groups.is_loading(),
            Stage::Student => self.students.is_loading(),
        }
    }

    pub fn error(&self, stage: Stage) -> Option<&str> {
        match stage {
            Stage::Faculty => self.faculties.error(),
            Stage::Course => self.courses.error(),
            Stage::Group => self.groups.error(),
            Stage::Student => self.students.error(),
        }
    }

    fn query_for(&self, stage: Stage) -> Option<StageQuery> {
        let selection = &self.selection;
        Some(match stage {
            Stage::Faculty => StageQuery::Faculties,
            Stage::Course => StageQuery::Courses {
                faculty_id: selection.faculty_id?,
            },
            Stage::Group => StageQuery::Groups {
                faculty_id: selection.faculty_id?,
                course: selection.course?,
            },
            Stage::Student => StageQuery::Students {
                group_id: selection.group_id?,
            },
        })
    }

    fn issue(&mut self, query: StageQuery) -> FetchRequest {
        self.generation += 1;
        match query.stage() {
            Stage::Faculty => self.faculties = StageStatus::Loading,
            Stage::Course => self.courses = StageStatus::Loading,
            Stage::Group => self.groups = StageStatus::Loading,
            Stage::Student => self.students = StageStatus::Loading,
        }

        let request = FetchRequest {
            generation: self.generation,
            tenant_id: self.tenant_id.clone(),
            query,
        };
        self.pending = Some(request.clone());
        request
    }

    fn set_failed(&mut self, stage: Stage, message: String) {
        match stage {
            Stage::Faculty => self.faculties = StageStatus::Failed(message),
            Stage::Course => self.courses = StageStatus::Failed(message),
            Stage::Group => self.groups = StageStatus::Failed(message),
            Stage::Student => self.students = StageStatus::Failed(message),
        }
    }

    /// Resets `stage` and every stage after it, selection and data.
    fn clear_from(&mut self, stage: Stage) {
        if stage <= Stage::Faculty {
            self.selection.faculty_id = None;
            self.faculties = StageStatus::Idle;
        }
        if stage <= Stage::Course {
            self.selection.course = None;
            self.courses = StageStatus::Idle;
        }
        if stage <= Stage::Group {
            self.selection.group_id = None;
            self.groups = StageStatus::Idle;
        }
        self.selection.student_id = None;
        self.students = StageStatus::Idle;
    }
}

fn ensure_option<T>(
    stage: Stage,
    status: &StageStatus<T>,
    id: u32,
    id_of: impl Fn(&T) -> u32,
) -> Result<(), CascadeError> {
    if !status.is_loaded() {
        return Err(CascadeError::StageNotReady(stage));
    }
    if !status.options().iter().any(|option| id_of(option) == id) {
        return Err(CascadeError::UnknownOption { stage, id });
    }
    Ok(())
}

fn store<T>(status: &mut StageStatus<T>, list: Vec<T>) -> usize {
    let len = list.len();
    *status = StageStatus::Loaded(list);
    len
}
