use crate::cascade::{
    Applied, CascadeError, FetchOutcome, FetchRequest, ResolvedStudent, SelectionCascade, Stage,
    StageData, StageQuery,
};
use crate::client::{ClientError, ScheduleSource};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CascadeEvent {
    Loaded { stage: Stage, len: usize },
    /// Loaded with no options. Not an error.
    Empty { stage: Stage },
    /// `retryable` is false when the gateway does not serve the tenant.
    Failed {
        stage: Stage,
        message: String,
        retryable: bool,
    },
    Discarded { stage: Stage },
}

impl CascadeEvent {
    pub fn stage(&self) -> Stage {
        match self {
            CascadeEvent::Loaded { stage, .. }
            | CascadeEvent::Empty { stage }
            | CascadeEvent::Failed { stage, .. }
            | CascadeEvent::Discarded { stage } => *stage,
        }
    }
}

// A fetch outcome and whether a failure is worth retrying
struct Completed {
    outcome: FetchOutcome,
    retryable: bool,
}

/// Runs the fetches a `SelectionCascade` asks for. Each fetch is spawned and
/// its outcome comes back on a channel, so responses may arrive in any order;
/// the cascade drops the ones that no longer match.
pub struct CascadeController {
    source: Arc<dyn ScheduleSource>,
    cascade: SelectionCascade,
    outcomes_tx: mpsc::UnboundedSender<Completed>,
    outcomes_rx: mpsc::UnboundedReceiver<Completed>,
    in_flight: usize,
}

impl CascadeController {
    /// Starts a cascade for `tenant_id`. The faculty list is requested immediately.
    pub fn new(source: Arc<dyn ScheduleSource>, tenant_id: &str) -> Self {
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let mut controller = CascadeController {
            source,
            cascade: SelectionCascade::new(tenant_id),
            outcomes_tx,
            outcomes_rx,
            in_flight: 0,
        };
        controller.set_tenant(tenant_id);
        controller
    }

    pub fn cascade(&self) -> &SelectionCascade {
        &self.cascade
    }

    /// Hard reset. Every selection is dropped, results for the previous tenant
    /// still in flight are discarded.
    pub fn set_tenant(&mut self, tenant_id: &str) {
        let request = self.cascade.reset(tenant_id);
        self.spawn(request);
    }

    pub fn select_faculty(&mut self, faculty_id: u32) -> Result<(), CascadeError> {
        let request = self.cascade.select_faculty(faculty_id)?;
        self.spawn(request);
        Ok(())
    }

    pub fn select_course(&mut self, course: u32) -> Result<(), CascadeError> {
        let request = self.cascade.select_course(course)?;
        self.spawn(request);
        Ok(())
    }

    pub fn select_group(&mut self, group_id: u32) -> Result<(), CascadeError> {
        let request = self.cascade.select_group(group_id)?;
        self.spawn(request);
        Ok(())
    }

    pub fn select_student(&mut self, student_id: u32) -> Result<ResolvedStudent, CascadeError> {
        self.cascade.select_student(student_id)
    }

    pub fn retry(&mut self, stage: Stage) -> Result<(), CascadeError> {
        let request = self.cascade.retry(stage)?;
        tracing::info!(%stage, "Retrying stage");
        self.spawn(request);
        Ok(())
    }

    /// Applies the next fetch outcome. Returns None when nothing is in flight.
    pub async fn next_event(&mut self) -> Option<CascadeEvent> {
        if self.in_flight == 0 {
            return None;
        }
        let Completed { outcome, retryable } = self.outcomes_rx.recv().await?;
        self.in_flight -= 1;

        let tenant = outcome.request.tenant_id.clone();
        let event = match self.cascade.apply(outcome) {
            Applied::Loaded { stage, len: 0 } => CascadeEvent::Empty { stage },
            Applied::Loaded { stage, len } => CascadeEvent::Loaded { stage, len },
            Applied::Failed { stage, message } => {
                tracing::warn!(%tenant, %stage, error = %message, "Could not load options");
                CascadeEvent::Failed {
                    stage,
                    message,
                    retryable,
                }
            }
            Applied::Discarded { stage } => {
                tracing::debug!(%tenant, %stage, "Discarded stale result");
                CascadeEvent::Discarded { stage }
            }
        };
        Some(event)
    }

    /// Waits until `stage` settles, skipping stale results and other stages.
    pub async fn wait_for(&mut self, stage: Stage) -> Option<CascadeEvent> {
        loop {
            let event = self.next_event().await?;
            if event.stage() == stage && !matches!(event, CascadeEvent::Discarded { .. }) {
                return Some(event);
            }
        }
    }

    // The request is never aborted once issued; a superseded result is
    // simply discarded on arrival. The fetch runs in its own task so that a
    // panic still reports an outcome and `in_flight` stays accurate.
    fn spawn(&mut self, request: FetchRequest) {
        let source = self.source.clone();
        let outcomes_tx = self.outcomes_tx.clone();
        self.in_flight += 1;

        let fetch_request = request.clone();
        let fetch_task =
            tokio::spawn(async move { fetch(source.as_ref(), &fetch_request).await });

        tokio::spawn(async move {
            let (result, retryable) = match fetch_task.await {
                Ok(Ok(data)) => (Ok(data), true),
                Ok(Err(e)) => (Err(e.to_string()), !e.is_resolution_error()),
                Err(e) => (Err(format!("fetch task failed: {e}")), true),
            };
            let _ = outcomes_tx.send(Completed {
                outcome: FetchOutcome { request, result },
                retryable,
            });
        });
    }
}

async fn fetch(
    source: &dyn ScheduleSource,
    request: &FetchRequest,
) -> Result<StageData, ClientError> {
    let tenant_id = request.tenant_id.as_str();
    Ok(match request.query {
        StageQuery::Faculties => StageData::Faculties(source.list_faculties(tenant_id).await?),
        StageQuery::Courses { faculty_id } => {
            StageData::Courses(source.list_courses(tenant_id, faculty_id).await?)
        }
        StageQuery::Groups { faculty_id, course } => {
            StageData::Groups(source.list_groups(tenant_id, course, faculty_id).await?)
        }
        StageQuery::Students { group_id } => {
            StageData::Students(source.list_students(tenant_id, group_id).await?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Course, Faculty, Group, Student, TimetableDay};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    // Course lists encode their faculty (faculty 2 -> course 20) so tests can
    // tell which parent a result was fetched for.
    #[derive(Default)]
    struct FakeSource {
        course_gates: Mutex<HashMap<u32, oneshot::Receiver<()>>>,
        student_failures: AtomicUsize,
        group_calls: AtomicUsize,
        tenants: Mutex<Vec<String>>,
        panicking_courses: AtomicBool,
    }

    impl FakeSource {
        fn gate_courses(&self, faculty_id: u32) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.course_gates.lock().unwrap().insert(faculty_id, rx);
            tx
        }
    }

    #[async_trait]
    impl ScheduleSource for FakeSource {
        async fn list_faculties(&self, tenant_id: &str) -> Result<Vec<Faculty>, ClientError> {
            self.tenants.lock().unwrap().push(tenant_id.to_string());
            if tenant_id == "gone" {
                return Err(ClientError::UnknownTenant {
                    tenant_id: tenant_id.to_string(),
                    message: "tenant 'gone' is not supported".into(),
                });
            }
            Ok([1, 2]
                .into_iter()
                .map(|id| Faculty {
                    id,
                    short_name: format!("F{id}"),
                    full_name: format!("Faculty {id}"),
                })
                .collect())
        }

        async fn list_courses(
            &self,
            _tenant_id: &str,
            faculty_id: u32,
        ) -> Result<Vec<Course>, ClientError> {
            if self.panicking_courses.load(Ordering::SeqCst) {
                panic!("course list for faculty {faculty_id} exploded");
            }
            let gate = self.course_gates.lock().unwrap().remove(&faculty_id);
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(vec![Course {
                course: faculty_id * 10,
            }])
        }

        async fn list_groups(
            &self,
            _tenant_id: &str,
            course_id: u32,
            _faculty_id: u32,
        ) -> Result<Vec<Group>, ClientError> {
            self.group_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                Group {
                    id: 7,
                    name: "КН-21".into(),
                    course: course_id,
                },
                Group {
                    id: 8,
                    name: "КН-22".into(),
                    course: course_id,
                },
            ])
        }

        async fn list_students(
            &self,
            _tenant_id: &str,
            group_id: u32,
        ) -> Result<Vec<Student>, ClientError> {
            if self
                .student_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(ClientError::Status {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    message: "upstream down".into(),
                });
            }
            if group_id == 8 {
                return Ok(vec![]);
            }
            Ok(vec![Student {
                id: 3,
                first_name: "Олена".into(),
                last_name: "Коваль".into(),
                second_name: None,
            }])
        }

        async fn get_timetable(
            &self,
            _tenant_id: &str,
            _student_id: u32,
            _date_start: NaiveDate,
            _date_end: NaiveDate,
        ) -> Result<Vec<TimetableDay>, ClientError> {
            Ok(vec![])
        }
    }

    async fn controller_at_group(source: Arc<FakeSource>) -> CascadeController {
        let mut controller = CascadeController::new(source, "nuzp");
        controller.wait_for(Stage::Faculty).await.unwrap();
        controller.select_faculty(1).unwrap();
        controller.wait_for(Stage::Course).await.unwrap();
        controller.select_course(10).unwrap();
        controller.wait_for(Stage::Group).await.unwrap();
        controller
    }

    #[tokio::test]
    async fn test_cascade_to_completion() {
        let source = Arc::new(FakeSource::default());
        let mut controller = controller_at_group(source).await;

        controller.select_group(7).unwrap();
        assert_eq!(
            controller.wait_for(Stage::Student).await,
            Some(CascadeEvent::Loaded {
                stage: Stage::Student,
                len: 1
            })
        );

        let resolved = controller.select_student(3).unwrap();
        assert_eq!(
            resolved,
            ResolvedStudent {
                student_id: 3,
                group_name: "КН-21".into(),
            }
        );
        assert_eq!(controller.next_event().await, None);
    }

    #[tokio::test]
    async fn test_out_of_order_responses() {
        let source = Arc::new(FakeSource::default());
        let mut controller = CascadeController::new(source.clone(), "nuzp");
        controller.wait_for(Stage::Faculty).await.unwrap();

        let release_first = source.gate_courses(1);
        let release_second = source.gate_courses(2);
        controller.select_faculty(1).unwrap();
        controller.select_faculty(2).unwrap();

        release_second.send(()).unwrap();
        assert_eq!(
            controller.next_event().await,
            Some(CascadeEvent::Loaded {
                stage: Stage::Course,
                len: 1
            })
        );

        // the response for faculty 1 arrives last and must not win
        release_first.send(()).unwrap();
        assert_eq!(
            controller.next_event().await,
            Some(CascadeEvent::Discarded {
                stage: Stage::Course
            })
        );
        assert_eq!(
            controller.cascade().courses().options(),
            &[Course { course: 20 }]
        );
        assert_eq!(controller.cascade().selection().faculty_id, Some(2));
    }

    #[tokio::test]
    async fn test_failed_stage_retry() {
        let source = Arc::new(FakeSource {
            student_failures: AtomicUsize::new(1),
            ..FakeSource::default()
        });
        let mut controller = controller_at_group(source.clone()).await;

        controller.select_group(7).unwrap();
        assert_eq!(
            controller.wait_for(Stage::Student).await,
            Some(CascadeEvent::Failed {
                stage: Stage::Student,
                message: "gateway returned 500 Internal Server Error: upstream down".into(),
                retryable: true,
            })
        );
        assert_eq!(controller.cascade().groups().options().len(), 2);
        assert_eq!(controller.cascade().selection().group_id, Some(7));

        controller.retry(Stage::Student).unwrap();
        assert_eq!(
            controller.wait_for(Stage::Student).await,
            Some(CascadeEvent::Loaded {
                stage: Stage::Student,
                len: 1
            })
        );
        // ancestors are not fetched again
        assert_eq!(source.group_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tenant_is_not_retryable() {
        let source = Arc::new(FakeSource::default());
        let mut controller = CascadeController::new(source, "gone");

        assert_eq!(
            controller.wait_for(Stage::Faculty).await,
            Some(CascadeEvent::Failed {
                stage: Stage::Faculty,
                message: "tenant 'gone' is not supported".into(),
                retryable: false,
            })
        );
        assert_eq!(controller.next_event().await, None);
    }

    #[tokio::test]
    async fn test_panicking_fetch_still_settles() {
        let source = Arc::new(FakeSource::default());
        let mut controller = CascadeController::new(source.clone(), "nuzp");
        controller.wait_for(Stage::Faculty).await.unwrap();

        source.panicking_courses.store(true, Ordering::SeqCst);
        controller.select_faculty(2).unwrap();
        let event = controller.wait_for(Stage::Course).await;
        assert!(
            matches!(
                &event,
                Some(CascadeEvent::Failed { stage: Stage::Course, message, retryable: true })
                    if message.starts_with("fetch task failed")
            ),
            "{event:?}"
        );
        assert_eq!(controller.next_event().await, None);

        source.panicking_courses.store(false, Ordering::SeqCst);
        controller.retry(Stage::Course).unwrap();
        assert_eq!(
            controller.wait_for(Stage::Course).await,
            Some(CascadeEvent::Loaded {
                stage: Stage::Course,
                len: 1
            })
        );
    }

    #[tokio::test]
    async fn test_empty_group() {
        let source = Arc::new(FakeSource::default());
        let mut controller = controller_at_group(source).await;

        controller.select_group(8).unwrap();
        assert_eq!(
            controller.wait_for(Stage::Student).await,
            Some(CascadeEvent::Empty {
                stage: Stage::Student
            })
        );
        assert_eq!(controller.cascade().error(Stage::Student), None);
        assert!(controller.retry(Stage::Student).is_err());
    }

    #[tokio::test]
    async fn test_tenant_change_resets() {
        let source = Arc::new(FakeSource::default());
        let mut controller = controller_at_group(source.clone()).await;

        controller.set_tenant("knu");
        assert_eq!(controller.cascade().selection().faculty_id, None);
        assert!(controller.cascade().courses().options().is_empty());

        controller.wait_for(Stage::Faculty).await.unwrap();
        assert_eq!(controller.cascade().tenant_id(), "knu");
        assert_eq!(
            source.tenants.lock().unwrap().as_slice(),
            &["nuzp".to_string(), "knu".to_string()]
        );
    }
}
