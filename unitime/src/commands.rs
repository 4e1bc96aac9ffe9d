use crate::config::{ClientConfig, ConfigError};
use chrono::NaiveDate;
use clap::Args;
use schedule::cascade::{CascadeError, SelectionCascade, Stage};
use schedule::client::ScheduleSource;
use schedule::controller::{CascadeController, CascadeEvent};
use schedule::state::{AppState, StateError, StateStore, StoreError, Theme};
use schedule::timetable::{
    DateRange, RangeError, TimetableApplied, TimetableLoader, ViewMode, fetch_timetable, render,
};
use shared::tenant::{Tenant, find};
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Arc;

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("gateway error: {0}")]
    Gateway(#[from] gateway::errors::GatewayError),
    #[error("could not access client state: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Cascade(#[from] CascadeError),
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error("the configuration has no gateway section")]
    MissingGatewayConfig,
    #[error("unknown tenant '{0}'")]
    UnknownTenant(String),
    #[error("no student selected, run `unitime select` first")]
    NoStudent,
    #[error("could not load {stage} options: {message}")]
    StageFailed { stage: Stage, message: String },
    #[error("could not load timetable: {0}")]
    Timetable(String),
    #[error("could not set up metrics: {0}")]
    Metrics(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Args, Debug, Default)]
pub struct SelectArgs {
    #[arg(long)]
    pub faculty: Option<u32>,
    /// Year of study
    #[arg(long)]
    pub course: Option<u32>,
    #[arg(long)]
    pub group: Option<u32>,
    #[arg(long)]
    pub student: Option<u32>,
}

#[derive(Args, Debug, Default)]
pub struct TimetableArgs {
    /// First day, YYYY-MM-DD
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// Last day, YYYY-MM-DD
    #[arg(long)]
    pub to: Option<NaiveDate>,
    /// list or grid
    #[arg(long)]
    pub view: Option<ViewMode>,
}

#[derive(Args, Debug, Default)]
pub struct SettingsArgs {
    /// light or dark
    #[arg(long)]
    pub theme: Option<Theme>,
    /// #rgb or #rrggbb
    #[arg(long)]
    pub accent_color: Option<String>,
    /// list or grid
    #[arg(long)]
    pub view: Option<ViewMode>,
}

/// Client commands share the tenant list, the persisted state and the
/// schedule source.
pub struct Session<W> {
    tenants: Vec<Tenant>,
    client: ClientConfig,
    store: Box<dyn StateStore>,
    source: Arc<dyn ScheduleSource>,
    state: AppState,
    out: W,
    /// Asks whether to retry a failed stage. None when not on a terminal.
    prompt: Option<fn(&str) -> io::Result<bool>>,
}

impl<W: Write> Session<W> {
    pub fn new(
        tenants: Vec<Tenant>,
        client: ClientConfig,
        store: Box<dyn StateStore>,
        source: Arc<dyn ScheduleSource>,
        out: W,
    ) -> Result<Self, CliError> {
        let mut state = store
            .load()?
            .unwrap_or_else(|| AppState::new(&client.default_tenant));

        // The stored tenant may have been removed from the configuration
        if find(&tenants, state.tenant_id()).is_none() {
            tracing::warn!(tenant = state.tenant_id(), "Stored tenant is not configured");
            state.set_tenant(&client.default_tenant);
        }

        Ok(Session {
            tenants,
            client,
            store,
            source,
            state,
            out,
            prompt: io::stdin().is_terminal().then_some(confirm as fn(&str) -> io::Result<bool>),
        })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    fn save(&self) -> Result<(), CliError> {
        self.store.store(&self.state)?;
        Ok(())
    }

    pub fn tenants(&mut self) -> Result<(), CliError> {
        for tenant in &self.tenants {
            let marker = if tenant.id == self.state.tenant_id() {
                "*"
            } else {
                " "
            };
            writeln!(
                self.out,
                "{marker} {:<6} {} ({})",
                tenant.id, tenant.display_name, tenant.upstream_url
            )?;
            if let Some(description) = &tenant.description {
                writeln!(self.out, "         {description}")?;
            }
        }
        Ok(())
    }

    pub fn use_tenant(&mut self, tenant_id: &str) -> Result<(), CliError> {
        let tenant = find(&self.tenants, tenant_id)
            .ok_or_else(|| CliError::UnknownTenant(tenant_id.to_string()))?;
        let display_name = tenant.display_name.clone();

        if self.state.set_tenant(tenant_id) {
            self.save()?;
            tracing::info!(tenant = tenant_id, "Switched tenant");
        }
        writeln!(self.out, "Using {display_name}")?;
        Ok(())
    }

    /// Walks the cascade with the ids given. The first stage without an id
    /// has its options printed.
    pub async fn select(&mut self, args: &SelectArgs) -> Result<(), CliError> {
        let mut controller = CascadeController::new(self.source.clone(), self.state.tenant_id());

        if !self.settle(&mut controller, Stage::Faculty).await? {
            return Ok(());
        }
        let Some(faculty_id) = args.faculty else {
            return self.print_options(controller.cascade(), Stage::Faculty);
        };
        controller.select_faculty(faculty_id)?;

        if !self.settle(&mut controller, Stage::Course).await? {
            return Ok(());
        }
        let Some(course) = args.course else {
            return self.print_options(controller.cascade(), Stage::Course);
        };
        controller.select_course(course)?;

        if !self.settle(&mut controller, Stage::Group).await? {
            return Ok(());
        }
        let Some(group_id) = args.group else {
            return self.print_options(controller.cascade(), Stage::Group);
        };
        controller.select_group(group_id)?;

        if !self.settle(&mut controller, Stage::Student).await? {
            return Ok(());
        }
        let Some(student_id) = args.student else {
            return self.print_options(controller.cascade(), Stage::Student);
        };

        let resolved = controller.select_student(student_id)?;
        writeln!(
            self.out,
            "Selected student {} of group {}",
            resolved.student_id, resolved.group_name
        )?;
        self.state.set_student(resolved);
        self.save()
    }

    /// Waits for a stage to load. Returns false when it loaded empty.
    async fn settle(
        &mut self,
        controller: &mut CascadeController,
        stage: Stage,
    ) -> Result<bool, CliError> {
        loop {
            match controller.wait_for(stage).await {
                Some(CascadeEvent::Loaded { .. }) => return Ok(true),
                Some(CascadeEvent::Empty { .. }) => {
                    writeln!(self.out, "No {stage} options available")?;
                    return Ok(false);
                }
                Some(CascadeEvent::Failed {
                    message, retryable, ..
                }) => {
                    eprintln!("Could not load {stage} options: {message}");
                    // An unknown tenant fails the same way until the tenant changes
                    if retryable
                        && let Some(prompt) = self.prompt
                        && prompt("Retry?")?
                    {
                        controller.retry(stage)?;
                        continue;
                    }
                    return Err(CliError::StageFailed { stage, message });
                }
                Some(CascadeEvent::Discarded { .. }) | None => {
                    return Err(CliError::StageFailed {
                        stage,
                        message: "no request in flight".into(),
                    });
                }
            }
        }
    }

    fn print_options(&mut self, cascade: &SelectionCascade, stage: Stage) -> Result<(), CliError> {
        writeln!(self.out, "Choose a {stage} with --{stage}:")?;
        match stage {
            Stage::Faculty => {
                for faculty in cascade.faculties().options() {
                    writeln!(
                        self.out,
                        "  {:>5}  {}  {}",
                        faculty.id, faculty.short_name, faculty.full_name
                    )?;
                }
            }
            Stage::Course => {
                for course in cascade.courses().options() {
                    writeln!(self.out, "  {:>5}", course.course)?;
                }
            }
            Stage::Group => {
                for group in cascade.groups().options() {
                    writeln!(self.out, "  {:>5}  {}", group.id, group.name)?;
                }
            }
            Stage::Student => {
                for student in cascade.students().options() {
                    writeln!(self.out, "  {:>5}  {}", student.id, student.display_name())?;
                }
            }
        }
        Ok(())
    }

    pub async fn timetable(
        &mut self,
        args: &TimetableArgs,
        today: chrono::NaiveDateTime,
    ) -> Result<(), CliError> {
        let student = self.state.student().cloned().ok_or(CliError::NoStudent)?;
        let stored = self.state.effective_range(today);
        // A single bound keeps the length of the stored range
        let range = match (args.from, args.to) {
            (Some(from), Some(to)) => DateRange::new(from, to)?,
            (Some(from), None) => stored.starting_at(from),
            (None, Some(to)) => stored.ending_at(to),
            (None, None) => stored,
        };
        let view = args.view.unwrap_or(self.state.view_mode());

        let mut loader = TimetableLoader::new(self.client.max_range_days);
        let request = loader.request(self.state.tenant_id(), student.student_id, range);
        if request.clamped {
            eprintln!(
                "Ranges are limited to {} days, showing {} to {}",
                self.client.max_range_days,
                request.range.start(),
                request.range.end()
            );
        }

        let result = fetch_timetable(self.source.as_ref(), &request).await;
        match loader.apply(&request, result) {
            TimetableApplied::Loaded { .. } => {}
            TimetableApplied::Failed { message } => return Err(CliError::Timetable(message)),
            TimetableApplied::Discarded => return Ok(()),
        }

        writeln!(
            self.out,
            "{} ({} to {})",
            student.group_name,
            request.range.start(),
            request.range.end()
        )?;
        write!(self.out, "{}", render(loader.days(), view))?;

        self.state.set_date_range(request.range);
        self.state.set_view_mode(view);
        self.save()
    }

    pub fn settings(&mut self, args: &SettingsArgs) -> Result<(), CliError> {
        if let Some(theme) = args.theme {
            self.state.set_theme(theme);
        }
        if let Some(color) = &args.accent_color {
            self.state.set_accent_color(color)?;
        }
        if let Some(view) = args.view {
            self.state.set_view_mode(view);
        }
        self.save()?;

        let theme = match self.state.theme() {
            Theme::Light => "light",
            Theme::Dark => "dark",
        };
        let view = match self.state.view_mode() {
            ViewMode::List => "list",
            ViewMode::Grid => "grid",
        };
        writeln!(self.out, "theme: {theme}")?;
        writeln!(self.out, "accent color: {}", self.state.accent_color())?;
        writeln!(self.out, "view: {view}")?;
        Ok(())
    }
}

fn confirm(question: &str) -> io::Result<bool> {
    eprint!("{question} [y/N] ");
    io::stderr().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
