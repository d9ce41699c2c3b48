use anyhow::Result;
use async_trait::async_trait;
use coco_onboard::{
    CompletionGateway, CompletionOutcome, CompletionUi, DependentSelectorChain, Destination,
    DeviceLocation, FetchOutcome, FieldRule, FieldValue, FlowKind, GatewayResult, GeoLevel, Language,
    LoadState, MediaCapture, MediaHandle, MediaSource, Notice, PaymentGateway, PaymentRequest,
    Position, SeedReport, Transition, ValidationError, WizardController, POSTAL_CODE_FIELD,
};
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

// ============================================================================
// EVENTS
// ============================================================================

pub enum AppEvent {
    Key(KeyEvent),
    ConfirmFee {
        amount: f64,
        currency: String,
        reply: oneshot::Sender<bool>,
    },
    Pay {
        request: PaymentRequest,
        reply: oneshot::Sender<GatewayResult>,
    },
    Notice(Notice),
    Navigate(Destination),
    Fetched(FetchOutcome),
    Seeded(SeedReport),
    Completed(CompletionOutcome),
}

pub type EventSender = mpsc::UnboundedSender<AppEvent>;

/// Completion prompts routed to the event loop
pub struct ChannelUi {
    events: EventSender,
}

impl ChannelUi {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }
}

#[async_trait]
impl CompletionUi for ChannelUi {
    async fn confirm_fee(&self, amount: f64, currency: &str) -> bool {
        let (reply, answer) = oneshot::channel();
        let request = AppEvent::ConfirmFee {
            amount,
            currency: currency.to_string(),
            reply,
        };
        if self.events.send(request).is_err() {
            return false;
        }
        answer.await.unwrap_or(false)
    }

    fn notify(&self, notice: Notice) {
        let _ = self.events.send(AppEvent::Notice(notice));
    }

    fn navigate(&self, destination: Destination) {
        let _ = self.events.send(AppEvent::Navigate(destination));
    }
}

/// Stand-in payment sheet: the operator picks the gateway result
pub struct PromptPaymentGateway {
    events: EventSender,
}

impl PromptPaymentGateway {
    pub fn new(events: EventSender) -> Self {
        Self { events }
    }
}

#[async_trait]
impl PaymentGateway for PromptPaymentGateway {
    async fn open(&self, request: &PaymentRequest) -> GatewayResult {
        let (reply, answer) = oneshot::channel();
        let prompt = AppEvent::Pay {
            request: request.clone(),
            reply,
        };
        if self.events.send(prompt).is_err() {
            return GatewayResult::Cancelled;
        }
        // A dropped prompt counts as the user closing the sheet
        answer.await.unwrap_or(GatewayResult::Cancelled)
    }

    fn method_name(&self) -> &str {
        "manual"
    }
}

/// Attaches a file typed into the terminal
pub struct TypedPathCapture {
    path: PathBuf,
}

#[async_trait]
impl MediaCapture for TypedPathCapture {
    async fn capture(&self, _source: MediaSource) -> coco_onboard::Result<Option<MediaHandle>> {
        if self.path.as_os_str().is_empty() {
            return Ok(None);
        }
        match tokio::fs::metadata(&self.path).await {
            Ok(meta) if meta.is_file() => Ok(Some(MediaHandle::from_path(self.path.clone()))),
            Ok(_) => Err(coco_onboard::WizardError::Validation(format!(
                "{} is not a file",
                self.path.display()
            ))),
            Err(e) => Err(coco_onboard::WizardError::Validation(format!(
                "{}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

// ============================================================================
// APP STATE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum FieldKind {
    Text,
    Choice(Vec<&'static str>),
    Media,
    Geo(GeoLevel),
}

enum Modal {
    ConfirmFee {
        amount: f64,
        currency: String,
        reply: oneshot::Sender<bool>,
    },
    Pay {
        request: PaymentRequest,
        reply: oneshot::Sender<GatewayResult>,
    },
}

pub struct App {
    pub flow: FlowKind,
    pub wizard: WizardController,
    pub chain: Arc<DependentSelectorChain>,
    pub gateway: Arc<CompletionGateway>,
    pub language: Language,
    location: Option<Arc<dyn DeviceLocation>>,
    events: EventSender,
    cursor: usize,
    /// Highlighted option per geo level
    highlight: HashMap<GeoLevel, usize>,
    /// Typed paths for media fields
    paths: HashMap<&'static str, String>,
    modal: Option<Modal>,
    errors: Vec<ValidationError>,
    status: String,
    destination: Option<Destination>,
    quit: bool,
}

impl App {
    pub fn new(
        flow: FlowKind,
        wizard: WizardController,
        chain: Arc<DependentSelectorChain>,
        gateway: Arc<CompletionGateway>,
        language: Language,
        location: Option<Arc<dyn DeviceLocation>>,
        events: EventSender,
    ) -> Self {
        Self {
            flow,
            wizard,
            chain,
            gateway,
            language,
            location,
            events,
            cursor: 0,
            highlight: HashMap::new(),
            paths: HashMap::new(),
            modal: None,
            errors: Vec::new(),
            status: String::from("Tab: next · Shift+Tab: back · F1-F9: jump · Esc: quit"),
            destination: None,
            quit: false,
        }
    }

    fn current_fields(&self) -> Vec<&'static str> {
        self.wizard
            .current_step()
            .map(|s| s.fields.clone())
            .unwrap_or_default()
    }

    fn field_kind(&self, field: &str) -> FieldKind {
        if let Some(level) = GeoLevel::ALL.iter().find(|l| l.field_id() == field) {
            return FieldKind::Geo(*level);
        }
        let Some(step) = self.wizard.current_step() else {
            return FieldKind::Text;
        };
        match self.wizard.gate().rule_for(step.id, field) {
            Some(FieldRule::OneOf(choices)) => FieldKind::Choice(choices.clone()),
            Some(FieldRule::MediaAttached) => FieldKind::Media,
            _ => FieldKind::Text,
        }
    }

    fn focused(&self) -> Option<(&'static str, FieldKind)> {
        let field = *self.current_fields().get(self.cursor)?;
        Some((field, self.field_kind(field)))
    }

    fn spawn_fetch(&self, ticket: coco_onboard::selector::FetchTicket) {
        let chain = self.chain.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = chain.fetch(ticket).await;
            let _ = events.send(AppEvent::Fetched(outcome));
        });
    }

    /// Load the state list, seeding from the device fix when there is one
    pub fn start(&self) {
        let Some(location) = self.location.clone() else {
            let ticket = self.chain.begin_root_load();
            self.spawn_fetch(ticket);
            return;
        };

        let chain = self.chain.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let report = chain.seed_from_device(location.as_ref()).await;
            if chain.options(GeoLevel::State).is_empty() {
                let outcome = chain.load_root().await;
                let _ = events.send(AppEvent::Fetched(outcome));
            }
            let _ = events.send(AppEvent::Seeded(report));
        });
    }

    /// Only flows that ask for a pincode get one prefilled
    fn prefill_postal_code(&mut self, fallback: Option<&str>) {
        let asks = self
            .wizard
            .session()
            .steps()
            .iter()
            .any(|s| s.fields.contains(&POSTAL_CODE_FIELD));
        if asks && self.chain.prefill_postal_code(self.wizard.fields_mut(), fallback) {
            debug!("pincode prefilled");
        }
    }

    // ------------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------------

    fn next(&mut self) {
        match self.wizard.go_next() {
            Transition::Blocked(errors) => {
                self.status = format!("{} field(s) need attention", errors.len());
                self.errors = errors;
            }
            Transition::Moved { to, .. } => self.arrived(to),
            Transition::Completing => {
                self.errors.clear();
                self.status = String::from("Submitting registration...");
                let gateway = self.gateway.clone();
                let fields = self.wizard.submission_fields();
                let events = self.events.clone();
                tokio::spawn(async move {
                    let outcome = gateway.complete(&fields).await;
                    let _ = events.send(AppEvent::Completed(outcome));
                });
            }
            Transition::AlreadyCompleted => {
                self.status = String::from("Already registered");
            }
            Transition::Ignored => {}
        }
    }

    fn back(&mut self) {
        if let Transition::Moved { to, .. } = self.wizard.go_back() {
            self.arrived(to);
        }
    }

    fn jump(&mut self, index: usize) {
        let Some(target) = self.wizard.session().visited().get(index).copied() else {
            return;
        };
        if let Transition::Moved { to, .. } = self.wizard.jump_to(target) {
            self.arrived(to);
        }
    }

    fn arrived(&mut self, step: &'static str) {
        debug!(step, "step shown");
        self.cursor = 0;
        self.errors.clear();
        self.status.clear();
    }

    // ------------------------------------------------------------------------
    // Field editing
    // ------------------------------------------------------------------------

    fn type_char(&mut self, c: char) {
        let Some((field, kind)) = self.focused() else {
            return;
        };
        match kind {
            FieldKind::Text => {
                let mut text = self.wizard.fields().text(field).unwrap_or_default();
                text.push(c);
                self.wizard.fields_mut().set_text(field, text);
            }
            FieldKind::Media => self.paths.entry(field).or_default().push(c),
            FieldKind::Choice(_) | FieldKind::Geo(_) => {}
        }
    }

    fn backspace(&mut self) {
        let Some((field, kind)) = self.focused() else {
            return;
        };
        match kind {
            FieldKind::Text => {
                let mut text = self.wizard.fields().text(field).unwrap_or_default();
                text.pop();
                self.wizard.fields_mut().set_text(field, text);
            }
            FieldKind::Media => {
                if let Some(path) = self.paths.get_mut(field) {
                    path.pop();
                }
            }
            FieldKind::Choice(_) | FieldKind::Geo(_) => {}
        }
    }

    fn cycle(&mut self, forward: bool) {
        let Some((field, kind)) = self.focused() else {
            return;
        };
        match kind {
            FieldKind::Choice(choices) => {
                let current = self.wizard.fields().text(field);
                let at = current
                    .and_then(|c| choices.iter().position(|choice| *choice == c))
                    .map(|i| step_index(i, choices.len(), forward))
                    .unwrap_or(0);
                self.wizard.fields_mut().set_choice(field, choices[at]);
            }
            FieldKind::Geo(level) => {
                let len = self.chain.options(level).len();
                if len == 0 {
                    return;
                }
                let entry = self.highlight.entry(level).or_insert(0);
                *entry = step_index(*entry, len, forward);
            }
            FieldKind::Text | FieldKind::Media => {}
        }
    }

    async fn commit(&mut self) {
        let Some((field, kind)) = self.focused() else {
            return;
        };
        match kind {
            FieldKind::Geo(level) => self.select_geo(level),
            FieldKind::Media => {
                let path = self.paths.get(field).cloned().unwrap_or_default();
                let capture = TypedPathCapture { path: PathBuf::from(path.trim()) };
                match capture.capture(MediaSource::Gallery).await {
                    Ok(Some(handle)) => {
                        self.status = format!("Attached {} ({})", handle.file_name(), handle.mime);
                        self.wizard.set_field(field, FieldValue::Media(handle));
                    }
                    Ok(None) => {}
                    Err(e) => self.status = e.to_string(),
                }
            }
            FieldKind::Text | FieldKind::Choice(_) => self.cursor_down(),
        }
    }

    fn select_geo(&mut self, level: GeoLevel) {
        let options = self.chain.options(level);
        let index = self.highlight.get(&level).copied().unwrap_or(0);
        let Some(option) = options.get(index) else {
            return;
        };

        match self.chain.begin_select(level, &option.id) {
            Ok(ticket) => {
                for child in level.descendants() {
                    self.highlight.remove(child);
                }
                self.chain.write_to_fields(self.wizard.fields_mut());
                if level == GeoLevel::Village {
                    self.prefill_postal_code(None);
                }
                if let Some(ticket) = ticket {
                    self.spawn_fetch(ticket);
                }
            }
            Err(e) => self.status = e.to_string(),
        }
    }

    fn refresh_geo(&mut self) {
        if let Some((_, FieldKind::Geo(level))) = self.focused() {
            match self.chain.begin_refresh(level) {
                Some(ticket) => self.spawn_fetch(ticket),
                None => self.status = format!("Select a {} first", level.parent().map(|p| p.as_str()).unwrap_or("parent")),
            }
        }
    }

    fn cursor_down(&mut self) {
        let len = self.current_fields().len();
        if len > 0 {
            self.cursor = (self.cursor + 1).min(len - 1);
        }
    }

    fn cursor_up(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    // ------------------------------------------------------------------------
    // Event handling
    // ------------------------------------------------------------------------

    pub async fn handle(&mut self, event: AppEvent) {
        match event {
            AppEvent::Key(key) => self.handle_key(key).await,
            AppEvent::ConfirmFee { amount, currency, reply } => {
                self.modal = Some(Modal::ConfirmFee { amount, currency, reply });
            }
            AppEvent::Pay { request, reply } => {
                self.modal = Some(Modal::Pay { request, reply });
            }
            AppEvent::Notice(notice) => self.status = notice_text(&notice),
            AppEvent::Navigate(destination) => self.destination = Some(destination),
            AppEvent::Fetched(outcome) => {
                self.chain.write_to_fields(self.wizard.fields_mut());
                match outcome {
                    FetchOutcome::Failed { level, message } => {
                        self.status = format!("Could not load {} list: {} (Ctrl+R to retry)", level, message);
                    }
                    FetchOutcome::Stale { level, epoch } => debug!(%level, epoch, "stale list discarded"),
                    FetchOutcome::Applied { .. } | FetchOutcome::NoChild => {}
                }
            }
            AppEvent::Seeded(report) => {
                self.chain.write_to_fields(self.wizard.fields_mut());
                self.prefill_postal_code(report.postal_code.as_deref());
                if !report.matched.is_empty() {
                    let levels: Vec<&str> = report.matched.iter().map(|l| l.as_str()).collect();
                    self.status = format!("Prefilled {} from your location", levels.join(", "));
                }
            }
            AppEvent::Completed(outcome) => {
                let succeeded = outcome.is_registered() || outcome == CompletionOutcome::AlreadyCompleted;
                self.wizard.finish_completion(succeeded);
                if let CompletionOutcome::Registered { registration_id, .. } = &outcome {
                    self.status = format!("Registered as farmer #{}", registration_id);
                }
            }
        }
    }

    async fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if let Some(modal) = self.modal.take() {
            self.answer_modal(modal, key.code);
            return;
        }

        match key.code {
            KeyCode::Esc => self.quit = true,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => self.quit = true,
            KeyCode::Char('r') if key.modifiers.contains(KeyModifiers::CONTROL) => self.refresh_geo(),
            KeyCode::Tab => self.next(),
            KeyCode::BackTab => self.back(),
            KeyCode::F(n) if (1..=9).contains(&n) => self.jump(n as usize - 1),
            KeyCode::Down => self.cursor_down(),
            KeyCode::Up => self.cursor_up(),
            KeyCode::Left => self.cycle(false),
            KeyCode::Right => self.cycle(true),
            KeyCode::Enter => self.commit().await,
            KeyCode::Backspace => self.backspace(),
            KeyCode::Char(c) => self.type_char(c),
            _ => {}
        }
    }

    fn answer_modal(&mut self, modal: Modal, code: KeyCode) {
        match modal {
            Modal::ConfirmFee { amount, currency, reply } => match code {
                KeyCode::Char('y') | KeyCode::Enter => {
                    let _ = reply.send(true);
                }
                KeyCode::Char('n') | KeyCode::Esc => {
                    let _ = reply.send(false);
                }
                _ => self.modal = Some(Modal::ConfirmFee { amount, currency, reply }),
            },
            Modal::Pay { request, reply } => {
                let result = match code {
                    KeyCode::Char('s') => GatewayResult::Success {
                        transaction_id: format!("pay_{}", uuid::Uuid::new_v4().simple()),
                    },
                    KeyCode::Char('f') => GatewayResult::Failed {
                        transaction_id: None,
                        reason: "Declined at payment sheet".to_string(),
                    },
                    KeyCode::Char('c') | KeyCode::Esc => GatewayResult::Cancelled,
                    _ => {
                        self.modal = Some(Modal::Pay { request, reply });
                        return;
                    }
                };
                let _ = reply.send(result);
            }
        }
    }
}

fn step_index(i: usize, len: usize, forward: bool) -> usize {
    if forward {
        (i + 1) % len
    } else if i == 0 {
        len - 1
    } else {
        i - 1
    }
}

fn notice_text(notice: &Notice) -> String {
    match notice {
        Notice::PaymentCancelled => "Payment cancelled. Registration not submitted.".to_string(),
        Notice::PaymentFailed(reason) => format!("Payment failed: {}. Registering anyway.", reason),
        Notice::RegistrationFailed(reason) => format!("Registration failed: {}", reason),
    }
}

// ============================================================================
// TERMINAL LOOP
// ============================================================================

pub async fn run_ui(app: &mut App, mut events: mpsc::UnboundedReceiver<AppEvent>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    spawn_key_reader(app.events.clone());
    app.start();

    // Run the app
    let res = run_app(&mut terminal, app, &mut events).await;

    app.chain.teardown();

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

/// Blocking crossterm reads on a plain thread, forwarded to the loop
fn spawn_key_reader(events: EventSender) {
    std::thread::spawn(move || loop {
        match event::read() {
            Ok(Event::Key(key)) => {
                if events.send(AppEvent::Key(key)).is_err() {
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "terminal input closed");
                return;
            }
        }
    });
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    events: &mut mpsc::UnboundedReceiver<AppEvent>,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        let Some(event) = events.recv().await else {
            return Ok(());
        };
        app.handle(event).await;

        if app.quit {
            return Ok(());
        }
    }
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with visited steps
            Constraint::Min(0),    // Current step
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);
    match app.wizard.session().position() {
        Position::Completed => render_done(f, chunks[1], app),
        _ => render_step(f, chunks[1], app),
    }
    render_status(f, chunks[2], app);

    if let Some(modal) = &app.modal {
        render_modal(f, modal);
    }
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let session = app.wizard.session();
    let current = app.wizard.current_step().map(|s| s.id);

    let mut spans = vec![Span::styled(
        format!(" {} ", app.flow.title()),
        Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
    )];
    for (i, id) in session.visited().iter().copied().enumerate() {
        let title = session.step(id).map(|s| s.title).unwrap_or(id);
        let style = if Some(id) == current {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else if app.wizard.can_jump_to(id) {
            Style::default().fg(Color::White)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        spans.push(Span::raw(" › "));
        spans.push(Span::styled(format!("F{} {}", i + 1, title), style));
    }

    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn render_step(f: &mut Frame, area: Rect, app: &App) {
    let Some(step) = app.wizard.current_step() else {
        return;
    };
    let fields = app.wizard.fields();
    let selection = app.chain.snapshot();
    let mut lines = Vec::new();

    if step.fields.is_empty() {
        // Review step: show everything collected so far
        for (field, value) in fields.iter() {
            lines.push(Line::from(vec![
                Span::styled(format!("{:<20}", field), Style::default().fg(Color::Cyan)),
                Span::raw(truncate(&display_value(value), 60)),
            ]));
        }
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            "Press Tab to submit",
            Style::default().fg(Color::Yellow),
        )));
    }

    for (i, field) in step.fields.iter().enumerate() {
        let focused = i == app.cursor;
        let marker = if focused { "▶ " } else { "  " };
        let label_style = if app.errors.iter().any(|e| e.field == *field) {
            Style::default().fg(Color::Red)
        } else if focused {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Cyan)
        };

        let value = match app.field_kind(field) {
            FieldKind::Geo(level) => {
                let state = selection.level(level);
                let chosen = state
                    .selected_option()
                    .map(|o| o.label(app.language).to_string())
                    .unwrap_or_else(|| "-".to_string());
                let load = match &state.load {
                    LoadState::Loading => " (loading...)".to_string(),
                    LoadState::Error(e) => format!(" (error: {})", truncate(e, 30)),
                    LoadState::Idle | LoadState::Loaded => String::new(),
                };
                let browsing = if focused {
                    let index = app.highlight.get(&level).copied().unwrap_or(0);
                    state
                        .options
                        .get(index)
                        .map(|o| format!("  ◀ {} ▶ [{}/{}]", o.label(app.language), index + 1, state.options.len()))
                        .unwrap_or_default()
                } else {
                    String::new()
                };
                format!("{}{}{}", chosen, load, browsing)
            }
            FieldKind::Media => match fields.get(field) {
                Some(FieldValue::Media(handle)) => format!("📎 {}", handle.file_name()),
                _ => format!("path: {}", app.paths.get(field).map(String::as_str).unwrap_or("")),
            },
            FieldKind::Choice(choices) => {
                let chosen = fields.text(field).unwrap_or_else(|| "-".to_string());
                format!("◀ {} ▶  ({})", chosen, choices.join("/"))
            }
            FieldKind::Text => fields.text(field).unwrap_or_default(),
        };

        lines.push(Line::from(vec![
            Span::raw(marker),
            Span::styled(format!("{:<20}", field), label_style),
            Span::raw(value),
        ]));
    }

    if !app.errors.is_empty() {
        lines.push(Line::from(""));
        for error in &app.errors {
            lines.push(Line::from(Span::styled(
                format!("  ✗ {}: {}", error.field, error.message),
                Style::default().fg(Color::Red),
            )));
        }
    }

    let title = format!(" {} ", step.title);
    let body = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });
    f.render_widget(body, area);
}

fn render_done(f: &mut Frame, area: Rect, app: &App) {
    let destination = match app.destination {
        Some(Destination::FarmerHome) => "Farmer home",
        Some(Destination::AggregatorHome) => "Aggregator home",
        Some(Destination::SignIn) | None => "Sign in",
    };
    let lines = vec![
        Line::from(Span::styled(
            "✅ Registration complete",
            Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("Next screen: {}", destination)),
        Line::from("Shift+Tab reopens the review step · Esc quits"),
    ];
    let body = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" Done "));
    f.render_widget(body, area);
}

fn render_status(f: &mut Frame, area: Rect, app: &App) {
    let next = if app.wizard.can_go_next() {
        Span::styled(" Next ✓ ", Style::default().fg(Color::Green))
    } else {
        Span::styled(" Next ✗ ", Style::default().fg(Color::DarkGray))
    };
    let status = Paragraph::new(Line::from(vec![next, Span::raw(truncate(&app.status, 100))]))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(status, area);
}

fn render_modal(f: &mut Frame, modal: &Modal) {
    let area = centered(f.size(), 50, 7);
    let (title, lines) = match modal {
        Modal::ConfirmFee { amount, currency, .. } => (
            " Registration fee ",
            vec![
                Line::from(format!("A fee of {} {:.2} applies.", currency, amount)),
                Line::from(""),
                Line::from("[y] Pay now    [n] Not now"),
            ],
        ),
        Modal::Pay { request, .. } => (
            " Payment ",
            vec![
                Line::from(format!("{} {:.2} - {}", request.currency, request.amount, request.description)),
                Line::from(""),
                Line::from("[s] Succeed   [f] Fail   [c] Cancel"),
            ],
        ),
    };

    f.render_widget(Clear, area);
    let body = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(title)
            .style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(body, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn display_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Geo { label, .. } => label.clone(),
        FieldValue::Media(handle) => handle.file_name(),
        other => other.as_text().unwrap_or_default(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
