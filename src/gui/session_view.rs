use std::{
    collections::VecDeque,
    io::stdout,
    sync::{
        mpsc::{Receiver, TryRecvError},
        Arc,
    },
    time::Duration,
};

use crate::gesture_session::{CaptureMode, GestureOutcome, SessionUpdate};
use crate::gui::error::GuiError;
use crate::wiimote::SensorSnapshot;

use crossterm::{
    event::{self, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

const HISTORY: usize = 8;

/// Everything the status view shows, folded from the session updates.
#[derive(Debug, Default)]
pub struct ViewState {
    pub snapshot: Arc<SensorSnapshot>,
    pub update: Option<SessionUpdate>,
    pub history: VecDeque<String>,
    pub templates: Vec<String>,
    /// The update channel closed; nothing will change any more.
    pub finished: bool,
}

impl ViewState {
    pub fn new(templates: Vec<String>) -> Self {
        Self {
            templates,
            ..Default::default()
        }
    }

    pub fn apply(&mut self, mut update: SessionUpdate) {
        if let Some(outcome) = update.outcome.take() {
            if let GestureOutcome::TemplateAdded(name) = &outcome {
                self.templates.push(name.clone());
            }
            self.history.push_front(outcome.to_string());
            self.history.truncate(HISTORY);
        }
        self.update = Some(update);
    }

    fn status_lines(&self) -> Vec<Line<'static>> {
        let connected = match (self.finished, self.update.as_ref().map(|u| u.connected)) {
            (_, Some(false)) | (true, _) => "disconnected".red().bold(),
            _ if self.snapshot.connected => "connected".green().bold(),
            _ => "waiting".yellow(),
        };
        let buttons: Vec<String> = self
            .snapshot
            .buttons
            .pressed()
            .map(|b| b.to_string())
            .collect();
        let acceleration = match self.snapshot.acceleration {
            Some(a) => format!("x {:4}  y {:4}  z {:4}", a.x, a.y, a.z),
            None => "-".to_owned(),
        };
        let (pointer, window, capture) = match &self.update {
            Some(u) => (
                u.pointer
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".to_owned()),
                u.pointer_window.to_string(),
                match u.recording {
                    Some(CaptureMode::Recognize) => format!("recognizing ({} points)", u.path_len),
                    Some(CaptureMode::Record) => format!("recording ({} points)", u.path_len),
                    None => "idle".to_owned(),
                },
            ),
            None => ("-".to_owned(), "-".to_owned(), "idle".to_owned()),
        };

        vec![
            Line::from(vec!["Wiimote      ".into(), connected]),
            Line::from(format!("Reports      {}", self.snapshot.reports)),
            Line::from(format!("Buttons      {}", buttons.join(" "))),
            Line::from(format!("Acceleration {}", acceleration)),
            Line::from(format!("Pointer      {} (window {})", pointer, window)),
            Line::from(vec![
                "Capture      ".into(),
                Span::styled(capture, Style::default().fg(Color::Magenta)),
            ]),
        ]
    }
}

/// Renders the view into one frame.
pub fn draw(frame: &mut Frame, state: &ViewState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(8), Constraint::Min(3)])
        .split(frame.size());
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(rows[1]);

    let instructions = Title::from(Line::from(vec![" Quit ".into(), "<Q> ".magenta().bold()]));
    let status = Paragraph::new(state.status_lines()).block(
        Block::default()
            .title(Title::from(" Wiimote Gestures ".magenta().bold()).alignment(Alignment::Center))
            .title(
                instructions
                    .alignment(Alignment::Center)
                    .position(Position::Bottom),
            )
            .borders(Borders::ALL),
    );
    frame.render_widget(status, rows[0]);

    let history = List::new(state.history.iter().map(|s| s.as_str()))
        .style(Style::default().fg(Color::White))
        .block(Block::default().title(" Results ").borders(Borders::ALL));
    frame.render_widget(history, columns[0]);

    let templates = List::new(state.templates.iter().map(|s| s.as_str()))
        .style(Style::default().fg(Color::White))
        .block(Block::default().title(" Templates ").borders(Borders::ALL));
    frame.render_widget(templates, columns[1]);
}

fn event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    state: &mut ViewState,
    updates: &Receiver<SessionUpdate>,
    snapshot: &dyn Fn() -> Arc<SensorSnapshot>,
) -> Result<(), GuiError> {
    loop {
        loop {
            match updates.try_recv() {
                Ok(update) => state.apply(update),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    state.finished = true;
                    break;
                }
            }
        }
        state.snapshot = snapshot();

        terminal.draw(|frame| draw(frame, state))?;
        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press
                    && matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
                {
                    return Ok(());
                }
            }
        }
    }
}

/// Shows the live status of a session until the user presses `q`. Keeps
/// showing the final state after the device goes away.
pub fn run_session_view(
    updates: Receiver<SessionUpdate>,
    snapshot: impl Fn() -> Arc<SensorSnapshot>,
    templates: Vec<String>,
) -> Result<ViewState, GuiError> {
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut state = ViewState::new(templates);
    let res = event_loop(&mut terminal, &mut state, &updates, &snapshot);

    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;
    res.map(|_| state)
}
