#![allow(clippy::too_many_lines)]

use crate::api::{RobotClient, RobotCommand, RobotMode};
use crate::input::{HoldControl, InputMapper, TapControl};
use crate::session::{ConnectionStatus, SessionState, run_connection_test};
use crate::settings::{self, DeviceSettings};
use crate::theme::{self, ThemePalette};
use anyhow::{Context, Result};
use crossterm::event::{
    self, DisableFocusChange, EnableFocusChange, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const UI_IDLE_SLEEP: Duration = Duration::from_millis(16);
// Longest silence between autorepeat events that still counts as a held key.
// Only consulted when the terminal cannot report key releases.
const HOLD_REPEAT_GRACE: Duration = Duration::from_millis(650);
const QUIT_STOP_WAIT: Duration = Duration::from_millis(500);

const GLYPH_ACTIVE: &str = "▸";
const GLYPH_DOT_FILLED: &str = "◉";
const GLYPH_DOT_EMPTY: &str = "○";

static THEME: OnceLock<ThemePalette> = OnceLock::new();

pub async fn run_tui() -> Result<()> {
    let loaded_theme = match theme::load_or_create_theme() {
        Ok(palette) => palette,
        Err(err) => {
            eprintln!("Warning: failed to load theme config ({err:#}). Using defaults.");
            ThemePalette::default()
        }
    };
    let _ = THEME.set(loaded_theme);

    let stored = match settings::load_settings() {
        Ok(stored) => stored,
        Err(err) => {
            eprintln!("Warning: failed to load device settings: {err:#}");
            DeviceSettings::default()
        }
    };
    let api = Arc::new(RobotClient::new(
        stored.robot_addr.clone(),
        stored.camera_addr.clone(),
    )?);

    let (mut terminal, release_events) = init_terminal()?;
    let mut app = App::new(stored, api, release_events);

    let run_result = run_loop(&mut terminal, &mut app).await;
    let restore_result = restore_terminal(&mut terminal, release_events);

    run_result?;
    restore_result?;
    Ok(())
}

async fn run_loop(terminal: &mut AppTerminal, app: &mut App) -> Result<()> {
    let mut running = true;
    let mut force_ui_draw = true;
    let mut last_ui_signature = None;

    while running {
        app.poll_test_result().await;
        app.expire_stale_holds();

        let current_ui_signature = app.ui_state_signature();
        let should_draw_ui =
            force_ui_draw || last_ui_signature.is_none_or(|prev| prev != current_ui_signature);
        if should_draw_ui {
            terminal
                .draw(|frame| app.draw(frame))
                .context("failed drawing TUI frame")?;
            last_ui_signature = Some(current_ui_signature);
            force_ui_draw = false;
        }

        while event::poll(Duration::ZERO).context("failed to poll input")? {
            match event::read().context("failed reading input")? {
                Event::Key(key) => {
                    match app.handle_key(key) {
                        AppCommand::None => {}
                        AppCommand::Quit => {
                            running = false;
                            break;
                        }
                    }
                    force_ui_draw = true;
                }
                Event::FocusLost => {
                    // Leaving the terminal is a gesture-cancel for every
                    // active hold.
                    app.mapper.cancel_all();
                    app.hold_deadlines.clear();
                    force_ui_draw = true;
                }
                Event::Resize(_, _) => {
                    force_ui_draw = true;
                    last_ui_signature = None;
                }
                _ => {}
            }
        }

        if !running {
            break;
        }
        tokio::time::sleep(UI_IDLE_SLEEP).await;
    }

    if let Some(handle) = app.pending_test.take() {
        handle.abort();
    }
    // A detached send task would die with the process. Await whatever is
    // still on its way out, then stop any hold that never got its release,
    // all inside one bounded window.
    let pending = app.mapper.take_pending_sends();
    let stop_needed = HoldControl::ALL
        .iter()
        .any(|&control| app.mapper.is_active(control));
    if stop_needed || !pending.is_empty() {
        let _ = tokio::time::timeout(QUIT_STOP_WAIT, async {
            for handle in pending {
                let _ = handle.await;
            }
            if stop_needed {
                let _ = app.api.send_command(RobotCommand::Stop).await;
            }
        })
        .await;
    }
    Ok(())
}

type AppTerminal = Terminal<CrosstermBackend<io::Stdout>>;

fn active_theme() -> &'static ThemePalette {
    THEME.get_or_init(ThemePalette::default)
}

fn init_terminal() -> Result<(AppTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableFocusChange)
        .context("failed entering alternate screen")?;

    let release_events = supports_keyboard_enhancement().unwrap_or(false);
    if release_events {
        execute!(
            stdout,
            PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
        )
        .context("failed enabling key release reporting")?;
    }

    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("failed creating terminal")?;
    Ok((terminal, release_events))
}

fn restore_terminal(terminal: &mut AppTerminal, release_events: bool) -> Result<()> {
    if release_events {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed disabling key release reporting")?;
    }
    disable_raw_mode().context("failed disabling raw mode")?;
    execute!(terminal.backend_mut(), DisableFocusChange, LeaveAlternateScreen)
        .context("failed leaving alternate screen")?;
    terminal.show_cursor().context("failed showing cursor")?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Screen {
    Control,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SettingsFocus {
    RobotAddr,
    CameraAddr,
}

struct App {
    screen: Screen,
    focus: SettingsFocus,
    status: String,
    settings: DeviceSettings,
    robot_field: String,
    camera_field: String,
    api: Arc<RobotClient>,
    session: Arc<SessionState>,
    mapper: InputMapper,
    pending_test: Option<JoinHandle<()>>,
    hold_deadlines: HashMap<HoldControl, Instant>,
    release_events: bool,
}

impl App {
    fn new(stored: DeviceSettings, api: Arc<RobotClient>, release_events: bool) -> Self {
        let session = Arc::new(SessionState::new());
        let mapper = InputMapper::new(Arc::clone(&api), Arc::clone(&session));

        // Without both addresses there is nothing to drive; the settings
        // screen is the only useful place to start.
        let configured = stored.is_complete();
        let screen = if configured {
            Screen::Control
        } else {
            Screen::Settings
        };
        let status = if configured {
            String::new()
        } else {
            "Set both device addresses to start driving.".to_owned()
        };

        Self {
            screen,
            focus: SettingsFocus::RobotAddr,
            status,
            robot_field: stored.robot_addr.clone().unwrap_or_default(),
            camera_field: stored.camera_addr.clone().unwrap_or_default(),
            settings: stored,
            api,
            session,
            mapper,
            pending_test: None,
            hold_deadlines: HashMap::new(),
            release_events,
        }
    }

    fn draw(&self, frame: &mut ratatui::Frame<'_>) {
        match self.screen {
            Screen::Control => self.draw_control(frame),
            Screen::Settings => self.draw_settings(frame),
        }
    }

    fn draw_control(&self, frame: &mut ratatui::Frame<'_>) {
        let snap = self.session.snapshot();
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Length(8),
                Constraint::Min(10),
                Constraint::Length(3),
            ])
            .split(frame.area());

        let mut header_spans = vec![
            Span::styled("Mode ", Style::default().fg(color_muted())),
            Span::styled(
                self.mapper.active_mode().label(),
                Style::default()
                    .fg(color_accent())
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled("    ", Style::default()),
        ];
        header_spans.extend(device_dot_spans("robot", snap.robot));
        header_spans.push(Span::styled("  ", Style::default()));
        header_spans.extend(device_dot_spans("camera", snap.camera));
        if snap.command_error {
            header_spans.push(Span::styled("    ", Style::default()));
            header_spans.push(Span::styled(
                "CONNECTION LOST",
                Style::default()
                    .fg(color_danger())
                    .add_modifier(Modifier::BOLD),
            ));
        }
        let header = Paragraph::new(Line::from(header_spans))
            .style(Style::default().fg(color_text()))
            .block(panel_block("◈", "Rover", false));
        frame.render_widget(header, layout[0]);

        let mut camera_lines = Vec::new();
        match self.api.camera_stream_url() {
            Some(url) => {
                camera_lines.push(Line::from(vec![
                    Span::styled("Stream  ", Style::default().fg(color_muted())),
                    Span::styled(url, Style::default().fg(color_text())),
                ]));
            }
            None => {
                camera_lines.push(Line::from(Span::styled(
                    "Camera address is not configured.",
                    Style::default().fg(color_warn()),
                )));
            }
        }
        camera_lines.push(Line::from(vec![
            Span::styled("Status  ", Style::default().fg(color_muted())),
            Span::styled(
                snap.camera.label(),
                Style::default()
                    .fg(status_color(snap.camera))
                    .add_modifier(Modifier::BOLD),
            ),
        ]));
        if snap.camera == ConnectionStatus::Failed {
            camera_lines.push(Line::default());
            for hint in [
                "Check the camera address in Settings.",
                "Make sure the camera module is powered on.",
                "Confirm both devices share your Wi-Fi network.",
            ] {
                camera_lines.push(Line::from(vec![
                    Span::styled("• ", Style::default().fg(color_muted())),
                    Span::styled(hint, Style::default().fg(color_muted())),
                ]));
            }
        }
        let camera_panel = Paragraph::new(camera_lines)
            .style(Style::default().fg(color_text()))
            .block(panel_block("◉", "Camera", false))
            .wrap(Wrap { trim: false });
        frame.render_widget(camera_panel, layout[1]);

        let mut pad_lines = vec![
            Line::default(),
            Line::from(vec![
                Span::styled("        ", Style::default()),
                self.pad_key_span(HoldControl::Forward, "[W/↑] forward"),
            ]),
            Line::from(vec![
                Span::styled("  ", Style::default()),
                self.pad_key_span(HoldControl::Left, "[A/←] left"),
                Span::styled("      ", Style::default()),
                self.pad_key_span(HoldControl::Right, "[D/→] right"),
            ]),
            Line::from(vec![
                Span::styled("        ", Style::default()),
                self.pad_key_span(HoldControl::Backward, "[S/↓] backward"),
            ]),
            Line::default(),
            Line::from(vec![
                Span::styled(
                    "  [Space]",
                    Style::default()
                        .fg(color_accent())
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(" stop    ", Style::default().fg(color_muted())),
                Span::styled(
                    "[H]",
                    Style::default()
                        .fg(color_accent())
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(" horn", Style::default().fg(color_muted())),
            ]),
            Line::default(),
            Line::from(self.mode_spans()),
        ];
        if !self.release_events {
            pad_lines.push(Line::default());
            pad_lines.push(Line::from(Span::styled(
                "This terminal reports no key releases; a hold ends shortly after you let go.",
                Style::default().fg(color_muted()),
            )));
        }
        if !self.status.is_empty() {
            pad_lines.push(Line::default());
            pad_lines.push(Line::from(vec![
                Span::styled("status ", Style::default().fg(color_muted())),
                Span::styled(
                    &self.status,
                    status_message_style(&self.status).add_modifier(Modifier::BOLD),
                ),
            ]));
        }
        let pad_panel = Paragraph::new(pad_lines)
            .style(Style::default().fg(color_text()))
            .block(panel_block("◌", "Drive Pad", false))
            .wrap(Wrap { trim: false });
        frame.render_widget(pad_panel, layout[2]);

        let footer_spans = action_hint_spans(&[
            ("Ctrl+T", "Test Connections"),
            ("Ctrl+S", "Settings"),
            ("Ctrl+Q", "Quit"),
        ]);
        let footer = Paragraph::new(Line::from(footer_spans))
            .style(Style::default().fg(color_text()))
            .block(panel_block("⌘", "Actions", false));
        frame.render_widget(footer, layout[3]);
    }

    fn draw_settings(&self, frame: &mut ratatui::Frame<'_>) {
        let snap = self.session.snapshot();
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(6),
                Constraint::Min(8),
                Constraint::Length(3),
            ])
            .split(frame.area());

        let robot_marker = focus_marker(self.focus == SettingsFocus::RobotAddr);
        let camera_marker = focus_marker(self.focus == SettingsFocus::CameraAddr);
        let address_lines = vec![
            Line::from(vec![
                Span::styled(
                    format!("{robot_marker} "),
                    Style::default()
                        .fg(color_accent())
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled("Robot address:  ", Style::default().fg(color_muted())),
                Span::styled(&self.robot_field, Style::default().fg(color_text())),
            ]),
            Line::from(vec![
                Span::styled(
                    format!("{camera_marker} "),
                    Style::default()
                        .fg(color_accent())
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled("Camera address: ", Style::default().fg(color_muted())),
                Span::styled(&self.camera_field, Style::default().fg(color_text())),
            ]),
            Line::default(),
            Line::from(Span::styled(
                "Type to edit. Tab switches fields. Enter saves both addresses.",
                Style::default().fg(color_muted()),
            )),
        ];
        let address_panel = Paragraph::new(address_lines)
            .style(Style::default().fg(color_text()))
            .block(panel_block("◈", "Device Addresses", true))
            .wrap(Wrap { trim: false });
        frame.render_widget(address_panel, layout[0]);

        let mut connection_lines = vec![
            Line::from(device_status_line("robot ", snap.robot)),
            Line::from(device_status_line("camera", snap.camera)),
        ];
        if self.pending_test.is_some() {
            connection_lines.push(Line::from(Span::styled(
                "Probing the robot first, then the camera...",
                Style::default().fg(color_accent()),
            )));
        }
        if let Some(last_error) = &snap.last_command_error {
            connection_lines.push(Line::default());
            connection_lines.push(Line::from(vec![
                Span::styled("last command error ", Style::default().fg(color_muted())),
                Span::styled(last_error, Style::default().fg(color_muted())),
            ]));
        }
        if !self.status.is_empty() {
            connection_lines.push(Line::default());
            connection_lines.push(Line::from(vec![
                Span::styled("status ", Style::default().fg(color_muted())),
                Span::styled(
                    &self.status,
                    status_message_style(&self.status).add_modifier(Modifier::BOLD),
                ),
            ]));
        }
        let connection_panel = Paragraph::new(connection_lines)
            .style(Style::default().fg(color_text()))
            .block(panel_block("◉", "Connection", false))
            .wrap(Wrap { trim: false });
        frame.render_widget(connection_panel, layout[1]);

        let footer_spans = action_hint_spans(&[
            ("Enter", "Save"),
            ("Tab", "Switch Field"),
            ("Ctrl+T", "Test Connections"),
            ("Ctrl+B", "Back"),
            ("Ctrl+Q", "Quit"),
        ]);
        let footer = Paragraph::new(Line::from(footer_spans))
            .style(Style::default().fg(color_text()))
            .block(panel_block("⌘", "Actions", false));
        frame.render_widget(footer, layout[2]);
    }

    fn handle_key(&mut self, key: KeyEvent) -> AppCommand {
        if key.kind == KeyEventKind::Press && key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('q') => return AppCommand::Quit,
                KeyCode::Char('t') => {
                    self.start_connection_test();
                    return AppCommand::None;
                }
                _ => {}
            }
        }

        match self.screen {
            Screen::Control => self.handle_control_key(key),
            Screen::Settings => self.handle_settings_key(key),
        }
    }

    fn handle_control_key(&mut self, key: KeyEvent) -> AppCommand {
        if !key.modifiers.contains(KeyModifiers::CONTROL)
            && let Some(control) = hold_control_for(key.code)
        {
            match key.kind {
                KeyEventKind::Press | KeyEventKind::Repeat => self.begin_hold(control),
                KeyEventKind::Release => self.end_hold(control),
            }
            return AppCommand::None;
        }

        if key.kind != KeyEventKind::Press {
            return AppCommand::None;
        }

        match key.code {
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.open_settings();
            }
            // Shift and CapsLock must not mute the tap keys.
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                match c.to_ascii_lowercase() {
                    ' ' => {
                        self.mapper.tap(TapControl::Stop);
                        self.status = "Sent stop.".to_owned();
                    }
                    'h' => {
                        self.mapper.tap(TapControl::Horn);
                        self.status = "Honk!".to_owned();
                    }
                    '1' => self.choose_mode(RobotMode::Free),
                    '2' => self.choose_mode(RobotMode::LineFollower),
                    '3' => self.choose_mode(RobotMode::ObstacleAvoidance),
                    _ => {}
                }
            }
            _ => {}
        }
        AppCommand::None
    }

    fn handle_settings_key(&mut self, key: KeyEvent) -> AppCommand {
        if key.kind == KeyEventKind::Release {
            return AppCommand::None;
        }

        match key.code {
            KeyCode::Char('b') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.close_settings();
            }
            KeyCode::Tab | KeyCode::Up | KeyCode::Down => {
                self.focus = match self.focus {
                    SettingsFocus::RobotAddr => SettingsFocus::CameraAddr,
                    SettingsFocus::CameraAddr => SettingsFocus::RobotAddr,
                };
            }
            KeyCode::Enter => self.save_settings(),
            _ => {
                let field = match self.focus {
                    SettingsFocus::RobotAddr => &mut self.robot_field,
                    SettingsFocus::CameraAddr => &mut self.camera_field,
                };
                edit_text_field(field, key, false);
            }
        }
        AppCommand::None
    }

    fn begin_hold(&mut self, control: HoldControl) {
        self.mapper.press(control);
        if !self.release_events {
            self.hold_deadlines
                .insert(control, Instant::now() + HOLD_REPEAT_GRACE);
        }
    }

    fn end_hold(&mut self, control: HoldControl) {
        self.hold_deadlines.remove(&control);
        self.mapper.release(control);
    }

    // Fallback release detection: a hold whose autorepeat went silent is
    // treated as let go.
    fn expire_stale_holds(&mut self) {
        if self.hold_deadlines.is_empty() {
            return;
        }
        let now = Instant::now();
        let expired: Vec<HoldControl> = self
            .hold_deadlines
            .iter()
            .filter(|(_, deadline)| now >= **deadline)
            .map(|(control, _)| *control)
            .collect();
        for control in expired {
            self.end_hold(control);
        }
    }

    fn choose_mode(&mut self, mode: RobotMode) {
        self.mapper.select_mode(mode);
        self.status = format!("Mode set to {}.", mode.label());
    }

    fn open_settings(&mut self) {
        self.mapper.cancel_all();
        self.hold_deadlines.clear();
        self.screen = Screen::Settings;
        self.focus = SettingsFocus::RobotAddr;
        self.robot_field = self.settings.robot_addr.clone().unwrap_or_default();
        self.camera_field = self.settings.camera_addr.clone().unwrap_or_default();
    }

    fn close_settings(&mut self) {
        if !self.settings.is_complete() {
            self.status = "Set both device addresses first.".to_owned();
            return;
        }
        self.screen = Screen::Control;
    }

    fn save_settings(&mut self) {
        let robot = settings::normalize_address(&self.robot_field);
        let camera = settings::normalize_address(&self.camera_field);
        if robot.is_none() || camera.is_none() {
            self.status = "Both addresses are required.".to_owned();
            return;
        }

        let updated = DeviceSettings {
            robot_addr: robot,
            camera_addr: camera,
        };
        if let Err(err) = settings::save_settings(&updated) {
            self.status = format!("Failed saving settings: {err:#}");
            return;
        }

        if updated != self.settings {
            let client = match RobotClient::new(
                updated.robot_addr.clone(),
                updated.camera_addr.clone(),
            ) {
                Ok(client) => client,
                Err(err) => {
                    self.status = format!("Failed rebuilding HTTP client: {err:#}");
                    return;
                }
            };
            // Stops for active holds still go through the old address.
            self.mapper.cancel_all();
            self.hold_deadlines.clear();

            self.api = Arc::new(client);
            self.mapper = InputMapper::with_mode(
                Arc::clone(&self.api),
                Arc::clone(&self.session),
                self.mapper.active_mode(),
            );
            // Old probe results say nothing about the new addresses.
            self.session.reset();
        }

        self.settings = updated;
        self.robot_field = self.settings.robot_addr.clone().unwrap_or_default();
        self.camera_field = self.settings.camera_addr.clone().unwrap_or_default();
        self.status = "Saved device addresses.".to_owned();
        self.screen = Screen::Control;
    }

    fn start_connection_test(&mut self) {
        if self.pending_test.is_some() {
            self.status = "Connection test already running...".to_owned();
            return;
        }

        self.status = "Testing connections...".to_owned();
        let api = Arc::clone(&self.api);
        let session = Arc::clone(&self.session);
        self.pending_test = Some(tokio::spawn(async move {
            run_connection_test(&api, &session).await;
        }));
    }

    async fn poll_test_result(&mut self) {
        let Some(handle) = self.pending_test.take() else {
            return;
        };
        if !handle.is_finished() {
            self.pending_test = Some(handle);
            return;
        }

        if handle.await.is_err() {
            self.status = "Connection test task failed.".to_owned();
            return;
        }
        let snap = self.session.snapshot();
        self.status = format!(
            "Connection test finished: robot {}, camera {}.",
            snap.robot.label(),
            snap.camera.label()
        );
    }

    fn ui_state_signature(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.screen.hash(&mut hasher);
        self.focus.hash(&mut hasher);
        self.status.hash(&mut hasher);
        self.robot_field.hash(&mut hasher);
        self.camera_field.hash(&mut hasher);
        self.pending_test.is_some().hash(&mut hasher);
        self.release_events.hash(&mut hasher);
        self.session.snapshot().hash(&mut hasher);
        self.mapper.active_mode().hash(&mut hasher);
        for control in HoldControl::ALL {
            self.mapper.is_active(control).hash(&mut hasher);
        }
        hasher.finish()
    }

    fn pad_key_span(&self, control: HoldControl, caption: &'static str) -> Span<'static> {
        let style = if self.mapper.is_active(control) {
            Style::default()
                .fg(color_hold())
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(color_text())
        };
        Span::styled(caption, style)
    }

    fn mode_spans(&self) -> Vec<Span<'static>> {
        let mut spans = vec![Span::styled("  Mode", Style::default().fg(color_muted()))];
        for (key_hint, mode) in [
            ("1", RobotMode::Free),
            ("2", RobotMode::LineFollower),
            ("3", RobotMode::ObstacleAvoidance),
        ] {
            let active = self.mapper.active_mode() == mode;
            let marker = if active { GLYPH_ACTIVE } else { " " };
            let style = if active {
                Style::default()
                    .fg(color_accent())
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(color_muted())
            };
            spans.push(Span::styled(
                format!("  {marker}{key_hint} {}", mode.label()),
                style,
            ));
        }
        spans
    }
}

#[derive(Debug)]
enum AppCommand {
    None,
    Quit,
}

fn hold_control_for(code: KeyCode) -> Option<HoldControl> {
    match code {
        KeyCode::Up => Some(HoldControl::Forward),
        KeyCode::Down => Some(HoldControl::Backward),
        KeyCode::Left => Some(HoldControl::Left),
        KeyCode::Right => Some(HoldControl::Right),
        KeyCode::Char(c) => match c.to_ascii_lowercase() {
            'w' => Some(HoldControl::Forward),
            's' => Some(HoldControl::Backward),
            'a' => Some(HoldControl::Left),
            'd' => Some(HoldControl::Right),
            _ => None,
        },
        _ => None,
    }
}

fn edit_text_field(target: &mut String, key: KeyEvent, allow_spaces: bool) {
    match key.code {
        KeyCode::Backspace => {
            let _ = target.pop();
        }
        KeyCode::Char(c) => {
            if key.modifiers.contains(KeyModifiers::CONTROL)
                || key.modifiers.contains(KeyModifiers::ALT)
            {
                return;
            }
            if !allow_spaces && c == ' ' {
                return;
            }
            target.push(c);
        }
        _ => {}
    }
}

fn color_text() -> Color {
    active_theme().text
}

fn color_muted() -> Color {
    active_theme().muted
}

fn color_border() -> Color {
    active_theme().border
}

fn color_border_active() -> Color {
    active_theme().border_active
}

fn color_accent() -> Color {
    active_theme().accent
}

fn color_ok() -> Color {
    active_theme().ok
}

fn color_warn() -> Color {
    active_theme().warn
}

fn color_danger() -> Color {
    active_theme().danger
}

fn color_hold() -> Color {
    active_theme().hold
}

fn panel_block<'a>(glyph: &'a str, title: &'a str, focused: bool) -> Block<'a> {
    let border_color = if focused {
        color_border_active()
    } else {
        color_border()
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(Line::from(vec![
            Span::styled(
                format!(" {glyph} "),
                Style::default()
                    .fg(color_accent())
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                title,
                Style::default()
                    .fg(color_text())
                    .add_modifier(Modifier::BOLD),
            ),
        ]))
}

fn action_hint_spans(hints: &[(&'static str, &'static str)]) -> Vec<Span<'static>> {
    let mut spans = Vec::new();
    for (idx, (key, label)) in hints.iter().enumerate() {
        if idx > 0 {
            spans.push(Span::styled("  |  ", Style::default().fg(color_border())));
        }
        spans.push(Span::styled(
            format!("[{key}]"),
            Style::default()
                .fg(color_accent())
                .add_modifier(Modifier::BOLD),
        ));
        spans.push(Span::styled(
            format!(" {label}"),
            Style::default().fg(color_muted()),
        ));
    }
    spans
}

fn status_color(status: ConnectionStatus) -> Color {
    match status {
        ConnectionStatus::Unknown => color_muted(),
        ConnectionStatus::Testing => color_warn(),
        ConnectionStatus::Success => color_ok(),
        ConnectionStatus::Failed => color_danger(),
    }
}

fn status_glyph(status: ConnectionStatus) -> &'static str {
    if status == ConnectionStatus::Unknown {
        GLYPH_DOT_EMPTY
    } else {
        GLYPH_DOT_FILLED
    }
}

fn device_dot_spans(name: &'static str, status: ConnectionStatus) -> Vec<Span<'static>> {
    vec![
        Span::styled(format!("{name} "), Style::default().fg(color_muted())),
        Span::styled(
            status_glyph(status),
            Style::default()
                .fg(status_color(status))
                .add_modifier(Modifier::BOLD),
        ),
    ]
}

fn device_status_line(name: &'static str, status: ConnectionStatus) -> Vec<Span<'static>> {
    vec![
        Span::styled(format!("{name}  "), Style::default().fg(color_muted())),
        Span::styled(
            format!("{} ", status_glyph(status)),
            Style::default()
                .fg(status_color(status))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(
            status.label(),
            Style::default().fg(status_color(status)),
        ),
    ]
}

fn focus_marker(focused: bool) -> &'static str {
    if focused { GLYPH_ACTIVE } else { " " }
}

fn status_message_style(status: &str) -> Style {
    let lower = status.to_ascii_lowercase();
    if lower.contains("fail") || lower.contains("error") || lower.contains("required") {
        Style::default().fg(color_danger())
    } else if lower.contains("testing") || lower.contains("running") {
        Style::default().fg(color_accent())
    } else if lower.contains("saved") || lower.contains("finished") || lower.contains("set to") {
        Style::default().fg(color_ok())
    } else {
        Style::default().fg(color_muted())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Transport;
    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use url::Url;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _url: &Url) -> anyhow::Result<u16> {
            Ok(200)
        }
    }

    struct RecordingTransport {
        tx: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, url: &Url) -> anyhow::Result<u16> {
            let _ = self.tx.send(url.to_string());
            Ok(200)
        }
    }

    fn app_with(stored: DeviceSettings) -> App {
        let api = Arc::new(RobotClient::with_transport(
            stored.robot_addr.clone(),
            stored.camera_addr.clone(),
            Arc::new(NullTransport),
        ));
        App::new(stored, api, true)
    }

    fn plain_key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    #[test]
    fn missing_addresses_force_the_settings_screen() {
        let app = app_with(DeviceSettings::default());
        assert_eq!(app.screen, Screen::Settings);

        let app = app_with(DeviceSettings {
            robot_addr: Some("192.168.4.1".to_owned()),
            camera_addr: None,
        });
        assert_eq!(app.screen, Screen::Settings);

        let app = app_with(DeviceSettings {
            robot_addr: Some("192.168.4.1".to_owned()),
            camera_addr: Some("192.168.4.2".to_owned()),
        });
        assert_eq!(app.screen, Screen::Control);
    }

    #[test]
    fn wasd_and_arrows_map_to_the_same_controls() {
        assert_eq!(
            hold_control_for(KeyCode::Char('w')),
            Some(HoldControl::Forward)
        );
        assert_eq!(hold_control_for(KeyCode::Up), Some(HoldControl::Forward));
        assert_eq!(
            hold_control_for(KeyCode::Char('S')),
            Some(HoldControl::Backward)
        );
        assert_eq!(hold_control_for(KeyCode::Left), Some(HoldControl::Left));
        assert_eq!(
            hold_control_for(KeyCode::Char('d')),
            Some(HoldControl::Right)
        );
        assert_eq!(hold_control_for(KeyCode::Char('x')), None);
        assert_eq!(hold_control_for(KeyCode::Enter), None);
    }

    #[tokio::test]
    async fn horn_key_works_with_shift_or_capslock() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let api = Arc::new(RobotClient::with_transport(
            Some("192.168.4.1".to_owned()),
            Some("192.168.4.2".to_owned()),
            Arc::new(RecordingTransport { tx }),
        ));
        let stored = DeviceSettings {
            robot_addr: Some("192.168.4.1".to_owned()),
            camera_addr: Some("192.168.4.2".to_owned()),
        };
        let mut app = App::new(stored, api, true);

        app.handle_control_key(KeyEvent::new(KeyCode::Char('H'), KeyModifiers::SHIFT));
        assert!(rx.recv().await.unwrap().ends_with("/cmd?cmd=horn"));
    }

    #[test]
    fn text_field_editing_appends_and_deletes() {
        let mut field = "192.168.4".to_owned();
        edit_text_field(&mut field, plain_key(KeyCode::Char('1')), false);
        assert_eq!(field, "192.168.41");

        edit_text_field(&mut field, plain_key(KeyCode::Backspace), false);
        assert_eq!(field, "192.168.4");

        edit_text_field(&mut field, plain_key(KeyCode::Char(' ')), false);
        assert_eq!(field, "192.168.4");

        edit_text_field(
            &mut field,
            KeyEvent::new(KeyCode::Char('x'), KeyModifiers::CONTROL),
            false,
        );
        assert_eq!(field, "192.168.4");
    }
}
