use crate::client::{AppSnapshot, GameState};
use crate::dice::DICE_COUNT;
use color_eyre::eyre::{eyre, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::io::stdout;
use tokio::sync::mpsc;

pub enum UserEvent {
    Quit,
    Roll,
    Reset,
    Redraw,
}

#[derive(Debug, Default)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    QuitModal,
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::terminal::EnterAlternateScreen,
        crossterm::event::EnableMouseCapture
    )?;
    // Create a single persistent Terminal to preserve buffers across draws
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(
        std::io::stdout(),
        crossterm::event::DisableMouseCapture,
        crossterm::terminal::LeaveAlternateScreen
    )?;
    Ok(())
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<Event>;

/// Reads crossterm events on a dedicated thread so the run loop can select
/// over input alongside timers and chain events.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || loop {
        match event::read() {
            Ok(ev) => {
                if tx.send(ev).is_err() {
                    break;
                }
            }
            Err(_) => break,
        }
    });
    rx
}

pub async fn next_raw_event(rx: &mut InputEventReceiver) -> Result<Event> {
    rx.recv().await.ok_or_else(|| eyre!("input channel closed"))
}

/// Maps a raw terminal event onto a game action, or None when the event is
/// noise (releases, mouse moves, keys with no binding).
pub fn interpret_event(state: &mut UiState, raw: Event) -> Option<UserEvent> {
    let Event::Key(k) = raw else { return None };
    if k.kind != KeyEventKind::Press {
        return None;
    }
    match state.mode {
        Mode::QuitModal => match k.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Normal => match k.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                state.mode = Mode::QuitModal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('r') => Some(UserEvent::Roll),
            KeyCode::Char('n') => Some(UserEvent::Reset),
            _ => None,
        },
    }
}

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    // Clear the whole frame to avoid leftover fragments
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // status
            Constraint::Length(7), // dice row
            Constraint::Length(3), // outcome banner
            Constraint::Length(4), // errors
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_status(f, chunks[0], snap);
    draw_dice(f, chunks[1], snap);
    draw_outcome(f, chunks[2], snap);
    draw_errors(f, chunks[3], snap);
    draw_help(f, chunks[4], snap);
    draw_modals(f, state);
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let wallet = if snap.connected {
        format!("{:#x}", snap.player)
    } else {
        String::from("disconnected")
    };
    let message = snap.message.as_deref().unwrap_or("");
    let status = Paragraph::new(format!(
        "Network: {} | Wallet: {} | State: {:?}\n{}",
        snap.network, wallet, snap.state, message
    ))
    .block(Block::default().borders(Borders::ALL).title("Danger Dice"));
    f.render_widget(status, area);
}

fn draw_dice(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let cols = DICE_COUNT as u16;
    let col_w = area.width / cols;
    for (i, face) in snap.faces.iter().enumerate() {
        let c = i as u16;
        let rect = Rect::new(area.x + c * col_w, area.y, col_w, area.height);
        let style = if snap.spinning {
            Style::default().fg(Color::Yellow)
        } else if snap.settled && snap.state == GameState::GameOver {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!("Die {}", i + 1))
            .style(style);
        let dots = Paragraph::new(face_lines(*face)).alignment(Alignment::Center);
        f.render_widget(&block, rect);
        f.render_widget(dots, block.inner(rect));
    }
}

/// Pip layout on a 3x3 grid. Six uses two vertical columns of three.
fn face_dots(face: u8) -> [[bool; 3]; 3] {
    let mut grid = [[false; 3]; 3];
    let coords: &[(usize, usize)] = match face {
        1 => &[(1, 1)],
        2 => &[(0, 0), (2, 2)],
        3 => &[(0, 0), (1, 1), (2, 2)],
        4 => &[(0, 0), (0, 2), (2, 0), (2, 2)],
        5 => &[(0, 0), (0, 2), (1, 1), (2, 0), (2, 2)],
        _ => &[(0, 0), (1, 0), (2, 0), (0, 2), (1, 2), (2, 2)],
    };
    for &(row, col) in coords {
        grid[row][col] = true;
    }
    grid
}

fn face_lines(face: u8) -> Vec<Line<'static>> {
    face_dots(face)
        .iter()
        .map(|row| {
            let text: String = row
                .iter()
                .map(|&dot| if dot { "\u{25cf} " } else { "  " })
                .collect();
            Line::from(text)
        })
        .collect()
}

fn draw_outcome(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    // The banner waits for the dice to stop moving.
    let (text, style) = match &snap.outcome {
        Some(outcome) if snap.settled => {
            let style = if outcome.won {
                Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Red)
            };
            (outcome.message.clone(), style)
        }
        _ if snap.spinning => (String::from("Rolling..."), Style::default().fg(Color::Yellow)),
        _ => (String::new(), Style::default()),
    };
    let banner = Paragraph::new(text)
        .style(style)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Result"));
    f.render_widget(banner, area);
}

fn draw_errors(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut lines: Vec<Line> = Vec::new();
    if snap.errors.is_empty() {
        lines.push(Line::from("No errors"));
    } else {
        for e in &snap.errors {
            lines.push(Line::from(e.clone()));
        }
    }
    let color = if snap.errors.is_empty() { Color::DarkGray } else { Color::Red };
    let errors = Paragraph::new(lines)
        .style(Style::default().fg(color))
        .block(Block::default().borders(Borders::ALL).title("Errors"));
    f.render_widget(errors, area);
}

fn draw_help(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let roll = if snap.roll_enabled { "r roll ($1 USDC)" } else { "r roll (busy)" };
    let reset = if snap.reset_enabled { "n new game" } else { "n new game (busy)" };
    let help = Paragraph::new(format!("{} | {} | q/Esc quit", roll, reset))
        .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState) {
    match state.mode {
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit the game? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal => {}
    }
}

fn centered_rect(w_percent: u16, h_percent: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - h_percent) / 2),
            Constraint::Percentage(h_percent),
            Constraint::Percentage((100 - h_percent) / 2),
        ])
        .split(r);

    let vertical = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1]);

    vertical[1]
}
