use crate::{
    gateway::Friend,
    state::{
        ActionKind,
        ConnectionState,
        FormField,
        TxPhase,
        ViewState,
    },
    units,
};
use color_eyre::eyre::Result;
use crossterm::{
    event::{
        KeyCode,
        KeyEvent,
        KeyModifiers,
    },
    terminal::{
        disable_raw_mode,
        enable_raw_mode,
    },
};
use ratatui::{
    prelude::*,
    widgets::*,
};
use std::io::stdout;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UserEvent {
    Quit,
    Redraw,
    Connect,
    Refresh,
    DismissError,
    Input { field: FormField, value: String },
    ToggleFriend(Friend),
    Submit(ActionKind),
}

#[derive(Default)]
pub struct UiState {
    mode: Mode,
    friend_cursor: usize,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Mode {
    #[default]
    Normal,
    Edit(FormField),
    AddFriend(FormField),
    QuitModal,
}

impl UiState {
    pub fn friend_cursor(&self) -> usize {
        self.friend_cursor
    }

    pub fn editing(&self) -> Option<FormField> {
        match self.mode {
            Mode::Edit(field) | Mode::AddFriend(field) => Some(field),
            Mode::Normal | Mode::QuitModal => None,
        }
    }
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout());
    let terminal = Terminal::new(backend)?;
    state.terminal = Some(terminal);
    Ok(())
}

pub fn terminal_exit() -> Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen)?;
    Ok(())
}

pub fn draw(state: &mut UiState, view: &ViewState) -> Result<()> {
    state.friend_cursor = state
        .friend_cursor
        .min(view.friends.len().saturating_sub(1));
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, view))?;
        state.terminal = Some(term);
    }
    Ok(())
}

fn submit_kind(field: FormField) -> ActionKind {
    match field {
        FormField::Deposit => ActionKind::Deposit,
        FormField::Withdraw => ActionKind::Withdraw,
        FormField::NewFriendName | FormField::NewFriendAddress => ActionKind::AddFriend,
        FormField::TransferAmount => ActionKind::Transfer,
    }
}

fn edited(view: &ViewState, field: FormField, key: KeyCode) -> Option<UserEvent> {
    let mut value = view.inputs.get(field).to_string();
    match key {
        KeyCode::Backspace => {
            value.pop()?;
        }
        KeyCode::Char(c) => value.push(c),
        _ => return None,
    }
    Some(UserEvent::Input { field, value })
}

/// Maps one key press to what the controller should do.
pub fn handle_key(
    state: &mut UiState,
    view: &ViewState,
    key: KeyEvent,
) -> Option<UserEvent> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(UserEvent::Quit);
    }
    match state.mode {
        Mode::QuitModal => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::Edit(field) => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let kind = submit_kind(field);
                if kind == ActionKind::Transfer && !view.can_transfer() {
                    return Some(UserEvent::Redraw);
                }
                state.mode = Mode::Normal;
                Some(UserEvent::Submit(kind))
            }
            code => edited(view, field, code),
        },
        Mode::AddFriend(field) => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                let other = match field {
                    FormField::NewFriendName => FormField::NewFriendAddress,
                    _ => FormField::NewFriendName,
                };
                state.mode = Mode::AddFriend(other);
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                state.mode = Mode::Normal;
                Some(UserEvent::Submit(ActionKind::AddFriend))
            }
            code => edited(view, field, code),
        },
        Mode::Normal => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => {
                state.mode = Mode::QuitModal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('c') => Some(UserEvent::Connect),
            KeyCode::Char('r') => Some(UserEvent::Refresh),
            KeyCode::Char('x') => Some(UserEvent::DismissError),
            KeyCode::Char('d') => {
                state.mode = Mode::Edit(FormField::Deposit);
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('w') => {
                state.mode = Mode::Edit(FormField::Withdraw);
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('t') => {
                state.mode = Mode::Edit(FormField::TransferAmount);
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('a') => {
                state.mode = Mode::AddFriend(FormField::NewFriendName);
                Some(UserEvent::Redraw)
            }
            KeyCode::Up | KeyCode::Char('k') => {
                state.friend_cursor = state.friend_cursor.saturating_sub(1);
                Some(UserEvent::Redraw)
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let max = view.friends.len().saturating_sub(1);
                state.friend_cursor = (state.friend_cursor + 1).min(max);
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(' ') => view
                .friends
                .get(state.friend_cursor)
                .cloned()
                .map(UserEvent::ToggleFriend),
            _ => None,
        },
    }
}

fn ui(f: &mut Frame, state: &UiState, view: &ViewState) {
    f.render_widget(Clear, f.area());
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4), // account
            Constraint::Length(3), // deposit + withdraw
            Constraint::Min(6),    // friends
            Constraint::Length(3), // transfer
            Constraint::Length(6), // pending transactions
            Constraint::Length(4), // status / error
            Constraint::Length(3), // help
        ])
        .split(f.area());

    draw_account(f, chunks[0], view);
    draw_money_forms(f, state, chunks[1], view);
    draw_friends(f, state, chunks[2], view);
    draw_transfer(f, state, chunks[3], view);
    draw_pending(f, chunks[4], view);
    draw_status(f, chunks[5], view);
    draw_help(f, chunks[6], state);
    draw_modals(f, state, view);
}

fn draw_account(f: &mut Frame, area: Rect, view: &ViewState) {
    let badge = match view.connection {
        ConnectionState::Connected => "Wallet Connected",
        ConnectionState::Connecting => "Connecting...",
        ConnectionState::Disconnected => "Connect Wallet (c)",
    };
    let mut lines = vec![Line::from(Span::styled(
        badge,
        Style::default().add_modifier(Modifier::BOLD),
    ))];
    if view.is_connected() {
        let balance = view
            .balance
            .map(units::format_ether)
            .unwrap_or_else(|| String::from("..."));
        let address = view
            .account
            .as_ref()
            .map(units::display_address)
            .unwrap_or_default();
        lines.push(Line::from(format!(
            "Account Balance: {balance} ETH | Wallet Address: {address}"
        )));
    }
    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("My Account"));
    f.render_widget(widget, area);
}

fn field_style(state: &UiState, field: FormField) -> Style {
    if state.editing() == Some(field) {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    }
}

fn input_preview(view: &ViewState, field: FormField, placeholder: &str) -> String {
    let value = view.inputs.get(field);
    if value.is_empty() {
        placeholder.to_string()
    } else {
        value.to_string()
    }
}

fn draw_money_forms(f: &mut Frame, state: &UiState, area: Rect, view: &ViewState) {
    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);
    let deposit = Paragraph::new(input_preview(view, FormField::Deposit, "0.0000 ETH"))
        .style(field_style(state, FormField::Deposit))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Deposit Money In ETH (d)"),
        );
    let withdraw = Paragraph::new(input_preview(view, FormField::Withdraw, "0.0000 ETH"))
        .style(field_style(state, FormField::Withdraw))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Withdraw Money In ETH (w)"),
        );
    f.render_widget(deposit, cols[0]);
    f.render_widget(withdraw, cols[1]);
}

fn draw_friends(f: &mut Frame, state: &UiState, area: Rect, view: &ViewState) {
    let header = Row::new(vec!["", "Name", "Wallet Address"])
        .style(Style::default().add_modifier(Modifier::BOLD));
    let rows: Vec<Row> = view
        .friends
        .iter()
        .enumerate()
        .map(|(i, friend)| {
            let check = if view.is_selected(friend) { "[x]" } else { "[ ]" };
            let cursor = if i == state.friend_cursor { ">" } else { " " };
            Row::new(vec![
                format!("{cursor}{check}"),
                friend.name.clone(),
                units::display_address(&friend.wallet_address),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Length(5),
            Constraint::Length(32),
            Constraint::Min(42),
        ],
    )
    .header(header)
    .block(Block::default().borders(Borders::ALL).title("My Friends"));
    f.render_widget(table, area);
}

fn draw_transfer(f: &mut Frame, state: &UiState, area: Rect, view: &ViewState) {
    let recipient = view
        .selected_friend
        .as_ref()
        .map(|friend| friend.name.as_str())
        .unwrap_or("[Friend Name]");
    let amount = input_preview(view, FormField::TransferAmount, "ETH");
    let confirm = if view.can_transfer() {
        Span::styled("Enter=Confirm", Style::default().fg(Color::Magenta))
    } else {
        Span::styled(
            "Confirm disabled: select a friend",
            Style::default().fg(Color::DarkGray),
        )
    };
    let line = Line::from(vec![
        Span::styled(
            format!("Transfer {amount} ETH to {recipient}  "),
            field_style(state, FormField::TransferAmount),
        ),
        confirm,
    ]);
    let widget = Paragraph::new(line).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Select a friend above and transfer ETH to them! (t)"),
    );
    f.render_widget(widget, area);
}

fn draw_pending(f: &mut Frame, area: Rect, view: &ViewState) {
    let lines: Vec<Line> = if view.pending.is_empty() {
        vec![Line::from("No transactions in flight")]
    } else {
        view.pending
            .iter()
            .map(|pending| {
                let phase = match pending.phase {
                    TxPhase::Preparing => String::from("waiting for wallet"),
                    TxPhase::Submitted(hash) => format!("submitted {hash:#x}"),
                    TxPhase::Confirmed(hash) => format!("confirmed {hash:#x}, refreshing"),
                };
                Line::from(format!(
                    "#{} {} @ {} - {}",
                    pending.id,
                    pending.kind,
                    pending.started_at.format("%H:%M:%S"),
                    phase
                ))
            })
            .collect()
    };
    let widget = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Transactions"));
    f.render_widget(widget, area);
}

fn draw_status(f: &mut Frame, area: Rect, view: &ViewState) {
    let widget = match view.error_message() {
        Some(message) => Paragraph::new(message)
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Error (x to dismiss)"),
            )
            .style(Style::default().fg(Color::Red)),
        None => {
            let status = if view.status.trim().is_empty() {
                "Ready"
            } else {
                view.status.as_str()
            };
            Paragraph::new(status.to_string())
                .wrap(Wrap { trim: false })
                .block(Block::default().borders(Borders::ALL).title("Status"))
                .style(Style::default().fg(Color::Green))
        }
    };
    f.render_widget(widget, area);
}

fn draw_help(f: &mut Frame, area: Rect, state: &UiState) {
    let text = match state.mode {
        Mode::Normal => {
            "c connect | d deposit | w withdraw | a add friend | t transfer | ↑/↓ move | space select | r refresh | x dismiss | q quit"
        }
        Mode::Edit(_) => "type to edit | Enter submit | Esc close",
        Mode::AddFriend(_) => "type to edit | Tab switch field | Enter add | Esc close",
        Mode::QuitModal => "y quit | n stay",
    };
    let help =
        Paragraph::new(text).block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(help, area);
}

fn draw_modals(f: &mut Frame, state: &UiState, view: &ViewState) {
    match state.mode {
        Mode::AddFriend(focus) => {
            let area = centered_rect(60, 30, f.area());
            let block = Block::default().borders(Borders::ALL).title("Add Friend");
            let marker = |field: FormField| if field == focus { ">" } else { " " };
            let lines = vec![
                Line::from(format!(
                    "{} Name: {}",
                    marker(FormField::NewFriendName),
                    view.inputs.new_friend_name
                )),
                Line::from(format!(
                    "{} Wallet Address: {}",
                    marker(FormField::NewFriendAddress),
                    view.inputs.new_friend_address
                )),
                Line::from(""),
                Line::from("Enter=add Esc=cancel Tab=next field"),
            ];
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(Paragraph::new(lines), block.inner(area));
        }
        Mode::QuitModal => {
            let area = centered_rect(40, 20, f.area());
            let block = Block::default().borders(Borders::ALL).title("Confirm Quit");
            let p = Paragraph::new("Quit the bank client? (Y/N)");
            f.render_widget(Clear, area);
            f.render_widget(block.clone(), area);
            f.render_widget(p, block.inner(area));
        }
        Mode::Normal | Mode::Edit(_) => {}
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

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - w_percent) / 2),
            Constraint::Percentage(w_percent),
            Constraint::Percentage((100 - w_percent) / 2),
        ])
        .split(popup_layout[1])[1]
}
