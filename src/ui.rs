use crate::{
    client::{
        AppSnapshot,
        LeaderboardEntry,
    },
    format,
    types::{
        Choice,
        GameOutcome,
        GameRecord,
    },
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use crossterm::{
    event::{
        self,
        Event,
        KeyCode,
        KeyEventKind,
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
use tokio::sync::mpsc;

pub enum UserEvent {
    Quit,
    Redraw,
    NextChoice,
    PrevChoice,
    SelectChoice(Choice),
    Refresh,
    OpenLeaderboard,
    CycleLeaderboardSort,
    ConfirmBet { amount: String },
    ConfirmUsername { name: String },
    ClaimBonus,
    WithdrawPayout,
}

#[derive(Debug)]
pub struct UiState {
    mode: Mode,
    terminal: Option<Terminal<CrosstermBackend<std::io::Stdout>>>,
    leaderboard_len: usize,
}

impl Default for UiState {
    fn default() -> Self {
        UiState {
            mode: Mode::Normal,
            terminal: None,
            leaderboard_len: 0,
        }
    }
}

#[derive(Clone, Debug, Default)]
enum Mode {
    #[default]
    Normal,
    BetModal(BetState),
    UsernameModal(UsernameState),
    LeaderboardModal(LeaderboardState),
    QuitModal,
}

#[derive(Clone, Debug, Default)]
struct BetState {
    input: String,
}

#[derive(Clone, Debug, Default)]
struct UsernameState {
    input: String,
}

#[derive(Clone, Debug, Default)]
struct LeaderboardState {
    offset: usize,
}

pub type InputEventReceiver = mpsc::UnboundedReceiver<Event>;

/// Read terminal events on a dedicated thread so the async loop can race
/// them against worker messages.
pub fn input_event_stream() -> InputEventReceiver {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        loop {
            match event::read() {
                Ok(ev) => {
                    if tx.send(ev).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(?err, "terminal input read failed");
                    break;
                }
            }
        }
    });
    rx
}

pub async fn next_raw_event(rx: &mut InputEventReceiver) -> Result<Event> {
    rx.recv()
        .await
        .ok_or_else(|| eyre!("input event stream closed"))
}

pub fn terminal_enter(state: &mut UiState) -> Result<()> {
    enable_raw_mode()?;
    crossterm::execute!(std::io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    // Single persistent terminal so buffers survive across draws.
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

pub fn draw(state: &mut UiState, snap: &AppSnapshot) -> Result<()> {
    state.leaderboard_len = snap.leaderboard.len();
    if let Some(mut term) = state.terminal.take() {
        term.draw(|f| ui(f, state, snap))?;
        state.terminal = Some(term);
    }
    Ok(())
}

/// Map a raw terminal event onto a [`UserEvent`], mutating modal state along
/// the way. `None` means the event needs no redraw or action.
pub fn interpret_event(state: &mut UiState, event: Event) -> Option<UserEvent> {
    let key = match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => key,
        Event::Resize(_, _) => return Some(UserEvent::Redraw),
        _ => return None,
    };

    match &mut state.mode {
        Mode::Normal => match key.code {
            KeyCode::Char('q') => {
                state.mode = Mode::QuitModal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Left => Some(UserEvent::PrevChoice),
            KeyCode::Right => Some(UserEvent::NextChoice),
            KeyCode::Char('1') => Some(UserEvent::SelectChoice(Choice::Rock)),
            KeyCode::Char('2') => Some(UserEvent::SelectChoice(Choice::Paper)),
            KeyCode::Char('3') => Some(UserEvent::SelectChoice(Choice::Scissors)),
            KeyCode::Char('b') | KeyCode::Enter => {
                state.mode = Mode::BetModal(BetState::default());
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('u') => {
                state.mode = Mode::UsernameModal(UsernameState::default());
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('l') => {
                state.mode = Mode::LeaderboardModal(LeaderboardState::default());
                Some(UserEvent::OpenLeaderboard)
            }
            KeyCode::Char('c') => Some(UserEvent::ClaimBonus),
            KeyCode::Char('w') => Some(UserEvent::WithdrawPayout),
            KeyCode::Char('r') => Some(UserEvent::Refresh),
            _ => None,
        },
        Mode::BetModal(bet) => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let amount = bet.input.clone();
                state.mode = Mode::Normal;
                Some(UserEvent::ConfirmBet { amount })
            }
            KeyCode::Backspace => {
                bet.input.pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) if c.is_ascii_digit() || c == '.' => {
                if bet.input.len() < 24 {
                    bet.input.push(c);
                }
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::UsernameModal(username) => match key.code {
            KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Enter => {
                let name = username.input.clone();
                state.mode = Mode::Normal;
                Some(UserEvent::ConfirmUsername { name })
            }
            KeyCode::Backspace => {
                username.input.pop();
                Some(UserEvent::Redraw)
            }
            KeyCode::Char(c) if c.is_ascii_alphanumeric() || c == '_' => {
                if username.input.len() < 32 {
                    username.input.push(c);
                }
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::LeaderboardModal(board) => match key.code {
            KeyCode::Esc | KeyCode::Char('q') => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            KeyCode::Char('s') => Some(UserEvent::CycleLeaderboardSort),
            KeyCode::Down | KeyCode::Char('j') => {
                if board.offset + 1 < state.leaderboard_len {
                    board.offset += 1;
                }
                Some(UserEvent::Redraw)
            }
            KeyCode::Up | KeyCode::Char('k') => {
                board.offset = board.offset.saturating_sub(1);
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
        Mode::QuitModal => match key.code {
            KeyCode::Char('y') | KeyCode::Enter => Some(UserEvent::Quit),
            KeyCode::Char('n') | KeyCode::Esc => {
                state.mode = Mode::Normal;
                Some(UserEvent::Redraw)
            }
            _ => None,
        },
    }
}

fn ui(f: &mut Frame, state: &UiState, snap: &AppSnapshot) {
    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(3),
        ])
        .split(f.area());

    draw_header(f, root[0], snap);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(58), Constraint::Percentage(42)])
        .split(root[1]);

    let left = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Length(7),
            Constraint::Min(0),
        ])
        .split(body[0]);
    draw_board(f, left[0], snap);
    draw_round_panel(f, left[1], snap);
    draw_history(f, left[2], snap);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(12), Constraint::Length(8)])
        .split(body[1]);
    draw_stats(f, right[0], snap);
    draw_house(f, right[1], snap);

    draw_status(f, root[2], snap);

    match &state.mode {
        Mode::Normal => {}
        Mode::BetModal(bet) => draw_bet_modal(f, snap, bet),
        Mode::UsernameModal(username) => draw_username_modal(f, snap, username),
        Mode::LeaderboardModal(board) => draw_leaderboard_modal(f, snap, board),
        Mode::QuitModal => draw_quit_modal(f),
    }
}

fn draw_header(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let identity = match &snap.username {
        Some(name) => format!("{name} ({})", format::format_address(&snap.player)),
        None => format::format_address(&snap.player),
    };
    let mut spans = vec![
        Span::styled(
            " ROSHAMBO ",
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(format!(
            "| {identity} | {} ETH | {}",
            format::format_eth(snap.balance, 4),
            snap.network_label
        )),
    ];
    if let Some(bonus) = snap.welcome_bonus {
        spans.push(Span::styled(
            format!(
                " | welcome bonus {} ETH available (c to claim)",
                format::format_eth(bonus, 4)
            ),
            Style::default().fg(Color::Green),
        ));
    }
    if snap.pending_payout > 0 {
        spans.push(Span::styled(
            format!(
                " | pending payout {} ETH (w to withdraw)",
                format::format_eth(snap.pending_payout, 4)
            ),
            Style::default().fg(Color::Cyan),
        ));
    }
    let header = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn draw_board(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Choose Your Weapon (←/→ or 1-3, b to bet) ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let cells = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(33),
            Constraint::Percentage(34),
            Constraint::Percentage(33),
        ])
        .split(inner);

    for (i, choice) in Choice::all_playable().into_iter().enumerate() {
        let selected = snap.selected_choice == choice;
        let style = if selected {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::Gray)
        };
        let cell = Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(choice.emoji().to_string(), style)),
            Line::from(Span::styled(choice.label().to_string(), style)),
        ])
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).border_style(style));
        f.render_widget(cell, cells[i]);
    }
}

fn draw_round_panel(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut lines = vec![
        Line::from(format!(
            "Bet limits: {} - {} ETH | Entropy fee: {} ETH",
            format::format_eth(snap.min_bet, 4),
            format::format_eth(snap.max_bet, 4),
            format::format_eth(snap.entropy_fee, 6),
        )),
        Line::from(format!(
            "A winning bet pays 1.95x ({} ETH on the minimum)",
            format::format_eth(format::potential_win(snap.min_bet), 4)
        )),
    ];
    match (&snap.awaiting_reveal, &snap.last_outcome) {
        (Some(game_id), _) => lines.push(Line::from(Span::styled(
            format!("Game #{game_id}: waiting for the reveal..."),
            Style::default().fg(Color::Cyan),
        ))),
        (None, Some(outcome)) => {
            let (label, color) = match outcome.result {
                GameOutcome::Win => ("WIN", Color::Green),
                GameOutcome::Loss => ("LOSS", Color::Red),
                GameOutcome::Draw => ("DRAW", Color::Yellow),
                GameOutcome::Pending => ("PENDING", Color::Gray),
            };
            lines.push(Line::from(vec![
                Span::styled(
                    format!("Game #{}: {label} ", outcome.game_id),
                    Style::default().fg(color).add_modifier(Modifier::BOLD),
                ),
                Span::raw(format!(
                    "{} vs {} | payout {} ETH | proof {}",
                    outcome.player_choice.emoji(),
                    outcome.house_choice.emoji(),
                    format::format_eth(outcome.payout, 4),
                    format::format_hash(&outcome.random_number),
                )),
            ]));
        }
        (None, None) => lines.push(Line::from(Span::styled(
            "No game in flight",
            Style::default().fg(Color::DarkGray),
        ))),
    }
    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Round "));
    f.render_widget(panel, area);
}

fn history_line(record: &GameRecord) -> Line<'static> {
    let (label, color) = match record.result {
        GameOutcome::Win => ("Win ", Color::Green),
        GameOutcome::Loss => ("Loss", Color::Red),
        GameOutcome::Draw => ("Draw", Color::Yellow),
        GameOutcome::Pending => ("....", Color::DarkGray),
    };
    let net = if record.result.is_resolved() {
        format::format_eth_signed(
            crate::stats::signed_delta(record.payout, record.bet_amount),
            4,
        )
    } else {
        String::from("-")
    };
    Line::from(vec![
        Span::raw(format!("#{:<5} ", record.game_id)),
        Span::raw(format!(
            "{} vs {} ",
            record.player_choice.emoji(),
            record.house_choice.emoji()
        )),
        Span::styled(label, Style::default().fg(color)),
        Span::raw(format!(
            " {:>12} {}",
            net,
            format::format_timestamp(record.timestamp)
        )),
    ])
}

fn draw_history(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let items: Vec<ListItem> = snap
        .history
        .iter()
        .map(|record| ListItem::new(history_line(record)))
        .collect();
    let title = format!(
        " Your Game History ({} shown, {} total) ",
        snap.history.len(),
        snap.stats.total_games + snap.stats.in_flight
    );
    let list = if items.is_empty() {
        List::new([ListItem::new(Line::from(Span::styled(
            "No games yet. Your history will appear here after you play.",
            Style::default().fg(Color::DarkGray),
        )))])
    } else {
        List::new(items)
    };
    f.render_widget(
        list.block(Block::default().borders(Borders::ALL).title(title)),
        area,
    );
}

fn draw_stats(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let stats = &snap.stats;
    let block = Block::default().borders(Borders::ALL).title(" Your Stats ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(inner);

    let win_rate_gauge = Gauge::default()
        .block(Block::default().title(format!("Win rate {:.1}%", stats.win_rate)))
        .gauge_style(Style::default().fg(Color::Green))
        .percent(stats.win_rate.round().clamp(0.0, 100.0) as u16);
    f.render_widget(win_rate_gauge, rows[0]);

    let dist = &stats.choice_distribution;
    let lines = vec![
        Line::from(format!(
            "Games: {} ({} in flight)",
            stats.total_games, stats.in_flight
        )),
        Line::from(vec![
            Span::styled(
                format!("W {} ", stats.wins),
                Style::default().fg(Color::Green),
            ),
            Span::styled(
                format!("L {} ", stats.losses),
                Style::default().fg(Color::Red),
            ),
            Span::styled(
                format!("D {}", stats.draws),
                Style::default().fg(Color::Yellow),
            ),
        ]),
        Line::from(format!(
            "Streak: {} now / {} best{}",
            stats.current_streak,
            stats.best_streak,
            if stats.best_streak >= 5 { " 🔥" } else { "" }
        )),
        Line::from(format!(
            "Wagered: {} ETH | Paid out: {} ETH",
            format::format_eth(stats.total_bet, 4),
            format::format_eth(stats.total_payout, 4),
        )),
        Line::from(Span::styled(
            format!(
                "Net profit: {} ETH",
                format::format_eth_signed(stats.net_profit, 4)
            ),
            Style::default().fg(if stats.net_profit >= 0 {
                Color::Green
            } else {
                Color::Red
            }),
        )),
        Line::from(format!(
            "Hands: ✊ {}  ✋ {}  ✌ {}",
            dist.rock, dist.paper, dist.scissors
        )),
    ];
    f.render_widget(Paragraph::new(lines), rows[1]);
}

fn draw_house(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let lines = match &snap.house {
        Some(house) => vec![
            Line::from(format!("Total games: {}", house.total_games)),
            Line::from(format!(
                "Player wins {} / losses {} / draws {}",
                house.wins, house.losses, house.draws
            )),
            Line::from(format!(
                "House balance: {} ETH",
                format::format_eth(house.house_balance, 4)
            )),
            Line::from(Span::styled(
                format!(
                    "Contract {}",
                    format::format_address(&snap.contract_address)
                ),
                Style::default().fg(Color::DarkGray),
            )),
        ],
        None => vec![Line::from(Span::styled(
            "Loading house statistics...",
            Style::default().fg(Color::DarkGray),
        ))],
    };
    let panel = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" House (l for leaderboard) "),
    );
    f.render_widget(panel, area);
}

fn draw_status(f: &mut Frame, area: Rect, snap: &AppSnapshot) {
    let mut spans = vec![Span::raw(snap.status.clone())];
    if let Some(error) = snap.errors.first() {
        spans.push(Span::styled(
            format!("  !  {error}"),
            Style::default().fg(Color::Red),
        ));
    }
    let status = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Status (r refresh, u username, q quit) "),
    );
    f.render_widget(status, area);
}

fn draw_bet_modal(f: &mut Frame, snap: &AppSnapshot, bet: &BetState) {
    let area = centered_rect(46, 9, f.area());
    f.render_widget(Clear, area);
    let preview = format::parse_eth(&bet.input)
        .map(|wei| {
            format!(
                "Potential win: {} ETH (fee {} ETH)",
                format::format_eth(format::potential_win(wei), 4),
                format::format_eth(snap.entropy_fee, 6)
            )
        })
        .unwrap_or_else(|_| String::from("Enter an amount in ETH"));
    let lines = vec![
        Line::from(format!("Bet on {}", snap.selected_choice)),
        Line::from(""),
        Line::from(format!("Amount: {}_", bet.input)),
        Line::from(Span::styled(
            preview,
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(""),
        Line::from(Span::styled(
            "Enter to place | Esc to cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let modal = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Place Bet ")
            .border_style(Style::default().fg(Color::Yellow)),
    );
    f.render_widget(modal, area);
}

fn draw_username_modal(f: &mut Frame, snap: &AppSnapshot, username: &UsernameState) {
    let area = centered_rect(46, 8, f.area());
    f.render_widget(Clear, area);
    let current = snap
        .username
        .clone()
        .unwrap_or_else(|| String::from("(none)"));
    let lines = vec![
        Line::from(format!("Current username: {current}")),
        Line::from(""),
        Line::from(format!("New name: {}_", username.input)),
        Line::from(""),
        Line::from(Span::styled(
            "Enter to save | Esc to cancel",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    let modal = Paragraph::new(lines).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" Set Username ")
            .border_style(Style::default().fg(Color::Cyan)),
    );
    f.render_widget(modal, area);
}

fn leaderboard_line(rank: usize, entry: &LeaderboardEntry, you: bool) -> Line<'static> {
    let name = entry
        .username
        .clone()
        .unwrap_or_else(|| format::format_address(&entry.address));
    let marker = match rank {
        1 => "👑",
        2 => "🥈",
        3 => "🥉",
        _ => "  ",
    };
    let style = if you {
        Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Line::from(vec![
        Span::raw(format!("{rank:>3} {marker} ")),
        Span::styled(format!("{name:<24} "), style),
        Span::raw(format!(
            "wins {:>4} | streak {:>3} | {:>5.1}% | ",
            entry.wins, entry.max_streak, entry.win_rate
        )),
        Span::styled(
            format!("{} ETH", format::format_eth_signed(entry.profit, 4)),
            Style::default().fg(if entry.profit >= 0 {
                Color::Green
            } else {
                Color::Red
            }),
        ),
    ])
}

fn draw_leaderboard_modal(f: &mut Frame, snap: &AppSnapshot, board: &LeaderboardState) {
    let area = centered_rect(78, 24, f.area());
    f.render_widget(Clear, area);
    let items: Vec<ListItem> = if snap.leaderboard.is_empty() {
        vec![ListItem::new(Line::from(Span::styled(
            "No players yet. Be the first!",
            Style::default().fg(Color::DarkGray),
        )))]
    } else {
        snap.leaderboard
            .iter()
            .enumerate()
            .skip(board.offset)
            .map(|(i, entry)| {
                ListItem::new(leaderboard_line(i + 1, entry, entry.address == snap.player))
            })
            .collect()
    };
    let list = List::new(items).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!(
                " Leaderboard - {} (s to change, j/k scroll, Esc close) ",
                snap.leaderboard_sort.label()
            ))
            .border_style(Style::default().fg(Color::Magenta)),
    );
    f.render_widget(list, area);
}

fn draw_quit_modal(f: &mut Frame) {
    let area = centered_rect(36, 5, f.area());
    f.render_widget(Clear, area);
    let modal = Paragraph::new(vec![
        Line::from("Quit roshambo?"),
        Line::from(Span::styled(
            "y to quit | n to stay",
            Style::default().fg(Color::DarkGray),
        )),
    ])
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red)),
    );
    f.render_widget(modal, area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
