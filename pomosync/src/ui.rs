use crate::app::{App, AppMode};
use pomosync_ipc::TimerType;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Gauge, Paragraph, Tabs},
    Frame,
};

pub fn draw(f: &mut Frame, app: &App) {
    let area = f.area();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(5),
            Constraint::Min(4),
            Constraint::Length(1),
        ])
        .split(area);

    draw_header(f, chunks[0], app);
    draw_tabs(f, chunks[1], app);
    draw_countdown(f, chunks[2], app);
    draw_session(f, chunks[3], app);
    draw_status_bar(f, chunks[4], app);

    match app.mode {
        AppMode::EditingTask => draw_input_overlay(f, "Task", app),
        AppMode::EditingDuration(timer_type) => {
            let title = format!("{} length (min or MM:SS)", timer_type.label());
            draw_input_overlay(f, &title, app)
        }
        AppMode::Normal => {}
    }
}

fn draw_header(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let (link, link_color) = if app.snapshot.connected {
        ("● online", theme.long_break)
    } else {
        ("○ offline", theme.warning)
    };
    let text = Line::from(vec![
        Span::raw("⟪ "),
        Span::styled(
            "POMOSYNC",
            Style::default()
                .fg(theme.phase(app.snapshot.timer_type))
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" ⟫  "),
        Span::styled(link, Style::default().fg(link_color)),
    ]);
    f.render_widget(
        Paragraph::new(text).alignment(Alignment::Center).block(
            Block::default()
                .borders(Borders::BOTTOM)
                .border_style(Style::default().fg(theme.gray)),
        ),
        area,
    );
}

fn draw_tabs(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let selected = TimerType::ALL
        .iter()
        .position(|t| *t == app.view)
        .unwrap_or(0);
    let titles = TimerType::ALL.iter().map(|t| {
        let marker = if *t == app.snapshot.timer_type { "▸ " } else { "  " };
        Line::from(format!("{marker}{}", t.label()))
    });
    f.render_widget(
        Tabs::new(titles)
            .select(selected)
            .style(Style::default().fg(theme.gray))
            .highlight_style(
                Style::default()
                    .fg(theme.phase(app.view))
                    .add_modifier(Modifier::BOLD),
            )
            .divider("│")
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .border_type(BorderType::Rounded)
                    .border_style(Style::default().fg(theme.gray)),
            ),
        area,
    );
}

fn draw_countdown(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let color = theme.phase(app.view);
    let remaining = app.displayed_remaining();
    let time_str = format_clock(remaining);
    let state = if app.view != app.snapshot.timer_type {
        "up later"
    } else if app.snapshot.is_running() {
        "running"
    } else if app.snapshot.is_paused() {
        "paused"
    } else {
        "ready"
    };

    let block = Block::default()
        .title(Span::styled(
            format!(" {} · {} ", app.view.label(), state),
            Style::default().fg(theme.gray),
        ))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    let v_chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints([Constraint::Length(1), Constraint::Length(1)])
        .split(inner_area);
    f.render_widget(
        Paragraph::new(time_str)
            .style(Style::default().fg(theme.foreground).add_modifier(Modifier::BOLD))
            .alignment(Alignment::Center),
        v_chunks[0],
    );
    let progress = if app.view == app.snapshot.timer_type {
        app.snapshot.progress()
    } else {
        0.0
    };
    f.render_widget(
        Gauge::default()
            .gauge_style(Style::default().fg(color).bg(theme.background))
            .ratio(progress.clamp(0.0, 1.0)),
        v_chunks[1],
    );
}

fn draw_session(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let snapshot = &app.snapshot;
    let task = if snapshot.description.is_empty() {
        Span::styled("no task, press t to set one", Style::default().fg(theme.gray))
    } else {
        Span::styled(snapshot.description.clone(), Style::default().fg(theme.foreground))
    };
    let lock = if snapshot.description_locked { "  [locked]" } else { "" };
    let session = match snapshot.sequence_id {
        Some(id) => format!("session #{id}"),
        None => "new session".to_string(),
    };

    let lines = vec![
        Line::from(vec![Span::raw("Task      "), task, Span::raw(lock)]),
        Line::from(vec![
            Span::raw("Category  "),
            Span::styled(snapshot.category.label(), Style::default().fg(theme.selection)),
        ]),
        Line::from(vec![
            Span::raw("Progress  "),
            Span::styled(
                format!(
                    "step {}/8 · {} pomodoros · {}",
                    snapshot.step + 1,
                    snapshot.completed_work_sessions,
                    session
                ),
                Style::default().fg(theme.gray),
            ),
        ]),
    ];
    f.render_widget(
        Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(theme.gray)),
        ),
        area,
    );
}

fn draw_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let theme = &app.config.theme;
    let (mode_text, mode_color) = match app.mode {
        AppMode::Normal => ("NORMAL", theme.long_break),
        AppMode::EditingTask => ("TASK", theme.warning),
        AppMode::EditingDuration(_) => ("TIME", theme.short_break),
    };
    let help = match (&app.status_message, app.mode) {
        (Some(message), AppMode::Normal) => message.as_str(),
        (None, AppMode::Normal) => {
            "space:start/stop │ r:reset │ t:task │ c:category │ e:length │ tab:view │ q:quit"
        }
        _ => "enter:confirm │ esc:cancel",
    };
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled(
                format!(" {} ", mode_text),
                Style::default()
                    .bg(mode_color)
                    .fg(theme.background)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" "),
            Span::raw(help),
        ]))
        .style(Style::default().bg(theme.background).fg(theme.gray)),
        area,
    );
}

fn draw_input_overlay(f: &mut Frame, title: &str, app: &App) {
    let area = centered_rect(60, 20, f.area());
    f.render_widget(Clear, area);
    let block = Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.config.theme.warning))
        .border_type(BorderType::Double)
        .style(Style::default().bg(app.config.theme.background));
    let inner_area = block.inner(area);
    f.render_widget(block, area);
    f.render_widget(
        Paragraph::new(Line::from(vec![
            Span::styled("▸ ", Style::default().fg(app.config.theme.foreground)),
            Span::styled(
                app.input_buffer.as_str(),
                Style::default().fg(app.config.theme.foreground),
            ),
            Span::styled(
                "▊",
                Style::default()
                    .fg(app.config.theme.foreground)
                    .add_modifier(Modifier::SLOW_BLINK),
            ),
        ])),
        inner_area,
    );
}

pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
