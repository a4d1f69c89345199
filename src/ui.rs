use crate::app::{App, Confirm, InputMode};
use crate::cache::CachedList;
use crate::models::{Priority, Task};
use crate::routes::Route;
use crate::stats::{DueBucket, Statistics};
use crate::tasks::SortOrder;
use chrono::Utc;
use crossterm::event::{self, Event as CEvent, KeyEventKind};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{
        Bar, BarChart, BarGroup, Block, Borders, Cell, Clear, List, ListItem, Paragraph, Row,
        Table, Wrap,
    },
    Frame, Terminal,
};
use std::io;
use std::time::Duration;

fn centered_rect_absolute(width: u16, height: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length((r.height.saturating_sub(height)) / 2),
                Constraint::Length(height),
                Constraint::Length((r.height.saturating_sub(height) + 1) / 2),
            ]
            .as_ref(),
        )
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Length((r.width.saturating_sub(width)) / 2),
                Constraint::Length(width),
                Constraint::Length((r.width.saturating_sub(width) + 1) / 2),
            ]
            .as_ref(),
        )
        .split(popup_layout[1])[1]
}

fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::Low => Color::Green,
        Priority::Medium => Color::Yellow,
        Priority::High => Color::Red,
    }
}

fn key_hint(key: &'static str, action: &'static str) -> Vec<Span<'static>> {
    vec![
        Span::styled(format!(" {} ", key), Style::default().fg(Color::Red)),
        Span::raw(format!(": {} ", action)),
    ]
}

fn get_legend(app: &App) -> Text<'static> {
    let hints: Vec<(&'static str, &'static str)> = match (&app.input_mode, &app.route) {
        (InputMode::Normal, Route::Home) => {
            vec![("n", "New List"), ("o", "Open List"), ("q", "Quit")]
        }
        (InputMode::Normal, Route::List(_)) => vec![
            ("j/k", "Move"),
            ("Space", "Done"),
            ("p", "Priority"),
            ("e", "Edit"),
            ("d", "Due Date"),
            ("a", "Add"),
            ("x", "Delete"),
            ("s", "Sort"),
            ("h", "Hide Done"),
            ("c", "Charts"),
            ("?", "Help"),
            ("q", "Quit"),
        ],
        (InputMode::Normal, Route::Charts(_)) => {
            vec![("Esc", "Back to List"), ("r", "Refresh"), ("q", "Quit")]
        }
        (InputMode::EditDescription, _) => vec![("Enter", "Save"), ("Esc", "Save")],
        (InputMode::EditDueDate, _) | (InputMode::OpenList, _) => {
            vec![("Enter", "Submit"), ("Esc", "Cancel")]
        }
        (InputMode::Confirm(_), _) => vec![("y", "Confirm"), ("any", "Cancel")],
    };
    Text::from(Line::from(
        hints
            .into_iter()
            .flat_map(|(key, action)| key_hint(key, action))
            .collect::<Vec<_>>(),
    ))
}

pub fn draw(f: &mut Frame, app: &mut App) {
    let size = f.area();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(0)
        .constraints(
            [
                Constraint::Length(3),
                Constraint::Min(0),
                Constraint::Length(1),
                Constraint::Length(2),
            ]
            .as_ref(),
        )
        .split(size);

    draw_header(f, app, chunks[0]);

    match app.route.clone() {
        Route::Home => draw_home(f, chunks[1]),
        Route::List(_) => draw_list(f, app, chunks[1]),
        Route::Charts(_) => draw_charts(f, app, chunks[1]),
    }

    draw_status(f, app, chunks[2]);

    let legend = Paragraph::new(get_legend(app))
        .style(Style::default().fg(Color::White))
        .alignment(Alignment::Left)
        .wrap(Wrap { trim: true });
    f.render_widget(legend, chunks[3]);

    draw_popups(f, app, chunks[1]);
}

fn draw_header(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = vec![Span::styled(
        "ToDo List",
        Style::default()
            .fg(Color::Magenta)
            .add_modifier(Modifier::BOLD),
    )];
    if let Some(link) = app.share_link() {
        spans.push(Span::raw("  Share: "));
        spans.push(Span::styled(link, Style::default().fg(Color::Cyan)));
    }
    let header = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

fn draw_home(f: &mut Frame, area: Rect) {
    let lines = vec![
        Line::from(Span::styled(
            "Create a new ToDo List",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from("If you don't have any ToDo lists yet or you want to create a new one, press n."),
        Line::from(""),
        Line::from(Span::styled(
            "Open an existing list",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from("Press o and paste a list id or a shared link."),
    ];
    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Home"))
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, area);
}

/// Renders "Loading..." or "Invalid todolist ID" for lists we cannot show.
fn draw_placeholder(f: &mut Frame, cached: &CachedList, area: Rect) -> bool {
    let text = match cached {
        CachedList::Unloaded => "Loading...",
        CachedList::NotFound => "Invalid todolist ID",
        CachedList::Loaded(_) => return false,
    };
    let paragraph = Paragraph::new(text).block(Block::default().borders(Borders::ALL));
    f.render_widget(paragraph, area);
    true
}

fn task_row<'a>(idx: usize, task: &'a Task, editing: Option<&'a str>) -> Row<'a> {
    let check = if task.completed { "[x]" } else { "[ ]" };
    let description = match editing {
        Some(buffer) => Cell::from(Span::styled(
            format!("{}_", buffer),
            Style::default().fg(Color::Black).bg(Color::White),
        )),
        None => Cell::from(task.description.as_str()),
    };
    Row::new(vec![
        Cell::from((idx + 1).to_string()),
        Cell::from(check),
        Cell::from(Span::styled(
            task.priority.label(),
            Style::default().fg(priority_color(task.priority)),
        )),
        description,
        Cell::from(task.created_at.format("%Y-%m-%d").to_string()),
        Cell::from(task.due_date.format("%Y-%m-%d").to_string()),
    ])
}

fn draw_list(f: &mut Frame, app: &mut App, area: Rect) {
    if draw_placeholder(f, &app.cached(), area) {
        return;
    }

    let visible = app.visible();
    let selected = app.state.selected();
    let editing = app.input_mode == InputMode::EditDescription;

    let title = format!(
        "Tasks ({}) - sort: {}",
        if app.hide_completed { "Undone" } else { "All" },
        app.sort_order.label()
    );

    let rows: Vec<Row> = visible
        .iter()
        .enumerate()
        .map(|(idx, task)| {
            let buffer = (editing && selected == Some(idx)).then_some(app.input.as_str());
            task_row(idx, task, buffer)
        })
        .collect();

    let widths = [
        Constraint::Length(4),
        Constraint::Length(4),
        Constraint::Length(7),
        Constraint::Min(20),
        Constraint::Length(11),
        Constraint::Length(11),
    ];
    let header = Row::new(vec![
        "#",
        "Done",
        "Priority",
        "Task description",
        "Created",
        "Due date",
    ])
    .style(Style::default().add_modifier(Modifier::BOLD));

    let table = if rows.is_empty() {
        Table::new(vec![Row::new(vec!["", "", "", "No tasks yet, press a to add one"])], widths)
    } else {
        Table::new(rows, widths)
    }
    .header(header)
    .block(Block::default().borders(Borders::ALL).title(title))
    .highlight_style(
        Style::default()
            .fg(Color::Green)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol(">> ");

    // The title doubles as the sort menu's trigger.
    app.collapsables
        .set_trigger(app.sort_menu, Rect::new(area.x, area.y, area.width, 1));
    f.render_stateful_widget(table, area, &mut app.state);
}

fn draw_charts(f: &mut Frame, app: &App, area: Rect) {
    let cached = app.cached();
    if draw_placeholder(f, &cached, area) {
        return;
    }
    let tasks = cached.list().map(|l| l.tasks.as_slice()).unwrap_or_default();
    let stats = Statistics::derive(tasks, Utc::now());

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)].as_ref())
        .split(area);

    let bars: Vec<Bar> = stats
        .bars
        .iter()
        .map(|bar| {
            let color = match bar.bucket {
                DueBucket::Remaining => Color::Green,
                DueBucket::Overdue => Color::Red,
            };
            Bar::default()
                .value(bar.days.unsigned_abs())
                .text_value(bar.days.to_string())
                .label(Line::from(bar.name.clone()))
                .style(Style::default().fg(color))
        })
        .collect();
    let due_chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("Days until due (red: overdue)"),
        )
        .bar_width(5)
        .bar_gap(1)
        .data(BarGroup::default().bars(&bars));
    f.render_widget(due_chart, chunks[0]);

    let counts = stats.counts;
    let breakdown = [
        ("Completed", counts.completed, Color::Green),
        ("Overdue", counts.overdue, Color::Red),
        ("Pending", counts.pending, Color::Yellow),
    ];
    let status_bars: Vec<Bar> = breakdown
        .iter()
        .map(|(name, count, color)| {
            Bar::default()
                .value(*count as u64)
                .label(Line::from(*name))
                .style(Style::default().fg(*color))
        })
        .collect();
    let status_chart = BarChart::default()
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Task status ({} total)", counts.total())),
        )
        .bar_width(9)
        .bar_gap(2)
        .data(BarGroup::default().bars(&status_bars));
    f.render_widget(status_chart, chunks[1]);
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let mut spans = Vec::new();
    if app.pending_mutations() > 0 {
        spans.push(Span::styled("Saving... ", Style::default().fg(Color::Yellow)));
    } else if app.is_refreshing() {
        spans.push(Span::styled("Refreshing... ", Style::default().fg(Color::DarkGray)));
    }
    if let Some(status) = &app.status {
        spans.push(Span::styled(status.clone(), Style::default().fg(Color::Red)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

// 60% of the body, never narrower than 20 columns.
fn popup_width(body: Rect) -> u16 {
    ((u32::from(body.width) * 60 / 100) as u16).max(20)
}

fn draw_input_popup(f: &mut Frame, title: &str, value: &str, body: Rect) {
    let width = popup_width(body);
    let area = centered_rect_absolute(width, 3, body);
    let input = Paragraph::new(format!("{}_", value))
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .title(title.to_string())
                .borders(Borders::ALL)
                .style(Style::default().fg(Color::Green)),
        );
    f.render_widget(Clear, area);
    f.render_widget(input, area);
}

fn draw_popups(f: &mut Frame, app: &mut App, body: Rect) {
    match app.input_mode {
        InputMode::EditDueDate => draw_input_popup(
            f,
            "Due date (YYYY-MM-DD, today, tomorrow, +Nd)",
            &app.input,
            body,
        ),
        InputMode::OpenList => draw_input_popup(f, "List id or shared link", &app.input, body),
        InputMode::Confirm(action) => {
            let question = match action {
                Confirm::DeleteAllTasks => "Delete every task in this list? (y/n)",
                Confirm::DeleteList => "Delete this list and all its tasks? (y/n)",
            };
            let area = centered_rect_absolute(50, 3, body);
            let popup = Paragraph::new(question).block(
                Block::default()
                    .borders(Borders::ALL)
                    .style(Style::default().fg(Color::Red)),
            );
            f.render_widget(Clear, area);
            f.render_widget(popup, area);
        }
        _ => {}
    }

    if app.collapsables.is_open(app.sort_menu) {
        let area = Rect::new(
            body.x + 1,
            body.y + 1,
            24.min(body.width),
            (SortOrder::ALL.len() as u16 + 2).min(body.height),
        );
        let items: Vec<ListItem> = SortOrder::ALL
            .iter()
            .map(|order| ListItem::new(order.label()))
            .collect();
        let menu = List::new(items)
            .block(Block::default().borders(Borders::ALL).title("Sort by"))
            .highlight_style(Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
            .highlight_symbol(">> ");
        app.collapsables.set_area(app.sort_menu, area);
        f.render_widget(Clear, area);
        f.render_stateful_widget(menu, area, &mut app.sort_menu_state);
    }

    if app.collapsables.is_open(app.help) {
        let lines = vec![
            Line::from("Space  toggle completed"),
            Line::from("p      cycle priority (Low, Medium, High)"),
            Line::from("e      edit description, Enter or Esc saves"),
            Line::from("d      set due date"),
            Line::from("a      add task    x  delete task"),
            Line::from("D      delete all tasks"),
            Line::from("X      delete this list"),
            Line::from("s      sort menu   h  hide completed"),
            Line::from("c      charts      r  refresh"),
            Line::from("o      home        ?  close help"),
        ];
        let area = centered_rect_absolute(50, lines.len() as u16 + 2, body);
        let help = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title("Help"))
            .wrap(Wrap { trim: false });
        app.collapsables.set_area(app.help, area);
        f.render_widget(Clear, area);
        f.render_widget(help, area);
    }
}

pub async fn run_app<B: Backend>(terminal: &mut Terminal<B>, mut app: App) -> io::Result<()> {
    loop {
        app.tick().await;
        terminal.draw(|f| draw(f, &mut app))?;

        // Handle input
        if event::poll(Duration::from_millis(100))? {
            match event::read()? {
                CEvent::Key(key) if key.kind == KeyEventKind::Press => {
                    let should_quit = app.handle_input(key).await?;
                    if should_quit {
                        return Ok(());
                    }
                }
                CEvent::Mouse(mouse) => app.handle_mouse(mouse),
                _ => {}
            }
        }
    }
}
