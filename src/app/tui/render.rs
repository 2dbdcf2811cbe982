use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Cell, Clear, Padding, Paragraph, Row, Table, TableState, Wrap,
};

use super::super::episode::{format_clock, truncate};
use super::super::playback::{
    AccessStage, ContentItem, FeedController, FeedMode, PlaybackState,
};
use super::PendingNotice;
use super::actions::resume_prompt;

pub(super) fn draw_feed(
    frame: &mut Frame,
    controller: &FeedController,
    table_state: &mut TableState,
    status: &str,
    pending_notice: Option<&PendingNotice>,
) {
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    frame.render_widget(header(controller), chunks[0]);

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(chunks[1]);

    table_state.select(controller.cursor());
    let store = controller.store();
    let rows: Vec<Row> = controller
        .slots()
        .iter()
        .map(|slot| {
            let watched = if store.is_watched(&slot.item.item_id) {
                "✓"
            } else {
                ""
            };
            Row::new(vec![
                Cell::from(truncate(&slot.title, 36)),
                Cell::from(slot.item.sequence.to_string()),
                Cell::from(access_label(&slot.item)),
                Cell::from(age_label(slot.age_limit)),
                Cell::from(watched),
            ])
        })
        .collect();
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(50),
            Constraint::Length(5),
            Constraint::Length(12),
            Constraint::Length(6),
            Constraint::Length(4),
        ],
    )
    .header(
        Row::new(vec!["Title", "Ep", "Access", "Age", ""]).style(
            Style::default()
                .fg(Color::Rgb(110, 170, 255))
                .add_modifier(Modifier::BOLD),
        ),
    )
    .block(panel_block("Feed"))
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(110, 170, 255))
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("▸ ");
    frame.render_stateful_widget(table, body_chunks[0], table_state);

    let now_playing = Paragraph::new(now_playing_text(controller))
        .style(Style::default().fg(Color::Rgb(230, 230, 230)))
        .wrap(Wrap { trim: true })
        .block(panel_block("Now Playing"));
    frame.render_widget(now_playing, body_chunks[1]);

    let controls = Paragraph::new(Line::from(Span::styled(
        "↑/k prev  ↓/j next  space pause  ←/→ seek  m mute  r retry  q quit",
        Style::default().fg(Color::Rgb(185, 195, 210)),
    )))
    .alignment(Alignment::Center)
    .block(panel_block("Controls"));
    frame.render_widget(controls, chunks[2]);

    let status_widget = Paragraph::new(status.to_string())
        .style(status_style(status))
        .block(panel_block("Status"));
    frame.render_widget(status_widget, chunks[3]);

    if let Some(mark) = controller.resume_offer() {
        render_modal(
            frame,
            "Resume Watching",
            &resume_prompt(mark.last_sequence, mark.last_timestamp_seconds),
        );
    } else if let Some(notice) = pending_notice {
        render_modal(frame, notice.title, &notice.message);
    }
}

fn header(controller: &FeedController) -> Paragraph<'static> {
    let mode = match controller.mode() {
        FeedMode::Discovery => "DISCOVER".to_string(),
        FeedMode::Episodes { work_id } => controller
            .work_title()
            .map(|title| truncate(title, 32))
            .unwrap_or_else(|| work_id.clone()),
    };
    let position = controller
        .cursor()
        .map(|idx| format!("{} / {}", idx + 1, controller.slots().len()))
        .unwrap_or_else(|| "-".to_string());
    let loading = if controller.is_fetching() {
        "loading..."
    } else if controller.is_exhausted() {
        "end of feed"
    } else {
        ""
    };
    let sound = if controller.is_muted() { "muted" } else { "sound on" };
    let storage = if controller.store().is_persistent() {
        ""
    } else {
        "not saving"
    };

    let dim = Style::default().fg(Color::Rgb(185, 195, 210));
    Paragraph::new(Line::from(vec![
        Span::styled(
            "REELSTATE",
            Style::default()
                .fg(Color::Rgb(110, 170, 255))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(mode, Style::default().fg(Color::Yellow)),
        Span::styled("   ", Style::default()),
        Span::styled(position, dim),
        Span::styled("   ", Style::default()),
        Span::styled(sound, dim),
        Span::styled("   ", Style::default()),
        Span::styled(loading, dim),
        Span::styled("   ", Style::default()),
        Span::styled(storage, Style::default().fg(Color::Rgb(255, 145, 120))),
    ]))
    .alignment(Alignment::Center)
    .block(panel_block("Reelstate"))
}

fn now_playing_text(controller: &FeedController) -> String {
    let Some(slot) = controller.cursor().and_then(|idx| controller.slots().get(idx)) else {
        return if controller.is_fetching() {
            "Loading feed...".to_string()
        } else {
            "Nothing to play yet.".to_string()
        };
    };
    let mut text = format!(
        "Title\n{}\n\nEpisode\n{}\n\nWork ID\n{}\n\n",
        truncate(&slot.title, 40),
        slot.item.sequence,
        truncate(&slot.work_id, 28)
    );
    if let Some(blocked) = controller.blocked() {
        text.push_str(&format!("Locked\n{}", blocked.decision.prompt()));
        return text;
    }
    match controller.pending_access() {
        Some(AccessStage::Checking) => {
            text.push_str("Unlocking\nChecking your access...");
            return text;
        }
        Some(AccessStage::Debiting) => {
            text.push_str("Unlocking\nChecking your coin balance...");
            return text;
        }
        None => {}
    }
    match controller.session() {
        Some(session) => {
            text.push_str(&format!(
                "State\n{}\n\nPosition\n{}",
                session.state().label(),
                format_clock(session.position().max(0.0) as u64)
            ));
            if session.state() == PlaybackState::Error
                && let Some(reason) = session.failure()
            {
                text.push_str(&format!("\n\nError\n{}", truncate(reason, 60)));
            }
        }
        None => text.push_str("State\nIDLE"),
    }
    text
}

fn access_label(item: &ContentItem) -> String {
    match (item.is_premium, item.coin_price) {
        (false, _) => "free".to_string(),
        (true, Some(price)) => format!("{price} coins"),
        (true, None) => "subscriber".to_string(),
    }
}

fn age_label(age_limit: u8) -> String {
    if age_limit == 0 {
        "-".to_string()
    } else {
        format!("{age_limit}+")
    }
}

fn render_modal(frame: &mut Frame, title: &'static str, text: &str) {
    let popup_area = popup_rect_for_text(frame.area(), text);
    render_popup_shadow(frame, popup_area);
    frame.render_widget(Clear, popup_area);
    let popup = Paragraph::new(text.to_string())
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(modal_block(title));
    frame.render_widget(popup, popup_area);
}

fn panel_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(125, 135, 150)))
        .title(title)
}

fn modal_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(
            Style::default()
                .fg(Color::Rgb(160, 190, 235))
                .add_modifier(Modifier::BOLD),
        )
        .title(title)
        .padding(Padding::new(2, 2, 1, 1))
}

fn status_style(status: &str) -> Style {
    if status.starts_with("ERROR:") {
        Style::default()
            .fg(Color::Rgb(255, 145, 120))
            .add_modifier(Modifier::BOLD)
    } else if status.starts_with("INFO:") {
        Style::default().fg(Color::Rgb(205, 165, 255))
    } else {
        Style::default().fg(Color::Rgb(230, 235, 242))
    }
}

fn render_popup_shadow(frame: &mut Frame, popup_area: Rect) {
    let area = frame.area();
    let shadow = Rect::new(
        (popup_area.x + 1).min(area.x + area.width.saturating_sub(1)),
        (popup_area.y + 1).min(area.y + area.height.saturating_sub(1)),
        popup_area.width.saturating_sub(1),
        popup_area.height.saturating_sub(1),
    );
    if shadow.width == 0 || shadow.height == 0 {
        return;
    }
    let shadow_block = Block::default().style(Style::default().bg(Color::Rgb(14, 16, 24)));
    frame.render_widget(shadow_block, shadow);
}

fn popup_rect_for_text(area: Rect, text: &str) -> Rect {
    let widest = text
        .lines()
        .map(|line| line.chars().count() as u16)
        .max()
        .unwrap_or(0);
    let line_count = text.lines().count() as u16;

    let available_width = area.width.saturating_sub(2).max(1);
    let width = widest
        .saturating_add(12)
        .clamp(40.min(available_width), 72.min(available_width));
    let available_height = area.height.saturating_sub(2).max(1);
    let height = line_count
        .saturating_add(4)
        .clamp(7.min(available_height), 16.min(available_height));

    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width, height)
}
