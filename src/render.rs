//! Terminal rendering for agenda-core types, using owo_colors.

use agenda_core::{Event, EventCard, StoreEvent};
use chrono::NaiveDate;
use owo_colors::OwoColorize;

pub trait Render {
    fn render(&self) -> String;
}

fn render_id(event: &Event) -> String {
    match event.id {
        Some(id) => format!("#{}", id),
        None => "#-".to_string(),
    }
}

/// Schedule, address and price, whichever are present.
fn render_details(event: &Event) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(schedule) = &event.schedule {
        parts.push(schedule.clone());
    }
    if let Some(address) = &event.address {
        parts.push(address.clone());
    }
    match event.price {
        Some(price) if price > 0.0 => parts.push(format!("{:.2}", price)),
        Some(_) => parts.push("free".to_string()),
        None => {}
    }

    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" · "))
    }
}

impl Render for Event {
    fn render(&self) -> String {
        let mut line = format!("  {:>5} {}", render_id(self).dimmed(), self.title.bold());
        if let Some(details) = render_details(self) {
            line.push_str(&format!("\n        {}", details.dimmed()));
        }
        line
    }
}

impl Render for EventCard {
    fn render(&self) -> String {
        let liked = if self.liked {
            "♥".red().to_string()
        } else {
            "♡".dimmed().to_string()
        };
        let attending = format!("{} attending", self.headcount.display_value());

        let mut line = format!(
            "  {:>5} {} {} {}",
            render_id(&self.event).dimmed(),
            liked,
            self.event.title.bold(),
            attending.dimmed()
        );
        if self.confirmed {
            line.push_str(&format!(" {}", "✓ going".green()));
        }
        if let Some(details) = render_details(&self.event) {
            line.push_str(&format!("\n          {}", details.dimmed()));
        }
        line
    }
}

impl Render for StoreEvent {
    fn render(&self) -> String {
        match self {
            StoreEvent::CatalogReloaded { count } => {
                format!("{} catalog now lists {} events", "~".yellow(), count)
            }
            StoreEvent::CatalogLoadFailed { message } => {
                format!("{} could not refresh events: {}", "!".red(), message)
            }
            StoreEvent::MembershipChanged {
                kind,
                event_id,
                member,
            } => {
                let symbol = if *member { "+".green().to_string() } else { "-".red().to_string() };
                format!("{} {} #{}", symbol, kind, event_id)
            }
            StoreEvent::RelationReloaded { kind, count } => {
                format!("{} {} set reloaded ({})", "~".yellow(), kind, count)
            }
            StoreEvent::RelationLoadFailed { kind, message } => {
                format!("{} could not refresh {} set: {}", "!".red(), kind, message)
            }
            StoreEvent::RelationCleared { kind } => {
                format!("{} {} set cleared", "-".red(), kind)
            }
            StoreEvent::ToggleCommitted {
                kind,
                event_id,
                member,
            } => {
                let verb = if *member { "saved" } else { "removed" };
                format!("{} {} #{} {}", "✓".green(), kind, event_id, verb)
            }
            StoreEvent::ToggleFailed {
                kind,
                event_id,
                message,
            } => format!("{} {} #{} failed: {}", "✗".red(), kind, event_id, message),
            StoreEvent::HeadcountUpdated {
                event_id,
                headcount,
            } => format!("{} #{} now has {} attending", "~".yellow(), event_id, headcount),
        }
    }
}

/// Human-readable day label (e.g. "Today", "Tomorrow", "Wed Feb 25").
pub fn format_date_label(date: Option<NaiveDate>, today: NaiveDate) -> String {
    let Some(date) = date else {
        return "Date to be announced".to_string();
    };

    match (date - today).num_days() {
        0 => "Today".to_string(),
        1 => "Tomorrow".to_string(),
        _ => date.format("%a %b %-d").to_string(),
    }
}
