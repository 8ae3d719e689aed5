use std::fmt::Write as _;

use review_core::analytics::{AnalyticsSnapshot, RetentionRate};
use review_core::model::{Rating, ReviewSlot, ReviewState, weekday_index};
use review_core::queue::ReviewQueue;
use review_core::scheduler::ScheduledStates;
use services::RatingReceipt;

const TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn queue(queue: &ReviewQueue) -> String {
    let mut out = String::new();
    match &queue.window {
        Some(window) => {
            let capacity = window
                .capacity_limit()
                .map_or_else(|| "unlimited".to_owned(), |c| c.to_string());
            let _ = writeln!(
                out,
                "window {} .. {} (capacity {capacity})",
                window.start.format(TIMESTAMP),
                window.end.format(TIMESTAMP),
            );
        }
        None => out.push_str("no review slots configured\n"),
    }

    for item in &queue.items {
        let due = item
            .state
            .due_at
            .map_or_else(|| "never".to_owned(), |d| d.format(TIMESTAMP).to_string());
        let _ = writeln!(
            out,
            "card {:>6}  {:<8}  v{}  due {due}  presented {}",
            item.flashcard_id.value(),
            item.state.status.as_str(),
            item.state.version,
            item.presented_at.to_rfc3339(),
        );
    }

    let _ = writeln!(
        out,
        "{} of {} eligible, {} deferred, {} already reviewed in this window",
        queue.len(),
        queue.total_eligible,
        queue.deferred,
        queue.served_in_window
    );
    out
}

pub fn receipt(receipt: &RatingReceipt) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "attempt {}: interval {:.2} -> {:.2} days",
        receipt.attempt_id, receipt.interval_before, receipt.interval_after
    );
    out.push_str(&state_line(&receipt.state));
    if receipt.normalized {
        out.push_str("note: stored state was out of range and has been repaired\n");
    }
    out
}

pub fn preview(preview: &ScheduledStates) -> String {
    let mut out = String::new();
    for rating in [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy] {
        let next = preview.select(rating);
        let _ = writeln!(
            out,
            "{:<5}  {:>8.2} days  {}",
            rating.as_str(),
            next.interval_days,
            next.status
        );
    }
    out
}

pub fn slots(slots: &[ReviewSlot]) -> String {
    if slots.is_empty() {
        return "no review slots\n".to_owned();
    }
    let mut out = String::new();
    for s in slots {
        out.push_str(&slot(s));
    }
    out
}

pub fn slot(slot: &ReviewSlot) -> String {
    let id = slot
        .id
        .map_or_else(|| "-".to_owned(), |id| id.to_string());
    let capacity = slot
        .capacity
        .map_or_else(|| "unlimited".to_owned(), |c| c.to_string());
    format!(
        "slot {id}  day {} ({})  {} - {}  capacity {capacity}\n",
        weekday_index(slot.day_of_week),
        slot.day_of_week,
        slot.start_time.format("%H:%M:%S"),
        slot.end_time.format("%H:%M:%S"),
    )
}

pub fn analytics(snapshot: &AnalyticsSnapshot) -> String {
    let retention = match snapshot.retention {
        RetentionRate::NoData => "no data".to_owned(),
        RetentionRate::Rate(rate) => format!("{:.1}%", rate * 100.0),
    };
    let counts = snapshot.rating_counts;
    let mut out = String::new();
    let _ = writeln!(out, "due today       {}", snapshot.due_today);
    let _ = writeln!(
        out,
        "cards           new {}  learning {}  review {}  mastered {}",
        snapshot.new_count,
        snapshot.learning_count,
        snapshot.review_count,
        snapshot.mastered_count
    );
    let _ = writeln!(
        out,
        "attempts        {} between {} and {}",
        snapshot.total_attempts,
        snapshot.window_start.format(TIMESTAMP),
        snapshot.window_end.format(TIMESTAMP)
    );
    let _ = writeln!(
        out,
        "ratings         again {}  hard {}  good {}  easy {}",
        counts.again, counts.hard, counts.good, counts.easy
    );
    let _ = writeln!(out, "retention       {retention}");
    out
}

fn state_line(state: &ReviewState) -> String {
    let due = state
        .due_at
        .map_or_else(|| "never".to_owned(), |d| d.format(TIMESTAMP).to_string());
    format!(
        "card {} is {} (ease {:.2}, reps {}, lapses {}), next due {due}\n",
        state.flashcard_id, state.status, state.ease_factor, state.repetitions, state.lapses
    )
}
