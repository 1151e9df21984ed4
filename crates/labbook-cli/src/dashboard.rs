//! Experiment dashboard: the filtered listing and the live `watch` view.

use anyhow::Result;
use labbook_core::models::{filter_by_title, Experiment};
use labbook_core::utils::truncate_string;
use labbook_core::{ApiClient, ApiError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use crate::commands::Context;

/// Maximum title width in listing rows
const TITLE_WIDTH: usize = 40;

pub const SESSION_ENDED: &str = "Session ended. Run `labbook login` to sign in again.";

pub fn summary_line(experiment: &Experiment) -> String {
    format!(
        "{:>5}  {:<width$}  {:<12}  {}",
        experiment.id.map(|id| id.to_string()).unwrap_or_default(),
        truncate_string(experiment.title_or_default(), TITLE_WIDTH),
        experiment.status.to_string(),
        experiment.formatted_date(),
        width = TITLE_WIDTH
    )
}

/// Rows for `experiments` matching `term`. Untitled experiments are never listed.
pub fn dashboard_lines(experiments: &[Experiment], term: &str) -> Vec<String> {
    let visible = filter_by_title(experiments, term);
    let mut lines = vec![format!("Experiments ({})", visible.len())];
    if visible.is_empty() {
        lines.push(if term.is_empty() {
            "No experiments found. Create your first experiment!".to_string()
        } else {
            format!("No experiments found. No experiments match \"{}\"", term)
        });
    }
    lines.extend(visible.into_iter().map(summary_line));
    lines
}

pub fn render(experiments: &[Experiment], term: &str) {
    for line in dashboard_lines(experiments, term) {
        println!("{}", line);
    }
}

/// Replace the listing with a reload result. A failed reload empties it and
/// returns the message to show.
fn apply_reload(
    result: Result<Vec<Experiment>, ApiError>,
    experiments: &mut Vec<Experiment>,
) -> Option<String> {
    match result {
        Ok(list) => {
            *experiments = list;
            None
        }
        Err(e) => {
            warn!(error = %e, "Failed to reload experiments");
            experiments.clear();
            Some(format!("Failed to fetch experiments: {}", e.user_message()))
        }
    }
}

async fn reload(client: &ApiClient, experiments: &mut Vec<Experiment>) {
    if let Some(message) = apply_reload(client.list_experiments().await, experiments) {
        println!("{}", message);
    }
}

/// Live dashboard. Typed text replaces the search term, `r` reloads,
/// `d <id>` deletes, `q` quits. Exits when the session ends.
pub async fn watch(ctx: &Context) -> Result<()> {
    ctx.require_login()?;
    let client = ctx.client();

    let mut session_rx = ctx.session.subscribe();
    let mut refresh_rx = ctx.events.subscribe_refresh();
    let mut search_rx = ctx.events.subscribe_search();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut experiments = client.list_experiments().await?;
    println!("Type to filter, `r` to reload, `d <id>` to delete, `q` to quit.");
    render(&experiments, &ctx.events.search_term());

    loop {
        tokio::select! {
            changed = session_rx.changed() => {
                if changed.is_err() || !session_rx.borrow_and_update().is_authenticated {
                    println!("{}", SESSION_ENDED);
                    return Ok(());
                }
            }
            Ok(()) = refresh_rx.changed() => {
                let count = *refresh_rx.borrow_and_update();
                debug!(count, "Reloading dashboard");
                reload(&client, &mut experiments).await;
                render(&experiments, &ctx.events.search_term());
            }
            Ok(()) = search_rx.changed() => {
                let term = search_rx.borrow_and_update().clone();
                render(&experiments, &term);
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                let input = line.trim();
                match input {
                    "q" | "quit" => return Ok(()),
                    "r" | "reload" => ctx.events.trigger_refresh(),
                    _ => match input.strip_prefix("d ").map(|id| id.trim().parse::<i64>()) {
                        Some(Ok(id)) => match client.delete_experiment(id).await {
                            Ok(()) => ctx.events.trigger_refresh(),
                            Err(e) => println!("Failed to delete experiment: {}", e.user_message()),
                        },
                        Some(Err(_)) => println!("Usage: d <id>"),
                        None => ctx.events.set_search_term(input),
                    },
                }
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}
