//! Ready condition bookkeeping on the App status

use appop_core::{App, AppStatus, READY_CONDITION};
use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Condition, Time};

/// Reason recorded when every managed resource matches the App
pub const REASON_CONVERGED: &str = "Converged";

/// Longest condition message the API server accepts
const MAX_MESSAGE_LEN: usize = 32768;

fn condition(status: &str, reason: &str, message: String, generation: Option<i64>) -> Condition {
    Condition {
        type_: READY_CONDITION.to_string(),
        status: status.to_string(),
        reason: reason.to_string(),
        message: truncate(message),
        observed_generation: generation,
        last_transition_time: Time(Utc::now()),
    }
}

fn truncate(mut message: String) -> String {
    if message.len() > MAX_MESSAGE_LEN {
        let mut end = MAX_MESSAGE_LEN;
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        message.truncate(end);
    }
    message
}

/// Ready=True after a successful reconciliation
pub fn ready(generation: Option<i64>) -> Condition {
    condition(
        "True",
        REASON_CONVERGED,
        "Deployment and Service match the App".to_string(),
        generation,
    )
}

/// Ready=False after a reconciliation that will not succeed on retry
pub fn failed(reason: &str, message: impl Into<String>, generation: Option<i64>) -> Condition {
    condition("False", reason, message.into(), generation)
}

/// Insert or replace the condition of the same type
///
/// The transition time of the existing condition is kept while its status
/// does not change.
pub fn upsert(conditions: &mut Vec<Condition>, mut new: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == new.type_) {
        Some(existing) => {
            if existing.status == new.status {
                new.last_transition_time = existing.last_transition_time.clone();
            }
            *existing = new;
        }
        None => conditions.push(new),
    }
}

/// Whether the App reports Ready=True for its current generation
pub fn is_ready(app: &App) -> bool {
    app.ready_condition().is_some_and(|c| {
        c.status == "True"
            && (c.observed_generation.is_none() || c.observed_generation == app.metadata.generation)
    })
}

/// Status of `app`, created empty if absent
pub fn status_mut(app: &mut App) -> &mut AppStatus {
    app.status.get_or_insert_with(AppStatus::default)
}
