use std::collections::VecDeque;

use serde::Serialize;

/// Longest record rendering attached to a failure.
pub const MAX_RECORD_NOTE_LENGTH: usize = 1000;

/// Apply `action` to records from the front of `unprocessed` until it is empty,
/// the action fails, or `max_records` is reached.
///
/// Every output of a successful action is appended to `processed` and the
/// record is popped. A failing record stays at the head of `unprocessed`; the
/// error is returned with the record and its index (within this call)
/// attached as context.
///
/// `max_records` is checked before each record and stops the loop once either
/// the records consumed or the outputs generated by this call reach it.
pub fn apply_action<R, O, I, F>(
    unprocessed: &mut VecDeque<R>,
    processed: &mut VecDeque<O>,
    mut action: F,
    max_records: Option<usize>,
) -> Option<anyhow::Error>
where
    R: Serialize,
    I: IntoIterator<Item = O>,
    F: FnMut(&R) -> anyhow::Result<I>,
{
    let already_processed = processed.len();
    let mut index = 0;
    while let Some(record) = unprocessed.front() {
        if let Some(max) = max_records {
            if index >= max || processed.len() - already_processed >= max {
                break;
            }
        }
        match action(record) {
            Ok(outputs) => {
                processed.extend(outputs);
                unprocessed.pop_front();
                index += 1;
            }
            Err(err) => {
                let note = format!("Failed to parse record {index}\n{}", render_record(record));
                return Some(err.context(note));
            }
        }
    }
    None
}

fn render_record<R: Serialize>(record: &R) -> String {
    let rendered = serde_json::to_string(record)
        .unwrap_or_else(|err| format!("<record could not be rendered: {err}>"));
    truncate(&rendered, MAX_RECORD_NOTE_LENGTH)
}

fn truncate(message: &str, max: usize) -> String {
    match message.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &message[..cut]),
        None => message.to_owned(),
    }
}
