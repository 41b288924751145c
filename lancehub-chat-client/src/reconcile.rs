//! Message Reconciliation
//!
//! Merges a confirmed message into the active thread's entries so that one
//! logical send renders exactly once:
//!
//! 1. An entry already carrying the same server id is replaced in place —
//!    this also collapses duplicate deliveries of one server message.
//! 2. A pending entry with the same sender, the same content, and a creation
//!    time within [`PENDING_MERGE_WINDOW_MS`] is replaced in place; local
//!    ids never match server ids, so this is the normal optimistic path.
//! 3. Anything else is a genuinely new message and gets a sorted insert.
//!
//! The step-2 window is a heuristic: two identical messages sent within it
//! could merge into one. The backend offers no client echo-tag to tell them
//! apart, so the behavior is kept as-is.

use crate::thread::ThreadMessage;
use lancehub_chat_protocol::Message;

/// Window within which a confirmed message can claim a pending entry
pub const PENDING_MERGE_WINDOW_MS: i64 = 5_000;

/// How an incoming confirmed message was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Replaced an entry with the same server id (duplicate delivery)
    ReplacedById,
    /// Claimed a pending optimistic entry
    MergedPending,
    /// Inserted as a new message
    Inserted,
}

/// Apply a confirmed message to the thread entries
pub fn reconcile(entries: &mut Vec<ThreadMessage>, incoming: Message) -> Reconciliation {
    if let Some(position) = entries
        .iter()
        .position(|entry| entry.server_id() == Some(incoming.id))
    {
        entries[position] = ThreadMessage::confirmed(incoming);
        return Reconciliation::ReplacedById;
    }

    if let Some(position) = entries.iter().position(|entry| {
        entry.is_pending()
            && entry.sender_id == incoming.sender_id
            && entry.content == incoming.content
            && within_merge_window(entry, &incoming)
    }) {
        entries[position] = ThreadMessage::confirmed(incoming);
        return Reconciliation::MergedPending;
    }

    sorted_insert(entries, ThreadMessage::confirmed(incoming));
    Reconciliation::Inserted
}

/// Re-insert a retained pending entry into a freshly loaded thread
///
/// When a send confirmed while the reload was in flight, the fetched list
/// already contains the confirmed copy and the pending entry is dropped.
/// Returns whether the entry was kept.
pub(crate) fn absorb_pending(entries: &mut Vec<ThreadMessage>, pending: ThreadMessage) -> bool {
    let already_confirmed = entries.iter().any(|entry| {
        !entry.is_pending()
            && entry.sender_id == pending.sender_id
            && entry.content == pending.content
            && (entry.created_at - pending.created_at)
                .num_milliseconds()
                .abs()
                < PENDING_MERGE_WINDOW_MS
    });

    if already_confirmed {
        return false;
    }

    sorted_insert(entries, pending);
    true
}

/// Insert keeping ascending `created_at`; ties go after existing entries
pub(crate) fn sorted_insert(entries: &mut Vec<ThreadMessage>, entry: ThreadMessage) {
    let position = entries
        .iter()
        .rposition(|existing| existing.created_at <= entry.created_at)
        .map(|p| p + 1)
        .unwrap_or(0);
    entries.insert(position, entry);
}

fn within_merge_window(pending: &ThreadMessage, incoming: &Message) -> bool {
    (pending.created_at - incoming.created_at)
        .num_milliseconds()
        .abs()
        < PENDING_MERGE_WINDOW_MS
}
