/// Fan-out of formatted lines to room members or to everyone.
///
/// Recipients are snapshotted from the registry first; pushing onto their
/// outbound queues happens after the registry lock is released. A failed
/// push means the recipient's session is already gone. That is logged and
/// skipped: its own task unregisters it.
use tracing::debug;

use super::registry::{ConnId, Recipient, Registry};

/// Deliver `line` to every member of `room` except `exclude`.
///
/// Returns the number of recipients the line was queued for.
pub async fn to_room(
    registry: &Registry,
    room: &str,
    line: &str,
    exclude: Option<ConnId>,
) -> usize {
    let recipients = registry.room_recipients(room, exclude).await;
    deliver(&recipients, line)
}

/// Deliver `line` to every registered connection except `exclude`.
pub async fn to_all(registry: &Registry, line: &str, exclude: Option<ConnId>) -> usize {
    let recipients = registry.all_recipients(exclude).await;
    deliver(&recipients, line)
}

fn deliver(recipients: &[Recipient], line: &str) -> usize {
    let mut delivered = 0;
    for recipient in recipients {
        match recipient.tx.send(line.to_owned()) {
            Ok(()) => delivered += 1,
            Err(_) => debug!(
                conn = %recipient.id,
                name = %recipient.name,
                "broadcast: recipient already gone"
            ),
        }
    }
    delivered
}
