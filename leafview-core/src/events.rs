use serde::Serialize;
use tokio::sync::mpsc;

use crate::barrier::{BatchId, RevealEvent};
use crate::window::WindowId;

/// Messages sent from the coordinator to the frontend.
#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum CoordinatorEvent {
    FileOpened {
        window: WindowId,
        file_path: String,
        page: usize,
        page_count: usize,
    },
    OpenFailed {
        window: WindowId,
        file_path: String,
        reason: String,
    },
    /// Shown to the user as a notification.
    FileNotFound {
        file_path: String,
    },
    Revealed(RevealEvent),
    RestoreDropped {
        batch: Option<BatchId>,
        reason: String,
    },
    /// Focus settled on `window`; its list views may need a refresh.
    RefreshLists {
        window: WindowId,
    },
}

pub type EventSender = mpsc::UnboundedSender<CoordinatorEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<CoordinatorEvent>;

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Deliver `event`, ignoring a frontend that stopped listening.
pub(crate) fn emit(events: &EventSender, event: CoordinatorEvent) {
    if events.send(event).is_err() {
        log::debug!("Coordinator event dropped: receiver closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(CoordinatorEvent::FileNotFound {
            file_path: "/gone.cbz".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "FileNotFound");
        assert_eq!(json["file_path"], "/gone.cbz");
    }

    #[test]
    fn reveal_event_flattens_into_tagged_object() {
        let batch = BatchId::new();
        let json = serde_json::to_value(CoordinatorEvent::Revealed(RevealEvent {
            batch,
            frames: Vec::new(),
        }))
        .unwrap();
        assert_eq!(json["type"], "Revealed");
        assert_eq!(json["batch"], batch.to_string());
        assert!(json["frames"].as_array().unwrap().is_empty());
    }
}
