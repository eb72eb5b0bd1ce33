use tokio::sync::broadcast;
use uuid::Uuid;

/// Completion notification for one finished derivation. Transient; never
/// persisted, observers that connect later simply miss it.
#[derive(Debug, Clone)]
pub(crate) enum PlateEvent {
    MetadataExtracted { plate_id: Uuid, captured_at: String },
    ThumbnailReady { plate_id: Uuid, thumbnail: String },
}

impl PlateEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            PlateEvent::MetadataExtracted { .. } => "MetadataExtracted",
            PlateEvent::ThumbnailReady { .. } => "ThumbnailReady",
        }
    }

    pub fn plate_id(&self) -> Uuid {
        match self {
            PlateEvent::MetadataExtracted { plate_id, .. } => *plate_id,
            PlateEvent::ThumbnailReady { plate_id, .. } => *plate_id,
        }
    }

    /// Wire payload observers receive: the plate id concatenated with the
    /// resolved timestamp, or the derived file name.
    pub fn payload(&self) -> String {
        match self {
            PlateEvent::MetadataExtracted {
                plate_id,
                captured_at,
            } => format!("{plate_id}{captured_at}"),
            PlateEvent::ThumbnailReady { thumbnail, .. } => thumbnail.clone(),
        }
    }
}

#[derive(Clone)]
pub(crate) struct Broadcaster {
    tx: broadcast::Sender<PlateEvent>,
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Fire-and-forget fan-out. No observers connected is not an error.
    pub fn publish(&self, event: PlateEvent) {
        tracing::debug!(
            event = event.event_type(),
            plate_id = %event.plate_id(),
            "publishing completion event"
        );
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlateEvent> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
