use crate::error::EventBusError;
use crate::surface::{CaptureStatus, InputMode};
use crate::transport::RetryReason;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events emitted while capturing signatures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SigpadEvent {
    /// The control channel to the pad server went up or down
    ConnectionChanged {
        connected: bool,
        timestamp: SystemTime,
    },
    /// A pad was opened for capture
    PadOpened {
        pad_type: String,
        serial: String,
        timestamp: SystemTime,
    },
    /// The surface switched between freehand and hardware input
    InputModeChanged { mode: InputMode },
    /// Hardware capture status changed
    CaptureStatusChanged { status: CaptureStatus },
    /// The pad restarted the signature, either by button or as a false start
    SignatureRetried { reason: RetryReason },
    /// A value was handed to the consumer
    OutputPublished { empty: bool, timestamp: SystemTime },
    /// A component reported an error
    SystemError { component: String, error: String },
}

impl SigpadEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SigpadEvent::ConnectionChanged { connected, .. } => format!(
                "Pad server {}",
                if *connected {
                    "connected"
                } else {
                    "disconnected"
                }
            ),
            SigpadEvent::PadOpened {
                pad_type, serial, ..
            } => format!("Pad opened: {} ({})", pad_type, serial),
            SigpadEvent::InputModeChanged { mode } => format!("Input mode: {:?}", mode),
            SigpadEvent::CaptureStatusChanged { status } => {
                format!("Capture status: {:?}", status)
            }
            SigpadEvent::SignatureRetried { reason } => format!("Signature retried: {}", reason),
            SigpadEvent::OutputPublished { empty, .. } => {
                if *empty {
                    "Signature cleared".to_string()
                } else {
                    "Signature image published".to_string()
                }
            }
            SigpadEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SigpadEvent::ConnectionChanged { .. } => "connection_changed",
            SigpadEvent::PadOpened { .. } => "pad_opened",
            SigpadEvent::InputModeChanged { .. } => "input_mode_changed",
            SigpadEvent::CaptureStatusChanged { .. } => "capture_status_changed",
            SigpadEvent::SignatureRetried { .. } => "signature_retried",
            SigpadEvent::OutputPublished { .. } => "output_published",
            SigpadEvent::SystemError { .. } => "system_error",
        }
    }
}

/// Event bus for surface status updates using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<SigpadEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    /// Subscribe to events and get a receiver
    pub fn subscribe(&self) -> broadcast::Receiver<SigpadEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter and a name used in logs
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers.
    ///
    /// Publishing never blocks; with no subscribers the event is dropped.
    pub fn publish(&self, event: SigpadEvent) -> Result<usize, EventBusError> {
        match &event {
            SigpadEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            SigpadEvent::ConnectionChanged { connected, .. } => {
                if *connected {
                    info!("Pad server connected");
                } else {
                    warn!("Pad server disconnected");
                }
            }
            SigpadEvent::SignatureRetried { reason } => {
                info!("Signature retried: {}", reason);
            }
            _ => {
                if self.debug_logging {
                    debug!("Event: {}", event.description());
                }
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&SigpadEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &SigpadEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<SigpadEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<SigpadEvent>,
        filter: EventFilter,
        name: String,
    ) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<SigpadEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<SigpadEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    return Ok(None);
                }
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
