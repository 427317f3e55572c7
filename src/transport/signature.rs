use super::connection::Connection;
use super::pad::{PadHandle, StrokePoint};
use crate::error::TransportError;
use crate::protocol::{Command, ConfirmResult, PadEvent, SignatureDataResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Text shown on the pad while signing
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureRequest {
    pub field_name: String,
    pub custom_text: String,
}

impl SignatureRequest {
    pub fn new<S: Into<String>>(field_name: S, custom_text: S) -> Self {
        Self {
            field_name: field_name.into(),
            custom_text: custom_text.into(),
        }
    }
}

impl From<&crate::config::SignatureConfig> for SignatureRequest {
    fn from(config: &crate::config::SignatureConfig) -> Self {
        Self::new(config.field_name.clone(), config.custom_text.clone())
    }
}

/// Why an attempt restarted on the same open pad
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RetryReason {
    /// Retry button on the pad
    PadButton,
    /// Confirmed with too little ink; retried on the signer's behalf
    TooShort { seconds: f64 },
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryReason::PadButton => write!(f, "retry pressed on pad"),
            RetryReason::TooShort { seconds } => {
                write!(f, "signature too short ({:.2}s)", seconds)
            }
        }
    }
}

/// Live updates delivered while a signature is in progress
#[derive(Debug, Clone, PartialEq)]
pub enum SignatureProgress {
    /// A pen sample, already scaled to display coordinates
    Point(StrokePoint),
    /// The attempt restarted; previously delivered points are void
    Retried(RetryReason),
}

/// Result of a confirmed signature
#[derive(Debug, Clone, PartialEq)]
pub struct SignatureData {
    pub counted_points: u64,
    /// `None` when the pad reports no sample rate
    pub duration_seconds: Option<f64>,
    /// Encoded signature as returned by the pad server
    pub sign_data: String,
}

/// Captured duration in seconds; unknown when the pad reports no sample rate
pub fn signature_duration(counted_points: u64, sample_rate: u32) -> Option<f64> {
    if sample_rate == 0 {
        return None;
    }
    Some(counted_points as f64 / sample_rate as f64)
}

/// False-start filter applied when the signer presses confirm
pub fn is_too_short(seconds: f64, min_duration_seconds: f64) -> bool {
    seconds <= min_duration_seconds
}

/// Drive one signature session until it is confirmed, cancelled or fails.
///
/// Pad events are handled strictly in arrival order. Commands issued in
/// reaction to an event (retry, confirm) complete before the next event is
/// looked at, so points of a new attempt are never mixed into the old one.
pub(crate) async fn drive<F>(
    connection: &Connection,
    pad: &PadHandle,
    events: &mut mpsc::UnboundedReceiver<PadEvent>,
    cancel: &CancellationToken,
    min_duration_seconds: f64,
    on_progress: &mut F,
) -> Result<SignatureData, TransportError>
where
    F: FnMut(SignatureProgress),
{
    let scale = pad.scale();

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Signature on pad {} aborted by caller", pad.index());
                return Err(TransportError::Cancelled);
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => return Err(TransportError::Disconnected),
            },
        };

        match event {
            PadEvent::SignaturePoint { x, y, p } => {
                on_progress(SignatureProgress::Point(scale.apply(x, y, p)));
            }
            PadEvent::SignatureRetry => {
                debug!("Retry pressed on pad {}", pad.index());
                retry(connection).await?;
                on_progress(SignatureProgress::Retried(RetryReason::PadButton));
            }
            PadEvent::SignatureConfirm => {
                let confirm: ConfirmResult = connection
                    .request(Command::ConfirmSignature)
                    .await?
                    .into_result("confirm_signature")?;

                let duration = signature_duration(confirm.counted_points, pad.sample_rate());
                match duration {
                    Some(seconds) if is_too_short(seconds, min_duration_seconds) => {
                        info!(
                            "Signature too short ({} points, {:.3}s), retrying",
                            confirm.counted_points, seconds
                        );
                        retry(connection).await?;
                        on_progress(SignatureProgress::Retried(RetryReason::TooShort { seconds }));
                        continue;
                    }
                    Some(_) => {}
                    None => debug!(
                        "Pad {} reports no sample rate, skipping the length check",
                        pad.index()
                    ),
                }

                let data: SignatureDataResult = connection
                    .request(Command::GetSignatureData)
                    .await?
                    .into_result("get_signature_data")?;

                info!(
                    "Signature confirmed on pad {} ({} points)",
                    pad.index(),
                    confirm.counted_points
                );
                return Ok(SignatureData {
                    counted_points: confirm.counted_points,
                    duration_seconds: duration,
                    sign_data: data.sign_data,
                });
            }
            PadEvent::SignatureCancel => {
                info!("Cancel pressed on pad {}", pad.index());
                let cancelled = connection.request(Command::CancelSignature).await;
                if let Err(e) =
                    cancelled.and_then(|r| r.into_result::<serde_json::Value>("cancel_signature"))
                {
                    warn!("Pad server rejected cancel: {}", e);
                }
                return Err(TransportError::Cancelled);
            }
            PadEvent::Error {
                context,
                code,
                description,
            } => {
                return Err(TransportError::Protocol {
                    context,
                    code,
                    description,
                });
            }
            PadEvent::Disconnect { .. } => return Err(TransportError::Disconnected),
            PadEvent::Log { .. } => {}
        }
    }
}

async fn retry(connection: &Connection) -> Result<(), TransportError> {
    connection
        .request(Command::RetrySignature)
        .await?
        .into_result::<serde_json::Value>("retry_signature")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_short_threshold() {
        // 15 points at 100 Hz is 0.15s
        assert!(is_too_short(signature_duration(15, 100).unwrap(), 0.2));
        // exactly at the threshold still counts as a false start
        assert!(is_too_short(signature_duration(20, 100).unwrap(), 0.2));
        assert!(!is_too_short(signature_duration(21, 100).unwrap(), 0.2));
        assert_eq!(signature_duration(500, 0), None);
    }

    #[test]
    fn test_retry_reason_display() {
        assert_eq!(RetryReason::PadButton.to_string(), "retry pressed on pad");
        assert!(RetryReason::TooShort { seconds: 0.15 }
            .to_string()
            .contains("0.15"));
    }
}
