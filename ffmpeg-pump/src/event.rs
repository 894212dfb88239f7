use std::fmt::{Display, Formatter};
use std::pin::Pin;

use futures::Stream;

pub type PumpEventSender = tokio::sync::broadcast::Sender<PumpEvent>;
pub type PumpEventReceiver = tokio::sync::broadcast::Receiver<PumpEvent>;
pub type PumpEventStream = Pin<Box<dyn Stream<Item = PumpEvent> + Send>>;

/// Notifications a pump publishes to its consumers.
#[derive(Clone, Debug, PartialEq)]
pub enum PumpEvent {
    /// A new frame is available from the frame buffer.
    FrameReady,
    StreamOpened {
        width: u32,
        height: u32,
        frame_rate: f64,
    },
    StreamClosed,
    Error(String),
    /// Encoded size, in bytes, of a unit read from the selected track.
    PacketReceived(usize),
}

impl Display for PumpEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PumpEvent::FrameReady => f.write_str("frame ready"),
            PumpEvent::StreamOpened {
                width,
                height,
                frame_rate,
            } => write!(f, "stream opened {}x{} @ {:.2} fps", width, height, frame_rate),
            PumpEvent::StreamClosed => f.write_str("stream closed"),
            PumpEvent::Error(message) => write!(f, "error: {}", message),
            PumpEvent::PacketReceived(size) => write!(f, "packet received ({} bytes)", size),
        }
    }
}
