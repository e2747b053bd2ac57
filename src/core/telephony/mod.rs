//! Telephony transport: the Twilio Media Streams side of a call.

pub mod messages;
pub mod transport;

pub use messages::{MediaPayload, TwilioEvent};
pub use transport::TelephonyTransport;
