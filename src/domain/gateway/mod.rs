//! Gateway domain - the webhook trust boundary.
//!
//! Everything needed to decide whether an inbound payment notification
//! can be believed: source IP authentication, parameter-string signature
//! verification, and the typed notification itself.

mod errors;
mod notification;
mod signature;
mod source;

pub use errors::WebhookError;
pub use notification::{NotificationStatus, PaymentNotification, TransactionKind};
pub use signature::{encode_value, OrderedFields, SignatureVerifier, SIGNATURE_FIELD};
pub use source::{extract_client_ip, AllowRule, SourceAuthenticator};
