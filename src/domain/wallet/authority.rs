//! Privileged-operation capability for balance mutation.

/// Capability required by every balance-mutating store operation.
///
/// Balance writes bypass ordinary per-user authorization (the webhook
/// pipeline acts on behalf of the gateway, not a logged-in user), so the
/// privilege is made explicit: only code inside this crate can mint the
/// capability, and it is handed to the store per call instead of living in
/// some globally accessible client.
#[derive(Debug)]
pub struct LedgerAuthority {
    _priv: (),
}

impl LedgerAuthority {
    /// Grants the capability. Crate-internal on purpose: application
    /// handlers grant it at their trust boundary, nothing outside the
    /// crate can.
    pub(crate) fn grant() -> Self {
        Self { _priv: () }
    }
}
