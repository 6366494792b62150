//! Counters for suspension and drain activity
//!
//! Emitted through the `metrics` facade; installing an exporter is up to the
//! embedding application. Every counter carries a `transport` label:
//!
//! - `auth_recovery_suspended_total`
//! - `auth_recovery_replayed_total`
//! - `auth_recovery_rejected_total`
//! - `auth_recovery_abandoned_total`
//! - `auth_recovery_forbidden_total`

use crate::registry::TransportName;

pub(crate) fn record_suspended(transport: &TransportName) {
    metrics::counter!("auth_recovery_suspended_total", "transport" => transport.to_string())
        .increment(1);
}

pub(crate) fn record_replayed(transport: &TransportName, entries: usize) {
    metrics::counter!("auth_recovery_replayed_total", "transport" => transport.to_string())
        .increment(entries as u64);
}

pub(crate) fn record_rejected(transport: &TransportName, entries: usize) {
    metrics::counter!("auth_recovery_rejected_total", "transport" => transport.to_string())
        .increment(entries as u64);
}

pub(crate) fn record_abandoned(transport: &TransportName, entries: usize) {
    metrics::counter!("auth_recovery_abandoned_total", "transport" => transport.to_string())
        .increment(entries as u64);
}

pub(crate) fn record_forbidden(transport: &TransportName) {
    metrics::counter!("auth_recovery_forbidden_total", "transport" => transport.to_string())
        .increment(1);
}
