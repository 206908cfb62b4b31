//! Route flight-core diagnostics into `tracing`.

use racs_core::Diagnostic;

/// Log one diagnostic at a level matching its severity.
pub fn trace_diagnostic(time_us: u64, event: &Diagnostic) {
    let t_s = time_us as f64 * 1e-6;
    match event {
        Diagnostic::PhaseChanged(_) | Diagnostic::CommandAccepted(_) => {
            tracing::info!(t_s, "{event}");
        }
        Diagnostic::CommandRejected(_) => tracing::debug!(t_s, "{event}"),
        Diagnostic::RestartRequested
        | Diagnostic::ConfigRestored(_)
        | Diagnostic::SensorFault(_)
        | Diagnostic::LevelingFailed(_)
        | Diagnostic::LogDropped(_)
        | Diagnostic::RecordOverflow(_)
        | Diagnostic::StorageFailed(_) => tracing::warn!(t_s, "{event}"),
    }
}
