/// Drought analysis for the drought statistics service.
///
/// Submodules:
/// - `threshold`      — selects drought months from raw observations.
/// - `drought_events` — groups consecutive drought months into events.
/// - `decades`        — per-decade breakdowns of months and events.

pub mod decades;
pub mod drought_events;
pub mod threshold;
