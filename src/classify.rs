//! Maps a scan result's advertised services and name to a [`TrainerType`].
//!
//! Service-UUID evidence always outranks name heuristics; the rule order
//! below is fixed and covered by tests, because downstream behavior (which
//! device gets listed as what) depends on it.

use uuid::Uuid;

use crate::{
    types::TrainerType, CYCLING_POWER_SERVICE_UUID, CYCLING_SPEED_CADENCE_SERVICE_UUID,
    FITNESS_MACHINE_SERVICE_UUID, HEART_RATE_SERVICE_UUID,
};

/// Name fragments that identify a smart trainer when no service UUID is
/// advertised. Brand-specific and bound to go stale; a fallback only.
const SMART_TRAINER_NAMES: [&str; 3] = ["kickr", "direto", "neo"];

/// Classify an advertisement into a device category
///
/// Rules are tried in order, first match wins:
/// 1. Cycling Power Service → [`TrainerType::PowerMeter`]
/// 2. Fitness Machine Service → [`TrainerType::SmartTrainer`]
/// 3. Heart Rate Service → [`TrainerType::HeartRateMonitor`]
/// 4. Cycling Speed & Cadence Service → [`TrainerType::CadenceSensor`]
/// 5. Name contains "kickr", "direto" or "neo" → [`TrainerType::SmartTrainer`]
/// 6. Name contains "hrm" → [`TrainerType::HeartRateMonitor`]
/// 7. Name contains "power" → [`TrainerType::PowerMeter`]
/// 8. Otherwise `None`; the scan result is discarded, not defaulted.
///
/// Name matching is case-insensitive substring matching; `name` may be
/// absent when the platform redacts it.
#[must_use]
pub fn classify_advertisement(services: &[Uuid], name: Option<&str>) -> Option<TrainerType> {
    if services.contains(&CYCLING_POWER_SERVICE_UUID) {
        return Some(TrainerType::PowerMeter);
    }
    if services.contains(&FITNESS_MACHINE_SERVICE_UUID) {
        return Some(TrainerType::SmartTrainer);
    }
    if services.contains(&HEART_RATE_SERVICE_UUID) {
        return Some(TrainerType::HeartRateMonitor);
    }
    if services.contains(&CYCLING_SPEED_CADENCE_SERVICE_UUID) {
        return Some(TrainerType::CadenceSensor);
    }

    let name = name?.to_lowercase();
    if SMART_TRAINER_NAMES.iter().any(|n| name.contains(n)) {
        return Some(TrainerType::SmartTrainer);
    }
    if name.contains("hrm") {
        return Some(TrainerType::HeartRateMonitor);
    }
    if name.contains("power") {
        return Some(TrainerType::PowerMeter);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_uuid_outranks_name() {
        // A fitness machine named "Generic" is still a smart trainer
        let result = classify_advertisement(&[FITNESS_MACHINE_SERVICE_UUID], Some("Generic"));
        assert_eq!(result, Some(TrainerType::SmartTrainer));

        // Power service wins even when the name says "HRM"
        let result = classify_advertisement(&[CYCLING_POWER_SERVICE_UUID], Some("HRM-Pro"));
        assert_eq!(result, Some(TrainerType::PowerMeter));
    }

    #[test]
    fn test_service_priority_order() {
        // Power service is checked before fitness machine when both advertise
        let both = [FITNESS_MACHINE_SERVICE_UUID, CYCLING_POWER_SERVICE_UUID];
        assert_eq!(
            classify_advertisement(&both, None),
            Some(TrainerType::PowerMeter)
        );
    }

    #[test]
    fn test_each_service_maps_to_its_type() {
        assert_eq!(
            classify_advertisement(&[CYCLING_POWER_SERVICE_UUID], None),
            Some(TrainerType::PowerMeter)
        );
        assert_eq!(
            classify_advertisement(&[FITNESS_MACHINE_SERVICE_UUID], None),
            Some(TrainerType::SmartTrainer)
        );
        assert_eq!(
            classify_advertisement(&[HEART_RATE_SERVICE_UUID], None),
            Some(TrainerType::HeartRateMonitor)
        );
        assert_eq!(
            classify_advertisement(&[CYCLING_SPEED_CADENCE_SERVICE_UUID], None),
            Some(TrainerType::CadenceSensor)
        );
    }

    #[test]
    fn test_name_heuristics() {
        assert_eq!(
            classify_advertisement(&[], Some("Wahoo KICKR CORE 1234")),
            Some(TrainerType::SmartTrainer)
        );
        assert_eq!(
            classify_advertisement(&[], Some("Elite DIRETO XR")),
            Some(TrainerType::SmartTrainer)
        );
        assert_eq!(
            classify_advertisement(&[], Some("Tacx Neo 2T")),
            Some(TrainerType::SmartTrainer)
        );
        assert_eq!(
            classify_advertisement(&[], Some("Garmin hrm-dual")),
            Some(TrainerType::HeartRateMonitor)
        );
        assert_eq!(
            classify_advertisement(&[], Some("Stages Power L")),
            Some(TrainerType::PowerMeter)
        );
    }

    #[test]
    fn test_unknown_is_dropped() {
        assert_eq!(classify_advertisement(&[], Some("Treadmill")), None);
        assert_eq!(classify_advertisement(&[], None), None);
    }
}
