use serde::{Deserialize, Serialize};
use std::{fmt, time::SystemTime};

/// Category of a discovered fitness device
///
/// Classification is a closed set: a scan result that matches none of the
/// known service or name signatures is dropped during discovery rather than
/// being surfaced with a placeholder type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrainerType {
    /// Crank/pedal/hub power meter (Cycling Power Service)
    PowerMeter,
    /// Controllable trainer (Fitness Machine Service)
    SmartTrainer,
    /// Heart-rate strap or optical monitor (Heart Rate Service)
    HeartRateMonitor,
    /// Standalone cadence sensor (Cycling Speed & Cadence Service)
    CadenceSensor,
}

impl fmt::Display for TrainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PowerMeter => write!(f, "Power Meter"),
            Self::SmartTrainer => write!(f, "Smart Trainer"),
            Self::HeartRateMonitor => write!(f, "Heart Rate Monitor"),
            Self::CadenceSensor => write!(f, "Cadence Sensor"),
        }
    }
}

/// A fitness device seen during discovery
///
/// Immutable snapshot of one advertisement. When the same hardware address
/// reappears with a stronger signal the scanner re-emits a fresh value and
/// downstream replaces the old one (see [`TrainerDevice::supersedes`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainerDevice {
    /// Stable hardware address of the device
    pub id: String,
    /// Advertised device name, or a placeholder if none was broadcast
    pub name: String,
    /// Device category derived from the advertisement
    pub r#type: TrainerType,
    /// Signal strength (RSSI) at discovery time
    pub signal_strength: i16,
}

impl TrainerDevice {
    /// Create a new device snapshot
    #[must_use]
    pub const fn new(id: String, name: String, r#type: TrainerType, signal_strength: i16) -> Self {
        Self {
            id,
            name,
            r#type,
            signal_strength,
        }
    }

    /// Whether this snapshot should replace `other` in a device list
    ///
    /// True when both describe the same hardware address and this one
    /// carries a stronger signal, or a real name where `other` had none.
    #[must_use]
    pub fn supersedes(&self, other: &Self) -> bool {
        self.id == other.id
            && (self.signal_strength > other.signal_strength
                || (other.name.is_empty() && !self.name.is_empty()))
    }
}

impl fmt::Display for TrainerDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] ({}, {} dBm)",
            self.name, self.id, self.r#type, self.signal_strength
        )
    }
}

/// One decoded telemetry sample
///
/// Each connected characteristic contributes its own fields; anything the
/// producing notification did not report is `None`, never zero. Samples are
/// values, not entities; consumers merge successive partial samples if they
/// want a combined view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealTimeData {
    /// Instantaneous power in watts
    pub power: Option<i16>,
    /// Cadence in revolutions per minute
    pub cadence: Option<u8>,
    /// Heart rate in beats per minute
    pub heart_rate: Option<u16>,
    /// Moment the sample was decoded
    pub timestamp: SystemTime,
}

impl RealTimeData {
    /// An all-absent sample stamped `now`
    #[must_use]
    pub fn empty() -> Self {
        Self {
            power: None,
            cadence: None,
            heart_rate: None,
            timestamp: SystemTime::now(),
        }
    }

    /// Whether the sample carries no telemetry at all
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.power.is_none() && self.cadence.is_none() && self.heart_rate.is_none()
    }
}

impl fmt::Display for RealTimeData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        if let Some(power) = self.power {
            write!(f, "{power} W")?;
            wrote = true;
        }
        if let Some(cadence) = self.cadence {
            if wrote {
                write!(f, ", ")?;
            }
            write!(f, "{cadence} rpm")?;
            wrote = true;
        }
        if let Some(heart_rate) = self.heart_rate {
            if wrote {
                write!(f, ", ")?;
            }
            write!(f, "{heart_rate} bpm")?;
            wrote = true;
        }
        if !wrote {
            write!(f, "(no data)")?;
        }
        Ok(())
    }
}

/// Lifecycle of the single active device connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No device connected
    #[default]
    Disconnected,
    /// Discovery scan in progress
    ///
    /// The connection manager never enters this state itself; it exists
    /// for consumers that fold the lifecycle of a
    /// [`TrainerScanner::scan`](crate::TrainerScanner::scan) stream into
    /// the same state value they show for the connection.
    Scanning,
    /// Connection attempt or service discovery in progress
    Connecting,
    /// Connected with services discovered and subscriptions live
    Connected,
    /// Last connection ended in a transport failure
    Error,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// One step of a structured workout plan
///
/// Power values are fractions of the rider's FTP (`0.8` = 80 %), not watts;
/// the sequencer multiplies by the FTP supplied at
/// [`start`](crate::WorkoutSequencer::start) time. Durations are in seconds.
/// The serde form is internally tagged (`"type": "SteadyState"`, …) to match
/// the JSON produced by training-plan backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WorkoutStep {
    /// Hold one power for the whole step
    SteadyState {
        /// Step length in seconds
        duration: u32,
        /// Target intensity as a fraction of FTP
        power: f32,
    },
    /// Time-based on/off intervals
    IntervalsT {
        /// Number of on/off repetitions
        repeat: u32,
        /// Work phase length in seconds
        on_duration: u32,
        /// Work phase intensity as a fraction of FTP
        on_power: f32,
        /// Recovery phase length in seconds
        off_duration: u32,
        /// Recovery phase intensity as a fraction of FTP
        off_power: f32,
    },
    /// Power-based on/off intervals, same shape as [`Self::IntervalsT`]
    IntervalsP {
        /// Number of on/off repetitions
        repeat: u32,
        /// Work phase length in seconds
        on_duration: u32,
        /// Work phase intensity as a fraction of FTP
        on_power: f32,
        /// Recovery phase length in seconds
        off_duration: u32,
        /// Recovery phase intensity as a fraction of FTP
        off_power: f32,
        /// Optional cadence target for the work phase, in rpm
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cadence: Option<u16>,
    },
    /// Linear power ramp
    Ramp {
        /// Step length in seconds
        duration: u32,
        /// Intensity at the start of the ramp, fraction of FTP
        start_power: f32,
        /// Intensity at the end of the ramp, fraction of FTP
        end_power: f32,
    },
    /// Unstructured riding inside a power band
    FreeRide {
        /// Step length in seconds
        duration: u32,
        /// Lower edge of the band, fraction of FTP
        power_low: f32,
        /// Upper edge of the band, fraction of FTP
        power_high: f32,
    },
    /// Stepped climb to a peak and back down
    Pyramid {
        /// Number of pyramid repetitions
        repeat: u32,
        /// Length of each rung in seconds
        step_duration: u32,
        /// Intensity of the first rung, fraction of FTP
        start_power: f32,
        /// Intensity at the peak, fraction of FTP
        peak_power: f32,
        /// Intensity of the last rung, fraction of FTP
        end_power: f32,
    },
}

/// A running workout, owned exclusively by the sequencer
///
/// Invariants while the session exists: `current_step < total_steps`, and
/// `elapsed_time` only grows while `is_active && !is_paused`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSession {
    /// The ordered step list being executed
    pub training_plan: Vec<WorkoutStep>,
    /// Wall-clock moment the session started
    pub start_time: SystemTime,
    /// Seconds of un-paused riding so far
    pub elapsed_time: u32,
    /// Index of the active step in `training_plan`
    pub current_step: usize,
    /// Number of steps in the plan
    pub total_steps: usize,
    /// Whether the session is running
    pub is_active: bool,
    /// Whether the clock is currently held
    pub is_paused: bool,
}

impl WorkoutSession {
    /// Create a session positioned at step zero
    #[must_use]
    pub fn new(training_plan: Vec<WorkoutStep>) -> Self {
        let total_steps = training_plan.len();
        Self {
            training_plan,
            start_time: SystemTime::now(),
            elapsed_time: 0,
            current_step: 0,
            total_steps,
            is_active: true,
            is_paused: false,
        }
    }

    /// The step currently being executed
    #[must_use]
    pub fn active_step(&self) -> Option<&WorkoutStep> {
        self.training_plan.get(self.current_step)
    }

    /// Whether another step exists after the current one
    #[must_use]
    pub const fn has_next_step(&self) -> bool {
        self.current_step + 1 < self.total_steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_supersedes_on_stronger_signal() {
        let weak = TrainerDevice::new(
            "AA:BB:CC:DD:EE:FF".into(),
            "KICKR CORE".into(),
            TrainerType::SmartTrainer,
            -80,
        );
        let strong = TrainerDevice::new(
            "AA:BB:CC:DD:EE:FF".into(),
            "KICKR CORE".into(),
            TrainerType::SmartTrainer,
            -55,
        );

        assert!(strong.supersedes(&weak));
        assert!(!weak.supersedes(&strong));
    }

    #[test]
    fn test_device_supersedes_requires_same_id() {
        let a = TrainerDevice::new(
            "AA:BB:CC:DD:EE:01".into(),
            "HRM-Dual".into(),
            TrainerType::HeartRateMonitor,
            -50,
        );
        let b = TrainerDevice::new(
            "AA:BB:CC:DD:EE:02".into(),
            "HRM-Dual".into(),
            TrainerType::HeartRateMonitor,
            -90,
        );

        assert!(!a.supersedes(&b));
    }

    #[test]
    fn test_empty_sample_has_no_fields() {
        let sample = RealTimeData::empty();
        assert!(sample.is_empty());
        assert_eq!(sample.power, None);
        assert_eq!(sample.cadence, None);
        assert_eq!(sample.heart_rate, None);
    }

    #[test]
    fn test_sample_display_skips_absent_fields() {
        let mut sample = RealTimeData::empty();
        sample.power = Some(250);
        sample.heart_rate = Some(150);

        let text = format!("{sample}");
        assert_eq!(text, "250 W, 150 bpm");
    }

    #[test]
    fn test_workout_step_serde_tagged_form() {
        let step = WorkoutStep::SteadyState {
            duration: 300,
            power: 0.85,
        };

        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["type"], "SteadyState");
        assert_eq!(json["duration"], 300);

        let back: WorkoutStep = serde_json::from_value(json).unwrap();
        assert_eq!(back, step);
    }

    #[test]
    fn test_workout_step_deserializes_backend_json() {
        let json = r#"{
            "type": "IntervalsT",
            "repeat": 4,
            "on_duration": 120,
            "on_power": 1.05,
            "off_duration": 60,
            "off_power": 0.5
        }"#;

        let step: WorkoutStep = serde_json::from_str(json).unwrap();
        assert_eq!(
            step,
            WorkoutStep::IntervalsT {
                repeat: 4,
                on_duration: 120,
                on_power: 1.05,
                off_duration: 60,
                off_power: 0.5,
            }
        );
    }

    #[test]
    fn test_session_step_bounds() {
        let plan = vec![
            WorkoutStep::SteadyState {
                duration: 60,
                power: 0.6,
            },
            WorkoutStep::FreeRide {
                duration: 120,
                power_low: 0.4,
                power_high: 0.7,
            },
        ];
        let session = WorkoutSession::new(plan);

        assert_eq!(session.current_step, 0);
        assert_eq!(session.total_steps, 2);
        assert!(session.has_next_step());
        assert!(session.is_active);
        assert!(!session.is_paused);
        assert!(matches!(
            session.active_step(),
            Some(WorkoutStep::SteadyState { .. })
        ));
    }

    #[test]
    fn test_connection_state_default() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
