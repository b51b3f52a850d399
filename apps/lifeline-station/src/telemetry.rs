use std::f64::consts::{PI, TAU};

use lifeline_proto::{now_ms, ClientMessage, LocationFix, TelemetrySample, VitalsReading};
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;

const ECG_INTERVAL: Duration = Duration::from_millis(100);
const ECG_BATCH: usize = 12;
const VITALS_INTERVAL: Duration = Duration::from_secs(2);
const LOCATION_INTERVAL: Duration = Duration::from_secs(1);

/// Synthetic ECG trace: P/QRS/T phases plus noise, with the heart rate
/// drifting inside 60..100 bpm.
pub struct EcgGenerator {
    phase: f64,
    heart_rate: f64,
}

impl EcgGenerator {
    pub fn new() -> Self {
        Self {
            phase: rand::thread_rng().gen::<f64>() * TAU,
            heart_rate: 75.0,
        }
    }

    pub fn batch(&mut self, len: usize) -> Vec<f64> {
        let mut rng = rand::thread_rng();
        self.heart_rate = (self.heart_rate + rng.gen_range(-2.0..2.0)).clamp(60.0, 100.0);

        let mut samples = Vec::with_capacity(len);
        for _ in 0..len {
            let t = (self.phase / TAU) % 1.0;
            let qrs = if t > 0.35 && t < 0.45 {
                ((t - 0.35) / 0.1 * PI).sin() * 5.5
            } else {
                0.0
            };
            let p_wave = if t > 0.12 && t < 0.28 {
                ((t - 0.15) / 0.16 * PI).sin() * 0.6
            } else {
                0.0
            };
            let t_wave = if t > 0.50 && t < 0.75 {
                ((t - 0.55) / 0.25 * PI).sin() * 1.2
            } else {
                0.0
            };
            let noise = (rng.gen::<f64>() - 0.5) * 0.25;
            samples.push(qrs + p_wave + t_wave + noise);
            self.phase += self.heart_rate / 60.0 * TAU / 100.0;
        }
        samples
    }
}

/// Bounded random walk over patient vitals.
pub struct VitalsGenerator {
    hr: f64,
    spo2: f64,
    systolic: f64,
    diastolic: f64,
    temp: f64,
}

impl VitalsGenerator {
    pub fn new() -> Self {
        Self {
            hr: 78.0,
            spo2: 96.5,
            systolic: 128.0,
            diastolic: 84.0,
            temp: 37.0,
        }
    }

    pub fn next_reading(&mut self, sender: &str) -> VitalsReading {
        let mut rng = rand::thread_rng();
        self.hr = (self.hr + rng.gen_range(-2.0..2.0)).clamp(60.0, 100.0);
        self.spo2 = (self.spo2 + rng.gen_range(-0.3..0.3)).clamp(94.0, 99.0);
        self.systolic = (self.systolic + rng.gen_range(-3.0..3.0)).clamp(110.0, 145.0);
        self.diastolic = (self.diastolic + rng.gen_range(-2.0..2.0)).clamp(70.0, 95.0);
        self.temp = (self.temp + rng.gen_range(-0.1..0.1)).clamp(36.5, 37.5);

        VitalsReading {
            sender: sender.to_string(),
            hr: self.hr.round() as u32,
            spo2: (self.spo2 * 10.0).round() / 10.0,
            systolic: self.systolic.round() as u32,
            diastolic: self.diastolic.round() as u32,
            temp: (self.temp * 10.0).round() / 10.0,
            timestamp: now_ms(),
        }
    }
}

/// Straight-line run from pickup to hospital at a fixed speed; ETA falls
/// linearly with progress and pins at zero on arrival.
pub struct RouteSimulator {
    progress: f64,
}

impl RouteSimulator {
    const PICKUP: (f64, f64) = (23.183, 77.416);
    const HOSPITAL: (f64, f64) = (23.2156, 77.4304);
    const TOTAL_SECONDS: f64 = 475.0;

    pub fn new() -> Self {
        Self { progress: 0.0 }
    }

    pub fn next_fix(&mut self, sender: &str) -> LocationFix {
        self.progress = (self.progress + LOCATION_INTERVAL.as_secs_f64() / Self::TOTAL_SECONDS)
            .clamp(0.0, 1.0);
        let (lat0, lon0) = Self::PICKUP;
        let (lat1, lon1) = Self::HOSPITAL;
        LocationFix {
            sender: sender.to_string(),
            lat: lat0 + (lat1 - lat0) * self.progress,
            lon: lon0 + (lon1 - lon0) * self.progress,
            eta_seconds: ((1.0 - self.progress) * Self::TOTAL_SECONDS).round() as u64,
            timestamp: now_ms(),
        }
    }
}

/// Produce telemetry for as long as the station runs, sending only while
/// the link is up. Samples produced while down are simply not sent; the
/// relay never persists telemetry anyway.
pub async fn run(
    sender: String,
    link: watch::Receiver<Option<mpsc::UnboundedSender<ClientMessage>>>,
    shutdown: CancellationToken,
) {
    let mut ecg = EcgGenerator::new();
    let mut vitals = VitalsGenerator::new();
    let mut route = RouteSimulator::new();
    let mut ecg_tick = interval(ECG_INTERVAL);
    let mut vitals_tick = interval(VITALS_INTERVAL);
    let mut location_tick = interval(LOCATION_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ecg_tick.tick() => {
                let Some(tx) = link.borrow().clone() else { continue };
                let _ = tx.send(ClientMessage::Ecg {
                    sample: TelemetrySample {
                        sender: sender.clone(),
                        samples: ecg.batch(ECG_BATCH),
                        timestamp: now_ms(),
                    },
                });
            }
            _ = vitals_tick.tick() => {
                let Some(tx) = link.borrow().clone() else { continue };
                let _ = tx.send(ClientMessage::Vitals { reading: vitals.next_reading(&sender) });
            }
            _ = location_tick.tick() => {
                let Some(tx) = link.borrow().clone() else { continue };
                let _ = tx.send(ClientMessage::Location { fix: route.next_fix(&sender) });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecg_batches_have_the_requested_length_and_stay_bounded() {
        let mut generator = EcgGenerator::new();
        for _ in 0..50 {
            let batch = generator.batch(ECG_BATCH);
            assert_eq!(batch.len(), ECG_BATCH);
            assert!(batch.iter().all(|s| s.is_finite() && s.abs() < 10.0));
        }
    }

    #[test]
    fn vitals_stay_inside_their_clamps() {
        let mut generator = VitalsGenerator::new();
        for _ in 0..100 {
            let reading = generator.next_reading("fieldUnit");
            assert!((60..=100).contains(&reading.hr));
            assert!((94.0..=99.0).contains(&reading.spo2));
            assert!((110..=145).contains(&reading.systolic));
            assert!((70..=95).contains(&reading.diastolic));
            assert!((36.5..=37.5).contains(&reading.temp));
        }
    }

    #[test]
    fn route_reaches_the_hospital_with_zero_eta() {
        let mut route = RouteSimulator::new();
        let mut fix = route.next_fix("fieldUnit");
        for _ in 0..600 {
            fix = route.next_fix("fieldUnit");
        }
        assert_eq!(fix.eta_seconds, 0);
        assert!((fix.lat - RouteSimulator::HOSPITAL.0).abs() < 1e-9);
        assert!((fix.lon - RouteSimulator::HOSPITAL.1).abs() < 1e-9);
    }
}
