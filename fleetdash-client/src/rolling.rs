use std::collections::VecDeque;

use log::{debug, error};
use serde_json::Value;
use time::{OffsetDateTime, Time};

use crate::stream::Payload;

/// Number of points kept per chart series.
pub const WINDOW_LEN: usize = 20;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartPoint {
    pub time: String,
    pub value: f64,
}

impl ChartPoint {
    pub fn new(time: impl Into<String>, value: f64) -> Self {
        Self {
            time: time.into(),
            value,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.time.is_empty()
    }
}

/// Fixed-length series, oldest point first. Always holds exactly
/// [`WINDOW_LEN`] points.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingWindow {
    points: VecDeque<ChartPoint>,
}

impl Default for RollingWindow {
    fn default() -> Self {
        Self::initial()
    }
}

impl RollingWindow {
    pub fn initial() -> Self {
        Self {
            points: std::iter::repeat_with(ChartPoint::default)
                .take(WINDOW_LEN)
                .collect(),
        }
    }

    /// Returns the window with its oldest point evicted and `point` appended.
    pub fn append(&self, point: ChartPoint) -> Self {
        let mut next = self.clone();
        next.push(point);
        next
    }

    pub fn push(&mut self, point: ChartPoint) {
        self.points.pop_front();
        self.points.push_back(point);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChartPoint> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<&ChartPoint> {
        self.points.back().filter(|p| !p.is_placeholder())
    }
}

/// Per-series readings extracted from one stream payload, before validation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    pub cpu: Option<f64>,
    pub ram: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReadingError {
    #[error("payload is not a JSON object: {0}")]
    NotAnObject(String),
    #[error("payload is not valid JSON: {0:?}")]
    Undecodable(String),
}

impl Reading {
    /// Extracts a reading. `Ok(None)` means the payload was blank and should
    /// be skipped quietly.
    pub fn from_payload(payload: &Payload) -> Result<Option<Self>, ReadingError> {
        match payload {
            Payload::Json(Value::String(text)) | Payload::Raw(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return Ok(None);
                }
                let value: Value = serde_json::from_str(text)
                    .map_err(|_| ReadingError::Undecodable(text.to_owned()))?;
                Self::from_value(&value).map(Some)
            }
            Payload::Json(value) => Self::from_value(value).map(Some),
        }
    }

    fn from_value(value: &Value) -> Result<Self, ReadingError> {
        let object = value
            .as_object()
            .ok_or_else(|| ReadingError::NotAnObject(value.to_string()))?;

        Ok(Self {
            cpu: object.get("cpu").and_then(Value::as_f64),
            ram: object.get("ram").and_then(Value::as_f64),
        })
    }
}

/// One accepted reading stamped with its receipt time.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub cpu_percent: Option<f64>,
    pub ram_percent: Option<f64>,
    pub timestamp: String,
}

impl Sample {
    pub fn new(reading: Reading, timestamp: impl Into<String>) -> Self {
        Self {
            cpu_percent: reading.cpu,
            ram_percent: reading.ram,
            timestamp: timestamp.into(),
        }
    }

    pub fn now(reading: Reading) -> Self {
        Self::new(reading, now_label())
    }
}

/// Which series took a point from the last sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    pub cpu: bool,
    pub ram: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollingSampleBuffer {
    cpu: RollingWindow,
    ram: RollingWindow,
}

impl RollingSampleBuffer {
    pub fn cpu(&self) -> &RollingWindow {
        &self.cpu
    }

    pub fn ram(&self) -> &RollingWindow {
        &self.ram
    }

    /// Appends each finite field of `sample` to its series. Invalid fields
    /// leave their series untouched for this tick.
    pub fn push(&mut self, sample: &Sample) -> Applied {
        let cpu = sample.cpu_percent.filter(|v| v.is_finite());
        let ram = sample.ram_percent.filter(|v| v.is_finite());

        if let Some(value) = cpu {
            self.cpu = self.cpu.append(ChartPoint::new(&sample.timestamp, value));
        }
        if let Some(value) = ram {
            self.ram = self.ram.append(ChartPoint::new(&sample.timestamp, value));
        }

        Applied {
            cpu: cpu.is_some(),
            ram: ram.is_some(),
        }
    }

    /// Decodes a stream payload and records it at the current wall-clock time.
    pub fn push_payload(&mut self, payload: &Payload) -> Applied {
        match Reading::from_payload(payload) {
            Ok(Some(reading)) => self.push(&Sample::now(reading)),
            Ok(None) => {
                debug!("ignoring blank monitor payload");
                Applied::default()
            }
            Err(e) => {
                error!("failed to parse monitor data: {e}");
                Applied::default()
            }
        }
    }
}

/// `HH:MM:SS`, 24-hour, zero-padded.
pub fn time_label(time: Time) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        time.hour(),
        time.minute(),
        time.second()
    )
}

pub fn now_label() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    time_label(now.time())
}

#[cfg(test)]
mod test {
    use fleetdash_proto::msg::MonitorMessage;
    use serde_json::json;

    use super::*;

    fn numbered(window: &RollingWindow) -> Vec<f64> {
        window.iter().map(|p| p.value).collect()
    }

    #[test]
    fn test_initial_window() {
        let window = RollingWindow::initial();

        assert_eq!(window.len(), WINDOW_LEN);
        assert!(window.iter().all(|p| p.time.is_empty() && p.value == 0.0));
        assert!(window.latest().is_none());
    }

    #[test]
    fn test_append_shifts_by_one() {
        let mut window = RollingWindow::initial();
        for i in 0..WINDOW_LEN {
            window.push(ChartPoint::new(format!("t{i}"), i as f64));
        }
        let before: Vec<_> = window.iter().cloned().collect();

        let point = ChartPoint::new("t20", 99.0);
        let after = window.append(point.clone());
        let after_points: Vec<_> = after.iter().cloned().collect();

        assert_eq!(after.len(), WINDOW_LEN);
        assert_eq!(&after_points[..WINDOW_LEN - 1], &before[1..]);
        assert_eq!(after_points[WINDOW_LEN - 1], point);
        // the source window is untouched
        assert_eq!(window.iter().cloned().collect::<Vec<_>>(), before);
    }

    #[test]
    fn test_append_is_deterministic() {
        let window = RollingWindow::initial();
        let point = ChartPoint::new("12:00:00", 5.0);

        assert_eq!(window.append(point.clone()), window.append(point));
    }

    #[test]
    fn test_length_never_changes() {
        let mut window = RollingWindow::initial();
        for i in 0..(WINDOW_LEN * 3) {
            window = window.append(ChartPoint::new("x", i as f64));
            assert_eq!(window.len(), WINDOW_LEN);
        }
        assert_eq!(numbered(&window)[0], (WINDOW_LEN * 2) as f64);
    }

    #[test]
    fn test_invalid_field_skips_only_its_series() {
        let mut buffer = RollingSampleBuffer::default();
        let ram_before = buffer.ram().clone();

        let applied = buffer.push(&Sample::new(
            Reading {
                cpu: Some(55.2),
                ram: Some(f64::NAN),
            },
            "09:05:03",
        ));

        assert_eq!(applied, Applied { cpu: true, ram: false });
        assert_eq!(
            buffer.cpu().latest(),
            Some(&ChartPoint::new("09:05:03", 55.2))
        );
        assert_eq!(buffer.ram(), &ram_before);
    }

    #[test]
    fn test_infinite_and_missing_fields() {
        let mut buffer = RollingSampleBuffer::default();

        let applied = buffer.push(&Sample::new(
            Reading {
                cpu: Some(f64::INFINITY),
                ram: None,
            },
            "00:00:01",
        ));

        assert_eq!(applied, Applied::default());
        assert_eq!(buffer, RollingSampleBuffer::default());
    }

    #[test]
    fn test_reading_from_object_payload() {
        let payload = Payload::Json(json!({"cpu": 12.5, "ram": "n/a"}));

        assert_eq!(
            Reading::from_payload(&payload),
            Ok(Some(Reading {
                cpu: Some(12.5),
                ram: None
            }))
        );
    }

    #[test]
    fn test_reading_from_emitted_message() {
        let message = MonitorMessage { cpu: 37.5, ram: 61.0 };
        let raw = serde_json::to_string(&message).unwrap();

        assert_eq!(
            Reading::from_payload(&Payload::parse(&raw)),
            Ok(Some(Reading {
                cpu: Some(37.5),
                ram: Some(61.0)
            }))
        );
    }

    #[test]
    fn test_reading_from_string_payloads() {
        let nested = Payload::Json(json!(r#" {"cpu": 1, "ram": 2} "#));
        assert_eq!(
            Reading::from_payload(&nested),
            Ok(Some(Reading {
                cpu: Some(1.0),
                ram: Some(2.0)
            }))
        );

        assert_eq!(Reading::from_payload(&Payload::Raw("  ".to_owned())), Ok(None));
        assert!(matches!(
            Reading::from_payload(&Payload::Raw("not json".to_owned())),
            Err(ReadingError::Undecodable(_))
        ));
        assert!(matches!(
            Reading::from_payload(&Payload::Json(json!(42))),
            Err(ReadingError::NotAnObject(_))
        ));
    }

    #[test]
    fn test_push_payload_ignores_garbage() {
        let mut buffer = RollingSampleBuffer::default();

        let applied = buffer.push_payload(&Payload::Raw("not json".to_owned()));

        assert_eq!(applied, Applied::default());
        assert_eq!(buffer, RollingSampleBuffer::default());
    }

    #[test]
    fn test_push_payload_stamps_points() {
        let mut buffer = RollingSampleBuffer::default();

        let applied = buffer.push_payload(&Payload::Json(json!({"cpu": 3.0, "ram": 4.0})));

        assert_eq!(applied, Applied { cpu: true, ram: true });
        let cpu = buffer.cpu().latest().expect("cpu point");
        assert_eq!(cpu.value, 3.0);
        assert_eq!(cpu.time.len(), "00:00:00".len());
        assert_eq!(buffer.ram().latest().map(|p| p.value), Some(4.0));
    }

    #[test]
    fn test_time_label_is_zero_padded() {
        let time = Time::from_hms(9, 5, 3).unwrap();

        assert_eq!(time_label(time), "09:05:03");
        assert_eq!(time_label(Time::from_hms(23, 59, 0).unwrap()), "23:59:00");
    }
}
