use agrolink_core::farm::FarmId;
use chrono::{DateTime, Utc};
use fxhash::FxHashMap;
use serde_json::{Map, Value};
use std::{error, fmt};

/// One scalar sensor quantity.
#[derive(
    Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum MetricName {
    Temperature,
    Humidity,
    Moisture,
    WaterLevel,
}

impl MetricName {
    /// The field name the backend uses for this metric.
    pub fn wire_key(&self) -> &'static str {
        match self {
            MetricName::Temperature => "temperature",
            MetricName::Humidity => "humidity",
            MetricName::Moisture => "moisture",
            MetricName::WaterLevel => "waterLevel",
        }
    }

    pub fn validity_bit(&self) -> Validity {
        match self {
            MetricName::Temperature => Validity::TEMPERATURE,
            MetricName::Humidity => Validity::HUMIDITY,
            MetricName::Moisture => Validity::MOISTURE,
            MetricName::WaterLevel => Validity::WATER_LEVEL,
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.wire_key())
    }
}

/// The kind of a monitored farm sub system. Which metrics the backend
/// publishes is a property of the kind, nothing else varies by it.
#[derive(
    Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum FarmKind {
    Crop,
    Cattle,
    Poultry,
    Fish,
}

impl FarmKind {
    /// The set of metrics published for this kind of farm.
    pub fn metrics(&self) -> &'static [MetricName] {
        use MetricName::*;
        match self {
            FarmKind::Crop => &[Temperature, Humidity, Moisture],
            FarmKind::Cattle => &[Temperature, Humidity, WaterLevel],
            FarmKind::Poultry => &[Temperature, Humidity],
            FarmKind::Fish => &[Temperature, WaterLevel],
        }
    }
}

bitflags! {
    /// Per field validity of a decoded reading. A set bit means the
    /// field was present and numeric in the payload, a cleared bit
    /// means the decoder defaulted it to 0.0. Lets a consumer tell
    /// "measured zero" from "missing".
    #[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
    pub struct Validity: u8 {
        const TEMPERATURE = 0x01;
        const HUMIDITY    = 0x02;
        const MOISTURE    = 0x04;
        const WATER_LEVEL = 0x08;
    }
}

/// A validated sensor reading. `observed_at` is ingestion time
/// assigned by the receiving side, the payload's own notion of time
/// is not trusted.
#[derive(Debug, Clone)]
pub struct SensorReading {
    pub farm: FarmId,
    pub metrics: FxHashMap<MetricName, f64>,
    pub valid: Validity,
    pub observed_at: DateTime<Utc>,
}

/// The record could not be parsed as a structured object at all.
/// Missing or non numeric individual fields are never an error, they
/// decode as 0.0 with the validity bit cleared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Malformed;

impl fmt::Display for Malformed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "record is not a structured object")
    }
}

impl error::Error for Malformed {}

fn field(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        // the backend sometimes stringifies numeric fields
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Decode one raw record pushed by the backend into a reading for a
/// farm of the specified kind. Keys outside the kind's metric set are
/// dropped silently. Pure, no side effects.
pub fn decode(
    farm: &FarmId,
    kind: FarmKind,
    raw: &[u8],
    observed_at: DateTime<Utc>,
) -> Result<SensorReading, Malformed> {
    let root: Value = serde_json::from_slice(raw).map_err(|_| Malformed)?;
    let obj = root.as_object().ok_or(Malformed)?;
    let mut metrics = FxHashMap::default();
    let mut valid = Validity::empty();
    for m in kind.metrics() {
        match field(obj, m.wire_key()) {
            Some(v) => {
                metrics.insert(*m, v);
                valid |= m.validity_bit();
            }
            None => {
                metrics.insert(*m, 0.0);
            }
        }
    }
    Ok(SensorReading { farm: farm.clone(), metrics, valid, observed_at })
}
