//! Typed sensor table and the aggregating [`SensorHub`].
//!
//! Each entry of the table is a [`SensorDescriptor`]: what is measured, where
//! (the location tag used to select air and module subsets), and which
//! instrument/channel provides it.  The hub walks the table once per control
//! tick and produces a [`ReadingSet`] with the derived dew point attached.

pub mod dew_point;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{ClimateChamberPort, HygrometerPort};
use crate::error::DeviceError;

/// Column name of the derived dew point in logs and records.
pub const DEW_POINT_COLUMN: &str = "dew_point";

// ---------------------------------------------------------------------------
// Sensor table
// ---------------------------------------------------------------------------

/// Physical quantity delivered by a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quantity {
    Temperature,
    Humidity,
    DewPoint,
    Setpoint,
}

/// Instrument that delivers a sensor value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorSource {
    /// Chamber air temperature readback.
    ChamberTemperature,
    /// Chamber active setpoint readback.
    ChamberSetpoint,
    /// A thermohygrometer probe.
    Hygrometer {
        device: String,
        #[serde(default)]
        channel: u8,
    },
}

/// One row of the sensor table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorDescriptor {
    /// Column name in the data log (e.g. `t_mod2`).
    pub name: String,
    /// Short label for the human-readable log line; `None` keeps the
    /// value out of that line (it is still recorded).
    #[serde(default)]
    pub short: Option<String>,
    pub quantity: Quantity,
    /// Location tag (e.g. `air2`, `mod`) used to select air and module
    /// subsets for the dew-point interlock.
    pub location: String,
    pub source: SensorSource,
}

impl SensorDescriptor {
    fn hygrometer(
        name: &str,
        short: Option<&str>,
        quantity: Quantity,
        location: &str,
        device: &str,
        channel: u8,
    ) -> Self {
        Self {
            name: name.into(),
            short: short.map(Into::into),
            quantity,
            location: location.into(),
            source: SensorSource::Hygrometer {
                device: device.into(),
                channel,
            },
        }
    }

    /// Whether the quantity can actually be delivered by the source.
    pub fn is_consistent(&self) -> bool {
        matches!(
            (&self.source, self.quantity),
            (SensorSource::ChamberTemperature, Quantity::Temperature)
                | (SensorSource::ChamberSetpoint, Quantity::Setpoint)
                | (
                    SensorSource::Hygrometer { .. },
                    Quantity::Temperature | Quantity::Humidity | Quantity::DewPoint
                )
        )
    }
}

/// The module QC bench: one climate chamber and three thermohygrometers,
/// the first of them with probes on two modules and in the air.
pub fn default_sensor_table() -> Vec<SensorDescriptor> {
    use Quantity::{DewPoint, Humidity, Temperature};
    const TH1: &str = "Thermohygrometer";
    const TH2: &str = "Thermohygrometer2";
    const TH3: &str = "Thermohygrometer3";

    vec![
        SensorDescriptor {
            name: "t_chamber".into(),
            short: Some("t_ch".into()),
            quantity: Temperature,
            location: "chamber".into(),
            source: SensorSource::ChamberTemperature,
        },
        SensorDescriptor {
            name: "t_setp".into(),
            short: Some("t_sp".into()),
            quantity: Quantity::Setpoint,
            location: "setp".into(),
            source: SensorSource::ChamberSetpoint,
        },
        SensorDescriptor::hygrometer("t_sens", Some("t_s"), Temperature, "sens", TH2, 0),
        SensorDescriptor::hygrometer("t_mod", Some("t_m"), Temperature, "mod", TH1, 2),
        SensorDescriptor::hygrometer("t_air", Some("t_a"), Temperature, "air", TH1, 3),
        SensorDescriptor::hygrometer("t_mod2", Some("t_o"), Temperature, "mod2", TH1, 0),
        SensorDescriptor::hygrometer("t_air2", Some("t_t"), Temperature, "air2", TH3, 0),
        SensorDescriptor::hygrometer("h_sens", Some("h_s"), Humidity, "sens", TH2, 0),
        SensorDescriptor::hygrometer("h_mod", Some("h_m"), Humidity, "mod", TH1, 2),
        SensorDescriptor::hygrometer("h_air", Some("h_a"), Humidity, "air", TH1, 3),
        SensorDescriptor::hygrometer("h_mod2", Some("h_m2"), Humidity, "mod2", TH1, 0),
        SensorDescriptor::hygrometer("h_air2", Some("h_a2"), Humidity, "air2", TH3, 0),
        SensorDescriptor::hygrometer("d_sens", None, DewPoint, "sens", TH2, 0),
        SensorDescriptor::hygrometer("d_mod", None, DewPoint, "mod", TH1, 2),
        SensorDescriptor::hygrometer("d_air", None, DewPoint, "air", TH1, 3),
        SensorDescriptor::hygrometer("d_mod2", None, DewPoint, "mod2", TH1, 0),
        SensorDescriptor::hygrometer("d_air2", None, DewPoint, "air2", TH3, 0),
    ]
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// One sensor value of one poll tick.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub name: String,
    pub short: Option<String>,
    pub quantity: Quantity,
    pub location: String,
    /// `None` when the read failed.
    pub value: Option<f64>,
}

/// Everything read during one poll tick, in sensor-table order.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadingSet {
    pub timestamp: DateTime<Utc>,
    pub readings: Vec<SensorReading>,
    /// Dew point of the air sensors (°C); `NaN` when it cannot be computed.
    pub dew_point: f64,
}

impl ReadingSet {
    /// Value of the named sensor, if it was read successfully.
    pub fn get(&self, name: &str) -> Option<f64> {
        self.readings
            .iter()
            .find(|r| r.name == name)
            .and_then(|r| r.value)
    }

    /// Available temperatures whose location is one of `locations`.
    pub fn temperatures_at<'a>(
        &'a self,
        locations: &'a [String],
    ) -> impl Iterator<Item = f64> + 'a {
        self.values_at(Quantity::Temperature, locations)
    }

    /// Available relative humidities whose location is one of `locations`.
    pub fn humidities_at<'a>(
        &'a self,
        locations: &'a [String],
    ) -> impl Iterator<Item = f64> + 'a {
        self.values_at(Quantity::Humidity, locations)
    }

    fn values_at<'a>(
        &'a self,
        quantity: Quantity,
        locations: &'a [String],
    ) -> impl Iterator<Item = f64> + 'a {
        self.readings
            .iter()
            .filter(move |r| r.quantity == quantity && locations.contains(&r.location))
            .filter_map(|r| r.value)
    }

    /// Human-readable one-liner: `T_ch = 20.00, T_s = None, ..., Dp = -31.02`.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = self
            .readings
            .iter()
            .filter_map(|r| {
                let label = capitalize(r.short.as_deref()?);
                Some(match r.value {
                    Some(v) => format!("{label} = {v:.2}"),
                    None => format!("{label} = None"),
                })
            })
            .collect();
        parts.push(format!("Dp = {:.2}", self.dew_point));
        parts.join(", ")
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// SensorHub
// ---------------------------------------------------------------------------

/// Walks the sensor table and produces a unified [`ReadingSet`].
pub struct SensorHub {
    descriptors: Vec<SensorDescriptor>,
    air_locations: Vec<String>,
    /// Per descriptor: the last read failed.
    failing: Vec<bool>,
}

impl SensorHub {
    pub fn new(descriptors: Vec<SensorDescriptor>, air_locations: Vec<String>) -> Self {
        let failing = vec![false; descriptors.len()];
        Self {
            descriptors,
            air_locations,
            failing,
        }
    }

    pub fn descriptors(&self) -> &[SensorDescriptor] {
        &self.descriptors
    }

    /// Locations whose readings define the air dew point.
    pub fn air_locations(&self) -> &[String] {
        &self.air_locations
    }

    /// Data-log columns: every sensor name followed by the dew point.
    pub fn columns(&self) -> Vec<&str> {
        self.descriptors
            .iter()
            .map(|d| d.name.as_str())
            .chain(std::iter::once(DEW_POINT_COLUMN))
            .collect()
    }

    /// Read every sensor and attach the air dew point.
    ///
    /// Individual read failures are recorded as missing values; a single
    /// flaky probe never aborts the control loop.  A sensor going
    /// unavailable is logged once, at `warn`, and again when it recovers.
    pub fn read_all<C, H>(
        &mut self,
        chamber: &mut C,
        hygrometers: &mut BTreeMap<String, H>,
        timestamp: DateTime<Utc>,
    ) -> ReadingSet
    where
        C: ClimateChamberPort,
        H: HygrometerPort,
    {
        let readings = self
            .descriptors
            .iter()
            .zip(self.failing.iter_mut())
            .map(|(d, failing)| {
                let value = match read_one(d, chamber, hygrometers) {
                    Ok(v) => {
                        if *failing {
                            info!("Sensor {} available again", d.name);
                        }
                        *failing = false;
                        Some(v)
                    }
                    Err(e) => {
                        if *failing {
                            debug!("Sensor {} unavailable: {}", d.name, e);
                        } else {
                            warn!("Sensor {} unavailable: {}", d.name, e);
                        }
                        *failing = true;
                        None
                    }
                };
                SensorReading {
                    name: d.name.clone(),
                    short: d.short.clone(),
                    quantity: d.quantity,
                    location: d.location.clone(),
                    value,
                }
            })
            .collect();

        let mut set = ReadingSet {
            timestamp,
            readings,
            dew_point: f64::NAN,
        };
        set.dew_point = dew_point::dew_point_of_max(
            set.temperatures_at(&self.air_locations),
            set.humidities_at(&self.air_locations),
        );
        set
    }
}

fn read_one<C, H>(
    d: &SensorDescriptor,
    chamber: &mut C,
    hygrometers: &mut BTreeMap<String, H>,
) -> Result<f64, DeviceError>
where
    C: ClimateChamberPort,
    H: HygrometerPort,
{
    match &d.source {
        SensorSource::ChamberTemperature => chamber.temperature(),
        SensorSource::ChamberSetpoint => chamber.temperature_setpoint(),
        SensorSource::Hygrometer { device, channel } => {
            let hygro = hygrometers.get_mut(device).ok_or(DeviceError::Unavailable)?;
            match d.quantity {
                Quantity::Humidity => hygro.humidity(*channel),
                Quantity::DewPoint => hygro.dew_point(*channel),
                Quantity::Temperature | Quantity::Setpoint => hygro.temperature(*channel),
            }
        }
    }
}
