//! Dew point from air temperature and relative humidity.
//!
//! Sensirion's Magnus approximation (SHTxx application note):
//!
//! ```text
//! H  = (log10(RH) - 2) / 0.4343 + 17.62·T / (243.12 + T)
//! Dp = 243.12·H / (17.62 - H)
//! ```
//!
//! Valid over water for -45..60 °C, which covers the chamber range.

const BETA: f64 = 17.62;
const LAMBDA_C: f64 = 243.12;
const LOG10_E: f64 = 0.4343;

/// Dew point (°C) for air at `temp_c` and relative humidity `rh_percent`.
///
/// Returns `NaN` for `rh_percent == 0`.  Every comparison against `NaN` is
/// false, so a `NaN` dew point never trips the interlock.
pub fn dew_point(temp_c: f64, rh_percent: f64) -> f64 {
    if rh_percent == 0.0 {
        return f64::NAN;
    }
    let h = (rh_percent.log10() - 2.0) / LOG10_E + magnus(temp_c);
    LAMBDA_C * h / (BETA - h)
}

/// Relative humidity (%) of air at `temp_c` whose dew point is
/// `dew_point_c`.  Inverse of [`dew_point`]; saturates at 100 %.
pub fn relative_humidity(temp_c: f64, dew_point_c: f64) -> f64 {
    let rh = 100.0 * (magnus(dew_point_c) - magnus(temp_c)).exp();
    rh.min(100.0)
}

/// Dew point of the worst-case air among the given samples: maximum
/// temperature combined with maximum humidity.
///
/// `NaN` when either list is empty.
pub fn dew_point_of_max(
    temps: impl IntoIterator<Item = f64>,
    humidities: impl IntoIterator<Item = f64>,
) -> f64 {
    let t = temps.into_iter().fold(None, max_of);
    let rh = humidities.into_iter().fold(None, max_of);
    match (t, rh) {
        (Some(t), Some(rh)) => dew_point(t, rh),
        _ => f64::NAN,
    }
}

fn magnus(temp_c: f64) -> f64 {
    BETA * temp_c / (LAMBDA_C + temp_c)
}

fn max_of(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.max(v)))
}
