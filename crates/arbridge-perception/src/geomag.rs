//! Magnetic declination from a centred-dipole field model.
//!
//! Uses the degree-1 IGRF-13 Gauss coefficients (epoch 2020.0) with linear
//! secular variation.  Under the dipole approximation declination is the
//! great-circle bearing from the site to the geomagnetic north pole, so it
//! depends on latitude, longitude and date only; altitude is accepted for
//! interface symmetry and ignored.
//!
//! The dipole term captures the large-scale field but not regional anomalies
//! (errors of 10° or more are common at mid latitudes).

use chrono::{DateTime, Datelike, Utc};

/// IGRF-13 degree-1 coefficients (nT) at epoch 2020.0.
const G10: f64 = -29404.8;
const G11: f64 = -1450.9;
const H11: f64 = 4652.5;

/// Secular variation of the coefficients above (nT / year).
const G10_SV: f64 = 5.7;
const G11_SV: f64 = 7.4;
const H11_SV: f64 = -25.9;

const EPOCH: f64 = 2020.0;

/// Largest extrapolation past the epoch the linear model is trusted for.
const MAX_EXTRAPOLATION_YEARS: f64 = 10.0;

/// Dipole declination model.
#[derive(Debug, Clone, Copy, Default)]
pub struct DipoleDeclination;

impl DipoleDeclination {
    pub fn new() -> Self {
        Self
    }

    /// Geographic position of the geomagnetic north pole at `at`, as
    /// `(latitude_deg, longitude_deg)`.
    pub fn pole(&self, at: DateTime<Utc>) -> (f64, f64) {
        let dt = (decimal_year(at) - EPOCH).clamp(-MAX_EXTRAPOLATION_YEARS, MAX_EXTRAPOLATION_YEARS);
        let g10 = G10 + G10_SV * dt;
        let g11 = G11 + G11_SV * dt;
        let h11 = H11 + H11_SV * dt;
        let b0 = (g10 * g10 + g11 * g11 + h11 * h11).sqrt();

        let lat = (-g10 / b0).asin().to_degrees();
        let lon = (-h11).atan2(-g11).to_degrees();
        (lat, lon)
    }

    /// Declination (radians, east positive) at the given site and time.
    pub fn declination_rad(
        &self,
        latitude_deg: f64,
        longitude_deg: f64,
        _altitude_m: f64,
        at: DateTime<Utc>,
    ) -> f64 {
        let (pole_lat, pole_lon) = self.pole(at);
        let phi = latitude_deg.to_radians();
        let phi_p = pole_lat.to_radians();
        let d_lambda = (pole_lon - longitude_deg).to_radians();

        let y = d_lambda.sin() * phi_p.cos();
        let x = phi.cos() * phi_p.sin() - phi.sin() * phi_p.cos() * d_lambda.cos();
        y.atan2(x)
    }
}

fn decimal_year(at: DateTime<Utc>) -> f64 {
    let year = at.year();
    let days_in_year = if chrono::NaiveDate::from_ymd_opt(year, 12, 31)
        .map(|d| d.ordinal() == 366)
        .unwrap_or(false)
    {
        366.0
    } else {
        365.0
    };
    year as f64 + at.ordinal0() as f64 / days_in_year
}
