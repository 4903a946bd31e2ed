//! Priestley-Taylor potential evapotranspiration
//!
//! Estimates daily PET from incoming shortwave radiation and the daily
//! temperature range, following the FAO-56 radiation chain (Allen et al.,
//! 1998) with a catchment-calibrated Priestley-Taylor coefficient as used
//! for the CAMELS catchments (Newman et al., 2015).

use crate::errors::{ForcingError, ForcingResult};
use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Latent heat of vaporization (MJ / kg)
const LAMBDA: f64 = 2.45;
/// Albedo of the reference surface
const ALBEDO: f64 = 0.23;
/// Stefan-Boltzmann constant (MJ / K^4 / m^2 / day)
const STEFAN_BOLTZMANN: f64 = 4.903e-9;
/// Solar constant (MJ / m^2 / min)
const SOLAR_CONSTANT: f64 = 0.082;
/// W / m^2 to MJ / m^2 / day
const W_M2_TO_MJ_M2_DAY: f64 = 0.0864;
/// Energy to evaporation equivalent (mm / day per MJ / m^2 / day)
const ENERGY_TO_EVAPORATION: f64 = 0.408;

/// Default Priestley-Taylor coefficient.
pub const DEFAULT_ALPHA: f64 = 1.26;

/// Catchment constants for the PET estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PetParameters {
    /// Priestley-Taylor coefficient
    pub alpha: f64,
    /// Catchment elevation
    /// unit: m
    pub elevation: f64,
    /// Catchment latitude
    /// unit: degrees
    pub latitude: f64,
}

impl PetParameters {
    pub fn new(alpha: f64, elevation: f64, latitude: f64) -> Self {
        Self {
            alpha,
            elevation,
            latitude,
        }
    }

    /// PET for a single day
    ///
    /// See [`pet_for_day`].
    pub fn pet(&self, solar_radiation: f64, t_min: f64, t_max: f64, day_of_year: f64) -> f64 {
        pet_for_day(
            solar_radiation,
            t_min,
            t_max,
            day_of_year,
            self.alpha,
            self.elevation,
            self.latitude,
        )
    }
}

/// PET for a single day, in mm / day.
///
/// * `solar_radiation` - incoming shortwave radiation (W / m^2)
/// * `t_min`, `t_max` - daily temperature extremes (°C)
/// * `day_of_year` - ordinal day, 1 to 366
/// * `alpha` - Priestley-Taylor coefficient
/// * `elevation` - m above sea level
/// * `latitude` - degrees
///
/// Ground heat flux is taken as zero. The result is
///
/// $$ PET = 0.408 \cdot \frac{\alpha}{\lambda} \frac{\Delta R_n}{\Delta + \gamma} $$
///
/// Non-finite inputs are not special-cased and produce non-finite output.
pub fn pet_for_day(
    solar_radiation: f64,
    t_min: f64,
    t_max: f64,
    day_of_year: f64,
    alpha: f64,
    elevation: f64,
    latitude: f64,
) -> f64 {
    let s_rad = solar_radiation * W_M2_TO_MJ_M2_DAY;
    let net_sw_rad = (1.0 - ALBEDO) * s_rad;

    // FAO-56 eq. 24
    let declination = 0.409 * (2.0 * PI / 365.0 * day_of_year - 1.39).sin();

    let lat = latitude.to_radians();
    // Clamped so polar day/night stays inside the acos domain (NaN passes through)
    let sunset_term = (-lat.tan() * declination.tan()).clamp(-1.0, 1.0);
    let sunset_angle = sunset_term.acos();

    // FAO-56 eq. 23
    let inverse_distance = 1.0 + 0.033 * (2.0 * PI / 365.0 * day_of_year).cos();

    // FAO-56 eq. 21
    let et_rad = (24.0 * 60.0) / PI
        * SOLAR_CONSTANT
        * inverse_distance
        * (sunset_angle * lat.sin() * declination.sin()
            + lat.cos() * declination.cos() * sunset_angle.sin());

    // FAO-56 eq. 37
    let clear_sky_rad = (0.75 + 2e-5 * elevation) * et_rad;

    // FAO-56 eq. 48, dew point approximated by t_min
    let actual_vp = 0.611 * ((17.27 * t_min) / (t_min + 237.3)).exp();

    // FAO-56 eq. 49
    let kelvin_term = ((t_max + 273.16).powi(4) + (t_min + 273.16).powi(4)) / 2.0;
    let humidity_term = 0.34 - 0.14 * actual_vp.sqrt();
    let cloudiness_term = 1.35 * s_rad / clear_sky_rad - 0.35;
    let net_lw_rad = STEFAN_BOLTZMANN * kelvin_term * humidity_term * cloudiness_term;

    // FAO-56 eq. 7 and 8 (kPa / °C)
    let atm_pressure = 101.3 * ((293.0 - 0.0065 * elevation) / 293.0).powf(5.26);
    let gamma = 0.000665 * atm_pressure;

    // FAO-56 eq. 13
    let t_mean = 0.5 * (t_min + t_max);
    let slope = 4098.0 * (0.6108 * ((17.27 * t_mean) / (t_mean + 237.3)).exp())
        / (t_mean + 237.3).powi(2);

    let net_rad = net_sw_rad - net_lw_rad;
    let ground_heat_flux = 0.0;

    let pet = (alpha / LAMBDA) * slope * (net_rad - ground_heat_flux) / (slope + gamma);
    pet * ENERGY_TO_EVAPORATION
}

/// PET series for aligned daily inputs, in mm / day.
///
/// All series must have the same length. The output is aligned with the
/// inputs; see [`pet_for_day`] for the per-day calculation.
pub fn estimate_pet(
    solar_radiation: ArrayView1<f64>,
    t_min: ArrayView1<f64>,
    t_max: ArrayView1<f64>,
    day_of_year: ArrayView1<f64>,
    alpha: f64,
    elevation: f64,
    latitude: f64,
) -> ForcingResult<Array1<f64>> {
    let n = solar_radiation.len();
    for (name, len) in [
        ("t_min", t_min.len()),
        ("t_max", t_max.len()),
        ("day_of_year", day_of_year.len()),
    ] {
        if len != n {
            return Err(ForcingError::Dataset(format!(
                "PET input {name} has length {len}, expected {n}"
            )));
        }
    }

    let mut pet = Array1::zeros(n);
    Zip::from(&mut pet)
        .and(&solar_radiation)
        .and(&t_min)
        .and(&t_max)
        .and(&day_of_year)
        .for_each(|out, &s_rad, &lo, &hi, &doy| {
            *out = pet_for_day(s_rad, lo, hi, doy, alpha, elevation, latitude);
        });
    Ok(pet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;
    use ndarray::array;

    #[test]
    fn all_zero_inputs_give_zero() {
        let pet = pet_for_day(0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(pet, 0.0);
    }

    #[test]
    fn nan_inputs_propagate() {
        let nan = f64::NAN;
        let pet = pet_for_day(nan, nan, nan, nan, nan, nan, nan);
        assert!(!pet.is_finite());
    }

    #[test]
    fn nan_in_one_day_does_not_leak() {
        let pet = estimate_pet(
            array![150.0, f64::NAN, 150.0].view(),
            array![5.0, 5.0, 5.0].view(),
            array![20.0, 20.0, 20.0].view(),
            array![180.0, 181.0, 182.0].view(),
            DEFAULT_ALPHA,
            250.0,
            40.5,
        )
        .unwrap();
        assert!(pet[0].is_finite());
        assert!(!pet[1].is_finite());
        assert!(pet[2].is_finite());
    }

    #[test]
    fn summer_day_is_plausible() {
        let pet = pet_for_day(150.0, 5.0, 20.0, 180.0, DEFAULT_ALPHA, 250.0, 40.5);
        assert!(pet.is_finite());
        assert!(pet > 0.0 && pet < 10.0, "got {pet}");
    }

    #[test]
    fn pet_scales_linearly_with_alpha() {
        let base = pet_for_day(200.0, 8.0, 24.0, 200.0, 1.0, 100.0, 52.0);
        let scaled = pet_for_day(200.0, 8.0, 24.0, 200.0, 1.26, 100.0, 52.0);
        assert!(is_close!(scaled, base * 1.26));
    }

    #[test]
    fn polar_day_is_finite() {
        // Sunset term saturates at 78°N around the June solstice
        let pet = pet_for_day(250.0, 0.0, 8.0, 172.0, DEFAULT_ALPHA, 10.0, 78.0);
        assert!(pet.is_finite());
    }

    #[test]
    fn parameters_match_free_function() {
        let params = PetParameters::new(1.2, 500.0, -33.0);
        let a = params.pet(120.0, 10.0, 25.0, 15.0);
        let b = pet_for_day(120.0, 10.0, 25.0, 15.0, 1.2, 500.0, -33.0);
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_misaligned_inputs() {
        let result = estimate_pet(
            array![150.0, 150.0].view(),
            array![5.0].view(),
            array![20.0, 20.0].view(),
            array![1.0, 2.0].view(),
            DEFAULT_ALPHA,
            0.0,
            0.0,
        );
        assert!(matches!(result, Err(ForcingError::Dataset(_))));
    }
}
