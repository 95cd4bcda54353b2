//! Thermodynamic relations between the fitted quantities.

use crate::experiment::KELVIN_OFFSET;

/// Molar gas constant [J/(mol K)].
pub const GAS_CONSTANT: f64 = 8.314_462_618;

/// Reference temperature for standard enthalpies [°C].
pub const REFERENCE_TEMPERATURE: f64 = 25.0;

/// Convert a temperature from °C to K.
pub fn celsius_to_kelvin(t: f64) -> f64 {
    t + KELVIN_OFFSET
}

/// ΔG = -RT ln K for an association constant at `t_kelvin`.
pub fn gibbs_from_affinity(k: f64, t_kelvin: f64) -> f64 {
    -GAS_CONSTANT * t_kelvin * k.ln()
}

/// K = exp(-ΔG / RT).
pub fn affinity_from_gibbs(dg: f64, t_kelvin: f64) -> f64 {
    (-dg / (GAS_CONSTANT * t_kelvin)).exp()
}
