//! Barometric altitude above the launch pad.

/// Standard sea-level pressure, hPa.
pub const SEA_LEVEL_HPA: f32 = 1013.25;

/// Barometer poll interval (64 Hz).
pub const BARO_INTERVAL_US: u64 = 15_625;

/// International barometric formula, metres above the reference level.
pub fn pressure_to_altitude(pressure_hpa: f32, reference_hpa: f32) -> f32 {
    if !(pressure_hpa > 0.0 && reference_hpa > 0.0) {
        return f32::NAN;
    }
    44_330.0 * (1.0 - libm::powf(pressure_hpa / reference_hpa, 1.0 / 5.255))
}

/// Latest pressure reading and the pad reference it is measured against.
#[derive(Debug, Clone, Copy)]
pub struct Altimeter {
    reference_hpa: f32,
    pressure_hpa: f32,
    altitude_m: f32,
}

impl Default for Altimeter {
    fn default() -> Self {
        Self {
            reference_hpa: SEA_LEVEL_HPA,
            pressure_hpa: f32::NAN,
            altitude_m: f32::NAN,
        }
    }
}

impl Altimeter {
    /// Record a new pressure. While `capture_reference` is set (on the pad)
    /// the reading also becomes the zero-altitude reference.
    pub fn update(&mut self, pressure_hpa: f32, capture_reference: bool) {
        if !pressure_hpa.is_finite() || pressure_hpa <= 0.0 {
            return;
        }
        if capture_reference {
            self.reference_hpa = pressure_hpa;
        }
        self.pressure_hpa = pressure_hpa;
        self.altitude_m = pressure_to_altitude(pressure_hpa, self.reference_hpa);
    }

    pub fn pressure(&self) -> f32 {
        self.pressure_hpa
    }

    pub fn altitude(&self) -> f32 {
        self.altitude_m
    }

    pub fn reference(&self) -> f32 {
        self.reference_hpa
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_altitude_at_reference_is_zero() {
        assert_eq!(pressure_to_altitude(1013.25, 1013.25), 0.0);
    }

    #[test]
    fn test_altitude_known_point() {
        // ~111 m per 13.25 hPa near sea level.
        let alt = pressure_to_altitude(1000.0, SEA_LEVEL_HPA);
        assert!((alt - 110.9).abs() < 1.0, "{alt}");
    }

    #[test]
    fn test_altimeter_captures_pad_reference() {
        let mut alt = Altimeter::default();
        alt.update(980.0, true);
        assert_eq!(alt.reference(), 980.0);
        assert_eq!(alt.altitude(), 0.0);

        alt.update(970.0, false);
        assert_eq!(alt.reference(), 980.0);
        assert!(alt.altitude() > 80.0);

        alt.update(f32::NAN, true);
        assert_eq!(alt.pressure(), 970.0);
    }
}
