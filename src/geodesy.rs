use crate::track::Coordinate;

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.;

/// Great-circle (haversine) distance between two coordinates, in kilometers.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.).sin().powi(2)
        + a.latitude.to_radians().cos() * b.latitude.to_radians().cos() * (d_lon / 2.).sin().powi(2);
    let c = 2. * h.sqrt().atan2((1. - h).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identical_points_are_zero() {
        let p = Coordinate::new(51.5007, -0.1246);
        assert_eq!(distance_km(p, p), 0.);
    }

    #[test]
    fn test_known_distance() {
        // 0.009 degrees of latitude is roughly one kilometer
        let d = distance_km(Coordinate::new(0., 0.), Coordinate::new(0.009, 0.));
        assert!((d - 1.0008).abs() < 0.001, "distance was {}", d);

        // London to Paris
        let d = distance_km(
            Coordinate::new(51.5074, -0.1278),
            Coordinate::new(48.8566, 2.3522),
        );
        assert!((d - 343.5).abs() < 1., "distance was {}", d);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_distance_is_symmetric(
            lat_a in -90f64..90f64,
            lon_a in -180f64..180f64,
            lat_b in -90f64..90f64,
            lon_b in -180f64..180f64,
        ) {
            let a = Coordinate::new(lat_a, lon_a);
            let b = Coordinate::new(lat_b, lon_b);
            prop_assert!((distance_km(a, b) - distance_km(b, a)).abs() < 1e-9);
            prop_assert_eq!(distance_km(a, a), 0.);
            prop_assert!(distance_km(a, b) >= 0.);
        }
    }
}
