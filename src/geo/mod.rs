use crate::models::routing::GeoPoint;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().asin();

    EARTH_RADIUS_KM * central_angle
}

/// Whole minutes to cover `distance_km` at `avg_speed_kmh`, rounded up.
pub fn estimate_eta_minutes(distance_km: f64, avg_speed_kmh: f64) -> u32 {
    if avg_speed_kmh <= 0.0 || !distance_km.is_finite() {
        return 0;
    }

    let minutes = (distance_km.max(0.0) * 60.0) / avg_speed_kmh;
    minutes.ceil() as u32
}

pub fn is_valid_point(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && (-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng)
}

#[cfg(test)]
mod tests {
    use super::{estimate_eta_minutes, haversine_km, is_valid_point};
    use crate::models::routing::GeoPoint;

    #[test]
    fn zero_distance_for_same_point() {
        let p = GeoPoint {
            lat: 24.8607,
            lng: 67.0011,
        };
        let distance = haversine_km(&p, &p);
        assert!(distance < 1e-9);
    }

    #[test]
    fn london_to_paris_is_around_343_km() {
        let london = GeoPoint {
            lat: 51.5074,
            lng: -0.1278,
        };
        let paris = GeoPoint {
            lat: 48.8566,
            lng: 2.3522,
        };
        let distance = haversine_km(&london, &paris);
        assert!((distance - 343.0).abs() < 5.0);
    }

    #[test]
    fn eta_rounds_up_to_whole_minutes() {
        assert_eq!(estimate_eta_minutes(3.5, 35.0), 6);
        assert_eq!(estimate_eta_minutes(0.0, 35.0), 0);
        assert_eq!(estimate_eta_minutes(10.0, 0.0), 0);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(is_valid_point(24.86, 67.0));
        assert!(!is_valid_point(91.0, 0.0));
        assert!(!is_valid_point(0.0, f64::NAN));
    }
}
