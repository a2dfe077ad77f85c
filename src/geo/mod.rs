use crate::models::tracking::GeoPoint;

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

#[cfg(test)]
mod tests {
    use super::haversine_km;
    use crate::models::tracking::GeoPoint;

    const DEPOT: GeoPoint = GeoPoint {
        lat: 19.076,
        lng: 72.8777,
    };

    #[test]
    fn pickup_equal_to_drop_is_zero_km() {
        assert!(haversine_km(&DEPOT, &DEPOT) < 1e-9);
    }

    #[test]
    fn route_length_does_not_depend_on_direction() {
        let airport = GeoPoint {
            lat: 19.0896,
            lng: 72.8656,
        };
        let there = haversine_km(&DEPOT, &airport);
        let back = haversine_km(&airport, &DEPOT);

        assert!((there - back).abs() < 1e-9);
        assert!(there > 1.0 && there < 3.0, "{there}");
    }

    #[test]
    fn one_degree_of_latitude_is_about_111_km() {
        let north = GeoPoint {
            lat: DEPOT.lat + 1.0,
            lng: DEPOT.lng,
        };
        let distance = haversine_km(&DEPOT, &north);
        assert!((distance - 111.2).abs() < 0.5, "{distance}");
    }
}
