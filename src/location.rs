use crate::models::Location;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapPlatform {
    Ios,
    Android,
}

impl Location {
    /// Great-circle distance (haversine)
    pub fn distance_km(&self, other: &Location) -> f64 {
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * other.latitude.to_radians().cos()
                * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }

    /// Deep link that opens the platform's maps app at this point
    pub fn maps_url(&self, platform: MapPlatform, label: &str) -> String {
        let lat_lng = format!("{},{}", self.latitude, self.longitude);
        match platform {
            MapPlatform::Ios => format!("maps:0,0?q={}@{}", label, lat_lng),
            MapPlatform::Android => format!("geo:0,0?q={}({})", lat_lng, label),
        }
    }
}
