// 📍 Device Location - GPS fix plus reverse geocoding to administrative names

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// What reverse geocoding returned; every part may be missing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodedPlace {
    pub postal_code: Option<String>,
    /// State / province name
    pub region: Option<String>,
    /// District name
    pub subregion: Option<String>,
}

#[async_trait]
pub trait DeviceLocation: Send + Sync {
    /// One-shot coordinate fetch
    async fn current_position(&self) -> Result<Coordinates>;

    async fn reverse_geocode(&self, coords: Coordinates) -> Result<GeocodedPlace>;
}
