// Homewatt - Household energy telemetry collector and process supervisor
//
// Copyright 2026 The Homewatt Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use crate::reading::{ReadingData, SourceKind};
use crate::source::core::{check_status, http_client, Source, SourceError, SourceErrorKind};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

const WEATHER_URL: &str = "http://api.openweathermap.org/data/2.5/weather";
const KELVIN_OFFSET: f64 = 273.15;

#[derive(Debug, Deserialize)]
struct WeatherResponse {
    main: WeatherMain,
    wind: WeatherWind,
    clouds: WeatherClouds,
    weather: Vec<WeatherDescription>,
}

#[derive(Debug, Deserialize)]
struct WeatherMain {
    temp: f64,
    feels_like: f64,
    humidity: f64,
    pressure: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherWind {
    speed: f64,
    #[serde(default)]
    deg: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherClouds {
    all: f64,
}

#[derive(Debug, Deserialize)]
struct WeatherDescription {
    description: String,
}

/// Current conditions for a city from the OpenWeatherMap API.
pub struct WeatherClient {
    client: reqwest::Client,
    city: String,
    api_key: String,
}

impl WeatherClient {
    pub fn new(city: &str, api_key: &str, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client(timeout)?,
            city: city.to_owned(),
            api_key: api_key.to_owned(),
        })
    }

    fn parse(body: &str) -> Result<ReadingData, SourceError> {
        let res: WeatherResponse = serde_json::from_str(body).map_err(|e| {
            SourceError::KindMsgCause(SourceErrorKind::Payload, "malformed weather response", Box::new(e))
        })?;

        let description = res
            .weather
            .into_iter()
            .next()
            .map(|w| w.description)
            .unwrap_or_default();

        Ok(ReadingData::Weather {
            temperature_c: kelvin_to_celsius(res.main.temp),
            feels_like_c: kelvin_to_celsius(res.main.feels_like),
            humidity_pct: res.main.humidity,
            pressure_hpa: res.main.pressure,
            wind_ms: res.wind.speed,
            wind_degrees: res.wind.deg,
            clouds_pct: res.clouds.all,
            description,
        })
    }
}

/// Convert Kelvin (the API default unit) to Celsius rounded to two decimals.
fn kelvin_to_celsius(kelvin: f64) -> f64 {
    ((kelvin - KELVIN_OFFSET) * 100.0).round() / 100.0
}

#[async_trait]
impl Source for WeatherClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Weather
    }

    async fn fetch(&self) -> Result<ReadingData, SourceError> {
        let req = self
            .client
            .get(WEATHER_URL)
            .query(&[("q", self.city.as_str()), ("appid", self.api_key.as_str())]);

        let res = check_status(req.send().await?)?;
        let body = res.text().await?;
        Self::parse(&body)
    }
}

impl Debug for WeatherClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeatherClient").field("city", &self.city).finish()
    }
}

#[cfg(test)]
mod test {
    use super::{kelvin_to_celsius, WeatherClient};
    use crate::reading::ReadingData;
    use crate::source::SourceErrorKind;

    #[test]
    fn test_kelvin_to_celsius() {
        assert_eq!(0.0, kelvin_to_celsius(273.15));
        assert_eq!(-5.36, kelvin_to_celsius(267.79));
        assert_eq!(21.85, kelvin_to_celsius(295.0));
    }

    #[test]
    fn test_parse_valid() {
        let body = r#"{
            "coord": {"lon": 18.6464, "lat": 54.3521},
            "weather": [{"id": 803, "main": "Clouds", "description": "broken clouds", "icon": "04d"}],
            "main": {"temp": 283.15, "feels_like": 281.9, "temp_min": 282.0, "temp_max": 284.0, "pressure": 1013, "humidity": 81},
            "wind": {"speed": 5.7, "deg": 250},
            "clouds": {"all": 75},
            "name": "Gdansk"
        }"#;

        let data = WeatherClient::parse(body).unwrap();
        assert_eq!(
            ReadingData::Weather {
                temperature_c: 10.0,
                feels_like_c: 8.75,
                humidity_pct: 81.0,
                pressure_hpa: 1013.0,
                wind_ms: 5.7,
                wind_degrees: 250.0,
                clouds_pct: 75.0,
                description: "broken clouds".to_owned(),
            },
            data
        );
    }

    #[test]
    fn test_parse_missing_fields() {
        let res = WeatherClient::parse(r#"{"cod": 401, "message": "Invalid API key"}"#);
        assert_eq!(SourceErrorKind::Payload, res.unwrap_err().kind());
    }
}
