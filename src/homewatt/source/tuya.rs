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

use crate::reading::{ReadingData, RoomId, SourceKind};
use crate::source::core::{check_status, http_client, Source, SourceError, SourceErrorKind};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt::{self, Debug, Formatter};
use std::time::Duration;

pub const DEFAULT_TUYA_ENDPOINT: &str = "https://openapi.tuyaeu.com";

const TOKEN_PATH: &str = "/v1.0/token?grant_type=1";
const SIGN_METHOD: &str = "HMAC-SHA256";

// Position of the datapoints we care about in a device status list. Heaters report
// the measured temperature in tenths of a degree, the sub-meter reports forward
// energy in hundredths of a kWh.
const HEATER_TEMPERATURE_INDEX: usize = 1;
const HEATER_TEMPERATURE_SCALE: f64 = 10.0;
const METER_ENERGY_INDEX: usize = 0;
const METER_ENERGY_SCALE: f64 = 100.0;

#[derive(Debug, Deserialize)]
struct TuyaEnvelope<T> {
    success: bool,
    #[serde(default)]
    msg: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TokenResult {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct DataPoint {
    #[allow(dead_code)]
    code: String,
    value: serde_json::Value,
}

/// Heater thermostats and the energy sub-meter connected to the Tuya cloud.
///
/// A fresh access token is requested on every fetch. Tokens are valid for two
/// hours but requesting one per cycle keeps the client stateless.
pub struct TuyaClient {
    client: reqwest::Client,
    endpoint: String,
    access_id: String,
    access_key: String,
    heaters: Vec<(RoomId, String)>,
    meter_id: String,
}

impl TuyaClient {
    pub fn new(
        endpoint: &str,
        access_id: &str,
        access_key: &str,
        heaters: Vec<(RoomId, String)>,
        meter_id: &str,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: endpoint.trim_end_matches('/').to_owned(),
            access_id: access_id.to_owned(),
            access_key: access_key.to_owned(),
            heaters,
            meter_id: meter_id.to_owned(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, token: Option<&str>) -> Result<T, SourceError> {
        let t = chrono::Utc::now().timestamp_millis().to_string();
        let sign = request_signature(&self.access_id, &self.access_key, token.unwrap_or(""), &t, "GET", path)?;

        let mut req = self
            .client
            .get(format!("{}{}", self.endpoint, path))
            .header("client_id", &self.access_id)
            .header("sign", sign)
            .header("sign_method", SIGN_METHOD)
            .header("t", t);

        if let Some(token) = token {
            req = req.header("access_token", token);
        }

        let res = check_status(req.send().await?)?;
        let body = res.text().await?;
        unwrap_envelope(&body)
    }

    async fn device_status(&self, token: &str, device_id: &str) -> Result<Vec<DataPoint>, SourceError> {
        self.get(&format!("/v1.0/iot-03/devices/{}/status", device_id), Some(token))
            .await
    }
}

#[async_trait]
impl Source for TuyaClient {
    fn kind(&self) -> SourceKind {
        SourceKind::Appliance
    }

    async fn fetch(&self) -> Result<ReadingData, SourceError> {
        let token: TokenResult = self.get(TOKEN_PATH, None).await?;

        let mut room_temperatures = BTreeMap::new();
        for (room, device_id) in &self.heaters {
            let status = self.device_status(&token.access_token, device_id).await?;
            let temperature = scaled_value(&status, HEATER_TEMPERATURE_INDEX, HEATER_TEMPERATURE_SCALE)?;
            room_temperatures.insert(room.clone(), temperature);
        }

        let status = self.device_status(&token.access_token, &self.meter_id).await?;
        let cumulative_energy_kwh = scaled_value(&status, METER_ENERGY_INDEX, METER_ENERGY_SCALE)?;

        tracing::debug!(
            message = "fetched appliance status",
            rooms = room_temperatures.len(),
            cumulative_energy_kwh = cumulative_energy_kwh,
        );

        Ok(ReadingData::Appliance {
            cumulative_energy_kwh,
            daily_energy_kwh: 0.0,
            room_temperatures,
        })
    }
}

impl Debug for TuyaClient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TuyaClient")
            .field("endpoint", &self.endpoint)
            .field("heaters", &self.heaters.len())
            .finish()
    }
}

fn unwrap_envelope<T: DeserializeOwned>(body: &str) -> Result<T, SourceError> {
    let envelope: TuyaEnvelope<T> = serde_json::from_str(body).map_err(|e| {
        SourceError::KindMsgCause(SourceErrorKind::Payload, "malformed Tuya response", Box::new(e))
    })?;

    if !envelope.success {
        tracing::debug!(message = "Tuya request rejected", msg = ?envelope.msg);
        return Err(SourceError::KindMsg(SourceErrorKind::Status, "Tuya request rejected"));
    }

    envelope
        .result
        .ok_or(SourceError::KindMsg(SourceErrorKind::Payload, "Tuya response missing result"))
}

fn scaled_value(status: &[DataPoint], index: usize, scale: f64) -> Result<f64, SourceError> {
    status
        .get(index)
        .and_then(|dp| dp.value.as_f64())
        .map(|v| v / scale)
        .ok_or(SourceError::KindMsg(SourceErrorKind::Payload, "device status missing datapoint"))
}

/// Parse heater configuration in the form `Room name=device_id,Other room=device_id`.
pub fn parse_heaters(spec: &str) -> Vec<(RoomId, String)> {
    spec.split(',')
        .filter_map(|pair| {
            let (room, id) = pair.split_once('=')?;
            let (room, id) = (room.trim(), id.trim());
            if room.is_empty() || id.is_empty() {
                None
            } else {
                Some((room.to_owned(), id.to_owned()))
            }
        })
        .collect()
}

type HmacSha256 = Hmac<Sha256>;

/// Compute the `sign` header for a request to the Tuya OpenAPI.
///
/// The signed string is the client id, the access token (empty when requesting
/// a token), the millisecond timestamp and a canonical form of the request:
/// method, SHA256 of the (empty) body, signed headers (none) and the URL path.
fn request_signature(
    client_id: &str,
    secret: &str,
    token: &str,
    t: &str,
    method: &str,
    path: &str,
) -> Result<String, SourceError> {
    let content_hash = hex(&Sha256::digest(b""));
    let string_to_sign = format!("{}\n{}\n\n{}", method, content_hash, path);
    let payload = format!("{}{}{}{}", client_id, token, t, string_to_sign);

    Ok(hex(&hmac_sha256(secret.as_bytes(), payload.as_bytes())?).to_uppercase())
}

fn hmac_sha256(key: &[u8], msg: &[u8]) -> Result<Vec<u8>, SourceError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| SourceError::KindMsg(SourceErrorKind::Initialization, "invalid signing key"))?;
    mac.update(msg);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
