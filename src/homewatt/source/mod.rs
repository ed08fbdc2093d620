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

mod core;
mod portal;
mod solax;
mod tuya;
mod weather;

pub use crate::source::core::{http_client, Source, SourceError, SourceErrorKind, DEFAULT_REQUEST_TIMEOUT};
pub use crate::source::portal::PortalClient;
pub use crate::source::solax::SolaxClient;
pub use crate::source::tuya::{parse_heaters, TuyaClient, DEFAULT_TUYA_ENDPOINT};
pub use crate::source::weather::WeatherClient;
