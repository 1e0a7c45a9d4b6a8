use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

/// Named pricing locations with published settlement prices
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter, AsRefStr,
)]
pub enum SettlementPoint {
    #[strum(serialize = "HB_HOUSTON")]
    #[serde(rename = "HB_HOUSTON")]
    HubHouston,
    #[strum(serialize = "HB_NORTH")]
    #[serde(rename = "HB_NORTH")]
    HubNorth,
    #[strum(serialize = "HB_PAN")]
    #[serde(rename = "HB_PAN")]
    HubPanhandle,
    #[strum(serialize = "HB_SOUTH")]
    #[serde(rename = "HB_SOUTH")]
    HubSouth,
    #[strum(serialize = "HB_WEST")]
    #[serde(rename = "HB_WEST")]
    HubWest,
    #[strum(serialize = "LZ_AEN")]
    #[serde(rename = "LZ_AEN")]
    LoadZoneAen,
    #[strum(serialize = "LZ_CPS")]
    #[serde(rename = "LZ_CPS")]
    LoadZoneCps,
    #[strum(serialize = "LZ_HOUSTON")]
    #[serde(rename = "LZ_HOUSTON")]
    LoadZoneHouston,
    #[strum(serialize = "LZ_LCRA")]
    #[serde(rename = "LZ_LCRA")]
    LoadZoneLcra,
    #[strum(serialize = "LZ_NORTH")]
    #[serde(rename = "LZ_NORTH")]
    LoadZoneNorth,
    #[strum(serialize = "LZ_RAYBN")]
    #[serde(rename = "LZ_RAYBN")]
    LoadZoneRaybn,
    #[strum(serialize = "LZ_SOUTH")]
    #[serde(rename = "LZ_SOUTH")]
    LoadZoneSouth,
    #[strum(serialize = "LZ_WEST")]
    #[serde(rename = "LZ_WEST")]
    LoadZoneWest,
}

/// Settlement point category, matching the two published price tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SettlementPointType {
    Hub,
    LoadZone,
}

impl SettlementPoint {
    pub fn point_type(&self) -> SettlementPointType {
        if self.as_ref().starts_with("HB_") {
            SettlementPointType::Hub
        } else {
            SettlementPointType::LoadZone
        }
    }

    /// Every known settlement point name, hubs first
    pub fn all_names() -> Vec<String> {
        Self::iter().map(|p| p.to_string()).collect()
    }
}
