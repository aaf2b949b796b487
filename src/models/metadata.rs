use serde::{Deserialize, Serialize};
use std::fmt;

/// A kind of metadata published by the IPTV API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKind {
    Languages,
    Categories,
    Countries,
    Channels,
}

impl MetadataKind {
    pub const ALL: [MetadataKind; 4] = [
        MetadataKind::Languages,
        MetadataKind::Categories,
        MetadataKind::Countries,
        MetadataKind::Channels,
    ];

    /// API resource name, also used as the repository collection name
    pub fn resource(&self) -> &'static str {
        match self {
            MetadataKind::Languages => "languages",
            MetadataKind::Categories => "categories",
            MetadataKind::Countries => "countries",
            MetadataKind::Channels => "channels",
        }
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource())
    }
}
