//! Shooting-mode albums: which capture modes an asset belongs to and the
//! lookup that resolves a mode to its persisted album.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::model::{AssetSnapshot, PhotoSubtype};
use crate::error::Result;

const RAW_MIME_TYPE: &str = "image/x-adobe-dng";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShootingModeAlbumType {
    Portrait,
    WideAperture,
    NightShot,
    MovingPicture,
    ProPhoto,
    SlowMotion,
    LightPainting,
    HighPixel,
    SuperMacro,
    Panorama,
    Burst,
    FrontCamera,
    RawImage,
}

impl ShootingModeAlbumType {
    pub const ALL: [ShootingModeAlbumType; 13] = [
        ShootingModeAlbumType::Portrait,
        ShootingModeAlbumType::WideAperture,
        ShootingModeAlbumType::NightShot,
        ShootingModeAlbumType::MovingPicture,
        ShootingModeAlbumType::ProPhoto,
        ShootingModeAlbumType::SlowMotion,
        ShootingModeAlbumType::LightPainting,
        ShootingModeAlbumType::HighPixel,
        ShootingModeAlbumType::SuperMacro,
        ShootingModeAlbumType::Panorama,
        ShootingModeAlbumType::Burst,
        ShootingModeAlbumType::FrontCamera,
        ShootingModeAlbumType::RawImage,
    ];

    /// Numeric tag, also the album name of the persisted shooting-mode album.
    pub fn tag(self) -> i32 {
        match self {
            ShootingModeAlbumType::Portrait => 1,
            ShootingModeAlbumType::WideAperture => 2,
            ShootingModeAlbumType::NightShot => 3,
            ShootingModeAlbumType::MovingPicture => 4,
            ShootingModeAlbumType::ProPhoto => 5,
            ShootingModeAlbumType::SlowMotion => 6,
            ShootingModeAlbumType::LightPainting => 7,
            ShootingModeAlbumType::HighPixel => 8,
            ShootingModeAlbumType::SuperMacro => 9,
            ShootingModeAlbumType::Panorama => 10,
            ShootingModeAlbumType::Burst => 11,
            ShootingModeAlbumType::FrontCamera => 12,
            ShootingModeAlbumType::RawImage => 13,
        }
    }

    pub fn from_tag(tag: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    /// Parses an album name or a capture-mode tag such as `"3"`.
    pub fn parse(value: &str) -> Option<Self> {
        value.trim().parse::<i32>().ok().and_then(Self::from_tag)
    }
}

/// Shooting-mode album types the asset belongs to.
pub fn related_types(info: &AssetSnapshot) -> BTreeSet<ShootingModeAlbumType> {
    let mut types = BTreeSet::new();

    // Only capture modes that own an album are tagged on the asset.
    if let Some(mode) = ShootingModeAlbumType::parse(&info.shooting_mode) {
        if !matches!(
            mode,
            ShootingModeAlbumType::MovingPicture
                | ShootingModeAlbumType::Burst
                | ShootingModeAlbumType::FrontCamera
                | ShootingModeAlbumType::RawImage
        ) {
            types.insert(mode);
        }
    }
    if info.photo_subtype == PhotoSubtype::MovingPhoto {
        types.insert(ShootingModeAlbumType::MovingPicture);
    }
    if !info.burst_key.is_empty() {
        types.insert(ShootingModeAlbumType::Burst);
    }
    if info.front_camera {
        types.insert(ShootingModeAlbumType::FrontCamera);
    }
    if info.mime_type.eq_ignore_ascii_case(RAW_MIME_TYPE) {
        types.insert(ShootingModeAlbumType::RawImage);
    }

    types
}

/// Resolves a shooting-mode album type to the id of its persisted album.
pub trait ShootingModeAlbumLookup {
    fn shooting_mode_album_id(&self, album_type: ShootingModeAlbumType) -> Result<Option<i32>>;
}
