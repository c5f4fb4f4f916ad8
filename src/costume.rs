use serde::Deserialize;

/// Costume metadata. Pixel data stays with the embedder's image decoder;
/// the runtime only tracks identity and geometry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Costume {
    pub name: String,
    #[serde(default)]
    pub asset_id: String,
    #[serde(default)]
    pub md5ext: String,
    #[serde(default)]
    pub data_format: String,
    #[serde(default = "default_bitmap_resolution")]
    pub bitmap_resolution: f64,
    #[serde(default)]
    pub rotation_center_x: f64,
    #[serde(default)]
    pub rotation_center_y: f64,
}

fn default_bitmap_resolution() -> f64 {
    1.0
}

impl Costume {
    pub fn new(name: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Costume {
            name: name.into(),
            asset_id: asset_id.into(),
            md5ext: String::new(),
            data_format: String::new(),
            bitmap_resolution: 1.0,
            rotation_center_x: 0.0,
            rotation_center_y: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sound {
    pub name: String,
    #[serde(default)]
    pub asset_id: String,
    #[serde(default)]
    pub md5ext: String,
    #[serde(default)]
    pub data_format: String,
    #[serde(default)]
    pub rate: f64,
    #[serde(default)]
    pub sample_count: f64,
}

impl Sound {
    pub fn new(name: impl Into<String>, asset_id: impl Into<String>) -> Self {
        Sound {
            name: name.into(),
            asset_id: asset_id.into(),
            md5ext: String::new(),
            data_format: String::new(),
            rate: 0.0,
            sample_count: 0.0,
        }
    }
}
