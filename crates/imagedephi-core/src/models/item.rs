use serde::{Deserialize, Serialize};

/// Pyramid layout of a tiled image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileMetadata {
    pub levels: u32,
    pub size_x: u64,
    pub size_y: u64,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl TileMetadata {
    /// Number of tiles across and down at full resolution.
    pub fn tile_grid(&self) -> (u64, u64) {
        let across = self.size_x.div_ceil(u64::from(self.tile_width.max(1)));
        let down = self.size_y.div_ceil(u64::from(self.tile_height.max(1)));
        (across, down)
    }
}

/// Styling and identity of one redaction annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoJsProperties {
    #[serde(default = "default_annotation_type")]
    pub annotation_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub annotation_id: i64,
    #[serde(default)]
    pub fill: bool,
    #[serde(default)]
    pub fill_color: String,
    #[serde(default)]
    pub fill_opacity: f64,
    #[serde(default)]
    pub stroke: bool,
    #[serde(default)]
    pub stroke_color: String,
    #[serde(default)]
    pub stroke_opacity: f64,
    #[serde(default)]
    pub stroke_width: f64,
}

fn default_annotation_type() -> String {
    "polygon".to_string()
}

/// GeoJSON polygon: a list of linear rings of `[x, y]` positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Geometry {
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Feature {
    Feature {
        geometry: Geometry,
        properties: GeoJsProperties,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeoJson {
    FeatureCollection { features: Vec<Feature> },
}

impl GeoJson {
    pub fn features(&self) -> &[Feature] {
        match self {
            GeoJson::FeatureCollection { features } => features,
        }
    }
}

impl Default for GeoJson {
    fn default() -> Self {
        GeoJson::FeatureCollection { features: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ImagedephiMetadata {
    #[serde(default)]
    pub geojson: GeoJson,
}

/// The plugin's namespace inside an item's metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GirderKeyspace {
    #[serde(default)]
    pub imagedephi: ImagedephiMetadata,
}

/// Item document as returned by `GET item/{id}`; plugin data lives in `meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub meta: GirderKeyspace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tile_metadata() {
        let json = r#"{"levels":7,"sizeX":10000,"sizeY":5000,"tileWidth":256,"tileHeight":256,"magnification":40}"#;
        let meta: TileMetadata = serde_json::from_str(json).expect("Failed to parse tile metadata");
        assert_eq!(meta.levels, 7);
        assert_eq!(meta.tile_grid(), (40, 20));
    }

    #[test]
    fn test_parse_geojson_keyspace() {
        let json = r##"{"imagedephi":{"geojson":{"type":"FeatureCollection","features":[
            {"type":"Feature","geometry":{"type":"Polygon","coordinates":[[[0,0],[10,0],[10,10],[0,0]]]},
             "properties":{"annotationType":"polygon","name":"label","description":"","annotationId":3,
                           "fill":true,"fillColor":"#000000","fillOpacity":1,"stroke":false,
                           "strokeColor":"#ff0000","strokeOpacity":1,"strokeWidth":2}}]}}}"##;
        let keyspace: GirderKeyspace = serde_json::from_str(json).expect("Failed to parse keyspace");
        let features = keyspace.imagedephi.geojson.features();
        assert_eq!(features.len(), 1);
        let Feature::Feature { geometry, properties } = &features[0];
        assert_eq!(properties.annotation_id, 3);
        assert_eq!(properties.fill_color, "#000000");
        let Geometry::Polygon { coordinates } = geometry;
        assert_eq!(coordinates[0][2], [10.0, 10.0]);
    }

    #[test]
    fn test_parse_item_without_annotations() {
        let json = r#"{"_id":"i1","name":"slide.svs","folderId":"f1","meta":{"other":1}}"#;
        let item: Item = serde_json::from_str(json).expect("Failed to parse item");
        assert_eq!(item.id, "i1");
        assert!(item.meta.imagedephi.geojson.features().is_empty());
    }

    #[test]
    fn test_missing_keyspace_defaults_to_empty_collection() {
        let keyspace: GirderKeyspace = serde_json::from_str("{}").unwrap();
        assert!(keyspace.imagedephi.geojson.features().is_empty());
        let json = serde_json::to_value(&keyspace).unwrap();
        assert_eq!(json["imagedephi"]["geojson"]["type"], "FeatureCollection");
    }
}
