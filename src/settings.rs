use std::path::Path;

use glam::Vec4;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::error::{PointCloudError, Result};

/// Tunables for the generated point cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_point_count")]
    pub point_count: usize,
    #[serde(default = "default_point_scale")]
    pub point_scale: f32,
    #[serde(default = "default_point_color")]
    pub point_color: Vec4,
    /// Seconds for one full turn.
    #[serde(default = "default_rotation_period")]
    pub rotation_period: f32,
    #[serde(default = "default_shell_radius")]
    pub shell_radius: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            point_count: default_point_count(),
            point_scale: default_point_scale(),
            point_color: default_point_color(),
            rotation_period: default_rotation_period(),
            shell_radius: default_shell_radius(),
            seed: None,
        }
    }
}

fn default_point_count() -> usize {
    100
}

fn default_point_scale() -> f32 {
    0.05
}

fn default_point_color() -> Vec4 {
    Vec4::new(1.0, 0.0, 0.0, 1.0)
}

fn default_rotation_period() -> f32 {
    5.0
}

fn default_shell_radius() -> f32 {
    0.35
}

impl Settings {
    /// Reads a settings document from disk.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let xml = std::fs::read_to_string(path).map_err(|err| {
            PointCloudError::settings(format!("unable to read {}: {err}", path.display()))
        })?;
        Self::from_xml(&xml)
    }

    /// Parses a `<pointcloud>` document. Missing tags keep their defaults.
    pub fn from_xml(xml: &str) -> Result<Self> {
        let document = Document::parse(xml)
            .map_err(|err| PointCloudError::settings(format!("invalid settings XML: {err}")))?;
        let root = document.root_element();
        if !root.has_tag_name("pointcloud") {
            return Err(PointCloudError::settings(format!(
                "expected <pointcloud> root, found <{}>",
                root.tag_name().name()
            )));
        }

        let mut settings = Settings::default();
        if let Some(count) = optional_text(&root, "count") {
            settings.point_count = count
                .parse()
                .map_err(|err| PointCloudError::settings(format!("invalid <count>: {err}")))?;
        }
        settings.point_scale = parse_f32(&root, "scale", settings.point_scale)?;
        settings.point_color = parse_color(optional_text(&root, "color"), settings.point_color)?;
        settings.rotation_period = parse_f32(&root, "period", settings.rotation_period)?;
        settings.shell_radius = parse_f32(&root, "radius", settings.shell_radius)?;
        if let Some(seed) = optional_text(&root, "seed") {
            settings.seed = Some(
                seed.parse()
                    .map_err(|err| PointCloudError::settings(format!("invalid <seed>: {err}")))?,
            );
        }
        Ok(settings)
    }
}

fn optional_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.has_tag_name(tag))
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| text.to_string())
}

fn parse_f32(node: &Node<'_, '_>, tag: &str, default: f32) -> Result<f32> {
    match optional_text(node, tag) {
        Some(value) => value
            .parse::<f32>()
            .map_err(|err| PointCloudError::settings(format!("invalid <{tag}>: {err}"))),
        None => Ok(default),
    }
}

/// Parses `r g b [a]` with 0-255 components.
fn parse_color(value: Option<String>, default: Vec4) -> Result<Vec4> {
    let Some(value) = value else {
        return Ok(default);
    };
    let components = value
        .split_whitespace()
        .map(|component| component.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| PointCloudError::settings(format!("invalid <color>: {err}")))?;
    let (rgb, alpha) = match components.as_slice() {
        [r, g, b] => ([*r, *g, *b], 255.0),
        [r, g, b, a] => ([*r, *g, *b], *a),
        _ => {
            return Err(PointCloudError::settings(
                "color needs 3 or 4 components",
            ))
        }
    };
    Ok(Vec4::new(rgb[0], rgb[1], rgb[2], alpha) / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_keeps_defaults() {
        let settings = Settings::from_xml("<pointcloud/>").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.point_count, 100);
        assert_eq!(settings.rotation_period, 5.0);
    }

    #[test]
    fn parses_every_field() {
        let xml = r#"
        <pointcloud>
            <count>250</count>
            <scale>0.1</scale>
            <color>0 255 0 128</color>
            <period>2.5</period>
            <radius>1.0</radius>
            <seed>99</seed>
        </pointcloud>
        "#;
        let settings = Settings::from_xml(xml).unwrap();
        assert_eq!(settings.point_count, 250);
        assert_eq!(settings.point_scale, 0.1);
        assert_eq!(settings.point_color, Vec4::new(0.0, 1.0, 0.0, 128.0 / 255.0));
        assert_eq!(settings.rotation_period, 2.5);
        assert_eq!(settings.shell_radius, 1.0);
        assert_eq!(settings.seed, Some(99));
    }

    #[test]
    fn rgb_color_is_opaque() {
        let settings = Settings::from_xml("<pointcloud><color>255 0 0</color></pointcloud>").unwrap();
        assert_eq!(settings.point_color, Vec4::new(1.0, 0.0, 0.0, 1.0));
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(Settings::from_xml("<pointcloud><count>-3</count></pointcloud>").is_err());
        assert!(Settings::from_xml("<pointcloud><period>soon</period></pointcloud>").is_err());
        assert!(Settings::from_xml("<pointcloud><color>1 2</color></pointcloud>").is_err());
        assert!(Settings::from_xml("<scene/>").is_err());
    }
}
