//! Map (`.pmap`) decoding.
//!
//! `assetData/entities` is an element array (or an element keyed by entity
//! name). Each entity carries a `className`, an optional `pose`, optional
//! `keyValues` and an optional `model` path.

use serde_json::Value as Json;
use tracing::debug;

use super::{asset_body, read_pose};
use crate::udm::Property;
use crate::util::{convert_quat, convert_vec3, Mat4, Result};

/// Map asset type identifier.
pub const MAP_ASSET_TYPE: &str = "PMAP";

#[derive(Clone, Debug, PartialEq)]
pub struct MapEntity {
    /// Entity name, or `{className}_{position}` for unnamed entities.
    pub name: String,
    pub class_name: String,
    /// Local matrix in host axes (identity when the entity has no pose).
    pub matrix: Mat4,
    /// Logical model path (without the `models/` prefix).
    pub model: Option<String>,
    /// `keyValues` forwarded to the host untouched.
    pub key_values: Json,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MapData {
    pub name: String,
    pub entities: Vec<MapEntity>,
}

impl MapData {
    /// Entities that reference a model.
    pub fn model_entities(&self) -> impl Iterator<Item = &MapEntity> + '_ {
        self.entities.iter().filter(|e| e.model.is_some())
    }

    pub fn entities_of_class<'a>(&'a self, class_name: &'a str) -> impl Iterator<Item = &'a MapEntity> + 'a {
        self.entities.iter().filter(move |e| e.class_name == class_name)
    }
}

pub fn decode_map(name: &str, root: &Property, scale: f32) -> Result<MapData> {
    let body = asset_body(root, MAP_ASSET_TYPE)?;
    let mut map = MapData {
        name: name.to_string(),
        entities: Vec::new(),
    };
    let Some(entities) = body.try_get("entities") else {
        return Ok(map);
    };
    let keyed = matches!(entities, Property::Element(_));

    for (position, (key, entity)) in entities.items()?.into_iter().enumerate() {
        let class_name = entity.get_or("className", String::new())?;
        let name = match entity.try_get("name") {
            Some(n) => n.as_str()?.to_string(),
            None if keyed => key.into_owned(),
            None => format!("{class_name}_{position}"),
        };
        let matrix = match entity.try_get("pose") {
            Some(pose) => {
                let pose = read_pose(pose)?;
                Mat4::from_scale_rotation_translation(
                    pose.scale(),
                    convert_quat(pose.rotation()),
                    convert_vec3(pose.translation()) * scale,
                )
            }
            None => Mat4::IDENTITY,
        };
        let model = match entity.try_get("model") {
            Some(m) => Some(m.as_str()?.to_string()).filter(|m| !m.is_empty()),
            None => None,
        };
        let key_values = match entity.try_get("keyValues") {
            Some(kv) => kv.to_json()?,
            None => Json::Null,
        };
        map.entities.push(MapEntity {
            name: super::host_name(&name),
            class_name,
            matrix,
            model,
            key_values,
        });
    }
    debug!(entities = map.entities.len(), "decoded map {name}");
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udm::format::{KEY_ASSET_DATA, KEY_ASSET_TYPE};
    use crate::udm::{Array, Element};
    use crate::util::{Quat, ScaledTransform, Vec3};

    fn sample_map() -> Element {
        let prop = Element::new()
            .with("className", "prop_physics")
            .unwrap()
            .with("model", "props/crate")
            .unwrap()
            .with("pose", ScaledTransform::new(Vec3::new(0.0, 1.0, 2.0), Quat::IDENTITY, Vec3::ONE))
            .unwrap()
            .with("keyValues", Element::new().with("health", 100i32).unwrap())
            .unwrap();
        let light = Element::new()
            .with("name", "sun")
            .unwrap()
            .with("className", "env_light_environment")
            .unwrap();
        let data = Element::new()
            .with("entities", Array::from_elements([prop, light]))
            .unwrap();
        Element::new()
            .with(KEY_ASSET_TYPE, MAP_ASSET_TYPE)
            .unwrap()
            .with(KEY_ASSET_DATA, data)
            .unwrap()
    }

    #[test]
    fn test_decode_entities() {
        let map = decode_map("test", &Property::Element(sample_map()), 2.0).unwrap();
        assert_eq!(map.entities.len(), 2);

        let prop = &map.entities[0];
        assert_eq!(prop.name, "prop_physics_0");
        assert_eq!(prop.model.as_deref(), Some("props/crate"));
        assert_eq!(prop.key_values["health"], 100);
        // Engine (0, 1, 2) -> host (0, -2, 1), scaled.
        assert_eq!(prop.matrix.w_axis.truncate(), Vec3::new(0.0, -4.0, 2.0));

        let sun = &map.entities[1];
        assert_eq!(sun.name, "sun");
        assert_eq!(sun.matrix, Mat4::IDENTITY);
        assert!(sun.key_values.is_null());
        assert_eq!(map.model_entities().count(), 1);
        assert_eq!(map.entities_of_class("env_light_environment").count(), 1);
    }

    #[test]
    fn test_keyed_entities() {
        let entities = Element::new()
            .with("door_1", Element::new().with("className", "func_door").unwrap())
            .unwrap();
        let root = Element::new().with("entities", entities).unwrap();
        let map = decode_map("bare", &Property::Element(root), 1.0).unwrap();
        assert_eq!(map.entities[0].name, "door_1");
        assert!(map.entities[0].model.is_none());
    }
}
