//! Film-maker project (`.pfmp`) decoding.
//!
//! Layout of the parts that are read:
//!
//! ```text
//! session
//!     name, activeClip
//!     clips[]
//!         uniqueId, name, mapName
//!         scene { transform }
//!         trackGroups[].tracks[].filmClips[]
//!             name
//!             scene { actors[], groups[] { actors[], groups[] } }
//!             trackGroups[].tracks[].animationClips[] { actor, animation }
//! ```
//!
//! Every actor has a `uniqueId`, a `name` and a list of `components`, each
//! with a `type` and `properties`. Components are applied in order.

use std::f32::consts::{FRAC_PI_2, PI};

use indexmap::IndexMap;
use tracing::{debug, warn};

use super::animation::{decode_animation, AnimationData};
use super::{asset_body, host_name, read_pose};
use crate::udm::Property;
use crate::util::{convert_quat, convert_vec3, Error, Mat4, Quat, Result, ScaledTransform, Vec3};

/// Project asset type identifier.
pub const PROJECT_ASSET_TYPE: &str = "PFMP";

/// Session name used when the project has none.
pub const UNNAMED_SESSION: &str = "UNNAMED_SESSION";

/// Light energy per unit of engine intensity.
const LIGHT_ENERGY_SCALE: f32 = 10_000.0;

/// Solid angle of a sphere, for lumen intensities.
const FULL_SPHERE: f32 = 12.57;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CameraData {
    /// Field of view in radians.
    pub fov: Option<f32>,
    /// Lens in millimetres.
    pub focal_length: Option<f32>,
    pub sensor_size: Option<f32>,
    pub aperture_blades: Option<u32>,
    pub fstop: Option<f32>,
    pub aperture_rotation: Option<f32>,
    /// Scaled focus distance.
    pub focus_distance: Option<f32>,
    pub use_dof: bool,
}

/// A point light.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LightData {
    /// Host energy; `None` when the intensity type is unknown.
    pub energy: Option<f32>,
    /// Soft shadow radius, scaled.
    pub radius: Option<f32>,
    pub color: Option<Vec3>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum ActorKind {
    #[default]
    Empty,
    Camera(CameraData),
    Light(LightData),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActorData {
    pub unique_id: String,
    pub name: String,
    pub visible: bool,
    /// Local matrix under the scene root.
    pub matrix: Mat4,
    pub kind: ActorKind,
    /// Logical model path from a `model` component.
    pub model: Option<String>,
    /// Logical sky texture from a `pfm_sky` component.
    pub sky_texture: Option<String>,
    /// Component types that were not understood.
    pub unhandled: Vec<String>,
}

impl ActorData {
    fn new(unique_id: String, name: String) -> Self {
        Self {
            unique_id,
            name,
            visible: true,
            matrix: Mat4::IDENTITY,
            kind: ActorKind::Empty,
            model: None,
            sky_texture: None,
            unhandled: Vec::new(),
        }
    }

    pub fn is_camera(&self) -> bool {
        matches!(self.kind, ActorKind::Camera(_))
    }

    pub fn is_light(&self) -> bool {
        matches!(self.kind, ActorKind::Light(_))
    }
}

/// An animation clip bound to an actor.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectAnimation {
    /// `{film clip}_{actor}_ACTION`.
    pub name: String,
    /// Unique id of the animated actor.
    pub actor: String,
    pub data: AnimationData,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectData {
    pub session_name: String,
    pub clip_name: String,
    /// Logical map of the active clip.
    pub map_name: Option<String>,
    /// Matrix of the scene root node.
    pub scene_transform: Mat4,
    pub actors: Vec<ActorData>,
    pub animations: Vec<ProjectAnimation>,
}

impl ProjectData {
    pub fn scene_root_name(&self) -> String {
        format!("{}_scene_root", self.session_name)
    }

    pub fn session_collection(&self) -> String {
        format!("{}_session", self.session_name)
    }

    pub fn props_collection(&self) -> String {
        format!("{}_props", self.session_name)
    }

    pub fn actor(&self, unique_id: &str) -> Option<&ActorData> {
        self.actors.iter().find(|a| a.unique_id == unique_id)
    }

    /// First sky texture set by any actor.
    pub fn sky_texture(&self) -> Option<&str> {
        self.actors.iter().find_map(|a| a.sky_texture.as_deref())
    }
}

/// Compose a host matrix from an engine pose.
fn compose(pose: &ScaledTransform, scale: f32) -> Mat4 {
    Mat4::from_scale_rotation_translation(
        pose.scale(),
        convert_quat(pose.rotation()),
        convert_vec3(pose.translation()) * scale,
    )
}

pub fn decode_project(root: &Property, scale: f32) -> Result<ProjectData> {
    let body = asset_body(root, PROJECT_ASSET_TYPE)?;
    let session = body.get("session")?;

    let session_name = session
        .try_get("name")
        .map(Property::as_str)
        .transpose()?
        .filter(|n| !n.is_empty())
        .unwrap_or(UNNAMED_SESSION)
        .to_string();

    let clips = session.get("clips")?.items()?;
    let active = session.try_get("activeClip").map(Property::as_str).transpose()?;
    let mut clip = None;
    for (_, candidate) in &clips {
        if Some(candidate.get("uniqueId")?.as_str()?) == active {
            clip = Some(*candidate);
            break;
        }
    }
    let clip = match clip {
        Some(clip) => clip,
        None => {
            let (_, first) = clips
                .first()
                .ok_or_else(|| Error::invalid("project session has no clips"))?;
            warn!("active clip {active:?} not found, using the first clip");
            *first
        }
    };

    let mut project = ProjectData {
        session_name,
        clip_name: clip.get_or("name", String::new())?,
        map_name: clip
            .try_get("mapName")
            .map(|m| m.as_str().map(str::to_string))
            .transpose()?
            .filter(|m| !m.is_empty()),
        scene_transform: match clip.try_get("scene/transform") {
            Some(t) => compose(&read_pose(t)?, scale),
            None => Mat4::IDENTITY,
        },
        ..Default::default()
    };

    let mut by_id: IndexMap<String, usize> = IndexMap::new();
    for film_clip in nested(clip, &["trackGroups", "tracks", "filmClips"])? {
        let film_name = film_clip.get_or("name", String::new())?;
        if let Some(scene) = film_clip.try_get("scene") {
            collect_actors(scene, scale, &mut project.actors, &mut by_id)?;
        }
        for animation_clip in nested(film_clip, &["trackGroups", "tracks", "animationClips"])? {
            let actor_id = animation_clip.get("actor")?.as_str()?;
            let Some(&actor) = by_id.get(actor_id) else {
                warn!("animation clip references unknown actor {actor_id}");
                continue;
            };
            let name = format!("{film_name}_{}_ACTION", project.actors[actor].name);
            let data = decode_animation(&name, animation_clip.get("animation")?, scale)?;
            project.animations.push(ProjectAnimation {
                name,
                actor: actor_id.to_string(),
                data,
            });
        }
    }

    debug!(
        actors = project.actors.len(),
        animations = project.animations.len(),
        "decoded project {}",
        project.session_name
    );
    Ok(project)
}

/// Flatten nested element arrays: `node[path0][..][path1][..]...`.
fn nested<'a>(node: &'a Property, path: &[&str]) -> Result<Vec<&'a Property>> {
    let mut level = vec![node];
    for key in path {
        let mut next = Vec::new();
        for node in level {
            if let Some(children) = node.try_get(key) {
                next.extend(children.items()?.into_iter().map(|(_, p)| p));
            }
        }
        level = next;
    }
    Ok(level)
}

fn collect_actors(
    scene: &Property,
    scale: f32,
    actors: &mut Vec<ActorData>,
    by_id: &mut IndexMap<String, usize>,
) -> Result<()> {
    if let Some(list) = scene.try_get("actors") {
        for (_, actor) in list.items()? {
            let actor = decode_actor(actor, scale)?;
            by_id.insert(actor.unique_id.clone(), actors.len());
            actors.push(actor);
        }
    }
    if let Some(groups) = scene.try_get("groups") {
        for (_, group) in groups.items()? {
            collect_actors(group, scale, actors, by_id)?;
        }
    }
    Ok(())
}

fn decode_actor(node: &Property, scale: f32) -> Result<ActorData> {
    let name = node.get_or("name", String::new())?;
    let unique_id = node.get_or("uniqueId", name.clone())?;
    let mut actor = ActorData::new(unique_id, host_name(&name));

    let Some(components) = node.try_get("components") else {
        return Ok(actor);
    };
    for (_, component) in components.items()? {
        let ty = component.get("type")?.as_str()?;
        let props = component.try_get("properties");
        apply_component(&mut actor, ty, props, scale)
            .map_err(|e| Error::invalid(format!("actor {}: {ty} component: {e}", actor.name)))?;
    }
    Ok(actor)
}

fn apply_component(actor: &mut ActorData, ty: &str, properties: Option<&Property>, scale: f32) -> Result<()> {
    let props = || properties.ok_or_else(|| Error::not_found("properties"));
    match ty {
        "pfm_actor" => {
            let p = props()?;
            let pose = ScaledTransform::new(
                p.get_or("position", Vec3::ZERO)?,
                p.get_or("rotation", Quat::IDENTITY)?,
                p.get_or("scale", Vec3::ONE)?,
            );
            actor.matrix = compose(&pose, scale);
            actor.visible = p.get_or("visible", true)?;
        }
        "pfm_sky" => {
            actor.sky_texture = Some(props()?.get("skyTexture")?.as_str()?.to_string());
        }
        "pfm_camera" => {
            actor.kind = ActorKind::Camera(CameraData::default());
            actor.matrix = actor.matrix * Mat4::from_rotation_y(PI) * Mat4::from_rotation_x(-FRAC_PI_2);
        }
        "camera" => {
            let p = props()?;
            let Some(camera) = camera_mut(actor) else {
                return Ok(());
            };
            camera.fov = Some(p.get("fov")?.as_f32()?.to_radians());
        }
        "optical_camera" => {
            let p = props()?;
            let Some(camera) = camera_mut(actor) else {
                return Ok(());
            };
            camera.focal_length = Some(p.get("focalLength")?.as_f32()?);
            camera.sensor_size = Some(p.get("sensorSize")?.as_f32()?);
            camera.aperture_blades = Some(p.get("ringCount")?.as_u32()?);
            camera.fstop = Some(p.get("fstop")?.as_f32()?);
            camera.aperture_rotation = Some(p.get("apertureBladesRotation")?.as_f32()?);
            camera.focus_distance = Some(p.get("focalDistance")?.as_f32()? * scale);
            camera.use_dof = true;
        }
        "model" => {
            actor.model = Some(props()?.get("model")?.as_str()?.to_string());
        }
        "light" => {
            let p = props()?;
            let intensity = p.get("intensity")?.as_f32()?;
            let energy = match p.get("intensityType")?.as_int()? {
                0 => Some(intensity * 0.1),
                1 => Some(intensity * 0.1 * FULL_SPHERE),
                other => {
                    warn!("unknown light intensity type {other} on {}", actor.name);
                    None
                }
            };
            actor.kind = ActorKind::Light(LightData {
                energy: energy.map(|e| e * LIGHT_ENERGY_SCALE * scale),
                ..Default::default()
            });
        }
        "radius" => {
            let radius = props()?.get("radius")?.as_f32()? * scale;
            match &mut actor.kind {
                ActorKind::Light(light) => light.radius = Some(radius),
                _ => warn!("radius on {}, which is not a light", actor.name),
            }
        }
        "color" => {
            let color = props()?.get("color")?.as_vec3()?;
            match &mut actor.kind {
                ActorKind::Light(light) => light.color = Some(color),
                ActorKind::Empty => warn!("actor {} has no data for its color", actor.name),
                ActorKind::Camera(_) => debug!("ignoring color on camera {}", actor.name),
            }
        }
        "light_point" => {
            if !actor.is_light() {
                actor.kind = ActorKind::Light(LightData::default());
            }
        }
        "skybox" => actor.visible = false,
        "pfm_model" | "render" | "light_map_receiver" => {}
        other => {
            warn!("Unhandled component: {other}");
            actor.unhandled.push(other.to_string());
        }
    }
    Ok(())
}

fn camera_mut(actor: &mut ActorData) -> Option<&mut CameraData> {
    match &mut actor.kind {
        ActorKind::Camera(camera) => Some(camera),
        _ => {
            warn!("camera properties on {}, which is not a camera", actor.name);
            None
        }
    }
}
