//! Channel animation (`PANIM`) decoding.
//!
//! `channels` is an element array; each channel has a `targetPath`
//! (`ec/animated/bone/<bone>/<position|rotation>`), `times` in seconds and
//! `values`. Bone channels become [`BoneTrack`]s, every other target is
//! recorded in [`AnimationData::skipped`].

use tracing::{debug, warn};

use super::{asset_body, read_floats, read_vec3s};
use crate::udm::Property;
use crate::util::{convert_quat, Error, Quat, Result, Type, Vec3, Vec4};

/// Animation asset type identifier.
pub const ANIMATION_ASSET_TYPE: &str = "PANIM";

/// Target path prefix of bone channels.
pub const BONE_TARGET_PREFIX: &str = "ec/animated/bone/";

/// Keyframe values of one bone channel.
#[derive(Clone, Debug, PartialEq)]
pub enum BoneChannel {
    /// Local translations, scaled but kept in engine axes.
    Position(Vec<Vec3>),
    /// Local rotations in host axes.
    Rotation(Vec<Quat>),
}

impl BoneChannel {
    pub fn len(&self) -> usize {
        match self {
            Self::Position(v) => v.len(),
            Self::Rotation(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Name of the channel in a target path.
    pub fn target(&self) -> &'static str {
        match self {
            Self::Position(_) => "position",
            Self::Rotation(_) => "rotation",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BoneTrack {
    pub bone: String,
    /// Key times in seconds, non-negative.
    pub times: Vec<f32>,
    pub channel: BoneChannel,
}

impl BoneTrack {
    /// Key frames at `fps`, truncated toward zero.
    pub fn frames(&self, fps: f32) -> impl Iterator<Item = i32> + '_ {
        self.times.iter().map(move |t| (t * fps) as i32)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AnimationData {
    pub name: String,
    pub tracks: Vec<BoneTrack>,
    /// Target paths that were not decoded.
    pub skipped: Vec<String>,
}

impl AnimationData {
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks_for<'a>(&'a self, bone: &'a str) -> impl Iterator<Item = &'a BoneTrack> + 'a {
        self.tracks.iter().filter(move |t| t.bone == bone)
    }

    /// Last key time over all tracks.
    pub fn duration(&self) -> f32 {
        self.tracks
            .iter()
            .filter_map(|t| t.times.last().copied())
            .fold(0.0, f32::max)
    }
}

/// Engine bones point along +X where host bones point along +Y; key
/// rotations are conjugated by a quarter turn about Z.
pub fn convert_bone_rotation(q: Quat) -> Quat {
    let after = Quat::from_rotation_z(std::f32::consts::FRAC_PI_2);
    let before = Quat::from_rotation_z(-std::f32::consts::FRAC_PI_2);
    after * convert_quat(q) * before
}

pub fn decode_animation(name: &str, root: &Property, scale: f32) -> Result<AnimationData> {
    let body = asset_body(root, ANIMATION_ASSET_TYPE)?;
    let mut animation = AnimationData {
        name: name.to_string(),
        ..Default::default()
    };
    let Some(channels) = body.try_get("channels") else {
        return Ok(animation);
    };

    for (_, channel) in channels.items()? {
        let target = channel.get("targetPath")?.as_str()?;
        let Some((bone, kind)) = target
            .strip_prefix(BONE_TARGET_PREFIX)
            .and_then(|rest| rest.rsplit_once('/'))
        else {
            debug!("skipping channel {target}");
            animation.skipped.push(target.to_string());
            continue;
        };

        let times = read_floats(channel.get("times")?)?;
        let values = channel.get("values")?;
        let channel = match kind {
            "position" => BoneChannel::Position(read_vec3s(values)?.into_iter().map(|v| v * scale).collect()),
            "rotation" => BoneChannel::Rotation(read_quats(values)?.into_iter().map(convert_bone_rotation).collect()),
            other => {
                warn!("unsupported bone channel '{other}' in {target}");
                animation.skipped.push(target.to_string());
                continue;
            }
        };
        if channel.len() != times.len() {
            return Err(Error::invalid(format!(
                "{target}: {} values for {} times",
                channel.len(),
                times.len()
            )));
        }

        let keep: Vec<bool> = times.iter().map(|&t| t >= 0.0).collect();
        let channel = match channel {
            BoneChannel::Position(v) => BoneChannel::Position(retain_keys(v, &keep)),
            BoneChannel::Rotation(v) => BoneChannel::Rotation(retain_keys(v, &keep)),
        };
        let times = retain_keys(times, &keep);
        if times.is_empty() {
            continue;
        }
        animation.tracks.push(BoneTrack {
            bone: bone.to_string(),
            times,
            channel,
        });
    }
    debug!(
        tracks = animation.tracks.len(),
        skipped = animation.skipped.len(),
        "decoded animation {name}"
    );
    Ok(animation)
}

fn retain_keys<T>(values: Vec<T>, keep: &[bool]) -> Vec<T> {
    values
        .into_iter()
        .zip(keep)
        .filter_map(|(v, &k)| k.then_some(v))
        .collect()
}

/// Quaternions stored `x y z w`, as quaternion, vec4 or flat float arrays.
fn read_quats(prop: &Property) -> Result<Vec<Quat>> {
    let array = prop.as_array()?;
    match array.value_type() {
        Type::Quaternion => array.to_vec::<Quat>(),
        Type::Vector4 => Ok(array.to_vec::<Vec4>()?.into_iter().map(Quat::from_vec4).collect()),
        _ => {
            let floats = read_floats(prop)?;
            if floats.len() % 4 != 0 {
                return Err(Error::invalid(format!("{} floats do not form quaternions", floats.len())));
            }
            Ok(floats.chunks_exact(4).map(Quat::from_slice).collect())
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::udm::format::{KEY_ASSET_DATA, KEY_ASSET_TYPE};
    use crate::udm::{Array, Element};

    fn channel(target: &str, times: &[f32], values: Array) -> Element {
        Element::new()
            .with("targetPath", target)
            .unwrap()
            .with("times", Array::from_values(times))
            .unwrap()
            .with("values", values)
            .unwrap()
    }

    pub(crate) fn sample_animation() -> Element {
        let channels = Array::from_elements([
            channel(
                "ec/animated/bone/root/position",
                &[-1.0, 0.0, 1.0],
                Array::from_values(&[Vec3::ZERO, Vec3::X, Vec3::Y]),
            ),
            channel(
                "ec/animated/bone/root/rotation",
                &[0.0, 0.5],
                Array::from_values(&[Quat::IDENTITY, Quat::from_rotation_y(1.0)]),
            ),
            channel("ec/flex/smile/weight", &[0.0], Array::from_values(&[1.0f32])),
        ]);
        Element::new()
            .with(KEY_ASSET_TYPE, ANIMATION_ASSET_TYPE)
            .unwrap()
            .with(KEY_ASSET_DATA, Element::new().with("channels", channels).unwrap())
            .unwrap()
    }

    #[test]
    fn test_bone_tracks() {
        let animation = decode_animation("walk", &Property::Element(sample_animation()), 2.0).unwrap();
        assert_eq!(animation.tracks.len(), 2);
        assert_eq!(animation.skipped, vec!["ec/flex/smile/weight".to_string()]);

        let position = &animation.tracks[0];
        assert_eq!(position.bone, "root");
        // Negative times are dropped, zero is kept.
        assert_eq!(position.times, vec![0.0, 1.0]);
        assert_eq!(position.channel, BoneChannel::Position(vec![Vec3::X * 2.0, Vec3::Y * 2.0]));
        assert_eq!(position.frames(24.0).collect::<Vec<_>>(), vec![0, 24]);
        assert_eq!(animation.duration(), 1.0);
        assert_eq!(animation.tracks_for("root").count(), 2);
    }

    #[test]
    fn test_rotation_conversion() {
        let animation = decode_animation("walk", &Property::Element(sample_animation()), 1.0).unwrap();
        let BoneChannel::Rotation(keys) = &animation.tracks[1].channel else {
            panic!("expected rotation channel");
        };
        assert!(keys[0].abs_diff_eq(Quat::IDENTITY, 1e-6));
        // Engine Y is host Z, conjugation by a Z turn leaves it there.
        assert!(keys[1].abs_diff_eq(Quat::from_rotation_z(1.0), 1e-5));
    }

    #[test]
    fn test_mismatched_key_counts() {
        let channels = Array::from_elements([channel(
            "ec/animated/bone/root/position",
            &[0.0],
            Array::from_values(&[Vec3::ZERO, Vec3::X]),
        )]);
        let root = Element::new().with("channels", channels).unwrap();
        let err = decode_animation("bad", &Property::Element(root), 1.0).unwrap_err();
        assert!(matches!(err, Error::InvalidStructure(_)));
    }
}
