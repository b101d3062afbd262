//! Skeleton (`PSKEL`) decoding.
//!
//! Bones live under `assetData/bones` as named elements:
//!
//! ```text
//! bones
//! {
//!     pelvis { $int32 index 0  $stransform pose [...]  children { spine {...} } }
//! }
//! ```
//!
//! Each `pose` is taken as the bone's armature-space rest transform. The
//! host matrix is `Y_UP_TO_Z_UP * T * R * BONE_ROLL`; pose scale is not
//! carried into bone matrices.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{expect_asset, host_name, read_pose};
use crate::udm::Property;
use crate::util::{Error, Mat3, Mat4, Quat, Result, ScaledTransform, Vec3, BONE_ROLL, Y_UP_TO_Z_UP};

/// Skeleton asset type identifier.
pub const SKELETON_ASSET_TYPE: &str = "PSKEL";

/// How rest matrices are derived from bone poses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindPoseMode {
    /// Use the stored pose as is.
    #[default]
    Direct,
    /// Point each bone at its children and snap it to the nearest
    /// axis-aligned orientation.
    AxisSnapped,
}

/// One bone, in depth-first order within [`Skeleton::bones`].
#[derive(Clone, Debug, PartialEq)]
pub struct Bone {
    /// Host name (at most 63 characters).
    pub name: String,
    /// Engine bone index referenced by vertex weights and animations.
    pub index: u32,
    /// Position of the parent in [`Skeleton::bones`].
    pub parent: Option<usize>,
    /// Pose as stored in the document.
    pub pose: ScaledTransform,
    /// Armature-space rest matrix in host axes.
    pub matrix: Mat4,
}

impl Bone {
    /// Armature-space head position.
    pub fn head(&self) -> Vec3 {
        self.matrix.w_axis.truncate()
    }

    /// Unit direction the bone points in (local +Y).
    pub fn direction(&self) -> Vec3 {
        self.matrix.y_axis.truncate().normalize_or_zero()
    }
}

/// A decoded bone hierarchy.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Skeleton {
    pub bones: Vec<Bone>,
}

impl Skeleton {
    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bone(&self, name: &str) -> Option<&Bone> {
        self.bones.iter().find(|b| b.name == name)
    }

    /// Bone with engine index `index`.
    pub fn by_index(&self, index: u32) -> Option<&Bone> {
        self.bones.iter().find(|b| b.index == index)
    }

    /// Engine index to bone name.
    pub fn bone_names(&self) -> BTreeMap<u32, String> {
        self.bones.iter().map(|b| (b.index, b.name.clone())).collect()
    }

    /// Positions of the direct children of bone `pos`.
    pub fn children(&self, pos: usize) -> impl Iterator<Item = usize> + '_ {
        self.bones
            .iter()
            .enumerate()
            .filter(move |(_, b)| b.parent == Some(pos))
            .map(|(i, _)| i)
    }

    /// Bone matrix relative to its parent.
    pub fn local_matrix(&self, pos: usize) -> Mat4 {
        let bone = &self.bones[pos];
        match bone.parent {
            Some(parent) => self.bones[parent].matrix.inverse() * bone.matrix,
            None => bone.matrix,
        }
    }
}

/// Decode a `PSKEL` envelope.
pub fn decode_skeleton(asset: &Property, scale: f32, mode: BindPoseMode) -> Result<Skeleton> {
    let data = expect_asset(asset, SKELETON_ASSET_TYPE)?;
    let mut skeleton = Skeleton::default();
    if let Some(bones) = data.try_get("bones") {
        for (name, bone) in bones.items()? {
            collect_bone(&mut skeleton, &name, bone, None, scale)?;
        }
    }
    if mode == BindPoseMode::AxisSnapped {
        snap_bind_pose(&mut skeleton);
    }
    debug!(bones = skeleton.len(), ?mode, "decoded skeleton");
    Ok(skeleton)
}

fn collect_bone(
    skeleton: &mut Skeleton,
    key: &str,
    node: &Property,
    parent: Option<usize>,
    scale: f32,
) -> Result<()> {
    let name = match node.try_get("name") {
        Some(name) => name.as_str()?.to_string(),
        None => key.to_string(),
    };
    let index = node
        .get("index")
        .and_then(Property::as_u32)
        .map_err(|e| Error::invalid(format!("bone '{name}': {e}")))?;
    let pose = read_pose(node.get("pose")?)?;

    let rest = Mat4::from_rotation_translation(pose.rotation().normalize(), pose.translation() * scale);
    let pos = skeleton.bones.len();
    skeleton.bones.push(Bone {
        name: host_name(&name),
        index,
        parent,
        pose,
        matrix: Y_UP_TO_Z_UP * rest * BONE_ROLL,
    });

    if let Some(children) = node.try_get("children") {
        for (child_key, child) in children.items()? {
            collect_bone(skeleton, &child_key, child, Some(pos), scale)?;
        }
    }
    Ok(())
}

/// Re-orient every bone that has children so its +Y axis follows the
/// children's centroid, snapped to a signed axis permutation. Heads and all
/// other bones' armature-space matrices are left alone.
pub fn snap_bind_pose(skeleton: &mut Skeleton) {
    for pos in 0..skeleton.bones.len() {
        let head = skeleton.bones[pos].head();
        let offsets: Vec<Vec3> = skeleton
            .children(pos)
            .map(|c| skeleton.bones[c].head() - head)
            .collect();
        if offsets.is_empty() {
            continue;
        }
        let centroid = offsets.iter().copied().sum::<Vec3>() / offsets.len() as f32;
        if centroid.length_squared() < 1e-12 {
            continue;
        }

        let bone = &mut skeleton.bones[pos];
        let basis = Mat3::from_mat4(bone.matrix);
        let local = (basis.transpose() * centroid).normalize();
        let aligned = basis * Mat3::from_quat(Quat::from_rotation_arc(Vec3::Y, local));
        let snapped = snap_to_signed_permutation(aligned);
        bone.matrix = Mat4::from_cols(
            snapped.x_axis.extend(0.0),
            snapped.y_axis.extend(0.0),
            snapped.z_axis.extend(0.0),
            head.extend(1.0),
        );
    }
}

/// Nearest rotation whose columns are signed unit axes.
pub fn snap_to_signed_permutation(m: Mat3) -> Mat3 {
    let cols = [m.x_axis, m.y_axis, m.z_axis];
    let mut out = [Vec3::ZERO; 3];
    let mut col_used = [false; 3];
    let mut axis_used = [false; 3];

    for _ in 0..3 {
        let mut best = (0, 0, -1.0f32);
        for (c, col) in cols.iter().enumerate().filter(|(c, _)| !col_used[*c]) {
            for a in (0..3).filter(|a| !axis_used[*a]) {
                if col[a].abs() > best.2 {
                    best = (c, a, col[a].abs());
                }
            }
        }
        let (c, a, _) = best;
        let mut axis = Vec3::ZERO;
        axis[a] = cols[c][a].signum();
        out[c] = axis;
        col_used[c] = true;
        axis_used[a] = true;
    }

    let mut snapped = Mat3::from_cols(out[0], out[1], out[2]);
    if snapped.determinant() < 0.0 {
        snapped.x_axis = -snapped.x_axis;
    }
    snapped
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::udm::format::{KEY_ASSET_DATA, KEY_ASSET_TYPE};
    use crate::udm::Element;

    fn bone(index: i32, pos: Vec3, children: Option<Element>) -> Element {
        let mut e = Element::new()
            .with("index", index)
            .unwrap()
            .with("pose", ScaledTransform::new(pos, Quat::IDENTITY, Vec3::ONE))
            .unwrap();
        if let Some(children) = children {
            e.insert("children", children).unwrap();
        }
        e
    }

    /// root -> (left, right), engine Y up.
    pub(crate) fn sample_skeleton() -> Element {
        let children = Element::new()
            .with("left", bone(1, Vec3::new(-1.0, 2.0, 0.0), None))
            .unwrap()
            .with("right", bone(2, Vec3::new(1.0, 2.0, 0.0), None))
            .unwrap();
        let bones = Element::new()
            .with("root", bone(0, Vec3::ZERO, Some(children)))
            .unwrap();
        Element::new()
            .with(KEY_ASSET_TYPE, SKELETON_ASSET_TYPE)
            .unwrap()
            .with(KEY_ASSET_DATA, Element::new().with("bones", bones).unwrap())
            .unwrap()
    }

    #[test]
    fn test_decode_hierarchy() {
        let asset = Property::Element(sample_skeleton());
        let skeleton = decode_skeleton(&asset, 1.0, BindPoseMode::Direct).unwrap();
        assert_eq!(skeleton.len(), 3);
        assert_eq!(skeleton.bones[0].name, "root");
        assert_eq!(skeleton.bones[1].parent, Some(0));
        assert_eq!(skeleton.children(0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(skeleton.bone_names()[&2], "right");

        // Engine (1, 2, 0) lands at host (1, 0, 2).
        let head = skeleton.by_index(2).unwrap().head();
        assert!((head - Vec3::new(1.0, 0.0, 2.0)).length() < 1e-5);
    }

    #[test]
    fn test_scale_applies_to_heads() {
        let asset = Property::Element(sample_skeleton());
        let skeleton = decode_skeleton(&asset, 0.5, BindPoseMode::Direct).unwrap();
        let head = skeleton.bone("left").unwrap().head();
        assert!((head - Vec3::new(-0.5, 0.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_wrong_asset_type() {
        let mut root = sample_skeleton();
        root.set(KEY_ASSET_TYPE, "PMESH");
        let err = decode_skeleton(&Property::Element(root), 1.0, BindPoseMode::Direct).unwrap_err();
        assert!(matches!(err, Error::UnknownSchema(_)));
    }

    #[test]
    fn test_axis_snapped_keeps_children() {
        let asset = Property::Element(sample_skeleton());
        let direct = decode_skeleton(&asset, 1.0, BindPoseMode::Direct).unwrap();
        let snapped = decode_skeleton(&asset, 1.0, BindPoseMode::AxisSnapped).unwrap();

        // Children's centroid is straight up in host space.
        let root = &snapped.bones[0];
        assert!((root.direction() - Vec3::Z).length() < 1e-5);
        assert!((Mat3::from_mat4(root.matrix).determinant() - 1.0).abs() < 1e-5);
        assert_eq!(root.head(), direct.bones[0].head());
        for i in 1..3 {
            assert_eq!(snapped.bones[i].matrix, direct.bones[i].matrix);
        }
    }

    #[test]
    fn test_snap_is_signed_permutation() {
        let m = Mat3::from_quat(Quat::from_rotation_z(0.3) * Quat::from_rotation_x(1.4));
        let s = snap_to_signed_permutation(m);
        for col in [s.x_axis, s.y_axis, s.z_axis] {
            assert_eq!(col.abs().max_element(), 1.0);
            assert_eq!(col.abs().element_sum(), 1.0);
        }
        assert_eq!(s.determinant(), 1.0);
    }
}
