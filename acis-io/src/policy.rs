//! 按 (实体类型, 格式版本, 编码) 给出字段布局，以及导出版本的接受/拒绝判定。

use acis_core::entity::{EntityKind, FieldValue, Fields};
use acis_core::value::Encoding;
use serde::{Deserialize, Serialize};

use crate::ExportError;

/// 边的曲线参数与凸性字符串出现的版本。
pub const TOL_MODELING: u32 = 500;
/// 每条记录在属性指针之后携带历史标签。
pub const ENTITY_TAGS: u32 = 700;
/// 拓扑与几何实体携带 pattern 指针。
pub const PATTERN: u32 = 700;
/// 文本字符串使用 `@` 计数前缀。
pub const AT_STRINGS: u32 = 700;
/// ASM 流：开头为 `asm-header` 记录，结束标记为 `End-of-ASM-data`。
pub const ASM_HEADER: u32 = 21800;

pub const MIN_LOAD_VERSION: u32 = 400;
pub const MAX_VERSION: u32 = 22300;
pub const MIN_EXPORT_VERSION: u32 = 700;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Ptr,
    Int,
    Double,
    /// 文本中以上下文单词表示的布尔值。
    Bool {
        false_word: &'static str,
        true_word: &'static str,
    },
    Str,
    Bound,
    Location,
    Direction,
    /// 12 个矩阵值、缩放与三个标志单词。
    Transform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Always,
    Since(u32),
    /// 只存在于二进制编码。
    SabOnly,
    /// 仅当同一记录中先前的布尔字段为真时出现。
    WhenSet(&'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub presence: Presence,
}

impl FieldSpec {
    const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            presence: Presence::Always,
        }
    }

    const fn since(mut self, version: u32) -> Self {
        self.presence = Presence::Since(version);
        self
    }

    const fn sab_only(mut self) -> Self {
        self.presence = Presence::SabOnly;
        self
    }

    const fn when_set(mut self, flag: &'static str) -> Self {
        self.presence = Presence::WhenSet(flag);
        self
    }

    /// 不依赖记录内容的存在性判断。
    pub fn exists_at(&self, version: u32, encoding: Encoding) -> bool {
        match self.presence {
            Presence::Always | Presence::WhenSet(_) => true,
            Presence::Since(since) => version >= since,
            Presence::SabOnly => encoding == Encoding::Sab,
        }
    }

    /// 结合已读取/待写出的字段判断该字段是否出现在记录中。
    pub fn present_in(&self, version: u32, encoding: Encoding, fields: &Fields) -> bool {
        match self.presence {
            Presence::WhenSet(flag) => fields.flag(flag),
            _ => self.exists_at(version, encoding),
        }
    }

    /// 目标版本缺少该字段时写出的缺省值。
    pub fn default_value(&self) -> FieldValue {
        use acis_core::entity::Transform;
        use acis_core::geometry::{Bound, Point3, Vector3};
        use acis_core::graph::EntityRef;

        match self.kind {
            FieldKind::Ptr => FieldValue::Ptr(EntityRef::NONE),
            FieldKind::Int => FieldValue::Int(0),
            FieldKind::Double => FieldValue::Double(0.0),
            FieldKind::Bool { .. } => FieldValue::Bool(false),
            FieldKind::Str => FieldValue::Str("unknown".to_string()),
            FieldKind::Bound => FieldValue::Bound(Bound::Infinite),
            FieldKind::Location => FieldValue::Location(Point3::ORIGIN),
            FieldKind::Direction => FieldValue::Direction(Vector3::new(0.0, 0.0, 0.0)),
            FieldKind::Transform => FieldValue::Transform(Transform::identity()),
        }
    }
}

const SENSE: FieldKind = FieldKind::Bool {
    false_word: "forward",
    true_word: "reversed",
};

const BODY: &[FieldSpec] = &[
    FieldSpec::new("lump", FieldKind::Ptr),
    FieldSpec::new("wire", FieldKind::Ptr),
    FieldSpec::new("transform", FieldKind::Ptr),
];

const LUMP: &[FieldSpec] = &[
    FieldSpec::new("next_lump", FieldKind::Ptr),
    FieldSpec::new("shell", FieldKind::Ptr),
    FieldSpec::new("body", FieldKind::Ptr),
];

const SHELL: &[FieldSpec] = &[
    FieldSpec::new("next_shell", FieldKind::Ptr),
    FieldSpec::new("subshell", FieldKind::Ptr),
    FieldSpec::new("face", FieldKind::Ptr),
    FieldSpec::new("wire", FieldKind::Ptr),
    FieldSpec::new("lump", FieldKind::Ptr),
];

const FACE: &[FieldSpec] = &[
    FieldSpec::new("next_face", FieldKind::Ptr),
    FieldSpec::new("loop", FieldKind::Ptr),
    FieldSpec::new("shell", FieldKind::Ptr),
    FieldSpec::new("subshell", FieldKind::Ptr),
    FieldSpec::new("surface", FieldKind::Ptr),
    FieldSpec::new("sense", SENSE),
    FieldSpec::new(
        "double_sided",
        FieldKind::Bool {
            false_word: "single",
            true_word: "double",
        },
    ),
    FieldSpec::new(
        "containment",
        FieldKind::Bool {
            false_word: "out",
            true_word: "in",
        },
    )
    .when_set("double_sided"),
];

const LOOP: &[FieldSpec] = &[
    FieldSpec::new("next_loop", FieldKind::Ptr),
    FieldSpec::new("coedge", FieldKind::Ptr),
    FieldSpec::new("face", FieldKind::Ptr),
];

const COEDGE: &[FieldSpec] = &[
    FieldSpec::new("next_coedge", FieldKind::Ptr),
    FieldSpec::new("prev_coedge", FieldKind::Ptr),
    FieldSpec::new("partner_coedge", FieldKind::Ptr),
    FieldSpec::new("edge", FieldKind::Ptr),
    FieldSpec::new("sense", SENSE),
    FieldSpec::new("loop", FieldKind::Ptr),
    FieldSpec::new("pcurve", FieldKind::Ptr),
];

const EDGE: &[FieldSpec] = &[
    FieldSpec::new("start_vertex", FieldKind::Ptr),
    FieldSpec::new("start_param", FieldKind::Double).since(TOL_MODELING),
    FieldSpec::new("end_vertex", FieldKind::Ptr),
    FieldSpec::new("end_param", FieldKind::Double).since(TOL_MODELING),
    FieldSpec::new("coedge", FieldKind::Ptr),
    FieldSpec::new("curve", FieldKind::Ptr),
    FieldSpec::new("sense", SENSE),
    FieldSpec::new("convexity", FieldKind::Str).since(TOL_MODELING),
];

const VERTEX: &[FieldSpec] = &[
    FieldSpec::new("edge", FieldKind::Ptr),
    FieldSpec::new("ref_count", FieldKind::Int).sab_only(),
    FieldSpec::new("point", FieldKind::Ptr),
];

const POINT: &[FieldSpec] = &[FieldSpec::new("location", FieldKind::Location)];

const TRANSFORM: &[FieldSpec] = &[FieldSpec::new("transform", FieldKind::Transform)];

const PLANE_SURFACE: &[FieldSpec] = &[
    FieldSpec::new("origin", FieldKind::Location),
    FieldSpec::new("normal", FieldKind::Direction),
    FieldSpec::new("u_dir", FieldKind::Direction),
    FieldSpec::new(
        "reverse_v",
        FieldKind::Bool {
            false_word: "forward_v",
            true_word: "reversed_v",
        },
    ),
    FieldSpec::new("u_start", FieldKind::Bound),
    FieldSpec::new("u_end", FieldKind::Bound),
    FieldSpec::new("v_start", FieldKind::Bound),
    FieldSpec::new("v_end", FieldKind::Bound),
];

const STRAIGHT_CURVE: &[FieldSpec] = &[
    FieldSpec::new("origin", FieldKind::Location),
    FieldSpec::new("direction", FieldKind::Direction),
    FieldSpec::new("start", FieldKind::Bound),
    FieldSpec::new("end", FieldKind::Bound),
];

/// 某实体类型在公共前缀之后的完整字段表（含全部版本的字段）。
pub fn layout(kind: EntityKind) -> &'static [FieldSpec] {
    match kind {
        EntityKind::Body => BODY,
        EntityKind::Lump => LUMP,
        EntityKind::Shell => SHELL,
        EntityKind::Face => FACE,
        EntityKind::Loop => LOOP,
        EntityKind::Coedge => COEDGE,
        EntityKind::Edge => EDGE,
        EntityKind::Vertex => VERTEX,
        EntityKind::Point => POINT,
        EntityKind::Transform => TRANSFORM,
        EntityKind::PlaneSurface => PLANE_SURFACE,
        EntityKind::StraightCurve => STRAIGHT_CURVE,
    }
}

/// 在给定版本与编码下存在的字段，按写出顺序。
pub fn schema(
    kind: EntityKind,
    version: u32,
    encoding: Encoding,
) -> impl Iterator<Item = &'static FieldSpec> {
    layout(kind)
        .iter()
        .filter(move |spec| spec.exists_at(version, encoding))
}

#[inline]
pub fn has_history(version: u32) -> bool {
    version >= ENTITY_TAGS
}

/// 未识别类型不读取 pattern，其余字段整体保留。
#[inline]
pub fn has_pattern(kind: Option<EntityKind>, version: u32) -> bool {
    version >= PATTERN && kind.is_some_and(EntityKind::supports_pattern)
}

#[inline]
pub fn uses_at_strings(version: u32) -> bool {
    version >= AT_STRINGS
}

#[inline]
pub fn is_asm(version: u32) -> bool {
    version >= ASM_HEADER
}

/// 载入与导出可接受的版本范围。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPolicy {
    pub min_export_version: u32,
    pub max_version: u32,
}

impl Default for VersionPolicy {
    fn default() -> Self {
        Self {
            min_export_version: MIN_EXPORT_VERSION,
            max_version: MAX_VERSION,
        }
    }
}

impl VersionPolicy {
    pub fn supports_load(&self, version: u32) -> bool {
        (MIN_LOAD_VERSION..=self.max_version).contains(&version)
    }

    pub fn check_export(&self, version: u32) -> Result<(), ExportError> {
        if version < self.min_export_version {
            return Err(ExportError::VersionTooOld {
                version,
                minimum: self.min_export_version,
            });
        }
        if version > self.max_version || version < MIN_LOAD_VERSION {
            return Err(ExportError::UnknownVersion(version));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(kind: EntityKind, version: u32, encoding: Encoding) -> Vec<&'static str> {
        schema(kind, version, encoding).map(|spec| spec.name).collect()
    }

    #[test]
    fn edge_parameters_appear_with_tolerant_modeling() {
        assert_eq!(
            names(EntityKind::Edge, 400, Encoding::Sat),
            ["start_vertex", "end_vertex", "coedge", "curve", "sense"]
        );
        assert_eq!(
            names(EntityKind::Edge, 700, Encoding::Sat),
            [
                "start_vertex",
                "start_param",
                "end_vertex",
                "end_param",
                "coedge",
                "curve",
                "sense",
                "convexity"
            ]
        );
    }

    #[test]
    fn vertex_ref_count_is_binary_only() {
        assert_eq!(names(EntityKind::Vertex, 700, Encoding::Sat), ["edge", "point"]);
        assert_eq!(
            names(EntityKind::Vertex, 700, Encoding::Sab),
            ["edge", "ref_count", "point"]
        );
    }

    #[test]
    fn containment_depends_on_double_sided_flag() {
        let containment = FACE[7];
        let single = Fields::new().with_bool("double_sided", false);
        let double = Fields::new().with_bool("double_sided", true);
        assert!(!containment.present_in(700, Encoding::Sat, &single));
        assert!(containment.present_in(700, Encoding::Sat, &double));
    }

    #[test]
    fn common_prefix_follows_version() {
        assert!(!has_history(400));
        assert!(has_history(700));
        assert!(has_pattern(Some(EntityKind::Face), 700));
        assert!(!has_pattern(Some(EntityKind::Transform), 700));
        assert!(!has_pattern(None, 700));
        assert!(!has_pattern(Some(EntityKind::Face), 400));
    }

    #[test]
    fn export_below_minimum_is_rejected() {
        let policy = VersionPolicy::default();
        assert_eq!(
            policy.check_export(400),
            Err(ExportError::VersionTooOld {
                version: 400,
                minimum: 700
            })
        );
        assert!(policy.check_export(700).is_ok());
        assert!(policy.check_export(21800).is_ok());
        assert_eq!(
            policy.check_export(30000),
            Err(ExportError::UnknownVersion(30000))
        );
        assert!(policy.supports_load(400));
        assert!(!policy.supports_load(399));
    }
}
