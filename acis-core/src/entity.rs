use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Bound, Matrix44, Point3, Vector3};
use crate::graph::EntityRef;
use crate::registry::DELETED_ENTITY_NAME;
use crate::value::{Origin, Value};

/// 空实体哨兵的类型名。
pub const NONE_ENTITY_NAME: &str = "none-entity";

/// 已建模的实体种类。未建模的类型以 [`Opaque`] 保存。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Body,
    Lump,
    Shell,
    Face,
    Loop,
    Coedge,
    Edge,
    Vertex,
    Point,
    Transform,
    PlaneSurface,
    StraightCurve,
}

impl EntityKind {
    pub const ALL: [EntityKind; 12] = [
        EntityKind::Body,
        EntityKind::Lump,
        EntityKind::Shell,
        EntityKind::Face,
        EntityKind::Loop,
        EntityKind::Coedge,
        EntityKind::Edge,
        EntityKind::Vertex,
        EntityKind::Point,
        EntityKind::Transform,
        EntityKind::PlaneSurface,
        EntityKind::StraightCurve,
    ];

    /// 记录中使用的类型名。
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Body => "body",
            EntityKind::Lump => "lump",
            EntityKind::Shell => "shell",
            EntityKind::Face => "face",
            EntityKind::Loop => "loop",
            EntityKind::Coedge => "coedge",
            EntityKind::Edge => "edge",
            EntityKind::Vertex => "vertex",
            EntityKind::Point => "point",
            EntityKind::Transform => "transform",
            EntityKind::PlaneSurface => "plane-surface",
            EntityKind::StraightCurve => "straight-curve",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// 变换之外的拓扑与几何实体都带有 pattern 指针（版本 700 起写出）。
    #[inline]
    pub fn supports_pattern(self) -> bool {
        !matches!(self, EntityKind::Transform)
    }

    /// 由字段表构造对应的实体变体。
    pub fn construct(self, fields: &Fields) -> Result<EntityData, FieldError> {
        Ok(match self {
            EntityKind::Body => EntityData::Body(Body::from_fields(fields)?),
            EntityKind::Lump => EntityData::Lump(Lump::from_fields(fields)?),
            EntityKind::Shell => EntityData::Shell(Shell::from_fields(fields)?),
            EntityKind::Face => EntityData::Face(Face::from_fields(fields)?),
            EntityKind::Loop => EntityData::Loop(Loop::from_fields(fields)?),
            EntityKind::Coedge => EntityData::Coedge(Coedge::from_fields(fields)?),
            EntityKind::Edge => EntityData::Edge(Edge::from_fields(fields)?),
            EntityKind::Vertex => EntityData::Vertex(Vertex::from_fields(fields)?),
            EntityKind::Point => EntityData::Point(Point::from_fields(fields)?),
            EntityKind::Transform => EntityData::Transform(fields.transform("transform")?),
            EntityKind::PlaneSurface => {
                EntityData::PlaneSurface(PlaneSurface::from_fields(fields)?)
            }
            EntityKind::StraightCurve => {
                EntityData::StraightCurve(StraightCurve::from_fields(fields)?)
            }
        })
    }
}

/// 按字段名访问时的类型化取值。
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Ptr(EntityRef),
    Int(i64),
    Double(f64),
    Bool(bool),
    Str(String),
    Bound(Bound),
    Location(Point3),
    Direction(Vector3),
    Transform(Transform),
}

impl FieldValue {
    fn type_label(&self) -> &'static str {
        match self {
            FieldValue::Ptr(_) => "pointer",
            FieldValue::Int(_) => "int",
            FieldValue::Double(_) => "double",
            FieldValue::Bool(_) => "bool",
            FieldValue::Str(_) => "string",
            FieldValue::Bound(_) => "bound",
            FieldValue::Location(_) => "location",
            FieldValue::Direction(_) => "direction",
            FieldValue::Transform(_) => "transform",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("缺少字段 `{0}`")]
    Missing(&'static str),
    #[error("字段 `{field}` 类型不符：期望 {expected}，实际 {found}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

/// 有序字段表。顺序即写出顺序，与版本布局表一致。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields {
    entries: Vec<(&'static str, FieldValue)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入字段；同名字段已存在时覆盖原值并保持位置。
    pub fn insert(&mut self, name: &'static str, value: FieldValue) {
        match self.entries.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn with(mut self, name: &'static str, value: FieldValue) -> Self {
        self.insert(name, value);
        self
    }

    #[inline]
    pub fn with_ptr(self, name: &'static str, value: EntityRef) -> Self {
        self.with(name, FieldValue::Ptr(value))
    }

    #[inline]
    pub fn with_bool(self, name: &'static str, value: bool) -> Self {
        self.with(name, FieldValue::Bool(value))
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries
            .iter()
            .find_map(|(key, value)| (*key == name).then_some(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = &(&'static str, FieldValue)> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 布尔字段存在且为真。
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.get(name), Some(FieldValue::Bool(true)))
    }

    /// 按字段顺序列出全部指针。
    pub fn pointers(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.entries.iter().filter_map(|(_, value)| match value {
            FieldValue::Ptr(ptr) => Some(*ptr),
            _ => None,
        })
    }

    fn required(&self, name: &'static str) -> Result<&FieldValue, FieldError> {
        self.get(name).ok_or(FieldError::Missing(name))
    }

    fn mismatch(name: &'static str, expected: &'static str, found: &FieldValue) -> FieldError {
        FieldError::TypeMismatch {
            field: name,
            expected,
            found: found.type_label(),
        }
    }

    pub fn ptr(&self, name: &'static str) -> Result<EntityRef, FieldError> {
        match self.required(name)? {
            FieldValue::Ptr(ptr) => Ok(*ptr),
            other => Err(Self::mismatch(name, "pointer", other)),
        }
    }

    pub fn bool(&self, name: &'static str) -> Result<bool, FieldError> {
        match self.required(name)? {
            FieldValue::Bool(value) => Ok(*value),
            other => Err(Self::mismatch(name, "bool", other)),
        }
    }

    pub fn int(&self, name: &'static str) -> Result<i64, FieldError> {
        match self.required(name)? {
            FieldValue::Int(value) => Ok(*value),
            other => Err(Self::mismatch(name, "int", other)),
        }
    }

    /// 可选的浮点字段：缺失时返回 `None`。
    pub fn double_opt(&self, name: &'static str) -> Result<Option<f64>, FieldError> {
        match self.get(name) {
            None => Ok(None),
            Some(FieldValue::Double(value)) => Ok(Some(*value)),
            Some(other) => Err(Self::mismatch(name, "double", other)),
        }
    }

    pub fn str_opt(&self, name: &'static str) -> Result<Option<String>, FieldError> {
        match self.get(name) {
            None => Ok(None),
            Some(FieldValue::Str(value)) => Ok(Some(value.clone())),
            Some(other) => Err(Self::mismatch(name, "string", other)),
        }
    }

    pub fn bound(&self, name: &'static str) -> Result<Bound, FieldError> {
        match self.required(name)? {
            FieldValue::Bound(value) => Ok(*value),
            other => Err(Self::mismatch(name, "bound", other)),
        }
    }

    pub fn location(&self, name: &'static str) -> Result<Point3, FieldError> {
        match self.required(name)? {
            FieldValue::Location(value) => Ok(*value),
            other => Err(Self::mismatch(name, "location", other)),
        }
    }

    pub fn direction(&self, name: &'static str) -> Result<Vector3, FieldError> {
        match self.required(name)? {
            FieldValue::Direction(value) => Ok(*value),
            other => Err(Self::mismatch(name, "direction", other)),
        }
    }

    pub fn transform(&self, name: &'static str) -> Result<Transform, FieldError> {
        match self.required(name)? {
            FieldValue::Transform(value) => Ok(*value),
            other => Err(Self::mismatch(name, "transform", other)),
        }
    }
}

/// 实体：公共头部（属性指针、历史标签、pattern）加类型化数据。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub attributes: EntityRef,
    /// 版本 700 起每条记录携带的历史标签，缺省为 -1。
    pub history: i64,
    pub pattern: EntityRef,
    pub data: EntityData,
    /// 已知布局之后多出的字段，原样保留。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<ExtraFields>,
}

impl Entity {
    pub fn new(data: EntityData) -> Self {
        Self {
            attributes: EntityRef::NONE,
            history: -1,
            pattern: EntityRef::NONE,
            data,
            extra: None,
        }
    }

    /// 已删除记录的占位节点，占据原序号但不可被引用。
    pub fn deleted() -> Self {
        Self::new(EntityData::Deleted)
    }

    #[inline]
    pub fn kind(&self) -> Option<EntityKind> {
        self.data.kind()
    }

    #[inline]
    pub fn type_name(&self) -> &str {
        self.data.type_name()
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        matches!(self.data, EntityData::Deleted)
    }

    /// 按写出顺序列出数据部分（不含属性与 pattern）的指针。
    pub fn data_refs(&self) -> Vec<EntityRef> {
        let mut refs: Vec<EntityRef> = match &self.data {
            EntityData::Opaque(opaque) => opaque
                .values
                .iter()
                .filter_map(|value| value.as_ptr().copied())
                .collect(),
            EntityData::Deleted => Vec::new(),
            data => data
                .to_fields()
                .map(|fields| fields.pointers().collect())
                .unwrap_or_default(),
        };
        if let Some(extra) = &self.extra {
            refs.extend(extra.values.iter().filter_map(|value| value.as_ptr().copied()));
        }
        refs
    }

    /// 全部指针：属性、pattern，然后是数据部分。
    pub fn refs(&self) -> Vec<EntityRef> {
        let mut refs = vec![self.attributes, self.pattern];
        refs.extend(self.data_refs());
        refs
    }

    /// 逐一改写实体中的每个指针字段。
    pub fn for_each_ref_mut(&mut self, mut f: impl FnMut(&mut EntityRef)) {
        f(&mut self.attributes);
        f(&mut self.pattern);
        self.data.for_each_ref_mut(&mut f);
        if let Some(extra) = &mut self.extra {
            for value in &mut extra.values {
                if let Some(ptr) = value.as_ptr_mut() {
                    f(ptr);
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EntityData {
    Body(Body),
    Lump(Lump),
    Shell(Shell),
    Face(Face),
    Loop(Loop),
    Coedge(Coedge),
    Edge(Edge),
    Vertex(Vertex),
    Point(Point),
    Transform(Transform),
    PlaneSurface(PlaneSurface),
    StraightCurve(StraightCurve),
    /// 未识别类型，字段原样保留。
    Opaque(Opaque),
    /// 已删除/历史记录的占位。
    Deleted,
}

impl EntityData {
    pub fn kind(&self) -> Option<EntityKind> {
        Some(match self {
            EntityData::Body(_) => EntityKind::Body,
            EntityData::Lump(_) => EntityKind::Lump,
            EntityData::Shell(_) => EntityKind::Shell,
            EntityData::Face(_) => EntityKind::Face,
            EntityData::Loop(_) => EntityKind::Loop,
            EntityData::Coedge(_) => EntityKind::Coedge,
            EntityData::Edge(_) => EntityKind::Edge,
            EntityData::Vertex(_) => EntityKind::Vertex,
            EntityData::Point(_) => EntityKind::Point,
            EntityData::Transform(_) => EntityKind::Transform,
            EntityData::PlaneSurface(_) => EntityKind::PlaneSurface,
            EntityData::StraightCurve(_) => EntityKind::StraightCurve,
            EntityData::Opaque(_) | EntityData::Deleted => return None,
        })
    }

    pub fn type_name(&self) -> &str {
        match self {
            EntityData::Opaque(opaque) => &opaque.type_name,
            EntityData::Deleted => DELETED_ENTITY_NAME,
            other => other.kind().map(EntityKind::name).unwrap_or(NONE_ENTITY_NAME),
        }
    }

    /// 已建模实体的字段表，顺序与布局表一致；透明节点与占位节点返回 `None`。
    pub fn to_fields(&self) -> Option<Fields> {
        Some(match self {
            EntityData::Body(body) => body.to_fields(),
            EntityData::Lump(lump) => lump.to_fields(),
            EntityData::Shell(shell) => shell.to_fields(),
            EntityData::Face(face) => face.to_fields(),
            EntityData::Loop(lp) => lp.to_fields(),
            EntityData::Coedge(coedge) => coedge.to_fields(),
            EntityData::Edge(edge) => edge.to_fields(),
            EntityData::Vertex(vertex) => vertex.to_fields(),
            EntityData::Point(point) => point.to_fields(),
            EntityData::Transform(transform) => {
                Fields::new().with("transform", FieldValue::Transform(*transform))
            }
            EntityData::PlaneSurface(plane) => plane.to_fields(),
            EntityData::StraightCurve(curve) => curve.to_fields(),
            EntityData::Opaque(_) | EntityData::Deleted => return None,
        })
    }

    fn for_each_ref_mut(&mut self, f: &mut impl FnMut(&mut EntityRef)) {
        match self {
            EntityData::Body(body) => {
                f(&mut body.lump);
                f(&mut body.wire);
                f(&mut body.transform);
            }
            EntityData::Lump(lump) => {
                f(&mut lump.next_lump);
                f(&mut lump.shell);
                f(&mut lump.body);
            }
            EntityData::Shell(shell) => {
                f(&mut shell.next_shell);
                f(&mut shell.subshell);
                f(&mut shell.face);
                f(&mut shell.wire);
                f(&mut shell.lump);
            }
            EntityData::Face(face) => {
                f(&mut face.next_face);
                f(&mut face.loop_);
                f(&mut face.shell);
                f(&mut face.subshell);
                f(&mut face.surface);
            }
            EntityData::Loop(lp) => {
                f(&mut lp.next_loop);
                f(&mut lp.coedge);
                f(&mut lp.face);
            }
            EntityData::Coedge(coedge) => {
                f(&mut coedge.next_coedge);
                f(&mut coedge.prev_coedge);
                f(&mut coedge.partner_coedge);
                f(&mut coedge.edge);
                f(&mut coedge.loop_);
                f(&mut coedge.pcurve);
            }
            EntityData::Edge(edge) => {
                f(&mut edge.start_vertex);
                f(&mut edge.end_vertex);
                f(&mut edge.coedge);
                f(&mut edge.curve);
            }
            EntityData::Vertex(vertex) => {
                f(&mut vertex.edge);
                f(&mut vertex.point);
            }
            EntityData::Opaque(opaque) => {
                for value in &mut opaque.values {
                    if let Some(ptr) = value.as_ptr_mut() {
                        f(ptr);
                    }
                }
            }
            EntityData::Point(_)
            | EntityData::Transform(_)
            | EntityData::PlaneSurface(_)
            | EntityData::StraightCurve(_)
            | EntityData::Deleted => {}
        }
    }
}

macro_rules! data_accessors {
    ($($method:ident => $variant:ident($ty:ty)),* $(,)?) => {
        impl EntityData {
            $(
                #[inline]
                pub fn $method(&self) -> Option<&$ty> {
                    match self {
                        EntityData::$variant(value) => Some(value),
                        _ => None,
                    }
                }
            )*
        }
    };
}

data_accessors! {
    as_body => Body(Body),
    as_lump => Lump(Lump),
    as_shell => Shell(Shell),
    as_face => Face(Face),
    as_loop => Loop(Loop),
    as_coedge => Coedge(Coedge),
    as_edge => Edge(Edge),
    as_vertex => Vertex(Vertex),
    as_point => Point(Point),
    as_transform => Transform(Transform),
    as_plane_surface => PlaneSurface(PlaneSurface),
    as_straight_curve => StraightCurve(StraightCurve),
    as_opaque => Opaque(Opaque),
}

/// 未识别类型的实体：记录公共头之后的全部字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opaque {
    pub type_name: String,
    pub values: Vec<Value>,
    pub origin: Origin,
}

/// 已知布局之后的尾随字段。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraFields {
    pub values: Vec<Value>,
    pub origin: Origin,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Body {
    pub lump: EntityRef,
    pub wire: EntityRef,
    pub transform: EntityRef,
}

impl Body {
    fn from_fields(fields: &Fields) -> Result<Self, FieldError> {
        Ok(Self {
            lump: fields.ptr("lump")?,
            wire: fields.ptr("wire")?,
            transform: fields.ptr("transform")?,
        })
    }

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with_ptr("lump", self.lump)
            .with_ptr("wire", self.wire)
            .with_ptr("transform", self.transform)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Lump {
    pub next_lump: EntityRef,
    pub shell: EntityRef,
    pub body: EntityRef,
}

impl Lump {
    fn from_fields(fields: &Fields) -> Result<Self, FieldError> {
        Ok(Self {
            next_lump: fields.ptr("next_lump")?,
            shell: fields.ptr("shell")?,
            body: fields.ptr("body")?,
        })
    }

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with_ptr("next_lump", self.next_lump)
            .with_ptr("shell", self.shell)
            .with_ptr("body", self.body)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Shell {
    pub next_shell: EntityRef,
    pub subshell: EntityRef,
    pub face: EntityRef,
    pub wire: EntityRef,
    pub lump: EntityRef,
}

impl Shell {
    fn from_fields(fields: &Fields) -> Result<Self, FieldError> {
        Ok(Self {
            next_shell: fields.ptr("next_shell")?,
            subshell: fields.ptr("subshell")?,
            face: fields.ptr("face")?,
            wire: fields.ptr("wire")?,
            lump: fields.ptr("lump")?,
        })
    }

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with_ptr("next_shell", self.next_shell)
            .with_ptr("subshell", self.subshell)
            .with_ptr("face", self.face)
            .with_ptr("wire", self.wire)
            .with_ptr("lump", self.lump)
    }
}

/// 面。`sense` 为真表示法向与曲面相反（reversed）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Face {
    pub next_face: EntityRef,
    pub loop_: EntityRef,
    pub shell: EntityRef,
    pub subshell: EntityRef,
    pub surface: EntityRef,
    pub sense: bool,
    pub double_sided: bool,
    /// 仅双面时写出：真为 `in`，假为 `out`。
    pub containment: bool,
}

impl Face {
    fn from_fields(fields: &Fields) -> Result<Self, FieldError> {
        let double_sided = fields.bool("double_sided")?;
        Ok(Self {
            next_face: fields.ptr("next_face")?,
            loop_: fields.ptr("loop")?,
            shell: fields.ptr("shell")?,
            subshell: fields.ptr("subshell")?,
            surface: fields.ptr("surface")?,
            sense: fields.bool("sense")?,
            double_sided,
            containment: double_sided && fields.bool("containment")?,
        })
    }

    fn to_fields(&self) -> Fields {
        let fields = Fields::new()
            .with_ptr("next_face", self.next_face)
            .with_ptr("loop", self.loop_)
            .with_ptr("shell", self.shell)
            .with_ptr("subshell", self.subshell)
            .with_ptr("surface", self.surface)
            .with_bool("sense", self.sense)
            .with_bool("double_sided", self.double_sided);
        if self.double_sided {
            fields.with_bool("containment", self.containment)
        } else {
            fields
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Loop {
    pub next_loop: EntityRef,
    pub coedge: EntityRef,
    pub face: EntityRef,
}

impl Loop {
    fn from_fields(fields: &Fields) -> Result<Self, FieldError> {
        Ok(Self {
            next_loop: fields.ptr("next_loop")?,
            coedge: fields.ptr("coedge")?,
            face: fields.ptr("face")?,
        })
    }

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with_ptr("next_loop", self.next_loop)
            .with_ptr("coedge", self.coedge)
            .with_ptr("face", self.face)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Coedge {
    pub next_coedge: EntityRef,
    pub prev_coedge: EntityRef,
    pub partner_coedge: EntityRef,
    pub edge: EntityRef,
    pub sense: bool,
    pub loop_: EntityRef,
    pub pcurve: EntityRef,
}

impl Coedge {
    fn from_fields(fields: &Fields) -> Result<Self, FieldError> {
        Ok(Self {
            next_coedge: fields.ptr("next_coedge")?,
            prev_coedge: fields.ptr("prev_coedge")?,
            partner_coedge: fields.ptr("partner_coedge")?,
            edge: fields.ptr("edge")?,
            sense: fields.bool("sense")?,
            loop_: fields.ptr("loop")?,
            pcurve: fields.ptr("pcurve")?,
        })
    }

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with_ptr("next_coedge", self.next_coedge)
            .with_ptr("prev_coedge", self.prev_coedge)
            .with_ptr("partner_coedge", self.partner_coedge)
            .with_ptr("edge", self.edge)
            .with_bool("sense", self.sense)
            .with_ptr("loop", self.loop_)
            .with_ptr("pcurve", self.pcurve)
    }
}

/// 边。曲线参数与凸性自版本 500 起存在，旧版本载入时为 `None`。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub start_vertex: EntityRef,
    pub start_param: Option<f64>,
    pub end_vertex: EntityRef,
    pub end_param: Option<f64>,
    pub coedge: EntityRef,
    pub curve: EntityRef,
    pub sense: bool,
    pub convexity: Option<String>,
}

impl Edge {
    fn from_fields(fields: &Fields) -> Result<Self, FieldError> {
        Ok(Self {
            start_vertex: fields.ptr("start_vertex")?,
            start_param: fields.double_opt("start_param")?,
            end_vertex: fields.ptr("end_vertex")?,
            end_param: fields.double_opt("end_param")?,
            coedge: fields.ptr("coedge")?,
            curve: fields.ptr("curve")?,
            sense: fields.bool("sense")?,
            convexity: fields.str_opt("convexity")?,
        })
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new().with_ptr("start_vertex", self.start_vertex);
        if let Some(param) = self.start_param {
            fields.insert("start_param", FieldValue::Double(param));
        }
        fields.insert("end_vertex", FieldValue::Ptr(self.end_vertex));
        if let Some(param) = self.end_param {
            fields.insert("end_param", FieldValue::Double(param));
        }
        fields = fields
            .with_ptr("coedge", self.coedge)
            .with_ptr("curve", self.curve)
            .with_bool("sense", self.sense);
        if let Some(convexity) = &self.convexity {
            fields.insert("convexity", FieldValue::Str(convexity.clone()));
        }
        fields
    }
}

/// 顶点。`ref_count` 只存在于 SAB 中。
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub edge: EntityRef,
    pub ref_count: i64,
    pub point: EntityRef,
}

impl Vertex {
    fn from_fields(fields: &Fields) -> Result<Self, FieldError> {
        Ok(Self {
            edge: fields.ptr("edge")?,
            ref_count: match fields.get("ref_count") {
                Some(_) => fields.int("ref_count")?,
                None => 0,
            },
            point: fields.ptr("point")?,
        })
    }

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with_ptr("edge", self.edge)
            .with("ref_count", FieldValue::Int(self.ref_count))
            .with_ptr("point", self.point)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub location: Point3,
}

impl Point {
    fn from_fields(fields: &Fields) -> Result<Self, FieldError> {
        Ok(Self {
            location: fields.location("location")?,
        })
    }

    fn to_fields(&self) -> Fields {
        Fields::new().with("location", FieldValue::Location(self.location))
    }
}

/// 变换：矩阵加显式存储的缩放与三个标志。
///
/// 标志按原样往返，即使能从矩阵推导出来。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub matrix: Matrix44,
    pub scale: f64,
    pub rotate: bool,
    pub reflect: bool,
    pub shear: bool,
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            matrix: Matrix44::IDENTITY,
            scale: 1.0,
            rotate: false,
            reflect: false,
            shear: false,
        }
    }

    /// 由矩阵推导缩放与标志。假定三轴等比缩放。
    pub fn from_matrix(matrix: Matrix44) -> Self {
        let x_axis = matrix.transform_direction(Vector3::X);
        let y_axis = matrix.transform_direction(Vector3::Y);
        let z_axis = matrix.transform_direction(Vector3::Z);
        let scale = (x_axis.length() * 1e6).round() / 1e6;

        let rotate = match (x_axis.normalize(), y_axis.normalize()) {
            (Some(x), Some(y)) => !x.is_close(Vector3::X) || !y.is_close(Vector3::Y),
            _ => false,
        };
        let shear = match (x_axis.normalize(), y_axis.normalize(), z_axis.normalize()) {
            (Some(x), Some(y), Some(z)) => {
                x.dot(y).abs() > 1e-9 || y.dot(z).abs() > 1e-9 || z.dot(x).abs() > 1e-9
            }
            _ => false,
        };

        Self {
            matrix,
            scale,
            rotate,
            reflect: matrix.determinant() < 0.0,
            shear,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.matrix.is_close(&Matrix44::IDENTITY)
            && (self.scale - 1.0).abs() < 1e-12
            && !self.rotate
            && !self.reflect
            && !self.shear
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// 平面曲面。`reverse_v` 为真对应 `reversed_v`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlaneSurface {
    pub origin: Point3,
    pub normal: Vector3,
    pub u_dir: Vector3,
    pub reverse_v: bool,
    pub u_bounds: [Bound; 2],
    pub v_bounds: [Bound; 2],
}

impl PlaneSurface {
    fn from_fields(fields: &Fields) -> Result<Self, FieldError> {
        Ok(Self {
            origin: fields.location("origin")?,
            normal: fields.direction("normal")?,
            u_dir: fields.direction("u_dir")?,
            reverse_v: fields.bool("reverse_v")?,
            u_bounds: [fields.bound("u_start")?, fields.bound("u_end")?],
            v_bounds: [fields.bound("v_start")?, fields.bound("v_end")?],
        })
    }

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("origin", FieldValue::Location(self.origin))
            .with("normal", FieldValue::Direction(self.normal))
            .with("u_dir", FieldValue::Direction(self.u_dir))
            .with_bool("reverse_v", self.reverse_v)
            .with("u_start", FieldValue::Bound(self.u_bounds[0]))
            .with("u_end", FieldValue::Bound(self.u_bounds[1]))
            .with("v_start", FieldValue::Bound(self.v_bounds[0]))
            .with("v_end", FieldValue::Bound(self.v_bounds[1]))
    }
}

/// 直线曲线：原点、方向与参数区间。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StraightCurve {
    pub origin: Point3,
    pub direction: Vector3,
    pub bounds: [Bound; 2],
}

impl StraightCurve {
    fn from_fields(fields: &Fields) -> Result<Self, FieldError> {
        Ok(Self {
            origin: fields.location("origin")?,
            direction: fields.direction("direction")?,
            bounds: [fields.bound("start")?, fields.bound("end")?],
        })
    }

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("origin", FieldValue::Location(self.origin))
            .with("direction", FieldValue::Direction(self.direction))
            .with("start", FieldValue::Bound(self.bounds[0]))
            .with("end", FieldValue::Bound(self.bounds[1]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Matrix44;

    #[test]
    fn kind_names_round_trip() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(EntityKind::from_name("cone-surface"), None);
        assert!(!EntityKind::Transform.supports_pattern());
        assert!(EntityKind::Face.supports_pattern());
    }

    #[test]
    fn face_containment_only_written_when_double_sided() {
        let single = Face {
            containment: true,
            ..Face::default()
        };
        assert!(single.to_fields().get("containment").is_none());

        let double = Face {
            double_sided: true,
            containment: true,
            ..Face::default()
        };
        let fields = double.to_fields();
        assert!(fields.flag("containment"));
        let rebuilt = Face::from_fields(&fields).expect("重建面失败");
        assert_eq!(rebuilt, double);
    }

    #[test]
    fn edge_params_are_optional() {
        let edge = Edge {
            start_vertex: EntityRef::new(1),
            end_vertex: EntityRef::new(2),
            ..Edge::default()
        };
        let fields = edge.to_fields();
        assert!(fields.get("start_param").is_none());
        assert!(fields.get("convexity").is_none());
        let rebuilt = Edge::from_fields(&fields).expect("重建边失败");
        assert_eq!(rebuilt, edge);
        let pointers: Vec<EntityRef> = fields.pointers().collect();
        assert_eq!(pointers.len(), 4);
        assert_eq!(pointers[0], EntityRef::new(1));
    }

    #[test]
    fn missing_field_is_reported_by_name() {
        let fields = Fields::new().with_ptr("lump", EntityRef::NONE);
        let err = Body::from_fields(&fields).unwrap_err();
        assert_eq!(err, FieldError::Missing("wire"));
    }

    #[test]
    fn transform_flags_are_derived_from_matrix() {
        let identity = Transform::from_matrix(Matrix44::IDENTITY);
        assert!(identity.is_identity());

        let rotated = Transform::from_matrix(Matrix44::from_rows([
            [0.0, 1.0, 0.0, 0.0],
            [-1.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]));
        assert!(rotated.rotate);
        assert!(!rotated.reflect);
        assert!(!rotated.shear);

        let mirrored = Transform::from_matrix(Matrix44::from_rows([
            [2.0, 0.0, 0.0, 0.0],
            [0.0, 2.0, 0.0, 0.0],
            [0.0, 0.0, -2.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]));
        assert!(mirrored.reflect);
        assert!((mirrored.scale - 2.0).abs() < 1e-12);

        let sheared = Transform::from_matrix(Matrix44::from_rows([
            [1.0, 0.0, 0.0, 0.0],
            [1.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]));
        assert!(sheared.shear);
    }

    #[test]
    fn data_refs_follow_field_order() {
        let mut entity = Entity::new(EntityData::Lump(Lump {
            next_lump: EntityRef::NONE,
            shell: EntityRef::new(5),
            body: EntityRef::new(0),
        }));
        assert_eq!(
            entity.data_refs(),
            vec![EntityRef::NONE, EntityRef::new(5), EntityRef::new(0)]
        );

        entity.for_each_ref_mut(|ptr| {
            if *ptr == EntityRef::new(5) {
                *ptr = EntityRef::new(7);
            }
        });
        assert_eq!(entity.data.as_lump().map(|l| l.shell), Some(EntityRef::new(7)));
        assert_eq!(entity.type_name(), "lump");
        assert_eq!(Entity::deleted().type_name(), DELETED_ENTITY_NAME);
    }
}
