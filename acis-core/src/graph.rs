use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{
    Body, Coedge, Edge, Entity, EntityData, EntityKind, Face, Loop, Lump, PlaneSurface, Point,
    Shell, StraightCurve, Transform, Vertex,
};

/// 图中实体的索引。`NONE` 表示空实体。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef(u32);

impl EntityRef {
    pub const NONE: EntityRef = EntityRef(u32::MAX);

    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// 由记录中的原始序号构造；`-1` 为空引用，其余负数无效。
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            -1 => Some(Self::NONE),
            0..=0xFFFF_FFFE => Some(Self(raw as u32)),
            _ => None,
        }
    }

    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    #[inline]
    pub fn index(self) -> Option<usize> {
        (!self.is_none()).then_some(self.0 as usize)
    }
}

impl Default for EntityRef {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("$-1")
        } else {
            write!(f, "${}", self.0)
        }
    }
}

/// 拓扑不变式被破坏时的错误。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("环 {loop_} 的共边链未闭合")]
    OpenLoop { loop_: EntityRef },
    #[error("共边 {coedge} 的后继 {next} 的前驱不是它自身")]
    BrokenPrevChain { coedge: EntityRef, next: EntityRef },
    #[error("共边 {coedge} 与伙伴 {partner} 不对称")]
    AsymmetricPartner { coedge: EntityRef, partner: EntityRef },
    #[error("从 {start} 开始的 {list} 链表未以空实体结束")]
    UnterminatedList { start: EntityRef, list: &'static str },
    #[error("{entity} 的字段 `{field}` 应指向 {expected}，实际为 {found}")]
    UnexpectedKind {
        entity: EntityRef,
        field: &'static str,
        expected: &'static str,
        found: String,
    },
}

/// 实体图：所有节点存放在一个数组中，关系以 [`EntityRef`] 表示。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    entities: Vec<Entity>,
}

macro_rules! typed_getters {
    ($($method:ident => $accessor:ident -> $ty:ty),* $(,)?) => {
        $(
            #[inline]
            pub fn $method(&self, id: EntityRef) -> Option<&$ty> {
                self.get(id).and_then(|entity| entity.data.$accessor())
            }
        )*
    };
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entities: Vec::with_capacity(capacity),
        }
    }

    /// 追加实体并返回其索引。
    pub fn add(&mut self, entity: Entity) -> EntityRef {
        let id = EntityRef::new(self.entities.len() as u32);
        self.entities.push(entity);
        id
    }

    /// 以默认公共头追加实体数据。
    pub fn add_data(&mut self, data: EntityData) -> EntityRef {
        self.add(Entity::new(data))
    }

    #[inline]
    pub fn get(&self, id: EntityRef) -> Option<&Entity> {
        id.index().and_then(|index| self.entities.get(index))
    }

    #[inline]
    pub fn get_mut(&mut self, id: EntityRef) -> Option<&mut Entity> {
        id.index().and_then(|index| self.entities.get_mut(index))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityRef, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(index, entity)| (EntityRef::new(index as u32), entity))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut()
    }

    /// 空引用报告为 `none-entity`。
    pub fn type_name(&self, id: EntityRef) -> &str {
        self.get(id)
            .map(Entity::type_name)
            .unwrap_or(crate::entity::NONE_ENTITY_NAME)
    }

    pub fn kind(&self, id: EntityRef) -> Option<EntityKind> {
        self.get(id).and_then(Entity::kind)
    }

    /// 按出现顺序列出全部实体体。
    pub fn bodies(&self) -> Vec<EntityRef> {
        self.iter()
            .filter(|(_, entity)| entity.kind() == Some(EntityKind::Body))
            .map(|(id, _)| id)
            .collect()
    }

    typed_getters! {
        body => as_body -> Body,
        lump => as_lump -> Lump,
        shell => as_shell -> Shell,
        face => as_face -> Face,
        loop_ => as_loop -> Loop,
        coedge => as_coedge -> Coedge,
        edge => as_edge -> Edge,
        vertex => as_vertex -> Vertex,
        point => as_point -> Point,
        transform => as_transform -> Transform,
        plane_surface => as_plane_surface -> PlaneSurface,
        straight_curve => as_straight_curve -> StraightCurve,
    }

    /// 把所有指向已删除占位节点的引用改为空引用。
    pub fn detach_deleted(&mut self) -> usize {
        let deleted: HashSet<EntityRef> = self
            .iter()
            .filter(|(_, entity)| entity.is_deleted())
            .map(|(id, _)| id)
            .collect();
        if deleted.is_empty() {
            return 0;
        }
        let mut detached = 0;
        for entity in self.iter_mut() {
            entity.for_each_ref_mut(|ptr| {
                if deleted.contains(ptr) {
                    *ptr = EntityRef::NONE;
                    detached += 1;
                }
            });
        }
        detached
    }

    /// 沿单向链表前进，最多走 `len` 步。
    fn chain<F>(&self, start: EntityRef, next: F) -> Chain<F>
    where
        F: Fn(EntityRef) -> Option<EntityRef>,
    {
        Chain {
            current: start,
            remaining: self.len(),
            next,
        }
    }

    pub fn lumps(&self, body: EntityRef) -> impl Iterator<Item = EntityRef> + '_ {
        let start = self.body(body).map(|b| b.lump).unwrap_or(EntityRef::NONE);
        self.chain(start, move |id| self.lump(id).map(|lump| lump.next_lump))
    }

    pub fn shells(&self, lump: EntityRef) -> impl Iterator<Item = EntityRef> + '_ {
        let start = self.lump(lump).map(|l| l.shell).unwrap_or(EntityRef::NONE);
        self.chain(start, move |id| self.shell(id).map(|shell| shell.next_shell))
    }

    pub fn faces(&self, shell: EntityRef) -> impl Iterator<Item = EntityRef> + '_ {
        let start = self.shell(shell).map(|s| s.face).unwrap_or(EntityRef::NONE);
        self.chain(start, move |id| self.face(id).map(|face| face.next_face))
    }

    pub fn loops(&self, face: EntityRef) -> impl Iterator<Item = EntityRef> + '_ {
        let start = self.face(face).map(|f| f.loop_).unwrap_or(EntityRef::NONE);
        self.chain(start, move |id| self.loop_(id).map(|lp| lp.next_loop))
    }

    /// 环中的共边，从首个共边出发沿 `next_coedge` 直到回到起点。
    pub fn coedges(&self, loop_: EntityRef) -> Vec<EntityRef> {
        let Some(first) = self.loop_(loop_).map(|lp| lp.coedge) else {
            return Vec::new();
        };
        let mut cycle = Vec::new();
        let mut current = first;
        while !current.is_none() && cycle.len() < self.len() {
            cycle.push(current);
            current = self
                .coedge(current)
                .map(|c| c.next_coedge)
                .unwrap_or(EntityRef::NONE);
            if current == first {
                break;
            }
        }
        cycle
    }

    /// 检查引用类型、链表终止、共边环闭合与伙伴对称。
    pub fn validate(&self) -> Result<(), TopologyError> {
        for (id, entity) in self.iter() {
            match &entity.data {
                EntityData::Body(body) => {
                    self.expect_kind(id, "lump", body.lump, EntityKind::Lump)?;
                    self.expect_kind(id, "transform", body.transform, EntityKind::Transform)?;
                    self.expect_terminated(body.lump, "lump", |r| {
                        self.lump(r).map(|l| l.next_lump)
                    })?;
                }
                EntityData::Lump(lump) => {
                    self.expect_kind(id, "next_lump", lump.next_lump, EntityKind::Lump)?;
                    self.expect_kind(id, "shell", lump.shell, EntityKind::Shell)?;
                    self.expect_kind(id, "body", lump.body, EntityKind::Body)?;
                    self.expect_terminated(lump.shell, "shell", |r| {
                        self.shell(r).map(|s| s.next_shell)
                    })?;
                }
                EntityData::Shell(shell) => {
                    self.expect_kind(id, "next_shell", shell.next_shell, EntityKind::Shell)?;
                    self.expect_kind(id, "face", shell.face, EntityKind::Face)?;
                    self.expect_kind(id, "lump", shell.lump, EntityKind::Lump)?;
                    self.expect_terminated(shell.face, "face", |r| {
                        self.face(r).map(|f| f.next_face)
                    })?;
                }
                EntityData::Face(face) => {
                    self.expect_kind(id, "next_face", face.next_face, EntityKind::Face)?;
                    self.expect_kind(id, "loop", face.loop_, EntityKind::Loop)?;
                    self.expect_kind(id, "shell", face.shell, EntityKind::Shell)?;
                    self.expect_terminated(face.loop_, "loop", |r| {
                        self.loop_(r).map(|l| l.next_loop)
                    })?;
                }
                EntityData::Loop(lp) => {
                    self.expect_kind(id, "coedge", lp.coedge, EntityKind::Coedge)?;
                    self.expect_kind(id, "face", lp.face, EntityKind::Face)?;
                    self.check_cycle(id, lp.coedge)?;
                }
                EntityData::Coedge(coedge) => {
                    self.expect_kind(id, "edge", coedge.edge, EntityKind::Edge)?;
                    self.expect_kind(id, "loop", coedge.loop_, EntityKind::Loop)?;
                    if !coedge.partner_coedge.is_none() {
                        let back = self.coedge(coedge.partner_coedge).map(|p| p.partner_coedge);
                        if back != Some(id) {
                            return Err(TopologyError::AsymmetricPartner {
                                coedge: id,
                                partner: coedge.partner_coedge,
                            });
                        }
                    }
                }
                EntityData::Edge(edge) => {
                    self.expect_kind(id, "start_vertex", edge.start_vertex, EntityKind::Vertex)?;
                    self.expect_kind(id, "end_vertex", edge.end_vertex, EntityKind::Vertex)?;
                    self.expect_kind(id, "coedge", edge.coedge, EntityKind::Coedge)?;
                }
                EntityData::Vertex(vertex) => {
                    self.expect_kind(id, "edge", vertex.edge, EntityKind::Edge)?;
                    self.expect_kind(id, "point", vertex.point, EntityKind::Point)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn expect_kind(
        &self,
        entity: EntityRef,
        field: &'static str,
        target: EntityRef,
        expected: EntityKind,
    ) -> Result<(), TopologyError> {
        if target.is_none() {
            return Ok(());
        }
        match self.get(target) {
            Some(found) if found.kind() == Some(expected) => Ok(()),
            found => Err(TopologyError::UnexpectedKind {
                entity,
                field,
                expected: expected.name(),
                found: found
                    .map(|e| e.type_name().to_string())
                    .unwrap_or_else(|| crate::entity::NONE_ENTITY_NAME.to_string()),
            }),
        }
    }

    fn expect_terminated(
        &self,
        start: EntityRef,
        list: &'static str,
        next: impl Fn(EntityRef) -> Option<EntityRef>,
    ) -> Result<(), TopologyError> {
        let mut current = start;
        for _ in 0..=self.len() {
            if current.is_none() {
                return Ok(());
            }
            match next(current) {
                Some(following) => current = following,
                None => return Err(TopologyError::UnterminatedList { start, list }),
            }
        }
        Err(TopologyError::UnterminatedList { start, list })
    }

    fn check_cycle(&self, loop_: EntityRef, first: EntityRef) -> Result<(), TopologyError> {
        if first.is_none() {
            return Ok(());
        }
        let mut current = first;
        for _ in 0..self.len() {
            let Some(coedge) = self.coedge(current) else {
                return Err(TopologyError::OpenLoop { loop_ });
            };
            let next = coedge.next_coedge;
            if self.coedge(next).map(|n| n.prev_coedge) != Some(current) {
                return Err(TopologyError::BrokenPrevChain {
                    coedge: current,
                    next,
                });
            }
            if next == first {
                return Ok(());
            }
            current = next;
        }
        Err(TopologyError::OpenLoop { loop_ })
    }
}

/// 有界的单向链表迭代器，防止损坏的数据造成死循环。
pub struct Chain<F> {
    current: EntityRef,
    remaining: usize,
    next: F,
}

impl<F> Iterator for Chain<F>
where
    F: Fn(EntityRef) -> Option<EntityRef>,
{
    type Item = EntityRef;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_none() || self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let item = self.current;
        self.current = (self.next)(item).unwrap_or(EntityRef::NONE);
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Coedge, Loop};

    /// 三个共边组成的闭合环，伙伴为空。
    fn triangle_loop() -> (Graph, EntityRef, [EntityRef; 3]) {
        let mut graph = Graph::new();
        let loop_ = graph.add_data(EntityData::Loop(Loop {
            next_loop: EntityRef::NONE,
            coedge: EntityRef::new(1),
            face: EntityRef::NONE,
        }));
        let ids = [EntityRef::new(1), EntityRef::new(2), EntityRef::new(3)];
        for i in 0..3 {
            graph.add_data(EntityData::Coedge(Coedge {
                next_coedge: ids[(i + 1) % 3],
                prev_coedge: ids[(i + 2) % 3],
                loop_,
                ..Coedge::default()
            }));
        }
        (graph, loop_, ids)
    }

    #[test]
    fn raw_indices_map_to_refs() {
        assert_eq!(EntityRef::from_raw(-1), Some(EntityRef::NONE));
        assert_eq!(EntityRef::from_raw(4), Some(EntityRef::new(4)));
        assert_eq!(EntityRef::from_raw(-2), None);
        assert_eq!(EntityRef::NONE.to_string(), "$-1");
        assert_eq!(EntityRef::new(7).to_string(), "$7");
        assert_eq!(EntityRef::NONE.index(), None);
    }

    #[test]
    fn coedge_cycle_closes() {
        let (graph, loop_, ids) = triangle_loop();
        assert_eq!(graph.coedges(loop_), ids.to_vec());
        graph.validate().expect("闭合环应通过校验");
    }

    #[test]
    fn broken_prev_chain_is_reported() {
        let (mut graph, _, ids) = triangle_loop();
        if let Some(EntityData::Coedge(coedge)) = graph.get_mut(ids[1]).map(|e| &mut e.data) {
            coedge.prev_coedge = ids[2];
        }
        assert_eq!(
            graph.validate(),
            Err(TopologyError::BrokenPrevChain {
                coedge: ids[0],
                next: ids[1]
            })
        );
    }

    #[test]
    fn asymmetric_partner_is_reported() {
        let (mut graph, _, ids) = triangle_loop();
        if let Some(EntityData::Coedge(coedge)) = graph.get_mut(ids[0]).map(|e| &mut e.data) {
            coedge.partner_coedge = ids[1];
        }
        assert!(matches!(
            graph.validate(),
            Err(TopologyError::AsymmetricPartner { .. })
        ));
    }

    #[test]
    fn face_list_must_terminate() {
        let mut graph = Graph::new();
        let shell = graph.add_data(EntityData::Shell(Shell {
            face: EntityRef::new(1),
            ..Shell::default()
        }));
        let first = graph.add_data(EntityData::Face(Face {
            next_face: EntityRef::new(2),
            shell,
            ..Face::default()
        }));
        graph.add_data(EntityData::Face(Face {
            next_face: first,
            shell,
            ..Face::default()
        }));
        assert_eq!(graph.faces(shell).count(), 3);
        assert!(matches!(
            graph.validate(),
            Err(TopologyError::UnterminatedList { list: "face", .. })
        ));
    }

    #[test]
    fn wrong_kind_is_reported() {
        let mut graph = Graph::new();
        let point = graph.add_data(EntityData::Point(Point {
            location: crate::geometry::Point3::ORIGIN,
        }));
        graph.add_data(EntityData::Body(Body {
            lump: point,
            ..Body::default()
        }));
        let err = graph.validate().unwrap_err();
        assert!(matches!(
            err,
            TopologyError::UnexpectedKind { field: "lump", expected: "lump", .. }
        ));
        assert_eq!(graph.bodies(), vec![EntityRef::new(1)]);
    }

    #[test]
    fn deleted_targets_become_none() {
        let mut graph = Graph::new();
        let gone = graph.add(Entity::deleted());
        let body = graph.add_data(EntityData::Body(Body {
            lump: gone,
            ..Body::default()
        }));
        assert_eq!(graph.detach_deleted(), 1);
        assert!(graph.body(body).map(|b| b.lump.is_none()).unwrap_or(false));
        assert_eq!(graph.type_name(gone), "null-ptr");
        assert_eq!(graph.type_name(EntityRef::NONE), "none-entity");
    }
}
