use std::fs;
use std::path::PathBuf;

use acis_core::entity::EntityKind;
use acis_core::geometry::{Bound, Point3, Vector3};
use acis_core::graph::{EntityRef, Graph};
use acis_io::{AcisError, AcisModel, ExportError, ExportOptions, VersionPolicy, load};

const CREATION_DATE: &str = "Mon Jan  5 10:00:00 2026";

fn fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests/data");
    path.push(name);
    fs::read_to_string(&path).expect("读取测试数据失败")
}

fn load_cube(name: &str) -> AcisModel {
    load(fixture(name)).expect("载入立方体失败")
}

fn fixed_date() -> ExportOptions {
    ExportOptions {
        creation_date: Some(CREATION_DATE.to_string()),
        ..ExportOptions::default()
    }
}

fn old_versions_allowed() -> ExportOptions {
    ExportOptions {
        policy: VersionPolicy {
            min_export_version: 400,
            ..VersionPolicy::default()
        },
        ..fixed_date()
    }
}

fn count_kind(graph: &Graph, kind: EntityKind) -> usize {
    graph
        .iter()
        .filter(|(_, entity)| entity.kind() == Some(kind))
        .count()
}

#[test]
fn cube_topology_is_closed_and_symmetric() {
    let model = load_cube("cube.sat");
    assert_eq!(model.header.version, 700);
    assert_eq!(model.header.product_id, "acis-io ACIS Builder");
    assert_eq!(model.graph.len(), 86);
    assert_eq!(model.bodies, vec![EntityRef::new(0)]);

    let graph = &model.graph;
    assert_eq!(count_kind(graph, EntityKind::Face), 6);
    assert_eq!(count_kind(graph, EntityKind::Coedge), 24);
    assert_eq!(count_kind(graph, EntityKind::Edge), 12);
    assert_eq!(count_kind(graph, EntityKind::Vertex), 8);

    let body = model.bodies[0];
    let lumps: Vec<_> = graph.lumps(body).collect();
    assert_eq!(lumps.len(), 1);
    let lump = graph.lump(lumps[0]).expect("缺少 lump");
    assert!(lump.next_lump.is_none());
    assert_eq!(lump.body, body);

    let shells: Vec<_> = graph.shells(lumps[0]).collect();
    assert_eq!(shells.len(), 1);
    let faces: Vec<_> = graph.faces(shells[0]).collect();
    assert_eq!(faces.len(), 6);

    for face in &faces {
        let loops: Vec<_> = graph.loops(*face).collect();
        assert_eq!(loops.len(), 1, "每个面只有一个环");
        let coedges = graph.coedges(loops[0]);
        assert_eq!(coedges.len(), 4);

        for coedge_id in &coedges {
            let coedge = graph.coedge(*coedge_id).expect("缺少共边");
            assert_eq!(coedge.loop_, loops[0]);
            let next = graph.coedge(coedge.next_coedge).expect("缺少下一条共边");
            assert_eq!(next.prev_coedge, *coedge_id);
            let partner = graph.coedge(coedge.partner_coedge).expect("缺少伙伴共边");
            assert_eq!(partner.partner_coedge, *coedge_id);
            assert_eq!(partner.edge, coedge.edge);
            assert_ne!(partner.sense, coedge.sense);
        }
    }

    let mut corners: Vec<Point3> = Vec::new();
    for (_, entity) in graph.iter() {
        let Some(edge) = entity.data.as_edge() else {
            continue;
        };
        let vertex = graph.vertex(edge.start_vertex).expect("缺少起点");
        let point = graph.point(vertex.point).expect("缺少点");
        if !corners.iter().any(|corner| corner.is_close(point.location)) {
            corners.push(point.location);
        }
        assert_eq!(edge.start_param, Some(0.0));
        assert_eq!(edge.end_param, Some(777.0));
        assert_eq!(edge.convexity.as_deref(), Some("unknown"));
    }
    assert_eq!(corners.len(), 8);
}

#[test]
fn cube_geometry_values() {
    let model = load_cube("cube.sat");
    let graph = &model.graph;
    let body = graph.body(model.bodies[0]).expect("缺少实体体");

    let transform = graph.transform(body.transform).expect("缺少变换");
    assert_eq!(transform.matrix.row(3), [388.5, 388.5, 388.5, 1.0]);
    assert_eq!(transform.scale, 1.0);
    assert!(!transform.rotate && !transform.reflect && !transform.shear);

    let first_face = graph
        .faces(EntityRef::new(2))
        .next()
        .expect("壳中没有面");
    let face = graph.face(first_face).expect("缺少面");
    assert!(!face.sense);
    assert!(!face.double_sided);
    let plane = graph.plane_surface(face.surface).expect("缺少平面");
    assert!(plane.normal.is_close(Vector3::Z));
    assert!(plane.origin.is_close(Point3::new(0.0, 0.0, 388.5)));
    assert_eq!(plane.u_bounds, [Bound::Infinite, Bound::Infinite]);

    let curves: Vec<_> = graph
        .iter()
        .filter_map(|(_, entity)| entity.data.as_straight_curve())
        .collect();
    assert_eq!(curves.len(), 12);
    for curve in curves {
        assert!((curve.direction.length() - 1.0).abs() < 1e-12);
        assert_eq!(curve.bounds, [Bound::Infinite, Bound::Infinite]);
    }
}

#[test]
fn cube_reexports_identical_text() {
    let source = fixture("cube.sat");
    let model = load(&source).expect("载入立方体失败");
    let exported = model.to_sat(700, &fixed_date()).expect("导出失败");
    assert_eq!(exported, source);
}

#[test]
fn cube_survives_binary_round_trip() {
    let model = load_cube("cube.sat");
    let bytes = model.to_sab(700, &fixed_date()).expect("导出 SAB 失败");
    assert!(acis_io::is_sab(&bytes));

    let reloaded = load(&bytes).expect("载入 SAB 失败");
    assert_eq!(reloaded.header.version, 700);
    assert_eq!(reloaded.header.n_records, 86);
    assert_eq!(reloaded.header.creation_date, CREATION_DATE);
    assert_eq!(reloaded.bodies, model.bodies);
    assert_eq!(reloaded.graph, model.graph);

    let text = reloaded.to_sat(700, &fixed_date()).expect("再次导出失败");
    assert_eq!(text, fixture("cube.sat"));
}

/// 其他建模器的文本写法：记录数为 0、两位指数、CRLF 换行、结束标记后带空格。
fn third_party_variant(text: &str) -> String {
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    lines[0] = "700 0 1 0 ".to_string();
    lines[1] = "@33 Open Design Alliance ACIS Builder @12 ACIS 32.0 NT \
                @24 Tue Mar 14 09:12:31 2023 "
        .to_string();
    lines[2] = "1 9.9999999999999995e-07 1e-10 ".to_string();
    if let Some(last) = lines.last_mut() {
        last.push(' ');
    }
    let mut joined = lines.join("\r\n");
    joined.push_str("\r\n");
    joined
}

#[test]
fn third_party_text_variants_load() {
    let model = load_cube("cube.sat");
    let source = third_party_variant(&fixture("cube.sat"));
    assert!(source.ends_with("End-of-ACIS-data \r\n"));

    let variant = load(&source).expect("载入失败");
    assert_eq!(variant.header.n_records, 0);
    assert_eq!(variant.header.product_id, "Open Design Alliance ACIS Builder");
    assert_eq!(variant.header.creation_date, "Tue Mar 14 09:12:31 2023");
    assert_eq!(variant.bodies, model.bodies);
    assert_eq!(variant.graph, model.graph);

    let text = variant.to_sat(700, &fixed_date()).expect("导出失败");
    assert_eq!(text, fixture("cube.sat"));
}

#[test]
fn export_below_minimum_version_is_rejected() {
    let model = load_cube("cube.sat");
    let err = model.to_sat(600, &fixed_date()).unwrap_err();
    assert!(matches!(
        err,
        AcisError::Export(ExportError::VersionTooOld {
            version: 600,
            minimum: 700
        })
    ));
}

#[test]
fn newer_fields_block_old_export() {
    let model = load_cube("cube.sat");
    let err = model.to_sat(400, &old_versions_allowed()).unwrap_err();
    match err {
        AcisError::Export(ExportError::FieldNotRepresentable {
            entity_type,
            field,
            version,
        }) => {
            assert_eq!(entity_type, "edge");
            assert_eq!(field, "start_param");
            assert_eq!(version, 400);
        }
        other => panic!("期望字段无法表达，实际为 {other:?}"),
    }
}

#[test]
fn old_cube_reexports_at_its_own_version() {
    let source = fixture("cube400.sat");
    let model = load(&source).expect("载入 400 版本立方体失败");
    assert_eq!(model.header.version, 400);
    assert_eq!(model.header.acis_version, "ACIS 4.00 NT");

    let edge = model
        .graph
        .iter()
        .find_map(|(_, entity)| entity.data.as_edge())
        .expect("缺少边");
    assert_eq!(edge.start_param, None);
    assert_eq!(edge.convexity, None);

    let exported = model.to_sat(400, &old_versions_allowed()).expect("导出失败");
    assert_eq!(exported, source);
}

#[test]
fn old_cube_upgrades_with_defaults() {
    let model = load_cube("cube400.sat");
    let upgraded = model.to_sat(700, &fixed_date()).expect("升级导出失败");
    assert!(upgraded.starts_with("700 86 1 0 \n@20 acis-io ACIS Builder @12 ACIS 32.0 NT"));
    assert!(upgraded.contains("body $-1 -1 $-1 $1 $-1 $85 #"));

    let reloaded = load(&upgraded).expect("载入升级结果失败");
    let edges: Vec<_> = reloaded
        .graph
        .iter()
        .filter_map(|(_, entity)| entity.data.as_edge())
        .collect();
    assert_eq!(edges.len(), 12);
    for edge in edges {
        assert_eq!(edge.start_param, Some(0.0));
        assert_eq!(edge.end_param, Some(0.0));
        assert_eq!(edge.convexity.as_deref(), Some("unknown"));
    }
}

#[test]
fn sequence_numbers_are_written_and_accepted() {
    let model = load_cube("cube.sat");
    let options = ExportOptions {
        sequence_numbers: true,
        ..fixed_date()
    };
    let text = model.to_sat(700, &options).expect("导出失败");
    let mut lines = text.lines().skip(3);
    assert_eq!(lines.next(), Some("-0 body $-1 -1 $-1 $1 $-1 $85 #"));
    assert_eq!(lines.next(), Some("-1 lump $-1 -1 $-1 $-1 $2 $0 #"));

    let reloaded = load(&text).expect("载入带序号的数据失败");
    assert_eq!(reloaded.graph, model.graph);
}

#[test]
fn model_serializes_to_json() {
    let model = load_cube("cube.sat");
    let json = serde_json::to_value(&model).expect("序列化失败");
    assert_eq!(json["header"]["version"], 700);
    assert_eq!(json["header"]["n_records"], 86);
    assert_eq!(json["bodies"][0], 0);
}
