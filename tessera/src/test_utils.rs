use std::sync::Arc;

use tessera_mapsforge::writer::{MapWriter, PathRecord, PointRecord};
use tessera_mapsforge::MapData;
use tessera_types::{Coordinates, Polygon, Rect};

fn ring(points: &[(f64, f64)]) -> Polygon {
    Polygon::new(vec![points
        .iter()
        .map(|(lon, lat)| Coordinates::new(*lon, *lat))
        .collect()])
}

/// Small map around the tile 8848/5550 at zoom 14.
pub fn prague_writer() -> MapWriter {
    let mut writer = MapWriter::new(Rect::new(14.38, 50.06, 14.46, 50.10));
    writer.point_tags = vec!["place=city".into()];
    writer.path_tags = vec!["highway=primary".into(), "natural=water".into()];
    writer.points = vec![PointRecord {
        coordinates: Coordinates::new(14.425, 50.088),
        tags: vec!["place=city".into()],
        name: Some("Praha".into()),
        ..Default::default()
    }];
    writer.paths = vec![
        PathRecord {
            tags: vec!["highway=primary".into()],
            blocks: vec![ring(&[(14.418, 50.085), (14.432, 50.086)])],
            name: Some("Wilsonova".into()),
            reference: Some("D1".into()),
            ..Default::default()
        },
        PathRecord {
            tags: vec!["natural=water".into()],
            blocks: vec![ring(&[
                (14.420, 50.080),
                (14.424, 50.080),
                (14.424, 50.083),
                (14.420, 50.083),
                (14.420, 50.080),
            ])],
            name: Some("Vltava".into()),
            ..Default::default()
        },
    ];
    writer
}

pub fn prague_map() -> Arc<MapData> {
    let bytes = prague_writer().to_bytes().unwrap();
    let map = MapData::from_bytes(bytes);
    assert!(map.is_valid(), "{}", map.error_string());
    Arc::new(map)
}
