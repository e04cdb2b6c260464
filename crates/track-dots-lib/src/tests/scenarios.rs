use crate::codec::polyline;
use crate::codec::rle::{self, RleItem};
use crate::{
    BitSet, CommandBuffer, Config, DataError, DrawCommand, Engine, TimeData, TimeStream,
    TrackData, ViewportState,
};
use geo::Point;

#[test]
fn test_canonical_polyline() {
    let decoded: Vec<(f64, f64)> = polyline::decode("_p~iF~ps|U_ulLnnqC_mqNvxq`@", 5)
        .collect::<Result<_, _>>()
        .unwrap();
    let expected = [(38.5, -120.2), (40.7, -120.95), (43.252, -126.453)];
    assert_eq!(decoded.len(), expected.len());
    for ((lat, lng), (lat2, lng2)) in decoded.iter().zip(expected.iter()) {
        assert!((lat - lat2).abs() < 1e-9);
        assert!((lng - lng2).abs() < 1e-9);
    }
}

#[test]
fn test_reference_rle_list() {
    let items = [RleItem::Delta(1), RleItem::Run(2, 6), RleItem::Delta(5)];
    let values: Vec<i64> = rle::decode_list(0, &items)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(values, vec![0, 1, 3, 5, 7, 9, 11, 13, 18]);

    // same sequence through the compressed stream, read sparsely
    let stream = TimeStream::from_items(0, &items).unwrap();
    let wanted: BitSet = [1u32, 4, 8].into_iter().collect();
    assert_eq!(stream.select(&wanted).collect::<Vec<_>>(), vec![1, 7, 18]);
}

/// Track of `times.len()` points heading east along the equator
fn equator_track(id: u64, lngs: &[f64], times: Vec<i64>) -> TrackData {
    TrackData {
        id,
        name: String::new(),
        start_time: 0,
        polyline: polyline::encode(lngs.iter().map(|&lng| (0.0, lng)), 5).unwrap(),
        times: TimeData::Plain(times),
        bounds: None,
        color: None,
        dot_color: None,
    }
}

fn dot_positions(commands: &CommandBuffer) -> Vec<Point<f64>> {
    commands
        .commands()
        .iter()
        .filter_map(|c| match c {
            DrawCommand::Dot { position, .. } => Some(*position),
            _ => None,
        })
        .collect()
}

#[test]
fn test_two_visible_segments_one_dot_each() {
    // corner track so simplification keeps all three points
    let data = TrackData {
        polyline: polyline::encode([(0.0, 0.0), (0.0, 1.0), (1.0, 1.0)], 5).unwrap(),
        ..equator_track(1, &[], vec![0, 5, 10])
    };
    let mut engine = Engine::new(Config {
        period_seconds: 5.0,
        draw_paths: false,
        ..Config::default()
    });
    engine.add_track(data).unwrap();
    let viewport = engine.fit_viewport(400.0, 400.0).unwrap();
    engine.set_viewport(viewport);
    engine.update().unwrap();

    let track = engine.track(1).unwrap();
    assert_eq!(track.spans().len(), 2);

    let dots = engine.dots_for(1, 0.0).unwrap();
    let times: Vec<f64> = dots.iter().map(|d| d.t).collect();
    assert_eq!(times, vec![0.0, 5.0]);

    let transform = viewport.transform();
    let points = track.points();
    let close = |a: Point<f64>, b: Point<f64>| (a - b).x().abs() < 1e-6 && (a - b).y().abs() < 1e-6;
    assert!(close(dots[0].position, transform.apply(points[0])));
    assert!(close(dots[1].position, transform.apply(points[1])));

    // half a period later both dots sit halfway along their segments
    let halfway = engine.dots_for(1, 2.5).unwrap();
    let mid_first = transform.apply((points[0] + points[1]) / 2.0);
    let mid_second = transform.apply((points[1] + points[2]) / 2.0);
    assert!(close(halfway[0].position, mid_first));
    assert!(close(halfway[1].position, mid_second));
}

#[test]
fn test_malformed_tracks_are_absent() {
    let mut engine = Engine::new(Config {
        draw_paths: false,
        ..Config::default()
    });
    let good = equator_track(1, &[0.0, 0.5, 1.0], vec![0, 30, 60]);
    let mut truncated = equator_track(2, &[0.0, 0.5, 1.0], vec![0, 30, 60]);
    truncated.polyline.truncate(truncated.polyline.len() - 1);
    let bad_times = TrackData {
        times: TimeData::Compressed {
            first: 0,
            bytes: vec![0xff, 0xff],
        },
        ..equator_track(3, &[0.0, 0.5, 1.0], vec![])
    };
    let backwards = equator_track(4, &[0.0, 0.5, 1.0], vec![0, 30, 20]);

    let report = engine.add_tracks(vec![good, truncated, bad_times, backwards]);
    assert_eq!(report.accepted, vec![1]);
    assert!(matches!(report.rejected[0].1, DataError::Decode(_)));
    assert!(matches!(report.rejected[1].1, DataError::Decode(_)));
    assert!(matches!(
        report.rejected[2].1,
        DataError::NonMonotonicTimes { index: 2 }
    ));

    engine.set_viewport(engine.fit_viewport(300.0, 300.0).unwrap());
    let mut canvas = CommandBuffer::new();
    let stats = engine.tick(0.0, &mut canvas).unwrap();
    assert_eq!(stats.tracks, 1);
    // dots at t = 0 and t = 30 of the only surviving track
    assert_eq!(dot_positions(&canvas).len(), 2);
}

#[test]
fn test_viewport_edge_is_inclusive() {
    let mut engine = Engine::new(Config::default());
    engine
        .add_track(equator_track(1, &[0.0, 1.0], vec![0, 10]))
        .unwrap();
    let east_end = engine.track(1).unwrap().points()[1];

    // screen whose left edge is exactly on the track's east end
    let viewport = ViewportState::new(
        0,
        geo::Rect::new(
            geo::Coord { x: 0.0, y: 0.0 },
            geo::Coord { x: 10.0, y: 10.0 },
        ),
        geo::Coord {
            x: east_end.x(),
            y: east_end.y() - 5.0,
        },
    );
    engine.set_viewport(viewport);
    assert_eq!(engine.update().unwrap().visible, 1);

    let shifted = ViewportState {
        offset: geo::Coord {
            x: east_end.x() + 1e-6,
            ..viewport.offset
        },
        ..viewport
    };
    engine.set_viewport(shifted);
    assert_eq!(engine.update().unwrap().visible, 0);
}
