//! Track loading from JSON and GPX files

use crate::error::{CliError, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use track_dots_lib::codec::polyline;
use track_dots_lib::{TimeData, TrackData, TrackId};

/// A JSON input holds either one track or a list of them
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonTracks {
    Many(Vec<TrackData>),
    One(Box<TrackData>),
}

/// Load every input file. GPX tracks get ids after the largest JSON id.
pub fn load_inputs(paths: &[PathBuf], precision: u32) -> Result<Vec<TrackData>> {
    profiling::scope!("load_inputs");

    let mut tracks = Vec::new();
    let mut gpx_files = Vec::new();
    for path in paths {
        match extension(path).as_deref() {
            Some("json") => tracks.extend(read_json(path)?),
            Some("gpx") => gpx_files.push(read_gpx(path)?),
            _ => return Err(CliError::UnsupportedInput(path.clone())),
        }
    }

    let mut next_id = tracks.iter().map(|t| t.id + 1).max().unwrap_or(0);
    for (path, gpx) in gpx_files {
        let converted = gpx_to_tracks(&gpx, &mut next_id, precision)?;
        if converted.is_empty() {
            tracing::warn!(path = %path.display(), "no timestamped track points");
        }
        tracks.extend(converted);
    }

    tracing::info!(files = paths.len(), tracks = tracks.len(), "inputs read");
    Ok(tracks)
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

fn open(path: &Path) -> Result<BufReader<File>> {
    let file = File::open(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

fn read_json(path: &Path) -> Result<Vec<TrackData>> {
    let parsed = serde_json::from_reader(open(path)?).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(match parsed {
        JsonTracks::Many(tracks) => tracks,
        JsonTracks::One(track) => vec![*track],
    })
}

fn read_gpx(path: &Path) -> Result<(PathBuf, gpx::Gpx)> {
    let gpx = gpx::read(open(path)?).map_err(|source| CliError::Gpx {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((path.to_path_buf(), gpx))
}

/// One [`TrackData`] per GPX track, with all its segments joined. Points without a
/// timestamp are dropped.
pub fn gpx_to_tracks(
    gpx: &gpx::Gpx,
    next_id: &mut TrackId,
    precision: u32,
) -> Result<Vec<TrackData>> {
    let mut out = Vec::with_capacity(gpx.tracks.len());
    for track in &gpx.tracks {
        let fixes: Vec<(f64, f64, i64)> = track
            .segments
            .iter()
            .flat_map(|segment| segment.points.iter())
            .filter_map(|waypoint| {
                let time = OffsetDateTime::from(waypoint.time?);
                let point = waypoint.point();
                Some((point.y(), point.x(), time.unix_timestamp()))
            })
            .collect();
        let Some(&(_, _, start_time)) = fixes.first() else {
            continue;
        };

        let polyline = polyline::encode(fixes.iter().map(|&(lat, lng, _)| (lat, lng)), precision)?;
        let id = *next_id;
        *next_id += 1;
        out.push(TrackData {
            id,
            name: track.name.clone().unwrap_or_else(|| format!("track {id}")),
            start_time,
            polyline,
            times: TimeData::Plain(fixes.iter().map(|&(_, _, t)| t - start_time).collect()),
            bounds: None,
            color: None,
            dot_color: None,
        });
    }
    Ok(out)
}
