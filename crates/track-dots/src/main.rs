mod error;
mod input;
mod logging;
mod settings;
mod svg;

use error::{CliError, Result};
use geo::Point;
use settings::Settings;
use std::path::Path;
use std::process::ExitCode;
use svg::SvgCanvas;
use track_dots_lib::utils;
use track_dots_lib::{Color, Config, Engine, ViewportState};

fn main() -> ExitCode {
    let _guard = logging::setup_logging();
    let settings = Settings::from_cli();

    match run(&settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(settings: &Settings) -> Result<()> {
    let config = settings.apply(match &settings.config {
        Some(path) => read_config(path)?,
        None => Config::default(),
    });
    let background: Color = settings.background.parse()?;
    tracing::debug!(?config, "engine configuration");

    let tracks = input::load_inputs(&settings.inputs, config.polyline_precision)?;
    let mut engine = Engine::new(config);
    let report = engine.add_tracks(tracks);
    if report.accepted.is_empty() {
        return Err(CliError::NothingLoaded);
    }

    let viewport = viewport(&engine, settings)?.ok_or(CliError::NothingLoaded)?;
    engine.set_viewport(viewport);
    if let Some(update) = engine.update() {
        tracing::info!(
            zoom = update.zoom,
            visible = update.visible,
            segments = update.segments,
            "viewport ready"
        );
    }

    std::fs::create_dir_all(&settings.output).map_err(|source| CliError::Io {
        path: settings.output.clone(),
        source,
    })?;

    let step = 1.0 / settings.fps.max(f64::EPSILON);
    for i in 0..settings.frames {
        profiling::scope!("frame");
        let now = settings.time + i as f64 * step;
        let Some(frame) = engine.render_frame(now) else {
            continue;
        };
        let mut canvas = SvgCanvas::new(settings.width, settings.height, background);
        if !engine.commit(&frame, &mut canvas) {
            continue;
        }

        let path = settings.output.join(format!("frame-{i:04}.svg"));
        std::fs::write(&path, canvas.finish()).map_err(|source| CliError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(
            frame = i,
            dots = frame.stats.dots,
            segments = frame.stats.segments,
            "frame written"
        );
        profiling::finish_frame!();
    }

    let info = engine.info();
    tracing::info!(
        tracks = info.track_count,
        points = info.total_points,
        time_bytes = info.time_bytes,
        cached_levels = info.cached_levels,
        frames = settings.frames,
        output = %settings.output.display(),
        "done"
    );
    Ok(())
}

fn read_config(path: &Path) -> Result<Config> {
    let file = std::fs::File::open(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| CliError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// The viewport asked for on the command line, filling the blanks from the loaded tracks
fn viewport(engine: &Engine, settings: &Settings) -> Result<Option<ViewportState>> {
    let (width, height) = (settings.width as f64, settings.height as f64);
    let Some(fit) = engine.fit_viewport(width, height) else {
        return Ok(None);
    };
    let center = match settings.center() {
        Some(Ok((lat, lng))) => utils::project(lat, lng),
        Some(Err(raw)) => return Err(CliError::InvalidCenter(raw)),
        None => Point(fit.world_bounds().center()),
    };
    let zoom = settings
        .zoom
        .map_or(fit.zoom, |z| z.min(engine.config().max_zoom));
    Ok(Some(ViewportState::centered_on(center, zoom, width, height)))
}
