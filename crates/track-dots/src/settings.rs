use clap::Parser;
use std::path::PathBuf;
use track_dots_lib::Config;

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Track Dots - Render thousands of GPS tracks as animated dots
pub struct Settings {
    /// Track files to load (.gpx, or .json holding one track or an array of tracks)
    #[clap(value_name = "FILE", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Directory the SVG frames are written to
    #[clap(short, long, default_value = "frames")]
    pub output: PathBuf,

    /// JSON file with engine settings; flags below override it
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Frame width in pixels
    #[clap(long, default_value = "1280")]
    pub width: u32,

    /// Frame height in pixels
    #[clap(long, default_value = "800")]
    pub height: u32,

    /// Map center as LAT,LNG (defaults to the center of all tracks)
    #[clap(long, allow_hyphen_values = true)]
    pub center: Option<String>,

    /// Zoom level (defaults to the deepest level showing every track)
    #[clap(short, long)]
    pub zoom: Option<u8>,

    /// Clock value of the first frame, in seconds
    #[clap(long, default_value = "0.0")]
    pub time: f64,

    /// Number of frames to render
    #[clap(short, long, default_value = "1")]
    pub frames: u32,

    /// Frames per second of animation clock
    #[clap(long, default_value = "30.0")]
    pub fps: f64,

    /// Seconds between two dots of the same track
    #[clap(long)]
    pub period: Option<f64>,

    /// Animation speed multiplier
    #[clap(long)]
    pub speed: Option<f64>,

    /// Dot size in pixels
    #[clap(long)]
    pub dot_size: Option<f64>,

    /// Skip drawing the track lines under the dots
    #[clap(long, default_value = "false")]
    pub no_paths: bool,

    /// Simplify newly needed zoom levels on worker threads
    #[clap(long, default_value = "false")]
    pub background_simplification: bool,

    /// Seconds between two fixes above which the segment is a data gap
    #[clap(long)]
    pub gap_seconds: Option<f64>,

    /// Background color of the frames
    #[clap(long, default_value = "#ffffff")]
    pub background: String,
}

impl Settings {
    pub fn from_cli() -> Self {
        Settings::parse()
    }

    /// Apply the command line overrides on top of `config`
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(period) = self.period {
            config.period_seconds = period;
        }
        if let Some(speed) = self.speed {
            config.speed_scale = speed;
        }
        if let Some(size) = self.dot_size {
            config.dot_size = size;
            config.emphasized_dot_size = config.emphasized_dot_size.max(size);
        }
        if self.no_paths {
            config.draw_paths = false;
        }
        if self.background_simplification {
            config.background_simplification = true;
        }
        if let Some(gap) = self.gap_seconds {
            config.gap_seconds = Some(gap);
        }
        config
    }

    /// Parsed `--center`, as `(lat, lng)`
    pub fn center(&self) -> Option<Result<(f64, f64), String>> {
        let raw = self.center.as_deref()?;
        let parsed = raw.split_once(',').and_then(|(lat, lng)| {
            let lat = lat.trim().parse::<f64>().ok()?;
            let lng = lng.trim().parse::<f64>().ok()?;
            Some((lat, lng))
        });
        Some(parsed.ok_or_else(|| raw.to_string()))
    }
}
