use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "scenecast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render an animated page to video and/or audio files.
    Render(RenderArgs),
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// JSON options file. Flags given on the command line override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Page to render (URL or local file).
    #[arg(short, long)]
    input: Option<String>,

    /// Comma separated outputs (.mp4, .webm, .mp3).
    #[arg(short, long)]
    output: Option<String>,

    /// Global name of the scene object.
    #[arg(short, long)]
    name: Option<String>,

    /// Global name of the media scene object.
    #[arg(long)]
    media: Option<String>,

    #[arg(long)]
    fps: Option<u32>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Device scale factor of the page.
    #[arg(long)]
    scale: Option<f64>,

    #[arg(long)]
    start_time: Option<f64>,

    /// Seconds to record; 0 records the whole scene.
    #[arg(long)]
    duration: Option<f64>,

    /// Iterations to record; 0 uses the scene's own count.
    #[arg(long)]
    iteration: Option<f64>,

    /// Number of parallel capture workers.
    #[arg(short, long)]
    multi: Option<usize>,

    #[arg(long)]
    bitrate: Option<String>,

    #[arg(long)]
    codec: Option<String>,

    #[arg(long)]
    referer: Option<String>,

    /// Frame image type (png or jpeg).
    #[arg(long)]
    image_type: Option<String>,

    #[arg(long)]
    cpu_used: Option<u32>,

    /// Keep transparency (webm only).
    #[arg(long, default_value_t = false)]
    alpha: bool,

    /// Reuse frames captured by an identical previous run.
    #[arg(long, default_value_t = false)]
    cache: bool,

    #[arg(long)]
    cache_folder: Option<PathBuf>,

    /// Let the engine write screenshots instead of the page driver.
    #[arg(long, default_value_t = false)]
    buffer: bool,

    /// Encode with this ffmpeg binary from frame files.
    #[arg(long)]
    ffmpeg_path: Option<PathBuf>,

    /// Forward ffmpeg's stderr to the log.
    #[arg(long, default_value_t = false)]
    ffmpeg_log: bool,

    /// Only log warnings and errors.
    #[arg(long, default_value_t = false)]
    no_log: bool,

    /// Page driver command line (repeat for arguments).
    #[arg(long, num_args = 1..)]
    driver: Option<Vec<String>>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
    }
}

fn init_tracing(quiet: bool) {
    let default = if quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut options = match &args.config {
        Some(path) => scenecast::RenderOptions::from_path(path)?,
        None => scenecast::RenderOptions::default(),
    };

    if let Some(v) = args.input {
        options.input = v;
    }
    if let Some(v) = args.output {
        options.output = v;
    }
    if let Some(v) = args.name {
        options.name = v;
    }
    if let Some(v) = args.media {
        options.media = v;
    }
    if let Some(v) = args.fps {
        options.fps = v;
    }
    if let Some(v) = args.width {
        options.width = v;
    }
    if let Some(v) = args.height {
        options.height = v;
    }
    if let Some(v) = args.scale {
        options.scale = v;
    }
    if let Some(v) = args.start_time {
        options.start_time = v;
    }
    if let Some(v) = args.duration {
        options.duration = v;
    }
    if let Some(v) = args.iteration {
        options.iteration = v;
    }
    if let Some(v) = args.multi {
        options.multi = v;
    }
    if let Some(v) = args.bitrate {
        options.bitrate = v;
    }
    if args.codec.is_some() {
        options.codec = args.codec;
    }
    if args.referer.is_some() {
        options.referer = args.referer;
    }
    if let Some(v) = args.image_type {
        options.image_type = scenecast::ImageType::parse(&v)?;
    }
    if args.cpu_used.is_some() {
        options.cpu_used = args.cpu_used;
    }
    if let Some(v) = args.cache_folder {
        options.cache_folder = v;
    }
    if args.ffmpeg_path.is_some() {
        options.ffmpeg_path = args.ffmpeg_path;
    }
    if let Some(v) = args.driver {
        options.driver = v;
    }
    options.alpha |= args.alpha;
    options.cache |= args.cache;
    options.buffer |= args.buffer;
    options.ffmpeg_log |= args.ffmpeg_log;
    options.no_log |= args.no_log;

    init_tracing(options.no_log);

    let summary = scenecast::render(options)?;
    for path in &summary.video_outputs {
        eprintln!("wrote {}", path.display());
    }
    if let Some(path) = &summary.audio_output {
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}
