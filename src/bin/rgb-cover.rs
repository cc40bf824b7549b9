use std::{
    io::BufReader,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use rand::{SeedableRng, rngs::StdRng};
use tracing_subscriber::EnvFilter;

use rgb_cover::{
    AmbientDevice, AmbientDispatcher, AppConfig, ArtworkLoader, Controller, CoverResolver,
    DisplayMachine, DisplayOptions, Fps, HassPoller, HttpFetcher, JsonLinesSource, MemorySink,
    NoPacer, PixelGrid, Resample, SettingsStore, TransitionJob, TransitionKind, WledDevice,
    decode_cover, open_sink, quantize, run_transition,
};

#[derive(Parser, Debug)]
#[command(name = "rgb-cover", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the display daemon.
    Run(RunArgs),
    /// Render one transition to numbered PNG frames.
    Preview(PreviewArgs),
    /// Print the dominant colours of an image.
    Palette(PaletteArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Daemon configuration JSON.
    #[arg(long)]
    config: PathBuf,

    /// Read entity snapshots as JSON lines from stdin instead of polling Home Assistant.
    #[arg(long)]
    stdin: bool,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Image to transition from (black when omitted).
    #[arg(long)]
    from: Option<PathBuf>,

    /// Image to transition to (not used by fadeOut).
    #[arg(long)]
    to: Option<PathBuf>,

    /// Transition name, e.g. crossfade, slideLeft, spiral, fadeOut.
    #[arg(long, default_value = "crossfade")]
    kind: String,

    #[arg(long, default_value_t = 500)]
    duration_ms: u64,

    #[arg(long, default_value_t = 30)]
    fps: u32,

    #[arg(long, default_value_t = 64)]
    size: u32,

    /// Seed for dissolve ordering.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Output directory for frame_0000.png, frame_0001.png, ...
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct PaletteArgs {
    #[arg(long)]
    image: PathBuf,

    /// Number of colours.
    #[arg(short, default_value_t = 5)]
    k: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Run(args) => cmd_run(args),
        Command::Preview(args) => cmd_preview(args),
        Command::Palette(args) => cmd_palette(args),
    }
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let cfg = AppConfig::load(&args.config)?;
    let fps = cfg.frame_rate()?;
    let settings = SettingsStore::load(cfg.defaults.clone(), cfg.settings_path.clone())?;

    let sink = open_sink(cfg.display_command.as_deref(), cfg.size, cfg.size);
    let devices: Vec<Box<dyn AmbientDevice>> = cfg
        .wled_urls
        .iter()
        .map(|url| Box::new(WledDevice::new(url.as_str())) as Box<dyn AmbientDevice>)
        .collect();
    let display = DisplayMachine::new(
        sink,
        settings,
        DisplayOptions {
            width: cfg.size,
            height: cfg.size,
            fps,
        },
    )
    .with_ambient(AmbientDispatcher::spawn(devices));

    let fetcher = HttpFetcher::new(cfg.fetch_timeout(), cfg.hass_token.clone());
    let loader = ArtworkLoader::new(Arc::new(fetcher), cfg.size, cfg.size, cfg.image_sampling);
    let resolver = CoverResolver::new(
        cfg.entities.clone(),
        cfg.hass_url.clone(),
        cfg.resolver_timing(),
    );

    let controller = Controller::spawn(display, loader, resolver)?;
    controller.handle().shutdown_on_signal()?;
    if args.stdin {
        JsonLinesSource::new(BufReader::new(std::io::stdin())).spawn(controller.handle(), true)?;
    } else {
        let url = cfg
            .hass_url
            .clone()
            .context("hassUrl is required unless --stdin is given")?;
        HassPoller::new(
            url,
            cfg.hass_token.clone(),
            cfg.entities.clone(),
            cfg.poll_interval(),
            cfg.fetch_timeout(),
        )
        .spawn(controller.handle())?;
    }

    controller.join()?;
    Ok(())
}

fn load_grid(path: &Path, size: u32) -> anyhow::Result<PixelGrid> {
    let bytes = std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))?;
    Ok(decode_cover(&bytes, size, size, Resample::Nearest)?)
}

fn cmd_preview(args: PreviewArgs) -> anyhow::Result<()> {
    let kind: TransitionKind = args.kind.parse()?;
    let fps = Fps::whole(args.fps)?;
    let duration = Duration::from_millis(args.duration_ms);

    let source = args
        .from
        .as_deref()
        .map(|p| load_grid(p, args.size).map(Arc::new))
        .transpose()?;
    let job = if kind == TransitionKind::FadeOut {
        let source = source.context("fadeOut needs --from")?;
        TransitionJob::fade_out(source, duration, fps)
    } else {
        let to = args.to.as_deref().context("--to is required")?;
        let target = Arc::new(load_grid(to, args.size)?);
        TransitionJob::cover_change(source, target, kind, duration, fps)
    };

    let mut sink = MemorySink::new(args.size, args.size);
    let mut rng = StdRng::seed_from_u64(args.seed);
    run_transition(&job, &mut sink, &mut NoPacer, &|| 100u8, &mut rng)?;

    std::fs::create_dir_all(&args.out)
        .with_context(|| format!("create output dir '{}'", args.out.display()))?;
    for (i, frame) in sink.frames().iter().enumerate() {
        let path = args.out.join(format!("frame_{i:04}.png"));
        frame
            .grid
            .to_rgb_image()
            .save(&path)
            .with_context(|| format!("write png '{}'", path.display()))?;
    }

    eprintln!("wrote {} frames to {}", sink.frames().len(), args.out.display());
    Ok(())
}

fn cmd_palette(args: PaletteArgs) -> anyhow::Result<()> {
    let grid = load_grid(&args.image, 64)?;
    let colors = quantize(&grid, args.k, &mut rand::rng())?;
    for c in colors {
        println!("{c}");
    }
    Ok(())
}
