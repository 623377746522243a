use anyhow::Context;
use clap::Parser;
use feedview::config::Config;
use feedview::endpoints::Endpoints;
use feedview::surface::FrameInfo;
use feedview::{ControlClient, ControllerRef, HttpHealthProbe, HttpMjpegSurface, StatusReport};
use std::path::Path;
use tokio::sync::watch;
use tokio::task::spawn_blocking;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long)]
    config: String,
    #[arg(short, long)]
    logfile: Option<String>,
    /// Start streaming right away instead of waiting for `s`.
    #[arg(short, long)]
    autostart: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if let Some(path) = args.logfile {
        let p = Path::new(&path);
        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let logfile = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(p)
            .with_context(|| format!("failed to open log file {path}"))?;
        let subscriber = tracing_subscriber::fmt::Subscriber::builder()
            .with_writer(logfile)
            .with_env_filter(EnvFilter::from_default_env())
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    }

    let config = Config::load_from_path(&args.config)
        .with_context(|| format!("failed to load {}", args.config))?
        .viewer;
    let endpoints = Endpoints::from_config(&config)?;

    let probe = HttpHealthProbe::new(endpoints.health().clone(), config.request_timeout())?;
    let surface = HttpMjpegSurface::from_config(&config)?;
    let frames = surface.frames();
    let controller = ControllerRef::new(&config, probe, surface)?;
    let control = ControlClient::from_config(&config)?;

    tokio::spawn(print_status(controller.subscribe()));
    tokio::spawn(count_frames(frames));

    if args.autostart {
        controller.start().await?;
    }

    user_loop(&controller, &control).await?;
    controller.shutdown().await?;

    Ok(())
}

async fn user_loop(controller: &ControllerRef, control: &ControlClient) -> anyhow::Result<()> {
    loop {
        println!("(s) start, (x) stop, (c fx fy) click, (i) status, (q) quit");

        let command_task = spawn_blocking(|| {
            let mut input = String::new();
            std::io::stdin().read_line(&mut input).map(|_| input)
        });
        let input = command_task.await??;
        let mut words = input.split_whitespace();

        match words.next() {
            Some("q") | None => {
                return Ok(());
            }
            Some("s") => {
                controller.start().await?;
            }
            Some("x") => {
                controller.stop().await?;
            }
            Some("i") => {
                let report = controller.status().await?;
                println!("{} ({}, retries: {})", report.text, report.css_class, report.retry_count);
            }
            Some("c") => {
                let fx = words.next().and_then(|w| w.parse::<f64>().ok());
                let fy = words.next().and_then(|w| w.parse::<f64>().ok());
                match (fx, fy) {
                    (Some(fx), Some(fy)) => click(control, fx, fy).await,
                    _ => println!("usage: c <fx> <fy>, with fractions between 0 and 1"),
                }
            }
            Some(_) => {
                println!("Unrecognised command");
            }
        }
    }
}

async fn click(control: &ControlClient, fx: f64, fy: f64) {
    let point = control.resolution().map_fraction(fx, fy);
    match control.send_click(point).await {
        Ok(ack) => {
            let message = ack.message.unwrap_or_default();
            println!("click at ({}, {}): {} {}", point.x, point.y, ack.status, message);
        }
        Err(err) => {
            warn!(%err, "click was not delivered");
            println!("click failed: {err}");
        }
    }
}

async fn print_status(mut status: watch::Receiver<StatusReport>) {
    loop {
        {
            let report = status.borrow_and_update();
            println!("[{}] {}", report.css_class, report.text);
        }
        if status.changed().await.is_err() {
            return;
        }
    }
}

async fn count_frames(mut frames: watch::Receiver<Option<FrameInfo>>) {
    while frames.changed().await.is_ok() {
        let latest = *frames.borrow_and_update();
        if let Some(frame) = latest {
            if frame.sequence % 100 == 0 {
                info!(
                    sequence = frame.sequence,
                    len = frame.len,
                    dropped = frame.dropped,
                    dimensions = ?frame.dimensions,
                    "frames received"
                );
            }
        }
    }
}
