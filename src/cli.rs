//! Desktop command line front end.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use pollster::block_on;
use winit::dpi::LogicalSize;
use winit::event_loop::{ControlFlow, EventLoop};
use winit::window::Window;

use crate::app::{print_summary, ViewerApp};
use crate::config::ViewerConfig;
use crate::decoder::IfcDecoder;
use crate::input::InputState;
use crate::loader::ModelLoader;
use crate::render::Renderer;
use crate::viewer::ViewerContext;

const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 720;

/// Runs the viewer with the given command line arguments (without the program name).
pub fn run(args: impl IntoIterator<Item = String>) -> Result<()> {
    let options = CliOptions::parse(args)?;
    let mut config = match &options.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };
    if let Some(offset) = options.offset {
        config.framing_offset = offset;
    }

    if options.summary_only {
        return run_headless(&config, options.paths);
    }
    match run_interactive(&config, options.paths.clone()) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                );
                run_headless(&config, options.paths)
            } else {
                Err(err)
            }
        }
    }
}

fn model_loader(config: &ViewerConfig) -> ModelLoader {
    ModelLoader::new(Arc::new(IfcDecoder::new(config.decoder.clone())))
}

fn run_headless(config: &ViewerConfig, paths: Vec<PathBuf>) -> Result<()> {
    let loader = model_loader(config);
    loader.load_paths(paths);
    loader.wait();

    let mut outcomes = loader.drain();
    outcomes.sort_by_key(|outcome| outcome.sequence);

    let mut viewer = ViewerContext::new(config, WINDOW_WIDTH, WINDOW_HEIGHT);
    let report = viewer.apply_outcomes(outcomes);
    print_summary(&viewer, &report);

    if report.loaded.is_empty() {
        bail!("none of the {} file(s) could be loaded", report.failures.len());
    }
    Ok(())
}

fn run_interactive(config: &ViewerConfig, paths: Vec<PathBuf>) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;

    #[allow(deprecated)]
    let window = Arc::new(
        event_loop
            .create_window(
                Window::default_attributes()
                    .with_title("IFC Viewer")
                    .with_transparent(true)
                    .with_inner_size(LogicalSize::new(WINDOW_WIDTH as f64, WINDOW_HEIGHT as f64)),
            )
            .map_err(|err| WindowInitError::from_error("window", err))?,
    );

    let renderer = block_on(Renderer::new(Arc::clone(&window), config.clear_color))
        .context("failed to initialize renderer")?;
    let size = window.inner_size();
    let viewer = ViewerContext::new(config, size.width, size.height);
    let loader = model_loader(config);
    let input = Arc::new(InputState::new());

    info!("loading {} file(s)", paths.len());
    loader.load_paths(paths);

    let mut app = ViewerApp::new(renderer, viewer, loader, input, config.max_pixel_ratio);
    let mut last_error = None;

    #[allow(deprecated)]
    event_loop
        .run(|event, elwt| {
            elwt.set_control_flow(ControlFlow::Poll);
            if let Err(err) = app.process_event(&event, elwt) {
                last_error = Some(err);
                elwt.exit();
            }
        })
        .context("event loop terminated abnormally")?;

    app.loader().wait();
    print_summary(&app.viewer, app.report());

    if let Some(err) = last_error {
        return Err(err);
    }
    Ok(())
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

const USAGE: &str =
    "Usage: ifc-viewer <model.ifc>... [--config <file.json>] [--offset <n>] [--summary-only]";

#[derive(Debug, PartialEq)]
struct CliOptions {
    paths: Vec<PathBuf>,
    config: Option<PathBuf>,
    offset: Option<f32>,
    summary_only: bool,
}

impl CliOptions {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut args = args.into_iter();
        let mut paths = Vec::new();
        let mut config = None;
        let mut offset = None;
        let mut summary_only = false;
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--summary-only" => summary_only = true,
                "--config" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--config expects a file path"))?;
                    config = Some(PathBuf::from(value));
                }
                "--offset" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--offset expects a number"))?;
                    let parsed: f32 = value
                        .parse()
                        .with_context(|| format!("invalid --offset value {value:?}"))?;
                    if !(parsed.is_finite() && parsed > 0.0) {
                        bail!("--offset must be a positive number, got {value}");
                    }
                    offset = Some(parsed);
                }
                other if other.starts_with("--") => {
                    bail!("Unknown argument: {other}. {USAGE}");
                }
                _ => paths.push(PathBuf::from(arg)),
            }
        }
        if paths.is_empty() {
            bail!("{USAGE}");
        }
        Ok(Self {
            paths,
            config,
            offset,
            summary_only,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions> {
        CliOptions::parse(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn parses_paths_and_flags() {
        let options = parse(&["a.ifc", "--offset", "2", "b.ifc", "--summary-only"]).unwrap();
        assert_eq!(options.paths, vec![PathBuf::from("a.ifc"), PathBuf::from("b.ifc")]);
        assert_eq!(options.offset, Some(2.0));
        assert!(options.summary_only);
        assert_eq!(options.config, None);
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["a.ifc", "--offset", "-1"]).is_err());
        assert!(parse(&["a.ifc", "--offset"]).is_err());
        assert!(parse(&["a.ifc", "--run-scripts"]).is_err());
    }
}
