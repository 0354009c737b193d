#![cfg(target_arch = "wasm32")]

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use gloo_events::EventListener;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{window, HtmlCanvasElement, HtmlInputElement};
use winit::dpi::LogicalSize;
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::web::{EventLoopExtWebSys, WindowAttributesExtWebSys};
use winit::window::Window;

use crate::app::ViewerApp;
use crate::config::ViewerConfig;
use crate::decoder::IfcDecoder;
use crate::input::InputState;
use crate::loader::ModelLoader;
use crate::render::Renderer;
use crate::viewer::ViewerContext;

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

/// Starts the viewer on the canvas `canvas_id`; files picked in the
/// `<input type="file">` element `file_input_id` are loaded into the scene.
///
/// `on_failure`, when given, is called as `on_failure(name, message)` for
/// every file that cannot be loaded.
#[wasm_bindgen]
pub async fn run(
    canvas_id: String,
    file_input_id: String,
    on_failure: Option<js_sys::Function>,
) -> Result<(), JsValue> {
    start(&canvas_id, &file_input_id, on_failure)
        .await
        .map_err(|err| JsValue::from_str(&format!("{err:#}")))
}

async fn start(canvas_id: &str, file_input_id: &str, on_failure: Option<js_sys::Function>) -> Result<()> {
    let document = window()
        .and_then(|win| win.document())
        .ok_or_else(|| anyhow!("document not available"))?;
    let canvas: HtmlCanvasElement = document
        .get_element_by_id(canvas_id)
        .ok_or_else(|| anyhow!("canvas element {canvas_id:?} not found"))?
        .dyn_into()
        .map_err(|_| anyhow!("element {canvas_id:?} is not a canvas"))?;
    let file_input: HtmlInputElement = document
        .get_element_by_id(file_input_id)
        .ok_or_else(|| anyhow!("file input {file_input_id:?} not found"))?
        .dyn_into()
        .map_err(|_| anyhow!("element {file_input_id:?} is not an input"))?;

    let config = ViewerConfig::default();
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    #[allow(deprecated)]
    let window = Arc::new(
        event_loop
            .create_window(
                Window::default_attributes()
                    .with_canvas(Some(canvas.clone()))
                    .with_prevent_default(true)
                    .with_transparent(true),
            )
            .context("failed to create window")?,
    );
    fit_to_container(&window, &canvas);

    let renderer = Renderer::new(Arc::clone(&window), config.clear_color).await?;
    let size = window.inner_size();
    let viewer = ViewerContext::new(&config, size.width, size.height);
    let loader = ModelLoader::new(Arc::new(IfcDecoder::new(config.decoder.clone())));
    let input = Arc::new(InputState::new());

    let listeners = vec![
        file_listener(&file_input, loader.clone()),
        resize_listener(Arc::clone(&window), canvas)?,
    ];

    let mut app = ViewerApp::new(renderer, viewer, loader, input, config.max_pixel_ratio);
    if let Some(callback) = on_failure {
        app.on_load_failure(move |failure| {
            let name = JsValue::from_str(&failure.name);
            let message = JsValue::from_str(&failure.error);
            if let Err(err) = callback.call2(&JsValue::NULL, &name, &message) {
                log::warn!("load failure callback threw: {err:?}");
            }
        });
    }

    #[allow(deprecated)]
    event_loop.spawn(move |event, elwt| {
        let _keep_alive = &listeners;
        elwt.set_control_flow(ControlFlow::Poll);
        if let Err(err) = app.process_event(&event, elwt) {
            log::error!("viewer stopped: {err:?}");
            elwt.exit();
        }
    });

    Ok(())
}

fn file_listener(input: &HtmlInputElement, loader: ModelLoader) -> EventListener {
    let element = input.clone();
    EventListener::new(input, "change", move |_| {
        let Some(files) = element.files() else {
            return;
        };
        log::info!("loading {} selected file(s)", files.length());
        loader.load_web_files(&files);
        element.set_value("");
    })
}

fn resize_listener(window: Arc<Window>, canvas: HtmlCanvasElement) -> Result<EventListener> {
    let browser = web_sys::window().ok_or_else(|| anyhow!("window not available"))?;
    Ok(EventListener::new(&browser, "resize", move |_| {
        fit_to_container(&window, &canvas);
    }))
}

/// Sizes the canvas to the element that contains it.
fn fit_to_container(window: &Window, canvas: &HtmlCanvasElement) {
    let Some(container) = canvas.parent_element() else {
        return;
    };
    let (width, height) = (container.client_width(), container.client_height());
    if width <= 0 || height <= 0 {
        return;
    }
    let _ = window.request_inner_size(LogicalSize::new(width as f64, height as f64));
}
