//! Browser worker bindings
//!
//! The page hands a worker a JSON document and an `OffscreenCanvas`. The
//! worker calls, in order: `setup_logger(callback)`,
//! `create_simulation(json, canvas)`, `log_simulation(sim)` and
//! `run_simulation(sim)`. Messages posted through the callback are objects
//! `{ type, msg }` with `type` one of `log`, `status` or `ratio`.

use std::cell::RefCell;
use std::io;

use js_sys::{Function, Object, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::{Clamped, JsCast};
use web_sys::{ImageData, OffscreenCanvas, OffscreenCanvasRenderingContext2d};

use super::OutputSink;
use crate::error::Error;
use crate::observer::Pgm;
use crate::simulation::{Halt, Simulation};

thread_local! {
    static CALLBACK: RefCell<Option<Function>> = const { RefCell::new(None) };
}

/// Post `{ type: kind, msg }` to the registered callback, if any
fn post(kind: &str, msg: JsValue) {
    CALLBACK.with(|cb| {
        let Some(callback) = cb.borrow().clone() else {
            return;
        };
        let message = Object::new();
        let _ = Reflect::set(&message, &"type".into(), &kind.into());
        let _ = Reflect::set(&message, &"msg".into(), &msg);
        if let Err(e) = callback.call1(&JsValue::NULL, &message) {
            log::warn!("message callback failed: {e:?}");
        }
    });
}

fn js_error(e: JsValue) -> Error {
    Error::Io(io::Error::other(format!("{e:?}")))
}

/// Install the panic hook and console logger, and route status messages to `callback`
#[wasm_bindgen]
pub fn setup_logger(callback: Function) {
    console_error_panic_hook::set_once();
    // a second call only swaps the callback
    let _ = console_log::init_with_level(log::Level::Info);
    CALLBACK.with(|cb| *cb.borrow_mut() = Some(callback));
}

/// Sink painting finished rasters onto an `OffscreenCanvas`
pub struct CanvasSink {
    canvas: OffscreenCanvas,
}

impl CanvasSink {
    pub fn new(canvas: OffscreenCanvas) -> Self {
        Self { canvas }
    }
}

impl OutputSink for CanvasSink {
    fn log(&mut self, line: &str) {
        post("log", line.into());
    }

    fn raster(&mut self, name: &str, image: &Pgm) -> Result<(), Error> {
        let context = self
            .canvas
            .get_context("2d")
            .map_err(js_error)?
            .ok_or_else(|| Error::Io(io::Error::other("canvas has no 2d context")))?
            .dyn_into::<OffscreenCanvasRenderingContext2d>()
            .map_err(|_| Error::Io(io::Error::other("unexpected canvas context type")))?;
        let rgba: Vec<u8> = image
            .pixels
            .iter()
            .flat_map(|&g| [g, g, g, 255])
            .collect();
        let data = ImageData::new_with_u8_clamped_array_and_sh(
            Clamped(rgba.as_slice()),
            image.width,
            image.height,
        )
        .map_err(js_error)?;
        context.put_image_data(&data, 0.0, 0.0).map_err(js_error)?;
        log::info!("painted '{name}' ({}x{})", image.width, image.height);
        Ok(())
    }
}

/// Handle passed back and forth across the worker boundary
#[wasm_bindgen]
pub struct WebSimulation {
    inner: Simulation,
}

/// Load a simulation drawing onto `canvas`
///
/// Rasters are resized to the canvas width; the canvas height follows the
/// aspect ratio of the first raster box and is reported as a `ratio` message.
#[wasm_bindgen(js_name = create_simulation)]
pub fn create_web_simulation(json: &str, canvas: OffscreenCanvas) -> Result<WebSimulation, JsValue> {
    let width = canvas.width().max(1);
    let mut inner = match crate::simulation::create_simulation(json, CanvasSink::new(canvas.clone())) {
        Ok(sim) => sim,
        Err(e) => {
            post("log", format!("error: {e}").into());
            post("status", "error".into());
            return Err(JsValue::from_str(&e.to_string()));
        }
    };
    let ratio = inner.aspect_ratio();
    inner.resize_rasters(width);
    let height = (f64::from(width) * ratio).round().max(1.0);
    canvas.set_height(height as u32);
    post("ratio", JsValue::from_f64(ratio));
    Ok(WebSimulation { inner })
}

#[wasm_bindgen]
pub fn log_simulation(sim: &mut WebSimulation) {
    sim.inner.log_description();
}

#[wasm_bindgen]
pub fn get_canvas_ratio(sim: &WebSimulation) -> f64 {
    sim.inner.aspect_ratio()
}

/// Advance up to `steps` steps; returns true once the run has halted
#[wasm_bindgen]
pub fn step_simulation(sim: &mut WebSimulation, steps: u32) -> bool {
    if sim.inner.halted().is_some() {
        return true;
    }
    for _ in 0..steps {
        if let Some(halt) = sim.inner.step() {
            report(halt, None);
            return true;
        }
    }
    false
}

/// Run to completion, posting the terminal status
#[wasm_bindgen]
pub fn run_simulation(sim: &mut WebSimulation) {
    let result = sim.inner.run();
    report(&result.halt, result.output_error.as_deref());
}

fn report(halt: &Halt, output_error: Option<&str>) {
    if let Some(e) = output_error {
        post("log", format!("output error: {e}").into());
    }
    match halt {
        Halt::Error(e) => {
            post("log", format!("error: {e}").into());
            post("status", "error".into());
        }
        Halt::Cancelled => post("status", "cancelled".into()),
        other => {
            post("log", other.to_string().into());
            post("status", "done".into());
        }
    }
}
