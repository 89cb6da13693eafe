// File: src/game.rs
//
// The host 2D drawing + input contract (§6): `fill_color`, `fill_color_css`,
// `draw_rect`, `draw_text`, `set_font_size`, `set_font_family`,
// `set_font_style`, `clear`, `is_key_pressed`. A concrete host implements
// `GameLibrary`; this module wraps it into a `"game"` library Env the way
// `library.rs` wraps any other set of native bindings.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::interpreter::{Env, Value};
use crate::library::Library;

/// The drawing surface + input source a host embeds into the VM. Coordinates
/// and sizes are numbers; key codes are strings matching the host's
/// keyboard-event codes (§6).
pub trait GameLibrary {
    fn fill_color(&mut self, r: f64, g: f64, b: f64);
    fn fill_color_css(&mut self, css: &str);
    fn draw_rect(&mut self, x: f64, y: f64, w: f64, h: f64);
    fn draw_text(&mut self, x: f64, y: f64, text: &str);
    fn set_font_size(&mut self, size: f64);
    fn set_font_family(&mut self, family: &str);
    fn set_font_style(&mut self, style: &str);
    fn clear(&mut self);
    fn is_key_pressed(&self, code: &str) -> bool;
}

/// Headless implementation used by the CLI `run` subcommand, demos, and
/// tests: draws nothing, logs nothing, no key is ever pressed. A real
/// windowed renderer is out of scope for this crate and is supplied by an
/// embedder.
#[derive(Default)]
pub struct NullGameLibrary {
    pressed: HashMap<String, bool>,
}

impl NullGameLibrary {
    pub fn new() -> Self {
        NullGameLibrary::default()
    }

    pub fn press(&mut self, code: impl Into<String>) {
        self.pressed.insert(code.into(), true);
    }

    pub fn release(&mut self, code: &str) {
        self.pressed.remove(code);
    }
}

impl GameLibrary for NullGameLibrary {
    fn fill_color(&mut self, _r: f64, _g: f64, _b: f64) {}
    fn fill_color_css(&mut self, _css: &str) {}
    fn draw_rect(&mut self, _x: f64, _y: f64, _w: f64, _h: f64) {}
    fn draw_text(&mut self, _x: f64, _y: f64, _text: &str) {}
    fn set_font_size(&mut self, _size: f64) {}
    fn set_font_family(&mut self, _family: &str) {}
    fn set_font_style(&mut self, _style: &str) {}
    fn clear(&mut self) {}
    fn is_key_pressed(&self, code: &str) -> bool {
        self.pressed.get(code).copied().unwrap_or(false)
    }
}

fn number(args: &[Value], i: usize) -> Option<f64> {
    match args.get(i) {
        Some(Value::Number(n)) => Some(*n),
        _ => None,
    }
}

fn string(args: &[Value], i: usize) -> Option<Rc<String>> {
    match args.get(i) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Builds the `"game"` library Env around a shared host. `host` is shared
/// with whatever is driving ticks (the driver only ever calls `update`/
/// `draw`, both of which live in user bytecode and reach the surface through
/// these natives), so it is `Rc<RefCell<_>>` rather than owned outright.
pub fn build(host: Rc<RefCell<dyn GameLibrary>>) -> Env {
    let h = host.clone();
    let lib = Library::new("game")
        .native("fill_color", 3, {
            let h = h.clone();
            move |args| match (number(args, 0), number(args, 1), number(args, 2)) {
                (Some(r), Some(g), Some(b)) => {
                    h.borrow_mut().fill_color(r, g, b);
                    Value::Undefined
                }
                _ => Value::error("fill_color expects three numbers"),
            }
        })
        .native("fill_color_css", 1, {
            let h = h.clone();
            move |args| match string(args, 0) {
                Some(css) => {
                    h.borrow_mut().fill_color_css(&css);
                    Value::Undefined
                }
                None => Value::error("fill_color_css expects a string"),
            }
        })
        .native("draw_rect", 4, {
            let h = h.clone();
            move |args| match (number(args, 0), number(args, 1), number(args, 2), number(args, 3)) {
                (Some(x), Some(y), Some(w), Some(height)) => {
                    h.borrow_mut().draw_rect(x, y, w, height);
                    Value::Undefined
                }
                _ => Value::error("draw_rect expects four numbers"),
            }
        })
        .native("draw_text", 3, {
            let h = h.clone();
            move |args| match (number(args, 0), number(args, 1), string(args, 2)) {
                (Some(x), Some(y), Some(text)) => {
                    h.borrow_mut().draw_text(x, y, &text);
                    Value::Undefined
                }
                _ => Value::error("draw_text expects (number, number, string)"),
            }
        })
        .native("set_font_size", 1, {
            let h = h.clone();
            move |args| match number(args, 0) {
                Some(n) => {
                    h.borrow_mut().set_font_size(n);
                    Value::Undefined
                }
                None => Value::error("set_font_size expects a number"),
            }
        })
        .native("set_font_family", 1, {
            let h = h.clone();
            move |args| match string(args, 0) {
                Some(family) => {
                    h.borrow_mut().set_font_family(&family);
                    Value::Undefined
                }
                None => Value::error("set_font_family expects a string"),
            }
        })
        .native("set_font_style", 1, {
            let h = h.clone();
            move |args| match string(args, 0) {
                Some(style) => {
                    h.borrow_mut().set_font_style(&style);
                    Value::Undefined
                }
                None => Value::error("set_font_style expects a string"),
            }
        })
        .native("clear", 0, {
            let h = h.clone();
            move |_args| {
                h.borrow_mut().clear();
                Value::Undefined
            }
        })
        .native("is_key_pressed", 1, move |args| match string(args, 0) {
            Some(code) => Value::Bool(h.borrow().is_key_pressed(&code)),
            None => Value::error("is_key_pressed expects a string"),
        });

    let (_, env) = lib.build();
    env
}
