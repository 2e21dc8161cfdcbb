use std::f64::consts::TAU;

use panes_core::minimap::MiniMap;
use panes_core::{BodyLabel, BodyState, Point, palette};
use wasm_bindgen::prelude::*;
use web_sys::CanvasRenderingContext2d;

// Non-deprecated helpers to set canvas styles via property assignment.
pub fn set_fill_style(ctx: &CanvasRenderingContext2d, style: &JsValue) {
    let _ = js_sys::Reflect::set(ctx.as_ref(), &JsValue::from_str("fillStyle"), style);
}

pub fn set_stroke_style(ctx: &CanvasRenderingContext2d, color: &str) {
    let _ = js_sys::Reflect::set(
        ctx.as_ref(),
        &JsValue::from_str("strokeStyle"),
        &JsValue::from_str(color),
    );
}

fn fill_gradient(
    ctx: &CanvasRenderingContext2d,
    (x, y, w, h): (f64, f64, f64, f64),
    (from, to): &(String, String),
) {
    let g = ctx.create_linear_gradient(x, y, x + w, y + h);
    let _ = g.add_color_stop(0.0, from);
    let _ = g.add_color_stop(1.0, to);
    set_fill_style(ctx, g.as_ref());
    ctx.fill_rect(x, y, w, h);
}

/// Window background gradient.
pub fn draw_background(ctx: &CanvasRenderingContext2d, w: f64, h: f64, colors: &(String, String)) {
    fill_gradient(ctx, (0.0, 0.0, w, h), colors);
}

/// Draws one body; `origin` is this window's top-left in screen space.
pub fn draw_body(ctx: &CanvasRenderingContext2d, body: &BodyState, origin: Point) {
    let local = |p: Point| p - origin;
    ctx.begin_path();
    match body.radius {
        Some(r) => {
            let c = local(body.position);
            let _ = ctx.arc(c.x, c.y, r, 0.0, TAU);
            // Spoke so rotation is visible.
            let rim = c + Point::new(r, 0.0).rotate(body.angle);
            ctx.move_to(c.x, c.y);
            ctx.line_to(rim.x, rim.y);
        }
        None => {
            let Some((first, rest)) = body.vertices.split_first() else {
                return;
            };
            let p = local(*first);
            ctx.move_to(p.x, p.y);
            for v in rest {
                let p = local(*v);
                ctx.line_to(p.x, p.y);
            }
            ctx.close_path();
        }
    }
    if body.label == BodyLabel::Border {
        set_fill_style(ctx, &JsValue::from_str("rgba(255,255,255,0.15)"));
        ctx.fill();
        set_stroke_style(ctx, "#ff0");
    } else {
        let color = palette::background((body.id.as_u128() % 64) as usize).0;
        set_fill_style(ctx, &JsValue::from_str(&color));
        ctx.fill();
        set_stroke_style(ctx, "#222");
    }
    ctx.set_line_width(1.5);
    ctx.stroke();
}

/// Overview of every window in the top-left corner.
pub fn draw_minimap(ctx: &CanvasRenderingContext2d, map: &MiniMap) {
    set_fill_style(ctx, &JsValue::from_str("rgba(0,0,0,0.5)"));
    ctx.fill_rect(0.0, 0.0, map.width, map.height);
    ctx.set_font("10px sans-serif");
    ctx.set_text_align("center");
    ctx.set_text_baseline("middle");
    for tile in &map.tiles {
        let r = tile.rect;
        fill_gradient(ctx, (r.x, r.y, r.width, r.height), &tile.background);
        set_stroke_style(ctx, "#fff");
        ctx.set_line_width(1.0);
        ctx.stroke_rect(r.x, r.y, r.width, r.height);
        set_fill_style(ctx, &JsValue::from_str("#fff"));
        let _ = ctx.fill_text(&tile.label, r.x + r.width / 2.0, r.y + r.height / 2.0);
    }
}

/// Shown while this window is the only one open.
pub fn draw_hint(ctx: &CanvasRenderingContext2d, w: f64, h: f64) {
    let size = (w.min(h) / 24.0).clamp(12.0, 28.0);
    ctx.set_font(&format!("bold {}px sans-serif", size));
    ctx.set_text_align("center");
    ctx.set_text_baseline("middle");
    ctx.set_line_width((size / 5.0).clamp(2.0, 5.0));
    set_stroke_style(ctx, "#000");
    let lines = [
        "Open this page in another window and move them together",
        "Middle click spawns a ball, drag with the left button",
    ];
    for (i, line) in lines.iter().enumerate() {
        let y = h / 2.0 + (i as f64 - 0.5) * size * 1.6;
        let _ = ctx.stroke_text(line, w / 2.0, y);
        set_fill_style(ctx, &JsValue::from_str("#fff"));
        let _ = ctx.fill_text(line, w / 2.0, y);
    }
}
