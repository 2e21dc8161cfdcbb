use crate::models::{Rect, WindowInfo};

#[derive(Clone, Debug, PartialEq)]
pub struct Tile {
    pub rect: Rect,
    pub background: (String, String),
    pub label: String,
}

/// Scaled-down overview of every window, drawn by the authority.
#[derive(Clone, Debug, PartialEq)]
pub struct MiniMap {
    pub width: f64,
    pub height: f64,
    pub tiles: Vec<Tile>,
}

/// Lays out one tile per visible window inside their aggregate bounds,
/// scaled by `scale` and padded by `padding` on every side.
pub fn layout(infos: &[WindowInfo], scale: f64, padding: f64) -> Option<MiniMap> {
    let shown: Vec<&WindowInfo> = infos.iter().filter(|w| w.visible).collect();
    let total = shown
        .iter()
        .map(|w| w.rect.bounds())
        .reduce(|a, b| a.union(&b))?;
    let place = |r: &Rect| {
        Rect::new(
            (r.x - total.min.x) * scale + padding,
            (r.y - total.min.y) * scale + padding,
            r.width * scale,
            r.height * scale,
        )
    };
    let tiles = shown
        .into_iter()
        .map(|w| Tile {
            rect: place(&w.rect),
            background: w.background.clone(),
            label: format!("{} × {}", w.rect.width.round(), w.rect.height.round()),
        })
        .collect();
    Some(MiniMap {
        width: total.width() * scale + padding * 2.0,
        height: total.height() * scale + padding * 2.0,
        tiles,
    })
}
