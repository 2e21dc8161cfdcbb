/// Window background for the `i`-th window: a base colour and the same
/// colour darkened by 70%, used as a two stop gradient.
pub fn background(i: usize) -> (String, String) {
    // Fixed categorical palette; cycles by index.
    const PALETTE: [&str; 12] = [
        "#ff5a5f", // red
        "#ff9f1c", // orange
        "#ffd23f", // gold
        "#9bc53d", // yellowgreen
        "#2ec4b6", // teal
        "#3a86ff", // blue
        "#8338ec", // violet
        "#ff006e", // pink
        "#06d6a0", // mint
        "#118ab2", // ocean
        "#ef476f", // rose
        "#c08552", // peru
    ];
    let base = PALETTE[i % PALETTE.len()];
    (base.to_string(), darken(base, 0.7))
}

/// Scales each channel of a `#rrggbb` colour by `1 - amount`. Anything that
/// isn't a six digit hex colour comes back unchanged.
pub fn darken(hex: &str, amount: f64) -> String {
    let Some(digits) = hex.strip_prefix('#').filter(|d| d.len() == 6) else {
        return hex.to_string();
    };
    let Ok(rgb) = u32::from_str_radix(digits, 16) else {
        return hex.to_string();
    };
    let k = (1.0 - amount).clamp(0.0, 1.0);
    let scale = |shift: u32| ((((rgb >> shift) & 0xff) as f64) * k).round() as u32;
    format!("#{:02x}{:02x}{:02x}", scale(16), scale(8), scale(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn darkens_by_seventy_percent() {
        assert_eq!(darken("#ffffff", 0.7), "#4d4d4d");
        assert_eq!(darken("#000000", 0.7), "#000000");
        assert_eq!(darken("red", 0.7), "red");
    }

    #[test]
    fn background_cycles() {
        assert_eq!(background(0), background(12));
        assert_ne!(background(0).0, background(1).0);
        assert_eq!(background(3).1, darken(&background(3).0, 0.7));
    }
}
