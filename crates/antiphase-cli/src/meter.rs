//! Text rendering of the two level meters.

use antiphase_core::{LEVEL_MAX, MeterReading};

/// Characters per bar.
pub const BAR_WIDTH: usize = 20;

/// One bar for a 0–100 level: `[#####---------------]`.
pub fn bar(level: f32, width: usize) -> String {
    let level = if level.is_finite() {
        level.clamp(0.0, LEVEL_MAX)
    } else {
        0.0
    };
    let filled = ((level / LEVEL_MAX) * width as f32).round() as usize;
    let filled = filled.min(width);
    format!("[{}{}]", "#".repeat(filled), "-".repeat(width - filled))
}

/// Both meters on one line.
pub fn meter_line(reading: MeterReading) -> String {
    format!(
        "in {} {:>3.0}  out {} {:>3.0}",
        bar(reading.input, BAR_WIDTH),
        reading.input,
        bar(reading.output, BAR_WIDTH),
        reading.output
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bar_extremes() {
        assert_eq!(bar(0.0, 4), "[----]");
        assert_eq!(bar(100.0, 4), "[####]");
        assert_eq!(bar(250.0, 4), "[####]");
        assert_eq!(bar(f32::NAN, 4), "[----]");
    }

    #[test]
    fn bar_rounds() {
        assert_eq!(bar(50.0, 10), "[#####-----]");
        assert_eq!(bar(14.0, 10), "[#---------]");
    }

    #[test]
    fn line_shows_both_levels() {
        let line = meter_line(MeterReading {
            input: 25.0,
            output: 75.0,
        });
        assert!(line.starts_with("in [#####"));
        assert!(line.contains(" 25"));
        assert!(line.contains("out [###############-----]  75"));
    }
}
