use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::Context;

use crate::captions::{CaptionCue, CaptionPosition, CaptionStyle, parse_hex_color};

const WRAP_COLUMNS: usize = 80;
const MARGIN_V: u32 = 40;

pub fn write_srt(path: &Path, cues: &[CaptionCue]) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut f = BufWriter::new(file);
    for (i, cue) in cues.iter().enumerate() {
        writeln!(f, "{}", i + 1)?;
        writeln!(f, "{} --> {}", format_srt_time(cue.start), format_srt_time(cue.end))?;
        for line in wrap_text(&cue.text, WRAP_COLUMNS) {
            writeln!(f, "{}", line)?;
        }
        writeln!(f)?;
    }
    f.flush()?;
    Ok(())
}

pub fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

pub fn wrap_text(s: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in s.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// ASS colour `&HAABBGGRR`; `opacity` 1.0 is fully opaque.
pub fn ass_color(hex: &str, opacity: f64) -> String {
    let (r, g, b) = parse_hex_color(hex).unwrap_or((255, 255, 255));
    let alpha = ((1.0 - opacity.clamp(0.0, 1.0)) * 255.0).round() as u8;
    format!("&H{:02X}{:02X}{:02X}{:02X}", alpha, b, g, r)
}

/// Numpad alignment used by ASS.
fn alignment(position: CaptionPosition) -> u8 {
    match position {
        CaptionPosition::Bottom => 2,
        CaptionPosition::Center => 5,
        CaptionPosition::Top => 8,
    }
}

/// `force_style` value for ffmpeg's `subtitles` filter.
pub fn force_style(style: &CaptionStyle) -> String {
    format!(
        "FontName={},Fontsize={},PrimaryColour={},OutlineColour={},BackColour={},BorderStyle=3,Outline=1,Shadow=0,Alignment={},MarginV={}",
        style.font.replace([',', '\''], ""),
        style.font_size,
        ass_color(&style.color, 1.0),
        ass_color(&style.background_color, style.background_opacity),
        ass_color(&style.background_color, style.background_opacity),
        alignment(style.position),
        MARGIN_V
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srt_time_format() {
        assert_eq!(format_srt_time(0.0), "00:00:00,000");
        assert_eq!(format_srt_time(3.2506), "00:00:03,251");
        assert_eq!(format_srt_time(3723.5), "01:02:03,500");
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap_text("one two three four", 9);
        assert_eq!(lines, vec!["one two", "three", "four"]);
        assert!(wrap_text("   ", 10).is_empty());
    }

    #[test]
    fn writes_numbered_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subs.srt");
        let cues = vec![
            CaptionCue { text: "First line.".into(), start: 0.0, end: 2.0 },
            CaptionCue { text: "Second line.".into(), start: 2.0, end: 4.5 },
        ];
        write_srt(&path, &cues).unwrap();
        let srt = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:02,000\nFirst line.\n\n2\n00:00:02,000 --> 00:00:04,500\nSecond line.\n\n"
        );
    }

    #[test]
    fn ass_colours_are_bgr_with_inverted_alpha() {
        assert_eq!(ass_color("#ff8000", 1.0), "&H000080FF");
        assert_eq!(ass_color("#000000", 0.0), "&HFF000000");
    }

    #[test]
    fn force_style_reflects_position() {
        let style = CaptionStyle { position: CaptionPosition::Top, ..CaptionStyle::default() };
        let forced = force_style(&style);
        assert!(forced.contains("Alignment=8"));
        assert!(forced.contains("Fontsize=24"));
        assert!(forced.contains("FontName=Arial"));
        assert!(forced.contains("BackColour=&H4D000000"));
    }
}
