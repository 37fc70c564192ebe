//! Time-binned query-density rendering.
//!
//! An unbounded entry stream collapses into `width` per-column counters over
//! a fixed epoch-second window. Rendering normalizes by the single largest
//! column count seen and paints one grayscale column per pixel of width, so
//! memory stays O(width) no matter how long the stream runs.

use crate::Result;
use crate::log::Entry;

use anyhow::{Context, bail};
use std::io::Write;

pub struct HeatmapAccumulator {
    window_start: i64,
    width: u32,
    height: u32,
    pixel_scale: f64,
    columns: Vec<u64>,
    max_value: u64,
}

impl HeatmapAccumulator {
    /// `start`/`end` bound the window in epoch seconds; both image
    /// dimensions must be positive.
    pub fn new(start: i64, end: i64, width: u32, height: u32) -> Result<HeatmapAccumulator> {
        if end <= start {
            bail!("window end {} must be after window start {}", end, start);
        }
        if width == 0 || height == 0 {
            bail!("image dimensions must be positive, got {}x{}", width, height);
        }
        Ok(HeatmapAccumulator {
            window_start: start,
            width,
            height,
            pixel_scale: f64::from(width) / (end - start) as f64,
            columns: vec![0; width as usize],
            max_value: 0,
        })
    }

    /// Bin one entry over `[start, end]`; a missing `end` degenerates to a
    /// single-point interval.
    ///
    /// The unconditional increment after the loop lands one column past the
    /// interval (and guarantees the last column is hit by intervals reaching
    /// the window edge). That is historical behavior existing consumers may
    /// rely on; keep it. Increments outside the strip are discarded.
    pub fn put(&mut self, entry: &Entry) {
        let from = entry.start as f64;
        let to = entry.end.unwrap_or(from);

        let x_to = self.column_of(to);
        if x_to < 0 {
            // The whole interval lies left of the window; only the trailing
            // increment can touch the strip.
            self.bump(x_to + 1);
            return;
        }

        let mut x = self.column_of(from).max(0);
        let last = i64::from(self.width) - 1;
        while x <= x_to && x < last {
            self.bump(x);
            x += 1;
        }
        self.bump(x);
    }

    fn column_of(&self, second: f64) -> i64 {
        ((second - self.window_start as f64) * self.pixel_scale).floor() as i64
    }

    fn bump(&mut self, x: i64) {
        if x < 0 || x >= i64::from(self.width) {
            return;
        }
        let column = &mut self.columns[x as usize];
        *column += 1;
        if *column > self.max_value {
            self.max_value = *column;
        }
    }

    /// Finish accumulation and paint the strip. Consuming `self` makes the
    /// render terminal. With no observed entries the strip comes out blank
    /// instead of dividing by zero.
    pub fn render(self) -> Raster {
        if self.max_value == 0 {
            tracing::warn!("no entries fell into the window; rendering a blank strip");
        }
        let row: Vec<u8> = self
            .columns
            .iter()
            .map(|&count| self.intensity(count))
            .collect();
        let mut pixels = Vec::with_capacity(row.len() * self.height as usize);
        for _ in 0..self.height {
            pixels.extend_from_slice(&row);
        }
        Raster {
            width: self.width,
            height: self.height,
            pixels,
        }
    }

    /// 0 is maximum density (black), 255 is empty (white).
    fn intensity(&self, count: u64) -> u8 {
        if self.max_value == 0 {
            return 255;
        }
        (255.0 - (count as f64) * 255.0 / (self.max_value as f64)).ceil() as u8
    }
}

/// An 8-bit grayscale image, rows top to bottom.
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Raster {
    /// Encode as a grayscale PNG.
    pub fn encode_png<W: Write>(&self, out: W) -> Result<()> {
        let mut encoder = png::Encoder::new(out, self.width, self.height);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().context("write image header")?;
        writer
            .write_image_data(&self.pixels)
            .context("write image data")?;
        writer.finish().context("finish image")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Params;
    use pretty_assertions::assert_eq;

    fn entry(start: i64, end: Option<f64>) -> Entry {
        Entry {
            start,
            end,
            command: None,
            table: None,
            params: Params::default(),
        }
    }

    fn accumulator() -> HeatmapAccumulator {
        // One-second columns: window [0, 10), 10 pixels wide.
        HeatmapAccumulator::new(0, 10, 10, 1).unwrap()
    }

    #[test]
    fn rejects_degenerate_windows_and_dimensions() {
        assert!(HeatmapAccumulator::new(10, 10, 4, 4).is_err());
        assert!(HeatmapAccumulator::new(10, 5, 4, 4).is_err());
        assert!(HeatmapAccumulator::new(0, 10, 0, 4).is_err());
        assert!(HeatmapAccumulator::new(0, 10, 4, 0).is_err());
    }

    #[test]
    fn point_entry_bumps_its_column_and_the_next() {
        let mut acc = accumulator();
        acc.put(&entry(2, None));
        assert_eq!(acc.columns, vec![0, 0, 1, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(acc.max_value, 1);
    }

    #[test]
    fn interval_covers_columns_plus_trailing_bump() {
        let mut acc = accumulator();
        acc.put(&entry(0, Some(3.0)));
        assert_eq!(acc.columns, vec![1, 1, 1, 1, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn full_window_interval_hits_every_column_once() {
        let mut acc = accumulator();
        acc.put(&entry(0, Some(10.0)));
        assert_eq!(acc.columns, vec![1; 10]);
        assert_eq!(acc.max_value, 1);
    }

    #[test]
    fn column_sum_and_max_match_the_binning_rule() {
        let mut acc = accumulator();
        acc.put(&entry(0, Some(3.0))); // columns 0..=4
        acc.put(&entry(2, None)); // columns 2, 3
        acc.put(&entry(5, Some(9.0))); // columns 5..=9
        assert_eq!(acc.columns, vec![1, 1, 2, 2, 1, 1, 1, 1, 1, 1]);
        let total: u64 = acc.columns.iter().sum();
        assert_eq!(total, 12);
        assert_eq!(acc.max_value, *acc.columns.iter().max().unwrap());
    }

    #[test]
    fn out_of_window_entries_never_panic() {
        let mut acc = accumulator();
        acc.put(&entry(-100, Some(-50.0)));
        acc.put(&entry(50, Some(60.0)));
        assert_eq!(acc.columns, vec![0; 10]);
        // An interval ending right at the left edge still trails into
        // column 0, as the binning rule dictates.
        acc.put(&entry(-5, Some(-1.0)));
        assert_eq!(acc.columns[0], 1);
    }

    #[test]
    fn interval_straddling_the_left_edge_is_clipped() {
        let mut acc = accumulator();
        acc.put(&entry(-2, Some(2.0)));
        // Columns 0..=2 from the clipped interval, 3 from the trailing bump.
        assert_eq!(acc.columns, vec![1, 1, 1, 1, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn render_normalizes_by_the_max_column() {
        let mut acc = HeatmapAccumulator::new(0, 4, 4, 2).unwrap();
        acc.put(&entry(0, None)); // columns 0, 1
        acc.put(&entry(1, None)); // columns 1, 2
        let raster = acc.render();
        // counts [1, 2, 1, 0] -> ceil(255 - c*255/2) = [128, 0, 128, 255]
        assert_eq!(raster.width, 4);
        assert_eq!(raster.height, 2);
        assert_eq!(raster.pixels, vec![128, 0, 128, 255, 128, 0, 128, 255]);
    }

    #[test]
    fn zero_entries_render_a_blank_strip() {
        let raster = HeatmapAccumulator::new(0, 10, 3, 2).unwrap().render();
        assert_eq!(raster.pixels, vec![255; 6]);
    }

    #[test]
    fn png_output_carries_the_magic_bytes() {
        let raster = HeatmapAccumulator::new(0, 10, 3, 2).unwrap().render();
        let mut buf = Vec::new();
        raster.encode_png(&mut buf).unwrap();
        assert_eq!(&buf[..8], b"\x89PNG\r\n\x1a\n");
    }
}
