use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::models::Series;

pub const SPARK_WIDTH: u32 = 100;
pub const SPARK_HEIGHT: u32 = 20;

/// Fewer present samples than this and a sparkline is not worth plotting.
const MIN_PRESENT_SAMPLES: usize = 3;

/// Plotting pipeline failure, distinct from "too few samples to plot".
#[derive(Debug)]
pub struct RenderError {
    pub detail: String,
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sparkline rendering failed: {}", self.detail)
    }
}

impl std::error::Error for RenderError {}

/// The seam to the external plotting subprocess. Takes a plot script,
/// returns raster image bytes.
pub trait ChartBackend {
    fn plot(&self, script: &str) -> Result<Vec<u8>, RenderError>;
}

/// What came out of rendering one series. `InsufficientData` is a normal
/// branch that the composer turns into placeholder text; `Failed` aborts
/// the report.
#[derive(Debug, PartialEq)]
pub enum SparkOutcome {
    Rendered(Vec<u8>),
    InsufficientData,
    Failed(RenderError),
}

impl PartialEq for RenderError {
    fn eq(&self, other: &Self) -> bool {
        self.detail == other.detail
    }
}

/// Renders a series to a small PNG. Series with fewer than 3 present
/// samples come back as `InsufficientData` without touching the backend.
#[must_use]
pub fn render(
    series: &Series,
    width: u32,
    height: u32,
    backend: &dyn ChartBackend,
) -> SparkOutcome {
    let Some(script) = plot_script(series, width, height) else {
        return SparkOutcome::InsufficientData;
    };
    match backend.plot(&script) {
        Ok(png) => SparkOutcome::Rendered(png),
        Err(error) => SparkOutcome::Failed(error),
    }
}

/// The gnuplot script for a series, or `None` when there are too few
/// present samples to plot.
#[must_use]
pub fn plot_script(series: &Series, width: u32, height: u32) -> Option<String> {
    let present: Vec<f64> = series.iter().flatten().copied().collect();
    if present.len() < MIN_PRESENT_SAMPLES {
        return None;
    }
    let (ymin, ymax) = vertical_range(&present);

    // Absent samples become blank data lines so the line breaks instead of
    // interpolating across the gap; the x range still spans the full
    // window so the timeline never compresses.
    let data_lines: Vec<String> = series
        .iter()
        .enumerate()
        .map(|(index, sample)| match sample {
            Some(value) => format!("{} {value}", index + 1),
            None => String::new(),
        })
        .collect();

    Some(format!(
        "unset border\n\
         unset xtics\n\
         unset ytics\n\
         unset key\n\
         set lmargin 0\n\
         set rmargin 0\n\
         set tmargin 0\n\
         set bmargin 0\n\
         set yrange [{ymin}:{ymax}]\n\
         set xrange [1:{xmax}]\n\
         set terminal pngcairo size {width},{height}\n\
         plot \"-\" using 1:2 notitle with lines linetype rgb \"black\"\n\
         {data}\n\
         e\n",
        xmax = series.len(),
        data = data_lines.join("\n"),
    ))
}

/// Vertical plot range: padded 5% above the maximum and clamped just below
/// zero, so a uniformly large series still shows its distance from zero.
#[must_use]
pub fn vertical_range(present: &[f64]) -> (f64, f64) {
    let max = present.iter().copied().fold(f64::MIN, f64::max);
    (-0.05 * max, 1.05 * max)
}

/// Pipes the script to a local `gnuplot` and reads PNG bytes from stdout.
#[derive(Debug, Clone)]
pub struct GnuplotBackend {
    program: PathBuf,
}

impl Default for GnuplotBackend {
    fn default() -> Self {
        Self {
            program: PathBuf::from("gnuplot"),
        }
    }
}

impl GnuplotBackend {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl ChartBackend for GnuplotBackend {
    fn plot(&self, script: &str) -> Result<Vec<u8>, RenderError> {
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|error| RenderError {
                detail: format!("cannot spawn {} ({error})", self.program.display()),
            })?;

        // Feed stdin from a helper thread while this thread drains stdout
        // and stderr; writing everything first can deadlock once both pipe
        // buffers fill. A failed write surfaces through the exit status.
        let mut stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            if let Some(mut stdin) = stdin.take() {
                scope.spawn(move || {
                    let _ = stdin.write_all(script.as_bytes());
                });
            }
            child.wait_with_output()
        })
        .map_err(|error| RenderError {
            detail: format!("plot subprocess did not finish ({error})"),
        })?;
        if !output.status.success() {
            return Err(RenderError {
                detail: format!(
                    "plot subprocess exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        if output.stdout.is_empty() {
            return Err(RenderError {
                detail: "plot subprocess produced no image bytes".to_string(),
            });
        }
        Ok(output.stdout)
    }
}
