use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use ndarray::Array3;
use num_traits::cast::ToPrimitive;
use paf_pose::{Engine, EngineConfig, FrameGeometry, NetworkOutput, Skeleton, Timing};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use structopt::StructOpt;
use tracing::{info, trace};
use tracing_subscriber::layer::SubscriberExt;

/// A row-major `(height, width, channel)` tensor.
#[derive(Deserialize)]
struct Tensor {
    shape: [usize; 3],
    data: Vec<f32>,
}

impl Tensor {
    fn into_array(self) -> Result<Array3<f32>> {
        let shape = self.shape;
        let [height, width, channels] = shape;
        Array3::from_shape_vec((height, width, channels), self.data)
            .with_context(|| format!("tensor data does not match shape {:?}", shape))
    }
}

/// One frame of recorded network output.
#[derive(Deserialize)]
struct FrameDump {
    frame_width: u16,
    frame_height: u16,
    heatmaps: Tensor,
    pafs: Tensor,
}

#[derive(Serialize)]
struct BoxRecord {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

#[derive(Serialize)]
struct SkeletonRecord {
    id: Option<u64>,
    confidence: f32,
    bbox: BoxRecord,
    keypoints: Vec<Option<[f32; 2]>>,
}

impl From<&Skeleton> for SkeletonRecord {
    fn from(skeleton: &Skeleton) -> Self {
        let bbox = skeleton.bbox();
        Self {
            id: skeleton.id(),
            confidence: skeleton.confidence(),
            bbox: BoxRecord {
                x: bbox.x,
                y: bbox.y,
                width: bbox.width,
                height: bbox.height,
            },
            keypoints: skeleton
                .keypoints()
                .iter()
                .map(|keypoint| keypoint.map(|point| [point.x(), point.y()]))
                .collect(),
        }
    }
}

#[derive(Serialize)]
struct FrameRecord {
    frame: usize,
    skeletons: Vec<SkeletonRecord>,
}

#[derive(structopt::StructOpt)]
struct Opt {
    /// JSON lines file of recorded network outputs, one frame per line; stdin if omitted.
    input: Option<PathBuf>,

    /// The height of the image the network expects.
    #[structopt(short = "H", long, default_value = "256")]
    net_input_height: u16,

    /// Network output stride in input pixels.
    #[structopt(long, default_value = "8")]
    stride: u8,

    /// Factor by which the network output was upsampled before decoding.
    #[structopt(long, default_value = "4")]
    upsample_ratio: u8,

    #[structopt(short, long, default_value = "info", env = "RUST_LOG")]
    log_level: tracing_subscriber::filter::EnvFilter,

    #[structopt(short, long)]
    show_progress: bool,

    #[structopt(flatten)]
    engine: EngineConfig,
}

fn fps_text(timing: Timing, nframes: usize) -> Result<String> {
    let nframes = nframes
        .to_f64()
        .context("failed to convert frame count to f64")?;
    Ok(format!(
        "FPS => extract: {:.1}, group: {:.1}, track: {:.1}",
        nframes / timing.extraction.as_secs_f64(),
        nframes / timing.grouping.as_secs_f64(),
        nframes / timing.tracking.as_secs_f64(),
    ))
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    // stdout carries the records, so logs go to stderr
    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .with(opt.log_level),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let running_ctrl_c = running.clone();

    ctrlc::set_handler(move || {
        running_ctrl_c.store(false, Ordering::SeqCst);
    })
    .context("failed setting Ctrl-C handler")?;

    let reader: Box<dyn BufRead> = match &opt.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());

    let mut engine = Engine::new(opt.engine).context("failed constructing engine")?;

    let pb_fps = if opt.show_progress {
        Some(
            ProgressBar::new_spinner().with_style(
                ProgressStyle::default_spinner()
                    .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
                    .template("{prefix:.bold.dim} {spinner} {wide_msg}"),
            ),
        )
    } else {
        None
    };

    for (line_num, line) in reader.lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            info!(message = "interrupted", frames = engine.frame_num());
            break;
        }

        let line = line.context("failed reading input line")?;
        if line.trim().is_empty() {
            continue;
        }

        let dump: FrameDump = serde_json::from_str(&line)
            .with_context(|| format!("failed parsing frame on line {}", line_num + 1))?;
        let geometry = FrameGeometry::for_frame(
            dump.frame_width,
            dump.frame_height,
            opt.net_input_height,
            opt.stride,
            opt.upsample_ratio,
        )
        .context("invalid frame geometry")?;
        let output = NetworkOutput::new(dump.heatmaps.into_array()?, dump.pafs.into_array()?)
            .with_context(|| format!("invalid network output on line {}", line_num + 1))?;

        let frame = engine.frame_num();
        let skeletons = engine
            .detect_poses(&output, &geometry)
            .with_context(|| format!("failed detecting poses in frame {}", frame))?;
        trace!(frame, skeletons = skeletons.len());

        let record = FrameRecord {
            frame,
            skeletons: skeletons.iter().map(SkeletonRecord::from).collect(),
        };
        serde_json::to_writer(&mut writer, &record).context("failed writing frame record")?;
        writeln!(writer).context("failed writing frame record")?;

        if let Some(pb_fps) = pb_fps.as_ref() {
            pb_fps.set_message(fps_text(engine.timing(), engine.frame_num())?);
            pb_fps.inc(1);
        }
    }
    writer.flush().context("failed flushing output")?;

    if let Some(pb_fps) = pb_fps {
        pb_fps.finish_and_clear();
    }
    info!(
        message = "done",
        frames = engine.frame_num(),
        fps = %fps_text(engine.timing(), engine.frame_num())?
    );
    Ok(())
}
