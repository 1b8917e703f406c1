use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use fbtap_core::{
    BufferObject, CaptureConfig, DeviceId, FramebufferDescriptor, FramebufferId, PixelFormat,
};
use fbtap_extract::memory::MemoryObject;
use fbtap_session::CaptureSession;
use serde::Deserialize;
use tracing::{info, warn};

pub const DEFAULT_CHUNK: usize = 64 * 1024;

pub struct Options {
    pub manifest: PathBuf,
    pub config: Option<PathBuf>,
    pub raw_out: Option<PathBuf>,
    pub chunk: usize,
    pub json: bool,
}

// MARK: - Manifest

/// How a dumped frame is exposed to the extractor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backing {
    /// System-memory pages.
    #[default]
    Pages,
    /// Memory imported from another device.
    Foreign,
}

/// One trigger event: a framebuffer and the file holding its raw bytes.
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    #[serde(default)]
    pub device: u64,
    #[serde(default)]
    pub framebuffer: u64,
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_format")]
    pub format: PixelFormat,
    pub pitch: u32,
    #[serde(default)]
    pub modifier: Option<u64>,
    #[serde(default)]
    pub backing: Backing,
    #[serde(default, alias = "ioMemory")]
    pub io_memory: bool,
    /// Raw buffer contents, relative to the manifest's directory.
    pub path: PathBuf,
}

fn default_format() -> PixelFormat {
    PixelFormat::XRGB8888
}

#[derive(Debug, Clone, Deserialize)]
pub struct Manifest {
    pub frames: Vec<Frame>,
}

impl Manifest {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("invalid manifest")
    }
}

impl Frame {
    fn object(&self, data: Vec<u8>) -> MemoryObject {
        match (self.backing, self.io_memory) {
            (Backing::Pages, _) => MemoryObject::paged(&data),
            (Backing::Foreign, false) => MemoryObject::imported(data),
            (Backing::Foreign, true) => MemoryObject::imported_iomem(data),
        }
    }

    fn descriptor<'a>(&self, object: &'a dyn BufferObject) -> FramebufferDescriptor<'a> {
        FramebufferDescriptor {
            id: FramebufferId(self.framebuffer),
            width: self.width,
            height: self.height,
            format: self.format,
            pitch: self.pitch,
            modifier: self.modifier,
            object: Some(object),
        }
    }
}

// MARK: - Run

async fn load_config(path: Option<&Path>) -> Result<CaptureConfig> {
    let Some(path) = path else {
        return Ok(CaptureConfig::default());
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

pub async fn run(opts: Options) -> Result<()> {
    let config = load_config(opts.config.as_deref()).await?;
    let session = Arc::new(CaptureSession::new(config)?);

    let text = tokio::fs::read_to_string(&opts.manifest)
        .await
        .with_context(|| format!("reading manifest {}", opts.manifest.display()))?;
    let manifest = Manifest::parse(&text)?;
    let base = opts.manifest.parent().map(Path::to_path_buf).unwrap_or_default();
    info!("Replaying {} frame(s) from {}", manifest.frames.len(), opts.manifest.display());

    let mut failed = 0;
    for (i, frame) in manifest.frames.into_iter().enumerate() {
        let path = base.join(&frame.path);
        let data = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading frame {} ({})", i, path.display()))?;

        let session = Arc::clone(&session);
        let captured = tokio::task::spawn_blocking(move || {
            let object = frame.object(data);
            let fb = frame.descriptor(&object);
            session.notify_framebuffer_ready(DeviceId(frame.device), &fb)
        })
        .await
        .context("capture worker panicked")?;

        if let Err(e) = captured {
            warn!("Frame {} not captured: {}", i, e);
            failed += 1;
        }
    }
    if failed > 0 {
        warn!("{} frame(s) failed to capture", failed);
    }

    let report = session.status();
    let mut stdout = std::io::stdout().lock();
    if opts.json {
        serde_json::to_writer_pretty(&mut stdout, &report).context("writing report")?;
        writeln!(stdout)?;
    } else {
        write!(stdout, "{}", report)?;
    }
    drop(stdout);

    if let Some(out) = opts.raw_out {
        let chunk = opts.chunk;
        let written = tokio::task::spawn_blocking(move || -> Result<u64> {
            let file = std::fs::File::create(&out)
                .with_context(|| format!("creating {}", out.display()))?;
            let mut writer = std::io::BufWriter::new(file);
            Ok(session.copy_latest_to(&mut writer, chunk)?)
        })
        .await
        .context("export worker panicked")??;
        info!("Wrote {} bytes of linear pixel data", written);
    }

    Ok(())
}
