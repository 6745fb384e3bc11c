//! # Tool Compressor
//!
//! Implementazione di `Compressor` che orchestra solo encoder esterni.
//!
//! ## Formati supportati
//!
//! | Input            | Output | Tool (priorità decrescente)       |
//! |------------------|--------|-----------------------------------|
//! | PNG/JPEG/TIFF/WebP | WebP | cwebp                             |
//! | GIF              | WebP   | gif2webp                          |
//! | PNG              | PNG    | oxipng, optipng                   |
//! | JPEG             | JPEG   | jpegoptim, jpegtran (lossy)       |
//! | JPEG             | JPEG   | jpegtran, jpegoptim (lossless)    |
//! | PNG/BMP          | JPEG   | cjpeg                             |
//!
//! ## Pipeline:
//! 1. **Rilevamento formato** dall'estensione
//! 2. **Calcolo path output**: directory di output o accanto al sorgente
//! 3. **File temporaneo** nella directory di destinazione
//! 4. **Catena di tool**: il primo disponibile che termina con successo vince
//! 5. **Persistenza** atomica del temporaneo sul path finale
//!
//! Gli stadi `loading → compressing → saving → complete|error` vengono
//! pubblicati sul canale della richiesta.
//!
//! ## Error handling:
//! - Nessun tool disponibile: `MissingEncoder` (nessuna copia silenziosa)
//! - Tutti i tool falliti: `EncoderFailed`
//! - Coppia di formati non gestita: `UnsupportedFormat`
//! - Segnale di stop: `Cancelled`, il processo figlio viene terminato

use crate::compressor::{CompressedImage, CompressionRequest, CompressionStage, Compressor};
use crate::error::CompressionError;
use crate::format::ImageFormat;
use crate::platform::PlatformCommands;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Where an encoder writes its result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSink {
    /// The output path is passed as an argument
    Argument,
    /// The encoded image is written to stdout
    Stdout,
}

/// One candidate encoder invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderStep {
    pub tool: &'static str,
    pub args: Vec<String>,
    pub sink: OutputSink,
}

impl EncoderStep {
    fn new<I, T>(tool: &'static str, args: I, sink: OutputSink) -> Self
    where
        I: IntoIterator<Item = T>,
        T: ToString,
    {
        Self {
            tool,
            args: args.into_iter().map(|arg| arg.to_string()).collect(),
            sink,
        }
    }
}

/// Encoder candidates for a format pair, best first
pub fn encoder_chain(
    input_format: ImageFormat,
    output_format: ImageFormat,
    quality: u8,
    lossy: bool,
    input: &str,
    output: &str,
) -> Result<Vec<EncoderStep>, CompressionError> {
    use ImageFormat::*;
    use OutputSink::*;

    let q = quality.to_string();
    let q = q.as_str();
    let chain = match (input_format, output_format) {
        (Gif, WebP) if lossy => vec![EncoderStep::new(
            "gif2webp",
            ["-lossy", "-q", q, "-m", "4", "-mt", input, "-o", output],
            Argument,
        )],
        (Gif, WebP) => vec![EncoderStep::new(
            "gif2webp",
            ["-m", "6", "-mt", input, "-o", output],
            Argument,
        )],
        (Png | Jpeg | Tiff | WebP, WebP) if lossy => vec![EncoderStep::new(
            "cwebp",
            ["-q", q, "-m", "4", "-mt", input, "-o", output],
            Argument,
        )],
        (Png | Jpeg | Tiff | WebP, WebP) => vec![EncoderStep::new(
            "cwebp",
            ["-lossless", "-z", "6", "-mt", input, "-o", output],
            Argument,
        )],
        (Png, Png) => vec![
            EncoderStep::new(
                "oxipng",
                ["-o", "4", "--strip", "safe", "--out", output, input],
                Argument,
            ),
            EncoderStep::new(
                "optipng",
                ["-o5", "-strip", "all", "-clobber", "-out", output, input],
                Argument,
            ),
        ],
        (Jpeg, Jpeg) => {
            let max_quality = format!("--max={}", quality);
            let jpegoptim_lossy =
                EncoderStep::new("jpegoptim", [max_quality.as_str(), "--strip-all", "--stdout", input], Stdout);
            let jpegoptim_lossless =
                EncoderStep::new("jpegoptim", ["--strip-all", "--stdout", input], Stdout);
            let jpegtran = EncoderStep::new(
                "jpegtran",
                ["-optimize", "-progressive", "-copy", "none", "-outfile", output, input],
                Argument,
            );
            if lossy {
                vec![jpegoptim_lossy, jpegtran]
            } else {
                vec![jpegtran, jpegoptim_lossless]
            }
        }
        (Png | Bmp, Jpeg) => vec![EncoderStep::new(
            "cjpeg",
            ["-quality", q, "-optimize", "-progressive", "-outfile", output, input],
            Argument,
        )],
        (from, to) => {
            return Err(CompressionError::UnsupportedFormat(format!(
                "{} → {} conversion is not supported",
                from, to
            )))
        }
    };
    Ok(chain)
}

/// Final location of the compressed file
pub fn output_path(source: &Path, output_dir: Option<&Path>, output_format: ImageFormat) -> PathBuf {
    let stem = source.file_stem().unwrap_or_default();
    let filename = format!("{}.{}", stem.to_string_lossy(), output_format.extension());

    match output_dir {
        Some(dir) => dir.join(filename),
        None => source.with_file_name(filename),
    }
}

/// Compressor backed by external command-line encoders
#[derive(Debug, Clone, Default)]
pub struct ToolCompressor {
    stop: Option<watch::Receiver<bool>>,
}

impl ToolCompressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Running encoders are killed once `stop` turns true
    pub fn with_cancellation(stop: watch::Receiver<bool>) -> Self {
        Self { stop: Some(stop) }
    }

    /// Log which encoders can be found on this system
    pub async fn print_available_tools() {
        let platform = PlatformCommands::instance();

        info!("🔧 Checking available encoders:");
        let tools = [
            ("cwebp", "WebP conversion"),
            ("gif2webp", "animated GIF to WebP"),
            ("oxipng", "PNG optimization (fast)"),
            ("optipng", "PNG optimization (fallback)"),
            ("jpegoptim", "JPEG optimization"),
            ("jpegtran", "JPEG optimization (lossless)"),
            ("cjpeg", "PNG/BMP to JPEG"),
        ];
        for (tool, description) in &tools {
            let status = if platform.is_command_available(tool).await { "✅" } else { "❌" };
            info!("  {} {} - {}", status, tool, description);
        }
    }

    fn check_cancelled(&self) -> Result<(), CompressionError> {
        match self.stop {
            Some(ref stop) if *stop.borrow() => Err(CompressionError::Cancelled),
            _ => Ok(()),
        }
    }

    async fn run(&self, request: &CompressionRequest) -> Result<CompressedImage, CompressionError> {
        request.report(CompressionStage::Loading);
        self.check_cancelled()?;

        let input_format = ImageFormat::from_path(&request.path).ok_or_else(|| {
            CompressionError::UnsupportedFormat(request.path.display().to_string())
        })?;
        let input = request
            .path
            .to_str()
            .ok_or_else(|| CompressionError::Io(format!("Invalid input path: {:?}", request.path)))?;

        let final_path = output_path(&request.path, request.output_dir.as_deref(), request.output_format);
        let target_dir = final_path.parent().unwrap_or_else(|| Path::new(""));
        tokio::fs::create_dir_all(target_dir).await?;

        let temp_path = tempfile::Builder::new()
            .prefix(".squeeze-")
            .suffix(&format!(".{}", request.output_format.extension()))
            .tempfile_in(target_dir)?
            .into_temp_path();
        let temp = temp_path
            .to_str()
            .ok_or_else(|| CompressionError::Io(format!("Invalid output path: {:?}", temp_path)))?;

        let chain = encoder_chain(
            input_format,
            request.output_format,
            request.quality,
            request.lossy,
            input,
            temp,
        )?;

        request.report(CompressionStage::Compressing);
        self.try_encoders(&chain, temp).await?;

        request.report(CompressionStage::Saving);
        temp_path
            .persist(&final_path)
            .map_err(|e| CompressionError::Io(e.to_string()))?;
        let compressed_size = tokio::fs::metadata(&final_path).await?.len();

        Ok(CompressedImage {
            compressed_size,
            output_path: final_path,
        })
    }

    /// Try each available encoder until one succeeds
    async fn try_encoders(&self, chain: &[EncoderStep], output: &str) -> Result<(), CompressionError> {
        let platform = PlatformCommands::instance();
        let mut any_tool_available = false;

        for step in chain {
            if !platform.is_command_available(step.tool).await {
                continue;
            }
            any_tool_available = true;
            self.check_cancelled()?;

            debug!("Running {} {:?}", step.tool, step.args);
            let start_time = Instant::now();
            let success = self.run_step(platform, step, output).await?;
            let elapsed = start_time.elapsed();

            if success {
                debug!("{} succeeded in {:?}", step.tool, elapsed);
                return Ok(());
            }
            warn!("{} failed after {:?}, trying next encoder", step.tool, elapsed);
        }

        let tool_names: Vec<&str> = chain.iter().map(|step| step.tool).collect();
        if any_tool_available {
            Err(CompressionError::EncoderFailed(format!(
                "all encoders failed ({})",
                tool_names.join(", ")
            )))
        } else {
            Err(CompressionError::MissingEncoder(format!(
                "install one of: {}",
                tool_names.join(", ")
            )))
        }
    }

    async fn run_step(
        &self,
        platform: &PlatformCommands,
        step: &EncoderStep,
        output: &str,
    ) -> Result<bool, CompressionError> {
        let stdout = match step.sink {
            OutputSink::Argument => Stdio::null(),
            OutputSink::Stdout => Stdio::piped(),
        };
        let child = Command::new(platform.get_tool_path(step.tool))
            .args(&step.args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let result = self.until_cancelled(child.wait_with_output()).await??;

        if !result.status.success() {
            debug!(
                "{} stderr: {}",
                step.tool,
                String::from_utf8_lossy(&result.stderr).trim()
            );
            return Ok(false);
        }
        if step.sink == OutputSink::Stdout {
            tokio::fs::write(output, &result.stdout).await?;
        }
        Ok(true)
    }

    /// Drive `work` to completion unless the stop signal fires first
    async fn until_cancelled<F: Future>(&self, work: F) -> Result<F::Output, CompressionError> {
        let Some(mut stop) = self.stop.clone() else {
            return Ok(work.await);
        };

        tokio::select! {
            output = work => Ok(output),
            _ = stopped(&mut stop) => Err(CompressionError::Cancelled),
        }
    }
}

/// Resolves when the stop flag turns true; never if the sender is gone
async fn stopped(stop: &mut watch::Receiver<bool>) {
    let signaled = stop.wait_for(|stopped| *stopped).await.is_ok();
    if !signaled {
        std::future::pending::<()>().await;
    }
}

impl Compressor for ToolCompressor {
    async fn compress(&self, request: &CompressionRequest) -> Result<CompressedImage, CompressionError> {
        let result = self.run(request).await;
        match result {
            Ok(_) => request.report(CompressionStage::Complete),
            Err(ref e) => {
                debug!("Compression of {} failed: {}", request.path.display(), e);
                request.report(CompressionStage::Error);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressor::StageEvent;
    use crate::item::ItemId;
    use tempfile::TempDir;
    use tokio::sync::broadcast;

    fn tools(chain: &[EncoderStep]) -> Vec<&'static str> {
        chain.iter().map(|step| step.tool).collect()
    }

    #[test]
    fn test_webp_chain_respects_lossy_flag() {
        let lossy = encoder_chain(ImageFormat::Png, ImageFormat::WebP, 75, true, "in.png", "out.webp").unwrap();
        assert_eq!(tools(&lossy), vec!["cwebp"]);
        assert!(lossy[0].args.windows(2).any(|w| w == ["-q", "75"]));

        let lossless = encoder_chain(ImageFormat::Png, ImageFormat::WebP, 75, false, "in.png", "out.webp").unwrap();
        assert!(lossless[0].args.contains(&"-lossless".to_string()));
        assert!(!lossless[0].args.contains(&"75".to_string()));

        let gif = encoder_chain(ImageFormat::Gif, ImageFormat::WebP, 80, true, "in.gif", "out.webp").unwrap();
        assert_eq!(tools(&gif), vec!["gif2webp"]);
    }

    #[test]
    fn test_jpeg_chain_order() {
        let lossy = encoder_chain(ImageFormat::Jpeg, ImageFormat::Jpeg, 82, true, "a.jpg", "b.jpg").unwrap();
        assert_eq!(tools(&lossy), vec!["jpegoptim", "jpegtran"]);
        assert_eq!(lossy[0].sink, OutputSink::Stdout);
        assert!(lossy[0].args.contains(&"--max=82".to_string()));

        let lossless = encoder_chain(ImageFormat::Jpeg, ImageFormat::Jpeg, 82, false, "a.jpg", "b.jpg").unwrap();
        assert_eq!(tools(&lossless), vec!["jpegtran", "jpegoptim"]);
        assert!(!lossless[1].args.iter().any(|arg| arg.starts_with("--max")));
    }

    #[test]
    fn test_png_chain_and_unsupported_pairs() {
        let png = encoder_chain(ImageFormat::Png, ImageFormat::Png, 80, true, "a.png", "b.png").unwrap();
        assert_eq!(tools(&png), vec!["oxipng", "optipng"]);

        let err = encoder_chain(ImageFormat::Bmp, ImageFormat::WebP, 80, true, "a.bmp", "b.webp").unwrap_err();
        assert!(matches!(err, CompressionError::UnsupportedFormat(_)));
        assert!(encoder_chain(ImageFormat::WebP, ImageFormat::Png, 80, true, "a.webp", "b.png").is_err());
    }

    #[test]
    fn test_output_path() {
        let source = Path::new("/photos/trip/IMG_001.png");
        assert_eq!(
            output_path(source, None, ImageFormat::WebP),
            PathBuf::from("/photos/trip/IMG_001.webp")
        );
        assert_eq!(
            output_path(source, Some(Path::new("/out")), ImageFormat::Jpeg),
            PathBuf::from("/out/IMG_001.jpg")
        );
    }

    fn request(path: PathBuf, stages: Option<broadcast::Sender<StageEvent>>) -> CompressionRequest {
        CompressionRequest {
            id: ItemId(3),
            path,
            quality: 80,
            output_format: ImageFormat::WebP,
            lossy: true,
            output_dir: None,
            stages,
        }
    }

    #[tokio::test]
    async fn test_unknown_input_reports_error_stage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("notes.txt");
        tokio::fs::write(&path, b"not an image").await.unwrap();

        let (tx, mut rx) = broadcast::channel(8);
        let result = ToolCompressor::new().compress(&request(path, Some(tx))).await;
        assert!(matches!(result, Err(CompressionError::UnsupportedFormat(_))));

        assert_eq!(rx.try_recv().unwrap().stage, CompressionStage::Loading);
        assert_eq!(rx.try_recv().unwrap().stage, CompressionStage::Error);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("photo.png");
        tokio::fs::write(&path, b"png").await.unwrap();

        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();

        let compressor = ToolCompressor::with_cancellation(stop_rx);
        let result = compressor.compress(&request(path.clone(), None)).await;
        assert_eq!(result, Err(CompressionError::Cancelled));
        assert!(!temp_dir.path().join("photo.webp").exists());
    }
}
