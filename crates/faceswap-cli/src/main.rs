use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use faceswap_client::{
    FaceSwapApi, HttpFaceSwapApi, Orchestrator, Phase, PreviewProvider, SelectedImage, Session,
    Slot,
};
use faceswap_core::ImagePayload;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "faceswap", about = "Face swap demo CLI")]
struct Cli {
    /// Base URL of faceswapd
    #[arg(long, global = true, env = "FACESWAP_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Put the face from one image onto another
    Swap {
        /// Image providing the face
        #[arg(long)]
        face: PathBuf,
        /// Image whose face gets replaced
        #[arg(long)]
        base: PathBuf,
    },
    /// Upload a single image through the proxy
    Upload {
        /// Image file to upload
        #[arg(required_unless_present = "data", conflicts_with = "data")]
        path: Option<PathBuf>,
        /// data: URL or bare base64 string instead of a file
        #[arg(long)]
        data: Option<String>,
    },
    /// Show daemon status
    Status,
}

/// Terminal stand-in for browser object URLs.
struct FilePreviews;

impl PreviewProvider for FilePreviews {
    fn create(&self, image: &SelectedImage) -> String {
        let path = Path::new(&image.name);
        let absolute = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        format!("file://{}", absolute.display())
    }

    fn revoke(&self, url: &str) {
        tracing::debug!(url, "preview released");
    }
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "idle",
        Phase::Uploading => "Uploading images...",
        Phase::Invoking => "Swapping faces...",
        Phase::Rehosting => "Saving result...",
        Phase::Done => "Done",
        Phase::Error => "Failed",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let client = reqwest::Client::builder()
        .user_agent(concat!("faceswap-cli/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let api = HttpFaceSwapApi::new(client, &cli.server);

    match cli.command {
        Commands::Swap { face, base } => {
            let mut session = Session::new(Arc::new(FilePreviews));
            session.select(Slot::Face, SelectedImage::from_path(&face).await?)?;
            session.select(Slot::Base, SelectedImage::from_path(&base).await?)?;
            println!("Face: {}", session.preview_url(Slot::Face).unwrap_or("-"));
            println!("Base: {}", session.preview_url(Slot::Base).unwrap_or("-"));

            let orchestrator = Orchestrator::new(api).with_progress(|phase| {
                if phase.is_busy() {
                    println!("{}", phase_label(phase));
                }
            });

            match orchestrator.run(&mut session).await {
                Ok(url) => {
                    if let Some((face_url, base_url)) = session.uploaded() {
                        println!("Face uploaded: {face_url}");
                        println!("Base uploaded: {base_url}");
                    }
                    println!("Result: {url}");
                }
                Err(e) => {
                    tracing::debug!(error = ?e, "swap failed");
                    if let Some((face_url, base_url)) = session.uploaded() {
                        println!("Face uploaded: {face_url}");
                        println!("Base uploaded: {base_url}");
                    }
                    anyhow::bail!("{}", session.error().unwrap_or("Process failed"));
                }
            }
        }
        Commands::Upload { path, data } => {
            let payload = match (path, data) {
                (_, Some(text)) => ImagePayload::Text(text),
                (Some(path), None) => {
                    let image = SelectedImage::from_path(&path).await?;
                    println!("Uploading {} ({} bytes)", image.name, image.size());
                    ImagePayload::Bytes(image.bytes)
                }
                (None, None) => anyhow::bail!("either a path or --data is required"),
            };
            let url = api.upload(payload).await.map_err(|e| {
                anyhow::anyhow!(e.server_message().map(str::to_string).unwrap_or_else(|| e.to_string()))
            })?;
            println!("{url}");
        }
        Commands::Status => match api.status().await {
            Ok(status) => println!("{}", serde_json::to_string_pretty(&status)?),
            Err(e) => {
                tracing::debug!(error = %e, server = api.base_url(), "status request failed");
                println!("faceswapd: not reachable at {}", api.base_url());
            }
        },
    }

    Ok(())
}
