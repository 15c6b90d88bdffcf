use anyhow::{anyhow, Context};
use clap::Parser;
use qrlink_pairing::{DeviceList, PairingConfig, PairingPhase, QrImage};
use qrlink_session::{SessionController, WsTransport};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(about = "Link a messaging account to a tenant by scanning a QR code")]
struct Opts {
    /// Tenant the linked device will belong to
    #[arg(long)]
    tenant: String,

    /// Pairing backend URL (ws, wss, http or https)
    #[arg(long)]
    endpoint: Option<String>,

    /// Host to derive the backend URL from when no endpoint is given
    #[arg(long)]
    page_host: Option<String>,

    /// Use wss when deriving the backend URL from the page host
    #[arg(long)]
    secure: bool,

    #[arg(long)]
    port: Option<u16>,

    /// Give up after this many seconds without hearing from the backend
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Write the QR image here instead of printing the data URI; the
    /// extension is filled in from the image type when missing
    #[arg(long)]
    qr_out: Option<PathBuf>,
}

impl Opts {
    fn overlay(&self, mut config: PairingConfig) -> PairingConfig {
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = Some(endpoint.clone());
        }
        if let Some(host) = &self.page_host {
            config.page_host = Some(host.clone());
        }
        if self.secure {
            config.page_secure = true;
        }
        if let Some(port) = self.port.filter(|p| *p > 0) {
            config.port = port;
        }
        if let Some(secs) = self.timeout_secs.filter(|s| *s > 0) {
            config.idle_timeout = Duration::from_secs(secs);
        }
        config
    }
}

enum Wake {
    Stepped,
    Interrupted,
}

fn qr_path(out: &Path, image: &QrImage) -> PathBuf {
    match out.extension() {
        Some(_) => out.to_path_buf(),
        None => out.with_extension(image.extension()),
    }
}

fn show_qr(payload: &str, out: Option<&PathBuf>) -> anyhow::Result<()> {
    let Some(out) = out else {
        println!("{payload}");
        return Ok(());
    };
    let image = QrImage::from_data_uri(payload).context("decoding qr payload")?;
    let path = qr_path(out, &image);
    image.write_to(&path)?;
    println!("QR code written to {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    let config = opts.overlay(PairingConfig::from_env());
    let devices = Arc::new(DeviceList::new());
    let mut controller =
        SessionController::from_config(&config, Arc::new(WsTransport::new()), devices.clone())
            .context("resolving the pairing endpoint")?;
    log::info!(
        "qrlink starting (tenant={}, endpoint={}, timeout={:?})",
        opts.tenant,
        controller.endpoint(),
        config.idle_timeout
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    controller.start(&opts.tenant);
    let mut shown_phase = None;
    let mut shown_qr: Option<String> = None;

    loop {
        let phase = controller.phase();
        if shown_phase != Some(phase) {
            eprintln!("[{phase}] {}", controller.message());
            shown_phase = Some(phase);
        }
        if let Some(qr) = controller.qr_payload() {
            if shown_qr.as_deref() != Some(qr) {
                if let Err(e) = show_qr(qr, opts.qr_out.as_ref()) {
                    log::warn!("could not save the QR code: {e:#}");
                    println!("{qr}");
                }
                shown_qr = Some(qr.to_string());
            }
        }
        if phase.is_settled() {
            break;
        }

        let wake = tokio::select! {
            _ = controller.step() => Wake::Stepped,
            _ = &mut ctrl_c => Wake::Interrupted,
        };
        if let Wake::Interrupted = wake {
            log::info!("interrupted; cancelling pairing");
            controller.cancel();
            eprintln!("[{}] {}", controller.phase(), controller.message());
            break;
        }
    }

    match controller.phase() {
        PairingPhase::Completed => {
            let device = controller
                .linked_device()
                .ok_or_else(|| anyhow!("pairing completed without a device"))?;
            println!("{}", serde_json::to_string_pretty(device)?);
            log::info!("{} linked device(s) known", devices.len());
            Ok(())
        }
        phase => Err(anyhow!(
            "pairing ended in phase {phase}: {}",
            controller.message()
        )),
    }
}
