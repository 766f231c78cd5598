use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};
use webtrail_call::CallListener;
use webtrail_frame::FrameConfig;

use crate::cmd::ServeArgs;
use crate::exit::{call_error, CliError, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: ServeArgs, _format: OutputFormat) -> CliResult<i32> {
    let mut config = FrameConfig::default();
    if let Some(max_payload) = args.max_payload {
        config.max_payload_size = max_payload;
    }

    let listener = CallListener::bind(&args.path)
        .map_err(|err| call_error("bind failed", err))?
        .with_frame_config(config);
    info!(path = %args.path.display(), "serving ping test service");

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    while running.load(Ordering::SeqCst) {
        let (incoming, stream) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(err) => {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                return Err(call_error("accept failed", err));
            }
        };

        // One thread per call; streams share nothing, so a slow or
        // latency-injecting call never stalls its neighbors.
        std::thread::spawn(move || {
            let path = incoming.path.clone();
            if let Err(err) = webtrail::ping::handle(incoming, stream) {
                warn!(path = %path, error = %err, "call handler failed");
            }
        });
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| {
        CliError::new(
            crate::exit::INTERNAL,
            format!("signal handler setup failed: {err}"),
        )
    })
}
