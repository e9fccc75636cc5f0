#[cfg(target_os = "linux")]
mod batch_linux;
mod env;
mod error;
mod logging;
mod session;

use awg_core::{Config, ProtocolMode};

fn main() {
    let raw = match env::load() {
        Ok(raw) => raw,
        Err(errors) => {
            for e in &errors {
                eprintln!("ERROR: {e}");
            }
            std::process::exit(1);
        }
    };

    let cfg = match Config::build(raw) {
        Ok(cfg) => cfg,
        Err(errors) => {
            for e in &errors {
                eprintln!("ERROR: {e}");
            }
            std::process::exit(1);
        }
    };

    logging::init(cfg.log_level);

    let listen = env::listen_addr().expect("AWG_LISTEN already validated by env::load");
    let remote = env::remote_addr().expect("AWG_REMOTE already validated by env::load");

    tracing::info!(
        "starting in {} mode: listen={listen} remote={remote} jc={} jmin={} jmax={}",
        ProtocolMode::classify(&cfg),
        cfg.jc,
        cfg.jmin,
        cfg.jmax,
    );

    if let Err(e) = session::run(cfg, &listen, &remote) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
