//! CLI entry point: `choronzon-rs <config-path>`. Grounded on
//! `examples/original_source/choronzon.py`'s `main(args)`.
use choronzon_rs::controller::Controller;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_: i32) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

fn install_interrupt_handler() {
    let handler = nix::sys::signal::SigHandler::Handler(handle_sigint);
    unsafe {
        let action = nix::sys::signal::SigAction::new(
            handler,
            nix::sys::signal::SaFlags::empty(),
            nix::sys::signal::SigSet::empty(),
        );
        if let Err(err) = nix::sys::signal::sigaction(nix::sys::signal::Signal::SIGINT, &action) {
            log::warn!("failed to install SIGINT handler: {err}");
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    install_interrupt_handler();

    let mut args = std::env::args_os();
    let _program = args.next();
    let Some(config_path) = args.next() else {
        eprintln!("usage: choronzon-rs <config-path>");
        return ExitCode::FAILURE;
    };
    let config_path = PathBuf::from(config_path);

    log::info!("starting campaign");
    let mut controller = match Controller::new(&config_path) {
        Ok(controller) => controller,
        Err(err) => {
            eprintln!("failed to start campaign: {err}");
            return ExitCode::FAILURE;
        }
    };

    loop {
        if INTERRUPTED.load(Ordering::SeqCst) {
            log::info!("interrupted, stopping campaign");
            return ExitCode::SUCCESS;
        }
        if let Err(err) = controller.run_epoch() {
            eprintln!("campaign aborted: {err}");
            return ExitCode::FAILURE;
        }
    }
}
