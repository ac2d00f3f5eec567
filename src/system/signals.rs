// src/system/signals.rs

use crate::CancellationToken;
use std::sync::atomic::Ordering;
use std::thread;

/// Raises `cancellation_token` whenever the process receives SIGINT, SIGTERM or SIGHUP.
///
/// The handlers are registered before this function returns and stay registered for the
/// life of the process, so a second Ctrl+C during teardown does not kill us either.
#[cfg(unix)]
pub fn install(cancellation_token: &CancellationToken) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let (mut interrupt, mut terminate, mut hangup) = {
        let _guard = runtime.enter();
        (
            signal(SignalKind::interrupt())?,
            signal(SignalKind::terminate())?,
            signal(SignalKind::hangup())?,
        )
    };

    let flag = cancellation_token.clone();
    thread::Builder::new()
        .name("tempsystem-signals".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    let name = tokio::select! {
                        _ = interrupt.recv() => "SIGINT",
                        _ = terminate.recv() => "SIGTERM",
                        _ = hangup.recv() => "SIGHUP",
                    };
                    log::debug!("Received {}, requesting cancellation.", name);
                    flag.store(true, Ordering::SeqCst);
                }
            });
        })?;
    Ok(())
}

#[cfg(not(unix))]
pub fn install(cancellation_token: &CancellationToken) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let flag = cancellation_token.clone();
    thread::Builder::new()
        .name("tempsystem-signals".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    log::debug!("Received Ctrl+C, requesting cancellation.");
                    flag.store(true, Ordering::SeqCst);
                }
            });
        })?;
    Ok(())
}
