use anyhow::Context;
use pywas_core::config::ServerConfig;
use pywas_core::RequestHandler;
use pywas_was::{Driver, WasConnection};

/// Serve exchanges on the inherited WAS descriptors until the peer hangs up.
pub fn run<H: RequestHandler + ?Sized>(handler: &H, server: &ServerConfig) -> anyhow::Result<()> {
    // SAFETY: descriptors 0, 1 and 3 are handed over by the WAS server and
    // nothing else in this process reads or writes them from here on.
    let connection =
        unsafe { WasConnection::from_inherited_fds() }.context("could not open the WAS descriptors")?;

    let driver = Driver::new(connection, server.clone());
    let served = driver.run(handler);
    tracing::info!(served, "WAS connection closed");
    Ok(())
}
