use super::App;
use crate::error::{AppError, Result};
use crate::sync::ConnectivityMonitor;
use crate::sync::connectivity::Connectivity;
use tracing::info;

pub(super) async fn execute() -> Result<()> {
    let app = App::resume(false).await?;
    let interval = app.config.connectivity.interval();
    let mut monitor = ConnectivityMonitor::new(app.probe);

    // Seed with the state the app opened with so the first tick only reports changes
    monitor.observe(match app.engine.is_online() {
        true => Connectivity::Online,
        false => Connectivity::Offline,
    });

    info!(interval = ?interval, "Watching connectivity, press Ctrl-C to stop");

    tokio::select! {
        _ = monitor.run(app.engine.clone(), interval) => Ok(()),
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(AppError::Io)?;
            info!("Stopped watching");
            Ok(())
        }
    }
}
