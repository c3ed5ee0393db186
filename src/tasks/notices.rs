//! Presentation sink for countdown notices

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::countdown::Notice;

/// Render notices as log lines; stands in for the popup and tray balloons
pub async fn notice_task(mut notices: broadcast::Receiver<Notice>) {
    info!("Starting notice task");

    loop {
        match notices.recv().await {
            Ok(notice) => render(&notice),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Notice task fell behind, skipped {} notices", skipped);
            }
            Err(RecvError::Closed) => break,
        }
    }

    debug!("Notice task stopped");
}

fn render(notice: &Notice) {
    let message = notice.message();
    match notice {
        Notice::LockFailed { .. } => error!("{}", message),
        Notice::Armed { .. } | Notice::Remaining { .. } | Notice::DeviceRemoved { .. } => {
            warn!("{}", message)
        }
        _ => info!("{}", message),
    }
}
