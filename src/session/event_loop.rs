//! Session loop: feeds every [`SessionInput`] to the controller in arrival
//! order.

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::controller::SessionController;
use super::SessionInput;

/// Drive `controller` until the session finishes or every input sender is
/// gone. Teardown always runs before returning.
///
/// Returns the controller so callers can inspect its final state.
pub async fn run_session(
    mut controller: SessionController,
    mut input_rx: mpsc::Receiver<SessionInput>,
) -> SessionController {
    info!("session loop started");

    while let Some(input) = input_rx.recv().await {
        controller.handle(input).await;
        if controller.is_finished() {
            debug!("session finished");
            break;
        }
    }

    controller.teardown().await;
    info!(state = ?controller.state(), "session loop stopped");
    controller
}
