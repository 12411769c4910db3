//! Push and notification-click handlers.
//!
//! Both always resolve. Failures are logged and the event ends without a
//! visible effect.

use crate::domain::{Notification, PushPayload};
use crate::ports::NotificationHost;
use tracing::{debug, error, warn};

/// What a notification click did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// An open window already showing the target was focused
    Focused { client_id: String },
    /// A new window was opened at the target
    Opened { url: String },
    /// The host refused; nothing happened
    Failed,
}

/// Show the notification for a push message.
///
/// No data: ignored. Malformed JSON: logged, no notification.
pub async fn on_push(host: &dyn NotificationHost, data: Option<&[u8]>) -> Option<Notification> {
    let Some(data) = data else {
        debug!("Push event without data ignored");
        return None;
    };

    let payload = match PushPayload::parse(data) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "Error handling push event");
            return None;
        }
    };

    let notification = Notification::from_payload(payload);
    match host.show_notification(&notification).await {
        Ok(()) => {
            debug!(tag = %notification.tag(), "Notification shown");
            Some(notification)
        }
        Err(e) => {
            warn!(tag = %notification.tag(), error = %e, "Failed to show notification");
            None
        }
    }
}

/// Close the notification and bring its target into view.
pub async fn on_notification_click(
    host: &dyn NotificationHost,
    notification: &Notification,
) -> ClickOutcome {
    host.close_notification(notification).await;
    let target = notification.target_url();

    let clients = match host.match_window_clients().await {
        Ok(clients) => clients,
        Err(e) => {
            warn!(error = %e, "Could not list window clients");
            Vec::new()
        }
    };

    if let Some(client) = clients.iter().find(|c| c.url.contains(target)) {
        match host.focus(client).await {
            Ok(()) => {
                return ClickOutcome::Focused {
                    client_id: client.id.clone(),
                }
            }
            Err(e) => {
                warn!(client = %client.id, error = %e, "Focus failed");
                return ClickOutcome::Failed;
            }
        }
    }

    match host.open_window(target).await {
        Ok(()) => ClickOutcome::Opened {
            url: target.to_string(),
        },
        Err(e) => {
            warn!(url = %target, error = %e, "Could not open window");
            ClickOutcome::Failed
        }
    }
}
